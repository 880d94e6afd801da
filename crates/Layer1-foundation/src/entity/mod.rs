//! Entity model - 보호 대상 엔티티 종류와 참조
//!
//! 엔티티 종류는 닫힌 enum이며, 각 종류는 다음 capability를 가진다:
//! - `is_protected`: 자체 PrivilegeRecord를 가지는가
//! - `has_project`: 프로젝트에 속할 수 있는가 (역할 기반 권한)
//! - `container_kinds`: 어떤 컨테이너 안에 놓일 수 있는가 (컨텍스트 권한)

use crate::core::{EntityId, ProjectId, UserId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// EntityKind
// ============================================================================

/// Every entity type the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Task,
    Meeting,
    Note,
    File,
    Picture,
    Contact,
    Resource,
    Dmp,
    Drive,
    Directory,
    LabBook,
    KanbanBoard,
    KanbanColumn,
}

/// Capability set of an entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub is_protected: bool,
    pub has_project: bool,
    pub has_container: bool,
}

impl EntityKind {
    pub const ALL: [EntityKind; 13] = [
        EntityKind::Task,
        EntityKind::Meeting,
        EntityKind::Note,
        EntityKind::File,
        EntityKind::Picture,
        EntityKind::Contact,
        EntityKind::Resource,
        EntityKind::Dmp,
        EntityKind::Drive,
        EntityKind::Directory,
        EntityKind::LabBook,
        EntityKind::KanbanBoard,
        EntityKind::KanbanColumn,
    ];

    /// Storage/codename identifier (`view_<as_str>`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Meeting => "meeting",
            Self::Note => "note",
            Self::File => "file",
            Self::Picture => "picture",
            Self::Contact => "contact",
            Self::Resource => "resource",
            Self::Dmp => "dmp",
            Self::Drive => "drive",
            Self::Directory => "directory",
            Self::LabBook => "labbook",
            Self::KanbanBoard => "kanbanboard",
            Self::KanbanColumn => "kanbancolumn",
        }
    }

    /// Directories and board columns are structural: they carry no
    /// privileges of their own and derive everything from their container.
    pub fn is_protected(&self) -> bool {
        !matches!(self, Self::Directory | Self::KanbanColumn)
    }

    pub fn has_project(&self) -> bool {
        self.is_protected()
    }

    /// Kinds an instance of this kind may be placed in.
    pub fn container_kinds(&self) -> &'static [EntityKind] {
        match self {
            Self::Task => &[EntityKind::KanbanColumn],
            Self::Note | Self::Picture => &[EntityKind::LabBook],
            Self::File => &[EntityKind::Directory, EntityKind::LabBook],
            Self::Directory => &[EntityKind::Directory, EntityKind::Drive],
            Self::KanbanColumn => &[EntityKind::KanbanBoard],
            _ => &[],
        }
    }

    pub fn has_container(&self) -> bool {
        !self.container_kinds().is_empty()
    }

    pub fn can_be_contained_in(&self, container: EntityKind) -> bool {
        self.container_kinds().contains(&container)
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            is_protected: self.is_protected(),
            has_project: self.has_project(),
            has_container: self.has_container(),
        }
    }

    /// Structural kinds must always live inside a container.
    pub fn requires_container(&self) -> bool {
        !self.is_protected()
    }

    pub fn protected_kinds() -> impl Iterator<Item = EntityKind> {
        Self::ALL.into_iter().filter(|k| k.is_protected())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace(['_', '-'], "");
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown entity kind: {}", s)))
    }
}

// ============================================================================
// EntityRef / Entity
// ============================================================================

/// (kind, id) pair identifying one entity instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<EntityId>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Lifecycle of an entity: `active ⇄ trashed → (hard-deleted)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    Active,
    Trashed,
}

/// Entity row as exposed by the ORM layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub kind: EntityKind,
    pub id: EntityId,
    pub title: String,
    pub project_id: Option<ProjectId>,
    pub container: Option<EntityRef>,
    pub created_by: UserId,
    pub state: EntityState,
    pub created_at: String,
}

impl Entity {
    pub fn reference(&self) -> EntityRef {
        EntityRef::new(self.kind, self.id.clone())
    }

    pub fn is_trashed(&self) -> bool {
        self.state == EntityState::Trashed
    }
}

/// Data needed to create an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntity {
    pub kind: EntityKind,
    pub id: EntityId,
    pub title: String,
    pub project_id: Option<ProjectId>,
    pub container: Option<EntityRef>,
}

impl NewEntity {
    pub fn new(kind: EntityKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            id: EntityId::generate(),
            title: title.into(),
            project_id: None,
            container: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<EntityId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn in_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn in_container(mut self, container: EntityRef) -> Self {
        self.container = Some(container);
        self
    }

    pub fn reference(&self) -> EntityRef {
        EntityRef::new(self.kind, self.id.clone())
    }

    /// 종류별 제약 검증 (컨테이너 종류, 프로젝트 가능 여부)
    pub fn validate(&self) -> Result<()> {
        if let Some(container) = &self.container {
            if !self.kind.can_be_contained_in(container.kind) {
                return Err(Error::InvalidInput(format!(
                    "{} cannot be placed in a {}",
                    self.kind, container.kind
                )));
            }
        } else if self.kind.requires_container() {
            return Err(Error::InvalidInput(format!(
                "{} requires a container",
                self.kind
            )));
        }

        if self.project_id.is_some() && !self.kind.has_project() {
            return Err(Error::InvalidInput(format!(
                "{} cannot belong to a project",
                self.kind
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert_eq!("Kanban_Board".parse::<EntityKind>().unwrap(), EntityKind::KanbanBoard);
        assert!("spaceship".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_capabilities() {
        let task = EntityKind::Task.capabilities();
        assert!(task.is_protected && task.has_project && task.has_container);

        let column = EntityKind::KanbanColumn.capabilities();
        assert!(!column.is_protected);
        assert!(!column.has_project);
        assert!(column.has_container);

        assert!(!EntityKind::Meeting.has_container());
        assert!(EntityKind::File.can_be_contained_in(EntityKind::LabBook));
        assert!(!EntityKind::Meeting.can_be_contained_in(EntityKind::LabBook));
    }

    #[test]
    fn test_new_entity_validation() {
        let ok = NewEntity::new(EntityKind::Note, "n")
            .in_container(EntityRef::new(EntityKind::LabBook, "lb"));
        assert!(ok.validate().is_ok());

        let wrong_container = NewEntity::new(EntityKind::Note, "n")
            .in_container(EntityRef::new(EntityKind::Drive, "d"));
        assert!(matches!(wrong_container.validate(), Err(Error::InvalidInput(_))));

        let orphan_dir = NewEntity::new(EntityKind::Directory, "dir");
        assert!(orphan_dir.validate().is_err());

        let dir_in_project = NewEntity::new(EntityKind::Directory, "dir")
            .in_container(EntityRef::new(EntityKind::Drive, "d"))
            .in_project(ProjectId::new("p"));
        assert!(dir_in_project.validate().is_err());
    }
}
