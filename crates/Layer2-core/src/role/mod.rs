//! Project Role Resolver
//!
//! 프로젝트 계층의 역할 할당에서 기본 권한을 유도합니다.
//!
//! - 엔티티의 프로젝트에서 루트 방향으로 조상 체인을 따라가며
//!   사용자의 할당이 있는 가장 가까운 프로젝트의 역할이 적용됩니다.
//! - 역할의 `<action>_<kind>` 코드네임이 tier별 ALLOW로 변환됩니다.
//! - full access는 역할에서 유도되지 않습니다.
//! - 프로젝트 없는 생성은 그룹 기본 권한 `add_<kind>_without_project`로 판단합니다.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;
use warden_foundation::{
    fragments, Entity, EntityKind, PrivilegeSource, Privileges, ProjectId, Result, Role,
    SqlFilter, Storage, Tier, User, UserId,
};

/// `<action>_<kind>`
pub fn codename(action: &str, kind: EntityKind) -> String {
    format!("{}_{}", action, kind.as_str())
}

/// Group-level grant allowing creation outside of any project.
pub fn without_project_codename(kind: EntityKind) -> String {
    format!("add_{}_without_project", kind.as_str())
}

/// Role-derived contribution for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub user_id: UserId,
    pub privileges: Privileges,
    pub source: PrivilegeSource,
}

/// Resolves default grants from project role assignments.
#[derive(Clone)]
pub struct ProjectRoleResolver {
    storage: Arc<Storage>,
}

impl ProjectRoleResolver {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Codenames whose presence in a role grants `tier` on `kind`.
    /// A grant on a higher tier implies the lower ones.
    pub fn codenames_for(tier: Tier, kind: EntityKind) -> Vec<String> {
        tier.at_or_above()
            .iter()
            .filter_map(|t| t.codename_action())
            .map(|action| codename(action, kind))
            .collect()
    }

    /// Synthetic (not persisted) record built from a role.
    pub fn privileges_from_role(role: &Role, kind: EntityKind) -> Privileges {
        let mut privileges = Privileges::neutral();
        for tier in Tier::ORDERED {
            if let Some(action) = tier.codename_action() {
                if role.has_permission(&codename(action, kind)) {
                    privileges = privileges.allow(tier);
                }
            }
        }
        privileges.normalized()
    }

    /// Closest assignment of `user_id` on the chain of `project_id`.
    pub fn closest_role(&self, user_id: &UserId, project_id: &ProjectId) -> Result<Option<(ProjectId, Role)>> {
        let chain = self.storage.project_ancestors(project_id)?;
        let assignments = self.storage.assignments_on(&chain, Some(user_id))?;

        let closest = chain
            .iter()
            .find_map(|project| assignments.iter().find(|a| &a.project_id == project));

        let Some(assignment) = closest else {
            return Ok(None);
        };

        Ok(self
            .storage
            .get_role(&assignment.role_id)?
            .map(|role| (assignment.project_id.clone(), role)))
    }

    /// Role-derived grant of one user on an entity.
    pub fn grant_for_user(&self, user_id: &UserId, entity: &Entity) -> Result<Option<RoleGrant>> {
        let Some(project_id) = &entity.project_id else {
            return Ok(None);
        };

        let Some((assigned_on, role)) = self.closest_role(user_id, project_id)? else {
            return Ok(None);
        };

        let privileges = Self::privileges_from_role(&role, entity.kind);
        debug!(
            "Role {} on project {} gives {} on {}: {:?}",
            role.name,
            assigned_on,
            user_id,
            entity.reference(),
            privileges.granted_tiers()
        );

        Ok(Some(RoleGrant {
            user_id: user_id.clone(),
            privileges,
            source: PrivilegeSource::Role {
                project_id: assigned_on.to_string(),
                role_id: role.id.to_string(),
            },
        }))
    }

    /// Role-derived grants of every user with an assignment on the
    /// entity's project chain (closest assignment per user).
    pub fn grants_for_entity(&self, entity: &Entity) -> Result<Vec<RoleGrant>> {
        let Some(project_id) = &entity.project_id else {
            return Ok(Vec::new());
        };

        let chain = self.storage.project_ancestors(project_id)?;
        let assignments = self.storage.assignments_on(&chain, None)?;

        // user -> (distance, assignment)
        let mut closest = BTreeMap::new();
        for assignment in &assignments {
            let Some(distance) = chain.iter().position(|p| p == &assignment.project_id) else {
                continue;
            };
            closest
                .entry(assignment.user_id.clone())
                .and_modify(|current: &mut (usize, _)| {
                    if distance < current.0 {
                        *current = (distance, assignment);
                    }
                })
                .or_insert((distance, assignment));
        }

        let mut roles: BTreeMap<String, Option<Role>> = BTreeMap::new();
        let mut grants = Vec::new();
        for (user_id, (_, assignment)) in closest {
            let role_key = assignment.role_id.to_string();
            if !roles.contains_key(&role_key) {
                let role = self.storage.get_role(&assignment.role_id)?;
                roles.insert(role_key.clone(), role);
            }
            let Some(Some(role)) = roles.get(&role_key) else {
                continue;
            };

            grants.push(RoleGrant {
                user_id,
                privileges: Self::privileges_from_role(role, entity.kind),
                source: PrivilegeSource::Role {
                    project_id: assignment.project_id.to_string(),
                    role_id: role_key,
                },
            });
        }

        Ok(grants)
    }

    /// `add_<kind>` on the project chain, or the group default grant when
    /// there is no project.
    pub fn can_create(&self, user: &User, kind: EntityKind, project_id: Option<&ProjectId>) -> Result<bool> {
        match project_id {
            Some(project_id) => Ok(self
                .closest_role(&user.id, project_id)?
                .map(|(_, role)| role.has_permission(&codename("add", kind)))
                .unwrap_or(false)),
            None => self
                .storage
                .groups_have_permission(&user.groups, &without_project_codename(kind)),
        }
    }

    /// Set-based form: predicate over `v` selecting rows whose project's
    /// closest assignment for `user_id` grants `field`.
    pub fn granted_filter(&self, user_id: &UserId, kind: EntityKind, field: Tier) -> SqlFilter {
        let codenames = Self::codenames_for(field, kind);
        fragments::in_projects(fragments::role_granted_projects(user_id, &codenames))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_foundation::{NewEntity, PrivilegeValue};

    fn setup() -> (Arc<Storage>, ProjectRoleResolver) {
        let storage = Arc::new(Storage::in_memory().expect("Failed to create storage"));
        let resolver = ProjectRoleResolver::new(storage.clone());
        (storage, resolver)
    }

    #[test]
    fn test_codenames_for_tier() {
        assert_eq!(
            ProjectRoleResolver::codenames_for(Tier::Trash, EntityKind::Task),
            vec!["trash_task".to_string(), "restore_task".to_string()]
        );
        assert_eq!(
            ProjectRoleResolver::codenames_for(Tier::Edit, EntityKind::LabBook)[0],
            "change_labbook"
        );
        assert!(ProjectRoleResolver::codenames_for(Tier::FullAccess, EntityKind::Task).is_empty());
    }

    #[test]
    fn test_privileges_from_role() {
        let (storage, _) = setup();
        let role = storage.create_role("Editor", &["change_task", "view_note"]).unwrap();

        let task = ProjectRoleResolver::privileges_from_role(&role, EntityKind::Task);
        assert_eq!(task.view, PrivilegeValue::Allow);
        assert_eq!(task.edit, PrivilegeValue::Allow);
        assert_eq!(task.trash, PrivilegeValue::Neutral);
        assert_eq!(task.full_access, PrivilegeValue::Neutral);

        let meeting = ProjectRoleResolver::privileges_from_role(&role, EntityKind::Meeting);
        assert!(meeting.is_neutral());
    }

    #[test]
    fn test_closest_assignment_wins() {
        let (storage, resolver) = setup();
        let root = storage.create_project("root", None).unwrap();
        let child = storage.create_project("child", Some(&root.id)).unwrap();
        let leaf = storage.create_project("leaf", Some(&child.id)).unwrap();

        let manager = storage.create_role("Manager", &["view_task", "change_task"]).unwrap();
        let observer = storage.create_role("Observer", &["view_task"]).unwrap();
        let user = storage.create_user("carol", false).unwrap();

        storage.assign_role(&user.id, &root.id, &manager.id).unwrap();
        storage.assign_role(&user.id, &child.id, &observer.id).unwrap();

        let task = storage
            .insert_entity_with_owner(
                &NewEntity::new(EntityKind::Task, "t").in_project(leaf.id.clone()),
                &UserId::new("owner"),
            )
            .unwrap();

        let grant = resolver.grant_for_user(&user.id, &task).unwrap().unwrap();
        assert!(grant.privileges.effective(Tier::View));
        assert!(!grant.privileges.effective(Tier::Edit));
        assert_eq!(
            grant.source,
            PrivilegeSource::Role {
                project_id: child.id.to_string(),
                role_id: observer.id.to_string(),
            }
        );

        let all = resolver.grants_for_entity(&task).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].privileges, grant.privileges);
    }

    #[test]
    fn test_entity_without_project_has_no_role_grant() {
        let (storage, resolver) = setup();
        let user = storage.create_user("dave", false).unwrap();
        let note = storage
            .insert_entity_with_owner(&NewEntity::new(EntityKind::Note, "n"), &user.id)
            .unwrap();

        assert!(resolver.grant_for_user(&user.id, &note).unwrap().is_none());
        assert!(resolver.grants_for_entity(&note).unwrap().is_empty());
    }

    #[test]
    fn test_can_create() {
        let (storage, resolver) = setup();
        let project = storage.create_project("p", None).unwrap();
        let member = storage.create_role("Member", &["add_task", "view_task"]).unwrap();
        let user = storage.create_user("erin", false).unwrap();
        storage.assign_role(&user.id, &project.id, &member.id).unwrap();

        assert!(resolver.can_create(&user, EntityKind::Task, Some(&project.id)).unwrap());
        assert!(!resolver.can_create(&user, EntityKind::Note, Some(&project.id)).unwrap());
        assert!(!resolver.can_create(&user, EntityKind::Task, None).unwrap());

        storage.add_group_permission("User", "add_task_without_project").unwrap();
        let user = user.with_groups(vec!["User".to_string()]);
        assert!(resolver.can_create(&user, EntityKind::Task, None).unwrap());
    }
}
