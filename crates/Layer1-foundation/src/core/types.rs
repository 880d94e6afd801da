//! Core Types - 공용 타입 정의
//!
//! 모든 레이어에서 공통으로 사용하는 식별자와 사용자/프로젝트/역할 타입

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers - 식별자
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// 새 UUID v4 식별자 생성
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// 사용자 ID
    UserId
);
string_id!(
    /// 프로젝트 ID
    ProjectId
);
string_id!(
    /// 역할 ID
    RoleId
);
string_id!(
    /// 엔티티 인스턴스 ID
    EntityId
);

// ============================================================================
// User - 인증 계층에서 전달되는 사용자
// ============================================================================

/// Authenticated principal as handed over by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    anonymous: bool,
}

fn default_true() -> bool {
    true
}

impl User {
    pub fn new(id: impl Into<UserId>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            is_superuser: false,
            is_active: true,
            groups: Vec::new(),
            anonymous: false,
        }
    }

    /// 익명 사용자 (어떤 권한도 부여되지 않음)
    pub fn anonymous() -> Self {
        Self {
            id: UserId::new(""),
            username: "anonymous".to_string(),
            is_superuser: false,
            is_active: false,
            groups: Vec::new(),
            anonymous: true,
        }
    }

    pub fn superuser(mut self) -> Self {
        self.is_superuser = true;
        self
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    /// Superuser bypass applies only to active, identified users.
    pub fn is_effective_superuser(&self) -> bool {
        self.is_superuser && self.is_authenticated()
    }

    /// 익명이 아니고 활성화된 사용자
    pub fn is_authenticated(&self) -> bool {
        !self.anonymous && self.is_active
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.anonymous {
            f.write_str("anonymous")
        } else {
            write!(f, "{} ({})", self.username, self.id)
        }
    }
}

// ============================================================================
// Project / Role - 프로젝트 계층과 역할
// ============================================================================

/// A node of the project tree.
///
/// `path` is the materialized ancestor path `/<root>/.../<self>/`, which keeps
/// ancestor lookups to a single row read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub parent_id: Option<ProjectId>,
    pub path: String,
}

impl Project {
    /// Ancestor chain, closest first (self, parent, ..., root).
    pub fn ancestor_chain(&self) -> Vec<ProjectId> {
        let mut chain: Vec<ProjectId> = self
            .path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(ProjectId::from)
            .collect();
        chain.reverse();
        chain
    }

    pub fn depth(&self) -> usize {
        self.path.split('/').filter(|s| !s.is_empty()).count()
    }
}

/// Named bundle of coarse `<action>_<kind>` permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub permissions: Vec<String>,
}

impl Role {
    pub fn has_permission(&self, codename: &str) -> bool {
        self.permissions.iter().any(|p| p == codename)
    }
}

/// (user, project, role) binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    pub user_id: UserId,
    pub project_id: ProjectId,
    pub role_id: RoleId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ancestor_chain_closest_first() {
        let project = Project {
            id: ProjectId::new("c"),
            name: "child".to_string(),
            parent_id: Some(ProjectId::new("b")),
            path: "/a/b/c/".to_string(),
        };

        let chain = project.ancestor_chain();
        assert_eq!(
            chain,
            vec![ProjectId::new("c"), ProjectId::new("b"), ProjectId::new("a")]
        );
        assert_eq!(project.depth(), 3);
    }

    #[test]
    fn test_anonymous_is_never_superuser() {
        let mut anon = User::anonymous();
        anon.is_superuser = true;
        assert!(!anon.is_effective_superuser());
        assert!(!anon.is_authenticated());

        let admin = User::new("u1", "admin").superuser();
        assert!(admin.is_effective_superuser());
    }

    #[test]
    fn test_inactive_user_not_authenticated() {
        let mut user = User::new("u1", "alice").superuser();
        user.is_active = false;
        assert!(!user.is_authenticated());
        assert!(!user.is_effective_superuser());
    }
}
