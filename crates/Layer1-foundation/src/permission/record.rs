//! PrivilegeRecord (저장된 ACL 행) 및 병합 결과 타입

use super::algebra::{Privileges, Tier};
use crate::core::UserId;
use crate::entity::EntityRef;
use serde::{Deserialize, Serialize};

/// Persisted grant/deny for one (user, entity) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivilegeRecord {
    pub user_id: UserId,
    pub entity: EntityRef,
    pub privileges: Privileges,
}

impl PrivilegeRecord {
    pub fn new(user_id: UserId, entity: EntityRef, privileges: Privileges) -> Self {
        Self {
            user_id,
            entity,
            privileges,
        }
    }

    /// Owner grant issued on entity creation.
    pub fn owner(user_id: UserId, entity: EntityRef) -> Self {
        Self::new(user_id, entity, Privileges::full_access())
    }

    /// Same record with the propagation rules applied.
    pub fn normalized(mut self) -> Self {
        self.privileges.normalize();
        self
    }

    pub fn has_full_access(&self) -> bool {
        self.privileges.effective(Tier::FullAccess)
    }
}

/// Where a resolved privilege entry got its values from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrivilegeSource {
    /// Project role assignment on the entity's project chain
    Role { project_id: String, role_id: String },
    /// Direct PrivilegeRecord
    Direct,
    /// Context provider (containment)
    Context { provider: String },
}

/// Merged privileges of one user for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPrivilege {
    pub user_id: UserId,
    pub privileges: Privileges,
    /// True once any context provider wrote into this entry.
    pub is_context_permission: bool,
    pub sources: Vec<PrivilegeSource>,
}

impl ResolvedPrivilege {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            privileges: Privileges::neutral(),
            is_context_permission: false,
            sources: Vec::new(),
        }
    }

    /// Overlay one source's contribution (normalized first), last writer wins.
    pub fn apply(&mut self, contribution: &Privileges, source: PrivilegeSource) {
        let contribution = contribution.normalized();
        if contribution.is_neutral() {
            return;
        }
        self.privileges.overlay(&contribution);
        if matches!(source, PrivilegeSource::Context { .. }) {
            self.is_context_permission = true;
        }
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }
    }

    pub fn effective(&self, tier: Tier) -> bool {
        self.privileges.effective(tier)
    }

    pub fn finalize(mut self) -> Self {
        self.privileges.normalize();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;
    use crate::permission::PrivilegeValue;

    #[test]
    fn test_owner_record_has_full_access() {
        let record = PrivilegeRecord::owner(
            UserId::new("u1"),
            EntityRef::new(EntityKind::Task, "t1"),
        );
        assert!(record.has_full_access());
        assert_eq!(record.privileges.restore, PrivilegeValue::Allow);
    }

    #[test]
    fn test_apply_tracks_sources_and_context_flag() {
        let mut resolved = ResolvedPrivilege::new(UserId::new("u1"));
        resolved.apply(&Privileges::neutral().allow(Tier::View), PrivilegeSource::Direct);
        assert!(!resolved.is_context_permission);

        resolved.apply(
            &Privileges::neutral().allow(Tier::Edit),
            PrivilegeSource::Context {
                provider: "labbook".to_string(),
            },
        );
        assert!(resolved.is_context_permission);
        assert!(resolved.effective(Tier::Edit));
        assert_eq!(resolved.sources.len(), 2);

        // neutral contributions leave no trace
        resolved.apply(&Privileges::neutral(), PrivilegeSource::Direct);
        assert_eq!(resolved.sources.len(), 2);
    }

    #[test]
    fn test_apply_normalizes_each_contribution() {
        let mut resolved = ResolvedPrivilege::new(UserId::new("u1"));
        resolved.apply(&Privileges::neutral().allow(Tier::Restore), PrivilegeSource::Direct);
        resolved.apply(&Privileges::neutral().deny(Tier::View), PrivilegeSource::Direct);

        let finalized = resolved.finalize();
        for tier in Tier::all() {
            assert!(!finalized.effective(tier), "tier {}", tier);
        }
    }
}
