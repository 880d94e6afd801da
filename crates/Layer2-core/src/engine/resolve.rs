//! Resolution state shared between the engine and context providers
//!
//! - `Scope`: 한 사용자만 계산할지, 엔티티의 모든 사용자를 계산할지
//! - `PrivilegeMap`: 사용자별 병합 결과 (provider가 누적 기록)
//! - `ResolveContext`: 컨테이너 재귀 깊이 추적

use std::collections::BTreeMap;

use tracing::debug;
use warden_foundation::{
    fragments, EntityKind, EntityRef, Error, PrivilegeSource, Privileges, ResolvedPrivilege,
    Result, SqlFilter, Tier, User, UserId,
};

use super::PrivilegeEngine;

// ============================================================================
// Scope
// ============================================================================

/// Which users a resolution computes entries for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Point checks: only this user
    User(UserId),
    /// Listings: every user with any contribution
    All,
}

impl Scope {
    pub fn includes(&self, user_id: &UserId) -> bool {
        match self {
            Self::User(scoped) => scoped == user_id,
            Self::All => true,
        }
    }

    pub fn user(&self) -> Option<&UserId> {
        match self {
            Self::User(user_id) => Some(user_id),
            Self::All => None,
        }
    }
}

// ============================================================================
// PrivilegeMap
// ============================================================================

/// Per-user accumulator of one entity's resolution.
#[derive(Debug, Clone)]
pub struct PrivilegeMap {
    scope: Scope,
    entries: BTreeMap<UserId, ResolvedPrivilege>,
}

impl PrivilegeMap {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            entries: BTreeMap::new(),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Overlay a contribution for `user_id`. Users outside the scope are
    /// ignored, so providers can write unconditionally.
    pub fn apply(&mut self, user_id: &UserId, contribution: &Privileges, source: PrivilegeSource) {
        if !self.scope.includes(user_id) || contribution.is_neutral() {
            return;
        }
        self.entries
            .entry(user_id.clone())
            .or_insert_with(|| ResolvedPrivilege::new(user_id.clone()))
            .apply(contribution, source);
    }

    pub fn get(&self, user_id: &UserId) -> Option<&ResolvedPrivilege> {
        self.entries.get(user_id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ResolvedPrivilege> {
        self.entries.values()
    }

    /// `effective(tier)` for a user, false without any entry.
    pub fn effective(&self, user_id: &UserId, tier: Tier) -> bool {
        self.get(user_id)
            .map(|entry| entry.effective(tier))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finalized entries ordered by user id.
    pub fn into_resolved(self) -> Vec<ResolvedPrivilege> {
        self.entries
            .into_values()
            .map(ResolvedPrivilege::finalize)
            .collect()
    }
}

// ============================================================================
// ResolveContext
// ============================================================================

/// Engine handle plus the current containment depth.
///
/// Every step from an entity to its container goes through [`descend`],
/// which fails with `ContainerUnresolvable` past the configured maximum.
/// That bound also ends containment cycles.
///
/// [`descend`]: ResolveContext::descend
#[derive(Clone, Copy)]
pub struct ResolveContext<'a> {
    engine: &'a PrivilegeEngine,
    depth: usize,
}

impl<'a> ResolveContext<'a> {
    pub(crate) fn root(engine: &'a PrivilegeEngine) -> Self {
        Self { engine, depth: 0 }
    }

    pub fn engine(&self) -> &'a PrivilegeEngine {
        self.engine
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Levels still available below this one.
    pub fn remaining_depth(&self) -> usize {
        self.engine.max_containment_depth().saturating_sub(self.depth)
    }

    /// Context one containment level further out.
    pub fn descend(&self) -> Result<Self> {
        let next = self.depth + 1;
        if next > self.engine.max_containment_depth() {
            return Err(Error::ContainerUnresolvable(format!(
                "containment depth limit {} exceeded",
                self.engine.max_containment_depth()
            )));
        }
        Ok(Self {
            engine: self.engine,
            depth: next,
        })
    }

    /// Resolve the privileges on a container, one level further out.
    pub fn resolve_container(&self, container: &EntityRef, scope: Scope) -> Result<PrivilegeMap> {
        let next = self.descend()?;
        let entity = self
            .engine
            .storage()
            .get_entity(container)?
            .ok_or_else(|| Error::ContainerUnresolvable(format!("{} does not exist", container)))?;

        debug!("Resolving container {} at depth {}", container, next.depth);
        self.engine.resolve_entity(&next, &entity, scope)
    }

    /// Subquery selecting the ids of `kind` rows on which `user` holds
    /// `tier`, evaluated at this context's depth.
    pub fn visible_ids(&self, user: &User, kind: EntityKind, tier: Tier) -> Result<SqlFilter> {
        let predicate = self.engine.visible_predicate(self, user, kind, tier)?;
        Ok(fragments::visible_ids(kind, predicate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_filters_entries() {
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        let mut map = PrivilegeMap::new(Scope::User(alice.clone()));

        map.apply(&alice, &Privileges::neutral().allow(Tier::View), PrivilegeSource::Direct);
        map.apply(&bob, &Privileges::full_access(), PrivilegeSource::Direct);

        assert_eq!(map.len(), 1);
        assert!(map.effective(&alice, Tier::View));
        assert!(!map.effective(&bob, Tier::View));
    }

    #[test]
    fn test_neutral_contribution_creates_no_entry() {
        let mut map = PrivilegeMap::new(Scope::All);
        map.apply(&UserId::new("u"), &Privileges::neutral(), PrivilegeSource::Direct);
        assert!(map.is_empty());
    }

    #[test]
    fn test_into_resolved_is_ordered_and_finalized() {
        let mut map = PrivilegeMap::new(Scope::All);
        map.apply(&UserId::new("b"), &Privileges::neutral().allow(Tier::Trash), PrivilegeSource::Direct);
        map.apply(&UserId::new("a"), &Privileges::full_access(), PrivilegeSource::Direct);

        let resolved = map.into_resolved();
        assert_eq!(resolved[0].user_id, UserId::new("a"));
        assert_eq!(resolved[1].privileges.granted_tiers(), vec![Tier::View, Tier::Edit, Tier::Trash]);
    }
}
