//! Privilege Resolution Engine
//!
//! 한 엔티티(point check) 또는 한 컬렉션(SQL 필터)에 대해 세 가지 권한
//! 출처를 병합합니다.
//!
//! ## 병합 순서 (last writer wins)
//!
//! 1. 프로젝트 역할에서 유도된 레코드
//! 2. 직접 PrivilegeRecord
//! 3. Context provider (execution order 오름차순)
//!
//! 각 출처의 기여는 먼저 정규화되고, 뒤의 출처가 명시적으로 설정한 필드는
//! ALLOW든 DENY든 앞의 값을 덮어씁니다. 정규화된 기여들을 덮어쓴 결과는
//! 다시 정규화된 상태이므로, 필드별 "마지막 writer" 규칙이 그대로 SQL로
//! 옮겨집니다:
//!
//! ```text
//! field(F)   = fold over sources: expr = (expr AND NOT deny_F) OR allow_F
//! visible(T) = field(FULL_ACCESS) OR field(T)
//! ```
//!
//! Directory, KanbanColumn 같은 구조적 종류는 자체 레코드나 역할 권한이
//! 없고 provider만 기여합니다.

mod resolve;

pub use resolve::{PrivilegeMap, ResolveContext, Scope};

use std::sync::Arc;

use tracing::debug;
use warden_foundation::{
    fragments, EngineConfig, Entity, EntityKind, EntityQuery, EntityRef, Error, PrivilegeSource,
    PrivilegeRecord, PrivilegeValue, Privileges, ProjectId, ResolvedPrivilege, Result, SqlFilter,
    Storage, Tier, User,
};
use warden_foundation::config::DEFAULT_MAX_CONTAINMENT_DEPTH;

use crate::context::{ContextFilter, ContextProviderRegistry};
use crate::role::{ProjectRoleResolver, RoleGrant};

/// Privilege resolution engine.
///
/// Stateless per request; cheap to share behind an `Arc`.
pub struct PrivilegeEngine {
    storage: Arc<Storage>,
    registry: Arc<ContextProviderRegistry>,
    roles: ProjectRoleResolver,
    max_containment_depth: usize,
}

impl PrivilegeEngine {
    pub fn new(storage: Arc<Storage>, registry: Arc<ContextProviderRegistry>) -> Self {
        Self {
            roles: ProjectRoleResolver::new(storage.clone()),
            storage,
            registry,
            max_containment_depth: DEFAULT_MAX_CONTAINMENT_DEPTH,
        }
    }

    pub fn with_config(
        storage: Arc<Storage>,
        registry: Arc<ContextProviderRegistry>,
        config: &EngineConfig,
    ) -> Self {
        Self::new(storage, registry).with_max_containment_depth(config.max_containment_depth)
    }

    pub fn with_max_containment_depth(mut self, depth: usize) -> Self {
        self.max_containment_depth = depth.max(1);
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn registry(&self) -> &Arc<ContextProviderRegistry> {
        &self.registry
    }

    pub fn roles(&self) -> &ProjectRoleResolver {
        &self.roles
    }

    pub fn max_containment_depth(&self) -> usize {
        self.max_containment_depth
    }

    // ========================================================================
    // Point checks
    // ========================================================================

    /// Does `user` hold `tier` on `entity`?
    pub fn is_allowed(&self, user: &User, entity: &EntityRef, tier: Tier) -> Result<bool> {
        if user.is_effective_superuser() {
            return Ok(true);
        }
        if !user.is_authenticated() {
            return Ok(false);
        }

        let target = self.load(entity)?;
        let resolved = self.resolve_entity(
            &ResolveContext::root(self),
            &target,
            Scope::User(user.id.clone()),
        )?;

        let allowed = resolved.effective(&user.id, tier);
        debug!("{} {} {} -> {}", user, tier, entity, allowed);
        Ok(allowed)
    }

    /// `NotAuthorized` unless `user` holds `tier` on `entity`.
    pub fn require(&self, user: &User, entity: &EntityRef, tier: Tier) -> Result<()> {
        if self.is_allowed(user, entity, tier)? {
            Ok(())
        } else {
            Err(Error::not_authorized(user, format!("{} on {}", tier, entity)))
        }
    }

    /// Merged privileges of one user on an entity.
    pub fn resolve_for_user(&self, user: &User, entity: &EntityRef) -> Result<ResolvedPrivilege> {
        if user.is_effective_superuser() {
            let mut resolved = ResolvedPrivilege::new(user.id.clone());
            resolved.privileges = Privileges::full_access();
            return Ok(resolved);
        }
        if !user.is_authenticated() {
            return Ok(ResolvedPrivilege::new(user.id.clone()));
        }

        let target = self.load(entity)?;
        let resolved = self.resolve_entity(
            &ResolveContext::root(self),
            &target,
            Scope::User(user.id.clone()),
        )?;

        Ok(resolved
            .into_resolved()
            .into_iter()
            .next()
            .unwrap_or_else(|| ResolvedPrivilege::new(user.id.clone())))
    }

    /// Merged privileges of every user with any contribution on an entity.
    pub fn privileges_for(&self, entity: &EntityRef) -> Result<Vec<ResolvedPrivilege>> {
        let target = self.load(entity)?;
        let resolved = self.resolve_entity(&ResolveContext::root(self), &target, Scope::All)?;
        Ok(resolved.into_resolved())
    }

    fn load(&self, entity: &EntityRef) -> Result<Entity> {
        self.storage
            .get_entity(entity)?
            .ok_or_else(|| Error::NotFound(entity.to_string()))
    }

    /// Merge role, direct and context contributions for `entity`.
    pub(crate) fn resolve_entity(
        &self,
        ctx: &ResolveContext<'_>,
        entity: &Entity,
        scope: Scope,
    ) -> Result<PrivilegeMap> {
        let mut acc = PrivilegeMap::new(scope);
        let reference = entity.reference();

        if entity.kind.is_protected() {
            // 1. project roles
            let role_grants: Vec<RoleGrant> = match acc.scope().user() {
                Some(user_id) => self.roles.grant_for_user(user_id, entity)?.into_iter().collect(),
                None => self.roles.grants_for_entity(entity)?,
            };
            for grant in role_grants {
                acc.apply(&grant.user_id, &grant.privileges, grant.source);
            }

            // 2. direct records
            let records: Vec<PrivilegeRecord> = match acc.scope().user() {
                Some(user_id) => self
                    .storage
                    .get_privilege(user_id, &reference)?
                    .into_iter()
                    .collect(),
                None => self.storage.privileges_for_entity(&reference)?,
            };
            for record in records {
                acc.apply(&record.user_id, &record.privileges, PrivilegeSource::Direct);
            }
        }

        // 3. context providers
        for registered in self.registry.providers_for(entity.kind) {
            match registered.provider.get_privileges(ctx, entity, &mut acc) {
                Ok(()) => {}
                Err(Error::ContainerUnresolvable(reason)) => {
                    debug!(
                        "Provider {} skipped for {}: {}",
                        registered.name(),
                        reference,
                        reason
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(acc)
    }

    // ========================================================================
    // Set-based checks
    // ========================================================================

    /// Restrict `query` to the rows on which `user` holds `tier`.
    ///
    /// Builds one SQL predicate; never evaluates rows one by one.
    pub fn filter_visible(&self, user: &User, tier: Tier, query: EntityQuery) -> Result<EntityQuery> {
        if user.is_effective_superuser() {
            return Ok(query);
        }
        if !user.is_authenticated() {
            return Ok(query.filter(SqlFilter::never()));
        }

        let ctx = ResolveContext::root(self);
        let visible = ctx.visible_ids(user, query.kind(), tier)?;
        Ok(query.filter(SqlFilter::in_subquery("e.id", visible)))
    }

    pub fn viewable(&self, user: &User, kind: EntityKind) -> Result<EntityQuery> {
        self.filter_visible(user, Tier::View, EntityQuery::new(kind))
    }

    pub fn editable(&self, user: &User, kind: EntityKind) -> Result<EntityQuery> {
        self.filter_visible(user, Tier::Edit, EntityQuery::new(kind))
    }

    pub fn trashable(&self, user: &User, kind: EntityKind) -> Result<EntityQuery> {
        self.filter_visible(user, Tier::Trash, EntityQuery::new(kind))
    }

    pub fn restorable(&self, user: &User, kind: EntityKind) -> Result<EntityQuery> {
        self.filter_visible(user, Tier::Restore, EntityQuery::new(kind))
    }

    /// Predicate over `v`: effective `tier` of `user` on `kind` rows.
    pub(crate) fn visible_predicate(
        &self,
        ctx: &ResolveContext<'_>,
        user: &User,
        kind: EntityKind,
        tier: Tier,
    ) -> Result<SqlFilter> {
        let full_access = self.field_predicate(ctx, user, kind, Tier::FullAccess)?;
        if tier == Tier::FullAccess {
            return Ok(full_access);
        }
        Ok(full_access.or(self.field_predicate(ctx, user, kind, tier)?))
    }

    /// Predicate over `v`: the last writer of `field` wrote ALLOW.
    fn field_predicate(
        &self,
        ctx: &ResolveContext<'_>,
        user: &User,
        kind: EntityKind,
        field: Tier,
    ) -> Result<SqlFilter> {
        let mut expr = SqlFilter::never();

        if kind.is_protected() {
            // 1. project roles (ALLOW only)
            expr = expr.or(self.roles.granted_filter(&user.id, kind, field));

            // 2. direct records
            let deny = fragments::direct_privilege(&user.id, kind, field, PrivilegeValue::Deny);
            let allow = fragments::direct_privilege(&user.id, kind, field, PrivilegeValue::Allow);
            expr = expr.and(deny.not()).or(allow);
        }

        // 3. context providers
        for registered in self.registry.providers_for(kind) {
            match registered.provider.visible_filter(ctx, user, field) {
                Ok(Some(ContextFilter::Allow(allow))) => expr = expr.or(allow),
                Ok(Some(ContextFilter::Deny(deny))) => expr = expr.and(deny.not()),
                Ok(None) => {}
                Err(Error::ContainerUnresolvable(reason)) => {
                    debug!(
                        "Provider {} contributes no {} filter for {}: {}",
                        registered.name(),
                        field,
                        kind,
                        reason
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(expr)
    }

    // ========================================================================
    // Creation / deletion guards
    // ========================================================================

    /// Creating inside `container` requires EDIT on it.
    pub fn create_guard(&self, user: &User, container: Option<&EntityRef>) -> Result<bool> {
        match container {
            Some(container) => self.is_allowed(user, container, Tier::Edit),
            None => Ok(user.is_authenticated()),
        }
    }

    /// `add_<kind>` role permission on the project chain, or the group
    /// default grant when there is no project.
    pub fn can_create(&self, user: &User, kind: EntityKind, project_id: Option<&ProjectId>) -> Result<bool> {
        if user.is_effective_superuser() {
            return Ok(true);
        }
        if !user.is_authenticated() {
            return Ok(false);
        }
        self.roles.can_create(user, kind, project_id)
    }

    /// Permanent deletion is reserved to superusers, independent of any
    /// privilege record.
    pub fn hard_delete_guard(&self, user: &User) -> bool {
        user.is_effective_superuser()
    }
}
