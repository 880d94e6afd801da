//! Entity Protection - 보호 엔티티의 lifecycle과 권한 관리
//!
//! 상태 머신: `active ⇄ trashed → (hard-deleted)`
//!
//! - 생성: 컨테이너 EDIT + `add_<kind>` (또는 그룹 기본 권한), 생성자에게
//!   full access 레코드가 같은 트랜잭션으로 부여됨
//! - 휴지통 / 복원: TRASH / RESTORE tier 필요
//! - 영구 삭제: superuser 전용, 휴지통 상태에서만
//! - 권한 부여 / 회수: full access 보유자만, 마지막 full access 보유자는 유지

use std::sync::Arc;

use tracing::info;
use warden_foundation::{
    Entity, EntityRef, EntityState, Error, NewEntity, PrivilegeRecord, ResolvedPrivilege, Result,
    Tier, User, UserId,
};

use crate::engine::PrivilegeEngine;

/// Guarded entity operations on top of the engine.
#[derive(Clone)]
pub struct EntityProtection {
    engine: Arc<PrivilegeEngine>,
}

impl EntityProtection {
    pub fn new(engine: Arc<PrivilegeEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<PrivilegeEngine> {
        &self.engine
    }

    fn load(&self, entity: &EntityRef) -> Result<Entity> {
        self.engine
            .storage()
            .get_entity(entity)?
            .ok_or_else(|| Error::NotFound(entity.to_string()))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create an entity; protected kinds get their creator as full-access owner.
    pub fn create(&self, user: &User, new_entity: NewEntity) -> Result<Entity> {
        if !user.is_authenticated() {
            return Err(Error::not_authorized(user, format!("create {}", new_entity.kind)));
        }
        new_entity.validate()?;

        if let Some(container) = &new_entity.container {
            let container_row = self.load(container)?;
            if container_row.is_trashed() {
                return Err(Error::InvalidState(format!(
                    "cannot create inside trashed {}",
                    container
                )));
            }
            if !self.engine.create_guard(user, Some(container))? {
                return Err(Error::not_authorized(user, format!("edit {}", container)));
            }
        }

        if let Some(project_id) = &new_entity.project_id {
            if self.engine.storage().get_project(project_id)?.is_none() {
                return Err(Error::NotFound(format!("project {}", project_id)));
            }
        }

        let storage = self.engine.storage();
        let created = if new_entity.kind.is_protected() {
            if !self
                .engine
                .can_create(user, new_entity.kind, new_entity.project_id.as_ref())?
            {
                return Err(Error::not_authorized(user, format!("add {}", new_entity.kind)));
            }
            storage.insert_entity_with_owner(&new_entity, &user.id)?
        } else {
            storage.insert_entity(&new_entity, &user.id)?
        };

        info!("{} created {}", user, created.reference());
        Ok(created)
    }

    /// active → trashed
    pub fn trash(&self, user: &User, entity: &EntityRef) -> Result<Entity> {
        let mut row = self.load(entity)?;
        self.engine.require(user, entity, Tier::Trash)?;
        if row.is_trashed() {
            return Err(Error::InvalidState(format!("{} is already trashed", entity)));
        }

        self.engine
            .storage()
            .set_entity_state(entity, EntityState::Trashed)?;
        row.state = EntityState::Trashed;
        info!("{} trashed {}", user, entity);
        Ok(row)
    }

    /// trashed → active
    pub fn restore(&self, user: &User, entity: &EntityRef) -> Result<Entity> {
        let mut row = self.load(entity)?;
        self.engine.require(user, entity, Tier::Restore)?;
        if !row.is_trashed() {
            return Err(Error::InvalidState(format!("{} is not trashed", entity)));
        }

        self.engine
            .storage()
            .set_entity_state(entity, EntityState::Active)?;
        row.state = EntityState::Active;
        info!("{} restored {}", user, entity);
        Ok(row)
    }

    /// trashed → gone, together with its privilege records
    pub fn hard_delete(&self, user: &User, entity: &EntityRef) -> Result<()> {
        if !self.engine.hard_delete_guard(user) {
            return Err(Error::HardDeleteRejected(format!(
                "{} may not permanently delete {}",
                user, entity
            )));
        }

        let row = self.load(entity)?;
        if !row.is_trashed() {
            return Err(Error::InvalidState(format!(
                "{} must be trashed before it is deleted",
                entity
            )));
        }

        self.engine.storage().delete_entity(entity)?;
        info!("{} permanently deleted {}", user, entity);
        Ok(())
    }

    // ========================================================================
    // Grant management
    // ========================================================================

    /// Create or replace a direct privilege record.
    pub fn grant(&self, actor: &User, record: PrivilegeRecord) -> Result<PrivilegeRecord> {
        self.guard_grant_management(actor, &record.entity)?;

        let stored = self
            .engine
            .storage()
            .upsert_privilege_keeping_holder(&record)?;
        info!(
            "{} granted {:?} on {} to {}",
            actor,
            stored.privileges.granted_tiers(),
            stored.entity,
            stored.user_id
        );
        Ok(stored)
    }

    /// Remove the direct record of `user_id`. Returns false if none existed.
    pub fn revoke(&self, actor: &User, user_id: &UserId, entity: &EntityRef) -> Result<bool> {
        self.guard_grant_management(actor, entity)?;

        let removed = self.engine.storage().delete_privilege(user_id, entity)?;
        if removed {
            info!("{} revoked privileges of {} on {}", actor, user_id, entity);
        }
        Ok(removed)
    }

    /// Resolved privileges of every user, visible to anyone who may view the entity.
    pub fn privileges(&self, actor: &User, entity: &EntityRef) -> Result<Vec<ResolvedPrivilege>> {
        self.engine.require(actor, entity, Tier::View)?;
        self.engine.privileges_for(entity)
    }

    fn guard_grant_management(&self, actor: &User, entity: &EntityRef) -> Result<()> {
        let row = self.load(entity)?;
        if !row.kind.is_protected() {
            return Err(Error::InvalidInput(format!(
                "{} carries no privileges of its own",
                row.kind
            )));
        }
        self.engine.require(actor, entity, Tier::FullAccess)
    }
}
