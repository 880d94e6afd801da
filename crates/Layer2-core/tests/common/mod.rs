//! 통합 테스트 공용 fixture

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use warden_core::{ContextProviderRegistry, EntityProtection, PrivilegeEngine};
use warden_foundation::{
    Entity, EntityId, EntityKind, EntityQuery, NewEntity, PrivilegeRecord, Privileges, Project,
    ProjectId, Role, Storage, Tier, User,
};

/// In-memory lab: storage, engine and protection facade.
pub struct Lab {
    pub storage: Arc<Storage>,
    pub engine: Arc<PrivilegeEngine>,
    pub protection: EntityProtection,
}

impl Lab {
    pub fn new() -> Self {
        Self::with_registry(ContextProviderRegistry::with_builtins(), 16)
    }

    pub fn with_registry(registry: ContextProviderRegistry, max_depth: usize) -> Self {
        let storage = Arc::new(Storage::in_memory().expect("Failed to create storage"));
        let engine = Arc::new(
            PrivilegeEngine::new(storage.clone(), Arc::new(registry))
                .with_max_containment_depth(max_depth),
        );
        let protection = EntityProtection::new(engine.clone());
        Self {
            storage,
            engine,
            protection,
        }
    }

    /// Same storage, different provider set.
    pub fn with_providers(self, registry: ContextProviderRegistry) -> Self {
        let engine = Arc::new(
            PrivilegeEngine::new(self.storage.clone(), Arc::new(registry))
                .with_max_containment_depth(self.engine.max_containment_depth()),
        );
        let protection = EntityProtection::new(engine.clone());
        Self {
            storage: self.storage,
            engine,
            protection,
        }
    }

    pub fn user(&self, name: &str) -> User {
        let created = self.storage.create_user(name, false).unwrap();
        self.storage.get_user(&created.id).unwrap().unwrap()
    }

    pub fn project(&self, name: &str, parent: Option<&Project>) -> Project {
        self.storage
            .create_project(name, parent.map(|p| &p.id))
            .unwrap()
    }

    pub fn role(&self, name: &str, permissions: &[&str]) -> Role {
        self.storage.create_role(name, permissions).unwrap()
    }

    pub fn assign(&self, user: &User, project: &Project, role: &Role) {
        self.storage.assign_role(&user.id, &project.id, &role.id).unwrap();
    }

    /// Insert directly (no guards); protected kinds get `owner` as holder.
    pub fn entity(&self, owner: &User, new_entity: NewEntity) -> Entity {
        if new_entity.kind.is_protected() {
            self.storage.insert_entity_with_owner(&new_entity, &owner.id).unwrap()
        } else {
            self.storage.insert_entity(&new_entity, &owner.id).unwrap()
        }
    }

    pub fn task_in(&self, owner: &User, title: &str, project: &ProjectId) -> Entity {
        self.entity(owner, NewEntity::new(EntityKind::Task, title).in_project(project.clone()))
    }

    pub fn contained(&self, owner: &User, kind: EntityKind, title: &str, container: &Entity) -> Entity {
        self.entity(owner, NewEntity::new(kind, title).in_container(container.reference()))
    }

    pub fn grant(&self, user: &User, entity: &Entity, privileges: Privileges) {
        self.storage
            .upsert_privilege(&PrivilegeRecord::new(
                user.id.clone(),
                entity.reference(),
                privileges,
            ))
            .unwrap();
    }

    pub fn allowed(&self, user: &User, entity: &Entity, tier: Tier) -> bool {
        self.engine.is_allowed(user, &entity.reference(), tier).unwrap()
    }

    /// Ids returned by the set-based filter.
    pub fn visible_ids(&self, user: &User, kind: EntityKind, tier: Tier) -> BTreeSet<EntityId> {
        let query = self
            .engine
            .filter_visible(user, tier, EntityQuery::new(kind))
            .unwrap();
        self.storage.query_entity_ids(&query).unwrap().into_iter().collect()
    }

    /// Ids for which the point check succeeds, row by row.
    pub fn allowed_ids(&self, user: &User, kind: EntityKind, tier: Tier) -> BTreeSet<EntityId> {
        self.storage
            .query_entities(&EntityQuery::new(kind))
            .unwrap()
            .into_iter()
            .filter(|entity| self.allowed(user, entity, tier))
            .map(|entity| entity.id)
            .collect()
    }

    /// Set-based and point checks agree for every kind and tier.
    pub fn assert_filter_matches_point_checks(&self, user: &User) {
        for kind in EntityKind::ALL {
            for tier in Tier::all() {
                assert_eq!(
                    self.visible_ids(user, kind, tier),
                    self.allowed_ids(user, kind, tier),
                    "{} {} {}",
                    user.username,
                    kind,
                    tier
                );
            }
        }
    }
}
