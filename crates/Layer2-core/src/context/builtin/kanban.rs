//! Kanban providers
//!
//! 보드 → 컬럼 → 태스크 순서로 VIEW / EDIT가 내려갑니다.
//! 컬럼은 자체 권한이 없으므로 태스크는 항상 보드까지 거슬러 올라갑니다.

use warden_foundation::{Entity, EntityKind, Result, Tier, User};

use super::{container_filter, inherit_from_container};
use crate::context::{ContextFilter, ContextProvider};
use crate::engine::{PrivilegeMap, ResolveContext};

/// KanbanColumn ← KanbanBoard
pub struct KanbanColumnProvider;

impl ContextProvider for KanbanColumnProvider {
    fn name(&self) -> &str {
        "kanban_column"
    }

    fn get_privileges(
        &self,
        ctx: &ResolveContext<'_>,
        target: &Entity,
        acc: &mut PrivilegeMap,
    ) -> Result<()> {
        inherit_from_container(self, ctx, target, &[EntityKind::KanbanBoard], acc)
    }

    fn visible_filter(
        &self,
        ctx: &ResolveContext<'_>,
        user: &User,
        field: Tier,
    ) -> Result<Option<ContextFilter>> {
        container_filter(ctx, user, field, EntityKind::KanbanBoard)
    }
}

/// Task ← KanbanColumn
pub struct KanbanTaskProvider;

impl ContextProvider for KanbanTaskProvider {
    fn name(&self) -> &str {
        "kanban_task"
    }

    fn get_privileges(
        &self,
        ctx: &ResolveContext<'_>,
        target: &Entity,
        acc: &mut PrivilegeMap,
    ) -> Result<()> {
        inherit_from_container(self, ctx, target, &[EntityKind::KanbanColumn], acc)
    }

    fn visible_filter(
        &self,
        ctx: &ResolveContext<'_>,
        user: &User,
        field: Tier,
    ) -> Result<Option<ContextFilter>> {
        container_filter(ctx, user, field, EntityKind::KanbanColumn)
    }
}
