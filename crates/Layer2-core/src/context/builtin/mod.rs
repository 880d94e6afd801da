//! Builtin Context Providers - 내장 provider
//!
//! 컨테이너에서 VIEW / EDIT 권한을 가진 사용자에게 같은 권한을 내용물에
//! 부여합니다. TRASH, RESTORE, full access는 상속되지 않습니다.
//!
//! ## Provider 목록
//!
//! ### LabBook
//! - `labbook_element` - Note, File, Picture ← LabBook
//!
//! ### Kanban
//! - `kanban_column` - KanbanColumn ← KanbanBoard
//! - `kanban_task` - Task ← KanbanColumn
//!
//! ### Drive
//! - `directory` - Directory ← Directory | Drive (재귀, SQL은 recursive CTE)
//! - `directory_file` - File ← Directory

pub mod drive;
pub mod kanban;
pub mod labbook;

pub use drive::{DirectoryFileProvider, DirectoryProvider};
pub use kanban::{KanbanColumnProvider, KanbanTaskProvider};
pub use labbook::LabBookElementProvider;

use std::sync::Arc;

use warden_foundation::{
    fragments, Entity, EntityKind, PrivilegeSource, Privileges, Result, Tier, User,
};

use super::registry::ContextProviderRegistry;
use super::traits::{ContextFilter, ContextProvider};
use crate::engine::{PrivilegeMap, ResolveContext};

/// Tiers a container passes on to its contents.
pub const INHERITED_TIERS: [Tier; 2] = [Tier::View, Tier::Edit];

/// 모든 builtin provider 등록
pub fn register_all(registry: &mut ContextProviderRegistry) {
    // LabBook
    registry.register(
        LabBookElementProvider::KINDS,
        Arc::new(LabBookElementProvider),
        10,
    );

    // Kanban
    registry.register(&[EntityKind::KanbanColumn], Arc::new(KanbanColumnProvider), 10);
    registry.register(&[EntityKind::Task], Arc::new(KanbanTaskProvider), 20);

    // Drive
    registry.register(&[EntityKind::Directory], Arc::new(DirectoryProvider), 10);
    registry.register(&[EntityKind::File], Arc::new(DirectoryFileProvider), 20);
}

/// Contribution derived from the container's privileges for one user.
fn inherited(container_privileges: &Privileges) -> Privileges {
    INHERITED_TIERS
        .into_iter()
        .filter(|tier| container_privileges.effective(*tier))
        .fold(Privileges::neutral(), |acc, tier| acc.allow(tier))
}

/// Copy VIEW / EDIT from `target`'s container when its kind is one of
/// `container_kinds`.
pub(crate) fn inherit_from_container(
    provider: &dyn ContextProvider,
    ctx: &ResolveContext<'_>,
    target: &Entity,
    container_kinds: &[EntityKind],
    acc: &mut PrivilegeMap,
) -> Result<()> {
    let Some(container) = target.container.as_ref() else {
        return Ok(());
    };
    if !container_kinds.contains(&container.kind) {
        return Ok(());
    }

    let resolved = ctx.resolve_container(container, acc.scope().clone())?;
    for entry in resolved.entries() {
        acc.apply(
            &entry.user_id,
            &inherited(&entry.privileges),
            PrivilegeSource::Context {
                provider: provider.name().to_string(),
            },
        );
    }
    Ok(())
}

/// Set-based counterpart of [`inherit_from_container`] for one container kind.
pub(crate) fn container_filter(
    ctx: &ResolveContext<'_>,
    user: &User,
    field: Tier,
    container_kind: EntityKind,
) -> Result<Option<ContextFilter>> {
    if !INHERITED_TIERS.contains(&field) {
        return Ok(None);
    }

    let next = ctx.descend()?;
    let containers = next.visible_ids(user, container_kind, field)?;
    Ok(Some(ContextFilter::Allow(fragments::in_containers(
        container_kind,
        containers,
    ))))
}
