//! Drive providers
//!
//! 디렉토리는 상위 디렉토리 또는 Drive에서 VIEW / EDIT를 상속하고,
//! 디렉토리 안의 File은 디렉토리에서 상속합니다.
//!
//! 디렉토리 트리는 임의 깊이로 중첩되므로 SQL 쪽은 Drive를 루트로 하는
//! recursive CTE 하나로 표현합니다. CTE 깊이는 남은 containment depth로
//! 제한되어 point check와 같은 결과를 냅니다.

use warden_foundation::{fragments, Entity, EntityKind, Result, Tier, User};

use super::{container_filter, inherit_from_container, INHERITED_TIERS};
use crate::context::{ContextFilter, ContextProvider};
use crate::engine::{PrivilegeMap, ResolveContext};

/// Directory ← Directory | Drive
pub struct DirectoryProvider;

impl ContextProvider for DirectoryProvider {
    fn name(&self) -> &str {
        "directory"
    }

    fn get_privileges(
        &self,
        ctx: &ResolveContext<'_>,
        target: &Entity,
        acc: &mut PrivilegeMap,
    ) -> Result<()> {
        inherit_from_container(
            self,
            ctx,
            target,
            &[EntityKind::Directory, EntityKind::Drive],
            acc,
        )
    }

    fn visible_filter(
        &self,
        ctx: &ResolveContext<'_>,
        user: &User,
        field: Tier,
    ) -> Result<Option<ContextFilter>> {
        if !INHERITED_TIERS.contains(&field) {
            return Ok(None);
        }

        // a directory `k` levels below its drive needs `k` more levels
        let next = ctx.descend()?;
        let drives = next.visible_ids(user, EntityKind::Drive, field)?;
        Ok(Some(ContextFilter::Allow(fragments::in_tree_under(
            EntityKind::Directory,
            EntityKind::Drive,
            drives,
            ctx.remaining_depth(),
        ))))
    }
}

/// File ← Directory
pub struct DirectoryFileProvider;

impl ContextProvider for DirectoryFileProvider {
    fn name(&self) -> &str {
        "directory_file"
    }

    fn get_privileges(
        &self,
        ctx: &ResolveContext<'_>,
        target: &Entity,
        acc: &mut PrivilegeMap,
    ) -> Result<()> {
        inherit_from_container(self, ctx, target, &[EntityKind::Directory], acc)
    }

    fn visible_filter(
        &self,
        ctx: &ResolveContext<'_>,
        user: &User,
        field: Tier,
    ) -> Result<Option<ContextFilter>> {
        container_filter(ctx, user, field, EntityKind::Directory)
    }
}
