//! LabBook element provider
//!
//! LabBook에 배치된 Note, File, Picture는 LabBook의 VIEW / EDIT를 상속합니다.

use warden_foundation::{Entity, EntityKind, Result, Tier, User};

use super::{container_filter, inherit_from_container};
use crate::context::{ContextFilter, ContextProvider};
use crate::engine::{PrivilegeMap, ResolveContext};

pub struct LabBookElementProvider;

impl LabBookElementProvider {
    /// Kinds that can be placed in a LabBook
    pub const KINDS: &'static [EntityKind] =
        &[EntityKind::Note, EntityKind::File, EntityKind::Picture];
}

impl ContextProvider for LabBookElementProvider {
    fn name(&self) -> &str {
        "labbook_element"
    }

    fn get_privileges(
        &self,
        ctx: &ResolveContext<'_>,
        target: &Entity,
        acc: &mut PrivilegeMap,
    ) -> Result<()> {
        inherit_from_container(self, ctx, target, &[EntityKind::LabBook], acc)
    }

    fn visible_filter(
        &self,
        ctx: &ResolveContext<'_>,
        user: &User,
        field: Tier,
    ) -> Result<Option<ContextFilter>> {
        container_filter(ctx, user, field, EntityKind::LabBook)
    }
}
