//! ContextProvider trait

use warden_foundation::{Entity, Result, SqlFilter, Tier, User};

use crate::engine::{PrivilegeMap, ResolveContext};

/// Set-based contribution of a provider to one privilege field.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextFilter {
    /// Rows matching the predicate get the field set to ALLOW
    Allow(SqlFilter),
    /// Rows matching the predicate get the field set to DENY
    Deny(SqlFilter),
}

/// Per-entity-kind resolver deriving privileges from containment.
///
/// Providers run after role and direct grants, in ascending execution order,
/// and overwrite every field they explicitly set.
///
/// `get_privileges` and `visible_filter` must describe the same
/// contribution: for each field, `visible_filter` selects the rows on which
/// the (normalized) contribution of `get_privileges` sets that field.
/// Returning `Error::ContainerUnresolvable` from either means "contribute
/// nothing"; the engine logs it and moves on.
pub trait ContextProvider: Send + Sync {
    /// Provider name (recorded as the privilege source)
    fn name(&self) -> &str;

    /// Write contributions for `target` into `acc`.
    fn get_privileges(
        &self,
        ctx: &ResolveContext<'_>,
        target: &Entity,
        acc: &mut PrivilegeMap,
    ) -> Result<()>;

    /// Predicate over the row alias `v` for `field`, `None` when this
    /// provider never touches the field.
    fn visible_filter(
        &self,
        ctx: &ResolveContext<'_>,
        user: &User,
        field: Tier,
    ) -> Result<Option<ContextFilter>>;
}
