//! SQL filter composition
//!
//! `SqlFilter` is a boolean SQL fragment plus its positional parameters.
//! Fragments compose with AND / OR / NOT without ever touching rows, which
//! is what lets visibility filters run as one query.
//!
//! Alias conventions used by the fragment builders below:
//! - `e`: the outer entity row of an [`EntityQuery`]
//! - `v`: the entity row inside a visibility subquery
//!   (nested subqueries shadow it, which is intended)

use crate::core::{EntityId, ProjectId, UserId};
use crate::entity::{EntityKind, EntityRef, EntityState};
use crate::permission::{PrivilegeValue, Tier};
use rusqlite::types::Value;

// ============================================================================
// SqlFilter
// ============================================================================

/// Boolean SQL fragment with positional (`?`) parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFilter {
    sql: String,
    params: Vec<Value>,
}

impl SqlFilter {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn always() -> Self {
        Self::new("1 = 1", Vec::new())
    }

    pub fn never() -> Self {
        Self::new("0 = 1", Vec::new())
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn is_never(&self) -> bool {
        self.sql == "0 = 1"
    }

    pub fn and(self, other: SqlFilter) -> Self {
        if self.is_never() || other.is_never() {
            return Self::never();
        }
        self.join("AND", other)
    }

    pub fn or(self, other: SqlFilter) -> Self {
        if self.is_never() {
            return other;
        }
        if other.is_never() {
            return self;
        }
        self.join("OR", other)
    }

    /// NULL-safe negation.
    pub fn not(self) -> Self {
        if self.is_never() {
            return Self::always();
        }
        Self::new(format!("NOT COALESCE(({}), 0)", self.sql), self.params)
    }

    /// `column IN (<subquery>)`
    pub fn in_subquery(column: &str, subquery: SqlFilter) -> Self {
        if subquery.is_never() {
            return Self::never();
        }
        Self::new(format!("{} IN ({})", column, subquery.sql), subquery.params)
    }

    fn join(mut self, op: &str, other: SqlFilter) -> Self {
        self.sql = format!("({}) {} ({})", self.sql, op, other.sql);
        self.params.extend(other.params);
        self
    }
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

// ============================================================================
// EntityQuery
// ============================================================================

/// Trashed-state constraint of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFilter {
    Any,
    Only(EntityState),
}

/// Composable collection query over one entity kind.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityQuery {
    kind: EntityKind,
    filters: Vec<SqlFilter>,
    state: StateFilter,
    limit: Option<u32>,
}

impl EntityQuery {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            filters: Vec::new(),
            state: StateFilter::Any,
            limit: None,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn active(mut self) -> Self {
        self.state = StateFilter::Only(EntityState::Active);
        self
    }

    pub fn trashed(mut self) -> Self {
        self.state = StateFilter::Only(EntityState::Trashed);
        self
    }

    pub fn in_project(self, project_id: &ProjectId) -> Self {
        self.filter(SqlFilter::new(
            "e.project_id = ?",
            vec![text(project_id.as_str())],
        ))
    }

    pub fn in_container(self, container: &EntityRef) -> Self {
        self.filter(SqlFilter::new(
            "e.container_kind = ? AND e.container_id = ?",
            vec![text(container.kind.as_str()), text(container.id.as_str())],
        ))
    }

    pub fn with_ids(self, ids: &[EntityId]) -> Self {
        if ids.is_empty() {
            return self.filter(SqlFilter::never());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        self.filter(SqlFilter::new(
            format!("e.id IN ({})", placeholders),
            ids.iter().map(|id| text(id.as_str())).collect(),
        ))
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Add a predicate over the outer alias `e`.
    pub fn filter(mut self, filter: SqlFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(&self) -> &[SqlFilter] {
        &self.filters
    }

    /// Full WHERE clause (kind, state, filters).
    pub fn where_clause(&self) -> SqlFilter {
        let mut clause = SqlFilter::new("e.kind = ?", vec![text(self.kind.as_str())]);
        if let StateFilter::Only(state) = self.state {
            let trashed = i64::from(state == EntityState::Trashed);
            clause = clause.and(SqlFilter::new("e.trashed = ?", vec![Value::Integer(trashed)]));
        }
        for filter in &self.filters {
            clause = clause.and(filter.clone());
        }
        clause
    }

    /// `SELECT <columns> FROM entities e WHERE ... ORDER BY ... LIMIT ...`
    pub fn to_select(&self, columns: &str) -> SqlFilter {
        let clause = self.where_clause();
        let mut sql = format!(
            "SELECT {} FROM entities e WHERE {} ORDER BY e.created_at, e.id",
            columns,
            clause.sql()
        );
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        SqlFilter::new(sql, clause.params)
    }
}

// ============================================================================
// Fragment builders (schema knowledge stays in this crate)
// ============================================================================

/// Builders for the visibility subqueries the engine composes.
pub mod fragments {
    use super::*;

    /// `SELECT v.id FROM entities v WHERE v.kind = ? AND (<predicate>)`
    pub fn visible_ids(kind: EntityKind, predicate: SqlFilter) -> SqlFilter {
        if predicate.is_never() {
            return SqlFilter::never();
        }
        let mut params = vec![text(kind.as_str())];
        params.extend(predicate.params);
        SqlFilter::new(
            format!(
                "SELECT v.id FROM entities v WHERE v.kind = ? AND ({})",
                predicate.sql
            ),
            params,
        )
    }

    /// Predicate: direct privilege of `user` on `v` has `field = value`.
    /// Records are stored normalized, so a single column decides.
    pub fn direct_privilege(
        user: &UserId,
        kind: EntityKind,
        field: Tier,
        value: PrivilegeValue,
    ) -> SqlFilter {
        SqlFilter::new(
            format!(
                "v.id IN (SELECT pr.entity_id FROM privileges pr \
                 WHERE pr.user_id = ? AND pr.entity_kind = ? AND pr.{} = ?)",
                field.column()
            ),
            vec![
                text(user.as_str()),
                text(kind.as_str()),
                text(value.code()),
            ],
        )
    }

    /// Subquery: ids of projects whose closest role assignment for `user`
    /// (self or nearest ancestor) carries any of `codenames`.
    pub fn role_granted_projects(user: &UserId, codenames: &[String]) -> SqlFilter {
        if codenames.is_empty() {
            return SqlFilter::never();
        }
        let placeholders = vec!["?"; codenames.len()].join(", ");
        let mut params: Vec<Value> = codenames.iter().map(|c| text(c)).collect();
        params.push(text(user.as_str()));
        SqlFilter::new(
            format!(
                "SELECT p.id FROM projects p WHERE EXISTS (\
                   SELECT 1 FROM role_permissions rp \
                   WHERE rp.codename IN ({}) AND rp.role_id = (\
                     SELECT a.role_id FROM role_assignments a \
                     JOIN projects ap ON ap.id = a.project_id \
                     WHERE a.user_id = ? \
                       AND substr(p.path, 1, length(ap.path)) = ap.path \
                     ORDER BY length(ap.path) DESC LIMIT 1))",
                placeholders
            ),
            params,
        )
    }

    /// Predicate: `v` belongs to one of the projects in `projects`.
    pub fn in_projects(projects: SqlFilter) -> SqlFilter {
        SqlFilter::in_subquery("v.project_id", projects)
    }

    /// Predicate: `v` sits directly in a container of `container_kind`
    /// whose id is selected by `containers`.
    pub fn in_containers(container_kind: EntityKind, containers: SqlFilter) -> SqlFilter {
        if containers.is_never() {
            return SqlFilter::never();
        }
        let mut params = vec![text(container_kind.as_str())];
        params.extend(containers.params);
        SqlFilter::new(
            format!(
                "v.container_kind = ? AND v.container_id IN ({})",
                containers.sql
            ),
            params,
        )
    }

    /// Predicate: `v` is a `kind` row reachable downward from a root
    /// selected by `roots` (of `root_kind`) through at most `max_depth`
    /// levels of same-kind nesting. Used for directory trees.
    pub fn in_tree_under(
        kind: EntityKind,
        root_kind: EntityKind,
        roots: SqlFilter,
        max_depth: usize,
    ) -> SqlFilter {
        if roots.is_never() {
            return SqlFilter::never();
        }
        let mut params = vec![text(kind.as_str()), text(root_kind.as_str())];
        params.extend(roots.params);
        params.push(text(kind.as_str()));
        params.push(text(kind.as_str()));
        params.push(Value::Integer(max_depth as i64));
        SqlFilter::new(
            format!(
                "v.id IN (WITH RECURSIVE tree(id, depth) AS (\
                   SELECT d.id, 1 FROM entities d \
                   WHERE d.kind = ? AND d.container_kind = ? AND d.container_id IN ({}) \
                   UNION \
                   SELECT c.id, t.depth + 1 FROM entities c JOIN tree t \
                     ON c.container_kind = ? AND c.container_id = t.id \
                   WHERE c.kind = ? AND t.depth < ?) \
                 SELECT id FROM tree)",
                roots.sql
            ),
            params,
        )
    }
}
