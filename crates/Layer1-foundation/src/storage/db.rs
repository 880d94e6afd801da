//! SQLite Storage for privilege data
//!
//! 런타임 데이터 저장:
//! - Users / Groups: 인증 계층에서 넘어오는 사용자와 그룹 (group default grant 포함)
//! - Projects: 프로젝트 트리 (parent pointer + materialized path)
//! - Roles: 역할, 역할 권한, 프로젝트 역할 할당
//! - Entities: 보호 대상 엔티티 행 (프로젝트, 컨테이너, 휴지통 상태)
//! - Privileges: 엔티티별 사용자 ACL 행
//!
//! 설정 데이터는 JSON (storage/json/)에서 관리
//!
//! ## Migration System
//!
//! Database schema is versioned. Migrations run automatically on startup.
//! - Version 1: Initial schema
//! - Version 2: Add trashed_at column and per-user privilege index

use super::filter::EntityQuery;
use crate::core::{EntityId, Project, ProjectId, Role, RoleAssignment, RoleId, User, UserId};
use crate::entity::{Entity, EntityKind, EntityRef, EntityState, NewEntity};
use crate::permission::{PrivilegeRecord, PrivilegeValue, Privileges};
use crate::{Error, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Current schema version
const CURRENT_SCHEMA_VERSION: i32 = 2;

const ENTITY_COLUMNS: &str = "e.kind, e.id, e.title, e.project_id, e.container_kind, \
                              e.container_id, e.created_by, e.trashed, e.created_at";

const PRIVILEGE_COLUMNS: &str =
    "user_id, entity_kind, entity_id, full_access, view, edit, trash, restore";

/// Storage service for privilege data
#[derive(Clone)]
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    /// Open (or create) a database file
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Storage(format!("Failed to create data directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open(db_path)
            .map_err(|e| Error::Storage(format!("Failed to open database: {}", e)))?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| Error::Storage(format!("Failed to set pragmas: {}", e)))?;

        Self::from_connection(conn)
    }

    /// Create an in-memory storage (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("Failed to create in-memory database: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Storage(format!("Failed to enable foreign keys: {}", e)))?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        storage.initialize_schema()?;
        storage.run_migrations()?;

        Ok(storage)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))
    }

    /// Get current schema version from database
    pub fn get_schema_version(&self) -> Result<i32> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(|e| Error::Storage(format!("Failed to get schema version: {}", e)))
    }

    /// Initialize database schema (base tables)
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- Users (mirrored from the identity layer)
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                is_superuser INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS user_groups (
                user_id TEXT NOT NULL,
                group_name TEXT NOT NULL,
                PRIMARY KEY (user_id, group_name),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Group-level default grants (e.g. add_task_without_project)
            CREATE TABLE IF NOT EXISTS group_permissions (
                group_name TEXT NOT NULL,
                codename TEXT NOT NULL,
                PRIMARY KEY (group_name, codename)
            );

            -- Project tree
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                parent_id TEXT,
                path TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                FOREIGN KEY (parent_id) REFERENCES projects(id)
            );

            -- Roles
            CREATE TABLE IF NOT EXISTS roles (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS role_permissions (
                role_id TEXT NOT NULL,
                codename TEXT NOT NULL,
                PRIMARY KEY (role_id, codename),
                FOREIGN KEY (role_id) REFERENCES roles(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS role_assignments (
                user_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                role_id TEXT NOT NULL,
                PRIMARY KEY (user_id, project_id),
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
                FOREIGN KEY (role_id) REFERENCES roles(id) ON DELETE CASCADE
            );

            -- Protected entities
            CREATE TABLE IF NOT EXISTS entities (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                title TEXT NOT NULL,
                project_id TEXT,
                container_kind TEXT,
                container_id TEXT,
                created_by TEXT NOT NULL,
                trashed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                PRIMARY KEY (kind, id),
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE SET NULL
            );

            CREATE INDEX IF NOT EXISTS idx_entities_container
                ON entities(container_kind, container_id);
            CREATE INDEX IF NOT EXISTS idx_entities_project
                ON entities(project_id);

            -- Per-object ACL rows
            CREATE TABLE IF NOT EXISTS privileges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                entity_kind TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                full_access TEXT NOT NULL DEFAULT 'NE' CHECK(full_access IN ('AL', 'DE', 'NE')),
                view TEXT NOT NULL DEFAULT 'NE' CHECK(view IN ('AL', 'DE', 'NE')),
                edit TEXT NOT NULL DEFAULT 'NE' CHECK(edit IN ('AL', 'DE', 'NE')),
                trash TEXT NOT NULL DEFAULT 'NE' CHECK(trash IN ('AL', 'DE', 'NE')),
                restore TEXT NOT NULL DEFAULT 'NE' CHECK(restore IN ('AL', 'DE', 'NE')),
                updated_at TEXT NOT NULL,
                UNIQUE (user_id, entity_kind, entity_id),
                FOREIGN KEY (entity_kind, entity_id) REFERENCES entities(kind, id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_privileges_entity
                ON privileges(entity_kind, entity_id);

            -- Insert initial schema version if not exists
            INSERT OR IGNORE INTO schema_version (version) VALUES (1);
            "#,
        )
        .map_err(|e| Error::Storage(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    /// Run all pending migrations
    fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version()?;

        if current_version >= CURRENT_SCHEMA_VERSION {
            debug!(
                "Database schema is up to date (version {})",
                current_version
            );
            return Ok(());
        }

        info!(
            "Running database migrations from version {} to {}",
            current_version, CURRENT_SCHEMA_VERSION
        );

        let conn = self.conn()?;

        // Run migrations sequentially
        for version in (current_version + 1)..=CURRENT_SCHEMA_VERSION {
            match version {
                2 => Self::migrate_v2(&conn)?,
                _ => {
                    warn!("Unknown migration version: {}", version);
                }
            }

            // Record migration
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                params![version],
            )
            .map_err(|e| Error::Storage(format!("Failed to record migration: {}", e)))?;

            info!("Applied migration to version {}", version);
        }

        Ok(())
    }

    /// Migration to version 2: trash timestamps and per-user lookups
    fn migrate_v2(conn: &Connection) -> Result<()> {
        let has_trashed_at: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM pragma_table_info('entities') WHERE name = 'trashed_at')",
                [],
                |row| row.get(0),
            )
            .map_err(|e| Error::Storage(format!("Failed to inspect entities table: {}", e)))?;
        if !has_trashed_at {
            conn.execute("ALTER TABLE entities ADD COLUMN trashed_at TEXT", [])
                .map_err(|e| Error::Storage(format!("Failed to add trashed_at column: {}", e)))?;
        }

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_privileges_user ON privileges(user_id, entity_kind)",
            [],
        )
        .map_err(|e| Error::Storage(format!("Failed to create index: {}", e)))?;

        Ok(())
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    /// Register a user
    pub fn create_user(&self, username: &str, is_superuser: bool) -> Result<User> {
        let conn = self.conn()?;
        let id = UserId::generate();

        conn.execute(
            "INSERT INTO users (id, username, is_superuser) VALUES (?1, ?2, ?3)",
            params![id.as_str(), username, is_superuser],
        )
        .map_err(|e| Error::Storage(format!("Failed to create user: {}", e)))?;

        let mut user = User::new(id, username);
        user.is_superuser = is_superuser;
        Ok(user)
    }

    /// Get a user (with group memberships) by ID
    pub fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        let conn = self.conn()?;

        let user = conn
            .query_row(
                "SELECT id, username, is_superuser, is_active FROM users WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    let mut user = User::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?);
                    user.is_superuser = row.get(2)?;
                    user.is_active = row.get(3)?;
                    Ok(user)
                },
            )
            .optional()
            .map_err(|e| Error::Storage(format!("Failed to get user: {}", e)))?;

        let Some(mut user) = user else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare("SELECT group_name FROM user_groups WHERE user_id = ?1 ORDER BY group_name")
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;
        user.groups = stmt
            .query_map(params![id.as_str()], |row| row.get(0))
            .map_err(|e| Error::Storage(format!("Failed to query groups: {}", e)))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(Some(user))
    }

    /// Deactivate or reactivate a user
    pub fn set_user_active(&self, id: &UserId, active: bool) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE users SET is_active = ?2 WHERE id = ?1",
                params![id.as_str(), active],
            )
            .map_err(|e| Error::Storage(format!("Failed to update user: {}", e)))?;
        Ok(changed > 0)
    }

    pub fn add_user_to_group(&self, user_id: &UserId, group: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO user_groups (user_id, group_name) VALUES (?1, ?2)",
            params![user_id.as_str(), group],
        )
        .map_err(|e| Error::Storage(format!("Failed to add group membership: {}", e)))?;
        Ok(())
    }

    // ========================================================================
    // Group Default Grants
    // ========================================================================

    pub fn add_group_permission(&self, group: &str, codename: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO group_permissions (group_name, codename) VALUES (?1, ?2)",
            params![group, codename],
        )
        .map_err(|e| Error::Storage(format!("Failed to add group permission: {}", e)))?;
        Ok(())
    }

    /// Does any of `groups` carry `codename`?
    pub fn groups_have_permission(&self, groups: &[String], codename: &str) -> Result<bool> {
        if groups.is_empty() {
            return Ok(false);
        }
        let conn = self.conn()?;
        let placeholders = vec!["?"; groups.len()].join(", ");
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM group_permissions \
             WHERE codename = ? AND group_name IN ({}))",
            placeholders
        );

        let mut values: Vec<&str> = vec![codename];
        values.extend(groups.iter().map(String::as_str));

        conn.query_row(&sql, params_from_iter(values), |row| row.get(0))
            .map_err(|e| Error::Storage(format!("Failed to query group permissions: {}", e)))
    }

    // ========================================================================
    // Project Operations
    // ========================================================================

    /// Create a project, optionally below `parent`
    pub fn create_project(&self, name: &str, parent: Option<&ProjectId>) -> Result<Project> {
        let parent_path = match parent {
            Some(parent_id) => Some(
                self.get_project(parent_id)?
                    .ok_or_else(|| Error::NotFound(format!("project {}", parent_id)))?
                    .path,
            ),
            None => None,
        };

        let id = ProjectId::generate();
        let path = format!("{}{}/", parent_path.as_deref().unwrap_or("/"), id);
        let now = chrono::Utc::now().to_rfc3339();

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO projects (id, name, parent_id, path, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id.as_str(), name, parent.map(|p| p.as_str()), path, now],
        )
        .map_err(|e| Error::Storage(format!("Failed to create project: {}", e)))?;

        Ok(Project {
            id,
            name: name.to_string(),
            parent_id: parent.cloned(),
            path,
        })
    }

    pub fn get_project(&self, id: &ProjectId) -> Result<Option<Project>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, name, parent_id, path FROM projects WHERE id = ?1",
            params![id.as_str()],
            |row| {
                Ok(Project {
                    id: ProjectId::new(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                    parent_id: row.get::<_, Option<String>>(2)?.map(ProjectId::new),
                    path: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(|e| Error::Storage(format!("Failed to get project: {}", e)))
    }

    /// Ancestor chain of a project, closest first (self .. root).
    /// Empty if the project does not exist.
    pub fn project_ancestors(&self, id: &ProjectId) -> Result<Vec<ProjectId>> {
        Ok(self
            .get_project(id)?
            .map(|project| project.ancestor_chain())
            .unwrap_or_default())
    }

    // ========================================================================
    // Role Operations
    // ========================================================================

    /// Create a role with its permission codenames
    pub fn create_role(&self, name: &str, permissions: &[&str]) -> Result<Role> {
        let mut conn = self.conn()?;
        let id = RoleId::generate();

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO roles (id, name) VALUES (?1, ?2)",
            params![id.as_str(), name],
        )
        .map_err(|e| Error::Storage(format!("Failed to create role: {}", e)))?;
        for codename in permissions {
            tx.execute(
                "INSERT OR IGNORE INTO role_permissions (role_id, codename) VALUES (?1, ?2)",
                params![id.as_str(), codename],
            )
            .map_err(|e| Error::Storage(format!("Failed to add role permission: {}", e)))?;
        }
        tx.commit()?;

        Ok(Role {
            id,
            name: name.to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        })
    }

    pub fn get_role(&self, id: &RoleId) -> Result<Option<Role>> {
        let conn = self.conn()?;

        let name: Option<String> = conn
            .query_row(
                "SELECT name FROM roles WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Storage(format!("Failed to get role: {}", e)))?;

        let Some(name) = name else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare("SELECT codename FROM role_permissions WHERE role_id = ?1 ORDER BY codename")
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;
        let permissions = stmt
            .query_map(params![id.as_str()], |row| row.get(0))
            .map_err(|e| Error::Storage(format!("Failed to query role permissions: {}", e)))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(Some(Role {
            id: id.clone(),
            name,
            permissions,
        }))
    }

    /// Assign (or replace) the role of a user on a project
    pub fn assign_role(&self, user_id: &UserId, project_id: &ProjectId, role_id: &RoleId) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO role_assignments (user_id, project_id, role_id) VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id, project_id) DO UPDATE SET role_id = excluded.role_id
            "#,
            params![user_id.as_str(), project_id.as_str(), role_id.as_str()],
        )
        .map_err(|e| Error::Storage(format!("Failed to assign role: {}", e)))?;

        info!("Assigned role {} to user {} on project {}", role_id, user_id, project_id);
        Ok(())
    }

    pub fn unassign_role(&self, user_id: &UserId, project_id: &ProjectId) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn
            .execute(
                "DELETE FROM role_assignments WHERE user_id = ?1 AND project_id = ?2",
                params![user_id.as_str(), project_id.as_str()],
            )
            .map_err(|e| Error::Storage(format!("Failed to unassign role: {}", e)))?;

        if removed > 0 {
            info!("Removed role of user {} on project {}", user_id, project_id);
        }
        Ok(removed > 0)
    }

    /// Role assignments on any of `projects`, optionally for one user only
    pub fn assignments_on(
        &self,
        projects: &[ProjectId],
        user_id: Option<&UserId>,
    ) -> Result<Vec<RoleAssignment>> {
        if projects.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;

        let placeholders = vec!["?"; projects.len()].join(", ");
        let mut sql = format!(
            "SELECT user_id, project_id, role_id FROM role_assignments WHERE project_id IN ({})",
            placeholders
        );
        let mut values: Vec<&str> = projects.iter().map(|p| p.as_str()).collect();
        if let Some(user_id) = user_id {
            sql.push_str(" AND user_id = ?");
            values.push(user_id.as_str());
        }
        sql.push_str(" ORDER BY user_id");

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;
        let assignments = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(RoleAssignment {
                    user_id: UserId::new(row.get::<_, String>(0)?),
                    project_id: ProjectId::new(row.get::<_, String>(1)?),
                    role_id: RoleId::new(row.get::<_, String>(2)?),
                })
            })
            .map_err(|e| Error::Storage(format!("Failed to query role assignments: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(assignments)
    }

    // ========================================================================
    // Entity Operations
    // ========================================================================

    /// Insert an entity row without any owner grant (structural kinds)
    pub fn insert_entity(&self, entity: &NewEntity, created_by: &UserId) -> Result<Entity> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let inserted = Self::insert_entity_row(&tx, entity, created_by)?;
        tx.commit()?;
        Ok(inserted)
    }

    /// Insert an entity and its creator's full-access record in one
    /// transaction, so the entity never exists without a full-access holder.
    pub fn insert_entity_with_owner(&self, entity: &NewEntity, owner: &UserId) -> Result<Entity> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let inserted = Self::insert_entity_row(&tx, entity, owner)?;
        let owner_record = PrivilegeRecord::owner(owner.clone(), inserted.reference());
        tx.execute(
            &format!(
                "INSERT INTO privileges ({}, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                 ON CONFLICT(user_id, entity_kind, entity_id) DO NOTHING",
                PRIVILEGE_COLUMNS
            ),
            params_from_iter(Self::privilege_params(&owner_record, &chrono::Utc::now().to_rfc3339())),
        )
        .map_err(|e| Error::Storage(format!("Failed to create owner privilege: {}", e)))?;

        tx.commit()?;
        debug!("Created {} with owner {}", inserted.reference(), owner);
        Ok(inserted)
    }

    fn insert_entity_row(conn: &Connection, entity: &NewEntity, created_by: &UserId) -> Result<Entity> {
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO entities (kind, id, title, project_id, container_kind, container_id,
                                  created_by, trashed, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)
            "#,
            params![
                entity.kind.as_str(),
                entity.id.as_str(),
                entity.title,
                entity.project_id.as_ref().map(|p| p.as_str()),
                entity.container.as_ref().map(|c| c.kind.as_str()),
                entity.container.as_ref().map(|c| c.id.as_str()),
                created_by.as_str(),
                now,
            ],
        )
        .map_err(|e| Error::Storage(format!("Failed to insert entity: {}", e)))?;

        Ok(Entity {
            kind: entity.kind,
            id: entity.id.clone(),
            title: entity.title.clone(),
            project_id: entity.project_id.clone(),
            container: entity.container.clone(),
            created_by: created_by.clone(),
            state: EntityState::Active,
            created_at: now,
        })
    }

    pub fn get_entity(&self, entity: &EntityRef) -> Result<Option<Entity>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM entities e WHERE e.kind = ?1 AND e.id = ?2",
                    ENTITY_COLUMNS
                ),
                params![entity.kind.as_str(), entity.id.as_str()],
                RawEntity::from_row,
            )
            .optional()
            .map_err(|e| Error::Storage(format!("Failed to get entity: {}", e)))?;

        raw.map(RawEntity::into_entity).transpose()
    }

    /// Flip the trashed flag. Returns false if the entity does not exist.
    pub fn set_entity_state(&self, entity: &EntityRef, state: EntityState) -> Result<bool> {
        let conn = self.conn()?;
        let trashed = state == EntityState::Trashed;
        let trashed_at = trashed.then(|| chrono::Utc::now().to_rfc3339());

        let changed = conn
            .execute(
                "UPDATE entities SET trashed = ?3, trashed_at = ?4 WHERE kind = ?1 AND id = ?2",
                params![entity.kind.as_str(), entity.id.as_str(), trashed, trashed_at],
            )
            .map_err(|e| Error::Storage(format!("Failed to update entity state: {}", e)))?;
        Ok(changed > 0)
    }

    /// Permanently remove an entity and its privilege records
    pub fn delete_entity(&self, entity: &EntityRef) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM privileges WHERE entity_kind = ?1 AND entity_id = ?2",
            params![entity.kind.as_str(), entity.id.as_str()],
        )
        .map_err(|e| Error::Storage(format!("Failed to delete privileges: {}", e)))?;
        let removed = tx
            .execute(
                "DELETE FROM entities WHERE kind = ?1 AND id = ?2",
                params![entity.kind.as_str(), entity.id.as_str()],
            )
            .map_err(|e| Error::Storage(format!("Failed to delete entity: {}", e)))?;

        tx.commit()?;
        Ok(removed > 0)
    }

    /// Run a composed collection query
    pub fn query_entities(&self, query: &EntityQuery) -> Result<Vec<Entity>> {
        let select = query.to_select(ENTITY_COLUMNS);
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(select.sql())
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map(params_from_iter(select.params()), RawEntity::from_row)
            .map_err(|e| Error::Storage(format!("Failed to query entities: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(RawEntity::into_entity).collect()
    }

    pub fn query_entity_ids(&self, query: &EntityQuery) -> Result<Vec<EntityId>> {
        let select = query.to_select("e.id");
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(select.sql())
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;
        let ids = stmt
            .query_map(params_from_iter(select.params()), |row| {
                row.get::<_, String>(0).map(EntityId::new)
            })
            .map_err(|e| Error::Storage(format!("Failed to query entity ids: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(ids)
    }

    pub fn count_entities(&self, query: &EntityQuery) -> Result<u64> {
        let clause = query.where_clause();
        let sql = format!("SELECT COUNT(*) FROM entities e WHERE {}", clause.sql());
        let conn = self.conn()?;

        let count: i64 = conn
            .query_row(&sql, params_from_iter(clause.params()), |row| row.get(0))
            .map_err(|e| Error::Storage(format!("Failed to count entities: {}", e)))?;
        Ok(count as u64)
    }

    // ========================================================================
    // Privilege Record Operations
    // ========================================================================

    pub fn get_privilege(&self, user_id: &UserId, entity: &EntityRef) -> Result<Option<PrivilegeRecord>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM privileges \
                     WHERE user_id = ?1 AND entity_kind = ?2 AND entity_id = ?3",
                    PRIVILEGE_COLUMNS
                ),
                params![user_id.as_str(), entity.kind.as_str(), entity.id.as_str()],
                RawPrivilege::from_row,
            )
            .optional()
            .map_err(|e| Error::Storage(format!("Failed to get privilege: {}", e)))?;

        raw.map(RawPrivilege::into_record).transpose()
    }

    /// All records of an entity, ordered by user
    pub fn privileges_for_entity(&self, entity: &EntityRef) -> Result<Vec<PrivilegeRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM privileges WHERE entity_kind = ?1 AND entity_id = ?2 ORDER BY user_id",
                PRIVILEGE_COLUMNS
            ))
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(
                params![entity.kind.as_str(), entity.id.as_str()],
                RawPrivilege::from_row,
            )
            .map_err(|e| Error::Storage(format!("Failed to query privileges: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(RawPrivilege::into_record).collect()
    }

    /// Insert or replace the record for (user, entity). Normalizes first.
    pub fn upsert_privilege(&self, record: &PrivilegeRecord) -> Result<PrivilegeRecord> {
        let record = record.clone().normalized();
        let conn = self.conn()?;
        Self::write_privilege(&conn, &record)?;
        Ok(record)
    }

    /// Like [`upsert_privilege`](Self::upsert_privilege), but refuses to take
    /// full access away from the entity's last holder. The holder check and
    /// the write share one immediate transaction.
    pub fn upsert_privilege_keeping_holder(&self, record: &PrivilegeRecord) -> Result<PrivilegeRecord> {
        let record = record.clone().normalized();
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !record.has_full_access() && Self::is_last_holder(&tx, &record.user_id, &record.entity)? {
            return Err(Self::last_holder_error(&record.user_id, &record.entity));
        }
        Self::write_privilege(&tx, &record)?;

        tx.commit()?;
        Ok(record)
    }

    /// Delete the record of (user, entity). Returns false if none existed.
    /// Removing the last full-access holder is rejected with `Validation`.
    pub fn delete_privilege(&self, user_id: &UserId, entity: &EntityRef) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if Self::is_last_holder(&tx, user_id, entity)? {
            return Err(Self::last_holder_error(user_id, entity));
        }
        let removed = tx
            .execute(
                "DELETE FROM privileges WHERE user_id = ?1 AND entity_kind = ?2 AND entity_id = ?3",
                params![user_id.as_str(), entity.kind.as_str(), entity.id.as_str()],
            )
            .map_err(|e| Error::Storage(format!("Failed to delete privilege: {}", e)))?;

        tx.commit()?;
        Ok(removed > 0)
    }

    /// True when `user_id` holds full access and nobody else does.
    fn is_last_holder(conn: &Connection, user_id: &UserId, entity: &EntityRef) -> Result<bool> {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM privileges \
               WHERE entity_kind = ?1 AND entity_id = ?2 AND user_id = ?3 AND full_access = 'AL') \
             AND NOT EXISTS(SELECT 1 FROM privileges \
               WHERE entity_kind = ?1 AND entity_id = ?2 AND user_id <> ?3 AND full_access = 'AL')",
            params![entity.kind.as_str(), entity.id.as_str(), user_id.as_str()],
            |row| row.get(0),
        )
        .map_err(|e| Error::Storage(format!("Failed to check full access holders: {}", e)))
    }

    fn last_holder_error(user_id: &UserId, entity: &EntityRef) -> Error {
        Error::Validation(format!(
            "{} is the last full access holder of {}",
            user_id, entity
        ))
    }

    fn write_privilege(conn: &Connection, record: &PrivilegeRecord) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            &format!(
                r#"
                INSERT INTO privileges ({}, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(user_id, entity_kind, entity_id) DO UPDATE SET
                    full_access = excluded.full_access,
                    view = excluded.view,
                    edit = excluded.edit,
                    trash = excluded.trash,
                    restore = excluded.restore,
                    updated_at = excluded.updated_at
                "#,
                PRIVILEGE_COLUMNS
            ),
            params_from_iter(Self::privilege_params(record, &now)),
        )
        .map_err(|e| Error::Storage(format!("Failed to upsert privilege: {}", e)))?;
        Ok(())
    }

    /// Users holding a direct `full_access = ALLOW` record on the entity
    pub fn full_access_holders(&self, entity: &EntityRef) -> Result<Vec<UserId>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT user_id FROM privileges \
                 WHERE entity_kind = ?1 AND entity_id = ?2 AND full_access = 'AL' ORDER BY user_id",
            )
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

        let holders = stmt
            .query_map(params![entity.kind.as_str(), entity.id.as_str()], |row| {
                row.get::<_, String>(0).map(UserId::new)
            })
            .map_err(|e| Error::Storage(format!("Failed to query full access holders: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(holders)
    }

    /// Protected entities without any full-access record
    pub fn entities_missing_full_access(&self) -> Result<Vec<Entity>> {
        let kinds: Vec<&str> = EntityKind::protected_kinds().map(|k| k.as_str()).collect();
        let placeholders = vec!["?"; kinds.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM entities e WHERE e.kind IN ({}) AND NOT EXISTS (\
               SELECT 1 FROM privileges p \
               WHERE p.entity_kind = e.kind AND p.entity_id = e.id AND p.full_access = 'AL') \
             ORDER BY e.created_at, e.id",
            ENTITY_COLUMNS, placeholders
        );

        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map(params_from_iter(kinds), RawEntity::from_row)
            .map_err(|e| Error::Storage(format!("Failed to query entities: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(RawEntity::into_entity).collect()
    }

    /// Grant full access to `user_id` unless the entity already has a
    /// full-access holder. Returns true if a record was written.
    pub fn grant_full_access_if_missing(&self, user_id: &UserId, entity: &EntityRef) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let has_holder: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM privileges \
                 WHERE entity_kind = ?1 AND entity_id = ?2 AND full_access = 'AL')",
                params![entity.kind.as_str(), entity.id.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| Error::Storage(format!("Failed to check full access: {}", e)))?;

        if has_holder {
            return Ok(false);
        }

        let record = PrivilegeRecord::owner(user_id.clone(), entity.clone());
        tx.execute(
            &format!(
                r#"
                INSERT INTO privileges ({}, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(user_id, entity_kind, entity_id) DO UPDATE SET
                    full_access = 'AL', view = 'AL', edit = 'AL', trash = 'AL', restore = 'AL',
                    updated_at = excluded.updated_at
                "#,
                PRIVILEGE_COLUMNS
            ),
            params_from_iter(Self::privilege_params(&record, &chrono::Utc::now().to_rfc3339())),
        )
        .map_err(|e| Error::Storage(format!("Failed to grant full access: {}", e)))?;

        tx.commit()?;
        Ok(true)
    }

    fn privilege_params(record: &PrivilegeRecord, now: &str) -> [String; 9] {
        let p = &record.privileges;
        [
            record.user_id.to_string(),
            record.entity.kind.as_str().to_string(),
            record.entity.id.to_string(),
            p.full_access.code().to_string(),
            p.view.code().to_string(),
            p.edit.code().to_string(),
            p.trash.code().to_string(),
            p.restore.code().to_string(),
            now.to_string(),
        ]
    }
}

// ============================================================================
// Row mapping
// ============================================================================

/// Entity row before kind/state parsing
struct RawEntity {
    kind: String,
    id: String,
    title: String,
    project_id: Option<String>,
    container_kind: Option<String>,
    container_id: Option<String>,
    created_by: String,
    trashed: bool,
    created_at: String,
}

impl RawEntity {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            kind: row.get(0)?,
            id: row.get(1)?,
            title: row.get(2)?,
            project_id: row.get(3)?,
            container_kind: row.get(4)?,
            container_id: row.get(5)?,
            created_by: row.get(6)?,
            trashed: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_entity(self) -> Result<Entity> {
        let container = match (self.container_kind, self.container_id) {
            (Some(kind), Some(id)) => Some(EntityRef::new(kind.parse()?, id)),
            _ => None,
        };

        Ok(Entity {
            kind: self.kind.parse()?,
            id: EntityId::new(self.id),
            title: self.title,
            project_id: self.project_id.map(ProjectId::new),
            container,
            created_by: UserId::new(self.created_by),
            state: if self.trashed {
                EntityState::Trashed
            } else {
                EntityState::Active
            },
            created_at: self.created_at,
        })
    }
}

/// Privilege row before code parsing
struct RawPrivilege {
    user_id: String,
    entity_kind: String,
    entity_id: String,
    codes: [String; 5],
}

impl RawPrivilege {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            entity_kind: row.get(1)?,
            entity_id: row.get(2)?,
            codes: [row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?],
        })
    }

    fn into_record(self) -> Result<PrivilegeRecord> {
        let [full_access, view, edit, trash, restore] = self.codes;
        Ok(PrivilegeRecord {
            user_id: UserId::new(self.user_id),
            entity: EntityRef::new(self.entity_kind.parse()?, self.entity_id),
            privileges: Privileges {
                full_access: PrivilegeValue::from_code(&full_access)?,
                view: PrivilegeValue::from_code(&view)?,
                edit: PrivilegeValue::from_code(&edit)?,
                trash: PrivilegeValue::from_code(&trash)?,
                restore: PrivilegeValue::from_code(&restore)?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::Tier;

    fn storage() -> Storage {
        Storage::in_memory().expect("Failed to create storage")
    }

    #[test]
    fn test_in_memory_storage_schema_version() {
        let storage = storage();
        assert_eq!(storage.get_schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_file_storage_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("warden.db");

        let user = {
            let storage = Storage::open(&path).expect("Failed to open storage");
            storage.create_user("alice", false).unwrap()
        };

        let reopened = Storage::open(&path).expect("Failed to reopen storage");
        assert_eq!(reopened.get_schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
        assert!(reopened.get_user(&user.id).unwrap().is_some());
    }

    #[test]
    fn test_user_groups() {
        let storage = storage();
        let user = storage.create_user("bob", false).unwrap();
        storage.add_user_to_group(&user.id, "students").unwrap();
        storage.add_user_to_group(&user.id, "students").unwrap();

        let loaded = storage.get_user(&user.id).unwrap().unwrap();
        assert_eq!(loaded.groups, vec!["students".to_string()]);

        storage.add_group_permission("students", "add_note_without_project").unwrap();
        assert!(storage
            .groups_have_permission(&loaded.groups, "add_note_without_project")
            .unwrap());
        assert!(!storage
            .groups_have_permission(&loaded.groups, "add_task_without_project")
            .unwrap());
        assert!(!storage.groups_have_permission(&[], "add_note_without_project").unwrap());
    }

    #[test]
    fn test_project_paths_and_ancestors() {
        let storage = storage();
        let root = storage.create_project("root", None).unwrap();
        let child = storage.create_project("child", Some(&root.id)).unwrap();
        let grandchild = storage.create_project("grandchild", Some(&child.id)).unwrap();

        assert_eq!(grandchild.path, format!("/{}/{}/{}/", root.id, child.id, grandchild.id));
        assert_eq!(
            storage.project_ancestors(&grandchild.id).unwrap(),
            vec![grandchild.id.clone(), child.id.clone(), root.id.clone()]
        );
        assert!(storage
            .project_ancestors(&ProjectId::new("missing"))
            .unwrap()
            .is_empty());
        assert!(storage
            .create_project("orphan", Some(&ProjectId::new("missing")))
            .is_err());
    }

    #[test]
    fn test_role_assignment_upsert() {
        let storage = storage();
        let project = storage.create_project("p", None).unwrap();
        let member = storage.create_role("Member", &["view_task"]).unwrap();
        let manager = storage.create_role("Manager", &["view_task", "change_task"]).unwrap();
        let user = UserId::new("u1");

        storage.assign_role(&user, &project.id, &member.id).unwrap();
        storage.assign_role(&user, &project.id, &manager.id).unwrap();

        let assignments = storage
            .assignments_on(std::slice::from_ref(&project.id), Some(&user))
            .unwrap();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].role_id, manager.id);

        let role = storage.get_role(&manager.id).unwrap().unwrap();
        assert!(role.has_permission("change_task"));

        assert!(storage.unassign_role(&user, &project.id).unwrap());
        assert!(!storage.unassign_role(&user, &project.id).unwrap());
    }

    #[test]
    fn test_entity_with_owner_is_atomic() {
        let storage = storage();
        let owner = UserId::new("owner");
        let task = NewEntity::new(EntityKind::Task, "Write report");

        let entity = storage.insert_entity_with_owner(&task, &owner).unwrap();
        let record = storage
            .get_privilege(&owner, &entity.reference())
            .unwrap()
            .expect("owner record");
        assert!(record.has_full_access());

        // a duplicate insert fails as a whole and leaves the original intact
        assert!(storage.insert_entity_with_owner(&task, &UserId::new("other")).is_err());
        assert!(storage
            .get_privilege(&UserId::new("other"), &entity.reference())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_upsert_privilege_normalizes_and_is_unique() {
        let storage = storage();
        let entity = storage
            .insert_entity_with_owner(&NewEntity::new(EntityKind::Note, "n"), &UserId::new("o"))
            .unwrap();
        let user = UserId::new("u1");

        let record = PrivilegeRecord::new(
            user.clone(),
            entity.reference(),
            Privileges::neutral().allow(Tier::Restore),
        );
        let stored = storage.upsert_privilege(&record).unwrap();
        assert_eq!(stored.privileges.view, PrivilegeValue::Allow);

        let replaced = PrivilegeRecord::new(
            user.clone(),
            entity.reference(),
            Privileges::neutral().deny(Tier::View),
        );
        storage.upsert_privilege(&replaced).unwrap();

        let records = storage.privileges_for_entity(&entity.reference()).unwrap();
        assert_eq!(records.len(), 2);
        let loaded = storage.get_privilege(&user, &entity.reference()).unwrap().unwrap();
        assert_eq!(loaded.privileges.restore, PrivilegeValue::Deny);

        assert!(storage.delete_privilege(&user, &entity.reference()).unwrap());
        assert!(!storage.delete_privilege(&user, &entity.reference()).unwrap());
    }

    #[test]
    fn test_privilege_requires_existing_entity() {
        let storage = storage();
        let record = PrivilegeRecord::owner(
            UserId::new("u"),
            EntityRef::new(EntityKind::Task, "ghost"),
        );
        assert!(storage.upsert_privilege(&record).is_err());
    }

    #[test]
    fn test_delete_entity_removes_privileges() {
        let storage = storage();
        let entity = storage
            .insert_entity_with_owner(&NewEntity::new(EntityKind::Meeting, "m"), &UserId::new("o"))
            .unwrap();

        assert!(storage.delete_entity(&entity.reference()).unwrap());
        assert!(storage.get_entity(&entity.reference()).unwrap().is_none());
        assert!(storage.privileges_for_entity(&entity.reference()).unwrap().is_empty());
    }

    #[test]
    fn test_entity_state_and_queries() {
        let storage = storage();
        let owner = UserId::new("o");
        let project = storage.create_project("p", None).unwrap();
        let a = storage
            .insert_entity_with_owner(
                &NewEntity::new(EntityKind::Task, "a").in_project(project.id.clone()),
                &owner,
            )
            .unwrap();
        let b = storage
            .insert_entity_with_owner(&NewEntity::new(EntityKind::Task, "b"), &owner)
            .unwrap();

        assert!(storage.set_entity_state(&b.reference(), EntityState::Trashed).unwrap());

        let active = storage
            .query_entity_ids(&EntityQuery::new(EntityKind::Task).active())
            .unwrap();
        assert_eq!(active, vec![a.id.clone()]);

        let trashed = storage
            .query_entities(&EntityQuery::new(EntityKind::Task).trashed())
            .unwrap();
        assert_eq!(trashed.len(), 1);
        assert!(trashed[0].is_trashed());

        let in_project = EntityQuery::new(EntityKind::Task).in_project(&project.id);
        assert_eq!(storage.count_entities(&in_project).unwrap(), 1);
        assert_eq!(storage.count_entities(&EntityQuery::new(EntityKind::Note)).unwrap(), 0);
    }

    #[test]
    fn test_missing_full_access_and_repair_grant() {
        let storage = storage();
        let creator = UserId::new("creator");
        let orphan = storage
            .insert_entity(&NewEntity::new(EntityKind::Dmp, "plan"), &creator)
            .unwrap();
        // structural kinds are never reported
        storage
            .insert_entity(
                &NewEntity::new(EntityKind::KanbanColumn, "todo")
                    .in_container(EntityRef::new(EntityKind::KanbanBoard, "b")),
                &creator,
            )
            .unwrap();

        let missing = storage.entities_missing_full_access().unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id, orphan.id);

        assert!(storage.grant_full_access_if_missing(&creator, &orphan.reference()).unwrap());
        assert!(!storage.grant_full_access_if_missing(&creator, &orphan.reference()).unwrap());
        assert!(storage.entities_missing_full_access().unwrap().is_empty());
        assert_eq!(
            storage.full_access_holders(&orphan.reference()).unwrap(),
            vec![creator]
        );
    }

    #[test]
    fn test_migration_v2_is_idempotent() {
        let storage = storage();
        let conn = storage.conn().unwrap();

        Storage::migrate_v2(&conn).unwrap();
        Storage::migrate_v2(&conn).unwrap();

        let columns: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('entities') WHERE name = 'trashed_at'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(columns, 1);
    }

    #[test]
    fn test_last_full_access_holder_cannot_be_removed() {
        let storage = storage();
        let owner = UserId::new("owner");
        let note = storage
            .insert_entity_with_owner(&NewEntity::new(EntityKind::Note, "n"), &owner)
            .unwrap()
            .reference();

        assert!(matches!(
            storage.delete_privilege(&owner, &note),
            Err(Error::Validation(_))
        ));
        let downgrade = PrivilegeRecord::new(
            owner.clone(),
            note.clone(),
            Privileges::neutral().allow(Tier::View),
        );
        assert!(matches!(
            storage.upsert_privilege_keeping_holder(&downgrade),
            Err(Error::Validation(_))
        ));
        assert_eq!(storage.full_access_holders(&note).unwrap(), vec![owner.clone()]);

        // re-granting full access to the holder is fine
        storage
            .upsert_privilege_keeping_holder(&PrivilegeRecord::owner(owner.clone(), note.clone()))
            .unwrap();
    }

    #[test]
    fn test_cross_revokes_keep_one_holder() {
        let storage = storage();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        let note = storage
            .insert_entity_with_owner(&NewEntity::new(EntityKind::Note, "n"), &alice)
            .unwrap()
            .reference();
        storage
            .upsert_privilege(&PrivilegeRecord::owner(bob.clone(), note.clone()))
            .unwrap();

        assert!(storage.delete_privilege(&bob, &note).unwrap());
        assert!(matches!(
            storage.delete_privilege(&alice, &note),
            Err(Error::Validation(_))
        ));
        assert_eq!(storage.full_access_holders(&note).unwrap(), vec![alice]);
    }

    #[test]
    fn test_concurrent_cross_revokes_keep_one_holder() {
        let storage = storage();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        let note = storage
            .insert_entity_with_owner(&NewEntity::new(EntityKind::Note, "n"), &alice)
            .unwrap()
            .reference();
        storage
            .upsert_privilege(&PrivilegeRecord::owner(bob.clone(), note.clone()))
            .unwrap();

        let barrier = std::sync::Barrier::new(2);
        let results: Vec<Result<bool>> = std::thread::scope(|scope| {
            let handles: Vec<_> = [&alice, &bob]
                .into_iter()
                .map(|target| {
                    let (storage, note, barrier) = (&storage, &note, &barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        storage.delete_privilege(target, note)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| matches!(r, Ok(true))).count(), 1);
        assert_eq!(
            results.iter().filter(|r| matches!(r, Err(Error::Validation(_)))).count(),
            1
        );
        assert_eq!(storage.full_access_holders(&note).unwrap().len(), 1);
    }
}
