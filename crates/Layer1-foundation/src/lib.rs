//! # warden-foundation
//!
//! Foundation layer for Warden:
//! - Core: 사용자, 프로젝트, 역할 등 식별 타입
//! - Entity: 보호 대상 엔티티 종류와 capability
//! - Permission: tri-state 권한 대수 (tier 전파, last-writer-wins 병합)
//! - Storage: SQLite (런타임), SQL 필터 조합, JsonStore (설정)
//! - Config: 통합 설정 (EngineConfig)
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Privilege Engine (warden-core)                         │
//! │  ├── Project Role Resolver                              │
//! │  └── Context Providers (LabBook, Kanban, Drive...)      │
//! │                     │                                   │
//! │                     ▼                                   │
//! │        Permission Algebra (Allow/Deny/Neutral)          │
//! │                     │                                   │
//! │          ┌─────────┴─────────┐                         │
//! │          ▼                   ▼                         │
//! │   Storage (SQLite)     SqlFilter / EntityQuery          │
//! │   (records, rows)      (set-based visibility)          │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod core;
pub mod entity;
pub mod error;
pub mod permission;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Core (식별 타입)
// ============================================================================
pub use core::{EntityId, Project, ProjectId, Role, RoleAssignment, RoleId, User, UserId};

// ============================================================================
// Entity
// ============================================================================
pub use entity::{Capabilities, Entity, EntityKind, EntityRef, EntityState, NewEntity};

// ============================================================================
// Permission (권한 대수)
// ============================================================================
pub use permission::{
    PrivilegeRecord, PrivilegeSource, PrivilegeValue, Privileges, ResolvedPrivilege, Tier,
};

// ============================================================================
// Storage
// ============================================================================
pub use storage::{fragments, EntityQuery, JsonStore, SqlFilter, StateFilter, Storage};

// ============================================================================
// Config
// ============================================================================
pub use config::{EngineConfig, RepairConfig, StorageConfig};
