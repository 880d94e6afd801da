//! warden-core: Privilege Resolution Engine
//!
//! Layer2 - 권한 판단 레이어
//!
//! # 주요 모듈
//!
//! - `role`: 프로젝트 계층 역할에서 기본 권한 유도
//! - `context`: 컨테이너 기반 Context Provider 와 레지스트리
//! - `engine`: role → direct → context 병합, point check 및 SQL 필터
//! - `protection`: 생성 / 휴지통 / 복원 / 영구 삭제, 권한 부여 관리
//! - `repair`: full access 보유자 누락 복구
//!
//! # 사용 예시
//!
//! ```ignore
//! use warden_core::{ContextProviderRegistry, EntityProtection, PrivilegeEngine};
//!
//! let storage = Arc::new(Storage::open(&config.db_path())?);
//! let registry = Arc::new(ContextProviderRegistry::with_builtins());
//! let engine = Arc::new(PrivilegeEngine::with_config(storage, registry, &config));
//!
//! // point check
//! if engine.is_allowed(&user, &task, Tier::Edit)? {
//!     // ...
//! }
//!
//! // 컬렉션: 보이는 태스크만 하나의 쿼리로
//! let query = engine.viewable(&user, EntityKind::Task)?.active();
//! let tasks = engine.storage().query_entities(&query)?;
//!
//! // lifecycle
//! let protection = EntityProtection::new(engine.clone());
//! protection.trash(&user, &task)?;
//! ```

pub mod context;
pub mod engine;
pub mod protection;
pub mod repair;
pub mod role;

// Re-exports: Context Providers
pub use context::{ContextFilter, ContextProvider, ContextProviderRegistry, RegisteredProvider};

// Re-exports: Engine
pub use engine::{PrivilegeEngine, PrivilegeMap, ResolveContext, Scope};

// Re-exports: Protection / Repair
pub use protection::EntityProtection;
pub use repair::{RepairJob, RepairReport};

// Re-exports: Role
pub use role::{ProjectRoleResolver, RoleGrant};
