//! Context Privilege Providers
//!
//! 컨테이너 관계에서 권한을 유도하는 pluggable resolver 모음입니다.
//!
//! - `traits.rs`: `ContextProvider` trait, `ContextFilter`
//! - `registry.rs`: 엔티티 종류별 provider 등록 (execution order 오름차순)
//! - `builtin/`: LabBook, Kanban, Drive/Directory provider
//!
//! ## 사용 예시
//!
//! ```ignore
//! let mut registry = ContextProviderRegistry::with_builtins();
//! registry.register(&[EntityKind::Task], Arc::new(MyProvider), 100);
//!
//! let engine = PrivilegeEngine::new(storage, Arc::new(registry));
//! ```

pub mod builtin;
mod registry;
mod traits;

pub use registry::{ContextProviderRegistry, RegisteredProvider};
pub use traits::{ContextFilter, ContextProvider};
