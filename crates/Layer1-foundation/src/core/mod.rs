//! Core Module - 핵심 타입
//!
//! 인증 계층과 프로젝트 계층에서 넘어오는 데이터 타입을 정의합니다.
//!
//! - `types.rs`: 식별자 (UserId, ProjectId, RoleId, EntityId), User, Project, Role

pub mod types;

pub use types::{EntityId, Project, ProjectId, Role, RoleAssignment, RoleId, User, UserId};
