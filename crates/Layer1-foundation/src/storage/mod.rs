//! Storage module for Warden
//!
//! - `db`: SQLite - 런타임 데이터 (사용자, 프로젝트, 역할, 엔티티, 권한 레코드)
//! - `filter`: 컬렉션 쿼리와 SQL 필터 조합
//! - `json`: JSON - 설정 파일 저장/로드

mod db;
mod filter;
mod json;

// SQLite Storage (런타임 데이터)
pub use db::Storage;

// 쿼리 조합
pub use filter::{fragments, EntityQuery, SqlFilter, StateFilter};

// JSON Storage (설정)
pub use json::{JsonStore, PROJECT_DIR};
