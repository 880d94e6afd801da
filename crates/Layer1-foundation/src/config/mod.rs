//! Config - 엔진 설정 관리
//!
//! - `engine.rs` - EngineConfig 통합 설정 (containment depth, repair, storage)

mod engine;

pub use engine::{
    ConfigLayer, EngineConfig, RepairConfig, RepairLayer, StorageConfig, CONFIG_FILE, DEFAULT_DB_FILE,
    DEFAULT_MAX_CONTAINMENT_DEPTH,
};
