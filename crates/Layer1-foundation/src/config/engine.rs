//! Engine Config - 통합 설정
//!
//! 글로벌 (`<config_dir>/warden/config.json`) → 프로젝트 (`.warden/config.json`)
//! 순서로 병합하며, 명시적 경로가 주어지면 그 파일만 읽는다.

use crate::storage::JsonStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 설정 파일명
pub const CONFIG_FILE: &str = "config.json";

/// 기본 데이터베이스 파일명
pub const DEFAULT_DB_FILE: &str = "warden.db";

/// 컨테이너 체인 최대 깊이 기본값
pub const DEFAULT_MAX_CONTAINMENT_DEPTH: usize = 16;

// ============================================================================
// Engine Config (통합)
// ============================================================================

/// Warden 통합 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// 버전 (마이그레이션용)
    #[serde(default = "default_version")]
    pub version: u32,

    /// Context provider가 따라가는 컨테이너 체인의 최대 깊이
    #[serde(default = "default_max_containment_depth")]
    pub max_containment_depth: usize,

    /// Full-access repair sweep
    #[serde(default)]
    pub repair: RepairConfig,

    /// SQLite 저장소
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            max_containment_depth: DEFAULT_MAX_CONTAINMENT_DEPTH,
            repair: RepairConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 글로벌 + 프로젝트 병합 로드
    pub fn load() -> Result<Self> {
        // 1. 글로벌 설정, 2. 프로젝트 설정
        let stores = [JsonStore::global().ok(), JsonStore::current_project().ok()];
        Self::load_layered(stores.into_iter().flatten())
    }

    /// 각 store의 `config.json`을 순서대로 덮어쓴다 (없는 파일은 건너뜀)
    fn load_layered(stores: impl IntoIterator<Item = JsonStore>) -> Result<Self> {
        let mut config = Self::new();
        for store in stores {
            if let Some(layer) = store.load_optional::<ConfigLayer>(CONFIG_FILE)? {
                config.merge(layer);
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// 명시적 경로에서 로드 (파일이 반드시 존재해야 함)
    pub fn load_from(path: &Path) -> Result<Self> {
        let (store, filename) = JsonStore::at_file(path)?;
        let mut config = Self::new();
        config.merge(store.load::<ConfigLayer>(&filename)?);
        config.validate()?;
        Ok(config)
    }

    /// 프로젝트 설정 저장
    pub fn save_project(&self) -> Result<()> {
        let store = JsonStore::current_project()?;
        store.save(CONFIG_FILE, self)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let (store, filename) = JsonStore::at_file(path)?;
        store.save(&filename, self)
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// 레이어에 적힌 값만 덮어쓴다 (기본값과 같은 값이어도 적혀 있으면 적용)
    pub fn merge(&mut self, layer: ConfigLayer) {
        if let Some(version) = layer.version {
            self.version = version;
        }
        if let Some(depth) = layer.max_containment_depth {
            self.max_containment_depth = depth;
        }
        self.repair.merge(layer.repair);
        self.storage.merge(layer.storage);
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_containment_depth == 0 {
            return Err(Error::Config(
                "maxContainmentDepth must be at least 1".to_string(),
            ));
        }
        if self.repair.interval_secs == 0 {
            return Err(Error::Config(
                "repair.intervalSecs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// 실제 사용할 데이터베이스 경로
    ///
    /// 설정값이 없으면 `<data_dir>/warden/warden.db`, 데이터 디렉토리도
    /// 없으면 현재 디렉토리의 `warden.db`.
    pub fn db_path(&self) -> PathBuf {
        if let Some(path) = &self.storage.db_path {
            return path.clone();
        }
        dirs::data_dir()
            .map(|dir| dir.join("warden").join(DEFAULT_DB_FILE))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE))
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn max_containment_depth(mut self, depth: usize) -> Self {
        self.max_containment_depth = depth;
        self
    }

    pub fn db_path_override(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage.db_path = Some(path.into());
        self
    }
}

// ============================================================================
// Repair Config
// ============================================================================

/// Repair sweep 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairConfig {
    /// `repair --watch` 주기 실행 활성화
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 실행 간격 (초)
    #[serde(default = "default_repair_interval")]
    pub interval_secs: u64,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_repair_interval(),
        }
    }
}

impl RepairConfig {
    fn merge(&mut self, layer: RepairLayer) {
        if let Some(enabled) = layer.enabled {
            self.enabled = enabled;
        }
        if let Some(interval_secs) = layer.interval_secs {
            self.interval_secs = interval_secs;
        }
    }
}

// ============================================================================
// Storage Config
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// SQLite 파일 경로
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

impl StorageConfig {
    fn merge(&mut self, other: StorageConfig) {
        if other.db_path.is_some() {
            self.db_path = other.db_path;
        }
    }
}

// ============================================================================
// Config Layer (파일 하나 분량)
// ============================================================================

/// 설정 파일 하나에 실제로 적힌 값. 빠진 필드는 아래 레이어의 값을 유지한다.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigLayer {
    pub version: Option<u32>,
    pub max_containment_depth: Option<usize>,
    #[serde(default)]
    pub repair: RepairLayer,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairLayer {
    pub enabled: Option<bool>,
    pub interval_secs: Option<u64>,
}

fn default_version() -> u32 {
    1
}

fn default_max_containment_depth() -> usize {
    DEFAULT_MAX_CONTAINMENT_DEPTH
}

fn default_repair_interval() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::new();
        assert_eq!(config.version, 1);
        assert_eq!(config.max_containment_depth, 16);
        assert!(config.repair.enabled);
        assert_eq!(config.repair.interval_secs, 300);
        assert!(config.storage.db_path.is_none());
    }

    #[test]
    fn test_parse_partial_camel_case() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "maxContainmentDepth": 4, "repair": { "intervalSecs": 60 } }"#)
                .unwrap();
        assert_eq!(config.max_containment_depth, 4);
        assert_eq!(config.repair.interval_secs, 60);
        assert!(config.repair.enabled);
    }

    fn layer(json: &str) -> ConfigLayer {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_config_merge() {
        let mut base = EngineConfig::new();
        base.merge(layer(r#"{ "maxContainmentDepth": 8, "repair": { "enabled": false } }"#));
        base.merge(layer(r#"{ "storage": { "dbPath": "/tmp/lab.db" } }"#));

        // fields absent from the overlay keep the base value
        assert_eq!(base.max_containment_depth, 8);
        assert!(!base.repair.enabled);
        assert_eq!(base.storage.db_path, Some(PathBuf::from("/tmp/lab.db")));
    }

    #[test]
    fn test_merge_applies_explicit_default_values() {
        let mut base = EngineConfig::new();
        base.merge(layer(r#"{ "maxContainmentDepth": 4, "repair": { "intervalSecs": 60 } }"#));
        base.merge(layer(
            r#"{ "maxContainmentDepth": 16, "repair": { "intervalSecs": 300, "enabled": true } }"#,
        ));

        assert_eq!(base.max_containment_depth, DEFAULT_MAX_CONTAINMENT_DEPTH);
        assert_eq!(base.repair.interval_secs, 300);
        assert!(base.repair.enabled);
    }

    #[test]
    fn test_project_layer_overrides_global_layer() {
        let global = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        std::fs::write(
            global.path().join(CONFIG_FILE),
            r#"{ "maxContainmentDepth": 4, "repair": { "enabled": false } }"#,
        )
        .unwrap();
        std::fs::write(
            project.path().join(CONFIG_FILE),
            r#"{ "maxContainmentDepth": 16 }"#,
        )
        .unwrap();

        let config = EngineConfig::load_layered([
            JsonStore::new(global.path()),
            JsonStore::new(project.path()),
        ])
        .unwrap();
        assert_eq!(config.max_containment_depth, 16);
        assert!(!config.repair.enabled);
        assert_eq!(config.repair.interval_secs, 300);
    }

    #[test]
    fn test_load_layered_skips_missing_files() {
        let empty = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_layered([JsonStore::new(empty.path())]).unwrap();
        assert_eq!(config, EngineConfig::new());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.json");

        EngineConfig::new()
            .max_containment_depth(3)
            .save_to(&path)
            .unwrap();

        let loaded = EngineConfig::load_from(&path).unwrap();
        assert_eq!(loaded.max_containment_depth, 3);
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EngineConfig::load_from(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_zero_depth_is_rejected() {
        let config = EngineConfig::new().max_containment_depth(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_db_path_override() {
        let config = EngineConfig::new().db_path_override("data/test.db");
        assert_eq!(config.db_path(), PathBuf::from("data/test.db"));
    }
}
