//! Error types for Warden
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Warden 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 권한 관련
    // ========================================================================
    /// A required tier was not granted to the acting user.
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// A context provider could not resolve the container of an entity.
    /// Providers swallow this and contribute nothing.
    #[error("Container unresolvable: {0}")]
    ContainerUnresolvable(String),

    /// Integrity violation found by the repair sweep.
    #[error("Missing full access holder: {0}")]
    MissingFullAccessHolder(String),

    /// Permanent deletion attempted by a non-superuser.
    #[error("Hard delete rejected: {0}")]
    HardDeleteRejected(String),

    // ========================================================================
    // 엔티티 상태 관련
    // ========================================================================
    #[error("Invalid state: {0}")]
    InvalidState(String),

    // ========================================================================
    // 저장소 관련
    // ========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 재시도 가능한 에러인지 확인
    ///
    /// Privilege decisions are deterministic given the stored data, so only
    /// a busy database is worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// 사용자에게 보여줄 수 있는 에러인지 확인
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::NotAuthorized(_)
                | Error::HardDeleteRejected(_)
                | Error::InvalidState(_)
                | Error::NotFound(_)
                | Error::InvalidInput(_)
                | Error::Validation(_)
        )
    }

    /// 권한 거부 에러 생성 헬퍼
    pub fn not_authorized(user: impl std::fmt::Display, action: impl std::fmt::Display) -> Self {
        Error::NotAuthorized(format!("user {} may not {}", user, action))
    }
}
