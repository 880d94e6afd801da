//! Permission system for Warden
//!
//! - `algebra`: tri-state 값, tier 전파 규칙, last-writer-wins 병합
//! - `record`: 저장된 PrivilegeRecord 및 병합 결과 (ResolvedPrivilege)
//!
//! ## 사용 예시
//!
//! ```rust
//! use warden_foundation::permission::{Privileges, Tier};
//!
//! let record = Privileges::neutral().allow(Tier::Restore).normalized();
//! assert!(record.effective(Tier::View));
//!
//! let denied = Privileges::neutral().allow(Tier::Restore).deny(Tier::View);
//! assert!(!denied.effective(Tier::Edit));
//! ```

mod algebra;
mod record;

pub use algebra::{PrivilegeValue, Privileges, Tier};
pub use record::{PrivilegeRecord, PrivilegeSource, ResolvedPrivilege};
