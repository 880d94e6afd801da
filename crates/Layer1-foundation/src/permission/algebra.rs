//! 권한 대수 (tri-state + tier 전파)
//!
//! Tiers are ordered `VIEW < EDIT < TRASH < RESTORE`; `FULL_ACCESS` sits above
//! all of them. Every value is one of ALLOW / DENY / NEUTRAL and NEUTRAL
//! resolves to "not granted".

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// PrivilegeValue
// ============================================================================

/// Tri-state privilege value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrivilegeValue {
    Allow,
    Deny,
    #[default]
    Neutral,
}

impl PrivilegeValue {
    /// 저장용 코드
    pub fn code(&self) -> &'static str {
        match self {
            Self::Allow => "AL",
            Self::Deny => "DE",
            Self::Neutral => "NE",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "AL" => Ok(Self::Allow),
            "DE" => Ok(Self::Deny),
            "NE" => Ok(Self::Neutral),
            other => Err(Error::Storage(format!("Unknown privilege code: {}", other))),
        }
    }

    pub fn is_allow(&self) -> bool {
        *self == Self::Allow
    }

    pub fn is_deny(&self) -> bool {
        *self == Self::Deny
    }

    pub fn is_set(&self) -> bool {
        *self != Self::Neutral
    }
}

impl fmt::Display for PrivilegeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Neutral => "neutral",
        };
        f.write_str(s)
    }
}

impl FromStr for PrivilegeValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "allow" | "al" => Ok(Self::Allow),
            "deny" | "de" => Ok(Self::Deny),
            "neutral" | "ne" => Ok(Self::Neutral),
            other => Err(Error::InvalidInput(format!(
                "Unknown privilege value: {}",
                other
            ))),
        }
    }
}

// ============================================================================
// Tier
// ============================================================================

/// Action-capability level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    View,
    Edit,
    Trash,
    Restore,
    FullAccess,
}

impl Tier {
    /// The four ordered tiers, lowest first (without the full-access super-tier).
    pub const ORDERED: [Tier; 4] = [Tier::View, Tier::Edit, Tier::Trash, Tier::Restore];

    pub fn all() -> [Tier; 5] {
        [
            Tier::FullAccess,
            Tier::View,
            Tier::Edit,
            Tier::Trash,
            Tier::Restore,
        ]
    }

    /// Column name in the privilege table.
    pub fn column(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Edit => "edit",
            Self::Trash => "trash",
            Self::Restore => "restore",
            Self::FullAccess => "full_access",
        }
    }

    /// Action part of a role codename (`<action>_<kind>`).
    /// Full access is never derived from a role.
    pub fn codename_action(&self) -> Option<&'static str> {
        match self {
            Self::View => Some("view"),
            Self::Edit => Some("change"),
            Self::Trash => Some("trash"),
            Self::Restore => Some("restore"),
            Self::FullAccess => None,
        }
    }

    /// Position in the ordered chain; `None` for the super-tier.
    fn rank(&self) -> Option<usize> {
        Self::ORDERED.iter().position(|t| t == self)
    }

    /// Tiers at or above this one (inclusive). An ALLOW on any of them
    /// implies an ALLOW on `self`.
    pub fn at_or_above(&self) -> &'static [Tier] {
        match self.rank() {
            Some(rank) => &Self::ORDERED[rank..],
            None => &[],
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Tier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "view" => Ok(Self::View),
            "edit" | "change" => Ok(Self::Edit),
            "trash" => Ok(Self::Trash),
            "restore" => Ok(Self::Restore),
            "full_access" | "full" => Ok(Self::FullAccess),
            other => Err(Error::InvalidInput(format!("Unknown tier: {}", other))),
        }
    }
}

// ============================================================================
// Privileges
// ============================================================================

/// Five tri-state fields of one (user, entity) grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Privileges {
    #[serde(default)]
    pub full_access: PrivilegeValue,
    #[serde(default)]
    pub view: PrivilegeValue,
    #[serde(default)]
    pub edit: PrivilegeValue,
    #[serde(default)]
    pub trash: PrivilegeValue,
    #[serde(default)]
    pub restore: PrivilegeValue,
}

impl Privileges {
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn full_access() -> Self {
        Self::neutral().with(Tier::FullAccess, PrivilegeValue::Allow).normalized()
    }

    pub fn get(&self, tier: Tier) -> PrivilegeValue {
        match tier {
            Tier::FullAccess => self.full_access,
            Tier::View => self.view,
            Tier::Edit => self.edit,
            Tier::Trash => self.trash,
            Tier::Restore => self.restore,
        }
    }

    pub fn set(&mut self, tier: Tier, value: PrivilegeValue) {
        match tier {
            Tier::FullAccess => self.full_access = value,
            Tier::View => self.view = value,
            Tier::Edit => self.edit = value,
            Tier::Trash => self.trash = value,
            Tier::Restore => self.restore = value,
        }
    }

    pub fn with(mut self, tier: Tier, value: PrivilegeValue) -> Self {
        self.set(tier, value);
        self
    }

    pub fn allow(self, tier: Tier) -> Self {
        self.with(tier, PrivilegeValue::Allow)
    }

    pub fn deny(self, tier: Tier) -> Self {
        self.with(tier, PrivilegeValue::Deny)
    }

    /// Apply the propagation rules in place.
    ///
    /// 1. full_access ALLOW → every tier ALLOW
    /// 2. ALLOW propagates downward
    /// 3. DENY propagates upward, after step 2
    pub fn normalize(&mut self) {
        if self.full_access.is_allow() {
            for tier in Tier::ORDERED {
                self.set(tier, PrivilegeValue::Allow);
            }
            return;
        }

        // downward ALLOW: walk from the top, carrying the highest explicit ALLOW
        let mut allow_above = false;
        for tier in Tier::ORDERED.iter().rev() {
            if self.get(*tier).is_allow() {
                allow_above = true;
            } else if allow_above && !self.get(*tier).is_set() {
                self.set(*tier, PrivilegeValue::Allow);
            }
        }

        // upward DENY overrides implied and explicit ALLOWs above it
        let mut deny_below = false;
        for tier in Tier::ORDERED {
            if self.get(tier).is_deny() {
                deny_below = true;
            } else if deny_below {
                self.set(tier, PrivilegeValue::Deny);
            }
        }
    }

    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    /// Effective grant of `tier` on a (normalized or raw) record.
    pub fn effective(&self, tier: Tier) -> bool {
        let normalized = self.normalized();
        if normalized.full_access.is_allow() {
            return true;
        }
        normalized.get(tier).is_allow()
    }

    /// Last-writer-wins overlay: every field `other` explicitly sets
    /// replaces the current value, ALLOW or DENY alike.
    pub fn overlay(&mut self, other: &Privileges) {
        for tier in Tier::all() {
            let value = other.get(tier);
            if value.is_set() {
                self.set(tier, value);
            }
        }
    }

    /// Tiers effectively granted, in `Tier::all()` order.
    pub fn granted_tiers(&self) -> Vec<Tier> {
        Tier::all()
            .into_iter()
            .filter(|tier| self.effective(*tier))
            .collect()
    }

    pub fn is_neutral(&self) -> bool {
        Tier::all().iter().all(|tier| !self.get(*tier).is_set())
    }
}
