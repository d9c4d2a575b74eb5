//! Rotation trigger kinds and their fixed priority order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Why a rotation was (or was not) initiated.
///
/// Ordering follows trigger priority: `Manual > TokenExpired > RateLimited >
/// Scheduled > None`. When several conditions hold at once only the greatest
/// one is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationTrigger {
    TokenExpired,
    RateLimited,
    Scheduled,
    Manual,
    None,
}

impl RotationTrigger {
    /// Triggers that can fire, highest priority first.
    pub const BY_PRIORITY: [RotationTrigger; 4] = [
        RotationTrigger::Manual,
        RotationTrigger::TokenExpired,
        RotationTrigger::RateLimited,
        RotationTrigger::Scheduled,
    ];

    /// Numeric rank; larger wins.
    pub fn priority(self) -> u8 {
        match self {
            RotationTrigger::Manual => 4,
            RotationTrigger::TokenExpired => 3,
            RotationTrigger::RateLimited => 2,
            RotationTrigger::Scheduled => 1,
            RotationTrigger::None => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RotationTrigger::TokenExpired => "token_expired",
            RotationTrigger::RateLimited => "rate_limited",
            RotationTrigger::Scheduled => "scheduled",
            RotationTrigger::Manual => "manual",
            RotationTrigger::None => "none",
        }
    }

    /// Human-facing label used by notifications ("Token Expired").
    pub fn title(self) -> &'static str {
        match self {
            RotationTrigger::TokenExpired => "Token Expired",
            RotationTrigger::RateLimited => "Rate Limited",
            RotationTrigger::Scheduled => "Scheduled",
            RotationTrigger::Manual => "Manual",
            RotationTrigger::None => "None",
        }
    }
}

impl PartialOrd for RotationTrigger {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RotationTrigger {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority().cmp(&other.priority())
    }
}

impl fmt::Display for RotationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RotationTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "token_expired" => Ok(RotationTrigger::TokenExpired),
            "rate_limited" => Ok(RotationTrigger::RateLimited),
            "scheduled" => Ok(RotationTrigger::Scheduled),
            "manual" => Ok(RotationTrigger::Manual),
            "none" => Ok(RotationTrigger::None),
            other => Err(format!("unknown rotation trigger '{other}'")),
        }
    }
}
