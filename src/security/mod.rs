//! Secondary authentication for secure device categories

use crate::config::BridgeConfig;
use crate::services::Category;

/// Result of checking a command against the two-factor policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// No challenge required, or the supplied pin matched
    Pass,
    /// A pin is required and none was supplied
    PinNeeded,
    /// A pin was supplied but did not match
    PinFailed,
}

impl ChallengeOutcome {
    /// Challenge type reported to the assistant
    pub fn challenge_type(&self) -> Option<&'static str> {
        match self {
            ChallengeOutcome::Pass => None,
            ChallengeOutcome::PinNeeded => Some("pinNeeded"),
            ChallengeOutcome::PinFailed => Some("challengeFailedPinNeeded"),
        }
    }
}

/// Pin gate for secure categories (locks, doors, windows, garage doors and
/// security systems)
#[derive(Debug, Clone, Default)]
pub struct TwoFactorPolicy {
    pin: Option<String>,
    waive: bool,
}

impl TwoFactorPolicy {
    pub fn new(pin: Option<String>, waive: bool) -> Self {
        Self {
            pin: pin.filter(|p| !p.trim().is_empty()),
            waive,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(
            config.two_factor_auth_pin.clone(),
            config.disable_pin_code_requirement,
        )
    }

    /// Whether discovery must leave services of this category out
    pub fn hides(&self, category: Category) -> bool {
        category.is_secure() && self.pin.is_none() && !self.waive
    }

    /// Check a command's challenge pin
    pub fn check(&self, category: Category, supplied: Option<&str>) -> ChallengeOutcome {
        let Some(expected) = self.pin.as_deref() else {
            return ChallengeOutcome::Pass;
        };
        if !category.is_secure() {
            return ChallengeOutcome::Pass;
        }
        match supplied {
            None => ChallengeOutcome::PinNeeded,
            Some(pin) if pin == expected => ChallengeOutcome::Pass,
            Some(_) => ChallengeOutcome::PinFailed,
        }
    }
}
