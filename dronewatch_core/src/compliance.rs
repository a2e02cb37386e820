//! Registration compliance rule.
//!
//! A registration like `SG-BA` is split on `-`; the second part (or the whole
//! code when there is no hyphen) must start with an upper-case ASCII `B`.

use serde::{Deserialize, Serialize};

/// Compliance class of a registration code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compliance {
    /// Registration passes the rule ("green")
    Allowed,
    /// Missing or failing registration ("red")
    Blocked,
}

impl Compliance {
    /// Classify a registration code.
    pub fn classify(registration: &str) -> Self {
        if is_allowed(registration) {
            Compliance::Allowed
        } else {
            Compliance::Blocked
        }
    }

    pub fn is_allowed(self) -> bool {
        self == Compliance::Allowed
    }

    /// Display colour used by map and list consumers.
    pub fn colour(self) -> &'static str {
        match self {
            Compliance::Allowed => "green",
            Compliance::Blocked => "red",
        }
    }
}

/// Returns true iff the registration passes the compliance rule.
pub fn is_allowed(registration: &str) -> bool {
    if registration.is_empty() {
        return false;
    }

    let mut parts = registration.split('-');
    let first = parts.next().unwrap_or("");
    let inspected = parts.next().unwrap_or(first);

    inspected.as_bytes().first() == Some(&b'B')
}
