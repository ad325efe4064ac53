//! Network technology family strategy.
//!
//! The two circuit-switched families differ in a handful of constants and
//! policies that the shared reconciliation algorithm consumes: slot-array
//! size, per-call membership cap, whether the modem reports an
//! authoritative per-call list, and the call-collision resolution rule.
//! Centralizing them here keeps the tracker free of scattered
//! technology conditionals.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Circuit-switched network technology family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkFamily {
    /// GSM/UMTS/LTE circuit-switched voice.
    Gsm,
    /// CDMA2000 1x voice.
    Cdma,
}

impl NetworkFamily {
    /// Size of the radio-index slot array.
    ///
    /// GSM allows 7 concurrent calls plus 12 transferred in from IMS
    /// during SRVCC handover.
    #[must_use]
    pub const fn max_connections(self) -> usize {
        match self {
            Self::Gsm => 19,
            Self::Cdma => 8,
        }
    }

    /// Hard cap on connections per call.
    #[must_use]
    pub const fn max_connections_per_call(self) -> usize {
        match self {
            Self::Gsm => 5,
            Self::Cdma => 1,
        }
    }

    #[must_use]
    pub const fn is_gsm(self) -> bool {
        matches!(self, Self::Gsm)
    }

    #[must_use]
    pub const fn is_cdma(self) -> bool {
        matches!(self, Self::Cdma)
    }
}

impl fmt::Display for NetworkFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gsm => write!(f, "GSM"),
            Self::Cdma => write!(f, "CDMA"),
        }
    }
}
