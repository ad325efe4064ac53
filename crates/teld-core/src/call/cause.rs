//! Disconnect cause classification.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a connection ended (or will end).
///
/// `NotDisconnected` is the resting value carried by live legs; some
/// causes (`Local`, `InvalidNumber`) are staged on a live leg before the
/// drop is observed in a poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectCause {
    /// The leg has not been disconnected.
    NotDisconnected,
    /// Incoming call never answered and dropped without a local hangup.
    IncomingMissed,
    /// Incoming call dropped after a local hangup request.
    IncomingRejected,
    /// This side hung up.
    Local,
    /// The dialed address was empty or contained wildcard material.
    InvalidNumber,
    /// Ordinary network call clearing.
    Normal,
    /// Remote end busy.
    Busy,
    /// Network congestion / resource shortage.
    Congestion,
    /// Terminated for an unspecified or internal error.
    ErrorUnspecified,
    /// Leg was abandoned in a transient tracking state (e.g. a handover
    /// that never completed).
    NotValid,
}

impl DisconnectCause {
    /// Causes that bypass the network fail-cause lookup when a leg drops.
    #[must_use]
    pub const fn skips_cause_lookup(self) -> bool {
        matches!(self, Self::Local | Self::InvalidNumber)
    }
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotDisconnected => "NOT_DISCONNECTED",
            Self::IncomingMissed => "INCOMING_MISSED",
            Self::IncomingRejected => "INCOMING_REJECTED",
            Self::Local => "LOCAL",
            Self::InvalidNumber => "INVALID_NUMBER",
            Self::Normal => "NORMAL",
            Self::Busy => "BUSY",
            Self::Congestion => "CONGESTION",
            Self::ErrorUnspecified => "ERROR_UNSPECIFIED",
            Self::NotValid => "NOT_VALID",
        };
        write!(f, "{name}")
    }
}
