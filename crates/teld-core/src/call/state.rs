//! Call and phone state enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of a call or of a single call leg.
///
/// `Idle` only ever describes an empty call; a live leg is never idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    /// No connections.
    Idle,
    /// Connected and audio path established.
    Active,
    /// On hold.
    Holding,
    /// Outgoing, dial sent, no progress indication yet.
    Dialing,
    /// Outgoing, remote end is ringing.
    Alerting,
    /// Incoming, this end is ringing.
    Incoming,
    /// Incoming while another call is up (call waiting).
    Waiting,
    /// Terminated.
    Disconnected,
    /// Teardown requested, awaiting confirmation.
    Disconnecting,
}

impl CallState {
    /// A leg in this state still participates in the call session.
    #[must_use]
    pub const fn is_alive(self) -> bool {
        !matches!(
            self,
            Self::Idle | Self::Disconnected | Self::Disconnecting
        )
    }

    /// Incoming-side ringing states.
    #[must_use]
    pub const fn is_ringing(self) -> bool {
        matches!(self, Self::Incoming | Self::Waiting)
    }

    /// Outgoing-side pre-connect states.
    #[must_use]
    pub const fn is_dialing(self) -> bool {
        matches!(self, Self::Dialing | Self::Alerting)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Active => "ACTIVE",
            Self::Holding => "HOLDING",
            Self::Dialing => "DIALING",
            Self::Alerting => "ALERTING",
            Self::Incoming => "INCOMING",
            Self::Waiting => "WAITING",
            Self::Disconnected => "DISCONNECTED",
            Self::Disconnecting => "DISCONNECTING",
        };
        write!(f, "{name}")
    }
}

/// Phone-wide voice state, derived from the three call roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhoneState {
    /// No voice activity.
    Idle,
    /// An incoming call is ringing (or waiting).
    Ringing,
    /// At least one call is up or being set up, and nothing is ringing.
    Offhook,
}

impl fmt::Display for PhoneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Ringing => "RINGING",
            Self::Offhook => "OFFHOOK",
        };
        write!(f, "{name}")
    }
}
