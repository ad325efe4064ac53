//! Call-state error taxonomy.

use thiserror::Error;

/// User-actionable call errors, raised synchronously at the operation
/// boundary. The reason code reaches the caller verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CallStateError {
    /// The modem is not powered.
    #[error("modem not powered")]
    PowerOff,

    /// Calling is disabled by device policy.
    #[error("calling disabled by device policy")]
    CallingDisabled,

    /// A call is already dialing.
    #[error("a call is already dialing")]
    AlreadyDialing,

    /// Cannot place a call while one is ringing.
    #[error("cannot dial while a call is ringing")]
    CallRinging,

    /// Both non-ringing call slots are occupied for this technology.
    #[error("there is already a foreground and background call")]
    TooManyCalls,

    /// An OTASP provisioning call is in process.
    #[error("OTASP provisioning is in process")]
    OtaspProvisioning,

    /// The foreground call could not be cleared for the new dial.
    #[error("cannot dial in current state")]
    CannotDialInState,

    /// Answer/reject attempted while nothing is ringing.
    #[error("phone not ringing")]
    NotRinging,

    /// Switch attempted while an incoming call is ringing.
    #[error("cannot switch while in the incoming state")]
    IncomingRinging,

    /// The referenced connection is not tracked here.
    #[error("connection does not belong to this tracker")]
    ForeignConnection,

    /// The referenced call slot has no connections.
    #[error("no connections in call")]
    EmptyCall,

    /// No live connection with the requested radio index.
    #[error("no connection found for radio index")]
    IndexNotFound,
}
