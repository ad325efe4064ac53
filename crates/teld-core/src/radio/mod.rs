//! Modem gateway abstraction.
//!
//! Every request is asynchronous: the caller passes a correlation token
//! and the gateway later posts a completion event carrying the same token
//! to the tracker's mailbox. Unsolicited indications (call state changed,
//! radio availability) arrive as events without a token.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Correlation token for an in-flight radio request.
pub type OpToken = u64;

/// State of one entry in the modem's current-call list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverCallState {
    Active,
    Holding,
    Dialing,
    Alerting,
    Incoming,
    Waiting,
}

/// One entry of the modem's authoritative call list.
///
/// The list is sorted ascending by index and may be sparse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverCall {
    /// 1-based radio call index.
    pub index: u8,
    pub state: DriverCallState,
    /// Mobile-terminated (network-originated) call.
    pub is_mt: bool,
    pub address: String,
    pub multiparty: bool,
}

impl fmt::Display for DriverCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id={} {:?} mt={} mpty={} addr={}",
            self.index,
            self.state,
            self.is_mt,
            self.multiparty,
            crate::diag::pii(&self.address)
        )
    }
}

/// Failure reported by the modem for a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The radio is off or the modem is unreachable. Treated as "all
    /// calls gone", never as a transient failure.
    #[error("radio not available")]
    RadioNotAvailable,
    /// Modem out of memory.
    #[error("no memory")]
    NoMemory,
    /// Modem-internal error.
    #[error("internal error")]
    InternalError,
    /// Modem out of resources.
    #[error("no resources")]
    NoResources,
    /// Unclassified command failure.
    #[error("generic failure")]
    GenericFailure,
    /// The request is not supported by this modem.
    #[error("request not supported")]
    RequestNotSupported,
}

impl CommandError {
    /// Modem-internal resource errors that must not be presented as
    /// ordinary call clearing when they surface from the fail-cause
    /// lookup.
    #[must_use]
    pub const fn is_internal_resource_error(&self) -> bool {
        matches!(
            self,
            Self::RadioNotAvailable | Self::NoMemory | Self::InternalError | Self::NoResources
        )
    }

    /// Short stable name, used as a vendor cause when re-mapping.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RadioNotAvailable => "RADIO_NOT_AVAILABLE",
            Self::NoMemory => "NO_MEMORY",
            Self::InternalError => "INTERNAL_ERR",
            Self::NoResources => "NO_RESOURCES",
            Self::GenericFailure => "GENERIC_FAILURE",
            Self::RequestNotSupported => "REQUEST_NOT_SUPPORTED",
        }
    }
}

/// Network-reported cause of the most recent call failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailCause {
    UnobtainableNumber,
    NormalClearing,
    UserBusy,
    NoCircuitAvail,
    TemporaryFailure,
    SwitchingCongestion,
    ChannelNotAvail,
    QosNotAvail,
    BearerNotAvail,
    ErrorUnspecified,
    /// Any cause code without a dedicated variant.
    Other(i32),
}

impl FailCause {
    /// Decodes the raw network cause code.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            1 => Self::UnobtainableNumber,
            16 => Self::NormalClearing,
            17 => Self::UserBusy,
            34 => Self::NoCircuitAvail,
            41 => Self::TemporaryFailure,
            42 => Self::SwitchingCongestion,
            44 => Self::ChannelNotAvail,
            49 => Self::QosNotAvail,
            58 => Self::BearerNotAvail,
            0xffff => Self::ErrorUnspecified,
            other => Self::Other(other),
        }
    }
}

/// Payload of the last-call-fail-cause response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastCallFailCause {
    pub cause: FailCause,
    pub vendor_cause: Option<String>,
}

/// Caller-line-identification-restriction mode for an outgoing dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClirMode {
    /// Use the subscription default.
    #[default]
    Default,
    /// Restrict the caller line identity for this call.
    Invocation,
    /// Allow the caller line identity for this call (forced for
    /// emergency dials).
    Suppression,
}

/// Parameters of an outgoing dial request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialRequest {
    pub address: String,
    pub clir: ClirMode,
    pub is_emergency: bool,
    pub has_known_user_intent_emergency: bool,
}

/// Abstract modem gateway.
///
/// All call-management requests complete asynchronously through the
/// tracker's event mailbox; implementations must not invoke the tracker
/// re-entrantly from within a request method.
pub trait RadioGateway: Send + Sync {
    /// Whether the radio is powered on.
    fn radio_on(&self) -> bool;

    /// Requests the current call list; completes as a poll-result event
    /// carrying `token`.
    fn get_current_calls(&self, token: OpToken);

    fn dial(&self, request: DialRequest, token: OpToken);
    fn accept_call(&self, token: OpToken);
    fn reject_call(&self, token: OpToken);
    fn hangup_connection(&self, index: u8, token: OpToken);
    fn hangup_waiting_or_background(&self, token: OpToken);
    fn hangup_foreground_resume_background(&self, token: OpToken);
    fn switch_waiting_or_holding_and_active(&self, token: OpToken);
    fn conference(&self, token: OpToken);
    fn explicit_call_transfer(&self, token: OpToken);
    fn separate_connection(&self, index: u8, token: OpToken);
    fn get_last_call_fail_cause(&self, token: OpToken);

    /// CDMA supplementary services are driven by FLASH feature codes; an
    /// empty code is a bare flash.
    fn send_cdma_feature_code(&self, code: &str, token: OpToken);

    /// Sends one DTMF character on the active call.
    fn send_dtmf(&self, c: char, token: OpToken);

    /// Mute control carries no completion.
    fn set_mute(&self, mute: bool);
}
