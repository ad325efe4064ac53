//! Call-tracker mailbox messages.

use crate::actor::Responder;
use crate::call::{CallRole, CdmaCallWaitingInfo, ConnId, DisconnectCause, PhoneState};
use crate::radio::{ClirMode, CommandError, DriverCall, LastCallFailCause, OpToken};

use super::error::CallStateError;

/// Arguments of an outgoing dial.
#[derive(Debug, Clone, Default)]
pub struct DialArgs {
    pub clir: ClirMode,
    pub is_emergency: bool,
    pub has_known_user_intent_emergency: bool,
}

/// Completion/indication events posted to the tracker by the radio glue
/// and by its own timers.
#[derive(Debug)]
pub enum TrackerEvent {
    /// Response to `get_current_calls`. Results carrying a token other
    /// than the most recently issued poll are stale and discarded.
    PollCallsResult {
        token: OpToken,
        result: Result<Vec<DriverCall>, CommandError>,
    },
    /// Completion of any non-poll radio command, keyed by its token.
    CommandComplete {
        token: OpToken,
        result: Result<(), CommandError>,
    },
    /// Response to `get_last_call_fail_cause`.
    LastCallFailCause {
        token: OpToken,
        result: Result<LastCallFailCause, CommandError>,
    },
    /// Delayed re-poll timer fired.
    RepollAfterDelay,
    /// Unsolicited call-state-changed indication.
    CallStateChanged,
    /// Radio became available.
    RadioAvailable,
    /// Radio became unavailable.
    RadioNotAvailable,
    /// CDMA call-waiting indication.
    CdmaCallWaiting { info: CdmaCallWaitingInfo },
    /// The device left emergency callback mode after
    /// [`PhoneAdapter::request_ecm_exit`](crate::platform::PhoneAdapter::request_ecm_exit).
    EcmExitResponse,
    /// Delayed CDMA three-way L2 flash timer fired.
    ThreeWayFlashDue,
    /// Post-dial PAUSE delay elapsed for a leg.
    PostDialPauseDone { id: ConnId },
}

/// Synchronous operations invoked through the tracker's mailbox by the
/// public handle. Each carries a responder fulfilled on the actor thread.
#[derive(Debug)]
pub enum TrackerOp {
    Dial {
        dial_string: String,
        args: DialArgs,
        resp: Responder<Result<ConnId, CallStateError>>,
    },
    AcceptCall {
        resp: Responder<Result<(), CallStateError>>,
    },
    RejectCall {
        resp: Responder<Result<(), CallStateError>>,
    },
    SwitchWaitingOrHoldingAndActive {
        resp: Responder<Result<(), CallStateError>>,
    },
    Conference {
        resp: Responder<Result<(), CallStateError>>,
    },
    ExplicitCallTransfer {
        resp: Responder<Result<(), CallStateError>>,
    },
    HangupConnection {
        id: ConnId,
        resp: Responder<Result<(), CallStateError>>,
    },
    HangupCall {
        role: CallRole,
        resp: Responder<Result<(), CallStateError>>,
    },
    ClearDisconnected {
        resp: Responder<()>,
    },
    SetMute {
        mute: bool,
        resp: Responder<()>,
    },
    PhoneState {
        resp: Responder<PhoneState>,
    },
    ConnectionSnapshot {
        id: ConnId,
        resp: Responder<Option<ConnectionSnapshot>>,
    },
    Dump {
        resp: Responder<String>,
    },
}

/// Point-in-time view of one tracked leg, safe to hand across threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub id: ConnId,
    pub index: Option<u8>,
    pub incoming: bool,
    pub address: String,
    pub state: crate::call::CallState,
    pub role: Option<CallRole>,
    pub cause: DisconnectCause,
    pub is_emergency: bool,
}

/// Top-level mailbox message: an asynchronous event or a synchronous
/// operation.
#[derive(Debug)]
pub enum TrackerMsg {
    Event(TrackerEvent),
    Op(TrackerOp),
}
