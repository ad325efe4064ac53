//! The call tracker: per-slot connection bookkeeping and the
//! poll-reconciliation engine.
//!
//! The tracker owns a fixed-size slot array of connections indexed by the
//! 1-based radio call index, the three call role slots, and the
//! pending-operation debounce counter. It is a single-threaded actor: all
//! state mutation happens on the owning thread, one event at a time, and
//! no two poll cycles ever execute concurrently.
//!
//! # Poll debounce
//!
//! Every outgoing radio command increments a pending-operation counter
//! and invalidates the last issued poll; exactly one fresh poll is issued
//! when the counter returns to zero. A burst of commands (switch +
//! hangup) therefore coalesces into a single re-poll.

mod error;
mod events;
mod ops;
mod poll;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::actor::{self, Actor, ActorHandle, ActorRef, TimerKey, Timers};
use crate::call::{
    Call, CallRole, CallState, ConnId, ConnTable, Connection, NetworkFamily, PhoneState,
    PostDialEvent,
};
use crate::diag::{pii, LocalLog};
use crate::platform::{PhoneAdapter, SuppService};
use crate::radio::{ClirMode, OpToken, RadioGateway};

pub use error::CallStateError;
pub use events::{ConnectionSnapshot, DialArgs, TrackerEvent, TrackerMsg, TrackerOp};

/// Delay before retrying a transiently-failed poll.
const POLL_DELAY: Duration = Duration::from_millis(250);

/// Lines retained by the diagnostic log ring.
const LOCAL_LOG_CAPACITY: usize = 64;

pub(crate) const TIMER_REPOLL: TimerKey = "repoll";
pub(crate) const TIMER_THREE_WAY_FLASH: TimerKey = "three-way-flash";
pub(crate) const TIMER_POST_DIAL_PAUSE: TimerKey = "post-dial-pause";

/// What an in-flight radio command was issued for. Determines completion
/// handling and whether it participates in the poll debounce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommandPurpose {
    /// Generic counted command (dial, hangup, accept, reject).
    Operation,
    /// GSM switch, counted; failure notifies the supplementary-service
    /// sink.
    Switch,
    /// GSM conference merge, counted.
    Conference,
    /// GSM separate, counted.
    Separate,
    /// GSM explicit call transfer, counted.
    Transfer,
    /// Last-call-fail-cause lookup, counted but never forces a poll.
    FailCause,
    /// CDMA supplementary flash; no completion handling.
    CdmaFlash,
    /// CDMA three-way blank flash preceding the L2 flash.
    BlankFlash,
    /// CDMA three-way L2 flash; success connects the pending leg.
    L2Flash,
    /// Post-dial DTMF character; completion advances the sequence.
    Dtmf { id: ConnId },
}

impl CommandPurpose {
    /// Counted commands participate in the pending-operation debounce.
    const fn counted(self) -> bool {
        matches!(
            self,
            Self::Operation
                | Self::Switch
                | Self::Conference
                | Self::Separate
                | Self::Transfer
                | Self::FailCause
        )
    }

    /// Whether completion of this command should eventually trigger a
    /// fresh poll.
    const fn polls(self) -> bool {
        self.counted() && !matches!(self, Self::FailCause)
    }

    const fn supp_service(self) -> SuppService {
        match self {
            Self::Switch => SuppService::Switch,
            Self::Conference => SuppService::Conference,
            Self::Separate => SuppService::Separate,
            Self::Transfer => SuppService::Transfer,
            _ => SuppService::Unknown,
        }
    }
}

/// The three singleton call role slots.
#[derive(Debug)]
pub(crate) struct Calls {
    pub ringing: Call,
    pub foreground: Call,
    pub background: Call,
}

impl Calls {
    fn new() -> Self {
        Self {
            ringing: Call::new(CallRole::Ringing),
            foreground: Call::new(CallRole::Foreground),
            background: Call::new(CallRole::Background),
        }
    }

    pub(crate) fn get(&self, role: CallRole) -> &Call {
        match role {
            CallRole::Ringing => &self.ringing,
            CallRole::Foreground => &self.foreground,
            CallRole::Background => &self.background,
        }
    }

    pub(crate) fn get_mut(&mut self, role: CallRole) -> &mut Call {
        match role {
            CallRole::Ringing => &mut self.ringing,
            CallRole::Foreground => &mut self.foreground,
            CallRole::Background => &mut self.background,
        }
    }
}

/// Call tracker state machine. See the module docs for the threading
/// model.
pub struct CallTracker {
    family: NetworkFamily,
    radio: Arc<dyn RadioGateway>,
    phone: Arc<dyn PhoneAdapter>,
    timers: Box<dyn Timers<TrackerMsg>>,

    pub(crate) conns: ConnTable,
    slots: Vec<Option<ConnId>>,
    pub(crate) calls: Calls,

    pending_mo: Option<ConnId>,
    hangup_pending_mo: bool,
    dropped_during_poll: Vec<ConnId>,
    handover_connections: Vec<ConnId>,

    phone_state: PhoneState,

    pending_operations: u32,
    needs_poll: bool,
    last_poll_token: Option<OpToken>,
    next_token: OpToken,
    in_flight: HashMap<OpToken, CommandPurpose>,

    desired_mute: bool,

    // CDMA-only bookkeeping.
    pending_call_in_ecm: bool,
    pending_call_clir: ClirMode,
    in_emergency_call: bool,

    local_log: LocalLog,
}

impl CallTracker {
    /// Creates a tracker for the given network family.
    ///
    /// `timers` is the owning actor's scheduling surface; tests may pass
    /// a recording double and drive the tracker synchronously.
    pub fn new(
        family: NetworkFamily,
        radio: Arc<dyn RadioGateway>,
        phone: Arc<dyn PhoneAdapter>,
        timers: Box<dyn Timers<TrackerMsg>>,
    ) -> Self {
        Self {
            family,
            radio,
            phone,
            timers,
            conns: ConnTable::new(),
            slots: vec![None; family.max_connections()],
            calls: Calls::new(),
            pending_mo: None,
            hangup_pending_mo: false,
            dropped_during_poll: Vec::new(),
            handover_connections: Vec::new(),
            phone_state: PhoneState::Idle,
            pending_operations: 0,
            needs_poll: false,
            last_poll_token: None,
            next_token: 0,
            in_flight: HashMap::new(),
            desired_mute: false,
            pending_call_in_ecm: false,
            pending_call_clir: ClirMode::Default,
            in_emergency_call: false,
            local_log: LocalLog::new(LOCAL_LOG_CAPACITY),
        }
    }

    #[must_use]
    pub fn family(&self) -> NetworkFamily {
        self.family
    }

    #[must_use]
    pub fn phone_state(&self) -> PhoneState {
        self.phone_state
    }

    #[must_use]
    pub fn mute(&self) -> bool {
        self.desired_mute
    }

    /// Mute control; remembered so re-dials can unmute deterministically.
    pub fn set_mute(&mut self, mute: bool) {
        self.desired_mute = mute;
        self.radio.set_mute(mute);
    }

    #[must_use]
    pub fn connection(&self, id: ConnId) -> Option<&Connection> {
        self.conns.get(id)
    }

    /// Pending (unindexed) outgoing leg, if a dial is in flight.
    #[must_use]
    pub fn pending_connection(&self) -> Option<ConnId> {
        self.pending_mo
    }

    #[must_use]
    pub fn ringing_call_state(&self) -> CallState {
        self.calls.ringing.state(&self.conns)
    }

    #[must_use]
    pub fn foreground_call_state(&self) -> CallState {
        self.calls.foreground.state(&self.conns)
    }

    #[must_use]
    pub fn background_call_state(&self) -> CallState {
        self.calls.background.state(&self.conns)
    }

    /// Member legs of a call role, in attach order.
    #[must_use]
    pub fn call_connections(&self, role: CallRole) -> Vec<ConnId> {
        self.calls.get(role).connections().to_vec()
    }

    /// CDMA emergency-call bookkeeping flag.
    #[must_use]
    pub fn is_in_emergency_call(&self) -> bool {
        self.in_emergency_call
    }

    // ------------------------------------------------------------------
    // Phone-type switching and reset
    // ------------------------------------------------------------------

    /// Switches the technology family, tearing down all tracked state and
    /// issuing a safety poll.
    pub fn update_phone_type(&mut self, family: NetworkFamily) {
        self.reset();
        self.family = family;
        self.slots = vec![None; family.max_connections()];
        if family.is_cdma() {
            self.pending_call_in_ecm = false;
            self.in_emergency_call = false;
            self.pending_call_clir = ClirMode::Default;
        }
        self.poll_calls_when_safe();
    }

    /// Disconnects and disposes every tracked leg.
    fn reset(&mut self) {
        debug!("reset");
        let cause = crate::call::DisconnectCause::ErrorUnspecified;
        for slot in &mut self.slots {
            if let Some(id) = slot.take() {
                if let Some(conn) = self.conns.get_mut(id) {
                    if conn.on_disconnect(cause) {
                        self.phone.on_connection_disconnected(id, cause);
                    }
                }
            }
        }
        if let Some(id) = self.pending_mo.take() {
            if let Some(conn) = self.conns.get_mut(id) {
                if conn.on_disconnect(cause) {
                    self.phone.on_connection_disconnected(id, cause);
                }
            }
        }
        self.hangup_pending_mo = false;
        self.dropped_during_poll.clear();
        for id in std::mem::take(&mut self.handover_connections) {
            self.conns.remove(id);
        }
        self.clear_disconnected();
    }

    /// Forces a cleanup poll for stale calls.
    pub fn cleanup_calls(&mut self) {
        self.poll_calls_when_safe();
    }

    // ------------------------------------------------------------------
    // Pending-operation debounce
    // ------------------------------------------------------------------

    fn alloc_token(&mut self) -> OpToken {
        self.next_token += 1;
        self.next_token
    }

    /// Registers an outgoing command. Counted commands invalidate any
    /// in-flight poll and bump the pending counter.
    pub(crate) fn begin_command(&mut self, purpose: CommandPurpose) -> OpToken {
        let token = self.alloc_token();
        if purpose.counted() {
            self.pending_operations += 1;
            self.last_poll_token = None;
            if purpose.polls() {
                self.needs_poll = true;
            }
            debug!(
                pending = self.pending_operations,
                needs_poll = self.needs_poll,
                "command issued"
            );
        }
        self.in_flight.insert(token, purpose);
        token
    }

    fn operation_complete(&mut self) {
        if self.pending_operations == 0 {
            // Mirrors the counter underflow guard: should never happen.
            error!("pending operation count underflow");
            return;
        }
        self.pending_operations -= 1;
        debug!(
            pending = self.pending_operations,
            needs_poll = self.needs_poll,
            "operation complete"
        );
        if self.pending_operations == 0 && self.needs_poll {
            self.issue_poll();
        }
    }

    fn issue_poll(&mut self) {
        let token = self.alloc_token();
        self.last_poll_token = Some(token);
        self.radio.get_current_calls(token);
    }

    /// Polls immediately when no operations are pending; otherwise the
    /// poll fires when the last completion drains the counter.
    pub(crate) fn poll_calls_when_safe(&mut self) {
        self.needs_poll = true;
        if self.pending_operations == 0 {
            self.issue_poll();
        }
    }

    pub(crate) fn poll_calls_after_delay(&mut self) {
        self.timers.schedule(
            TIMER_REPOLL,
            POLL_DELAY,
            TrackerMsg::Event(TrackerEvent::RepollAfterDelay),
        );
    }

    // ------------------------------------------------------------------
    // Membership plumbing
    // ------------------------------------------------------------------

    pub(crate) fn attach_to_role(&mut self, id: ConnId, role: CallRole) {
        self.calls.get_mut(role).attach(id, &mut self.conns);
    }

    /// Moves a leg to the role derived from its driver state. Returns
    /// whether membership changed.
    pub(crate) fn move_to_role(&mut self, id: ConnId, role: CallRole) -> bool {
        let current = self.conns.get(id).and_then(Connection::role);
        if current == Some(role) {
            return false;
        }
        if let Some(old) = current {
            self.calls.get_mut(old).detach(id, &mut self.conns);
        }
        self.attach_to_role(id, role);
        true
    }

    /// Removes fully-disconnected legs from their calls and disposes
    /// them.
    pub(crate) fn internal_clear_disconnected(&mut self) {
        for role in [CallRole::Ringing, CallRole::Foreground, CallRole::Background] {
            let gone = self
                .calls
                .get_mut(role)
                .clear_disconnected(&mut self.conns);
            for id in gone {
                self.conns.remove(id);
            }
        }
    }

    /// Clears disconnected legs and re-derives phone state; fires the
    /// precise-call-state notification.
    pub fn clear_disconnected(&mut self) {
        self.internal_clear_disconnected();
        self.update_phone_state();
        self.phone.on_precise_call_state_changed();
    }

    // ------------------------------------------------------------------
    // Phone-wide state
    // ------------------------------------------------------------------

    /// Recomputes the phone-wide state from the three call roles.
    /// Idempotent: re-running with unchanged inputs produces no
    /// notification.
    pub(crate) fn update_phone_state(&mut self) {
        let old = self.phone_state;
        let new = if self.calls.ringing.is_ringing(&self.conns) {
            PhoneState::Ringing
        } else if self.pending_mo.is_some()
            || !(self.calls.foreground.is_idle(&self.conns)
                && self.calls.background.is_idle(&self.conns))
        {
            PhoneState::Offhook
        } else {
            PhoneState::Idle
        };
        self.phone_state = new;

        if new == PhoneState::Idle && old != new {
            self.phone.on_voice_call_ended();
        } else if old == PhoneState::Idle && old != new {
            self.phone.on_voice_call_started();
        }
        if new != old {
            debug!(%old, %new, "phone state changed");
            self.local_log
                .log(format!("phone state {old} -> {new}"));
            self.phone.on_phone_state_changed(new);
        }
    }

    // ------------------------------------------------------------------
    // Post-dial sequence driving
    // ------------------------------------------------------------------

    fn post_dial_pause_delay(&self) -> Duration {
        match self.family {
            NetworkFamily::Gsm => Duration::from_secs(3),
            NetworkFamily::Cdma => Duration::from_secs(2),
        }
    }

    pub(crate) fn start_post_dial(&mut self, id: ConnId) {
        self.advance_post_dial(id);
    }

    fn advance_post_dial(&mut self, id: ConnId) {
        let Some(conn) = self.conns.get_mut(id) else {
            return;
        };
        let event = conn.process_next_post_dial_char();
        self.dispatch_post_dial_event(id, event);
    }

    fn dispatch_post_dial_event(&mut self, id: ConnId, event: PostDialEvent) {
        match event {
            PostDialEvent::None | PostDialEvent::Complete => {}
            PostDialEvent::Dtmf(c) => {
                let token = self.begin_command(CommandPurpose::Dtmf { id });
                self.radio.send_dtmf(c, token);
                self.phone.on_post_dial_char(id, c);
            }
            PostDialEvent::Pause => {
                let delay = self.post_dial_pause_delay();
                self.timers.schedule(
                    TIMER_POST_DIAL_PAUSE,
                    delay,
                    TrackerMsg::Event(TrackerEvent::PostDialPauseDone { id }),
                );
            }
            PostDialEvent::Wait => {
                let remaining = self
                    .conns
                    .get(id)
                    .map(|c| c.remaining_post_dial_string().to_string())
                    .unwrap_or_default();
                self.phone.on_post_dial_wait(id, &remaining);
            }
            PostDialEvent::Wild => {
                let remaining = self
                    .conns
                    .get(id)
                    .map(|c| c.remaining_post_dial_string().to_string())
                    .unwrap_or_default();
                self.phone.on_post_dial_wild(id, &remaining);
            }
        }
    }

    /// Resumes a post-dial sequence paused at a WAIT token.
    pub fn proceed_after_wait_char(&mut self, id: ConnId) {
        let Some(conn) = self.conns.get_mut(id) else {
            return;
        };
        let event = conn.proceed_after_wait_char();
        self.dispatch_post_dial_event(id, event);
    }

    /// Resumes a post-dial sequence paused at a WILD token with
    /// user-supplied digits.
    pub fn proceed_after_wild_char(&mut self, id: ConnId, replacement: &str) {
        let Some(conn) = self.conns.get_mut(id) else {
            return;
        };
        let event = conn.proceed_after_wild_char(replacement);
        self.dispatch_post_dial_event(id, event);
    }

    /// Cancels a leg's post-dial sequence.
    pub fn cancel_post_dial(&mut self, id: ConnId) {
        if let Some(conn) = self.conns.get_mut(id) {
            conn.cancel_post_dial();
        }
    }

    // ------------------------------------------------------------------
    // Event dispatch
    // ------------------------------------------------------------------

    /// Handles one mailbox event. Public so tests can drive the tracker
    /// synchronously without an actor thread.
    pub fn handle_event(&mut self, event: TrackerEvent) {
        match event {
            TrackerEvent::PollCallsResult { token, result } => {
                if self.last_poll_token == Some(token) {
                    self.needs_poll = false;
                    self.last_poll_token = None;
                    self.handle_poll_calls(result);
                } else {
                    debug!(token, "discarding stale poll result");
                }
            }
            TrackerEvent::CommandComplete { token, result } => {
                self.handle_command_complete(token, result);
            }
            TrackerEvent::LastCallFailCause { token, result } => {
                self.in_flight.remove(&token);
                self.operation_complete();
                self.handle_last_call_fail_cause(result);
            }
            TrackerEvent::RepollAfterDelay | TrackerEvent::CallStateChanged => {
                self.poll_calls_when_safe();
            }
            TrackerEvent::RadioAvailable => self.poll_calls_when_safe(),
            // The poll response will carry the radio-unavailable error and
            // tear down every tracked leg.
            TrackerEvent::RadioNotAvailable => self.poll_calls_when_safe(),
            TrackerEvent::CdmaCallWaiting { info } => {
                assert!(
                    self.family.is_cdma(),
                    "CDMA call-waiting event on a {} tracker",
                    self.family
                );
                self.handle_call_waiting(&info);
            }
            TrackerEvent::EcmExitResponse => {
                assert!(
                    self.family.is_cdma(),
                    "ECM exit event on a {} tracker",
                    self.family
                );
                self.handle_ecm_exit_response();
            }
            TrackerEvent::ThreeWayFlashDue => self.handle_three_way_flash_due(),
            TrackerEvent::PostDialPauseDone { id } => self.advance_post_dial(id),
        }
    }

    fn handle_command_complete(
        &mut self,
        token: OpToken,
        result: Result<(), crate::radio::CommandError>,
    ) {
        let Some(purpose) = self.in_flight.remove(&token) else {
            warn!(token, "completion for unknown command token");
            return;
        };
        match purpose {
            CommandPurpose::Operation => self.operation_complete(),
            CommandPurpose::Switch
            | CommandPurpose::Conference
            | CommandPurpose::Separate
            | CommandPurpose::Transfer => {
                assert!(
                    self.family.is_gsm(),
                    "{purpose:?} completion on a {} tracker",
                    self.family
                );
                if result.is_err() {
                    self.phone.on_supp_service_failed(purpose.supp_service());
                }
                self.operation_complete();
            }
            CommandPurpose::FailCause => {
                // Fail-cause responses arrive as their own event type.
                warn!(token, "fail-cause token completed as a plain command");
                self.operation_complete();
            }
            CommandPurpose::CdmaFlash => {}
            CommandPurpose::BlankFlash => self.handle_blank_flash_result(result.is_ok()),
            CommandPurpose::L2Flash => self.handle_l2_flash_result(result.is_ok()),
            CommandPurpose::Dtmf { id } => self.advance_post_dial(id),
        }
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    /// Redacted diagnostic snapshot. Addresses and cause detail are
    /// obfuscated; this output is safe for externally-readable dumps.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "CallTracker family={} state={} pendingOps={} needsPoll={}\n",
            self.family, self.phone_state, self.pending_operations, self.needs_poll
        ));
        for (i, slot) in self.slots.iter().enumerate() {
            if let Some(conn) = slot.as_ref().and_then(|id| self.conns.get(*id)) {
                out.push_str(&format!(
                    "  slot[{}] addr={} state={} cause={}\n",
                    i + 1,
                    pii(conn.address()),
                    conn.state(),
                    conn.disconnect_cause()
                ));
            }
        }
        out.push_str(&format!(
            "  ringing={} foreground={} background={}\n",
            self.calls.ringing.state(&self.conns),
            self.calls.foreground.state(&self.conns),
            self.calls.background.state(&self.conns)
        ));
        out.push_str(&format!(
            "  pendingMO={} hangupPendingMO={} dropped={} handover={}\n",
            self.pending_mo.is_some(),
            self.hangup_pending_mo,
            self.dropped_during_poll.len(),
            self.handover_connections.len()
        ));
        if self.family.is_cdma() {
            out.push_str(&format!(
                "  pendingCallInEcm={} inEmergencyCall={}\n",
                self.pending_call_in_ecm, self.in_emergency_call
            ));
        }
        self.local_log.dump_into(&mut out);
        out
    }

    fn snapshot(&self, id: ConnId) -> Option<ConnectionSnapshot> {
        let conn = self.conns.get(id)?;
        Some(ConnectionSnapshot {
            id,
            index: conn.index(),
            incoming: conn.is_incoming(),
            address: conn.address().to_string(),
            state: conn.state(),
            role: conn.role(),
            cause: conn.disconnect_cause(),
            is_emergency: conn.is_emergency_call(),
        })
    }

    fn handle_op(&mut self, op: TrackerOp) {
        match op {
            TrackerOp::Dial {
                dial_string,
                args,
                resp,
            } => resp.fulfill(self.dial(&dial_string, &args)),
            TrackerOp::AcceptCall { resp } => resp.fulfill(self.accept_call()),
            TrackerOp::RejectCall { resp } => resp.fulfill(self.reject_call()),
            TrackerOp::SwitchWaitingOrHoldingAndActive { resp } => {
                resp.fulfill(self.switch_waiting_or_holding_and_active());
            }
            TrackerOp::Conference { resp } => resp.fulfill(self.conference()),
            TrackerOp::ExplicitCallTransfer { resp } => {
                resp.fulfill(self.explicit_call_transfer());
            }
            TrackerOp::HangupConnection { id, resp } => {
                resp.fulfill(self.hangup_connection(id));
            }
            TrackerOp::HangupCall { role, resp } => resp.fulfill(self.hangup_call(role)),
            TrackerOp::ClearDisconnected { resp } => {
                self.clear_disconnected();
                resp.fulfill(());
            }
            TrackerOp::SetMute { mute, resp } => {
                self.set_mute(mute);
                resp.fulfill(());
            }
            TrackerOp::PhoneState { resp } => resp.fulfill(self.phone_state),
            TrackerOp::ConnectionSnapshot { id, resp } => resp.fulfill(self.snapshot(id)),
            TrackerOp::Dump { resp } => resp.fulfill(self.dump()),
        }
    }
}

impl Actor for CallTracker {
    type Event = TrackerMsg;

    fn on_event(&mut self, msg: TrackerMsg) {
        match msg {
            TrackerMsg::Event(event) => self.handle_event(event),
            TrackerMsg::Op(op) => self.handle_op(op),
        }
    }
}

/// Cross-thread facade over a spawned call tracker.
///
/// Operations post into the tracker's mailbox and block the calling
/// thread until the actor fulfills the result; events are posted without
/// waiting. Never call blocking operations from the tracker's own thread.
#[derive(Clone)]
pub struct CallTrackerHandle {
    actor_ref: ActorRef<TrackerMsg>,
}

impl CallTrackerHandle {
    /// Posts a radio/timer event into the tracker's mailbox.
    pub fn post_event(&self, event: TrackerEvent) {
        self.actor_ref.post(TrackerMsg::Event(event));
    }

    /// Places an outgoing call.
    pub fn dial(&self, dial_string: &str, args: DialArgs) -> Result<ConnId, CallStateError> {
        let dial_string = dial_string.to_string();
        self.actor_ref.call(|resp| {
            TrackerMsg::Op(TrackerOp::Dial {
                dial_string,
                args,
                resp,
            })
        })
    }

    pub fn accept_call(&self) -> Result<(), CallStateError> {
        self.actor_ref
            .call(|resp| TrackerMsg::Op(TrackerOp::AcceptCall { resp }))
    }

    pub fn reject_call(&self) -> Result<(), CallStateError> {
        self.actor_ref
            .call(|resp| TrackerMsg::Op(TrackerOp::RejectCall { resp }))
    }

    pub fn switch_waiting_or_holding_and_active(&self) -> Result<(), CallStateError> {
        self.actor_ref
            .call(|resp| TrackerMsg::Op(TrackerOp::SwitchWaitingOrHoldingAndActive { resp }))
    }

    pub fn conference(&self) -> Result<(), CallStateError> {
        self.actor_ref
            .call(|resp| TrackerMsg::Op(TrackerOp::Conference { resp }))
    }

    pub fn explicit_call_transfer(&self) -> Result<(), CallStateError> {
        self.actor_ref
            .call(|resp| TrackerMsg::Op(TrackerOp::ExplicitCallTransfer { resp }))
    }

    pub fn hangup_connection(&self, id: ConnId) -> Result<(), CallStateError> {
        self.actor_ref
            .call(|resp| TrackerMsg::Op(TrackerOp::HangupConnection { id, resp }))
    }

    pub fn hangup_call(&self, role: CallRole) -> Result<(), CallStateError> {
        self.actor_ref
            .call(|resp| TrackerMsg::Op(TrackerOp::HangupCall { role, resp }))
    }

    pub fn clear_disconnected(&self) {
        self.actor_ref
            .call(|resp| TrackerMsg::Op(TrackerOp::ClearDisconnected { resp }));
    }

    pub fn set_mute(&self, mute: bool) {
        self.actor_ref
            .call(|resp| TrackerMsg::Op(TrackerOp::SetMute { mute, resp }));
    }

    #[must_use]
    pub fn phone_state(&self) -> PhoneState {
        self.actor_ref
            .call(|resp| TrackerMsg::Op(TrackerOp::PhoneState { resp }))
    }

    #[must_use]
    pub fn connection_snapshot(&self, id: ConnId) -> Option<ConnectionSnapshot> {
        self.actor_ref
            .call(|resp| TrackerMsg::Op(TrackerOp::ConnectionSnapshot { id, resp }))
    }

    #[must_use]
    pub fn dump(&self) -> String {
        self.actor_ref
            .call(|resp| TrackerMsg::Op(TrackerOp::Dump { resp }))
    }
}

/// Spawns a call tracker on its own actor thread, returning the handle
/// pair for callers and for shutdown.
pub fn spawn(
    family: NetworkFamily,
    radio: Arc<dyn RadioGateway>,
    phone: Arc<dyn PhoneAdapter>,
) -> (CallTrackerHandle, ActorHandle<TrackerMsg>) {
    let handle = actor::spawn("call-tracker", |actor_ref: ActorRef<TrackerMsg>| {
        CallTracker::new(family, radio, phone, Box::new(actor_ref))
    });
    (
        CallTrackerHandle {
            actor_ref: handle.actor_ref(),
        },
        handle,
    )
}
