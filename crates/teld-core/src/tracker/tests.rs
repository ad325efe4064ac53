//! Tests for the call tracker and the poll-merge engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::*;
use crate::call::{
    CallRole, CallState, CdmaCallWaitingInfo, ConnId, DisconnectCause, Direction, NetworkFamily,
    PhoneState,
};
use crate::platform::{EcmTimerAction, PhoneAdapter, SuppService};
use crate::radio::{
    CommandError, DialRequest, DriverCall, DriverCallState, FailCause, LastCallFailCause, OpToken,
    RadioGateway,
};

// =============================================================================
// Test doubles
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum RadioCommand {
    GetCurrentCalls(OpToken),
    Dial(String, OpToken),
    Accept(OpToken),
    Reject(OpToken),
    HangupConnection(u8, OpToken),
    HangupWaitingOrBackground(OpToken),
    HangupForegroundResumeBackground(OpToken),
    Switch(OpToken),
    Conference(OpToken),
    Transfer(OpToken),
    Separate(u8, OpToken),
    GetLastCallFailCause(OpToken),
    FeatureCode(String, OpToken),
    Dtmf(char, OpToken),
    SetMute(bool),
}

#[derive(Default)]
struct FakeRadio {
    commands: Mutex<Vec<RadioCommand>>,
    off: AtomicBool,
}

impl FakeRadio {
    fn commands(&self) -> Vec<RadioCommand> {
        self.commands.lock().unwrap().clone()
    }

    fn push(&self, cmd: RadioCommand) {
        self.commands.lock().unwrap().push(cmd);
    }

    fn last_poll_token(&self) -> Option<OpToken> {
        self.commands()
            .iter()
            .rev()
            .find_map(|c| match c {
                RadioCommand::GetCurrentCalls(t) => Some(*t),
                _ => None,
            })
    }

    fn count_polls(&self) -> usize {
        self.commands()
            .iter()
            .filter(|c| matches!(c, RadioCommand::GetCurrentCalls(_)))
            .count()
    }

    fn count_dials(&self) -> usize {
        self.commands()
            .iter()
            .filter(|c| matches!(c, RadioCommand::Dial(..)))
            .count()
    }

    fn fail_cause_token(&self) -> Option<OpToken> {
        self.commands()
            .iter()
            .rev()
            .find_map(|c| match c {
                RadioCommand::GetLastCallFailCause(t) => Some(*t),
                _ => None,
            })
    }
}

impl RadioGateway for FakeRadio {
    fn radio_on(&self) -> bool {
        !self.off.load(Ordering::SeqCst)
    }
    fn get_current_calls(&self, token: OpToken) {
        self.push(RadioCommand::GetCurrentCalls(token));
    }
    fn dial(&self, request: DialRequest, token: OpToken) {
        self.push(RadioCommand::Dial(request.address, token));
    }
    fn accept_call(&self, token: OpToken) {
        self.push(RadioCommand::Accept(token));
    }
    fn reject_call(&self, token: OpToken) {
        self.push(RadioCommand::Reject(token));
    }
    fn hangup_connection(&self, index: u8, token: OpToken) {
        self.push(RadioCommand::HangupConnection(index, token));
    }
    fn hangup_waiting_or_background(&self, token: OpToken) {
        self.push(RadioCommand::HangupWaitingOrBackground(token));
    }
    fn hangup_foreground_resume_background(&self, token: OpToken) {
        self.push(RadioCommand::HangupForegroundResumeBackground(token));
    }
    fn switch_waiting_or_holding_and_active(&self, token: OpToken) {
        self.push(RadioCommand::Switch(token));
    }
    fn conference(&self, token: OpToken) {
        self.push(RadioCommand::Conference(token));
    }
    fn explicit_call_transfer(&self, token: OpToken) {
        self.push(RadioCommand::Transfer(token));
    }
    fn separate_connection(&self, index: u8, token: OpToken) {
        self.push(RadioCommand::Separate(index, token));
    }
    fn get_last_call_fail_cause(&self, token: OpToken) {
        self.push(RadioCommand::GetLastCallFailCause(token));
    }
    fn send_cdma_feature_code(&self, code: &str, token: OpToken) {
        self.push(RadioCommand::FeatureCode(code.to_string(), token));
    }
    fn send_dtmf(&self, c: char, token: OpToken) {
        self.push(RadioCommand::Dtmf(c, token));
    }
    fn set_mute(&self, mute: bool) {
        self.push(RadioCommand::SetMute(mute));
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PhoneEvent {
    NewRinging(ConnId),
    Unknown(ConnId),
    Precise,
    State(PhoneState),
    VoiceStarted,
    VoiceEnded,
    Disconnected(ConnId, DisconnectCause),
    CallWaiting(String),
    SuppFailed(SuppService),
    EmergencyState(bool),
    DataEnabled(bool),
    EcmTimer(EcmTimerAction),
    EcmExitRequested,
    PostDialWait(ConnId, String),
    PostDialChar(char),
    Handover(ConnId),
}

#[derive(Default)]
struct RecordingPhone {
    events: Mutex<Vec<PhoneEvent>>,
    in_ecm: AtomicBool,
    emergency_numbers: Mutex<Vec<String>>,
    three_way_delay: Mutex<Duration>,
}

impl RecordingPhone {
    fn events(&self) -> Vec<PhoneEvent> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: PhoneEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn count(&self, pred: impl Fn(&PhoneEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl PhoneAdapter for RecordingPhone {
    fn emergency_number_info(&self, address: &str) -> Option<crate::call::EmergencyNumberInfo> {
        self.emergency_numbers
            .lock()
            .unwrap()
            .iter()
            .any(|n| n == address)
            .then(|| crate::call::EmergencyNumberInfo {
                number: address.to_string(),
                categories: 0,
            })
    }
    fn is_in_ecm(&self) -> bool {
        self.in_ecm.load(Ordering::SeqCst)
    }
    fn cdma_three_way_flash_delay(&self) -> Duration {
        *self.three_way_delay.lock().unwrap()
    }
    fn on_phone_state_changed(&self, state: PhoneState) {
        self.record(PhoneEvent::State(state));
    }
    fn on_precise_call_state_changed(&self) {
        self.record(PhoneEvent::Precise);
    }
    fn on_connection_disconnected(&self, id: ConnId, cause: DisconnectCause) {
        self.record(PhoneEvent::Disconnected(id, cause));
    }
    fn on_new_ringing_connection(&self, id: ConnId) {
        self.record(PhoneEvent::NewRinging(id));
    }
    fn on_unknown_connection(&self, id: ConnId) {
        self.record(PhoneEvent::Unknown(id));
    }
    fn on_voice_call_started(&self) {
        self.record(PhoneEvent::VoiceStarted);
    }
    fn on_voice_call_ended(&self) {
        self.record(PhoneEvent::VoiceEnded);
    }
    fn on_call_waiting(&self, info: &CdmaCallWaitingInfo) {
        self.record(PhoneEvent::CallWaiting(info.number.clone()));
    }
    fn on_supp_service_failed(&self, service: SuppService) {
        self.record(PhoneEvent::SuppFailed(service));
    }
    fn on_handover_state_changed(&self, id: ConnId) {
        self.record(PhoneEvent::Handover(id));
    }
    fn on_post_dial_wait(&self, id: ConnId, remaining: &str) {
        self.record(PhoneEvent::PostDialWait(id, remaining.to_string()));
    }
    fn on_post_dial_char(&self, _id: ConnId, c: char) {
        self.record(PhoneEvent::PostDialChar(c));
    }
    fn on_emergency_call_state_changed(&self, active: bool) {
        self.record(PhoneEvent::EmergencyState(active));
    }
    fn set_internal_data_enabled(&self, enabled: bool) {
        self.record(PhoneEvent::DataEnabled(enabled));
    }
    fn handle_ecm_timer(&self, action: EcmTimerAction) {
        self.record(PhoneEvent::EcmTimer(action));
    }
    fn request_ecm_exit(&self) {
        self.record(PhoneEvent::EcmExitRequested);
    }
}

#[derive(Default)]
struct RecordingTimers {
    scheduled: Arc<Mutex<Vec<(&'static str, Duration)>>>,
}

impl crate::actor::Timers<TrackerMsg> for RecordingTimers {
    fn schedule(&mut self, key: &'static str, delay: Duration, _event: TrackerMsg) {
        self.scheduled.lock().unwrap().push((key, delay));
    }
    fn cancel(&mut self, key: &'static str) {
        self.scheduled.lock().unwrap().retain(|(k, _)| *k != key);
    }
}

struct Harness {
    tracker: CallTracker,
    radio: Arc<FakeRadio>,
    phone: Arc<RecordingPhone>,
    scheduled: Arc<Mutex<Vec<(&'static str, Duration)>>>,
}

fn harness(family: NetworkFamily) -> Harness {
    let radio = Arc::new(FakeRadio::default());
    let phone = Arc::new(RecordingPhone::default());
    let timers = RecordingTimers::default();
    let scheduled = Arc::clone(&timers.scheduled);
    let tracker = CallTracker::new(
        family,
        Arc::clone(&radio) as Arc<dyn RadioGateway>,
        Arc::clone(&phone) as Arc<dyn PhoneAdapter>,
        Box::new(timers),
    );
    Harness {
        tracker,
        radio,
        phone,
        scheduled,
    }
}

fn dc(index: u8, state: DriverCallState, address: &str, is_mt: bool) -> DriverCall {
    DriverCall {
        index,
        state,
        is_mt,
        address: address.to_string(),
        multiparty: false,
    }
}

impl Harness {
    /// Feeds a poll response for the most recently issued poll.
    fn respond_poll(&mut self, result: Result<Vec<DriverCall>, CommandError>) {
        let token = self.radio.last_poll_token().expect("a poll was issued");
        self.tracker
            .handle_event(TrackerEvent::PollCallsResult { token, result });
    }

    /// Requests and answers a poll with the given list.
    fn poll_with(&mut self, list: Vec<DriverCall>) {
        self.tracker.handle_event(TrackerEvent::CallStateChanged);
        self.respond_poll(Ok(list));
    }

    /// Completes the command issued with `token` successfully.
    fn complete(&mut self, token: OpToken) {
        self.tracker.handle_event(TrackerEvent::CommandComplete {
            token,
            result: Ok(()),
        });
    }

    /// Completes every outstanding dial/hangup/switch style command in
    /// issue order.
    fn complete_all(&mut self) {
        let tokens: Vec<OpToken> = self
            .radio
            .commands()
            .iter()
            .filter_map(|c| match c {
                RadioCommand::Dial(_, t)
                | RadioCommand::Accept(t)
                | RadioCommand::Reject(t)
                | RadioCommand::HangupConnection(_, t)
                | RadioCommand::HangupWaitingOrBackground(t)
                | RadioCommand::HangupForegroundResumeBackground(t)
                | RadioCommand::Switch(t)
                | RadioCommand::Conference(t)
                | RadioCommand::Transfer(t)
                | RadioCommand::Separate(_, t) => Some(*t),
                _ => None,
            })
            .collect();
        for token in tokens {
            self.complete(token);
        }
    }
}

// =============================================================================
// Scenario: new outgoing call matches the pending dial
// =============================================================================

#[test]
fn pending_dial_binds_to_reported_index() {
    let mut h = harness(NetworkFamily::Gsm);
    let id = h.tracker.dial("12345", &DialArgs::default()).unwrap();
    assert_eq!(h.tracker.pending_connection(), Some(id));
    assert_eq!(h.radio.count_dials(), 1);

    // Dial completion drains the counter and triggers the poll.
    let dial_token = h
        .radio
        .commands()
        .iter()
        .find_map(|c| match c {
            RadioCommand::Dial(_, t) => Some(*t),
            _ => None,
        })
        .unwrap();
    h.complete(dial_token);
    assert_eq!(h.radio.count_polls(), 1);

    h.respond_poll(Ok(vec![dc(1, DriverCallState::Dialing, "12345", false)]));

    assert_eq!(h.tracker.pending_connection(), None);
    let conn = h.tracker.connection(id).unwrap();
    assert_eq!(conn.index(), Some(1));
    assert_eq!(conn.state(), CallState::Dialing);
    assert_eq!(h.phone.count(|e| matches!(e, PhoneEvent::NewRinging(_))), 0);
    assert_eq!(h.phone.count(|e| matches!(e, PhoneEvent::Unknown(_))), 0);
}

// =============================================================================
// Scenario: missed and rejected call classification
// =============================================================================

#[test]
fn unanswered_incoming_drop_classifies_as_missed() {
    let mut h = harness(NetworkFamily::Gsm);
    h.poll_with(vec![dc(1, DriverCallState::Incoming, "5550100", true)]);
    let ringing = match h.phone.events().first() {
        Some(PhoneEvent::NewRinging(id)) => *id,
        other => panic!("expected new-ringing first, got {other:?}"),
    };
    assert_eq!(h.tracker.phone_state(), PhoneState::Ringing);

    h.poll_with(vec![]);

    assert_eq!(
        h.phone.count(|e| matches!(
            e,
            PhoneEvent::Disconnected(i, DisconnectCause::IncomingMissed) if *i == ringing
        )),
        1
    );
    // Missed calls bypass the network cause lookup.
    assert!(h.radio.fail_cause_token().is_none());
    assert_eq!(h.tracker.phone_state(), PhoneState::Idle);
}

#[test]
fn locally_hung_up_incoming_drop_classifies_as_rejected() {
    let mut h = harness(NetworkFamily::Gsm);
    h.poll_with(vec![dc(1, DriverCallState::Incoming, "5550100", true)]);

    h.tracker.hangup_call(CallRole::Ringing).unwrap();
    h.complete_all();
    h.respond_poll(Ok(vec![]));

    assert_eq!(
        h.phone.count(|e| matches!(
            e,
            PhoneEvent::Disconnected(_, DisconnectCause::IncomingRejected)
        )),
        1
    );
    assert!(h.radio.fail_cause_token().is_none());
}

// =============================================================================
// Poll-merge determinism
// =============================================================================

#[test]
fn repeated_identical_poll_is_a_no_op() {
    let mut h = harness(NetworkFamily::Gsm);
    let list = vec![
        dc(1, DriverCallState::Active, "111", false),
        dc(3, DriverCallState::Holding, "333", false),
    ];
    h.poll_with(list.clone());
    let events_after_first = h.phone.events().len();
    let fg = h.tracker.foreground_call_state();
    let bg = h.tracker.background_call_state();

    h.poll_with(list);

    assert_eq!(h.phone.events().len(), events_after_first);
    assert_eq!(h.tracker.foreground_call_state(), fg);
    assert_eq!(h.tracker.background_call_state(), bg);
}

// =============================================================================
// Debounce: N commands coalesce into one follow-up poll
// =============================================================================

#[test]
fn three_commands_coalesce_into_one_poll() {
    let mut h = harness(NetworkFamily::Gsm);
    h.poll_with(vec![dc(1, DriverCallState::Active, "111", false)]);
    let polls_before = h.radio.count_polls();

    h.tracker.switch_waiting_or_holding_and_active().unwrap();
    h.tracker.conference().unwrap();
    h.tracker.explicit_call_transfer().unwrap();

    let tokens: Vec<OpToken> = h
        .radio
        .commands()
        .iter()
        .filter_map(|c| match c {
            RadioCommand::Switch(t) | RadioCommand::Conference(t) | RadioCommand::Transfer(t) => {
                Some(*t)
            }
            _ => None,
        })
        .collect();
    assert_eq!(tokens.len(), 3);

    h.complete(tokens[0]);
    assert_eq!(h.radio.count_polls(), polls_before);
    h.complete(tokens[1]);
    assert_eq!(h.radio.count_polls(), polls_before);
    h.complete(tokens[2]);
    assert_eq!(h.radio.count_polls(), polls_before + 1);
}

// =============================================================================
// Capacity invariant
// =============================================================================

#[test]
fn gsm_active_plus_holding_is_dialable() {
    let mut h = harness(NetworkFamily::Gsm);
    h.poll_with(vec![
        dc(1, DriverCallState::Active, "111", false),
        dc(2, DriverCallState::Holding, "222", false),
    ]);
    assert_eq!(h.tracker.foreground_call_state(), CallState::Active);
    assert_eq!(h.tracker.background_call_state(), CallState::Holding);

    assert_eq!(h.tracker.check_for_dial_issues(false), Ok(()));
}

#[test]
fn cdma_alive_foreground_plus_background_raises_too_many_calls() {
    let mut h = harness(NetworkFamily::Cdma);
    h.poll_with(vec![
        dc(1, DriverCallState::Dialing, "111", false),
        dc(2, DriverCallState::Holding, "222", false),
    ]);
    let dials_before = h.radio.count_dials();

    let err = h.tracker.dial("333", &DialArgs::default()).unwrap_err();
    assert_eq!(err, CallStateError::TooManyCalls);
    // No dial command may reach the radio.
    assert_eq!(h.radio.count_dials(), dials_before);
}

// =============================================================================
// Transient failure and radio-unavailable
// =============================================================================

#[test]
fn transient_poll_failure_retries_without_touching_state() {
    let mut h = harness(NetworkFamily::Gsm);
    h.poll_with(vec![dc(1, DriverCallState::Active, "111", false)]);
    let fg = h.tracker.foreground_call_state();

    h.tracker.handle_event(TrackerEvent::CallStateChanged);
    h.respond_poll(Err(CommandError::GenericFailure));

    assert_eq!(h.tracker.foreground_call_state(), fg);
    assert!(h
        .scheduled
        .lock()
        .unwrap()
        .iter()
        .any(|(k, _)| *k == TIMER_REPOLL));
}

#[test]
fn radio_unavailable_tears_down_all_calls_with_unspecified_error() {
    let mut h = harness(NetworkFamily::Gsm);
    h.poll_with(vec![dc(1, DriverCallState::Active, "111", false)]);
    assert_eq!(h.tracker.phone_state(), PhoneState::Offhook);

    h.tracker.handle_event(TrackerEvent::RadioNotAvailable);
    h.respond_poll(Err(CommandError::RadioNotAvailable));

    // Teardown requires the (failing) cause lookup before finalizing.
    let token = h.radio.fail_cause_token().expect("cause lookup issued");
    h.tracker.handle_event(TrackerEvent::LastCallFailCause {
        token,
        result: Err(CommandError::RadioNotAvailable),
    });

    assert_eq!(
        h.phone.count(|e| matches!(
            e,
            PhoneEvent::Disconnected(_, DisconnectCause::ErrorUnspecified)
        )),
        1
    );
    assert_eq!(h.tracker.phone_state(), PhoneState::Idle);
}

// =============================================================================
// GSM index replacement (case c)
// =============================================================================

#[test]
fn gsm_mismatched_entry_drops_old_and_creates_new() {
    let mut h = harness(NetworkFamily::Gsm);
    let id = h.tracker.dial("111", &DialArgs::default()).unwrap();
    h.complete_all();
    h.respond_poll(Ok(vec![dc(1, DriverCallState::Dialing, "111", false)]));

    // Same index now reports an incoming call from another number.
    h.poll_with(vec![dc(1, DriverCallState::Incoming, "999", true)]);

    assert_eq!(h.phone.count(|e| matches!(e, PhoneEvent::NewRinging(_))), 1);
    // The old leg awaits the network fail cause.
    let token = h.radio.fail_cause_token().expect("cause lookup issued");
    h.tracker.handle_event(TrackerEvent::LastCallFailCause {
        token,
        result: Ok(LastCallFailCause {
            cause: FailCause::NormalClearing,
            vendor_cause: None,
        }),
    });
    assert_eq!(
        h.phone
            .count(|e| matches!(e, PhoneEvent::Disconnected(i, DisconnectCause::Normal) if *i == id)),
        1
    );
}

// =============================================================================
// CDMA collision resolution (case d override)
// =============================================================================

#[test]
fn cdma_mt_call_wins_collision_over_local_mo() {
    let mut h = harness(NetworkFamily::Cdma);
    let id = h.tracker.dial("111", &DialArgs::default()).unwrap();
    h.complete_all();
    h.respond_poll(Ok(vec![dc(1, DriverCallState::Dialing, "111", false)]));

    // Driver now claims the same index is mobile-terminated.
    h.poll_with(vec![dc(1, DriverCallState::Active, "111", true)]);

    assert_eq!(
        h.phone.count(|e| matches!(e, PhoneEvent::Unknown(i) if *i == id)),
        1
    );
    assert!(h.radio.fail_cause_token().is_some());
}

#[test]
fn cdma_phantom_direction_mismatch_is_log_only() {
    let mut h = harness(NetworkFamily::Cdma);
    h.poll_with(vec![dc(1, DriverCallState::Incoming, "111", true)]);
    h.tracker.accept_call().unwrap();
    h.complete_all();
    h.respond_poll(Ok(vec![dc(1, DriverCallState::Active, "111", true)]));
    let events_before = h.phone.events().len();

    // Driver flips direction on the tracked MT leg: left untouched.
    h.poll_with(vec![dc(1, DriverCallState::Active, "111", false)]);

    assert_eq!(h.phone.events().len(), events_before);
    assert_eq!(h.tracker.foreground_call_state(), CallState::Active);
}

// =============================================================================
// CDMA bulk teardown
// =============================================================================

#[test]
fn cdma_absent_list_drops_foreground_and_ringing() {
    let mut h = harness(NetworkFamily::Cdma);
    h.poll_with(vec![dc(1, DriverCallState::Active, "111", true)]);
    h.tracker.handle_event(TrackerEvent::CdmaCallWaiting {
        info: CdmaCallWaitingInfo {
            number: "222".to_string(),
            name: None,
        },
    });
    assert_eq!(h.tracker.phone_state(), PhoneState::Ringing);

    h.poll_with(vec![]);
    let token = h.radio.fail_cause_token().expect("cause lookup issued");
    h.tracker.handle_event(TrackerEvent::LastCallFailCause {
        token,
        result: Ok(LastCallFailCause {
            cause: FailCause::NormalClearing,
            vendor_cause: None,
        }),
    });

    assert_eq!(
        h.phone.count(|e| matches!(e, PhoneEvent::Disconnected(..))),
        2
    );
    assert_eq!(h.tracker.phone_state(), PhoneState::Idle);
}

// =============================================================================
// Handover (SRVCC)
// =============================================================================

#[test]
fn handover_leg_migrates_into_matching_driver_entry() {
    let mut h = harness(NetworkFamily::Gsm);
    let ho = h
        .tracker
        .stage_handover_connection("12345", Direction::Outgoing, CallState::Active, true);

    h.poll_with(vec![dc(1, DriverCallState::Active, "12345", false)]);

    assert_eq!(h.phone.count(|e| matches!(e, PhoneEvent::Handover(_))), 1);
    assert_eq!(h.phone.count(|e| matches!(e, PhoneEvent::NewRinging(_))), 0);
    // The staged leg is consumed.
    assert!(h.tracker.connection(ho).is_none());
    assert_eq!(h.tracker.foreground_call_state(), CallState::Active);
    // The migrated leg keeps its connect time (not re-connected).
    let slot_conn = h
        .tracker
        .connection_by_index(CallRole::Foreground, 1)
        .and_then(|id| h.tracker.connection(id))
        .unwrap();
    assert!(slot_conn.connect_time().is_some());
}

#[test]
fn unmatched_handover_legs_are_forcibly_disconnected() {
    let mut h = harness(NetworkFamily::Gsm);
    let ringing = h.tracker.stage_handover_connection(
        "111",
        Direction::Incoming,
        CallState::Incoming,
        false,
    );
    let held =
        h.tracker
            .stage_handover_connection("222", Direction::Outgoing, CallState::Holding, true);

    h.poll_with(vec![]);

    assert_eq!(
        h.phone.count(|e| matches!(
            e,
            PhoneEvent::Disconnected(i, DisconnectCause::IncomingMissed) if *i == ringing
        )),
        1
    );
    assert_eq!(
        h.phone.count(|e| matches!(
            e,
            PhoneEvent::Disconnected(i, DisconnectCause::NotValid) if *i == held
        )),
        1
    );
}

// =============================================================================
// New-ringing tie-break
// =============================================================================

#[test]
fn first_ringing_entry_by_index_wins() {
    let mut h = harness(NetworkFamily::Gsm);
    h.poll_with(vec![
        dc(2, DriverCallState::Incoming, "222", true),
        dc(5, DriverCallState::Waiting, "555", true),
    ]);

    let ringing_events: Vec<ConnId> = h
        .phone
        .events()
        .iter()
        .filter_map(|e| match e {
            PhoneEvent::NewRinging(id) => Some(*id),
            _ => None,
        })
        .collect();
    assert_eq!(ringing_events.len(), 1);
    let winner = h.tracker.connection(ringing_events[0]).unwrap();
    assert_eq!(winner.index(), Some(2));
}

// =============================================================================
// Unknown connections
// =============================================================================

#[test]
fn unsolicited_mo_entry_surfaces_as_unknown_connection() {
    let mut h = harness(NetworkFamily::Gsm);
    h.poll_with(vec![dc(1, DriverCallState::Active, "777", false)]);

    assert_eq!(h.phone.count(|e| matches!(e, PhoneEvent::Unknown(_))), 1);
    assert_eq!(h.phone.count(|e| matches!(e, PhoneEvent::NewRinging(_))), 0);
    // Given a connect time so it cannot read as a missed call.
    let id = h
        .tracker
        .connection_by_index(CallRole::Foreground, 1)
        .unwrap();
    assert!(h.tracker.connection(id).unwrap().connect_time().is_some());
}

// =============================================================================
// Pending MO lifecycle edges
// =============================================================================

#[test]
fn pending_mo_missing_from_poll_is_dropped() {
    let mut h = harness(NetworkFamily::Gsm);
    let id = h.tracker.dial("12345", &DialArgs::default()).unwrap();
    h.complete_all();
    h.respond_poll(Ok(vec![]));

    assert_eq!(h.tracker.pending_connection(), None);
    // Non-local cause: resolved via the network lookup.
    let token = h.radio.fail_cause_token().expect("cause lookup issued");
    h.tracker.handle_event(TrackerEvent::LastCallFailCause {
        token,
        result: Ok(LastCallFailCause {
            cause: FailCause::UserBusy,
            vendor_cause: None,
        }),
    });
    assert_eq!(
        h.phone
            .count(|e| matches!(e, PhoneEvent::Disconnected(i, DisconnectCause::Busy) if *i == id)),
        1
    );
}

#[test]
fn invalid_number_is_dropped_without_radio_dial() {
    let mut h = harness(NetworkFamily::Gsm);
    let id = h.tracker.dial("", &DialArgs::default()).unwrap();
    assert_eq!(h.radio.count_dials(), 0);
    // The dial path polls instead.
    h.respond_poll(Ok(vec![]));

    assert_eq!(
        h.phone.count(|e| matches!(
            e,
            PhoneEvent::Disconnected(i, DisconnectCause::InvalidNumber) if *i == id
        )),
        1
    );
    assert!(h.radio.fail_cause_token().is_none());
}

#[test]
fn queued_hangup_applies_when_pending_mo_binds() {
    let mut h = harness(NetworkFamily::Gsm);
    let id = h.tracker.dial("12345", &DialArgs::default()).unwrap();
    h.tracker.hangup_connection(id).unwrap();
    assert!(h.tracker.is_hangup_pending_mo());

    h.complete_all();
    h.respond_poll(Ok(vec![dc(1, DriverCallState::Dialing, "12345", false)]));

    assert!(!h.tracker.is_hangup_pending_mo());
    assert!(h
        .radio
        .commands()
        .iter()
        .any(|c| matches!(c, RadioCommand::HangupConnection(1, _))));
}

// =============================================================================
// Dial issue checks
// =============================================================================

#[test]
fn dial_issues_raise_before_any_radio_command() {
    let mut h = harness(NetworkFamily::Gsm);
    h.radio.off.store(true, Ordering::SeqCst);
    assert_eq!(
        h.tracker.dial("12345", &DialArgs::default()).unwrap_err(),
        CallStateError::PowerOff
    );
    h.radio.off.store(false, Ordering::SeqCst);

    h.poll_with(vec![dc(1, DriverCallState::Incoming, "111", true)]);
    assert_eq!(
        h.tracker.dial("12345", &DialArgs::default()).unwrap_err(),
        CallStateError::CallRinging
    );
    assert_eq!(h.radio.count_dials(), 0);
}

#[test]
fn dialing_twice_raises_already_dialing() {
    let mut h = harness(NetworkFamily::Gsm);
    h.tracker.dial("111", &DialArgs::default()).unwrap();
    assert_eq!(
        h.tracker.dial("222", &DialArgs::default()).unwrap_err(),
        CallStateError::AlreadyDialing
    );
    assert_eq!(h.radio.count_dials(), 1);
}

// =============================================================================
// Accept / reject / call waiting
// =============================================================================

#[test]
fn accept_rejects_when_nothing_is_ringing() {
    let mut h = harness(NetworkFamily::Gsm);
    assert_eq!(h.tracker.accept_call().unwrap_err(), CallStateError::NotRinging);
    assert_eq!(h.tracker.reject_call().unwrap_err(), CallStateError::NotRinging);
}

#[test]
fn cdma_call_waiting_rings_and_accept_promotes_locally() {
    let mut h = harness(NetworkFamily::Cdma);
    h.poll_with(vec![dc(1, DriverCallState::Active, "111", false)]);

    h.tracker.handle_event(TrackerEvent::CdmaCallWaiting {
        info: CdmaCallWaitingInfo {
            number: "222".to_string(),
            name: None,
        },
    });
    assert_eq!(h.tracker.ringing_call_state(), CallState::Waiting);
    assert_eq!(
        h.phone
            .count(|e| matches!(e, PhoneEvent::CallWaiting(n) if n == "222")),
        1
    );

    h.tracker.accept_call().unwrap();
    assert_eq!(h.tracker.ringing_call_state(), CallState::Idle);
    // Both legs now share the foreground call; the waiting leg connected.
    assert_eq!(h.tracker.foreground_call_state(), CallState::Active);
    // Answer is signalled with a flash, not a switch.
    assert!(h
        .radio
        .commands()
        .iter()
        .any(|c| matches!(c, RadioCommand::FeatureCode(code, _) if code.is_empty())));
}

#[test]
fn cdma_waiting_hangup_is_local_only() {
    let mut h = harness(NetworkFamily::Cdma);
    h.tracker.handle_event(TrackerEvent::CdmaCallWaiting {
        info: CdmaCallWaitingInfo {
            number: "222".to_string(),
            name: None,
        },
    });
    // Waiting legs carry no radio index; find via the ringing call.
    let id = *h
        .tracker
        .call_connections(CallRole::Ringing)
        .first()
        .expect("waiting leg tracked");
    let hangups_before = h
        .radio
        .commands()
        .iter()
        .filter(|c| matches!(c, RadioCommand::HangupConnection(..)))
        .count();

    h.tracker.hangup_connection(id).unwrap();

    assert_eq!(
        h.phone
            .count(|e| matches!(e, PhoneEvent::Disconnected(i, DisconnectCause::Local) if *i == id)),
        1
    );
    assert_eq!(
        h.radio
            .commands()
            .iter()
            .filter(|c| matches!(c, RadioCommand::HangupConnection(..)))
            .count(),
        hangups_before
    );
}

// =============================================================================
// CDMA ECM deferred dial
// =============================================================================

#[test]
fn cdma_non_emergency_dial_in_ecm_waits_for_ecm_exit() {
    let mut h = harness(NetworkFamily::Cdma);
    h.phone.in_ecm.store(true, Ordering::SeqCst);

    h.tracker.dial("12345", &DialArgs::default()).unwrap();
    assert_eq!(h.radio.count_dials(), 0);
    assert!(h.tracker.is_pending_call_in_ecm());
    assert_eq!(h.phone.count(|e| matches!(e, PhoneEvent::EcmExitRequested)), 1);

    h.tracker.handle_event(TrackerEvent::EcmExitResponse);
    assert_eq!(h.radio.count_dials(), 1);
    assert!(!h.tracker.is_pending_call_in_ecm());
}

#[test]
fn cdma_emergency_dial_in_ecm_cancels_timer_and_dials() {
    let mut h = harness(NetworkFamily::Cdma);
    h.phone.in_ecm.store(true, Ordering::SeqCst);
    h.phone
        .emergency_numbers
        .lock()
        .unwrap()
        .push("911".to_string());

    let id = h.tracker.dial("911", &DialArgs::default()).unwrap();
    assert_eq!(
        h.phone
            .count(|e| matches!(e, PhoneEvent::EcmTimer(EcmTimerAction::Cancel))),
        1
    );
    assert_eq!(h.radio.count_dials(), 1);
    assert!(h.tracker.connection(id).unwrap().is_emergency_call());
    assert_eq!(h.phone.count(|e| matches!(e, PhoneEvent::DataEnabled(false))), 1);
}

// =============================================================================
// GSM supplementary-service failure notification
// =============================================================================

#[test]
fn gsm_switch_failure_notifies_supp_service_sink() {
    let mut h = harness(NetworkFamily::Gsm);
    h.poll_with(vec![dc(1, DriverCallState::Active, "111", false)]);
    h.tracker.switch_waiting_or_holding_and_active().unwrap();
    let token = h
        .radio
        .commands()
        .iter()
        .find_map(|c| match c {
            RadioCommand::Switch(t) => Some(*t),
            _ => None,
        })
        .unwrap();

    h.tracker.handle_event(TrackerEvent::CommandComplete {
        token,
        result: Err(CommandError::GenericFailure),
    });

    assert_eq!(
        h.phone
            .count(|e| matches!(e, PhoneEvent::SuppFailed(SuppService::Switch))),
        1
    );
}

// =============================================================================
// Post-dial sequence over the radio
// =============================================================================

#[test]
fn post_dial_digits_flow_after_connect() {
    let mut h = harness(NetworkFamily::Gsm);
    let id = h.tracker.dial("555;12", &DialArgs::default()).unwrap();
    h.complete_all();
    h.respond_poll(Ok(vec![dc(1, DriverCallState::Dialing, "555", false)]));

    // Connect: the post-dial tail starts and parks at the WAIT token.
    h.poll_with(vec![dc(1, DriverCallState::Active, "555", false)]);
    assert_eq!(
        h.phone
            .count(|e| matches!(e, PhoneEvent::PostDialWait(i, r) if *i == id && r == "12")),
        1
    );

    h.tracker.proceed_after_wait_char(id);
    let dtmf_token = h
        .radio
        .commands()
        .iter()
        .find_map(|c| match c {
            RadioCommand::Dtmf('1', t) => Some(*t),
            _ => None,
        })
        .expect("first DTMF sent");
    h.tracker.handle_event(TrackerEvent::CommandComplete {
        token: dtmf_token,
        result: Ok(()),
    });
    assert!(h
        .radio
        .commands()
        .iter()
        .any(|c| matches!(c, RadioCommand::Dtmf('2', _))));
}

// =============================================================================
// Phone-type switching and supplementary preconditions
// =============================================================================

#[test]
fn phone_type_switch_tears_down_and_repolls() {
    let mut h = harness(NetworkFamily::Gsm);
    h.poll_with(vec![dc(1, DriverCallState::Active, "111", false)]);
    assert_eq!(h.tracker.phone_state(), PhoneState::Offhook);

    h.tracker.update_phone_type(NetworkFamily::Cdma);

    assert_eq!(h.tracker.family(), NetworkFamily::Cdma);
    assert_eq!(h.tracker.phone_state(), PhoneState::Idle);
    assert_eq!(
        h.phone.count(|e| matches!(
            e,
            PhoneEvent::Disconnected(_, DisconnectCause::ErrorUnspecified)
        )),
        1
    );
    // The switch issues a safety poll on top of the initial one.
    assert!(h.radio.count_polls() >= 2);
}

#[test]
fn conference_and_transfer_need_active_plus_holding() {
    let mut h = harness(NetworkFamily::Gsm);
    assert!(!h.tracker.can_conference());
    assert!(!h.tracker.can_transfer());

    h.poll_with(vec![
        dc(1, DriverCallState::Active, "111", false),
        dc(2, DriverCallState::Holding, "222", false),
    ]);
    assert!(h.tracker.can_conference());
    assert!(h.tracker.can_transfer());
}

#[test]
fn dialing_unmutes_the_radio() {
    let mut h = harness(NetworkFamily::Gsm);
    h.tracker.set_mute(true);
    assert!(h.tracker.mute());

    h.tracker.dial("12345", &DialArgs::default()).unwrap();

    assert!(!h.tracker.mute());
    assert!(h
        .radio
        .commands()
        .iter()
        .any(|c| matches!(c, RadioCommand::SetMute(false))));
}

// =============================================================================
// Dump redaction
// =============================================================================

#[test]
fn dump_never_contains_raw_addresses() {
    let mut h = harness(NetworkFamily::Gsm);
    h.poll_with(vec![dc(1, DriverCallState::Active, "5550123", false)]);
    let dump = h.tracker.dump();
    assert!(!dump.contains("5550123"));
    assert!(dump.contains("slot[1]"));
}
