//! A single call leg and the table that owns all legs.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::aggregate::CallRole;
use super::cause::DisconnectCause;
use super::post_dial::{PostDialEvent, PostDialState, PAUSE_CHAR, WAIT_CHAR, WILD_CHAR};
use super::state::CallState;
use crate::radio::{DriverCall, DriverCallState, FailCause};

/// Connection capability bits.
pub mod capability {
    /// Local device supports downgrading a video call to voice.
    pub const SUPPORTS_DOWNGRADE_TO_VOICE_LOCAL: u32 = 0x0000_0001;
    /// Remote device supports downgrading a video call to voice.
    pub const SUPPORTS_DOWNGRADE_TO_VOICE_REMOTE: u32 = 0x0000_0002;
    /// Local device supports bidirectional video.
    pub const SUPPORTS_VT_LOCAL_BIDIRECTIONAL: u32 = 0x0000_0004;
    /// Remote device supports bidirectional video.
    pub const SUPPORTS_VT_REMOTE_BIDIRECTIONAL: u32 = 0x0000_0008;
    /// The connection is managed by an external device.
    pub const IS_EXTERNAL_CONNECTION: u32 = 0x0000_0010;
    /// The connection can be pulled to this device.
    pub const IS_PULLABLE: u32 = 0x0000_0020;
    /// Remote end supports RTT.
    pub const SUPPORTS_RTT_REMOTE: u32 = 0x0000_0040;
}

/// Adds `cap` to the bitmask. Pure.
#[must_use]
pub const fn add_capability(capabilities: u32, cap: u32) -> u32 {
    capabilities | cap
}

/// Removes `cap` from the bitmask. Pure.
#[must_use]
pub const fn remove_capability(capabilities: u32, cap: u32) -> u32 {
    capabilities & !cap
}

/// Returns `true` if every bit of `caps` is present in `capabilities`.
#[must_use]
pub const fn has_capabilities(capabilities: u32, caps: u32) -> bool {
    capabilities & caps == caps
}

/// Direction of a call leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Mobile-originated (placed from this device).
    Outgoing,
    /// Mobile-terminated (received by this device).
    Incoming,
}

impl Direction {
    #[must_use]
    pub const fn is_incoming(self) -> bool {
        matches!(self, Self::Incoming)
    }
}

/// Details of a dialed emergency number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyNumberInfo {
    /// The emergency number as dialed.
    pub number: String,
    /// Emergency service category bitmask.
    pub categories: u32,
}

/// Negotiated audio codec attributes for a leg.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioCodecAttributes {
    /// Codec identifier as reported by the modem.
    pub codec: u32,
    /// Bitrate in kbps.
    pub bitrate_kbps: f32,
    /// Bandwidth in kHz.
    pub bandwidth_khz: f32,
}

/// Opaque identifier of a tracked connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnId(pub u64);

/// CDMA call-waiting indication payload.
///
/// CDMA signals a waiting call out of band instead of listing it in the
/// current-call snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdmaCallWaitingInfo {
    pub number: String,
    /// Caller name, when the network supplies one.
    pub name: Option<String>,
}

/// Splits a dial string into its network portion and post-dial tail.
///
/// The tail begins at the first PAUSE or WAIT token; a WILD character in
/// the network portion is left in place (the tracker rejects it as an
/// invalid number at dial time).
#[must_use]
pub fn split_dial_string(dial_string: &str) -> (&str, &str) {
    match dial_string.find([PAUSE_CHAR, WAIT_CHAR]) {
        Some(pos) => (&dial_string[..pos], &dial_string[pos..]),
        None => (dial_string, ""),
    }
}

/// Result of applying one driver-list entry to a tracked leg.
#[derive(Debug, Clone, Copy)]
pub struct DriverApply {
    /// An externally-observable (non-hangup) field changed.
    pub changed: bool,
    /// Call role this leg belongs in after the update.
    pub role: CallRole,
}

/// One call leg.
///
/// Created either for an outgoing dial (pending, no radio index yet) or
/// when the poll reconciler discovers an entry in the modem's list with no
/// matching local leg. The numeric radio index, once bound, uniquely
/// identifies the leg until it drops.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnId,
    index: Option<u8>,
    direction: Direction,
    state: CallState,
    role: Option<CallRole>,
    address: String,
    dial_string: Option<String>,
    /// Pre-conversion dialed number when the carrier substituted it.
    orig_dial_string: Option<String>,
    multiparty: bool,

    create_time: DateTime<Utc>,
    create_time_mono: Instant,
    connect_time: Option<DateTime<Utc>>,
    connect_time_mono: Option<Instant>,
    holding_start_mono: Option<Instant>,
    duration: Option<Duration>,

    cause: DisconnectCause,
    vendor_cause: Option<String>,

    post_dial_string: String,
    next_post_dial_char: usize,
    post_dial_state: PostDialState,

    capabilities: u32,
    video_state: u32,
    audio_codec: Option<AudioCodecAttributes>,

    emergency: Option<EmergencyNumberInfo>,
    user_intent_emergency: bool,

    /// Leg state at the moment an SRVCC handover began; consulted when the
    /// migrated leg appears in the target technology's call list.
    pre_handover_state: Option<CallState>,
    migrated: bool,
}

impl Connection {
    /// Creates a pending outgoing leg. No radio index is assigned until
    /// the network acknowledges the dial.
    #[must_use]
    pub fn outgoing(id: ConnId, dial_string: &str) -> Self {
        let (address, post_dial) = split_dial_string(dial_string);
        Self {
            id,
            index: None,
            direction: Direction::Outgoing,
            state: CallState::Dialing,
            role: None,
            address: address.to_string(),
            dial_string: Some(dial_string.to_string()),
            orig_dial_string: None,
            multiparty: false,
            create_time: Utc::now(),
            create_time_mono: Instant::now(),
            connect_time: None,
            connect_time_mono: None,
            holding_start_mono: None,
            duration: None,
            cause: DisconnectCause::NotDisconnected,
            vendor_cause: None,
            post_dial_string: post_dial.to_string(),
            next_post_dial_char: 0,
            post_dial_state: PostDialState::NotStarted,
            capabilities: 0,
            video_state: 0,
            audio_codec: None,
            emergency: None,
            user_intent_emergency: false,
            pre_handover_state: None,
            migrated: false,
        }
    }

    /// Creates a leg for an entry discovered in the modem's call list.
    #[must_use]
    pub fn from_driver(id: ConnId, dc: &DriverCall) -> Self {
        let mut conn = Self::outgoing(id, &dc.address);
        conn.index = Some(dc.index);
        conn.direction = if dc.is_mt {
            Direction::Incoming
        } else {
            Direction::Outgoing
        };
        conn.state = CallState::from(dc.state);
        conn.multiparty = dc.multiparty;
        conn.dial_string = None;
        conn.post_dial_string.clear();
        if conn.state == CallState::Holding {
            conn.holding_start_mono = Some(Instant::now());
        }
        conn
    }

    /// Creates a ringing leg from a CDMA call-waiting notification.
    #[must_use]
    pub fn waiting(id: ConnId, number: &str) -> Self {
        let mut conn = Self::outgoing(id, number);
        conn.direction = Direction::Incoming;
        conn.state = CallState::Waiting;
        conn.dial_string = None;
        conn
    }

    #[must_use]
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// 1-based radio index, when bound.
    #[must_use]
    pub fn index(&self) -> Option<u8> {
        self.index
    }

    /// Binds the radio index after the network acknowledged the dial.
    pub fn bind_index(&mut self, index: u8) {
        self.index = Some(index);
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub fn is_incoming(&self) -> bool {
        self.direction.is_incoming()
    }

    #[must_use]
    pub fn state(&self) -> CallState {
        if self.is_disconnected() {
            CallState::Disconnected
        } else {
            self.state
        }
    }

    #[must_use]
    pub fn role(&self) -> Option<CallRole> {
        self.role
    }

    pub(crate) fn set_role(&mut self, role: Option<CallRole>) {
        self.role = role;
    }

    pub(crate) fn set_state(&mut self, state: CallState) {
        if state == CallState::Holding && self.state != CallState::Holding {
            self.holding_start_mono = Some(Instant::now());
        }
        self.state = state;
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn dial_string(&self) -> Option<&str> {
        self.dial_string.as_deref()
    }

    /// The number the user actually dialed, before any carrier
    /// substitution.
    #[must_use]
    pub fn orig_dial_string(&self) -> Option<&str> {
        self.orig_dial_string.as_deref().or(self.dial_string.as_deref())
    }

    /// Records the pre-conversion number after the carrier substituted the
    /// dialed address.
    pub fn restore_dialed_number_after_conversion(&mut self, orig: &str) {
        self.orig_dial_string = Some(orig.to_string());
    }

    #[must_use]
    pub fn is_multiparty(&self) -> bool {
        self.multiparty
    }

    #[must_use]
    pub fn create_time(&self) -> DateTime<Utc> {
        self.create_time
    }

    #[must_use]
    pub fn connect_time(&self) -> Option<DateTime<Utc>> {
        self.connect_time
    }

    #[must_use]
    pub fn holding_start(&self) -> Option<Instant> {
        self.holding_start_mono
    }

    /// Elapsed connected time: zero before connect, frozen at disconnect.
    #[must_use]
    pub fn duration(&self) -> Duration {
        match (self.duration, self.connect_time_mono) {
            (Some(d), _) => d,
            (None, Some(t)) => t.elapsed(),
            (None, None) => Duration::ZERO,
        }
    }

    #[must_use]
    pub fn disconnect_cause(&self) -> DisconnectCause {
        self.cause
    }

    #[must_use]
    pub fn vendor_cause(&self) -> Option<&str> {
        self.vendor_cause.as_deref()
    }

    /// Stages a cause on a live leg (e.g. invalid number before the poll
    /// notices the drop).
    pub fn stage_cause(&mut self, cause: DisconnectCause) {
        self.cause = cause;
    }

    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.state == CallState::Disconnected
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    #[must_use]
    pub fn capabilities(&self) -> u32 {
        self.capabilities
    }

    /// Replaces the capability bitmask; returns whether it changed.
    pub fn set_capabilities(&mut self, capabilities: u32) -> bool {
        if self.capabilities == capabilities {
            return false;
        }
        self.capabilities = capabilities;
        true
    }

    #[must_use]
    pub fn has_capabilities(&self, caps: u32) -> bool {
        has_capabilities(self.capabilities, caps)
    }

    #[must_use]
    pub fn video_state(&self) -> u32 {
        self.video_state
    }

    pub fn set_video_state(&mut self, video_state: u32) {
        self.video_state = video_state;
    }

    #[must_use]
    pub fn audio_codec(&self) -> Option<AudioCodecAttributes> {
        self.audio_codec
    }

    pub fn set_audio_codec(&mut self, attrs: AudioCodecAttributes) {
        self.audio_codec = Some(attrs);
    }

    #[must_use]
    pub fn is_emergency_call(&self) -> bool {
        self.emergency.is_some()
    }

    #[must_use]
    pub fn emergency_info(&self) -> Option<&EmergencyNumberInfo> {
        self.emergency.as_ref()
    }

    pub fn mark_emergency(&mut self, info: EmergencyNumberInfo) {
        self.emergency = Some(info);
    }

    #[must_use]
    pub fn has_known_user_intent_emergency(&self) -> bool {
        self.user_intent_emergency
    }

    pub fn set_known_user_intent_emergency(&mut self, value: bool) {
        self.user_intent_emergency = value;
    }

    /// CDMA over-the-air provisioning numbers begin with `*228`.
    #[must_use]
    pub fn is_otasp_call(&self) -> bool {
        self.orig_dial_string().is_some_and(|s| s.starts_with("*228"))
    }

    #[must_use]
    pub fn pre_handover_state(&self) -> Option<CallState> {
        self.pre_handover_state
    }

    /// Snapshots the current state ahead of an SRVCC handover.
    pub fn mark_pre_handover(&mut self) {
        self.pre_handover_state = Some(self.state());
    }

    #[must_use]
    pub fn is_migrated(&self) -> bool {
        self.migrated
    }

    // ------------------------------------------------------------------
    // Lifecycle transitions
    // ------------------------------------------------------------------

    /// Marks the first transition into a connected state, setting the
    /// connect timestamps.
    ///
    /// Returns `true` only the first time; the timestamps are written at
    /// most once per leg lifetime.
    pub fn on_connected_in_or_out(&mut self) -> bool {
        if self.connect_time.is_some() {
            return false;
        }
        self.connect_time = Some(Utc::now());
        self.connect_time_mono = Some(Instant::now());
        self.duration = None;
        true
    }

    /// Marks a leg whose metadata was migrated from a handed-over leg
    /// without forcing activation. Connect timestamps carried over by
    /// [`migrate_from`](Self::migrate_from) are left untouched.
    pub fn on_connected_connection_migrated(&mut self) {
        self.migrated = true;
    }

    /// Records the disconnect cause and freezes the duration.
    ///
    /// Returns `true` only for the first disconnect signal; a second call
    /// is a no-op returning `false`.
    pub fn on_disconnect(&mut self, cause: DisconnectCause) -> bool {
        if self.is_disconnected() {
            return false;
        }
        self.cause = cause;
        self.duration = Some(
            self.connect_time_mono
                .map_or(Duration::ZERO, |t| t.elapsed()),
        );
        self.state = CallState::Disconnected;
        self.cancel_post_dial();
        true
    }

    /// Disconnect driven by the radio's last-call-fail-cause response.
    pub fn on_remote_disconnect(&mut self, cause: FailCause, vendor_cause: Option<String>) -> bool {
        self.vendor_cause = vendor_cause;
        self.on_disconnect(disconnect_cause_from_fail(cause))
    }

    /// Records that this side requested the hangup, without changing
    /// state. The drop is observed in a later poll cycle.
    pub fn on_hangup_local(&mut self) {
        if !self.is_disconnected() {
            self.cause = DisconnectCause::Local;
        }
    }

    /// Immediate local disconnect with no network round trip (CDMA
    /// call-waiting hangup).
    pub fn on_local_disconnect(&mut self) -> bool {
        self.on_disconnect(DisconnectCause::Local)
    }

    // ------------------------------------------------------------------
    // Poll reconciliation support
    // ------------------------------------------------------------------

    /// Whether this leg corresponds to the given driver entry: direction
    /// and address both match.
    #[must_use]
    pub fn matches_driver(&self, dc: &DriverCall) -> bool {
        self.is_incoming() == dc.is_mt && addresses_equal(&self.address, &dc.address)
    }

    /// Address-only comparison, used for handover correlation.
    #[must_use]
    pub fn matches_address(&self, address: &str) -> bool {
        addresses_equal(&self.address, address)
    }

    pub(crate) fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    /// Applies an incremental field update from a matching driver entry.
    pub fn apply_driver(&mut self, dc: &DriverCall) -> DriverApply {
        let was_connecting = self.state.is_dialing() || self.state.is_ringing();
        let mut changed = false;

        if !addresses_equal(&self.address, &dc.address) && !dc.address.is_empty() {
            self.address = dc.address.clone();
            changed = true;
        }
        if self.multiparty != dc.multiparty {
            self.multiparty = dc.multiparty;
            changed = true;
        }
        let new_state = CallState::from(dc.state);
        if self.state != new_state {
            self.set_state(new_state);
            changed = true;
        }
        if was_connecting && !(self.state.is_dialing() || self.state.is_ringing()) {
            self.on_connected_in_or_out();
        }

        DriverApply {
            changed,
            role: CallRole::for_driver_state(dc.state),
        }
    }

    /// Migrates accumulated metadata from a handed-over leg (SRVCC).
    pub fn migrate_from(&mut self, other: &Connection) {
        self.dial_string = other.dial_string.clone();
        self.orig_dial_string = other.orig_dial_string.clone();
        self.create_time = other.create_time;
        self.create_time_mono = other.create_time_mono;
        self.connect_time = other.connect_time;
        self.connect_time_mono = other.connect_time_mono;
        self.holding_start_mono = other.holding_start_mono;
        self.post_dial_string = other.post_dial_string.clone();
        self.next_post_dial_char = other.next_post_dial_char;
        self.post_dial_state = other.post_dial_state;
        self.emergency = other.emergency.clone();
        self.user_intent_emergency = other.user_intent_emergency;
    }

    // ------------------------------------------------------------------
    // Post-dial sequence
    // ------------------------------------------------------------------

    #[must_use]
    pub fn post_dial_state(&self) -> PostDialState {
        self.post_dial_state
    }

    /// The portion of the post-dial tail not yet dispatched.
    #[must_use]
    pub fn remaining_post_dial_string(&self) -> &str {
        match self.post_dial_state {
            PostDialState::Cancelled | PostDialState::Complete => "",
            _ => self
                .post_dial_string
                .get(self.next_post_dial_char..)
                .unwrap_or(""),
        }
    }

    /// Advances the post-dial sequence by one character.
    pub fn process_next_post_dial_char(&mut self) -> PostDialEvent {
        if matches!(
            self.post_dial_state,
            PostDialState::Cancelled | PostDialState::Complete
        ) {
            return PostDialEvent::None;
        }
        let Some(c) = self.post_dial_string.chars().nth(self.next_post_dial_char) else {
            self.post_dial_state = PostDialState::Complete;
            return PostDialEvent::Complete;
        };
        self.next_post_dial_char += 1;
        match c {
            WAIT_CHAR => {
                self.post_dial_state = PostDialState::Wait;
                PostDialEvent::Wait
            }
            WILD_CHAR => {
                self.post_dial_state = PostDialState::Wild;
                PostDialEvent::Wild
            }
            PAUSE_CHAR => {
                self.post_dial_state = PostDialState::Pause;
                PostDialEvent::Pause
            }
            _ => {
                self.post_dial_state = PostDialState::Started;
                PostDialEvent::Dtmf(c)
            }
        }
    }

    /// Resumes a sequence paused at a WAIT token.
    pub fn proceed_after_wait_char(&mut self) -> PostDialEvent {
        if self.post_dial_state != PostDialState::Wait {
            return PostDialEvent::None;
        }
        self.post_dial_state = PostDialState::Started;
        self.process_next_post_dial_char()
    }

    /// Resumes a sequence paused at a WILD token, substituting the
    /// user-supplied digits for the wildcard.
    pub fn proceed_after_wild_char(&mut self, replacement: &str) -> PostDialEvent {
        if self.post_dial_state != PostDialState::Wild {
            return PostDialEvent::None;
        }
        // Splice the replacement in place of the consumed wildcard.
        let before: String = self
            .post_dial_string
            .chars()
            .take(self.next_post_dial_char - 1)
            .collect();
        let after: String = self
            .post_dial_string
            .chars()
            .skip(self.next_post_dial_char)
            .collect();
        self.post_dial_string = format!("{before}{replacement}{after}");
        self.next_post_dial_char -= 1;
        self.post_dial_state = PostDialState::Started;
        self.process_next_post_dial_char()
    }

    /// Halts the post-dial sequence permanently.
    pub fn cancel_post_dial(&mut self) {
        if !matches!(
            self.post_dial_state,
            PostDialState::NotStarted | PostDialState::Complete
        ) {
            self.post_dial_state = PostDialState::Cancelled;
        }
    }
}

/// Maps a network fail cause to the presented disconnect cause.
#[must_use]
fn disconnect_cause_from_fail(cause: FailCause) -> DisconnectCause {
    match cause {
        FailCause::NormalClearing => DisconnectCause::Normal,
        FailCause::UserBusy => DisconnectCause::Busy,
        FailCause::UnobtainableNumber => DisconnectCause::InvalidNumber,
        FailCause::NoCircuitAvail
        | FailCause::TemporaryFailure
        | FailCause::SwitchingCongestion
        | FailCause::ChannelNotAvail
        | FailCause::QosNotAvail
        | FailCause::BearerNotAvail => DisconnectCause::Congestion,
        FailCause::ErrorUnspecified | FailCause::Other(_) => DisconnectCause::ErrorUnspecified,
    }
}

/// Dialed-address comparison used by poll reconciliation.
///
/// Non-dialable formatting is ignored so that the modem's normalized echo
/// of a dial string still matches the pending leg.
#[must_use]
fn addresses_equal(a: &str, b: &str) -> bool {
    let dialable = |s: &str| {
        s.chars()
            .filter(|c| c.is_ascii_digit() || matches!(c, '+' | '*' | '#'))
            .collect::<String>()
    };
    dialable(a) == dialable(b)
}

impl From<DriverCallState> for CallState {
    fn from(state: DriverCallState) -> Self {
        match state {
            DriverCallState::Active => Self::Active,
            DriverCallState::Holding => Self::Holding,
            DriverCallState::Dialing => Self::Dialing,
            DriverCallState::Alerting => Self::Alerting,
            DriverCallState::Incoming => Self::Incoming,
            DriverCallState::Waiting => Self::Waiting,
        }
    }
}

/// Owning table of all tracked connections.
///
/// Call roles and the tracker's slot array refer to legs by [`ConnId`];
/// the table is the single owner.
#[derive(Debug, Default)]
pub struct ConnTable {
    next_id: u64,
    conns: HashMap<ConnId, Connection>,
}

impl ConnTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new connection built from the allocated id.
    pub fn insert(&mut self, build: impl FnOnce(ConnId) -> Connection) -> ConnId {
        self.next_id += 1;
        let id = ConnId(self.next_id);
        self.conns.insert(id, build(id));
        id
    }

    #[must_use]
    pub fn get(&self, id: ConnId) -> Option<&Connection> {
        self.conns.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnId) -> Option<&mut Connection> {
        self.conns.get_mut(&id)
    }

    /// Removes a fully-detached connection from the table.
    pub fn remove(&mut self, id: ConnId) -> Option<Connection> {
        self.conns.remove(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.conns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.conns.values()
    }
}
