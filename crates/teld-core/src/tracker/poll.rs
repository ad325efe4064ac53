//! The poll-merge reconciliation engine.
//!
//! One invocation per poll-completion event, strictly serialized. The
//! modem's sparse, index-sorted call list is walked in lock-step with the
//! local slot array; each index resolves to one of four cases (appeared,
//! vanished, replaced, updated) with family-specific tie-breaks. Radio
//! unavailability is treated as an empty list and tears everything down;
//! a transient command failure abandons the cycle without touching state
//! and schedules a delayed retry.

use tracing::{debug, error, info, warn};

use crate::call::{CallRole, CallState, ConnId, Connection, DisconnectCause};
use crate::platform::EcmTimerAction;
use crate::radio::{CommandError, DriverCall, DriverCallState, FailCause, LastCallFailCause};

use super::{CallTracker, CommandPurpose};

impl CallTracker {
    /// Reconciles the driver-reported call list against tracked state.
    pub(crate) fn handle_poll_calls(&mut self, result: Result<Vec<DriverCall>, CommandError>) {
        let polled = match result {
            Ok(list) => list,
            Err(CommandError::RadioNotAvailable) => {
                // Empty list: the walk below hangs up everything tracked.
                Vec::new()
            }
            Err(err) => {
                // Radio probably wasn't ready; try again in a bit without
                // mutating any tracked state.
                debug!(%err, "transient poll failure, scheduling retry");
                self.poll_calls_after_delay();
                return;
            }
        };

        let mut new_ringing: Option<ConnId> = None;
        let mut new_unknowns_gsm: Vec<ConnId> = Vec::new();
        let mut new_unknown_cdma: Option<ConnId> = None;
        let mut unknown_connection_appeared = false;
        // Any change besides a dropped connection.
        let mut has_non_hangup_state_changed = false;
        let mut has_any_call_disconnected = false;
        let mut no_connection_exists = true;

        let mut cur_dc = 0usize;
        for i in 0..self.slots.len() {
            let local = self.slots[i];
            let dc = polled
                .get(cur_dc)
                .filter(|dc| usize::from(dc.index) == i + 1)
                .cloned();
            if dc.is_some() {
                cur_dc += 1;
            }
            if local.is_some() || dc.is_some() {
                no_connection_exists = false;
            }

            match (local, dc) {
                (None, Some(dc)) => {
                    // A connection appeared that we don't know about.
                    let pending_match = self.pending_mo.filter(|id| {
                        self.conns
                            .get(*id)
                            .is_some_and(|c| c.matches_driver(&dc))
                    });
                    if let Some(id) = pending_match {
                        debug!(index = dc.index, "pending MO bound to index");
                        self.slots[i] = Some(id);
                        self.pending_mo = None;
                        if let Some(conn) = self.conns.get_mut(id) {
                            conn.bind_index(dc.index);
                        }
                        self.apply_driver_to(id, &dc);

                        // Someone already asked to hang this call up.
                        if self.hangup_pending_mo {
                            self.hangup_pending_mo = false;
                            if self.family.is_cdma()
                                && self
                                    .conns
                                    .get(id)
                                    .is_some_and(Connection::is_emergency_call)
                            {
                                // An uncompleted emergency call ended;
                                // restart the ECM timer.
                                self.phone.handle_ecm_timer(EcmTimerAction::Restart);
                            }
                            debug!(index = dc.index, "hangup pending MO");
                            if self.hangup_connection(id).is_err() {
                                error!("unexpected error on hangup");
                            }
                            // Do not continue processing this poll; wait
                            // for the hangup to land and repoll.
                            return;
                        }
                    } else {
                        let id = self
                            .conns
                            .insert(|id| Connection::from_driver(id, &dc));
                        self.slots[i] = Some(id);

                        if let Some(ho_id) = self.find_handover_match(&dc) {
                            self.complete_handover(id, ho_id, &dc);
                        } else {
                            self.attach_to_role(id, CallRole::for_driver_state(dc.state));
                            if self.conns.get(id).and_then(Connection::role)
                                == Some(CallRole::Ringing)
                            {
                                // First ringing entry this cycle wins;
                                // ties break by ascending index.
                                if new_ringing.is_none() {
                                    new_ringing = Some(id);
                                }
                            } else {
                                self.note_phantom_connected(id, &dc);
                                unknown_connection_appeared = true;
                                if self.family.is_gsm() {
                                    new_unknowns_gsm.push(id);
                                } else {
                                    new_unknown_cdma = Some(id);
                                }
                            }
                        }
                    }
                    has_non_hangup_state_changed = true;
                }
                (Some(id), None) => {
                    if self.family.is_gsm() {
                        // Tracked connection vanished from the list.
                        self.dropped_during_poll.push(id);
                    } else {
                        // CDMA has no authoritative per-call list: absence
                        // of any entry means total call-session teardown
                        // of the foreground and ringing roles.
                        let members: Vec<ConnId> = self
                            .calls
                            .foreground
                            .connections()
                            .iter()
                            .chain(self.calls.ringing.connections().iter())
                            .copied()
                            .collect();
                        for member in members {
                            debug!(?member, "bulk-dropping CDMA leg");
                            if !self.dropped_during_poll.contains(&member) {
                                self.dropped_during_poll.push(member);
                            }
                        }
                        self.check_and_enable_data_after_emergency_drop();
                    }
                    // Dropped connections leave the slot array but stay in
                    // their call until the disconnect sweep.
                    self.slots[i] = None;
                }
                (Some(id), Some(dc)) => {
                    let matches = self
                        .conns
                        .get(id)
                        .is_some_and(|c| c.matches_driver(&dc));
                    let direction_conflict = self
                        .conns
                        .get(id)
                        .is_some_and(|c| c.is_incoming() != dc.is_mt);

                    if !matches && self.family.is_gsm() {
                        // The entry no longer matches what we were
                        // tracking: simultaneous drop-old + create-new.
                        self.dropped_during_poll.push(id);
                        let new_id = self
                            .conns
                            .insert(|nid| Connection::from_driver(nid, &dc));
                        self.slots[i] = Some(new_id);
                        self.attach_to_role(new_id, CallRole::for_driver_state(dc.state));
                        if self.conns.get(new_id).and_then(Connection::role)
                            == Some(CallRole::Ringing)
                            && new_ringing.is_none()
                        {
                            new_ringing = Some(new_id);
                        }
                        has_non_hangup_state_changed = true;
                    } else if self.family.is_cdma() && direction_conflict {
                        if dc.is_mt {
                            // Call collision: the network-originated call
                            // takes precedence; the local MO attempt is
                            // dropped.
                            self.dropped_during_poll.push(id);
                            unknown_connection_appeared = true;
                            new_unknown_cdma = Some(id);
                            self.check_and_enable_data_after_emergency_drop();
                        } else {
                            // Local says MT, driver disagrees. Looks like
                            // the known modem phantom-call oddity; keep the
                            // local state untouched and only log.
                            error!(index = dc.index, "phantom call appeared: {dc}");
                        }
                    } else {
                        let changed = self.apply_driver_to(id, &dc);
                        has_non_hangup_state_changed |= changed;
                    }
                }
                (None, None) => {}
            }
        }

        // Safety check so a stale emergency flag cannot keep data
        // disabled when no connection exists at all.
        if self.family.is_cdma() && no_connection_exists {
            self.check_and_enable_data_after_emergency_drop();
        }

        // First poll after a dial: the pending call should have appeared.
        // If it never did, the dial failed silently.
        if let Some(id) = self.pending_mo.take() {
            debug!(
                foreground = %self.calls.foreground.state(&self.conns),
                "pending MO dropped before poll"
            );
            self.dropped_during_poll.push(id);
            self.hangup_pending_mo = false;
            if self.family.is_cdma() {
                self.pending_call_in_ecm = false;
                self.check_and_enable_data_after_emergency_drop();
            }
        }

        if let Some(id) = new_ringing {
            self.phone.on_new_ringing_connection(id);
        }

        // Local hangups and missed/rejected calls need no network fail
        // cause; clear them from the dropped set now.
        let mut idx = self.dropped_during_poll.len();
        while idx > 0 {
            idx -= 1;
            let id = self.dropped_during_poll[idx];
            let Some(conn) = self.conns.get_mut(id) else {
                self.dropped_during_poll.remove(idx);
                continue;
            };
            let mut was_disconnected = false;

            if conn.is_incoming() && conn.connect_time().is_none() {
                let cause = if conn.disconnect_cause() == DisconnectCause::Local {
                    DisconnectCause::IncomingRejected
                } else {
                    DisconnectCause::IncomingMissed
                };
                debug!(%cause, "classifying unanswered incoming drop");
                self.dropped_during_poll.remove(idx);
                if conn.on_disconnect(cause) {
                    has_any_call_disconnected = true;
                    self.phone.on_connection_disconnected(id, cause);
                }
                was_disconnected = true;
            } else if conn.disconnect_cause().skips_cause_lookup() {
                let cause = conn.disconnect_cause();
                self.dropped_during_poll.remove(idx);
                if conn.on_disconnect(cause) {
                    has_any_call_disconnected = true;
                    self.phone.on_connection_disconnected(id, cause);
                }
                was_disconnected = true;
            }

            if self.family.is_cdma()
                && was_disconnected
                && unknown_connection_appeared
                && new_unknown_cdma == Some(id)
            {
                unknown_connection_appeared = false;
                new_unknown_cdma = None;
            }
        }

        // Forcibly disconnect any handover leg that never matched.
        for ho_id in std::mem::take(&mut self.handover_connections) {
            if let Some(mut ho) = self.conns.remove(ho_id) {
                let cause = if ho.state().is_ringing() {
                    DisconnectCause::IncomingMissed
                } else {
                    DisconnectCause::NotValid
                };
                debug!(?ho_id, %cause, "disconnecting unmatched handover leg");
                if ho.on_disconnect(cause) {
                    self.phone.on_connection_disconnected(ho_id, cause);
                }
            }
        }

        // Non-local drops need the authoritative network cause.
        if !self.dropped_during_poll.is_empty() {
            let token = self.begin_command(CommandPurpose::FailCause);
            self.radio.get_last_call_fail_cause(token);
        }

        // Disconnected legs can no longer stay attached once the phone
        // started ringing, something observable changed, or a call
        // disconnected.
        if new_ringing.is_some() || has_non_hangup_state_changed || has_any_call_disconnected {
            self.internal_clear_disconnected();
        }

        self.update_phone_state();

        if unknown_connection_appeared {
            if self.family.is_gsm() {
                for id in new_unknowns_gsm {
                    debug!(?id, "notify unknown connection");
                    self.phone.on_unknown_connection(id);
                }
            } else if let Some(id) = new_unknown_cdma {
                self.phone.on_unknown_connection(id);
            }
        }

        if has_non_hangup_state_changed || new_ringing.is_some() || has_any_call_disconnected {
            self.phone.on_precise_call_state_changed();
        }
    }

    /// Applies a driver entry to a tracked leg: field update, role move,
    /// and post-dial kick-off on the connect transition.
    fn apply_driver_to(&mut self, id: ConnId, dc: &DriverCall) -> bool {
        let Some(conn) = self.conns.get_mut(id) else {
            return false;
        };
        let had_connect_time = conn.connect_time().is_some();
        let apply = conn.apply_driver(dc);
        let connected_now = !had_connect_time && conn.connect_time().is_some();
        let role_moved = self.move_to_role(id, apply.role);
        if connected_now {
            self.start_post_dial(id);
        }
        apply.changed || role_moved
    }

    fn find_handover_match(&self, dc: &DriverCall) -> Option<ConnId> {
        self.handover_connections
            .iter()
            .copied()
            .find(|id| {
                self.conns
                    .get(*id)
                    .is_some_and(|c| c.matches_address(&dc.address))
            })
    }

    /// Single Radio Voice Call Continuity completed: migrate the
    /// handed-over leg's accumulated metadata into the new entry.
    fn complete_handover(&mut self, id: ConnId, ho_id: ConnId, dc: &DriverCall) {
        debug!(index = dc.index, "handover connection found");
        self.handover_connections.retain(|h| *h != ho_id);
        if let Some(ho) = self.conns.remove(ho_id) {
            if let Some(conn) = self.conns.get_mut(id) {
                conn.migrate_from(&ho);
                let pre = ho.pre_handover_state();
                if !matches!(pre, Some(CallState::Active | CallState::Holding))
                    && dc.state == DriverCallState::Active
                {
                    // Covers silent-redial transfers that connect during
                    // the handover window.
                    conn.on_connected_in_or_out();
                } else {
                    conn.on_connected_connection_migrated();
                }
            }
        }
        self.attach_to_role(id, CallRole::for_driver_state(dc.state));
        self.phone.on_handover_state_changed(id);
    }

    /// A mobile-terminated entry that landed outside the ringing call:
    /// either a collision artifact or a network-originated call we never
    /// solicited. Give it a connect time so it cannot read as missed.
    fn note_phantom_connected(&mut self, id: ConnId, dc: &DriverCall) {
        warn!(index = dc.index, "unknown connection appeared: {dc}");
        if !matches!(
            dc.state,
            DriverCallState::Alerting | DriverCallState::Dialing
        ) {
            if let Some(conn) = self.conns.get_mut(id) {
                conn.on_connected_in_or_out();
            }
        }
    }

    /// Applies the authoritative last-call-fail-cause to every leg still
    /// awaiting cause resolution.
    pub(crate) fn handle_last_call_fail_cause(
        &mut self,
        result: Result<LastCallFailCause, CommandError>,
    ) {
        let (cause, vendor_cause) = match result {
            Ok(payload) => (payload.cause, payload.vendor_cause),
            Err(err) if err.is_internal_resource_error() => {
                // Truly exceptional modem errors must not present as
                // ordinary call clearing; surface the command error as the
                // vendor cause.
                (FailCause::ErrorUnspecified, Some(err.name().to_string()))
            }
            Err(_) => {
                info!("fail-cause lookup failed, assuming normal disconnect");
                (FailCause::NormalClearing, None)
            }
        };

        if matches!(
            cause,
            FailCause::NoCircuitAvail
                | FailCause::TemporaryFailure
                | FailCause::SwitchingCongestion
                | FailCause::ChannelNotAvail
                | FailCause::QosNotAvail
                | FailCause::BearerNotAvail
                | FailCause::ErrorUnspecified
        ) {
            info!(?cause, "abnormal call drop");
        }

        for id in std::mem::take(&mut self.dropped_during_poll) {
            if let Some(conn) = self.conns.get_mut(id) {
                if conn.on_remote_disconnect(cause, vendor_cause.clone()) {
                    let mapped = conn.disconnect_cause();
                    self.phone.on_connection_disconnected(id, mapped);
                }
            }
        }

        self.update_phone_state();
        self.phone.on_precise_call_state_changed();
    }
}
