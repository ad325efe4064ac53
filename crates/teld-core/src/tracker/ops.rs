//! User-facing call operations: dial, answer, hangup, switch, conference.

use tracing::{debug, error, warn};

use crate::call::{
    CallRole, CallState, CdmaCallWaitingInfo, ConnId, Connection, Direction, EmergencyNumberInfo,
    WILD_CHAR,
};
use crate::platform::EcmTimerAction;
use crate::radio::{ClirMode, DialRequest};

use super::error::CallStateError;
use super::events::DialArgs;
use super::{CallTracker, CommandPurpose, TIMER_THREE_WAY_FLASH};
use super::{TrackerEvent, TrackerMsg};

impl CallTracker {
    // ------------------------------------------------------------------
    // Dialing
    // ------------------------------------------------------------------

    /// Places an outgoing call.
    ///
    /// Returns the pending connection id; the leg is bound to a radio
    /// index when the next poll observes the dial. All user-actionable
    /// dial errors are raised here, before any radio command is issued.
    pub fn dial(&mut self, dial_string: &str, args: &DialArgs) -> Result<ConnId, CallStateError> {
        match self.family {
            crate::call::NetworkFamily::Gsm => self.dial_gsm(dial_string, args),
            crate::call::NetworkFamily::Cdma => self.dial_cdma(dial_string, args),
        }
    }

    fn dial_gsm(&mut self, dial_string: &str, args: &DialArgs) -> Result<ConnId, CallStateError> {
        let emergency_info = self.phone.emergency_number_info(dial_string);
        let is_emergency = args.is_emergency || emergency_info.is_some();

        // This triggers a call-state-changed notification.
        self.clear_disconnected();
        self.check_for_dial_issues(is_emergency)?;

        let orig_number = dial_string.to_string();
        let converted = self.phone.convert_number(dial_string);
        let number_converted = converted.is_some();
        let dial_string = converted.unwrap_or_else(|| dial_string.to_string());

        // The new call goes to the foreground slot, which must be idle;
        // anything active there is put on hold first.
        if self.calls.foreground.state(&self.conns) == CallState::Active {
            self.switch_waiting_or_holding_and_active()?;
            self.fake_hold_foreground_before_dial();
        }
        if self.calls.foreground.state(&self.conns) != CallState::Idle {
            return Err(CallStateError::CannotDialInState);
        }

        let id = self.create_pending_mo(&dial_string, args, emergency_info, is_emergency);
        self.issue_dial_or_fail_invalid(id, is_emergency, args);

        if number_converted {
            if let Some(conn) = self.conns.get_mut(id) {
                conn.restore_dialed_number_after_conversion(&orig_number);
            }
        }
        self.update_phone_state();
        self.phone.on_precise_call_state_changed();
        Ok(id)
    }

    fn dial_cdma(&mut self, dial_string: &str, args: &DialArgs) -> Result<ConnId, CallStateError> {
        let emergency_info = self.phone.emergency_number_info(dial_string);
        let is_emergency = args.is_emergency || emergency_info.is_some();

        self.clear_disconnected();
        self.check_for_dial_issues(is_emergency)?;

        let orig_number = dial_string.to_string();
        let converted = self.phone.convert_number(dial_string);
        let number_converted = converted.is_some();
        let dial_string = converted.unwrap_or_else(|| dial_string.to_string());

        let in_ecm = self.phone.is_in_ecm();
        // A second emergency call while in ECM cancels the ECM timer.
        if in_ecm && is_emergency {
            self.phone.handle_ecm_timer(EcmTimerAction::Cancel);
        }

        if self.calls.foreground.state(&self.conns) == CallState::Active {
            return self.dial_three_way(&dial_string, args, emergency_info);
        }

        let id = self.create_pending_mo(&dial_string, args, emergency_info, is_emergency);

        let invalid = self
            .conns
            .get(id)
            .is_some_and(|c| c.address().is_empty() || c.address().contains(WILD_CHAR));
        if invalid {
            if let Some(conn) = self.conns.get_mut(id) {
                conn.stage_cause(crate::call::DisconnectCause::InvalidNumber);
            }
            // The next poll notices the absent leg and drops it.
            self.poll_calls_when_safe();
        } else {
            self.set_mute(false);
            self.disable_data_in_emergency_call(&dial_string);

            // In ECM, a non-emergency dial first requests ECM exit and is
            // issued when the exit response arrives.
            if !in_ecm || is_emergency {
                self.issue_pending_dial(id, if is_emergency { ClirMode::Suppression } else { args.clir });
            } else {
                self.phone.request_ecm_exit();
                self.pending_call_clir = args.clir;
                self.pending_call_in_ecm = true;
            }
        }

        if number_converted {
            if let Some(conn) = self.conns.get_mut(id) {
                conn.restore_dialed_number_after_conversion(&orig_number);
            }
        }
        self.update_phone_state();
        self.phone.on_precise_call_state_changed();
        Ok(id)
    }

    /// CDMA three-way add: driven by FLASH feature codes rather than a
    /// dial command, optionally preceded by a carrier-configured blank
    /// flash.
    fn dial_three_way(
        &mut self,
        dial_string: &str,
        args: &DialArgs,
        emergency_info: Option<EmergencyNumberInfo>,
    ) -> Result<ConnId, CallStateError> {
        if self.calls.foreground.is_idle(&self.conns) {
            return Err(CallStateError::CannotDialInState);
        }
        self.disable_data_in_emergency_call(dial_string);

        let is_emergency = args.is_emergency || emergency_info.is_some();
        let id = self.create_pending_mo(dial_string, args, emergency_info, is_emergency);

        let flash_delay = self.phone.cdma_three_way_flash_delay();
        if flash_delay > std::time::Duration::ZERO {
            // Some networks need an empty flash before the real one.
            let token = self.begin_command(CommandPurpose::BlankFlash);
            self.radio.send_cdma_feature_code("", token);
        } else {
            let address = self
                .conns
                .get(id)
                .map(|c| c.address().to_string())
                .unwrap_or_default();
            let token = self.begin_command(CommandPurpose::L2Flash);
            self.radio.send_cdma_feature_code(&address, token);
        }
        Ok(id)
    }

    fn create_pending_mo(
        &mut self,
        dial_string: &str,
        args: &DialArgs,
        emergency_info: Option<EmergencyNumberInfo>,
        is_emergency: bool,
    ) -> ConnId {
        let id = self.conns.insert(|id| Connection::outgoing(id, dial_string));
        self.attach_to_role(id, CallRole::Foreground);
        if let Some(conn) = self.conns.get_mut(id) {
            if let Some(info) = emergency_info {
                conn.mark_emergency(info);
            } else if is_emergency {
                conn.mark_emergency(EmergencyNumberInfo {
                    number: conn.address().to_string(),
                    categories: 0,
                });
            }
            conn.set_known_user_intent_emergency(args.has_known_user_intent_emergency);
        }
        self.pending_mo = Some(id);
        self.hangup_pending_mo = false;
        id
    }

    /// GSM dial issue path: invalid numbers are staged and dropped by the
    /// next poll instead of being sent to the radio.
    fn issue_dial_or_fail_invalid(&mut self, id: ConnId, is_emergency: bool, args: &DialArgs) {
        let invalid = self
            .conns
            .get(id)
            .is_some_and(|c| c.address().is_empty() || c.address().contains(WILD_CHAR));
        if invalid {
            if let Some(conn) = self.conns.get_mut(id) {
                conn.stage_cause(crate::call::DisconnectCause::InvalidNumber);
            }
            self.poll_calls_when_safe();
        } else {
            // Always unmute when initiating a new call.
            self.set_mute(false);
            self.issue_pending_dial(id, if is_emergency { ClirMode::Suppression } else { args.clir });
        }
    }

    pub(crate) fn issue_pending_dial(&mut self, id: ConnId, clir: ClirMode) {
        let Some(conn) = self.conns.get(id) else {
            return;
        };
        let request = DialRequest {
            address: conn.address().to_string(),
            clir,
            is_emergency: conn.is_emergency_call(),
            has_known_user_intent_emergency: conn.has_known_user_intent_emergency(),
        };
        let token = self.begin_command(CommandPurpose::Operation);
        self.radio.dial(request, token);
    }

    /// Moves every foreground leg to the background slot with a locally
    /// faked HOLDING state, so a failed dial cannot clear a live call on
    /// the next poll.
    fn fake_hold_foreground_before_dial(&mut self) {
        let members: Vec<ConnId> = self.calls.foreground.connections().to_vec();
        for id in members {
            self.calls.foreground.detach(id, &mut self.conns);
            if let Some(conn) = self.conns.get_mut(id) {
                conn.set_state(CallState::Holding);
            }
            self.calls.background.attach(id, &mut self.conns);
        }
    }

    /// Checks every condition that precludes dialing. Errors are raised
    /// before any radio command is issued.
    pub fn check_for_dial_issues(&self, is_emergency: bool) -> Result<(), CallStateError> {
        if !self.radio.radio_on() {
            return Err(CallStateError::PowerOff);
        }
        if self.phone.calling_disabled() {
            return Err(CallStateError::CallingDisabled);
        }
        if self.pending_mo.is_some() {
            return Err(CallStateError::AlreadyDialing);
        }
        if self.calls.ringing.is_ringing(&self.conns) {
            return Err(CallStateError::CallRinging);
        }
        let fg = self.calls.foreground.state(&self.conns);
        let bg = self.calls.background.state(&self.conns);
        // A foreground call that is alive but not yet ACTIVE (holding,
        // dialing, alerting) cannot coexist with an alive background
        // call. An ACTIVE foreground is fine: it is put on hold (GSM) or
        // extended three-way (CDMA).
        if fg.is_alive() && fg != CallState::Active && bg.is_alive() {
            return Err(CallStateError::TooManyCalls);
        }
        // Membership cap: a GSM dial pushes the active foreground legs
        // onto the background call, which must be able to absorb them.
        if self.family.is_gsm()
            && fg == CallState::Active
            && self.calls.foreground.connection_count() + self.calls.background.connection_count()
                > self.family.max_connections_per_call()
        {
            return Err(CallStateError::TooManyCalls);
        }
        if !is_emergency && self.is_in_otasp_call() {
            return Err(CallStateError::OtaspProvisioning);
        }
        Ok(())
    }

    /// Whether the pending or any foreground leg is an OTASP provisioning
    /// call.
    #[must_use]
    pub fn is_in_otasp_call(&self) -> bool {
        let pending_otasp = self
            .pending_mo
            .and_then(|id| self.conns.get(id))
            .is_some_and(Connection::is_otasp_call);
        pending_otasp
            || self
                .calls
                .foreground
                .connections()
                .iter()
                .filter_map(|id| self.conns.get(*id))
                .any(Connection::is_otasp_call)
    }

    // ------------------------------------------------------------------
    // Answer / reject / switch / conference
    // ------------------------------------------------------------------

    /// Answers the ringing call.
    pub fn accept_call(&mut self) -> Result<(), CallStateError> {
        match self.calls.ringing.state(&self.conns) {
            CallState::Incoming => {
                // Always unmute when answering.
                self.set_mute(false);
                let token = self.begin_command(CommandPurpose::Operation);
                self.radio.accept_call(token);
                Ok(())
            }
            CallState::Waiting => {
                if self.family.is_gsm() {
                    self.set_mute(false);
                } else {
                    // No supplementary-service response exists on CDMA;
                    // assume the waiting call is answered and promote it
                    // locally.
                    let Some(id) = self.calls.ringing.latest_connection() else {
                        return Err(CallStateError::EmptyCall);
                    };
                    self.calls.ringing.detach(id, &mut self.conns);
                    self.attach_to_role(id, CallRole::Foreground);
                    if let Some(conn) = self.conns.get_mut(id) {
                        conn.set_state(CallState::Active);
                        conn.on_connected_in_or_out();
                    }
                    self.update_phone_state();
                }
                self.switch_waiting_or_holding_and_active()
            }
            _ => Err(CallStateError::NotRinging),
        }
    }

    /// Rejects the ringing call.
    pub fn reject_call(&mut self) -> Result<(), CallStateError> {
        if self.calls.ringing.state(&self.conns).is_ringing() {
            let token = self.begin_command(CommandPurpose::Operation);
            self.radio.reject_call(token);
            Ok(())
        } else {
            Err(CallStateError::NotRinging)
        }
    }

    /// Swaps the active and held calls (GSM) or flashes (CDMA).
    pub fn switch_waiting_or_holding_and_active(&mut self) -> Result<(), CallStateError> {
        if self.calls.ringing.state(&self.conns) == CallState::Incoming {
            return Err(CallStateError::IncomingRinging);
        }
        if self.family.is_gsm() {
            let token = self.begin_command(CommandPurpose::Switch);
            self.radio.switch_waiting_or_holding_and_active(token);
        } else if self.calls.foreground.connection_count() > 1 {
            self.flash_and_notify();
        } else {
            // A bare flash asks the CDMA network to hold the other party;
            // networks without support just play a beep.
            let token = self.begin_command(CommandPurpose::CdmaFlash);
            self.radio.send_cdma_feature_code("", token);
        }
        Ok(())
    }

    fn flash_and_notify(&mut self) {
        let token = self.begin_command(CommandPurpose::CdmaFlash);
        self.radio.send_cdma_feature_code("", token);
        self.phone.on_precise_call_state_changed();
    }

    /// Merges the active and held calls.
    pub fn conference(&mut self) -> Result<(), CallStateError> {
        if self.family.is_gsm() {
            let token = self.begin_command(CommandPurpose::Conference);
            self.radio.conference(token);
        } else {
            self.flash_and_notify();
        }
        Ok(())
    }

    #[must_use]
    pub fn can_conference(&self) -> bool {
        let per_call = self.family.max_connections_per_call();
        self.calls.foreground.state(&self.conns) == CallState::Active
            && self.calls.background.state(&self.conns) == CallState::Holding
            && !self.calls.background.is_full(per_call)
            && !self.calls.foreground.is_full(per_call)
    }

    /// Connects the active and held parties to each other and drops out
    /// (GSM only).
    pub fn explicit_call_transfer(&mut self) -> Result<(), CallStateError> {
        if !self.family.is_gsm() {
            error!("explicit call transfer not possible on CDMA");
            return Ok(());
        }
        let token = self.begin_command(CommandPurpose::Transfer);
        self.radio.explicit_call_transfer(token);
        Ok(())
    }

    #[must_use]
    pub fn can_transfer(&self) -> bool {
        if !self.family.is_gsm() {
            return false;
        }
        let fg = self.calls.foreground.state(&self.conns);
        (fg == CallState::Active || fg == CallState::Alerting || fg == CallState::Dialing)
            && self.calls.background.state(&self.conns) == CallState::Holding
    }

    /// Splits one leg out of a conference (GSM only).
    pub fn separate_connection(&mut self, id: ConnId) -> Result<(), CallStateError> {
        match self.conns.get(id).and_then(Connection::index) {
            Some(index) => {
                let token = self.begin_command(CommandPurpose::Separate);
                self.radio.separate_connection(index, token);
                Ok(())
            }
            None => {
                // The call may have hung up already.
                warn!("separate on absent connection");
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Hangup
    // ------------------------------------------------------------------

    /// Hangs up one leg.
    pub fn hangup_connection(&mut self, id: ConnId) -> Result<(), CallStateError> {
        if self.conns.get(id).is_none() {
            return Err(CallStateError::ForeignConnection);
        }
        if self.pending_mo == Some(id) {
            // The outgoing leg has no radio index yet; the hangup is
            // applied when the poll binds it.
            debug!("hangup: set hangup_pending_mo");
            self.hangup_pending_mo = true;
        } else if self.family.is_cdma()
            && self.conns.get(id).and_then(Connection::role) == Some(CallRole::Ringing)
            && self.calls.ringing.state(&self.conns) == CallState::Waiting
        {
            // CDMA call-waiting hangup: drop locally, no network round
            // trip. The ringing slot empties on the disconnect sweep.
            if let Some(conn) = self.conns.get_mut(id) {
                if conn.on_local_disconnect() {
                    self.phone
                        .on_connection_disconnected(id, crate::call::DisconnectCause::Local);
                }
            }
            self.update_phone_state();
            self.phone.on_precise_call_state_changed();
            return Ok(());
        } else {
            match self.conns.get(id).and_then(Connection::index) {
                Some(index) => {
                    let token = self.begin_command(CommandPurpose::Operation);
                    self.radio.hangup_connection(index, token);
                }
                // The call may have hung up already.
                None => warn!("hangup on absent connection"),
            }
        }
        if let Some(conn) = self.conns.get_mut(id) {
            conn.on_hangup_local();
        }
        Ok(())
    }

    /// Hangs up an entire call role.
    pub fn hangup_call(&mut self, role: CallRole) -> Result<(), CallStateError> {
        if self.calls.get(role).connection_count() == 0 {
            return Err(CallStateError::EmptyCall);
        }
        match role {
            CallRole::Ringing => {
                debug!("(ringing) hangup waiting or background");
                let token = self.begin_command(CommandPurpose::Operation);
                self.radio.hangup_waiting_or_background(token);
            }
            CallRole::Foreground => {
                if self.calls.foreground.is_dialing_or_alerting(&self.conns) {
                    debug!("(foreground) hangup dialing or alerting");
                    if let Some(first) = self.calls.foreground.connections().first().copied() {
                        self.hangup_connection(first)?;
                    }
                } else if self.family.is_gsm() && self.calls.ringing.is_ringing(&self.conns) {
                    // Do not auto-answer a ringing call on hangup; end the
                    // active legs individually.
                    debug!("hangup all conns in active call without affecting ringing");
                    self.hangup_all_connections(CallRole::Foreground);
                } else {
                    self.hangup_foreground_resume_background();
                }
            }
            CallRole::Background => {
                if self.calls.ringing.is_ringing(&self.conns) {
                    debug!("hangup all conns in background call");
                    self.hangup_all_connections(CallRole::Background);
                } else {
                    self.hangup_waiting_or_background();
                }
            }
        }
        self.calls.get(role).on_hangup_local(&mut self.conns);
        self.phone.on_precise_call_state_changed();
        Ok(())
    }

    pub fn hangup_waiting_or_background(&mut self) {
        debug!("hangup waiting or background");
        let token = self.begin_command(CommandPurpose::Operation);
        self.radio.hangup_waiting_or_background(token);
    }

    pub fn hangup_foreground_resume_background(&mut self) {
        debug!("hangup foreground resume background");
        let token = self.begin_command(CommandPurpose::Operation);
        self.radio.hangup_foreground_resume_background(token);
    }

    /// Hangs up every live leg of a call individually.
    pub fn hangup_all_connections(&mut self, role: CallRole) {
        let targets: Vec<u8> = self
            .calls
            .get(role)
            .connections()
            .iter()
            .filter_map(|id| self.conns.get(*id))
            .filter(|c| !c.is_disconnected())
            .filter_map(Connection::index)
            .collect();
        for index in targets {
            let token = self.begin_command(CommandPurpose::Operation);
            self.radio.hangup_connection(index, token);
        }
    }

    /// Hangs up the member of `role` bound to the given radio index.
    pub fn hangup_connection_by_index(
        &mut self,
        role: CallRole,
        index: u8,
    ) -> Result<(), CallStateError> {
        let target = self
            .calls
            .get(role)
            .connections()
            .iter()
            .filter_map(|id| self.conns.get(*id))
            .find(|c| !c.is_disconnected() && c.index() == Some(index))
            .map(Connection::id);
        match target {
            Some(_) => {
                let token = self.begin_command(CommandPurpose::Operation);
                self.radio.hangup_connection(index, token);
                Ok(())
            }
            None => Err(CallStateError::IndexNotFound),
        }
    }

    /// Live member of `role` bound to the given radio index.
    #[must_use]
    pub fn connection_by_index(&self, role: CallRole, index: u8) -> Option<ConnId> {
        self.calls
            .get(role)
            .connections()
            .iter()
            .filter_map(|id| self.conns.get(*id))
            .find(|c| !c.is_disconnected() && c.index() == Some(index))
            .map(Connection::id)
    }

    // ------------------------------------------------------------------
    // CDMA emergency bookkeeping
    // ------------------------------------------------------------------

    fn disable_data_in_emergency_call(&mut self, dial_string: &str) {
        if self.phone.emergency_number_info(dial_string).is_some() {
            debug!("disabling data for emergency call");
            self.set_is_in_emergency_call();
        }
    }

    /// Marks the emergency-call state and suspends data.
    pub fn set_is_in_emergency_call(&mut self) {
        self.in_emergency_call = true;
        self.phone.set_internal_data_enabled(false);
        self.phone.on_emergency_call_state_changed(true);
    }

    /// Clears the emergency-call state and re-enables data once outside
    /// emergency callback mode.
    pub(crate) fn check_and_enable_data_after_emergency_drop(&mut self) {
        if self.in_emergency_call {
            self.in_emergency_call = false;
            let in_ecm = self.phone.is_in_ecm();
            debug!(in_ecm, "emergency call dropped");
            if !in_ecm {
                self.phone.set_internal_data_enabled(true);
            }
            self.phone.on_emergency_call_state_changed(false);
        }
    }

    // ------------------------------------------------------------------
    // CDMA three-way / ECM completions
    // ------------------------------------------------------------------

    pub(crate) fn handle_blank_flash_result(&mut self, ok: bool) {
        if ok {
            let delay = self.phone.cdma_three_way_flash_delay();
            self.timers.schedule(
                TIMER_THREE_WAY_FLASH,
                delay,
                TrackerMsg::Event(TrackerEvent::ThreeWayFlashDue),
            );
        } else {
            warn!("blank flash for three-way call failed");
            self.pending_mo = None;
        }
    }

    pub(crate) fn handle_three_way_flash_due(&mut self) {
        if let Some(id) = self.pending_mo {
            let address = self
                .conns
                .get(id)
                .map(|c| c.address().to_string())
                .unwrap_or_default();
            let token = self.begin_command(CommandPurpose::L2Flash);
            self.radio.send_cdma_feature_code(&address, token);
        }
    }

    pub(crate) fn handle_l2_flash_result(&mut self, ok: bool) {
        if !ok {
            return;
        }
        // Assume the three-way leg is connected.
        if let Some(id) = self.pending_mo.take() {
            let connected = self
                .conns
                .get_mut(id)
                .map(|conn| {
                    conn.set_state(CallState::Active);
                    conn.on_connected_in_or_out()
                })
                .unwrap_or(false);
            if connected {
                self.start_post_dial(id);
            }
        }
    }

    pub(crate) fn handle_ecm_exit_response(&mut self) {
        // Whatever the outcome, the deferred dial proceeds.
        if self.pending_call_in_ecm {
            if let Some(id) = self.pending_mo {
                let clir = self.pending_call_clir;
                self.issue_pending_dial(id, clir);
            }
            self.pending_call_in_ecm = false;
        }
    }

    // ------------------------------------------------------------------
    // CDMA call waiting
    // ------------------------------------------------------------------

    pub(crate) fn handle_call_waiting(&mut self, info: &CdmaCallWaitingInfo) {
        let id = self.conns.insert(|id| Connection::waiting(id, &info.number));
        self.attach_to_role(id, CallRole::Ringing);
        self.update_phone_state();
        self.phone.on_call_waiting(info);
    }

    // ------------------------------------------------------------------
    // SRVCC handover staging
    // ------------------------------------------------------------------

    /// Registers a leg handed over from another radio technology. The leg
    /// is bound to a driver entry when the next poll observes it; legs
    /// that never match are forcibly disconnected at the end of the
    /// cycle.
    pub fn stage_handover_connection(
        &mut self,
        address: &str,
        direction: Direction,
        pre_state: CallState,
        connected: bool,
    ) -> ConnId {
        let id = self.conns.insert(|id| Connection::outgoing(id, address));
        if let Some(conn) = self.conns.get_mut(id) {
            conn.set_direction(direction);
            conn.set_state(pre_state);
            if connected {
                conn.on_connected_in_or_out();
            }
            conn.mark_pre_handover();
        }
        self.handover_connections.push(id);
        id
    }

    /// Whether a local hangup is queued against the pending outgoing leg.
    #[must_use]
    pub fn is_hangup_pending_mo(&self) -> bool {
        self.hangup_pending_mo
    }

    /// Whether a dial is deferred until the device leaves ECM.
    #[must_use]
    pub fn is_pending_call_in_ecm(&self) -> bool {
        self.pending_call_in_ecm
    }
}
