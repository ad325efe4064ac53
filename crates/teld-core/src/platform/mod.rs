//! Collaborator seams: package/identity, SIM, carrier-config, and the
//! notification sinks.
//!
//! The core never reaches for ambient global services; every collaborator
//! is a trait object injected at construction. Gateway queries may block
//! the calling actor thread (they are cross-process in a real system);
//! notification sinks must be cheap and non-reentrant.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::call::{CdmaCallWaitingInfo, ConnId, DisconnectCause, EmergencyNumberInfo, PhoneState};
use crate::privilege::rules::AccessRule;

/// Kernel user id of an installed package.
pub type Uid = u32;

/// Physical SIM slot index.
pub type SlotIndex = u32;

/// Subscription id; carrier config broadcasts carry `None` when the SIM
/// was removed.
pub type SubscriptionId = i32;

/// Signing information for one installed package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSigningInfo {
    pub name: String,
    /// DER-encoded signing certificates (current + rotation history).
    pub certificates: Vec<Vec<u8>>,
}

/// Package/identity gateway (platform package manager).
pub trait PackageGateway: Send + Sync {
    /// Enumerates installed packages with signing certificates, including
    /// disabled-until-used components.
    fn installed_packages(&self) -> Vec<PackageSigningInfo>;

    /// Signing info for one package, if installed.
    fn package_signing_info(&self, package: &str) -> Option<PackageSigningInfo>;

    /// UIDs assigned to the package across all users.
    fn uids_for_package(&self, package: &str) -> BTreeSet<Uid>;

    /// UID for the package in the primary user.
    fn uid_for_package(&self, package: &str) -> Option<Uid>;

    /// Package names of components resolving the given intent action.
    fn packages_for_intent(&self, intent_action: &str) -> Vec<String>;

    /// Package names declaring the carrier-service interface.
    fn carrier_service_candidates(&self) -> Vec<String>;
}

/// UICC (SIM) gateway.
pub trait SimGateway: Send + Sync {
    /// Whether a card is present in the slot.
    fn has_sim(&self) -> bool;

    /// Carrier-privilege access rules loaded from the card. Empty when
    /// the card or its profile is unavailable.
    fn carrier_privilege_rules(&self) -> Vec<AccessRule>;
}

/// Key of the carrier-config entry holding encoded access-rule
/// certificates.
pub const KEY_CARRIER_CERTIFICATE_STRING_ARRAY: &str = "carrier_certificate_string_array";

/// A carrier configuration bundle for one subscription.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigBundle {
    /// Whether this bundle was built for an identified carrier (as
    /// opposed to platform defaults).
    identified_carrier: bool,
    values: serde_json::Map<String, Value>,
}

impl ConfigBundle {
    #[must_use]
    pub fn new(identified_carrier: bool, values: serde_json::Map<String, Value>) -> Self {
        Self {
            identified_carrier,
            values,
        }
    }

    /// Default configs are not trusted for privilege rules.
    #[must_use]
    pub fn is_for_identified_carrier(&self) -> bool {
        self.identified_carrier
    }

    /// Reads a string-array value, ignoring entries of other types.
    #[must_use]
    pub fn string_array(&self, key: &str) -> Option<Vec<String>> {
        let Value::Array(items) = self.values.get(key)? else {
            return None;
        };
        Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        )
    }
}

/// Carrier configuration gateway.
pub trait ConfigGateway: Send + Sync {
    /// Fetches the active configuration bundle for a subscription.
    fn config_for_subscription(&self, sub_id: SubscriptionId) -> Option<ConfigBundle>;
}

/// Supplementary service whose network request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppService {
    Switch,
    Conference,
    Separate,
    Transfer,
    Unknown,
}

/// Emergency-callback-mode timer directives issued by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcmTimerAction {
    Cancel,
    Restart,
}

/// Phone-side notification sink and environment queries.
///
/// Notifications are emitted synchronously from the tracker's actor
/// thread, in the documented order, before the next event is consumed.
pub trait PhoneAdapter: Send + Sync {
    // ---- environment queries -------------------------------------------

    /// Calling disabled by device policy.
    fn calling_disabled(&self) -> bool {
        false
    }

    /// Emergency-number classification for a dialed address.
    fn emergency_number_info(&self, _address: &str) -> Option<EmergencyNumberInfo> {
        None
    }

    /// Carrier-mandated dial-string substitution, if any.
    fn convert_number(&self, _address: &str) -> Option<String> {
        None
    }

    /// Device currently in emergency callback mode (CDMA).
    fn is_in_ecm(&self) -> bool {
        false
    }

    /// Configured delay between the blank and L2 flash of a CDMA
    /// three-way dial.
    fn cdma_three_way_flash_delay(&self) -> Duration {
        Duration::ZERO
    }

    // ---- notifications -------------------------------------------------

    fn on_phone_state_changed(&self, _state: PhoneState) {}
    fn on_precise_call_state_changed(&self) {}

    /// First (and only) disconnect signal for a leg, with its final
    /// cause. Delivered at most once per leg lifetime.
    fn on_connection_disconnected(&self, _id: ConnId, _cause: DisconnectCause) {}
    fn on_new_ringing_connection(&self, _id: ConnId) {}
    fn on_unknown_connection(&self, _id: ConnId) {}
    fn on_voice_call_started(&self) {}
    fn on_voice_call_ended(&self) {}
    fn on_call_waiting(&self, _info: &CdmaCallWaitingInfo) {}
    fn on_supp_service_failed(&self, _service: SuppService) {}
    fn on_handover_state_changed(&self, _id: ConnId) {}
    fn on_post_dial_wait(&self, _id: ConnId, _remaining: &str) {}
    fn on_post_dial_wild(&self, _id: ConnId, _remaining: &str) {}
    fn on_post_dial_char(&self, _id: ConnId, _c: char) {}

    // ---- emergency bookkeeping (CDMA) ----------------------------------

    fn on_emergency_call_state_changed(&self, _active: bool) {}
    fn set_internal_data_enabled(&self, _enabled: bool) {}
    fn handle_ecm_timer(&self, _action: EcmTimerAction) {}

    /// Ask the device to leave emergency callback mode; completion arrives
    /// as a tracker event.
    fn request_ecm_exit(&self) {}
}

/// Privilege-side notification sink.
///
/// Each notification is gated on structural change of its projection of
/// the snapshot, independently of the others.
pub trait PrivilegeObserver: Send + Sync {
    /// Legacy consumers track UIDs only.
    fn on_privileged_uids_changed(&self, _uids: &BTreeSet<Uid>) {}

    /// Privileged package-name or UID set changed.
    fn on_carrier_privileges_changed(&self, _packages: &BTreeSet<String>, _uids: &BTreeSet<Uid>) {}

    /// The carrier-service identity changed.
    fn on_carrier_service_changed(&self, _package: Option<&str>, _uid: Option<Uid>) {}
}
