//! Carrier-privilege evaluation.
//!
//! The tracker combines SIM-loaded, carrier-config-loaded, and
//! test-override access rules against the certificate digests of
//! installed packages, maintaining an immutable [`PrivilegedPackageInfo`]
//! snapshot. Every trigger (package churn, SIM state, carrier config,
//! test override) funnels through one serialized mailbox; readers on
//! arbitrary threads take the current snapshot through a reader/writer
//! lock where the writer only ever swaps the snapshot pointer.
//!
//! # Transient security state
//!
//! Between SIM READY and SIM LOADED the cached snapshot is unreliable:
//! every privilege query answers "rules not loaded" rather than
//! consulting stale data. The window closes when LOADED arrives, or when
//! the (by default zero, i.e. disabled) grace period expires.

pub mod rules;
mod snapshot;


use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::actor::{self, Actor, ActorHandle, ActorRef, TimerKey, Timers};
use crate::diag::{pii, LocalLog};
use crate::platform::{
    ConfigGateway, PackageGateway, PrivilegeObserver, SimGateway, SlotIndex, SubscriptionId, Uid,
    KEY_CARRIER_CERTIFICATE_STRING_ARRAY,
};

pub use rules::AccessRule;
pub use snapshot::PrivilegedPackageInfo;

/// Lines retained by the diagnostic log ring.
const LOCAL_LOG_CAPACITY: usize = 64;

pub(crate) const TIMER_CLEAR_UICC_RULES: TimerKey = "clear-uicc-rules";

/// Answer of a privilege query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeStatus {
    /// The package/UID holds carrier privileges.
    HasAccess,
    /// The package/UID holds no carrier privileges.
    NoAccess,
    /// Rules are not loaded; neither grant nor denial can be answered.
    RulesNotLoaded,
}

/// SIM card/application state transitions the tracker reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimState {
    Absent,
    NotReady,
    /// Card present and responsive, records not yet loaded.
    Ready,
    /// Records fully loaded; rules are authoritative again.
    Loaded,
}

/// Configuration of the privilege tracker.
#[derive(Debug, Clone)]
pub struct PrivilegeConfig {
    /// Grace period retaining SIM-loaded rules after the card goes away.
    ///
    /// Disabled (zero, immediate clearing) by default following a
    /// security review of inter-carrier SIM swaps; the mechanism stays
    /// pluggable for carriers that need a nonzero delay.
    pub clear_uicc_rules_delay: Duration,
}

impl Default for PrivilegeConfig {
    fn default() -> Self {
        Self {
            clear_uicc_rules_delay: Duration::ZERO,
        }
    }
}

/// Mailbox events of the privilege tracker.
pub enum PrivilegeEvent {
    /// Populate caches and compute the first snapshot.
    Initialize,
    /// Carrier config changed for a slot; `sub_id` is `None` when the SIM
    /// was removed.
    CarrierConfigChanged {
        slot: SlotIndex,
        sub_id: Option<SubscriptionId>,
    },
    /// SIM card/application state transition.
    SimStateChanged { slot: SlotIndex, state: SimState },
    /// The UICC profile finished loading its access rules.
    UiccAccessRulesLoaded,
    /// Grace-period timer fired: drop SIM-loaded rules.
    ClearUiccRules,
    /// A package was installed, replaced, or changed.
    PackageAddedReplacedOrChanged { package: String },
    /// A package was removed or disabled by the user.
    PackageRemovedOrDisabled { package: String },
    /// Test override; `None` clears, `Some("")` overrides to no rules.
    SetTestOverrideRules { rules: Option<String> },
    /// Legacy UID observer registration; immediately notified with the
    /// current UIDs.
    RegisterObserver { observer: Arc<dyn PrivilegeObserver> },
    /// Removes a previously registered observer.
    UnregisterObserver { observer: Arc<dyn PrivilegeObserver> },
}

impl fmt::Debug for PrivilegeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialize => write!(f, "Initialize"),
            Self::CarrierConfigChanged { slot, sub_id } => f
                .debug_struct("CarrierConfigChanged")
                .field("slot", slot)
                .field("sub_id", sub_id)
                .finish(),
            Self::SimStateChanged { slot, state } => f
                .debug_struct("SimStateChanged")
                .field("slot", slot)
                .field("state", state)
                .finish(),
            Self::UiccAccessRulesLoaded => write!(f, "UiccAccessRulesLoaded"),
            Self::ClearUiccRules => write!(f, "ClearUiccRules"),
            Self::PackageAddedReplacedOrChanged { package } => f
                .debug_struct("PackageAddedReplacedOrChanged")
                .field("package", &pii(package))
                .finish(),
            Self::PackageRemovedOrDisabled { package } => f
                .debug_struct("PackageRemovedOrDisabled")
                .field("package", &pii(package))
                .finish(),
            Self::SetTestOverrideRules { rules } => f
                .debug_struct("SetTestOverrideRules")
                .field("override_present", &rules.is_some())
                .finish(),
            Self::RegisterObserver { .. } => write!(f, "RegisterObserver"),
            Self::UnregisterObserver { .. } => write!(f, "UnregisterObserver"),
        }
    }
}

/// State visible to cross-thread readers.
struct ReadState {
    snapshot: Arc<PrivilegedPackageInfo>,
    /// SIM is READY but not yet LOADED; all queries answer
    /// [`PrivilegeStatus::RulesNotLoaded`].
    sim_ready_but_not_loaded: bool,
}

/// Thread-safe read handle over the current privilege snapshot.
///
/// Reads take the reader lock only long enough to grab the snapshot
/// reference; they never block on snapshot computation.
#[derive(Clone)]
pub struct CarrierPrivileges {
    shared: Arc<RwLock<ReadState>>,
    packages: Arc<dyn PackageGateway>,
}

impl CarrierPrivileges {
    /// Privilege status of a package.
    #[must_use]
    pub fn status_for_package(&self, package: &str) -> PrivilegeStatus {
        let guard = self.read();
        if guard.sim_ready_but_not_loaded {
            PrivilegeStatus::RulesNotLoaded
        } else if guard.snapshot.package_names.contains(package) {
            PrivilegeStatus::HasAccess
        } else {
            PrivilegeStatus::NoAccess
        }
    }

    /// Privilege status of a UID.
    #[must_use]
    pub fn status_for_uid(&self, uid: Uid) -> PrivilegeStatus {
        let guard = self.read();
        if guard.sim_ready_but_not_loaded {
            PrivilegeStatus::RulesNotLoaded
        } else if guard.snapshot.uids.contains(&uid) {
            PrivilegeStatus::HasAccess
        } else {
            PrivilegeStatus::NoAccess
        }
    }

    /// Currently privileged package names; empty while rules are not
    /// loaded.
    #[must_use]
    pub fn privileged_package_names(&self) -> BTreeSet<String> {
        let guard = self.read();
        if guard.sim_ready_but_not_loaded {
            BTreeSet::new()
        } else {
            guard.snapshot.package_names.clone()
        }
    }

    /// The privileged carrier-service package, if any.
    #[must_use]
    pub fn carrier_service_package(&self) -> Option<String> {
        let guard = self.read();
        if guard.sim_ready_but_not_loaded {
            return None;
        }
        guard.snapshot.carrier_service_package.clone()
    }

    /// UID of the carrier-service package, if resolvable.
    #[must_use]
    pub fn carrier_service_uid(&self) -> Option<Uid> {
        let guard = self.read();
        if guard.sim_ready_but_not_loaded {
            return None;
        }
        guard.snapshot.carrier_service_uid
    }

    /// Privileged packages among those resolving the given intent.
    #[must_use]
    pub fn carrier_package_names_for_intent(&self, intent_action: &str) -> Vec<String> {
        if self.read().sim_ready_but_not_loaded {
            return Vec::new();
        }
        // The package query is the slow cross-process part; run it off
        // the lock, then re-check the transient state, which may have
        // flipped meanwhile.
        let candidates = self.packages.packages_for_intent(intent_action);
        let guard = self.read();
        if guard.sim_ready_but_not_loaded {
            return Vec::new();
        }
        candidates
            .into_iter()
            .filter(|pkg| guard.snapshot.package_names.contains(pkg))
            .collect()
    }

    /// Reference to the current snapshot, regardless of the transient
    /// masking state.
    #[must_use]
    pub fn snapshot(&self) -> Arc<PrivilegedPackageInfo> {
        Arc::clone(&self.read().snapshot)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ReadState> {
        self.shared.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Which stored rule set an update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleSource {
    CarrierConfig,
    Uicc,
}

/// The privilege tracker actor state.
pub struct CarrierPrivilegesTracker {
    slot: SlotIndex,
    sub_id: Option<SubscriptionId>,

    packages_gw: Arc<dyn PackageGateway>,
    sim_gw: Arc<dyn SimGateway>,
    config_gw: Arc<dyn ConfigGateway>,
    observers: Vec<Arc<dyn PrivilegeObserver>>,
    timers: Box<dyn Timers<PrivilegeEvent>>,
    config: PrivilegeConfig,

    carrier_config_rules: Vec<AccessRule>,
    uicc_rules: Vec<AccessRule>,
    /// Tri-state: `None` = no override; `Some(empty)` = override to "no
    /// one is privileged"; `Some(rules)` = only these rules apply.
    test_override_rules: Option<Vec<AccessRule>>,

    /// Package name -> uppercase-hex certificate digests.
    installed_package_certs: BTreeMap<String, BTreeSet<String>>,
    /// Package name -> cached UIDs, invalidated on package churn.
    cached_uids: BTreeMap<String, BTreeSet<Uid>>,

    shared: Arc<RwLock<ReadState>>,
    clear_uicc_rules_scheduled: bool,

    local_log: LocalLog,
}

impl CarrierPrivilegesTracker {
    /// Creates the tracker actor state and its read handle.
    pub fn new(
        slot: SlotIndex,
        sub_id: Option<SubscriptionId>,
        packages_gw: Arc<dyn PackageGateway>,
        sim_gw: Arc<dyn SimGateway>,
        config_gw: Arc<dyn ConfigGateway>,
        observers: Vec<Arc<dyn PrivilegeObserver>>,
        timers: Box<dyn Timers<PrivilegeEvent>>,
        config: PrivilegeConfig,
    ) -> (Self, CarrierPrivileges) {
        let shared = Arc::new(RwLock::new(ReadState {
            snapshot: Arc::new(PrivilegedPackageInfo::default()),
            sim_ready_but_not_loaded: false,
        }));
        let reader = CarrierPrivileges {
            shared: Arc::clone(&shared),
            packages: Arc::clone(&packages_gw),
        };
        (
            Self {
                slot,
                sub_id,
                packages_gw,
                sim_gw,
                config_gw,
                observers,
                timers,
                config,
                carrier_config_rules: Vec::new(),
                uicc_rules: Vec::new(),
                test_override_rules: None,
                installed_package_certs: BTreeMap::new(),
                cached_uids: BTreeMap::new(),
                shared,
                clear_uicc_rules_scheduled: false,
                local_log: LocalLog::new(LOCAL_LOG_CAPACITY),
            },
            reader,
        )
    }

    /// Handles one mailbox event. Public so tests can drive the tracker
    /// synchronously without an actor thread.
    pub fn handle_event(&mut self, event: PrivilegeEvent) {
        match event {
            PrivilegeEvent::Initialize => self.handle_initialize(),
            PrivilegeEvent::CarrierConfigChanged { slot, sub_id } => {
                self.handle_carrier_config_changed(slot, sub_id);
            }
            PrivilegeEvent::SimStateChanged { slot, state } => {
                self.handle_sim_state_changed(slot, state);
            }
            PrivilegeEvent::UiccAccessRulesLoaded => self.handle_uicc_rules_loaded(),
            PrivilegeEvent::ClearUiccRules => self.handle_clear_uicc_rules(),
            PrivilegeEvent::PackageAddedReplacedOrChanged { package } => {
                self.handle_package_added_replaced_or_changed(&package);
            }
            PrivilegeEvent::PackageRemovedOrDisabled { package } => {
                self.handle_package_removed_or_disabled(&package);
            }
            PrivilegeEvent::SetTestOverrideRules { rules } => {
                self.handle_set_test_override_rules(rules.as_deref());
            }
            PrivilegeEvent::RegisterObserver { observer } => {
                self.handle_register_observer(observer);
            }
            PrivilegeEvent::UnregisterObserver { observer } => {
                self.observers.retain(|o| !Arc::ptr_eq(o, &observer));
            }
        }
    }

    fn handle_initialize(&mut self) {
        self.carrier_config_rules = self.fetch_carrier_config_rules(self.sub_id);
        self.uicc_rules = self.fetch_sim_rules();
        self.refresh_installed_package_cache();
        self.maybe_update_privileged_packages_and_notify();
        self.local_log.log(format!(
            "initialized: config rules={} SIM-loaded rules={}",
            self.carrier_config_rules.len(),
            self.uicc_rules.len()
        ));
    }

    fn handle_carrier_config_changed(
        &mut self,
        slot: SlotIndex,
        sub_id: Option<SubscriptionId>,
    ) {
        if slot != self.slot {
            return;
        }
        self.sub_id = sub_id;
        // A `None` subscription accompanies SIM removal; the previous
        // config certificates are cleared below.
        let updated = self.fetch_carrier_config_rules(sub_id);
        self.local_log.log(format!(
            "carrier config updated: sub={sub_id:?} rules={}",
            updated.len()
        ));
        self.update_rules(RuleSource::CarrierConfig, updated);
    }

    fn fetch_carrier_config_rules(&self, sub_id: Option<SubscriptionId>) -> Vec<AccessRule> {
        let Some(sub_id) = sub_id else {
            return Vec::new();
        };
        let Some(bundle) = self.config_gw.config_for_subscription(sub_id) else {
            return Vec::new();
        };
        if !bundle.is_for_identified_carrier() {
            return Vec::new();
        }
        let Some(encoded) = bundle.string_array(KEY_CARRIER_CERTIFICATE_STRING_ARRAY) else {
            return Vec::new();
        };
        AccessRule::decode_list(&encoded)
    }

    fn handle_sim_state_changed(&mut self, slot: SlotIndex, state: SimState) {
        if slot != self.slot {
            return;
        }
        {
            let mut guard = self
                .shared
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            guard.sim_ready_but_not_loaded = state == SimState::Ready;
        }

        if state == SimState::Loaded {
            self.local_log.log("SIM fully loaded");
            self.handle_uicc_rules_loaded();
        } else if !self.uicc_rules.is_empty() && !self.clear_uicc_rules_scheduled {
            self.clear_uicc_rules_scheduled = true;
            self.timers.schedule(
                TIMER_CLEAR_UICC_RULES,
                self.config.clear_uicc_rules_delay,
                PrivilegeEvent::ClearUiccRules,
            );
            self.local_log.log(format!(
                "SIM gone (state={state:?}); clearing UICC rules after {:?}",
                self.config.clear_uicc_rules_delay
            ));
        } else {
            self.local_log
                .log("ignoring SIM-gone event: no UICC rules or clear already scheduled");
        }
    }

    fn handle_uicc_rules_loaded(&mut self) {
        self.clear_uicc_rules_scheduled = false;
        self.timers.cancel(TIMER_CLEAR_UICC_RULES);
        let updated = self.fetch_sim_rules();
        self.local_log
            .log(format!("UICC access rules loaded: {}", updated.len()));
        self.update_rules(RuleSource::Uicc, updated);
    }

    fn handle_clear_uicc_rules(&mut self) {
        self.clear_uicc_rules_scheduled = false;
        self.timers.cancel(TIMER_CLEAR_UICC_RULES);
        self.local_log.log("clearing UICC rules");
        self.update_rules(RuleSource::Uicc, Vec::new());
    }

    fn fetch_sim_rules(&self) -> Vec<AccessRule> {
        if !self.sim_gw.has_sim() {
            return Vec::new();
        }
        self.sim_gw.carrier_privilege_rules()
    }

    fn handle_package_added_replaced_or_changed(&mut self, package: &str) {
        let Some(signing) = self.packages_gw.package_signing_info(package) else {
            error!(package = %pii(package), "no signing info for changed package");
            return;
        };
        self.update_certs_for_package(&signing);
        // The package may have been installed for an additional user,
        // which means an additional UID.
        self.uids_for_package(package, true);
        debug!(package = %pii(package), "package added/replaced/changed");
        self.maybe_update_privileged_packages_and_notify();
    }

    fn update_certs_for_package(&mut self, signing: &crate::platform::PackageSigningInfo) {
        let certs: BTreeSet<String> = signing
            .certificates
            .iter()
            .map(|der| rules::cert_hash_hex(der))
            .collect();
        self.installed_package_certs
            .insert(signing.name.clone(), certs);
    }

    fn handle_package_removed_or_disabled(&mut self, package: &str) {
        let certs = self.installed_package_certs.remove(package);
        let uids = self.cached_uids.remove(package);
        if certs.is_none() || uids.is_none() {
            error!(package = %pii(package), "unknown package removed or disabled");
            return;
        }
        debug!(package = %pii(package), "package removed or disabled");
        self.maybe_update_privileged_packages_and_notify();
    }

    fn handle_set_test_override_rules(&mut self, rules: Option<&str>) {
        self.test_override_rules = match rules {
            None => None,
            Some("") => Some(Vec::new()),
            Some(encoded) => {
                let parsed = AccessRule::decode_list(&[encoded.to_string()]);
                // Best effort: pick up packages installed since
                // initialization so the override can match them.
                self.refresh_installed_package_cache();
                Some(parsed)
            }
        };
        self.local_log.log(format!(
            "test override set: {:?}",
            self.test_override_rules.as_ref().map(Vec::len)
        ));
        self.maybe_update_privileged_packages_and_notify();
    }

    fn handle_register_observer(&mut self, observer: Arc<dyn PrivilegeObserver>) {
        let uids = self.snapshot_ref().uids.clone();
        observer.on_privileged_uids_changed(&uids);
        self.observers.push(observer);
    }

    fn refresh_installed_package_cache(&mut self) {
        for signing in self.packages_gw.installed_packages() {
            self.update_certs_for_package(&signing);
            self.uids_for_package(&signing.name.clone(), true);
        }
    }

    fn uids_for_package(&mut self, package: &str, invalidate_cache: bool) -> BTreeSet<Uid> {
        if invalidate_cache {
            self.cached_uids.remove(package);
        }
        if let Some(cached) = self.cached_uids.get(package) {
            return cached.clone();
        }
        let uids = self.packages_gw.uids_for_package(package);
        self.cached_uids.insert(package.to_string(), uids.clone());
        uids
    }

    fn update_rules(&mut self, source: RuleSource, updated: Vec<AccessRule>) {
        let current = match source {
            RuleSource::CarrierConfig => &mut self.carrier_config_rules,
            RuleSource::Uicc => &mut self.uicc_rules,
        };
        if *current == updated {
            return;
        }
        *current = updated;
        self.maybe_update_privileged_packages_and_notify();
    }

    /// Recomputes the snapshot; swaps and notifies only on structural
    /// change, with each of the three notifications gated independently.
    fn maybe_update_privileged_packages_and_notify(&mut self) {
        let current = self.compute_snapshot();

        let (packages_changed, uids_changed, carrier_service_changed) = {
            let previous = self.snapshot_ref();
            if *previous == current {
                return;
            }
            (
                previous.package_names != current.package_names,
                previous.uids != current.uids,
                previous.carrier_service_package != current.carrier_service_package
                    || previous.carrier_service_uid != current.carrier_service_uid,
            )
        };

        self.local_log
            .log(format!("privileged packages changed: {current}"));
        let current = Arc::new(current);
        {
            // Snapshot replacement is a single pointer swap; computation
            // never happens under the write lock.
            let mut guard = self
                .shared
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            guard.snapshot = Arc::clone(&current);
        }

        for observer in &self.observers {
            if uids_changed {
                observer.on_privileged_uids_changed(&current.uids);
            }
            if packages_changed || uids_changed {
                observer.on_carrier_privileges_changed(&current.package_names, &current.uids);
            }
            if carrier_service_changed {
                observer.on_carrier_service_changed(
                    current.carrier_service_package.as_deref(),
                    current.carrier_service_uid,
                );
            }
        }
    }

    fn compute_snapshot(&mut self) -> PrivilegedPackageInfo {
        let mut package_names = BTreeSet::new();
        let mut uids = BTreeSet::new();
        let entries: Vec<(String, BTreeSet<String>)> = self
            .installed_package_certs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (package, certs) in entries {
            if self.is_package_privileged(&package, &certs) {
                uids.extend(self.uids_for_package(&package, false));
                package_names.insert(package);
            }
        }
        let (carrier_service_package, carrier_service_uid) =
            self.find_carrier_service(&package_names);
        PrivilegedPackageInfo {
            package_names,
            uids,
            carrier_service_package,
            carrier_service_uid,
        }
    }

    /// Pure rule evaluation: override (when non-null) supersedes carrier
    /// config and SIM entirely; otherwise carrier config is consulted
    /// before SIM, first match wins.
    fn is_package_privileged(&self, package: &str, certs: &BTreeSet<String>) -> bool {
        for cert in certs {
            if let Some(override_rules) = &self.test_override_rules {
                if override_rules.iter().any(|r| r.matches(cert, package)) {
                    return true;
                }
            } else if self
                .carrier_config_rules
                .iter()
                .chain(self.uicc_rules.iter())
                .any(|r| r.matches(cert, package))
            {
                return true;
            }
        }
        false
    }

    fn find_carrier_service(
        &self,
        privileged: &BTreeSet<String>,
    ) -> (Option<String>, Option<Uid>) {
        for candidate in self.packages_gw.carrier_service_candidates() {
            if privileged.contains(&candidate) {
                let uid = self.packages_gw.uid_for_package(&candidate);
                if uid.is_none() {
                    warn!(package = %pii(&candidate), "no UID for carrier service package");
                }
                return (Some(candidate), uid);
            }
        }
        (None, None)
    }

    fn snapshot_ref(&self) -> Arc<PrivilegedPackageInfo> {
        Arc::clone(
            &self
                .shared
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .snapshot,
        )
    }

    /// Redacted diagnostic snapshot.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "CarrierPrivilegesTracker slot={} sub={:?}\n",
            self.slot, self.sub_id
        ));
        out.push_str(&format!(
            "  snapshot={}\n  simReadyButNotLoaded={}\n",
            self.snapshot_ref(),
            self.shared
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .sim_ready_but_not_loaded
        ));
        out.push_str(&format!(
            "  testOverride={:?} simRules={} configRules={} clearScheduled={}\n",
            self.test_override_rules.as_ref().map(Vec::len),
            self.uicc_rules.len(),
            self.carrier_config_rules.len(),
            self.clear_uicc_rules_scheduled
        ));
        self.local_log.dump_into(&mut out);
        out
    }
}

impl Actor for CarrierPrivilegesTracker {
    type Event = PrivilegeEvent;

    fn on_event(&mut self, event: PrivilegeEvent) {
        self.handle_event(event);
    }
}

/// Spawns a privilege tracker on its own actor thread.
///
/// Initialization runs as the first mailbox event; the returned read
/// handle is immediately usable (it observes the empty snapshot until
/// initialization completes).
pub fn spawn(
    slot: SlotIndex,
    sub_id: Option<SubscriptionId>,
    packages_gw: Arc<dyn PackageGateway>,
    sim_gw: Arc<dyn SimGateway>,
    config_gw: Arc<dyn ConfigGateway>,
    observers: Vec<Arc<dyn PrivilegeObserver>>,
    config: PrivilegeConfig,
) -> (CarrierPrivileges, ActorHandle<PrivilegeEvent>) {
    let mut reader_slot = None;
    let handle = actor::spawn(
        "carrier-privileges",
        |actor_ref: ActorRef<PrivilegeEvent>| {
            let (tracker, reader) = CarrierPrivilegesTracker::new(
                slot,
                sub_id,
                packages_gw,
                sim_gw,
                config_gw,
                observers,
                Box::new(actor_ref),
                config,
            );
            reader_slot = Some(reader);
            tracker
        },
    );
    handle.actor_ref().post(PrivilegeEvent::Initialize);
    let reader = reader_slot.expect("reader constructed with tracker");
    (reader, handle)
}
