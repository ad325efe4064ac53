//! Immutable privilege snapshot.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diag::pii;
use crate::platform::Uid;

/// Package names and UIDs currently holding carrier privileges, plus the
/// carrier-service identity.
///
/// A snapshot is an immutable value: a freshly computed instance entirely
/// replaces the previous one under the writer lock, and readers only ever
/// observe a complete snapshot. Structural equality gates change
/// notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegedPackageInfo {
    /// Privileged package names.
    pub package_names: BTreeSet<String>,
    /// Privileged UIDs across all users.
    pub uids: BTreeSet<Uid>,
    /// The carrier-service package, if one is privileged.
    pub carrier_service_package: Option<String>,
    /// UID of the carrier-service package, when resolvable.
    pub carrier_service_uid: Option<Uid>,
}

impl fmt::Display for PrivilegedPackageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let packages: Vec<String> = self.package_names.iter().map(|p| pii(p)).collect();
        write!(
            f,
            "{{packages={packages:?} uids={:?} carrierService={}:{:?}}}",
            self.uids,
            self.carrier_service_package
                .as_deref()
                .map_or_else(|| "(none)".to_string(), pii),
            self.carrier_service_uid
        )
    }
}
