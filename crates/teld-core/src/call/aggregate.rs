//! The call aggregate: one of the three singleton role slots.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::connection::{ConnId, ConnTable};
use super::state::CallState;
use crate::radio::DriverCallState;

/// The three well-known call roles.
///
/// Each role is a singleton slot reused across call sessions; slots are
/// emptied and repopulated, never destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallRole {
    /// Incoming / waiting call.
    Ringing,
    /// The call the user is interacting with.
    Foreground,
    /// Held call.
    Background,
}

impl CallRole {
    /// Role a leg belongs in, given its driver-reported state.
    #[must_use]
    pub const fn for_driver_state(state: DriverCallState) -> Self {
        match state {
            DriverCallState::Active | DriverCallState::Dialing | DriverCallState::Alerting => {
                Self::Foreground
            }
            DriverCallState::Holding => Self::Background,
            DriverCallState::Incoming | DriverCallState::Waiting => Self::Ringing,
        }
    }
}

impl fmt::Display for CallRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ringing => write!(f, "ringing"),
            Self::Foreground => write!(f, "foreground"),
            Self::Background => write!(f, "background"),
        }
    }
}

/// An aggregate of connections occupying one call role.
///
/// State is derived from the member legs: an empty call is IDLE, a call
/// whose members are all disconnected is DISCONNECTED, and otherwise the
/// most recently attached alive leg determines the state.
#[derive(Debug)]
pub struct Call {
    role: CallRole,
    members: Vec<ConnId>,
}

impl Call {
    #[must_use]
    pub fn new(role: CallRole) -> Self {
        Self {
            role,
            members: Vec::new(),
        }
    }

    #[must_use]
    pub fn role(&self) -> CallRole {
        self.role
    }

    /// Member legs in attach order.
    #[must_use]
    pub fn connections(&self) -> &[ConnId] {
        &self.members
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn has_connections(&self) -> bool {
        !self.members.is_empty()
    }

    /// Most recently attached member.
    #[must_use]
    pub fn latest_connection(&self) -> Option<ConnId> {
        self.members.last().copied()
    }

    /// Derived call state.
    #[must_use]
    pub fn state(&self, conns: &ConnTable) -> CallState {
        if self.members.is_empty() {
            return CallState::Idle;
        }
        let latest_alive = self
            .members
            .iter()
            .rev()
            .filter_map(|id| conns.get(*id))
            .find(|c| c.state().is_alive());
        match latest_alive {
            Some(conn) => conn.state(),
            None => CallState::Disconnected,
        }
    }

    #[must_use]
    pub fn is_idle(&self, conns: &ConnTable) -> bool {
        !self.state(conns).is_alive()
    }

    #[must_use]
    pub fn is_ringing(&self, conns: &ConnTable) -> bool {
        self.state(conns).is_ringing()
    }

    #[must_use]
    pub fn is_dialing_or_alerting(&self, conns: &ConnTable) -> bool {
        self.state(conns).is_dialing()
    }

    /// Whether the membership cap for the given limit is reached.
    #[must_use]
    pub fn is_full(&self, max_connections_per_call: usize) -> bool {
        self.members.len() >= max_connections_per_call
    }

    /// Attaches a leg to this call and records the role on the leg.
    pub fn attach(&mut self, id: ConnId, conns: &mut ConnTable) {
        if !self.members.contains(&id) {
            self.members.push(id);
        }
        if let Some(conn) = conns.get_mut(id) {
            conn.set_role(Some(self.role));
        }
    }

    /// Detaches a leg; the leg's role is cleared.
    pub fn detach(&mut self, id: ConnId, conns: &mut ConnTable) {
        self.members.retain(|m| *m != id);
        if let Some(conn) = conns.get_mut(id) {
            conn.set_role(None);
        }
    }

    /// Removes every fully-disconnected member, returning the detached
    /// ids.
    pub fn clear_disconnected(&mut self, conns: &mut ConnTable) -> Vec<ConnId> {
        let (gone, kept): (Vec<ConnId>, Vec<ConnId>) = self
            .members
            .iter()
            .copied()
            .partition(|id| conns.get(*id).is_none_or(|c| c.is_disconnected()));
        self.members = kept;
        for id in &gone {
            if let Some(conn) = conns.get_mut(*id) {
                conn.set_role(None);
            }
        }
        gone
    }

    /// Records a local hangup request against every live member.
    pub fn on_hangup_local(&self, conns: &mut ConnTable) {
        for id in &self.members {
            if let Some(conn) = conns.get_mut(*id) {
                conn.on_hangup_local();
            }
        }
    }
}
