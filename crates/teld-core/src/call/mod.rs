//! Call model: per-leg connections, aggregate calls, and the network
//! family strategy.
//!
//! A device exposes exactly three call roles at any time — ringing,
//! foreground, background — each a singleton slot reused across call
//! sessions. A [`Connection`] is one call leg, exclusively owned by one
//! call at a time; a [`Call`] aggregates 1..N legs and derives its state
//! from them.
//!
//! # State machine
//!
//! ```text
//! (pending dial) --> DIALING/ALERTING --> ACTIVE <--> HOLDING --> DISCONNECTED
//! (mobile terminated) --> INCOMING/WAITING --> ACTIVE ...
//! ```

mod aggregate;
mod cause;
mod connection;
mod family;
mod post_dial;
mod state;


pub use aggregate::{Call, CallRole};
pub use cause::DisconnectCause;
pub use connection::{
    add_capability, capability, has_capabilities, remove_capability, AudioCodecAttributes,
    CdmaCallWaitingInfo, ConnId, ConnTable, Connection, Direction, EmergencyNumberInfo,
};
pub use family::NetworkFamily;
pub use post_dial::{PostDialEvent, PostDialState, PAUSE_CHAR, WAIT_CHAR, WILD_CHAR};
pub use state::{CallState, PhoneState};
