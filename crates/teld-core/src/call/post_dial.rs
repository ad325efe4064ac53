//! Post-dial digit sequence machine.
//!
//! A dial string may carry a tail of extra characters played out after the
//! call connects: DTMF digits plus three control tokens. The sequence is
//! advanced one character at a time by the owning tracker; a WAIT or WILD
//! pause is resumed only by an explicit proceed call, never automatically.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pause token: hold for a fixed delay, then continue.
pub const PAUSE_CHAR: char = ',';
/// Wait token: hold until the user confirms.
pub const WAIT_CHAR: char = ';';
/// Wild token: hold until the user supplies replacement digits.
pub const WILD_CHAR: char = 'N';

/// Progress of post-dial playback for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostDialState {
    /// Playback not begun: not yet connected, no post-dial tail, or an
    /// incoming call.
    NotStarted,
    /// Playback has begun.
    Started,
    /// Paused at a WAIT token until `proceed_after_wait_char`.
    Wait,
    /// Paused at a WILD token until `proceed_after_wild_char`.
    Wild,
    /// Paused at a PAUSE token until the pause timer fires.
    Pause,
    /// All characters dispatched.
    Complete,
    /// Cancelled; no further characters will be dispatched.
    Cancelled,
}

impl fmt::Display for PostDialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Started => "STARTED",
            Self::Wait => "WAIT",
            Self::Wild => "WILD",
            Self::Pause => "PAUSE",
            Self::Complete => "COMPLETE",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{name}")
    }
}

/// Action produced by advancing the post-dial sequence one character.
///
/// The owning tracker turns these into side effects (DTMF send, pause
/// timer, WAIT notification).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostDialEvent {
    /// Nothing to do (cancelled, complete, or no tail).
    None,
    /// Send this DTMF character to the network.
    Dtmf(char),
    /// Hold for the standard pause delay, then advance again.
    Pause,
    /// Hold until the user confirms continuation.
    Wait,
    /// Hold until the user supplies replacement digits.
    Wild,
    /// The sequence just finished.
    Complete,
}
