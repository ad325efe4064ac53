//! Diagnostic support: bounded local log ring and PII redaction.
//!
//! Everything that leaves the process through a diagnostic dump goes
//! through [`pii`] first. Cause codes, package names, and dialed addresses
//! must never appear in clear text in externally-readable output.

use std::collections::VecDeque;

use sha2::{Digest, Sha256};

/// Number of hex characters of the digest kept in redacted output.
const PII_DIGEST_CHARS: usize = 8;

/// Redacts an identifying string for diagnostic output.
///
/// Produces a stable one-way token (`[a1b2c3d4]`) so that repeated dumps
/// can be correlated without revealing the underlying value. Empty input
/// redacts to `[]`.
#[must_use]
pub fn pii(value: &str) -> String {
    if value.is_empty() {
        return "[]".to_string();
    }
    let digest = Sha256::digest(value.as_bytes());
    let mut token = hex::encode(digest);
    token.truncate(PII_DIGEST_CHARS);
    format!("[{token}]")
}

/// A bounded in-memory log ring for diagnostic dumps.
///
/// Oldest entries are evicted once the capacity is reached. Callers are
/// responsible for redacting identifying data before logging; this type
/// stores lines verbatim.
#[derive(Debug)]
pub struct LocalLog {
    entries: VecDeque<String>,
    capacity: usize,
}

impl LocalLog {
    /// Creates a log ring holding at most `capacity` lines.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a line, evicting the oldest if the ring is full.
    pub fn log(&mut self, line: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(line.into());
    }

    /// Writes all retained lines into `out`, oldest first.
    pub fn dump_into(&self, out: &mut String) {
        for line in &self.entries {
            out.push_str(line);
            out.push('\n');
        }
    }

    /// Number of retained lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been logged yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
