//! Student identity ledger: block status and cancellation history
use crate::error::{Error, Result};
use crate::order::TimeStamp;
use chrono::Utc;
use std::fmt;

/// Normalized student identifier: trimmed and uppercased on construction so
/// every lookup joins on the same key.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Hash)]
#[cbor(transparent)]
pub struct Pid(#[n(0)] String);

impl Pid {
    pub fn new(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_uppercase();
        if normalized.len() < 3 {
            return Err(Error::InvalidInput(
                "PID must be at least 3 characters".into(),
            ));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Student {
    #[n(0)]
    pub pid: Pid,
    #[n(1)]
    pub blocked: bool,
    #[n(2)]
    pub block_reason: String,
    /// Append-only, one entry per student-initiated cancellation. The core
    /// never prunes this; the window filter happens at query time.
    #[n(3)]
    pub cancellations: Vec<TimeStamp<Utc>>,
    #[n(4)]
    pub created_at: TimeStamp<Utc>,
    #[n(5)]
    pub updated_at: TimeStamp<Utc>,
}

impl Student {
    pub fn new(pid: Pid) -> Self {
        let now = TimeStamp::new();
        Self {
            pid,
            blocked: false,
            block_reason: String::new(),
            cancellations: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Cancellations strictly newer than `now - window_hours`. Entries that
    /// have aged past the boundary stay in the ledger but stop counting.
    pub fn recent_cancellations(&self, window_hours: i64) -> usize {
        let cutoff = TimeStamp::hours_ago(window_hours);
        self.cancellations.iter().filter(|ts| **ts > cutoff).count()
    }
}

/// Merge-style partial update for a student document.
#[derive(Debug, Clone, Default)]
pub struct StudentPatch {
    pub blocked: Option<bool>,
    pub block_reason: Option<String>,
    pub cancellations: Option<Vec<TimeStamp<Utc>>>,
}

impl StudentPatch {
    pub fn apply(self, student: &mut Student) {
        if let Some(blocked) = self.blocked {
            student.blocked = blocked;
        }
        if let Some(reason) = self.block_reason {
            student.block_reason = reason;
        }
        if let Some(cancellations) = self.cancellations {
            student.cancellations = cancellations;
        }
    }
}
