//! Abuse prevention policy: rolling-window counting and auto-block
//!
//! The policy runs synchronously inside the cancellation flow. There is no
//! background re-evaluation: a student's block flag changes only when a new
//! cancellation pushes them over the threshold or when staff act.
use crate::settings::CancelThreshold;
use crate::student::{Pid, Student};

/// Lookback for counting cancellations, a fixed rolling window rather than
/// a calendar day.
pub const CANCEL_WINDOW_HOURS: i64 = 24;

/// Snapshot of a student's standing, computed before any pending
/// cancellation is counted so the caller can warn ahead of the line.
#[derive(Debug, Clone)]
pub struct StudentStanding {
    pub pid: Pid,
    pub blocked: bool,
    pub block_reason: String,
    pub recent_cancellations: usize,
    pub threshold: CancelThreshold,
}

impl StudentStanding {
    /// Standing for a possibly-absent ledger record; a student with no
    /// record yet is unblocked with an empty history.
    pub fn evaluate(pid: Pid, student: Option<&Student>, threshold: CancelThreshold) -> Self {
        match student {
            Some(s) => Self {
                pid,
                blocked: s.blocked,
                block_reason: s.block_reason.clone(),
                recent_cancellations: s.recent_cancellations(CANCEL_WINDOW_HOURS),
                threshold,
            },
            None => Self {
                pid,
                blocked: false,
                block_reason: String::new(),
                recent_cancellations: 0,
                threshold,
            },
        }
    }

    /// Advisory only: true when one more cancellation would trip the
    /// auto-block. Never causes a state change itself.
    pub fn at_risk(&self) -> bool {
        !self.blocked && self.recent_cancellations + 1 >= self.threshold.get() as usize
    }
}

/// The auto-block trigger: fires exactly at the threshold, never earlier.
pub fn should_block(recent: usize, threshold: CancelThreshold) -> bool {
    recent >= threshold.get() as usize
}

pub fn auto_block_reason(recent: usize) -> String {
    format!(
        "Auto-blocked due to {recent} cancellations in last {CANCEL_WINDOW_HOURS}h"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::TimeStamp;

    #[test]
    fn block_fires_exactly_at_threshold() {
        let threshold = CancelThreshold::new(3);
        assert!(!should_block(2, threshold));
        assert!(should_block(3, threshold));
        assert!(should_block(4, threshold));
    }

    #[test]
    fn standing_for_missing_student_is_clean() {
        let pid = Pid::new("S99").unwrap();
        let standing = StudentStanding::evaluate(pid, None, CancelThreshold::default());
        assert!(!standing.blocked);
        assert_eq!(standing.recent_cancellations, 0);
        assert!(!standing.at_risk());
    }

    #[test]
    fn at_risk_flags_the_last_safe_cancellation() {
        let pid = Pid::new("S42").unwrap();
        let mut student = Student::new(pid.clone());
        student.cancellations.push(TimeStamp::new());
        student.cancellations.push(TimeStamp::new());

        let standing =
            StudentStanding::evaluate(pid, Some(&student), CancelThreshold::new(3));
        assert_eq!(standing.recent_cancellations, 2);
        assert!(standing.at_risk());
    }

    #[test]
    fn reason_cites_count_and_window() {
        let reason = auto_block_reason(3);
        assert_eq!(reason, "Auto-blocked due to 3 cancellations in last 24h");
    }
}
