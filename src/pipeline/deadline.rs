//! Two-tier per-task time budget.
//!
//! The soft limit lets a task finalize partial results (expensive
//! detectors stop being consulted); the hard limit, checked at stage
//! boundaries, converts the task into a per-file failure.

use crate::error::CoreError;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    soft: Duration,
    hard: Duration,
}

impl Deadline {
    pub fn start(soft: Duration, hard: Duration) -> Self {
        Self {
            started: Instant::now(),
            soft,
            hard,
        }
    }

    pub fn soft_exceeded(&self) -> bool {
        self.started.elapsed() >= self.soft
    }

    pub fn check_hard(&self, path: &str) -> Result<(), CoreError> {
        if self.started.elapsed() >= self.hard {
            return Err(CoreError::DeadlineExceeded {
                path: path.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_deadline_passes_both_checks() {
        let deadline = Deadline::start(Duration::from_secs(5), Duration::from_secs(10));
        assert!(!deadline.soft_exceeded());
        assert!(deadline.check_hard("a.py").is_ok());
    }

    #[test]
    fn elapsed_soft_limit_does_not_trip_hard() {
        let deadline = Deadline::start(Duration::from_millis(0), Duration::from_secs(10));
        assert!(deadline.soft_exceeded());
        assert!(deadline.check_hard("a.py").is_ok());
    }

    #[test]
    fn elapsed_hard_limit_is_an_error() {
        let deadline = Deadline::start(Duration::from_millis(0), Duration::from_millis(0));
        let err = deadline.check_hard("app/slow.py").unwrap_err();
        assert!(matches!(err, CoreError::DeadlineExceeded { .. }));
        assert!(err.to_string().contains("app/slow.py"));
    }
}
