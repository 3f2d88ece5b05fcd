use std::time::Duration;

use rbench_core::{default_backoff, ErrorKind, PipelineError};

pub mod worker;

pub use worker::*;

/// Classification of a failure to decide retry/backoff vs giving up.
/// This stays pure and testable; the worker applies it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    Crash,
    Flake,
    Deterministic,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp { reason: String },
}

pub fn classify(kind: ErrorKind) -> FailureClass {
    match kind {
        ErrorKind::BuildNotFound | ErrorKind::InvalidScript | ErrorKind::MalformedOutput => FailureClass::Deterministic,
        ErrorKind::DependencyResolution | ErrorKind::EnvironmentSetup => FailureClass::Flake,
        ErrorKind::ScriptExecution | ErrorKind::ScriptTimeout | ErrorKind::Storage => FailureClass::Crash,
    }
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts per job, the first one included.
    pub max_attempts: u32,
    /// Delay before the single quick retry a flake gets.
    pub quick_retry: Duration,
    pub backoff: fn(u32) -> Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            quick_retry: Duration::from_secs(5),
            backoff: default_backoff,
        }
    }
}

impl RetryPolicy {
    /// Retry up to `max_attempts` with no waiting in between.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            quick_retry: Duration::ZERO,
            backoff: |_| Duration::ZERO,
        }
    }

    /// Retry policy:
    /// - Crash: retry with backoff
    /// - Flake: retry once quickly, then backoff
    /// - Deterministic: give up
    pub fn decide(&self, err: &PipelineError, attempt_number: u32) -> RetryDecision {
        let kind = err.kind();
        if attempt_number >= self.max_attempts {
            return RetryDecision::GiveUp {
                reason: format!("{kind} after {attempt_number} attempt(s)"),
            };
        }
        match classify(kind) {
            FailureClass::Crash => RetryDecision::RetryAfter((self.backoff)(attempt_number)),
            FailureClass::Flake => {
                if attempt_number <= 1 {
                    RetryDecision::RetryAfter(self.quick_retry)
                } else {
                    RetryDecision::RetryAfter((self.backoff)(attempt_number))
                }
            }
            FailureClass::Deterministic => RetryDecision::GiveUp {
                reason: format!("{kind} (deterministic)"),
            },
        }
    }
}
