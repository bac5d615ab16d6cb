//! Debugger session configuration
//!
//! This module provides the knobs that change how the stepper and the exception filter
//! behave. Nothing here is read from disk; the embedding front end builds the options and
//! hands them to [`crate::debugger::DebuggerSession::new`].

use std::time::Duration;

/// When an evaluation abort escalates.
///
/// Abort requests are counted per evaluation, starting at 1. Requests below `rude_after` are
/// cooperative, later ones rude. The request numbered `last_resort_after` first stops the
/// process, resumes all threads and continues, then aborts rudely; if the evaluation still
/// does not finish, the caller gets a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortEscalation {
    /// First abort request that is rude (default: 10)
    pub rude_after: u32,
    /// Abort request that resumes all threads before aborting (default: 20)
    pub last_resort_after: u32,
    /// Time to wait for the evaluation to finish after each request (default: 100 ms)
    pub retry_interval: Duration,
}

impl Default for AbortEscalation {
    fn default() -> Self {
        Self {
            rude_after: 10,
            last_resort_after: 20,
            retry_interval: Duration::from_millis(100),
        }
    }
}

/// Configuration of a debugger session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Only project code is debugged (default: true)
    /// Adds `DebuggerNonUserCode` to the step-through set and limits first-chance exception
    /// stops to user first-chance notifications
    pub project_assemblies_only: bool,

    /// Step over property getters/setters and operators (default: true)
    pub step_over_properties_and_operators: bool,

    /// How long a function evaluation may run before it is aborted (default: 1000 ms)
    pub evaluation_timeout: Duration,

    /// Abort escalation schedule
    pub abort_escalation: AbortEscalation,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            project_assemblies_only: true,
            step_over_properties_and_operators: true,
            evaluation_timeout: Duration::from_millis(1000),
            abort_escalation: AbortEscalation::default(),
        }
    }
}

impl SessionOptions {
    /// Debug only project code and never stop inside accessors or operators
    #[must_use]
    pub fn strict() -> Self {
        Self::default()
    }

    /// Every method is steppable and every first-chance exception is reported
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            project_assemblies_only: false,
            step_over_properties_and_operators: false,
            ..Self::default()
        }
    }

    /// Set [`SessionOptions::project_assemblies_only`]
    #[must_use]
    pub fn with_project_assemblies_only(mut self, enabled: bool) -> Self {
        self.project_assemblies_only = enabled;
        self
    }

    /// Set [`SessionOptions::step_over_properties_and_operators`]
    #[must_use]
    pub fn with_step_over_properties_and_operators(mut self, enabled: bool) -> Self {
        self.step_over_properties_and_operators = enabled;
        self
    }

    /// Set [`SessionOptions::evaluation_timeout`]
    #[must_use]
    pub fn with_evaluation_timeout(mut self, timeout: Duration) -> Self {
        self.evaluation_timeout = timeout;
        self
    }

    /// Set [`SessionOptions::abort_escalation`]
    #[must_use]
    pub fn with_abort_escalation(mut self, escalation: AbortEscalation) -> Self {
        self.abort_escalation = escalation;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_option_presets() {
        let strict = SessionOptions::strict();
        assert!(strict.project_assemblies_only);
        assert!(strict.step_over_properties_and_operators);
        assert_eq!(strict, SessionOptions::default());

        let permissive = SessionOptions::permissive();
        assert!(!permissive.project_assemblies_only);
        assert!(!permissive.step_over_properties_and_operators);
        assert_eq!(permissive.evaluation_timeout, Duration::from_millis(1000));
        assert_eq!(permissive.abort_escalation.rude_after, 10);
        assert_eq!(permissive.abort_escalation.last_resort_after, 20);
    }

    #[test]
    fn test_builders() {
        let options = SessionOptions::default()
            .with_project_assemblies_only(false)
            .with_evaluation_timeout(Duration::from_millis(50));
        assert!(!options.project_assemblies_only);
        assert!(options.step_over_properties_and_operators);
        assert_eq!(options.evaluation_timeout, Duration::from_millis(50));
    }
}
