//! Function evaluation bookkeeping.
//!
//! While an evaluation runs, the debuggee is resumed with every other thread suspended and
//! the session ignores stray stop events. [`EvaluationTracker`] owns the "evaluating" flag,
//! wakes threads waiting for the debuggee to stop again, and bounds each evaluation with a
//! timeout followed by an escalating abort.

use std::{collections::HashMap, sync::Arc, time::Duration};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::{
    debugger::{
        native::{EvalHandle, NativeDebugControl, NativeError, NativeResult, ThreadId, ThreadState},
        options::AbortEscalation,
    },
    Error, Result,
};

/// Evaluates expressions in the debuggee for conditions and trace templates.
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate `expression` in the innermost frame of `thread` and format the value.
    ///
    /// # Errors
    /// Any evaluation failure; the session reports its message to the user.
    fn evaluate(&self, thread: ThreadId, expression: &str) -> Result<String>;
}

/// How an evaluation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationOutcome {
    /// The evaluation
    pub eval: EvalHandle,
    /// The evaluated code threw
    pub threw: bool,
}

#[derive(Debug, Default)]
struct TrackerState {
    evaluating: bool,
    pending: HashMap<EvalHandle, Sender<Option<EvaluationOutcome>>>,
}

/// Tracks running evaluations.
pub struct EvaluationTracker {
    native: Arc<dyn NativeDebugControl>,
    escalation: AbortEscalation,
    state: Mutex<TrackerState>,
    stopped: Condvar,
}

impl EvaluationTracker {
    /// A tracker issuing aborts through `native`.
    pub fn new(native: Arc<dyn NativeDebugControl>, escalation: AbortEscalation) -> Self {
        EvaluationTracker {
            native,
            escalation,
            state: Mutex::new(TrackerState::default()),
            stopped: Condvar::new(),
        }
    }

    /// Mark an evaluation as running.
    pub fn start(&self) {
        self.state.lock().evaluating = true;
    }

    /// Mark the running evaluation as finished and wake all waiters.
    pub fn end(&self) {
        let mut state = self.state.lock();
        state.evaluating = false;
        self.stopped.notify_all();
    }

    /// Returns true while an evaluation runs.
    pub fn is_evaluating(&self) -> bool {
        self.state.lock().evaluating
    }

    /// Block until no evaluation runs.
    pub fn wait_until_stopped(&self) {
        let mut state = self.state.lock();
        while state.evaluating {
            self.stopped.wait(&mut state);
        }
    }

    /// Block until no evaluation runs or `timeout` elapses; returns true if stopped.
    pub fn wait_until_stopped_for(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if state.evaluating {
            let _ = self
                .stopped
                .wait_while_for(&mut state, |state| state.evaluating, timeout);
        }
        !state.evaluating
    }

    /// Run one evaluation on `thread` and wait for it.
    ///
    /// `begin` sets up the native evaluation and returns its handle. The tracker then
    /// suspends every other thread, resumes the process and waits up to `timeout` for
    /// [`EvaluationTracker::complete`]. On timeout the evaluation is aborted with escalating
    /// force until it completes or the last-resort attempt was made.
    ///
    /// # Errors
    /// - [`Error::EvaluationNotAllowed`] if the thread is at a point where evaluation is illegal
    /// - [`Error::EvaluationCancelled`] if the process or the evaluation went away
    /// - [`Error::EvaluationTimeout`] if the evaluation had to be aborted
    /// - [`Error::Native`] for any other engine failure
    pub fn invoke<F>(&self, thread: ThreadId, timeout: Duration, begin: F) -> Result<EvaluationOutcome>
    where
        F: FnOnce() -> NativeResult<EvalHandle>,
    {
        let eval = begin().map_err(evaluation_error)?;
        let (sender, receiver) = bounded(1);
        {
            let mut state = self.state.lock();
            state.evaluating = true;
            state.pending.insert(eval, sender);
        }

        let resumed = self
            .native
            .set_all_threads_state(ThreadState::Suspend, Some(thread))
            .and_then(|()| self.native.continue_process());
        if let Err(err) = resumed {
            self.forget(eval);
            self.end();
            return Err(evaluation_error(err));
        }

        match receiver.recv_timeout(timeout) {
            Ok(Some(outcome)) => return Ok(outcome),
            Ok(None) | Err(RecvTimeoutError::Disconnected) => return Err(Error::EvaluationCancelled),
            Err(RecvTimeoutError::Timeout) => {
                debug!(eval, "evaluation timed out, aborting");
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            if let Err(err) = self.abort(eval, attempt) {
                self.forget(eval);
                self.end();
                return Err(if err.cancels_evaluation() {
                    Error::EvaluationCancelled
                } else {
                    Error::Native(err)
                });
            }

            match receiver.recv_timeout(self.escalation.retry_interval) {
                Ok(Some(_)) => return Err(Error::EvaluationTimeout),
                Ok(None) | Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::EvaluationCancelled)
                }
                Err(RecvTimeoutError::Timeout) if attempt >= self.escalation.last_resort_after => {
                    warn!(eval, attempt, "evaluation did not stop after aborting, giving up");
                    self.forget(eval);
                    self.end();
                    return Err(Error::EvaluationTimeout);
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    /// Deliver the completion of `eval`; returns true if an `invoke` was waiting for it.
    pub fn complete(&self, eval: EvalHandle, threw: bool) -> bool {
        let waiter = {
            let mut state = self.state.lock();
            let waiter = state.pending.remove(&eval);
            if waiter.is_some() {
                state.evaluating = false;
                self.stopped.notify_all();
            }
            waiter
        };

        match waiter {
            Some(sender) => {
                let _ = sender.send(Some(EvaluationOutcome { eval, threw }));
                true
            }
            None => false,
        }
    }

    /// Cancel every pending evaluation, as when the process exits.
    pub fn cancel_all(&self) {
        let pending: Vec<_> = {
            let mut state = self.state.lock();
            state.evaluating = false;
            self.stopped.notify_all();
            state.pending.drain().map(|(_, sender)| sender).collect()
        };
        for sender in pending {
            let _ = sender.send(None);
        }
    }

    fn forget(&self, eval: EvalHandle) {
        self.state.lock().pending.remove(&eval);
    }

    fn abort(&self, eval: EvalHandle, attempt: u32) -> NativeResult<()> {
        if attempt < self.escalation.rude_after {
            debug!(eval, attempt, "aborting evaluation");
            return self.native.abort_eval(eval);
        }

        if attempt == self.escalation.last_resort_after {
            warn!(eval, attempt, "rude abort did not stop the evaluation, resuming all threads");
            self.native.stop_process()?;
            self.native.set_all_threads_state(ThreadState::Run, None)?;
            self.native.continue_process()?;
        }

        debug!(eval, attempt, "rudely aborting evaluation");
        self.native.rude_abort_eval(eval)
    }
}

/// Map a failure to start or resume an evaluation.
fn evaluation_error(err: NativeError) -> Error {
    if let Some(message) = err.evaluation_message() {
        return Error::EvaluationNotAllowed(message);
    }
    if err.cancels_evaluation() {
        return Error::EvaluationCancelled;
    }
    Error::Native(err)
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::test::{NativeCall, RecordingNative};

    fn escalation() -> AbortEscalation {
        AbortEscalation {
            rude_after: 3,
            last_resort_after: 5,
            retry_interval: Duration::from_millis(1),
        }
    }

    #[test]
    fn completes_before_timeout() {
        let native = Arc::new(RecordingNative::new());
        let tracker = Arc::new(EvaluationTracker::new(native.clone(), escalation()));

        let completer = {
            let tracker = tracker.clone();
            thread::spawn(move || {
                while !tracker.complete(9, true) {
                    thread::yield_now();
                }
            })
        };

        let outcome = tracker
            .invoke(1, Duration::from_secs(10), || Ok(9))
            .unwrap();
        completer.join().unwrap();

        assert_eq!(outcome, EvaluationOutcome { eval: 9, threw: true });
        assert!(!tracker.is_evaluating());
        assert_eq!(
            native.calls()[..2],
            [
                NativeCall::SetAllThreads(ThreadState::Suspend, Some(1)),
                NativeCall::Continue
            ]
        );
    }

    #[test]
    fn timeout_escalates_aborts() {
        let native = Arc::new(RecordingNative::new());
        let tracker = EvaluationTracker::new(native.clone(), escalation());

        let result = tracker.invoke(1, Duration::from_millis(1), || Ok(4));
        assert!(matches!(result, Err(Error::EvaluationTimeout)));
        assert!(!tracker.is_evaluating());

        let aborts: Vec<NativeCall> = native.calls().into_iter().skip(2).collect();
        assert_eq!(
            aborts,
            vec![
                NativeCall::AbortEval(4),
                NativeCall::AbortEval(4),
                NativeCall::RudeAbortEval(4),
                NativeCall::RudeAbortEval(4),
                NativeCall::StopProcess,
                NativeCall::SetAllThreads(ThreadState::Run, None),
                NativeCall::Continue,
                NativeCall::RudeAbortEval(4),
            ]
        );
    }

    #[test]
    fn illegal_points_are_reported() {
        let native = Arc::new(RecordingNative::new());
        let tracker = EvaluationTracker::new(native, escalation());

        let result = tracker.invoke(1, Duration::from_millis(1), || {
            Err(NativeError::IllegalInOptimizedCode)
        });
        assert!(
            matches!(result, Err(Error::EvaluationNotAllowed(ref message)) if message == "The thread is in optimized code")
        );

        let result = tracker.invoke(1, Duration::from_millis(1), || {
            Err(NativeError::ProcessTerminated)
        });
        assert!(matches!(result, Err(Error::EvaluationCancelled)));
    }

    #[test]
    fn neutered_abort_cancels() {
        let native = Arc::new(RecordingNative::new());
        native.fail_with(NativeCall::AbortEval(2), NativeError::ObjectNeutered);
        let tracker = EvaluationTracker::new(native, escalation());

        let result = tracker.invoke(1, Duration::from_millis(1), || Ok(2));
        assert!(matches!(result, Err(Error::EvaluationCancelled)));
        assert!(!tracker.is_evaluating());
    }

    #[test]
    fn late_completion_is_tolerated() {
        let native = Arc::new(RecordingNative::new());
        let tracker = EvaluationTracker::new(native, escalation());
        assert!(!tracker.complete(77, false));

        tracker.start();
        assert!(!tracker.wait_until_stopped_for(Duration::from_millis(1)));
        tracker.end();
        assert!(tracker.wait_until_stopped_for(Duration::from_millis(1)));
        tracker.wait_until_stopped();
    }
}
