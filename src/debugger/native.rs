//! The native debug-engine control surface.
//!
//! Everything that touches the live process goes through [`NativeDebugControl`]. The engine
//! binding that implements it maps its status codes into [`NativeError`]; the session decides
//! per call site what a failure means (an invalid breakpoint, a cancelled evaluation, or a
//! logged and swallowed callback error).

use std::{ops::Range, sync::Arc};

use strum::{AsRefStr, EnumCount};
use thiserror::Error;

use crate::metadata::token::Token;

/// Native thread id.
pub type ThreadId = u64;

/// Application domain id.
pub type AppDomainId = u32;

/// Handle of a function breakpoint created by the engine.
pub type BreakpointHandle = u64;

/// Handle of a stepper created by the engine.
pub type StepperHandle = u64;

/// Handle of a pending function evaluation.
pub type EvalHandle = u64;

/// Result of a native call.
pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// Classified failure of a native debug call.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumCount)]
pub enum NativeError {
    /// The engine refused the breakpoint position
    #[error("Invalid breakpoint position")]
    UnableToSetBreakpoint,
    /// The debuggee exited
    #[error("Process terminated")]
    ProcessTerminated,
    /// The code of the target module is not loaded
    #[error("Module is not loaded")]
    CodeNotAvailable,
    /// Thread is not at a GC-safe point
    #[error("The thread is not at a GC-safe point")]
    IllegalAtGcUnsafePoint,
    /// Thread is in a method prolog
    #[error("The thread is in the prolog")]
    IllegalInProlog,
    /// Thread is in native code
    #[error("The thread is in native code")]
    IllegalInNativeCode,
    /// Thread is in optimized code
    #[error("The thread is in optimized code")]
    IllegalInOptimizedCode,
    /// Evaluation cannot start from the current point
    #[error("Bad starting point to perform evaluation")]
    FuncEvalBadStartPoint,
    /// The native object was neutered by a resume
    #[error("The object was neutered")]
    ObjectNeutered,
    /// Any other status code
    #[error("Native status 0x{0:08X}")]
    Other(i32),
}

/// Breakpoint status a native failure maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingFailure {
    /// The position itself is unusable
    Invalid,
    /// The position may become usable later
    BindError,
}

impl NativeError {
    /// How a breakpoint binding failure is reported, with the user-facing message.
    #[must_use]
    pub fn binding_status(&self) -> (BindingFailure, String) {
        match self {
            NativeError::UnableToSetBreakpoint => (BindingFailure::Invalid, self.to_string()),
            _ => (BindingFailure::BindError, self.to_string()),
        }
    }

    /// The message of the evaluation exception this failure converts to, if it is one of the
    /// illegal-at-this-point conditions.
    #[must_use]
    pub fn evaluation_message(&self) -> Option<String> {
        match self {
            NativeError::IllegalAtGcUnsafePoint
            | NativeError::IllegalInProlog
            | NativeError::IllegalInNativeCode
            | NativeError::IllegalInOptimizedCode
            | NativeError::FuncEvalBadStartPoint => Some(self.to_string()),
            _ => None,
        }
    }

    /// Returns true if the failure means the evaluated object or process is gone.
    #[must_use]
    pub fn cancels_evaluation(&self) -> bool {
        matches!(
            self,
            NativeError::ProcessTerminated | NativeError::ObjectNeutered
        )
    }
}

/// Why a step finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum StepReason {
    /// Stepped within the same frame
    Normal,
    /// Returned to the caller
    Return,
    /// Entered a callee
    Call,
    /// An exception was thrown
    Exception,
    /// An exception was intercepted
    Intercept,
    /// Left the stepped method by other means
    Exit,
}

/// Run state applied to all threads but one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Threads run on continue
    Run,
    /// Threads stay suspended on continue
    Suspend,
}

/// Kind of an exception notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ExceptionKind {
    /// Thrown, before any handler search
    FirstChance,
    /// Thrown in user code
    UserFirstChance,
    /// A catch handler was located
    CatchHandlerFound,
    /// No handler exists
    Unhandled,
}

/// An IL range the stepper runs through without stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepRange {
    /// First IL offset
    pub start_offset: u32,
    /// IL offset past the range
    pub end_offset: u32,
}

impl From<Range<u32>> for StepRange {
    fn from(range: Range<u32>) -> Self {
        StepRange {
            start_offset: range.start,
            end_offset: range.end,
        }
    }
}

/// The innermost managed frame of a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    /// Domain the frame's module lives in
    pub domain: AppDomainId,
    /// Module name
    pub module: Arc<str>,
    /// Executing method
    pub method: Token,
    /// Current IL offset
    pub il_offset: u32,
}

/// Commands the session issues to the native debug engine.
///
/// Implementations must be callable from the helper thread and from the event callback
/// thread; they never call back into the session.
pub trait NativeDebugControl: Send + Sync {
    /// Create a stepper bound to `thread`.
    fn create_stepper(&self, thread: ThreadId) -> NativeResult<StepperHandle>;
    /// Deactivate a stepper; deactivating an inactive stepper is not an error.
    fn deactivate_stepper(&self, stepper: StepperHandle) -> NativeResult<()>;
    /// Step one instruction, into or over calls.
    fn step(&self, stepper: StepperHandle, into: bool) -> NativeResult<()>;
    /// Step until execution leaves all of `ranges`.
    fn step_range(&self, stepper: StepperHandle, into: bool, ranges: &[StepRange]) -> NativeResult<()>;
    /// Step out of the current frame.
    fn step_out(&self, stepper: StepperHandle) -> NativeResult<()>;

    /// Apply `state` to every thread except `except`.
    fn set_all_threads_state(&self, state: ThreadState, except: Option<ThreadId>) -> NativeResult<()>;
    /// Resume the process.
    fn continue_process(&self) -> NativeResult<()>;
    /// Interrupt the process.
    fn stop_process(&self) -> NativeResult<()>;
    /// Live managed threads, in engine order.
    fn threads(&self) -> NativeResult<Vec<ThreadId>>;
    /// Returns true if more callbacks are queued for `thread`.
    fn has_queued_callbacks(&self, thread: ThreadId) -> bool;

    /// The innermost managed frame of `thread`.
    fn active_frame(&self, thread: ThreadId) -> NativeResult<Option<FrameInfo>>;
    /// Move the instruction pointer of the innermost frame of `thread`.
    fn set_ip(&self, thread: ThreadId, il_offset: u32) -> NativeResult<()>;

    /// Create a breakpoint in `method` of `module` at `il_offset`.
    fn create_breakpoint(
        &self,
        domain: AppDomainId,
        module: &str,
        method: Token,
        il_offset: u32,
    ) -> NativeResult<BreakpointHandle>;
    /// Enable or disable a breakpoint.
    fn activate_breakpoint(&self, breakpoint: BreakpointHandle, active: bool) -> NativeResult<()>;

    /// Full names of the current exception's type followed by its base types.
    fn exception_type_chain(&self, thread: ThreadId) -> NativeResult<Vec<String>>;

    /// Request a cooperative abort of an evaluation.
    fn abort_eval(&self, eval: EvalHandle) -> NativeResult<()>;
    /// Request a rude abort of an evaluation.
    fn rude_abort_eval(&self, eval: EvalHandle) -> NativeResult<()>;
}
