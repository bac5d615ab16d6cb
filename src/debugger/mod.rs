//! The debugger core.
//!
//! A [`DebuggerSession`] sits between a front end (an editor adapter, a command line) and the
//! native debug engine. The engine's callback thread feeds the session [`NativeEvent`]s; the
//! session maps source positions to IL offsets, drives steppers, decides which stops the user
//! sees and reports them as [`SessionEvent`]s.
//!
//! Three capabilities are supplied by the embedder:
//!
//! - [`NativeDebugControl`]: commands to the live process
//! - [`SymbolProvider`]: sequence points and document lookups of one module
//! - [`crate::metadata::importer::MetadataImporter`]: the metadata of one module
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use corscope::debugger::{Breakpoint, DebuggerSession, SessionOptions};
//!
//! let session = DebuggerSession::new(native, SessionOptions::default())?;
//! let id = session.insert_breakpoint(Breakpoint::new("/src/Program.cs", 12, 1));
//!
//! // on the engine's callback thread
//! let disposition = session.handle_event(event);
//!
//! // on the front end
//! for event in session.events() {
//!     println!("{event:?}");
//! }
//! ```

pub mod breakpoints;
pub mod eval;
pub mod events;
pub mod native;
pub mod options;
pub mod session;
pub mod stepping;
pub mod symbols;

mod worker;

pub use breakpoints::{
    BindingResult, BreakEvent, BreakEventId, BreakEventInfo, BreakEventStatus, Breakpoint,
    Catchpoint, HitAction, HitCondition,
};
pub use eval::{EvaluationOutcome, EvaluationTracker, ExpressionEvaluator};
pub use events::{
    EventDisposition, LoadedModule, NativeEvent, SessionEvent, StopReason, ThreadSnapshot,
};
pub use native::{
    AppDomainId, ExceptionKind, FrameInfo, NativeDebugControl, NativeError, NativeResult,
    StepReason, ThreadId,
};
pub use options::{AbortEscalation, SessionOptions};
pub use session::{DebuggerSession, ModuleInfo};
pub use stepping::{StepCommand, StepController, StepDecision};
pub use symbols::SymbolProvider;
