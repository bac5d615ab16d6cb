//! Native callbacks in, session notifications out.
//!
//! The engine's callback thread hands every callback to
//! [`crate::debugger::DebuggerSession::handle_event`] as a [`NativeEvent`] and receives an
//! [`EventDisposition`] telling it whether to resume the process. Everything the front end
//! needs to show is sent as a [`SessionEvent`] on the session's event channel.

use std::{fmt, sync::Arc};

use crate::{
    debugger::{
        breakpoints::{BreakEventId, BreakEventStatus},
        native::{AppDomainId, BreakpointHandle, EvalHandle, ExceptionKind, FrameInfo, StepReason, ThreadId},
        symbols::SymbolProvider,
    },
    metadata::{importer::MetadataImporter, sequencepoints::SequencePoint},
};

/// A module as delivered by a load callback.
#[derive(Clone)]
pub struct LoadedModule {
    /// Module name, unique within its domain
    pub name: Arc<str>,
    /// Metadata of the module
    pub importer: Arc<dyn MetadataImporter>,
    /// Symbols, if a reader was found
    pub symbols: Option<Arc<dyn SymbolProvider>>,
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.name)
            .field("symbols", &self.symbols.is_some())
            .finish()
    }
}

/// One callback from the native engine.
#[derive(Debug, Clone)]
pub enum NativeEvent {
    /// An application domain was created
    AppDomainCreated {
        /// Domain id
        domain: AppDomainId,
        /// Friendly name
        name: String,
    },
    /// An application domain was unloaded
    AppDomainExited {
        /// Domain id
        domain: AppDomainId,
        /// Friendly name
        name: String,
    },
    /// A module was loaded
    ModuleLoaded {
        /// Owning domain
        domain: AppDomainId,
        /// The module
        module: LoadedModule,
    },
    /// A module was unloaded
    ModuleUnloaded {
        /// Owning domain
        domain: AppDomainId,
        /// Module name
        module: Arc<str>,
    },
    /// A managed thread started
    ThreadCreated {
        /// The thread
        thread: ThreadId,
    },
    /// A managed thread ended
    ThreadExited {
        /// The thread
        thread: ThreadId,
    },
    /// A native breakpoint was hit
    BreakpointHit {
        /// Hitting thread
        thread: ThreadId,
        /// The breakpoint
        breakpoint: BreakpointHandle,
    },
    /// A step finished
    StepComplete {
        /// Stepping thread
        thread: ThreadId,
        /// Why the step ended
        reason: StepReason,
    },
    /// `Debugger.Break` was called
    Break {
        /// Calling thread
        thread: ThreadId,
    },
    /// An exception notification
    Exception {
        /// Throwing thread
        thread: ThreadId,
        /// Notification kind
        kind: ExceptionKind,
    },
    /// An evaluation returned
    EvalComplete {
        /// Evaluating thread
        thread: ThreadId,
        /// The evaluation
        eval: EvalHandle,
    },
    /// An evaluation threw
    EvalException {
        /// Evaluating thread
        thread: ThreadId,
        /// The evaluation
        eval: EvalHandle,
    },
    /// The debuggee exited
    ProcessExited,
    /// `Debugger.Log` was called
    LogMessage {
        /// Log level
        level: i32,
        /// Log switch name
        category: String,
        /// Text
        message: String,
    },
    /// A thread or domain was renamed
    NameChanged {
        /// The thread
        thread: ThreadId,
    },
}

/// What the callback thread does after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    /// Resume the process
    Continue,
    /// Leave the process stopped; a later command resumes it
    Stop,
}

/// Why the debuggee stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum StopReason {
    /// User interrupt or `Debugger.Break`
    Interrupted,
    /// A step finished
    Stepped,
    /// A breakpoint was hit
    BreakpointHit(BreakEventId),
    /// A catchpoint matched a thrown exception
    ExceptionThrown,
    /// An exception had no handler
    UnhandledException,
    /// The instruction pointer was moved
    NextStatementSet,
}

/// A thread's execution state, valid for one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSnapshot {
    /// The thread
    pub thread: ThreadId,
    /// Session generation the snapshot was taken under
    pub generation: u64,
    /// Innermost managed frame
    pub frame: Option<FrameInfo>,
    /// Nearest source location of the frame
    pub location: Option<SequencePoint>,
}

/// A notification for the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The debuggee stopped
    Stopped {
        /// Why
        reason: StopReason,
        /// Where
        thread: ThreadSnapshot,
    },
    /// Debugger output, such as module loads
    Output(String),
    /// Debuggee log output
    Log {
        /// Log level
        level: i32,
        /// Log category
        category: String,
        /// Text
        message: String,
    },
    /// A breakpoint's status changed
    BreakpointStatus {
        /// Which request
        id: BreakEventId,
        /// New status
        status: BreakEventStatus,
        /// Message
        message: Option<String>,
    },
    /// A trace breakpoint produced a value
    TraceValue {
        /// Which request
        id: BreakEventId,
        /// Formatted template
        value: String,
    },
    /// The debuggee exited
    Exited,
}
