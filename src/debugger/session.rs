//! The debugger session facade.
//!
//! [`DebuggerSession`] owns everything that lives as long as the debuggee: the application
//! domain table with its modules and documents, the thread snapshot cache, the breakpoint
//! table and the active stepper. The engine's callback thread feeds it [`NativeEvent`]s; the
//! front end issues commands and reads [`SessionEvent`]s from [`DebuggerSession::events`].
//!
//! # Generations
//!
//! Every resume, stop and evaluation completion advances the session generation and clears
//! the thread cache. Snapshots carry the generation they were taken under, so a caller
//! holding one can tell whether it is still current.
//!
//! # Locking
//!
//! Tables sit behind coarse locks. When two are needed, the breakpoint table is taken before
//! the domain table; the control state is never held while taking either for writing.

use std::{
    collections::{hash_map::Entry, HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::{
    debugger::{
        breakpoints::{
            format_trace, BindingResult, BreakEvent, BreakEventId, BreakEventInfo,
            BreakEventStatus, Breakpoint, BreakpointResolver, BreakpointStore, Catchpoint,
            HitAction, ModuleBinding, NativeBinding, Resolution,
        },
        eval::{EvaluationTracker, ExpressionEvaluator},
        events::{EventDisposition, LoadedModule, NativeEvent, SessionEvent, StopReason, ThreadSnapshot},
        native::{
            AppDomainId, BreakpointHandle, ExceptionKind, FrameInfo, NativeDebugControl,
            StepRange, StepReason, StepperHandle, ThreadId, ThreadState,
        },
        options::SessionOptions,
        stepping::{FrameView, StepCommand, StepContext, StepController, StepDecision},
        symbols::SymbolProvider,
        worker::HelperThread,
    },
    metadata::{
        customattributes::DebugAttributes,
        sequencepoints::{SequencePoint, SequencePointIndex, END_OF_METHOD},
        token::Token,
        typesystem::{ElementType, TypeModel, TypeRc},
    },
    Error, Result,
};

/// Front end hook run for [`HitAction::CUSTOM_ACTION`]; returns true to resume.
pub type CustomActionHandler = dyn Fn(&str) -> bool + Send + Sync;

/// A loaded module with its metadata and symbols.
pub struct ModuleInfo {
    name: Arc<str>,
    domain: AppDomainId,
    types: TypeModel,
    symbols: Option<Arc<dyn SymbolProvider>>,
    documents: HashSet<String>,
    sequence_points: DashMap<Token, Option<Arc<SequencePointIndex>>>,
}

impl ModuleInfo {
    fn new(domain: AppDomainId, module: LoadedModule, documents: &[Arc<str>]) -> Self {
        ModuleInfo {
            name: module.name,
            domain,
            types: TypeModel::new(module.importer),
            symbols: module.symbols,
            documents: documents
                .iter()
                .map(|document| document.to_ascii_lowercase())
                .collect(),
            sequence_points: DashMap::new(),
        }
    }

    /// Module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning application domain.
    #[must_use]
    pub fn domain(&self) -> AppDomainId {
        self.domain
    }

    /// The module's type model.
    #[must_use]
    pub fn types(&self) -> &TypeModel {
        &self.types
    }

    /// Returns true if a symbol reader was found for the module.
    #[must_use]
    pub fn has_symbols(&self) -> bool {
        self.symbols.is_some()
    }

    /// Returns true if the module was compiled from `document`.
    #[must_use]
    pub fn has_document(&self, document: &str) -> bool {
        self.documents.contains(&document.to_ascii_lowercase())
    }

    /// The sequence points of `method`, built on first use.
    ///
    /// Methods without symbols, and methods whose symbols are malformed, yield `None`.
    pub fn sequence_points(&self, method: Token) -> Option<Arc<SequencePointIndex>> {
        if let Some(cached) = self.sequence_points.get(&method) {
            return cached.clone();
        }

        let arrays = self.symbols.as_ref()?.sequence_points(method);
        let index = arrays.and_then(|arrays| {
            match SequencePointIndex::from_arrays(method, &arrays) {
                Ok(index) => Some(Arc::new(index)),
                Err(err) => {
                    warn!(module = %self.name, %method, error = %err, "ignoring malformed sequence points");
                    None
                }
            }
        });
        self.sequence_points.insert(method, index.clone());
        index
    }

    fn resolve(&self, document: &str, line: u32, column: u32) -> std::result::Result<Resolution, String> {
        let Some(symbols) = self.symbols.as_ref() else {
            return Err(format!("No symbols loaded for {}", self.name));
        };

        let line = symbols.closest_line(document, line).map_err(|err| {
            debug!(module = %self.name, document, line, error = %err, "no code at or after line");
            format!("Invalid line {line}")
        })?;

        let indexes: Vec<Arc<SequencePointIndex>> = symbols
            .methods_in_document(document, line)
            .into_iter()
            .filter_map(|method| self.sequence_points(method))
            .collect();
        if indexes.is_empty() {
            return Err("Unable to resolve method at position".to_string());
        }

        BreakpointResolver::resolve(document, line, column, indexes.iter().map(|index| index.as_ref()))
            .ok_or_else(|| "Unable to calculate an offset in IL code".to_string())
    }
}

impl std::fmt::Debug for ModuleInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleInfo")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("symbols", &self.symbols.is_some())
            .field("documents", &self.documents.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
struct DocumentInfo {
    url: Arc<str>,
    modules: Vec<Arc<str>>,
}

#[derive(Debug, Default)]
struct AppDomainInfo {
    name: String,
    documents: HashMap<String, DocumentInfo>,
    modules: HashMap<String, Arc<ModuleInfo>>,
}

impl AppDomainInfo {
    fn new(name: String) -> Self {
        AppDomainInfo {
            name,
            ..AppDomainInfo::default()
        }
    }
}

#[derive(Debug, Default)]
struct ControlState {
    active_thread: Option<ThreadId>,
    controller: Option<StepController>,
}

/// One debugging session over a single debuggee process.
pub struct DebuggerSession {
    native: Arc<dyn NativeDebugControl>,
    options: SessionOptions,
    generation: AtomicU64,
    domains: RwLock<HashMap<AppDomainId, AppDomainInfo>>,
    threads: Mutex<HashMap<ThreadId, ThreadSnapshot>>,
    breakpoints: Mutex<BreakpointStore>,
    control: Mutex<ControlState>,
    evaluation: Arc<EvaluationTracker>,
    evaluator: RwLock<Option<Arc<dyn ExpressionEvaluator>>>,
    custom_action: RwLock<Option<Arc<CustomActionHandler>>>,
    sender: Sender<SessionEvent>,
    receiver: Receiver<SessionEvent>,
    helper: HelperThread,
    terminated: AtomicBool,
    disposed: AtomicBool,
}

impl DebuggerSession {
    /// Create a session driving `native`.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the helper thread cannot be spawned.
    pub fn new(native: Arc<dyn NativeDebugControl>, options: SessionOptions) -> Result<Arc<Self>> {
        let (sender, receiver) = unbounded();
        let helper = HelperThread::spawn("corscope-helper")?;
        let evaluation = Arc::new(EvaluationTracker::new(
            native.clone(),
            options.abort_escalation,
        ));

        Ok(Arc::new(DebuggerSession {
            native,
            options,
            generation: AtomicU64::new(0),
            domains: RwLock::new(HashMap::new()),
            threads: Mutex::new(HashMap::new()),
            breakpoints: Mutex::new(BreakpointStore::new()),
            control: Mutex::new(ControlState::default()),
            evaluation,
            evaluator: RwLock::new(None),
            custom_action: RwLock::new(None),
            sender,
            receiver,
            helper,
            terminated: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }))
    }

    /// The session's options.
    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// The current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Receiving end of the session's notifications.
    #[must_use]
    pub fn events(&self) -> Receiver<SessionEvent> {
        self.receiver.clone()
    }

    /// The evaluation tracker an [`ExpressionEvaluator`] runs its invocations through.
    #[must_use]
    pub fn evaluation(&self) -> &Arc<EvaluationTracker> {
        &self.evaluation
    }

    /// Install the evaluator used for breakpoint conditions and trace templates.
    pub fn set_evaluator(&self, evaluator: Arc<dyn ExpressionEvaluator>) {
        *self.evaluator.write() = Some(evaluator);
    }

    /// Install the handler for custom breakpoint actions.
    pub fn set_custom_action_handler<F>(&self, handler: F)
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        *self.custom_action.write() = Some(Arc::new(handler));
    }

    /// Returns true once the debuggee exited or the session was disposed.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// The thread commands apply to.
    #[must_use]
    pub fn active_thread(&self) -> Option<ThreadId> {
        self.control.lock().active_thread
    }

    // Metadata queries

    /// A loaded module by domain and name; names compare ignoring ASCII case.
    #[must_use]
    pub fn module(&self, domain: AppDomainId, name: &str) -> Option<Arc<ModuleInfo>> {
        self.domains
            .read()
            .get(&domain)?
            .modules
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    fn require_module(&self, domain: AppDomainId, name: &str) -> Result<Arc<ModuleInfo>> {
        self.module(domain, name).ok_or_else(|| {
            Error::NotFound(format!("module {name} in application domain {domain}"))
        })
    }

    /// Resolve a type token of a loaded module.
    ///
    /// # Errors
    /// [`Error::NotFound`] for unknown modules, otherwise see [`TypeModel::resolve_type`].
    pub fn resolve_type(&self, domain: AppDomainId, module: &str, token: Token) -> Result<TypeRc> {
        self.require_module(domain, module)?.types().resolve_type(token)
    }

    /// Storage type of an enum of a loaded module.
    ///
    /// # Errors
    /// [`Error::NotFound`] for unknown modules, otherwise see
    /// [`TypeModel::enum_underlying_type`].
    pub fn enum_underlying_type(
        &self,
        domain: AppDomainId,
        module: &str,
        token: Token,
    ) -> Result<ElementType> {
        self.require_module(domain, module)?
            .types()
            .enum_underlying_type(token)
    }

    /// Returns true if the stepper never stops inside `method`, under this session's options.
    ///
    /// # Errors
    /// [`Error::NotFound`] for unknown modules, otherwise see [`TypeModel::is_step_through`].
    pub fn is_step_through(&self, domain: AppDomainId, module: &str, method: Token) -> Result<bool> {
        self.require_module(domain, module)?
            .types()
            .is_step_through(method, self.options.project_assemblies_only)
    }

    /// Returns true if `document` belongs to no loaded module.
    #[must_use]
    pub fn is_external_code(&self, document: &str) -> bool {
        if document.trim().is_empty() {
            return true;
        }
        let key = document.to_ascii_lowercase();
        !self
            .domains
            .read()
            .values()
            .any(|domain| domain.documents.contains_key(&key))
    }

    fn modules_with_document(&self, document: &str) -> Vec<Arc<ModuleInfo>> {
        let key = document.to_ascii_lowercase();
        let domains = self.domains.read();
        let mut modules = Vec::new();
        for domain in domains.values() {
            let Some(info) = domain.documents.get(&key) else {
                continue;
            };
            modules.extend(
                info.modules
                    .iter()
                    .filter_map(|name| domain.modules.get(&name.to_ascii_lowercase()).cloned()),
            );
        }
        modules
    }

    // Breakpoints

    /// Map a source position to a native location in every module compiled from `document`.
    ///
    /// The line is first snapped to the nearest line with code; the reported position is the
    /// start of the point chosen in the first module.
    pub fn bind_breakpoint(&self, document: &str, line: u32, column: u32) -> BindingResult {
        let modules = self.modules_with_document(document);
        if modules.is_empty() {
            return BindingResult::NotBound(format!(
                "{document} is not found among the loaded symbol documents"
            ));
        }

        let mut corrected = None;
        let mut bindings = Vec::new();
        let mut failure = None;
        for module in &modules {
            match module.resolve(document, line, column) {
                Ok(resolution) => {
                    corrected.get_or_insert((
                        resolution.point.start_line,
                        resolution.point.start_column,
                    ));
                    bindings.push(ModuleBinding {
                        domain: module.domain,
                        module: module.name.clone(),
                        method: resolution.method,
                        offset: resolution.offset,
                    });
                }
                Err(message) => {
                    failure.get_or_insert(message);
                }
            }
        }

        match corrected {
            Some((line, column)) => BindingResult::Bound {
                line,
                column,
                bindings,
            },
            None => BindingResult::Invalid(failure.unwrap_or_default()),
        }
    }

    /// Insert a source breakpoint and bind it in the loaded modules.
    pub fn insert_breakpoint(&self, breakpoint: Breakpoint) -> BreakEventId {
        self.insert_event(BreakEvent::Breakpoint(breakpoint))
    }

    /// Insert a catchpoint.
    pub fn insert_catchpoint(&self, catchpoint: Catchpoint) -> BreakEventId {
        self.insert_event(BreakEvent::Catchpoint(catchpoint))
    }

    fn insert_event(&self, event: BreakEvent) -> BreakEventId {
        let mut store = self.breakpoints.lock();
        let id = store.next_id();
        let mut info = BreakEventInfo::new(id, event);
        self.bind_event(&mut info);

        let notification = status_event(&info);
        store.insert(info);
        drop(store);

        self.emit(notification);
        id
    }

    fn bind_event(&self, info: &mut BreakEventInfo) {
        match info.event.clone() {
            BreakEvent::Breakpoint(breakpoint) => {
                match self.bind_breakpoint(&breakpoint.file, breakpoint.line, breakpoint.column) {
                    BindingResult::Bound { line, bindings, .. } => {
                        for binding in bindings {
                            self.attach(info, breakpoint.enabled, binding);
                        }
                        if info.status == BreakEventStatus::Bound && line != breakpoint.line {
                            info.adjusted_line = Some(line);
                        }
                    }
                    BindingResult::Invalid(message) => {
                        info.set_status(BreakEventStatus::Invalid, Some(message));
                    }
                    BindingResult::NotBound(message) => {
                        info.set_status(BreakEventStatus::NotBound, Some(message));
                    }
                }
            }
            BreakEvent::Catchpoint(catchpoint) => {
                let defined = self
                    .domains
                    .read()
                    .values()
                    .flat_map(|domain| domain.modules.values())
                    .any(|module| defines_type(module, &catchpoint.exception_name));
                if defined {
                    info.set_status(BreakEventStatus::Bound, None);
                } else {
                    info.set_status(
                        BreakEventStatus::NotBound,
                        Some(format!(
                            "The exception type {} is not defined in any loaded module",
                            catchpoint.exception_name
                        )),
                    );
                }
            }
        }
    }

    fn attach(&self, info: &mut BreakEventInfo, enabled: bool, binding: ModuleBinding) {
        let created = self
            .native
            .create_breakpoint(binding.domain, &binding.module, binding.method, binding.offset)
            .and_then(|handle| {
                self.native
                    .activate_breakpoint(handle, enabled)
                    .map(|()| handle)
            });

        match created {
            Ok(handle) => {
                debug!(id = info.id, handle, module = %binding.module, method = %binding.method, offset = binding.offset, "breakpoint bound");
                info.bindings.push(NativeBinding {
                    handle,
                    domain: binding.domain,
                    module: binding.module,
                });
                info.set_status(BreakEventStatus::Bound, None);
            }
            Err(err) => {
                warn!(id = info.id, module = %binding.module, error = %err, "native breakpoint creation failed");
                if info.bindings.is_empty() {
                    info.set_native_failure(err);
                }
            }
        }
    }

    /// Binding state of an inserted request.
    #[must_use]
    pub fn breakpoint_info(&self, id: BreakEventId) -> Option<BreakEventInfo> {
        self.breakpoints.lock().get(id).cloned()
    }

    /// Enable or disable a request and all of its native breakpoints.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown ids. Native failures are recorded in the
    /// request's status.
    pub fn enable_breakpoint(&self, id: BreakEventId, enabled: bool) -> Result<()> {
        let mut store = self.breakpoints.lock();
        let info = store
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("break event {id}")))?;

        match &mut info.event {
            BreakEvent::Breakpoint(breakpoint) => breakpoint.enabled = enabled,
            BreakEvent::Catchpoint(catchpoint) => catchpoint.enabled = enabled,
        }
        for binding in info.bindings.clone() {
            if let Err(err) = self.native.activate_breakpoint(binding.handle, enabled) {
                warn!(id, handle = binding.handle, error = %err, "breakpoint activation failed");
                info.set_native_failure(err);
            }
        }
        Ok(())
    }

    /// Remove a request and deactivate its native breakpoints.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown ids.
    pub fn remove_breakpoint(&self, id: BreakEventId) -> Result<()> {
        let info = self
            .breakpoints
            .lock()
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("break event {id}")))?;

        for binding in &info.bindings {
            if let Err(err) = self.native.activate_breakpoint(binding.handle, false) {
                debug!(id, handle = binding.handle, error = %err, "breakpoint deactivation failed");
            }
        }
        Ok(())
    }

    fn bind_pending(&self, module: &Arc<ModuleInfo>) {
        let mut notifications = Vec::new();
        {
            let mut store = self.breakpoints.lock();
            let ids: Vec<BreakEventId> = store.iter().map(|info| info.id).collect();
            for id in ids {
                let Some(mut info) = store.get(id).cloned() else {
                    continue;
                };
                let before = (info.status, info.bindings.len());

                match info.event.clone() {
                    BreakEvent::Breakpoint(breakpoint) => {
                        if !module.has_document(&breakpoint.file) {
                            continue;
                        }
                        match module.resolve(&breakpoint.file, breakpoint.line, breakpoint.column) {
                            Ok(resolution) => {
                                let line = resolution.point.start_line;
                                self.attach(
                                    &mut info,
                                    breakpoint.enabled,
                                    ModuleBinding {
                                        domain: module.domain,
                                        module: module.name.clone(),
                                        method: resolution.method,
                                        offset: resolution.offset,
                                    },
                                );
                                if info.adjusted_line.is_none() && line != breakpoint.line {
                                    info.adjusted_line = Some(line);
                                }
                            }
                            Err(message) if info.bindings.is_empty() => {
                                info.set_status(BreakEventStatus::Invalid, Some(message));
                            }
                            Err(_) => {}
                        }
                    }
                    BreakEvent::Catchpoint(catchpoint) => {
                        if info.status != BreakEventStatus::Bound
                            && defines_type(module, &catchpoint.exception_name)
                        {
                            info.set_status(BreakEventStatus::Bound, None);
                        }
                    }
                }

                if before != (info.status, info.bindings.len()) {
                    notifications.push(status_event(&info));
                }
                store.insert(info);
            }
        }

        for notification in notifications {
            self.emit(notification);
        }
    }

    fn unbind_module(&self, domain: AppDomainId, module: &str) {
        let mut notifications = Vec::new();
        {
            let mut store = self.breakpoints.lock();
            let affected: Vec<BreakEventId> = store
                .iter()
                .filter(|info| {
                    info.bindings.iter().any(|binding| {
                        binding.domain == domain && binding.module.eq_ignore_ascii_case(module)
                    })
                })
                .map(|info| info.id)
                .collect();

            for id in affected {
                let Some(mut info) = store.get(id).cloned() else {
                    continue;
                };
                info.bindings.retain(|binding| {
                    binding.domain != domain || !binding.module.eq_ignore_ascii_case(module)
                });
                if info.bindings.is_empty() {
                    info.set_status(BreakEventStatus::NotBound, None);
                    notifications.push(status_event(&info));
                }
                store.insert(info);
            }
        }

        for notification in notifications {
            self.emit(notification);
        }
    }

    // Execution control

    fn ensure_running(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(Error::AlreadyDisposed);
        }
        if self.terminated.load(Ordering::Acquire) {
            return Err(Error::SessionTerminated);
        }
        Ok(())
    }

    /// Resume all threads.
    ///
    /// # Errors
    /// [`Error::SessionTerminated`] after the debuggee exited, or the native failure.
    pub fn continue_execution(&self) -> Result<()> {
        self.ensure_running()?;
        self.cancel_stepper();
        self.native.set_all_threads_state(ThreadState::Run, None)?;
        self.resume()
    }

    /// Interrupt the debuggee and report a stop on its first managed thread.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the process has no managed thread, or the native failure.
    pub fn stop(&self) -> Result<()> {
        self.ensure_running()?;
        self.native.stop_process()?;
        let thread = self
            .native
            .threads()?
            .first()
            .copied()
            .ok_or_else(|| Error::NotFound("managed thread".to_string()))?;
        self.halt(thread, StopReason::Interrupted);
        Ok(())
    }

    /// Make `thread` the target of later step commands.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the thread is not alive.
    pub fn set_active_thread(&self, thread: ThreadId) -> Result<()> {
        self.ensure_running()?;
        if !self.native.threads()?.contains(&thread) {
            return Err(Error::NotFound(format!("thread {thread}")));
        }

        let mut control = self.control.lock();
        if control.active_thread != Some(thread) {
            if let Some(controller) = control.controller.take() {
                self.deactivate(&controller);
            }
            control.active_thread = Some(thread);
        }
        Ok(())
    }

    /// Step one source line on the active thread.
    ///
    /// # Errors
    /// [`Error::NotFound`] without an active thread, or the native failure.
    pub fn step_line(&self, into: bool) -> Result<()> {
        self.start_step(into, |session, stepper, thread| {
            session.step_over_line(stepper, thread, into)
        })
    }

    /// Step one instruction on the active thread.
    ///
    /// # Errors
    /// [`Error::NotFound`] without an active thread, or the native failure.
    pub fn step_instruction(&self, into: bool) -> Result<()> {
        self.start_step(into, |session, stepper, _| {
            Ok(session.native.step(stepper, into)?)
        })
    }

    /// Run the active thread until the current method returns.
    ///
    /// # Errors
    /// [`Error::NotFound`] without an active thread, or the native failure.
    pub fn step_out(&self) -> Result<()> {
        self.start_step(false, |session, stepper, _| {
            Ok(session.native.step_out(stepper)?)
        })
    }

    fn start_step<F>(&self, into: bool, issue: F) -> Result<()>
    where
        F: FnOnce(&Self, StepperHandle, ThreadId) -> Result<()>,
    {
        self.ensure_running()?;
        {
            let mut control = self.control.lock();
            let thread = control
                .active_thread
                .ok_or_else(|| Error::NotFound("active thread".to_string()))?;
            if let Some(previous) = control.controller.take() {
                self.deactivate(&previous);
            }

            let stepper = self.native.create_stepper(thread)?;
            let mut controller = StepController::new(thread, stepper, self.options);
            controller.begin(into);
            if let Err(err) = issue(self, stepper, thread) {
                self.deactivate(&controller);
                return Err(err);
            }
            control.controller = Some(controller);
        }

        self.native.set_all_threads_state(ThreadState::Run, None)?;
        self.resume()
    }

    fn step_over_line(&self, stepper: StepperHandle, thread: ThreadId, into: bool) -> Result<()> {
        let range = self
            .native
            .active_frame(thread)?
            .and_then(|frame| {
                let module = self.module(frame.domain, &frame.module)?;
                module.sequence_points(frame.method)?.step_range(frame.il_offset)
            });

        match range {
            Some(range) => self.native.step_range(stepper, into, &[StepRange::from(range)])?,
            None => self.native.step(stepper, into)?,
        }
        Ok(())
    }

    fn issue(&self, stepper: StepperHandle, thread: ThreadId, command: StepCommand) -> Result<()> {
        match command {
            StepCommand::Resume => {}
            StepCommand::Line { into } => self.step_over_line(stepper, thread, into)?,
            StepCommand::Instruction { into } => self.native.step(stepper, into)?,
            StepCommand::ThroughMethod => self.native.step_range(
                stepper,
                true,
                &[StepRange::from(0..END_OF_METHOD)],
            )?,
            StepCommand::Out => self.native.step_out(stepper)?,
        }
        Ok(())
    }

    /// Move the instruction pointer of `thread` to a source position in its current method.
    ///
    /// The first point containing the position is taken, else the first point starting on
    /// `line`. Reports a [`StopReason::NextStatementSet`] stop.
    ///
    /// # Errors
    /// [`Error::NotSupported`] if the position is outside the current method, or the native
    /// failure.
    pub fn set_next_statement(
        &self,
        thread: ThreadId,
        document: &str,
        line: u32,
        column: u32,
    ) -> Result<()> {
        self.ensure_running()?;
        let frame = self
            .native
            .active_frame(thread)?
            .ok_or_else(|| Error::NotFound(format!("managed frame on thread {thread}")))?;
        let module = self.require_module(frame.domain, &frame.module)?;
        let index = module.sequence_points(frame.method).ok_or_else(|| {
            Error::NotSupported(format!("No symbols for method {}", frame.method))
        })?;

        let visible = || index.points().iter().filter(|point| !point.is_special());
        let target = visible()
            .find(|point| point.is_inside(document, line, column))
            .or_else(|| {
                visible().find(|point| point.start_line == line && point.same_document(document))
            })
            .ok_or_else(|| {
                Error::NotSupported(
                    "Unable to set the next statement. The next statement can only be set to a location in the current method"
                        .to_string(),
                )
            })?;

        self.native.set_ip(thread, target.offset)?;
        self.halt(thread, StopReason::NextStatementSet);
        Ok(())
    }

    /// The execution state of `thread`, taken once per generation.
    ///
    /// Waits for a running evaluation to finish first.
    ///
    /// # Errors
    /// [`Error::SessionTerminated`] after the debuggee exited, or the native failure.
    pub fn thread_snapshot(&self, thread: ThreadId) -> Result<ThreadSnapshot> {
        self.ensure_running()?;
        self.evaluation.wait_until_stopped();
        self.snapshot(thread)
    }

    fn snapshot(&self, thread: ThreadId) -> Result<ThreadSnapshot> {
        let generation = self.generation();
        if let Some(cached) = self
            .threads
            .lock()
            .get(&thread)
            .filter(|snapshot| snapshot.generation == generation)
        {
            return Ok(cached.clone());
        }

        let frame = self.native.active_frame(thread)?;
        let location = frame.as_ref().and_then(|frame| self.location_of(frame));
        let snapshot = ThreadSnapshot {
            thread,
            generation,
            frame,
            location,
        };
        self.threads.lock().insert(thread, snapshot.clone());
        Ok(snapshot)
    }

    fn location_of(&self, frame: &FrameInfo) -> Option<SequencePoint> {
        self.module(frame.domain, &frame.module)?
            .sequence_points(frame.method)?
            .lookup(frame.il_offset)
            .cloned()
    }

    fn frame_view(&self, thread: ThreadId) -> FrameView {
        let frame = match self.native.active_frame(thread) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(thread, error = %err, "active frame unavailable");
                None
            }
        };
        let Some(frame) = frame else {
            return FrameView::default();
        };
        let Some(module) = self.module(frame.domain, &frame.module) else {
            return FrameView {
                frame: Some(frame),
                ..FrameView::default()
            };
        };

        let (method_attributes, type_attributes, property_or_operator) =
            match module.types().resolve_method(frame.method) {
                Ok(method) => {
                    let declaring = method.declaring_type();
                    let type_attributes = if declaring.is_nil_row() || declaring.is_not_found() {
                        DebugAttributes::empty()
                    } else {
                        module
                            .types()
                            .resolve_type(declaring)
                            .map_or(DebugAttributes::empty(), |ty| ty.debug_attributes())
                    };
                    (
                        method.debug_attributes(),
                        type_attributes,
                        method.is_property_or_operator(),
                    )
                }
                Err(err) => {
                    debug!(method = %frame.method, error = %err, "stepping through unresolved method");
                    (DebugAttributes::empty(), DebugAttributes::empty(), false)
                }
            };

        let sequence_point = module
            .sequence_points(frame.method)
            .and_then(|index| index.point_at(frame.il_offset).cloned());

        FrameView {
            frame: Some(frame),
            method_attributes,
            type_attributes,
            property_or_operator,
            sequence_point,
        }
    }

    fn advance_generation(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.threads.lock().clear();
        generation
    }

    fn resume(&self) -> Result<()> {
        self.advance_generation();
        self.native.continue_process()?;
        Ok(())
    }

    fn deactivate(&self, controller: &StepController) {
        if let Err(err) = self.native.deactivate_stepper(controller.stepper()) {
            debug!(stepper = controller.stepper(), error = %err, "stepper deactivation failed");
        }
    }

    fn cancel_stepper(&self) {
        if let Some(controller) = self.control.lock().controller.take() {
            self.deactivate(&controller);
        }
    }

    fn halt(&self, thread: ThreadId, reason: StopReason) {
        self.advance_generation();
        {
            let mut control = self.control.lock();
            if let Some(controller) = control.controller.take() {
                self.deactivate(&controller);
            }
            control.active_thread = Some(thread);
        }

        let snapshot = self.snapshot(thread).unwrap_or_else(|err| {
            warn!(thread, error = %err, "stopped thread has no readable frame");
            ThreadSnapshot {
                thread,
                generation: self.generation(),
                frame: None,
                location: None,
            }
        });
        debug!(thread, %reason, "debuggee stopped");
        self.emit(SessionEvent::Stopped {
            reason,
            thread: snapshot,
        });
    }

    fn emit(&self, event: SessionEvent) {
        // The session holds a receiver, so the channel never disconnects
        let _ = self.sender.send(event);
    }

    // Event routing

    /// Route one native callback and tell the callback thread whether to resume.
    pub fn handle_event(self: &Arc<Self>, event: NativeEvent) -> EventDisposition {
        debug!(?event, "native event");
        let disposition = match event {
            NativeEvent::AppDomainCreated { domain, name } => self.on_domain_created(domain, name),
            NativeEvent::AppDomainExited { domain, name } => self.on_domain_exited(domain, &name),
            NativeEvent::ModuleLoaded { domain, module } => self.on_module_loaded(domain, module),
            NativeEvent::ModuleUnloaded { domain, module } => {
                self.on_module_unloaded(domain, &module)
            }
            NativeEvent::ThreadCreated { thread } => {
                self.emit(SessionEvent::Output(format!("Started Thread {thread}")));
                EventDisposition::Continue
            }
            NativeEvent::ThreadExited { thread } => self.on_thread_exited(thread),
            NativeEvent::BreakpointHit { thread, breakpoint } => {
                self.on_breakpoint_hit(thread, breakpoint)
            }
            NativeEvent::StepComplete { thread, reason } => self.on_step_complete(thread, reason),
            NativeEvent::Break { thread } => {
                if self.evaluation.is_evaluating() {
                    EventDisposition::Continue
                } else {
                    self.halt(thread, StopReason::Interrupted);
                    EventDisposition::Stop
                }
            }
            NativeEvent::Exception { thread, kind } => self.on_exception(thread, kind),
            NativeEvent::EvalComplete { eval, .. } => self.on_eval_finished(eval, false),
            NativeEvent::EvalException { eval, .. } => self.on_eval_finished(eval, true),
            NativeEvent::ProcessExited => self.on_process_exited(),
            NativeEvent::LogMessage {
                level,
                category,
                message,
            } => {
                self.emit(SessionEvent::Log {
                    level,
                    category,
                    message,
                });
                EventDisposition::Continue
            }
            NativeEvent::NameChanged { .. } => EventDisposition::Continue,
        };

        if disposition == EventDisposition::Continue {
            self.advance_generation();
        }
        disposition
    }

    fn on_domain_created(&self, domain: AppDomainId, name: String) -> EventDisposition {
        match self.domains.write().entry(domain) {
            Entry::Occupied(mut existing) => existing.get_mut().name.clone_from(&name),
            Entry::Vacant(vacant) => {
                vacant.insert(AppDomainInfo::new(name.clone()));
            }
        }
        info!(domain, %name, "application domain created");
        self.emit(SessionEvent::Output(format!(
            "Loaded application domain '{name} (id {domain})'"
        )));
        EventDisposition::Continue
    }

    fn on_domain_exited(&self, domain: AppDomainId, name: &str) -> EventDisposition {
        let removed = self.domains.write().remove(&domain);
        match removed {
            Some(info) => {
                for module in info.modules.values() {
                    module.types().clear();
                    self.unbind_module(domain, module.name());
                }
                info!(domain, name, "application domain unloaded");
            }
            None => warn!(domain, name, "unload of unknown application domain"),
        }
        self.emit(SessionEvent::Output(format!(
            "Unloaded application domain '{name} (id {domain})'"
        )));
        EventDisposition::Continue
    }

    fn on_module_loaded(&self, domain: AppDomainId, loaded: LoadedModule) -> EventDisposition {
        let documents = loaded
            .symbols
            .as_ref()
            .map(|symbols| symbols.documents())
            .unwrap_or_default();
        let module = Arc::new(ModuleInfo::new(domain, loaded, &documents));
        let name = module.name.clone();

        {
            let mut domains = self.domains.write();
            let entry = domains.entry(domain).or_insert_with(|| {
                warn!(domain, module = %name, "module loaded into an unknown application domain, creating it");
                AppDomainInfo::default()
            });

            if entry
                .modules
                .insert(name.to_ascii_lowercase(), module.clone())
                .is_some()
            {
                warn!(domain, module = %name, "module registered twice, replacing");
            }

            for document in &documents {
                let info = entry
                    .documents
                    .entry(document.to_ascii_lowercase())
                    .or_insert_with(|| DocumentInfo {
                        url: document.clone(),
                        modules: Vec::new(),
                    });
                if info.modules.iter().any(|owner| owner.eq_ignore_ascii_case(&name)) {
                    warn!(domain, module = %name, document = %info.url, "document registered twice");
                } else {
                    info.modules.push(name.clone());
                }
            }
        }

        info!(domain, module = %name, symbols = module.has_symbols(), "module loaded");
        self.emit(SessionEvent::Output(format!("Loading module {name}")));
        if module.has_symbols() {
            self.emit(SessionEvent::Output(format!("Symbols for module {name} loaded")));
        }

        self.bind_pending(&module);
        EventDisposition::Continue
    }

    fn on_module_unloaded(&self, domain: AppDomainId, name: &str) -> EventDisposition {
        let removed = {
            let mut domains = self.domains.write();
            domains.get_mut(&domain).and_then(|info| {
                let removed = info.modules.remove(&name.to_ascii_lowercase())?;
                info.documents.retain(|_, document| {
                    document
                        .modules
                        .retain(|owner| !owner.eq_ignore_ascii_case(name));
                    !document.modules.is_empty()
                });
                Some(removed)
            })
        };

        match removed {
            Some(module) => {
                module.types().clear();
                self.unbind_module(domain, name);
                info!(domain, module = name, "module unloaded");
            }
            None => warn!(domain, module = name, "unload of unknown module"),
        }
        EventDisposition::Continue
    }

    fn on_thread_exited(&self, thread: ThreadId) -> EventDisposition {
        self.threads.lock().remove(&thread);
        let mut control = self.control.lock();
        if control.active_thread == Some(thread) {
            control.active_thread = None;
            if let Some(controller) = control.controller.take() {
                self.deactivate(&controller);
            }
        }
        EventDisposition::Continue
    }

    fn on_breakpoint_hit(
        self: &Arc<Self>,
        thread: ThreadId,
        breakpoint: BreakpointHandle,
    ) -> EventDisposition {
        if self.evaluation.is_evaluating() {
            return EventDisposition::Continue;
        }

        let Some(id) = self.breakpoints.lock().id_for_handle(breakpoint) else {
            debug!(thread, handle = breakpoint, "hit of an unknown breakpoint");
            return EventDisposition::Continue;
        };

        let session = Arc::clone(self);
        match self
            .helper
            .enqueue(Box::new(move || session.process_hit(thread, id)))
        {
            Ok(()) => EventDisposition::Stop,
            Err(err) => {
                error!(thread, id, error = %err, "breakpoint hit dropped");
                EventDisposition::Continue
            }
        }
    }

    fn process_hit(&self, thread: ThreadId, id: BreakEventId) -> Result<()> {
        if self.should_continue(thread, id) || self.native.has_queued_callbacks(thread) {
            let resumed = self
                .native
                .set_all_threads_state(ThreadState::Run, None)
                .map_err(Error::from)
                .and_then(|()| self.resume());
            if let Err(err) = resumed {
                self.emit(SessionEvent::Output(format!("Unable to resume the debuggee: {err}")));
                self.halt(thread, StopReason::BreakpointHit(id));
                return Err(err);
            }
            return Ok(());
        }

        self.halt(thread, StopReason::BreakpointHit(id));
        Ok(())
    }

    fn with_info<R>(&self, id: BreakEventId, f: impl FnOnce(&mut BreakEventInfo) -> R) -> Option<R> {
        self.breakpoints.lock().get_mut(id).map(f)
    }

    fn should_continue(&self, thread: ThreadId, id: BreakEventId) -> bool {
        let Some(breakpoint) = self.with_info(id, |info| info.breakpoint().cloned()).flatten()
        else {
            return true;
        };
        if !breakpoint.enabled {
            return true;
        }

        if !self.with_info(id, BreakEventInfo::record_hit).unwrap_or(false) {
            return true;
        }

        if let Some(condition) = breakpoint.condition.as_deref().filter(|c| !c.is_empty()) {
            match self.evaluate(thread, condition) {
                Ok(value) if breakpoint.break_if_condition_changes => {
                    let changed = self
                        .with_info(id, |info| {
                            let changed = info.last_condition_value.as_deref() != Some(value.as_str());
                            info.last_condition_value = Some(value.clone());
                            changed
                        })
                        .unwrap_or(false);
                    if !changed {
                        return true;
                    }
                }
                Ok(value) => {
                    if !value.eq_ignore_ascii_case("true") {
                        return true;
                    }
                }
                Err(err) => {
                    warn!(id, condition, error = %err, "breakpoint condition failed");
                    let message = err.to_string();
                    self.emit(SessionEvent::Output(format!(
                        "Error evaluating breakpoint condition '{condition}': {message}"
                    )));
                    let notification = self.with_info(id, |info| {
                        info.set_status(BreakEventStatus::Invalid, Some(message));
                        status_event(info)
                    });
                    if let Some(notification) = notification {
                        self.emit(notification);
                    }
                    return true;
                }
            }
        }

        if breakpoint.hit_action.contains(HitAction::CUSTOM_ACTION) {
            let handler = self.custom_action.read().clone();
            if let (Some(handler), Some(action)) = (handler, breakpoint.custom_action_id.as_deref()) {
                if handler(action) {
                    return true;
                }
            }
        }

        if breakpoint.hit_action.contains(HitAction::PRINT_TRACE) {
            self.emit(SessionEvent::Output(format!(
                "Breakpoint reached: {}:{}",
                breakpoint.file, breakpoint.line
            )));
        }

        if breakpoint.hit_action.contains(HitAction::PRINT_EXPRESSION) {
            if let Some(template) = breakpoint.trace_expression.as_deref() {
                let value = format_trace(template, |expression| self.evaluate(thread, expression))
                    .unwrap_or_else(|err| err.to_string());
                self.with_info(id, |info| info.last_trace_value = Some(value.clone()));
                self.emit(SessionEvent::TraceValue { id, value });
            }
        }

        !breakpoint.hit_action.contains(HitAction::BREAK)
    }

    fn evaluate(&self, thread: ThreadId, expression: &str) -> Result<String> {
        let evaluator = self
            .evaluator
            .read()
            .clone()
            .ok_or_else(|| Error::NotSupported("No expression evaluator installed".to_string()))?;
        evaluator.evaluate(thread, expression)
    }

    fn on_step_complete(&self, thread: ThreadId, reason: StepReason) -> EventDisposition {
        if self.evaluation.is_evaluating() {
            return EventDisposition::Continue;
        }

        let mut control = self.control.lock();
        let Some(controller) = control
            .controller
            .as_mut()
            .filter(|controller| controller.thread() == thread)
        else {
            drop(control);
            debug!(thread, %reason, "step complete without a stepper");
            self.halt(thread, StopReason::Stepped);
            return EventDisposition::Stop;
        };

        let decision = controller.advance(&SessionContext(self), reason);
        let stepper = controller.stepper();
        drop(control);
        debug!(thread, %reason, ?decision, "step decision");

        match decision {
            StepDecision::Continue(command) => match self.issue(stepper, thread, command) {
                Ok(()) => EventDisposition::Continue,
                Err(err) => {
                    error!(thread, ?command, error = %err, "failed to re-arm the stepper");
                    self.halt(thread, StopReason::Stepped);
                    EventDisposition::Stop
                }
            },
            StepDecision::Stop => {
                self.halt(thread, StopReason::Stepped);
                EventDisposition::Stop
            }
        }
    }

    fn on_exception(&self, thread: ThreadId, kind: ExceptionKind) -> EventDisposition {
        if self.evaluation.is_evaluating() {
            return EventDisposition::Continue;
        }

        let project_only = self.options.project_assemblies_only;
        let stop = match kind {
            ExceptionKind::FirstChance => !project_only && self.catchpoint_hit(thread),
            ExceptionKind::UserFirstChance => project_only && self.catchpoint_hit(thread),
            ExceptionKind::CatchHandlerFound => false,
            ExceptionKind::Unhandled => true,
        };
        if !stop {
            return EventDisposition::Continue;
        }

        let reason = if kind == ExceptionKind::Unhandled {
            StopReason::UnhandledException
        } else {
            StopReason::ExceptionThrown
        };
        self.halt(thread, reason);
        EventDisposition::Stop
    }

    fn catchpoint_hit(&self, thread: ThreadId) -> bool {
        let chain = match self.native.exception_type_chain(thread) {
            Ok(chain) => chain,
            Err(err) => {
                warn!(thread, error = %err, "exception type unavailable");
                return false;
            }
        };

        let mut store = self.breakpoints.lock();
        let matching: Vec<BreakEventId> = store
            .iter()
            .filter(|info| {
                matches!(&info.event, BreakEvent::Catchpoint(catchpoint) if catchpoint.matches(&chain))
            })
            .map(|info| info.id)
            .collect();
        for id in &matching {
            if let Some(info) = store.get_mut(*id) {
                info.record_hit();
            }
        }
        !matching.is_empty()
    }

    fn on_eval_finished(&self, eval: u64, threw: bool) -> EventDisposition {
        self.advance_generation();
        if self.evaluation.complete(eval, threw) {
            EventDisposition::Stop
        } else {
            debug!(eval, "completion of an untracked evaluation");
            EventDisposition::Continue
        }
    }

    fn on_process_exited(&self) -> EventDisposition {
        self.terminated.store(true, Ordering::Release);
        self.evaluation.cancel_all();
        *self.control.lock() = ControlState::default();
        {
            let mut store = self.breakpoints.lock();
            let ids: Vec<BreakEventId> = store.iter().map(|info| info.id).collect();
            for id in ids {
                if let Some(info) = store.get_mut(id) {
                    info.set_status(BreakEventStatus::Disconnected, None);
                }
            }
        }
        info!("debuggee exited");
        self.emit(SessionEvent::Exited);
        self.helper.close();
        EventDisposition::Continue
    }

    /// Tear the session down: deactivate the stepper and all breakpoints and stop the helper
    /// thread.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyDisposed`] on the second call.
    pub fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            error!("session disposed twice");
            return Err(Error::AlreadyDisposed);
        }

        self.terminated.store(true, Ordering::Release);
        self.cancel_stepper();
        self.evaluation.cancel_all();

        let handles: Vec<_> = self
            .breakpoints
            .lock()
            .iter()
            .flat_map(|info| info.bindings.iter().map(|binding| binding.handle))
            .collect();
        for handle in handles {
            if let Err(err) = self.native.activate_breakpoint(handle, false) {
                debug!(handle, error = %err, "breakpoint deactivation failed");
            }
        }

        self.helper.shutdown();
        info!("session disposed");
        Ok(())
    }
}

struct SessionContext<'a>(&'a DebuggerSession);

impl StepContext for SessionContext<'_> {
    fn is_evaluating(&self) -> bool {
        self.0.evaluation.is_evaluating()
    }

    fn has_queued_callbacks(&self, thread: ThreadId) -> bool {
        self.0.native.has_queued_callbacks(thread)
    }

    fn frame(&self, thread: ThreadId) -> FrameView {
        self.0.frame_view(thread)
    }
}

fn defines_type(module: &ModuleInfo, name: &str) -> bool {
    !module.types().type_token_from_name(name).is_not_found()
}

fn status_event(info: &BreakEventInfo) -> SessionEvent {
    SessionEvent::BreakpointStatus {
        id: info.id,
        status: info.status,
        message: info.message.clone(),
    }
}
