//! Source breakpoints and catchpoints.
//!
//! # Resolution
//!
//! [`BreakpointResolver`] maps a requested `(document, line, column)` to one sequence point
//! among all points of the candidate methods:
//!
//! 1. The smallest point containing the request wins.
//! 2. Otherwise, among points starting on the requested line at or before the column, the one
//!    ending furthest right is the left-side candidate; among points starting on or after the
//!    requested line, the earliest is the right-side candidate.
//! 3. The right-side candidate is taken when it starts on a later line or no left-side
//!    candidate exists; otherwise the left-side candidate is taken.
//!
//! Hidden points never take part. The chosen point may start elsewhere than requested; the
//! binding reports its start as the corrected position.
//!
//! # Bookkeeping
//!
//! Every inserted request gets a [`BreakEventInfo`] holding its status, hit count and the
//! native breakpoints created for it, one per module that shares the document.

use std::{collections::HashMap, sync::Arc};

use bitflags::bitflags;
use strum::Display;

use crate::{
    debugger::native::{AppDomainId, BindingFailure, BreakpointHandle, NativeError},
    metadata::{
        sequencepoints::{SequencePoint, SequencePointIndex},
        token::Token,
    },
    Result,
};

/// The point a request resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Method holding the point
    pub method: Token,
    /// IL offset of the point
    pub offset: u32,
    /// The chosen point
    pub point: SequencePoint,
}

/// Accumulates candidates for one request across methods.
#[derive(Debug)]
pub struct BreakpointResolver<'a> {
    document: &'a str,
    line: u32,
    column: u32,
    containing: Option<(Token, &'a SequencePoint)>,
    left: Option<(Token, &'a SequencePoint)>,
    right: Option<(Token, &'a SequencePoint)>,
}

impl<'a> BreakpointResolver<'a> {
    /// Start resolving `(line, column)` in `document`.
    #[must_use]
    pub fn new(document: &'a str, line: u32, column: u32) -> Self {
        BreakpointResolver {
            document,
            line,
            column,
            containing: None,
            left: None,
            right: None,
        }
    }

    /// Resolve against all points of `methods`.
    pub fn resolve<I>(document: &'a str, line: u32, column: u32, methods: I) -> Option<Resolution>
    where
        I: IntoIterator<Item = &'a SequencePointIndex>,
    {
        let mut resolver = BreakpointResolver::new(document, line, column);
        for index in methods {
            resolver.consider(index);
        }
        resolver.finish()
    }

    /// Add the points of one method.
    pub fn consider(&mut self, index: &'a SequencePointIndex) {
        let method = index.method();
        let containing = index.find_containing(self.document, self.line, self.column);
        for &point in containing.iter().filter(|point| !point.is_special()) {
            let smaller = self
                .containing
                .map_or(true, |(_, best)| best.contains_start_of(point));
            if smaller {
                self.containing = Some((method, point));
            }
        }

        let same_document = index
            .points()
            .iter()
            .filter(|point| !point.is_special() && point.same_document(self.document));
        for point in same_document {
            if containing.iter().any(|inside| std::ptr::eq(*inside, point)) {
                continue;
            }
            if point.start_line == self.line && point.start_column <= self.column {
                let wider = self
                    .left
                    .map_or(true, |(_, best)| best.end_column < point.end_column);
                if wider {
                    self.left = Some((method, point));
                }
            } else if point.start_line >= self.line {
                let earlier = self.right.map_or(true, |(_, best)| {
                    (point.start_line, point.start_column) < (best.start_line, best.start_column)
                });
                if earlier {
                    self.right = Some((method, point));
                }
            }
        }
    }

    /// The chosen point, if any candidate was seen.
    #[must_use]
    pub fn finish(self) -> Option<Resolution> {
        let same_line = match (self.left, self.right) {
            (left, Some(right)) if left.is_none() || right.1.start_line > self.line => Some(right),
            (left, _) => left,
        };

        self.containing
            .or(same_line)
            .map(|(method, point)| Resolution {
                method,
                offset: point.offset,
                point: point.clone(),
            })
    }
}

/// One native breakpoint to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleBinding {
    /// Domain of the module
    pub domain: AppDomainId,
    /// Module name
    pub module: Arc<str>,
    /// Method holding the point
    pub method: Token,
    /// IL offset
    pub offset: u32,
}

/// Outcome of binding a source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingResult {
    /// At least one module has code at the position
    Bound {
        /// Line the position snapped to
        line: u32,
        /// Column the position snapped to
        column: u32,
        /// One binding per module sharing the document
        bindings: Vec<ModuleBinding>,
    },
    /// The document is known but the position has no code
    Invalid(String),
    /// No loaded module knows the document
    NotBound(String),
}

/// Status of an inserted break event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Default)]
pub enum BreakEventStatus {
    /// At least one native breakpoint exists
    Bound,
    /// The position cannot hold a breakpoint
    Invalid,
    /// Waiting for a module that knows the document
    #[default]
    NotBound,
    /// The engine rejected the breakpoint for a transient reason
    BindError,
    /// The session went away
    Disconnected,
}

/// When a hit counts as a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HitCondition {
    /// On exactly the n-th hit
    Equal(u32),
    /// On the n-th and every later hit
    AtLeast(u32),
    /// After the n-th hit
    GreaterThan(u32),
}

impl HitCondition {
    /// Returns true if `hit_count` hits satisfy the condition.
    #[must_use]
    pub fn is_reached(self, hit_count: u32) -> bool {
        match self {
            HitCondition::Equal(target) => hit_count == target,
            HitCondition::AtLeast(target) => hit_count >= target,
            HitCondition::GreaterThan(target) => hit_count > target,
        }
    }
}

bitflags! {
    /// What happens when a breakpoint is hit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HitAction: u8 {
        /// Stop the debuggee
        const BREAK = 0x01;
        /// Log "Breakpoint reached: file:line"
        const PRINT_TRACE = 0x02;
        /// Log the formatted trace template
        const PRINT_EXPRESSION = 0x04;
        /// Run the front end's custom action
        const CUSTOM_ACTION = 0x08;
    }
}

impl Default for HitAction {
    fn default() -> Self {
        HitAction::BREAK
    }
}

/// A source line breakpoint request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    /// Document URL
    pub file: String,
    /// Requested line
    pub line: u32,
    /// Requested column
    pub column: u32,
    /// Enabled flag
    pub enabled: bool,
    /// Condition expression
    pub condition: Option<String>,
    /// Stop when the condition's value changes instead of when it is true
    pub break_if_condition_changes: bool,
    /// Hit count filter
    pub hit_condition: Option<HitCondition>,
    /// Actions taken on a hit
    pub hit_action: HitAction,
    /// Trace template for [`HitAction::PRINT_EXPRESSION`]
    pub trace_expression: Option<String>,
    /// Identifier passed to the custom action handler
    pub custom_action_id: Option<String>,
}

impl Breakpoint {
    /// An enabled, unconditional breakpoint.
    #[must_use]
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Breakpoint {
            file: file.into(),
            line,
            column,
            enabled: true,
            condition: None,
            break_if_condition_changes: false,
            hit_condition: None,
            hit_action: HitAction::BREAK,
            trace_expression: None,
            custom_action_id: None,
        }
    }
}

/// An exception stop request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catchpoint {
    /// Full name of the exception type
    pub exception_name: String,
    /// Also stop for derived exception types
    pub include_subclasses: bool,
    /// Enabled flag
    pub enabled: bool,
}

impl Catchpoint {
    /// An enabled catchpoint for `exception_name` and its subclasses.
    #[must_use]
    pub fn new(exception_name: impl Into<String>) -> Self {
        Catchpoint {
            exception_name: exception_name.into(),
            include_subclasses: true,
            enabled: true,
        }
    }

    /// Returns true if an exception whose type chain is `chain` (most derived first) matches.
    #[must_use]
    pub fn matches(&self, chain: &[String]) -> bool {
        if !self.enabled {
            return false;
        }
        match chain.first() {
            Some(exact) if *exact == self.exception_name => true,
            Some(_) => {
                self.include_subclasses && chain.iter().any(|name| *name == self.exception_name)
            }
            None => false,
        }
    }
}

/// An inserted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakEvent {
    /// Source line breakpoint
    Breakpoint(Breakpoint),
    /// Exception catchpoint
    Catchpoint(Catchpoint),
}

impl BreakEvent {
    /// Enabled flag of either kind.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        match self {
            BreakEvent::Breakpoint(breakpoint) => breakpoint.enabled,
            BreakEvent::Catchpoint(catchpoint) => catchpoint.enabled,
        }
    }
}

/// Identifier of an inserted request.
pub type BreakEventId = u32;

/// A native breakpoint created for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeBinding {
    /// Engine handle
    pub handle: BreakpointHandle,
    /// Domain of the module
    pub domain: AppDomainId,
    /// Module the breakpoint lives in
    pub module: Arc<str>,
}

/// Binding state of one inserted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakEventInfo {
    /// Identifier
    pub id: BreakEventId,
    /// The request
    pub event: BreakEvent,
    /// Binding status
    pub status: BreakEventStatus,
    /// Message accompanying the status
    pub message: Option<String>,
    /// Hits so far
    pub hit_count: u32,
    /// Last value of the condition, for change-triggered breakpoints
    pub last_condition_value: Option<String>,
    /// Last formatted trace message
    pub last_trace_value: Option<String>,
    /// Line the request snapped to, if different from the requested line
    pub adjusted_line: Option<u32>,
    /// Native breakpoints
    pub bindings: Vec<NativeBinding>,
}

impl BreakEventInfo {
    /// A fresh, unbound record.
    #[must_use]
    pub fn new(id: BreakEventId, event: BreakEvent) -> Self {
        BreakEventInfo {
            id,
            event,
            status: BreakEventStatus::NotBound,
            message: None,
            hit_count: 0,
            last_condition_value: None,
            last_trace_value: None,
            adjusted_line: None,
            bindings: Vec::new(),
        }
    }

    /// Update status and message.
    pub fn set_status(&mut self, status: BreakEventStatus, message: Option<String>) {
        self.status = status;
        self.message = message;
    }

    /// Record a native failure the way the engine binding reports it.
    pub fn set_native_failure(&mut self, error: NativeError) {
        let (failure, message) = error.binding_status();
        let status = match failure {
            BindingFailure::Invalid => BreakEventStatus::Invalid,
            BindingFailure::BindError => BreakEventStatus::BindError,
        };
        self.set_status(status, Some(message));
    }

    /// Count a hit and report whether the hit condition is met.
    pub fn record_hit(&mut self) -> bool {
        self.hit_count = self.hit_count.saturating_add(1);
        match &self.event {
            BreakEvent::Breakpoint(breakpoint) => breakpoint
                .hit_condition
                .map_or(true, |condition| condition.is_reached(self.hit_count)),
            BreakEvent::Catchpoint(_) => true,
        }
    }

    /// The breakpoint request, if this is one.
    #[must_use]
    pub fn breakpoint(&self) -> Option<&Breakpoint> {
        match &self.event {
            BreakEvent::Breakpoint(breakpoint) => Some(breakpoint),
            BreakEvent::Catchpoint(_) => None,
        }
    }
}

/// The breakpoint table: requests by id and native handles back to requests.
#[derive(Debug, Default)]
pub struct BreakpointStore {
    next_id: BreakEventId,
    events: HashMap<BreakEventId, BreakEventInfo>,
    handles: HashMap<BreakpointHandle, BreakEventId>,
}

impl BreakpointStore {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        BreakpointStore::default()
    }

    /// Reserve the next identifier.
    pub fn next_id(&mut self) -> BreakEventId {
        self.next_id = self.next_id.wrapping_add(1);
        self.next_id
    }

    /// Insert or replace a record, indexing its native handles.
    pub fn insert(&mut self, info: BreakEventInfo) {
        if let Some(previous) = self.events.remove(&info.id) {
            for binding in &previous.bindings {
                self.handles.remove(&binding.handle);
            }
        }
        for binding in &info.bindings {
            self.handles.insert(binding.handle, info.id);
        }
        self.events.insert(info.id, info);
    }

    /// Remove a record.
    pub fn remove(&mut self, id: BreakEventId) -> Option<BreakEventInfo> {
        let info = self.events.remove(&id)?;
        for binding in &info.bindings {
            self.handles.remove(&binding.handle);
        }
        Some(info)
    }

    /// A record by id.
    #[must_use]
    pub fn get(&self, id: BreakEventId) -> Option<&BreakEventInfo> {
        self.events.get(&id)
    }

    /// A mutable record by id.
    pub fn get_mut(&mut self, id: BreakEventId) -> Option<&mut BreakEventInfo> {
        self.events.get_mut(&id)
    }

    /// The request a native breakpoint belongs to.
    #[must_use]
    pub fn id_for_handle(&self, handle: BreakpointHandle) -> Option<BreakEventId> {
        self.handles.get(&handle).copied()
    }

    /// All records, unordered.
    pub fn iter(&self) -> impl Iterator<Item = &BreakEventInfo> {
        self.events.values()
    }

    /// Ids of the source breakpoints on `document`.
    #[must_use]
    pub fn breakpoints_in(&self, document: &str) -> Vec<BreakEventId> {
        let mut ids: Vec<BreakEventId> = self
            .events
            .values()
            .filter(|info| {
                info.breakpoint()
                    .is_some_and(|breakpoint| breakpoint.file.eq_ignore_ascii_case(document))
            })
            .map(|info| info.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if no request is inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Expand a trace template.
///
/// `{expr}` is replaced by the value `evaluate` returns for `expr`; `{{` is a literal `{`. An
/// opening brace with no closing brace ends the expansion and the rest is copied verbatim.
///
/// # Errors
/// Returns the first error of `evaluate`.
pub fn format_trace<F>(template: &str, mut evaluate: F) -> Result<String>
where
    F: FnMut(&str) -> Result<String>,
{
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        if rest[open + 1..].starts_with('{') {
            output.push_str(&rest[..=open]);
            rest = &rest[open + 2..];
            continue;
        }

        let Some(close) = rest[open + 1..].find('}') else {
            break;
        };
        let expression = &rest[open + 1..open + 1 + close];
        let value = evaluate(expression)?;

        output.push_str(&rest[..open]);
        output.push_str(&value);
        rest = &rest[open + close + 2..];
    }

    output.push_str(rest);
    Ok(output)
}
