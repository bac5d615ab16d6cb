//! The per-thread stepping state machine.
//!
//! A [`StepController`] is created for the active thread together with its native stepper.
//! Each "step complete" notification is fed to [`StepController::advance`], which decides
//! whether the user sees a stop or the stepper is re-armed and the process resumed. The
//! controller never talks to the engine itself: it returns a [`StepDecision`] and the session
//! issues the command.
//!
//! Decision order, first match wins:
//!
//! 1. an evaluation is running: continue
//! 2. more callbacks are queued for the thread: continue
//! 3. the previous decision armed auto step-into: step into the next line
//! 4. the method is a stepper boundary: continue
//! 5. no sequence point covers the frame: single step into and arm auto step-into
//! 6. the method is stepped through: run through the whole method
//! 7. a property accessor or operator was entered: step out and arm auto step-into
//! 8. the current point is hidden: step over the next line
//! 9. returned from a stepped-through method: step into the next line
//! 10. stop

use crate::{
    debugger::{
        native::{FrameInfo, StepReason, StepperHandle, ThreadId},
        options::SessionOptions,
    },
    metadata::{customattributes::DebugAttributes, sequencepoints::SequencePoint},
};

/// Where the stepper stands between two notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepperState {
    /// No step in progress
    #[default]
    Idle,
    /// A user-requested step is running
    Active {
        /// Calls are stepped into
        into: bool,
    },
    /// The next notification re-issues a step into
    AutoStepInto,
    /// A stepped-through method was entered; its return continues transparently
    AwaitingHiddenReturn,
}

/// What the session must issue before resuming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCommand {
    /// Resume without re-arming the stepper
    Resume,
    /// Step over the IL range of the current source line
    Line {
        /// Calls are stepped into
        into: bool,
    },
    /// Step a single instruction
    Instruction {
        /// Calls are stepped into
        into: bool,
    },
    /// Step into calls across the whole current method
    ThroughMethod,
    /// Step out of the current frame
    Out,
}

/// Result of one step notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepDecision {
    /// Issue the command and let the process run
    Continue(StepCommand),
    /// Report a stop to the user
    Stop,
}

/// Facts about the innermost frame of the stepping thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameView {
    /// The native frame, if the thread has a managed frame
    pub frame: Option<FrameInfo>,
    /// Debugger attributes on the method itself
    pub method_attributes: DebugAttributes,
    /// Debugger attributes on the declaring type
    pub type_attributes: DebugAttributes,
    /// The method is a special-name `get_`, `set_` or `op_` method
    pub property_or_operator: bool,
    /// The last sequence point at or before the IL offset, hidden or not
    pub sequence_point: Option<SequencePoint>,
}

impl FrameView {
    /// Returns true if the method or its type hides it from the stepper.
    #[must_use]
    pub fn is_step_through(&self, project_assemblies_only: bool) -> bool {
        let mut hiding = DebugAttributes::HIDDEN | DebugAttributes::STEP_THROUGH;
        if project_assemblies_only {
            hiding |= DebugAttributes::NON_USER_CODE;
        }
        (self.method_attributes | self.type_attributes).intersects(hiding)
    }
}

/// Session state the controller consults.
pub trait StepContext {
    /// Returns true while a function evaluation runs.
    fn is_evaluating(&self) -> bool;
    /// Returns true if the engine holds more callbacks for `thread`.
    fn has_queued_callbacks(&self, thread: ThreadId) -> bool;
    /// Facts about the innermost frame of `thread`.
    fn frame(&self, thread: ThreadId) -> FrameView;
}

/// Stepping state of the active thread.
#[derive(Debug, Clone)]
pub struct StepController {
    thread: ThreadId,
    stepper: StepperHandle,
    state: StepperState,
    options: SessionOptions,
}

impl StepController {
    /// A controller for `thread` driving the native `stepper`.
    #[must_use]
    pub fn new(thread: ThreadId, stepper: StepperHandle, options: SessionOptions) -> Self {
        StepController {
            thread,
            stepper,
            state: StepperState::Idle,
            options,
        }
    }

    /// The stepping thread.
    #[must_use]
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// The native stepper.
    #[must_use]
    pub fn stepper(&self) -> StepperHandle {
        self.stepper
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> StepperState {
        self.state
    }

    /// Record that the user started a step.
    pub fn begin(&mut self, into: bool) {
        self.state = StepperState::Active { into };
    }

    /// Drop any pending continuation.
    pub fn cancel(&mut self) {
        self.state = StepperState::Idle;
    }

    /// Decide what a "step complete" notification for this thread means.
    pub fn advance(&mut self, context: &dyn StepContext, reason: StepReason) -> StepDecision {
        if context.is_evaluating() {
            return StepDecision::Continue(StepCommand::Resume);
        }

        let previous = std::mem::replace(&mut self.state, StepperState::Idle);

        if context.has_queued_callbacks(self.thread) {
            return StepDecision::Continue(StepCommand::Resume);
        }

        if previous == StepperState::AutoStepInto {
            self.state = StepperState::Active { into: true };
            return StepDecision::Continue(StepCommand::Line { into: true });
        }

        let view = context.frame(self.thread);

        if view
            .method_attributes
            .contains(DebugAttributes::STEPPER_BOUNDARY)
        {
            return StepDecision::Continue(StepCommand::Resume);
        }

        let Some(point) = view.sequence_point.as_ref() else {
            self.state = StepperState::AutoStepInto;
            return StepDecision::Continue(StepCommand::Instruction { into: true });
        };

        if view.is_step_through(self.options.project_assemblies_only) {
            if reason == StepReason::Call {
                self.state = StepperState::AwaitingHiddenReturn;
            } else {
                self.state = StepperState::Active { into: true };
            }
            return StepDecision::Continue(StepCommand::ThroughMethod);
        }

        let compiler_generated = view
            .method_attributes
            .contains(DebugAttributes::COMPILER_GENERATED);
        if (self.options.step_over_properties_and_operators || compiler_generated)
            && view.property_or_operator
            && reason == StepReason::Call
        {
            self.state = StepperState::AutoStepInto;
            return StepDecision::Continue(StepCommand::Out);
        }

        if point.is_special() {
            self.state = StepperState::Active { into: false };
            return StepDecision::Continue(StepCommand::Line { into: false });
        }

        if previous == StepperState::AwaitingHiddenReturn && reason == StepReason::Return {
            self.state = StepperState::Active { into: true };
            return StepDecision::Continue(StepCommand::Line { into: true });
        }

        StepDecision::Stop
    }
}
