//! End-to-end debugging scenarios driven through the public session API.
//!
//! The debuggee is a single module with this source:
//!
//! ```text
//! 10      static void Main() {
//! 11          Helper.Step();                          // [DebuggerStepThrough]
//! 12          var value = Value;                      // property getter
//! 13          Console.WriteLine(value);
//! 14      }
//! 20      [DebuggerStepThrough] static void Step() { }
//! 22      static int Value { get { return 42; } }
//! ```

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use corscope::{
    debugger::{
        native::{
            AppDomainId, BreakpointHandle, EvalHandle, NativeResult, StepRange, StepperHandle,
            ThreadState,
        },
        BreakEventStatus, ExceptionKind, FrameInfo, NativeError, StepReason, ThreadId,
    },
    metadata::{
        importer::{FieldProps, MethodProps, PropertyProps, TypeDefProps, TypeRefProps},
        sequencepoints::{SequencePointArrays, END_OF_METHOD},
    },
    prelude::*,
};
use parking_lot::Mutex;

const PROGRAM: &str = "/src/App/Program.cs";
const PROGRAM_TYPE: u32 = 0x0200_0002;
const MAIN: u32 = 0x0600_0001;
const STEP: u32 = 0x0600_0002;
const GET_VALUE: u32 = 0x0600_0003;
const THREAD: ThreadId = 4242;

struct AppMetadata;

impl AppMetadata {
    fn method(token: Token) -> Option<MethodProps> {
        let (name, flags) = match token.value() {
            MAIN => ("Main", 0x0016),
            STEP => ("Step", 0x0016),
            GET_VALUE => ("get_Value", 0x0816),
            _ => return None,
        };
        Some(MethodProps {
            declaring_type: Token::new(PROGRAM_TYPE),
            name: name.to_string(),
            flags,
            signature: vec![0x00, 0x00, 0x01],
        })
    }
}

impl MetadataImporter for AppMetadata {
    fn is_valid_token(&self, token: Token) -> bool {
        matches!(token.value(), PROGRAM_TYPE | 0x0100_0001) || Self::method(token).is_some()
    }

    fn type_def_props(&self, token: Token) -> Result<TypeDefProps> {
        if token.value() != PROGRAM_TYPE {
            return Err(Error::NotFound(token.to_string()));
        }
        Ok(TypeDefProps {
            name: "App.Program".to_string(),
            flags: 0x0010_0001,
            extends: Token::new(0x0100_0001),
        })
    }

    fn type_ref_props(&self, token: Token) -> Result<TypeRefProps> {
        if token.value() != 0x0100_0001 {
            return Err(Error::NotFound(token.to_string()));
        }
        Ok(TypeRefProps {
            name: "System.Object".to_string(),
            resolution_scope: Token::new(0x2300_0001),
        })
    }

    fn type_spec_blob(&self, token: Token) -> Result<Vec<u8>> {
        Err(Error::NotFound(token.to_string()))
    }

    fn enclosing_class(&self, _token: Token) -> Option<Token> {
        None
    }

    fn method_props(&self, token: Token) -> Result<MethodProps> {
        Self::method(token).ok_or_else(|| Error::NotFound(token.to_string()))
    }

    fn field_props(&self, token: Token) -> Result<FieldProps> {
        Err(Error::NotFound(token.to_string()))
    }

    fn property_props(&self, token: Token) -> Result<PropertyProps> {
        Err(Error::NotFound(token.to_string()))
    }

    fn enum_fields(&self, _type_token: Token) -> Vec<Token> {
        Vec::new()
    }

    fn enum_methods(&self, type_token: Token) -> Vec<Token> {
        if type_token.value() == PROGRAM_TYPE {
            vec![Token::new(MAIN), Token::new(STEP), Token::new(GET_VALUE)]
        } else {
            Vec::new()
        }
    }

    fn enum_properties(&self, _type_token: Token) -> Vec<Token> {
        Vec::new()
    }

    fn enum_interfaces(&self, _type_token: Token) -> Vec<Token> {
        Vec::new()
    }

    fn enum_generic_params(&self, _owner: Token) -> Vec<String> {
        Vec::new()
    }

    fn custom_attribute_by_name(&self, owner: Token, attribute_name: &str) -> Option<Vec<u8>> {
        (owner.value() == STEP
            && attribute_name == "System.Diagnostics.DebuggerStepThroughAttribute")
            .then(|| vec![0x01, 0x00, 0x00, 0x00])
    }

    fn find_type_def_by_name(&self, name: &str, enclosing: Token) -> Option<Token> {
        (name == "App.Program" && enclosing == Token::GLOBAL).then(|| Token::new(PROGRAM_TYPE))
    }
}

struct AppSymbols;

impl AppSymbols {
    // (offset, line, column, end column)
    fn points(method: Token) -> &'static [(u32, u32, u32, u32)] {
        match method.value() {
            MAIN => &[
                (0x00, 10, 28, 29),
                (0x01, 11, 9, 23),
                (0x07, 12, 9, 27),
                (0x0D, 13, 9, 34),
                (0x13, 14, 5, 6),
            ],
            STEP => &[(0x00, 20, 48, 49)],
            GET_VALUE => &[(0x00, 22, 33, 43)],
            _ => &[],
        }
    }
}

impl SymbolProvider for AppSymbols {
    fn documents(&self) -> Vec<Arc<str>> {
        vec![Arc::from(PROGRAM)]
    }

    fn sequence_points(&self, method: Token) -> Option<SequencePointArrays> {
        let points = Self::points(method);
        if points.is_empty() {
            return None;
        }
        Some(SequencePointArrays {
            offsets: points.iter().map(|p| p.0).collect(),
            documents: points.iter().map(|_| Arc::from(PROGRAM)).collect(),
            lines: points.iter().map(|p| p.1).collect(),
            columns: points.iter().map(|p| p.2).collect(),
            end_lines: points.iter().map(|p| p.1).collect(),
            end_columns: points.iter().map(|p| p.3).collect(),
        })
    }

    fn methods_in_document(&self, document: &str, line: u32) -> Vec<Token> {
        if !document.eq_ignore_ascii_case(PROGRAM) {
            return Vec::new();
        }
        let method = match line {
            10..=14 => MAIN,
            20 => STEP,
            22 => GET_VALUE,
            _ => return Vec::new(),
        };
        vec![Token::new(method)]
    }

    fn closest_line(&self, document: &str, line: u32) -> Result<u32> {
        [10, 11, 12, 13, 14, 20, 22]
            .into_iter()
            .find(|candidate| *candidate >= line && document.eq_ignore_ascii_case(PROGRAM))
            .ok_or_else(|| Error::NotFound(format!("{document}:{line}")))
    }
}

/// The engine side: records commands as text and answers frame queries from a script.
#[derive(Default)]
struct Engine {
    log: Mutex<Vec<String>>,
    frame: Mutex<Option<FrameInfo>>,
    exception: Mutex<Vec<String>>,
    handles: AtomicU64,
}

impl Engine {
    fn at(&self, method: u32, il_offset: u32) {
        *self.frame.lock() = Some(FrameInfo {
            domain: 1,
            module: Arc::from("App.dll"),
            method: Token::new(method),
            il_offset,
        });
    }

    fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.lock())
    }

    fn push(&self, entry: String) -> NativeResult<()> {
        self.log.lock().push(entry);
        Ok(())
    }
}

impl NativeDebugControl for Engine {
    fn create_stepper(&self, thread: ThreadId) -> NativeResult<StepperHandle> {
        self.push(format!("create_stepper {thread}"))?;
        Ok(100 + self.handles.fetch_add(1, Ordering::Relaxed))
    }

    fn deactivate_stepper(&self, _stepper: StepperHandle) -> NativeResult<()> {
        self.push("deactivate_stepper".to_string())
    }

    fn step(&self, _stepper: StepperHandle, into: bool) -> NativeResult<()> {
        self.push(format!("step into={into}"))
    }

    fn step_range(&self, _stepper: StepperHandle, into: bool, ranges: &[StepRange]) -> NativeResult<()> {
        let ranges: Vec<String> = ranges
            .iter()
            .map(|range| format!("{:#x}..{:#x}", range.start_offset, range.end_offset))
            .collect();
        self.push(format!("step_range into={into} {}", ranges.join(",")))
    }

    fn step_out(&self, _stepper: StepperHandle) -> NativeResult<()> {
        self.push("step_out".to_string())
    }

    fn set_all_threads_state(&self, state: ThreadState, except: Option<ThreadId>) -> NativeResult<()> {
        self.push(format!("threads {state:?} except {except:?}"))
    }

    fn continue_process(&self) -> NativeResult<()> {
        self.push("continue".to_string())
    }

    fn stop_process(&self) -> NativeResult<()> {
        self.push("stop".to_string())
    }

    fn threads(&self) -> NativeResult<Vec<ThreadId>> {
        Ok(vec![THREAD])
    }

    fn has_queued_callbacks(&self, _thread: ThreadId) -> bool {
        false
    }

    fn active_frame(&self, _thread: ThreadId) -> NativeResult<Option<FrameInfo>> {
        Ok(self.frame.lock().clone())
    }

    fn set_ip(&self, _thread: ThreadId, il_offset: u32) -> NativeResult<()> {
        self.push(format!("set_ip {il_offset:#x}"))
    }

    fn create_breakpoint(
        &self,
        _domain: AppDomainId,
        module: &str,
        method: Token,
        il_offset: u32,
    ) -> NativeResult<BreakpointHandle> {
        if il_offset == 0x13 {
            return Err(NativeError::CodeNotAvailable);
        }
        self.push(format!("breakpoint {module} {method} {il_offset:#x}"))?;
        Ok(self.handles.fetch_add(1, Ordering::Relaxed))
    }

    fn activate_breakpoint(&self, _breakpoint: BreakpointHandle, _active: bool) -> NativeResult<()> {
        Ok(())
    }

    fn exception_type_chain(&self, _thread: ThreadId) -> NativeResult<Vec<String>> {
        Ok(self.exception.lock().clone())
    }

    fn abort_eval(&self, _eval: EvalHandle) -> NativeResult<()> {
        Ok(())
    }

    fn rude_abort_eval(&self, _eval: EvalHandle) -> NativeResult<()> {
        Ok(())
    }
}

fn start(options: SessionOptions) -> (Arc<DebuggerSession>, Arc<Engine>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let engine = Arc::new(Engine::default());
    let session = DebuggerSession::new(engine.clone(), options).unwrap();
    for event in [
        NativeEvent::AppDomainCreated {
            domain: 1,
            name: "DefaultDomain".to_string(),
        },
        NativeEvent::ModuleLoaded {
            domain: 1,
            module: LoadedModule {
                name: Arc::from("App.dll"),
                importer: Arc::new(AppMetadata),
                symbols: Some(Arc::new(AppSymbols)),
            },
        },
        NativeEvent::ThreadCreated { thread: THREAD },
    ] {
        assert_eq!(session.handle_event(event), EventDisposition::Continue);
    }
    (session, engine)
}

fn stop_at_line(session: &Arc<DebuggerSession>, engine: &Engine, line: u32, il_offset: u32) -> BreakEventId {
    let id = session.insert_breakpoint(Breakpoint::new(PROGRAM, line, 1));
    let info = session.breakpoint_info(id).unwrap();
    assert_eq!(info.status, BreakEventStatus::Bound);

    engine.at(MAIN, il_offset);
    let disposition = session.handle_event(NativeEvent::BreakpointHit {
        thread: THREAD,
        breakpoint: info.bindings[0].handle,
    });
    assert_eq!(disposition, EventDisposition::Stop);
    assert_eq!(next_stop(session), (StopReason::BreakpointHit(id), line));
    engine.take_log();
    id
}

fn next_stop(session: &DebuggerSession) -> (StopReason, u32) {
    loop {
        match session.events().recv_timeout(Duration::from_secs(5)) {
            Ok(SessionEvent::Stopped { reason, thread }) => {
                return (reason, thread.location.map_or(0, |point| point.start_line))
            }
            Ok(_) => {}
            Err(err) => panic!("debuggee never stopped: {err}"),
        }
    }
}

fn step_complete(session: &Arc<DebuggerSession>, reason: StepReason) -> EventDisposition {
    session.handle_event(NativeEvent::StepComplete {
        thread: THREAD,
        reason,
    })
}

#[test]
fn module_load_output() {
    let (session, _) = start(SessionOptions::default());
    let output: Vec<String> = session
        .events()
        .try_iter()
        .filter_map(|event| match event {
            SessionEvent::Output(text) => Some(text),
            _ => None,
        })
        .collect();

    assert_eq!(
        output,
        vec![
            "Loaded application domain 'DefaultDomain (id 1)'",
            "Loading module App.dll",
            "Symbols for module App.dll loaded",
            "Started Thread 4242",
        ]
    );
    assert!(!session.is_external_code(PROGRAM));
    assert!(session.is_external_code("/usr/share/dotnet/Console.cs"));
}

#[test]
fn step_into_skips_step_through_methods() {
    let (session, engine) = start(SessionOptions::default());
    stop_at_line(&session, &engine, 11, 0x01);

    session.step_line(true).unwrap();
    assert_eq!(
        engine.take_log(),
        vec![
            "create_stepper 4242",
            "step_range into=true 0x1..0x7",
            "threads Run except None",
            "continue",
        ]
    );

    // entered Helper.Step, which is [DebuggerStepThrough]
    engine.at(STEP, 0x00);
    assert_eq!(step_complete(&session, StepReason::Call), EventDisposition::Continue);
    assert_eq!(
        engine.take_log(),
        vec![format!("step_range into=true 0x0..{END_OF_METHOD:#x}")]
    );

    // back in Main, in the middle of line 11
    engine.at(MAIN, 0x06);
    assert_eq!(step_complete(&session, StepReason::Return), EventDisposition::Continue);
    assert_eq!(engine.take_log(), vec!["step_range into=true 0x1..0x7"]);

    engine.at(MAIN, 0x07);
    assert_eq!(step_complete(&session, StepReason::Normal), EventDisposition::Stop);
    assert_eq!(next_stop(&session), (StopReason::Stepped, 12));
}

#[test]
fn step_into_property_returns_to_caller() {
    let (session, engine) = start(SessionOptions::default());
    stop_at_line(&session, &engine, 12, 0x07);

    session.step_line(true).unwrap();
    engine.take_log();

    engine.at(GET_VALUE, 0x00);
    assert_eq!(step_complete(&session, StepReason::Call), EventDisposition::Continue);
    assert_eq!(engine.take_log(), vec!["step_out"]);

    engine.at(MAIN, 0x0C);
    assert_eq!(step_complete(&session, StepReason::Return), EventDisposition::Continue);
    assert_eq!(engine.take_log(), vec!["step_range into=true 0x7..0xd"]);

    engine.at(MAIN, 0x0D);
    assert_eq!(step_complete(&session, StepReason::Normal), EventDisposition::Stop);
    assert_eq!(next_stop(&session), (StopReason::Stepped, 13));
}

#[test]
fn step_into_property_when_allowed() {
    let (session, engine) = start(SessionOptions::permissive());
    stop_at_line(&session, &engine, 12, 0x07);

    session.step_line(true).unwrap();
    engine.at(GET_VALUE, 0x00);
    assert_eq!(step_complete(&session, StepReason::Call), EventDisposition::Stop);
    assert_eq!(next_stop(&session), (StopReason::Stepped, 22));
}

#[test]
fn step_out_and_set_next_statement() {
    let (session, engine) = start(SessionOptions::default());
    stop_at_line(&session, &engine, 13, 0x0D);

    session.set_next_statement(THREAD, PROGRAM, 11, 12).unwrap();
    assert_eq!(engine.take_log(), vec!["set_ip 0x1"]);
    assert_eq!(next_stop(&session).0, StopReason::NextStatementSet);

    session.step_out().unwrap();
    assert_eq!(
        engine.take_log(),
        vec![
            "create_stepper 4242",
            "step_out",
            "threads Run except None",
            "continue",
        ]
    );
}

#[test]
fn breakpoint_positions_are_corrected() {
    let (session, _) = start(SessionOptions::default());

    match session.bind_breakpoint(PROGRAM, 15, 1) {
        BindingResult::Bound { line, column, .. } => assert_eq!((line, column), (20, 48)),
        other => panic!("unexpected {other:?}"),
    }

    // the engine cannot place a breakpoint on the closing brace
    let id = session.insert_breakpoint(Breakpoint::new(PROGRAM, 14, 5));
    let info = session.breakpoint_info(id).unwrap();
    assert_eq!(info.status, BreakEventStatus::BindError);
    assert_eq!(info.message.as_deref(), Some("Module is not loaded"));

    let id = session.insert_breakpoint(Breakpoint::new("/src/App/Missing.cs", 3, 1));
    assert_eq!(
        session.breakpoint_info(id).unwrap().status,
        BreakEventStatus::NotBound
    );
}

#[test]
fn unhandled_exception_then_exit() {
    let (session, engine) = start(SessionOptions::default());
    engine.at(MAIN, 0x0D);
    *engine.exception.lock() = vec!["System.InvalidOperationException".to_string()];

    let thrown = NativeEvent::Exception {
        thread: THREAD,
        kind: ExceptionKind::UserFirstChance,
    };
    assert_eq!(session.handle_event(thrown), EventDisposition::Continue);

    let unhandled = NativeEvent::Exception {
        thread: THREAD,
        kind: ExceptionKind::Unhandled,
    };
    assert_eq!(session.handle_event(unhandled), EventDisposition::Stop);
    assert_eq!(next_stop(&session), (StopReason::UnhandledException, 13));

    assert_eq!(
        session.handle_event(NativeEvent::ProcessExited),
        EventDisposition::Continue
    );
    assert!(session.events().try_iter().any(|event| event == SessionEvent::Exited));
    assert!(matches!(session.step_line(false), Err(Error::SessionTerminated)));
    session.dispose().unwrap();
}
