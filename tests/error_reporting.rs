//! Error attribution and resolution: line-accurate messages, the
//! single-resolution guard, dead-agent precedence, and the numeric guard
//! rails.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use proptest::prelude::*;

use lockstep::JobScheduler;
use lockstep::agent::{AgentKindMask, World};
use lockstep::nvm::instruction::InstructionInfo;
use lockstep::nvm::prims::{ConstReporter, ForwardCommand, ReturnCommand};
use lockstep::nvm::value::{MAX_EXACT_INTEGER, valid_double, valid_long};
use lockstep::nvm::{
    Activation, ConcurrentJob, Context, EngineError, ExecEnv, Failure, JobMode, Procedure,
    SourceSpan, Value,
};
use lockstep::workspace::{EngineConfig, HeadlessWorkspace};

fn span(line: usize) -> SourceSpan {
    SourceSpan {
        start: 0,
        end: 2,
        line,
    }
}

fn fd_of_string_procedure() -> Arc<Procedure> {
    let code = vec![
        ForwardCommand::new(ConstReporter::new(Value::Text("5".to_string()), span(7)), span(7), 1),
        ReturnCommand::new(span(8)),
    ];
    Arc::new(Procedure::new(
        "broken",
        0,
        AgentKindMask::TURTLE,
        code,
        span(7),
    ))
}

#[test]
fn test_type_error_message_names_both_types_and_line() {
    let mut world = World::new(&EngineConfig::default());
    world.create_turtle();
    let ws = HeadlessWorkspace::new();
    let mut scheduler = JobScheduler::new();

    let job = ConcurrentJob::new(&world.turtles_agentset(), fd_of_string_procedure()).unwrap();
    scheduler.submit_concurrent(job);

    let Failure::Error(mut exception) = scheduler.tick(&mut world, &ws).unwrap_err() else {
        panic!("expected a language error");
    };
    let message = exception.resolve().unwrap();
    assert_eq!(
        message,
        "FD expected input to be a number but got the string \"5\" instead (line 7)"
    );
}

#[test]
fn test_second_resolution_is_an_internal_error() {
    let mut world = World::new(&EngineConfig::default());
    world.create_turtle();
    let ws = HeadlessWorkspace::new();
    let mut scheduler = JobScheduler::new();

    let job = ConcurrentJob::new(&world.turtles_agentset(), fd_of_string_procedure()).unwrap();
    scheduler.submit_concurrent(job);

    let Failure::Error(mut exception) = scheduler.tick(&mut world, &ws).unwrap_err() else {
        panic!("expected a language error");
    };
    assert!(!exception.is_resolved());
    let first = exception.resolve().unwrap().to_string();

    // Resolving again is a programming error in the caller; the cached
    // message must survive untouched.
    assert!(matches!(exception.resolve(), Err(EngineError::Internal(_))));
    assert_eq!(exception.message(), Some(first.as_str()));
}

#[test]
fn test_dead_agent_beats_type_checking() {
    let mut world = World::new(&EngineConfig::default());
    let victim = world.create_turtle();
    world.kill_turtle(&victim).unwrap();

    let ws = HeadlessWorkspace::new();
    let halted = AtomicBool::new(false);
    let procedure = fd_of_string_procedure();
    let mut ctx = Context::new(
        world.observer().clone(),
        Arc::new(Activation::new(procedure, None, 0)),
        0,
        JobMode::Exclusive,
    );

    let info = InstructionInfo::new("FACE", span(3), AgentKindMask::ALL)
        .with_args(vec![ConstReporter::new(Value::Agent(victim), span(3))]);

    let mut env = ExecEnv::new(&mut world, &ws, &halted);
    let Failure::Error(exception) = info.arg_eval_agent(0, &mut ctx, &mut env).unwrap_err() else {
        panic!("expected a language error");
    };
    // A dead handle is still an agent; the accessor reports death, not a
    // type mismatch.
    assert_eq!(
        exception.error(),
        &EngineError::DeadAgent {
            kind: "turtle".to_string()
        }
    );
}

#[test]
fn test_non_agent_argument_is_a_type_error() {
    let mut world = World::new(&EngineConfig::default());
    let ws = HeadlessWorkspace::new();
    let halted = AtomicBool::new(false);
    let procedure = fd_of_string_procedure();
    let mut ctx = Context::new(
        world.observer().clone(),
        Arc::new(Activation::new(procedure, None, 0)),
        0,
        JobMode::Exclusive,
    );

    let info = InstructionInfo::new("FACE", span(3), AgentKindMask::ALL)
        .with_args(vec![ConstReporter::number(4.0)]);

    let mut env = ExecEnv::new(&mut world, &ws, &halted);
    let Failure::Error(exception) = info.arg_eval_agent(0, &mut ctx, &mut env).unwrap_err() else {
        panic!("expected a language error");
    };
    assert!(matches!(
        exception.error(),
        EngineError::ArgumentType { .. }
    ));
}

#[test]
fn test_turtle_argument_error_names_a_turtle() {
    let mut world = World::new(&EngineConfig::default());
    let ws = HeadlessWorkspace::new();
    let halted = AtomicBool::new(false);
    let procedure = fd_of_string_procedure();
    let mut ctx = Context::new(
        world.observer().clone(),
        Arc::new(Activation::new(procedure, None, 0)),
        0,
        JobMode::Exclusive,
    );

    let observer = world.observer().clone();
    let info = InstructionInfo::new("FACE", span(3), AgentKindMask::ALL)
        .with_args(vec![ConstReporter::new(Value::Agent(observer), span(3))]);

    let mut env = ExecEnv::new(&mut world, &ws, &halted);
    let Failure::Error(exception) = info.arg_eval_turtle(0, &mut ctx, &mut env).unwrap_err()
    else {
        panic!("expected a language error");
    };
    // The accessor wants a turtle specifically, and says so.
    assert!(matches!(
        exception.error(),
        EngineError::ArgumentType { expected, .. } if expected.as_str() == "a turtle"
    ));
}

#[test]
fn test_runtime_errors_skip_line_decoration() {
    let mut exception = lockstep::nvm::EngineException::new(
        EngineError::Runtime("disk full".to_string()),
        None,
    );
    assert_eq!(exception.resolve().unwrap(), "runtime error: disk full");
}

proptest! {
    #[test]
    fn prop_valid_double_accepts_exactly_the_finite(value in proptest::num::f64::ANY) {
        match valid_double(value) {
            Ok(out) => {
                prop_assert!(value.is_finite());
                prop_assert_eq!(out, value);
            }
            Err(EngineError::NonNumber) => prop_assert!(value.is_nan()),
            Err(EngineError::ResultTooLarge) => prop_assert!(value.is_infinite()),
            Err(other) => prop_assert!(false, "unexpected error {other}"),
        }
    }

    #[test]
    fn prop_valid_long_stays_exact(value in proptest::num::f64::ANY) {
        if let Ok(out) = valid_long(value) {
            prop_assert!((out as f64).abs() < MAX_EXACT_INTEGER);
            prop_assert_eq!(out, value.trunc() as i64);
        }
    }
}
