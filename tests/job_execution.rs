//! End-to-end job scheduling tests: lockstep fairness, snapshot
//! isolation, cooperative stop, halt, and nested `ask`.

mod common;

use std::sync::Arc;

use lockstep::JobScheduler;
use lockstep::agent::{AgentKindMask, World};
use lockstep::nvm::prims::{
    AskCommand, ConstReporter, DoneCommand, ForwardCommand, HatchCommand, ReturnCommand,
    TurtlesReporter,
};
use lockstep::nvm::{ConcurrentJob, ExclusiveJob, Failure, JobState, Procedure, SourceSpan};
use lockstep::workspace::{EngineConfig, HeadlessWorkspace};

fn span(line: usize) -> SourceSpan {
    SourceSpan {
        start: 0,
        end: 2,
        line,
    }
}

fn harness(turtles: usize) -> (World, HeadlessWorkspace, JobScheduler) {
    common::init_tracing();
    let mut world = World::new(&EngineConfig::default());
    for _ in 0..turtles {
        world.create_turtle();
    }
    (world, HeadlessWorkspace::new(), JobScheduler::new())
}

/// `fd 1` repeated `steps` times, then return.
fn fd_procedure(steps: usize) -> Arc<Procedure> {
    let mut code = Vec::new();
    for i in 0..steps {
        code.push(ForwardCommand::new(
            ConstReporter::number(1.0),
            span(i + 1),
            i + 1,
        ));
    }
    code.push(ReturnCommand::new(span(steps + 1)));
    Arc::new(Procedure::new(
        "go",
        0,
        AgentKindMask::TURTLE,
        code,
        span(1),
    ))
}

/// `fd 1` forever.
fn spinning_procedure() -> Arc<Procedure> {
    let code = vec![ForwardCommand::new(ConstReporter::number(1.0), span(1), 0)];
    Arc::new(Procedure::new(
        "spin",
        0,
        AgentKindMask::TURTLE,
        code,
        span(1),
    ))
}

/// `ask turtles [fd 1]`, run by the observer. Layout:
/// 0 ASK(entry 2) -> 1 END | 2 FD -> 3 DONE
fn ask_procedure() -> Arc<Procedure> {
    let code = vec![
        AskCommand::new(
            TurtlesReporter::new(span(1)),
            AgentKindMask::TURTLE,
            2,
            span(1),
            1,
        ),
        ReturnCommand::new(span(2)),
        ForwardCommand::new(ConstReporter::number(1.0), span(1), 3),
        DoneCommand::new(span(1)),
    ];
    Arc::new(Procedure::new(
        "setup",
        0,
        AgentKindMask::ALL,
        code,
        span(1),
    ))
}

fn turtle_ys(world: &World) -> Vec<f64> {
    world
        .turtles_agentset()
        .iter_live()
        .map(|t| world.turtle(t).unwrap().y)
        .collect()
}

#[test]
fn test_concurrent_job_finishes_one_pass_late() {
    let (mut world, ws, mut scheduler) = harness(3);

    let job = ConcurrentJob::new(&world.turtles_agentset(), fd_procedure(1)).unwrap();
    let id = scheduler.submit_concurrent(job);

    // Pass 1: every turtle executes its fd and yields.
    scheduler.tick(&mut world, &ws).unwrap();
    assert_eq!(scheduler.job_state(id), Some(JobState::Running));
    assert!(turtle_ys(&world).iter().all(|y| (y - 1.0).abs() < 1e-9));

    // Pass 2: every context returns and sets its finished flag, but the
    // slots are still occupied, so the job stays running.
    scheduler.tick(&mut world, &ws).unwrap();
    assert_eq!(scheduler.job_state(id), Some(JobState::Running));

    // Pass 3: the finished slots are nulled, the pass finds no live
    // context, and the job completes and is reaped.
    scheduler.tick(&mut world, &ws).unwrap();
    assert_eq!(scheduler.job_state(id), None);
    assert_eq!(scheduler.pending_count(), 0);

    // Nobody moved a second time, and the host got one breath per pass.
    assert!(turtle_ys(&world).iter().all(|y| (y - 1.0).abs() < 1e-9));
    assert_eq!(ws.display_update_count(), 3);
    assert_eq!(ws.breath_count(), 3);
}

#[test]
fn test_lockstep_no_turtle_runs_ahead() {
    let (mut world, ws, mut scheduler) = harness(4);

    let job = ConcurrentJob::new(&world.turtles_agentset(), fd_procedure(3)).unwrap();
    scheduler.submit_concurrent(job);

    // After each pass every turtle has taken exactly the same number of
    // steps; none is ever a full step ahead of another.
    for pass in 1..=3 {
        scheduler.tick(&mut world, &ws).unwrap();
        let expected = pass as f64;
        for y in turtle_ys(&world) {
            assert!(
                (y - expected).abs() < 1e-9,
                "after pass {pass} a turtle was at {y}, expected {expected}"
            );
        }
    }
}

#[test]
fn test_exclusive_hatch_skips_newborns() {
    let (mut world, ws, mut scheduler) = harness(2);

    // hatch 1, then return
    let code = vec![
        HatchCommand::new(ConstReporter::number(1.0), span(1), 1),
        ReturnCommand::new(span(2)),
    ];
    let procedure = Arc::new(Procedure::new(
        "reproduce",
        0,
        AgentKindMask::TURTLE,
        code,
        span(1),
    ));
    scheduler.submit_exclusive(ExclusiveJob::new(world.turtles_agentset(), procedure));
    scheduler.tick(&mut world, &ws).unwrap();

    // The shufflerator snapshot contains the two original turtles only;
    // their children never run the hatch themselves.
    assert_eq!(world.turtle_count(), 4);
    assert_eq!(scheduler.pending_count(), 0);
}

#[test]
fn test_stop_request_observed_at_next_turn() {
    let (mut world, ws, mut scheduler) = harness(1);

    let job = ConcurrentJob::new(&world.turtles_agentset(), spinning_procedure()).unwrap();
    let id = scheduler.submit_concurrent(job);

    scheduler.tick(&mut world, &ws).unwrap();
    assert_eq!(scheduler.job_state(id), Some(JobState::Running));

    scheduler.request_stop(id);
    scheduler.tick(&mut world, &ws).unwrap();
    assert_eq!(scheduler.job_state(id), None);

    // Exactly one pass ran before the stop took effect.
    assert!(turtle_ys(&world).iter().all(|y| (y - 1.0).abs() < 1e-9));
}

#[test]
fn test_halt_tears_down_everything_unwrapped() {
    let (mut world, ws, mut scheduler) = harness(1);

    let job = ConcurrentJob::new(&world.turtles_agentset(), spinning_procedure()).unwrap();
    scheduler.submit_concurrent(job);
    scheduler.tick(&mut world, &ws).unwrap();

    scheduler.request_halt();
    match scheduler.tick(&mut world, &ws) {
        Err(Failure::Halt) => {}
        other => panic!("expected the halt signal, got {other:?}"),
    }
    assert_eq!(scheduler.pending_count(), 0);
    assert!(!scheduler.has_work());

    // A cleared flag lets fresh jobs schedule normally again.
    scheduler.clear_halt();
    let job = ConcurrentJob::new(&world.turtles_agentset(), fd_procedure(1)).unwrap();
    scheduler.submit_concurrent(job);
    scheduler.tick(&mut world, &ws).unwrap();
}

#[test]
fn test_concurrent_ask_suspends_parent_until_child_reaped() {
    let (mut world, ws, mut scheduler) = harness(2);

    let job = ConcurrentJob::new(&world.observer_agentset(), ask_procedure()).unwrap();
    scheduler.submit_concurrent(job);

    // Pass 1 spawns the child; the parent is now waiting and the child
    // occupies its own slot.
    scheduler.tick(&mut world, &ws).unwrap();
    assert_eq!(scheduler.pending_count(), 2);
    assert!(turtle_ys(&world).iter().all(|y| y.abs() < 1e-9));

    // Drive the remaining passes: turtles move exactly once, the child is
    // reaped, the parent resumes and finishes.
    for _ in 0..6 {
        if scheduler.pending_count() == 0 {
            break;
        }
        scheduler.tick(&mut world, &ws).unwrap();
    }
    assert_eq!(scheduler.pending_count(), 0);
    assert!(turtle_ys(&world).iter().all(|y| (y - 1.0).abs() < 1e-9));
}

#[test]
fn test_exclusive_ask_runs_inline() {
    let (mut world, ws, mut scheduler) = harness(2);

    scheduler.submit_exclusive(ExclusiveJob::new(world.observer_agentset(), ask_procedure()));
    scheduler.tick(&mut world, &ws).unwrap();

    // One tick suffices: the nested job ran to completion inside the
    // observer's turn.
    assert_eq!(scheduler.pending_count(), 0);
    assert!(turtle_ys(&world).iter().all(|y| (y - 1.0).abs() < 1e-9));
}

#[test]
fn test_agent_joining_running_job_is_scheduled() {
    let (mut world, ws, mut scheduler) = harness(1);

    let job = ConcurrentJob::new(&world.turtles_agentset(), fd_procedure(2)).unwrap();
    let id = scheduler.submit_concurrent(job);

    scheduler.tick(&mut world, &ws).unwrap();

    let late = world.create_turtle();
    scheduler
        .concurrent_mut(id)
        .unwrap()
        .join(late.clone())
        .unwrap();

    for _ in 0..5 {
        if scheduler.job_state(id).is_none() {
            break;
        }
        scheduler.tick(&mut world, &ws).unwrap();
    }
    assert_eq!(scheduler.job_state(id), None);
    assert!((world.turtle(&late).unwrap().y - 2.0).abs() < 1e-9);
}

#[test]
fn test_failed_child_spawn_releases_the_asking_job() {
    let (mut world, ws, mut scheduler) = harness(2);

    // `ask turtles [fd 1]` compiled with a patches-only block: the child
    // job cannot be constructed.
    let code = vec![
        AskCommand::new(
            TurtlesReporter::new(span(1)),
            AgentKindMask::PATCH,
            2,
            span(1),
            1,
        ),
        ReturnCommand::new(span(2)),
        ForwardCommand::new(ConstReporter::number(1.0), span(1), 3),
        DoneCommand::new(span(1)),
    ];
    let procedure = Arc::new(Procedure::new(
        "setup",
        0,
        AgentKindMask::ALL,
        code,
        span(1),
    ));
    let job = ConcurrentJob::new(&world.observer_agentset(), procedure).unwrap();
    let id = scheduler.submit_concurrent(job);

    let failure = scheduler.tick(&mut world, &ws).unwrap_err();
    assert!(matches!(failure, Failure::Error(_)));

    // The asking job was finished and reaped; its suspended observer
    // context cannot be left waiting on a child that never existed.
    assert_eq!(scheduler.job_state(id), None);
    assert_eq!(scheduler.pending_count(), 0);
    assert!(!scheduler.has_work());
    scheduler.tick(&mut world, &ws).unwrap();
    assert_eq!(scheduler.pending_count(), 0);
}

#[test]
fn test_failing_context_finishes_job_before_propagating() {
    let (mut world, ws, mut scheduler) = harness(1);

    // fd "5": the argument type check fails on the first turn.
    let code = vec![
        ForwardCommand::new(ConstReporter::text("5"), span(4), 1),
        ReturnCommand::new(span(5)),
    ];
    let procedure = Arc::new(Procedure::new(
        "bad",
        0,
        AgentKindMask::TURTLE,
        code,
        span(4),
    ));
    let job = ConcurrentJob::new(&world.turtles_agentset(), procedure).unwrap();
    let id = scheduler.submit_concurrent(job);

    let failure = scheduler.tick(&mut world, &ws).unwrap_err();
    let Failure::Error(exception) = failure else {
        panic!("expected a language error");
    };
    assert_eq!(exception.instruction().unwrap().name, "FD");

    // The job was finished and reaped even though the tick failed.
    assert_eq!(scheduler.job_state(id), None);
    assert_eq!(scheduler.pending_count(), 0);
}
