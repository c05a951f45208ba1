//! Jobs: the unit of scheduled work over an agent set

use std::sync::Arc;

use tracing::debug;

use crate::agent::{AgentKindMask, AgentRef, AgentSet};

use super::activation::Activation;
use super::context::{Context, ExecEnv, JobMode};
use super::error::{EngineError, Failure, RunResult};
use super::procedure::Procedure;
use super::value::Value;

/// Job lifecycle. `finish()` is the only path to `Done`; `Removed` is an
/// external cancellation set by the owning scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// The job has unfinished work.
    Running,
    /// The job completed (or was stopped) and awaits reaping.
    Done,
    /// The job was cancelled from outside.
    Removed,
}

/// A request to start a concurrent child job, produced by `ask` inside a
/// concurrent job. The spawning context suspends until the child is
/// reaped.
pub struct JobSpawn {
    /// Agents the child job runs.
    pub agents: AgentSet,
    /// Procedure whose code array holds the block.
    pub procedure: Arc<Procedure>,
    /// Entry offset of the block inside the code array.
    pub entry: usize,
    /// The call site's activation, shared read-only by the children.
    pub activation: Arc<Activation>,
    /// Agent kinds the block may run on.
    pub agent_mask: AgentKindMask,
    /// Snapshot of the spawning context's let-bindings.
    pub bindings: Vec<(String, Value)>,
}

/// A spawned child paired with the index of the context that must wait
/// for it.
pub struct ChildRequest {
    /// Index of the spawning context within its job.
    pub parent_context: usize,
    /// The child job request.
    pub spawn: JobSpawn,
}

fn attach_context(failure: Failure, ctx: &Context) -> Failure {
    match failure {
        Failure::Halt => Failure::Halt,
        Failure::Error(mut exception) => {
            if exception.instruction().is_none() {
                if let Some(trace) = ctx.current_trace() {
                    exception.attach_instruction(trace);
                }
            }
            Failure::Error(exception)
        }
    }
}

/// A job whose agents each run their entire portion to completion, one
/// after another, in snapshot order.
pub struct ExclusiveJob {
    agents: AgentSet,
    procedure: Arc<Procedure>,
    activation: Option<Arc<Activation>>,
    entry: usize,
    agent_mask: AgentKindMask,
    bindings: Vec<(String, Value)>,
    state: JobState,
    stopping: bool,
}

impl ExclusiveJob {
    /// Top-level exclusive job over a procedure.
    pub fn new(agents: AgentSet, procedure: Arc<Procedure>) -> Self {
        let agent_mask = procedure.agent_mask;
        Self {
            agents,
            procedure,
            activation: None,
            entry: 0,
            agent_mask,
            bindings: Vec::new(),
            state: JobState::Running,
            stopping: false,
        }
    }

    /// Nested exclusive job over a block at `entry`, reusing the caller's
    /// activation.
    pub fn from_block(
        agents: AgentSet,
        procedure: Arc<Procedure>,
        activation: Arc<Activation>,
        entry: usize,
        agent_mask: AgentKindMask,
        bindings: Vec<(String, Value)>,
    ) -> Self {
        Self {
            agents,
            procedure,
            activation: Some(activation),
            entry,
            agent_mask,
            bindings,
            state: JobState::Running,
            stopping: false,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Cooperative stop request, observed at the head of the next run.
    pub fn request_stop(&mut self) {
        self.stopping = true;
    }

    /// Mark the job externally cancelled.
    pub fn remove(&mut self) {
        self.state = JobState::Removed;
    }

    /// Transition to `Done`. Idempotent; the only path to `Done`.
    pub fn finish(&mut self) {
        if self.state == JobState::Running {
            self.state = JobState::Done;
            debug!(procedure = %self.procedure.name, "exclusive job finished");
        }
    }

    /// Run every agent in the set to completion, one at a time.
    ///
    /// The shufflerator snapshots membership first, so agents created by
    /// code running during the iteration are never visited. A failing
    /// agent aborts the iteration: the job finishes first (releasing any
    /// waiting parent), then the failure propagates.
    pub fn run(&mut self, env: &mut ExecEnv<'_>) -> RunResult<()> {
        if self.state != JobState::Running {
            return Ok(());
        }
        if self.stopping {
            self.finish();
            return Ok(());
        }
        let shuffled = self.agents.shufflerator(env.world.rng_mut());
        for agent in shuffled {
            if let Err(failure) = self.run_one(agent, env) {
                self.finish();
                return Err(failure);
            }
        }
        self.finish();
        Ok(())
    }

    fn run_one(&self, agent: AgentRef, env: &mut ExecEnv<'_>) -> RunResult<()> {
        if !self.agent_mask.allows(agent.kind) {
            return Err(EngineError::AgentKind {
                kind: agent.kind.noun().to_string(),
            }
            .into());
        }
        let activation = match &self.activation {
            Some(parent) => parent.clone(),
            None => Arc::new(Activation::new(self.procedure.clone(), None, 0)),
        };
        let mut ctx = Context::with_bindings(
            agent,
            activation,
            self.entry,
            JobMode::Exclusive,
            self.bindings.clone(),
        );
        ctx.run_to_completion(env)
            .map_err(|failure| attach_context(failure, &ctx))
    }
}

/// A job whose agents advance in lockstep: one bounded turn for every
/// non-finished, non-waiting context per [`step`](ConcurrentJob::step), in
/// index order.
pub struct ConcurrentJob {
    procedure: Arc<Procedure>,
    activation: Arc<Activation>,
    entry: usize,
    agent_mask: AgentKindMask,
    bindings: Vec<(String, Value)>,
    contexts: Vec<Option<Context>>,
    state: JobState,
    stopping: bool,
}

impl ConcurrentJob {
    /// Top-level concurrent job: one context per live agent, all created
    /// up front, sharing one top-level activation.
    pub fn new(agents: &AgentSet, procedure: Arc<Procedure>) -> RunResult<Self> {
        let activation = Arc::new(Activation::new(procedure.clone(), None, 0));
        let agent_mask = procedure.agent_mask;
        Self::from_parts(agents, procedure, activation, 0, agent_mask, Vec::new())
    }

    /// Child concurrent job from an `ask` spawn request.
    pub fn from_spawn(spawn: JobSpawn) -> RunResult<Self> {
        Self::from_parts(
            &spawn.agents,
            spawn.procedure,
            spawn.activation,
            spawn.entry,
            spawn.agent_mask,
            spawn.bindings,
        )
    }

    fn from_parts(
        agents: &AgentSet,
        procedure: Arc<Procedure>,
        activation: Arc<Activation>,
        entry: usize,
        agent_mask: AgentKindMask,
        bindings: Vec<(String, Value)>,
    ) -> RunResult<Self> {
        let mut contexts = Vec::new();
        for agent in agents.iter_live() {
            if !agent_mask.allows(agent.kind) {
                return Err(EngineError::AgentKind {
                    kind: agent.kind.noun().to_string(),
                }
                .into());
            }
            contexts.push(Some(Context::with_bindings(
                agent.clone(),
                activation.clone(),
                entry,
                JobMode::Concurrent,
                bindings.clone(),
            )));
        }
        Ok(Self {
            procedure,
            activation,
            entry,
            agent_mask,
            bindings,
            contexts,
            state: JobState::Running,
            stopping: false,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Cooperative stop request, observed at the head of the next step.
    pub fn request_stop(&mut self) {
        self.stopping = true;
    }

    /// Mark the job externally cancelled.
    pub fn remove(&mut self) {
        self.state = JobState::Removed;
    }

    /// Transition to `Done`. Idempotent; the only path to `Done`.
    pub fn finish(&mut self) {
        if self.state == JobState::Running {
            self.state = JobState::Done;
            debug!(procedure = %self.procedure.name, "concurrent job finished");
        }
    }

    /// Append a context for an agent joining the running job. Growth is
    /// append-only: existing indices stay stable for currently-stepping
    /// contexts.
    pub fn join(&mut self, agent: AgentRef) -> RunResult<()> {
        if !self.agent_mask.allows(agent.kind) {
            return Err(EngineError::AgentKind {
                kind: agent.kind.noun().to_string(),
            }
            .into());
        }
        self.contexts.push(Some(Context::with_bindings(
            agent,
            self.activation.clone(),
            self.entry,
            JobMode::Concurrent,
            self.bindings.clone(),
        )));
        Ok(())
    }

    /// Borrow the context at a slot, if still live (test/introspection).
    pub fn context(&self, index: usize) -> Option<&Context> {
        self.contexts.get(index).and_then(|slot| slot.as_ref())
    }

    /// Number of context slots (live or nulled).
    pub fn slot_count(&self) -> usize {
        self.contexts.len()
    }

    /// Number of live context slots.
    pub fn live_count(&self) -> usize {
        self.contexts.iter().filter(|slot| slot.is_some()).count()
    }

    /// Release a context suspended on a child job.
    pub fn release_waiting(&mut self, index: usize) {
        if let Some(Some(ctx)) = self.contexts.get_mut(index) {
            ctx.waiting = false;
        }
    }

    /// Advance every non-finished, non-waiting context by exactly one
    /// bounded turn, in index order.
    ///
    /// A context whose `finished` flag was set on a previous pass has its
    /// slot nulled here, never concurrently with its own advance, and the
    /// job transitions to `Done` only when a full pass finds zero live
    /// contexts, so completion is detected one scheduler pass late. A
    /// failing context finishes the job first, then the failure propagates
    /// with its instruction attached.
    pub fn step(&mut self, env: &mut ExecEnv<'_>) -> RunResult<Vec<ChildRequest>> {
        if self.state != JobState::Running {
            return Ok(Vec::new());
        }
        if self.stopping {
            self.finish();
            return Ok(Vec::new());
        }
        let mut children = Vec::new();
        let mut any_live = false;
        for index in 0..self.contexts.len() {
            let slot = &mut self.contexts[index];
            let Some(ctx) = slot.as_mut() else { continue };
            if ctx.finished {
                *slot = None;
                continue;
            }
            any_live = true;
            if ctx.waiting {
                continue;
            }
            if let Err(failure) = ctx.run_for_one_turn(env) {
                let failure = attach_context(failure, ctx);
                self.finish();
                return Err(failure);
            }
            for spawn in env.take_spawns() {
                children.push(ChildRequest {
                    parent_context: index,
                    spawn,
                });
            }
        }
        if !any_live {
            self.finish();
        }
        Ok(children)
    }
}
