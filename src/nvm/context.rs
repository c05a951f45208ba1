//! Contexts: one agent's execution cursor, and the per-step environment

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::agent::{AgentRef, World};
use crate::workspace::Workspace;

use super::activation::Activation;
use super::error::{EngineError, Failure, InstructionTrace, RunResult};
use super::instruction::Command;
use super::job::JobSpawn;
use super::value::Value;

/// Whether a context belongs to an exclusive or a concurrent job; nested
/// `ask` dispatches on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    /// Each agent runs to completion on its own turn.
    Exclusive,
    /// All agents advance one bounded turn per scheduler pass.
    Concurrent,
}

/// Everything an instruction may touch while executing: the world, the
/// host workspace, the shared halt flag, and the child-job spawn intake.
///
/// Borrowed fresh for each scheduler pass; never stored.
pub struct ExecEnv<'a> {
    /// The mutable world.
    pub world: &'a mut World,
    /// The host services object.
    pub workspace: &'a dyn Workspace,
    halted: &'a AtomicBool,
    spawned: Vec<JobSpawn>,
}

impl<'a> ExecEnv<'a> {
    /// Assemble an environment for one pass.
    pub fn new(world: &'a mut World, workspace: &'a dyn Workspace, halted: &'a AtomicBool) -> Self {
        Self {
            world,
            workspace,
            halted,
            spawned: Vec::new(),
        }
    }

    /// Whether the user has requested cancellation.
    pub fn halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Request a concurrent child job; the owning job suspends the
    /// spawning context until the scheduler reaps the child.
    pub fn push_spawn(&mut self, spawn: JobSpawn) {
        self.spawned.push(spawn);
    }

    /// Drain pending child-job requests (called by the owning job after
    /// each context's turn).
    pub fn take_spawns(&mut self) -> Vec<JobSpawn> {
        std::mem::take(&mut self.spawned)
    }
}

/// One agent's execution cursor within a job: the acting agent, the
/// current activation, an instruction pointer, the finished/waiting flag
/// pair, and the stack of lexical let-bindings.
///
/// Contexts never share binding stacks; at most one context is stepping
/// per thread of control.
pub struct Context {
    /// The agent currently acting. A reference, not ownership.
    pub agent: AgentRef,
    /// The current call frame.
    pub activation: Arc<Activation>,
    /// Index of the next command in the activation's procedure code.
    pub ip: usize,
    /// Set when this agent's portion of the job is complete.
    pub finished: bool,
    /// Set while this context is blocked on a child job.
    pub waiting: bool,
    /// Which job kind owns this context.
    pub mode: JobMode,
    let_bindings: Vec<(String, Value)>,
}

impl Context {
    /// Bind a fresh context for an agent at the given entry point.
    pub fn new(agent: AgentRef, activation: Arc<Activation>, ip: usize, mode: JobMode) -> Self {
        Self {
            agent,
            activation,
            ip,
            finished: false,
            waiting: false,
            mode,
            let_bindings: Vec::new(),
        }
    }

    /// Bind a fresh context that starts with a copy of the spawning
    /// context's let-bindings (nested `ask` blocks read outer bindings).
    pub fn with_bindings(
        agent: AgentRef,
        activation: Arc<Activation>,
        ip: usize,
        mode: JobMode,
        bindings: Vec<(String, Value)>,
    ) -> Self {
        let mut ctx = Self::new(agent, activation, ip, mode);
        ctx.let_bindings = bindings;
        ctx
    }

    /// Introduce a lexical binding.
    pub fn push_let(&mut self, name: impl Into<String>, value: Value) {
        self.let_bindings.push((name.into(), value));
    }

    /// Look up the innermost binding with the given name.
    pub fn lookup_let(&self, name: &str) -> Option<&Value> {
        self.let_bindings
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Rebind the innermost binding with the given name.
    pub fn set_let(&mut self, name: &str, value: Value) -> bool {
        for (n, v) in self.let_bindings.iter_mut().rev() {
            if n == name {
                *v = value;
                return true;
            }
        }
        false
    }

    /// Current binding-stack depth, recorded before entering a scope.
    pub fn binding_depth(&self) -> usize {
        self.let_bindings.len()
    }

    /// Restore the binding stack to a recorded depth on scope exit.
    pub fn restore_bindings(&mut self, depth: usize) {
        self.let_bindings.truncate(depth);
    }

    /// Snapshot of the binding stack, handed to contexts this one spawns.
    pub fn bindings_snapshot(&self) -> Vec<(String, Value)> {
        self.let_bindings.clone()
    }

    /// Identity of the command at the current instruction pointer, used to
    /// attribute exceptions whose throw site did not know its instruction.
    pub fn current_trace(&self) -> Option<InstructionTrace> {
        self.activation
            .procedure
            .code
            .get(self.ip)
            .map(|cmd| cmd.info().trace())
    }

    /// Return from the current procedure call: pop to the caller's frame,
    /// or finish this context if this is the top-level frame.
    pub fn return_from_procedure(&mut self) {
        match self.activation.parent.clone() {
            Some(parent) => {
                self.ip = self.activation.return_address;
                self.activation = parent;
            }
            None => self.finished = true,
        }
    }

    fn fetch(&self) -> RunResult<Arc<dyn Command>> {
        self.activation
            .procedure
            .code
            .get(self.ip)
            .cloned()
            .ok_or_else(|| {
                Failure::from(EngineError::Internal(format!(
                    "instruction pointer {} outside procedure {}",
                    self.ip, self.activation.procedure.name
                )))
            })
    }

    /// Perform exactly one command.
    pub fn step(&mut self, env: &mut ExecEnv<'_>) -> RunResult<()> {
        let command = self.fetch()?;
        command.perform(self, env)
    }

    /// Advance one bounded unit of work: commands execute until one marks
    /// a cooperative yield point, the context blocks on a child job, or
    /// the agent's portion of the job finishes. The halt flag is observed
    /// between commands and propagates as the halt signal, un-wrapped.
    pub fn run_for_one_turn(&mut self, env: &mut ExecEnv<'_>) -> RunResult<()> {
        loop {
            if env.halted() {
                return Err(Failure::Halt);
            }
            if self.finished || self.waiting {
                return Ok(());
            }
            let command = self.fetch()?;
            command.perform(self, env)?;
            if command.yields() {
                return Ok(());
            }
        }
    }

    /// Run the agent's whole portion of an exclusive job, restoring the
    /// let-binding stack to its pre-call depth afterwards.
    pub fn run_to_completion(&mut self, env: &mut ExecEnv<'_>) -> RunResult<()> {
        let depth = self.binding_depth();
        while !self.finished {
            if env.halted() {
                return Err(Failure::Halt);
            }
            self.step(env)?;
        }
        self.restore_bindings(depth);
        Ok(())
    }
}
