//! The built-in primitive instruction set
//!
//! Each primitive is a small struct holding its [`InstructionInfo`] plus
//! the successor offsets assembled into it. Commands move control only by
//! mutating the context; there is no implicit fall-through.

use std::sync::Arc;

use crate::agent::AgentKindMask;
use crate::workspace::{OutputDestination, output_object};

use super::activation::Activation;
use super::context::{Context, ExecEnv, JobMode};
use super::error::{EngineError, EngineException, Failure, RunResult};
use super::instruction::{Command, InstructionInfo, Reporter};
use super::job::{ExclusiveJob, JobSpawn};
use super::procedure::{Procedure, SourceSpan};
use super::value::{Value, valid_double, valid_long};

fn raise(info: &InstructionInfo, error: EngineError) -> Failure {
    EngineException::new(error, Some(info.trace())).into()
}

/// A compiled literal.
pub struct ConstReporter {
    info: InstructionInfo,
    value: Value,
}

impl ConstReporter {
    /// Literal with an explicit span.
    pub fn new(value: Value, span: SourceSpan) -> Arc<dyn Reporter> {
        Arc::new(Self {
            info: InstructionInfo::new("CONST", span, AgentKindMask::ALL),
            value,
        })
    }

    /// Numeric literal with a synthetic span.
    pub fn number(n: f64) -> Arc<dyn Reporter> {
        Self::new(Value::Number(n), SourceSpan::synthetic())
    }

    /// String literal with a synthetic span.
    pub fn text(s: impl Into<String>) -> Arc<dyn Reporter> {
        Self::new(Value::Text(s.into()), SourceSpan::synthetic())
    }
}

impl Reporter for ConstReporter {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn report(&self, _ctx: &mut Context, _env: &mut ExecEnv<'_>) -> RunResult<Value> {
        Ok(self.value.clone())
    }
}

/// `+` over two numbers, guarded at the point of production.
pub struct SumReporter {
    info: InstructionInfo,
}

impl SumReporter {
    /// Compile a sum of two argument reporters.
    pub fn new(a: Arc<dyn Reporter>, b: Arc<dyn Reporter>, span: SourceSpan) -> Arc<dyn Reporter> {
        Arc::new(Self {
            info: InstructionInfo::new("+", span, AgentKindMask::ALL).with_args(vec![a, b]),
        })
    }
}

impl Reporter for SumReporter {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn report(&self, ctx: &mut Context, env: &mut ExecEnv<'_>) -> RunResult<Value> {
        let a = self.info.arg_eval_double(0, ctx, env)?;
        let b = self.info.arg_eval_double(1, ctx, env)?;
        let sum = valid_double(a + b).map_err(|e| raise(&self.info, e))?;
        Ok(Value::Number(sum))
    }
}

/// `-` over two numbers, guarded at the point of production.
pub struct DifferenceReporter {
    info: InstructionInfo,
}

impl DifferenceReporter {
    /// Compile a difference of two argument reporters.
    pub fn new(a: Arc<dyn Reporter>, b: Arc<dyn Reporter>, span: SourceSpan) -> Arc<dyn Reporter> {
        Arc::new(Self {
            info: InstructionInfo::new("-", span, AgentKindMask::ALL).with_args(vec![a, b]),
        })
    }
}

impl Reporter for DifferenceReporter {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn report(&self, ctx: &mut Context, env: &mut ExecEnv<'_>) -> RunResult<Value> {
        let a = self.info.arg_eval_double(0, ctx, env)?;
        let b = self.info.arg_eval_double(1, ctx, env)?;
        let difference = valid_double(a - b).map_err(|e| raise(&self.info, e))?;
        Ok(Value::Number(difference))
    }
}

/// `*` over two numbers, guarded at the point of production.
pub struct ProductReporter {
    info: InstructionInfo,
}

impl ProductReporter {
    /// Compile a product of two argument reporters.
    pub fn new(a: Arc<dyn Reporter>, b: Arc<dyn Reporter>, span: SourceSpan) -> Arc<dyn Reporter> {
        Arc::new(Self {
            info: InstructionInfo::new("*", span, AgentKindMask::ALL).with_args(vec![a, b]),
        })
    }
}

impl Reporter for ProductReporter {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn report(&self, ctx: &mut Context, env: &mut ExecEnv<'_>) -> RunResult<Value> {
        let a = self.info.arg_eval_double(0, ctx, env)?;
        let b = self.info.arg_eval_double(1, ctx, env)?;
        let product = valid_double(a * b).map_err(|e| raise(&self.info, e))?;
        Ok(Value::Number(product))
    }
}

/// `=` over any two values.
pub struct EqualReporter {
    info: InstructionInfo,
}

impl EqualReporter {
    /// Compile an equality test.
    pub fn new(a: Arc<dyn Reporter>, b: Arc<dyn Reporter>, span: SourceSpan) -> Arc<dyn Reporter> {
        Arc::new(Self {
            info: InstructionInfo::new("=", span, AgentKindMask::ALL).with_args(vec![a, b]),
        })
    }
}

impl Reporter for EqualReporter {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn report(&self, ctx: &mut Context, env: &mut ExecEnv<'_>) -> RunResult<Value> {
        let a = self.info.arg_eval(0, ctx, env)?;
        let b = self.info.arg_eval(1, ctx, env)?;
        Ok(Value::Boolean(a == b))
    }
}

/// The agent currently acting.
pub struct SelfReporter {
    info: InstructionInfo,
}

impl SelfReporter {
    /// Compile a `self` reference.
    pub fn new(span: SourceSpan) -> Arc<dyn Reporter> {
        Arc::new(Self {
            info: InstructionInfo::new(
                "SELF",
                span,
                AgentKindMask::TURTLE
                    .union(AgentKindMask::PATCH)
                    .union(AgentKindMask::LINK),
            ),
        })
    }
}

impl Reporter for SelfReporter {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn report(&self, ctx: &mut Context, _env: &mut ExecEnv<'_>) -> RunResult<Value> {
        Ok(Value::Agent(ctx.agent.clone()))
    }
}

/// The set of all live turtles.
pub struct TurtlesReporter {
    info: InstructionInfo,
}

impl TurtlesReporter {
    /// Compile a `turtles` reference.
    pub fn new(span: SourceSpan) -> Arc<dyn Reporter> {
        Arc::new(Self {
            info: InstructionInfo::new("TURTLES", span, AgentKindMask::ALL),
        })
    }
}

impl Reporter for TurtlesReporter {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn report(&self, _ctx: &mut Context, env: &mut ExecEnv<'_>) -> RunResult<Value> {
        Ok(Value::AgentSet(env.world.turtles_agentset()))
    }
}

/// Read a lexical let-binding.
pub struct LetVarReporter {
    info: InstructionInfo,
    name: String,
}

impl LetVarReporter {
    /// Compile a read of binding `name`.
    pub fn new(name: impl Into<String>, span: SourceSpan) -> Arc<dyn Reporter> {
        let name = name.into();
        Arc::new(Self {
            info: InstructionInfo::new(name.to_uppercase(), span, AgentKindMask::ALL),
            name,
        })
    }
}

impl Reporter for LetVarReporter {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn report(&self, ctx: &mut Context, _env: &mut ExecEnv<'_>) -> RunResult<Value> {
        ctx.lookup_let(&self.name).cloned().ok_or_else(|| {
            raise(
                &self.info,
                EngineError::Internal(format!("no binding named {}", self.name)),
            )
        })
    }
}

/// Read a bound procedure argument by slot.
pub struct ProcedureVarReporter {
    info: InstructionInfo,
    slot: usize,
}

impl ProcedureVarReporter {
    /// Compile a read of argument slot `slot`.
    pub fn new(slot: usize, span: SourceSpan) -> Arc<dyn Reporter> {
        Arc::new(Self {
            info: InstructionInfo::new(format!("ARG-{slot}"), span, AgentKindMask::ALL),
            slot,
        })
    }
}

impl Reporter for ProcedureVarReporter {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn report(&self, ctx: &mut Context, _env: &mut ExecEnv<'_>) -> RunResult<Value> {
        ctx.activation
            .arg(self.slot)
            .map_err(|e| raise(&self.info, e))
    }
}

/// `fd`: move the acting turtle along its heading. A cooperative yield
/// point.
pub struct ForwardCommand {
    info: InstructionInfo,
    next: usize,
}

impl ForwardCommand {
    /// Compile `fd distance`, continuing at `next`.
    pub fn new(distance: Arc<dyn Reporter>, span: SourceSpan, next: usize) -> Arc<dyn Command> {
        Arc::new(Self {
            info: InstructionInfo::new("FD", span, AgentKindMask::TURTLE).with_args(vec![distance]),
            next,
        })
    }
}

impl Command for ForwardCommand {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn perform(&self, ctx: &mut Context, env: &mut ExecEnv<'_>) -> RunResult<()> {
        let distance = self.info.arg_eval_double(0, ctx, env)?;
        env.world
            .forward(&ctx.agent, distance)
            .map_err(|e| raise(&self.info, e))?;
        env.workspace.request_display_update();
        ctx.ip = self.next;
        Ok(())
    }

    fn yields(&self) -> bool {
        true
    }
}

/// `die`: kill the acting turtle and finish its portion of the job.
pub struct DieCommand {
    info: InstructionInfo,
}

impl DieCommand {
    /// Compile `die`.
    pub fn new(span: SourceSpan) -> Arc<dyn Command> {
        Arc::new(Self {
            info: InstructionInfo::new("DIE", span, AgentKindMask::TURTLE),
        })
    }
}

impl Command for DieCommand {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn perform(&self, ctx: &mut Context, env: &mut ExecEnv<'_>) -> RunResult<()> {
        env.world
            .kill_turtle(&ctx.agent)
            .map_err(|e| raise(&self.info, e))?;
        ctx.finished = true;
        env.workspace.request_display_update();
        Ok(())
    }

    fn yields(&self) -> bool {
        true
    }
}

/// `hatch n`: the acting turtle spawns n copies of itself.
pub struct HatchCommand {
    info: InstructionInfo,
    next: usize,
}

impl HatchCommand {
    /// Compile `hatch count`, continuing at `next`.
    pub fn new(count: Arc<dyn Reporter>, span: SourceSpan, next: usize) -> Arc<dyn Command> {
        Arc::new(Self {
            info: InstructionInfo::new("HATCH", span, AgentKindMask::TURTLE).with_args(vec![count]),
            next,
        })
    }
}

impl Command for HatchCommand {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn perform(&self, ctx: &mut Context, env: &mut ExecEnv<'_>) -> RunResult<()> {
        let count = self.info.arg_eval_double(0, ctx, env)?;
        let count = valid_long(count).map_err(|e| raise(&self.info, e))?;
        for _ in 0..count.max(0) {
            env.world
                .hatch(&ctx.agent)
                .map_err(|e| raise(&self.info, e))?;
        }
        ctx.ip = self.next;
        Ok(())
    }

    fn yields(&self) -> bool {
        true
    }
}

/// `let name value`: introduce a lexical binding.
pub struct LetCommand {
    info: InstructionInfo,
    name: String,
    next: usize,
}

impl LetCommand {
    /// Compile `let name value`, continuing at `next`.
    pub fn new(
        name: impl Into<String>,
        value: Arc<dyn Reporter>,
        span: SourceSpan,
        next: usize,
    ) -> Arc<dyn Command> {
        Arc::new(Self {
            info: InstructionInfo::new("LET", span, AgentKindMask::ALL).with_args(vec![value]),
            name: name.into(),
            next,
        })
    }
}

impl Command for LetCommand {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn perform(&self, ctx: &mut Context, env: &mut ExecEnv<'_>) -> RunResult<()> {
        let value = self.info.arg_eval(0, ctx, env)?;
        ctx.push_let(self.name.clone(), value);
        ctx.ip = self.next;
        Ok(())
    }
}

/// `set name value`: rebind the innermost binding with that name.
pub struct SetLetCommand {
    info: InstructionInfo,
    name: String,
    next: usize,
}

impl SetLetCommand {
    /// Compile `set name value`, continuing at `next`.
    pub fn new(
        name: impl Into<String>,
        value: Arc<dyn Reporter>,
        span: SourceSpan,
        next: usize,
    ) -> Arc<dyn Command> {
        Arc::new(Self {
            info: InstructionInfo::new("SET", span, AgentKindMask::ALL).with_args(vec![value]),
            name: name.into(),
            next,
        })
    }
}

impl Command for SetLetCommand {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn perform(&self, ctx: &mut Context, env: &mut ExecEnv<'_>) -> RunResult<()> {
        let value = self.info.arg_eval(0, ctx, env)?;
        if !ctx.set_let(&self.name, value) {
            return Err(raise(
                &self.info,
                EngineError::Internal(format!("no binding named {}", self.name)),
            ));
        }
        ctx.ip = self.next;
        Ok(())
    }
}

/// End of a lexical scope: pop its bindings.
pub struct ExitScopeCommand {
    info: InstructionInfo,
    pop: usize,
    next: usize,
}

impl ExitScopeCommand {
    /// Compile a scope exit popping `pop` bindings, continuing at `next`.
    pub fn new(pop: usize, span: SourceSpan, next: usize) -> Arc<dyn Command> {
        Arc::new(Self {
            info: InstructionInfo::new("EXIT-SCOPE", span, AgentKindMask::ALL),
            pop,
            next,
        })
    }
}

impl Command for ExitScopeCommand {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn perform(&self, ctx: &mut Context, _env: &mut ExecEnv<'_>) -> RunResult<()> {
        let depth = ctx.binding_depth().saturating_sub(self.pop);
        ctx.restore_bindings(depth);
        ctx.ip = self.next;
        Ok(())
    }
}

/// Return from the current call (also compiled at the end of every
/// procedure body and block).
pub struct ReturnCommand {
    info: InstructionInfo,
}

impl ReturnCommand {
    /// Compile a return.
    pub fn new(span: SourceSpan) -> Arc<dyn Command> {
        Arc::new(Self {
            info: InstructionInfo::new("END", span, AgentKindMask::ALL),
        })
    }
}

impl Command for ReturnCommand {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn perform(&self, ctx: &mut Context, _env: &mut ExecEnv<'_>) -> RunResult<()> {
        ctx.return_from_procedure();
        Ok(())
    }
}

/// Terminator compiled at the end of every `ask` block: the acting
/// agent's portion of the job ends here, regardless of call depth.
pub struct DoneCommand {
    info: InstructionInfo,
}

impl DoneCommand {
    /// Compile a block terminator.
    pub fn new(span: SourceSpan) -> Arc<dyn Command> {
        Arc::new(Self {
            info: InstructionInfo::new("DONE", span, AgentKindMask::ALL),
        })
    }
}

impl Command for DoneCommand {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn perform(&self, ctx: &mut Context, _env: &mut ExecEnv<'_>) -> RunResult<()> {
        ctx.finished = true;
        Ok(())
    }
}

/// `stop`: exit the current procedure or block early.
pub struct StopCommand {
    info: InstructionInfo,
}

impl StopCommand {
    /// Compile `stop`.
    pub fn new(span: SourceSpan) -> Arc<dyn Command> {
        Arc::new(Self {
            info: InstructionInfo::new("STOP", span, AgentKindMask::ALL),
        })
    }
}

impl Command for StopCommand {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn perform(&self, ctx: &mut Context, _env: &mut ExecEnv<'_>) -> RunResult<()> {
        ctx.return_from_procedure();
        Ok(())
    }
}

/// Call a named procedure with evaluated arguments.
pub struct CallCommand {
    info: InstructionInfo,
    procedure: Arc<Procedure>,
    next: usize,
}

impl CallCommand {
    /// Compile a call, continuing at `next` after the callee returns.
    pub fn new(
        procedure: Arc<Procedure>,
        args: Vec<Arc<dyn Reporter>>,
        span: SourceSpan,
        next: usize,
    ) -> Arc<dyn Command> {
        let name = procedure.name.to_uppercase();
        Arc::new(Self {
            info: InstructionInfo::new(name, span, procedure.agent_mask).with_args(args),
            procedure,
            next,
        })
    }
}

impl Command for CallCommand {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn perform(&self, ctx: &mut Context, env: &mut ExecEnv<'_>) -> RunResult<()> {
        let activation = Activation::new(
            self.procedure.clone(),
            Some(ctx.activation.clone()),
            self.next,
        );
        for slot in 0..self.procedure.parameter_count {
            let value = self.info.arg_eval(slot, ctx, env)?;
            activation
                .set_arg(slot, value)
                .map_err(|e| raise(&self.info, e))?;
        }
        ctx.activation = Arc::new(activation);
        ctx.ip = 0;
        Ok(())
    }
}

/// Re-invoke a captured block with the definition site's original
/// arguments.
pub struct RunCapturedCommand {
    info: InstructionInfo,
    procedure: Arc<Procedure>,
    next: usize,
}

impl RunCapturedCommand {
    /// Compile a captured-block invocation, continuing at `next`.
    pub fn new(procedure: Arc<Procedure>, span: SourceSpan, next: usize) -> Arc<dyn Command> {
        Arc::new(Self {
            info: InstructionInfo::new("RUN", span, AgentKindMask::ALL),
            procedure,
            next,
        })
    }
}

impl Command for RunCapturedCommand {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn perform(&self, ctx: &mut Context, _env: &mut ExecEnv<'_>) -> RunResult<()> {
        let activation = Activation::for_run(self.procedure.clone(), &ctx.activation, self.next);
        ctx.activation = Arc::new(activation);
        ctx.ip = 0;
        Ok(())
    }
}

/// `ask agentset [...]`: run a block over another set of agents.
///
/// Inside an exclusive job the child job runs to completion inline; inside
/// a concurrent job a child-job spawn is requested and the asking context
/// suspends until the scheduler reaps the child.
pub struct AskCommand {
    info: InstructionInfo,
    block_entry: usize,
    next: usize,
}

impl AskCommand {
    /// Compile `ask set [...]`, with the block assembled at `block_entry`
    /// in the same code array and execution continuing at `next`.
    pub fn new(
        agents: Arc<dyn Reporter>,
        block_mask: AgentKindMask,
        block_entry: usize,
        span: SourceSpan,
        next: usize,
    ) -> Arc<dyn Command> {
        Arc::new(Self {
            info: InstructionInfo::new("ASK", span, block_mask).with_args(vec![agents]),
            block_entry,
            next,
        })
    }
}

impl Command for AskCommand {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn perform(&self, ctx: &mut Context, env: &mut ExecEnv<'_>) -> RunResult<()> {
        let agents = self.info.arg_eval_agentset(0, ctx, env)?;
        match ctx.mode {
            JobMode::Exclusive => {
                let mut job = ExclusiveJob::from_block(
                    agents,
                    ctx.activation.procedure.clone(),
                    ctx.activation.clone(),
                    self.block_entry,
                    self.info.agent_mask,
                    ctx.bindings_snapshot(),
                );
                job.run(env)?;
                ctx.ip = self.next;
            }
            JobMode::Concurrent => {
                env.push_spawn(JobSpawn {
                    agents,
                    procedure: ctx.activation.procedure.clone(),
                    entry: self.block_entry,
                    activation: ctx.activation.clone(),
                    agent_mask: self.info.agent_mask,
                    bindings: ctx.bindings_snapshot(),
                });
                ctx.ip = self.next;
                ctx.waiting = true;
            }
        }
        Ok(())
    }
}

/// `print` / `output-print`: render a value and route it to the host,
/// tagged with the acting agent as owner.
pub struct PrintCommand {
    info: InstructionInfo,
    destination: OutputDestination,
    next: usize,
}

impl PrintCommand {
    /// Compile a print to the given destination, continuing at `next`.
    pub fn new(
        value: Arc<dyn Reporter>,
        destination: OutputDestination,
        span: SourceSpan,
        next: usize,
    ) -> Arc<dyn Command> {
        Arc::new(Self {
            info: InstructionInfo::new("PRINT", span, AgentKindMask::ALL).with_args(vec![value]),
            destination,
            next,
        })
    }
}

impl Command for PrintCommand {
    fn info(&self) -> &InstructionInfo {
        &self.info
    }

    fn perform(&self, ctx: &mut Context, env: &mut ExecEnv<'_>) -> RunResult<()> {
        let value = self.info.arg_eval(0, ctx, env)?;
        let owner = ctx.agent.to_string();
        output_object(&value, &owner, &self.destination, env.workspace)
            .map_err(|e| raise(&self.info, e))?;
        ctx.ip = self.next;
        Ok(())
    }

    fn yields(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::World;
    use crate::nvm::job::ExclusiveJob;
    use crate::workspace::{EngineConfig, HeadlessWorkspace};
    use std::sync::atomic::AtomicBool;

    fn run_as_observer(procedure: Arc<Procedure>) -> HeadlessWorkspace {
        let mut world = World::new(&EngineConfig::default());
        let ws = HeadlessWorkspace::new();
        let halted = AtomicBool::new(false);
        let mut env = ExecEnv::new(&mut world, &ws, &halted);
        ExclusiveJob::new(world_observer_set(env.world), procedure)
            .run(&mut env)
            .unwrap();
        ws
    }

    fn world_observer_set(world: &World) -> crate::agent::AgentSet {
        world.observer_agentset()
    }

    fn print(value: Arc<dyn Reporter>, next: usize) -> Arc<dyn Command> {
        PrintCommand::new(
            value,
            OutputDestination::OutputArea,
            SourceSpan::synthetic(),
            next,
        )
    }

    fn proc(name: &str, params: usize, code: Vec<Arc<dyn Command>>) -> Arc<Procedure> {
        Arc::new(Procedure::new(
            name,
            params,
            AgentKindMask::ALL,
            code,
            SourceSpan::synthetic(),
        ))
    }

    #[test]
    fn test_call_binds_arguments_and_returns_to_caller() {
        // callee prints arg0 + arg1; caller calls it with 2 and 3, then
        // prints a marker proving control came back.
        let callee = proc(
            "add-print",
            2,
            vec![
                print(
                    SumReporter::new(
                        ProcedureVarReporter::new(0, SourceSpan::synthetic()),
                        ProcedureVarReporter::new(1, SourceSpan::synthetic()),
                        SourceSpan::synthetic(),
                    ),
                    1,
                ),
                ReturnCommand::new(SourceSpan::synthetic()),
            ],
        );
        let main = proc(
            "main",
            0,
            vec![
                CallCommand::new(
                    callee,
                    vec![ConstReporter::number(2.0), ConstReporter::number(3.0)],
                    SourceSpan::synthetic(),
                    1,
                ),
                print(ConstReporter::text("done"), 2),
                ReturnCommand::new(SourceSpan::synthetic()),
            ],
        );
        let ws = run_as_observer(main);
        let lines: Vec<String> = ws.output_lines().into_iter().map(|(_, t)| t).collect();
        assert_eq!(lines, vec!["5".to_string(), "done".to_string()]);
    }

    #[test]
    fn test_run_captured_block_resumes_caller() {
        let block = proc(
            "block",
            0,
            vec![
                print(ConstReporter::text("inside"), 1),
                ReturnCommand::new(SourceSpan::synthetic()),
            ],
        );
        let main = proc(
            "main",
            0,
            vec![
                RunCapturedCommand::new(block, SourceSpan::synthetic(), 1),
                print(ConstReporter::text("after"), 2),
                ReturnCommand::new(SourceSpan::synthetic()),
            ],
        );
        let ws = run_as_observer(main);
        let lines: Vec<String> = ws.output_lines().into_iter().map(|(_, t)| t).collect();
        assert_eq!(lines, vec!["inside".to_string(), "after".to_string()]);
    }

    #[test]
    fn test_let_set_and_scope_exit() {
        let main = proc(
            "main",
            0,
            vec![
                LetCommand::new("x", ConstReporter::number(1.0), SourceSpan::synthetic(), 1),
                SetLetCommand::new("x", ConstReporter::number(2.0), SourceSpan::synthetic(), 2),
                print(LetVarReporter::new("x", SourceSpan::synthetic()), 3),
                ExitScopeCommand::new(1, SourceSpan::synthetic(), 4),
                ReturnCommand::new(SourceSpan::synthetic()),
            ],
        );
        let ws = run_as_observer(main);
        assert_eq!(ws.output_lines()[0].1, "2");
    }

    #[test]
    fn test_difference_and_equality() {
        let main = proc(
            "main",
            0,
            vec![
                print(
                    EqualReporter::new(
                        DifferenceReporter::new(
                            ConstReporter::number(5.0),
                            ConstReporter::number(3.0),
                            SourceSpan::synthetic(),
                        ),
                        ConstReporter::number(2.0),
                        SourceSpan::synthetic(),
                    ),
                    1,
                ),
                ReturnCommand::new(SourceSpan::synthetic()),
            ],
        );
        let ws = run_as_observer(main);
        assert_eq!(ws.output_lines()[0].1, "true");
    }

    #[test]
    fn test_die_finishes_the_acting_turtle() {
        let mut world = World::new(&EngineConfig::default());
        world.create_turtle();
        world.create_turtle();
        let ws = HeadlessWorkspace::new();
        let halted = AtomicBool::new(false);

        let go = Arc::new(Procedure::new(
            "go",
            0,
            AgentKindMask::TURTLE,
            vec![DieCommand::new(SourceSpan::synthetic())],
            SourceSpan::synthetic(),
        ));
        let agents = world.turtles_agentset();
        let mut env = ExecEnv::new(&mut world, &ws, &halted);
        ExclusiveJob::new(agents, go).run(&mut env).unwrap();
        assert_eq!(env.world.turtle_count(), 0);
    }
}
