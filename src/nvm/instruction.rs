//! The instruction model: commands, reporters, and typed argument access

use std::sync::Arc;

use crate::agent::{AgentKind, AgentKindMask, AgentRef, AgentSet};

use super::context::{Context, ExecEnv};
use super::error::{EngineError, EngineException, Failure, InstructionTrace, RunResult};
use super::procedure::SourceSpan;
use super::value::{TypeMask, Value};

/// Fixed metadata every compiled instruction carries: display name, source
/// span, agent-kind applicability, and the compiled argument instructions.
pub struct InstructionInfo {
    /// Name shown in diagnostics, uppercased by convention.
    pub display_name: String,
    /// Source span for editor highlighting.
    pub span: SourceSpan,
    /// Kinds of agents allowed to execute this instruction.
    pub agent_mask: AgentKindMask,
    /// Compiled child instructions (arguments).
    pub args: Vec<Arc<dyn Reporter>>,
}

impl InstructionInfo {
    /// Metadata with no arguments.
    pub fn new(display_name: impl Into<String>, span: SourceSpan, agent_mask: AgentKindMask) -> Self {
        Self {
            display_name: display_name.into(),
            span,
            agent_mask,
            args: Vec::new(),
        }
    }

    /// Attach compiled argument instructions.
    pub fn with_args(mut self, args: Vec<Arc<dyn Reporter>>) -> Self {
        self.args = args;
        self
    }

    /// Identity used when attributing exceptions to this instruction.
    pub fn trace(&self) -> InstructionTrace {
        InstructionTrace {
            name: self.display_name.clone(),
            span: self.span,
        }
    }

    fn type_error(&self, expected: TypeMask, actual: &Value) -> Failure {
        EngineException::new(
            EngineError::ArgumentType {
                instruction: self.display_name.clone(),
                expected: expected.describe(),
                actual: actual.describe(),
            },
            Some(self.trace()),
        )
        .into()
    }

    /// Evaluate the i-th argument exactly once.
    pub fn arg_eval(
        &self,
        i: usize,
        ctx: &mut Context,
        env: &mut ExecEnv<'_>,
    ) -> RunResult<Value> {
        let arg = self.args.get(i).cloned().ok_or_else(|| {
            Failure::from(EngineError::Internal(format!(
                "{} has no argument {i}",
                self.display_name
            )))
        })?;
        arg.report(ctx, env)
    }

    /// Evaluate argument i and require a number.
    pub fn arg_eval_double(
        &self,
        i: usize,
        ctx: &mut Context,
        env: &mut ExecEnv<'_>,
    ) -> RunResult<f64> {
        match self.arg_eval(i, ctx, env)? {
            Value::Number(n) => Ok(n),
            other => Err(self.type_error(TypeMask::NUMBER, &other)),
        }
    }

    /// Evaluate argument i and require a boolean.
    pub fn arg_eval_boolean(
        &self,
        i: usize,
        ctx: &mut Context,
        env: &mut ExecEnv<'_>,
    ) -> RunResult<bool> {
        match self.arg_eval(i, ctx, env)? {
            Value::Boolean(b) => Ok(b),
            other => Err(self.type_error(TypeMask::BOOLEAN, &other)),
        }
    }

    /// Evaluate argument i and require a string.
    pub fn arg_eval_text(
        &self,
        i: usize,
        ctx: &mut Context,
        env: &mut ExecEnv<'_>,
    ) -> RunResult<String> {
        match self.arg_eval(i, ctx, env)? {
            Value::Text(s) => Ok(s),
            other => Err(self.type_error(TypeMask::TEXT, &other)),
        }
    }

    /// Evaluate argument i and require a list.
    pub fn arg_eval_list(
        &self,
        i: usize,
        ctx: &mut Context,
        env: &mut ExecEnv<'_>,
    ) -> RunResult<Vec<Value>> {
        match self.arg_eval(i, ctx, env)? {
            Value::List(items) => Ok(items),
            other => Err(self.type_error(TypeMask::LIST, &other)),
        }
    }

    /// Evaluate argument i and require a live agent.
    ///
    /// A recycled identity slot is a first-class condition: it raises the
    /// dead-agent error, never a type error, even though both checks live
    /// in this accessor.
    pub fn arg_eval_agent(
        &self,
        i: usize,
        ctx: &mut Context,
        env: &mut ExecEnv<'_>,
    ) -> RunResult<AgentRef> {
        match self.arg_eval(i, ctx, env)? {
            Value::Agent(agent) => {
                if agent.is_dead() {
                    Err(EngineException::new(
                        EngineError::DeadAgent {
                            kind: agent.kind.noun().to_string(),
                        },
                        Some(self.trace()),
                    )
                    .into())
                } else {
                    Ok(agent)
                }
            }
            other => Err(self.type_error(TypeMask::AGENT, &other)),
        }
    }

    /// Evaluate argument i and require a live turtle.
    pub fn arg_eval_turtle(
        &self,
        i: usize,
        ctx: &mut Context,
        env: &mut ExecEnv<'_>,
    ) -> RunResult<AgentRef> {
        let agent = self.arg_eval_agent(i, ctx, env)?;
        if agent.kind == AgentKind::Turtle {
            Ok(agent)
        } else {
            Err(self.type_error(TypeMask::TURTLE, &Value::Agent(agent)))
        }
    }

    /// Evaluate argument i and require an agent set.
    pub fn arg_eval_agentset(
        &self,
        i: usize,
        ctx: &mut Context,
        env: &mut ExecEnv<'_>,
    ) -> RunResult<AgentSet> {
        match self.arg_eval(i, ctx, env)? {
            Value::AgentSet(set) => Ok(set),
            other => Err(self.type_error(TypeMask::AGENTSET, &other)),
        }
    }
}

/// A compiled instruction that performs a side effect and reports no value.
///
/// `perform` moves control only by mutating the context's instruction
/// pointer, activation, or flags; a command that completes without doing so
/// leaves the context exactly where it was.
pub trait Command: Send + Sync {
    /// The instruction's fixed metadata.
    fn info(&self) -> &InstructionInfo;

    /// Execute the instruction for the context's current agent.
    fn perform(&self, ctx: &mut Context, env: &mut ExecEnv<'_>) -> RunResult<()>;

    /// Whether this command is a cooperative yield point in concurrent
    /// jobs.
    fn yields(&self) -> bool {
        false
    }
}

/// A compiled instruction that evaluates to a value.
pub trait Reporter: Send + Sync {
    /// The instruction's fixed metadata.
    fn info(&self) -> &InstructionInfo;

    /// Evaluate for the context's current agent. Always returns a value or
    /// fails; a reporter never moves the instruction pointer.
    fn report(&self, ctx: &mut Context, env: &mut ExecEnv<'_>) -> RunResult<Value>;
}
