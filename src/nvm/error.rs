//! Error model: language-level errors, exception resolution, and the halt
//! signal
//!
//! Domain errors use thiserror; the halt signal is a distinct variant of
//! the job-result sum type [`Failure`] and is never wrapped into an
//! [`EngineException`], so user-initiated cancellation crosses every layer
//! untouched.

use thiserror::Error;

use super::procedure::SourceSpan;

/// Language-level execution errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// An argument's evaluated value does not satisfy the expected type.
    #[error("{instruction} expected input to be {expected} but got {actual} instead")]
    ArgumentType {
        /// Display name of the failing instruction.
        instruction: String,
        /// Phrase naming the expected type ("a number").
        expected: String,
        /// Literal rendering of the offending value.
        actual: String,
    },

    /// A handle whose identity slot has been recycled was used.
    #[error("that {kind} is dead")]
    DeadAgent {
        /// Kind noun of the dead agent.
        kind: String,
    },

    /// A floating value too large to truncate to an exact integer.
    #[error("{value} is too large to be represented exactly as an integer")]
    NumberTooLarge {
        /// The offending value.
        value: f64,
    },

    /// Arithmetic produced an infinite result.
    #[error("math operation produced a number too large for this engine")]
    ResultTooLarge,

    /// Arithmetic produced NaN.
    #[error("math operation produced a non-number")]
    NonNumber,

    /// Link directedness or breed-compatibility violation.
    #[error("{0}")]
    Breed(String),

    /// An agent ran code its kind is not permitted to run.
    #[error("this code can't be run by {kind}")]
    AgentKind {
        /// Kind noun of the offending agent.
        kind: String,
    },

    /// Host-level runtime error; reported with a raw trace, never
    /// prettified into a source-position message.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Engine bug: an internal invariant was violated.
    #[error("internal consistency error: {0}")]
    Internal(String),
}

/// Convenience result alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Identity of the instruction an exception is attributed to.
#[derive(Debug, Clone, PartialEq)]
pub struct InstructionTrace {
    /// Display name of the instruction.
    pub name: String,
    /// Source span for editor highlighting.
    pub span: SourceSpan,
}

/// A raised language error travelling up through contexts and jobs.
///
/// State machine: raised, then (optionally) resolved exactly once, then
/// reported. The failing instruction may be unknown at the throw site; the
/// nearest catching frame that knows it fills it in, and it is never
/// overwritten once set.
#[derive(Debug)]
pub struct EngineException {
    error: EngineError,
    instruction: Option<InstructionTrace>,
    resolved: bool,
    message: Option<String>,
}

impl EngineException {
    /// Raise a new exception, with the instruction if known at the throw
    /// site.
    pub fn new(error: EngineError, instruction: Option<InstructionTrace>) -> Self {
        Self {
            error,
            instruction,
            resolved: false,
            message: None,
        }
    }

    /// The underlying error.
    pub fn error(&self) -> &EngineError {
        &self.error
    }

    /// The attributed instruction, if known.
    pub fn instruction(&self) -> Option<&InstructionTrace> {
        self.instruction.as_ref()
    }

    /// Source span usable for editor highlighting, once attributed.
    pub fn span(&self) -> Option<SourceSpan> {
        self.instruction.as_ref().map(|t| t.span)
    }

    /// Fill in the failing instruction if it was unknown at the throw
    /// site. Never overwrites an instruction already set.
    pub fn attach_instruction(&mut self, trace: InstructionTrace) {
        if self.instruction.is_none() {
            self.instruction = Some(trace);
        }
    }

    /// Resolve the exception to its responsible instruction and build the
    /// human-readable, line-accurate message.
    ///
    /// The message is cached and must never be rebuilt; calling this twice
    /// on the same exception is a programming error and raises an internal
    /// consistency error.
    pub fn resolve(&mut self) -> EngineResult<&str> {
        if self.resolved {
            return Err(EngineError::Internal(
                "error instruction resolved twice".to_string(),
            ));
        }
        self.resolved = true;
        let message = match (&self.error, &self.instruction) {
            // Host-level errors are not prettified into source positions.
            (EngineError::Runtime(_), _) | (_, None) => self.error.to_string(),
            (_, Some(trace)) => format!("{} (line {})", self.error, trace.span.line),
        };
        self.message = Some(message);
        Ok(self.message.as_deref().expect("message just cached"))
    }

    /// Whether [`resolve`](Self::resolve) has run.
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// The cached human-readable message, if resolved.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Outcome of a failing job: either user-initiated cancellation or a
/// language error. Every catch site special-cases [`Failure::Halt`] before
/// generic error handling.
#[derive(Debug)]
pub enum Failure {
    /// User-requested run cancellation. Not a language error; never
    /// wrapped, never resolved, propagates through every layer.
    Halt,
    /// A language-level error carrying positional metadata.
    Error(EngineException),
}

impl From<EngineError> for Failure {
    fn from(error: EngineError) -> Self {
        Failure::Error(EngineException::new(error, None))
    }
}

impl From<EngineException> for Failure {
    fn from(exception: EngineException) -> Self {
        Failure::Error(exception)
    }
}

/// Convenience result alias for instruction and job execution.
pub type RunResult<T> = std::result::Result<T, Failure>;
