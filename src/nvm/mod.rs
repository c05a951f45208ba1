//! The execution core: instruction model, call stack, jobs, and scheduling
//!
//! A compiled [`Procedure`](procedure::Procedure) bound to an agent set
//! becomes a [`Job`](job); each agent in the job executes through its own
//! [`Context`](context::Context), walking the instruction array one
//! [`Command`](instruction::Command) at a time. Control moves only through
//! explicit successor pointers; there is no implicit fall-through.

pub mod activation;
pub mod context;
pub mod error;
pub mod instruction;
pub mod job;
pub mod prims;
pub mod procedure;
pub mod scheduler;
pub mod value;

pub use activation::Activation;
pub use context::{Context, ExecEnv, JobMode};
pub use error::{EngineError, EngineException, Failure};
pub use instruction::{Command, InstructionInfo, Reporter};
pub use job::{ConcurrentJob, ExclusiveJob, JobState};
pub use procedure::{Procedure, SourceSpan};
pub use value::Value;
