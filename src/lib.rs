//! Lockstep – a cooperative execution engine for multi-agent simulation procedures
//!
//! This crate implements the agent "virtual machine" of a multi-agent
//! simulation language:
//! - Compiled procedures executed over agent sets, exclusively (one agent to
//!   completion at a time) or concurrently (all agents advance one bounded
//!   turn per scheduler pass, in lockstep)
//! - A call-stack model of activations and per-agent execution contexts
//! - Structured, line-accurate error propagation with a distinct halt signal
//! - An extension lifecycle manager reconciling loaded/live plugin state
//!   across successive recompilations

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Agents, the world that owns them, and agent-set iteration
pub mod agent;
/// Extension lifecycle management and primitive lookup
pub mod extensions;
/// The execution core: instructions, activations, contexts, jobs
pub mod nvm;
/// Host interface and output routing
pub mod workspace;

// Re-export key types for convenience
pub use nvm::scheduler::JobScheduler;
pub use workspace::{EngineConfig, Workspace};

/// Current version of the Lockstep engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Extension API version offered by this engine
pub const EXTENSION_API_VERSION: &str = "1.0";
