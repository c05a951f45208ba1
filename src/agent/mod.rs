//! Agent model: kinds, identity handles, the world, and agent sets
//!
//! Agents are owned by the [`World`]; everything else holds cheap
//! [`AgentRef`] handles. A handle observes the death of its agent through
//! the shared identity cell, so dead-agent detection is a first-class
//! condition rather than a lookup failure.

pub mod agentset;
pub mod kind;
pub mod world;

pub use agentset::{AgentSet, Shufflerator};
pub use kind::{AgentKind, AgentKindMask, AgentRef, DEAD_ID};
pub use world::{LinkBreed, World};
