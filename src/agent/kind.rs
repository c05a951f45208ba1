//! Agent kinds and identity handles

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Sentinel id stored in an agent's identity cell once it dies.
pub const DEAD_ID: i64 = -1;

/// The closed set of agent kinds.
///
/// Instruction dispatch matches exhaustively over this enum; there is no
/// "unknown kind" fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    /// The single observer agent
    Observer,
    /// A mobile turtle
    Turtle,
    /// A stationary patch
    Patch,
    /// A link between two turtles
    Link,
}

impl AgentKind {
    /// Lowercase singular noun, used in diagnostics ("that turtle is dead").
    pub fn noun(self) -> &'static str {
        match self {
            AgentKind::Observer => "observer",
            AgentKind::Turtle => "turtle",
            AgentKind::Patch => "patch",
            AgentKind::Link => "link",
        }
    }

    /// The single-kind mask for this kind.
    pub fn mask(self) -> AgentKindMask {
        match self {
            AgentKind::Observer => AgentKindMask::OBSERVER,
            AgentKind::Turtle => AgentKindMask::TURTLE,
            AgentKind::Patch => AgentKindMask::PATCH,
            AgentKind::Link => AgentKindMask::LINK,
        }
    }
}

/// Bitset of agent kinds an instruction or procedure may run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentKindMask(u8);

impl AgentKindMask {
    /// Observer only
    pub const OBSERVER: AgentKindMask = AgentKindMask(1 << 0);
    /// Turtles only
    pub const TURTLE: AgentKindMask = AgentKindMask(1 << 1);
    /// Patches only
    pub const PATCH: AgentKindMask = AgentKindMask(1 << 2);
    /// Links only
    pub const LINK: AgentKindMask = AgentKindMask(1 << 3);
    /// Every kind
    pub const ALL: AgentKindMask = AgentKindMask(0b1111);

    /// Union of two masks.
    pub fn union(self, other: AgentKindMask) -> AgentKindMask {
        AgentKindMask(self.0 | other.0)
    }

    /// Whether agents of `kind` are permitted by this mask.
    pub fn allows(self, kind: AgentKind) -> bool {
        self.0 & kind.mask().0 != 0
    }
}

/// Shared identity slot for one agent.
///
/// The world and every outstanding handle alias the same cell; killing the
/// agent stores [`DEAD_ID`] so all holders observe death.
#[derive(Debug)]
pub struct AgentCell {
    id: AtomicI64,
}

impl AgentCell {
    /// Create a cell holding the given live id.
    pub fn new(id: i64) -> Self {
        Self {
            id: AtomicI64::new(id),
        }
    }

    /// Current id, or [`DEAD_ID`] if the agent has died.
    pub fn id(&self) -> i64 {
        self.id.load(Ordering::Acquire)
    }

    /// Mark the identity slot as recycled.
    pub fn mark_dead(&self) {
        self.id.store(DEAD_ID, Ordering::Release);
    }
}

/// Cheap cloneable handle to an agent. Holding one confers no ownership;
/// agents are owned by the world.
#[derive(Debug, Clone)]
pub struct AgentRef {
    /// The kind of agent this handle refers to.
    pub kind: AgentKind,
    cell: Arc<AgentCell>,
}

impl AgentRef {
    /// Build a handle around a shared identity cell.
    pub fn new(kind: AgentKind, cell: Arc<AgentCell>) -> Self {
        Self { kind, cell }
    }

    /// The agent's id, or [`DEAD_ID`] once it has died.
    pub fn id(&self) -> i64 {
        self.cell.id()
    }

    /// Whether the identity slot has been recycled.
    pub fn is_dead(&self) -> bool {
        self.cell.id() == DEAD_ID
    }

    /// The shared identity cell (used by the world when killing agents).
    pub fn cell(&self) -> &Arc<AgentCell> {
        &self.cell
    }
}

impl PartialEq for AgentRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl Eq for AgentRef {}

impl fmt::Display for AgentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dead() {
            write!(f, "a dead {}", self.kind.noun())
        } else if self.kind == AgentKind::Observer {
            write!(f, "observer")
        } else {
            write!(f, "{} {}", self.kind.noun(), self.id())
        }
    }
}
