//! Compiled procedures and source positions

use std::fmt;
use std::sync::Arc;

use crate::agent::{AgentKind, AgentKindMask};

use super::error::{EngineError, EngineResult};
use super::instruction::Command;

/// A span of source text, carried by every instruction for editor
/// highlighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpan {
    /// Byte offset of the span's start.
    pub start: usize,
    /// Byte offset one past the span's end.
    pub end: usize,
    /// One-based source line.
    pub line: usize,
}

impl SourceSpan {
    /// A span for synthesized instructions with no source text.
    pub fn synthetic() -> Self {
        Self {
            start: 0,
            end: 0,
            line: 0,
        }
    }
}

/// A compiled procedure: an ordered instruction array, a parameter count,
/// and an agent-kind applicability mask.
///
/// Command blocks (e.g. `ask` bodies) are assembled into the same code
/// array as the enclosing body; instructions reach them through explicit
/// target offsets, never fall-through.
pub struct Procedure {
    /// Procedure name as it appears in diagnostics.
    pub name: String,
    /// Number of declared parameters; sizes each activation's slot array.
    pub parameter_count: usize,
    /// Kinds of agents allowed to run this procedure.
    pub agent_mask: AgentKindMask,
    /// The instruction array.
    pub code: Vec<Arc<dyn Command>>,
    /// Span of the whole definition.
    pub span: SourceSpan,
}

impl Procedure {
    /// Build a procedure from assembled code.
    pub fn new(
        name: impl Into<String>,
        parameter_count: usize,
        agent_mask: AgentKindMask,
        code: Vec<Arc<dyn Command>>,
        span: SourceSpan,
    ) -> Self {
        Self {
            name: name.into(),
            parameter_count,
            agent_mask,
            code,
            span,
        }
    }

    /// Check the procedure's applicability mask against an agent kind.
    pub fn check_agent_kind(&self, kind: AgentKind) -> EngineResult<()> {
        if self.agent_mask.allows(kind) {
            Ok(())
        } else {
            Err(EngineError::AgentKind {
                kind: kind.noun().to_string(),
            })
        }
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("name", &self.name)
            .field("parameter_count", &self.parameter_count)
            .field("code_len", &self.code.len())
            .finish()
    }
}
