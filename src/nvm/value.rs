//! Runtime values, type masks, and numeric guard rails

use std::fmt;

use crate::agent::{AgentRef, AgentSet};

use super::error::{EngineError, EngineResult};

/// Largest magnitude a double can hold while every integer below it is
/// exactly representable (2^53).
pub const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A runtime value produced by reporters and bound in activations.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A double-precision number.
    Number(f64),
    /// A boolean.
    Boolean(bool),
    /// A string.
    Text(String),
    /// A heterogeneous list.
    List(Vec<Value>),
    /// A live-or-dead agent handle.
    Agent(AgentRef),
    /// An agent set.
    AgentSet(AgentSet),
    /// The null-agent sentinel.
    Nobody,
}

impl Value {
    /// The type-mask bit describing this value's runtime kind.
    pub fn type_mask(&self) -> TypeMask {
        match self {
            Value::Number(_) => TypeMask::NUMBER,
            Value::Boolean(_) => TypeMask::BOOLEAN,
            Value::Text(_) => TypeMask::TEXT,
            Value::List(_) => TypeMask::LIST,
            Value::Agent(_) => TypeMask::AGENT,
            Value::AgentSet(_) => TypeMask::AGENTSET,
            Value::Nobody => TypeMask::NOBODY,
        }
    }

    /// Literal rendering used inside diagnostics: `the string "5"`,
    /// `the number 7`, `nobody`, `turtle 3`.
    pub fn describe(&self) -> String {
        match self {
            Value::Number(n) => format!("the number {}", render_number(*n)),
            Value::Boolean(b) => b.to_string(),
            Value::Text(s) => format!("the string {s:?}"),
            Value::List(items) => {
                let rendered: Vec<String> = items.iter().map(|v| v.print_form()).collect();
                format!("the list [{}]", rendered.join(" "))
            }
            Value::Agent(a) => a.to_string(),
            Value::AgentSet(s) => format!("an agentset of {} {}s", s.count(), s.kind().noun()),
            Value::Nobody => "nobody".to_string(),
        }
    }

    /// Plain rendering used by `print`/`output` routing.
    pub fn print_form(&self) -> String {
        match self {
            Value::Number(n) => render_number(*n),
            Value::Boolean(b) => b.to_string(),
            Value::Text(s) => s.clone(),
            Value::List(items) => {
                let rendered: Vec<String> = items.iter().map(|v| v.print_form()).collect();
                format!("[{}]", rendered.join(" "))
            }
            Value::Agent(a) => a.to_string(),
            Value::AgentSet(s) => format!("(agentset, {} {}s)", s.count(), s.kind().noun()),
            Value::Nobody => "nobody".to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.print_form())
    }
}

/// Render a number the way the language prints it: integral values without
/// a trailing `.0`.
pub fn render_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < MAX_EXACT_INTEGER {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Bitset of value types an argument position accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMask(u16);

impl TypeMask {
    /// Numbers
    pub const NUMBER: TypeMask = TypeMask(1 << 0);
    /// Booleans
    pub const BOOLEAN: TypeMask = TypeMask(1 << 1);
    /// Strings
    pub const TEXT: TypeMask = TypeMask(1 << 2);
    /// Lists
    pub const LIST: TypeMask = TypeMask(1 << 3);
    /// Any agent
    pub const AGENT: TypeMask = TypeMask(1 << 4);
    /// Agent sets
    pub const AGENTSET: TypeMask = TypeMask(1 << 5);
    /// The nobody sentinel
    pub const NOBODY: TypeMask = TypeMask(1 << 6);
    /// Specifically a turtle, not just any agent
    pub const TURTLE: TypeMask = TypeMask(1 << 7);

    /// Union of two masks.
    pub fn union(self, other: TypeMask) -> TypeMask {
        TypeMask(self.0 | other.0)
    }

    /// Whether this mask accepts the other's bits.
    pub fn contains(self, other: TypeMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// The "a number or a boolean" phrase used in type errors.
    pub fn describe(self) -> String {
        let mut parts = Vec::new();
        for (mask, phrase) in [
            (TypeMask::NUMBER, "a number"),
            (TypeMask::BOOLEAN, "a boolean"),
            (TypeMask::TEXT, "a string"),
            (TypeMask::LIST, "a list"),
            (TypeMask::AGENT, "an agent"),
            (TypeMask::AGENTSET, "an agentset"),
            (TypeMask::NOBODY, "nobody"),
            (TypeMask::TURTLE, "a turtle"),
        ] {
            if self.contains(mask) {
                parts.push(phrase);
            }
        }
        parts.join(" or ")
    }
}

/// Guard an arithmetic result at its point of production: NaN raises a
/// non-number error, infinities a too-large error, and any finite value is
/// returned unchanged.
pub fn valid_double(value: f64) -> EngineResult<f64> {
    if value.is_nan() {
        Err(EngineError::NonNumber)
    } else if value.is_infinite() {
        Err(EngineError::ResultTooLarge)
    } else {
        Ok(value)
    }
}

/// Truncate a double to an exact integer, failing when the magnitude
/// exceeds the exactly-representable range.
pub fn valid_long(value: f64) -> EngineResult<i64> {
    if !value.is_finite() || value.abs() >= MAX_EXACT_INTEGER {
        Err(EngineError::NumberTooLarge { value })
    } else {
        Ok(value.trunc() as i64)
    }
}
