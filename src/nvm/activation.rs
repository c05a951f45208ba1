//! Activations: one call frame of bound arguments plus a caller link

use std::sync::Arc;

use parking_lot::RwLock;

use super::error::{EngineError, EngineResult};
use super::procedure::Procedure;
use super::value::Value;

/// One call frame: the bound procedure, a back-reference to the caller's
/// frame, the argument slot array, and the caller's return address.
///
/// An activation may be shared read-mostly across several contexts spawned
/// from the same call site (agents of one `ask` all see the caller's
/// frame); the slot array itself sits behind a lock for that reason.
/// Zero-parameter procedures hold an empty `Vec`, which allocates nothing.
pub struct Activation {
    /// The procedure this frame executes.
    pub procedure: Arc<Procedure>,
    /// The caller's frame; `None` for a top-level call.
    pub parent: Option<Arc<Activation>>,
    /// Instruction pointer to resume the caller at when this call returns.
    pub return_address: usize,
    args: RwLock<Vec<Value>>,
}

impl Activation {
    /// Begin a call: the slot array is sized to the procedure's declared
    /// parameter count and initialized to zero.
    pub fn new(
        procedure: Arc<Procedure>,
        parent: Option<Arc<Activation>>,
        return_address: usize,
    ) -> Self {
        let slots = vec![Value::Number(0.0); procedure.parameter_count];
        Self {
            procedure,
            parent,
            return_address,
            args: RwLock::new(slots),
        }
    }

    /// Begin a call re-invoking a captured block with the definition
    /// site's original arguments: the caller's bound arguments are copied
    /// into the new frame by position. The copy is shallow.
    pub fn for_run(
        procedure: Arc<Procedure>,
        caller: &Arc<Activation>,
        return_address: usize,
    ) -> Self {
        let caller_args = caller.args.read();
        let mut slots = vec![Value::Number(0.0); procedure.parameter_count];
        for (slot, arg) in slots.iter_mut().zip(caller_args.iter()) {
            *slot = arg.clone();
        }
        drop(caller_args);
        Self {
            procedure,
            parent: Some(caller.clone()),
            return_address,
            args: RwLock::new(slots),
        }
    }

    /// Number of argument slots.
    pub fn parameter_count(&self) -> usize {
        self.args.read().len()
    }

    /// Read argument slot `i`.
    pub fn arg(&self, i: usize) -> EngineResult<Value> {
        self.args.read().get(i).cloned().ok_or_else(|| {
            EngineError::Internal(format!(
                "procedure {} has no argument slot {i}",
                self.procedure.name
            ))
        })
    }

    /// Bind argument slot `i`.
    pub fn set_arg(&self, i: usize, value: Value) -> EngineResult<()> {
        let mut args = self.args.write();
        match args.get_mut(i) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(EngineError::Internal(format!(
                "procedure {} has no argument slot {i}",
                self.procedure.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentKindMask;
    use crate::nvm::procedure::SourceSpan;

    fn procedure(params: usize) -> Arc<Procedure> {
        Arc::new(Procedure::new(
            "p",
            params,
            AgentKindMask::ALL,
            Vec::new(),
            SourceSpan::synthetic(),
        ))
    }

    #[test]
    fn test_slot_array_sized_to_parameter_count() {
        let act = Activation::new(procedure(2), None, 0);
        assert_eq!(act.parameter_count(), 2);
        assert!(act.arg(2).is_err());
    }

    #[test]
    fn test_zero_parameter_frame_is_empty() {
        let act = Activation::new(procedure(0), None, 0);
        assert_eq!(act.parameter_count(), 0);
    }

    #[test]
    fn test_for_run_copies_caller_args_by_position() {
        let caller = Arc::new(Activation::new(procedure(2), None, 0));
        caller.set_arg(0, Value::Number(4.0)).unwrap();
        caller.set_arg(1, Value::Text("x".to_string())).unwrap();

        let callee = Activation::for_run(procedure(2), &caller, 5);
        assert!(callee.parent.is_some());
        assert_eq!(callee.arg(0).unwrap(), Value::Number(4.0));
        assert_eq!(callee.arg(1).unwrap(), Value::Text("x".to_string()));
        assert_eq!(callee.return_address, 5);

        // Shallow copy: rebinding the caller's slot does not touch the copy.
        caller.set_arg(0, Value::Number(9.0)).unwrap();
        assert_eq!(callee.arg(0).unwrap(), Value::Number(4.0));
    }
}
