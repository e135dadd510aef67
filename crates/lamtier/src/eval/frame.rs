use smallvec::SmallVec;

use super::error::EvalError;
use crate::bind::{FrameLayout, VarRef};
use crate::closure::Closure;
use crate::resolve::resolve;
use crate::value::Value;

/// Activation record of one call.
pub(crate) struct Frame {
    pub locals: SmallVec<[Value; 8]>,
    /// Closure hoisted variables are resolved against.
    pub env: Closure,
}

impl FrameLayout {
    /// Checks the arguments and sets up the frame, creating this call's
    /// closure when the lambda hoists anything.
    pub(crate) fn enter(&self, incoming: &Closure, args: &[Value]) -> Result<Frame, EvalError> {
        if args.len() != self.params.len() {
            return Err(EvalError::ArityMismatch {
                expected: self.params.len(),
                got: args.len(),
            });
        }
        if let Some(position) = self.params.iter().zip(args).position(|(ty, arg)| !ty.accepts(arg)) {
            return Err(EvalError::TypeMismatch {
                position,
                expected: self.params[position].clone(),
                found: args[position].type_name(),
            });
        }

        let mut locals: SmallVec<[Value; 8]> = SmallVec::from_elem(Value::Unit, self.frame_size);
        locals[..args.len()].clone_from_slice(args);

        let env = match (&self.scope, &self.closure_shape) {
            (Some(scope), Some(shape)) => {
                let mut values = vec![Value::Unit; shape.arity()];
                if scope.parent().is_some() {
                    values[0] = Value::Closure(incoming.clone());
                }
                for &(param, slot) in &self.hoisted_params {
                    values[slot] = args[param].clone();
                }
                shape.instantiate(values)?
            }
            _ => incoming.clone(),
        };

        Ok(Frame { locals, env })
    }
}

impl Frame {
    #[inline]
    pub(crate) fn load(&self, var: VarRef) -> Result<Value, EvalError> {
        match var {
            VarRef::Local(slot) => Ok(self.locals[slot as usize].clone()),
            VarRef::Hoisted(index) => {
                let (closure, slot) = resolve(&self.env, index)?;
                Ok(closure.get(slot)?)
            }
        }
    }

    #[inline]
    pub(crate) fn store(&mut self, var: VarRef, value: Value) -> Result<(), EvalError> {
        match var {
            VarRef::Local(slot) => {
                self.locals[slot as usize] = value;
                Ok(())
            }
            VarRef::Hoisted(index) => {
                let (closure, slot) = resolve(&self.env, index)?;
                Ok(closure.set(slot, value)?)
            }
        }
    }
}
