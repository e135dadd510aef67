use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use itertools::Itertools;
use rustc_hash::FxHashMap;
use smol_str::{SmolStr, format_smolstr};

use super::def::ShapeDef;
use super::error::ShapeError;
use super::synth;
use crate::backend::InnerFn;
use crate::eval::error::EvalError;
use crate::tier::{Policy, Thunk};
use crate::types::{CallableShape, SemType};

/// The code emitted into a thunk shape.
///
/// `initial` produces the implementation a fresh (or re-armed) thunk starts
/// with; `compile` is what the thunk's `compile` member runs.
#[derive(Clone, Copy)]
pub(crate) struct ThunkBody {
    pub(crate) initial: fn(&Weak<Thunk>) -> InnerFn,
    pub(crate) compile: fn(&Thunk) -> Result<InnerFn, EvalError>,
}

/// The shapes synthesized for one callable shape under one policy.
pub struct ShapeSet {
    prefix: SmolStr,
    target: CallableShape,
    inner: CallableShape,
    policy: Policy,
    type_args: Vec<SemType>,
    thunk: ShapeDef,
    dispatcher: ShapeDef,
    inner_def: ShapeDef,
    recompile: Option<ShapeDef>,
    body: ThunkBody,
    instances: RwLock<FxHashMap<Vec<SemType>, Arc<ShapeSet>>>,
}

impl ShapeSet {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        prefix: SmolStr,
        target: CallableShape,
        inner: CallableShape,
        policy: Policy,
        type_args: Vec<SemType>,
        [thunk, dispatcher, inner_def]: [ShapeDef; 3],
        recompile: Option<ShapeDef>,
        body: ThunkBody,
    ) -> Self {
        Self {
            prefix,
            target,
            inner,
            policy,
            type_args,
            thunk,
            dispatcher,
            inner_def,
            recompile,
            body,
            instances: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn prefix(&self) -> &SmolStr {
        &self.prefix
    }

    /// The callable shape this set implements.
    pub fn target(&self) -> &CallableShape {
        &self.target
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// The inner shape, still generic over `TClosure`.
    pub fn inner_shape(&self) -> &CallableShape {
        &self.inner
    }

    pub fn thunk_def(&self) -> &ShapeDef {
        &self.thunk
    }

    pub fn dispatcher_def(&self) -> &ShapeDef {
        &self.dispatcher
    }

    pub fn inner_def(&self) -> &ShapeDef {
        &self.inner_def
    }

    pub fn recompile_def(&self) -> Option<&ShapeDef> {
        self.recompile.as_ref()
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.target.is_generic()
    }

    /// Type arguments a closed set was instantiated with; empty for sets
    /// synthesized from a non-generic shape.
    pub fn type_args(&self) -> &[SemType] {
        &self.type_args
    }

    pub(crate) fn body(&self) -> ThunkBody {
        self.body
    }

    /// The inner signature with `TClosure` closed over [`SemType::Closure`].
    pub fn inner_signature(&self) -> Result<CallableShape, ShapeError> {
        if self.is_open() {
            return Err(ShapeError::Open(self.target.to_string()));
        }
        self.inner.instantiate(&[SemType::Closure])
    }

    /// Closes an open set over `type_args`.
    ///
    /// Each distinct type-argument list is synthesized once; later requests
    /// return the same set. A closed set only accepts an empty list.
    pub fn instantiate(self: &Arc<Self>, type_args: &[SemType]) -> Result<Arc<ShapeSet>, ShapeError> {
        if !self.is_open() {
            return if type_args.is_empty() {
                Ok(Arc::clone(self))
            } else {
                Err(ShapeError::TypeArgCount {
                    expected: 0,
                    got: type_args.len(),
                })
            };
        }

        if let Some(set) = self
            .instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_args)
        {
            return Ok(Arc::clone(set));
        }

        // Constraints are checked on the shifted inner shape so `SameAs`
        // references are exercised after the rewrite.
        let closure_args = std::iter::once(SemType::Closure)
            .chain(type_args.iter().cloned())
            .collect::<Vec<_>>();
        self.inner.instantiate(&closure_args)?;
        let target = self.target.instantiate(type_args)?;

        let mut instances = self.instances.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(set) = instances.get(type_args) {
            return Ok(Arc::clone(set));
        }

        let prefix = format_smolstr!("{}_of_{}", self.prefix, type_args.iter().join("_"));
        let set = Arc::new(synth::build(&target, self.policy, prefix, type_args.to_vec())?);
        if set.inner_signature()?.without_leading_closure().as_ref() != Some(&target) {
            return Err(ShapeError::Malformed {
                shape: target.to_string(),
                reason: "inner shape does not reduce to the target".to_string(),
            });
        }
        tracing::debug!(open = %self.target, closed = %target, "instantiated shape set");
        instances.insert(type_args.to_vec(), Arc::clone(&set));
        Ok(set)
    }
}

impl fmt::Debug for ShapeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShapeSet")
            .field("prefix", &self.prefix)
            .field("target", &self.target)
            .field("policy", &self.policy)
            .field("type_args", &self.type_args)
            .finish_non_exhaustive()
    }
}
