use std::sync::Arc;

use super::node::Symbol;
use crate::closure::{ClosureShape, get_closure_shape};
use crate::resolve::VarIndex;
use crate::types::SemType;

/// Layout of the closure created for one lexical scope.
///
/// With a parent, slot 0 links to the parent scope's closure and the
/// variables start at slot 1.
#[derive(Debug, Clone, PartialEq)]
pub struct HoistedLocals {
    parent: Option<Arc<HoistedLocals>>,
    variables: Vec<(Symbol, SemType)>,
}

impl HoistedLocals {
    pub fn new<S: Into<Symbol>>(
        parent: Option<Arc<HoistedLocals>>,
        variables: impl IntoIterator<Item = (S, SemType)>,
    ) -> Self {
        Self {
            parent,
            variables: variables
                .into_iter()
                .map(|(name, ty)| (name.into(), ty))
                .collect(),
        }
    }

    pub fn root<S: Into<Symbol>>(variables: impl IntoIterator<Item = (S, SemType)>) -> Self {
        Self::new(None, variables)
    }

    #[inline]
    pub fn parent(&self) -> Option<&Arc<HoistedLocals>> {
        self.parent.as_ref()
    }

    #[inline]
    pub fn variables(&self) -> &[(Symbol, SemType)] {
        &self.variables
    }

    /// Slot of the first variable.
    #[inline]
    pub fn offset(&self) -> usize {
        usize::from(self.parent.is_some())
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.offset() + self.variables.len()
    }

    /// Slot of `name` in this scope alone. A name declared twice resolves to
    /// the later declaration. Variables past slot `u16::MAX` are not
    /// addressable and never resolve.
    pub fn slot_of(&self, name: &str) -> Option<u16> {
        let position = self.variables.iter().rposition(|(var, _)| var == name)?;
        u16::try_from(position + self.offset()).ok()
    }

    /// Resolves `name` through this scope and its ancestors.
    pub fn resolve(&self, name: &str) -> Option<VarIndex> {
        let mut scope = self;
        let mut hops = 0u16;
        loop {
            if let Some(slot) = scope.slot_of(name) {
                return Some(VarIndex::new(hops, slot));
            }
            scope = scope.parent.as_deref()?;
            hops = hops.checked_add(1)?;
        }
    }

    pub fn closure_types(&self) -> Vec<SemType> {
        self.parent
            .iter()
            .map(|_| SemType::Closure)
            .chain(self.variables.iter().map(|(_, ty)| ty.clone()))
            .collect()
    }

    pub fn closure_shape(&self) -> ClosureShape {
        get_closure_shape(&self.closure_types())
    }
}
