//! Semantic types and callable shapes.
//!
//! A [`CallableShape`] is the signature a generated callable must honour: an
//! ordered list of parameter types, a return type and, for generic shapes, a
//! list of generic parameters that `SemType::Param(i)` refers to.

use std::fmt;

use itertools::Itertools;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::eval::error::EvalError;
use crate::shape::ShapeError;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SemType {
    Unit,
    Bool,
    Int,
    Float,
    Str,
    /// A host object, identified by its Rust type name.
    Object(SmolStr),
    Closure,
    Function,
    Quoted,
    Variables,
    Any,
    /// Generic parameter `i` of the enclosing shape.
    Param(u16),
}

impl SemType {
    pub fn object<T: ?Sized>() -> Self {
        SemType::Object(SmolStr::new_static(std::any::type_name::<T>()))
    }

    /// Runtime check used for arguments, return values and closure slots.
    ///
    /// `Param` accepts anything; open shapes are checked after instantiation.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (SemType::Any | SemType::Param(_), _) => true,
            (SemType::Unit, Value::Unit)
            | (SemType::Bool, Value::Bool(_))
            | (SemType::Int, Value::Int(_))
            | (SemType::Float, Value::Float(_))
            | (SemType::Str, Value::Str(_))
            | (SemType::Closure, Value::Closure(_))
            | (SemType::Function, Value::Function(_))
            | (SemType::Quoted, Value::Quoted(_))
            | (SemType::Variables, Value::Variables(_)) => true,
            (SemType::Object(name), Value::Object(obj)) => obj.type_name() == name,
            _ => false,
        }
    }

    #[inline]
    pub fn is_generic(&self) -> bool {
        matches!(self, SemType::Param(_))
    }

    fn shift(&self, by: u16) -> SemType {
        match self {
            SemType::Param(i) => SemType::Param(i + by),
            other => other.clone(),
        }
    }

    fn substitute(&self, args: &[SemType]) -> SemType {
        match self {
            SemType::Param(i) => args[*i as usize].clone(),
            other => other.clone(),
        }
    }
}

impl fmt::Display for SemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemType::Unit => write!(f, "unit"),
            SemType::Bool => write!(f, "bool"),
            SemType::Int => write!(f, "int"),
            SemType::Float => write!(f, "float"),
            SemType::Str => write!(f, "str"),
            SemType::Object(name) => write!(f, "object<{name}>"),
            SemType::Closure => write!(f, "closure"),
            SemType::Function => write!(f, "function"),
            SemType::Quoted => write!(f, "quoted"),
            SemType::Variables => write!(f, "variables"),
            SemType::Any => write!(f, "any"),
            SemType::Param(i) => write!(f, "${i}"),
        }
    }
}

/// A constraint on a generic parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constraint {
    /// The argument must be one of the listed concrete types.
    OneOf(Vec<SemType>),
    /// The argument must equal the argument of another generic parameter.
    SameAs(u16),
}

impl Constraint {
    fn shift(&self, by: u16) -> Constraint {
        match self {
            Constraint::OneOf(types) => Constraint::OneOf(types.iter().map(|t| t.shift(by)).collect()),
            Constraint::SameAs(i) => Constraint::SameAs(i + by),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenericParam {
    pub name: SmolStr,
    pub constraints: Vec<Constraint>,
}

impl GenericParam {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            constraints: Vec::new(),
        }
    }

    pub fn one_of(mut self, types: impl IntoIterator<Item = SemType>) -> Self {
        self.constraints.push(Constraint::OneOf(types.into_iter().collect()));
        self
    }

    pub fn same_as(mut self, param: u16) -> Self {
        self.constraints.push(Constraint::SameAs(param));
        self
    }

    /// Copies this parameter with every parameter reference moved up by `by`.
    pub(crate) fn shifted(&self, by: u16) -> GenericParam {
        GenericParam {
            name: self.name.clone(),
            constraints: self.constraints.iter().map(|c| c.shift(by)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallableShape {
    generics: Vec<GenericParam>,
    params: Vec<SemType>,
    ret: SemType,
}

impl CallableShape {
    pub fn new(params: impl IntoIterator<Item = SemType>, ret: SemType) -> Self {
        Self {
            generics: Vec::new(),
            params: params.into_iter().collect(),
            ret,
        }
    }

    pub fn generic(
        generics: impl IntoIterator<Item = GenericParam>,
        params: impl IntoIterator<Item = SemType>,
        ret: SemType,
    ) -> Self {
        Self {
            generics: generics.into_iter().collect(),
            params: params.into_iter().collect(),
            ret,
        }
    }

    #[inline]
    pub fn params(&self) -> &[SemType] {
        &self.params
    }

    #[inline]
    pub fn ret(&self) -> &SemType {
        &self.ret
    }

    #[inline]
    pub fn generics(&self) -> &[GenericParam] {
        &self.generics
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    #[inline]
    pub fn is_generic(&self) -> bool {
        !self.generics.is_empty()
    }

    fn malformed(&self, reason: impl Into<String>) -> ShapeError {
        ShapeError::Malformed {
            shape: self.to_string(),
            reason: reason.into(),
        }
    }

    /// Checks that every parameter reference is in range and that the
    /// constraints can be satisfied together.
    pub fn validate(&self) -> Result<(), ShapeError> {
        let count = self.generics.len();
        let in_range = |t: &SemType| match t {
            SemType::Param(i) => (*i as usize) < count,
            _ => true,
        };

        if let Some(t) = self.params.iter().chain(std::iter::once(&self.ret)).find(|t| !in_range(*t)) {
            return Err(self.malformed(format!("{t} refers to an undeclared generic parameter")));
        }

        for (index, param) in self.generics.iter().enumerate() {
            for constraint in &param.constraints {
                match constraint {
                    Constraint::OneOf(types) if types.is_empty() => {
                        return Err(ShapeError::ConstraintConflict {
                            param: param.name.clone(),
                        });
                    }
                    Constraint::OneOf(types) => {
                        if types.iter().any(SemType::is_generic) {
                            return Err(self.malformed(format!(
                                "constraint on \"{}\" must list concrete types",
                                param.name
                            )));
                        }
                    }
                    Constraint::SameAs(other) if *other as usize >= count => {
                        return Err(self.malformed(format!(
                            "\"{}\" is constrained to an undeclared parameter ${other}",
                            param.name
                        )));
                    }
                    Constraint::SameAs(other) if *other as usize == index => {
                        return Err(self.malformed(format!("\"{}\" is constrained to itself", param.name)));
                    }
                    Constraint::SameAs(_) => {}
                }
            }
        }

        // Parameters linked by `SameAs` form groups; each group must admit
        // at least one type.
        let groups = self.same_as_groups();
        let mut allowed: FxHashMap<usize, Vec<SemType>> = FxHashMap::default();
        for (index, param) in self.generics.iter().enumerate() {
            let root = groups[index];
            for constraint in &param.constraints {
                if let Constraint::OneOf(types) = constraint {
                    let entry = allowed.entry(root).or_insert_with(|| types.clone());
                    entry.retain(|t| types.contains(t));
                    if entry.is_empty() {
                        return Err(ShapeError::ConstraintConflict {
                            param: param.name.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    fn same_as_groups(&self) -> Vec<usize> {
        let mut parent: Vec<usize> = (0..self.generics.len()).collect();
        fn find(parent: &mut [usize], mut i: usize) -> usize {
            while parent[i] != i {
                parent[i] = parent[parent[i]];
                i = parent[i];
            }
            i
        }
        for (index, param) in self.generics.iter().enumerate() {
            for constraint in &param.constraints {
                if let Constraint::SameAs(other) = constraint {
                    let (a, b) = (find(&mut parent, index), find(&mut parent, *other as usize));
                    if a != b {
                        parent[a] = b;
                    }
                }
            }
        }
        (0..parent.len()).map(|i| find(&mut parent, i)).collect()
    }

    /// Closes a generic shape over concrete type arguments.
    pub fn instantiate(&self, type_args: &[SemType]) -> Result<CallableShape, ShapeError> {
        if type_args.len() != self.generics.len() {
            return Err(ShapeError::TypeArgCount {
                expected: self.generics.len(),
                got: type_args.len(),
            });
        }
        if let Some(arg) = type_args.iter().find(|t| t.is_generic()) {
            return Err(self.malformed(format!("type argument {arg} is not concrete")));
        }

        for (param, arg) in self.generics.iter().zip(type_args) {
            let satisfied = param.constraints.iter().all(|constraint| match constraint {
                Constraint::OneOf(types) => types.contains(arg),
                Constraint::SameAs(other) => type_args.get(*other as usize) == Some(arg),
            });
            if !satisfied {
                return Err(ShapeError::ConstraintViolation {
                    param: param.name.clone(),
                    arg: arg.clone(),
                });
            }
        }

        Ok(CallableShape {
            generics: Vec::new(),
            params: self.params.iter().map(|t| t.substitute(type_args)).collect(),
            ret: self.ret.substitute(type_args),
        })
    }

    /// Infers the type arguments that turn `self` into `concrete`.
    pub fn unify(&self, concrete: &CallableShape) -> Result<Vec<SemType>, ShapeError> {
        let mismatch = || ShapeError::Mismatch {
            lambda: self.to_string(),
            requested: concrete.to_string(),
        };
        if concrete.is_generic() || concrete.arity() != self.arity() {
            return Err(mismatch());
        }

        let mut bound: Vec<Option<SemType>> = vec![None; self.generics.len()];
        let pairs = self
            .params
            .iter()
            .zip(&concrete.params)
            .chain(std::iter::once((&self.ret, &concrete.ret)));
        for (pattern, actual) in pairs {
            match pattern {
                SemType::Param(i) => match &bound[*i as usize] {
                    Some(existing) if existing != actual => return Err(mismatch()),
                    Some(_) => {}
                    None => bound[*i as usize] = Some(actual.clone()),
                },
                other if other != actual => return Err(mismatch()),
                _ => {}
            }
        }

        let args = bound
            .into_iter()
            .zip(&self.generics)
            .map(|(arg, param)| arg.ok_or_else(|| ShapeError::Unresolved(param.name.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        self.instantiate(&args)?;
        Ok(args)
    }

    /// The same shape with one leading closure parameter, generic over
    /// `TClosure`. Existing generic parameters move up by one.
    pub fn with_leading_closure(&self) -> CallableShape {
        let closure_param = GenericParam::new("TClosure").one_of([SemType::Closure]);
        CallableShape {
            generics: std::iter::once(closure_param)
                .chain(self.generics.iter().map(|g| g.shifted(1)))
                .collect(),
            params: std::iter::once(SemType::Param(0))
                .chain(self.params.iter().map(|t| t.shift(1)))
                .collect(),
            ret: self.ret.shift(1),
        }
    }

    /// Drops the leading closure parameter of a closed inner shape.
    pub fn without_leading_closure(&self) -> Option<CallableShape> {
        if self.is_generic() || self.params.first() != Some(&SemType::Closure) {
            return None;
        }
        Some(CallableShape::new(self.params[1..].iter().cloned(), self.ret.clone()))
    }

    /// Checks a call's arguments against a closed shape.
    pub fn check_args(&self, args: &[Value]) -> Result<(), EvalError> {
        if args.len() != self.params.len() {
            return Err(EvalError::ArityMismatch {
                expected: self.params.len(),
                got: args.len(),
            });
        }
        match self.params.iter().zip(args).position(|(ty, arg)| !ty.accepts(arg)) {
            Some(position) => Err(EvalError::TypeMismatch {
                position,
                expected: self.params[position].clone(),
                found: args[position].type_name(),
            }),
            None => Ok(()),
        }
    }

    pub fn check_return(&self, value: &Value) -> Result<(), EvalError> {
        if self.ret.accepts(value) {
            Ok(())
        } else {
            Err(EvalError::ReturnType {
                expected: self.ret.clone(),
                found: value.type_name(),
            })
        }
    }
}

impl fmt::Display for CallableShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn")?;
        if self.is_generic() {
            write!(f, "<{}>", self.generics.iter().map(|g| &g.name).join(", "))?;
        }
        write!(f, "({}) -> {}", self.params.iter().join(", "), self.ret)
    }
}
