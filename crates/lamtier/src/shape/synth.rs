//! Shape set synthesis.
//!
//! Synthesis runs in two steps. `define` lays out the cooperating shapes and
//! their member signatures without any code; `emit` binds the policy's code
//! into the thunk shape and seals the set. Nothing is published until both
//! steps succeed.

use std::sync::atomic::{AtomicU64, Ordering};

use itertools::Itertools;
use smol_str::{SmolStr, format_smolstr};

use super::def::{Member, MemberKind, ShapeDef, ShapeRole};
use super::error::ShapeError;
use super::set::ShapeSet;
use crate::tier::{Dispatcher, Policy, Recompile, Thunk};
use crate::types::{CallableShape, SemType};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

struct Definitions {
    thunk: ShapeDef,
    dispatcher: ShapeDef,
    inner: ShapeDef,
    recompile: Option<ShapeDef>,
}

/// Synthesizes the shape set implementing `target` under `policy`.
///
/// Generic targets produce an open set; see [`ShapeSet::instantiate`].
pub fn synthesize(target: &CallableShape, policy: Policy) -> Result<ShapeSet, ShapeError> {
    target.validate()?;
    build(target, policy, name_prefix(target), Vec::new())
}

pub(super) fn build(
    target: &CallableShape,
    policy: Policy,
    prefix: SmolStr,
    type_args: Vec<SemType>,
) -> Result<ShapeSet, ShapeError> {
    let inner = target.with_leading_closure();
    inner.validate()?;

    let definitions = define(&prefix, &inner, policy);
    let set = emit(definitions, prefix, target.clone(), inner, policy, type_args);
    tracing::debug!(
        shape = %set.target(),
        prefix = %set.prefix(),
        ?policy,
        open = set.is_open(),
        "synthesized shape set"
    );
    Ok(set)
}

/// A readable, process-unique prefix for the shapes of one set.
fn name_prefix(target: &CallableShape) -> SmolStr {
    let readable = target
        .to_string()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .join("_");
    format_smolstr!("{readable}_{}", SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

fn define(prefix: &SmolStr, inner: &CallableShape, policy: Policy) -> Definitions {
    let generics = inner.generics().to_vec();
    let closure = SemType::Param(0);
    let thunk_ty = SemType::object::<Thunk>();
    let dispatcher_ty = SemType::object::<Dispatcher>();
    let outer_params = inner.params()[1..].to_vec();
    let ret = inner.ret().clone();
    let shape_def = |role: ShapeRole, members: Vec<Member>| ShapeDef {
        name: format_smolstr!("{prefix}.{role:?}"),
        role,
        generics: generics.clone(),
        members,
    };

    let thunk = shape_def(
        ShapeRole::Thunk,
        vec![
            Member::new(
                "new",
                MemberKind::Constructor,
                CallableShape::new([SemType::Quoted], thunk_ty.clone()),
            ),
            Member::new("compile", MemberKind::Method, CallableShape::new([], SemType::Function)),
            Member::new(
                "implementation",
                MemberKind::Property,
                CallableShape::new([], SemType::Function),
            ),
            Member::new(
                "create_dispatcher",
                MemberKind::Method,
                CallableShape::new([closure.clone()], dispatcher_ty.clone()),
            ),
        ],
    );

    let dispatcher = shape_def(
        ShapeRole::Dispatcher,
        vec![
            Member::new(
                "new",
                MemberKind::Constructor,
                CallableShape::new([thunk_ty.clone(), closure], dispatcher_ty),
            ),
            Member::new(
                "invoke",
                MemberKind::Method,
                CallableShape::new(outer_params, ret.clone()),
            ),
        ],
    );

    let inner_def = shape_def(
        ShapeRole::Inner,
        vec![Member::new(
            "invoke",
            MemberKind::Method,
            CallableShape::new(inner.params().iter().cloned(), ret),
        )],
    );

    let recompile = (policy == Policy::TieredCompilation).then(|| {
        shape_def(
            ShapeRole::Recompile,
            vec![
                Member::new(
                    "new",
                    MemberKind::Constructor,
                    CallableShape::new([thunk_ty, SemType::Quoted], SemType::object::<Recompile>()),
                ),
                Member::new(
                    "invoke",
                    MemberKind::Method,
                    CallableShape::new(inner.params().iter().cloned(), inner.ret().clone()),
                ),
                Member::new("hits", MemberKind::Field, CallableShape::new([], SemType::Int)),
            ],
        )
    });

    Definitions {
        thunk,
        dispatcher,
        inner: inner_def,
        recompile,
    }
}

fn emit(
    definitions: Definitions,
    prefix: SmolStr,
    target: CallableShape,
    inner: CallableShape,
    policy: Policy,
    type_args: Vec<SemType>,
) -> ShapeSet {
    let Definitions {
        mut thunk,
        mut dispatcher,
        inner: inner_def,
        mut recompile,
    } = definitions;

    // Inner only describes a signature; implementations are supplied at run
    // time through the thunk.
    for def in [Some(&mut thunk), Some(&mut dispatcher), recompile.as_mut()]
        .into_iter()
        .flatten()
    {
        def.members.iter_mut().for_each(|member| member.has_body = true);
    }

    ShapeSet::new(
        prefix,
        target,
        inner,
        policy,
        type_args,
        [thunk, dispatcher, inner_def],
        recompile,
        policy.body(),
    )
}
