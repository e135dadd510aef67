use std::sync::{Arc, Barrier};
use std::thread;

use lamtier::{
    CallableShape, Closure, Engine, Error, Expr, GenericParam, Handle, Lambda, Marshal, Policy, SemType, ShapeError,
    ShapeRole, Value, is_cached, shape_set,
};
use rstest::rstest;

#[derive(Debug)]
struct Node {
    label: &'static str,
}

fn identity_shape() -> CallableShape {
    CallableShape::generic(
        [GenericParam::new("T").one_of([SemType::Int, SemType::object::<Node>()])],
        [SemType::Param(0)],
        SemType::Param(0),
    )
}

fn identity() -> Arc<Lambda> {
    Lambda::builder("identity")
        .generic(GenericParam::new("T").one_of([SemType::Int, SemType::object::<Node>()]))
        .param("x", SemType::Param(0))
        .returns(SemType::Param(0))
        .body(Expr::var("x"))
        .build()
}

#[rstest]
#[case::compiling(Policy::Compiling)]
#[case::interpreting(Policy::Interpreting)]
#[case::tiered(Policy::TieredCompilation)]
fn test_generic_shape_with_two_type_sets(#[case] policy: Policy) {
    let engine = Engine::default();
    let ints = engine
        .create_generic_callable(identity(), &identity_shape(), &[SemType::Int], policy, Closure::empty())
        .unwrap();
    let nodes = engine
        .create_generic_callable(
            identity(),
            &identity_shape(),
            &[SemType::object::<Node>()],
            policy,
            Closure::empty(),
        )
        .unwrap();

    for i in 0..6 {
        assert_eq!(ints.call(&[Value::Int(i)]), Ok(Value::Int(i)));
    }

    let node = Handle(Arc::new(Node { label: "root" }));
    for _ in 0..6 {
        let returned = nodes.call(&[node.clone().into_value()]).unwrap();
        let back = Handle::<Node>::from_value(returned).unwrap();
        assert!(Arc::ptr_eq(&node.0, &back.0));
        assert_eq!(back.0.label, "root");
    }

    assert!(ints.call(&[node.into_value()]).is_err());
    assert!(nodes.call(&[Value::Int(1)]).is_err());
    assert!(!Arc::ptr_eq(ints.thunk().shapes(), nodes.thunk().shapes()));
}

#[test]
fn test_instantiated_sets_are_cached_per_type_args() {
    let open = shape_set(&identity_shape(), Policy::Interpreting).unwrap();
    assert!(open.is_open());
    let a = open.instantiate(&[SemType::Int]).unwrap();
    let b = shape_set(&identity_shape(), Policy::Interpreting)
        .unwrap()
        .instantiate(&[SemType::Int])
        .unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.type_args(), &[SemType::Int]);
}

#[test]
fn test_constraint_violation() {
    let engine = Engine::default();
    assert!(matches!(
        engine.create_generic_callable(
            identity(),
            &identity_shape(),
            &[SemType::Str],
            Policy::Compiling,
            Closure::empty()
        ),
        Err(Error::Shape(ShapeError::ConstraintViolation { .. }))
    ));
}

#[rstest]
#[case::dangling_param(CallableShape::generic(
    [GenericParam::new("T")],
    [SemType::Param(3)],
    SemType::Unit
))]
#[case::self_reference(CallableShape::generic(
    [GenericParam::new("T").same_as(0)],
    [SemType::Param(0)],
    SemType::Unit
))]
#[case::dangling_same_as(CallableShape::generic(
    [GenericParam::new("T").same_as(4)],
    [SemType::Param(0)],
    SemType::Unit
))]
#[case::empty_one_of(CallableShape::generic(
    [GenericParam::new("T").one_of([])],
    [SemType::Param(0)],
    SemType::Unit
))]
#[case::contradiction(CallableShape::generic(
    [
        GenericParam::new("A").one_of([SemType::Int]),
        GenericParam::new("B").one_of([SemType::Str]).same_as(0),
    ],
    [SemType::Param(0), SemType::Param(1)],
    SemType::Unit
))]
#[case::undeclared_in_return(CallableShape::new([], SemType::Param(0)))]
fn test_malformed_shapes_cache_nothing(#[case] shape: CallableShape) {
    for policy in [Policy::Compiling, Policy::Interpreting, Policy::TieredCompilation] {
        assert!(shape_set(&shape, policy).is_err());
        assert!(!is_cached(&shape, policy));
    }
}

#[test]
fn test_single_shape_set_under_race() {
    let shape = CallableShape::new(vec![SemType::Float; 7], SemType::Unit);
    let threads = 12;
    let barrier = Arc::new(Barrier::new(threads));
    let sets = (0..threads)
        .map(|_| {
            let shape = shape.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                shape_set(&shape, Policy::TieredCompilation).unwrap()
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect::<Vec<_>>();
    assert!(sets.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

#[rstest]
#[case::nullary(CallableShape::new([], SemType::Unit))]
#[case::binary(CallableShape::new([SemType::Int, SemType::Str], SemType::Bool))]
#[case::closure_param(CallableShape::new([SemType::Closure], SemType::Function))]
#[case::wide(CallableShape::new(vec![SemType::Any; 20], SemType::Any))]
fn test_inner_signature_reduces_to_target(#[case] shape: CallableShape) {
    let set = shape_set(&shape, Policy::Compiling).unwrap();
    let inner = set.inner_signature().unwrap();
    assert_eq!(inner.arity(), shape.arity() + 1);
    assert_eq!(inner.without_leading_closure(), Some(shape));
}

#[test]
fn test_tiered_set_has_recompile_shape() {
    let shape = CallableShape::new([SemType::Str], SemType::Str);
    let tiered = shape_set(&shape, Policy::TieredCompilation).unwrap();
    let compiling = shape_set(&shape, Policy::Compiling).unwrap();
    assert_eq!(tiered.recompile_def().map(|def| def.role), Some(ShapeRole::Recompile));
    assert!(compiling.recompile_def().is_none());
    assert_ne!(tiered.prefix(), compiling.prefix());
}
