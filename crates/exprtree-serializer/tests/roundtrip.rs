//! Round trips through the portable form: graphs are serialized, passed
//! through JSON, rebuilt and evaluated against the same type registry.

use exprtree_host::sample::{self, Scenario};
use exprtree_host::ty::names;
use exprtree_host::{
    BindingFlags, CatchBlock, EvalError, Evaluator, Expr, ExprKind, LabelTarget, LambdaExpr,
    MemberBinding, MemberInfo, NodeType, ParameterExpr, Ty, TypeRegistry, TypeSystem, Value,
};
use exprtree_portable::{from_json, to_json, PortableNode, WireOptions};
use exprtree_serializer::ExpressionSerializer;

// ── Helpers ────────────────────────────────────────────────────────────

fn int(n: i32) -> Expr {
    Expr::constant(Value::Int32(n), Ty::int32())
}

/// Serialize, write to JSON, read back and rebuild.
fn through_json(types: &TypeRegistry, lambda: &LambdaExpr) -> LambdaExpr {
    let serializer = ExpressionSerializer::new(types);
    let node = serializer.serialize_lambda(lambda).unwrap();
    let json = to_json(&node, WireOptions::default()).unwrap();
    serializer.deserialize_lambda(&from_json(&json).unwrap()).unwrap()
}

fn run(types: &TypeRegistry, lambda: &LambdaExpr, inputs: &[Vec<Value>]) -> Vec<Value> {
    let mut evaluator = Evaluator::new(types);
    inputs
        .iter()
        .map(|args| evaluator.call_lambda(lambda, args).unwrap())
        .collect()
}

/// Every parameter occurrence named `name` inside `expr`.
fn occurrences(expr: &Expr, name: &str) -> Vec<ParameterExpr> {
    let mut found = Vec::new();
    expr.walk(&mut |e| {
        if let Some(p) = e.as_parameter() {
            if p.name() == Some(name) {
                found.push(p.clone());
            }
        }
    });
    found
}

// ── Scenarios ──────────────────────────────────────────────────────────

/// Each sample graph gives the same answers before and after the trip.
#[test]
fn scenarios_evaluate_identically() {
    let types = sample::sample_registry();
    for scenario in Scenario::ALL {
        let original = scenario.build(&types).unwrap();
        let rebuilt = through_json(&types, &original);
        let inputs = scenario.inputs(&types);
        assert_eq!(
            run(&types, &rebuilt, &inputs),
            run(&types, &original, &inputs),
            "scenario {}",
            scenario.name()
        );
    }
}

/// The conditional takes the hex branch at or below the threshold.
#[test]
fn scenario_a_results() {
    let types = sample::sample_registry();
    let rebuilt = through_json(&types, &Scenario::A.build(&types).unwrap());
    let results = run(&types, &rebuilt, &Scenario::A.inputs(&types));
    assert_eq!(results, vec![Value::string("A"), Value::string("b")]);
}

/// Serializing a rebuilt graph reproduces the portable tree exactly.
#[test]
fn re_encoding_is_stable() {
    let types = sample::sample_registry();
    let serializer = ExpressionSerializer::new(&types);
    for scenario in Scenario::ALL {
        let first = serializer.serialize_lambda(&scenario.build(&types).unwrap()).unwrap();
        let rebuilt = serializer.deserialize(&first).unwrap();
        let second = serializer.serialize(&rebuilt).unwrap();
        assert_eq!(first, second, "scenario {}", scenario.name());
    }
}

/// A block variable inside a parameterless lambda sits one scope deep.
#[test]
fn block_variables_record_their_scope() {
    let types = sample::sample_registry();
    let node = ExpressionSerializer::new(&types)
        .serialize_lambda(&Scenario::C.build(&types).unwrap())
        .unwrap();
    let PortableNode::Lambda(lambda) = &node else {
        panic!("expected a lambda, got {}", node.kind_name());
    };
    let PortableNode::Block(block) = lambda.body.as_ref() else {
        panic!("expected a block body");
    };
    assert_eq!(block.variables[0].depth, Some(1));
    assert_eq!(block.variables[0].position, Some(0));
    let PortableNode::Binary(sum) = block.result.as_ref() else {
        panic!("expected the block to end in a sum");
    };
    let PortableNode::Parameter(x) = sum.left.as_ref() else {
        panic!("expected a parameter operand");
    };
    assert_eq!((x.depth, x.position), (Some(1), Some(0)));
}

/// `m => m.SubModels.Count() * 2 + m.Int32Property`
#[test]
fn arithmetic_over_chained_members() {
    let types = sample::sample_registry();
    let m = ParameterExpr::named(sample::model_type(), "m");
    let sub_models = Expr::property_or_field(&types, Expr::parameter(&m), "SubModels").unwrap();
    let count_method = types
        .methods(&Ty::linq_enumerable(), BindingFlags::PUBLIC_STATIC)
        .into_iter()
        .find(|method| method.name() == "Count")
        .unwrap()
        .make_generic_method(vec![sample::model_type()])
        .unwrap();
    let count = Expr::call(None, count_method, vec![sub_models]).unwrap();
    let doubled = Expr::binary(NodeType::Multiply, count, int(2)).unwrap();
    let own = Expr::property_or_field(&types, Expr::parameter(&m), "Int32Property").unwrap();
    let sum = Expr::binary(NodeType::Add, doubled, own).unwrap();
    let lambda = LambdaExpr::new(sum, vec![m]).unwrap();

    let input = sample::model(
        &types,
        5,
        "parent",
        vec![sample::model(&types, 1, "x", Vec::new()), sample::model(&types, 2, "y", Vec::new())],
    );
    let rebuilt = through_json(&types, &lambda);
    assert_eq!(run(&types, &rebuilt, &[vec![input]]), vec![Value::Int32(9)]);
}

// ── Parameter identity ─────────────────────────────────────────────────

/// Use sites of `m` and `s` are the instances their lambdas declare.
#[test]
fn use_sites_are_their_declarations() {
    let types = sample::sample_registry();
    let rebuilt = through_json(&types, &Scenario::B.build(&types).unwrap());
    let m = &rebuilt.parameters()[0];
    let uses = occurrences(rebuilt.body(), "m");
    assert!(!uses.is_empty());
    assert!(uses.iter().all(|p| p.ptr_eq(m)));

    let mut inner = None;
    rebuilt.body().walk(&mut |e| {
        if let Some(lambda) = e.as_lambda() {
            inner = Some(lambda.clone());
        }
    });
    let inner = inner.expect("predicate lambda");
    let s = &inner.parameters()[0];
    assert!(occurrences(inner.body(), "s").iter().all(|p| p.ptr_eq(s)));
}

/// Every use of the block variable `x` is the instance the block declares.
#[test]
fn block_use_sites_are_the_block_variable() {
    let types = sample::sample_registry();
    let rebuilt = through_json(&types, &Scenario::C.build(&types).unwrap());
    let ExprKind::Block { variables, .. } = rebuilt.body().kind() else {
        panic!("expected a block body");
    };
    let x = &variables[0];
    let uses = occurrences(rebuilt.body(), "x");
    assert!(uses.len() >= 2, "found {} uses", uses.len());
    assert!(uses.iter().all(|p| p.ptr_eq(x)));
}

/// `x => ((y => x + y))(3)`: the capture still binds the outer parameter.
#[test]
fn nested_lambda_captures_outer_parameter() {
    let types = sample::sample_registry();
    let x = ParameterExpr::named(Ty::int32(), "x");
    let y = ParameterExpr::named(Ty::int32(), "y");
    let add = Expr::binary(NodeType::Add, Expr::parameter(&x), Expr::parameter(&y)).unwrap();
    let inner = LambdaExpr::new(add, vec![y]).unwrap();
    let call = Expr::invoke(inner.to_expr(), vec![int(3)]).unwrap();
    let outer = LambdaExpr::new(call, vec![x]).unwrap();

    let rebuilt = through_json(&types, &outer);
    let declared = &rebuilt.parameters()[0];
    assert!(occurrences(rebuilt.body(), "x").iter().all(|p| p.ptr_eq(declared)));
    assert_eq!(run(&types, &rebuilt, &[vec![Value::Int32(4)]]), vec![Value::Int32(7)]);
}

/// A use site that is not its declaration's instance fails to evaluate.
#[test]
fn identity_corruption_is_detected() {
    let types = sample::sample_registry();
    let declared = ParameterExpr::named(Ty::int32(), "x");
    let impostor = ParameterExpr::named(Ty::int32(), "x");
    let block = Expr::block(
        vec![declared.clone()],
        vec![
            Expr::binary(NodeType::Assign, Expr::parameter(&declared), int(5)).unwrap(),
            Expr::binary(NodeType::Add, Expr::parameter(&impostor), Expr::parameter(&impostor))
                .unwrap(),
        ],
        None,
    )
    .unwrap();
    match Evaluator::new(&types).evaluate(&block) {
        Err(EvalError::UnboundParameter { name }) => assert_eq!(name, "x"),
        other => panic!("expected an unbound parameter, got {:?}", other),
    }
}

/// Parameters no scope declares are shared by name and type.
#[test]
fn free_parameters_are_shared() {
    let types = sample::sample_registry();
    let p = ParameterExpr::named(Ty::int32(), "p");
    let sum = Expr::binary(NodeType::Add, Expr::parameter(&p), Expr::parameter(&p)).unwrap();

    let serializer = ExpressionSerializer::new(&types);
    let node = serializer.serialize(&sum).unwrap();
    let rebuilt = serializer.deserialize(&node).unwrap();
    let ExprKind::Binary { left, right, .. } = rebuilt.kind() else {
        panic!("expected a binary node");
    };
    let (left, right) = (left.as_parameter().unwrap(), right.as_parameter().unwrap());
    assert!(left.ptr_eq(right));
    assert!(!left.ptr_eq(&p));
}

// ── Statements ─────────────────────────────────────────────────────────

/// `() => try { throw new InvalidOperationException("boom") } catch (Exception ex) when (ex != null) { ex.Message }`
#[test]
fn try_catch_rebinds_the_handler_variable() {
    let types = sample::sample_registry();
    let ctor = types
        .constructor(&Ty::core(names::INVALID_OPERATION), &[Ty::string()])
        .unwrap();
    let exception =
        Expr::new_object(ctor, vec![Expr::constant(Value::string("boom"), Ty::string())]).unwrap();
    let body = Expr::throw(Some(exception), Ty::string());

    let ex = ParameterExpr::named(Ty::exception(), "ex");
    let message = Expr::property_or_field(&types, Expr::parameter(&ex), "Message").unwrap();
    let filter = Expr::binary(
        NodeType::NotEqual,
        Expr::parameter(&ex),
        Expr::constant(Value::Null, Ty::exception()),
    )
    .unwrap();
    let handler =
        CatchBlock { test: Ty::exception(), variable: Some(ex), body: message, filter: Some(filter) };
    let guarded = Expr::make_try(None, body, vec![handler], None, None).unwrap();
    let lambda = LambdaExpr::new(guarded, Vec::new()).unwrap();

    let rebuilt = through_json(&types, &lambda);
    assert_eq!(run(&types, &rebuilt, &[Vec::new()]), vec![Value::string("boom")]);
}

/// `{ var i; i = 0; loop { if (i >= 3) break done(i); else i += 1; } }`
#[test]
fn loop_breaks_to_the_shared_label() {
    let types = sample::sample_registry();
    let i = ParameterExpr::named(Ty::int32(), "i");
    let done = LabelTarget::new(Ty::int32(), Some("done"));
    let step = Expr::condition(
        Expr::binary(NodeType::GreaterThanOrEqual, Expr::parameter(&i), int(3)).unwrap(),
        Expr::break_to(&done, Some(Expr::parameter(&i))),
        Expr::binary(NodeType::AddAssign, Expr::parameter(&i), int(1)).unwrap(),
        Some(Ty::void()),
    )
    .unwrap();
    let block = Expr::block(
        vec![i.clone()],
        vec![
            Expr::binary(NodeType::Assign, Expr::parameter(&i), int(0)).unwrap(),
            Expr::make_loop(step, Some(done), None),
        ],
        None,
    )
    .unwrap();
    let lambda = LambdaExpr::new(block, Vec::new()).unwrap();

    let rebuilt = through_json(&types, &lambda);
    assert_eq!(run(&types, &rebuilt, &[Vec::new()]), vec![Value::Int32(3)]);
}

/// Two loops whose break labels share a name and type stay distinct:
/// `{ i = 0; loop { if (i >= 5) break brk; i += 1; loop { break brk(outer); } } i }`
/// leaves the outer loop on its first pass.
#[test]
fn separate_loops_keep_their_own_labels() {
    let types = sample::sample_registry();
    let i = ParameterExpr::named(Ty::int32(), "i");
    let outer = LabelTarget::new(Ty::void(), Some("brk"));
    let inner = LabelTarget::new(Ty::void(), Some("brk"));

    let guard = Expr::condition(
        Expr::binary(NodeType::GreaterThanOrEqual, Expr::parameter(&i), int(5)).unwrap(),
        Expr::break_to(&outer, None),
        Expr::default(Ty::void()),
        Some(Ty::void()),
    )
    .unwrap();
    let body = Expr::block(
        Vec::new(),
        vec![
            guard,
            Expr::binary(NodeType::AddAssign, Expr::parameter(&i), int(1)).unwrap(),
            Expr::make_loop(Expr::break_to(&outer, None), Some(inner), None),
        ],
        Some(Ty::void()),
    )
    .unwrap();
    let block = Expr::block(
        vec![i.clone()],
        vec![
            Expr::binary(NodeType::Assign, Expr::parameter(&i), int(0)).unwrap(),
            Expr::make_loop(body, Some(outer), None),
            Expr::parameter(&i),
        ],
        None,
    )
    .unwrap();
    let lambda = LambdaExpr::new(block, Vec::new()).unwrap();

    let rebuilt = through_json(&types, &lambda);
    assert_eq!(run(&types, &lambda, &[Vec::new()]), vec![Value::Int32(1)]);
    assert_eq!(run(&types, &rebuilt, &[Vec::new()]), vec![Value::Int32(1)]);
}

/// Records sharing an id but not a name describe no single label.
#[test]
fn conflicting_label_records_are_invalid() {
    let types = sample::sample_registry();
    let done = LabelTarget::new(Ty::int32(), Some("done"));
    let lambda = LambdaExpr::new(
        Expr::make_loop(Expr::break_to(&done, Some(int(1))), Some(done), None),
        Vec::new(),
    )
    .unwrap();
    let serializer = ExpressionSerializer::new(&types);
    let mut node = serializer.serialize_lambda(&lambda).unwrap();
    let PortableNode::Lambda(root) = &mut node else {
        panic!("expected a lambda");
    };
    let PortableNode::Loop(looped) = root.body.as_mut() else {
        panic!("expected a loop body");
    };
    let Some(label) = looped.break_label.as_mut() else {
        panic!("expected a break label");
    };
    assert_eq!(label.id, Some(0));
    label.name = Some("elsewhere".to_string());

    assert!(matches!(
        serializer.deserialize(&node),
        Err(exprtree_serializer::SerializeError::InvalidNode { .. })
    ));
}

/// `() => new Model { Int32Property = 7 }.Int32Property`
#[test]
fn member_init_survives() {
    let types = sample::sample_registry();
    let model = sample::model_type();
    let ctor = types.constructor(&model, &[]).unwrap();
    let property =
        MemberInfo::Property(types.property(&model, "Int32Property", BindingFlags::PUBLIC_INSTANCE).unwrap());
    let init = Expr::member_init(
        Expr::new_object(ctor, Vec::new()).unwrap(),
        vec![MemberBinding::Assignment { member: property, expression: int(7) }],
    )
    .unwrap();
    let read = Expr::property_or_field(&types, init, "Int32Property").unwrap();
    let lambda = LambdaExpr::new(read, Vec::new()).unwrap();

    let rebuilt = through_json(&types, &lambda);
    assert_eq!(run(&types, &rebuilt, &[Vec::new()]), vec![Value::Int32(7)]);
}

/// Enum constants come back as the same variant.
#[test]
fn enum_constant_survives() {
    let types = sample::sample_registry();
    let green = types.enum_value(&sample::color_type(), "Green").unwrap();
    let constant = Expr::constant(green.clone(), sample::color_type());
    let serializer = ExpressionSerializer::new(&types);
    let rebuilt = serializer.deserialize(&serializer.serialize(&constant).unwrap()).unwrap();
    let ExprKind::Constant(value) = rebuilt.kind() else {
        panic!("expected a constant");
    };
    assert_eq!(*value, green);
}
