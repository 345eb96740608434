//! Integration tests for the evaluator over the core library and the demo
//! domain: exceptions, initializers, switches, arrays, type tests and the
//! sample scenarios.

use exprtree_host::sample::{self, Scenario};
use exprtree_host::ty::names;
use exprtree_host::{
    BindingFlags, CatchBlock, ElementInit, EvalError, Evaluator, Expr, MemberBinding, MemberInfo,
    NodeType, ParameterExpr, SwitchCase, Ty, TypeRegistry, TypeSystem, Value,
};

// ── Helpers ────────────────────────────────────────────────────────────

fn eval(types: &TypeRegistry, expr: &Expr) -> Result<Value, EvalError> {
    Evaluator::new(types).evaluate(expr)
}

fn int(n: i32) -> Expr {
    Expr::constant(Value::Int32(n), Ty::int32())
}

fn string(s: &str) -> Expr {
    Expr::constant(Value::string(s), Ty::string())
}

/// `throw new InvalidOperationException(message)`, typed as `ty`.
fn throw_invalid_operation(types: &TypeRegistry, message: &str, ty: Ty) -> Expr {
    let ctor = types
        .constructor(&Ty::core(names::INVALID_OPERATION), &[Ty::string()])
        .expect("InvalidOperationException(String) is registered");
    let exception = Expr::new_object(ctor, vec![string(message)]).unwrap();
    Expr::throw(Some(exception), ty)
}

/// `catch (Exception ex) { ex.Message }`
fn catch_message(types: &TypeRegistry) -> CatchBlock {
    let ex = ParameterExpr::named(Ty::exception(), "ex");
    let message = Expr::property_or_field(types, Expr::parameter(&ex), "Message").unwrap();
    CatchBlock { test: Ty::exception(), variable: Some(ex), body: message, filter: None }
}

// ── Exceptions ─────────────────────────────────────────────────────────

/// A derived exception is caught by a handler for its base type.
#[test]
fn catch_binds_the_thrown_exception() {
    let types = TypeRegistry::with_core_library();
    let body = throw_invalid_operation(&types, "boom", Ty::string());
    let expr = Expr::make_try(None, body, vec![catch_message(&types)], None, None).unwrap();
    assert_eq!(eval(&types, &expr).unwrap(), Value::string("boom"));
}

/// Without a handler the exception escapes with its message.
#[test]
fn uncaught_exception_reports_message() {
    let types = TypeRegistry::with_core_library();
    let expr = throw_invalid_operation(&types, "nobody home", Ty::void());
    match eval(&types, &expr) {
        Err(EvalError::Unhandled { message, .. }) => assert_eq!(message, "nobody home"),
        other => panic!("expected an unhandled exception, got {:?}", other),
    }
}

/// A filter that evaluates to false skips its handler.
#[test]
fn false_filter_declines_the_exception() {
    let types = TypeRegistry::with_core_library();
    let mut handler = catch_message(&types);
    handler.filter = Some(Expr::constant(Value::Bool(false), Ty::boolean()));
    let body = throw_invalid_operation(&types, "filtered", Ty::string());
    let expr = Expr::make_try(None, body, vec![handler], None, None).unwrap();
    assert!(matches!(eval(&types, &expr), Err(EvalError::Unhandled { .. })));
}

/// `finally` runs after a normal exit and its effects are visible.
#[test]
fn finally_runs_after_body() {
    let types = TypeRegistry::with_core_library();
    let x = ParameterExpr::named(Ty::int32(), "x");
    let body = Expr::binary(NodeType::Assign, Expr::parameter(&x), int(1)).unwrap();
    let add_ten = Expr::binary(NodeType::AddAssign, Expr::parameter(&x), int(10)).unwrap();
    let guarded = Expr::make_try(Some(Ty::void()), body, Vec::new(), Some(add_ten), None).unwrap();
    let block = Expr::block(vec![x.clone()], vec![guarded, Expr::parameter(&x)], None).unwrap();
    assert_eq!(eval(&types, &block).unwrap(), Value::Int32(11));
}

/// A rethrow inside a handler is caught by the enclosing try.
#[test]
fn rethrow_propagates_to_outer_handler() {
    let types = TypeRegistry::with_core_library();
    let inner_handler = CatchBlock {
        test: Ty::exception(),
        variable: None,
        body: Expr::throw(None, Ty::string()),
        filter: None,
    };
    let inner = Expr::make_try(
        None,
        throw_invalid_operation(&types, "again", Ty::string()),
        vec![inner_handler],
        None,
        None,
    )
    .unwrap();
    let outer = Expr::make_try(None, inner, vec![catch_message(&types)], None, None).unwrap();
    assert_eq!(eval(&types, &outer).unwrap(), Value::string("again"));
}

// ── Construction and initializers ──────────────────────────────────────

/// `new Model { StringProperty = "x", Int32Property = 3 }.Int32Property`
#[test]
fn member_init_assigns_properties() {
    let types = sample::sample_registry();
    let model = sample::model_type();
    let ctor = types.constructor(&model, &[]).unwrap();
    let property = |name: &str| {
        MemberInfo::Property(types.property(&model, name, BindingFlags::PUBLIC_INSTANCE).unwrap())
    };
    let init = Expr::member_init(
        Expr::new_object(ctor, Vec::new()).unwrap(),
        vec![
            MemberBinding::Assignment { member: property("StringProperty"), expression: string("x") },
            MemberBinding::Assignment { member: property("Int32Property"), expression: int(3) },
        ],
    )
    .unwrap();
    let read = Expr::property_or_field(&types, init, "Int32Property").unwrap();
    assert_eq!(eval(&types, &read).unwrap(), Value::Int32(3));
}

/// `new List<String> { "a", "b" }.Count`
#[test]
fn list_init_calls_add_per_element() {
    let types = TypeRegistry::with_core_library();
    let list = Ty::list(Ty::string());
    let ctor = types.constructor(&list, &[]).unwrap();
    let add = types
        .method(&list, "Add", BindingFlags::PUBLIC_INSTANCE, &[Ty::string()])
        .unwrap();
    let init = Expr::list_init(
        Expr::new_object(ctor, Vec::new()).unwrap(),
        vec![
            ElementInit { add_method: add.clone(), arguments: vec![string("a")] },
            ElementInit { add_method: add, arguments: vec![string("b")] },
        ],
    )
    .unwrap();
    let count = Expr::property_or_field(&types, init, "Count").unwrap();
    assert_eq!(eval(&types, &count).unwrap(), Value::Int32(2));
}

/// Static fields read through their getter.
#[test]
fn static_field_reads_constant() {
    let types = sample::sample_registry();
    let field = types
        .field(&sample::model_type(), "MaxItems", BindingFlags::PUBLIC_STATIC)
        .unwrap();
    let expr = Expr::member(None, MemberInfo::Field(field)).unwrap();
    assert_eq!(eval(&types, &expr).unwrap(), Value::Int32(100));
}

// ── Arrays, switches and type tests ────────────────────────────────────

#[test]
fn array_access_is_bounds_checked() {
    let types = TypeRegistry::with_core_library();
    let array = Expr::new_array_init(Ty::int32(), vec![int(1), int(2), int(3)]);
    let length = Expr::unary(NodeType::ArrayLength, array.clone()).unwrap();
    assert_eq!(eval(&types, &length).unwrap(), Value::Int32(3));

    let second = Expr::array_access(array.clone(), vec![int(1)]).unwrap();
    assert_eq!(eval(&types, &second).unwrap(), Value::Int32(2));

    let past_end = Expr::array_access(array, vec![int(5)]).unwrap();
    assert!(matches!(
        eval(&types, &past_end),
        Err(EvalError::IndexOutOfRange { index: 5, length: 3 })
    ));
}

#[test]
fn switch_matches_any_test_value() {
    let types = TypeRegistry::with_core_library();
    let switch_on = |n: i32| {
        Expr::switch(
            None,
            int(n),
            vec![
                SwitchCase { test_values: vec![int(1)], body: string("one") },
                SwitchCase { test_values: vec![int(2), int(3)], body: string("few") },
            ],
            Some(string("many")),
            None,
        )
        .unwrap()
    };
    let results: Vec<Value> = [1, 3, 9]
        .into_iter()
        .map(|n| eval(&types, &switch_on(n)).unwrap())
        .collect();
    assert_eq!(
        results,
        vec![Value::string("one"), Value::string("few"), Value::string("many")]
    );
}

/// `TypeIs` follows assignability, `TypeEqual` requires the exact type.
#[test]
fn type_tests_use_runtime_type() {
    let types = TypeRegistry::with_core_library();
    let boxed = Expr::convert(string("s"), Ty::object()).unwrap();
    let is_string = Expr::type_binary(NodeType::TypeIs, boxed.clone(), Ty::string()).unwrap();
    let is_object = Expr::type_binary(NodeType::TypeIs, boxed.clone(), Ty::object()).unwrap();
    let exactly_object = Expr::type_binary(NodeType::TypeEqual, boxed, Ty::object()).unwrap();
    assert_eq!(eval(&types, &is_string).unwrap(), Value::Bool(true));
    assert_eq!(eval(&types, &is_object).unwrap(), Value::Bool(true));
    assert_eq!(eval(&types, &exactly_object).unwrap(), Value::Bool(false));
}

/// Dynamic nodes can be built but not run.
#[test]
fn dynamic_is_not_evaluated() {
    let types = TypeRegistry::with_core_library();
    let expr = Expr::dynamic(Ty::func(vec![Ty::object()], Ty::object()), vec![int(1)], None).unwrap();
    assert!(matches!(eval(&types, &expr), Err(EvalError::Unsupported(_))));
}

// ── Scenarios ──────────────────────────────────────────────────────────

fn run_scenario(scenario: Scenario) -> Vec<Value> {
    let types = sample::sample_registry();
    let lambda = scenario.build(&types).unwrap();
    let mut evaluator = Evaluator::new(&types);
    scenario
        .inputs(&types)
        .iter()
        .map(|args| evaluator.call_lambda(&lambda, args).unwrap())
        .collect()
}

#[test]
fn scenario_b_applies_predicate_to_sub_models() {
    assert_eq!(run_scenario(Scenario::B), vec![Value::Bool(true), Value::Bool(false)]);
}

#[test]
fn scenario_c_reads_assigned_local() {
    assert_eq!(run_scenario(Scenario::C), vec![Value::Int32(10)]);
}

#[test]
fn scenario_d_compares_enum_values() {
    assert_eq!(run_scenario(Scenario::D), vec![Value::Bool(true), Value::Bool(false)]);
}
