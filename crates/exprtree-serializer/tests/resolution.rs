//! Symbol resolution failures and their reporting: missing types,
//! overloads that cannot be told apart, and generic methods whose return
//! type is an open type parameter.

use std::sync::Arc;

use exprtree_host::registry::TypeDef;
use exprtree_host::sample::{self, Scenario};
use exprtree_host::{
    BindingFlags, ConstructorInfo, Expr, FieldInfo, LambdaExpr, MemberKind, MethodInfo,
    NodeType, ParameterExpr, PropertyInfo, QualifiedTypeName, Ty, TypeRegistry, TypeSystem, Value,
};
use exprtree_portable::{MemberDescriptor, PortableNode};
use exprtree_serializer::{describe, ExpressionSerializer, SerializeError};

// ── Helpers ────────────────────────────────────────────────────────────

/// A type system that has never heard of one type.
struct Hiding<'a> {
    inner: &'a TypeRegistry,
    hidden: &'a str,
}

impl TypeSystem for Hiding<'_> {
    fn find_type(&self, name: &QualifiedTypeName) -> Option<Ty> {
        if name.full_name == self.hidden {
            return None;
        }
        self.inner.find_type(name)
    }

    fn type_def(&self, ty: &Ty) -> Option<Arc<TypeDef>> {
        self.inner.type_def(ty)
    }

    fn fields(&self, ty: &Ty, flags: BindingFlags) -> Vec<FieldInfo> {
        self.inner.fields(ty, flags)
    }

    fn properties(&self, ty: &Ty, flags: BindingFlags) -> Vec<PropertyInfo> {
        self.inner.properties(ty, flags)
    }

    fn methods(&self, ty: &Ty, flags: BindingFlags) -> Vec<MethodInfo> {
        self.inner.methods(ty, flags)
    }

    fn constructors(&self, ty: &Ty, flags: BindingFlags) -> Vec<ConstructorInfo> {
        self.inner.constructors(ty, flags)
    }
}

/// `Enumerable.<name>` closed over `Demo.Model`, applied to `m.SubModels`.
fn query_over_sub_models(types: &TypeRegistry, name: &str, arity: usize) -> LambdaExpr {
    let m = ParameterExpr::named(sample::model_type(), "m");
    let sub_models = Expr::property_or_field(types, Expr::parameter(&m), "SubModels").unwrap();
    let method = types
        .methods(&Ty::linq_enumerable(), BindingFlags::PUBLIC_STATIC)
        .into_iter()
        .find(|method| method.name() == name && method.parameters().len() == arity)
        .unwrap()
        .make_generic_method(vec![sample::model_type()])
        .unwrap();
    let call = Expr::call(None, method, vec![sub_models]).unwrap();
    LambdaExpr::new(call, vec![m]).unwrap()
}

/// The body of a serialized lambda.
fn lambda_body(node: &mut PortableNode) -> &mut PortableNode {
    match node {
        PortableNode::Lambda(lambda) => lambda.body.as_mut(),
        other => panic!("expected a lambda, got {}", other.kind_name()),
    }
}

// ── Types ──────────────────────────────────────────────────────────────

/// A type the receiving side lacks fails the whole decode.
#[test]
fn unknown_type_fails_decode() {
    let types = sample::sample_registry();
    let node = ExpressionSerializer::new(&types)
        .serialize_lambda(&Scenario::A.build(&types).unwrap())
        .unwrap();

    let hiding = Hiding { inner: &types, hidden: "Demo.Model" };
    match ExpressionSerializer::new(&hiding).deserialize(&node) {
        Err(SerializeError::TypeNotFound { reference, .. }) => {
            assert!(reference.starts_with("Demo.Model"), "{}", reference)
        }
        other => panic!("expected TypeNotFound, got {:?}", other),
    }
}

/// Describing then resolving gives back the same type.
#[test]
fn described_types_resolve_to_themselves() {
    let types = sample::sample_registry();
    let resolver = ExpressionSerializer::new(&types).type_resolver();
    for ty in [
        Ty::int32(),
        Ty::list(sample::model_type()),
        Ty::func(vec![sample::model_type()], Ty::boolean()),
        Ty::array(Ty::string()),
        Ty::enumerable(Ty::list(Ty::int32())),
    ] {
        assert_eq!(resolver.resolve(&describe(&ty)).unwrap(), ty, "{}", describe(&ty));
    }
}

// ── Methods ────────────────────────────────────────────────────────────

/// `Pick(IEnumerable<Int32>)` and `Pick(IEnumerable<String>)` share a
/// generic definition, so neither can be chosen.
#[test]
fn overloads_differing_in_generic_argument_are_ambiguous() {
    let types = sample::sample_registry();
    let items = ParameterExpr::named(Ty::enumerable(Ty::int32()), "items");
    let pick = types
        .method(
            &sample::overloads_type(),
            "Pick",
            BindingFlags::PUBLIC_STATIC,
            &[Ty::enumerable(Ty::int32())],
        )
        .unwrap();
    let call = Expr::call(None, pick, vec![Expr::parameter(&items)]).unwrap();
    let lambda = LambdaExpr::new(call, vec![items]).unwrap();

    let serializer = ExpressionSerializer::new(&types);
    let node = serializer.serialize_lambda(&lambda).unwrap();
    let err = serializer.deserialize(&node).unwrap_err();
    match &err {
        SerializeError::AmbiguousOrNotFoundMember { member_kind, name, candidates, .. } => {
            assert_eq!(*member_kind, MemberKind::Method);
            assert_eq!(name, "Pick");
            assert_eq!(*candidates, 2);
        }
        other => panic!("expected an ambiguous member, got {:?}", other),
    }
    insta::assert_snapshot!(err, @"method `Pick` on `Demo.Overloads, Demo.Models` is ambiguous or missing (2 candidate(s) matched)");
}

/// `Any` returns `Boolean` in every instantiation and resolves.
#[test]
fn generic_method_with_concrete_return_resolves() {
    let types = sample::sample_registry();
    let lambda = query_over_sub_models(&types, "Any", 1);
    let serializer = ExpressionSerializer::new(&types);
    let rebuilt = serializer
        .deserialize_lambda(&serializer.serialize_lambda(&lambda).unwrap())
        .unwrap();
    assert_eq!(rebuilt.return_type(), Ty::boolean());
}

/// `First` returns its type parameter; the recorded `Demo.Model` never
/// equals it, so no candidate survives.
#[test]
fn generic_return_type_is_not_found() {
    let types = sample::sample_registry();
    let lambda = query_over_sub_models(&types, "First", 1);
    let serializer = ExpressionSerializer::new(&types);
    let node = serializer.serialize_lambda(&lambda).unwrap();
    match serializer.deserialize(&node) {
        Err(SerializeError::AmbiguousOrNotFoundMember { name, candidates, .. }) => {
            assert_eq!(name, "First");
            assert_eq!(candidates, 0);
        }
        other => panic!("expected no surviving candidate, got {:?}", other),
    }
}

/// The root of a lambda request must be a lambda.
#[test]
fn lambda_request_rejects_other_roots() {
    let types = sample::sample_registry();
    let serializer = ExpressionSerializer::new(&types);
    let node = serializer
        .serialize(&Expr::constant(Value::Int32(1), Ty::int32()))
        .unwrap();
    assert!(matches!(
        serializer.deserialize_lambda(&node),
        Err(SerializeError::InvalidNode { .. })
    ));
}

/// A call node that lost its method descriptor names no member.
#[test]
fn call_without_method_is_not_found() {
    let types = sample::sample_registry();
    let serializer = ExpressionSerializer::new(&types);
    let mut node = serializer.serialize_lambda(&query_over_sub_models(&types, "Any", 1)).unwrap();
    let PortableNode::MethodCall(call) = lambda_body(&mut node) else {
        panic!("expected a call body");
    };
    call.method = None;

    match serializer.deserialize(&node) {
        Err(SerializeError::MemberNotFound { member_kind, .. }) => {
            assert_eq!(member_kind, MemberKind::Method)
        }
        other => panic!("expected MemberNotFound, got {:?}", other),
    }
}

// ── Constructors ───────────────────────────────────────────────────────

/// Constructors are never generic; a descriptor claiming type arguments
/// matches nothing.
#[test]
fn constructor_with_generic_arguments_is_not_found() {
    let types = sample::sample_registry();
    let model = sample::model_type();
    let ctor = types.constructor(&model, &[]).unwrap();
    let serializer = ExpressionSerializer::new(&types);
    let mut node = serializer.serialize(&Expr::new_object(ctor, Vec::new()).unwrap()).unwrap();
    let PortableNode::New(new) = &mut node else {
        panic!("expected a New node");
    };
    let Some(MemberDescriptor::Constructor(descriptor)) = new.constructor.as_mut() else {
        panic!("expected a constructor descriptor");
    };
    descriptor.generic_arguments.push(describe(&Ty::int32()));

    match serializer.deserialize(&node) {
        Err(SerializeError::AmbiguousOrNotFoundMember { member_kind, candidates, .. }) => {
            assert_eq!(member_kind, MemberKind::Constructor);
            assert_eq!(candidates, 0);
        }
        other => panic!("expected no surviving constructor, got {:?}", other),
    }
}

// ── Node kinds ─────────────────────────────────────────────────────────

/// An extension node with nothing to reduce to cannot be encoded.
#[test]
fn irreducible_extension_is_unsupported() {
    let types = sample::sample_registry();
    let custom = Expr::extension("Custom", Ty::int32(), None);
    match ExpressionSerializer::new(&types).serialize(&custom) {
        Err(SerializeError::UnsupportedNodeKind { kind }) => assert_eq!(kind, "Custom"),
        other => panic!("expected UnsupportedNodeKind, got {:?}", other),
    }
}

/// A Binary node carrying a unary operator is refused.
#[test]
fn binary_node_with_unary_operator_is_unsupported() {
    let types = sample::sample_registry();
    let serializer = ExpressionSerializer::new(&types);
    let one = Expr::constant(Value::Int32(1), Ty::int32());
    let sum = Expr::binary(NodeType::Add, one.clone(), one).unwrap();
    let mut node = serializer.serialize(&sum).unwrap();
    let PortableNode::Binary(binary) = &mut node else {
        panic!("expected a Binary node");
    };
    binary.node_type = NodeType::Negate;

    match serializer.deserialize(&node) {
        Err(SerializeError::UnsupportedNodeKind { kind }) => {
            assert!(kind.starts_with("Binary"), "{}", kind);
            assert!(kind.contains("Negate"), "{}", kind);
        }
        other => panic!("expected UnsupportedNodeKind, got {:?}", other),
    }
}

// ── Parameters ─────────────────────────────────────────────────────────

/// A use site whose slot points at a declaration with another name fails
/// the decode instead of leaving an unbound parameter.
#[test]
fn use_site_disagreeing_with_its_declaration_is_invalid() {
    let types = sample::sample_registry();
    let serializer = ExpressionSerializer::new(&types);
    let mut node = serializer.serialize_lambda(&Scenario::C.build(&types).unwrap()).unwrap();
    let PortableNode::Block(block) = lambda_body(&mut node) else {
        panic!("expected a block body");
    };
    let PortableNode::Binary(sum) = block.result.as_mut() else {
        panic!("expected the block to end in a sum");
    };
    let PortableNode::Parameter(x) = sum.left.as_mut() else {
        panic!("expected a parameter operand");
    };
    x.name = Some("z".to_string());

    match serializer.deserialize(&node) {
        Err(SerializeError::InvalidNode { node, reason }) => {
            assert_eq!(node, "Parameter");
            assert!(reason.contains("`x: "), "{}", reason);
        }
        other => panic!("expected InvalidNode, got {:?}", other),
    }
}
