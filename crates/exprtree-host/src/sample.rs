//! A small demo domain (`Demo.Models`) and the example graphs built over it.

use crate::builtins::format_int32;
use crate::error::{EvalError, HostError};
use crate::expr::{Expr, LambdaExpr, NodeType, ParameterExpr};
use crate::reflect::{BindingFlags, TypeSystem};
use crate::registry::{
    CtorDef, FieldDef, MethodDef, NativeFn, PropertyDef, TypeDef, TypeKind, TypeRegistry,
};
use crate::ty::{ModuleIdentity, Ty, TypeName};
use crate::value::{list_of, Value};

pub const SAMPLE_MODULE: &str = "Demo.Models";

pub mod names {
    pub const MODEL: &str = "Demo.Model";
    pub const COLOR: &str = "Demo.Color";
    pub const MODEL_EXTENSIONS: &str = "Demo.ModelExtensions";
    pub const OVERLOADS: &str = "Demo.Overloads";
}

fn sample_type(full_name: &str) -> Ty {
    Ty::Con(TypeName::new(full_name, ModuleIdentity::new(SAMPLE_MODULE)))
}

pub fn model_type() -> Ty {
    sample_type(names::MODEL)
}

pub fn color_type() -> Ty {
    sample_type(names::COLOR)
}

pub fn extensions_type() -> Ty {
    sample_type(names::MODEL_EXTENSIONS)
}

pub fn overloads_type() -> Ty {
    sample_type(names::OVERLOADS)
}

fn type_name(full_name: &str) -> TypeName {
    TypeName::new(full_name, ModuleIdentity::new(SAMPLE_MODULE))
}

/// Register `Demo.Model`, `Demo.Color`, `Demo.ModelExtensions` and
/// `Demo.Overloads`.
pub fn register_sample_domain(registry: &mut TypeRegistry) {
    let model = TypeDef::class(type_name(names::MODEL))
        .property(PropertyDef::new("StringProperty", Ty::string()))
        .property(PropertyDef::new("Int32Property", Ty::int32()))
        .property(PropertyDef::new("SubModels", Ty::enumerable(model_type())))
        .property(PropertyDef::new("Color", color_type()))
        .property(PropertyDef::new("Tags", Ty::list(Ty::string())))
        .field(FieldDef::new("Id", Ty::int64()))
        .field(FieldDef::new("secret", Ty::string()).non_public())
        .field(
            FieldDef::new("MaxItems", Ty::int32())
                .constant(NativeFn::new(|_, _, _| Ok(Value::Int32(100)))),
        )
        .constructor(CtorDef::new().body(NativeFn::new(|_, this, _| {
            let Some(Value::Object(obj)) = this else {
                return Err(EvalError::NullReference { context: "Model constructor".into() });
            };
            obj.set("Tags", list_of(Ty::string(), Vec::new()));
            Ok(Value::Object(obj.clone()))
        })))
        .constructor(
            CtorDef::new()
                .param("stringProperty", Ty::string())
                .param("int32Property", Ty::int32())
                .body(NativeFn::new(|_, this, args| {
                    let Some(Value::Object(obj)) = this else {
                        return Err(EvalError::NullReference { context: "Model constructor".into() });
                    };
                    obj.set("StringProperty", args.first().cloned().unwrap_or(Value::Null));
                    obj.set("Int32Property", args.get(1).cloned().unwrap_or(Value::Int32(0)));
                    obj.set("Tags", list_of(Ty::string(), Vec::new()));
                    Ok(Value::Object(obj.clone()))
                })),
        );
    registry.register(model);

    registry.register(
        TypeDef::new(
            type_name(names::COLOR),
            TypeKind::Enum(vec![("Red".into(), 0), ("Green".into(), 1), ("Blue".into(), 2)]),
        )
        .extends(Ty::object()),
    );

    registry.register(
        TypeDef::class(type_name(names::MODEL_EXTENSIONS)).method(
            MethodDef::new(
                "AsHex",
                Ty::string(),
                NativeFn::new(|_, _, args| match args.first() {
                    Some(Value::Int32(n)) => Ok(Value::string(format_int32(*n, "X")?)),
                    Some(other) => Err(EvalError::mismatch("AsHex", "Int32", other)),
                    None => Err(EvalError::NullReference { context: "AsHex".into() }),
                }),
            )
            .as_static()
            .param("value", Ty::int32()),
        ),
    );

    // Two overloads whose parameter types differ only in their generic
    // argument.
    let count = || {
        NativeFn::new(|_, _, args| match args.first() {
            Some(Value::List(items)) => Ok(Value::Int32(items.len() as i32)),
            _ => Ok(Value::Int32(0)),
        })
    };
    registry.register(
        TypeDef::class(type_name(names::OVERLOADS))
            .method(
                MethodDef::new("Pick", Ty::int32(), count())
                    .as_static()
                    .param("items", Ty::enumerable(Ty::int32())),
            )
            .method(
                MethodDef::new("Pick", Ty::int32(), count())
                    .as_static()
                    .param("items", Ty::enumerable(Ty::string())),
            ),
    );
}

/// The core library plus the sample domain.
pub fn sample_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::with_core_library();
    register_sample_domain(&mut registry);
    registry
}

/// A `Demo.Model` instance.
pub fn model(types: &TypeRegistry, int32: i32, string: &str, sub_models: Vec<Value>) -> Value {
    let value = types.instantiate(&model_type());
    if let Value::Object(obj) = &value {
        obj.set("Int32Property", Value::Int32(int32));
        obj.set("StringProperty", Value::string(string));
        obj.set("SubModels", list_of(model_type(), sub_models));
        obj.set("Tags", list_of(Ty::string(), Vec::new()));
    }
    value
}

/// A `Demo.Model` with the given color and no sub-models.
pub fn colored_model(types: &TypeRegistry, variant: &str) -> Value {
    let value = model(types, 0, variant, Vec::new());
    if let (Value::Object(obj), Some(color)) = (&value, types.enum_value(&color_type(), variant)) {
        obj.set("Color", color);
    }
    value
}

// ── Scenarios ──────────────────────────────────────────────────────────

fn missing(member: &str) -> HostError {
    HostError::invalid("sample", format!("`{}` is not registered", member))
}

fn int(n: i32) -> Expr {
    Expr::constant(Value::Int32(n), Ty::int32())
}

/// The example graphs shipped with the demo domain.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Scenario {
    /// `m => m.Int32Property > 50 ? m.StringProperty : m.Int32Property.AsHex()`
    A,
    /// `m => m.SubModels.Any(s => s.Int32Property > 50)`
    B,
    /// `() => { var x; x = 5; x + x }`
    C,
    /// `m => m.Color == Color.Green`
    D,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [Scenario::A, Scenario::B, Scenario::C, Scenario::D];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::A => "a",
            Scenario::B => "b",
            Scenario::C => "c",
            Scenario::D => "d",
        }
    }

    pub fn from_name(name: &str) -> Option<Scenario> {
        Scenario::ALL.into_iter().find(|s| s.name().eq_ignore_ascii_case(name))
    }

    pub fn build(self, types: &dyn TypeSystem) -> Result<LambdaExpr, HostError> {
        match self {
            Scenario::A => conditional_hex(types),
            Scenario::B => any_sub_model(types),
            Scenario::C => block_with_local(),
            Scenario::D => enum_comparison(types),
        }
    }

    /// Argument lists the scenario is evaluated against.
    pub fn inputs(self, types: &TypeRegistry) -> Vec<Vec<Value>> {
        match self {
            Scenario::A => vec![
                vec![model(types, 10, "a", Vec::new())],
                vec![model(types, 99, "b", Vec::new())],
            ],
            Scenario::B => vec![
                vec![model(
                    types,
                    1,
                    "parent",
                    vec![model(types, 10, "low", Vec::new()), model(types, 70, "high", Vec::new())],
                )],
                vec![model(types, 2, "parent", vec![model(types, 10, "low", Vec::new())])],
            ],
            Scenario::C => vec![Vec::new()],
            Scenario::D => vec![
                vec![colored_model(types, "Green")],
                vec![colored_model(types, "Red")],
            ],
        }
    }
}

fn conditional_hex(types: &dyn TypeSystem) -> Result<LambdaExpr, HostError> {
    let m = ParameterExpr::named(model_type(), "m");
    let int32 = Expr::property_or_field(types, Expr::parameter(&m), "Int32Property")?;
    let string = Expr::property_or_field(types, Expr::parameter(&m), "StringProperty")?;
    let as_hex = types
        .method(&extensions_type(), "AsHex", BindingFlags::PUBLIC_STATIC, &[Ty::int32()])
        .ok_or_else(|| missing("ModelExtensions.AsHex"))?;
    let test = Expr::binary(NodeType::GreaterThan, int32.clone(), int(50))?;
    let hex = Expr::call(None, as_hex, vec![int32])?;
    LambdaExpr::new(Expr::condition(test, string, hex, None)?, vec![m])
}

fn any_sub_model(types: &dyn TypeSystem) -> Result<LambdaExpr, HostError> {
    let m = ParameterExpr::named(model_type(), "m");
    let s = ParameterExpr::named(model_type(), "s");
    let predicate = LambdaExpr::new(
        Expr::binary(
            NodeType::GreaterThan,
            Expr::property_or_field(types, Expr::parameter(&s), "Int32Property")?,
            int(50),
        )?,
        vec![s],
    )?;
    let any = types
        .methods(&Ty::linq_enumerable(), BindingFlags::PUBLIC_STATIC)
        .into_iter()
        .find(|method| method.name() == "Any" && method.parameters().len() == 2)
        .ok_or_else(|| missing("Enumerable.Any"))?
        .make_generic_method(vec![model_type()])?;
    let sub_models = Expr::property_or_field(types, Expr::parameter(&m), "SubModels")?;
    let body = Expr::call(None, any, vec![sub_models, predicate.to_expr()])?;
    LambdaExpr::new(body, vec![m])
}

fn block_with_local() -> Result<LambdaExpr, HostError> {
    let x = ParameterExpr::named(Ty::int32(), "x");
    let body = Expr::block(
        vec![x.clone()],
        vec![
            Expr::binary(NodeType::Assign, Expr::parameter(&x), int(5))?,
            Expr::binary(NodeType::Add, Expr::parameter(&x), Expr::parameter(&x))?,
        ],
        None,
    )?;
    LambdaExpr::new(body, Vec::new())
}

fn enum_comparison(types: &dyn TypeSystem) -> Result<LambdaExpr, HostError> {
    let m = ParameterExpr::named(model_type(), "m");
    let color = Expr::property_or_field(types, Expr::parameter(&m), "Color")?;
    let green = Expr::constant(Value::Enum(color_type(), 1), color_type());
    LambdaExpr::new(Expr::binary(NodeType::Equal, color, green)?, vec![m])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Evaluator;

    #[test]
    fn scenarios_render_like_source() {
        let types = sample_registry();
        let rendered: Vec<String> = Scenario::ALL
            .into_iter()
            .map(|s| s.build(&types).unwrap().to_expr().to_string())
            .collect();
        insta::assert_debug_snapshot!(rendered, @r###"
        [
            "m => IIF((m.Int32Property > 50), m.StringProperty, ModelExtensions.AsHex(m.Int32Property))",
            "m => Enumerable.Any(m.SubModels, s => (s.Int32Property > 50))",
            "() => {var x; (x = 5); (x + x)}",
            "m => (m.Color == Color(1))",
        ]
        "###);
    }

    #[test]
    fn scenario_a_picks_branch_by_threshold() {
        let types = sample_registry();
        let lambda = Scenario::A.build(&types).unwrap();
        let mut evaluator = Evaluator::new(&types);
        let results: Vec<Value> = Scenario::A
            .inputs(&types)
            .iter()
            .map(|args| evaluator.call_lambda(&lambda, args).unwrap())
            .collect();
        assert_eq!(results, vec![Value::string("A"), Value::string("b")]);
    }

    #[test]
    fn overloads_share_a_generic_definition() {
        let types = sample_registry();
        let picks: Vec<_> = types
            .methods(&overloads_type(), BindingFlags::PUBLIC_STATIC)
            .into_iter()
            .filter(|m| m.name() == "Pick")
            .collect();
        assert_eq!(picks.len(), 2);
        assert_eq!(
            picks[0].parameters()[0].parameter_type.generic_type_definition(),
            picks[1].parameters()[0].parameter_type.generic_type_definition()
        );
    }
}
