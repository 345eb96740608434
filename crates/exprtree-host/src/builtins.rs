//! The core library: primitive types, strings, exceptions, collections,
//! delegate types and the sequence query operators.

use std::rc::Rc;

use crate::error::EvalError;
use crate::eval::Invoker;
use crate::registry::{
    CtorDef, FieldDef, MethodDef, NativeFn, PropertyDef, TypeDef, TypeKind, TypeRegistry,
};
use crate::ty::{names, ModuleIdentity, Ty, TypeName};
use crate::value::{list, Value};

// ── Argument helpers ───────────────────────────────────────────────────

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Null)
}

fn string_value(value: Option<&Value>, operation: &str) -> Result<Rc<str>, EvalError> {
    match value {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Null) | None => Err(EvalError::NullReference { context: operation.to_string() }),
        Some(other) => Err(EvalError::mismatch(operation, "String", other)),
    }
}

fn int32_value(value: Option<&Value>, operation: &str) -> Result<i32, EvalError> {
    match value {
        Some(Value::Int32(n)) => Ok(*n),
        Some(other) => Err(EvalError::mismatch(operation, "Int32", other)),
        None => Err(EvalError::NullReference { context: operation.to_string() }),
    }
}

fn double_value(value: Option<&Value>, operation: &str) -> Result<f64, EvalError> {
    match value {
        Some(Value::Double(d)) => Ok(*d),
        Some(other) => Err(EvalError::mismatch(operation, "Double", other)),
        None => Err(EvalError::NullReference { context: operation.to_string() }),
    }
}

/// The items of a sequence argument, snapshotted.
fn sequence(value: Option<&Value>, operation: &str) -> Result<Vec<Value>, EvalError> {
    match value {
        Some(Value::List(items)) => Ok(items.snapshot()),
        Some(Value::Null) | None => Err(EvalError::NullReference { context: operation.to_string() }),
        Some(other) => Err(EvalError::mismatch(operation, "sequence", other)),
    }
}

fn predicate(
    invoker: &mut dyn Invoker,
    function: &Value,
    item: Value,
    operation: &str,
) -> Result<bool, EvalError> {
    let result = invoker.invoke(function, &[item])?;
    result.as_bool().ok_or_else(|| EvalError::mismatch(operation, "Boolean", &result))
}

/// Format an integer the way `Int32.ToString(format)` does for the
/// standard `X` and `D` specifiers.
pub fn format_int32(value: i32, format: &str) -> Result<String, EvalError> {
    let mut chars = format.chars();
    let specifier = chars.next();
    let precision = chars.as_str();
    let width: usize = if precision.is_empty() {
        0
    } else {
        precision
            .parse()
            .map_err(|_| EvalError::InvalidOperation(format!("invalid format string `{}`", format)))?
    };
    Ok(match specifier {
        None | Some('G' | 'g') => value.to_string(),
        Some('X') => format!("{:0width$X}", value, width = width),
        Some('x') => format!("{:0width$x}", value, width = width),
        Some('D' | 'd') => {
            let digits = format!("{:0width$}", value.unsigned_abs(), width = width);
            if value < 0 {
                format!("-{}", digits)
            } else {
                digits
            }
        }
        Some(_) => {
            return Err(EvalError::InvalidOperation(format!("invalid format string `{}`", format)))
        }
    })
}

// ── Registration ───────────────────────────────────────────────────────

fn value_type(full_name: &str) -> TypeDef {
    TypeDef::new(TypeName::core(full_name), TypeKind::Struct).extends(Ty::object())
}

fn delegate(full_name: &str, params: &[&str]) -> TypeDef {
    TypeDef::new(TypeName::core(full_name), TypeKind::Delegate)
        .extends(Ty::object())
        .generic(params)
}

/// Register the core library types with `registry`.
pub fn register_core_library(registry: &mut TypeRegistry) {
    registry.register(TypeDef::new(TypeName::core(names::OBJECT), TypeKind::Class));
    registry.register(value_type(names::VOID));
    registry.register(value_type(names::BOOLEAN));
    registry.register(value_type(names::INT64));
    registry.register(value_type(names::DOUBLE));
    registry.register(value_type(names::CHAR));
    register_int32(registry);
    register_string(registry);
    register_exceptions(registry);
    register_math(registry);
    register_collections(registry);
    register_delegates(registry);
    register_enumerable(registry);
}

fn register_int32(registry: &mut TypeRegistry) {
    registry.register(
        value_type(names::INT32)
            .method(MethodDef::new(
                "ToString",
                Ty::string(),
                NativeFn::new(|_, this, _| {
                    let n = int32_value(this, "Int32.ToString")?;
                    Ok(Value::string(n.to_string()))
                }),
            ))
            .method(
                MethodDef::new(
                    "ToString",
                    Ty::string(),
                    NativeFn::new(|_, this, args| {
                        let n = int32_value(this, "Int32.ToString")?;
                        let format = string_value(args.first(), "Int32.ToString")?;
                        Ok(Value::string(format_int32(n, &format)?))
                    }),
                )
                .param("format", Ty::string()),
            ),
    );
}

fn register_string(registry: &mut TypeRegistry) {
    let string = TypeDef::class(TypeName::core(names::STRING))
        .field(FieldDef::new("Empty", Ty::string()).constant(NativeFn::new(|_, _, _| Ok(Value::string("")))))
        .property(PropertyDef::new("Length", Ty::int32()).computed(NativeFn::new(|_, this, _| {
            let s = string_value(this, "String.Length")?;
            let length = i32::try_from(s.encode_utf16().count()).map_err(|_| EvalError::Overflow)?;
            Ok(Value::Int32(length))
        })))
        .method(
            MethodDef::new(
                "Contains",
                Ty::boolean(),
                NativeFn::new(|_, this, args| {
                    let s = string_value(this, "String.Contains")?;
                    let value = string_value(args.first(), "String.Contains")?;
                    Ok(Value::Bool(s.contains(&*value)))
                }),
            )
            .param("value", Ty::string()),
        )
        .method(
            MethodDef::new(
                "Contains",
                Ty::boolean(),
                NativeFn::new(|_, this, args| {
                    let s = string_value(this, "String.Contains")?;
                    match arg(args, 0) {
                        Value::Char(c) => Ok(Value::Bool(s.contains(c))),
                        other => Err(EvalError::mismatch("String.Contains", "Char", &other)),
                    }
                }),
            )
            .param("value", Ty::char()),
        )
        .method(
            MethodDef::new(
                "StartsWith",
                Ty::boolean(),
                NativeFn::new(|_, this, args| {
                    let s = string_value(this, "String.StartsWith")?;
                    let value = string_value(args.first(), "String.StartsWith")?;
                    Ok(Value::Bool(s.starts_with(&*value)))
                }),
            )
            .param("value", Ty::string()),
        )
        .method(MethodDef::new(
            "ToUpper",
            Ty::string(),
            NativeFn::new(|_, this, _| {
                let s = string_value(this, "String.ToUpper")?;
                Ok(Value::string(s.to_uppercase()))
            }),
        ))
        .method(
            MethodDef::new(
                "Concat",
                Ty::string(),
                NativeFn::new(|_, _, args| {
                    // Null arguments concatenate as empty strings.
                    let part = |i| match arg(args, i) {
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    Ok(Value::string(format!("{}{}", part(0), part(1))))
                }),
            )
            .as_static()
            .param("str0", Ty::string())
            .param("str1", Ty::string()),
        )
        .method(
            MethodDef::new(
                "IsNullOrEmpty",
                Ty::boolean(),
                NativeFn::new(|_, _, args| {
                    Ok(Value::Bool(match arg(args, 0) {
                        Value::Null => true,
                        Value::String(s) => s.is_empty(),
                        other => return Err(EvalError::mismatch("String.IsNullOrEmpty", "String", &other)),
                    }))
                }),
            )
            .as_static()
            .param("value", Ty::string()),
        );
    registry.register(string);
}

fn with_message() -> NativeFn {
    NativeFn::new(|_, this, args| {
        let Some(Value::Object(obj)) = this else {
            return Err(EvalError::NullReference { context: "exception constructor".into() });
        };
        obj.set("Message", arg(args, 0));
        Ok(Value::Object(obj.clone()))
    })
}

fn register_exceptions(registry: &mut TypeRegistry) {
    registry.register(
        TypeDef::class(TypeName::core(names::EXCEPTION))
            .property(PropertyDef::new("Message", Ty::string()))
            .constructor(CtorDef::new())
            .constructor(CtorDef::new().param("message", Ty::string()).body(with_message())),
    );
    registry.register(
        TypeDef::class(TypeName::core(names::INVALID_OPERATION))
            .extends(Ty::exception())
            .constructor(CtorDef::new())
            .constructor(CtorDef::new().param("message", Ty::string()).body(with_message())),
    );
}

fn register_math(registry: &mut TypeRegistry) {
    let math = TypeDef::class(TypeName::core(names::MATH))
        .method(
            MethodDef::new(
                "Max",
                Ty::int32(),
                NativeFn::new(|_, _, args| {
                    let a = int32_value(args.first(), "Math.Max")?;
                    let b = int32_value(args.get(1), "Math.Max")?;
                    Ok(Value::Int32(a.max(b)))
                }),
            )
            .as_static()
            .param("val1", Ty::int32())
            .param("val2", Ty::int32()),
        )
        .method(
            MethodDef::new(
                "Max",
                Ty::double(),
                NativeFn::new(|_, _, args| {
                    let a = double_value(args.first(), "Math.Max")?;
                    let b = double_value(args.get(1), "Math.Max")?;
                    Ok(Value::Double(a.max(b)))
                }),
            )
            .as_static()
            .param("val1", Ty::double())
            .param("val2", Ty::double()),
        )
        .method(
            MethodDef::new(
                "Abs",
                Ty::int32(),
                NativeFn::new(|_, _, args| {
                    let n = int32_value(args.first(), "Math.Abs")?;
                    n.checked_abs().map(Value::Int32).ok_or(EvalError::Overflow)
                }),
            )
            .as_static()
            .param("value", Ty::int32()),
        );
    registry.register(math);
}

fn register_collections(registry: &mut TypeRegistry) {
    let t = Ty::type_param("T", 0);
    registry.register(
        TypeDef::new(TypeName::core(names::ENUMERABLE_OF_T), TypeKind::Interface).generic(&["T"]),
    );
    registry.register(
        TypeDef::class(TypeName::core(names::LIST_OF_T))
            .generic(&["T"])
            .implements(Ty::enumerable(t.clone()))
            .constructor(CtorDef::new().body(NativeFn::new(|_, this, _| {
                let ty = this.and_then(Value::runtime_type).unwrap_or_else(|| Ty::list(Ty::object()));
                Ok(list(ty, Vec::new()))
            })))
            .property(PropertyDef::new("Count", Ty::int32()).computed(NativeFn::new(|_, this, _| {
                let items = sequence(this, "List.Count")?;
                Ok(Value::Int32(i32::try_from(items.len()).map_err(|_| EvalError::Overflow)?))
            })))
            .method(
                MethodDef::new(
                    "Add",
                    Ty::void(),
                    NativeFn::new(|_, this, args| match this {
                        Some(Value::List(items)) => {
                            items.push(arg(args, 0));
                            Ok(Value::Null)
                        }
                        Some(other) => Err(EvalError::mismatch("List.Add", "List", other)),
                        None => Err(EvalError::NullReference { context: "List.Add".into() }),
                    }),
                )
                .param("item", t),
            ),
    );
    registry.register(
        TypeDef::new(TypeName::core(names::RUNTIME_VARIABLES), TypeKind::Interface),
    );
}

fn register_delegates(registry: &mut TypeRegistry) {
    const FUNC_PARAMS: [&str; 4] = ["T1", "T2", "T3", "T4"];
    for arity in 1..=5 {
        let mut params: Vec<&str> = if arity == 2 {
            vec!["T"]
        } else {
            FUNC_PARAMS[..arity - 1].to_vec()
        };
        params.push("TResult");
        registry.register(delegate(&format!("{}{}", names::FUNC_PREFIX, arity), &params));
    }
    registry.register(delegate(names::ACTION, &[]));
    registry.register(delegate(&format!("{}`1", names::ACTION), &["T"]));
    registry.register(delegate(&format!("{}`2", names::ACTION), &["T1", "T2"]));
}

fn register_enumerable(registry: &mut TypeRegistry) {
    let source = Ty::method_param("TSource", 0);
    let sequence_of_source = Ty::enumerable(source.clone());
    let query = |name: &str, return_type: Ty, body: NativeFn| {
        MethodDef::new(name, return_type, body)
            .as_static()
            .generic(&["TSource"])
            .param("source", Ty::enumerable(Ty::method_param("TSource", 0)))
    };

    let enumerable = TypeDef::class(TypeName::new(names::LINQ_ENUMERABLE, ModuleIdentity::linq()))
        .method(query(
            "Any",
            Ty::boolean(),
            NativeFn::new(|_, _, args| {
                Ok(Value::Bool(!sequence(args.first(), "Enumerable.Any")?.is_empty()))
            }),
        ))
        .method(
            query(
                "Any",
                Ty::boolean(),
                NativeFn::new(|invoker, _, args| {
                    let test = arg(args, 1);
                    for item in sequence(args.first(), "Enumerable.Any")? {
                        if predicate(invoker, &test, item, "Enumerable.Any")? {
                            return Ok(Value::Bool(true));
                        }
                    }
                    Ok(Value::Bool(false))
                }),
            )
            .param("predicate", Ty::func(vec![source.clone()], Ty::boolean())),
        )
        .method(query(
            "Count",
            Ty::int32(),
            NativeFn::new(|_, _, args| {
                let count = sequence(args.first(), "Enumerable.Count")?.len();
                Ok(Value::Int32(i32::try_from(count).map_err(|_| EvalError::Overflow)?))
            }),
        ))
        .method(
            query(
                "Sum",
                Ty::int32(),
                NativeFn::new(|invoker, _, args| {
                    let selector = arg(args, 1);
                    let mut total: i32 = 0;
                    for item in sequence(args.first(), "Enumerable.Sum")? {
                        let value = invoker.invoke(&selector, &[item])?;
                        let n = int32_value(Some(&value), "Enumerable.Sum")?;
                        total = total.checked_add(n).ok_or(EvalError::Overflow)?;
                    }
                    Ok(Value::Int32(total))
                }),
            )
            .param("selector", Ty::func(vec![source.clone()], Ty::int32())),
        )
        .method(
            query(
                "Where",
                sequence_of_source,
                NativeFn::new(|invoker, _, args| {
                    let test = arg(args, 1);
                    let item_type = match args.first() {
                        Some(Value::List(items)) => items.ty().sequence_item().cloned(),
                        _ => None,
                    };
                    let mut kept = Vec::new();
                    for item in sequence(args.first(), "Enumerable.Where")? {
                        if predicate(invoker, &test, item.clone(), "Enumerable.Where")? {
                            kept.push(item);
                        }
                    }
                    Ok(list(Ty::enumerable(item_type.unwrap_or_else(Ty::object)), kept))
                }),
            )
            .param("predicate", Ty::func(vec![source.clone()], Ty::boolean())),
        )
        .method(query(
            "First",
            source,
            NativeFn::new(|_, _, args| {
                sequence(args.first(), "Enumerable.First")?
                    .into_iter()
                    .next()
                    .ok_or_else(|| EvalError::InvalidOperation("sequence contains no elements".into()))
            }),
        ));
    registry.register(enumerable);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{BindingFlags, TypeSystem};

    #[test]
    fn hex_formatting_matches_standard_specifiers() {
        assert_eq!(format_int32(255, "X").unwrap(), "FF");
        assert_eq!(format_int32(255, "x4").unwrap(), "00ff");
        assert_eq!(format_int32(-1, "X").unwrap(), "FFFFFFFF");
        assert_eq!(format_int32(-7, "D3").unwrap(), "-007");
        assert!(format_int32(1, "Q").is_err());
    }

    #[test]
    fn func_definitions_have_expected_arity() {
        let types = TypeRegistry::with_core_library();
        for arity in 1..=5 {
            let def = types.get(&format!("System.Func`{}", arity)).unwrap();
            assert_eq!(def.generic_params.len(), arity);
            assert_eq!(def.generic_params.last().map(String::as_str), Some("TResult"));
        }
    }

    #[test]
    fn string_overloads_are_distinguished_by_parameter_type() {
        let types = TypeRegistry::with_core_library();
        let by_string = types.method(&Ty::string(), "Contains", BindingFlags::PUBLIC_INSTANCE, &[Ty::string()]);
        let by_char = types.method(&Ty::string(), "Contains", BindingFlags::PUBLIC_INSTANCE, &[Ty::char()]);
        assert!(by_string.is_some());
        assert!(by_char.is_some());
        assert_ne!(by_string, by_char);
    }
}
