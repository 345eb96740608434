//! Constant literals: host values to JSON and back.
//!
//! Enum values travel by symbolic name. Decoding coerces the literal into
//! the resolved constant type: enum names become enum values, numbers are
//! range checked, numeric strings are parsed.

use exprtree_host::registry::TypeKind;
use exprtree_host::ty::names;
use exprtree_host::value::list;
use exprtree_host::{Ty, TypeSystem, Value};
use serde_json::{Number, Value as Json};

use crate::error::{Result, SerializeError};

/// The literal for `value`. `None` stands for null.
pub fn encode_constant(types: &dyn TypeSystem, value: &Value, ty: &Ty) -> Result<Option<Json>> {
    let literal = match value {
        Value::Null => return Ok(None),
        Value::Bool(b) => Json::Bool(*b),
        Value::Int32(n) => Json::from(*n),
        Value::Int64(n) => Json::from(*n),
        Value::Double(d) => match Number::from_f64(*d) {
            Some(n) => Json::Number(n),
            None => Json::String(d.to_string()),
        },
        Value::Char(c) => Json::String(c.to_string()),
        Value::String(s) => Json::String(s.to_string()),
        Value::Enum(enum_ty, n) => match enum_variant_name(types, enum_ty, *n) {
            Some(name) => Json::String(name),
            None => Json::from(*n),
        },
        Value::List(items) => {
            let item_ty = items.ty().sequence_item().cloned().unwrap_or_else(Ty::object);
            let encoded = items
                .snapshot()
                .iter()
                .map(|item| Ok(encode_constant(types, item, &item_ty)?.unwrap_or(Json::Null)))
                .collect::<Result<Vec<_>>>()?;
            Json::Array(encoded)
        }
        Value::Object(_) | Value::Function(_) => {
            return Err(SerializeError::UnsupportedConstant { ty: ty.to_string() })
        }
    };
    Ok(Some(literal))
}

/// Coerce a literal into a value of type `ty`.
pub fn decode_constant(types: &dyn TypeSystem, literal: Option<&Json>, ty: &Ty) -> Result<Value> {
    let literal = match literal {
        None | Some(Json::Null) => return null_of(types, ty),
        Some(literal) => literal,
    };
    if let Some(variants) = enum_variants(types, ty) {
        return decode_enum(&variants, literal, ty);
    }
    if let Some(element) = ty.element_type() {
        return decode_sequence(types, literal, ty, element);
    }
    if ty.type_name().is_some_and(|n| n.full_name == names::LIST_OF_T) {
        if let Some(item) = ty.sequence_item() {
            return decode_sequence(types, literal, ty, item);
        }
    }

    let full_name = ty.type_name().map(|n| n.full_name.as_str());
    let value = match full_name {
        Some(names::BOOLEAN) => match literal {
            Json::Bool(b) => Some(Value::Bool(*b)),
            Json::String(s) => s.trim().to_ascii_lowercase().parse().ok().map(Value::Bool),
            _ => None,
        },
        Some(names::INT32) => {
            integer(literal).and_then(|n| i32::try_from(n).ok()).map(Value::Int32)
        }
        Some(names::INT64) => integer(literal).map(Value::Int64),
        Some(names::DOUBLE) => match literal {
            Json::Number(n) => n.as_f64().map(Value::Double),
            Json::String(s) => s.trim().parse().ok().map(Value::Double),
            _ => None,
        },
        Some(names::CHAR) => match literal {
            Json::String(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(Value::Char(c)),
                    _ => None,
                }
            }
            Json::Number(n) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .and_then(char::from_u32)
                .map(Value::Char),
            _ => None,
        },
        Some(names::STRING) => match literal {
            Json::String(s) => Some(Value::string(s)),
            Json::Bool(_) | Json::Number(_) => Some(Value::string(literal.to_string())),
            _ => None,
        },
        Some(names::OBJECT) => infer(literal),
        _ => None,
    };
    value.ok_or_else(|| conversion(literal, ty))
}

fn conversion(literal: &Json, ty: &Ty) -> SerializeError {
    SerializeError::ConstantConversion { value: literal.to_string(), ty: ty.to_string() }
}

/// Null is only a value of reference types.
fn null_of(types: &dyn TypeSystem, ty: &Ty) -> Result<Value> {
    let is_value_type = types.type_def(ty).is_some_and(|def| def.is_value_type());
    if is_value_type {
        return Err(conversion(&Json::Null, ty));
    }
    Ok(Value::Null)
}

/// An integral literal, or a string that parses as one. Doubles with no
/// fractional part are accepted.
fn integer(literal: &Json) -> Option<i64> {
    match literal {
        Json::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|d| d.fract() == 0.0 && *d >= i64::MIN as f64 && *d <= i64::MAX as f64)
                .map(|d| d as i64)
        }),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Best-effort value for a constant typed as `Object`.
fn infer(literal: &Json) -> Option<Value> {
    match literal {
        Json::Bool(b) => Some(Value::Bool(*b)),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Some(i32::try_from(i).map(Value::Int32).unwrap_or(Value::Int64(i))),
            None => n.as_f64().map(Value::Double),
        },
        Json::String(s) => Some(Value::string(s)),
        _ => None,
    }
}

// ── Enums ──────────────────────────────────────────────────────────────

fn enum_variants(types: &dyn TypeSystem, ty: &Ty) -> Option<Vec<(String, i64)>> {
    let def = types.type_def(ty)?;
    match &def.kind {
        TypeKind::Enum(variants) => Some(variants.clone()),
        _ => None,
    }
}

fn enum_variant_name(types: &dyn TypeSystem, ty: &Ty, value: i64) -> Option<String> {
    enum_variants(types, ty)?
        .into_iter()
        .find(|(_, v)| *v == value)
        .map(|(name, _)| name)
}

fn decode_enum(variants: &[(String, i64)], literal: &Json, ty: &Ty) -> Result<Value> {
    let value = match literal {
        Json::String(name) => variants
            .iter()
            .find(|(variant, _)| variant == name.trim())
            .map(|(_, v)| *v)
            .or_else(|| name.trim().parse().ok()),
        other => integer(other),
    };
    value
        .map(|v| Value::Enum(ty.clone(), v))
        .ok_or_else(|| conversion(literal, ty))
}

// ── Sequences ──────────────────────────────────────────────────────────

fn decode_sequence(types: &dyn TypeSystem, literal: &Json, ty: &Ty, item: &Ty) -> Result<Value> {
    let Json::Array(elements) = literal else {
        return Err(conversion(literal, ty));
    };
    let items = elements
        .iter()
        .map(|element| decode_constant(types, Some(element), item))
        .collect::<Result<Vec<_>>>()?;
    Ok(list(ty.clone(), items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use exprtree_host::sample;
    use serde_json::json;

    #[test]
    fn enums_travel_by_name() {
        let types = sample::sample_registry();
        let green = Value::Enum(sample::color_type(), 1);
        let literal = encode_constant(&types, &green, &sample::color_type()).unwrap();
        assert_eq!(literal, Some(json!("Green")));
        let back = decode_constant(&types, literal.as_ref(), &sample::color_type()).unwrap();
        assert_eq!(back, green);
    }

    #[test]
    fn numbers_are_range_checked() {
        let types = sample::sample_registry();
        let too_big = json!(i64::from(i32::MAX) + 1);
        assert!(matches!(
            decode_constant(&types, Some(&too_big), &Ty::int32()),
            Err(SerializeError::ConstantConversion { .. })
        ));
        assert_eq!(
            decode_constant(&types, Some(&too_big), &Ty::int64()).unwrap(),
            Value::Int64(i64::from(i32::MAX) + 1)
        );
    }

    #[test]
    fn numeric_strings_are_parsed() {
        let types = sample::sample_registry();
        assert_eq!(
            decode_constant(&types, Some(&json!("42")), &Ty::int32()).unwrap(),
            Value::Int32(42)
        );
        assert_eq!(
            decode_constant(&types, Some(&json!("2.5")), &Ty::double()).unwrap(),
            Value::Double(2.5)
        );
    }

    #[test]
    fn null_is_rejected_for_value_types() {
        let types = sample::sample_registry();
        assert_eq!(decode_constant(&types, None, &Ty::string()).unwrap(), Value::Null);
        assert!(decode_constant(&types, None, &Ty::int32()).is_err());
    }

    #[test]
    fn objects_have_no_literal_form() {
        let types = sample::sample_registry();
        let model = sample::model(&types, 1, "a", Vec::new());
        assert!(matches!(
            encode_constant(&types, &model, &sample::model_type()),
            Err(SerializeError::UnsupportedConstant { .. })
        ));
    }

    #[test]
    fn arrays_decode_element_wise() {
        let types = sample::sample_registry();
        let value = decode_constant(&types, Some(&json!([1, 2, 3])), &Ty::array(Ty::int32())).unwrap();
        let Value::List(items) = value else {
            panic!("expected a list");
        };
        assert_eq!(items.snapshot(), vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)]);
    }
}
