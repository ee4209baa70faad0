//! Dynamic values.
//!
//! Plans execute against `serde_json::Value`. Objects are JSON objects keyed
//! by member name, collections are arrays, `char` is a one-character string,
//! enums are their member name, `DateTime` and `Guid` are strings.

use serde_json::{Map, Number, Value};

use super::ExecError;
use crate::rules::ConstantValue;
use crate::types::{flatten_members, PrimitiveKind, TypeDescriptor, TypeIntrospector};

const MIN_DATE: &str = "0001-01-01T00:00:00";
const EMPTY_GUID: &str = "00000000-0000-0000-0000-000000000000";

/// Short description of a value for error messages.
pub fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(_) => "bool".into(),
        Value::Number(n) => format!("number {}", n),
        Value::String(s) => format!("string {:?}", s),
        Value::Array(a) => format!("array of {}", a.len()),
        Value::Object(_) => "object".into(),
    }
}

/// Default value of `ty`: null for nullable and reference types, zero-like
/// for primitives, the first member for enums, a fresh instance for structs.
pub fn default_value(intro: &dyn TypeIntrospector, ty: &TypeDescriptor) -> Value {
    if ty.nullable || !ty.is_value_type() {
        return Value::Null;
    }
    if let Some(kind) = ty.primitive_kind() {
        return match kind {
            PrimitiveKind::Boolean => Value::Bool(false),
            PrimitiveKind::Char => Value::String("\0".into()),
            PrimitiveKind::DateTime => Value::String(MIN_DATE.into()),
            PrimitiveKind::Guid => Value::String(EMPTY_GUID.into()),
            k if k.is_floating() => Value::from(0.0),
            _ => Value::from(0),
        };
    }
    if let Some(shape) = intro.shape(&ty.name).filter(|s| s.is_enum) {
        return shape
            .enum_values
            .first()
            .map(|v| Value::String(v.clone()))
            .unwrap_or_else(|| Value::from(0));
    }
    new_instance(intro, ty)
}

/// `new T()`: every flattened member at its default.
pub fn new_instance(intro: &dyn TypeIntrospector, ty: &TypeDescriptor) -> Value {
    let mut object = Map::new();
    for member in flatten_members(intro, ty) {
        object.insert(member.name.clone(), default_value(intro, &member.ty));
    }
    Value::Object(object)
}

/// A declared constant as a value of `ty`.
pub fn constant_value(intro: &dyn TypeIntrospector, value: &ConstantValue, ty: &TypeDescriptor) -> Value {
    let floating = ty.primitive_kind().is_some_and(PrimitiveKind::is_floating);
    match value {
        ConstantValue::Null => default_value(intro, ty),
        ConstantValue::Bool(b) => Value::Bool(*b),
        ConstantValue::Int(i) if floating => Value::from(*i as f64),
        ConstantValue::Int(i) => Value::from(*i),
        ConstantValue::Float(x) => Number::from_f64(*x).map(Value::Number).unwrap_or(Value::Null),
        ConstantValue::Text(s) => Value::String(s.clone()),
    }
}

fn integral_range(kind: PrimitiveKind) -> Option<(i128, i128)> {
    Some(match kind {
        PrimitiveKind::Char => (0, 0xFFFF),
        PrimitiveKind::SByte => (i8::MIN.into(), i8::MAX.into()),
        PrimitiveKind::Byte => (0, u8::MAX.into()),
        PrimitiveKind::Int16 => (i16::MIN.into(), i16::MAX.into()),
        PrimitiveKind::UInt16 => (0, u16::MAX.into()),
        PrimitiveKind::Int32 => (i32::MIN.into(), i32::MAX.into()),
        PrimitiveKind::UInt32 => (0, u32::MAX.into()),
        PrimitiveKind::Int64 => (i64::MIN.into(), i64::MAX.into()),
        PrimitiveKind::UInt64 => (0, u64::MAX.into()),
        _ => return None,
    })
}

/// Numeric reading of a value. Chars read as their code point.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(f64::from(u32::from(c))),
                _ => None,
            }
        }
        _ => None,
    }
}

fn as_integer(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i128)),
        _ => as_number(value).map(|f| f as i128),
    }
}

fn integral(value: i128, kind: PrimitiveKind, to: &str) -> Result<Value, ExecError> {
    let (min, max) = integral_range(kind).ok_or_else(|| ExecError::InvalidCast {
        from: value.to_string(),
        to: to.to_string(),
    })?;
    if value < min || value > max {
        return Err(ExecError::Overflow {
            value: value.to_string(),
            to: to.to_string(),
        });
    }
    if kind == PrimitiveKind::Char {
        let c = u32::try_from(value)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| ExecError::InvalidCast {
                from: value.to_string(),
                to: to.to_string(),
            })?;
        return Ok(Value::String(c.to_string()));
    }
    Ok(if value < 0 {
        Value::from(value as i64)
    } else {
        Value::from(value as u64)
    })
}

fn floating(value: f64, kind: PrimitiveKind, to: &str) -> Result<Value, ExecError> {
    if kind == PrimitiveKind::Single && value.is_finite() && value.abs() > f64::from(f32::MAX) {
        return Err(ExecError::Overflow {
            value: value.to_string(),
            to: to.to_string(),
        });
    }
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| ExecError::InvalidCast {
            from: value.to_string(),
            to: to.to_string(),
        })
}

/// Convert a non-null value to a primitive kind.
///
/// Numeric targets accept numbers and chars (range-checked, fractions
/// truncated toward zero) and, when `parse` is set, numeric strings.
/// String targets format scalars. Objects and arrays never convert.
pub fn to_primitive(value: &Value, kind: PrimitiveKind, parse: bool) -> Result<Value, ExecError> {
    let to = kind.qualified_name();
    let invalid = || ExecError::InvalidCast {
        from: describe(value),
        to: to.to_string(),
    };
    if matches!(value, Value::Object(_) | Value::Array(_)) {
        return Err(invalid());
    }

    match kind {
        PrimitiveKind::String => Ok(Value::String(match value {
            Value::String(s) => s.clone(),
            Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
            Value::Number(n) => n.to_string(),
            _ => return Err(invalid()),
        })),
        PrimitiveKind::Object => Ok(value.clone()),
        PrimitiveKind::Boolean => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) if parse => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(ExecError::Parse {
                    value: s.clone(),
                    to: to.to_string(),
                }),
            },
            _ => Err(invalid()),
        },
        PrimitiveKind::DateTime | PrimitiveKind::Guid => match value {
            Value::String(s) => Ok(Value::String(s.clone())),
            _ => Err(invalid()),
        },
        PrimitiveKind::Char => match value {
            Value::String(s) if s.chars().count() == 1 => Ok(value.clone()),
            Value::Number(_) => integral(as_integer(value).ok_or_else(invalid)?, kind, to),
            _ => Err(invalid()),
        },
        k if k.is_floating() => {
            let number = match value {
                Value::String(s) if parse && s.chars().count() != 1 => {
                    s.trim().parse::<f64>().map_err(|_| ExecError::Parse {
                        value: s.clone(),
                        to: to.to_string(),
                    })?
                }
                _ => as_number(value).ok_or_else(invalid)?,
            };
            floating(number, k, to)
        }
        k => {
            let number = match value {
                Value::String(s) if parse && s.chars().count() != 1 => {
                    s.trim().parse::<i128>().map_err(|_| ExecError::Parse {
                        value: s.clone(),
                        to: to.to_string(),
                    })?
                }
                Value::String(s) if parse => s.parse::<i128>().or_else(|_| {
                    as_integer(value).ok_or_else(invalid)
                })?,
                _ => as_integer(value).ok_or_else(invalid)?,
            };
            integral(number, k, to)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TypeRegistry, TypeShape};
    use serde_json::json;

    fn registry() -> TypeRegistry {
        let mut r = TypeRegistry::with_builtins();
        r.register(TypeShape::enumeration("Demo.Color", &["Red", "Green"]));
        r.register(
            TypeShape::structure("Demo.Point")
                .property("X", TypeDescriptor::primitive(PrimitiveKind::Int32))
                .property("Label", TypeDescriptor::primitive(PrimitiveKind::String)),
        );
        r
    }

    #[test]
    fn defaults_follow_type_kind() {
        let r = registry();
        let int = TypeDescriptor::primitive(PrimitiveKind::Int32);
        assert_eq!(default_value(&r, &int), json!(0));
        assert_eq!(default_value(&r, &int.clone().nullable()), Value::Null);
        assert_eq!(
            default_value(&r, &TypeDescriptor::primitive(PrimitiveKind::Double)),
            json!(0.0)
        );
        assert_eq!(default_value(&r, &TypeDescriptor::value("Demo.Color")), json!("Red"));
        assert_eq!(
            default_value(&r, &TypeDescriptor::value("Demo.Point")),
            json!({"X": 0, "Label": null})
        );
    }

    #[test]
    fn numeric_conversions_are_range_checked() {
        assert_eq!(to_primitive(&json!(300), PrimitiveKind::Int64, false).unwrap(), json!(300));
        assert!(matches!(
            to_primitive(&json!(300), PrimitiveKind::Byte, false),
            Err(ExecError::Overflow { .. })
        ));
        assert_eq!(to_primitive(&json!(2.9), PrimitiveKind::Int32, false).unwrap(), json!(2));
        assert_eq!(to_primitive(&json!("A"), PrimitiveKind::Int32, false).unwrap(), json!(65));
        assert_eq!(to_primitive(&json!(66), PrimitiveKind::Char, false).unwrap(), json!("B"));
    }

    #[test]
    fn strings_parse_and_format() {
        assert_eq!(to_primitive(&json!(" 42 "), PrimitiveKind::Int32, true).unwrap(), json!(42));
        assert_eq!(to_primitive(&json!("7"), PrimitiveKind::Int32, true).unwrap(), json!(7));
        assert_eq!(to_primitive(&json!("1.5"), PrimitiveKind::Double, true).unwrap(), json!(1.5));
        assert_eq!(
            to_primitive(&json!(true), PrimitiveKind::String, false).unwrap(),
            json!("True")
        );
        assert!(matches!(
            to_primitive(&json!("x1"), PrimitiveKind::Int32, true),
            Err(ExecError::Parse { .. })
        ));
        assert!(matches!(
            to_primitive(&json!("42"), PrimitiveKind::Int32, false),
            Err(ExecError::InvalidCast { .. })
        ));
    }

    #[test]
    fn objects_never_convert_to_scalars() {
        assert!(matches!(
            to_primitive(&json!({"a": 1}), PrimitiveKind::Int32, true),
            Err(ExecError::InvalidCast { .. })
        ));
    }
}
