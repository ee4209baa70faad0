//! Literal formatting for constant values.
//!
//! | value | destination kind | rendered |
//! |-------|------------------|----------|
//! | text | `string` | `"escaped"` |
//! | text (one char) | `char` | `'c'` |
//! | text | enum | `Enum.Member` |
//! | integer | `long` / `uint` / `ulong` | `5L` / `5U` / `5UL` |
//! | number | `float` / `double` / `decimal` | `1.5f` / `1.5d` / `1.5m` |
//! | null | non-nullable value type | `default` |
//! | null | anything else | `null` |

use crate::rules::ConstantValue;
use crate::types::{PrimitiveKind, TypeDescriptor};

/// Escape a string for use inside double quotes.
pub fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        escape_char_into(c, '"', &mut out);
    }
    out
}

fn escape_char_into(c: char, quote: char, out: &mut String) {
    match c {
        '\\' => out.push_str("\\\\"),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        '\0' => out.push_str("\\0"),
        c if c == quote => {
            out.push('\\');
            out.push(c);
        }
        c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
        c => out.push(c),
    }
}

pub fn quote(value: &str) -> String {
    format!("\"{}\"", escape_string(value))
}

pub fn char_literal(c: char) -> String {
    let mut out = String::from("'");
    escape_char_into(c, '\'', &mut out);
    out.push('\'');
    out
}

fn float(value: f64, kind: PrimitiveKind) -> String {
    let keyword = if kind == PrimitiveKind::Single {
        "float"
    } else {
        "double"
    };
    if value.is_nan() {
        return format!("{}.NaN", keyword);
    }
    if value.is_infinite() {
        let side = if value > 0.0 { "Positive" } else { "Negative" };
        return format!("{}.{}Infinity", keyword, side);
    }
    let digits = format!("{:?}", value);
    match kind {
        PrimitiveKind::Single => format!("{}f", digits),
        PrimitiveKind::Decimal => format!("{}m", digits),
        _ => digits,
    }
}

fn integer(value: i64, kind: Option<PrimitiveKind>) -> String {
    match kind {
        Some(PrimitiveKind::Int64) => format!("{}L", value),
        Some(PrimitiveKind::UInt32) => format!("{}U", value),
        Some(PrimitiveKind::UInt64) => format!("{}UL", value),
        Some(PrimitiveKind::Single) => format!("{}f", value),
        Some(PrimitiveKind::Double) => format!("{}d", value),
        Some(PrimitiveKind::Decimal) => format!("{}m", value),
        Some(PrimitiveKind::Char) => format!("(char){}", value),
        _ => value.to_string(),
    }
}

/// Render `value` as a literal of type `ty`. `enum_type` names the enum a
/// text value is a member of; a text value targeting any other non-primitive
/// value type is rendered as a member of that type.
pub fn format_constant(value: &ConstantValue, ty: &TypeDescriptor, enum_type: Option<&str>) -> String {
    let kind = ty.primitive_kind();
    match value {
        ConstantValue::Null => {
            if ty.is_value_type() && !ty.nullable {
                "default".to_string()
            } else {
                "null".to_string()
            }
        }
        ConstantValue::Bool(b) => b.to_string(),
        ConstantValue::Int(i) => match enum_type {
            Some(e) => format!("({}){}", e, i),
            None => integer(*i, kind),
        },
        ConstantValue::Float(x) => float(*x, kind.unwrap_or(PrimitiveKind::Double)),
        ConstantValue::Text(s) => {
            if let Some(e) = enum_type {
                return format!("{}.{}", e, s);
            }
            match kind {
                Some(PrimitiveKind::Char) => {
                    let mut chars = s.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => char_literal(c),
                        _ => quote(s),
                    }
                }
                None if ty.is_value_type() => format!("{}.{}", ty.underlying(), s),
                _ => quote(s),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn prim(kind: PrimitiveKind) -> TypeDescriptor {
        TypeDescriptor::primitive(kind)
    }

    #[test]
    fn strings_are_escaped() {
        let s = prim(PrimitiveKind::String);
        assert_eq!(
            format_constant(&ConstantValue::Text("a\"b\\c\n".into()), &s, None),
            r#""a\"b\\c\n""#
        );
        assert_eq!(escape_string("\u{1}"), "\\u0001");
    }

    #[test]
    fn numeric_suffixes() {
        let one = ConstantValue::Int(1);
        assert_eq!(format_constant(&one, &prim(PrimitiveKind::Int32), None), "1");
        assert_eq!(format_constant(&one, &prim(PrimitiveKind::Int64), None), "1L");
        assert_eq!(format_constant(&one, &prim(PrimitiveKind::UInt64), None), "1UL");
        assert_eq!(format_constant(&one, &prim(PrimitiveKind::Decimal), None), "1m");

        let half = ConstantValue::Float(1.5);
        assert_eq!(format_constant(&half, &prim(PrimitiveKind::Single), None), "1.5f");
        assert_eq!(format_constant(&half, &prim(PrimitiveKind::Double), None), "1.5");
        assert_eq!(format_constant(&half, &prim(PrimitiveKind::Decimal), None), "1.5m");
        assert_eq!(
            format_constant(&ConstantValue::Float(2.0), &prim(PrimitiveKind::Double), None),
            "2.0"
        );
        assert_eq!(
            format_constant(&ConstantValue::Float(f64::NAN), &prim(PrimitiveKind::Single), None),
            "float.NaN"
        );
    }

    #[test]
    fn nulls_chars_and_enums() {
        assert_eq!(
            format_constant(&ConstantValue::Null, &prim(PrimitiveKind::Int32), None),
            "default"
        );
        assert_eq!(
            format_constant(&ConstantValue::Null, &prim(PrimitiveKind::Int32).nullable(), None),
            "null"
        );
        assert_eq!(
            format_constant(&ConstantValue::Text("'".into()), &prim(PrimitiveKind::Char), None),
            r"'\''"
        );
        let color = TypeDescriptor::value("Demo.Color");
        assert_eq!(
            format_constant(&ConstantValue::Text("Red".into()), &color, Some("Demo.Color")),
            "Demo.Color.Red"
        );
        assert_eq!(
            format_constant(&ConstantValue::Int(2), &color, Some("Demo.Color")),
            "(Demo.Color)2"
        );
        assert_eq!(
            format_constant(&ConstantValue::Text("Blue".into()), &color, None),
            "Demo.Color.Blue"
        );
    }
}
