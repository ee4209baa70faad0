//! Type Graph Introspector
//!
//! Opaque type/member/method descriptors plus the provider interface the plan
//! algorithm uses to look shapes up. Nothing in here knows where the shapes
//! came from: a YAML schema, a hand-maintained registry or a reflection
//! bridge all sit behind [`TypeIntrospector`].

pub mod introspect;
mod parse;
pub mod registry;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use introspect::{
    element_type, find_member, find_methods, flatten_members, implements, is_assignable,
};
pub use registry::{MemberDef, TypeIntrospector, TypeRegistry, TypeShape};

/// Fully qualified name used for array descriptors.
pub const ARRAY: &str = "System.Array";
/// Single-type-argument enumerable contract.
pub const ENUMERABLE: &str = "System.Collections.Generic.IEnumerable";
pub const COLLECTION: &str = "System.Collections.Generic.ICollection";
pub const LIST_CONTRACT: &str = "System.Collections.Generic.IList";
pub const READ_ONLY_LIST: &str = "System.Collections.Generic.IReadOnlyList";
pub const LIST: &str = "System.Collections.Generic.List";
pub const HASH_SET: &str = "System.Collections.Generic.HashSet";

/// Value or reference semantics of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Value,
    Reference,
}

/// Built-in scalar kinds the conversion planner knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Boolean,
    Char,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Single,
    Double,
    Decimal,
    String,
    Object,
    DateTime,
    Guid,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 17] = [
        PrimitiveKind::Boolean,
        PrimitiveKind::Char,
        PrimitiveKind::SByte,
        PrimitiveKind::Byte,
        PrimitiveKind::Int16,
        PrimitiveKind::UInt16,
        PrimitiveKind::Int32,
        PrimitiveKind::UInt32,
        PrimitiveKind::Int64,
        PrimitiveKind::UInt64,
        PrimitiveKind::Single,
        PrimitiveKind::Double,
        PrimitiveKind::Decimal,
        PrimitiveKind::String,
        PrimitiveKind::Object,
        PrimitiveKind::DateTime,
        PrimitiveKind::Guid,
    ];

    /// Numeric kinds, in the order the widening table lists them.
    pub const NUMERIC: [PrimitiveKind; 12] = [
        PrimitiveKind::Char,
        PrimitiveKind::SByte,
        PrimitiveKind::Byte,
        PrimitiveKind::Int16,
        PrimitiveKind::UInt16,
        PrimitiveKind::Int32,
        PrimitiveKind::UInt32,
        PrimitiveKind::Int64,
        PrimitiveKind::UInt64,
        PrimitiveKind::Single,
        PrimitiveKind::Double,
        PrimitiveKind::Decimal,
    ];

    /// Fully qualified name.
    pub fn qualified_name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "System.Boolean",
            PrimitiveKind::Char => "System.Char",
            PrimitiveKind::SByte => "System.SByte",
            PrimitiveKind::Byte => "System.Byte",
            PrimitiveKind::Int16 => "System.Int16",
            PrimitiveKind::UInt16 => "System.UInt16",
            PrimitiveKind::Int32 => "System.Int32",
            PrimitiveKind::UInt32 => "System.UInt32",
            PrimitiveKind::Int64 => "System.Int64",
            PrimitiveKind::UInt64 => "System.UInt64",
            PrimitiveKind::Single => "System.Single",
            PrimitiveKind::Double => "System.Double",
            PrimitiveKind::Decimal => "System.Decimal",
            PrimitiveKind::String => "System.String",
            PrimitiveKind::Object => "System.Object",
            PrimitiveKind::DateTime => "System.DateTime",
            PrimitiveKind::Guid => "System.Guid",
        }
    }

    /// Name without namespace, used to build specialized converter names.
    pub fn simple_name(self) -> &'static str {
        self.qualified_name().trim_start_matches("System.")
    }

    /// Short keyword alias, when the rendered language has one.
    pub fn keyword(self) -> Option<&'static str> {
        Some(match self {
            PrimitiveKind::Boolean => "bool",
            PrimitiveKind::Char => "char",
            PrimitiveKind::SByte => "sbyte",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Int16 => "short",
            PrimitiveKind::UInt16 => "ushort",
            PrimitiveKind::Int32 => "int",
            PrimitiveKind::UInt32 => "uint",
            PrimitiveKind::Int64 => "long",
            PrimitiveKind::UInt64 => "ulong",
            PrimitiveKind::Single => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::Decimal => "decimal",
            PrimitiveKind::String => "string",
            PrimitiveKind::Object => "object",
            PrimitiveKind::DateTime | PrimitiveKind::Guid => return None,
        })
    }

    pub fn from_name(name: &str) -> Option<Self> {
        PrimitiveKind::ALL
            .iter()
            .copied()
            .find(|k| k.qualified_name() == name || k.keyword() == Some(name))
    }

    pub fn kind(self) -> TypeKind {
        match self {
            PrimitiveKind::String | PrimitiveKind::Object => TypeKind::Reference,
            _ => TypeKind::Value,
        }
    }

    pub fn is_numeric(self) -> bool {
        PrimitiveKind::NUMERIC.contains(&self)
    }

    pub fn is_integral(self) -> bool {
        self.is_numeric()
            && !matches!(
                self,
                PrimitiveKind::Single | PrimitiveKind::Double | PrimitiveKind::Decimal
            )
    }

    pub fn is_floating(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Single | PrimitiveKind::Double | PrimitiveKind::Decimal
        )
    }
}

/// Identity of a type as seen by the plan algorithm.
///
/// Immutable once introspected. Nullability is part of the descriptor; the
/// underlying (non-nullable) type is obtained with [`TypeDescriptor::underlying`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Fully qualified name (`System.Array` for arrays).
    pub name: String,
    pub kind: TypeKind,
    #[serde(default)]
    pub nullable: bool,
    /// Generic arguments, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<TypeDescriptor>,
    /// Element type, set only for arrays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<Box<TypeDescriptor>>,
}

impl TypeDescriptor {
    pub fn named(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            args: Vec::new(),
            element: None,
        }
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::named(name, TypeKind::Reference)
    }

    pub fn value(name: impl Into<String>) -> Self {
        Self::named(name, TypeKind::Value)
    }

    pub fn primitive(kind: PrimitiveKind) -> Self {
        Self::named(kind.qualified_name(), kind.kind())
    }

    pub fn generic(name: impl Into<String>, kind: TypeKind, args: Vec<TypeDescriptor>) -> Self {
        Self {
            args,
            ..Self::named(name, kind)
        }
    }

    pub fn array_of(element: TypeDescriptor) -> Self {
        Self {
            element: Some(Box::new(element)),
            ..Self::named(ARRAY, TypeKind::Reference)
        }
    }

    /// `List<element>`.
    pub fn list_of(element: TypeDescriptor) -> Self {
        Self::generic(LIST, TypeKind::Reference, vec![element])
    }

    /// Same type with the nullable flag set.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// The type with any nullable wrapper removed.
    pub fn underlying(&self) -> TypeDescriptor {
        Self {
            nullable: false,
            ..self.clone()
        }
    }

    /// Identity comparison ignoring the outer nullable wrapper. Generic
    /// arguments and elements compare with [`same_type`](Self::same_type).
    pub fn same_underlying(&self, other: &TypeDescriptor) -> bool {
        self.name == other.name
            && self.kind == other.kind
            && self.args.len() == other.args.len()
            && self.args.iter().zip(&other.args).all(|(a, b)| a.same_type(b))
            && match (&self.element, &other.element) {
                (Some(a), Some(b)) => a.same_type(b),
                (None, None) => true,
                _ => false,
            }
    }

    /// Type identity. Nullable annotations on reference types are not
    /// distinct types at any nesting level; nullable value types are.
    pub fn same_type(&self, other: &TypeDescriptor) -> bool {
        if self.is_value_type() && self.nullable != other.nullable {
            return false;
        }
        self.same_underlying(other)
    }

    pub fn is_array(&self) -> bool {
        self.element.is_some()
    }

    pub fn is_value_type(&self) -> bool {
        self.kind == TypeKind::Value
    }

    /// A value type wrapped in a nullable container (as opposed to an
    /// annotated reference).
    pub fn is_nullable_value(&self) -> bool {
        self.nullable && self.kind == TypeKind::Value
    }

    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        if self.is_array() || !self.args.is_empty() {
            return None;
        }
        PrimitiveKind::from_name(&self.name)
    }

    pub fn is_string(&self) -> bool {
        self.primitive_kind() == Some(PrimitiveKind::String)
    }

    /// Name without namespace or generic arguments.
    pub fn simple_name(&self) -> String {
        if let Some(element) = &self.element {
            return format!("{}Array", element.simple_name());
        }
        if let Some(kind) = self.primitive_kind() {
            return kind.simple_name().to_string();
        }
        self.name
            .rsplit('.')
            .next()
            .unwrap_or(&self.name)
            .to_string()
    }

    /// Parse a type expression such as `int?`, `List<Demo.Item>` or
    /// `string[]`. `kind_of` resolves non-primitive names to their kind and
    /// returns `None` for names it does not know.
    pub fn parse(
        expr: &str,
        kind_of: &dyn Fn(&str) -> Option<TypeKind>,
    ) -> Result<Self, TypeParseError> {
        parse::parse_type_expr(expr, kind_of)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(element) = &self.element {
            write!(f, "{}[]", element)?;
        } else if let Some(keyword) = self.primitive_kind().and_then(PrimitiveKind::keyword) {
            f.write_str(keyword)?;
        } else {
            f.write_str(&self.name)?;
            if !self.args.is_empty() {
                f.write_str("<")?;
                for (i, arg) in self.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(">")?;
            }
        }
        if self.nullable {
            f.write_str("?")?;
        }
        Ok(())
    }
}

/// Errors raised while parsing a type expression.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeParseError {
    #[error("expected type name at position {pos} in `{expr}`")]
    ExpectedName { expr: String, pos: usize },

    #[error("unclosed generic argument list in `{0}`")]
    UnclosedGeneric(String),

    #[error("unexpected input at position {pos} in `{expr}`")]
    Trailing { expr: String, pos: usize },

    #[error("unknown type `{0}`")]
    UnknownType(String),
}

/// One flattened, publicly accessible instance member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDescriptor {
    pub name: String,
    pub ty: TypeDescriptor,
    pub readable: bool,
    pub writable: bool,
    /// Distance from the most-derived type (0) along the inheritance chain.
    pub depth: usize,
}

/// A method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub name: String,
    pub ty: TypeDescriptor,
}

impl ParamDescriptor {
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A method signature: candidate for binding, or a mapping declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    #[serde(default = "default_static")]
    pub is_static: bool,
    #[serde(default)]
    pub params: Vec<ParamDescriptor>,
    /// `None` for void methods.
    #[serde(default)]
    pub returns: Option<TypeDescriptor>,
    /// Generic type parameters, e.g. `["TSource", "TDestination"]`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_params: Vec<String>,
}

fn default_static() -> bool {
    true
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_static: true,
            params: Vec::new(),
            returns: None,
            type_params: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.params.push(ParamDescriptor::new(name, ty));
        self
    }

    pub fn returning(mut self, ty: TypeDescriptor) -> Self {
        self.returns = Some(ty);
        self
    }

    pub fn instance(mut self) -> Self {
        self.is_static = false;
        self
    }

    pub fn generic_over(mut self, params: &[&str]) -> Self {
        self.type_params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn is_void(&self) -> bool {
        self.returns.is_none()
    }
}
