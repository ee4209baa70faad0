//! Type shape registry.
//!
//! [`TypeRegistry`] is the manually maintained schema implementation of
//! [`TypeIntrospector`]. It ships with the built-in primitive, collection and
//! converter shapes; user shapes are added from a schema file or in code.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{
    MethodDescriptor, PrimitiveKind, TypeDescriptor, TypeKind, COLLECTION, ENUMERABLE, HASH_SET,
    LIST, LIST_CONTRACT, READ_ONLY_LIST,
};

/// Converter type used when no override is declared.
pub const DEFAULT_CONVERTER: &str = "Mapgen.Runtime.DefaultConverter";
/// Method-name prefix of the default converter.
pub const DEFAULT_CONVERTER_PREFIX: &str = "Convert";
/// Collection converter used when no override is declared.
pub const DEFAULT_COLLECTION_CONVERTER: &str = "Mapgen.Runtime.CollectionConverter";

/// Provider interface for shape lookups.
///
/// The plan algorithm only ever talks to this trait, so static schemas,
/// generated registries and reflection bridges are interchangeable.
pub trait TypeIntrospector: Send + Sync {
    /// Shape declared under a fully qualified name.
    fn shape(&self, name: &str) -> Option<&TypeShape>;

    fn kind_of(&self, name: &str) -> Option<TypeKind> {
        self.shape(name)
            .map(|s| s.kind)
            .or_else(|| PrimitiveKind::from_name(name).map(PrimitiveKind::kind))
    }

    fn is_enum(&self, name: &str) -> bool {
        self.shape(name).is_some_and(|s| s.is_enum)
    }
}

/// A member as declared on one type (before flattening).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDef {
    pub name: String,
    pub ty: TypeDescriptor,
    pub readable: bool,
    pub writable: bool,
    pub is_public: bool,
    pub is_static: bool,
}

impl MemberDef {
    /// Public read/write instance property.
    pub fn property(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            ty,
            readable: true,
            writable: true,
            is_public: true,
            is_static: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.readable = false;
        self
    }

    pub fn private(mut self) -> Self {
        self.is_public = false;
        self
    }

    pub fn shared(mut self) -> Self {
        self.is_static = true;
        self
    }
}

/// Declared shape of one type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeShape {
    pub name: String,
    pub kind: TypeKind,
    #[serde(default)]
    pub is_enum: bool,
    #[serde(default)]
    pub enum_values: Vec<String>,
    #[serde(default)]
    pub base: Option<TypeDescriptor>,
    #[serde(default)]
    pub interfaces: Vec<TypeDescriptor>,
    /// Generic parameters of a generic definition (`List<T>` has `["T"]`).
    #[serde(default)]
    pub type_params: Vec<String>,
    /// Members in declaration order.
    #[serde(default)]
    pub members: Vec<MemberDef>,
    #[serde(default)]
    pub methods: Vec<MethodDescriptor>,
}

impl TypeShape {
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            is_enum: false,
            enum_values: Vec::new(),
            base: None,
            interfaces: Vec::new(),
            type_params: Vec::new(),
            members: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn class(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Reference)
    }

    pub fn structure(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Value)
    }

    pub fn enumeration(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            is_enum: true,
            enum_values: values.iter().map(|v| v.to_string()).collect(),
            ..Self::new(name, TypeKind::Value)
        }
    }

    pub fn extends(mut self, base: TypeDescriptor) -> Self {
        self.base = Some(base);
        self
    }

    pub fn implements(mut self, contract: TypeDescriptor) -> Self {
        self.interfaces.push(contract);
        self
    }

    pub fn generic_over(mut self, params: &[&str]) -> Self {
        self.type_params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn member(mut self, member: MemberDef) -> Self {
        self.members.push(member);
        self
    }

    /// Shorthand for a public read/write property.
    pub fn property(self, name: &str, ty: TypeDescriptor) -> Self {
        self.member(MemberDef::property(name, ty))
    }

    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    /// Descriptor for this shape (generic parameters left open).
    pub fn descriptor(&self) -> TypeDescriptor {
        let args = self
            .type_params
            .iter()
            .map(|p| TypeDescriptor::reference(p.clone()))
            .collect();
        TypeDescriptor::generic(self.name.clone(), self.kind, args)
    }
}

/// In-memory shape registry.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    shapes: HashMap<String, TypeShape>,
}

impl TypeIntrospector for TypeRegistry {
    fn shape(&self, name: &str) -> Option<&TypeShape> {
        self.shapes.get(name)
    }
}

impl TypeRegistry {
    /// Empty registry without any built-in shapes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with primitives, the generic collection shapes and
    /// the default converter types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for kind in PrimitiveKind::ALL {
            registry.register(TypeShape::new(kind.qualified_name(), kind.kind()));
        }
        registry.register_collections();
        registry.register(default_converter_shape());
        registry.register(default_collection_converter_shape());
        registry
    }

    /// Insert or replace a shape. Returns the replaced shape, if any.
    pub fn register(&mut self, shape: TypeShape) -> Option<TypeShape> {
        self.shapes.insert(shape.name.clone(), shape)
    }

    pub fn extend(&mut self, shapes: impl IntoIterator<Item = TypeShape>) {
        for shape in shapes {
            self.register(shape);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.shapes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Resolve a type expression against the registered shapes.
    pub fn resolve(&self, expr: &str) -> Result<TypeDescriptor, super::TypeParseError> {
        TypeDescriptor::parse(expr, &|name| self.kind_of(name))
    }

    fn register_collections(&mut self) {
        let t = || TypeDescriptor::reference("T");
        let contract = |name: &str| TypeDescriptor::generic(name, TypeKind::Reference, vec![t()]);

        self.register(TypeShape::class(ENUMERABLE).generic_over(&["T"]));
        self.register(
            TypeShape::class(COLLECTION)
                .generic_over(&["T"])
                .implements(contract(ENUMERABLE)),
        );
        self.register(
            TypeShape::class(READ_ONLY_LIST)
                .generic_over(&["T"])
                .implements(contract(ENUMERABLE)),
        );
        self.register(
            TypeShape::class(LIST_CONTRACT)
                .generic_over(&["T"])
                .implements(contract(COLLECTION)),
        );
        self.register(
            TypeShape::class(LIST)
                .generic_over(&["T"])
                .implements(contract(LIST_CONTRACT))
                .implements(contract(READ_ONLY_LIST))
                .property("Count", TypeDescriptor::primitive(PrimitiveKind::Int32)),
        );
        self.register(
            TypeShape::class(HASH_SET)
                .generic_over(&["T"])
                .implements(contract(COLLECTION))
                .property("Count", TypeDescriptor::primitive(PrimitiveKind::Int32)),
        );
    }
}

/// Kinds with a specialized `Convert To<Kind>(string)` / `ConvertToString(kind)` pair.
const STRING_CONVERTIBLE: [PrimitiveKind; 15] = [
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
    PrimitiveKind::DateTime,
    PrimitiveKind::Guid,
];

fn default_converter_shape() -> TypeShape {
    let string = TypeDescriptor::primitive(PrimitiveKind::String);
    let mut shape = TypeShape::class(DEFAULT_CONVERTER).method(
        MethodDescriptor::new(DEFAULT_CONVERTER_PREFIX)
            .generic_over(&["TSource", "TDestination"])
            .param("value", TypeDescriptor::reference("TSource"))
            .returning(TypeDescriptor::reference("TDestination")),
    );
    for kind in STRING_CONVERTIBLE {
        let ty = TypeDescriptor::primitive(kind);
        shape = shape
            .method(
                MethodDescriptor::new(format!(
                    "{}To{}",
                    DEFAULT_CONVERTER_PREFIX,
                    kind.simple_name()
                ))
                .param("value", string.clone())
                .returning(ty.clone()),
            )
            .method(
                MethodDescriptor::new(format!("{}ToString", DEFAULT_CONVERTER_PREFIX))
                    .param("value", ty)
                    .returning(string.clone()),
            );
    }
    shape
}

fn default_collection_converter_shape() -> TypeShape {
    let source = TypeDescriptor::generic(
        ENUMERABLE,
        TypeKind::Reference,
        vec![TypeDescriptor::reference("TSource")],
    );
    let mapper = TypeDescriptor::generic(
        "System.Func",
        TypeKind::Reference,
        vec![
            TypeDescriptor::reference("TSource"),
            TypeDescriptor::reference("TDestination"),
        ],
    );
    let target = TypeDescriptor::reference("TDestination");
    TypeShape::class(DEFAULT_COLLECTION_CONVERTER)
        .method(
            MethodDescriptor::new("ToArray")
                .generic_over(&["TSource", "TDestination"])
                .param("source", source.clone())
                .param("mapper", mapper.clone())
                .returning(TypeDescriptor::array_of(target.clone())),
        )
        .method(
            MethodDescriptor::new("ToList")
                .generic_over(&["TSource", "TDestination"])
                .param("source", source)
                .param("mapper", mapper)
                .returning(TypeDescriptor::list_of(target)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_primitives_and_collections() {
        let registry = TypeRegistry::with_builtins();
        assert!(registry.contains("System.Int32"));
        assert!(registry.contains(LIST));
        assert!(registry.contains(DEFAULT_CONVERTER));
        assert_eq!(registry.kind_of("System.Guid"), Some(TypeKind::Value));
        assert_eq!(registry.kind_of("int"), Some(TypeKind::Value));
        assert_eq!(registry.kind_of("Demo.Unknown"), None);
    }

    #[test]
    fn default_converter_has_specialized_and_generic_methods() {
        let registry = TypeRegistry::with_builtins();
        let shape = registry.shape(DEFAULT_CONVERTER).unwrap();
        assert!(shape.methods.iter().any(|m| m.name == "ConvertToInt32"));
        let generic = shape
            .methods
            .iter()
            .find(|m| m.name == DEFAULT_CONVERTER_PREFIX)
            .unwrap();
        assert_eq!(generic.type_params.len(), 2);
    }

    #[test]
    fn resolve_against_user_shapes() {
        let mut registry = TypeRegistry::with_builtins();
        registry.register(TypeShape::structure("Demo.Point"));
        registry.register(TypeShape::class("Demo.Address"));

        let point = registry.resolve("Demo.Point?").unwrap();
        assert!(point.is_nullable_value());

        let list = registry
            .resolve("System.Collections.Generic.List<Demo.Address>")
            .unwrap();
        assert_eq!(list.args[0].kind, TypeKind::Reference);
        assert!(registry.resolve("Demo.Nope").is_err());
    }

    #[test]
    fn register_replaces() {
        let mut registry = TypeRegistry::new();
        assert!(registry.register(TypeShape::class("A")).is_none());
        assert!(registry.register(TypeShape::structure("A")).is_some());
        assert_eq!(registry.kind_of("A"), Some(TypeKind::Value));
        assert_eq!(registry.len(), 1);
    }
}
