//! Input files: type schema and mapper units.
//!
//! Type expressions are written as strings (`int?`, `List<Demo.Item>`,
//! `string[]`) and resolved in two passes: every declared shape's kind is
//! registered first, so a schema may reference types declared further down.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use crate::declaration::{DeclarationInput, MapperUnit};
use crate::error::ConfigError;
use crate::rules::Annotation;
use crate::types::{
    MemberDef, MethodDescriptor, ParamDescriptor, TypeDescriptor, TypeIntrospector, TypeKind,
    TypeRegistry, TypeShape,
};

// =============================================================================
// FILE FORMATS
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    #[default]
    Class,
    Struct,
    Enum,
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default = "yes")]
    pub readable: bool,
    #[serde(default = "yes")]
    pub writable: bool,
    #[serde(default = "yes")]
    pub public: bool,
    #[serde(default, rename = "static")]
    pub is_static: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodSpec {
    pub name: String,
    #[serde(default = "yes", rename = "static")]
    pub is_static: bool,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    /// Omitted for void methods.
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default)]
    pub type_params: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeSpec {
    pub name: String,
    #[serde(default)]
    pub kind: ShapeKind,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub type_params: Vec<String>,
    /// Enum members.
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub members: Vec<MemberSpec>,
    #[serde(default)]
    pub methods: Vec<MethodSpec>,
}

/// `types:` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaFile {
    #[serde(default)]
    pub types: Vec<TypeSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclarationSpec {
    #[serde(flatten)]
    pub method: MethodSpec,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub rules: Vec<Annotation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSpec {
    pub name: String,
    /// Unit-level annotations (converter overrides).
    #[serde(default)]
    pub rules: Vec<Annotation>,
    /// Static helper methods.
    #[serde(default)]
    pub methods: Vec<MethodSpec>,
    #[serde(default)]
    pub declarations: Vec<DeclarationSpec>,
}

/// `units:` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapperFile {
    #[serde(default)]
    pub units: Vec<UnitSpec>,
}

// =============================================================================
// RESOLUTION
// =============================================================================

struct Resolver<'a> {
    registry: &'a TypeRegistry,
    /// Open generic parameters in scope.
    params: Vec<String>,
}

impl Resolver<'_> {
    fn ty(&self, context: &str, expr: &str) -> Result<TypeDescriptor, ConfigError> {
        let kind_of = |name: &str| {
            if self.params.iter().any(|p| p == name) {
                Some(TypeKind::Reference)
            } else {
                self.registry.kind_of(name)
            }
        };
        TypeDescriptor::parse(expr, &kind_of).map_err(|error| ConfigError::Type {
            context: context.to_string(),
            expr: expr.to_string(),
            error,
        })
    }

    fn with_params(&self, extra: &[String]) -> Resolver<'_> {
        Resolver {
            registry: self.registry,
            params: self.params.iter().chain(extra).cloned().collect(),
        }
    }

    fn method(&self, owner: &str, spec: &MethodSpec) -> Result<MethodDescriptor, ConfigError> {
        let scope = self.with_params(&spec.type_params);
        let context = format!("{}.{}", owner, spec.name);
        let params = spec
            .params
            .iter()
            .map(|p| Ok(ParamDescriptor::new(&p.name, scope.ty(&context, &p.ty)?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        let returns = spec
            .returns
            .as_deref()
            .filter(|r| !r.trim().is_empty() && r.trim() != "void")
            .map(|r| scope.ty(&context, r))
            .transpose()?;
        Ok(MethodDescriptor {
            name: spec.name.clone(),
            is_static: spec.is_static,
            params,
            returns,
            type_params: spec.type_params.clone(),
        })
    }
}

impl SchemaFile {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse type schema")
    }

    /// Register every declared shape on top of the built-in registry.
    pub fn into_registry(self) -> Result<TypeRegistry, ConfigError> {
        let mut registry = TypeRegistry::with_builtins();
        self.register_into(&mut registry)?;
        Ok(registry)
    }

    pub fn register_into(self, registry: &mut TypeRegistry) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for spec in &self.types {
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::DuplicateShape(spec.name.clone()));
            }
        }

        // Pass 1: names and kinds only.
        for spec in &self.types {
            registry.register(placeholder(spec));
        }

        // Pass 2: full shapes.
        let mut shapes = Vec::with_capacity(self.types.len());
        for spec in &self.types {
            let resolver = Resolver {
                registry: &*registry,
                params: spec.type_params.clone(),
            };
            let mut shape = placeholder(spec);
            if let Some(base) = &spec.base {
                shape.base = Some(resolver.ty(&spec.name, base)?);
            }
            for contract in &spec.interfaces {
                shape.interfaces.push(resolver.ty(&spec.name, contract)?);
            }
            for member in &spec.members {
                let context = format!("{}.{}", spec.name, member.name);
                shape.members.push(MemberDef {
                    name: member.name.clone(),
                    ty: resolver.ty(&context, &member.ty)?,
                    readable: member.readable,
                    writable: member.writable,
                    is_public: member.public,
                    is_static: member.is_static,
                });
            }
            for method in &spec.methods {
                shape.methods.push(resolver.method(&spec.name, method)?);
            }
            shapes.push(shape);
        }
        debug!(count = shapes.len(), "Resolved schema shapes");
        registry.extend(shapes);
        Ok(())
    }
}

fn placeholder(spec: &TypeSpec) -> TypeShape {
    let shape = match spec.kind {
        ShapeKind::Class => TypeShape::class(&spec.name),
        ShapeKind::Struct => TypeShape::structure(&spec.name),
        ShapeKind::Enum => {
            let values: Vec<&str> = spec.values.iter().map(String::as_str).collect();
            TypeShape::enumeration(&spec.name, &values)
        }
    };
    let params: Vec<&str> = spec.type_params.iter().map(String::as_str).collect();
    shape.generic_over(&params)
}

impl MapperFile {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse mapper file")
    }

    /// Resolve every unit's method signatures against `registry`.
    pub fn resolve(self, registry: &TypeRegistry) -> Result<Vec<MapperUnit>, ConfigError> {
        let resolver = Resolver {
            registry,
            params: Vec::new(),
        };
        let mut units = Vec::with_capacity(self.units.len());
        for spec in self.units {
            let mut unit = MapperUnit::new(&spec.name);
            unit.annotations = spec.rules;
            for method in &spec.methods {
                unit.methods.push(resolver.method(&spec.name, method)?);
            }
            for decl in spec.declarations {
                let method = resolver.method(&spec.name, &decl.method)?;
                let mut input = DeclarationInput::new(method, decl.rules);
                input.profile = decl.profile;
                unit.declarations.push(input);
            }
            units.push(unit);
        }
        Ok(units)
    }
}

/// Load a schema file into a registry with the built-in shapes.
pub fn load_schema(path: impl AsRef<Path>) -> Result<TypeRegistry> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema from {}", path.display()))?;
    let schema = SchemaFile::from_yaml(&content)
        .with_context(|| format!("Invalid schema in {}", path.display()))?;
    let count = schema.types.len();
    let registry = schema
        .into_registry()
        .with_context(|| format!("Failed to resolve schema {}", path.display()))?;
    info!(path = %path.display(), types = count, "Loaded type schema");
    Ok(registry)
}

/// Load a mapper file, resolving its signatures against `registry`.
pub fn load_mappers(path: impl AsRef<Path>, registry: &TypeRegistry) -> Result<Vec<MapperUnit>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read mappers from {}", path.display()))?;
    let file = MapperFile::from_yaml(&content)
        .with_context(|| format!("Invalid mapper file {}", path.display()))?;
    let units = file
        .resolve(registry)
        .with_context(|| format!("Failed to resolve mappers in {}", path.display()))?;
    info!(path = %path.display(), units = units.len(), "Loaded mapper units");
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{flatten_members, PrimitiveKind};
    use std::io::Write;

    const SCHEMA: &str = r#"
types:
  - name: Demo.Person
    base: Demo.Entity
    members:
      - { name: Name, type: string }
      - { name: Address, type: Demo.Address? }
      - { name: Tags, type: "List<string>" }
  - name: Demo.Entity
    members:
      - { name: Id, type: int, writable: false }
  - name: Demo.Address
    members:
      - { name: City, type: string }
  - name: Demo.Status
    kind: enum
    values: [Active, Closed]
"#;

    const MAPPERS: &str = r#"
units:
  - name: Demo.Mappers.PersonMapper
    rules:
      - { rule: converter, type_name: Demo.Conv }
    methods:
      - name: Prepare
        params:
          - { name: source, type: Demo.Person }
    declarations:
      - name: Map
        params:
          - { name: source, type: Demo.Person }
        returns: Demo.Person
        profile: admin
        rules:
          - { rule: ignore, target: Tags }
          - { rule: before_map, method: Prepare }
"#;

    #[test]
    fn schema_resolves_forward_references() {
        let registry = SchemaFile::from_yaml(SCHEMA).unwrap().into_registry().unwrap();
        let members = flatten_members(&registry, &TypeDescriptor::reference("Demo.Person"));
        let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Name", "Address", "Tags", "Id"]);
        assert!(members[1].ty.nullable);
        assert_eq!(
            members[2].ty,
            TypeDescriptor::list_of(TypeDescriptor::primitive(PrimitiveKind::String))
        );
        assert!(!members[3].writable);
        assert!(registry.is_enum("Demo.Status"));
    }

    #[test]
    fn schema_rejects_unknown_types_and_duplicates() {
        let bad = "types:\n  - name: A\n    members:\n      - { name: X, type: Missing }\n";
        assert!(matches!(
            SchemaFile::from_yaml(bad).unwrap().into_registry(),
            Err(ConfigError::Type { .. })
        ));
        let dup = "types:\n  - name: A\n  - name: A\n";
        assert!(matches!(
            SchemaFile::from_yaml(dup).unwrap().into_registry(),
            Err(ConfigError::DuplicateShape(_))
        ));
    }

    #[test]
    fn mapper_file_resolves_units() {
        let registry = SchemaFile::from_yaml(SCHEMA).unwrap().into_registry().unwrap();
        let units = MapperFile::from_yaml(MAPPERS)
            .unwrap()
            .resolve(&registry)
            .unwrap();
        assert_eq!(units.len(), 1);
        let unit = &units[0];
        assert_eq!(unit.annotations.len(), 1);
        assert_eq!(unit.methods[0].name, "Prepare");
        assert!(unit.methods[0].is_static);
        let decl = &unit.declarations[0];
        assert_eq!(decl.profile.as_deref(), Some("admin"));
        assert_eq!(decl.annotations.len(), 2);
        assert_eq!(
            decl.method.returns,
            Some(TypeDescriptor::reference("Demo.Person"))
        );
    }

    #[test]
    fn load_from_files() {
        let mut schema = tempfile::NamedTempFile::new().unwrap();
        schema.write_all(SCHEMA.as_bytes()).unwrap();
        let mut mappers = tempfile::NamedTempFile::new().unwrap();
        mappers.write_all(MAPPERS.as_bytes()).unwrap();

        let registry = load_schema(schema.path()).unwrap();
        let units = load_mappers(mappers.path(), &registry).unwrap();
        assert_eq!(units[0].declarations.len(), 1);
    }
}
