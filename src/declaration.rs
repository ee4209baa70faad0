//! Mapping declarations and their containing units.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PlanError;
use crate::rules::Annotation;
use crate::types::{MethodDescriptor, ParamDescriptor, TypeDescriptor};

/// Profile used when a declaration names none.
pub const DEFAULT_PROFILE: &str = "default";

/// Factory (returns a new destination) or in-place (mutates a passed one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationShape {
    Factory,
    InPlace,
}

impl DeclarationShape {
    pub fn label(self) -> &'static str {
        match self {
            DeclarationShape::Factory => "factory",
            DeclarationShape::InPlace => "in-place",
        }
    }
}

/// A mapping declaration as found in its unit, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclarationInput {
    pub method: MethodDescriptor,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub profile: Option<String>,
}

impl DeclarationInput {
    pub fn new(method: MethodDescriptor, annotations: Vec<Annotation>) -> Self {
        Self {
            method,
            annotations,
            profile: None,
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }
}

/// A containing definition: the unit of rendered output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperUnit {
    /// Fully qualified name of the containing definition.
    pub name: String,
    /// Unit-level annotations (converter overrides).
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    /// Static helper methods available to callbacks, converters and redirects.
    #[serde(default)]
    pub methods: Vec<MethodDescriptor>,
    #[serde(default)]
    pub declarations: Vec<DeclarationInput>,
}

impl MapperUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotations: Vec::new(),
            methods: Vec::new(),
            declarations: Vec::new(),
        }
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn helper(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    pub fn declare(mut self, declaration: DeclarationInput) -> Self {
        self.declarations.push(declaration);
        self
    }

    /// Methods visible to unqualified binding: helpers first, then the
    /// unit's own mapping declarations.
    pub fn scope(&self) -> Vec<MethodDescriptor> {
        self.methods
            .iter()
            .cloned()
            .chain(self.declarations.iter().map(|d| d.method.clone()))
            .collect()
    }

    /// Simple name (without namespace).
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Namespace part of the name, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.name.rsplit_once('.').map(|(ns, _)| ns)
    }
}

/// Stable identity of a declaration: unit name plus position in the unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeclarationKey {
    pub unit: String,
    pub index: usize,
}

/// A validated mapping declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingDeclaration {
    pub unit: String,
    pub name: String,
    pub index: usize,
    pub profile: String,
    pub source: ParamDescriptor,
    pub destination: TypeDescriptor,
    /// Parameter name of the passed destination (in-place form only).
    pub destination_param: Option<String>,
    /// Extra context parameters shared with every callback lookup.
    pub context: Vec<ParamDescriptor>,
    pub shape: DeclarationShape,
}

impl MappingDeclaration {
    /// Validate a declaration's signature.
    ///
    /// Source comes first. A void method takes the destination second; a
    /// non-void method is a factory returning the destination. Remaining
    /// parameters are context parameters, each with a distinct type.
    pub fn from_input(unit: &str, index: usize, input: &DeclarationInput) -> Result<Self, PlanError> {
        let method = &input.method;
        if !method.is_static {
            return Err(PlanError::InvalidDeclarationShape {
                method: method.name.clone(),
                reason: "mapping declarations must be static".into(),
            });
        }
        if !method.type_params.is_empty() {
            return Err(PlanError::InvalidDeclarationShape {
                method: method.name.clone(),
                reason: "generic mapping declarations are not supported".into(),
            });
        }

        let (shape, destination, destination_param, rest) = match &method.returns {
            Some(returns) => {
                if method.params.is_empty() {
                    return Err(PlanError::InsufficientParameters {
                        method: method.name.clone(),
                        shape: DeclarationShape::Factory.label().into(),
                        found: 0,
                        required: 1,
                    });
                }
                (DeclarationShape::Factory, returns.clone(), None, &method.params[1..])
            }
            None => {
                if method.params.len() < 2 {
                    return Err(PlanError::InsufficientParameters {
                        method: method.name.clone(),
                        shape: DeclarationShape::InPlace.label().into(),
                        found: method.params.len(),
                        required: 2,
                    });
                }
                let dest = &method.params[1];
                if dest.ty.is_value_type() {
                    return Err(PlanError::InvalidDeclarationShape {
                        method: method.name.clone(),
                        reason: format!(
                            "in-place destination `{}` is a value type and cannot be mutated",
                            dest.ty
                        ),
                    });
                }
                (
                    DeclarationShape::InPlace,
                    dest.ty.clone(),
                    Some(dest.name.clone()),
                    &method.params[2..],
                )
            }
        };

        for (i, param) in rest.iter().enumerate() {
            if rest[..i].iter().any(|p| p.ty == param.ty) {
                return Err(PlanError::DuplicateContextType {
                    method: method.name.clone(),
                    ty: param.ty.to_string(),
                });
            }
        }

        Ok(Self {
            unit: unit.to_string(),
            name: method.name.clone(),
            index,
            profile: input
                .profile
                .clone()
                .unwrap_or_else(|| DEFAULT_PROFILE.to_string()),
            source: method.params[0].clone(),
            destination,
            destination_param,
            context: rest.to_vec(),
            shape,
        })
    }

    pub fn key(&self) -> DeclarationKey {
        DeclarationKey {
            unit: self.unit.clone(),
            index: self.index,
        }
    }

    pub fn context_types(&self) -> Vec<TypeDescriptor> {
        self.context.iter().map(|p| p.ty.clone()).collect()
    }
}

impl fmt::Display for MappingDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}({} -> {})",
            self.unit, self.name, self.source.ty, self.destination
        )
    }
}
