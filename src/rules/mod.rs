//! Rule vocabulary
//!
//! [`Annotation`] is the declarative input vocabulary attached to a mapping
//! declaration (or, for converter overrides, to the containing unit). The
//! [`RuleCollector`] classifies annotations into ordered [`Rule`]s; the
//! fluent [`MappingBuilder`] produces the very same annotation list.

pub mod builder;
pub mod collector;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use builder::{MappingBuilder, PairBuilder};
pub use collector::{RuleCollector, RuleSet};

// =============================================================================
// INPUT VOCABULARY
// =============================================================================

/// What to do with a nullable source that turns out to be null when the
/// destination cannot hold null.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullBehavior {
    /// Assign the destination type's default value.
    #[default]
    Default,
    /// Leave the destination member untouched.
    Skip,
}

/// A constant value, either boxed (type taken from the destination member)
/// or paired with an explicit `value_type` on the rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstantValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ConstantValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ConstantValue::Null)
    }
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantValue::Null => f.write_str("null"),
            ConstantValue::Bool(b) => write!(f, "{}", b),
            ConstantValue::Int(i) => write!(f, "{}", i),
            ConstantValue::Float(x) => write!(f, "{}", x),
            ConstantValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<&str> for ConstantValue {
    fn from(value: &str) -> Self {
        ConstantValue::Text(value.to_string())
    }
}

impl From<String> for ConstantValue {
    fn from(value: String) -> Self {
        ConstantValue::Text(value)
    }
}

impl From<i64> for ConstantValue {
    fn from(value: i64) -> Self {
        ConstantValue::Int(value)
    }
}

impl From<i32> for ConstantValue {
    fn from(value: i32) -> Self {
        ConstantValue::Int(value.into())
    }
}

impl From<f64> for ConstantValue {
    fn from(value: f64) -> Self {
        ConstantValue::Float(value)
    }
}

impl From<bool> for ConstantValue {
    fn from(value: bool) -> Self {
        ConstantValue::Bool(value)
    }
}

/// One declarative rule annotation, as written on a mapping declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Annotation {
    /// Whole-mapping auto-match toggle.
    AutoMatch { enabled: bool },
    /// Explicit member pair.
    Map {
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        converter: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        null_behavior: Option<NullBehavior>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        null_if: Option<ConstantValue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        order: Option<i32>,
    },
    Ignore { target: String },
    Constant {
        target: String,
        value: ConstantValue,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        order: Option<i32>,
    },
    Expression {
        target: String,
        expression: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        order: Option<i32>,
    },
    BeforeMap { method: String },
    AfterMap { method: String },
    /// Global condition: the whole mapping body runs only when it holds.
    Condition { method: String },
    PropertyCondition { target: String, method: String },
    MapUsing {
        target: String,
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        order: Option<i32>,
    },
    MapFrom {
        target: String,
        from: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        null_if: Option<ConstantValue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        order: Option<i32>,
    },
    MapCollection {
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        mapper: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        order: Option<i32>,
    },
    MapNested {
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        mapper: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        order: Option<i32>,
    },
    Converter {
        type_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
    },
    CollectionConverter { type_name: String },
}

// =============================================================================
// CLASSIFIED RULES
// =============================================================================

/// Total ordering key: explicit order first, then definition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderKey {
    pub order: i32,
    pub definition: usize,
}

impl OrderKey {
    pub fn new(order: i32, definition: usize) -> Self {
        Self { order, definition }
    }
}

/// Converter type reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConverterRef {
    pub type_name: String,
    pub prefix: String,
}

/// Classified rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    ExplicitPair {
        target: String,
        source: Option<String>,
        converter: Option<String>,
        null_behavior: NullBehavior,
        null_if: Option<ConstantValue>,
        /// Property-level condition, attached after collection.
        condition: Option<String>,
    },
    Ignore {
        target: String,
    },
    Constant {
        target: String,
        value: ConstantValue,
        value_type: Option<String>,
    },
    Expression {
        target: String,
        expression: String,
    },
    MapUsing {
        target: String,
        method: String,
    },
    MapFrom {
        target: String,
        from: String,
        null_if: Option<ConstantValue>,
    },
    Collection {
        target: String,
        source: Option<String>,
        mapper: String,
    },
    Nested {
        target: String,
        source: Option<String>,
        mapper: String,
    },
    GlobalCondition {
        method: String,
    },
    PropertyCondition {
        target: String,
        method: String,
    },
    BeforeMap {
        method: String,
    },
    AfterMap {
        method: String,
    },
    ConverterOverride(ConverterRef),
    CollectionConverterOverride {
        type_name: String,
    },
}

impl RuleKind {
    /// Destination member the rule writes, if it writes one.
    pub fn target(&self) -> Option<&str> {
        match self {
            RuleKind::ExplicitPair { target, .. }
            | RuleKind::Ignore { target }
            | RuleKind::Constant { target, .. }
            | RuleKind::Expression { target, .. }
            | RuleKind::MapUsing { target, .. }
            | RuleKind::MapFrom { target, .. }
            | RuleKind::Collection { target, .. }
            | RuleKind::Nested { target, .. }
            | RuleKind::PropertyCondition { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Rules that produce a value other than a plain member copy. Their
    /// targets are excluded from auto-matching.
    pub fn is_derived(&self) -> bool {
        matches!(
            self,
            RuleKind::Constant { .. }
                | RuleKind::Expression { .. }
                | RuleKind::MapUsing { .. }
                | RuleKind::MapFrom { .. }
                | RuleKind::Collection { .. }
                | RuleKind::Nested { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            RuleKind::ExplicitPair { .. } => "map",
            RuleKind::Ignore { .. } => "ignore",
            RuleKind::Constant { .. } => "constant",
            RuleKind::Expression { .. } => "expression",
            RuleKind::MapUsing { .. } => "map_using",
            RuleKind::MapFrom { .. } => "map_from",
            RuleKind::Collection { .. } => "map_collection",
            RuleKind::Nested { .. } => "map_nested",
            RuleKind::GlobalCondition { .. } => "condition",
            RuleKind::PropertyCondition { .. } => "property_condition",
            RuleKind::BeforeMap { .. } => "before_map",
            RuleKind::AfterMap { .. } => "after_map",
            RuleKind::ConverterOverride(_) => "converter",
            RuleKind::CollectionConverterOverride { .. } => "collection_converter",
        }
    }
}

/// A classified rule stamped with its ordering key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub kind: RuleKind,
    pub key: OrderKey,
}
