//! Fluent declaration surface.
//!
//! Produces exactly the annotation list the declarative surface would, so
//! both surfaces go through the same [`RuleCollector`](super::RuleCollector).
//!
//! ```
//! use mapgen::rules::MappingBuilder;
//!
//! let annotations = MappingBuilder::new()
//!     .map("FullName", "Name")
//!     .order(1)
//!     .ignore("Secret")
//!     .constant("Kind", "person")
//!     .build();
//! assert_eq!(annotations.len(), 3);
//! ```

use super::{Annotation, ConstantValue, NullBehavior, RuleCollector, RuleSet};

/// Builder for an explicit member pair with all its options.
#[derive(Debug, Clone)]
pub struct PairBuilder {
    target: String,
    source: Option<String>,
    converter: Option<String>,
    null_behavior: Option<NullBehavior>,
    null_if: Option<ConstantValue>,
    order: Option<i32>,
}

impl PairBuilder {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            source: None,
            converter: None,
            null_behavior: None,
            null_if: None,
            order: None,
        }
    }

    pub fn from(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn converter(mut self, method: impl Into<String>) -> Self {
        self.converter = Some(method.into());
        self
    }

    pub fn skip_null(mut self) -> Self {
        self.null_behavior = Some(NullBehavior::Skip);
        self
    }

    pub fn null_if(mut self, value: impl Into<ConstantValue>) -> Self {
        self.null_if = Some(value.into());
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    fn build(self) -> Annotation {
        Annotation::Map {
            target: self.target,
            source: self.source,
            converter: self.converter,
            null_behavior: self.null_behavior,
            null_if: self.null_if,
            order: self.order,
        }
    }
}

/// Fluent builder for one mapping declaration's rules.
#[derive(Debug, Clone, Default)]
pub struct MappingBuilder {
    annotations: Vec<Annotation>,
}

impl MappingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn auto_match(self, enabled: bool) -> Self {
        self.push(Annotation::AutoMatch { enabled })
    }

    /// Explicit pair `target <- source`.
    pub fn map(self, target: impl Into<String>, source: impl Into<String>) -> Self {
        self.map_with(PairBuilder::new(target).from(source))
    }

    pub fn map_with(self, pair: PairBuilder) -> Self {
        self.push(pair.build())
    }

    pub fn ignore(self, target: impl Into<String>) -> Self {
        self.push(Annotation::Ignore {
            target: target.into(),
        })
    }

    pub fn constant(self, target: impl Into<String>, value: impl Into<ConstantValue>) -> Self {
        self.push(Annotation::Constant {
            target: target.into(),
            value: value.into(),
            value_type: None,
            order: None,
        })
    }

    /// Constant with an explicit value type instead of the destination's.
    pub fn typed_constant(
        self,
        target: impl Into<String>,
        value: impl Into<ConstantValue>,
        value_type: impl Into<String>,
    ) -> Self {
        self.push(Annotation::Constant {
            target: target.into(),
            value: value.into(),
            value_type: Some(value_type.into()),
            order: None,
        })
    }

    pub fn null_constant(self, target: impl Into<String>) -> Self {
        self.constant(target, ConstantValue::Null)
    }

    pub fn expression(self, target: impl Into<String>, expression: impl Into<String>) -> Self {
        self.push(Annotation::Expression {
            target: target.into(),
            expression: expression.into(),
            order: None,
        })
    }

    pub fn before_map(self, method: impl Into<String>) -> Self {
        self.push(Annotation::BeforeMap {
            method: method.into(),
        })
    }

    pub fn after_map(self, method: impl Into<String>) -> Self {
        self.push(Annotation::AfterMap {
            method: method.into(),
        })
    }

    pub fn condition(self, method: impl Into<String>) -> Self {
        self.push(Annotation::Condition {
            method: method.into(),
        })
    }

    pub fn property_condition(self, target: impl Into<String>, method: impl Into<String>) -> Self {
        self.push(Annotation::PropertyCondition {
            target: target.into(),
            method: method.into(),
        })
    }

    pub fn map_using(self, target: impl Into<String>, method: impl Into<String>) -> Self {
        self.push(Annotation::MapUsing {
            target: target.into(),
            method: method.into(),
            order: None,
        })
    }

    pub fn map_from(self, target: impl Into<String>, from: impl Into<String>) -> Self {
        self.push(Annotation::MapFrom {
            target: target.into(),
            from: from.into(),
            null_if: None,
            order: None,
        })
    }

    pub fn map_collection(self, target: impl Into<String>, mapper: impl Into<String>) -> Self {
        self.push(Annotation::MapCollection {
            target: target.into(),
            source: None,
            mapper: mapper.into(),
            order: None,
        })
    }

    pub fn map_nested(self, target: impl Into<String>, mapper: impl Into<String>) -> Self {
        self.push(Annotation::MapNested {
            target: target.into(),
            source: None,
            mapper: mapper.into(),
            order: None,
        })
    }

    pub fn converter(self, type_name: impl Into<String>) -> Self {
        self.push(Annotation::Converter {
            type_name: type_name.into(),
            prefix: None,
        })
    }

    pub fn converter_with_prefix(
        self,
        type_name: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        self.push(Annotation::Converter {
            type_name: type_name.into(),
            prefix: Some(prefix.into()),
        })
    }

    pub fn collection_converter(self, type_name: impl Into<String>) -> Self {
        self.push(Annotation::CollectionConverter {
            type_name: type_name.into(),
        })
    }

    /// Set the explicit order of the last ordered rule. No-op for rules
    /// that carry no order.
    pub fn order(mut self, value: i32) -> Self {
        if let Some(
            Annotation::Map { order, .. }
            | Annotation::Constant { order, .. }
            | Annotation::Expression { order, .. }
            | Annotation::MapUsing { order, .. }
            | Annotation::MapFrom { order, .. }
            | Annotation::MapCollection { order, .. }
            | Annotation::MapNested { order, .. },
        ) = self.annotations.last_mut()
        {
            *order = Some(value);
        }
        self
    }

    /// Set the source member of the last collection/nested redirect.
    pub fn source(mut self, value: impl Into<String>) -> Self {
        if let Some(
            Annotation::MapCollection { source, .. } | Annotation::MapNested { source, .. },
        ) = self.annotations.last_mut()
        {
            *source = Some(value.into());
        }
        self
    }

    /// Set the null sentinel of the last pair or `map_from` rule.
    pub fn null_if(mut self, value: impl Into<ConstantValue>) -> Self {
        if let Some(Annotation::Map { null_if, .. } | Annotation::MapFrom { null_if, .. }) =
            self.annotations.last_mut()
        {
            *null_if = Some(value.into());
        }
        self
    }

    pub fn build(self) -> Vec<Annotation> {
        self.annotations
    }

    /// Build and run the rule collector.
    pub fn collect(self) -> RuleSet {
        RuleCollector::collect(&[], &self.annotations)
    }
}
