//! Rule Collector
//!
//! Turns the unordered annotation set of one mapping declaration into a
//! classified rule list and the set of destination members excluded from
//! auto-matching.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Annotation, ConverterRef, NullBehavior, OrderKey, Rule, RuleKind};
use crate::types::registry::DEFAULT_CONVERTER_PREFIX;

/// Classified rules of one mapping declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Rules in discovery order; `key.definition` is the discovery index.
    pub rules: Vec<Rule>,
    /// Destination members that auto-matching must not touch.
    pub ignored: BTreeSet<String>,
    /// Explicit auto-match toggle, `None` when not declared.
    pub auto_match: Option<bool>,
}

impl RuleSet {
    /// Rules sorted by ordering key.
    pub fn sorted(&self) -> Vec<&Rule> {
        let mut rules: Vec<&Rule> = self.rules.iter().collect();
        rules.sort_by_key(|r| r.key);
        rules
    }

    pub fn is_ignored(&self, target: &str) -> bool {
        self.ignored.contains(target)
    }

    fn first<'a, T>(&'a self, pick: impl Fn(&'a RuleKind) -> Option<T>) -> Option<T> {
        self.sorted().into_iter().find_map(|r| pick(&r.kind))
    }

    pub fn before_map(&self) -> Option<&str> {
        self.first(|k| match k {
            RuleKind::BeforeMap { method } => Some(method.as_str()),
            _ => None,
        })
    }

    pub fn after_map(&self) -> Option<&str> {
        self.first(|k| match k {
            RuleKind::AfterMap { method } => Some(method.as_str()),
            _ => None,
        })
    }

    pub fn global_condition(&self) -> Option<&str> {
        self.first(|k| match k {
            RuleKind::GlobalCondition { method } => Some(method.as_str()),
            _ => None,
        })
    }

    /// Active converter override. Declaration-level annotations are stamped
    /// before unit-level ones, so they win.
    pub fn converter(&self) -> Option<&ConverterRef> {
        self.rules.iter().find_map(|r| match &r.kind {
            RuleKind::ConverterOverride(c) => Some(c),
            _ => None,
        })
    }

    pub fn collection_converter(&self) -> Option<&str> {
        self.rules.iter().find_map(|r| match &r.kind {
            RuleKind::CollectionConverterOverride { type_name } => Some(type_name.as_str()),
            _ => None,
        })
    }

    /// Property-level condition declared for `target`.
    pub fn condition_for(&self, target: &str) -> Option<&str> {
        self.first(|k| match k {
            RuleKind::PropertyCondition { target: t, method } if t == target => {
                Some(method.as_str())
            }
            _ => None,
        })
    }
}

/// Collects and classifies annotations.
#[derive(Debug, Default)]
pub struct RuleCollector {
    next_definition: usize,
    rules: Vec<Rule>,
    auto_match: Option<bool>,
}

impl RuleCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the rules of one declaration. `unit_annotations` are the
    /// class-level annotations of the containing unit; only converter
    /// overrides are taken from there.
    pub fn collect(unit_annotations: &[Annotation], annotations: &[Annotation]) -> RuleSet {
        let mut collector = Self::new();
        for annotation in annotations {
            collector.push(annotation);
        }
        for annotation in unit_annotations {
            match annotation {
                Annotation::Converter { .. } | Annotation::CollectionConverter { .. } => {
                    collector.push(annotation)
                }
                other => warn!(
                    annotation = ?other,
                    "ignoring unit-level annotation: only converter overrides apply to a whole unit"
                ),
            }
        }
        collector.finish()
    }

    /// Classify one annotation and stamp it with the next definition index.
    pub fn push(&mut self, annotation: &Annotation) {
        let (kind, order) = match annotation.clone() {
            Annotation::AutoMatch { enabled } => {
                self.auto_match = Some(enabled);
                return;
            }
            Annotation::Map {
                target,
                source,
                converter,
                null_behavior,
                null_if,
                order,
            } => (
                RuleKind::ExplicitPair {
                    target,
                    source,
                    converter,
                    null_behavior: null_behavior.unwrap_or(NullBehavior::Default),
                    null_if,
                    condition: None,
                },
                order,
            ),
            Annotation::Ignore { target } => (RuleKind::Ignore { target }, None),
            Annotation::Constant {
                target,
                value,
                value_type,
                order,
            } => (
                RuleKind::Constant {
                    target,
                    value,
                    value_type,
                },
                order,
            ),
            Annotation::Expression {
                target,
                expression,
                order,
            } => (RuleKind::Expression { target, expression }, order),
            Annotation::BeforeMap { method } => (RuleKind::BeforeMap { method }, None),
            Annotation::AfterMap { method } => (RuleKind::AfterMap { method }, None),
            Annotation::Condition { method } => (RuleKind::GlobalCondition { method }, None),
            Annotation::PropertyCondition { target, method } => {
                (RuleKind::PropertyCondition { target, method }, None)
            }
            Annotation::MapUsing {
                target,
                method,
                order,
            } => (RuleKind::MapUsing { target, method }, order),
            Annotation::MapFrom {
                target,
                from,
                null_if,
                order,
            } => (
                RuleKind::MapFrom {
                    target,
                    from,
                    null_if,
                },
                order,
            ),
            Annotation::MapCollection {
                target,
                source,
                mapper,
                order,
            } => (
                RuleKind::Collection {
                    target,
                    source,
                    mapper,
                },
                order,
            ),
            Annotation::MapNested {
                target,
                source,
                mapper,
                order,
            } => (
                RuleKind::Nested {
                    target,
                    source,
                    mapper,
                },
                order,
            ),
            Annotation::Converter { type_name, prefix } => (
                RuleKind::ConverterOverride(ConverterRef {
                    type_name,
                    prefix: prefix.unwrap_or_else(|| DEFAULT_CONVERTER_PREFIX.to_string()),
                }),
                None,
            ),
            Annotation::CollectionConverter { type_name } => {
                (RuleKind::CollectionConverterOverride { type_name }, None)
            }
        };

        let key = OrderKey::new(order.unwrap_or(0), self.next_definition);
        self.next_definition += 1;
        self.rules.push(Rule { kind, key });
    }

    /// Attach property conditions and compute the ignored set.
    pub fn finish(mut self) -> RuleSet {
        let conditions: Vec<(String, String)> = self
            .rules
            .iter()
            .filter_map(|r| match &r.kind {
                RuleKind::PropertyCondition { target, method } => {
                    Some((target.clone(), method.clone()))
                }
                _ => None,
            })
            .collect();

        for (cond_target, cond_method) in conditions {
            for rule in &mut self.rules {
                if let RuleKind::ExplicitPair {
                    target, condition, ..
                } = &mut rule.kind
                {
                    if *target == cond_target && condition.is_none() {
                        *condition = Some(cond_method.clone());
                    }
                }
            }
        }

        let ignored = self
            .rules
            .iter()
            .filter(|r| r.kind.is_derived() || matches!(r.kind, RuleKind::Ignore { .. }))
            .filter_map(|r| r.kind.target().map(str::to_string))
            .collect();

        RuleSet {
            rules: self.rules,
            ignored,
            auto_match: self.auto_match,
        }
    }
}
