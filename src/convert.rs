//! Conversion Planner
//!
//! Decides, per assignment, how a source value reaches its destination
//! member. Decisions are made on the underlying (nullable-stripped) types:
//!
//! 1. same underlying type: no conversion, nullable wrap/unwrap only
//! 2. implicit numeric widening: direct assignment
//! 3. enum to/from integral: direct cast
//! 4. `<prefix>To<Kind>` on the active converter type
//! 5. the generic `<prefix><TSource, TDestination>` on the same type
//! 6. direct cast, which may fail when executed
//!
//! Null handling is decided separately from the conversion strategy.

use serde::{Deserialize, Serialize};

use crate::binder::BoundMethod;
use crate::rules::{ConstantValue, ConverterRef, NullBehavior};
use crate::types::{find_methods, is_assignable, PrimitiveKind, TypeDescriptor, TypeIntrospector};

// =============================================================================
// WIDENING TABLE
// =============================================================================

/// Fixed implicit numeric widening table.
///
/// | from | widens to |
/// |------|-----------|
/// | sbyte | short, int, long, float, double, decimal |
/// | byte | short, ushort, int, uint, long, ulong, float, double, decimal |
/// | short | int, long, float, double, decimal |
/// | ushort | int, uint, long, ulong, float, double, decimal |
/// | int | long, float, double, decimal |
/// | uint | long, ulong, float, double, decimal |
/// | long, ulong | float, double, decimal |
/// | char | ushort, int, uint, long, ulong, float, double, decimal |
/// | float | double |
pub fn widens_to(from: PrimitiveKind) -> &'static [PrimitiveKind] {
    use PrimitiveKind::*;
    match from {
        SByte => &[Int16, Int32, Int64, Single, Double, Decimal],
        Byte => &[
            Int16, UInt16, Int32, UInt32, Int64, UInt64, Single, Double, Decimal,
        ],
        Int16 => &[Int32, Int64, Single, Double, Decimal],
        UInt16 => &[Int32, UInt32, Int64, UInt64, Single, Double, Decimal],
        Int32 => &[Int64, Single, Double, Decimal],
        UInt32 => &[Int64, UInt64, Single, Double, Decimal],
        Int64 | UInt64 => &[Single, Double, Decimal],
        Char => &[UInt16, Int32, UInt32, Int64, UInt64, Single, Double, Decimal],
        Single => &[Double],
        _ => &[],
    }
}

pub fn is_implicit_widening(from: PrimitiveKind, to: PrimitiveKind) -> bool {
    widens_to(from).contains(&to)
}

fn widening_between(source: &TypeDescriptor, dest: &TypeDescriptor) -> bool {
    match (source.primitive_kind(), dest.primitive_kind()) {
        (Some(from), Some(to)) => is_implicit_widening(from, to),
        _ => false,
    }
}

/// Whether assigning `source` to `dest` needs more than a plain (possibly
/// nullable-wrapping or widening) assignment.
pub fn requires_conversion(source: &TypeDescriptor, dest: &TypeDescriptor) -> bool {
    !source.same_underlying(dest) && !widening_between(source, dest)
}

// =============================================================================
// PLAN
// =============================================================================

/// How the value is transformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Conversion {
    /// Identity or nullable wrap/unwrap.
    None,
    Widening,
    /// Direct cast. Enum/integral pairs, and the last-resort fallback.
    Cast,
    /// `owner.method(value)` with a fixed-kind converter.
    Specialized { owner: String, method: String },
    /// `owner.method<TSource, TDestination>(value)`.
    Generic { owner: String, method: String },
    /// User converter named on the rule.
    Custom(BoundMethod),
}

impl Conversion {
    pub fn is_call(&self) -> bool {
        matches!(
            self,
            Conversion::Specialized { .. } | Conversion::Generic { .. } | Conversion::Custom(_)
        )
    }
}

/// Value assigned when the source is null and the destination needs one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    /// The destination type's default value.
    Default,
    /// A declared sentinel (`null_if`).
    Sentinel(ConstantValue),
}

/// What happens when the source value is null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "on_null", content = "fallback", rename_all = "snake_case")]
pub enum NullHandling {
    /// Source is not nullable.
    NotNull,
    /// Null is assigned as-is.
    PassThrough,
    /// Null short-circuits the conversion and null is assigned.
    Propagate,
    /// A fallback value is assigned instead.
    Substitute(Fallback),
    /// The assignment is skipped.
    Skip,
}

impl NullHandling {
    /// The assignment reads the source only after a null check.
    pub fn checks_null(&self) -> bool {
        !matches!(self, NullHandling::NotNull | NullHandling::PassThrough)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionPlan {
    pub source: TypeDescriptor,
    pub destination: TypeDescriptor,
    pub conversion: Conversion,
    pub null_handling: NullHandling,
}

impl ConversionPlan {
    pub fn requires_conversion(&self) -> bool {
        !matches!(self.conversion, Conversion::None | Conversion::Widening)
    }
}

/// Null-handling policy for one assignment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NullPolicy {
    pub behavior: NullBehavior,
    pub null_if: Option<ConstantValue>,
}

impl NullPolicy {
    pub fn new(behavior: NullBehavior, null_if: Option<ConstantValue>) -> Self {
        Self { behavior, null_if }
    }
}

/// Plans conversions against the active converter type.
pub struct ConversionPlanner<'a> {
    intro: &'a dyn TypeIntrospector,
    converter: ConverterRef,
}

impl<'a> ConversionPlanner<'a> {
    pub fn new(intro: &'a dyn TypeIntrospector, converter: ConverterRef) -> Self {
        Self { intro, converter }
    }

    pub fn converter(&self) -> &ConverterRef {
        &self.converter
    }

    /// Plan the conversion from `source` to `dest` under `policy`.
    pub fn plan(
        &self,
        source: &TypeDescriptor,
        dest: &TypeDescriptor,
        policy: &NullPolicy,
    ) -> ConversionPlan {
        let conversion = self.strategy(source, dest);
        let null_handling = Self::null_handling(source, dest, &conversion, policy);
        ConversionPlan {
            source: source.clone(),
            destination: dest.clone(),
            conversion,
            null_handling,
        }
    }

    /// Like [`plan`](Self::plan), but a `source` already assignable to
    /// `dest` (a bound method's result) needs no conversion.
    pub fn plan_assignable(
        &self,
        source: &TypeDescriptor,
        dest: &TypeDescriptor,
        policy: &NullPolicy,
    ) -> ConversionPlan {
        if !is_assignable(self.intro, source, dest) {
            return self.plan(source, dest, policy);
        }
        let conversion = Conversion::None;
        let null_handling = Self::null_handling(source, dest, &conversion, policy);
        ConversionPlan {
            source: source.clone(),
            destination: dest.clone(),
            conversion,
            null_handling,
        }
    }

    /// Plan around a user converter already bound by the binder.
    /// `accepts_null` is set when the converter takes the nullable source
    /// type itself, in which case it sees nulls unchanged.
    pub fn plan_custom(
        &self,
        source: &TypeDescriptor,
        dest: &TypeDescriptor,
        bound: BoundMethod,
        accepts_null: bool,
        policy: &NullPolicy,
    ) -> ConversionPlan {
        let conversion = Conversion::Custom(bound);
        let null_handling = if accepts_null {
            NullHandling::NotNull
        } else {
            Self::null_handling(source, dest, &conversion, policy)
        };
        ConversionPlan {
            source: source.clone(),
            destination: dest.clone(),
            conversion,
            null_handling,
        }
    }

    fn strategy(&self, source: &TypeDescriptor, dest: &TypeDescriptor) -> Conversion {
        if source.same_underlying(dest) {
            return Conversion::None;
        }
        if widening_between(source, dest) {
            return Conversion::Widening;
        }
        if self.is_enum_integral(source, dest) {
            return Conversion::Cast;
        }
        if let Some(method) = self.specialized(source, dest) {
            return Conversion::Specialized {
                owner: self.converter.type_name.clone(),
                method,
            };
        }
        if self.has_generic() {
            return Conversion::Generic {
                owner: self.converter.type_name.clone(),
                method: self.converter.prefix.clone(),
            };
        }
        Conversion::Cast
    }

    fn is_enum_integral(&self, source: &TypeDescriptor, dest: &TypeDescriptor) -> bool {
        let integral = |t: &TypeDescriptor| t.primitive_kind().is_some_and(|k| k.is_integral());
        let is_enum = |t: &TypeDescriptor| self.intro.is_enum(&t.name);
        (is_enum(source) && (integral(dest) || is_enum(dest))) || (integral(source) && is_enum(dest))
    }

    /// `<prefix>To<SimpleDestinationName>(source) -> dest`.
    fn specialized(&self, source: &TypeDescriptor, dest: &TypeDescriptor) -> Option<String> {
        let name = format!("{}To{}", self.converter.prefix, dest.simple_name());
        find_methods(self.intro, &self.converter.type_name, &name)
            .into_iter()
            .find(|m| {
                m.is_static
                    && m.type_params.is_empty()
                    && m.params.len() == 1
                    && m.params[0].ty.same_underlying(source)
                    && m.returns.as_ref().is_some_and(|r| r.same_underlying(dest))
            })
            .map(|m| m.name)
    }

    fn has_generic(&self) -> bool {
        find_methods(self.intro, &self.converter.type_name, &self.converter.prefix)
            .iter()
            .any(|m| m.is_static && m.type_params.len() == 2 && m.params.len() == 1)
    }

    fn null_handling(
        source: &TypeDescriptor,
        dest: &TypeDescriptor,
        conversion: &Conversion,
        policy: &NullPolicy,
    ) -> NullHandling {
        // Sentinel first, then skip, then default substitution. Any reference
        // may hold null, annotated or not.
        if let Some(sentinel) = &policy.null_if {
            if source.nullable || !source.is_value_type() {
                return NullHandling::Substitute(Fallback::Sentinel(sentinel.clone()));
            }
        }
        if !source.nullable {
            return NullHandling::NotNull;
        }
        let dest_accepts_null = dest.nullable || !dest.is_value_type();
        if dest_accepts_null {
            return match conversion {
                Conversion::None | Conversion::Widening => NullHandling::PassThrough,
                _ => NullHandling::Propagate,
            };
        }
        match policy.behavior {
            NullBehavior::Skip => NullHandling::Skip,
            NullBehavior::Default => NullHandling::Substitute(Fallback::Default),
        }
    }
}
