//! Plan interpreter
//!
//! Executes a [`MappingPlan`] directly against dynamic values instead of
//! rendering it. Statement order, null guards, null policy, conditions and
//! instantiation follow the plan exactly as the synthesizer renders it.
//!
//! User methods (callbacks, conditions, converters, redirects) and opaque
//! expressions are supplied through a [`MethodTable`].

pub mod cache;
pub mod value;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use crate::binder::{BoundMethod, CallForm};
use crate::convert::{Conversion, ConversionPlan, Fallback, NullHandling};
use crate::declaration::DeclarationShape;
use crate::plan::{
    Assignment, CollectionRedirect, MapFromAssignment, MapFromSource, MappingPlan, MemberPath,
    NestedRedirect,
};
use crate::types::{is_assignable, TypeDescriptor, TypeIntrospector};

pub use cache::{PlanCache, PlanKey};
pub use value::{constant_value, default_value, describe, new_instance, to_primitive};

/// Failures while executing a plan.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    #[error("method `{0}` is not registered")]
    UnknownMethod(String),

    #[error("expression `{0}` is not registered")]
    UnknownExpression(String),

    #[error("cannot cast {from} to `{to}`")]
    InvalidCast { from: String, to: String },

    #[error("value {value} is out of range for `{to}`")]
    Overflow { value: String, to: String },

    #[error("cannot parse {value:?} as `{to}`")]
    Parse { value: String, to: String },

    #[error("`{0}` is null")]
    NullReference(String),

    #[error("`{path}` is {found}, expected an object")]
    NotAnObject { path: String, found: String },

    #[error("`{path}` is {found}, expected a collection")]
    NotACollection { path: String, found: String },

    #[error("condition `{method}` returned {found}, expected a bool")]
    NonBoolCondition { method: String, found: String },

    #[error("`{method}` failed: {message}")]
    Method { method: String, message: String },
}

/// A user method. Arguments are laid out as at the call site: inputs, the
/// destination instance for fill-style methods, then context values. A
/// method may update any argument in place; the interpreter reads the
/// destination back after the call.
pub type UserFn = Arc<dyn Fn(&mut [Value]) -> Result<Value, ExecError> + Send + Sync>;

/// An opaque expression, evaluated against the source and context.
pub type ExpressionFn = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, ExecError> + Send + Sync>;

/// Implementations of the user methods and expressions a plan refers to.
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: HashMap<String, UserFn>,
    expressions: HashMap<String, ExpressionFn>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method under its call-site name (`Name` or `Owner.Name`).
    /// Zero-argument source methods used by `map_from` are registered as
    /// `SourceType.Name` and receive the source as their only argument.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&mut [Value]) -> Result<Value, ExecError> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(f));
        self
    }

    pub fn register_expression<F>(&mut self, expression: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, ExecError> + Send + Sync + 'static,
    {
        self.expressions.insert(expression.into(), Arc::new(f));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    fn invoke(&self, name: &str, args: &mut [Value]) -> Result<Value, ExecError> {
        let f = self
            .methods
            .get(name)
            .ok_or_else(|| ExecError::UnknownMethod(name.to_string()))?;
        f(args)
    }

    fn evaluate(&self, expression: &str, source: &Value, context: &[Value]) -> Result<Value, ExecError> {
        let f = self
            .expressions
            .get(expression)
            .ok_or_else(|| ExecError::UnknownExpression(expression.to_string()))?;
        f(source, context)
    }
}

impl std::fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut methods: Vec<&String> = self.methods.keys().collect();
        methods.sort();
        let mut expressions: Vec<&String> = self.expressions.keys().collect();
        expressions.sort();
        f.debug_struct("MethodTable")
            .field("methods", &methods)
            .field("expressions", &expressions)
            .finish()
    }
}

// =============================================================================
// PATH ACCESS
// =============================================================================

fn lookup<'v>(value: &'v Value, name: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(name),
        _ => None,
    }
}

/// Read a path, yielding null as soon as any segment is null or missing.
pub fn read_path(root: &Value, path: &MemberPath) -> Value {
    let mut current = root;
    for segment in path.segments() {
        match lookup(current, &segment.name) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

/// Mutable slot for the leaf of `path`. Every intermediate must already be
/// an object.
fn slot<'v>(root: &'v mut Value, path: &MemberPath) -> Result<&'v mut Value, ExecError> {
    let mut current = root;
    let mut walked = String::new();
    for segment in path.segments() {
        let found = describe(current);
        let Value::Object(map) = current else {
            return Err(match found.as_str() {
                "null" => ExecError::NullReference(walked),
                _ => ExecError::NotAnObject {
                    path: walked,
                    found,
                },
            });
        };
        if !walked.is_empty() {
            walked.push('.');
        }
        walked.push_str(&segment.name);
        current = map.entry(segment.name.clone()).or_insert(Value::Null);
    }
    Ok(current)
}

pub fn write_path(root: &mut Value, path: &MemberPath, value: Value) -> Result<(), ExecError> {
    *slot(root, path)? = value;
    Ok(())
}

// =============================================================================
// INTERPRETER
// =============================================================================

/// Executes plans against dynamic values.
pub struct PlanInterpreter<'a> {
    intro: &'a dyn TypeIntrospector,
    methods: &'a MethodTable,
}

struct Frame<'f> {
    source: &'f Value,
    context: &'f [Value],
}

impl<'a> PlanInterpreter<'a> {
    pub fn new(intro: &'a dyn TypeIntrospector, methods: &'a MethodTable) -> Self {
        Self { intro, methods }
    }

    /// Run a plan the way its factory form would: a fresh destination is
    /// created, filled and returned. In-place plans also work this way.
    pub fn execute(&self, plan: &MappingPlan, source: &Value, context: &[Value]) -> Result<Value, ExecError> {
        let mut target = new_instance(self.intro, &plan.declaration.destination);
        self.execute_into(plan, source, &mut target, context)?;
        Ok(target)
    }

    /// Run a plan against an existing destination. Existing intermediate
    /// objects are reused, not replaced.
    pub fn execute_into(
        &self,
        plan: &MappingPlan,
        source: &Value,
        target: &mut Value,
        context: &[Value],
    ) -> Result<(), ExecError> {
        if source.is_null() {
            return Err(ExecError::NullReference(plan.declaration.source.name.clone()));
        }
        let frame = Frame { source, context };
        trace!(declaration = %plan.declaration, "executing plan");

        if let Some(condition) = &plan.condition {
            if !self.condition(condition, &frame)? {
                return Ok(());
            }
        }
        if let Some(before) = &plan.before_map {
            self.callback(before, &frame, target)?;
        }

        for inst in &plan.instantiations {
            self.instantiate(target, &inst.path)?;
        }
        for assignment in &plan.assignments {
            self.assignment(assignment, &frame, target)?;
        }
        for group in &plan.guarded {
            let open = group
                .guard
                .checks
                .iter()
                .all(|check| !read_path(source, check).is_null());
            if !open {
                continue;
            }
            for inst in &group.instantiations {
                self.instantiate(target, &inst.path)?;
            }
            for assignment in &group.assignments {
                self.assignment(assignment, &frame, target)?;
            }
        }

        for constant in &plan.constants {
            let value = constant_value(self.intro, &constant.value, &constant.value_type);
            write_path(target, &constant.destination, value)?;
        }
        for expression in &plan.expressions {
            let value = self
                .methods
                .evaluate(&expression.expression, source, context)?;
            write_path(target, &expression.destination, value)?;
        }
        for entry in &plan.map_using {
            let ty = entry.destination.leaf_type().clone();
            let value = self.produce(&entry.method, vec![source.clone()], &ty, &frame)?;
            write_path(target, &entry.destination, value)?;
        }
        for entry in &plan.map_from {
            self.map_from(plan, entry, &frame, target)?;
        }
        for redirect in &plan.nested {
            self.nested(redirect, &frame, target)?;
        }
        for redirect in &plan.collections {
            self.collection(redirect, &frame, target)?;
        }

        if let Some(after) = &plan.after_map {
            self.callback(after, &frame, target)?;
        }
        Ok(())
    }

    /// Whether this plan's declaration returns the destination.
    pub fn is_factory(plan: &MappingPlan) -> bool {
        plan.declaration.shape == DeclarationShape::Factory
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn call(
        &self,
        method: &BoundMethod,
        inputs: Vec<Value>,
        fill: Option<Value>,
        frame: &Frame<'_>,
    ) -> Result<(Value, Option<Value>), ExecError> {
        let mut args = inputs;
        let fill_at = match (method.form, fill) {
            (CallForm::FillsDestination, Some(fill)) => {
                args.push(fill);
                Some(args.len() - 1)
            }
            _ => None,
        };
        if method.passes_context {
            args.extend(frame.context.iter().cloned());
        }
        let name = method.call_name();
        let result = self.methods.invoke(&name, &mut args)?;
        let filled = fill_at.map(|i| std::mem::take(&mut args[i]));
        Ok((result, filled))
    }

    fn condition(&self, method: &BoundMethod, frame: &Frame<'_>) -> Result<bool, ExecError> {
        let (result, _) = self.call(method, vec![frame.source.clone()], None, frame)?;
        match result {
            Value::Bool(b) => Ok(b),
            other => Err(ExecError::NonBoolCondition {
                method: method.call_name(),
                found: describe(&other),
            }),
        }
    }

    /// Before/after callbacks see the destination and may change it.
    fn callback(&self, method: &BoundMethod, frame: &Frame<'_>, target: &mut Value) -> Result<(), ExecError> {
        let mut args = vec![frame.source.clone(), std::mem::take(target)];
        if method.passes_context {
            args.extend(frame.context.iter().cloned());
        }
        let outcome = self.methods.invoke(&method.call_name(), &mut args);
        *target = std::mem::take(&mut args[1]);
        outcome.map(|_| ())
    }

    /// Value of a mapper-style method: its result, or the instance it filled.
    fn produce(
        &self,
        method: &BoundMethod,
        inputs: Vec<Value>,
        ty: &TypeDescriptor,
        frame: &Frame<'_>,
    ) -> Result<Value, ExecError> {
        match method.form {
            CallForm::Returning => Ok(self.call(method, inputs, None, frame)?.0),
            CallForm::FillsDestination => {
                let fresh = new_instance(self.intro, ty);
                let (_, filled) = self.call(method, inputs, Some(fresh), frame)?;
                Ok(filled.unwrap_or(Value::Null))
            }
        }
    }

    // =========================================================================
    // Conversion
    // =========================================================================

    /// Apply a conversion plan. `None` means the write is skipped.
    fn convert(&self, plan: &ConversionPlan, value: Value, frame: &Frame<'_>) -> Result<Option<Value>, ExecError> {
        if value.is_null() {
            return Ok(match &plan.null_handling {
                NullHandling::Skip => None,
                NullHandling::Substitute(Fallback::Default) => {
                    Some(default_value(self.intro, &plan.destination))
                }
                NullHandling::Substitute(Fallback::Sentinel(sentinel)) => {
                    Some(constant_value(self.intro, sentinel, &plan.destination))
                }
                NullHandling::NotNull | NullHandling::PassThrough | NullHandling::Propagate => {
                    Some(default_value(self.intro, &plan.destination))
                }
            });
        }

        let converted = match &plan.conversion {
            Conversion::None => value,
            Conversion::Widening => self.to_type(&value, &plan.destination, false)?,
            Conversion::Cast => self.cast(&value, &plan.source, &plan.destination)?,
            Conversion::Specialized { .. } | Conversion::Generic { .. } => {
                self.runtime_convert(&value, &plan.source, &plan.destination)?
            }
            Conversion::Custom(bound) => self.call(bound, vec![value], None, frame)?.0,
        };
        Ok(Some(converted))
    }

    fn to_type(&self, value: &Value, ty: &TypeDescriptor, parse: bool) -> Result<Value, ExecError> {
        match ty.primitive_kind() {
            Some(kind) => to_primitive(value, kind, parse),
            None => Err(ExecError::InvalidCast {
                from: describe(value),
                to: ty.to_string(),
            }),
        }
    }

    fn enum_values(&self, ty: &TypeDescriptor) -> Option<&[String]> {
        self.intro
            .shape(&ty.name)
            .filter(|s| s.is_enum)
            .map(|s| s.enum_values.as_slice())
    }

    /// Direct cast: enum/integral pairs by member position, numeric kinds
    /// with a range check. Anything else is an invalid cast.
    fn cast(&self, value: &Value, source: &TypeDescriptor, dest: &TypeDescriptor) -> Result<Value, ExecError> {
        let invalid = || ExecError::InvalidCast {
            from: describe(value),
            to: dest.to_string(),
        };
        let position = match (self.enum_values(source), value) {
            (Some(values), Value::String(member)) => {
                Some(values.iter().position(|v| v == member).ok_or_else(invalid)?)
            }
            _ => None,
        };

        if let Some(values) = self.enum_values(dest) {
            let index = match (position, value) {
                (Some(i), _) => i,
                (None, Value::Number(n)) => n
                    .as_u64()
                    .and_then(|i| usize::try_from(i).ok())
                    .ok_or_else(invalid)?,
                _ => return Err(invalid()),
            };
            return values
                .get(index)
                .map(|v| Value::String(v.clone()))
                .ok_or_else(|| ExecError::Overflow {
                    value: index.to_string(),
                    to: dest.to_string(),
                });
        }

        match position {
            Some(i) => self.to_type(&Value::from(i as u64), dest, false),
            None => self.to_type(value, dest, false),
        }
    }

    /// Built-in behavior of the specialized and generic converters.
    fn runtime_convert(
        &self,
        value: &Value,
        source: &TypeDescriptor,
        dest: &TypeDescriptor,
    ) -> Result<Value, ExecError> {
        if is_assignable(self.intro, source, dest) {
            return Ok(value.clone());
        }
        if self.enum_values(dest).is_some() {
            if let Value::String(member) = value {
                return match self.enum_values(dest) {
                    Some(values) if values.contains(member) => Ok(value.clone()),
                    _ => Err(ExecError::Parse {
                        value: member.clone(),
                        to: dest.to_string(),
                    }),
                };
            }
            return self.cast(value, source, dest);
        }
        if self.enum_values(source).is_some() && dest.is_string() {
            return Ok(value.clone());
        }
        self.to_type(value, dest, true)
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn instantiate(&self, target: &mut Value, path: &MemberPath) -> Result<(), ExecError> {
        let slot = slot(target, path)?;
        if slot.is_null() {
            *slot = new_instance(self.intro, path.leaf_type());
        }
        Ok(())
    }

    fn assignment(&self, assignment: &Assignment, frame: &Frame<'_>, target: &mut Value) -> Result<(), ExecError> {
        if let Some(condition) = &assignment.condition {
            if !self.condition(condition, frame)? {
                return Ok(());
            }
        }
        let value = read_path(frame.source, &assignment.source);
        if let Some(value) = self.convert(&assignment.conversion, value, frame)? {
            write_path(target, &assignment.destination, value)?;
        }
        Ok(())
    }

    fn map_from(
        &self,
        plan: &MappingPlan,
        entry: &MapFromAssignment,
        frame: &Frame<'_>,
        target: &mut Value,
    ) -> Result<(), ExecError> {
        let value = match &entry.from {
            MapFromSource::StaticMethod { method } => {
                let ty = entry.destination.leaf_type().clone();
                self.produce(method, vec![frame.source.clone()], &ty, frame)?
            }
            MapFromSource::SourceMethod { name, .. } => {
                let qualified = format!("{}.{}", plan.declaration.source.ty.name, name);
                let mut args = vec![frame.source.clone()];
                self.methods.invoke(&qualified, &mut args)?
            }
            MapFromSource::Path { path } => read_path(frame.source, path),
        };
        if let Some(value) = self.convert(&entry.conversion, value, frame)? {
            write_path(target, &entry.destination, value)?;
        }
        Ok(())
    }

    fn nested(&self, redirect: &NestedRedirect, frame: &Frame<'_>, target: &mut Value) -> Result<(), ExecError> {
        let ty = redirect.destination.leaf_type().clone();
        let source = read_path(frame.source, &redirect.source);
        let value = if source.is_null() && redirect.source_nullable {
            default_value(self.intro, &ty)
        } else {
            self.produce(&redirect.method, vec![source], &ty, frame)?
        };
        write_path(target, &redirect.destination, value)
    }

    fn collection(&self, redirect: &CollectionRedirect, frame: &Frame<'_>, target: &mut Value) -> Result<(), ExecError> {
        let source = read_path(frame.source, &redirect.source);
        let value = match source {
            Value::Null => default_value(self.intro, redirect.destination.leaf_type()),
            Value::Array(items) => {
                let mapped = items
                    .into_iter()
                    .map(|item| {
                        self.produce(
                            &redirect.method,
                            vec![item],
                            &redirect.destination_element,
                            frame,
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Value::Array(mapped)
            }
            other => {
                return Err(ExecError::NotACollection {
                    path: redirect.source.dotted(),
                    found: describe(&other),
                })
            }
        };
        write_path(target, &redirect.destination, value)
    }
}
