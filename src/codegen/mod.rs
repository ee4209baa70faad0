//! Code Synthesizer
//!
//! Renders finished [`MappingPlan`]s as source text. Each plan becomes one
//! method body; plans sharing a containing unit become one rendered unit.
//!
//! Statement order inside a method body:
//!
//! 1. destination acquisition (new instance, or the passed one)
//! 2. global condition guard open
//! 3. before-map callback
//! 4. intermediate instantiation, shallow to deep
//! 5. ungrouped plain assignments
//! 6. null-guarded assignment groups
//! 7. constants, expressions, `map_using`, `map_from`
//! 8. nested redirects, then collection redirects
//! 9. after-map callback
//! 10. global condition guard close
//! 11. `return` for factory declarations
//!
//! The synthesizer never re-derives a matching or conversion decision; it
//! only spells out what the plan says.

pub mod literal;
pub mod writer;

use serde::{Deserialize, Serialize};

use crate::binder::{BoundMethod, CallForm};
use crate::config::CompilerConfig;
use crate::convert::{Conversion, ConversionPlan, Fallback, NullHandling};
use crate::declaration::DeclarationShape;
use crate::plan::{
    Assignment, CollectionRedirect, GuardGroup, Instantiation, MapFromAssignment, MapFromSource,
    MappingPlan, MemberPath, MethodAssignment, NestedRedirect,
};
use crate::rules::ConstantValue;
use crate::types::TypeDescriptor;

pub use literal::format_constant;
pub use writer::CodeWriter;

/// Header placed on every rendered unit.
pub const GENERATED_HEADER: &str = "// <auto-generated/>";

/// One rendered output unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedUnit {
    /// Fully qualified name of the containing definition.
    pub unit: String,
    pub file_name: String,
    pub source: String,
    /// Names of the declarations rendered into this unit, in order.
    pub declarations: Vec<String>,
}

/// Renders plans using the configured layout.
#[derive(Debug, Clone)]
pub struct CodeSynthesizer {
    indent_width: usize,
    emit_header: bool,
}

impl CodeSynthesizer {
    pub fn new(config: &CompilerConfig) -> Self {
        Self {
            indent_width: config.indent_width,
            emit_header: config.emit_header,
        }
    }

    /// Render all plans of one unit, in the given order.
    pub fn render_unit(&self, unit: &str, plans: &[&MappingPlan]) -> RenderedUnit {
        let (namespace, simple) = match unit.rsplit_once('.') {
            Some((ns, name)) => (Some(ns), name),
            None => (None, unit),
        };

        let mut w = CodeWriter::new(self.indent_width);
        if self.emit_header {
            w.line(GENERATED_HEADER);
        }
        w.line("#nullable enable");
        w.blank();
        if let Some(ns) = namespace {
            w.open(format!("namespace {}", ns));
        }
        w.open(format!("partial class {}", simple));
        for (i, plan) in plans.iter().enumerate() {
            if i > 0 {
                w.blank();
            }
            self.write_method(&mut w, plan);
        }
        w.close();
        if namespace.is_some() {
            w.close();
        }

        RenderedUnit {
            unit: unit.to_string(),
            file_name: format!("{}.g.cs", unit),
            source: w.finish(),
            declarations: plans.iter().map(|p| p.declaration.name.clone()).collect(),
        }
    }

    /// Render a single method at depth zero.
    pub fn render_method(&self, plan: &MappingPlan) -> String {
        let mut w = CodeWriter::new(self.indent_width);
        self.write_method(&mut w, plan);
        w.finish()
    }

    fn write_method(&self, w: &mut CodeWriter, plan: &MappingPlan) {
        let decl = &plan.declaration;
        let mut params = vec![format!("{} {}", decl.source.ty, decl.source.name)];
        let mut reserved = vec![decl.source.name.clone()];
        if let Some(dest) = &decl.destination_param {
            params.push(format!("{} {}", decl.destination, dest));
            reserved.push(dest.clone());
        }
        for p in &decl.context {
            params.push(format!("{} {}", p.ty, p.name));
            reserved.push(p.name.clone());
        }
        let returns = match decl.shape {
            DeclarationShape::Factory => decl.destination.to_string(),
            DeclarationShape::InPlace => "void".to_string(),
        };

        w.open(format!(
            "public static partial {} {}({})",
            returns,
            decl.name,
            params.join(", ")
        ));
        let mut body = MethodBody::new(w, plan, reserved);
        body.write();
        w.close();
    }
}

// =============================================================================
// METHOD BODY
// =============================================================================

struct MethodBody<'w, 'p> {
    w: &'w mut CodeWriter,
    plan: &'p MappingPlan,
    source: String,
    target: String,
    context: Vec<String>,
    reserved: Vec<String>,
    counter: usize,
}

impl<'w, 'p> MethodBody<'w, 'p> {
    fn new(w: &'w mut CodeWriter, plan: &'p MappingPlan, mut reserved: Vec<String>) -> Self {
        let decl = &plan.declaration;
        let target = match &decl.destination_param {
            Some(name) => name.clone(),
            None => {
                let mut name = "target".to_string();
                let mut n = 1;
                while reserved.contains(&name) {
                    name = format!("target{}", n);
                    n += 1;
                }
                reserved.push(name.clone());
                name
            }
        };
        Self {
            w,
            plan,
            source: decl.source.name.clone(),
            target,
            context: decl.context.iter().map(|p| p.name.clone()).collect(),
            reserved,
            counter: 0,
        }
    }

    /// Fresh local name that clashes with no parameter.
    fn fresh(&mut self, prefix: &str) -> String {
        loop {
            let name = format!("{}{}", prefix, self.counter);
            self.counter += 1;
            if !self.reserved.contains(&name) {
                return name;
            }
        }
    }

    fn write(&mut self) {
        let plan = self.plan;
        if plan.declaration.shape == DeclarationShape::Factory {
            self.w.line(format!(
                "var {} = new {}();",
                self.target,
                plan.declaration.destination.underlying()
            ));
        }

        if let Some(condition) = &plan.condition {
            let call = self.call(condition, &[self.source.clone()], None);
            self.w.open(format!("if ({})", call));
        }
        if let Some(before) = &plan.before_map {
            let call = self.call(before, &[self.source.clone(), self.target.clone()], None);
            self.w.line(format!("{};", call));
        }

        for inst in &plan.instantiations {
            self.instantiate(inst);
        }
        for assignment in &plan.assignments {
            self.assignment(assignment);
        }
        for group in &plan.guarded {
            self.guard_group(group);
        }
        for constant in &plan.constants {
            let dest = self.dest(&constant.destination);
            let value = format_constant(
                &constant.value,
                &constant.value_type,
                constant.enum_type.as_deref(),
            );
            self.w.line(format!("{} = {};", dest, value));
        }
        for expression in &plan.expressions {
            let dest = self.dest(&expression.destination);
            self.w.line(format!("{} = {};", dest, expression.expression));
        }
        for entry in &plan.map_using {
            self.map_using(entry);
        }
        for entry in &plan.map_from {
            self.map_from(entry);
        }
        for redirect in &plan.nested {
            self.nested(redirect);
        }
        for redirect in &plan.collections {
            self.collection(redirect);
        }

        if let Some(after) = &plan.after_map {
            let call = self.call(after, &[self.source.clone(), self.target.clone()], None);
            self.w.line(format!("{};", call));
        }
        if plan.condition.is_some() {
            self.w.close();
        }
        if plan.declaration.shape == DeclarationShape::Factory {
            self.w.line(format!("return {};", self.target));
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn dest(&self, path: &MemberPath) -> String {
        format!("{}.{}", self.target, path.dotted())
    }

    /// Source read that assumes every segment is present.
    fn read(&self, path: &MemberPath) -> String {
        format!("{}.{}", self.source, path.dotted())
    }

    /// Source read that null-propagates after each nullable segment.
    fn read_propagating(&self, path: &MemberPath) -> String {
        let mut out = self.source.clone();
        let mut after_nullable = false;
        for segment in path.segments() {
            out.push_str(if after_nullable { "?." } else { "." });
            out.push_str(&segment.name);
            after_nullable = segment.nullable;
        }
        out
    }

    fn call(&self, method: &BoundMethod, inputs: &[String], fill: Option<&str>) -> String {
        let mut args: Vec<String> = inputs.to_vec();
        if method.form == CallForm::FillsDestination {
            if let Some(fill) = fill {
                args.push(fill.to_string());
            }
        }
        if method.passes_context {
            args.extend(self.context.iter().cloned());
        }
        format!("{}({})", method.call_name(), args.join(", "))
    }

    fn convert(&self, plan: &ConversionPlan, operand: &str) -> String {
        match &plan.conversion {
            Conversion::None | Conversion::Widening => operand.to_string(),
            Conversion::Cast => format!("({}){}", plan.destination.underlying(), operand),
            Conversion::Specialized { owner, method } => {
                format!("{}.{}({})", owner, method, operand)
            }
            Conversion::Generic { owner, method } => format!(
                "{}.{}<{}, {}>({})",
                owner,
                method,
                plan.source.underlying(),
                plan.destination.underlying(),
                operand
            ),
            Conversion::Custom(bound) => self.call(bound, &[operand.to_string()], None),
        }
    }

    /// Write `dest = value`, honoring the plan's null handling.
    fn assign_converted(&mut self, dest: &str, value: &str, plan: &ConversionPlan) {
        match &plan.null_handling {
            NullHandling::NotNull | NullHandling::PassThrough => {
                let converted = self.convert(plan, value);
                self.w.line(format!("{} = {};", dest, converted));
            }
            NullHandling::Propagate => {
                let v = self.fresh("v");
                let converted = self.convert(plan, &v);
                let absent = absent(&plan.destination);
                self.w.line(format!(
                    "{} = {} is {{ }} {} ? {} : {};",
                    dest, value, v, converted, absent
                ));
            }
            NullHandling::Substitute(fallback) => {
                let v = self.fresh("v");
                let converted = self.convert(plan, &v);
                let fallback = match fallback {
                    Fallback::Default => "default".to_string(),
                    Fallback::Sentinel(value) => format_constant(value, &plan.destination, None),
                };
                self.w.line(format!(
                    "{} = {} is {{ }} {} ? {} : {};",
                    dest, value, v, converted, fallback
                ));
            }
            NullHandling::Skip => {
                let v = self.fresh("v");
                let converted = self.convert(plan, &v);
                self.w.open(format!("if ({} is {{ }} {})", value, v));
                self.w.line(format!("{} = {};", dest, converted));
                self.w.close();
            }
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn instantiate(&mut self, inst: &Instantiation) {
        let ty = inst.ty();
        let dest = self.dest(&inst.path);
        self.w
            .line(format!("{} ??= new {}();", dest, ty.underlying()));
    }

    fn assignment(&mut self, assignment: &Assignment) {
        let dest = self.dest(&assignment.destination);
        let value = self.read(&assignment.source);
        match &assignment.condition {
            Some(condition) => {
                let call = self.call(condition, &[self.source.clone()], None);
                self.w.open(format!("if ({})", call));
                self.assign_converted(&dest, &value, &assignment.conversion);
                self.w.close();
            }
            None => self.assign_converted(&dest, &value, &assignment.conversion),
        }
    }

    fn guard_group(&mut self, group: &GuardGroup) {
        let checks: Vec<String> = group
            .guard
            .checks
            .iter()
            .map(|p| format!("{} is not null", self.read(p)))
            .collect();
        self.w.open(format!("if ({})", checks.join(" && ")));
        for inst in &group.instantiations {
            self.instantiate(inst);
        }
        for assignment in &group.assignments {
            self.assignment(assignment);
        }
        self.w.close();
    }

    /// `{ var x = new T(); method(.., x); dest = x; }` for void mappers.
    fn fill_block(
        &mut self,
        dest: &str,
        ty: &TypeDescriptor,
        method: &BoundMethod,
        inputs: &[String],
    ) -> String {
        let x = self.fresh("x");
        self.w.line(format!("var {} = new {}();", x, ty.underlying()));
        let call = self.call(method, inputs, Some(&x));
        self.w.line(format!("{};", call));
        if !dest.is_empty() {
            self.w.line(format!("{} = {};", dest, x));
        }
        x
    }

    fn map_using(&mut self, entry: &MethodAssignment) {
        let dest = self.dest(&entry.destination);
        let inputs = [self.source.clone()];
        match entry.method.form {
            CallForm::Returning => {
                let call = self.call(&entry.method, &inputs, None);
                self.w.line(format!("{} = {};", dest, call));
            }
            CallForm::FillsDestination => {
                let ty = entry.destination.leaf_type().clone();
                self.w.open_block();
                self.fill_block(&dest, &ty, &entry.method, &inputs);
                self.w.close();
            }
        }
    }

    fn map_from(&mut self, entry: &MapFromAssignment) {
        let dest = self.dest(&entry.destination);
        match &entry.from {
            MapFromSource::StaticMethod { method } => {
                let inputs = [self.source.clone()];
                match method.form {
                    CallForm::Returning => {
                        let call = self.call(method, &inputs, None);
                        self.assign_converted(&dest, &call, &entry.conversion);
                    }
                    CallForm::FillsDestination => {
                        let ty = entry.destination.leaf_type().clone();
                        self.w.open_block();
                        let x = self.fill_block("", &ty, method, &inputs);
                        self.assign_converted(&dest, &x, &entry.conversion);
                        self.w.close();
                    }
                }
            }
            MapFromSource::SourceMethod { name, .. } => {
                let call = format!("{}.{}()", self.source, name);
                self.assign_converted(&dest, &call, &entry.conversion);
            }
            MapFromSource::Path { path } => {
                let read = self.read_propagating(path);
                self.assign_converted(&dest, &read, &entry.conversion);
            }
        }
    }

    fn nested(&mut self, redirect: &NestedRedirect) {
        let dest = self.dest(&redirect.destination);
        let ty = redirect.destination.leaf_type().clone();
        let src = self.read_propagating(&redirect.source);
        match (redirect.method.form, redirect.source_nullable) {
            (CallForm::Returning, true) => {
                let v = self.fresh("v");
                let call = self.call(&redirect.method, &[v.clone()], None);
                self.w.line(format!(
                    "{} = {} is {{ }} {} ? {} : {};",
                    dest,
                    src,
                    v,
                    call,
                    absent(&ty)
                ));
            }
            (CallForm::Returning, false) => {
                let call = self.call(&redirect.method, &[src], None);
                self.w.line(format!("{} = {};", dest, call));
            }
            (CallForm::FillsDestination, true) => {
                let v = self.fresh("v");
                self.w.open(format!("if ({} is {{ }} {})", src, v));
                self.fill_block(&dest, &ty, &redirect.method, &[v]);
                self.w.else_open();
                self.w.line(format!("{} = {};", dest, absent(&ty)));
                self.w.close();
            }
            (CallForm::FillsDestination, false) => {
                self.w.open_block();
                self.fill_block(&dest, &ty, &redirect.method, &[src]);
                self.w.close();
            }
        }
    }

    /// Mapper argument passed to the collection converter.
    fn element_mapper(&mut self, redirect: &CollectionRedirect) -> String {
        let method = &redirect.method;
        match method.form {
            CallForm::Returning if !method.passes_context => method.call_name(),
            CallForm::Returning => {
                let e = self.fresh("e");
                format!("{} => {}", e, self.call(method, &[e.clone()], None))
            }
            CallForm::FillsDestination => {
                let e = self.fresh("e");
                let x = self.fresh("x");
                format!(
                    "{} => {{ var {} = new {}(); {}; return {}; }}",
                    e,
                    x,
                    redirect.destination_element.underlying(),
                    self.call(method, &[e.clone()], Some(&x)),
                    x
                )
            }
        }
    }

    fn collection(&mut self, redirect: &CollectionRedirect) {
        let dest = self.dest(&redirect.destination);
        let src = self.read_propagating(&redirect.source);
        let mapper = self.element_mapper(redirect);
        let build = |operand: &str| {
            format!(
                "{}.{}<{}, {}>({}, {})",
                redirect.converter,
                redirect.shape.builder(),
                redirect.source_element,
                redirect.destination_element,
                operand,
                mapper
            )
        };
        if redirect.source_nullable {
            let v = self.fresh("v");
            let absent = absent(redirect.destination.leaf_type());
            self.w.line(format!(
                "{} = {} is {{ }} {} ? {} : {};",
                dest,
                src,
                v,
                build(&v),
                absent
            ));
        } else {
            self.w.line(format!("{} = {};", dest, build(&src)));
        }
    }
}

/// Value assigned when a redirect source is absent.
fn absent(ty: &TypeDescriptor) -> String {
    format_constant(&ConstantValue::Null, ty, None)
}
