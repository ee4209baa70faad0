//! Member Matcher & Plan Builder
//!
//! Merges the declared rules of one mapping declaration with name-based
//! auto-matching into a conflict-free, ordered [`MappingPlan`].
//!
//! Per declaration:
//! 1. bind callbacks and the global condition
//! 2. resolve conflicts: one rule per destination member
//! 3. plan derived rules (constants, expressions, redirects)
//! 4. resolve explicit pairs, then auto-match what is left
//! 5. split plain assignments into unguarded ones and null-guard groups
//! 6. schedule intermediate destination instantiation, shallow to deep

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace, warn};

use crate::binder::{BindRequest, BindingKind, BoundMethod, MethodScope, ReturnRule};
use crate::config::CompilerConfig;
use crate::convert::{ConversionPlan, ConversionPlanner, NullPolicy};
use crate::declaration::{MapperUnit, MappingDeclaration};
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::error::PlanError;
use crate::rules::{
    ConstantValue, NullBehavior, OrderKey, Rule, RuleCollector, RuleKind, RuleSet,
};
use crate::types::{
    element_type, find_methods, flatten_members, is_assignable, MethodDescriptor,
    PrimitiveKind, TypeDescriptor, TypeIntrospector,
};

use super::paths::{self, lookup_member, PathRole};
use super::{
    Assignment, AssignmentOrigin, CollectionRedirect, CollectionShape, ConstantAssignment,
    ExpressionAssignment, GuardGroup, Instantiation, MapFromAssignment, MapFromSource,
    MappingPlan, MemberPath, MethodAssignment, NestedRedirect, NullGuard,
};

/// Builds plans for the declarations of mapper units.
pub struct PlanBuilder<'a> {
    intro: &'a dyn TypeIntrospector,
    config: &'a CompilerConfig,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(intro: &'a dyn TypeIntrospector, config: &'a CompilerConfig) -> Self {
        Self { intro, config }
    }

    /// Validate and plan the declaration at `index` of `unit`.
    pub fn build(&self, unit: &MapperUnit, index: usize) -> Result<MappingPlan, PlanError> {
        let input = unit.declarations.get(index).ok_or_else(|| {
            PlanError::InvalidDeclarationShape {
                method: format!("#{}", index),
                reason: format!("unit `{}` has no declaration at this position", unit.name),
            }
        })?;
        let declaration = MappingDeclaration::from_input(&unit.name, index, input)?;
        let rules = RuleCollector::collect(&unit.annotations, &input.annotations);
        self.build_declaration(unit, declaration, &rules)
    }

    /// Plan an already validated declaration with its collected rules.
    pub fn build_declaration(
        &self,
        unit: &MapperUnit,
        declaration: MappingDeclaration,
        rules: &RuleSet,
    ) -> Result<MappingPlan, PlanError> {
        let methods = unit.scope();
        let converter = rules
            .converter()
            .cloned()
            .unwrap_or_else(|| self.config.converter_ref());
        let collection_converter = rules
            .collection_converter()
            .unwrap_or(&self.config.collection_converter)
            .to_string();

        let mut planning = Planning {
            intro: self.intro,
            config: self.config,
            scope: MethodScope::new(self.intro, &methods, declaration.context_types()),
            planner: ConversionPlanner::new(self.intro, converter),
            collection_converter,
            rules,
            source: declaration.source.ty.clone(),
            destination: declaration.destination.clone(),
            top_level: Vec::new(),
            plan: MappingPlan::new(declaration),
        };
        planning.run()?;

        let plan = planning.plan;
        debug!(
            declaration = %plan.declaration,
            assignments = plan.all_assignments().count(),
            guarded = plan.guarded.len(),
            warnings = plan.warnings.len(),
            "planned mapping declaration"
        );
        Ok(plan)
    }
}

struct Planning<'a> {
    intro: &'a dyn TypeIntrospector,
    config: &'a CompilerConfig,
    scope: MethodScope<'a>,
    planner: ConversionPlanner<'a>,
    collection_converter: String,
    rules: &'a RuleSet,
    source: TypeDescriptor,
    destination: TypeDescriptor,
    /// Top-level instantiation paths, in scheduling order.
    top_level: Vec<MemberPath>,
    plan: MappingPlan,
}

impl<'a> Planning<'a> {
    fn run(&mut self) -> Result<(), PlanError> {
        self.bind_callbacks()?;

        let (derived, pairs) = self.resolve_conflicts();
        for rule in derived {
            self.plan_derived(rule)?;
        }

        let mut assignments = Vec::new();
        let mut claimed: HashSet<String> = HashSet::new();
        for rule in &pairs {
            if let Some(assignment) = self.plan_pair(rule)? {
                claimed.insert(assignment.destination.dotted());
                assignments.push(assignment);
            }
        }
        if self.rules.auto_match.unwrap_or(self.config.auto_match) {
            assignments.extend(self.auto_match(&claimed)?);
        }

        assignments.sort_by_key(|a| a.key);
        self.group(assignments);
        Ok(())
    }

    // =========================================================================
    // Callbacks
    // =========================================================================

    fn bind_callbacks(&mut self) -> Result<(), PlanError> {
        let source = self.source.underlying();
        let destination = self.destination.underlying();

        if let Some(method) = self.rules.global_condition() {
            self.plan.condition = Some(self.scope.bind(&BindRequest::new(
                BindingKind::GlobalCondition,
                method,
                vec![source.clone()],
                ReturnRule::Bool,
            ))?);
        }
        if let Some(method) = self.rules.before_map() {
            self.plan.before_map = Some(self.scope.bind(&BindRequest::new(
                BindingKind::BeforeMap,
                method,
                vec![source.clone(), destination.clone()],
                ReturnRule::Ignored,
            ))?);
        }
        if let Some(method) = self.rules.after_map() {
            self.plan.after_map = Some(self.scope.bind(&BindRequest::new(
                BindingKind::AfterMap,
                method,
                vec![source, destination],
                ReturnRule::Ignored,
            ))?);
        }
        Ok(())
    }

    fn property_condition(
        &self,
        target: &str,
        declared: Option<&str>,
    ) -> Result<Option<BoundMethod>, PlanError> {
        let Some(method) = declared.or_else(|| self.rules.condition_for(target)) else {
            return Ok(None);
        };
        self.scope
            .bind(&BindRequest::new(
                BindingKind::PropertyCondition,
                method,
                vec![self.source.underlying()],
                ReturnRule::Bool,
            ))
            .map(Some)
    }

    // =========================================================================
    // Conflicts
    // =========================================================================

    fn conflict(&mut self, message: String) {
        warn!(declaration = %self.plan.declaration, "{}", message);
        self.plan
            .warnings
            .push(Diagnostic::warning(DiagnosticCode::ConflictingRules, message));
    }

    /// Keep one rule per destination member. Derived rules keep the lowest
    /// ordering key and always beat explicit pairs; Ignore beats explicit
    /// pairs too.
    fn resolve_conflicts(&mut self) -> (Vec<&'a Rule>, Vec<&'a Rule>) {
        let rules: &'a RuleSet = self.rules;
        let sorted = rules.sorted();
        let mut owner: HashMap<&str, &'static str> = HashMap::new();
        let mut derived = Vec::new();
        let mut pairs = Vec::new();
        let mut messages = Vec::new();

        for rule in sorted.iter().filter(|r| r.kind.is_derived()) {
            let Some(target) = rule.kind.target() else {
                continue;
            };
            if let Some(kept) = owner.get(target) {
                messages.push(format!(
                    "`{}` rule for `{}` dropped: member already mapped by a `{}` rule",
                    rule.kind.label(),
                    target,
                    kept
                ));
                continue;
            }
            owner.insert(target, rule.kind.label());
            derived.push(*rule);
        }

        let ignored: HashSet<&str> = sorted
            .iter()
            .filter_map(|r| match &r.kind {
                RuleKind::Ignore { target } => Some(target.as_str()),
                _ => None,
            })
            .collect();

        for rule in sorted
            .iter()
            .filter(|r| matches!(r.kind, RuleKind::ExplicitPair { .. }))
        {
            let Some(target) = rule.kind.target() else {
                continue;
            };
            if ignored.contains(target) {
                messages.push(format!(
                    "`map` rule for `{}` dropped: member is ignored",
                    target
                ));
                continue;
            }
            if let Some(kept) = owner.get(target) {
                messages.push(format!(
                    "`map` rule for `{}` dropped: member already mapped by a `{}` rule",
                    target, kept
                ));
                continue;
            }
            owner.insert(target, rule.kind.label());
            pairs.push(*rule);
        }

        for message in messages {
            self.conflict(message);
        }
        (derived, pairs)
    }

    // =========================================================================
    // Plain copies
    // =========================================================================

    fn plan_pair(&self, rule: &Rule) -> Result<Option<Assignment>, PlanError> {
        let RuleKind::ExplicitPair {
            target,
            source,
            converter,
            null_behavior,
            null_if,
            condition,
        } = &rule.kind
        else {
            return Ok(None);
        };

        let destination = paths::resolve(self.intro, &self.destination, target, PathRole::Destination)?;
        let source_path = paths::resolve(
            self.intro,
            &self.source,
            source.as_deref().unwrap_or(target),
            PathRole::Source,
        )?;
        let policy = NullPolicy::new(*null_behavior, null_if.clone());
        let conversion = match converter {
            Some(method) => self.custom_conversion(method, &source_path, &destination, &policy)?,
            None => self.planner.plan(
                source_path.leaf_type(),
                destination.leaf_type(),
                &policy,
            ),
        };

        Ok(Some(Assignment {
            condition: self.property_condition(target, condition.as_deref())?,
            destination,
            source: source_path,
            conversion,
            key: rule.key,
            origin: AssignmentOrigin::Explicit,
        }))
    }

    /// Bind a user converter. A nullable value-type source first tries a
    /// converter taking the nullable type itself.
    fn custom_conversion(
        &self,
        method: &str,
        source: &MemberPath,
        destination: &MemberPath,
        policy: &NullPolicy,
    ) -> Result<ConversionPlan, PlanError> {
        let source_ty = source.leaf_type();
        let dest_ty = destination.leaf_type();
        let request = |input: TypeDescriptor| {
            BindRequest::new(
                BindingKind::Converter,
                method,
                vec![input],
                ReturnRule::Returns(dest_ty.clone()),
            )
        };
        if source_ty.is_nullable_value() {
            if let Ok(bound) = self.scope.bind(&request(source_ty.clone())) {
                return Ok(self
                    .planner
                    .plan_custom(source_ty, dest_ty, bound, true, policy));
            }
        }
        let bound = self.scope.bind(&request(source_ty.underlying()))?;
        Ok(self
            .planner
            .plan_custom(source_ty, dest_ty, bound, false, policy))
    }

    fn auto_match(&self, claimed: &HashSet<String>) -> Result<Vec<Assignment>, PlanError> {
        let dest_members = flatten_members(self.intro, &self.destination);
        let source_members = flatten_members(self.intro, &self.source);

        // A dotted rule target claims its first segment: the whole node is
        // built member by member, never copied.
        let suppressed: HashSet<&str> = self
            .rules
            .rules
            .iter()
            .filter_map(|r| r.kind.target())
            .filter_map(|t| t.split_once('.').map(|(head, _)| head))
            .collect();

        let base = self.rules.rules.len();
        let mut assignments = Vec::new();
        for (i, member) in dest_members.iter().enumerate() {
            let name = member.name.as_str();
            if !member.writable
                || self.rules.is_ignored(name)
                || claimed.contains(name)
                || suppressed.contains(name)
            {
                trace!(member = name, "auto-match skipped");
                continue;
            }
            let Some(source) = lookup_member(&source_members, name, self.config.case_insensitive_match)
                .filter(|m| m.readable)
            else {
                trace!(member = name, "auto-match found no source member");
                continue;
            };
            trace!(member = name, source = %source.name, "auto-matched");

            let conversion = self
                .planner
                .plan(&source.ty, &member.ty, &NullPolicy::default());
            assignments.push(Assignment {
                destination: paths::single(member),
                source: paths::single(&source),
                conversion,
                condition: self.property_condition(name, None)?,
                key: OrderKey::new(0, base + i),
                origin: AssignmentOrigin::AutoMatch,
            });
        }
        Ok(assignments)
    }

    // =========================================================================
    // Derived rules
    // =========================================================================

    fn destination_path(&mut self, target: &str) -> Result<MemberPath, PlanError> {
        let path = paths::resolve(self.intro, &self.destination, target, PathRole::Destination)?;
        self.schedule_top_level(&path);
        Ok(path)
    }

    fn plan_derived(&mut self, rule: &Rule) -> Result<(), PlanError> {
        let key = rule.key;
        match &rule.kind {
            RuleKind::Constant {
                target,
                value,
                value_type,
            } => {
                let destination = self.destination_path(target)?;
                let value_type = match value_type {
                    Some(expr) => TypeDescriptor::parse(expr, &|n| self.intro.kind_of(n))?,
                    None => destination.leaf_type().clone(),
                };
                check_constant(target, value, &value_type)?;
                let enum_type = self
                    .intro
                    .is_enum(&value_type.name)
                    .then(|| value_type.name.clone());
                self.plan.constants.push(ConstantAssignment {
                    destination,
                    value: value.clone(),
                    value_type,
                    enum_type,
                    key,
                });
            }
            RuleKind::Expression { target, expression } => {
                let destination = self.destination_path(target)?;
                self.plan.expressions.push(ExpressionAssignment {
                    destination,
                    expression: expression.clone(),
                    key,
                });
            }
            RuleKind::MapUsing { target, method } => {
                let destination = self.destination_path(target)?;
                let method = self.scope.bind(&BindRequest::new(
                    BindingKind::MapUsing,
                    method,
                    vec![self.source.underlying()],
                    ReturnRule::Produces(destination.leaf_type().clone()),
                ))?;
                self.plan.map_using.push(MethodAssignment {
                    destination,
                    method,
                    key,
                });
            }
            RuleKind::MapFrom {
                target,
                from,
                null_if,
            } => {
                let destination = self.destination_path(target)?;
                let entry = self.plan_map_from(destination, from, null_if.clone(), key)?;
                self.plan.map_from.push(entry);
            }
            RuleKind::Nested {
                target,
                source,
                mapper,
            } => {
                let destination = self.destination_path(target)?;
                let source = self.redirect_source(source.as_deref().unwrap_or(target))?;
                let method = self.scope.bind(&BindRequest::new(
                    BindingKind::NestedMapper,
                    mapper,
                    vec![source.leaf_type().underlying()],
                    ReturnRule::Produces(destination.leaf_type().clone()),
                ))?;
                let source_nullable = self.redirect_nullable(&source);
                self.plan.nested.push(NestedRedirect {
                    destination,
                    source,
                    method,
                    source_nullable,
                    key,
                });
            }
            RuleKind::Collection {
                target,
                source,
                mapper,
            } => {
                let destination = self.destination_path(target)?;
                let source = self.redirect_source(source.as_deref().unwrap_or(target))?;
                let entry = self.plan_collection(destination, source, mapper, key)?;
                self.plan.collections.push(entry);
            }
            other => {
                debug!(rule = other.label(), "not a derived rule, skipped");
            }
        }
        Ok(())
    }

    fn redirect_source(&self, dotted: &str) -> Result<MemberPath, PlanError> {
        paths::resolve(self.intro, &self.source, dotted, PathRole::Source)
    }

    /// Redirect sources are null-checked when annotated nullable, when read
    /// through a nullable segment, or (by config) when they are references.
    fn redirect_nullable(&self, source: &MemberPath) -> bool {
        let leaf = source.leaf_type();
        leaf.nullable
            || source.has_nullable_intermediate()
            || (self.config.null_check_references && !leaf.is_value_type())
    }

    fn plan_collection(
        &self,
        destination: MemberPath,
        source: MemberPath,
        mapper: &str,
        key: OrderKey,
    ) -> Result<CollectionRedirect, PlanError> {
        let not_a_collection = |path: &MemberPath| PlanError::NotACollection {
            path: path.dotted(),
            ty: path.leaf_type().to_string(),
        };
        let dest_ty = destination.leaf_type();
        let destination_element =
            element_type(self.intro, dest_ty).ok_or_else(|| not_a_collection(&destination))?;
        let source_element = element_type(self.intro, source.leaf_type())
            .ok_or_else(|| not_a_collection(&source))?;

        let shape = if dest_ty.is_array() {
            CollectionShape::Array
        } else if is_assignable(
            self.intro,
            &TypeDescriptor::list_of(destination_element.clone()),
            dest_ty,
        ) {
            CollectionShape::List
        } else {
            return Err(not_a_collection(&destination));
        };

        let method = self.scope.bind(&BindRequest::new(
            BindingKind::CollectionMapper,
            mapper,
            vec![source_element.underlying()],
            ReturnRule::Produces(destination_element.clone()),
        ))?;

        Ok(CollectionRedirect {
            source_nullable: self.redirect_nullable(&source),
            destination,
            source,
            source_element,
            destination_element,
            method,
            shape,
            converter: self.collection_converter.clone(),
            key,
        })
    }

    /// Resolve a `map_from` value source.
    ///
    /// A plain name tries, in order: a static method in scope, a zero-argument
    /// method on the source, a source property. A dotted name is a property
    /// path unless its head is not a source member and a qualified static
    /// method of that name exists.
    fn plan_map_from(
        &self,
        destination: MemberPath,
        from: &str,
        null_if: Option<ConstantValue>,
        key: OrderKey,
    ) -> Result<MapFromAssignment, PlanError> {
        let dest_ty = destination.leaf_type().clone();
        let policy = NullPolicy::new(NullBehavior::Default, null_if);

        let head = from.split('.').next().unwrap_or(from);
        let head_is_member = flatten_members(self.intro, &self.source)
            .iter()
            .any(|m| m.name == head);
        let try_static = if from.contains('.') {
            !head_is_member
        } else {
            true
        };

        if try_static && self.scope.has_method(from) {
            let method = self.scope.bind(&BindRequest::new(
                BindingKind::MapFrom,
                from,
                vec![self.source.underlying()],
                ReturnRule::Produces(dest_ty.clone()),
            ))?;
            let produced = method.returns.clone().unwrap_or_else(|| dest_ty.clone());
            let conversion = self.planner.plan_assignable(&produced, &dest_ty, &policy);
            return Ok(MapFromAssignment {
                destination,
                from: MapFromSource::StaticMethod { method },
                conversion,
                key,
            });
        }

        if !from.contains('.') {
            if let Some(returns) = self.source_method(from) {
                let conversion = self.planner.plan(&returns, &dest_ty, &policy);
                return Ok(MapFromAssignment {
                    destination,
                    from: MapFromSource::SourceMethod {
                        name: from.to_string(),
                        returns,
                    },
                    conversion,
                    key,
                });
            }
        }

        let path = self.redirect_source(from)?;
        let mut read = path.leaf_type().clone();
        read.nullable |= path.has_nullable_intermediate();
        let conversion = self.planner.plan(&read, &dest_ty, &policy);
        Ok(MapFromAssignment {
            destination,
            from: MapFromSource::Path { path },
            conversion,
            key,
        })
    }

    /// Return type of a zero-argument instance method on the source.
    fn source_method(&self, name: &str) -> Option<TypeDescriptor> {
        find_methods(self.intro, &self.source.name, name)
            .into_iter()
            .find(|m: &MethodDescriptor| !m.is_static && m.params.is_empty())
            .and_then(|m| m.returns)
    }

    // =========================================================================
    // Grouping and instantiation
    // =========================================================================

    fn schedule_top_level(&mut self, destination: &MemberPath) {
        for prefix in destination.intermediates() {
            if !self.top_level.contains(&prefix) {
                self.top_level.push(prefix);
            }
        }
    }

    fn group(&mut self, assignments: Vec<Assignment>) {
        let mut groups: Vec<GuardGroup> = Vec::new();
        for assignment in assignments {
            let checks = assignment.source.nullable_intermediates();
            if checks.is_empty() {
                self.schedule_top_level(&assignment.destination);
                self.plan.assignments.push(assignment);
                continue;
            }
            let guard = NullGuard { checks };
            match groups.iter_mut().find(|g| g.guard == guard) {
                Some(group) => group.assignments.push(assignment),
                None => groups.push(GuardGroup {
                    guard,
                    instantiations: Vec::new(),
                    assignments: vec![assignment],
                }),
            }
        }

        // Guard-local nodes: only those not already created up front.
        for group in &mut groups {
            let mut local: Vec<MemberPath> = Vec::new();
            for assignment in &group.assignments {
                for prefix in assignment.destination.intermediates() {
                    if !self.top_level.contains(&prefix) && !local.contains(&prefix) {
                        local.push(prefix);
                    }
                }
            }
            group.instantiations = shallow_first(local);
        }

        self.plan.instantiations = shallow_first(std::mem::take(&mut self.top_level));
        self.plan.guarded = groups;
    }
}

fn shallow_first(mut paths: Vec<MemberPath>) -> Vec<Instantiation> {
    paths.sort_by_key(MemberPath::depth);
    paths.into_iter().map(|path| Instantiation { path }).collect()
}

/// Floating constants need a floating (or `object`) destination, and
/// `decimal` has no NaN or infinity.
fn check_constant(target: &str, value: &ConstantValue, ty: &TypeDescriptor) -> Result<(), PlanError> {
    let ConstantValue::Float(x) = value else {
        return Ok(());
    };
    let fits = match ty.primitive_kind() {
        Some(PrimitiveKind::Decimal) => x.is_finite(),
        Some(kind) => kind.is_floating() || kind == PrimitiveKind::Object,
        None => false,
    };
    if fits {
        Ok(())
    } else {
        Err(PlanError::InvalidConstant {
            target: target.to_string(),
            value: value.to_string(),
            ty: ty.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{Conversion, Fallback, NullHandling};
    use crate::declaration::DeclarationInput;
    use crate::rules::{MappingBuilder, PairBuilder};
    use crate::types::{TypeRegistry, TypeShape};

    fn int() -> TypeDescriptor {
        TypeDescriptor::primitive(PrimitiveKind::Int32)
    }

    fn string() -> TypeDescriptor {
        TypeDescriptor::primitive(PrimitiveKind::String)
    }

    fn registry() -> TypeRegistry {
        let mut r = TypeRegistry::with_builtins();
        r.register(
            TypeShape::class("Demo.Person")
                .property("Name", string())
                .property("Age", int().nullable())
                .property("Score", string())
                .property("Address", TypeDescriptor::reference("Demo.Address").nullable())
                .property("Home", TypeDescriptor::reference("Demo.Address"))
                .property(
                    "Lines",
                    TypeDescriptor::list_of(TypeDescriptor::reference("Demo.Line")),
                )
                .method(
                    MethodDescriptor::new("Describe")
                        .instance()
                        .returning(string()),
                ),
        );
        r.register(TypeShape::class("Demo.Address").property("City", string()));
        r.register(TypeShape::class("Demo.Line").property("Sku", string()));
        r.register(
            TypeShape::class("Demo.PersonDto")
                .property("Name", string())
                .property("Age", int())
                .property("Score", int())
                .property("City", string())
                .property("Location", TypeDescriptor::reference("Demo.LocationDto"))
                .property("Home", TypeDescriptor::reference("Demo.AddressDto"))
                .property(
                    "Lines",
                    TypeDescriptor::array_of(TypeDescriptor::reference("Demo.LineDto")),
                )
                .property("Summary", string()),
        );
        r.register(TypeShape::class("Demo.LocationDto").property("City", string()));
        r.register(TypeShape::class("Demo.AddressDto").property("City", string()));
        r.register(TypeShape::class("Demo.LineDto").property("Sku", string()));
        r
    }

    fn person() -> TypeDescriptor {
        TypeDescriptor::reference("Demo.Person")
    }

    fn dto() -> TypeDescriptor {
        TypeDescriptor::reference("Demo.PersonDto")
    }

    fn unit(rules: MappingBuilder) -> MapperUnit {
        MapperUnit::new("Demo.PersonMapper")
            .helper(
                MethodDescriptor::new("MapAddress")
                    .param("a", TypeDescriptor::reference("Demo.Address"))
                    .returning(TypeDescriptor::reference("Demo.AddressDto")),
            )
            .helper(
                MethodDescriptor::new("MapLine")
                    .param("l", TypeDescriptor::reference("Demo.Line"))
                    .returning(TypeDescriptor::reference("Demo.LineDto")),
            )
            .helper(
                MethodDescriptor::new("BuildSummary")
                    .param("p", person())
                    .returning(string()),
            )
            .declare(DeclarationInput::new(
                MethodDescriptor::new("Map")
                    .param("source", person())
                    .returning(dto()),
                rules.build(),
            ))
    }

    fn build(rules: MappingBuilder) -> Result<MappingPlan, PlanError> {
        let r = registry();
        let config = CompilerConfig::default();
        PlanBuilder::new(&r, &config).build(&unit(rules), 0)
    }

    #[test]
    fn float_constants_need_a_floating_destination() {
        let err = build(MappingBuilder::new().auto_match(false).constant("Age", 1.5)).unwrap_err();
        assert_eq!(
            err,
            PlanError::InvalidConstant {
                target: "Age".into(),
                value: "1.5".into(),
                ty: "int".into(),
            }
        );
        assert_eq!(err.code(), DiagnosticCode::InvalidConstant);

        let err = build(
            MappingBuilder::new()
                .auto_match(false)
                .typed_constant("Name", f64::NAN, "decimal"),
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::InvalidConstant { ref ty, .. } if ty == "decimal"));

        let plan = build(
            MappingBuilder::new()
                .auto_match(false)
                .typed_constant("Name", 2.5, "decimal"),
        )
        .unwrap();
        assert_eq!(plan.constants[0].value, ConstantValue::Float(2.5));
    }

    #[test]
    fn auto_matches_same_named_members() {
        let plan = build(MappingBuilder::new().ignore("Lines").ignore("Home")).unwrap();
        let names: Vec<String> = plan.all_assignments().map(|a| a.destination.dotted()).collect();
        assert_eq!(names, vec!["Name", "Age", "Score"]);

        let age = plan.assignment_for("Age").unwrap();
        assert_eq!(age.conversion.conversion, Conversion::None);
        assert_eq!(
            age.conversion.null_handling,
            NullHandling::Substitute(Fallback::Default)
        );
        let score = plan.assignment_for("Score").unwrap();
        assert!(matches!(
            score.conversion.conversion,
            Conversion::Specialized { ref method, .. } if method == "ConvertToInt32"
        ));
    }

    #[test]
    fn auto_match_can_be_disabled() {
        let plan = build(
            MappingBuilder::new()
                .auto_match(false)
                .map("Name", "Name")
                .ignore("Lines"),
        )
        .unwrap();
        assert_eq!(plan.all_assignments().count(), 1);
    }

    #[test]
    fn explicit_order_wins_over_definition_order() {
        let plan = build(
            MappingBuilder::new()
                .auto_match(false)
                .map("Name", "Name")
                .order(1)
                .map("Summary", "Name")
                .order(0),
        )
        .unwrap();
        let names: Vec<String> = plan.assignments.iter().map(|a| a.destination.dotted()).collect();
        assert_eq!(names, vec!["Summary", "Name"]);
    }

    #[test]
    fn nested_destination_path_instantiates_and_suppresses_auto_match() {
        let plan = build(
            MappingBuilder::new()
                .map("Location.City", "Home.City")
                .ignore("Lines")
                .ignore("Home"),
        )
        .unwrap();
        assert!(plan.assignment_for("Location").is_none());
        assert!(plan.assignment_for("Location.City").is_some());
        let created: Vec<String> = plan.instantiations.iter().map(|i| i.path.dotted()).collect();
        assert_eq!(created, vec!["Location"]);
        assert!(plan.guarded.is_empty());
    }

    #[test]
    fn nullable_source_segments_are_grouped_under_one_guard() {
        let plan = build(
            MappingBuilder::new()
                .auto_match(false)
                .map("City", "Address.City")
                .map("Location.City", "Address.City"),
        )
        .unwrap();
        assert!(plan.assignments.is_empty());
        assert_eq!(plan.guarded.len(), 1);
        let group = &plan.guarded[0];
        assert_eq!(group.guard.key(), vec!["Address"]);
        assert_eq!(group.assignments.len(), 2);
        let local: Vec<String> = group.instantiations.iter().map(|i| i.path.dotted()).collect();
        assert_eq!(local, vec!["Location"]);
        assert!(plan.instantiations.is_empty());
    }

    #[test]
    fn derived_rules_exclude_auto_match_and_conflicts_warn() {
        let plan = build(
            MappingBuilder::new()
                .constant("Name", "fixed")
                .map("Name", "Score")
                .map_using("Summary", "BuildSummary")
                .expression("Summary", "\"x\"")
                .map_nested("Home", "MapAddress")
                .map_collection("Lines", "MapLine"),
        )
        .unwrap();
        assert!(plan.assignment_for("Name").is_none());
        assert_eq!(plan.constants.len(), 1);
        assert_eq!(plan.map_using.len(), 1);
        assert!(plan.expressions.is_empty());
        assert_eq!(plan.warnings.len(), 2);
        assert!(plan
            .warnings
            .iter()
            .all(|w| w.code == DiagnosticCode::ConflictingRules));

        let nested = &plan.nested[0];
        assert!(nested.source_nullable);
        let lines = &plan.collections[0];
        assert_eq!(lines.shape, CollectionShape::Array);
        assert_eq!(lines.destination_element, TypeDescriptor::reference("Demo.LineDto"));
    }

    #[test]
    fn ignore_beats_explicit_pair() {
        let plan = build(
            MappingBuilder::new()
                .map("Name", "Score")
                .ignore("Name")
                .ignore("Lines")
                .ignore("Home"),
        )
        .unwrap();
        assert!(plan.assignment_for("Name").is_none());
        assert_eq!(plan.warnings.len(), 1);
    }

    #[test]
    fn map_from_prefers_method_then_path() {
        let plan = build(
            MappingBuilder::new()
                .auto_match(false)
                .map_from("Summary", "Describe")
                .map_from("City", "Address.City")
                .null_if("n/a"),
        )
        .unwrap();
        assert!(matches!(
            plan.map_from[0].from,
            MapFromSource::SourceMethod { ref name, .. } if name == "Describe"
        ));
        let city = &plan.map_from[1];
        assert!(matches!(city.from, MapFromSource::Path { .. }));
        assert_eq!(
            city.conversion.null_handling,
            NullHandling::Substitute(Fallback::Sentinel(ConstantValue::Text("n/a".into())))
        );
    }

    #[test]
    fn pair_converter_and_skip_policy() {
        let r = registry();
        let config = CompilerConfig::default();
        let unit = MapperUnit::new("Demo.PersonMapper")
            .helper(
                MethodDescriptor::new("Parse")
                    .param("s", string())
                    .returning(int()),
            )
            .declare(DeclarationInput::new(
                MethodDescriptor::new("Map")
                    .param("source", person())
                    .returning(dto()),
                MappingBuilder::new()
                    .auto_match(false)
                    .map_with(PairBuilder::new("Score").converter("Parse"))
                    .map_with(PairBuilder::new("Age").skip_null())
                    .build(),
            ));
        let plan = PlanBuilder::new(&r, &config).build(&unit, 0).unwrap();
        let score = plan.assignment_for("Score").unwrap();
        assert!(matches!(score.conversion.conversion, Conversion::Custom(_)));
        let age = plan.assignment_for("Age").unwrap();
        assert_eq!(age.conversion.null_handling, NullHandling::Skip);
    }

    #[test]
    fn binding_failures_fail_the_declaration() {
        let err = build(MappingBuilder::new().map_nested("Home", "MapAdress")).unwrap_err();
        match err {
            PlanError::MethodNotFound { suggestion, .. } => {
                assert_eq!(suggestion.as_deref(), Some("MapAddress"))
            }
            other => panic!("unexpected {:?}", other),
        }

        let err = build(MappingBuilder::new().map("Nope", "Name")).unwrap_err();
        assert!(matches!(err, PlanError::UnknownMember { .. }));
    }
}
