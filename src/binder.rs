//! Delegate/Method Binder
//!
//! Resolves the user methods a rule names (callbacks, conditions, converters,
//! `map_using`/`map_from` methods, collection and nested mappers) against
//! the call shapes each rule kind accepts.
//!
//! # Ranking
//!
//! Every candidate is scored against the accepted shapes by [`rank`]; the
//! highest score wins and ties go to the candidate declared first. Shapes
//! that also take the declaration's extra context parameters always outrank
//! those that do not. For rule kinds that produce a value, a returning shape
//! outranks the void shape that fills a passed destination.
//!
//! | score | shape |
//! |-------|-------|
//! | 4 | `(inputs.., context..) -> T` |
//! | 3 | `(inputs.., destination, context..)` void |
//! | 2 | `(inputs..) -> T` |
//! | 1 | `(inputs.., destination)` void |
//!
//! Callback and condition kinds only use scores 4 and 2.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use crate::diagnostics::suggest;
use crate::error::PlanError;
use crate::types::{
    find_methods, is_assignable, MethodDescriptor, PrimitiveKind, TypeDescriptor,
    TypeIntrospector,
};

/// Which rule references the method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    BeforeMap,
    AfterMap,
    GlobalCondition,
    PropertyCondition,
    Converter,
    MapUsing,
    MapFrom,
    CollectionMapper,
    NestedMapper,
}

impl BindingKind {
    pub fn label(self) -> &'static str {
        match self {
            BindingKind::BeforeMap => "before_map",
            BindingKind::AfterMap => "after_map",
            BindingKind::GlobalCondition => "condition",
            BindingKind::PropertyCondition => "property_condition",
            BindingKind::Converter => "converter",
            BindingKind::MapUsing => "map_using",
            BindingKind::MapFrom => "map_from",
            BindingKind::CollectionMapper => "collection",
            BindingKind::NestedMapper => "nested",
        }
    }

    fn is_mapper(self) -> bool {
        matches!(
            self,
            BindingKind::CollectionMapper | BindingKind::NestedMapper
        )
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the bound method must return.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnRule {
    /// Return value is ignored.
    Ignored,
    /// Must return `bool`.
    Bool,
    /// Must return something assignable to the type, or be void and take a
    /// destination of that type after the inputs.
    Produces(TypeDescriptor),
    /// Must return something assignable to the type.
    Returns(TypeDescriptor),
}

/// One binding request.
#[derive(Debug, Clone)]
pub struct BindRequest {
    pub kind: BindingKind,
    pub method: String,
    /// Leading positional parameter types.
    pub inputs: Vec<TypeDescriptor>,
    pub returns: ReturnRule,
}

impl BindRequest {
    pub fn new(
        kind: BindingKind,
        method: impl Into<String>,
        inputs: Vec<TypeDescriptor>,
        returns: ReturnRule,
    ) -> Self {
        Self {
            kind,
            method: method.into(),
            inputs,
            returns,
        }
    }
}

/// How a bound method is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallForm {
    /// Result of the call is the value.
    Returning,
    /// Void; fills a destination instance passed after the inputs.
    FillsDestination,
}

/// A successfully bound user method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundMethod {
    pub kind: BindingKind,
    /// Declaring type for qualified names, `None` for unit-local methods.
    pub owner: Option<String>,
    pub name: String,
    pub passes_context: bool,
    pub form: CallForm,
    pub returns: Option<TypeDescriptor>,
}

impl BoundMethod {
    /// Name as written at the call site.
    pub fn call_name(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}.{}", owner, self.name),
            None => self.name.clone(),
        }
    }
}

fn param_matches(param: &TypeDescriptor, expected: &TypeDescriptor) -> bool {
    param.same_type(expected)
}

fn params_match(params: &[TypeDescriptor], expected: &[TypeDescriptor]) -> bool {
    params.len() == expected.len()
        && params
            .iter()
            .zip(expected)
            .all(|(p, e)| param_matches(p, e))
}

/// Outcome of scoring one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Score {
    Match { score: u8, form: CallForm, passes_context: bool },
    /// Parameters fit a returning shape but the return type does not.
    WrongReturn(TypeDescriptor),
    NoMatch,
}

/// Score one candidate against the accepted shapes of a request.
pub fn rank(
    intro: &dyn TypeIntrospector,
    candidate: &MethodDescriptor,
    request: &BindRequest,
    context: &[TypeDescriptor],
) -> Score {
    let params: Vec<TypeDescriptor> = candidate.params.iter().map(|p| p.ty.clone()).collect();
    let with_context = |mut base: Vec<TypeDescriptor>| {
        base.extend(context.iter().cloned());
        base
    };

    let mut wrong_return = None;
    let mut try_shape = |expected: Vec<TypeDescriptor>,
                         score: u8,
                         form: CallForm,
                         passes_context: bool|
     -> Option<Score> {
        if !params_match(&params, &expected) {
            return None;
        }
        let ok = match (&request.returns, form) {
            (ReturnRule::Ignored, _) => true,
            (ReturnRule::Bool, _) => candidate
                .returns
                .as_ref()
                .and_then(TypeDescriptor::primitive_kind)
                == Some(PrimitiveKind::Boolean),
            (ReturnRule::Produces(target) | ReturnRule::Returns(target), CallForm::Returning) => {
                match &candidate.returns {
                    Some(r) if is_assignable(intro, r, target) => true,
                    Some(r) => {
                        wrong_return.get_or_insert_with(|| r.clone());
                        false
                    }
                    None => false,
                }
            }
            (ReturnRule::Produces(_) | ReturnRule::Returns(_), CallForm::FillsDestination) => {
                candidate.returns.is_none()
            }
        };
        ok.then_some(Score::Match {
            score,
            form,
            passes_context,
        })
    };

    let inputs = request.inputs.clone();
    let mut shapes: Vec<(Vec<TypeDescriptor>, u8, CallForm, bool)> = Vec::new();
    match &request.returns {
        ReturnRule::Produces(target) => {
            let mut filled = inputs.clone();
            filled.push(target.underlying());
            shapes.push((with_context(inputs.clone()), 4, CallForm::Returning, true));
            shapes.push((with_context(filled.clone()), 3, CallForm::FillsDestination, true));
            shapes.push((inputs, 2, CallForm::Returning, false));
            shapes.push((filled, 1, CallForm::FillsDestination, false));
        }
        _ => {
            shapes.push((with_context(inputs.clone()), 4, CallForm::Returning, true));
            shapes.push((inputs, 2, CallForm::Returning, false));
        }
    }
    if context.is_empty() {
        shapes.retain(|s| !s.3);
    }

    for (expected, score, form, passes_context) in shapes {
        if let Some(found) = try_shape(expected, score, form, passes_context) {
            return found;
        }
    }
    match wrong_return {
        Some(r) => Score::WrongReturn(r),
        None => Score::NoMatch,
    }
}

/// Methods visible to one declaration.
pub struct MethodScope<'a> {
    intro: &'a dyn TypeIntrospector,
    local: &'a [MethodDescriptor],
    context: Vec<TypeDescriptor>,
}

impl<'a> MethodScope<'a> {
    pub fn new(
        intro: &'a dyn TypeIntrospector,
        local: &'a [MethodDescriptor],
        context: Vec<TypeDescriptor>,
    ) -> Self {
        Self {
            intro,
            local,
            context,
        }
    }

    pub fn context(&self) -> &[TypeDescriptor] {
        &self.context
    }

    /// Static candidates for a (possibly qualified) method name, plus the
    /// names in the same lookup space for suggestions.
    fn candidates(&self, name: &str) -> (Option<String>, String, Vec<MethodDescriptor>, Vec<String>) {
        if let Some((owner, method)) = name.rsplit_once('.') {
            let found = find_methods(self.intro, owner, method)
                .into_iter()
                .filter(|m| m.is_static && m.type_params.is_empty())
                .collect();
            let names = self
                .intro
                .shape(owner)
                .map(|s| s.methods.iter().map(|m| m.name.clone()).collect())
                .unwrap_or_default();
            (Some(owner.to_string()), method.to_string(), found, names)
        } else {
            let found = self
                .local
                .iter()
                .filter(|m| m.name == name && m.is_static && m.type_params.is_empty())
                .cloned()
                .collect();
            let names = self.local.iter().map(|m| m.name.clone()).collect();
            (None, name.to_string(), found, names)
        }
    }

    /// Whether any candidate with this name exists at all.
    pub fn has_method(&self, name: &str) -> bool {
        !self.candidates(name).2.is_empty()
    }

    /// Bind a request to the best-ranked candidate.
    pub fn bind(&self, request: &BindRequest) -> Result<BoundMethod, PlanError> {
        let (owner, name, candidates, names) = self.candidates(&request.method);
        let suggestion = || suggest(&name, names.iter().map(String::as_str));

        if candidates.is_empty() {
            return Err(PlanError::MethodNotFound {
                kind: request.kind.label().into(),
                method: request.method.clone(),
                suggestion: suggestion(),
            });
        }

        let mut best: Option<(u8, CallForm, bool, &MethodDescriptor)> = None;
        let mut wrong_return = None;
        for candidate in &candidates {
            match rank(self.intro, candidate, request, &self.context) {
                Score::Match {
                    score,
                    form,
                    passes_context,
                } => {
                    trace!(method = %request.method, score, "binding candidate");
                    if best.is_none_or(|(s, ..)| score > s) {
                        best = Some((score, form, passes_context, candidate));
                    }
                }
                Score::WrongReturn(r) => {
                    wrong_return.get_or_insert(r);
                }
                Score::NoMatch => {}
            }
        }

        if let Some((_, form, passes_context, method)) = best {
            return Ok(BoundMethod {
                kind: request.kind,
                owner,
                name,
                passes_context,
                form,
                returns: method.returns.clone(),
            });
        }

        if let (Some(found), ReturnRule::Produces(expected) | ReturnRule::Returns(expected)) =
            (wrong_return, &request.returns)
        {
            return Err(PlanError::ReturnTypeMismatch {
                kind: request.kind.label().into(),
                method: request.method.clone(),
                found: found.to_string(),
                expected: expected.to_string(),
            });
        }

        let inputs = request
            .inputs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        if request.kind.is_mapper() {
            let to = match &request.returns {
                ReturnRule::Produces(t) | ReturnRule::Returns(t) => t.to_string(),
                _ => "?".into(),
            };
            return Err(PlanError::NoMapperShape {
                kind: request.kind.label().into(),
                method: request.method.clone(),
                from: inputs,
                to,
                suggestion: None,
            });
        }
        Err(PlanError::NoMatchingSignature {
            kind: request.kind.label().into(),
            method: request.method.clone(),
            expected: format!("({})", inputs),
            suggestion: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TypeRegistry, TypeShape};

    fn person() -> TypeDescriptor {
        TypeDescriptor::reference("Demo.Person")
    }

    fn dto() -> TypeDescriptor {
        TypeDescriptor::reference("Demo.PersonDto")
    }

    fn int() -> TypeDescriptor {
        TypeDescriptor::primitive(PrimitiveKind::Int32)
    }

    fn string() -> TypeDescriptor {
        TypeDescriptor::primitive(PrimitiveKind::String)
    }

    fn bool_ty() -> TypeDescriptor {
        TypeDescriptor::primitive(PrimitiveKind::Boolean)
    }

    fn registry() -> TypeRegistry {
        let mut r = TypeRegistry::with_builtins();
        r.register(TypeShape::class("Demo.Person"));
        r.register(TypeShape::class("Demo.PersonDto"));
        r.register(
            TypeShape::class("Demo.Special").extends(TypeDescriptor::reference("Demo.PersonDto")),
        );
        r.register(
            TypeShape::class("Demo.Helpers").method(
                MethodDescriptor::new("Format")
                    .param("value", int())
                    .returning(string()),
            ),
        );
        r
    }

    #[test]
    fn richer_shape_wins() {
        let r = registry();
        let local = vec![
            MethodDescriptor::new("Prepare").param("s", person()),
            MethodDescriptor::new("Prepare")
                .param("s", person())
                .param("tenant", int()),
        ];
        let scope = MethodScope::new(&r, &local, vec![int()]);
        let bound = scope
            .bind(&BindRequest::new(
                BindingKind::BeforeMap,
                "Prepare",
                vec![person()],
                ReturnRule::Ignored,
            ))
            .unwrap();
        assert!(bound.passes_context);

        let scope = MethodScope::new(&r, &local, vec![]);
        let bound = scope
            .bind(&BindRequest::new(
                BindingKind::BeforeMap,
                "Prepare",
                vec![person()],
                ReturnRule::Ignored,
            ))
            .unwrap();
        assert!(!bound.passes_context);
    }

    #[test]
    fn annotated_generic_parameter_binds() {
        let r = registry();
        let annotated = TypeDescriptor::list_of(person().nullable());
        let local = vec![MethodDescriptor::new("Prepare").param("people", annotated)];
        let scope = MethodScope::new(&r, &local, vec![]);
        assert!(scope
            .bind(&BindRequest::new(
                BindingKind::BeforeMap,
                "Prepare",
                vec![TypeDescriptor::list_of(person())],
                ReturnRule::Ignored,
            ))
            .is_ok());

        let local = vec![MethodDescriptor::new("Prepare")
            .param("counts", TypeDescriptor::list_of(int().nullable()))];
        let scope = MethodScope::new(&r, &local, vec![]);
        assert!(scope
            .bind(&BindRequest::new(
                BindingKind::BeforeMap,
                "Prepare",
                vec![TypeDescriptor::list_of(int())],
                ReturnRule::Ignored,
            ))
            .is_err());
    }

    #[test]
    fn condition_requires_bool() {
        let r = registry();
        let local = vec![MethodDescriptor::new("ShouldMap")
            .param("s", person())
            .returning(int())];
        let scope = MethodScope::new(&r, &local, vec![]);
        let err = scope
            .bind(&BindRequest::new(
                BindingKind::GlobalCondition,
                "ShouldMap",
                vec![person()],
                ReturnRule::Bool,
            ))
            .unwrap_err();
        assert!(matches!(err, PlanError::NoMatchingSignature { .. }));

        let local = vec![MethodDescriptor::new("ShouldMap")
            .param("s", person())
            .returning(bool_ty())];
        let scope = MethodScope::new(&r, &local, vec![]);
        assert!(scope
            .bind(&BindRequest::new(
                BindingKind::GlobalCondition,
                "ShouldMap",
                vec![person()],
                ReturnRule::Bool,
            ))
            .is_ok());
    }

    #[test]
    fn return_type_mismatch_is_distinct_from_not_found() {
        let r = registry();
        let local = vec![MethodDescriptor::new("BuildName")
            .param("s", person())
            .returning(int())];
        let scope = MethodScope::new(&r, &local, vec![]);
        let request = BindRequest::new(
            BindingKind::MapUsing,
            "BuildName",
            vec![person()],
            ReturnRule::Produces(string()),
        );
        assert!(matches!(
            scope.bind(&request),
            Err(PlanError::ReturnTypeMismatch { .. })
        ));

        let request = BindRequest::new(
            BindingKind::MapUsing,
            "BuildNam",
            vec![person()],
            ReturnRule::Produces(string()),
        );
        match scope.bind(&request) {
            Err(PlanError::MethodNotFound { suggestion, .. }) => {
                assert_eq!(suggestion.as_deref(), Some("BuildName"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn produces_accepts_subtypes_and_void_fill() {
        let r = registry();
        let local = vec![
            MethodDescriptor::new("MakeDto")
                .param("s", person())
                .returning(TypeDescriptor::reference("Demo.Special")),
            MethodDescriptor::new("FillDto")
                .param("s", person())
                .param("d", dto()),
        ];
        let scope = MethodScope::new(&r, &local, vec![]);
        let made = scope
            .bind(&BindRequest::new(
                BindingKind::NestedMapper,
                "MakeDto",
                vec![person()],
                ReturnRule::Produces(dto()),
            ))
            .unwrap();
        assert_eq!(made.form, CallForm::Returning);

        let filled = scope
            .bind(&BindRequest::new(
                BindingKind::NestedMapper,
                "FillDto",
                vec![person()],
                ReturnRule::Produces(dto().nullable()),
            ))
            .unwrap();
        assert_eq!(filled.form, CallForm::FillsDestination);
    }

    #[test]
    fn mapper_without_shape_reports_no_mapper_shape() {
        let r = registry();
        let local = vec![MethodDescriptor::new("MapLine").param("x", string())];
        let scope = MethodScope::new(&r, &local, vec![]);
        let err = scope
            .bind(&BindRequest::new(
                BindingKind::CollectionMapper,
                "MapLine",
                vec![person()],
                ReturnRule::Produces(dto()),
            ))
            .unwrap_err();
        assert!(matches!(err, PlanError::NoMapperShape { .. }));
    }

    #[test]
    fn qualified_names_bind_against_registry() {
        let r = registry();
        let scope = MethodScope::new(&r, &[], vec![]);
        let bound = scope
            .bind(&BindRequest::new(
                BindingKind::Converter,
                "Demo.Helpers.Format",
                vec![int()],
                ReturnRule::Produces(string()),
            ))
            .unwrap();
        assert_eq!(bound.owner.as_deref(), Some("Demo.Helpers"));
        assert_eq!(bound.call_name(), "Demo.Helpers.Format");
    }

    #[test]
    fn value_nullables_are_distinct_parameter_types() {
        let r = registry();
        let local = vec![MethodDescriptor::new("Conv")
            .param("v", int().nullable())
            .returning(string())];
        let scope = MethodScope::new(&r, &local, vec![]);
        assert!(scope
            .bind(&BindRequest::new(
                BindingKind::Converter,
                "Conv",
                vec![int()],
                ReturnRule::Produces(string()),
            ))
            .is_err());
    }
}
