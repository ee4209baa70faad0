//! Batch compilation
//!
//! Plans every declaration of every unit independently (in parallel when
//! configured), collects per-declaration diagnostics, and groups the
//! successful plans into one rendered unit per containing definition.
//!
//! Grouping is keyed by unit name and declaration position, never by
//! completion order, so the output is identical across runs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::codegen::{CodeSynthesizer, RenderedUnit};
use crate::config::CompilerConfig;
use crate::declaration::MapperUnit;
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticLocation, Severity};
use crate::plan::{MappingPlan, PlanBuilder};
use crate::types::TypeIntrospector;

/// Cooperative cancellation shared between the caller and a running batch.
/// Checked before each declaration is planned.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Result of compiling a batch of units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompilationOutput {
    /// Rendered units, ordered by unit name.
    pub units: Vec<RenderedUnit>,
    /// Successful plans, grouped like `units`.
    pub plans: Vec<MappingPlan>,
    pub diagnostics: Vec<Diagnostic>,
    /// Declarations skipped because the batch was cancelled.
    pub cancelled: usize,
}

impl CompilationOutput {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    pub fn plan(&self, unit: &str, declaration: &str) -> Option<&MappingPlan> {
        self.plans
            .iter()
            .find(|p| p.declaration.unit == unit && p.declaration.name == declaration)
    }

    pub fn unit(&self, name: &str) -> Option<&RenderedUnit> {
        self.units.iter().find(|u| u.unit == name)
    }
}

enum Outcome {
    Planned(MappingPlan),
    Failed(Diagnostic),
    Cancelled(Diagnostic),
}

/// Position of a declaration in the input: (unit position, declaration index).
type Job = (usize, usize);

/// Compiles batches of mapper units.
pub struct MappingCompiler<'a> {
    intro: &'a dyn TypeIntrospector,
    config: CompilerConfig,
    cancel: CancellationFlag,
}

impl<'a> MappingCompiler<'a> {
    pub fn new(intro: &'a dyn TypeIntrospector, config: CompilerConfig) -> Self {
        Self {
            intro,
            config,
            cancel: CancellationFlag::new(),
        }
    }

    /// Use an externally owned cancellation flag.
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancel = flag;
        self
    }

    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    fn run_job(&self, units: &[MapperUnit], (u, d): Job) -> Outcome {
        let unit = &units[u];
        let name = unit
            .declarations
            .get(d)
            .map(|decl| decl.method.name.clone())
            .unwrap_or_else(|| format!("#{}", d));
        let location = DiagnosticLocation::new(&unit.name, name);

        if self.cancel.is_cancelled() {
            return Outcome::Cancelled(
                Diagnostic::info(DiagnosticCode::Cancelled, "planning cancelled").at(location),
            );
        }

        match PlanBuilder::new(self.intro, &self.config).build(unit, d) {
            Ok(plan) => Outcome::Planned(plan),
            Err(err) => {
                debug!(location = %location, error = %err, "declaration failed");
                Outcome::Failed(Diagnostic::from(&err).at(location))
            }
        }
    }

    /// Plan every declaration. Results come back in input order.
    fn plan_jobs(&self, units: &[MapperUnit]) -> Vec<(Job, Outcome)> {
        let jobs: Vec<Job> = units
            .iter()
            .enumerate()
            .flat_map(|(u, unit)| (0..unit.declarations.len()).map(move |d| (u, d)))
            .collect();

        if self.config.parallel {
            jobs.par_iter()
                .map(|&job| (job, self.run_job(units, job)))
                .collect()
        } else {
            jobs.iter()
                .map(|&job| (job, self.run_job(units, job)))
                .collect()
        }
    }

    /// Plan and render a batch.
    pub fn compile(&self, units: &[MapperUnit]) -> CompilationOutput {
        let mut output = CompilationOutput::default();
        let mut groups: BTreeMap<&str, Vec<(Job, MappingPlan)>> = BTreeMap::new();

        for (job, outcome) in self.plan_jobs(units) {
            match outcome {
                Outcome::Planned(plan) => {
                    let unit = &units[job.0];
                    for warning in &plan.warnings {
                        output.diagnostics.push(warning.clone().at(DiagnosticLocation::new(
                            &unit.name,
                            &plan.declaration.name,
                        )));
                    }
                    groups.entry(unit.name.as_str()).or_default().push((job, plan));
                }
                Outcome::Failed(diagnostic) => output.diagnostics.push(diagnostic),
                Outcome::Cancelled(diagnostic) => {
                    output.cancelled += 1;
                    output.diagnostics.push(diagnostic);
                }
            }
        }

        let synthesizer = CodeSynthesizer::new(&self.config);
        for (unit, mut plans) in groups {
            plans.sort_by_key(|(job, _)| *job);
            let refs: Vec<&MappingPlan> = plans.iter().map(|(_, p)| p).collect();
            output.units.push(synthesizer.render_unit(unit, &refs));
            output.plans.extend(plans.into_iter().map(|(_, p)| p));
        }

        info!(
            units = output.units.len(),
            planned = output.plans.len(),
            errors = output.count(Severity::Error),
            warnings = output.count(Severity::Warning),
            cancelled = output.cancelled,
            "compiled mapping batch"
        );
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::DeclarationInput;
    use crate::rules::MappingBuilder;
    use crate::types::{MethodDescriptor, PrimitiveKind, TypeDescriptor, TypeRegistry, TypeShape};

    fn registry() -> TypeRegistry {
        let mut r = TypeRegistry::with_builtins();
        let int = TypeDescriptor::primitive(PrimitiveKind::Int32);
        r.register(TypeShape::class("Demo.A").property("Id", int.clone()));
        r.register(TypeShape::class("Demo.B").property("Id", int));
        r
    }

    fn decl(name: &str, rules: MappingBuilder) -> DeclarationInput {
        DeclarationInput::new(
            MethodDescriptor::new(name)
                .param("a", TypeDescriptor::reference("Demo.A"))
                .returning(TypeDescriptor::reference("Demo.B")),
            rules.build(),
        )
    }

    fn units() -> Vec<MapperUnit> {
        vec![
            MapperUnit::new("Demo.ZMapper")
                .declare(decl("Second", MappingBuilder::new()))
                .declare(decl("Broken", MappingBuilder::new().map("Nope", "Id"))),
            MapperUnit::new("Demo.AMapper").declare(decl("First", MappingBuilder::new())),
        ]
    }

    #[test]
    fn failing_declaration_does_not_affect_others() {
        let r = registry();
        let output = MappingCompiler::new(&r, CompilerConfig::default()).compile(&units());
        assert_eq!(output.plans.len(), 2);
        assert_eq!(output.count(Severity::Error), 1);
        let error = &output.diagnostics[0];
        assert_eq!(error.code, DiagnosticCode::UnknownMember);
        assert_eq!(
            error.location,
            Some(DiagnosticLocation::new("Demo.ZMapper", "Broken"))
        );
        let z = output.unit("Demo.ZMapper").unwrap();
        assert_eq!(z.declarations, vec!["Second"]);
        assert!(!z.source.contains("Broken"));
    }

    #[test]
    fn grouping_is_stable_and_sorted() {
        let r = registry();
        let parallel = MappingCompiler::new(&r, CompilerConfig::default()).compile(&units());
        let sequential = MappingCompiler::new(
            &r,
            CompilerConfig {
                parallel: false,
                ..CompilerConfig::default()
            },
        )
        .compile(&units());
        assert_eq!(parallel, sequential);
        let names: Vec<&str> = parallel.units.iter().map(|u| u.unit.as_str()).collect();
        assert_eq!(names, vec!["Demo.AMapper", "Demo.ZMapper"]);
        assert!(parallel.plan("Demo.AMapper", "First").is_some());
    }

    #[test]
    fn cancelled_batch_reports_every_declaration() {
        let r = registry();
        let compiler = MappingCompiler::new(&r, CompilerConfig::default());
        compiler.cancellation().cancel();
        let output = compiler.compile(&units());
        assert_eq!(output.cancelled, 3);
        assert!(output.plans.is_empty());
        assert!(output.units.is_empty());
        assert!(output
            .diagnostics
            .iter()
            .all(|d| d.code == DiagnosticCode::Cancelled && d.severity == Severity::Info));
        assert!(!output.has_errors());
    }
}
