//! mapgen: mapping-plan compiler
//!
//! Turns declarative mapping rules between a source type and a destination
//! type into an ordered, validated assignment plan, then renders the plan as
//! source code or executes it directly:
//! - Type descriptors and the introspection seam (`types`)
//! - Rule annotations, the fluent builder and rule collection (`rules`)
//! - Declaration validation (`declaration`)
//! - User-method binding with overload ranking (`binder`)
//! - Conversion and null-handling selection (`convert`)
//! - Plan construction (`plan`)
//! - Code rendering (`codegen`) and batch compilation (`compiler`)
//! - Plan interpretation and plan caching (`exec`)
//!
//! Nothing here reads source files of the target language; type shapes come
//! from a [`TypeIntrospector`], usually a [`TypeRegistry`] loaded from YAML.

pub mod binder;
pub mod codegen;
pub mod compiler;
pub mod config;
pub mod convert;
pub mod declaration;
pub mod diagnostics;
pub mod error;
pub mod exec;
pub mod plan;
pub mod rules;
pub mod types;

// Re-export commonly used types
pub use binder::{BindingKind, BoundMethod, MethodScope};
pub use codegen::{CodeSynthesizer, RenderedUnit};
pub use compiler::{CancellationFlag, CompilationOutput, MappingCompiler};
pub use config::schema::{load_mappers, load_schema};
pub use config::{CompilerConfig, MapperFile, SchemaFile};
pub use convert::{Conversion, ConversionPlan, ConversionPlanner, NullHandling};
pub use declaration::{DeclarationInput, DeclarationShape, MapperUnit, MappingDeclaration};
pub use diagnostics::{Diagnostic, DiagnosticCode, DiagnosticLocation, Severity};
pub use error::{ConfigError, PlanError};
pub use exec::{ExecError, MethodTable, PlanCache, PlanInterpreter, PlanKey};
pub use plan::{MappingPlan, MemberPath, PlanBuilder};
pub use rules::{Annotation, ConstantValue, MappingBuilder, PairBuilder, RuleCollector, RuleSet};
pub use types::{
    MethodDescriptor, PrimitiveKind, TypeDescriptor, TypeIntrospector, TypeKind, TypeRegistry,
    TypeShape,
};
