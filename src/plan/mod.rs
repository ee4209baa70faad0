//! Mapping plans
//!
//! A [`MappingPlan`] is the finished, ordered description of one mapping
//! declaration. It is a plain data structure: the code synthesizer renders
//! it as source text and the plan interpreter executes it directly, neither
//! re-deriving any matching or conversion decision.

pub mod builder;
pub mod paths;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::binder::BoundMethod;
use crate::convert::ConversionPlan;
use crate::declaration::MappingDeclaration;
use crate::diagnostics::Diagnostic;
use crate::rules::{ConstantValue, OrderKey};
use crate::types::TypeDescriptor;

pub use builder::PlanBuilder;

// =============================================================================
// PATHS
// =============================================================================

/// One step of a dotted member path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathSegment {
    pub name: String,
    /// Declared type of the member; used to auto-instantiate a missing node.
    pub ty: TypeDescriptor,
    /// Whether the member may hold null.
    pub nullable: bool,
}

/// A resolved member path relative to the source or destination root.
/// Never empty: the leaf is held apart from its parents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberPath {
    /// Segments above the leaf, root first.
    pub parents: Vec<PathSegment>,
    pub leaf: PathSegment,
}

impl MemberPath {
    pub fn new(parents: Vec<PathSegment>, leaf: PathSegment) -> Self {
        Self { parents, leaf }
    }

    /// Split a segment chain into parents and leaf; `None` when empty.
    pub fn from_segments(mut segments: Vec<PathSegment>) -> Option<Self> {
        let leaf = segments.pop()?;
        Some(Self::new(segments, leaf))
    }

    /// All segments, root first.
    pub fn segments(&self) -> impl Iterator<Item = &PathSegment> {
        self.parents.iter().chain(std::iter::once(&self.leaf))
    }

    /// Dot-separated member names.
    pub fn dotted(&self) -> String {
        self.segments()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn depth(&self) -> usize {
        self.parents.len() + 1
    }

    pub fn is_nested(&self) -> bool {
        !self.parents.is_empty()
    }

    /// Declared type of the leaf member.
    pub fn leaf_type(&self) -> &TypeDescriptor {
        &self.leaf.ty
    }

    /// The first `len` segments, at least one.
    pub fn prefix(&self, len: usize) -> MemberPath {
        let len = len.clamp(1, self.depth());
        if len == self.depth() {
            return self.clone();
        }
        MemberPath::new(self.parents[..len - 1].to_vec(), self.parents[len - 1].clone())
    }

    /// Every proper prefix, shallowest first.
    pub fn intermediates(&self) -> Vec<MemberPath> {
        (1..self.depth()).map(|n| self.prefix(n)).collect()
    }

    /// Proper prefixes ending in a nullable segment, shallowest first.
    pub fn nullable_intermediates(&self) -> Vec<MemberPath> {
        self.intermediates()
            .into_iter()
            .filter(|p| p.leaf.nullable)
            .collect()
    }

    /// Whether any proper prefix may be null.
    pub fn has_nullable_intermediate(&self) -> bool {
        self.parents.iter().any(|s| s.nullable)
    }
}

impl fmt::Display for MemberPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dotted())
    }
}

// =============================================================================
// PLAN ENTRIES
// =============================================================================

/// "Create if absent" step for an intermediate destination node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instantiation {
    pub path: MemberPath,
}

impl Instantiation {
    pub fn ty(&self) -> &TypeDescriptor {
        self.path.leaf_type()
    }
}

/// Conjunction of "source segment is not null" checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NullGuard {
    /// Source paths to check, shallowest first.
    pub checks: Vec<MemberPath>,
}

impl NullGuard {
    pub fn key(&self) -> Vec<String> {
        self.checks.iter().map(MemberPath::dotted).collect()
    }
}

/// Where a plain-copy assignment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentOrigin {
    Explicit,
    AutoMatch,
}

/// A resolved plain-copy assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub destination: MemberPath,
    pub source: MemberPath,
    pub conversion: ConversionPlan,
    /// Property-level condition.
    pub condition: Option<BoundMethod>,
    pub key: OrderKey,
    pub origin: AssignmentOrigin,
}

/// Assignments sharing one null guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardGroup {
    pub guard: NullGuard,
    /// Destination nodes created inside the guard, shallowest first.
    pub instantiations: Vec<Instantiation>,
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantAssignment {
    pub destination: MemberPath,
    pub value: ConstantValue,
    /// Explicit value type, else the destination member's type.
    pub value_type: TypeDescriptor,
    /// Render text constants as members of this enum.
    pub enum_type: Option<String>,
    pub key: OrderKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionAssignment {
    pub destination: MemberPath,
    /// Passed through verbatim.
    pub expression: String,
    pub key: OrderKey,
}

/// A `map_using` call producing a member value from the whole source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodAssignment {
    pub destination: MemberPath,
    pub method: BoundMethod,
    pub key: OrderKey,
}

/// Value source of a `map_from` rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum MapFromSource {
    /// Static method taking the source.
    StaticMethod { method: BoundMethod },
    /// Zero-argument instance method on the source.
    SourceMethod { name: String, returns: TypeDescriptor },
    /// Property path on the source, null-propagating through nullable segments.
    Path { path: MemberPath },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapFromAssignment {
    pub destination: MemberPath,
    pub from: MapFromSource,
    pub conversion: ConversionPlan,
    pub key: OrderKey,
}

/// Nested-object redirect through a mapper method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedRedirect {
    pub destination: MemberPath,
    pub source: MemberPath,
    pub method: BoundMethod,
    /// Source is null-checked before the call.
    pub source_nullable: bool,
    pub key: OrderKey,
}

/// Collection builder entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionShape {
    Array,
    List,
}

impl CollectionShape {
    /// Builder method on the collection converter type.
    pub fn builder(self) -> &'static str {
        match self {
            CollectionShape::Array => "ToArray",
            CollectionShape::List => "ToList",
        }
    }
}

/// Collection redirect: each element goes through a mapper method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRedirect {
    pub destination: MemberPath,
    pub source: MemberPath,
    pub source_element: TypeDescriptor,
    pub destination_element: TypeDescriptor,
    pub method: BoundMethod,
    pub shape: CollectionShape,
    /// Active collection converter type.
    pub converter: String,
    pub source_nullable: bool,
    pub key: OrderKey,
}

// =============================================================================
// PLAN
// =============================================================================

/// The finished plan of one mapping declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingPlan {
    pub declaration: MappingDeclaration,
    pub condition: Option<BoundMethod>,
    pub before_map: Option<BoundMethod>,
    pub after_map: Option<BoundMethod>,
    /// Top-level destination nodes to create if absent, shallowest first.
    pub instantiations: Vec<Instantiation>,
    /// Ungrouped plain assignments.
    pub assignments: Vec<Assignment>,
    pub guarded: Vec<GuardGroup>,
    pub constants: Vec<ConstantAssignment>,
    pub expressions: Vec<ExpressionAssignment>,
    pub map_using: Vec<MethodAssignment>,
    pub map_from: Vec<MapFromAssignment>,
    pub nested: Vec<NestedRedirect>,
    pub collections: Vec<CollectionRedirect>,
    /// Non-fatal findings (rule conflicts).
    pub warnings: Vec<Diagnostic>,
}

impl MappingPlan {
    pub fn new(declaration: MappingDeclaration) -> Self {
        Self {
            declaration,
            condition: None,
            before_map: None,
            after_map: None,
            instantiations: Vec::new(),
            assignments: Vec::new(),
            guarded: Vec::new(),
            constants: Vec::new(),
            expressions: Vec::new(),
            map_using: Vec::new(),
            map_from: Vec::new(),
            nested: Vec::new(),
            collections: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// All plain-copy assignments, guarded ones included, in plan order.
    pub fn all_assignments(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments
            .iter()
            .chain(self.guarded.iter().flat_map(|g| g.assignments.iter()))
    }

    /// Destination paths written by any entry of the plan.
    pub fn written_members(&self) -> Vec<String> {
        let mut written: Vec<String> = self
            .all_assignments()
            .map(|a| a.destination.dotted())
            .collect();
        written.extend(self.constants.iter().map(|c| c.destination.dotted()));
        written.extend(self.expressions.iter().map(|e| e.destination.dotted()));
        written.extend(self.map_using.iter().map(|m| m.destination.dotted()));
        written.extend(self.map_from.iter().map(|m| m.destination.dotted()));
        written.extend(self.nested.iter().map(|n| n.destination.dotted()));
        written.extend(self.collections.iter().map(|c| c.destination.dotted()));
        written
    }

    pub fn assignment_for(&self, destination: &str) -> Option<&Assignment> {
        self.all_assignments()
            .find(|a| a.destination.dotted() == destination)
    }
}
