//! Dotted member path resolution.

use crate::error::PlanError;
use crate::types::{flatten_members, MemberDescriptor, TypeDescriptor, TypeIntrospector};

use super::{MemberPath, PathSegment};

/// Which side of the mapping a path is read from or written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRole {
    Source,
    Destination,
}

/// Find a member by name, optionally ignoring ASCII case. An exact match is
/// preferred over a case-insensitive one.
pub fn lookup_member(
    members: &[MemberDescriptor],
    name: &str,
    case_insensitive: bool,
) -> Option<MemberDescriptor> {
    members
        .iter()
        .find(|m| m.name == name)
        .or_else(|| {
            case_insensitive
                .then(|| members.iter().find(|m| m.name.eq_ignore_ascii_case(name)))
                .flatten()
        })
        .cloned()
}

/// Resolve `dotted` against `root` into a segment chain.
///
/// Every segment must be readable, except the leaf of a destination path,
/// which must be writable instead.
pub fn resolve(
    intro: &dyn TypeIntrospector,
    root: &TypeDescriptor,
    dotted: &str,
    role: PathRole,
) -> Result<MemberPath, PlanError> {
    let names: Vec<&str> = dotted.split('.').map(str::trim).collect();
    if names.iter().any(|name| name.is_empty()) {
        return Err(PlanError::MalformedPath {
            path: dotted.to_string(),
            ty: root.to_string(),
        });
    }
    let mut segments = Vec::with_capacity(names.len());
    let mut current = root.underlying();

    for (i, name) in names.iter().enumerate() {
        let walked = names[..=i].join(".");
        let members = flatten_members(intro, &current);
        let member = lookup_member(&members, name, false).ok_or_else(|| {
            PlanError::UnknownMember {
                path: walked.clone(),
                ty: current.to_string(),
            }
        })?;

        let is_leaf = i + 1 == names.len();
        let usable = match (role, is_leaf) {
            (PathRole::Destination, true) => member.writable,
            _ => member.readable,
        };
        if !usable {
            let ty = current.to_string();
            return Err(match (role, is_leaf) {
                (PathRole::Destination, true) => PlanError::MemberNotWritable { path: walked, ty },
                _ => PlanError::MemberNotReadable { path: walked, ty },
            });
        }

        current = member.ty.underlying();
        segments.push(PathSegment {
            nullable: member.ty.nullable,
            name: member.name,
            ty: member.ty,
        });
    }
    MemberPath::from_segments(segments).ok_or_else(|| PlanError::MalformedPath {
        path: dotted.to_string(),
        ty: root.to_string(),
    })
}

/// Single-segment path for an already flattened member.
pub fn single(member: &MemberDescriptor) -> MemberPath {
    MemberPath::new(
        Vec::new(),
        PathSegment {
            name: member.name.clone(),
            ty: member.ty.clone(),
            nullable: member.ty.nullable,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MemberDef, PrimitiveKind, TypeRegistry, TypeShape};

    fn registry() -> TypeRegistry {
        let mut r = TypeRegistry::with_builtins();
        r.register(
            TypeShape::class("Demo.Person")
                .property("Name", TypeDescriptor::primitive(PrimitiveKind::String))
                .property("Address", TypeDescriptor::reference("Demo.Address").nullable())
                .member(
                    MemberDef::property("Id", TypeDescriptor::primitive(PrimitiveKind::Int32))
                        .read_only(),
                )
                .member(
                    MemberDef::property("Pin", TypeDescriptor::primitive(PrimitiveKind::String))
                        .write_only(),
                )
                .member(
                    MemberDef::property("Vault", TypeDescriptor::reference("Demo.Address"))
                        .write_only(),
                ),
        );
        r.register(
            TypeShape::class("Demo.Address")
                .property("City", TypeDescriptor::primitive(PrimitiveKind::String)),
        );
        r
    }

    #[test]
    fn resolves_nested_paths_with_nullability() {
        let r = registry();
        let root = TypeDescriptor::reference("Demo.Person");
        let path = resolve(&r, &root, "Address.City", PathRole::Source).unwrap();
        assert_eq!(path.dotted(), "Address.City");
        assert!(path.parents[0].nullable);
        assert!(!path.leaf.nullable);
        assert!(path.has_nullable_intermediate());
    }

    #[test]
    fn reports_unknown_and_read_only_members() {
        let r = registry();
        let root = TypeDescriptor::reference("Demo.Person");
        match resolve(&r, &root, "Address.Zip", PathRole::Source) {
            Err(PlanError::UnknownMember { path, ty }) => {
                assert_eq!(path, "Address.Zip");
                assert_eq!(ty, "Demo.Address");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            resolve(&r, &root, "Id", PathRole::Destination),
            Err(PlanError::MemberNotWritable { .. })
        ));
        assert!(resolve(&r, &root, "Id", PathRole::Source).is_ok());
    }

    #[test]
    fn write_only_members_are_not_readable() {
        let r = registry();
        let root = TypeDescriptor::reference("Demo.Person");
        match resolve(&r, &root, "Pin", PathRole::Source) {
            Err(err @ PlanError::MemberNotReadable { .. }) => {
                assert_eq!(err.to_string(), "member `Pin` on `Demo.Person` is not readable");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(resolve(&r, &root, "Pin", PathRole::Destination).is_ok());
        assert!(matches!(
            resolve(&r, &root, "Vault.City", PathRole::Destination),
            Err(PlanError::MemberNotReadable { path, .. }) if path == "Vault"
        ));
    }

    #[test]
    fn empty_segments_are_rejected() {
        let r = registry();
        let root = TypeDescriptor::reference("Demo.Person");
        for dotted in ["", "Address..City", "Address."] {
            assert!(
                matches!(
                    resolve(&r, &root, dotted, PathRole::Source),
                    Err(PlanError::MalformedPath { .. })
                ),
                "{:?}",
                dotted
            );
        }
    }

    #[test]
    fn case_insensitive_lookup_prefers_exact() {
        let r = registry();
        let members = flatten_members(&r, &TypeDescriptor::reference("Demo.Person"));
        assert!(lookup_member(&members, "name", false).is_none());
        assert_eq!(lookup_member(&members, "name", true).unwrap().name, "Name");
    }
}
