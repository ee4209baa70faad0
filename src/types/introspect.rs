//! Member flattening, element-type extraction and assignability.

use std::collections::{HashMap, HashSet, VecDeque};

use super::{
    MemberDescriptor, MethodDescriptor, PrimitiveKind, TypeDescriptor, TypeIntrospector,
    COLLECTION, ENUMERABLE, LIST_CONTRACT, READ_ONLY_LIST,
};

type Bindings = HashMap<String, TypeDescriptor>;

fn bindings(params: &[String], args: &[TypeDescriptor]) -> Bindings {
    params.iter().cloned().zip(args.iter().cloned()).collect()
}

/// Replace open generic parameters with their bound arguments.
fn substitute(ty: &TypeDescriptor, bound: &Bindings) -> TypeDescriptor {
    if ty.args.is_empty() && ty.element.is_none() {
        if let Some(actual) = bound.get(&ty.name) {
            let mut actual = actual.clone();
            actual.nullable |= ty.nullable;
            return actual;
        }
        return ty.clone();
    }
    TypeDescriptor {
        args: ty.args.iter().map(|a| substitute(a, bound)).collect(),
        element: ty
            .element
            .as_ref()
            .map(|e| Box::new(substitute(e, bound))),
        ..ty.clone()
    }
}

/// Flatten the public, instance, readable-or-writable members of `ty`.
///
/// Walks from the most-derived type to its bases. A name declared on a more
/// derived type hides the same name further down the chain; declaration
/// order is kept within each type.
pub fn flatten_members(intro: &dyn TypeIntrospector, ty: &TypeDescriptor) -> Vec<MemberDescriptor> {
    let mut members = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut current = Some(ty.underlying());
    let mut depth = 0;

    while let Some(cur) = current.take() {
        if !visited.insert(cur.name.clone()) {
            break;
        }
        let Some(shape) = intro.shape(&cur.name) else {
            break;
        };
        let bound = bindings(&shape.type_params, &cur.args);
        for member in &shape.members {
            if !member.is_public || member.is_static || !(member.readable || member.writable) {
                continue;
            }
            if !seen.insert(member.name.clone()) {
                continue;
            }
            members.push(MemberDescriptor {
                name: member.name.clone(),
                ty: substitute(&member.ty, &bound),
                readable: member.readable,
                writable: member.writable,
                depth,
            });
        }
        current = shape.base.as_ref().map(|b| substitute(b, &bound));
        depth += 1;
    }
    members
}

/// Look a single member up on the flattened surface of `ty`.
pub fn find_member(
    intro: &dyn TypeIntrospector,
    ty: &TypeDescriptor,
    name: &str,
) -> Option<MemberDescriptor> {
    flatten_members(intro, ty)
        .into_iter()
        .find(|m| m.name == name)
}

/// Methods named `name` declared on `type_name` or any of its bases,
/// most-derived first.
pub fn find_methods(
    intro: &dyn TypeIntrospector,
    type_name: &str,
    name: &str,
) -> Vec<MethodDescriptor> {
    let mut found = Vec::new();
    let mut visited = HashSet::new();
    let mut current = Some(type_name.to_string());
    while let Some(cur) = current.take() {
        if !visited.insert(cur.clone()) {
            break;
        }
        let Some(shape) = intro.shape(&cur) else {
            break;
        };
        found.extend(shape.methods.iter().filter(|m| m.name == name).cloned());
        current = shape.base.as_ref().map(|b| b.name.clone());
    }
    found
}

/// Every base type and contract reachable from `ty`, with generic
/// arguments bound. Breadth-first, nearest first.
fn supertypes(intro: &dyn TypeIntrospector, ty: &TypeDescriptor) -> Vec<TypeDescriptor> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();

    if let Some(element) = &ty.element {
        for contract in [ENUMERABLE, COLLECTION, LIST_CONTRACT, READ_ONLY_LIST] {
            queue.push_back(TypeDescriptor::generic(
                contract,
                super::TypeKind::Reference,
                vec![(**element).clone()],
            ));
        }
    } else {
        queue.push_back(ty.underlying());
    }

    let start = ty.underlying();
    while let Some(cur) = queue.pop_front() {
        if !seen.insert(cur.to_string()) {
            continue;
        }
        if cur != start {
            out.push(cur.clone());
        }
        let Some(shape) = intro.shape(&cur.name) else {
            continue;
        };
        let bound = bindings(&shape.type_params, &cur.args);
        if let Some(base) = &shape.base {
            queue.push_back(substitute(base, &bound));
        }
        for contract in &shape.interfaces {
            queue.push_back(substitute(contract, &bound));
        }
    }
    out
}

/// The supertype or contract of `ty` named `contract`, if any.
pub fn implements(
    intro: &dyn TypeIntrospector,
    ty: &TypeDescriptor,
    contract: &str,
) -> Option<TypeDescriptor> {
    if ty.name == contract && !ty.is_array() {
        return Some(ty.underlying());
    }
    supertypes(intro, ty).into_iter().find(|t| t.name == contract)
}

/// Element type of a collection shape.
///
/// Arrays yield their element; otherwise the argument of the single
/// implemented `IEnumerable<T>` contract. Strings are never collections.
pub fn element_type(intro: &dyn TypeIntrospector, ty: &TypeDescriptor) -> Option<TypeDescriptor> {
    if let Some(element) = &ty.element {
        return Some((**element).clone());
    }
    if ty.primitive_kind() == Some(PrimitiveKind::String) {
        return None;
    }
    if ty.name == ENUMERABLE && ty.args.len() == 1 {
        return Some(ty.args[0].clone());
    }

    let mut candidates: Vec<TypeDescriptor> = Vec::new();
    for contract in supertypes(intro, ty) {
        if contract.name == ENUMERABLE && contract.args.len() == 1 {
            let arg = contract.args[0].clone();
            if !candidates.contains(&arg) {
                candidates.push(arg);
            }
        }
    }
    match candidates.len() {
        1 => candidates.pop(),
        _ => None,
    }
}

/// Whether a value of `from` can be stored where `to` is expected:
/// identity, nullable-insensitive identity, or reachable through the
/// inheritance/contract chain.
pub fn is_assignable(intro: &dyn TypeIntrospector, from: &TypeDescriptor, to: &TypeDescriptor) -> bool {
    if from.same_underlying(to) {
        return true;
    }
    if to.primitive_kind() == Some(PrimitiveKind::Object) {
        return true;
    }
    supertypes(intro, from)
        .iter()
        .any(|t| t.same_underlying(to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MemberDef, TypeKind, TypeRegistry, TypeShape, LIST};

    fn int() -> TypeDescriptor {
        TypeDescriptor::primitive(PrimitiveKind::Int32)
    }

    fn string() -> TypeDescriptor {
        TypeDescriptor::primitive(PrimitiveKind::String)
    }

    fn registry() -> TypeRegistry {
        let mut r = TypeRegistry::with_builtins();
        r.register(
            TypeShape::class("Demo.Entity")
                .property("Id", int())
                .property("Name", string())
                .member(MemberDef::property("Secret", string()).private()),
        );
        r.register(
            TypeShape::class("Demo.Person")
                .extends(TypeDescriptor::reference("Demo.Entity"))
                .property("Name", string().nullable())
                .property("Age", int())
                .member(MemberDef::property("Count", int()).shared()),
        );
        r.register(
            TypeShape::class("Demo.People")
                .implements(TypeDescriptor::generic(
                    ENUMERABLE,
                    TypeKind::Reference,
                    vec![TypeDescriptor::reference("Demo.Person")],
                )),
        );
        r
    }

    #[test]
    fn flatten_walks_derived_to_base() {
        let r = registry();
        let members = flatten_members(&r, &TypeDescriptor::reference("Demo.Person"));
        let names: Vec<_> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Name", "Age", "Id"]);

        // derived declaration wins
        assert!(members[0].ty.nullable);
        assert_eq!(members[0].depth, 0);
        assert_eq!(members[2].depth, 1);
    }

    #[test]
    fn flatten_binds_generic_members() {
        let r = registry();
        let list = TypeDescriptor::list_of(TypeDescriptor::reference("Demo.Person"));
        let count = find_member(&r, &list, "Count").unwrap();
        assert_eq!(count.ty, int());
    }

    #[test]
    fn element_types() {
        let r = registry();
        let person = TypeDescriptor::reference("Demo.Person");

        assert_eq!(
            element_type(&r, &TypeDescriptor::array_of(int())),
            Some(int())
        );
        assert_eq!(
            element_type(&r, &TypeDescriptor::list_of(person.clone())),
            Some(person.clone())
        );
        assert_eq!(
            element_type(&r, &TypeDescriptor::reference("Demo.People")),
            Some(person)
        );
        assert_eq!(element_type(&r, &string()), None);
        assert_eq!(element_type(&r, &int()), None);
    }

    #[test]
    fn assignability_follows_chain() {
        let r = registry();
        let person = TypeDescriptor::reference("Demo.Person");
        let entity = TypeDescriptor::reference("Demo.Entity");
        assert!(is_assignable(&r, &person, &entity));
        assert!(!is_assignable(&r, &entity, &person));
        assert!(is_assignable(&r, &person.clone().nullable(), &person));

        let list = TypeDescriptor::list_of(int());
        let enumerable = TypeDescriptor::generic(
            ENUMERABLE,
            TypeKind::Reference,
            vec![int()],
        );
        assert!(is_assignable(&r, &list, &enumerable));
        assert!(implements(&r, &list, LIST).is_some());
    }

    #[test]
    fn find_methods_includes_bases() {
        let mut r = registry();
        r.register(
            TypeShape::class("Demo.BaseMapper")
                .method(MethodDescriptor::new("Helper").returning(int())),
        );
        r.register(
            TypeShape::class("Demo.Mapper")
                .extends(TypeDescriptor::reference("Demo.BaseMapper"))
                .method(
                    MethodDescriptor::new("Helper")
                        .param("x", int())
                        .returning(int()),
                ),
        );
        let found = find_methods(&r, "Demo.Mapper", "Helper");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].params.len(), 1);
    }
}
