//! Behavioral guarantees of planned mappings, checked through the plan
//! interpreter and the rendered code.

use mapgen::convert::{requires_conversion, widens_to};
use mapgen::{
    CodeSynthesizer, CompilerConfig, Conversion, DeclarationInput, ExecError, MapperUnit,
    MappingBuilder, MappingPlan, MethodDescriptor, MethodTable, PairBuilder, PlanBuilder,
    PlanInterpreter, PrimitiveKind, TypeDescriptor, TypeRegistry, TypeShape,
};
use proptest::prelude::*;
use serde_json::{json, Value};

fn int() -> TypeDescriptor {
    TypeDescriptor::primitive(PrimitiveKind::Int32)
}

fn string() -> TypeDescriptor {
    TypeDescriptor::primitive(PrimitiveKind::String)
}

fn registry() -> TypeRegistry {
    let mut r = TypeRegistry::with_builtins();
    r.register(
        TypeShape::class("Demo.Source")
            .property("Id", int())
            .property("Count", int().nullable())
            .property("Name", string())
            .property("Score", int())
            .property("Blob", TypeDescriptor::reference("Demo.Blob"))
            .property("Owner", TypeDescriptor::reference("Demo.Owner").nullable())
            .property(
                "Items",
                TypeDescriptor::list_of(TypeDescriptor::reference("Demo.Item")).nullable(),
            ),
    );
    r.register(TypeShape::class("Demo.Blob").property("Bytes", string()));
    r.register(TypeShape::class("Demo.Owner").property("Name", string()));
    r.register(TypeShape::class("Demo.Item").property("Code", string()));
    r.register(
        TypeShape::class("Demo.Target")
            .property("Id", int())
            .property("Count", int())
            .property("Name", string())
            .property("Label", string())
            .property("Score", int())
            .property("Blob", int())
            .property("Inner", TypeDescriptor::reference("Demo.Inner"))
            .property("Owner", TypeDescriptor::reference("Demo.OwnerDto").nullable())
            .property(
                "Items",
                TypeDescriptor::array_of(TypeDescriptor::reference("Demo.ItemDto")).nullable(),
            ),
    );
    r.register(
        TypeShape::class("Demo.Inner")
            .property("Score", int())
            .property("Note", string()),
    );
    r.register(TypeShape::class("Demo.OwnerDto").property("Name", string()));
    r.register(TypeShape::class("Demo.ItemDto").property("Code", string()));
    r
}

fn unit(rules: MappingBuilder) -> MapperUnit {
    MapperUnit::new("Demo.Mapper")
        .helper(
            MethodDescriptor::new("MapOwner")
                .param("owner", TypeDescriptor::reference("Demo.Owner"))
                .returning(TypeDescriptor::reference("Demo.OwnerDto")),
        )
        .helper(
            MethodDescriptor::new("MapItem")
                .param("item", TypeDescriptor::reference("Demo.Item"))
                .returning(TypeDescriptor::reference("Demo.ItemDto")),
        )
        .declare(DeclarationInput::new(
            MethodDescriptor::new("Map")
                .param("source", TypeDescriptor::reference("Demo.Source"))
                .returning(TypeDescriptor::reference("Demo.Target")),
            rules.build(),
        ))
}

fn plan(registry: &TypeRegistry, rules: MappingBuilder) -> MappingPlan {
    PlanBuilder::new(registry, &CompilerConfig::default())
        .build(&unit(rules), 0)
        .unwrap()
}

fn run(registry: &TypeRegistry, plan: &MappingPlan, source: Value) -> Result<Value, ExecError> {
    let mut methods = MethodTable::new();
    methods
        .register("MapOwner", |args| Ok(json!({"Name": args[0]["Name"].clone()})))
        .register("MapItem", |args| Ok(json!({"Code": args[0]["Code"].clone()})));
    PlanInterpreter::new(registry, &methods).execute(plan, &source, &[])
}

#[test]
fn uncovered_same_named_members_are_auto_matched() {
    let r = registry();
    let plan = plan(
        &r,
        MappingBuilder::new()
            .ignore("Blob")
            .constant("Name", "fixed")
            .map("Label", "Name"),
    );
    let copied: Vec<String> = plan
        .all_assignments()
        .map(|a| a.destination.dotted())
        .collect();
    for member in ["Id", "Count", "Score", "Label"] {
        assert!(copied.contains(&member.to_string()), "{} not copied", member);
    }
    assert!(!copied.contains(&"Blob".to_string()));
    assert!(!copied.contains(&"Name".to_string()));
    assert!(!copied.contains(&"Inner".to_string()));
}

#[test]
fn widening_pairs_need_no_conversion() {
    for from in PrimitiveKind::NUMERIC {
        for to in PrimitiveKind::NUMERIC {
            let source = TypeDescriptor::primitive(from);
            let dest = TypeDescriptor::primitive(to);
            let expected = from != to && !widens_to(from).contains(&to);
            assert_eq!(
                requires_conversion(&source, &dest),
                expected,
                "{:?} -> {:?}",
                from,
                to
            );
        }
    }
}

proptest! {
    #[test]
    fn constants_ignore_the_source(id in any::<i32>(), name in "[a-z]{0,12}", null in any::<bool>()) {
        let r = registry();
        let rules = MappingBuilder::new().auto_match(false);
        let rules = if null {
            rules.null_constant("Label")
        } else {
            rules.constant("Label", "fixed")
        };
        let plan = plan(&r, rules);
        let out = run(&r, &plan, json!({"Id": id, "Name": name, "Label": "from source"})).unwrap();
        let expected = if null { Value::Null } else { json!("fixed") };
        prop_assert_eq!(&out["Label"], &expected);
    }

    #[test]
    fn explicit_order_decides_execution_order(first in -5i32..5, second in -5i32..5) {
        let r = registry();
        let plan = plan(
            &r,
            MappingBuilder::new()
                .auto_match(false)
                .map_with(PairBuilder::new("Id").order(first))
                .map_with(PairBuilder::new("Score").order(second)),
        );
        let order: Vec<String> = plan.assignments.iter().map(|a| a.destination.dotted()).collect();
        let expected = if second < first { vec!["Score", "Id"] } else { vec!["Id", "Score"] };
        prop_assert_eq!(order, expected);
    }
}

#[test]
fn lower_order_renders_first() {
    let r = registry();
    let config = CompilerConfig::default();
    let plan = plan(
        &r,
        MappingBuilder::new()
            .auto_match(false)
            .map_with(PairBuilder::new("Id").order(1))
            .map_with(PairBuilder::new("Score").order(0)),
    );
    let code = CodeSynthesizer::new(&config).render_method(&plan);
    let score = code.find("target.Score = source.Score;").unwrap();
    let id = code.find("target.Id = source.Id;").unwrap();
    assert!(score < id);
}

#[test]
fn null_nullable_source_yields_default_without_converter() {
    let r = registry();
    let plan = plan(&r, MappingBuilder::new().auto_match(false).map("Count", "Count"));
    let assignment = plan.assignment_for("Count").unwrap();
    assert_eq!(assignment.conversion.conversion, Conversion::None);

    let out = run(&r, &plan, json!({"Count": null})).unwrap();
    assert_eq!(out["Count"], json!(0));
    let out = run(&r, &plan, json!({"Count": 12})).unwrap();
    assert_eq!(out["Count"], json!(12));
}

#[test]
fn existing_nested_destination_is_reused() {
    let r = registry();
    let plan = plan(
        &r,
        MappingBuilder::new()
            .auto_match(false)
            .map("Inner.Score", "Score"),
    );
    let methods = MethodTable::new();
    let mut target = json!({"Inner": {"Score": 1, "Note": "keep me"}});
    PlanInterpreter::new(&r, &methods)
        .execute_into(&plan, &json!({"Score": 42}), &mut target, &[])
        .unwrap();
    assert_eq!(target["Inner"], json!({"Score": 42, "Note": "keep me"}));

    let fresh = run(&r, &plan, json!({"Score": 3})).unwrap();
    assert_eq!(fresh["Inner"], json!({"Score": 3, "Note": null}));
}

#[test]
fn null_redirect_sources_give_absent_values() {
    let r = registry();
    let plan = plan(
        &r,
        MappingBuilder::new()
            .auto_match(false)
            .map_nested("Owner", "MapOwner")
            .map_collection("Items", "MapItem"),
    );
    let out = run(&r, &plan, json!({"Owner": null, "Items": null})).unwrap();
    assert_eq!(out["Owner"], Value::Null);
    assert_eq!(out["Items"], Value::Null);

    let out = run(
        &r,
        &plan,
        json!({"Owner": {"Name": "Ada"}, "Items": [{"Code": "x"}, {"Code": "y"}]}),
    )
    .unwrap();
    assert_eq!(out["Owner"], json!({"Name": "Ada"}));
    assert_eq!(out["Items"], json!([{"Code": "x"}, {"Code": "y"}]));
}

#[test]
fn unconvertible_pair_fails_at_execution() {
    let r = registry();
    let plan = plan(&r, MappingBuilder::new().auto_match(false).map("Blob", "Blob"));
    let assignment = plan.assignment_for("Blob").unwrap();
    assert!(assignment.conversion.requires_conversion());

    let err = run(&r, &plan, json!({"Blob": {"Bytes": "abc"}})).unwrap_err();
    assert!(matches!(err, ExecError::InvalidCast { .. }), "{:?}", err);
}
