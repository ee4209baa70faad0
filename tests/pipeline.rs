//! YAML schema and mappers through planning, rendering and interpretation.

use std::io::Write;
use std::sync::Arc;

use mapgen::{
    load_mappers, load_schema, CompilerConfig, DiagnosticCode, MappingCompiler, MethodTable,
    PlanInterpreter, Severity,
};
use pretty_assertions::assert_eq;
use serde_json::json;

const SCHEMA: &str = r#"
types:
  - name: Shop.Order
    members:
      - { name: Id, type: int }
      - { name: Total, type: "decimal?" }
      - { name: Status, type: Shop.Status }
      - { name: Customer, type: "Shop.Customer?" }
      - { name: Lines, type: "List<Shop.Line>" }
  - name: Shop.Customer
    members:
      - { name: Name, type: string }
  - name: Shop.Line
    members:
      - { name: Sku, type: string }
      - { name: Qty, type: int }
  - name: Shop.Status
    kind: enum
    values: [New, Paid, Shipped]
  - name: Shop.OrderDto
    members:
      - { name: Id, type: int }
      - { name: Total, type: decimal }
      - { name: Status, type: int }
      - { name: CustomerName, type: "string?" }
      - { name: Lines, type: "Shop.LineDto[]" }
      - { name: Channel, type: string }
  - name: Shop.LineDto
    members:
      - { name: Sku, type: string }
      - { name: Qty, type: long }
"#;

const MAPPERS: &str = r#"
units:
  - name: Shop.Mapping.OrderMapper
    declarations:
      - name: ToDto
        params:
          - { name: order, type: Shop.Order }
        returns: Shop.OrderDto
        rules:
          - { rule: map, target: CustomerName, source: Customer.Name }
          - { rule: map_collection, target: Lines, mapper: ToLineDto }
          - { rule: constant, target: Channel, value: web }
      - name: ToLineDto
        params:
          - { name: line, type: Shop.Line }
        returns: Shop.LineDto
  - name: Shop.Mapping.BrokenMapper
    declarations:
      - name: Bad
        params:
          - { name: order, type: Shop.Order }
        returns: Shop.OrderDto
        rules:
          - { rule: map_collection, target: Lines, mapper: Missing }
"#;

fn write_temp(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn compile() -> (mapgen::TypeRegistry, mapgen::CompilationOutput) {
    let schema = write_temp(SCHEMA);
    let mappers = write_temp(MAPPERS);
    let registry = load_schema(schema.path()).unwrap();
    let units = load_mappers(mappers.path(), &registry).unwrap();
    let output = MappingCompiler::new(&registry, CompilerConfig::default()).compile(&units);
    (registry, output)
}

#[test]
fn renders_one_file_per_unit_and_isolates_failures() {
    let (_, output) = compile();

    assert_eq!(output.count(Severity::Error), 1);
    let error = output.diagnostics.iter().find(|d| d.is_error()).unwrap();
    assert_eq!(error.code, DiagnosticCode::MethodNotFound);

    let names: Vec<&str> = output.units.iter().map(|u| u.unit.as_str()).collect();
    assert_eq!(names, vec!["Shop.Mapping.OrderMapper"]);

    let unit = output.unit("Shop.Mapping.OrderMapper").unwrap();
    assert_eq!(unit.file_name, "Shop.Mapping.OrderMapper.g.cs");
    assert_eq!(unit.declarations, vec!["ToDto", "ToLineDto"]);

    let source = &unit.source;
    assert!(source.starts_with("// <auto-generated/>\n#nullable enable\n"));
    assert!(source.contains("namespace Shop.Mapping"));
    assert!(source.contains("partial class OrderMapper"));
    assert!(source.contains("target.Total = order.Total is { } v0 ? v0 : default;"));
    assert!(source.contains("target.Status = (int)order.Status;"));
    assert!(source.contains("if (order.Customer is not null)"));
    assert!(source.contains("target.CustomerName = order.Customer.Name;"));
    assert!(source.contains("target.Channel = \"web\";"));
    assert!(source.contains("ToArray<Shop.Line, Shop.LineDto>("));
    assert!(source.contains("target.Qty = line.Qty;"));

    let to_dto = source.find("ToDto(Shop.Order order)").unwrap();
    let to_line = source.find("ToLineDto(Shop.Line line)").unwrap();
    assert!(to_dto < to_line);
}

#[test]
fn plans_serialize_for_the_cli() {
    let (_, output) = compile();
    let plan = output.plan("Shop.Mapping.OrderMapper", "ToDto").unwrap();
    let value = serde_json::to_value(plan).unwrap();
    assert_eq!(value["declaration"]["name"], json!("ToDto"));
    assert_eq!(value["collections"][0]["shape"], json!("array"));

    let yaml = serde_yaml::to_string(&output.plans).unwrap();
    let back: Vec<mapgen::MappingPlan> = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(back, output.plans);
}

#[test]
fn compiled_plans_execute_against_values() {
    let (registry, output) = compile();
    let registry = Arc::new(registry);
    let line_plan = Arc::new(
        output
            .plan("Shop.Mapping.OrderMapper", "ToLineDto")
            .unwrap()
            .clone(),
    );

    let mut methods = MethodTable::new();
    {
        let registry = Arc::clone(&registry);
        let line_plan = Arc::clone(&line_plan);
        methods.register("ToLineDto", move |args| {
            let empty = MethodTable::new();
            PlanInterpreter::new(&*registry, &empty).execute(&line_plan, &args[0], &[])
        });
    }

    let plan = output.plan("Shop.Mapping.OrderMapper", "ToDto").unwrap();
    let order = json!({
        "Id": 7,
        "Total": null,
        "Status": "Shipped",
        "Customer": {"Name": "Ada"},
        "Lines": [{"Sku": "A-1", "Qty": 2}, {"Sku": "B-2", "Qty": 1}]
    });
    let dto = PlanInterpreter::new(&*registry, &methods)
        .execute(plan, &order, &[])
        .unwrap();

    assert_eq!(
        dto,
        json!({
            "Id": 7,
            "Total": 0.0,
            "Status": 2,
            "CustomerName": "Ada",
            "Lines": [{"Sku": "A-1", "Qty": 2}, {"Sku": "B-2", "Qty": 1}],
            "Channel": "web"
        })
    );
}
