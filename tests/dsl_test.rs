use serde_json::json;
use toolforge::dsl::builder::WorkflowBuilder;
use toolforge::dsl::{DataMapping, WorkflowGraph};

#[test]
fn test_build_linear_workflow() {
    let workflow = WorkflowBuilder::new("orders")
        .name("Latest order")
        .description("Finds a customer and their latest order.")
        .node("customer", "findCustomer")
            .set("email", "a@example.com")
            .build()
        .call("orders", "listOrders")
        .connect_mapped("customer", "orders", "id", "customerId")
        .map("region", "region")
        .build();

    assert_eq!(workflow.id, "orders");
    assert_eq!(workflow.name, "Latest order");
    assert_eq!(workflow.nodes.len(), 2);
    assert_eq!(workflow.edges.len(), 1);

    // 检查节点
    let customer = workflow.node("customer").expect("Node not found");
    assert_eq!(customer.api, "findCustomer");
    assert_eq!(customer.overrides.get("email"), Some(&json!("a@example.com")));

    let incoming: Vec<_> = workflow.incoming("orders").collect();
    assert_eq!(incoming.len(), 1);
    assert_eq!(
        incoming[0].mappings,
        vec![DataMapping::new("id", "customerId"), DataMapping::new("region", "region")]
    );
}

#[test]
fn test_name_defaults_to_id() {
    let workflow = WorkflowBuilder::new("unnamed").call("a", "x").build();
    assert_eq!(workflow.name, "unnamed");
    assert_eq!(workflow.description, None);
}

#[test]
fn test_graph_json_shape() {
    let workflow: WorkflowGraph = serde_json::from_value(json!({
        "id": "g",
        "name": "G",
        "nodes": [ { "id": "a", "api": "x" }, { "id": "b", "api": "y" } ],
        "edges": [ { "source": "a", "target": "b" } ]
    }))
    .expect("Graph should parse");

    assert!(workflow.edges[0].mappings.is_empty());
    assert!(workflow.nodes[0].overrides.is_empty());

    let round = serde_json::to_value(&workflow).unwrap();
    assert!(round["nodes"][0].get("overrides").is_none());
    assert!(round["edges"][0].get("mappings").is_none());
}
