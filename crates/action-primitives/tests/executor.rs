use std::sync::Arc;

use action_flow::{parse_program, FlowExecutor, FlowInterpreter, RuntimeVars, Termination};
use action_primitives::{BrowserDriver, PrimitiveExecutor, SnapshotConditions, StaticPageDriver};
use browserflow_core_types::RunId;
use script_sandbox::InProcessSandbox;
use serde_json::{json, Value};

const CATALOG: &str = r#"<html><head><title>Catalog</title></head><body>
    <ul id="products">
        <li class="product" data-price="3">Tea</li>
        <li class="product" data-price="12">Coffee</li>
        <li class="product" data-price="7">Cocoa</li>
    </ul>
    <input id="search" value="">
    <a class="next" href="/catalog?page=2">More</a>
</body></html>"#;

const PAGE_TWO: &str = r#"<html><body><ul><li class="product">Mate</li></ul></body></html>"#;

fn setup() -> (Arc<StaticPageDriver>, FlowInterpreter) {
    let driver = Arc::new(
        StaticPageDriver::new("https://shop.test/catalog", CATALOG)
            .with_page("https://shop.test/catalog?page=2", PAGE_TWO),
    );
    let sandbox = Arc::new(InProcessSandbox::default());
    let executor = PrimitiveExecutor::new(driver.clone(), sandbox.clone());
    let conditions = SnapshotConditions::new(driver.clone(), sandbox);
    let interpreter = FlowInterpreter::new(Arc::new(executor), Arc::new(conditions));
    (driver, interpreter)
}

fn vars(value: Value) -> RuntimeVars {
    match value {
        Value::Object(map) => RuntimeVars::from_map(map),
        _ => RuntimeVars::new(),
    }
}

#[tokio::test]
async fn foreach_over_elements_feeds_typing() {
    let (driver, interpreter) = setup();
    let program = parse_program(json!([
        {"type": "foreach", "selector": "li.product", "varName": "product"},
        {"type": "type", "selector": "#search", "value": "{$loop.text};", "typeMode": "append"},
        {"type": "end"}
    ]))
    .unwrap();

    let report = interpreter
        .execute(&RunId::new(), &program, RuntimeVars::new())
        .await;

    assert_eq!(report.termination, Termination::Completed);
    assert_eq!(driver.field_value("#search").as_deref(), Some("Tea;Coffee;Cocoa;"));
    assert_eq!(report.variables["product"]["text"], json!("Cocoa"));
}

#[tokio::test]
async fn javascript_results_are_stored_and_logged() {
    let (_driver, interpreter) = setup();
    let program = parse_program(json!([
        {
            "type": "javascript",
            "varName": "prices",
            "value": r#"
                let out = [];
                for el in document.querySelectorAll("li.product") {
                    out.push(parse_int(el.attrs["data-price"]));
                }
                console.log(`found ${out.len()}`);
                out
            "#
        },
        {"type": "if", "conditionVar": "{$block.output}", "conditionVarType": "string", "conditionOp": "contains", "conditionValue": "12"},
        {"type": "set", "varName": "expensive", "value": "true"},
        {"type": "end"}
    ]))
    .unwrap();

    let report = interpreter
        .execute(&RunId::new(), &program, RuntimeVars::new())
        .await;

    assert!(report.is_success(), "{:?}", report.logs);
    assert_eq!(report.variables["prices"], json!([3, 12, 7]));
    assert_eq!(report.variables["expensive"], json!(true));
    assert!(report.logs.iter().any(|line| line == "console: found 3"), "{:?}", report.logs);
}

#[tokio::test]
async fn script_errors_do_not_fail_the_action() {
    let (_driver, interpreter) = setup();
    let program = parse_program(json!([
        {"type": "javascript", "varName": "broken", "value": "this_function_does_not_exist()"}
    ]))
    .unwrap();

    let report = interpreter
        .execute(&RunId::new(), &program, RuntimeVars::new())
        .await;

    assert_eq!(report.failed_actions, 0);
    let stored = report.variables["broken"].as_str().unwrap_or_default().to_string();
    assert!(stored.starts_with("Error: "), "{stored}");
}

#[tokio::test]
async fn page_expressions_drive_pagination() {
    let (driver, interpreter) = setup();
    let program = parse_program(json!([
        {"type": "set", "varName": "pages", "value": "1"},
        {"type": "while", "value": "exists(\"a.next\")"},
        {"type": "click", "selector": "a.next"},
        {"type": "set", "varName": "pages", "value": "2"},
        {"type": "end"},
        {"type": "screenshot", "value": "last"}
    ]))
    .unwrap();

    let report = interpreter
        .execute(&RunId::new(), &program, RuntimeVars::new())
        .await;

    assert_eq!(report.termination, Termination::Completed);
    assert_eq!(report.variables["pages"], json!(2));
    assert_eq!(driver.current_url().await.unwrap(), "https://shop.test/catalog?page=2");
    assert_eq!(report.variables["block.output"], json!("static://last-1"));
}

#[tokio::test]
async fn missing_elements_route_to_the_error_handler() {
    let (_driver, interpreter) = setup();
    let program = parse_program(json!([
        {"type": "on_error"},
        {"type": "set", "varName": "recovered", "value": "yes"},
        {"type": "end"},
        {"type": "click", "selector": "#does-not-exist"},
        {"type": "set", "varName": "after", "value": "unreachable"}
    ]))
    .unwrap();

    let report = interpreter
        .execute(&RunId::new(), &program, RuntimeVars::new())
        .await;

    assert_eq!(report.termination, Termination::ErrorHandlerFinished);
    assert_eq!(report.variables["recovered"], json!("yes"));
    assert!(report.variables.get("after").is_none());
    assert!(report
        .logs
        .iter()
        .any(|line| line.contains("#does-not-exist")), "{:?}", report.logs);
}

#[tokio::test]
async fn data_actions_compose() {
    let (_driver, interpreter) = setup();
    let program = parse_program(json!([
        {"type": "csv", "varName": "rows", "value": "{$raw}"},
        {"type": "set", "varName": "extra", "value": "[{\"sku\": \"z\"}]"},
        {"type": "merge", "varName": "all", "value": "{$rows} {$extra}"}
    ]))
    .unwrap();

    let report = interpreter
        .execute(&RunId::new(), &program, vars(json!({"raw": "sku,qty\na,1\nb,2"})))
        .await;

    assert_eq!(
        report.variables["all"],
        json!([{"sku": "a", "qty": "1"}, {"sku": "b", "qty": "2"}, {"sku": "z"}])
    );
}

#[tokio::test]
async fn start_without_a_launcher_fails() {
    let (_driver, interpreter) = setup();
    let program = parse_program(json!([{"type": "start", "value": "child-task"}])).unwrap();

    let report = interpreter
        .execute(&RunId::new(), &program, RuntimeVars::new())
        .await;

    assert_eq!(report.failed_actions, 1);
}
