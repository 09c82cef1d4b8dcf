//! Rhai engine construction and the script-facing bindings.
//!
//! A fresh engine is built for every invocation. It is not `Send`: callers
//! run it on a blocking thread or inside the worker process.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Array, Dynamic, Engine, EvalAltResult, Map, Scope};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::SandboxConfig;
use crate::convert::{dynamic_to_json, dynamic_truthy, json_to_dynamic};
use crate::dom::{element_text, DomDocument};
use crate::errors::SandboxError;
use crate::{ExpressionRequest, ScriptRequest};

type LogBuffer = Rc<RefCell<Vec<String>>>;

#[derive(Clone)]
struct DocumentHandle {
    dom: DomDocument,
}

#[derive(Clone)]
struct DataHandle {
    html: Rc<str>,
    url: Rc<str>,
}

#[derive(Clone)]
struct ConsoleHandle {
    lines: LogBuffer,
}

impl ConsoleHandle {
    fn push(&self, level: Option<&str>, parts: &[Dynamic]) {
        let text = parts
            .iter()
            .map(display_dynamic)
            .collect::<Vec<_>>()
            .join(" ");
        let line = match level {
            Some(level) => format!("[{level}] {text}"),
            None => text,
        };
        self.lines.borrow_mut().push(line);
    }
}

#[derive(Clone)]
struct DomParserHandle;

/// Variadic console calls up to five arguments; an array argument is spread.
fn register_console_level(engine: &mut Engine, name: &str, level: Option<&'static str>) {
    engine
        .register_fn(name, move |c: &mut ConsoleHandle| c.push(level, &[]))
        .register_fn(name, move |c: &mut ConsoleHandle, a: Dynamic| {
            if a.is_array() {
                c.push(level, &a.cast::<Array>())
            } else {
                c.push(level, &[a])
            }
        })
        .register_fn(name, move |c: &mut ConsoleHandle, a: Dynamic, b: Dynamic| {
            c.push(level, &[a, b])
        })
        .register_fn(
            name,
            move |c: &mut ConsoleHandle, a: Dynamic, b: Dynamic, d: Dynamic| {
                c.push(level, &[a, b, d])
            },
        )
        .register_fn(
            name,
            move |c: &mut ConsoleHandle, a: Dynamic, b: Dynamic, d: Dynamic, e: Dynamic| {
                c.push(level, &[a, b, d, e])
            },
        )
        .register_fn(
            name,
            move |c: &mut ConsoleHandle,
                  a: Dynamic,
                  b: Dynamic,
                  d: Dynamic,
                  e: Dynamic,
                  f: Dynamic| { c.push(level, &[a, b, d, e, f]) },
        );
}

fn display_dynamic(value: &Dynamic) -> String {
    match dynamic_to_json(value) {
        Value::String(text) => text,
        Value::Null => "undefined".to_string(),
        other => other.to_string(),
    }
}

fn runtime_error(message: String) -> Box<EvalAltResult> {
    message.into()
}

/// Builds engines for one sandbox configuration.
pub struct SandboxEngine {
    config: SandboxConfig,
}

impl SandboxEngine {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    fn create_engine(&self, logs: &LogBuffer) -> Engine {
        let mut engine = Engine::new();

        engine.set_max_string_size(self.config.max_string_size);
        engine.set_max_array_size(self.config.max_array_size);
        engine.set_max_map_size(self.config.max_map_size);
        engine.set_max_call_levels(self.config.max_call_levels);
        engine.set_max_expr_depths(64, 64);

        // No filesystem modules, no dynamic evaluation.
        engine.set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");

        let started = Instant::now();
        let limit = Duration::from_millis(self.config.timeout_ms);
        let timeout_ms = self.config.timeout_ms;
        let max_operations = self.config.max_operations;
        engine.on_progress(move |operations| {
            if operations >= max_operations {
                return Some(Dynamic::from(format!(
                    "execution limit of {max_operations} operations exceeded"
                )));
            }
            if started.elapsed() > limit {
                return Some(Dynamic::from(format!(
                    "execution timed out after {timeout_ms}ms"
                )));
            }
            None
        });

        let printed = logs.clone();
        engine.on_print(move |text| printed.borrow_mut().push(text.to_string()));
        let debugged = logs.clone();
        engine.on_debug(move |text, _source, _pos| {
            debugged.borrow_mut().push(format!("[debug] {text}"))
        });

        engine
    }

    fn register_page_bindings(
        &self,
        engine: &mut Engine,
        include_shadow_dom: bool,
        dom: &DomDocument,
    ) {
        engine
            .register_type_with_name::<DocumentHandle>("Document")
            .register_fn(
                "querySelector",
                |doc: &mut DocumentHandle, selector: &str| -> Result<Dynamic, Box<EvalAltResult>> {
                    let found = doc.dom.query_maps(selector, false).map_err(runtime_error)?;
                    Ok(found.into_iter().next().unwrap_or(Dynamic::UNIT))
                },
            )
            .register_fn(
                "querySelectorAll",
                |doc: &mut DocumentHandle, selector: &str| -> Result<Array, Box<EvalAltResult>> {
                    doc.dom.query_maps(selector, false).map_err(runtime_error)
                },
            )
            .register_get("title", |doc: &mut DocumentHandle| doc.dom.title())
            .register_get("textContent", |doc: &mut DocumentHandle| {
                doc.dom.text_content(false)
            })
            .register_get("outerHTML", |doc: &mut DocumentHandle| doc.dom.outer_html());

        engine
            .register_type_with_name::<DataHandle>("Data")
            .register_fn("html", |data: &mut DataHandle| data.html.to_string())
            .register_fn("url", |data: &mut DataHandle| data.url.to_string());

        engine.register_type_with_name::<ConsoleHandle>("Console");
        register_console_level(engine, "log", None);
        register_console_level(engine, "info", None);
        register_console_level(engine, "warn", Some("warn"));
        register_console_level(engine, "error", Some("error"));

        engine
            .register_type_with_name::<DomParserHandle>("DOMParser")
            .register_fn("DOMParser", || DomParserHandle)
            .register_fn(
                "parseFromString",
                |_: &mut DomParserHandle, markup: &str, _mime: &str| DocumentHandle {
                    dom: DomDocument::parse(markup),
                },
            );

        if include_shadow_dom {
            let deep = dom.clone();
            engine.register_fn(
                "deepQuerySelectorAll",
                move |selector: &str| -> Result<Array, Box<EvalAltResult>> {
                    deep.query_maps(selector, true).map_err(runtime_error)
                },
            );
            let deep = dom.clone();
            engine.register_fn("deepTextContent", move || deep.text_content(true));
        }
    }

    fn register_expression_helpers(
        &self,
        engine: &mut Engine,
        dom: &DomDocument,
        request: &ExpressionRequest,
    ) {
        let doc = dom.clone();
        engine.register_fn(
            "exists",
            move |selector: &str| -> Result<bool, Box<EvalAltResult>> {
                Ok(doc.query_first(selector).map_err(runtime_error)?.is_some())
            },
        );
        let doc = dom.clone();
        engine.register_fn(
            "text",
            move |selector: &str| -> Result<String, Box<EvalAltResult>> {
                Ok(doc
                    .query_first(selector)
                    .map_err(runtime_error)?
                    .map(|element| element_text(element, false).trim().to_string())
                    .unwrap_or_default())
            },
        );
        let url = request.url.clone();
        engine.register_fn("url", move || url.clone());
        let html = request.html.clone();
        engine.register_fn("html", move || html.clone());
    }

    /// Runs a user script; the final or `return`ed value is the result.
    pub fn run_script(
        &self,
        request: &ScriptRequest,
    ) -> (Result<Value, SandboxError>, Vec<String>) {
        let logs: LogBuffer = Rc::new(RefCell::new(Vec::new()));
        let dom = DomDocument::parse(&request.html);
        let mut engine = self.create_engine(&logs);
        self.register_page_bindings(&mut engine, request.include_shadow_dom, &dom);

        let mut window = Map::new();
        let mut location = Map::new();
        location.insert("href".into(), Dynamic::from(request.url.clone()));
        window.insert("location".into(), Dynamic::from(location));

        let mut scope = Scope::new();
        scope.push_constant("document", DocumentHandle { dom: dom.clone() });
        scope.push_constant(
            "data",
            DataHandle {
                html: Rc::from(request.html.as_str()),
                url: Rc::from(request.url.as_str()),
            },
        );
        scope.push_constant("window", window);
        scope.push_constant("console", ConsoleHandle { lines: logs.clone() });

        let started = Instant::now();
        let result = engine
            .compile(&request.script)
            .map_err(|err| SandboxError::Compile(err.to_string()))
            .and_then(|ast| {
                engine
                    .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
                    .map_err(map_eval_error)
            })
            .map(|value| dynamic_to_json(&value));

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Sandbox script finished"
        );
        drop(engine);
        let lines = logs.borrow().clone();
        (result, lines)
    }

    /// Evaluates a boolean page condition.
    pub fn evaluate_expression(&self, request: &ExpressionRequest) -> Result<bool, SandboxError> {
        let logs: LogBuffer = Rc::new(RefCell::new(Vec::new()));
        let dom = DomDocument::parse(&request.html);
        let mut engine = self.create_engine(&logs);
        self.register_expression_helpers(&mut engine, &dom, request);

        let mut scope = Scope::new();
        scope.push_constant("output", json_to_dynamic(&request.block_output));

        let ast = engine
            .compile_expression(&request.expression)
            .map_err(|err| SandboxError::Compile(err.to_string()))?;
        let value = engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
            .map_err(map_eval_error)?;
        Ok(dynamic_truthy(&value))
    }
}

fn map_eval_error(err: Box<EvalAltResult>) -> SandboxError {
    match *err {
        EvalAltResult::ErrorTerminated(reason, _) => {
            let reason = reason.to_string();
            warn!(reason = %reason, "Script terminated");
            SandboxError::Terminated(reason)
        }
        other => SandboxError::Runtime(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAGE: &str = r#"<html><head><title>Catalog</title></head><body>
        <h1>Products</h1>
        <ul><li class="p" data-sku="1">Lamp</li><li class="p" data-sku="2">Desk</li></ul>
        <div id="host"><template data-shadowroot="open"><p class="inner">Secret</p></template></div>
    </body></html>"#;

    fn engine() -> SandboxEngine {
        SandboxEngine::new(SandboxConfig::default())
    }

    fn script(source: &str, shadow: bool) -> (Result<Value, SandboxError>, Vec<String>) {
        engine().run_script(&ScriptRequest {
            script: source.to_string(),
            html: PAGE.to_string(),
            url: "https://shop.test/list".to_string(),
            include_shadow_dom: shadow,
        })
    }

    fn expression(source: &str, output: Value) -> Result<bool, SandboxError> {
        engine().evaluate_expression(&ExpressionRequest {
            expression: source.to_string(),
            html: PAGE.to_string(),
            url: "https://shop.test/list".to_string(),
            block_output: output,
        })
    }

    #[test]
    fn extracts_plain_data_from_the_snapshot() {
        let (result, _) = script(
            r#"
            let rows = [];
            for el in document.querySelectorAll("li.p") {
                rows.push(#{ name: el.text, sku: el.attrs["data-sku"] });
            }
            #{ title: document.title, url: window.location.href, rows: rows }
            "#,
            false,
        );
        assert_eq!(
            result.unwrap(),
            json!({
                "title": "Catalog",
                "url": "https://shop.test/list",
                "rows": [{"name": "Lamp", "sku": "1"}, {"name": "Desk", "sku": "2"}]
            })
        );
    }

    #[test]
    fn console_output_is_buffered() {
        let (result, logs) = script(
            r#"console.log("count", 2); console.warn("careful"); print("raw"); return data.url();"#,
            false,
        );
        assert_eq!(result.unwrap(), json!("https://shop.test/list"));
        assert_eq!(logs, vec!["count 2", "[warn] careful", "raw"]);
    }

    #[test]
    fn console_accepts_many_arguments() {
        let (result, logs) = script(
            r#"console.log("a", 1, 2); console.error("x", "y", "z", 4, true); console.info(["p", 3]); console.log(); 1"#,
            false,
        );
        assert_eq!(result.unwrap(), json!(1));
        assert_eq!(logs, vec!["a 1 2", "[error] x y z 4 true", "p 3", ""]);
    }

    #[test]
    fn shadow_helpers_only_exist_when_requested() {
        let (result, _) = script(r#"deepQuerySelectorAll(".inner").len()"#, true);
        assert_eq!(result.unwrap(), json!(1));
        let (result, _) = script(r#"document.querySelectorAll(".inner").len()"#, true);
        assert_eq!(result.unwrap(), json!(0));
        let (result, _) = script(r#"deepTextContent().contains("Secret")"#, true);
        assert_eq!(result.unwrap(), json!(true));
        let (result, _) = script(r#"deepTextContent()"#, false);
        assert!(matches!(result, Err(SandboxError::Runtime(_))));
    }

    #[test]
    fn dom_parser_builds_detached_documents() {
        let (result, _) = script(
            r##"let doc = DOMParser().parseFromString("<p id='x'>hi</p>", "text/html");
               doc.querySelector("#x").text"##,
            false,
        );
        assert_eq!(result.unwrap(), json!("hi"));
    }

    #[test]
    fn host_escape_routes_fail() {
        for attempt in [
            "this.constructor.constructor(\"return process\")()",
            "document.constructor",
            "data.__proto__",
            "eval(\"1 + 1\")",
            "import \"/etc/passwd\" as secrets; secrets",
        ] {
            let (result, _) = script(attempt, false);
            assert!(result.is_err(), "{attempt} should fail, got {result:?}");
        }
    }

    #[test]
    fn runaway_scripts_are_terminated() {
        let config = SandboxConfig {
            timeout_ms: 100,
            max_operations: u64::MAX,
            ..SandboxConfig::default()
        };
        let (result, _) = SandboxEngine::new(config).run_script(&ScriptRequest {
            script: "let n = 0; loop { n += 1; }".into(),
            html: String::new(),
            url: String::new(),
            include_shadow_dom: false,
        });
        match result {
            Err(SandboxError::Terminated(reason)) => assert!(reason.contains("timed out")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn expressions_use_page_helpers() {
        assert!(expression(r#"exists("li.p")"#, Value::Null).unwrap());
        assert!(!expression(r#"exists(".missing")"#, Value::Null).unwrap());
        assert!(expression(r#"text("h1") == "Products""#, Value::Null).unwrap());
        assert!(expression(r#"url().contains("shop.test")"#, Value::Null).unwrap());
        assert!(expression("output > 2", json!(3)).unwrap());
        assert!(!expression("output", json!("")).unwrap());
        assert!(expression(r#"exists("li[")"#, Value::Null).is_err());
    }
}
