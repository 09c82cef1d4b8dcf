//! Out-of-process evaluation over a line-oriented JSON protocol.
//!
//! Each request is one JSON line on the worker's stdin and is answered by
//! one JSON line on stdout. The client spawns a fresh worker per call and
//! kills it when the deadline passes.

use std::ffi::OsString;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::SandboxConfig;
use crate::engine::SandboxEngine;
use crate::errors::SandboxError;
use crate::{ExpressionRequest, ScriptOutput, ScriptRequest, ScriptSandbox};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerRequest {
    Script(ScriptRequest),
    Expression(ExpressionRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub ok: bool,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerResponse {
    fn failure(message: String, logs: Vec<String>) -> Self {
        Self {
            ok: false,
            result: Value::Null,
            logs,
            error: Some(message),
        }
    }
}

fn handle(engine: &SandboxEngine, line: &str) -> WorkerResponse {
    let request: WorkerRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(err) => return WorkerResponse::failure(format!("malformed request: {err}"), Vec::new()),
    };
    match request {
        WorkerRequest::Script(request) => match engine.run_script(&request) {
            (Ok(result), logs) => WorkerResponse {
                ok: true,
                result,
                logs,
                error: None,
            },
            (Err(err), logs) => WorkerResponse::failure(err.to_string(), logs),
        },
        WorkerRequest::Expression(request) => match engine.evaluate_expression(&request) {
            Ok(truth) => WorkerResponse {
                ok: true,
                result: Value::Bool(truth),
                logs: Vec::new(),
                error: None,
            },
            Err(err) => WorkerResponse::failure(err.to_string(), Vec::new()),
        },
    }
}

/// Worker loop: answers every non-empty request line until EOF.
pub fn serve_lines<R: BufRead, W: Write>(
    config: SandboxConfig,
    reader: R,
    mut writer: W,
) -> std::io::Result<()> {
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let engine = SandboxEngine::new(config.clone());
        let response = handle(&engine, &line);
        serde_json::to_writer(&mut writer, &response)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    Ok(())
}

/// Client side: one worker process per request.
#[derive(Debug, Clone)]
pub struct WorkerSandbox {
    program: PathBuf,
    args: Vec<OsString>,
    timeout_ms: u64,
}

impl WorkerSandbox {
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>, timeout_ms: u64) -> Self {
        Self {
            program: program.into(),
            args,
            timeout_ms,
        }
    }

    async fn call(&self, request: &WorkerRequest) -> Result<WorkerResponse, SandboxError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        debug!(program = %self.program.display(), pid = ?child.id(), "Spawned sandbox worker");

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SandboxError::Worker("worker stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::Worker("worker stdout unavailable".into()))?;

        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        drop(stdin);

        let mut lines = BufReader::new(stdout).lines();
        match timeout(Duration::from_millis(self.timeout_ms), lines.next_line()).await {
            Ok(Ok(Some(reply))) => {
                let _ = child.wait().await;
                Ok(serde_json::from_str(&reply)?)
            }
            Ok(Ok(None)) => Err(SandboxError::Worker(
                "worker exited without a response".into(),
            )),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => {
                warn!(timeout_ms = self.timeout_ms, "Killing unresponsive sandbox worker");
                let _ = child.kill().await;
                Err(SandboxError::Timeout(self.timeout_ms))
            }
        }
    }
}

#[async_trait]
impl ScriptSandbox for WorkerSandbox {
    async fn run_script(&self, request: ScriptRequest) -> ScriptOutput {
        match self.call(&WorkerRequest::Script(request)).await {
            Ok(response) if response.ok => ScriptOutput {
                result: response.result,
                logs: response.logs,
                error: None,
            },
            Ok(response) => ScriptOutput::failed(
                SandboxError::Runtime(response.error.unwrap_or_else(|| "unknown error".into())),
                response.logs,
            ),
            Err(err) => ScriptOutput::failed(err, Vec::new()),
        }
    }

    async fn evaluate_expression(&self, request: ExpressionRequest) -> Result<bool, SandboxError> {
        let response = self.call(&WorkerRequest::Expression(request)).await?;
        if !response.ok {
            return Err(SandboxError::Runtime(
                response.error.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        Ok(response.result.as_bool().unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    fn serve(input: &str) -> Vec<WorkerResponse> {
        let mut out = Vec::new();
        serve_lines(SandboxConfig::default(), Cursor::new(input.as_bytes()), &mut out).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn worker_answers_each_line() {
        let script = serde_json::to_string(&WorkerRequest::Script(ScriptRequest {
            script: r#"console.log("x"); document.title"#.into(),
            html: "<title>T</title>".into(),
            url: "https://a.test".into(),
            include_shadow_dom: false,
        }))
        .unwrap();
        let expression = serde_json::to_string(&WorkerRequest::Expression(ExpressionRequest {
            expression: "url() == \"https://a.test\"".into(),
            html: String::new(),
            url: "https://a.test".into(),
            block_output: Value::Null,
        }))
        .unwrap();

        let responses = serve(&format!("{script}\n\n{expression}\nnot json\n"));

        assert_eq!(responses.len(), 3);
        assert!(responses[0].ok);
        assert_eq!(responses[0].result, json!("T"));
        assert_eq!(responses[0].logs, vec!["x"]);
        assert_eq!(responses[1].result, json!(true));
        assert!(!responses[2].ok);
        assert!(responses[2].error.as_deref().unwrap_or("").contains("malformed"));
    }

    #[test]
    fn requests_are_tagged_by_kind() {
        let raw = json!({"kind": "expression", "expression": "true", "html": "", "url": ""});
        let request: WorkerRequest = serde_json::from_value(raw).unwrap();
        assert!(matches!(request, WorkerRequest::Expression(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unresponsive_workers_are_killed() {
        let sandbox = WorkerSandbox::new("sleep", vec!["5".into()], 200);
        let output = sandbox
            .run_script(ScriptRequest {
                script: "1".into(),
                html: String::new(),
                url: String::new(),
                include_shadow_dom: false,
            })
            .await;
        assert!(output.result.as_str().unwrap_or("").contains("timed out"));
    }

    #[tokio::test]
    async fn missing_worker_binary_is_a_script_error() {
        let sandbox = WorkerSandbox::new("/nonexistent/browserflow-worker", Vec::new(), 200);
        let output = sandbox
            .run_script(ScriptRequest {
                script: "1".into(),
                html: String::new(),
                url: String::new(),
                include_shadow_dom: false,
            })
            .await;
        assert!(output.is_error());
    }
}
