//! Action model: the wire format accepted from callers and the validated
//! instruction set the interpreter executes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FlowError;

/// Wire representation of one action, exactly as authored.
///
/// Unknown fields are rejected; per-type requirements are checked when the
/// spec is converted into an [`Action`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ActionSpec {
    /// Stable identifier used for progress reporting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Action type discriminator
    #[serde(rename = "type")]
    pub action_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var_name: Option<String>,

    /// Timeout in milliseconds (number or numeric string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_mode: Option<TypeMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_var: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_var_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_op: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_value: Option<Value>,

    /// Field delimiter for `csv` actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
}

/// How `type` actions treat existing field content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TypeMode {
    #[default]
    Replace,
    Append,
}

/// Kinds of block-start instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    If,
    While,
    Repeat,
    Foreach,
    OnError,
}

/// Typed comparison used by structured conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Boolean { negate: bool },
    Number(NumberOp),
    Text(TextOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberOp {
    Equals,
    NotEquals,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOp {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
}

impl Comparison {
    /// Resolves `conditionVarType` + `conditionOp` into a comparison.
    pub fn parse(var_type: &str, op: Option<&str>) -> Result<Self, String> {
        match var_type {
            "boolean" => match op.unwrap_or("is_true") {
                "is_true" => Ok(Comparison::Boolean { negate: false }),
                "is_false" => Ok(Comparison::Boolean { negate: true }),
                other => Err(format!("operator `{other}` is not valid for boolean conditions")),
            },
            "number" => {
                let op = match op.unwrap_or("equals") {
                    "equals" => NumberOp::Equals,
                    "not_equals" => NumberOp::NotEquals,
                    "gt" => NumberOp::Gt,
                    "gte" => NumberOp::Gte,
                    "lt" => NumberOp::Lt,
                    "lte" => NumberOp::Lte,
                    other => {
                        return Err(format!("operator `{other}` is not valid for number conditions"))
                    }
                };
                Ok(Comparison::Number(op))
            }
            "string" => {
                let op = match op.unwrap_or("equals") {
                    "equals" => TextOp::Equals,
                    "not_equals" => TextOp::NotEquals,
                    "contains" => TextOp::Contains,
                    "starts_with" => TextOp::StartsWith,
                    "ends_with" => TextOp::EndsWith,
                    "matches" => TextOp::Matches,
                    other => {
                        return Err(format!("operator `{other}` is not valid for string conditions"))
                    }
                };
                Ok(Comparison::Text(op))
            }
            other => Err(format!("unknown condition variable type `{other}`")),
        }
    }
}

/// Typed condition built from the `condition*` fields
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredCondition {
    /// Left-hand side; usually a bare `{$name}` reference
    pub var: String,
    /// Right-hand side template
    pub value: String,
    pub comparison: Comparison,
}

/// Condition attached to `if` and `while`
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Structured(StructuredCondition),
    /// Free-form boolean expression evaluated against the live page
    Expression(String),
}

/// Where a `foreach` takes its items from
#[derive(Debug, Clone, PartialEq)]
pub enum ForeachSource {
    /// Snapshot of the elements matching a CSS selector
    Selector(String),
    /// An array (or JSON array string) held in a variable
    Variable(String),
}

/// Validated instruction
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    If(Condition),
    Else,
    End,
    While(Condition),
    Repeat {
        count: String,
    },
    Foreach {
        source: ForeachSource,
        var_name: Option<String>,
    },
    OnError,
    Navigate {
        url: String,
    },
    Click {
        selector: String,
    },
    Type {
        selector: String,
        text: String,
        mode: TypeMode,
    },
    Hover {
        selector: String,
    },
    Press {
        key: String,
        selector: Option<String>,
    },
    Wait {
        selector: Option<String>,
        duration: Option<String>,
    },
    Select {
        selector: String,
        value: String,
    },
    Scroll {
        selector: Option<String>,
        amount: Option<String>,
    },
    Screenshot {
        label: Option<String>,
    },
    Javascript {
        script: String,
        var_name: Option<String>,
    },
    Csv {
        text: String,
        var_name: Option<String>,
        delimiter: u8,
    },
    Merge {
        sources: String,
        var_name: String,
    },
    Set {
        var_name: String,
        value: String,
    },
    Stop {
        outcome: String,
    },
    Start {
        task_id: String,
    },
}

impl ActionKind {
    /// Canonical type name
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::If(_) => "if",
            ActionKind::Else => "else",
            ActionKind::End => "end",
            ActionKind::While(_) => "while",
            ActionKind::Repeat { .. } => "repeat",
            ActionKind::Foreach { .. } => "foreach",
            ActionKind::OnError => "on_error",
            ActionKind::Navigate { .. } => "navigate",
            ActionKind::Click { .. } => "click",
            ActionKind::Type { .. } => "type",
            ActionKind::Hover { .. } => "hover",
            ActionKind::Press { .. } => "press",
            ActionKind::Wait { .. } => "wait",
            ActionKind::Select { .. } => "select",
            ActionKind::Scroll { .. } => "scroll",
            ActionKind::Screenshot { .. } => "screenshot",
            ActionKind::Javascript { .. } => "javascript",
            ActionKind::Csv { .. } => "csv",
            ActionKind::Merge { .. } => "merge",
            ActionKind::Set { .. } => "set",
            ActionKind::Stop { .. } => "stop",
            ActionKind::Start { .. } => "start",
        }
    }

    pub fn block_start(&self) -> Option<BlockKind> {
        match self {
            ActionKind::If(_) => Some(BlockKind::If),
            ActionKind::While(_) => Some(BlockKind::While),
            ActionKind::Repeat { .. } => Some(BlockKind::Repeat),
            ActionKind::Foreach { .. } => Some(BlockKind::Foreach),
            ActionKind::OnError => Some(BlockKind::OnError),
            _ => None,
        }
    }

    /// True for instructions delegated to the action executor
    pub fn is_leaf(&self) -> bool {
        self.block_start().is_none() && !matches!(self, ActionKind::Else | ActionKind::End)
    }
}

/// One validated, immutable instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ActionSpec", into = "ActionSpec")]
pub struct Action {
    pub id: Option<String>,
    pub disabled: bool,
    pub timeout_ms: Option<u64>,
    pub kind: ActionKind,
    source: ActionSpec,
}

impl Action {
    /// The spec this action was validated from.
    pub fn spec(&self) -> &ActionSpec {
        &self.source
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Label used in logs and progress events
    pub fn label(&self, index: usize) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!("#{index}"),
        }
    }
}

impl From<Action> for ActionSpec {
    fn from(action: Action) -> Self {
        action.source
    }
}

impl TryFrom<ActionSpec> for Action {
    type Error = String;

    fn try_from(spec: ActionSpec) -> Result<Self, Self::Error> {
        let kind = parse_kind(&spec)?;
        let timeout_ms = match &spec.timeout {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => Some(
                n.as_u64()
                    .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                    .ok_or_else(|| format!("invalid timeout `{n}`"))?,
            ),
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => Some(
                s.trim()
                    .parse::<u64>()
                    .map_err(|_| format!("invalid timeout `{s}`"))?,
            ),
            Some(other) => return Err(format!("invalid timeout `{other}`")),
        };
        Ok(Action {
            id: spec.id.clone().filter(|id| !id.is_empty()),
            disabled: spec.disabled.unwrap_or(false),
            timeout_ms,
            kind,
            source: spec,
        })
    }
}

/// Validates a whole program, reporting the index of the first bad action.
pub fn parse_actions(specs: Vec<ActionSpec>) -> Result<Vec<Action>, FlowError> {
    specs
        .into_iter()
        .enumerate()
        .map(|(index, spec)| Action::try_from(spec).map_err(|reason| FlowError::invalid(index, reason)))
        .collect()
}

/// Parses a JSON array of action objects.
pub fn parse_program(value: Value) -> Result<Vec<Action>, FlowError> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(FlowError::invalid(
                0,
                format!("program must be an array, got {}", json_kind(&other)),
            ))
        }
    };
    let mut specs = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let spec: ActionSpec =
            serde_json::from_value(item).map_err(|err| FlowError::invalid(index, err.to_string()))?;
        specs.push(spec);
    }
    parse_actions(specs)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Textual form of a JSON field; numbers and booleans are accepted where text is expected.
fn field_text(value: &Option<Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .filter(|text| !text.trim().is_empty())
        .cloned()
}

fn require(value: Option<String>, field: &str, action_type: &str) -> Result<String, String> {
    value
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| format!("`{action_type}` requires `{field}`"))
}

fn parse_condition(spec: &ActionSpec) -> Result<Condition, String> {
    let condition_var = non_blank(&spec.condition_var);
    let var_type = non_blank(&spec.condition_var_type);
    let op = non_blank(&spec.condition_op);
    let condition_value = field_text(&spec.condition_value).filter(|v| !v.is_empty());
    let structured = condition_var.is_some()
        || var_type.is_some()
        || op.is_some()
        || condition_value.is_some();

    if structured {
        let comparison = Comparison::parse(
            var_type.as_deref().map(str::trim).unwrap_or("string"),
            op.as_deref().map(str::trim),
        )?;
        return Ok(Condition::Structured(StructuredCondition {
            var: condition_var.unwrap_or_default(),
            value: condition_value.unwrap_or_default(),
            comparison,
        }));
    }

    match field_text(&spec.value) {
        Some(expr) if !expr.trim().is_empty() => Ok(Condition::Expression(expr)),
        _ => Err(format!(
            "`{}` requires a structured condition or an expression in `value`",
            spec.action_type
        )),
    }
}

fn parse_delimiter(raw: &Option<String>) -> Result<u8, String> {
    match raw.as_deref() {
        None | Some("") => Ok(b','),
        Some("tab") | Some("\\t") => Ok(b'\t'),
        Some(text) => {
            let bytes = text.as_bytes();
            if bytes.len() == 1 {
                Ok(bytes[0])
            } else {
                Err(format!("delimiter must be a single ASCII character, got `{text}`"))
            }
        }
    }
}

fn parse_kind(spec: &ActionSpec) -> Result<ActionKind, String> {
    let action_type = spec.action_type.trim();
    let value = field_text(&spec.value);
    let selector = non_blank(&spec.selector);
    let var_name = non_blank(&spec.var_name);

    let kind = match action_type {
        "if" => ActionKind::If(parse_condition(spec)?),
        "while" => ActionKind::While(parse_condition(spec)?),
        "else" => ActionKind::Else,
        "end" => ActionKind::End,
        "on_error" => ActionKind::OnError,
        "repeat" => ActionKind::Repeat {
            count: value.unwrap_or_else(|| "0".to_string()),
        },
        "foreach" => {
            let source = match (selector, value.filter(|v| !v.trim().is_empty())) {
                (Some(selector), _) => ForeachSource::Selector(selector),
                (None, Some(reference)) => ForeachSource::Variable(reference),
                (None, None) => {
                    return Err("`foreach` requires `selector` or a variable in `value`".into())
                }
            };
            ActionKind::Foreach { source, var_name }
        }
        "navigate" | "goto" => ActionKind::Navigate {
            url: require(value, "value", action_type)?,
        },
        "click" => ActionKind::Click {
            selector: require(selector, "selector", action_type)?,
        },
        "type" | "fill" => ActionKind::Type {
            selector: require(selector, "selector", action_type)?,
            text: value.unwrap_or_default(),
            mode: spec.type_mode.unwrap_or_default(),
        },
        "hover" => ActionKind::Hover {
            selector: require(selector, "selector", action_type)?,
        },
        "press" => ActionKind::Press {
            key: require(non_blank(&spec.key).or(value), "key", action_type)?,
            selector,
        },
        "wait" => ActionKind::Wait {
            selector,
            duration: value.filter(|v| !v.trim().is_empty()),
        },
        "select" => ActionKind::Select {
            selector: require(selector, "selector", action_type)?,
            value: require(value, "value", action_type)?,
        },
        "scroll" => ActionKind::Scroll {
            selector,
            amount: value.filter(|v| !v.trim().is_empty()),
        },
        "screenshot" => ActionKind::Screenshot {
            label: value.filter(|v| !v.trim().is_empty()),
        },
        "javascript" => ActionKind::Javascript {
            script: require(value, "value", action_type)?,
            var_name,
        },
        "csv" => ActionKind::Csv {
            text: require(value, "value", action_type)?,
            var_name,
            delimiter: parse_delimiter(&spec.delimiter)?,
        },
        "merge" => ActionKind::Merge {
            sources: require(value, "value", action_type)?,
            var_name: require(var_name, "varName", action_type)?,
        },
        "set" => ActionKind::Set {
            var_name: require(var_name, "varName", action_type)?,
            value: value.unwrap_or_default(),
        },
        "stop" => ActionKind::Stop {
            outcome: value.unwrap_or_else(|| "success".to_string()),
        },
        "start" => ActionKind::Start {
            task_id: require(value, "value", action_type)?,
        },
        other => return Err(format!("unknown action type `{other}`")),
    };
    Ok(kind)
}
