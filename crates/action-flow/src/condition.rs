//! Structured condition evaluation.

use regex::RegexBuilder;
use serde_json::Value;
use tracing::debug;

use crate::types::{Comparison, NumberOp, StructuredCondition, TextOp};
use crate::vars::{display_value, parse_value, to_number, truthy, RuntimeVars};

/// Compiled-program size cap for `matches` patterns.
const REGEX_SIZE_LIMIT: usize = 1 << 20;
/// Longest subject text a `matches` condition will scan.
const REGEX_MAX_SUBJECT: usize = 1 << 20;

/// Evaluates a typed condition against the current variables.
///
/// The left-hand side keeps its type when it is a bare reference; the
/// right-hand side is always template-resolved text.
pub fn evaluate(condition: &StructuredCondition, vars: &RuntimeVars) -> bool {
    let left = vars
        .lookup_bare(&condition.var)
        .unwrap_or_else(|| Value::String(vars.resolve(&condition.var)));
    let right = vars.resolve(&condition.value);

    match condition.comparison {
        Comparison::Boolean { negate } => {
            let truth = match &left {
                Value::String(text) => truthy(&parse_value(text)),
                other => truthy(other),
            };
            truth != negate
        }
        Comparison::Number(op) => {
            let l = to_number(&left);
            let r = to_number(&Value::String(right));
            if !l.is_finite() || !r.is_finite() {
                return false;
            }
            match op {
                NumberOp::Equals => l == r,
                NumberOp::NotEquals => l != r,
                NumberOp::Gt => l > r,
                NumberOp::Gte => l >= r,
                NumberOp::Lt => l < r,
                NumberOp::Lte => l <= r,
            }
        }
        Comparison::Text(op) => {
            let l = display_value(&left);
            match op {
                TextOp::Equals => l == right,
                TextOp::NotEquals => l != right,
                TextOp::Contains => l.contains(&right),
                TextOp::StartsWith => l.starts_with(&right),
                TextOp::EndsWith => l.ends_with(&right),
                TextOp::Matches => regex_matches(&right, &l),
            }
        }
    }
}

/// Bounded regex match; invalid or oversized patterns never match.
///
/// The `regex` engine runs in linear time, so the bounds here cap compile
/// cost and subject length rather than backtracking.
fn regex_matches(pattern: &str, subject: &str) -> bool {
    if subject.len() > REGEX_MAX_SUBJECT {
        debug!(len = subject.len(), "matches subject too long");
        return false;
    }
    match RegexBuilder::new(pattern)
        .size_limit(REGEX_SIZE_LIMIT)
        .dfa_size_limit(REGEX_SIZE_LIMIT)
        .build()
    {
        Ok(regex) => regex.is_match(subject),
        Err(err) => {
            debug!(pattern, error = %err, "matches pattern rejected");
            false
        }
    }
}
