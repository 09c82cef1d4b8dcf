//! Core data types for action primitives

use std::time::{Duration, Instant};

use action_flow::BehaviorFlags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default deadline for a single leaf action
pub const DEFAULT_ACTION_TIMEOUT_MS: u64 = 30_000;

/// Execution context for one primitive call
///
/// Carries the action identifier for tracing, the deadline derived from the
/// action's `timeout` and the behaviour flags forwarded to the driver.
#[derive(Debug, Clone)]
pub struct ExecCtx {
    /// Identifier used in logs (action id or `#index`)
    pub action_id: String,

    /// Deadline for this operation
    pub deadline: Instant,

    /// Timeout the deadline was derived from
    pub timeout_ms: u64,

    pub behavior: BehaviorFlags,
}

impl ExecCtx {
    /// Create a new execution context
    pub fn new(action_id: impl Into<String>, timeout_ms: Option<u64>, behavior: BehaviorFlags) -> Self {
        let timeout_ms = timeout_ms.unwrap_or(DEFAULT_ACTION_TIMEOUT_MS);
        Self {
            action_id: action_id.into(),
            deadline: Instant::now() + Duration::from_millis(timeout_ms),
            timeout_ms,
            behavior,
        }
    }

    /// Check if this context has exceeded its deadline
    pub fn is_timeout(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Get remaining time until deadline
    pub fn remaining_time(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Outcome of one primitive
///
/// `output` is what the interpreter stores in `block.output`; primitives
/// without a meaningful result leave it empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReport {
    /// When the action started
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,

    /// When the action finished
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub finished_at: DateTime<Utc>,

    /// Total latency in milliseconds
    pub latency_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl ActionReport {
    /// Create a successful action report
    pub fn success(started_at: DateTime<Utc>, start_instant: Instant) -> Self {
        Self {
            started_at,
            finished_at: Utc::now(),
            latency_ms: start_instant.elapsed().as_millis() as u64,
            output: None,
        }
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }
}

/// HTML and URL captured from the driver at one point in time.
///
/// Non-content nodes are stripped by the driver; open shadow roots appear as
/// `<template data-shadowroot>` children of their host when requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub html: String,
    pub url: String,
}

/// Scroll target specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScrollTarget {
    /// Scroll to top of page
    Top,

    /// Scroll to bottom of page
    Bottom,

    /// Scroll element matching a CSS selector into view
    Element(String),

    /// Scroll by pixel amount (positive=down, negative=up)
    Pixels(i32),
}

impl ScrollTarget {
    /// Builds a target from a `scroll` action's resolved fields.
    ///
    /// A selector wins over the amount; the amount accepts `top`, `bottom` or
    /// a signed pixel count, defaulting to one viewport step down.
    pub fn from_action(selector: Option<&str>, amount: Option<&str>) -> Result<Self, String> {
        if let Some(selector) = selector.map(str::trim).filter(|s| !s.is_empty()) {
            return Ok(ScrollTarget::Element(selector.to_string()));
        }
        match amount.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(ScrollTarget::Pixels(DEFAULT_SCROLL_PIXELS)),
            Some(text) if text.eq_ignore_ascii_case("top") => Ok(ScrollTarget::Top),
            Some(text) if text.eq_ignore_ascii_case("bottom") => Ok(ScrollTarget::Bottom),
            Some(text) => text
                .trim_end_matches("px")
                .parse::<f64>()
                .ok()
                .filter(|px| px.is_finite())
                .map(|px| ScrollTarget::Pixels(px.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32))
                .ok_or_else(|| format!("invalid scroll amount `{text}`")),
        }
    }
}

const DEFAULT_SCROLL_PIXELS: i32 = 500;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scroll_targets_parse() {
        assert_eq!(
            ScrollTarget::from_action(Some(" #footer "), Some("top")).unwrap(),
            ScrollTarget::Element("#footer".into())
        );
        assert_eq!(ScrollTarget::from_action(None, Some("Bottom")).unwrap(), ScrollTarget::Bottom);
        assert_eq!(ScrollTarget::from_action(None, Some("-250px")).unwrap(), ScrollTarget::Pixels(-250));
        assert_eq!(ScrollTarget::from_action(None, None).unwrap(), ScrollTarget::Pixels(500));
        assert!(ScrollTarget::from_action(None, Some("sideways")).is_err());
    }

    #[test]
    fn context_deadline() {
        let ctx = ExecCtx::new("a1", Some(0), BehaviorFlags::default());
        assert!(ctx.is_timeout());
        assert_eq!(ctx.remaining_time(), Duration::ZERO);

        let ctx = ExecCtx::new("a2", None, BehaviorFlags::default());
        assert_eq!(ctx.timeout_ms, DEFAULT_ACTION_TIMEOUT_MS);
        assert!(!ctx.is_timeout());
    }
}
