//! Browser driver seam
//!
//! Every page interaction performed by a leaf action goes through a
//! [`BrowserDriver`]. Implementations own the browser session; primitives
//! only describe what to do and validate the inputs.

use async_trait::async_trait;
use serde_json::Value;

use action_flow::TypeMode;

use crate::errors::ActionError;
use crate::types::{ExecCtx, PageSnapshot, ScrollTarget};

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate to a URL and wait for the page to settle
    async fn navigate(&self, ctx: &ExecCtx, url: &str) -> Result<(), ActionError>;

    /// Click the first element matching `selector`
    async fn click(&self, ctx: &ExecCtx, selector: &str) -> Result<(), ActionError>;

    /// Type into a field, replacing or appending to its content
    async fn type_text(
        &self,
        ctx: &ExecCtx,
        selector: &str,
        text: &str,
        mode: TypeMode,
    ) -> Result<(), ActionError>;

    async fn hover(&self, ctx: &ExecCtx, selector: &str) -> Result<(), ActionError>;

    /// Press a key, optionally focused on an element first
    async fn press(&self, ctx: &ExecCtx, key: &str, selector: Option<&str>) -> Result<(), ActionError>;

    /// Select an option by value or visible text
    async fn select(&self, ctx: &ExecCtx, selector: &str, value: &str) -> Result<(), ActionError>;

    async fn scroll(&self, ctx: &ExecCtx, target: &ScrollTarget) -> Result<(), ActionError>;

    /// Resolves once an element matching `selector` is present
    async fn wait_for_selector(&self, ctx: &ExecCtx, selector: &str) -> Result<(), ActionError>;

    /// Captures the viewport and returns where the image is stored
    async fn screenshot(&self, ctx: &ExecCtx, label: Option<&str>) -> Result<String, ActionError>;

    /// HTML snapshot of the current page
    async fn snapshot(&self, include_shadow_dom: bool) -> Result<PageSnapshot, ActionError>;

    /// `{index, text, html}` for each element matching `selector`
    async fn collect(&self, selector: &str) -> Result<Vec<Value>, ActionError>;

    async fn current_url(&self) -> Result<String, ActionError>;

    /// Release the session; called once when the run ends.
    async fn close(&self) -> Result<(), ActionError> {
        Ok(())
    }
}
