//! Offline [`BrowserDriver`] over fixed HTML documents
//!
//! Pages are registered by URL. Interactions validate their selectors against
//! the current document and update an in-memory page state; nothing is ever
//! rendered. Clicking a link whose target is a registered page loads it.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use action_flow::TypeMode;

use crate::driver::BrowserDriver;
use crate::errors::ActionError;
use crate::types::{ExecCtx, PageSnapshot, ScrollTarget};

const NON_CONTENT: &str = "script, style, noscript";
const SHADOW_TEMPLATES: &str = "template[data-shadowroot]";
const BOTTOM_OFFSET: i64 = i64::MAX / 2;

#[derive(Debug, Default)]
struct PageState {
    url: String,
    html: String,
    fields: HashMap<String, String>,
    selections: HashMap<String, String>,
    scroll_y: i64,
    keys: Vec<String>,
    screenshots: Vec<String>,
    closed: bool,
}

#[derive(Debug, Default)]
pub struct StaticPageDriver {
    pages: DashMap<String, String>,
    state: Mutex<PageState>,
}

impl StaticPageDriver {
    /// Driver showing `html` at `url`, also registered as a page.
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        let url = url.into();
        let html = html.into();
        let driver = Self::default();
        driver.pages.insert(url.clone(), html.clone());
        {
            let mut state = driver.state.lock();
            state.url = url;
            state.html = html;
        }
        driver
    }

    /// Driver showing an HTML file under its `file://` URL.
    pub fn from_file(path: &Path) -> Result<Self, ActionError> {
        let html = std::fs::read_to_string(path)
            .map_err(|err| ActionError::Driver(format!("cannot read {}: {err}", path.display())))?;
        let absolute = path
            .canonicalize()
            .map_err(|err| ActionError::Driver(format!("cannot resolve {}: {err}", path.display())))?;
        let url = Url::from_file_path(&absolute)
            .map(|url| url.to_string())
            .map_err(|_| ActionError::Driver(format!("cannot build a URL for {}", absolute.display())))?;
        Ok(Self::new(url, html))
    }

    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }

    /// Current content of a field typed into with `selector`
    pub fn field_value(&self, selector: &str) -> Option<String> {
        self.state.lock().fields.get(selector.trim()).cloned()
    }

    pub fn selected_value(&self, selector: &str) -> Option<String> {
        self.state.lock().selections.get(selector.trim()).cloned()
    }

    pub fn scroll_position(&self) -> i64 {
        self.state.lock().scroll_y
    }

    pub fn pressed_keys(&self) -> Vec<String> {
        self.state.lock().keys.clone()
    }

    pub fn screenshots(&self) -> Vec<String> {
        self.state.lock().screenshots.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn open_state(&self) -> Result<parking_lot::MutexGuard<'_, PageState>, ActionError> {
        let state = self.state.lock();
        if state.closed {
            return Err(ActionError::Driver("session is closed".to_string()));
        }
        Ok(state)
    }

    fn load(&self, state: &mut PageState, url: &str) {
        match self.pages.get(url) {
            Some(page) => {
                state.html = page.value().clone();
                state.fields.clear();
                state.selections.clear();
                state.scroll_y = 0;
            }
            None => debug!(url, "URL not registered; keeping current document"),
        }
        state.url = url.to_string();
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ActionError> {
    Selector::parse(selector.trim())
        .map_err(|err| ActionError::InvalidSelector(format!("`{}`: {err:?}", selector.trim())))
}

fn require_element(html: &str, selector: &str) -> Result<(), ActionError> {
    let parsed = parse_selector(selector)?;
    let document = Html::parse_document(html);
    let found = document.select(&parsed).next().is_some();
    if found {
        Ok(())
    } else {
        Err(ActionError::ElementNotFound(selector.trim().to_string()))
    }
}

fn collapse_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Link target of the first match, when it is an anchor with an `href`.
fn link_target(html: &str, selector: &str, base: &str) -> Result<Option<String>, ActionError> {
    let parsed = parse_selector(selector)?;
    let document = Html::parse_document(html);
    let element = document
        .select(&parsed)
        .next()
        .ok_or_else(|| ActionError::ElementNotFound(selector.trim().to_string()))?;
    if element.value().name() != "a" {
        return Ok(None);
    }
    let Some(href) = element.value().attr("href") else {
        return Ok(None);
    };
    let target = match Url::parse(base) {
        Ok(base) => base.join(href).map(|url| url.to_string()).unwrap_or_else(|_| href.to_string()),
        Err(_) => href.to_string(),
    };
    Ok(Some(target))
}

fn initial_field_value(html: &str, selector: &str) -> Result<String, ActionError> {
    let parsed = parse_selector(selector)?;
    let document = Html::parse_document(html);
    let element = document
        .select(&parsed)
        .next()
        .ok_or_else(|| ActionError::ElementNotFound(selector.trim().to_string()))?;
    let value = match element.value().name() {
        "textarea" => element.text().collect::<String>(),
        _ => element.value().attr("value").unwrap_or_default().to_string(),
    };
    Ok(value)
}

fn matching_option(html: &str, selector: &str, wanted: &str) -> Result<String, ActionError> {
    let parsed = parse_selector(selector)?;
    let option_selector = parse_selector("option")?;
    let document = Html::parse_document(html);
    let element = document
        .select(&parsed)
        .next()
        .ok_or_else(|| ActionError::ElementNotFound(selector.trim().to_string()))?;
    if element.value().name() != "select" {
        return Err(ActionError::OptionNotFound(format!(
            "`{}` is a <{}>, not a <select>",
            selector.trim(),
            element.value().name()
        )));
    }
    let options: Vec<(String, String)> = element
        .select(&option_selector)
        .map(|option| {
            let text = collapse_text(option);
            let value = option.value().attr("value").map(str::to_string).unwrap_or_else(|| text.clone());
            (value, text)
        })
        .collect();
    options
        .iter()
        .find(|(value, _)| value == wanted)
        .or_else(|| options.iter().find(|(_, text)| text == wanted.trim()))
        .map(|(value, _)| value.clone())
        .ok_or_else(|| ActionError::OptionNotFound(wanted.to_string()))
}

fn collect_elements(html: &str, selector: &str) -> Result<Vec<Value>, ActionError> {
    let parsed = parse_selector(selector)?;
    let document = Html::parse_document(html);
    Ok(document
        .select(&parsed)
        .enumerate()
        .map(|(index, element)| {
            json!({
                "index": index,
                "text": collapse_text(element),
                "html": element.html(),
            })
        })
        .collect())
}

/// Serialises `html` without non-content nodes, and without shadow-root
/// templates unless requested.
pub fn strip_non_content(html: &str, include_shadow_dom: bool) -> String {
    let mut document = Html::parse_document(html);
    let mut removed = Vec::new();
    if let Ok(selector) = Selector::parse(NON_CONTENT) {
        removed.extend(document.select(&selector).map(|element| element.id()));
    }
    if !include_shadow_dom {
        if let Ok(selector) = Selector::parse(SHADOW_TEMPLATES) {
            removed.extend(document.select(&selector).map(|element| element.id()));
        }
    }
    for id in removed {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
    document.html()
}

#[async_trait]
impl BrowserDriver for StaticPageDriver {
    async fn navigate(&self, ctx: &ExecCtx, url: &str) -> Result<(), ActionError> {
        let mut state = self.open_state()?;
        debug!(action_id = %ctx.action_id, url, "Static navigation");
        self.load(&mut state, url);
        Ok(())
    }

    async fn click(&self, ctx: &ExecCtx, selector: &str) -> Result<(), ActionError> {
        let mut state = self.open_state()?;
        let target = link_target(&state.html, selector, &state.url)?;
        if let Some(target) = target.filter(|url| self.pages.contains_key(url)) {
            debug!(action_id = %ctx.action_id, %target, "Following link");
            self.load(&mut state, &target);
        }
        Ok(())
    }

    async fn type_text(
        &self,
        _ctx: &ExecCtx,
        selector: &str,
        text: &str,
        mode: TypeMode,
    ) -> Result<(), ActionError> {
        let mut state = self.open_state()?;
        let key = selector.trim().to_string();
        let current = match state.fields.get(&key) {
            Some(value) => value.clone(),
            None => initial_field_value(&state.html, selector)?,
        };
        let next = match mode {
            TypeMode::Replace => text.to_string(),
            TypeMode::Append => format!("{current}{text}"),
        };
        state.fields.insert(key, next);
        Ok(())
    }

    async fn hover(&self, _ctx: &ExecCtx, selector: &str) -> Result<(), ActionError> {
        let state = self.open_state()?;
        require_element(&state.html, selector)
    }

    async fn press(&self, _ctx: &ExecCtx, key: &str, selector: Option<&str>) -> Result<(), ActionError> {
        let mut state = self.open_state()?;
        if let Some(selector) = selector {
            require_element(&state.html, selector)?;
        }
        state.keys.push(key.to_string());
        Ok(())
    }

    async fn select(&self, _ctx: &ExecCtx, selector: &str, value: &str) -> Result<(), ActionError> {
        let mut state = self.open_state()?;
        let chosen = matching_option(&state.html, selector, value)?;
        state.selections.insert(selector.trim().to_string(), chosen);
        Ok(())
    }

    async fn scroll(&self, _ctx: &ExecCtx, target: &ScrollTarget) -> Result<(), ActionError> {
        let mut state = self.open_state()?;
        state.scroll_y = match target {
            ScrollTarget::Top => 0,
            ScrollTarget::Bottom => BOTTOM_OFFSET,
            ScrollTarget::Pixels(delta) => state.scroll_y.saturating_add(i64::from(*delta)).max(0),
            ScrollTarget::Element(selector) => {
                require_element(&state.html, selector)?;
                state.scroll_y
            }
        };
        Ok(())
    }

    /// The document never changes, so a missing element fails right away.
    async fn wait_for_selector(&self, _ctx: &ExecCtx, selector: &str) -> Result<(), ActionError> {
        let state = self.open_state()?;
        require_element(&state.html, selector).map_err(|err| match err {
            ActionError::ElementNotFound(selector) => {
                ActionError::WaitTimeout(format!("`{selector}` is not on the static page"))
            }
            other => other,
        })
    }

    async fn screenshot(&self, _ctx: &ExecCtx, label: Option<&str>) -> Result<String, ActionError> {
        let mut state = self.open_state()?;
        let location = format!(
            "static://{}-{}",
            label.unwrap_or("page"),
            state.screenshots.len() + 1
        );
        state.screenshots.push(location.clone());
        Ok(location)
    }

    async fn snapshot(&self, include_shadow_dom: bool) -> Result<PageSnapshot, ActionError> {
        let state = self.open_state()?;
        Ok(PageSnapshot {
            html: strip_non_content(&state.html, include_shadow_dom),
            url: state.url.clone(),
        })
    }

    async fn collect(&self, selector: &str) -> Result<Vec<Value>, ActionError> {
        let state = self.open_state()?;
        collect_elements(&state.html, selector)
    }

    async fn current_url(&self) -> Result<String, ActionError> {
        Ok(self.open_state()?.url.clone())
    }

    async fn close(&self) -> Result<(), ActionError> {
        self.state.lock().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_flow::BehaviorFlags;

    const PAGE: &str = r#"<html><head><title>Shop</title><script>track()</script></head><body>
        <ul><li class="item">Apple</li><li class="item">Pear <b>ripe</b></li></ul>
        <input id="q" value="fruit">
        <select id="size"><option value="s">Small</option><option value="l">Large</option></select>
        <a id="next" href="/page/2">Next</a>
        <div id="host"><template data-shadowroot="open"><p>inner</p></template></div>
    </body></html>"#;

    fn ctx() -> ExecCtx {
        ExecCtx::new("t", None, BehaviorFlags::default())
    }

    fn driver() -> StaticPageDriver {
        StaticPageDriver::new("https://shop.test/page/1", PAGE)
            .with_page("https://shop.test/page/2", "<h1>Second</h1>")
    }

    #[tokio::test]
    async fn collects_matching_elements() {
        let items = driver().collect("li.item").await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["index"], json!(1));
        assert_eq!(items[1]["text"], json!("Pear ripe"));
        assert!(items[0]["html"].as_str().unwrap().starts_with("<li"));
    }

    #[tokio::test]
    async fn typing_tracks_field_values() {
        let driver = driver();
        driver.type_text(&ctx(), "#q", " salad", TypeMode::Append).await.unwrap();
        assert_eq!(driver.field_value("#q").as_deref(), Some("fruit salad"));
        driver.type_text(&ctx(), "#q", "nuts", TypeMode::Replace).await.unwrap();
        assert_eq!(driver.field_value("#q").as_deref(), Some("nuts"));

        let err = driver.type_text(&ctx(), "#missing", "x", TypeMode::Replace).await.unwrap_err();
        assert!(matches!(err, ActionError::ElementNotFound(_)));
    }

    #[tokio::test]
    async fn select_matches_value_or_text() {
        let driver = driver();
        driver.select(&ctx(), "#size", "Large").await.unwrap();
        assert_eq!(driver.selected_value("#size").as_deref(), Some("l"));
        let err = driver.select(&ctx(), "#size", "XL").await.unwrap_err();
        assert!(matches!(err, ActionError::OptionNotFound(_)));
        let err = driver.select(&ctx(), "#q", "s").await.unwrap_err();
        assert!(matches!(err, ActionError::OptionNotFound(_)));
    }

    #[tokio::test]
    async fn clicking_a_registered_link_loads_it() {
        let driver = driver();
        driver.click(&ctx(), "#next").await.unwrap();
        assert_eq!(driver.current_url().await.unwrap(), "https://shop.test/page/2");
        assert!(driver.snapshot(false).await.unwrap().html.contains("Second"));
    }

    #[tokio::test]
    async fn unknown_urls_keep_the_document() {
        let driver = driver();
        driver.navigate(&ctx(), "https://elsewhere.test/").await.unwrap();
        assert_eq!(driver.current_url().await.unwrap(), "https://elsewhere.test/");
        assert!(driver.snapshot(false).await.unwrap().html.contains("Apple"));
    }

    #[tokio::test]
    async fn snapshots_strip_scripts_and_optional_shadow_roots() {
        let driver = driver();
        let plain = driver.snapshot(false).await.unwrap();
        assert!(!plain.html.contains("track()"));
        assert!(!plain.html.contains("inner"));
        let deep = driver.snapshot(true).await.unwrap();
        assert!(deep.html.contains("inner"));
    }

    #[tokio::test]
    async fn scroll_wait_and_screenshots() {
        let driver = driver();
        driver.scroll(&ctx(), &ScrollTarget::Pixels(300)).await.unwrap();
        driver.scroll(&ctx(), &ScrollTarget::Pixels(-500)).await.unwrap();
        assert_eq!(driver.scroll_position(), 0);
        assert!(driver.scroll(&ctx(), &ScrollTarget::Element("#nope".into())).await.is_err());

        assert!(driver.wait_for_selector(&ctx(), "li").await.is_ok());
        let err = driver.wait_for_selector(&ctx(), ".late").await.unwrap_err();
        assert!(matches!(err, ActionError::WaitTimeout(_)));

        assert_eq!(driver.screenshot(&ctx(), Some("cart")).await.unwrap(), "static://cart-1");
        assert_eq!(driver.screenshot(&ctx(), None).await.unwrap(), "static://page-2");
    }

    #[tokio::test]
    async fn closed_sessions_reject_calls() {
        let driver = driver();
        driver.close().await.unwrap();
        assert!(driver.is_closed());
        assert!(driver.current_url().await.is_err());
    }
}
