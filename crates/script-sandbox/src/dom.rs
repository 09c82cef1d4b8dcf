//! Read-only DOM surface over a parsed HTML snapshot.
//!
//! Shadow roots arrive serialised as `<template data-shadowroot>` elements.
//! Plain queries and text never see inside them; the `deep` variants do.

use std::rc::Rc;

use rhai::{Dynamic, Map};
use scraper::{ElementRef, Html, Selector};

pub const SHADOW_ROOT_ATTR: &str = "data-shadowroot";

/// Parsed document shared by every binding of one script invocation.
#[derive(Clone)]
pub struct DomDocument {
    html: Rc<Html>,
}

impl DomDocument {
    pub fn parse(markup: &str) -> Self {
        Self {
            html: Rc::new(Html::parse_document(markup)),
        }
    }

    pub fn query_all(&self, selector: &str, deep: bool) -> Result<Vec<ElementRef<'_>>, String> {
        let selector = parse_selector(selector)?;
        Ok(self
            .html
            .select(&selector)
            .filter(|element| deep || !in_shadow_tree(element))
            .collect())
    }

    pub fn query_first(&self, selector: &str) -> Result<Option<ElementRef<'_>>, String> {
        Ok(self.query_all(selector, false)?.into_iter().next())
    }

    pub fn title(&self) -> String {
        self.query_first("title")
            .ok()
            .flatten()
            .map(|title| element_text(title, false).trim().to_string())
            .unwrap_or_default()
    }

    pub fn text_content(&self, deep: bool) -> String {
        element_text(self.html.root_element(), deep)
    }

    pub fn outer_html(&self) -> String {
        self.html.root_element().html()
    }

    pub fn query_maps(&self, selector: &str, deep: bool) -> Result<Vec<Dynamic>, String> {
        Ok(self
            .query_all(selector, deep)?
            .into_iter()
            .map(|element| Dynamic::from(element_map(element, deep)))
            .collect())
    }
}

fn parse_selector(selector: &str) -> Result<Selector, String> {
    Selector::parse(selector).map_err(|_| format!("invalid selector `{selector}`"))
}

fn is_shadow_root(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    value.name() == "template" && value.attr(SHADOW_ROOT_ATTR).is_some()
}

fn in_shadow_tree(element: &ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| is_shadow_root(&ancestor))
}

/// Concatenated descendant text, optionally skipping shadow templates.
pub fn element_text(element: ElementRef<'_>, deep: bool) -> String {
    let mut out = String::new();
    collect_text(element, deep, &mut out);
    out
}

fn collect_text(element: ElementRef<'_>, deep: bool, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child) {
            if !deep && is_shadow_root(&child) {
                continue;
            }
            collect_text(child, deep, out);
        }
    }
}

/// Plain-data view of an element handed to scripts.
pub fn element_map(element: ElementRef<'_>, deep: bool) -> Map {
    let value = element.value();
    let mut attrs = Map::new();
    for (name, attr) in value.attrs() {
        attrs.insert(name.into(), Dynamic::from(attr.to_string()));
    }

    let mut map = Map::new();
    map.insert("tag".into(), Dynamic::from(value.name().to_string()));
    map.insert(
        "text".into(),
        Dynamic::from(element_text(element, deep).trim().to_string()),
    );
    map.insert("html".into(), Dynamic::from(element.html()));
    map.insert("innerHTML".into(), Dynamic::from(element.inner_html()));
    map.insert(
        "id".into(),
        Dynamic::from(value.id().unwrap_or_default().to_string()),
    );
    map.insert(
        "className".into(),
        Dynamic::from(value.attr("class").unwrap_or_default().to_string()),
    );
    map.insert("attrs".into(), Dynamic::from(attrs));
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title> Shop </title></head><body>
        <ul><li class="item" id="a">One</li><li class="item">Two</li></ul>
        <div id="host"><template data-shadowroot="open"><span class="item">Hidden</span></template></div>
    </body></html>"#;

    #[test]
    fn plain_queries_skip_shadow_content() {
        let dom = DomDocument::parse(PAGE);
        assert_eq!(dom.query_all(".item", false).unwrap().len(), 2);
        assert_eq!(dom.query_all(".item", true).unwrap().len(), 3);
        assert!(!dom.text_content(false).contains("Hidden"));
        assert!(dom.text_content(true).contains("Hidden"));
        assert_eq!(dom.title(), "Shop");
    }

    #[test]
    fn element_maps_are_plain_data() {
        let dom = DomDocument::parse(PAGE);
        let first = dom.query_first("li").unwrap().unwrap();
        let map = element_map(first, false);
        assert_eq!(map["tag"].clone().into_string().unwrap(), "li");
        assert_eq!(map["text"].clone().into_string().unwrap(), "One");
        assert_eq!(map["id"].clone().into_string().unwrap(), "a");
        assert_eq!(map["className"].clone().into_string().unwrap(), "item");
    }

    #[test]
    fn invalid_selectors_are_reported() {
        let dom = DomDocument::parse(PAGE);
        assert!(dom.query_all("li[", false).is_err());
    }
}
