use crate::error::{HarvestError, Result};
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Anchors found by one selector pass over a page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectedLinks {
    /// Elements matched by the selector, with or without an href
    pub matched: usize,
    /// Absolute link targets of the matched elements
    pub links: HashSet<String>,
}

/// Check that a CSS selector parses
pub fn validate_selector(selector: &str) -> Result<()> {
    parse_selector(selector).map(|_| ())
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| HarvestError::Configuration(format!("invalid selector '{selector}': {e}")))
}

/// Select elements in `html` and collect their href targets
///
/// Relative hrefs are resolved against `page_url`. Empty hrefs, and relative
/// ones that cannot be resolved, are skipped.
pub fn select_links(html: &str, selector: &str, page_url: Option<&str>) -> Result<SelectedLinks> {
    let parsed = parse_selector(selector)?;
    let base = page_url.and_then(|u| Url::parse(u).ok());
    let doc = Html::parse_document(html);

    let mut selected = SelectedLinks::default();
    for element in doc.select(&parsed) {
        selected.matched += 1;
        let Some(href) = element.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty() {
            continue;
        }
        if let Some(link) = resolve(base.as_ref(), href) {
            selected.links.insert(link);
        }
    }

    // Log the number of links found
    ::log::debug!(
        "Selector '{}' matched {} elements with {} links",
        selector,
        selected.matched,
        selected.links.len()
    );

    Ok(selected)
}

fn resolve(base: Option<&Url>, href: &str) -> Option<String> {
    match base {
        Some(base) => base.join(href).ok().map(|u| u.to_string()),
        None => Url::parse(href).ok().map(|u| u.to_string()),
    }
}
