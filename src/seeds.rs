//! Turns a harvest request into independent seed tasks.
//!
//! With `multiple_targets` set, the configuration lists are paired
//! element-wise: base URL *i* goes with selector *i*, template or next-button
//! selector *i* and page limit *i*. Pairing stops at the shortest list, so
//! surplus entries of longer lists are dropped (with a warning).

use crate::config::{HarvestRequest, HarvestSettings, StrategyKind};
use crate::error::{HarvestError, Result};
use crate::parsers::html;
use crate::utils::PAGE_NUMBER_PLACEHOLDER;

/// Page limit used when the request does not give one
pub const DEFAULT_MAX_PAGES: u32 = 5;

/// Closed configuration for each exploration strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    TemplatePagination {
        template: String,
        max_pages: u32,
    },
    NextButton {
        selector: String,
        max_pages: u32,
    },
    ScrollLoadMore {
        load_more_selector: Option<String>,
        has_button: bool,
        footer_selector: Option<String>,
        max_scrolls: u32,
        max_repeats: u32,
    },
    /// Handled by the registered custom strategy hook, if any
    Custom,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::TemplatePagination { .. } => "template pagination",
            Strategy::NextButton { .. } => "next-button pagination",
            Strategy::ScrollLoadMore { .. } => "scroll/load-more",
            Strategy::Custom => "custom",
        }
    }
}

/// One independent unit of harvesting work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedTask {
    pub base_url: String,
    pub link_selector: String,
    pub strategy: Strategy,
}

impl SeedTask {
    pub fn pagination_template(&self) -> Option<&str> {
        match &self.strategy {
            Strategy::TemplatePagination { template, .. } => Some(template),
            _ => None,
        }
    }

    pub fn next_button_selector(&self) -> Option<&str> {
        match &self.strategy {
            Strategy::NextButton { selector, .. } => Some(selector),
            _ => None,
        }
    }

    pub fn load_more_selector(&self) -> Option<&str> {
        match &self.strategy {
            Strategy::ScrollLoadMore {
                load_more_selector, ..
            } => load_more_selector.as_deref(),
            _ => None,
        }
    }

    pub fn has_explicit_load_more_button(&self) -> bool {
        matches!(
            self.strategy,
            Strategy::ScrollLoadMore {
                has_button: true,
                ..
            }
        )
    }

    /// Page limit of a paginated task; scroll and custom tasks have none
    pub fn max_pages(&self) -> Option<u32> {
        match &self.strategy {
            Strategy::TemplatePagination { max_pages, .. }
            | Strategy::NextButton { max_pages, .. } => Some(*max_pages),
            Strategy::ScrollLoadMore { .. } | Strategy::Custom => None,
        }
    }
}

/// Expand a request into seed tasks
pub fn expand(request: &HarvestRequest) -> Result<Vec<SeedTask>> {
    if request.base_urls.is_empty() {
        return Err(HarvestError::Configuration(
            "at least one base URL is required".to_string(),
        ));
    }
    if request.link_selectors.is_empty() {
        return Err(HarvestError::Configuration(
            "at least one link selector is required".to_string(),
        ));
    }

    let kind = request.resolved_strategy();
    if kind.is_none() && request.multiple_targets {
        return Err(HarvestError::Configuration(
            "multiple targets need a pagination method".to_string(),
        ));
    }

    let method_list = match kind {
        Some(StrategyKind::Pagination) => Some(("pagination templates", &request.pagination_templates)),
        Some(StrategyKind::NextButton) => Some(("next button selectors", &request.next_button_selectors)),
        _ => None,
    };
    if let Some((name, list)) = method_list {
        if list.is_empty() {
            return Err(HarvestError::Configuration(format!(
                "{name} are required for the selected strategy"
            )));
        }
    }

    let count = if request.multiple_targets {
        paired_length(request, method_list.map(|(_, list)| list.len()))
    } else {
        1
    };

    let mut tasks = Vec::with_capacity(count);
    for i in 0..count {
        let base_url = non_blank(&request.base_urls[i], "base URL")?;
        let link_selector = css_selector(&request.link_selectors[i], "link selector")?;
        let max_pages = request
            .max_pages
            .get(i)
            .copied()
            .unwrap_or(DEFAULT_MAX_PAGES);
        if max_pages == 0 {
            return Err(HarvestError::Configuration(format!(
                "max_pages for {base_url} must be positive"
            )));
        }

        let strategy = match kind {
            Some(StrategyKind::Pagination) => {
                let template = non_blank(&request.pagination_templates[i], "pagination template")?;
                if !template.contains(PAGE_NUMBER_PLACEHOLDER) {
                    return Err(HarvestError::Configuration(format!(
                        "pagination template '{template}' has no {PAGE_NUMBER_PLACEHOLDER} placeholder"
                    )));
                }
                Strategy::TemplatePagination {
                    template,
                    max_pages,
                }
            }
            Some(StrategyKind::NextButton) => Strategy::NextButton {
                selector: css_selector(&request.next_button_selectors[i], "next button selector")?,
                max_pages,
            },
            Some(StrategyKind::ScrollLoadMore) => {
                scroll_strategy(request, &request.settings)?
            }
            Some(StrategyKind::Custom) | None => Strategy::Custom,
        };

        tasks.push(SeedTask {
            base_url,
            link_selector,
            strategy,
        });
    }

    ::log::debug!("Expanded harvest request into {} seed tasks", tasks.len());
    Ok(tasks)
}

/// Length of the element-wise pairing across the lists that take part in it
fn paired_length(request: &HarvestRequest, method_len: Option<usize>) -> usize {
    let mut lengths = vec![request.base_urls.len(), request.link_selectors.len()];
    lengths.extend(method_len);
    if !request.max_pages.is_empty() {
        lengths.push(request.max_pages.len());
    }

    let shortest = lengths.iter().copied().min().unwrap_or(0);
    let longest = lengths.iter().copied().max().unwrap_or(0);
    if shortest != longest {
        ::log::warn!(
            "Target lists have unequal lengths {:?}; only the first {} targets are harvested",
            lengths,
            shortest
        );
    }
    shortest
}

fn scroll_strategy(request: &HarvestRequest, settings: &HarvestSettings) -> Result<Strategy> {
    let load_more_selector = match &request.load_more_selector {
        Some(selector) => Some(css_selector(selector, "load more selector")?),
        None => None,
    };
    let footer_selector = match &request.footer_selector {
        Some(selector) => Some(css_selector(selector, "footer selector")?),
        None => None,
    };
    if request.has_explicit_load_more_button && load_more_selector.is_none() {
        return Err(HarvestError::Configuration(
            "a load more selector is required when the page has a load more button".to_string(),
        ));
    }
    if settings.max_scrolls == 0 || settings.max_repeats == 0 {
        return Err(HarvestError::Configuration(
            "max_scrolls and max_repeats must be positive".to_string(),
        ));
    }

    Ok(Strategy::ScrollLoadMore {
        load_more_selector,
        has_button: request.has_explicit_load_more_button,
        footer_selector,
        max_scrolls: settings.max_scrolls,
        max_repeats: settings.max_repeats,
    })
}

fn non_blank(value: &str, what: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(HarvestError::Configuration(format!("{what} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// A non-blank selector that parses, so a typo fails before any page is loaded
fn css_selector(value: &str, what: &str) -> Result<String> {
    let selector = non_blank(value, what)?;
    html::validate_selector(&selector)?;
    Ok(selector)
}
