use rand::Rng;
use std::time::Duration;

/// Placeholder substituted with the page number in pagination templates
pub const PAGE_NUMBER_PLACEHOLDER: &str = "{page_number}";

/// Fill a pagination template for one page
pub fn page_url(template: &str, page_number: u32) -> String {
    template.replace(PAGE_NUMBER_PLACEHOLDER, &page_number.to_string())
}

/// All page URLs of a template, pages 1 through `max_pages`
pub fn page_urls(template: &str, max_pages: u32) -> Vec<String> {
    (1..=max_pages).map(|page| page_url(template, page)).collect()
}

/// Randomized delay before retry number `retry` (1-based)
///
/// A base delay is drawn uniformly from `[min, max]` and doubled for every
/// earlier retry. The result never exceeds `cap`.
pub fn backoff_delay(retry: u32, min: Duration, max: Duration, cap: Duration) -> Duration {
    let base = if max > min {
        rand::thread_rng().gen_range(min..=max)
    } else {
        min
    };
    let factor = 2u32.saturating_pow(retry.saturating_sub(1).min(16));
    base.saturating_mul(factor).min(cap)
}
