//! Concurrent page fetching under a session ceiling, a memory-pressure
//! admission gate and a bounded retry policy.
//!
//! Every attempt first takes one of `max_session` permits, then waits until
//! memory usage is at or below the threshold. Sampling after the permit is
//! granted means a fetch queued behind others sees current pressure, not the
//! reading from when it was queued. The permit is given
//! back before a retry backs off, so a failing URL never blocks others while
//! it sleeps. A URL that keeps failing is marked failed after
//! `max_retries + 1` attempts; the rest of the batch carries on.

use crate::config::HarvestRequest;
use crate::crawlers::{MemoryProbe, PageFetcher};
use crate::error::{HarvestError, Result};
use crate::parsers::LinkExtractor;
use crate::report::Reporter;
use crate::results::{BatchReport, FetchStatus, UrlOutcome};
use crate::utils::backoff_delay;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

/// Concurrency, memory and retry limits for one dispatcher
#[derive(Debug, Clone)]
pub struct DispatchLimits {
    pub max_session: usize,
    pub max_retries: u32,
    pub memory_threshold: f64,
    pub memory_check_interval: Duration,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    pub max_delay: Duration,
}

impl DispatchLimits {
    pub fn from_request(request: &HarvestRequest) -> Self {
        let settings = &request.settings;
        Self {
            max_session: request.max_session,
            max_retries: request.max_retries,
            memory_threshold: request.memory_threshold,
            memory_check_interval: settings.memory_check_interval(),
            backoff_min: Duration::from_millis(settings.backoff_min_ms),
            backoff_max: Duration::from_millis(settings.backoff_max_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    limits: DispatchLimits,
    fetcher: Arc<dyn PageFetcher>,
    memory: Arc<dyn MemoryProbe>,
    permits: Arc<Semaphore>,
    reporter: Arc<dyn Reporter>,
}

impl Dispatcher {
    pub fn new(
        limits: DispatchLimits,
        fetcher: Arc<dyn PageFetcher>,
        memory: Arc<dyn MemoryProbe>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(limits.max_session.max(1)));
        Self {
            limits,
            fetcher,
            memory,
            permits,
            reporter,
        }
    }

    pub fn limits(&self) -> &DispatchLimits {
        &self.limits
    }

    pub fn fetcher(&self) -> &Arc<dyn PageFetcher> {
        &self.fetcher
    }

    /// Hold admission while memory usage is above the threshold
    async fn wait_for_memory(&self) {
        let mut stalled = false;
        loop {
            let used = self.memory.used_percent();
            if used <= self.limits.memory_threshold {
                if stalled {
                    ::log::info!("Memory usage back to {:.1}%, resuming fetches", used);
                }
                return;
            }
            if !stalled {
                ::log::warn!(
                    "Memory usage {:.1}% above {:.1}%, holding new fetches",
                    used,
                    self.limits.memory_threshold
                );
                stalled = true;
            }
            tokio::time::sleep(self.limits.memory_check_interval).await;
        }
    }

    async fn admit(&self) -> Result<OwnedSemaphorePermit> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| HarvestError::Browser(format!("dispatcher closed: {e}")))?;
        self.wait_for_memory().await;
        Ok(permit)
    }

    /// Run `op` under admission control, retrying retryable failures
    ///
    /// Returns the final result and the number of attempts made.
    pub async fn retrying<T, F, Fut>(&self, label: &str, mut op: F) -> (Result<T>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let permit = match self.admit().await {
                Ok(permit) => permit,
                Err(e) => return (Err(e), attempts),
            };
            let result = op().await;
            drop(permit);

            match result {
                Ok(value) => return (Ok(value), attempts),
                Err(e) if e.is_retryable() && attempts <= self.limits.max_retries => {
                    let delay = backoff_delay(
                        attempts,
                        self.limits.backoff_min,
                        self.limits.backoff_max,
                        self.limits.max_delay,
                    );
                    ::log::warn!(
                        "Attempt {} for {} failed: {}; retrying in {:?}",
                        attempts,
                        label,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return (Err(e), attempts),
            }
        }
    }

    /// Fetch every URL of a crawl batch and extract its links
    ///
    /// Outcomes arrive in completion order; the report is keyed by URL.
    pub async fn dispatch(&self, urls: &[String], extractor: &LinkExtractor) -> BatchReport {
        let mut report = BatchReport::pending(urls);
        let total = report.outcomes.len() as u32;
        let mut tasks = JoinSet::new();

        let mut queued = HashSet::new();
        for url in urls {
            if !queued.insert(url.clone()) {
                continue;
            }
            let this = self.clone();
            let url = url.clone();
            let extractor = extractor.clone();
            tasks.spawn(async move {
                let (result, attempts) = this
                    .retrying(&url, || this.fetcher.fetch_links(&url, &extractor))
                    .await;
                (url, result, attempts)
            });
        }

        let mut done = 0;
        while let Some(joined) = tasks.join_next().await {
            let (url, result, attempts) = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    // The URL stays pending in the report
                    ::log::error!("Fetch task ended abnormally: {}", e);
                    continue;
                }
            };
            done += 1;

            let outcome = report
                .outcomes
                .entry(url.clone())
                .or_insert_with(UrlOutcome::pending);
            outcome.attempts = attempts;
            match result {
                Ok(links) => {
                    outcome.status = FetchStatus::Succeeded;
                    outcome.links = links;
                }
                Err(HarvestError::ExtractionTimeout { .. }) => {
                    outcome.status = FetchStatus::Succeeded;
                    self.reporter.on_log(&format!(
                        "Timeout while extracting links with selector: {} on {}",
                        extractor.selector(),
                        url
                    ));
                }
                Err(e) => {
                    outcome.status = FetchStatus::Failed;
                    outcome.error = Some(e.to_string());
                    ::log::error!("Failed to crawl {}: {}", url, e);
                    self.reporter
                        .on_log(&format!("Failed to crawl {url} after {attempts} attempts: {e}"));
                }
            }
            self.reporter
                .on_progress(done, total, &format!("Fetched {done} of {total}: {url}"));
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ChannelReporter, HarvestEvent, NullReporter};
    use crate::testing::{FetchScript, LINK_SELECTOR, ScriptedFetcher, SequenceMemoryProbe};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn limits(max_session: usize, max_retries: u32) -> DispatchLimits {
        DispatchLimits {
            max_session,
            max_retries,
            memory_threshold: 80.0,
            memory_check_interval: Duration::from_millis(1),
            backoff_min: Duration::ZERO,
            backoff_max: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    fn extractor() -> LinkExtractor {
        LinkExtractor::new(LINK_SELECTOR, Duration::ZERO, Duration::ZERO).unwrap()
    }

    fn dispatcher(limits: DispatchLimits, fetcher: Arc<ScriptedFetcher>) -> Dispatcher {
        Dispatcher::new(
            limits,
            fetcher,
            Arc::new(SequenceMemoryProbe::new(&[])),
            Arc::new(NullReporter),
        )
    }

    fn urls(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_limits_copy_request_values() {
        let mut request = HarvestRequest::new("https://x/", LINK_SELECTOR);
        request.max_session = 4;
        request.max_retries = 1;
        request.settings.max_delay_ms = 5000;

        let limits = DispatchLimits::from_request(&request);
        assert_eq!(limits.max_session, 4);
        assert_eq!(limits.max_retries, 1);
        assert_eq!(limits.max_delay, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_failing_url_gets_bounded_attempts_and_others_complete() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .script("https://x/a", FetchScript::links(&["https://x/1"]))
                .script("https://x/b", FetchScript::Unreachable)
                .script("https://x/c", FetchScript::links(&["https://x/2"])),
        );
        let batch = urls(&["https://x/a", "https://x/b", "https://x/c"]);

        let report = dispatcher(limits(2, 2), Arc::clone(&fetcher))
            .dispatch(&batch, &extractor())
            .await;

        assert_eq!(fetcher.attempts("https://x/b"), 3);
        assert_eq!(report.status("https://x/b"), Some(FetchStatus::Failed));
        assert_eq!(report.status("https://x/a"), Some(FetchStatus::Succeeded));
        assert_eq!(report.status("https://x/c"), Some(FetchStatus::Succeeded));
        assert_eq!(report.failed_urls(), vec!["https://x/b".to_string()]);
        assert_eq!(report.all_links().len(), 2);
    }

    #[tokio::test]
    async fn test_flaky_page_succeeds_within_retry_budget() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .script("https://x/p=1", FetchScript::links(&["https://x/a", "https://x/b"]))
                .script("https://x/p=2", FetchScript::flaky(2, &["https://x/c"]))
                .script("https://x/p=3", FetchScript::links(&["https://x/a", "https://x/d"])),
        );
        let batch = urls(&["https://x/p=1", "https://x/p=2", "https://x/p=3"]);

        let report = dispatcher(limits(10, 2), Arc::clone(&fetcher))
            .dispatch(&batch, &extractor())
            .await;

        assert_eq!(report.succeeded(), 3);
        assert_eq!(fetcher.attempts("https://x/p=2"), 3);
        assert_eq!(report.outcomes["https://x/p=2"].attempts, 3);

        let mut links: Vec<_> = report.all_links().into_iter().collect();
        links.sort();
        assert_eq!(
            links,
            vec!["https://x/a", "https://x/b", "https://x/c", "https://x/d"]
        );
    }

    #[tokio::test]
    async fn test_in_flight_fetches_never_exceed_max_session() {
        let mut fetcher = ScriptedFetcher::new().with_delay(Duration::from_millis(20));
        let batch: Vec<String> = (1..=8).map(|n| format!("https://x/p={n}")).collect();
        for url in &batch {
            fetcher = fetcher.script(url, FetchScript::links(&[url.as_str()]));
        }
        let fetcher = Arc::new(fetcher);

        let report = dispatcher(limits(3, 0), Arc::clone(&fetcher))
            .dispatch(&batch, &extractor())
            .await;

        assert_eq!(report.succeeded(), 8);
        assert!(fetcher.max_in_flight() <= 3);
        assert!(fetcher.max_in_flight() >= 1);
    }

    #[tokio::test]
    async fn test_memory_pressure_delays_admission() {
        let fetcher = Arc::new(
            ScriptedFetcher::new().script("https://x/a", FetchScript::links(&["https://x/1"])),
        );
        let memory = Arc::new(SequenceMemoryProbe::new(&[95.0, 92.0, 50.0]));
        let dispatcher = Dispatcher::new(
            limits(1, 0),
            Arc::clone(&fetcher) as Arc<dyn PageFetcher>,
            Arc::clone(&memory) as Arc<dyn MemoryProbe>,
            Arc::new(NullReporter),
        );

        let report = dispatcher
            .dispatch(&urls(&["https://x/a"]), &extractor())
            .await;

        assert_eq!(report.succeeded(), 1);
        assert!(memory.samples() >= 3);
        assert_eq!(fetcher.attempts("https://x/a"), 1);
    }

    /// Reports high usage for a few samples once the first fetch has finished
    struct PressureAfterFirstFetch {
        fetcher: Arc<ScriptedFetcher>,
        high_samples: AtomicUsize,
    }

    impl MemoryProbe for PressureAfterFirstFetch {
        fn used_percent(&self) -> f64 {
            if self.fetcher.completed() >= 1 && self.high_samples.load(Ordering::SeqCst) < 2 {
                self.high_samples.fetch_add(1, Ordering::SeqCst);
                return 95.0;
            }
            50.0
        }
    }

    #[tokio::test]
    async fn test_queued_fetches_resample_memory_when_admitted() {
        let mut fetcher = ScriptedFetcher::new().with_delay(Duration::from_millis(20));
        let batch = urls(&["https://x/p=1", "https://x/p=2", "https://x/p=3"]);
        for url in &batch {
            fetcher = fetcher.script(url, FetchScript::links(&[url.as_str()]));
        }
        let fetcher = Arc::new(fetcher);
        let memory = Arc::new(PressureAfterFirstFetch {
            fetcher: Arc::clone(&fetcher),
            high_samples: AtomicUsize::new(0),
        });
        let dispatcher = Dispatcher::new(
            limits(1, 0),
            Arc::clone(&fetcher) as Arc<dyn PageFetcher>,
            Arc::clone(&memory) as Arc<dyn MemoryProbe>,
            Arc::new(NullReporter),
        );

        let report = dispatcher.dispatch(&batch, &extractor()).await;

        assert_eq!(report.succeeded(), 3);
        // The fetches queued behind the first one saw the rise and stalled on it
        assert_eq!(memory.high_samples.load(Ordering::SeqCst), 2);
        assert_eq!(fetcher.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_extraction_timeout_is_success_without_links() {
        let fetcher = Arc::new(ScriptedFetcher::new().script("https://x/empty", FetchScript::Timeout));
        let (reporter, mut rx) = ChannelReporter::new();
        let dispatcher = Dispatcher::new(
            limits(1, 2),
            Arc::clone(&fetcher) as Arc<dyn PageFetcher>,
            Arc::new(SequenceMemoryProbe::new(&[])),
            Arc::new(reporter),
        );

        let report = dispatcher
            .dispatch(&urls(&["https://x/empty"]), &extractor())
            .await;

        assert_eq!(report.status("https://x/empty"), Some(FetchStatus::Succeeded));
        assert!(report.all_links().is_empty());
        assert_eq!(fetcher.attempts("https://x/empty"), 1);

        let mut saw_timeout = false;
        while let Ok(event) = rx.try_recv() {
            if let HarvestEvent::Log(line) = event {
                saw_timeout |= line.starts_with("Timeout while extracting links");
            }
        }
        assert!(saw_timeout);
    }

    #[tokio::test]
    async fn test_duplicate_urls_are_fetched_once() {
        let fetcher = Arc::new(
            ScriptedFetcher::new().script("https://x/a", FetchScript::links(&["https://x/1"])),
        );

        let report = dispatcher(limits(4, 0), Arc::clone(&fetcher))
            .dispatch(&urls(&["https://x/a", "https://x/a"]), &extractor())
            .await;

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(fetcher.attempts("https://x/a"), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_not_retried() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let dispatcher = dispatcher(limits(1, 5), fetcher);

        let mut calls = 0;
        let (result, attempts) = dispatcher
            .retrying("config", || {
                calls += 1;
                async { Err::<(), _>(HarvestError::Configuration("bad".to_string())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
        assert_eq!(calls, 1);
    }
}
