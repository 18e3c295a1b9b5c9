//! The strategy engine.
//!
//! A [`Harvester`] runs seed tasks one after another. Each task gets its own
//! extractor and dispatcher; template pagination fans its pages out through
//! the dispatcher, while next-button and scroll strategies walk a single
//! browser session step by step.

mod next_button;
mod scroll;
mod template;

use crate::browser::{self, BrowserSession, SessionFactory};
use crate::config::{HarvestRequest, HarvestSettings};
use crate::crawlers::{
    DispatchLimits, Dispatcher, MemoryProbe, PageFetcher, SessionPageFetcher, SystemMemoryProbe,
};
use crate::error::Result;
use crate::filter::{LinkFilter, LinkFilterConfig};
use crate::parsers::LinkExtractor;
use crate::report::{LogReporter, Reporter};
use crate::results::HarvestSummary;
use crate::seeds::{SeedTask, Strategy};
use crate::store::LinkStore;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;

/// User-supplied handler for [`Strategy::Custom`] tasks
///
/// The engine opens a session, navigates to the task's base URL and hands
/// the session over. Returned links are merged into the store.
#[async_trait]
pub trait CustomStrategy: Send + Sync {
    async fn harvest(
        &self,
        task: &SeedTask,
        session: &dyn BrowserSession,
        extractor: &LinkExtractor,
        reporter: &dyn Reporter,
    ) -> Result<HashSet<String>>;
}

pub struct Harvester {
    settings: HarvestSettings,
    limits: DispatchLimits,
    filter: LinkFilter,
    sessions: Arc<dyn SessionFactory>,
    fetcher: Option<Arc<dyn PageFetcher>>,
    memory: Arc<dyn MemoryProbe>,
    reporter: Arc<dyn Reporter>,
    custom: Option<Arc<dyn CustomStrategy>>,
    stop: Option<watch::Receiver<bool>>,
}

impl Harvester {
    pub fn new(
        sessions: Arc<dyn SessionFactory>,
        limits: DispatchLimits,
        settings: HarvestSettings,
    ) -> Self {
        Self {
            settings,
            limits,
            filter: LinkFilter::allow_all(),
            sessions,
            fetcher: None,
            memory: Arc::new(SystemMemoryProbe::new()),
            reporter: Arc::new(LogReporter),
            custom: None,
            stop: None,
        }
    }

    /// Build a harvester with the limits, settings and filters of a request
    pub fn from_request(request: &HarvestRequest, sessions: Arc<dyn SessionFactory>) -> Result<Self> {
        request.validate_limits()?;
        let filter = LinkFilter::new(&LinkFilterConfig {
            include_patterns: request.include_patterns.clone(),
            exclude_patterns: request.exclude_patterns.clone(),
        })?;
        Ok(Self::new(
            sessions,
            DispatchLimits::from_request(request),
            request.settings.clone(),
        )
        .with_filter(filter))
    }

    pub fn with_filter(mut self, filter: LinkFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_memory_probe(mut self, memory: Arc<dyn MemoryProbe>) -> Self {
        self.memory = memory;
        self
    }

    /// Fetch template pages with `fetcher` instead of pooled browser sessions
    pub fn with_page_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_custom_strategy(mut self, custom: Arc<dyn CustomStrategy>) -> Self {
        self.custom = Some(custom);
        self
    }

    /// Stop between steps once the watched value turns true
    pub fn with_stop_signal(mut self, stop: watch::Receiver<bool>) -> Self {
        self.stop = Some(stop);
        self
    }

    fn stop_requested(&self) -> bool {
        self.stop.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Run every seed task in turn against one link store
    pub async fn run(&self, tasks: &[SeedTask], store: &mut LinkStore) -> Result<HarvestSummary> {
        let mut summary = HarvestSummary::default();
        let total = tasks.len() as u32;

        for (i, task) in tasks.iter().enumerate() {
            if self.stop_requested() {
                self.reporter.on_log("Stop requested, skipping remaining seed tasks");
                summary.stopped = true;
                break;
            }

            self.reporter.on_log(&format!(
                "Seed task {} of {}: {} ({})",
                i + 1,
                total,
                task.base_url,
                task.strategy.name()
            ));
            let task_summary = self.run_task(task, store).await?;
            summary.absorb(task_summary);
        }

        ::log::info!(
            "Harvest complete - {} tasks, {} pages, {} new links, {} failed URLs",
            summary.tasks,
            summary.pages_visited,
            summary.new_links,
            summary.failed_urls.len()
        );
        Ok(summary)
    }

    /// Run a single seed task
    pub async fn run_task(&self, task: &SeedTask, store: &mut LinkStore) -> Result<HarvestSummary> {
        let extractor = LinkExtractor::new(
            &task.link_selector,
            self.settings.element_wait(),
            self.settings.poll_interval(),
        )?
        .with_filter(self.filter.clone());

        let fetcher = self
            .fetcher
            .clone()
            .unwrap_or_else(|| Arc::new(SessionPageFetcher::new(Arc::clone(&self.sessions))));
        let dispatcher = Dispatcher::new(
            self.limits.clone(),
            fetcher,
            Arc::clone(&self.memory),
            Arc::clone(&self.reporter),
        );

        let mut ctx = TaskContext {
            task,
            settings: &self.settings,
            sessions: self.sessions.as_ref(),
            dispatcher: &dispatcher,
            extractor: &extractor,
            reporter: self.reporter.as_ref(),
            store,
            stop: self.stop.as_ref(),
            summary: HarvestSummary {
                tasks: 1,
                ..HarvestSummary::default()
            },
        };

        let outcome = match &task.strategy {
            Strategy::TemplatePagination {
                template,
                max_pages,
            } => template::run(&mut ctx, template, *max_pages).await,
            Strategy::NextButton {
                selector,
                max_pages,
            } => next_button::run(&mut ctx, selector, *max_pages).await,
            Strategy::ScrollLoadMore {
                load_more_selector,
                has_button,
                footer_selector,
                max_scrolls,
                max_repeats,
            } => {
                let plan = scroll::ScrollPlan {
                    load_more_selector: load_more_selector.as_deref(),
                    has_button: *has_button,
                    footer_selector: footer_selector.as_deref(),
                    max_scrolls: *max_scrolls,
                    max_repeats: *max_repeats,
                };
                scroll::run(&mut ctx, &plan).await
            }
            Strategy::Custom => self.run_custom(&mut ctx).await,
        };

        let summary = ctx.summary;
        dispatcher.fetcher().shutdown().await;
        outcome.map(|()| summary)
    }

    async fn run_custom(&self, ctx: &mut TaskContext<'_>) -> Result<()> {
        let Some(custom) = &self.custom else {
            ctx.log("Custom strategy is not implemented.");
            return Ok(());
        };

        let Some(session) = ctx.open_at_base_url().await else {
            return Ok(());
        };
        let result = custom
            .harvest(ctx.task, session.as_ref(), ctx.extractor, ctx.reporter)
            .await;
        browser::release(session).await;

        match result {
            Ok(links) => {
                ctx.summary.pages_visited += 1;
                ctx.persist(&links).map(|_| ())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                ctx.log(&format!("Custom strategy failed: {e}"));
                Ok(())
            }
        }
    }
}

/// Everything one seed task's strategy needs
pub(crate) struct TaskContext<'a> {
    pub task: &'a SeedTask,
    pub settings: &'a HarvestSettings,
    pub sessions: &'a dyn SessionFactory,
    pub dispatcher: &'a Dispatcher,
    pub extractor: &'a LinkExtractor,
    pub reporter: &'a dyn Reporter,
    pub store: &'a mut LinkStore,
    pub stop: Option<&'a watch::Receiver<bool>>,
    pub summary: HarvestSummary,
}

impl TaskContext<'_> {
    pub fn log(&self, message: &str) {
        self.reporter.on_log(message);
    }

    /// True (and recorded in the summary) once a stop has been requested
    pub fn should_stop(&mut self) -> bool {
        let stop = self.stop.is_some_and(|rx| *rx.borrow());
        if stop && !self.summary.stopped {
            self.log("Stop requested, ending the current seed task");
            self.summary.stopped = true;
        }
        stop
    }

    /// Merge a candidate batch into the store; store failures abort the run
    pub fn persist(&mut self, links: &HashSet<String>) -> Result<usize> {
        let added = self.store.merge(links)?.len();
        if added > 0 {
            self.log(&format!("Saved {added} new links."));
        }
        self.summary.new_links += added;
        Ok(added)
    }

    /// Open a session and load the task's base URL, retrying both per policy
    ///
    /// Returns `None` (after logging) when either step keeps failing; the
    /// base URL is then recorded as failed.
    pub async fn open_at_base_url(&mut self) -> Option<Box<dyn BrowserSession>> {
        let sessions = self.sessions;
        let (opened, _) = self
            .dispatcher
            .retrying("browser session", || sessions.open())
            .await;
        let session = match opened {
            Ok(session) => session,
            Err(e) => {
                self.log(&format!("Could not open a browser session: {e}"));
                self.summary.failed_urls.push(self.task.base_url.clone());
                return None;
            }
        };

        let task = self.task;
        let base_url = task.base_url.as_str();
        let (loaded, attempts) = self
            .dispatcher
            .retrying(base_url, || session.goto(base_url))
            .await;
        if let Err(e) = loaded {
            self.log(&format!(
                "Failed to load {base_url} after {attempts} attempts: {e}"
            ));
            self.summary.failed_urls.push(base_url.to_string());
            browser::release(session).await;
            return None;
        }

        self.log(&format!("Starting scraping at {base_url}"));
        Some(session)
    }
}
