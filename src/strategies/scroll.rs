use crate::browser::{self, BrowserSession};
use crate::convergence::{ConvergenceState, HeightConvergence, LinkSetConvergence};
use crate::error::Result;
use crate::strategies::TaskContext;

pub(crate) struct ScrollPlan<'a> {
    pub load_more_selector: Option<&'a str>,
    pub has_button: bool,
    pub footer_selector: Option<&'a str>,
    pub max_scrolls: u32,
    pub max_repeats: u32,
}

/// Scroll/load-more: keep revealing content in one session until the page
/// stops growing (with a button) or stops yielding new links (without)
pub(crate) async fn run(ctx: &mut TaskContext<'_>, plan: &ScrollPlan<'_>) -> Result<()> {
    let Some(session) = ctx.open_at_base_url().await else {
        return Ok(());
    };
    let result = match (plan.has_button, plan.load_more_selector) {
        (true, Some(load_more)) => load_more_until_stable(ctx, session.as_ref(), load_more, plan).await,
        _ => scroll_until_converged(ctx, session.as_ref(), plan).await,
    };
    browser::release(session).await;
    result
}

async fn load_more_until_stable(
    ctx: &mut TaskContext<'_>,
    session: &dyn BrowserSession,
    load_more: &str,
    plan: &ScrollPlan<'_>,
) -> Result<()> {
    let initial_height = match session.scroll_height().await {
        Ok(height) => height,
        Err(e) => {
            ctx.log(&format!("Could not measure page height: {e}"));
            return Ok(());
        }
    };
    let mut detector = HeightConvergence::new(initial_height);
    let pause = ctx.settings.scroll_pause();

    for iteration in 1..=plan.max_scrolls {
        if ctx.should_stop() {
            return Ok(());
        }

        if let Err(e) = session.scroll_to_bottom().await {
            ctx.log(&format!("Scrolling failed: {e}"));
            return Ok(());
        }
        let links = ctx.extractor.extract(session, ctx.reporter).await;
        ctx.summary.pages_visited += 1;
        ctx.persist(&links)?;
        tokio::time::sleep(pause).await;

        match session.click(load_more, ctx.settings.element_wait()).await {
            Ok(()) => {
                ctx.log("Clicked 'Load More' button.");
                tokio::time::sleep(pause).await;
            }
            Err(e) => ctx.log(&format!("Load more button interaction failed: {e}")),
        }
        ctx.reporter.on_progress(
            iteration,
            plan.max_scrolls,
            &format!("Scroll {iteration} of at most {}", plan.max_scrolls),
        );

        let height = match session.scroll_height().await {
            Ok(height) => height,
            Err(e) => {
                ctx.log(&format!("Could not measure page height: {e}"));
                return Ok(());
            }
        };
        if detector.observe(height) {
            ctx.log("Page height stopped changing; no more content to load.");
            return Ok(());
        }
    }

    ctx.log(&format!("Reached the limit of {} scrolls", plan.max_scrolls));
    Ok(())
}

async fn scroll_until_converged(
    ctx: &mut TaskContext<'_>,
    session: &dyn BrowserSession,
    plan: &ScrollPlan<'_>,
) -> Result<()> {
    let mut detector = LinkSetConvergence::new(plan.max_repeats, plan.max_scrolls);
    let pause = ctx.settings.scroll_pause();

    while !detector.is_done() {
        if ctx.should_stop() {
            return Ok(());
        }

        if let Err(e) = scroll_once(session, plan.footer_selector).await {
            ctx.log(&format!("Scrolling failed: {e}"));
            return Ok(());
        }
        tokio::time::sleep(pause).await;

        let links = ctx.extractor.extract(session, ctx.reporter).await;
        ctx.summary.pages_visited += 1;
        ctx.persist(&links)?;

        let state = detector.observe(&links);
        ctx.reporter.on_progress(
            detector.scroll_count(),
            plan.max_scrolls,
            &format!(
                "Scroll {}: {} links seen",
                detector.scroll_count(),
                detector.seen().len()
            ),
        );
        if let ConvergenceState::Stable(repeats) = state {
            ::log::debug!("No new links for {} consecutive scrolls", repeats);
        }
    }

    if detector.repeat_count() >= plan.max_repeats {
        ctx.log(&format!(
            "No new links after {} scrolls; assuming the end of the feed.",
            detector.repeat_count()
        ));
    } else {
        ctx.log(&format!("Reached the limit of {} scrolls", plan.max_scrolls));
    }
    Ok(())
}

/// Scroll toward the footer anchor when there is one, else to the bottom
async fn scroll_once(session: &dyn BrowserSession, footer_selector: Option<&str>) -> Result<()> {
    if let Some(footer) = footer_selector {
        if session.scroll_into_view(footer).await? {
            return Ok(());
        }
        ::log::debug!("Footer '{}' not found, scrolling to the bottom", footer);
    }
    session.scroll_to_bottom().await
}
