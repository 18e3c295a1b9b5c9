use crate::browser::{self, BrowserSession};
use crate::error::Result;
use crate::strategies::TaskContext;

/// Next-button pagination: page N+1 is only reachable by clicking on page N,
/// so pages are walked one at a time in a single session
pub(crate) async fn run(ctx: &mut TaskContext<'_>, next_selector: &str, max_pages: u32) -> Result<()> {
    let Some(session) = ctx.open_at_base_url().await else {
        return Ok(());
    };
    let result = walk(ctx, session.as_ref(), next_selector, max_pages).await;
    browser::release(session).await;
    result
}

async fn walk(
    ctx: &mut TaskContext<'_>,
    session: &dyn BrowserSession,
    next_selector: &str,
    max_pages: u32,
) -> Result<()> {
    let mut current_page = 1;
    loop {
        if ctx.should_stop() {
            return Ok(());
        }

        ctx.log(&format!("Processing page {current_page}"));
        let links = ctx.extractor.extract(session, ctx.reporter).await;
        ctx.summary.pages_visited += 1;
        ctx.persist(&links)?;
        ctx.reporter.on_progress(
            current_page.min(max_pages),
            max_pages,
            &format!("Page {current_page} of {max_pages}"),
        );

        if current_page >= max_pages {
            return Ok(());
        }

        match session.click(next_selector, ctx.settings.element_wait()).await {
            Ok(()) => current_page += 1,
            Err(e) => {
                ::log::debug!("Next button unavailable: {}", e);
                ctx.log("No more pages to navigate.");
                return Ok(());
            }
        }
    }
}
