use crate::error::Result;
use crate::strategies::TaskContext;
use crate::utils::page_urls;

/// Template pagination: every page URL is known up front, so the whole
/// range goes out as one crawl batch and is merged as one batch
pub(crate) async fn run(ctx: &mut TaskContext<'_>, template: &str, max_pages: u32) -> Result<()> {
    if ctx.should_stop() {
        return Ok(());
    }

    let urls = page_urls(template, max_pages);
    ctx.log(&format!(
        "Dispatching {} pagination pages for {}",
        urls.len(),
        ctx.task.base_url
    ));

    let report = ctx.dispatcher.dispatch(&urls, ctx.extractor).await;
    let succeeded = report.succeeded();
    let failed = report.failed_urls();

    ctx.summary.pages_visited += succeeded;
    ctx.persist(&report.all_links())?;

    if !failed.is_empty() {
        ctx.log(&format!(
            "{} of {} pagination pages failed",
            failed.len(),
            urls.len()
        ));
    }
    ctx.summary.failed_urls.extend(failed);
    Ok(())
}
