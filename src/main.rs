use clap::Parser;
use link_harvest::{Harvester, LinkStore, LogReporter, seeds};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;

mod args;
use args::{Args, build_request};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    env_logger::init();

    // Parse command-line arguments
    let args = Args::parse();

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ::log::error!("Harvest failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> link_harvest::Result<()> {
    let request = build_request(args)?;
    let tasks = seeds::expand(&request)?;

    println!("Note: Link harvesting requires a WebDriver server (e.g., ChromeDriver).");
    println!(
        "Set WEBDRIVER_URL environment variable if not using the default http://localhost:4444"
    );

    // Ctrl-C stops the harvest between pages; links found so far stay saved
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ::log::warn!("Interrupt received, stopping after the current step");
            let _ = stop_tx.send(true);
        }
    });

    let sessions = Arc::new(link_harvest::webdriver_factory(&request));
    let harvester = Harvester::from_request(&request, sessions)?
        .with_reporter(Arc::new(LogReporter))
        .with_stop_signal(stop_rx);

    let mut store = if args.reset {
        LinkStore::reset(&request.output)?
    } else {
        LinkStore::open(&request.output)?
    };

    ::log::info!(
        "Starting harvest of {} seed tasks into {}",
        tasks.len(),
        store.path().display()
    );
    let start_time = std::time::Instant::now();
    let summary = harvester.run(&tasks, &mut store).await?;

    ::log::info!(
        "Harvest complete - {} new links ({} total) from {} pages in {:.2} seconds",
        summary.new_links,
        store.len(),
        summary.pages_visited,
        start_time.elapsed().as_secs_f64()
    );
    if !summary.failed_urls.is_empty() {
        ::log::warn!("Failed URLs: {}", summary.failed_urls.join(", "));
    }
    if summary.stopped {
        ::log::warn!("Harvest was stopped before all targets were exhausted");
    }
    Ok(())
}
