use clap::{Parser, ValueEnum};
use link_harvest::{HarvestRequest, Result, StrategyKind};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "link-harvest")]
#[command(about = "Harvest and deduplicate links from paginated or scrolling sites")]
#[command(version)]
pub struct Args {
    /// JSON harvest request; inline target flags are ignored when given
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Base URL to start from (repeat for multiple targets)
    #[arg(short = 'u', long = "base-url")]
    pub base_urls: Vec<String>,

    /// CSS selector of the links to harvest (repeat for multiple targets)
    #[arg(short = 's', long = "selector")]
    pub link_selectors: Vec<String>,

    /// Exploration strategy (inferred from the other flags when omitted)
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Pagination URL template with a {page_number} placeholder
    #[arg(long = "template")]
    pub pagination_templates: Vec<String>,

    /// Selector of the "next page" control
    #[arg(long = "next-selector")]
    pub next_button_selectors: Vec<String>,

    /// Selector of the "load more" control
    #[arg(long)]
    pub load_more_selector: Option<String>,

    /// The page has an explicit "load more" control
    #[arg(long)]
    pub has_load_more_button: bool,

    /// Element to scroll toward on infinite-scroll pages
    #[arg(long)]
    pub footer_selector: Option<String>,

    /// Maximum pages per target (repeat for multiple targets)
    #[arg(short = 'p', long = "max-pages")]
    pub max_pages: Vec<u32>,

    /// Pair the repeated flags element-wise into several targets
    #[arg(short, long)]
    pub multiple_targets: bool,

    /// Retries per URL after the first attempt
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Maximum concurrent page fetches
    #[arg(long)]
    pub max_session: Option<usize>,

    /// Memory usage percentage above which new fetches wait
    #[arg(long)]
    pub memory_threshold: Option<f64>,

    /// Link store file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Start from an empty link store instead of extending an existing one
    #[arg(long)]
    pub reset: bool,

    /// URL for the WebDriver instance
    #[arg(long)]
    pub webdriver_url: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Pagination,
    NextButton,
    Scroll,
    Custom,
}

impl From<StrategyArg> for StrategyKind {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Pagination => StrategyKind::Pagination,
            StrategyArg::NextButton => StrategyKind::NextButton,
            StrategyArg::Scroll => StrategyKind::ScrollLoadMore,
            StrategyArg::Custom => StrategyKind::Custom,
        }
    }
}

/// Build the harvest request from a config file or the inline flags
pub fn build_request(args: &Args) -> Result<HarvestRequest> {
    let mut request = match &args.config {
        Some(path) => HarvestRequest::from_file(path)?,
        None => {
            let mut request = HarvestRequest::new("", "");
            request.base_urls = args.base_urls.clone();
            request.link_selectors = args.link_selectors.clone();
            request.strategy = args.strategy.map(StrategyKind::from);
            request.pagination_templates = args.pagination_templates.clone();
            request.next_button_selectors = args.next_button_selectors.clone();
            request.load_more_selector = args.load_more_selector.clone();
            request.has_explicit_load_more_button = args.has_load_more_button;
            request.footer_selector = args.footer_selector.clone();
            request.max_pages = args.max_pages.clone();
            request.multiple_targets = args.multiple_targets;
            request
        }
    };

    if let Some(max_retries) = args.max_retries {
        request.max_retries = max_retries;
    }
    if let Some(max_session) = args.max_session {
        request.max_session = max_session;
    }
    if let Some(threshold) = args.memory_threshold {
        request.memory_threshold = threshold;
    }
    if let Some(output) = &args.output {
        request.output = output.clone();
    }
    if let Some(url) = &args.webdriver_url {
        request.settings.webdriver_url = url.clone();
    }
    Ok(request)
}
