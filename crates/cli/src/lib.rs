use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use photoview_cache::{
    AsyncCache, AsyncCacheStats, CacheRuntime, FetchPolicy, HttpFetcher, PixmapDecoder,
    IMAGE_CACHE_ID,
};
use photoview_core::ViewerConfig;
use photoview_feed::{FeedClient, FeedSizes, FeedUrls, PhotoRecord};
use photoview_imaging::Pixmap;
use photoview_scheduler::{CancellationToken, JobPriority, UiQueue};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "photoview")]
#[command(about = "Photoview command line")]
pub struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Persistent cache directory
    #[arg(long, value_name = "DIR", global = true)]
    cache_dir: Option<PathBuf>,
    /// Feed service base URL
    #[arg(long, value_name = "URL", global = true)]
    feed_base: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the feed URL for a screen width.
    Url {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 240)]
        width: u32,
    },
    /// Load a feed and print its records as JSON.
    Feed {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 240)]
        width: u32,
        #[arg(long, value_enum, default_value_t = PolicyArg::Anywhere)]
        policy: PolicyArg,
    },
    /// Fetch an image through the image cache and write it as PNG.
    FetchImage {
        #[arg(value_name = "URL")]
        url: String,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 240)]
        width: u32,
    },
    /// Print persistent cache usage as JSON.
    CacheStats,
    /// Empty the persistent cache.
    CacheClear,
    /// Print CLI version.
    Version,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    Local,
    Web,
    Anywhere,
}

impl From<PolicyArg> for FetchPolicy {
    fn from(policy: PolicyArg) -> Self {
        match policy {
            PolicyArg::Local => FetchPolicy::LocalOnly,
            PolicyArg::Web => FetchPolicy::WebOnly,
            PolicyArg::Anywhere => FetchPolicy::Anywhere,
        }
    }
}

#[derive(Debug, Serialize)]
struct FeedOutput<'a> {
    url: String,
    count: usize,
    records: &'a [Arc<PhotoRecord>],
}

#[derive(Debug, Serialize)]
struct StoreOutput {
    cache_id: char,
    entries: usize,
    bytes: usize,
}

#[derive(Debug, Serialize)]
struct StatsOutput {
    dir: String,
    stores: Vec<StoreOutput>,
}

impl From<(char, AsyncCacheStats)> for StoreOutput {
    fn from((cache_id, stats): (char, AsyncCacheStats)) -> Self {
        Self {
            cache_id,
            entries: stats.disk.entry_count,
            bytes: stats.disk.disk_used,
        }
    }
}

/// Caches without a UI: callbacks are posted to a queue nobody drains.
struct Headless {
    _ui: UiQueue<()>,
    runtime: CacheRuntime<()>,
}

impl Headless {
    fn new(config: &ViewerConfig) -> Self {
        let ui = UiQueue::new();
        let fetcher = Arc::new(HttpFetcher::new(config.cache.network_timeout));
        let runtime = CacheRuntime::new(config.cache.clone(), fetcher, ui.handle());
        Self { _ui: ui, runtime }
    }

    fn images(&self, width: u32) -> Result<AsyncCache<Pixmap, ()>> {
        self.runtime
            .open_cache(IMAGE_CACHE_ID, PixmapDecoder::for_screen_width(width))
            .context("failed to open image cache")
    }

    fn feeds(&self, config: &ViewerConfig, width: u32) -> Result<FeedClient<()>> {
        FeedClient::new(&self.runtime, &config.feed_base, width).context("failed to open feed cache")
    }

    /// How long a blocking fetch may take.
    fn wait(&self) -> Duration {
        self.runtime.config().network_timeout * 2
    }
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    let mut config = ViewerConfig::from_env().context("invalid environment configuration")?;
    if let Some(dir) = &cli.cache_dir {
        config.cache.disk_cache_dir = dir.clone();
    }
    if let Some(base) = &cli.feed_base {
        config.feed_base = base.clone();
    }

    match cli.command {
        Commands::Url { search, width } => {
            let urls = FeedUrls::new(&config.feed_base, FeedSizes::for_screen_width(width));
            println!("{}", urls.feed_url(search.as_deref()));
            Ok(())
        }
        Commands::Feed { search, width, policy } => {
            run_feed(&config, search.as_deref(), width, policy.into())
        }
        Commands::FetchImage { url, output, width } => run_fetch_image(&config, &url, &output, width),
        Commands::CacheStats => run_cache_stats(&config),
        Commands::CacheClear => run_cache_clear(&config),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    match verbose {
        0 => {}
        1 => {
            builder.filter_level(log::LevelFilter::Info);
        }
        2 => {
            builder.filter_level(log::LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
        }
    }
    // Already initialised when run twice in one process.
    let _ = builder.try_init();
}

fn run_feed(config: &ViewerConfig, search: Option<&str>, width: u32, policy: FetchPolicy) -> Result<()> {
    let headless = Headless::new(config);
    let client = headless.feeds(config, width)?;
    let url = client.feed_url(search);

    let pool = headless.runtime.spawn_workers().context("failed to start workers")?;
    let feed = client.fetch_feed_blocking(search, policy, headless.wait());
    headless.runtime.shutdown();
    pool.shutdown();

    let feed = feed.with_context(|| format!("failed to load feed from {url}"))?;
    let payload = FeedOutput {
        url,
        count: feed.len(),
        records: feed.records(),
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_fetch_image(config: &ViewerConfig, url: &str, output: &Path, width: u32) -> Result<()> {
    let headless = Headless::new(config);
    let images = headless.images(width)?;

    let pool = headless.runtime.spawn_workers().context("failed to start workers")?;
    let scope = CancellationToken::new();
    scope.cancel();
    let pixmap = images
        .get_scoped(url, JobPriority::High, FetchPolicy::Anywhere, &scope, |_, _| {})
        .wait(headless.wait());
    headless.runtime.shutdown();
    pool.shutdown();

    let pixmap = pixmap.with_context(|| format!("failed to fetch image {url}"))?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    pixmap
        .to_rgba_image()
        .save(output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{} {}x{}", output.display(), pixmap.width(), pixmap.height());
    Ok(())
}

fn run_cache_stats(config: &ViewerConfig) -> Result<()> {
    let headless = Headless::new(config);
    let images = headless.images(config.screen_width)?;
    let feeds = headless.feeds(config, config.screen_width)?;

    let payload = StatsOutput {
        dir: config.cache.disk_cache_dir.display().to_string(),
        stores: vec![
            (images.cache_id(), images.stats()).into(),
            (feeds.cache().cache_id(), feeds.cache().stats()).into(),
        ],
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_cache_clear(config: &ViewerConfig) -> Result<()> {
    let headless = Headless::new(config);
    let images = headless.images(config.screen_width)?;
    let feeds = headless.feeds(config, config.screen_width)?;

    images.clear().context("failed to clear image cache")?;
    feeds.cache().clear().context("failed to clear feed cache")?;
    println!("cleared {}", config.cache.disk_cache_dir.display());
    Ok(())
}
