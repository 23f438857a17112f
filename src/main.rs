use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;

use video_digest::api::video::VideoSummarizer;
use video_digest::core::catalog::{CatalogSearch, YouTubeCatalog};
use video_digest::core::download::{VideoDownloader, YtDlpDownloader};
use video_digest::core::video::Composition;
use video_digest::core::{CancelToken, Config};

#[derive(Parser)]
#[command(name = "video-digest", author, version, about = "Scene keyframes, on-screen text and a GIF preview from a video", long_about = None)]
struct Cli {
    /// TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a local video file
    Analyze {
        #[arg(short, long)]
        input: PathBuf,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Find the most viewed short video for a query
    Search {
        query: String,
    },
    /// Search, download and analyze
    Fetch {
        query: String,
        #[command(flatten)]
        overrides: Overrides,
    },
}

#[derive(Args)]
struct Overrides {
    /// Scene cut threshold (0-255)
    #[arg(short, long)]
    threshold: Option<f64>,
    #[arg(short, long)]
    max_keyframes: Option<usize>,
    /// Directory for keyframe images
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    no_ocr: bool,
    /// Abort the run after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Print the run report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

impl Overrides {
    fn apply(&self, config: &mut Config) {
        if let Some(threshold) = self.threshold {
            config.pipeline.threshold = threshold;
        }
        if let Some(max_keyframes) = self.max_keyframes {
            config.pipeline.max_keyframes = max_keyframes;
        }
        if let Some(dir) = &self.output_dir {
            config.output.animation_file = dir.join("summary.gif");
            config.output.dir = dir.clone();
        }
        if self.no_ocr {
            config.ocr.enabled = false;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    video_digest::init_logging(&config.logging.level);

    match cli.command {
        Commands::Analyze { input, overrides } => analyze(config, &input, &overrides),
        Commands::Search { query } => {
            let catalog = catalog_from(&config)?;
            match catalog.top_video(&query)? {
                Some(video) => {
                    println!(
                        "Top video: {} ({} seconds, {} views)",
                        video.title, video.duration_secs, video.view_count
                    );
                    println!("{}", video.watch_url());
                }
                None => println!("No suitable video found."),
            }
            Ok(())
        }
        Commands::Fetch { query, overrides } => {
            let catalog = catalog_from(&config)?;
            let Some(video) = catalog.top_video(&query)? else {
                bail!("no video under {}s found for {:?}", config.catalog.max_duration_secs, query);
            };
            println!(
                "Top video: {} ({} seconds, {} views)",
                video.title, video.duration_secs, video.view_count
            );
            let path = YtDlpDownloader::new()
                .download(&video.video_id, &config.catalog.download_dir)
                .with_context(|| format!("downloading {}", video.watch_url()))?;
            analyze(config, &path, &overrides)
        }
    }
}

fn catalog_from(config: &Config) -> Result<YouTubeCatalog> {
    YouTubeCatalog::new(
        &config.catalog.api_key,
        config.catalog.max_results,
        config.catalog.max_duration_secs,
    )
    .context("creating catalog client")
}

fn analyze(mut config: Config, input: &Path, overrides: &Overrides) -> Result<()> {
    overrides.apply(&mut config);
    config.validate().context("invalid settings")?;

    let cancel = match overrides.timeout_secs {
        Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
        None => CancelToken::new(),
    };
    let handle = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("🛑 Interrupted, stopping after the current frame");
        handle.cancel();
    })?;

    let summarizer = VideoSummarizer::create(config).context("initialising pipeline")?;
    let run = summarizer
        .summarize(input, &cancel)
        .with_context(|| format!("analyzing {}", input.display()))?;

    if overrides.json {
        let report = run.report(input);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for notice in &run.notices {
        info!("ℹ️ {}", notice);
    }
    match &run.composition {
        Composition::Composed(artifact) => println!("Summary GIF created: {}", artifact.path.display()),
        Composition::Empty => println!("No keyframes, no summary GIF."),
    }
    println!("Extracted Text:\n{}", run.text.as_str());
    Ok(())
}
