use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use rebait_core::{CacheStore, Config, Pipeline, PipelineOptions, Provider, VideoId};

const DEFAULT_TEMPLATE: &str = "You are given the title, channel, description and subtitles of a \
YouTube video. Rewrite the title so it plainly states what the video actually shows, without \
clickbait, exaggeration or withheld information. Reply with the rewritten title only.";

/// CLI wrapper for Provider enum (needed for clap ValueEnum)
#[derive(Clone, Copy, ValueEnum)]
enum CliProvider {
    Gemini,
    Openai,
    Openrouter,
}

impl From<CliProvider> for Provider {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Gemini => Provider::Gemini,
            CliProvider::Openai => Provider::Openai,
            CliProvider::Openrouter => Provider::Openrouter,
        }
    }
}

#[derive(Parser)]
#[command(name = "rebait")]
#[command(about = "Fetch a YouTube video's transcript and metadata and de-clickbait its title")]
struct Cli {
    /// YouTube video URL or bare 11-character video ID
    url: String,

    /// Cache directory path (default: a rebait_cache folder in the temp dir)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Gemini API key (optional, defaults to GEMINI_API_KEY env var)
    #[arg(long)]
    gemini_key: Option<String>,

    /// LLM provider (overrides REBAIT_PROVIDER)
    #[arg(short, long)]
    provider: Option<CliProvider>,

    /// Prompt template file
    #[arg(long, default_value = "prompt.txt")]
    prompt_file: PathBuf,

    /// Force refresh all cached data
    #[arg(short, long)]
    force: bool,

    /// Skip acquisition when transcript, metadata and flattened caches exist
    #[arg(short = 'a', long)]
    ai_only: bool,
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn load_template(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(content) => content.trim().to_string(),
        Err(_) => {
            eprintln!(
                "{} {} not found, using built-in prompt",
                style("Warning:").yellow().bold(),
                path.display()
            );
            DEFAULT_TEMPLATE.to_string()
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(provider) = cli.provider {
        config.provider = provider.into();
    }
    config.gemini_key = cli.gemini_key;

    let video_id = VideoId::resolve(&cli.url)?;
    let cache_root = cli
        .cache_dir
        .unwrap_or_else(|| std::env::temp_dir().join("rebait_cache"));
    let cache = CacheStore::new(cache_root);
    let template = load_template(&cli.prompt_file);

    // Validates provider key and model before any network work.
    let pipeline = Pipeline::new(cache, &config)?;

    let spinner = create_spinner(&format!(
        "Processing {} with {}...",
        video_id,
        config.provider.name()
    ));
    let result = pipeline
        .run(
            &video_id,
            &PipelineOptions {
                force: cli.force,
                ai_only: cli.ai_only,
                template,
            },
        )
        .await;
    spinner.finish_and_clear();

    let result = result?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        println!("Error: {err}");
        std::process::exit(1);
    }
}
