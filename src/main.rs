use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use narrator::{
    FilesystemCache, MemoryCache, NarrationError, Narrator, NarratorConfig, SynthesisCache,
    create_synthesis_engine, plan_script,
};

/// Narrator - chunked, cached, parallel narration synthesis
#[derive(Parser, Debug)]
#[command(name = "narrator")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Narrate a script into a single WAV file
    Synthesize {
        /// Script file; `-` reads standard input
        script: PathBuf,

        /// Output WAV path
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },

    /// Print the chunk plan for a script as JSON
    Plan {
        /// Script file; `-` reads standard input
        script: PathBuf,
    },

    /// Inspect or clear the synthesis cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Show entry count and size
    Stats,

    /// Remove every cached entry
    Clear,

    /// Print the cache key for a piece of text
    Key {
        #[arg(long)]
        text: String,

        /// Voice id; defaults to the configured default voice
        #[arg(long)]
        voice: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file or environment
    let config = if let Some(config_path) = cli.config {
        info!("Loading configuration from {}", config_path.display());
        NarratorConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        NarratorConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    match cli.command {
        Commands::Synthesize { script, output } => synthesize(config, &script, output).await,
        Commands::Plan { script } => {
            let text = read_script(&script).await?;
            let chunks = plan_script(&config, &text)?;
            println!("{}", serde_json::to_string_pretty(&chunks)?);
            Ok(())
        }
        Commands::Cache { action } => cache_command(&config, action).await,
    }
}

async fn synthesize(config: NarratorConfig, script: &Path, output: PathBuf) -> anyhow::Result<()> {
    let text = read_script(script).await?;
    let engine = create_synthesis_engine(&config.engine)?;
    let cache: Arc<dyn SynthesisCache> = if config.cache_enabled {
        Arc::new(FilesystemCache::open(&config.cache_path).await?)
    } else {
        Arc::new(MemoryCache::new())
    };
    let narrator = Narrator::new(config, engine, cache);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling narration");
            on_signal.cancel();
        }
    });

    match narrator.run(&text, &output, &cancel).await {
        Ok(outcome) => {
            println!(
                "Wrote {} ({} ms, {} chunks, cache hit rate {:.0}%)",
                outcome.output_path.display(),
                outcome.stitch.duration_ms,
                outcome.report.summary.total_chunks,
                outcome.report.summary.cache_hit_rate * 100.0
            );
            println!("Telemetry report: {}", outcome.report_path.display());
            Ok(())
        }
        Err(NarrationError::Cancelled) => Err(anyhow!("Narration cancelled")),
        Err(e) => Err(e.into()),
    }
}

async fn cache_command(config: &NarratorConfig, action: CacheAction) -> anyhow::Result<()> {
    match action {
        CacheAction::Stats => {
            let cache = FilesystemCache::open(&config.cache_path).await?;
            let stats = cache.stats().await?;
            println!(
                "{}: {} entries, {} bytes",
                cache.root().display(),
                stats.entries,
                stats.total_bytes
            );
        }
        CacheAction::Clear => {
            let cache = FilesystemCache::open(&config.cache_path).await?;
            let removed = cache.clear().await?;
            println!("Removed {removed} entries from {}", cache.root().display());
        }
        CacheAction::Key { text, voice } => {
            let voice = voice.as_deref().unwrap_or(&config.default_voice);
            println!("{}", config.cache_key(&text, voice));
        }
    }
    Ok(())
}

async fn read_script(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut tokio::io::stdin(), &mut text)
            .await
            .context("Failed to read script from stdin")?;
        return Ok(text);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read script {}", path.display()))
}
