//! credence CLI - Uncertainty scoring for LLM answers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use credence::pipeline::{load_queries, score_batch};
use credence::{Config, LLMClient, UncertaintyPipeline};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "credence")]
#[command(author = "Infernet <dev@infernet.org>")]
#[command(version)]
#[command(about = "Score how much to trust an LLM answer before you use it")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "credence.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a single query
    Score {
        /// The query to score
        #[arg(short, long)]
        query: String,

        /// Override the configured number of samples
        #[arg(short, long)]
        samples: Option<usize>,

        /// Emit the full JSON report instead of the summary
        #[arg(long)]
        json: bool,
    },

    /// Score a JSONL file of queries
    Batch {
        /// Path to input queries JSONL file
        #[arg(short, long)]
        input: PathBuf,

        /// Path to output JSONL file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# credence configuration file

[provider]
# Any OpenAI-compatible chat-completions endpoint
base_url = "https://api.openai.com/v1"
model = "gpt-4.1-mini"
# api_key = "sk-..."          # or set CREDENCE_API_KEY
timeout_secs = 120
max_retries = 3
# Set to false for endpoints without token logprobs; perplexity and
# entropy then report as unavailable
supports_logprobs = true

[grading]
# model = "gpt-4o"            # defaults to the provider model
temperature = 0.0

[sampling]
n_samples = 5
temperature = 0.7
top_k_logprobs = 5

[scoring]
consistency_threshold = 0.85
consistency_gate = 0.8
reflection_gate = 0.5
perplexity_gate = 10.0
"#;
    println!("{example}");
}

/// Load config from the given path, falling back to defaults when the
/// file does not exist.
fn load_config(path: &PathBuf) -> Result<Config> {
    if path.exists() {
        Config::from_file(path).with_context(|| format!("Failed to load config from {path:?}"))
    } else {
        info!(path = %path.display(), "No config file, using defaults");
        Ok(Config::default())
    }
}

fn build_pipeline(config: &Config) -> Result<UncertaintyPipeline> {
    let api_key = match config.resolve_api_key() {
        Ok(key) => Some(key),
        Err(e) => {
            // Local endpoints run without auth; remote ones will 401
            warn!(error = %e, "No API key resolved, sending unauthenticated requests");
            None
        }
    };

    let client = Arc::new(LLMClient::from_config(config, api_key)?);
    Ok(UncertaintyPipeline::from_config(config, client))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

            config
                .resolve_api_key()
                .context("Failed to resolve API key")?;

            info!("Configuration is valid");
            info!("  Provider:   {}", config.provider.base_url);
            info!("  Model:      {}", config.provider.model);
            info!("  Grading:    {}", config.grading_model());
            info!("  Samples:    {}", config.sampling.n_samples);
            info!(
                "  Gates:      consistency > {}, reflection > {}, perplexity < {}",
                config.scoring.consistency_gate,
                config.scoring.reflection_gate,
                config.scoring.perplexity_gate
            );
            return Ok(());
        }

        Commands::Score {
            query,
            samples,
            json,
        } => {
            let config = load_config(&cli.config)?;
            let pipeline = build_pipeline(&config)?;

            let report = pipeline.run(&query, samples).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Query:       {}", report.query);
                println!("Consistency: {:.4}", report.metrics.consistency_score);
                println!("Reflection:  {:.4}", report.metrics.reflection_score);
                println!(
                    "Perplexity:  {:.4} (lower is better)",
                    report.metrics.perplexity
                );
                println!("Entropy:     {:.4}", report.metrics.entropy);
                println!("Status:      {}", report.status);
                println!("Answer:      {}", report.best_answer);
            }
        }

        Commands::Batch { input, output } => {
            let config = load_config(&cli.config)?;
            let pipeline = build_pipeline(&config)?;

            let queries = load_queries(&input)?;
            let stats = score_batch(&pipeline, queries, &output).await?;

            println!("\n=== Batch Scoring Complete ===");
            println!("Queries:     {}", stats.total_queries);
            println!("Scored:      {}", stats.scored);
            println!("Confident:   {}", stats.confident);
            println!("Uncertain:   {}", stats.uncertain);
            println!("Failed:      {}", stats.failed);
            println!("Confident:   {:.1}%", stats.confident_rate * 100.0);
            println!("Runtime:     {:.1}s", stats.runtime_secs);
            println!("Output:      {output:?}");
        }
    }

    Ok(())
}
