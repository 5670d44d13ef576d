use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use decision_pipeline::{BreakerRegistry, Orchestrator};
use decision_protocol::{DecisionRecord, OutputPreferences, ResolveRequest};
use decision_server::{config::ServerConfig, http_api, AppState, MetricsExporter};
use decision_store::DecisionStore;
use decision_taxonomy::{TagNormalizer, Taxonomy};

#[derive(Parser)]
#[command(name = "decision-finder")]
#[command(about = "Hebrew question answering over the government decision corpus", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the resolve API over HTTP
    Serve,

    /// Resolve a single question and print the JSON response
    Resolve {
        /// The Hebrew question
        text: String,

        /// Titles and dates only, no summaries
        #[arg(long)]
        brief: bool,
    },

    /// List canonical policy tags, or normalize one phrase
    Tags { phrase: Option<String> },

    /// Load decision records from a JSON file into the store
    Seed { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let json_output = matches!(cli.command, Commands::Resolve { .. });
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet || json_output {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Serve => serve().await,
        Commands::Resolve { text, brief } => resolve_once(&text, brief).await,
        Commands::Tags { phrase } => run_tags(phrase.as_deref()),
        Commands::Seed { file } => run_seed(&file),
    }
}

fn build_orchestrator(config: &ServerConfig) -> Result<(Orchestrator, Arc<DecisionStore>)> {
    let store = Arc::new(
        DecisionStore::open(&config.db_path)
            .with_context(|| format!("open decision store at {}", config.db_path.display()))?,
    );
    let breakers = Arc::new(BreakerRegistry::new(config.breaker));
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        config.endpoints.clone(),
        breakers,
        config.pipeline.clone(),
    );
    Ok((orchestrator, store))
}

async fn serve() -> Result<()> {
    let config = ServerConfig::from_env();
    let (orchestrator, store) = build_orchestrator(&config)?;

    let metrics = match config.metrics_port {
        Some(port) => Some(MetricsExporter::start(port).context("start metrics exporter")?),
        None => None,
    };

    let state = Arc::new(AppState {
        orchestrator,
        store,
        metrics,
    });
    let app = http_api::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("bind {}", config.bind))?;
    log::info!("resolve API listening on http://{}", config.bind);
    axum::serve(listener, app).await.context("serve HTTP API")?;
    Ok(())
}

async fn resolve_once(text: &str, brief: bool) -> Result<()> {
    let config = ServerConfig::from_env();
    let (orchestrator, _store) = build_orchestrator(&config)?;

    let request = ResolveRequest {
        text: text.to_string(),
        session_id: None,
        output: OutputPreferences {
            max_results: None,
            brief,
        },
    };
    let response = orchestrator.resolve(&request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn run_tags(phrase: Option<&str>) -> Result<()> {
    match phrase {
        Some(phrase) => {
            let normalizer = TagNormalizer::builtin();
            match normalizer.normalize(phrase) {
                Some(tag) => println!("{tag}"),
                None => println!("(no canonical tag)"),
            }
        }
        None => {
            let taxonomy = Taxonomy::builtin();
            for tag in taxonomy.tags() {
                println!("{tag}");
            }
        }
    }
    Ok(())
}

fn run_seed(file: &Path) -> Result<()> {
    let config = ServerConfig::from_env();
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("read seed file {}", file.display()))?;
    let records: Vec<DecisionRecord> =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", file.display()))?;

    let store = DecisionStore::open(&config.db_path)
        .with_context(|| format!("open decision store at {}", config.db_path.display()))?;
    let inserted = store.seed(&records).context("insert records")?;
    println!("seeded {inserted} records into {}", config.db_path.display());
    Ok(())
}
