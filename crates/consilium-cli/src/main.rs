use anyhow::Context as _;
use clap::{Parser, Subcommand};
use consilium_agents::HttpLlmClient;
use consilium_core::{AuditLog, Language, OrchestratorConfig, Query};
use consilium_gateway::GatewayServer;
use consilium_orchestrator::Orchestrator;
use consilium_retrieval::{HttpRetrievalClient, InMemoryRetrieval, RetrievalClient};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "consilium", about = "Consilium — multi-agent medical QA engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "consilium.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
    /// Run a single query against a local document directory
    Query {
        /// The question to ask
        text: String,
        /// Target language code (EN, FR, ES, DE)
        #[arg(long)]
        lang: Option<String>,
        /// Disable the human-validation loop for this query
        #[arg(long)]
        no_human_loop: bool,
    },
}

#[derive(serde::Deserialize)]
struct ConsiliumConfig {
    llm: LlmSection,
    #[serde(default)]
    retrieval: RetrievalSection,
    #[serde(default)]
    orchestrator: OrchestratorConfig,
    #[serde(default = "default_data_dir")]
    data_dir: PathBuf,
}

#[derive(serde::Deserialize)]
struct LlmSection {
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(serde::Deserialize, Default)]
struct RetrievalSection {
    /// Retrieval service endpoint (used by `serve`).
    base_url: Option<String>,
    /// Local directory of .txt/.md documents (used by `query`).
    docs_dir: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let config_str = tokio::fs::read_to_string(&cli.config)
        .await
        .with_context(|| format!("failed to read config file '{}'", cli.config.display()))?;
    let config: ConsiliumConfig = toml::from_str(&config_str)?;

    let llm = Arc::new(HttpLlmClient::new(
        &config.llm.base_url,
        &config.llm.api_key,
        &config.llm.model,
    ));
    let audit = Arc::new(AuditLog::new(config.data_dir.join("audit")));

    match cli.command {
        Commands::Serve { host, port } => {
            let retrieval_url = config
                .retrieval
                .base_url
                .clone()
                .context("retrieval.base_url is required for serve")?;
            let retrieval: Arc<dyn RetrievalClient> =
                Arc::new(HttpRetrievalClient::new(retrieval_url));

            let orchestrator = Arc::new(Orchestrator::new(
                config.orchestrator,
                llm,
                retrieval,
                audit,
            ));
            orchestrator
                .cache()
                .spawn_sweeper(std::time::Duration::from_secs(60));

            let app = GatewayServer::build(orchestrator);
            let addr = format!("{}:{}", host, port);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("Consilium gateway listening on {}", addr);
            axum::serve(listener, app).await?;
        }
        Commands::Query {
            text,
            lang,
            no_human_loop,
        } => {
            let store = InMemoryRetrieval::new();
            if let Some(dir) = &config.retrieval.docs_dir {
                seed_documents(&store, dir).await?;
                info!(documents = store.len().await, "Document corpus loaded");
            }
            let retrieval: Arc<dyn RetrievalClient> = Arc::new(store);

            let orchestrator = Orchestrator::new(config.orchestrator, llm, retrieval, audit);

            let mut query = Query::new(text);
            if let Some(code) = lang {
                query.target_language = Some(
                    Language::parse(&code)
                        .with_context(|| format!("unsupported language code: {code}"))?,
                );
            }
            query.enable_human_loop = !no_human_loop;

            let response = orchestrator.process_query(query).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}

/// Load every .txt/.md file in `dir` into the in-memory corpus, keyed by
/// file stem.
async fn seed_documents(store: &InMemoryRetrieval, dir: &PathBuf) -> anyhow::Result<()> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to read docs dir '{}'", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_doc = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("txt") | Some("md")
        );
        if !is_doc {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let text = tokio::fs::read_to_string(&path).await?;
        store.insert(stem.to_string(), text).await;
    }
    Ok(())
}
