use anyhow::{Context, Result};
use clap::Parser;
use interview_api::config::{Config, Provider};
use interview_api::{AppState, app};
use interview_core::HistoryStore;
use interview_core::file_store::FileHistoryStore;
use interview_core::openai::OpenAiInterviewer;
use interview_core::prompts::PromptSet;
use interview_core::scripted::ScriptedInterviewer;
use interview_core::store::InMemoryHistoryStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "AI mock interview API server")]
struct Cli {
    /// Overrides BIND_ADDRESS
    #[arg(long)]
    bind: Option<SocketAddr>,
    /// Overrides STORE_DIR
    #[arg(long)]
    store_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let cli = Cli::parse();
    let mut config = Config::from_env().context("Failed to load application configuration")?;
    if let Some(bind) = cli.bind {
        config.bind_address = bind;
    }
    if let Some(dir) = cli.store_dir {
        config.store_dir = Some(dir);
    }

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded successfully. Starting interview service...");

    // --- 3. History Store ---
    let store: Arc<dyn HistoryStore> = match &config.store_dir {
        Some(dir) => Arc::new(
            FileHistoryStore::open(dir)
                .await
                .context("Failed to open the session store")?,
        ),
        None => {
            info!("STORE_DIR not set; sessions are kept in memory only");
            Arc::new(InMemoryHistoryStore::new())
        }
    };

    // --- 4. Interviewer ---
    let state = match config.provider {
        Provider::OpenAI => {
            let prompts = match &config.prompts_dir {
                Some(dir) => PromptSet::load(dir).context("Failed to load LLM prompts")?,
                None => PromptSet::builtin(),
            };
            let api_key = config
                .openai_api_key
                .clone()
                .context("OPENAI_API_KEY must be set for 'openai' provider")?;
            let interviewer = Arc::new(OpenAiInterviewer::new(
                api_key,
                config.chat_model.clone(),
                config.transcription_model.clone(),
                prompts,
            ));
            info!("Using OpenAI interviewer with model {}", config.chat_model);
            AppState::new(
                store,
                interviewer.clone(),
                interviewer.clone(),
                interviewer,
                config.oracle_timeout,
            )
        }
        Provider::Scripted => {
            let interviewer = Arc::new(ScriptedInterviewer::default());
            info!("Using scripted interviewer; no model calls will be made");
            AppState::new(
                store,
                interviewer.clone(),
                interviewer.clone(),
                interviewer,
                config.oracle_timeout,
            )
        }
    };

    // --- 5. Serve ---
    let router = app(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    info!("Listening on {}", config.bind_address);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Received Ctrl-C, shutting down...");
        })
        .await?;

    Ok(())
}
