//! HTTP server binary for doctomd.
//!
//! Reads [`ServiceConfig`] from the environment, lets a few CLI flags
//! override it, and serves the conversion API until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use doctomd::converter::llm;
use doctomd::server::{router, AppState};
use doctomd::{Orchestrator, ServiceConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "doctomd",
    version,
    about = "Convert PDF, DOCX, PPTX, CSV, images and web pages to Markdown over HTTP",
    long_about = "Serves the DocToMarkdown API.\n\n\
        Every option below also has an environment variable; the usual \
        service settings (MISTRAL_API_KEY, MISTRAL_MODEL, DOCTOMD_*) are read \
        from the environment as well."
)]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// Port to listen on.
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,

    /// Directory holding the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Directory for staged uploads.
    #[arg(long, env = "DOCTOMD_STAGING_DIR")]
    staging_dir: Option<PathBuf>,
}

impl Cli {
    fn apply(self, mut config: ServiceConfig) -> ServiceConfig {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.verbose {
            config.debug = true;
        }
        if self.log_json {
            config.log_json = true;
        }
        if self.pdfium_lib_path.is_some() {
            config.pdfium_lib_path = self.pdfium_lib_path;
        }
        if self.staging_dir.is_some() {
            config.staging_dir = self.staging_dir;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.apply(ServiceConfig::from_env().context("Invalid service configuration")?);

    init_tracing(&config);
    info!(version = env!("CARGO_PKG_VERSION"), "doctomd starting");

    let provider = match llm::resolve_provider(&config) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "LLM provider unavailable; continuing without LLM");
            None
        }
    };
    let llm_available = provider.is_some();

    let orchestrator = Orchestrator::from_config(&config, provider)
        .context("Failed to build conversion orchestrator")?;
    let state = Arc::new(AppState::new(Arc::new(orchestrator), &config, llm_available));
    let app = router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(
        %addr,
        llm_available,
        provider = %config.llm_provider,
        model = %config.llm_model,
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("doctomd stopped");
    Ok(())
}

fn init_tracing(config: &ServiceConfig) {
    let default_level = if config.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{default_level},hyper=info,reqwest=info"))
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
