//! SQL Explorer - main entry point.

use clap::Parser;
use sql_explorer::auth::AuthConfig;
use sql_explorer::config::{Config, TransportMode};
use sql_explorer::embedding::build_embedder;
use sql_explorer::error::ExplorerError;
use sql_explorer::llm::OpenAiChatModel;
use sql_explorer::logging;
use sql_explorer::transport::{HttpTransport, ReplTransport, Transport};
use sql_explorer::{Session, Settings};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Logs go to stderr so they never interleave with REPL output, and to the
/// daily log file unless disabled. A log file that cannot be opened is
/// returned as a warning once tracing is up.
fn init_tracing(config: &Config) -> Option<ExplorerError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let (file_layer, file_error) = match config.log_file_dir().map(logging::open_daily_log) {
        Some(Ok((_, file))) => {
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(std::sync::Mutex::new(file))
                .with_filter(logging::file_filter());
            (Some(layer), None)
        }
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry().with(file_layer);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr).with_filter(filter))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr)
                    .with_filter(filter),
            )
            .init();
    }
    file_error
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    if let Some(e) = init_tracing(&config) {
        warn!(error = %e, "Logging to stderr only");
    }

    info!(
        transport = %config.transport,
        "Starting SQL Explorer v{}",
        env!("CARGO_PKG_VERSION")
    );

    let settings = Arc::new(Settings::load(&config.config)?);
    let embedder = build_embedder(&settings.embedding)?;
    let model = Arc::new(OpenAiChatModel::from_settings(&settings.llm)?);
    info!(
        embedder = %embedder.model_id(),
        index_dir = %settings.index.dir.display(),
        top_k = settings.index.top_k,
        "Pipeline ready"
    );

    let mut session = Session::new(settings.clone(), embedder, model);
    if let Some(database) = config.database.as_deref() {
        let target = settings.resolve_target(database)?;
        match session.connect(target).await {
            Ok(report) => {
                if let Some(warning) = report.warning {
                    warn!(database = %report.database_id, "{}", warning);
                }
            }
            // Connection failures are fatal at startup; anything else leaves a usable session
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => warn!(error = %e, "Startup connection incomplete"),
        }
    }
    let session = Arc::new(Mutex::new(session));

    let result = match config.transport {
        TransportMode::Repl => ReplTransport::new(session, config.output).run().await,
        TransportMode::Http => {
            let auth = AuthConfig::from_tokens(&config.auth_tokens)?;
            if !auth.is_enabled() {
                warn!("HTTP API is running without authentication");
            }
            HttpTransport::new(session, auth, &config.http_host, config.http_port)
                .run()
                .await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Exiting with error");
        return Err(e.into());
    }

    info!("Shutdown complete");
    Ok(())
}
