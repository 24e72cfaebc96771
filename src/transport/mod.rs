//! User-facing surfaces.
//!
//! - REPL: interactive terminal session (default)
//! - HTTP: JSON API for scripted use
//!
//! Both drive one [`Session`] behind a mutex, so at most one request is in
//! flight at a time.

pub mod http;
pub mod repl;

pub use http::HttpTransport;
pub use repl::ReplTransport;

use crate::error::ExplorerResult;
use crate::pipeline::Session;
use std::future::Future;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// The process-wide session.
pub type SharedSession = Arc<Mutex<Session>>;

pub trait Transport: Send + Sync {
    /// Serve until the user quits or a shutdown signal arrives.
    fn run(&self) -> impl Future<Output = ExplorerResult<()>> + Send;

    fn name(&self) -> &'static str;
}

/// Wait for SIGINT or SIGTERM.
pub(crate) async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
