//! HTTP server that relays chat messages to Gemini and streams replies
//! back as server-sent events, extracting fenced code blocks as artifacts
//! while the reply is still in flight.
//!
//! # Usage
//!
//! ```bash
//! # Serve on the default address (127.0.0.1:8000)
//! geminus-serve
//!
//! # Bind elsewhere
//! geminus-serve --listen 0.0.0.0:8080
//! ```
//!
//! Configuration comes from the environment: `GEMINUS_API_KEY` (required),
//! `GEMINUS_MODEL`, and `GEMINUS_CORS_ALLOW_ORIGINS`.  Log verbosity
//! follows `RUST_LOG` (default `info`).

use std::sync::Arc;

use arrrg::CommandLine;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use geminus::config::{ServeArgs, Settings};
use geminus::{AppState, ConversationStore, Gemini, cors_layer, router};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ServeArgs::from_command_line_relaxed("geminus-serve [OPTIONS]");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env();
    let source = Gemini::with_options(settings.api_key.clone(), None, settings.model.clone(), None)?;
    let state = AppState::new(Arc::new(ConversationStore::new()), Arc::new(source));
    let app = router(state).layer(cors_layer(settings.cors_origins()));

    let addr = args.listen_addr().to_string();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    // Serve until interrupted; any signal delivery error just means we
    // keep running without graceful shutdown.
    let _ = tokio::signal::ctrl_c().await;
}
