//! Filesystem authority server — entry point.
//!
//! # Environment variables
//!
//! | Variable               | Default                      | Description                              |
//! |-------------------------|-------------------------------|------------------------------------------|
//! | `SYNAPSE_FSAUTH_PORT`   | `8002`                        | TCP port to listen on.                   |
//! | `SYNAPSE_ALLOWED_ROOTS` | `output,temp` under the cwd   | Comma-separated allow-list root paths.   |

use std::path::PathBuf;
use synapse_fsauth::{path::canonicalize_root, server, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("synapse_fsauth=info".parse().unwrap()))
        .init();

    let port: u16 = std::env::var("SYNAPSE_FSAUTH_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8002);

    let roots_env = std::env::var("SYNAPSE_ALLOWED_ROOTS").unwrap_or_else(|_| "output,temp".to_string());
    let allowed_roots: Vec<PathBuf> = roots_env
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|root| canonicalize_root(&PathBuf::from(root)).unwrap_or_else(|e| panic!("cannot prepare allow-list root '{root}': {e}")))
        .collect();

    tracing::info!(
        port,
        allowed_roots = ?allowed_roots.iter().map(|r| r.display().to_string()).collect::<Vec<_>>(),
        "filesystem authority starting"
    );

    let app = server::router(AppState::new(allowed_roots));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await.expect("failed to bind fsauth listener");

    axum::serve(listener, app).await.expect("fsauth server crashed");
}
