//! Conduit Server binary — CLI bootstrap for the bundled HTTP/SSE API.

use clap::Parser;
use conduit_server::{start_server, ServerConfig};

/// Self-hosted agent task orchestrator API.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Port to bind the HTTP surface on.
    #[arg(long, env = "CONDUIT_PORT", default_value_t = 3000)]
    port: u16,

    /// Language-model credential (opaque string, §6). Read but never logged;
    /// the bundled demo binary doesn't dial a network provider with it — see
    /// `ServerConfig` for why.
    #[arg(long, env = "CONDUIT_MODEL_CREDENTIAL", default_value = "")]
    model_credential: String,

    /// Which bundled tool tree to mount (§A6 — currently only "demo").
    #[arg(long, env = "CONDUIT_TOOL_SOURCE", default_value = "demo")]
    tool_source: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    start_server(ServerConfig {
        port: cli.port,
        model_credential: cli.model_credential,
        tool_source: cli.tool_source,
    })
    .await
}
