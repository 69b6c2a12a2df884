use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use gwen_relay::{config::RelayConfig, routing};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gwen-relay", about = "Streaming chat relay in front of a workflow webhook or model provider")]
struct Args {
    /// Path to the TOML config; a missing file means defaults plus environment
    #[arg(long, env = "GWEN_CONFIG", default_value = "config/gwen.toml")]
    config: PathBuf,

    /// Overrides server.port
    #[arg(long)]
    port: Option<u16>,

    /// Log filter directives
    #[arg(long, env = "RUST_LOG", default_value = "info,gwen_relay=debug,reqwest=warn")]
    log: String,
}

fn init_tracing(directives: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directives))
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log);

    let mut cfg = RelayConfig::load(&args.config).await?;
    if let Some(port) = args.port {
        cfg.server.port = port;
    }

    let app = routing::router(routing::AppState::from_config(&cfg)?);

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Gwen relay listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
