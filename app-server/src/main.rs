use std::net::IpAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use logreplay_core::ReplayConfig;
use tokio::net::TcpListener;

#[derive(Debug, Parser)]
#[command(version, about = "Replay log lines through the detection engine over WebSocket")]
struct Args {
    /// Address to bind.
    #[arg(long, env = "LOGREPLAY_BIND", default_value = "127.0.0.1")]
    bind: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();
    let args = Args::parse();

    let config = ReplayConfig::from_env().context("invalid replay configuration")?;
    let listener = TcpListener::bind((args.bind, args.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", args.bind, args.port))?;

    logreplay_app_server::serve(listener, Arc::new(config), shutdown_signal()).await
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn setup_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
