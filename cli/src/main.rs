use clap::Parser;
use logreplay_cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let code = logreplay_cli::run_main(cli).await?;
    std::process::exit(code);
}

fn setup_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
