mod rpc;
mod spaced_repetition;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "langleague-review")]
#[command(about = "Spaced-repetition review service for saved vocabulary and grammar")]
struct Cli {
    #[arg(long, default_value = "http")]
    mode: String,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value = "21430")]
    port: u16,

    /// Where review data lives (defaults to the local data directory)
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("langleague")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);

    match cli.mode.as_str() {
        "http" => {
            tracing::info!(
                "Starting langleague-review HTTP server on {}:{} (data: {:?})",
                cli.host,
                cli.port,
                data_dir
            );
            rpc::run_http_server(&cli.host, cli.port, data_dir).await
        }
        "stdio" => {
            tracing::info!("Starting langleague-review JSON-RPC server (stdio mode)");
            rpc::run_stdio_server(data_dir).await
        }
        _ => {
            anyhow::bail!("Invalid mode: {}. Use 'http' or 'stdio'", cli.mode)
        }
    }
}
