use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use wallet_ledger::config::StoreArgs;
use wallet_ledger::{cli, server, TransferEngine};

#[derive(Parser)]
#[command(name = "wallet-ledger")]
#[command(about = "Atomic transfers between wallet balances")]
enum Cli {
    /// Apply a CSV file of requests and print the replies
    #[command(name = "run")]
    Run {
        input: PathBuf,
        #[command(flatten)]
        store: StoreArgs,
        /// Requests served at once; replies keep input order
        #[arg(long, default_value = "1")]
        concurrency: usize,
        /// Write the final wallet table here
        #[arg(long)]
        wallets_out: Option<PathBuf>,
    },
    /// Run TCP server
    #[command(name = "server")]
    Server {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
        #[arg(long, default_value = "1000")]
        max_connections: usize,
        #[command(flatten)]
        store: StoreArgs,
    },
}

fn init_logging(default_level: tracing::Level) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse() {
        Cli::Run {
            input,
            store,
            concurrency,
            wallets_out,
        } => {
            // Batch mode: stdout carries replies only
            init_logging(tracing::Level::WARN);
            let engine = TransferEngine::with_config(store.open_store().await?, store.engine_config());
            cli::run(input, engine, concurrency, wallets_out).await?;
        }
        Cli::Server {
            bind,
            max_connections,
            store,
        } => {
            init_logging(tracing::Level::INFO);
            let engine = TransferEngine::with_config(store.open_store().await?, store.engine_config());
            server::run(bind, max_connections, engine).await?;
        }
    }

    Ok(())
}
