mod cli_args;
mod console;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use roomie_bot::{BotConfig, Conversation};
use roomie_runtime::{ActorDispatcher, BotRuntime, IntentExecutor};
use roomie_store::{InMemoryRecordStore, RecordStore, SqliteRecordStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::cli_args::Cli;
use crate::console::{parse_line, ConsoleGateway};

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn open_store(cli: &Cli) -> Result<Arc<dyn RecordStore>> {
    if cli.in_memory {
        tracing::info!("using in-memory record store");
        return Ok(Arc::new(InMemoryRecordStore::new()));
    }
    let store = SqliteRecordStore::new(&cli.database).with_context(|| {
        format!(
            "failed to open record store at {}",
            cli.database.display()
        )
    })?;
    Ok(Arc::new(store))
}

async fn run_cli(cli: Cli) -> Result<()> {
    let config = BotConfig::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    let store = open_store(&cli)?;
    let gateway = Arc::new(ConsoleGateway::new());
    let conversation = Arc::new(
        Conversation::new(&config, store, gateway.clone())
            .context("invalid bot configuration")?,
    );
    let executor = Arc::new(IntentExecutor::new(gateway, &config.runtime));
    let runtime = Arc::new(BotRuntime::new(
        conversation,
        executor,
        config.runtime.handle_timeout(),
    ));
    let dispatcher = ActorDispatcher::new(runtime, config.runtime.worker_idle_timeout());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match parse_line(&line) {
                    Ok(Some(event)) => dispatcher.submit(event).await?,
                    Ok(None) => {}
                    Err(error) => tracing::warn!(error = %error, line = %line, "ignoring console input"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received");
                break;
            }
        }
    }

    dispatcher.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run_cli(cli).await
}
