//! relayd - bounded-latency answer relay
//!
//! Serves `/chat`, races the answer engine against the configured deadline and
//! hands late answers to the callback endpoint.

use anyhow::{Context, Result};
use clap::Parser;
use relay_shared::VersionInfo;
use relayd::cli::{Cli, Commands, SettingsCommands};
use relayd::config::Config;
use relayd::db::Database;
use relayd::dispatcher::{CallbackSink, HttpCallbackDispatcher};
use relayd::engine::HttpAnswerEngine;
use relayd::ledger::SqliteLedger;
use relayd::server::{self, AppState};
use relayd::settings::SettingsStore;
use relayd::{sink, Orchestrator};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load(),
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Sink { bind } => sink::run(&bind).await,
        Commands::PingCallback { user } => ping_callback(&config, &user).await,
        Commands::Settings { action } => settings_command(&config, action).await,
        Commands::Stats { user, top } => stats(&config, user.as_deref(), top).await,
        Commands::InitConfig { path } => Config::save_default(&path),
        Commands::Version => {
            println!("relayd {}", VersionInfo::current());
            Ok(())
        }
    }
}

struct Stack {
    orchestrator: Arc<Orchestrator>,
    refresh: JoinHandle<()>,
}

async fn open_stack(config: &Config) -> Result<Stack> {
    let db = Database::open(&config.storage.db_path)
        .await
        .with_context(|| format!("opening {}", config.storage.db_path.display()))?;
    let store = Arc::new(SettingsStore::open(db.clone()).await.context("loading settings")?);
    let settings = store.handle();
    let ledger = SqliteLedger::open(db, settings.clone())
        .await
        .context("preparing ledger tables")?;

    let engine_timeout = match config.engine.request_timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    let engine = HttpAnswerEngine::new(&config.engine.url, engine_timeout)?;
    let dispatcher = HttpCallbackDispatcher::new(settings.clone())?;

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(engine),
        Arc::new(ledger),
        Arc::new(dispatcher),
        settings,
    ));
    let interval = Duration::from_secs(config.settings.refresh_interval_secs.max(1));
    let refresh = store.spawn_refresh(interval);

    Ok(Stack {
        orchestrator,
        refresh,
    })
}

async fn serve(config: Config) -> Result<()> {
    info!("relayd {} starting", VersionInfo::current());
    info!("  Engine: {}", config.engine.url);

    let (state, stack) = match open_stack(&config).await {
        Ok(stack) => (AppState::new(Arc::clone(&stack.orchestrator)), Some(stack)),
        Err(e) => {
            error!("Ledger unavailable at startup: {:#}", e);
            (AppState::degraded(), None)
        }
    };

    server::run(state, &config.server.bind, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
        }
    })
    .await?;

    if let Some(stack) = stack {
        stack.refresh.abort();
        stack.orchestrator.shutdown().await;
    }
    info!("Shutting down gracefully");
    Ok(())
}

async fn open_settings(config: &Config) -> Result<(Database, SettingsStore)> {
    let db = Database::open(&config.storage.db_path)
        .await
        .with_context(|| format!("opening {}", config.storage.db_path.display()))?;
    let store = SettingsStore::open(db.clone()).await?;
    Ok((db, store))
}

async fn ping_callback(config: &Config, user: &str) -> Result<()> {
    let (_, store) = open_settings(config).await?;
    let settings = store.handle();
    println!("Sending test message to {}", settings.snapshot().callback_url);

    let dispatcher = HttpCallbackDispatcher::new(settings)?;
    match dispatcher.deliver(user, "relayd callback test").await {
        Ok(receipt) => {
            println!("Delivered (HTTP {}, {} chars)", receipt.status, receipt.content_chars);
            Ok(())
        }
        Err(e) => {
            println!("Delivery failed: {}", e);
            Err(e.into())
        }
    }
}

async fn settings_command(config: &Config, action: SettingsCommands) -> Result<()> {
    let (db, store) = open_settings(config).await?;
    match action {
        SettingsCommands::Show => {
            if let Some(path) = db.path() {
                println!("# {}", path.display());
            }
            for (key, value, description) in store.all().await? {
                println!("{:<22} {:<44} {}", key, value, description);
            }
        }
        SettingsCommands::Set { key, value } => {
            store.set(&key, &value).await?;
            println!("{} = {}", key, value);
        }
    }
    Ok(())
}

async fn stats(config: &Config, user: Option<&str>, top: usize) -> Result<()> {
    let (db, store) = open_settings(config).await?;
    let ledger = SqliteLedger::open(db, store.handle()).await?;

    if let Some(user) = user {
        match ledger.aggregate(user).await? {
            Some(agg) => println!(
                "{}: {} queries, avg {:.2}s, first {}, last {}",
                agg.user_id,
                agg.total_queries,
                agg.avg_response_time(),
                agg.first_query_time,
                agg.last_query_time
            ),
            None => println!("{}: no queries", user),
        }
    }

    for q in ledger.popular_questions(top).await? {
        println!("{:>5}  {}  {}", q.count, q.last_asked.format("%Y-%m-%d %H:%M"), q.question);
    }
    Ok(())
}
