//! Thin binary wiring configuration, logging, the Postgres pool and
//! migrations, and (standalone) the timer scheduler. Contains no business
//! logic of its own (SPEC_FULL §2.1).

mod stub_ports;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use turn_engine::{EngineConfig, StoreConfig, SystemClock, TimerScheduler, TurnEngine};
use turn_store::{PgStore, PostgresConfig};

use stub_ports::{NullActorResolverPort, UnconfiguredLlmPort};

#[derive(Parser)]
#[command(name = "turn-service", version, about = "Campaign turn-resolution service")]
struct Cli {
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Apply any migrations under turn-store/migrations not yet recorded.
	RunMigrations,
	/// Boot the in-process TimerScheduler standalone against the store,
	/// recovering any active timers and running until interrupted.
	ServeTimers,
}

fn main() -> Result<()> {
	init_tracing();
	tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.context("failed to build tokio runtime")?
		.block_on(run())
}

fn init_tracing() {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_logfmt::builder().with_target(true))
		.init();
}

async fn run() -> Result<()> {
	let cli = Cli::parse();
	let store_config = StoreConfig::from_env().context("failed to load store configuration")?;

	match cli.command {
		Command::RunMigrations => run_migrations(store_config).await,
		Command::ServeTimers => serve_timers(store_config).await,
	}
}

async fn run_migrations(store_config: StoreConfig) -> Result<()> {
	let pg = connect(&store_config).await?;
	turn_store::run_migrations(pg.pool()).await.context("failed to apply migrations")?;
	tracing::info!("migrations applied");
	Ok(())
}

async fn serve_timers(store_config: StoreConfig) -> Result<()> {
	let pg = connect(&store_config).await?;
	let store: Arc<dyn turn_store::Store> = Arc::new(pg);

	let engine = Arc::new(TurnEngine::new(
		store.clone(),
		Arc::new(UnconfiguredLlmPort),
		Some(Arc::new(NullActorResolverPort)),
		EngineConfig::default(),
	));
	let scheduler = TimerScheduler::new(store, engine, Arc::new(SystemClock));

	let recovered = scheduler.recover_on_start().await.context("failed to recover active timers")?;
	tracing::info!(recovered, "timer scheduler started");

	tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
	tracing::info!("shutting down timer scheduler");
	Ok(())
}

async fn connect(store_config: &StoreConfig) -> Result<PgStore> {
	PgStore::connect(PostgresConfig {
		url: store_config.database_url.clone(),
		min_connections: store_config.min_connections,
		max_connections: store_config.max_connections,
		acquire_timeout: store_config.acquire_timeout(),
	})
	.await
	.context("failed to connect to the store")
}
