//! Process entry point: wires the Postgres-backed store, in-process shared
//! state, the HTTP extractor, and the orchestrator into `docspasta-server`'s
//! router, then serves it. Mirrors `rootsignal-server/src/main.rs`'s
//! shape (CLI → config → pool → migrate → build deps → serve) without the
//! AI/Restate machinery this system has no use for.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use docspasta_extract::Extractor;
use docspasta_store::{InMemorySharedState, PgEventLog, PgJobStore};
use docspasta_worker::Orchestrator;

#[derive(Parser)]
#[command(name = "docspasta", about = "Distributed documentation crawler")]
struct Cli {
    /// Address to bind the HTTP surface on.
    #[arg(long, env = "DOCSPASTA_BIND", default_value = "0.0.0.0:8080")]
    bind: String,

    /// Postgres connection string for the jobs/pages/events store.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// User-Agent sent on outbound crawl requests.
    #[arg(long, env = "DOCSPASTA_USER_AGENT", default_value = "docspasta/0.1")]
    user_agent: String,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match std::env::var("RUST_LOG_FORMAT").as_deref() {
        Ok("pretty") => subscriber.pretty().init(),
        _ => subscriber.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    tracing::info!("starting docspasta");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cli.database_url)
        .await
        .context("failed to connect to Postgres")?;

    sqlx::migrate!("../migrations").run(&pool).await.context("running migrations")?;
    tracing::info!("migrations complete");

    // Shared dedup/queue/progress state is in-process (SPEC_FULL.md §9's
    // open question: the durable `(job_id, url_hash)` constraint is
    // authoritative, this is a cache rebuilt from `known_url_hashes` on
    // restart — see README.md).
    let orchestrator = Orchestrator::new(
        Arc::new(PgJobStore::new(pool.clone())),
        Arc::new(PgEventLog::new(pool)),
        Arc::new(InMemorySharedState::new()),
        Arc::new(Extractor::new(cli.user_agent)),
    );

    let state = docspasta_server::AppState::new(Arc::new(orchestrator));
    let app = docspasta_server::build_router(state);

    let listener = tokio::net::TcpListener::bind(&cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;
    tracing::info!(addr = %cli.bind, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
