use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use server::{build_app, AppState, JobQueue, WorkerConfig};
use sync_core::gateway::ElasticsearchGateway;
use sync_core::store::MemoryStore;
use sync_core::{SyncConfig, SyncCoordinator};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// JSON config file; defaults apply when omitted
    #[arg(long)]
    config: Option<String>,
    /// Forum snapshot file or directory
    #[arg(long)]
    snapshot: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Accept events without indexing them
    #[arg(long, default_value_t = false)]
    disabled: bool,
    #[arg(long, default_value_t = 1024)]
    queue_size: usize,
    #[arg(long, default_value_t = 4)]
    concurrency: usize,
    #[arg(long, default_value_t = 3)]
    max_retries: u32,
    #[arg(long, default_value_t = 500)]
    retry_backoff_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => SyncConfig::from_json_file(path)?,
        None => SyncConfig::default(),
    };
    let store = Arc::new(MemoryStore::load_path(&args.snapshot)?);
    let gateway = Arc::new(ElasticsearchGateway::new(&config)?);
    let coordinator = Arc::new(SyncCoordinator::new(&config, store, gateway));

    let worker = WorkerConfig {
        queue_size: args.queue_size,
        concurrency: args.concurrency,
        max_retries: args.max_retries,
        retry_backoff_ms: args.retry_backoff_ms,
    };
    let (queue, _worker) = JobQueue::start(coordinator.clone(), worker);
    let state = AppState {
        coordinator,
        queue,
        admin_token: std::env::var("ADMIN_TOKEN").ok(),
        enabled: !args.disabled,
    };
    let app = build_app(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, index_server = %config.server_url(), "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
