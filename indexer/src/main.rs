use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use sync_core::gateway::ElasticsearchGateway;
use sync_core::store::MemoryStore;
use sync_core::{schema, IndexGateway, IndexNames, SyncConfig, SyncCoordinator, SyncJob};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Maintain the forum search indices", long_about = None)]
struct Cli {
    /// JSON config file; defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<String>,
    /// Override the index server host
    #[arg(long, global = true)]
    host: Option<String>,
    /// Override the index server port
    #[arg(long, global = true)]
    port: Option<u16>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the users, posts and tags indices if they are missing
    CreateSchema,
    /// Delete an index by name; does nothing if it does not exist
    DropIndex {
        name: String,
    },
    /// Drop and recreate all three indices
    Reset,
    /// Index one user from a forum snapshot
    SyncUser {
        id: i64,
        #[arg(long)]
        snapshot: String,
    },
    /// Replace the fragment documents of one post
    SyncPost {
        id: i64,
        #[arg(long)]
        snapshot: String,
    },
    /// Reindex every post of a topic
    SyncTopic {
        id: i64,
        #[arg(long)]
        snapshot: String,
    },
    /// Index tags by name
    SyncTags {
        #[arg(required = true)]
        names: Vec<String>,
        #[arg(long)]
        snapshot: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SyncConfig::from_json_file(path)?,
        None => SyncConfig::default(),
    };
    if let Some(host) = cli.host {
        config.server_host = host;
    }
    if let Some(port) = cli.port {
        config.server_port = port;
    }

    let gateway = Arc::new(ElasticsearchGateway::new(&config)?);
    let names = IndexNames::new(config.index_prefix.clone());

    match cli.command {
        Commands::CreateSchema => schema::create_all(gateway.as_ref(), &names).await?,
        Commands::DropIndex { name } => {
            if gateway.drop_index(&name).await? {
                tracing::info!(index = %name, "index dropped");
            } else {
                tracing::info!(index = %name, "index does not exist");
            }
        }
        Commands::Reset => schema::reset_all(gateway.as_ref(), &names).await?,
        Commands::SyncUser { id, snapshot } => {
            run(&config, gateway, &snapshot, SyncJob::IndexUser { user_id: id }).await?
        }
        Commands::SyncPost { id, snapshot } => {
            run(&config, gateway, &snapshot, SyncJob::IndexPost { post_id: id }).await?
        }
        Commands::SyncTopic { id, snapshot } => {
            run(&config, gateway, &snapshot, SyncJob::IndexTopic { topic_id: id }).await?
        }
        Commands::SyncTags { names, snapshot } => {
            run(&config, gateway, &snapshot, SyncJob::IndexTags { tags: names }).await?
        }
    }
    Ok(())
}

async fn run(config: &SyncConfig, gateway: Arc<ElasticsearchGateway>, snapshot: &str, job: SyncJob) -> Result<()> {
    let store = MemoryStore::load_path(snapshot).with_context(|| format!("loading snapshot {snapshot}"))?;
    let coordinator = SyncCoordinator::new(config, Arc::new(store), gateway);
    coordinator
        .run(&job)
        .await
        .with_context(|| format!("running {}", serde_json::to_string(&job).unwrap_or_default()))?;
    Ok(())
}
