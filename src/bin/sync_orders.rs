use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;

use pazarsync::clients::FetchWindow;
use pazarsync::database_ops::connections::get_connection;
use pazarsync::database_ops::db::Db;
use pazarsync::util::env as env_util;
use pazarsync::{sync_orders_pipeline, SyncOptions};

/// One-shot order sync for a single platform connection. The long-running
/// service loops over every active connection; this bin is for operators
/// replaying a window by hand.
#[derive(Parser, Debug)]
#[command(name = "sync_orders", about = "Sync marketplace orders for one connection")]
struct Args {
    /// platform_connections.id to sync
    #[arg(long)]
    connection_id: i64,
    /// Lower bound on last-modified, RFC3339 (default: 24h ago)
    #[arg(long)]
    start: Option<DateTime<Utc>>,
    /// Platform status filter passed through to the marketplace
    #[arg(long)]
    status: Option<String>,
    /// Page cap for the run
    #[arg(long, default_value_t = 50)]
    max_pages: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::bootstrap_cli("sync_orders");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();
    let args = Args::parse();

    let db_url = env_util::db_url()?;
    let db = Db::connect_no_migrate(&db_url, 10).await?;
    let conn = get_connection(&db, args.connection_id)
        .await?
        .with_context(|| format!("connection {} not found", args.connection_id))?;

    let options = SyncOptions {
        window: FetchWindow {
            start: Some(
                args.start
                    .unwrap_or_else(|| Utc::now() - chrono::Duration::hours(24)),
            ),
            end: None,
            status: args.status,
        },
        max_pages: args.max_pages,
        ..SyncOptions::default()
    };

    let summary = sync_orders_pipeline(&db, &conn, options).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
