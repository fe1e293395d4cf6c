use anyhow::Result;
use clap::Parser;
use serde_json::json;

use pazarsync::database_ops::db::Db;
use pazarsync::database_ops::jobs::enqueue_job;
use pazarsync::util::env as env_util;

/// Push one job onto the sync queue and NOTIFY any idle worker.
#[derive(Parser, Debug)]
#[command(name = "enqueue_job", about = "Enqueue a pazarsync worker job")]
struct Args {
    /// Job kind: order_sync, product_import, product_import_csv,
    /// price_update_csv, consolidation, reconcile_products
    kind: String,
    /// JSON payload, e.g. '{"connection_id": 7}'
    #[arg(default_value = "{}")]
    payload: String,
    /// Dedupe key; re-enqueueing the same key re-arms instead of duplicating
    #[arg(long)]
    dedupe_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::bootstrap_cli("enqueue_job");
    let args = Args::parse();

    let payload: serde_json::Value = serde_json::from_str(&args.payload)?;
    let dedupe_key = args
        .dedupe_key
        .unwrap_or_else(|| format!("{}:{}", args.kind, payload));

    let db_url = env_util::db_url()?;
    let db = Db::connect_no_migrate(&db_url, 5).await?;
    let msg_id = enqueue_job(&db, &args.kind, &dedupe_key, &payload).await?;
    println!("{}", json!({"msg_id": msg_id, "dedupe_key": dedupe_key}));
    Ok(())
}
