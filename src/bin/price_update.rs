use anyhow::Result;
use clap::Parser;

use pazarsync::database_ops::csv_import::price_update_from_csv;
use pazarsync::database_ops::db::Db;
use pazarsync::util::env as env_util;

/// Apply a bulk price update from CSV to platform sync state.
#[derive(Parser, Debug)]
#[command(name = "price_update")]
struct Args {
    #[arg(long)]
    user_id: i64,
    /// Path to the CSV file (barkod/platform/fiyat columns)
    path: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::bootstrap_cli("price_update");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();
    let args = Args::parse();

    let db = Db::connect_no_migrate(&env_util::db_url()?, 10).await?;
    let op_id = price_update_from_csv(&db, args.user_id, &args.path).await?;
    println!("bulk operation: {op_id}");
    Ok(())
}
