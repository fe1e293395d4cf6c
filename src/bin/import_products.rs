use anyhow::Result;
use clap::Parser;

use pazarsync::database_ops::csv_import::import_products_from_csv;
use pazarsync::database_ops::db::Db;
use pazarsync::util::env as env_util;

/// Import a product sheet (CSV) as a tracked bulk operation.
#[derive(Parser, Debug)]
#[command(name = "import_products")]
struct Args {
    #[arg(long)]
    user_id: i64,
    /// Path to the CSV file
    path: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::bootstrap_cli("import_products");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();
    let args = Args::parse();

    let db = Db::connect_no_migrate(&env_util::db_url()?, 10).await?;
    let op_id = import_products_from_csv(&db, args.user_id, &args.path).await?;
    println!("bulk operation: {op_id}");
    Ok(())
}
