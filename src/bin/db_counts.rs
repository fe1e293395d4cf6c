use anyhow::Result;
use clap::Parser;

use pazarsync::cli::db_counts::{run, DbCountsConfig};
use pazarsync::util::env as env_util;

/// Row-count diagnostics for the pazarsync schema.
#[derive(Parser, Debug)]
#[command(name = "db_counts")]
struct Args {
    /// Optional override for the database URL
    #[arg(long)]
    db_url: Option<String>,
    /// Also print the most recent orders
    #[arg(long, default_value_t = false)]
    recent_orders: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::bootstrap_cli("db_counts");
    let args = Args::parse();
    run(DbCountsConfig {
        database_url: args.db_url,
        show_recent_orders: if args.recent_orders { Some(true) } else { None },
        recent_orders_limit: None,
    })
    .await
}
