use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use pazarsync::cli;
use pazarsync::database_ops::csv_import::{import_products_from_csv, price_update_from_csv};
use pazarsync::database_ops::db::Db;
use pazarsync::database_ops::orders::assign_consolidation_groups;
use pazarsync::database_ops::products::reconcile_unmatched_lines;
use pazarsync::util::env;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pz", version, about = "pazarsync admin CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Print row counts for key database tables
    DbCounts {
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
        /// Force printing of recent orders (otherwise follows env)
        #[arg(long, default_value_t = false)]
        recent_orders: bool,
        /// Override RECENT_ORDERS_LIMIT (defaults to env/20)
        #[arg(long)]
        recent_orders_limit: Option<i64>,
    },
    /// Print order-line product match coverage per platform
    MatchStats {
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Import a product sheet (CSV) as a tracked bulk operation
    ImportProducts {
        #[arg(long)]
        user_id: i64,
        /// Path to the CSV file
        path: String,
    },
    /// Apply a bulk price update from CSV to platform sync state
    PriceUpdate {
        #[arg(long)]
        user_id: i64,
        /// Path to the CSV file
        path: String,
    },
    /// Group same-day orders sharing a shipping address
    Consolidate {
        #[arg(long)]
        user_id: i64,
        /// Civil date to group, YYYY-MM-DD
        #[arg(long)]
        day: NaiveDate,
    },
    /// Link unmatched order lines to products by fuzzy title match
    ReconcileProducts {
        #[arg(long)]
        user_id: i64,
    },
    /// Run pending schema migrations (AUTO_MIGRATE equivalent)
    Migrate {
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env::bootstrap_cli("pz");
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .compact()
        .try_init();

    let cli = Cli::parse();
    match cli.command {
        Commands::DbCounts {
            db_url,
            recent_orders,
            recent_orders_limit,
        } => {
            cli::db_counts::run(cli::db_counts::DbCountsConfig {
                database_url: db_url,
                show_recent_orders: if recent_orders { Some(true) } else { None },
                recent_orders_limit,
            })
            .await
        }
        Commands::MatchStats { db_url } => cli::match_stats::run(db_url).await,
        Commands::ImportProducts { user_id, path } => {
            let db = connect().await?;
            let op_id = import_products_from_csv(&db, user_id, &path).await?;
            println!("bulk operation: {op_id}");
            Ok(())
        }
        Commands::PriceUpdate { user_id, path } => {
            let db = connect().await?;
            let op_id = price_update_from_csv(&db, user_id, &path).await?;
            println!("bulk operation: {op_id}");
            Ok(())
        }
        Commands::Consolidate { user_id, day } => {
            let db = connect().await?;
            let grouped = assign_consolidation_groups(&db, user_id, day).await?;
            println!("orders grouped: {grouped}");
            Ok(())
        }
        Commands::ReconcileProducts { user_id } => {
            let db = connect().await?;
            let linked = reconcile_unmatched_lines(&db, user_id).await?;
            println!("lines linked: {linked}");
            Ok(())
        }
        Commands::Migrate { db_url } => {
            let url = match db_url {
                Some(url) => url,
                None => env::db_url()?,
            };
            // connect() honors AUTO_MIGRATE; force it on for this command.
            std::env::set_var("AUTO_MIGRATE", "1");
            let _db = Db::connect(&url, 5).await.context("migrate failed")?;
            println!("migrations applied");
            Ok(())
        }
    }
}

async fn connect() -> Result<Db> {
    let url = env::db_url()?;
    Db::connect_no_migrate(&url, 10).await
}
