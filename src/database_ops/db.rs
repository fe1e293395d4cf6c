use anyhow::Result;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool, Row,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = Self::build_pool(database_url, max_connections).await?;
        info!("connected to db");

        // Optional auto-migrate gate (default: OFF). The service may run
        // against a schema owned by the Node back office; only push SQL when
        // explicitly asked with AUTO_MIGRATE=1/true/on.
        let auto_migrate = std::env::var("AUTO_MIGRATE")
            .map(|raw| {
                let v = raw.trim().to_ascii_lowercase();
                matches!(v.as_str(), "1" | "true" | "on" | "yes")
            })
            .unwrap_or(false);
        if auto_migrate {
            info!("running migrations (AUTO_MIGRATE=on)");
            Self::run_migrations(&pool).await?;
        } else {
            info!("AUTO_MIGRATE disabled; skipping migrations");
        }
        Ok(Self { pool })
    }

    // Variant that NEVER runs migrations regardless of env (long-running
    // services and read paths must not push SQL at startup).
    #[instrument(skip(database_url))]
    pub async fn connect_no_migrate(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = Self::build_pool(database_url, max_connections).await?;
        info!("connected to db (no-migrate)");
        Ok(Self { pool })
    }

    async fn build_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
        let use_prepared = std::env::var("USE_PREPARED")
            .map(|v| (v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("on")))
            .unwrap_or(false);
        let mut connect_options = PgConnectOptions::from_str(database_url)?;

        // Ensure TLS is enabled when DSN contains sslmode=require
        if database_url.contains("sslmode=require") && !database_url.contains("sslmode=disable") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }

        if !use_prepared {
            // PgBouncer txn mode safe
            connect_options = connect_options.statement_cache_capacity(0);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await?;
        Ok(pool)
    }
}

impl Db {
    // Lightweight migration runner over ./migrations: numeric-prefixed .sql
    // files, applied in order, tracked in _pazarsync_migrations. Non-numeric
    // filenames are ignored.
    async fn run_migrations(pool: &PgPool) -> Result<()> {
        use std::{fs, path::Path};
        let dir = Path::new("./migrations");
        if !dir.exists() {
            return Ok(());
        }
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _pazarsync_migrations (
                version BIGINT PRIMARY KEY,
                description TEXT,
                installed_at TIMESTAMPTZ DEFAULT now()
             )",
        )
        .execute(pool)
        .await?;

        let applied_rows = sqlx::raw_sql("SELECT version FROM _pazarsync_migrations")
            .fetch_all(pool)
            .await?;
        use std::collections::HashSet;
        let mut applied: HashSet<i64> = HashSet::new();
        for r in applied_rows {
            applied.insert(r.try_get::<i64, _>(0)?);
        }

        let mut candidates: Vec<(i64, String, std::path::PathBuf)> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(fname) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            if !fname.ends_with(".sql") {
                continue;
            }
            let num_str: String = fname.chars().take_while(|c| c.is_ascii_digit()).collect();
            if num_str.is_empty() {
                continue;
            }
            let Some(rest) = fname
                .strip_prefix(num_str.as_str())
                .and_then(|s| s.strip_prefix('_'))
            else {
                continue;
            };
            if let Ok(version) = num_str.parse::<i64>() {
                candidates.push((version, rest.trim_end_matches(".sql").to_string(), path));
            }
        }
        candidates.sort_by_key(|(v, _, _)| *v);

        for (version, desc, path) in candidates {
            if applied.contains(&version) {
                continue;
            }
            let sql = fs::read_to_string(&path)?;
            info!(version, file = ?path, "applying migration");
            sqlx::raw_sql(sql.trim()).execute(pool).await?;

            // raw_sql to avoid prepared statements under PgBouncer; escape
            // single quotes in the description.
            let desc_escaped = desc.replace('\'', "''");
            let insert_stmt = format!(
                "INSERT INTO _pazarsync_migrations(version, description) VALUES ({}, '{}')",
                version, desc_escaped
            );
            sqlx::raw_sql(&insert_stmt).execute(pool).await?;
            applied.insert(version);
        }

        if let Ok(r) = sqlx::raw_sql(
            "SELECT version, description FROM _pazarsync_migrations ORDER BY version DESC LIMIT 1",
        )
        .fetch_one(pool)
        .await
        {
            let version: i64 = r.try_get(0).unwrap_or_default();
            let desc: String = r
                .try_get::<Option<String>, _>(1)
                .ok()
                .flatten()
                .unwrap_or_default();
            info!(version, desc, "migrations up-to-date");
        }
        Ok(())
    }
}
