use anyhow::{Context, Result};
use std::env;
use tokio::process::{Child, Command};

/// Handle for a spawned background binary (worker/api server)
pub struct ProcHandle {
    pub child: Child,
}

fn inherit_db_env(cmd: &mut Command) {
    for key in [
        "DATABASE_URL",
        "DB_URL",
        "DATABASE_SESSION_URL",
        "DIRECT_DATABASE_URL",
        "DB_HOST",
        "DB_PORT",
        "DB_USER",
        "DB_PASSWORD",
        "DB_NAME",
        "DB_SSL",
    ] {
        if let Ok(v) = env::var(key) {
            cmd.env(key, v);
        }
    }
}

/// Spawn the sync worker binary bound to the given status address.
/// addr: e.g., "127.0.0.1:9025"
pub async fn spawn_sync_worker(addr: &str) -> Result<ProcHandle> {
    let bin =
        env::var("SYNC_WORKER_BIN").unwrap_or_else(|_| "target/debug/sync_worker".to_string());
    let mut cmd = Command::new(bin);
    cmd.env("WORKER_HTTP_ADDR", addr);
    inherit_db_env(&mut cmd);
    let child = cmd.spawn().context("failed to spawn sync_worker")?;
    Ok(ProcHandle { child })
}

/// Spawn the API server binary on the given port.
pub async fn spawn_api_server(port: u16) -> Result<ProcHandle> {
    let bin = env::var("API_SERVER_BIN").unwrap_or_else(|_| "target/debug/api_server".to_string());
    let mut cmd = Command::new(bin);
    cmd.env("API_PORT", port.to_string());
    inherit_db_env(&mut cmd);
    let child = cmd.spawn().context("failed to spawn api_server")?;
    Ok(ProcHandle { child })
}
