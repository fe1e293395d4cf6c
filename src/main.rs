use anyhow::{Context, Result};
use pazarsync::database_ops::bulk_operations::request_cancel;
use pazarsync::database_ops::connections::list_active_connections;
use pazarsync::database_ops::db::Db;
use pazarsync::database_ops::jobs;
use pazarsync::util::env as env_util;
use pazarsync::{sync_orders_pipeline, SyncOptions};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    // Optional: autostart worker/api as child processes so a single binary
    // brings the whole sync service up in dev.
    if env_util::env_flag("AUTOSTART_WORKER", false) {
        let addr = env_util::env_opt("WORKER_HTTP_ADDR")
            .unwrap_or_else(|| "127.0.0.1:9025".to_string());
        tokio::spawn(async move {
            let _ = pazarsync::orchestrator::spawn_sync_worker(&addr).await;
        });
    }
    if env_util::env_flag("AUTOSTART_API", false) {
        let port: u16 = env_util::env_parse("API_PORT", 8080u16);
        tokio::spawn(async move {
            let _ = pazarsync::orchestrator::spawn_api_server(port).await;
        });
    }

    // --- logging -------------------------------------------------------------
    pazarsync::env_boot::ensure_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    // --- DB connect ----------------------------------------------------------
    let database_url = env_util::db_url().context("set DATABASE_URL or DB_* variables first")?;
    let max_conns: u32 = env_util::env_parse("DB_MAX_CONNS", 10u32);
    // AUTO_MIGRATE gate lives inside connect(); default is off.
    let db = Db::connect(&database_url, max_conns)
        .await
        .context("Db::connect failed")?;
    info!("database connected (max_conns={})", max_conns);

    // --- realtime control channel -------------------------------------------
    // Cancellation/trigger events pushed by the back office. Optional: the
    // API endpoints cover the same operations for polling deployments.
    if let (Some(gateway), Some(secret)) = (
        env_util::env_opt("REALTIME_GATEWAY_URL"),
        env_util::env_opt("API_SECRET"),
    ) {
        let db_ctrl = db.clone();
        tokio::spawn(async move {
            let rx =
                pazarsync::realtime::start_control_listener(&gateway, &secret, "sync:control")
                    .await;
            let mut rx = match rx {
                Ok(rx) => rx,
                Err(e) => {
                    warn!(error = %e, "control listener unavailable; relying on API polling");
                    return;
                }
            };
            while let Some(raw) = rx.recv().await {
                if let Err(e) = handle_control_event(&db_ctrl, &raw).await {
                    warn!(error = %e, raw, "control event handling failed");
                }
            }
        });
    }

    // --- sync loop -----------------------------------------------------------
    // Drift-free interval over all active connections; each tick re-reads the
    // connection list so new integrations join without a restart.
    let loop_secs: u64 = env_util::env_parse("SYNC_LOOP_SECS", 300u64);
    let window_hours: i64 = env_util::env_parse("SYNC_WINDOW_HOURS", 24i64);
    let mut tick = interval(Duration::from_secs(loop_secs.max(10)));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(loop_secs, window_hours, "sync service started");

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }

        let connections = match list_active_connections(&db, None).await {
            Ok(conns) => conns,
            Err(e) => {
                error!(error = %e, "listing connections failed; retrying next tick");
                continue;
            }
        };
        if connections.is_empty() {
            info!("no active platform connections; idle tick");
            continue;
        }

        for conn in &connections {
            let mut options = SyncOptions::default();
            options.window.start = Some(chrono::Utc::now() - chrono::Duration::hours(window_hours));
            match sync_orders_pipeline(&db, conn, options).await {
                Ok(summary) => {
                    if summary.failed > 0 {
                        warn!(
                            connection_id = conn.id,
                            platform = %conn.platform,
                            failed = summary.failed,
                            "sync completed with item failures"
                        );
                    }
                }
                Err(e) => {
                    // A connection-level failure (bad credentials, marketplace
                    // outage) must not stall the other integrations.
                    error!(
                        connection_id = conn.id,
                        platform = %conn.platform,
                        error = %format!("{e:#}"),
                        "connection sync failed"
                    );
                }
            }
        }
    }

    Ok(())
}

/// Control events are small JSON objects:
///   {"event":"cancel_operation","id":"<uuid>"}
///   {"event":"trigger_sync","kind":"order_sync","connection_id":7}
async fn handle_control_event(db: &Db, raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    match value.get("event").and_then(|v| v.as_str()) {
        Some("cancel_operation") => {
            let id: Uuid = value
                .get("id")
                .and_then(|v| v.as_str())
                .context("cancel_operation without id")?
                .parse()?;
            let changed = request_cancel(db, id).await?;
            info!(%id, changed, "cancel event processed");
        }
        Some("trigger_sync") => {
            let connection_id = value
                .get("connection_id")
                .and_then(|v| v.as_i64())
                .context("trigger_sync without connection_id")?;
            let kind = value
                .get("kind")
                .and_then(|v| v.as_str())
                .unwrap_or("order_sync");
            let dedupe_key = format!("{kind}:{connection_id}");
            let payload = serde_json::json!({"connection_id": connection_id});
            let msg_id = jobs::enqueue_job(db, kind, &dedupe_key, &payload).await?;
            info!(connection_id, kind, msg_id, "trigger event queued");
        }
        other => {
            warn!(?other, "ignoring unknown control event");
        }
    }
    Ok(())
}
