use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use futures::StreamExt;
use serde_json::json;
use std::collections::VecDeque;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tokio_postgres::{AsyncMessage, NoTls};
use url::{form_urlencoded, Url};
use uuid::Uuid;

use pazarsync::bulk::{BulkOperationKind, BulkTracker};
use pazarsync::clients::FetchWindow;
use pazarsync::database_ops::bulk_operations::create_operation;
use pazarsync::database_ops::connections::get_connection;
use pazarsync::database_ops::csv_import::{import_products_from_csv, price_update_from_csv};
use pazarsync::database_ops::db::Db;
use pazarsync::database_ops::jobs::{
    archive_job, delay_job, delete_job, enqueue_job, pop_job, queued_count, PoppedJob, SyncJob,
    JOB_CHANNEL,
};
use pazarsync::database_ops::orders::assign_consolidation_groups;
use pazarsync::database_ops::products::reconcile_unmatched_lines;
use pazarsync::util::env as env_util;
use pazarsync::{sync_orders_pipeline, sync_products_pipeline, SyncOptions};

// -------- Manager: in-memory logs + pause/resume control --------
#[derive(Clone)]
struct Manager {
    paused: Arc<AtomicBool>,
    logs: Arc<Mutex<VecDeque<String>>>,
    log_capacity: usize,
}

impl Manager {
    fn new(capacity: usize) -> Self {
        Self {
            paused: Arc::new(AtomicBool::new(false)),
            logs: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            log_capacity: capacity,
        }
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }
    fn set_paused(&self, val: bool) {
        self.paused.store(val, Ordering::Relaxed);
    }
}

fn push_log(mgr: &Manager, msg: impl AsRef<str>) {
    let ts = Utc::now().to_rfc3339();
    let mut guard = mgr.logs.lock().unwrap();
    if guard.len() >= mgr.log_capacity {
        guard.pop_front();
    }
    guard.push_back(format!("{} | {}", ts, msg.as_ref()));
}

#[derive(Debug, Clone, Default, serde::Serialize)]
struct WorkerMetrics {
    dequeues: u64,
    failures: u64,
    last_wait_ms: u64,
    last_run_ms: u64,
    last_error: Option<String>,
}

#[derive(Clone, Debug)]
struct QueueConfig {
    visibility_timeout_secs: i64,
    poll_interval_secs: u64,
    max_retries: u32,
    retry_base_secs: u64,
    retry_max_secs: u64,
}

impl QueueConfig {
    fn from_env() -> Self {
        Self {
            visibility_timeout_secs: env_util::env_parse("SYNC_VT_SECS", 120i64),
            poll_interval_secs: env_util::env_parse("SYNC_POLL_SECS", 5u64),
            max_retries: env_util::env_parse("SYNC_MAX_RETRIES", 5u32),
            retry_base_secs: env_util::env_parse("SYNC_RETRY_BASE_SECS", 10u64),
            retry_max_secs: env_util::env_parse("SYNC_RETRY_MAX_SECS", 600u64),
        }
    }
}

/// Library entrypoint: run the sync worker with env-configured settings.
pub async fn run_from_env() -> Result<()> {
    pazarsync::env_boot::ensure_dotenv();
    // logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .try_init();

    // DB
    let database_url = env_util::db_url().context("set DATABASE_URL or DB_* variables")?;
    let db = Db::connect(&database_url, 20u32).await?;

    // Config
    let queue_cfg = QueueConfig::from_env();
    let manager = Manager::new(1000);
    let start_msg = format!(
        "[sync_worker] start vt={} poll={} max_retries={}",
        queue_cfg.visibility_timeout_secs, queue_cfg.poll_interval_secs, queue_cfg.max_retries
    );
    println!("{}", start_msg);
    push_log(&manager, &start_msg);

    // Metrics and HTTP (optional)
    let metrics = Arc::new(Mutex::new(WorkerMetrics::default()));
    if let Ok(addr) = env::var("WORKER_HTTP_ADDR") {
        if !addr.is_empty() {
            start_http_server(db.clone(), metrics.clone(), manager.clone(), addr);
        }
    }

    // LISTEN wake: a dedicated session connection, since PgBouncer transaction
    // pooling would drop LISTEN state.
    let mut notify_stream = match env_util::db_session_url() {
        Ok(url) => {
            let sanitized = sanitize_session_url(&url);
            match connect_listen_channel(sanitized, JOB_CHANNEL).await {
                Ok(rx) => Some(rx),
                Err(err) => {
                    eprintln!("[sync_worker] LISTEN setup failed: {err:?}");
                    None
                }
            }
        }
        Err(_) => None,
    };

    let poll_delay = Duration::from_secs(queue_cfg.poll_interval_secs.max(1));

    loop {
        let t_poll = std::time::Instant::now();
        if manager.is_paused() {
            sleep(poll_delay).await;
            continue;
        }

        match pop_job(&db, queue_cfg.visibility_timeout_secs).await? {
            Some(p) => {
                {
                    let waited = t_poll.elapsed();
                    let mut m = metrics.lock().unwrap();
                    m.last_wait_ms = waited.as_millis() as u64;
                    m.dequeues += 1;
                }
                let t_run = std::time::Instant::now();

                // VT heartbeat keeps the row invisible while a long job runs.
                let db_clone = db.clone();
                let vt = queue_cfg.visibility_timeout_secs;
                let msg_id = p.msg_id;
                let (hb_tx, mut hb_rx) = tokio::sync::oneshot::channel::<()>();
                tokio::spawn(async move {
                    let mut tick = interval(Duration::from_secs((vt as u64).max(4) / 2));
                    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        tokio::select! {
                            _ = tick.tick() => {
                                let _ = pazarsync::database_ops::jobs::delay_job(&db_clone, msg_id, vt as u64).await;
                            }
                            _ = &mut hb_rx => break,
                        }
                    }
                });

                let res = handle_job(&db, &p.job).await;
                let run_elapsed = t_run.elapsed();
                let _ = hb_tx.send(());
                match res {
                    Ok(_) => {
                        delete_job(&db, p.msg_id).await?;
                        {
                            let mut m = metrics.lock().unwrap();
                            m.last_run_ms = run_elapsed.as_millis() as u64;
                        }
                        let ok_msg = format!(
                            "[sync_worker] job msg_id={} kind={} acked (ran {:.2?})",
                            p.msg_id, p.job.kind, run_elapsed
                        );
                        println!("{}", ok_msg);
                        push_log(&manager, &ok_msg);
                    }
                    Err(err) => {
                        let fail_msg = format!(
                            "[sync_worker] job msg_id={} kind={} failed after {:.2?}: {err:?}",
                            p.msg_id, p.job.kind, run_elapsed
                        );
                        eprintln!("{}", fail_msg);
                        push_log(&manager, &fail_msg);
                        {
                            let mut m = metrics.lock().unwrap();
                            m.last_run_ms = run_elapsed.as_millis() as u64;
                            m.failures += 1;
                            m.last_error = Some(err.to_string());
                        }
                        handle_failure(&db, &queue_cfg, &p, &err, &manager).await?;
                    }
                }
            }
            None => {
                // Idle: wait for a NOTIFY or the poll interval, whichever first.
                let mut listener_dead = false;
                match notify_stream.as_mut() {
                    Some(rx) => {
                        tokio::select! {
                            _ = sleep(poll_delay) => {}
                            msg = rx.recv() => {
                                if msg.is_none() {
                                    listener_dead = true;
                                }
                            }
                        }
                    }
                    None => sleep(poll_delay).await,
                }
                if listener_dead {
                    // listener died; fall back to polling only
                    notify_stream = None;
                }
            }
        }
    }
}

async fn handle_failure(
    db: &Db,
    cfg: &QueueConfig,
    p: &PoppedJob,
    err: &anyhow::Error,
    manager: &Manager,
) -> Result<()> {
    let attempt = (p.read_ct as u32).max(1);
    if cfg.max_retries > 0 && attempt >= cfg.max_retries {
        archive_job(db, p.msg_id, Some(&err.to_string())).await?;
        let arch_msg = format!(
            "[sync_worker] job msg_id={} archived after {} attempts",
            p.msg_id, p.read_ct
        );
        println!("{}", arch_msg);
        push_log(manager, &arch_msg);
        return Ok(());
    }
    let mut delay = cfg
        .retry_base_secs
        .saturating_mul(1u64 << attempt.saturating_sub(1).min(6));
    if delay > cfg.retry_max_secs {
        delay = cfg.retry_max_secs;
    }
    delay_job(db, p.msg_id, delay).await?;
    push_log(
        manager,
        format!(
            "[sync_worker] job msg_id={} retry in {}s (attempt {})",
            p.msg_id, delay, attempt
        ),
    );
    Ok(())
}

/// Dispatch one queue job to its handler. `kind` mirrors the bulk-operation
/// kinds plus the CSV-sourced variants.
async fn handle_job(db: &Db, job: &SyncJob) -> Result<()> {
    match job.kind.as_str() {
        "order_sync" | "product_import" => {
            let connection_id = job
                .payload
                .get("connection_id")
                .and_then(|v| v.as_i64())
                .context("job payload missing connection_id")?;
            let conn = get_connection(db, connection_id)
                .await?
                .with_context(|| format!("connection {connection_id} not found"))?;

            let kind = if job.kind == "order_sync" {
                BulkOperationKind::OrderSync
            } else {
                BulkOperationKind::ProductImport
            };
            let tracker = BulkTracker::new(kind, 0);
            let op_id = create_operation(db, conn.user_id, Some(conn.id), &tracker).await?;

            let mut options = SyncOptions {
                operation_id: Some(op_id),
                ..SyncOptions::default()
            };
            options.window = FetchWindow {
                start: job
                    .payload
                    .get("start")
                    .and_then(|v| v.as_str())
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|t| t.with_timezone(&Utc)),
                end: None,
                status: job
                    .payload
                    .get("status")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            };
            if job.kind == "order_sync" {
                sync_orders_pipeline(db, &conn, options).await?;
            } else {
                sync_products_pipeline(db, &conn, options).await?;
            }
            Ok(())
        }
        "product_import_csv" | "price_update_csv" => {
            let user_id = job
                .payload
                .get("user_id")
                .and_then(|v| v.as_i64())
                .context("job payload missing user_id")?;
            let path = job
                .payload
                .get("path")
                .and_then(|v| v.as_str())
                .context("job payload missing path")?;
            let op_id: Uuid = if job.kind == "product_import_csv" {
                import_products_from_csv(db, user_id, path).await?
            } else {
                price_update_from_csv(db, user_id, path).await?
            };
            tracing::info!(%op_id, "csv job finished");
            Ok(())
        }
        "consolidation" => {
            let user_id = job
                .payload
                .get("user_id")
                .and_then(|v| v.as_i64())
                .context("job payload missing user_id")?;
            let day: NaiveDate = job
                .payload
                .get("day")
                .and_then(|v| v.as_str())
                .context("job payload missing day")?
                .parse()?;
            let grouped = assign_consolidation_groups(db, user_id, day).await?;
            tracing::info!(user_id, %day, grouped, "consolidation finished");
            Ok(())
        }
        "reconcile_products" => {
            let user_id = job
                .payload
                .get("user_id")
                .and_then(|v| v.as_i64())
                .context("job payload missing user_id")?;
            let linked = reconcile_unmatched_lines(db, user_id).await?;
            tracing::info!(user_id, linked, "product reconciliation finished");
            Ok(())
        }
        other => anyhow::bail!("unknown job kind: {other}"),
    }
}

fn sanitize_session_url(raw: &str) -> String {
    if let Ok(mut parsed) = Url::parse(raw) {
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(k, _)| k != "statement_cache_capacity")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        parsed.set_query(None);
        if !pairs.is_empty() {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (k, v) in pairs {
                serializer.append_pair(&k, &v);
            }
            parsed.set_query(Some(&serializer.finish()));
        }
        parsed.to_string()
    } else {
        raw.to_string()
    }
}

async fn connect_listen_channel(
    url: String,
    channel: &str,
) -> Result<tokio::sync::mpsc::UnboundedReceiver<String>> {
    let (client, mut connection) = tokio_postgres::connect(&url, NoTls).await?;
    client.batch_execute(&format!("LISTEN {}", channel)).await?;
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let channel = channel.to_string();
    tokio::spawn(async move {
        let _client = client;
        let mut messages = futures::stream::poll_fn(move |cx| connection.poll_message(cx));
        while let Some(message) = messages.next().await {
            match message {
                Ok(AsyncMessage::Notification(n)) => {
                    if n.channel() == channel
                        && tx.send(format!("{}:{}", n.channel(), n.payload())).is_err()
                    {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("[sync_worker] listen error: {e}");
                    break;
                }
            }
        }
    });
    Ok(rx)
}

fn start_http_server(
    db: Db,
    metrics: Arc<Mutex<WorkerMetrics>>,
    manager: Manager,
    addr: String,
) {
    use actix_web::{web, App, HttpResponse, HttpServer};
    tokio::spawn(async move {
        let db = web::Data::new(db);
        let metrics = web::Data::new(metrics);
        let manager_data = web::Data::new(manager);
        let bind_addr = addr.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(db.clone())
                .app_data(metrics.clone())
                .app_data(manager_data.clone())
                .route(
                    "/",
                    web::get().to(|| async { HttpResponse::Ok().body("ok") }),
                )
                .route("/api/enqueue", web::post().to(post_enqueue))
                .route("/api/metrics", web::get().to(get_metrics))
                .route("/api/logs", web::get().to(get_logs))
                .route("/api/pause", web::post().to(pause))
                .route("/api/resume", web::post().to(resume))
                .route("/api/status", web::get().to(get_status))
        })
        .bind(bind_addr.clone())
        .expect("failed to bind http server")
        .run();

        println!("[sync_worker] http listening on {bind_addr}");
        if let Err(e) = server.await {
            eprintln!("[sync_worker] http server error: {e:?}");
        }
    });

    #[derive(serde::Deserialize)]
    struct EnqueueReq {
        kind: String,
        #[serde(default)]
        payload: serde_json::Value,
        #[serde(default)]
        dedupe_key: Option<String>,
    }

    async fn post_enqueue(
        db: actix_web::web::Data<Db>,
        body: actix_web::web::Json<EnqueueReq>,
    ) -> HttpResponse {
        let dedupe_key = body
            .dedupe_key
            .clone()
            .unwrap_or_else(|| format!("{}:{}", body.kind, Uuid::new_v4()));
        match enqueue_job(&db, &body.kind, &dedupe_key, &body.payload).await {
            Ok(msg_id) => HttpResponse::Ok().json(json!({"ok": true, "msg_id": msg_id})),
            Err(e) => HttpResponse::InternalServerError()
                .json(json!({"ok": false, "error": e.to_string()})),
        }
    }

    async fn get_metrics(metrics: actix_web::web::Data<Arc<Mutex<WorkerMetrics>>>) -> HttpResponse {
        let snapshot = metrics.lock().unwrap().clone();
        HttpResponse::Ok().json(snapshot)
    }

    async fn get_logs(manager: actix_web::web::Data<Manager>) -> HttpResponse {
        let logs: Vec<String> = manager.logs.lock().unwrap().iter().cloned().collect();
        HttpResponse::Ok().json(json!({"logs": logs}))
    }

    async fn pause(manager: actix_web::web::Data<Manager>) -> HttpResponse {
        manager.set_paused(true);
        HttpResponse::Ok().json(json!({"paused": true}))
    }

    async fn resume(manager: actix_web::web::Data<Manager>) -> HttpResponse {
        manager.set_paused(false);
        HttpResponse::Ok().json(json!({"paused": false}))
    }

    async fn get_status(
        db: actix_web::web::Data<Db>,
        manager: actix_web::web::Data<Manager>,
    ) -> HttpResponse {
        let queued = queued_count(&db).await.unwrap_or(-1);
        HttpResponse::Ok().json(json!({
            "paused": manager.is_paused(),
            "queued": queued,
        }))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run_from_env().await
}
