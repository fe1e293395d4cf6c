// HTTP request handlers for API endpoints

use crate::api::models::*;
use crate::database_ops::bulk_operations;
use crate::database_ops::connections;
use crate::database_ops::db::Db;
use crate::database_ops::jobs;
use actix_web::{web, HttpResponse, Result};
use std::time::SystemTime;
use uuid::Uuid;

/// Health check endpoint
pub async fn health_check(db: web::Data<Db>) -> Result<HttpResponse> {
    // Quick database connectivity check
    let db_status = match sqlx::query_scalar::<_, bool>("SELECT true")
        .fetch_one(&db.pool)
        .await
    {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };

    let uptime = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let response = ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        database: db_status.to_string(),
        uptime_seconds: uptime,
    });

    Ok(HttpResponse::Ok().json(response))
}

/// Enqueue a sync job for one connection. The worker picks it up via
/// LISTEN/NOTIFY; the response carries the queue message id.
pub async fn trigger_sync(
    payload: web::Json<SyncTriggerRequest>,
    db: web::Data<Db>,
) -> Result<HttpResponse> {
    tracing::info!(
        connection_id = payload.connection_id,
        kind = %payload.kind,
        "sync trigger requested"
    );

    let conn = match connections::get_connection(&db, payload.connection_id).await {
        Ok(Some(conn)) => conn,
        Ok(None) => {
            return Ok(HttpResponse::NotFound().json(ApiResponse::<()>::error(format!(
                "connection {} not found",
                payload.connection_id
            ))))
        }
        Err(e) => {
            return Ok(HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("{e:#}"))))
        }
    };

    let job_payload = serde_json::json!({
        "connection_id": conn.id,
        "start": payload.start,
        "status": payload.status.clone(),
    });
    let dedupe_key = format!("{}:{}", payload.kind, conn.id);
    match jobs::enqueue_job(&db, &payload.kind, &dedupe_key, &job_payload).await {
        Ok(msg_id) => Ok(HttpResponse::Accepted().json(ApiResponse::success(serde_json::json!({
            "message": "sync queued",
            "msg_id": msg_id,
            "connection_id": conn.id,
            "kind": payload.kind.clone(),
        })))),
        Err(e) => Ok(HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("{e:#}")))),
    }
}

/// List a user's bulk operations, newest first.
pub async fn list_operations(
    query: web::Query<OperationsQuery>,
    db: web::Data<Db>,
) -> Result<HttpResponse> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    match bulk_operations::list_operations(&db, query.user_id, limit).await {
        Ok(ops) => Ok(HttpResponse::Ok().json(ApiResponse::success(ops))),
        Err(e) => Ok(HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("{e:#}")))),
    }
}

/// Poll one bulk operation's progress.
pub async fn get_operation(path: web::Path<Uuid>, db: web::Data<Db>) -> Result<HttpResponse> {
    let id = path.into_inner();
    match bulk_operations::load_operation(&db, id).await {
        Ok(Some(op)) => Ok(HttpResponse::Ok().json(ApiResponse::success(op))),
        Ok(None) => Ok(HttpResponse::NotFound()
            .json(ApiResponse::<()>::error(format!("operation {id} not found")))),
        Err(e) => Ok(HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("{e:#}")))),
    }
}

/// Request cancellation of a running bulk operation. The running job stops
/// accounting items at its next chunk boundary.
pub async fn cancel_operation(path: web::Path<Uuid>, db: web::Data<Db>) -> Result<HttpResponse> {
    let id = path.into_inner();
    tracing::info!(%id, "bulk operation cancel requested");
    match bulk_operations::request_cancel(&db, id).await {
        Ok(true) => Ok(HttpResponse::Accepted().json(ApiResponse::success(serde_json::json!({
            "id": id,
            "status": "cancelled",
        })))),
        Ok(false) => Ok(HttpResponse::Conflict().json(ApiResponse::<()>::error(
            "operation is already terminal or unknown",
        ))),
        Err(e) => Ok(HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("{e:#}")))),
    }
}

/// List active platform connections (credentials are never echoed back).
pub async fn list_connections(db: web::Data<Db>) -> Result<HttpResponse> {
    match connections::list_active_connections(&db, None).await {
        Ok(conns) => {
            let summaries: Vec<ConnectionSummary> = conns
                .into_iter()
                .map(|c| ConnectionSummary {
                    id: c.id,
                    user_id: c.user_id,
                    platform: c.platform.to_string(),
                    name: c.name,
                    is_active: c.is_active,
                })
                .collect();
            Ok(HttpResponse::Ok().json(ApiResponse::success(summaries)))
        }
        Err(e) => Ok(HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("{e:#}")))),
    }
}
