// API route configuration

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check (no auth required)
        .route("/health", web::get().to(handlers::health_check))
        .route("/", web::get().to(handlers::health_check))
        // API v1 routes (all require authentication)
        .service(
            web::scope("/api/v1")
                // Sync control
                .route("/sync/trigger", web::post().to(handlers::trigger_sync))
                // Bulk operation progress
                .route("/operations", web::get().to(handlers::list_operations))
                .route(
                    "/operations/{id}",
                    web::get().to(handlers::get_operation),
                )
                .route(
                    "/operations/{id}/cancel",
                    web::post().to(handlers::cancel_operation),
                )
                // Platform connections
                .route("/connections", web::get().to(handlers::list_connections)),
        );
}
