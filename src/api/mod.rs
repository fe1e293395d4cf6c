// API module for the pazarsync HTTP server
// Provides RESTful status/control APIs for the Node back office

pub mod auth;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::ApiServer;
