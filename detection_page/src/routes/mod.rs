mod health;
mod metrics;
mod page;
mod status;
mod upload;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(page::index))
        .route("/upload", post(upload::upload_image))
        .route("/status", get(status::status))
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
}
