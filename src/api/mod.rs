mod base;
mod buckets;
pub mod state;

use std::borrow::Cow;

use axum::{
    error_handling::HandleErrorLayer, http::StatusCode, response::IntoResponse, routing, Router,
};
use tokio::time::Duration;
use tower::{BoxError, ServiceBuilder};
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

pub use buckets::{MEDIA_TYPE_BINARY, MEDIA_TYPE_JSON};
pub use state::ApiState;

/// Build the picket API router over a bucket store
pub fn api(state: ApiState) -> Router {
    Router::new()
        .route("/", routing::get(base::root))
        .route("/healthz", routing::get(base::health))
        .route("/about", routing::get(base::about))
        .route("/take", routing::post(buckets::take))
        .route("/buckets", routing::get(buckets::snapshot))
        .layer(CompressionLayer::new())
        .layer(
            ServiceBuilder::new()
                // Handle errors from middleware
                .layer(HandleErrorLayer::new(handle_error))
                .load_shed()
                .timeout(Duration::from_secs(10)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_error(error: BoxError) -> impl IntoResponse {
    if error.is::<tower::timeout::error::Elapsed>() {
        return (StatusCode::REQUEST_TIMEOUT, Cow::from("request timed out"));
    }

    if error.is::<tower::load_shed::error::Overloaded>() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Cow::from("service is overloaded, try again later"),
        );
    }

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Cow::from(format!("Unhandled internal error: {}", error)),
    )
}
