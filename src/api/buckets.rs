use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{event, instrument, Level};

use super::state::ApiState;
use crate::bucket;
use crate::error::PicketError;
use crate::rate::Rate;

pub const MEDIA_TYPE_JSON: &str = "application/json";
pub const MEDIA_TYPE_BINARY: &str = "application/octet-stream";

#[derive(Debug, Deserialize)]
pub struct TakeParams {
    bucket: Option<String>,
    rate: Option<String>,
    count: Option<String>,
}

/// handler for POST /take?bucket=my-bucket-name&count=1&rate=100:1s
#[instrument(skip(state), level = "debug")]
pub async fn take(
    State(state): State<ApiState>,
    Query(params): Query<TakeParams>,
) -> Result<StatusCode, PicketError> {
    let name = params
        .bucket
        .filter(|name| !name.is_empty())
        .ok_or_else(|| PicketError::Validation("empty bucket name".to_string()))?;

    let rate = Rate::parse(params.rate.as_deref().unwrap_or(""))?;

    // An absent or malformed count falls back to a single token.
    let count = params
        .count
        .and_then(|count| count.parse::<u64>().ok())
        .unwrap_or(1);

    let allowed = state
        .store
        .apply_take(&name, &rate, count, bucket::now_ns())
        .await
        .map_err(|err| {
            event!(
                Level::ERROR,
                message = "take: store error",
                err = format!("{:?}", err)
            );
            err
        })?;

    if allowed {
        Ok(StatusCode::OK)
    } else {
        Ok(StatusCode::TOO_MANY_REQUESTS)
    }
}

/// handler for GET /buckets
///
/// The full snapshot, as JSON by default or as the replication wire frames
/// when the client accepts `application/octet-stream`.
#[instrument(skip(state))]
pub async fn snapshot(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Response, PicketError> {
    let buckets = state.store.get_all().await.map_err(|err| {
        event!(
            Level::ERROR,
            message = "snapshot: store error",
            err = format!("{:?}", err)
        );
        err
    })?;

    let accept = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(MEDIA_TYPE_JSON);

    if accepts(accept, MEDIA_TYPE_BINARY) {
        let body = bucket::encode_frames(&buckets)?;
        Ok(([(header::CONTENT_TYPE, MEDIA_TYPE_BINARY)], body).into_response())
    } else {
        let body = serde_json::to_vec(&buckets)?;
        Ok(([(header::CONTENT_TYPE, MEDIA_TYPE_JSON)], body).into_response())
    }
}

fn accepts(accept: &str, media_type: &str) -> bool {
    accept
        .split(',')
        .filter_map(|entry| entry.split(';').next())
        .any(|entry| entry.trim() == media_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_header_matching() {
        assert!(accepts("application/octet-stream", MEDIA_TYPE_BINARY));
        assert!(accepts(
            "application/json, application/octet-stream;q=0.9",
            MEDIA_TYPE_BINARY
        ));
        assert!(!accepts("application/json", MEDIA_TYPE_BINARY));
        assert!(!accepts("*/*", MEDIA_TYPE_BINARY));
    }
}
