use axum::http::StatusCode;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use catalog_core::{validate, SearchError, SearchQuery, SimilarityParams};
use opentelemetry_otlp::WithExportConfig;
use prometheus::{Encoder, TextEncoder};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, Level};
use tracing_subscriber::prelude::*;

mod metrics;
use metrics::{BACKEND_SECONDS, REQUESTS_TOTAL, REQUEST_SECONDS};

#[derive(Clone)]
struct AppState {
    client: reqwest::Client,
    es_base: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing + optional OTLP
    if let Ok(endpoint) = std::env::var("OTLP_ENDPOINT") {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(endpoint),
            )
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .ok();
        if let Some(tracer) = tracer {
            let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);
            let subscriber = tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer())
                .with(telemetry);
            tracing::subscriber::set_global_default(subscriber).ok();
        } else {
            tracing_subscriber::fmt()
                .with_max_level(Level::INFO)
                .with_env_filter("info")
                .init();
        }
    } else {
        tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_env_filter("info")
            .init();
    }

    let es_base =
        std::env::var("ES_BASE").unwrap_or_else(|_| "http://localhost:9200/dpla_alias".into());
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(30))
        .build()?;
    let state = AppState { client, es_base };

    let app = Router::new()
        .route("/health", get(health))
        .route("/v2/items", get(items))
        .route("/v2/similar", post(similar))
        .route("/metrics", get(metrics_text))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".into())
        .parse()?;
    info!("http listening on {}", addr);
    axum_server::bind(addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Get "item" records.
async fn items(
    State(app): State<AppState>,
    Query(raw): Query<BTreeMap<String, String>>,
) -> Response {
    let _timer = REQUEST_SECONDS.with_label_values(&["items"]).start_timer();
    let params = match validate(&raw) {
        Ok(p) => p,
        Err(e) => return reject("items", e),
    };
    let sq = match SearchQuery::matching(&params) {
        Ok(sq) => sq,
        Err(e) => return reject("items", e),
    };
    proxy_search(&app, "items", sq).await
}

/// Rank items by vector similarity.
async fn similar(
    State(app): State<AppState>,
    Json(req): Json<SimilarityParams>,
) -> Response {
    let _timer = REQUEST_SECONDS.with_label_values(&["similar"]).start_timer();
    let params = match req.normalized() {
        Ok(p) => p,
        Err(e) => return reject("similar", e),
    };
    let sq = match SearchQuery::similarity(&params) {
        Ok(sq) => sq,
        Err(e) => return reject("similar", e),
    };
    proxy_search(&app, "similar", sq).await
}

/// Forward a compiled query to Elasticsearch and surface the `hits`
/// substructure unmodified. Backend 400s are assumed to be the user's
/// fault (a search term the backend cannot parse, e.g. "this AND AND
/// that"); everything else is a server error.
async fn proxy_search(app: &AppState, route: &str, sq: SearchQuery) -> Response {
    tracing::debug!(query = %sq.body, "elasticsearch request body");
    let backend_timer = BACKEND_SECONDS.start_timer();
    let resp = app
        .client
        .post(format!("{}/_search", app.es_base))
        .json(&sq.body)
        .send()
        .await;
    backend_timer.observe_duration();
    match resp {
        Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
            Ok(body) => {
                REQUESTS_TOTAL.with_label_values(&[route, "ok"]).inc();
                let hits = body.get("hits").cloned().unwrap_or(Value::Null);
                (StatusCode::OK, Json(json!({ "hits": hits }))).into_response()
            }
            Err(e) => {
                tracing::error!(error = %e, "unreadable backend response");
                server_error(route)
            }
        },
        Ok(resp) if resp.status() == reqwest::StatusCode::BAD_REQUEST => {
            REQUESTS_TOTAL.with_label_values(&[route, "bad_request"]).inc();
            (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid query" }))).into_response()
        }
        Ok(resp) => {
            tracing::error!(status = %resp.status(), "backend search failed");
            server_error(route)
        }
        Err(e) => {
            tracing::error!(error = %e, "error querying the backend");
            server_error(route)
        }
    }
}

fn server_error(route: &str) -> Response {
    REQUESTS_TOTAL.with_label_values(&[route, "error"]).inc();
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Backend search operation failed" })),
    )
        .into_response()
}

fn status_for(err: &SearchError) -> StatusCode {
    match err {
        SearchError::Validation { .. } => StatusCode::BAD_REQUEST,
        SearchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(route: &str, err: SearchError) -> Response {
    let status = status_for(&err);
    match err {
        SearchError::Validation { field, reason } => {
            REQUESTS_TOTAL.with_label_values(&[route, "bad_request"]).inc();
            (status, Json(json!({ "error": reason, "field": field }))).into_response()
        }
        SearchError::Internal(msg) => {
            tracing::error!(error = %msg, "compiler invariant violation");
            REQUESTS_TOTAL.with_label_values(&[route, "error"]).inc();
            (status, Json(json!({ "error": "Unexpected error" }))).into_response()
        }
    }
}

async fn metrics_text() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::new();
    let _ = encoder.encode(&metric_families, &mut buf);
    (StatusCode::OK, String::from_utf8(buf).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        let err = SearchError::validation("q", "must be at least 2 characters");
        assert_eq!(status_for(&err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn internal_errors_map_to_server_error() {
        let err = SearchError::Internal("taxonomy lookup failed".into());
        assert_eq!(status_for(&err), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
