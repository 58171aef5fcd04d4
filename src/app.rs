use std::{net::SocketAddr, time::Duration};

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, field, info, info_span, warn, Span};

use crate::state::AppState;
use crate::{auth, users};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(users::router())
                .route("/health", get(health)),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(record_response),
        )
}

fn request_span(req: &Request<Body>) -> Span {
    info_span!(
        "http_request",
        method = %req.method(),
        path = %req.uri().path(),
        status = field::Empty,
        latency_ms = field::Empty
    )
}

fn record_response(res: &Response<Body>, latency: Duration, span: &Span) {
    let status = res.status().as_u16();
    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
    span.record("status", status);
    span.record("latency_ms", latency_ms);
    if res.status().is_server_error() {
        error!(status, latency_ms, "request failed");
    } else if res.status().is_client_error() {
        warn!(status, latency_ms, "request rejected");
    } else {
        info!(status, latency_ms, "request served");
    }
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    database: bool,
    timestamp: String,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        database: state.store.ping().await,
        timestamp: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default(),
    })
}

pub async fn serve(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "userauth listening");
    axum::serve(listener, app).await?;
    Ok(())
}
