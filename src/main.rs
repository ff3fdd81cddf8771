use crate::config::Config;
use crate::startup::AppState;
use axum::{
    Json, Router,
    extract::Extension,
    http::{
        StatusCode,
        header::{ACCEPT, CONTENT_TYPE},
    },
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, CorsLayer};

#[macro_use]
extern crate tracing;

mod config;
mod db;
mod error;
mod lifecycle;
mod polls;
mod results;
mod sse;
mod startup;

#[tokio::main]
async fn main() {
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "INFO");
        }
    }
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();
    let config = Config::load();

    let pool = db::connection::init_db(&config.database_url)
        .await
        .expect("Failed to initialise the database");

    let app_state = AppState::new(pool);
    let sse_tx = sse::create_sse_broadcaster();

    lifecycle::spawn_status_sweeper(app_state.db.clone(), sse_tx.clone());

    let app = Router::new()
        .route("/api/health", get(health))
        .route("/api/polls", get(polls::list_polls).post(polls::create_poll))
        .route("/api/polls/live", get(sse::all_polls_sse))
        .route("/api/polls/:id", get(polls::get_poll))
        .route(
            "/api/polls/:id/votes",
            get(polls::list_votes).post(polls::cast_vote),
        )
        .route("/api/polls/:id/results", get(polls::get_results))
        .route("/api/polls/:id/end", post(polls::end_poll))
        .route("/api/polls/:id/cancel", post(polls::cancel_poll))
        .route("/api/polls/:id/recount", post(polls::recount_poll))
        .route("/api/polls/:id/live", get(sse::poll_updates_sse))
        .layer(Extension(app_state.clone()))
        .layer(Extension(sse_tx))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::mirror_request())
                .allow_methods([
                    axum::http::Method::POST,
                    axum::http::Method::GET,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([CONTENT_TYPE, ACCEPT]),
        )
        .fallback(handler_404);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Unable to spawn tcp listener");

    axum::serve(listener, app).await.unwrap();
}

async fn health(Extension(app_state): Extension<AppState>) -> impl IntoResponse {
    match db::connection::get_pool_stats(&app_state.db).await {
        Ok(stats) => (StatusCode::OK, Json(json!({"status": "ok", "pool": stats}))),
        Err(e) => {
            error!("health check failed: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "degraded"})),
            )
        }
    }
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "nothing to see here")
}
