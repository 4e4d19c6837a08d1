//! REST backend for the sales task log.
//!
//! Routes:
//! - `GET  /api/list`
//! - `POST /api/tasks`
//! - `PUT  /api/tasks/:id`
//! - `PUT  /api/task/:id` (note)
//! - `PUT  /api/task/status/:id`

pub mod error;
pub mod handlers;
pub mod state;

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, post, put};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

pub use state::AppState;

pub fn router(state: Arc<AppState>, cors_origin: &str) -> anyhow::Result<Router> {
    let origin = HeaderValue::from_str(cors_origin)
        .with_context(|| format!("invalid CORS origin: {cors_origin}"))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE]);

    Ok(Router::new()
        .route("/api/list", get(handlers::list_tasks))
        .route("/api/tasks", post(handlers::create_task))
        .route("/api/tasks/:id", put(handlers::update_task))
        .route("/api/task/:id", put(handlers::set_task_note))
        .route("/api/task/status/:id", put(handlers::set_task_status))
        .layer(cors)
        .with_state(state))
}

pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().context("listener has no local address")?;
    info!(%addr, "task server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("task server stopped with an error")?;
    info!("task server stopped");
    Ok(())
}
