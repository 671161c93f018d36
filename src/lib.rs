//! Operations dashboard backend for a small service business: lead and
//! customer metrics from HighLevel, ad spend from Meta, revenue and expenses
//! from QuickBooks, rolled into one KPI surface with receipt scanning and
//! manual overrides on the side.

pub mod config;
pub mod error;
pub mod expenses;
pub mod helpers;
pub mod highlevel;
pub mod kpi;
pub mod meta_ads;
pub mod overrides;
pub mod period;
pub mod quickbooks;
pub mod receipt;
pub mod routes;
pub mod state;

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/dashboard", get(routes::dashboard))
        .route("/api/kpis", get(routes::kpis))
        .route("/api/cac", get(routes::cac))
        .route(
            "/api/overrides",
            get(routes::get_overrides).post(routes::save_overrides),
        )
        .route(
            "/api/books/refresh",
            get(routes::books_token_status).post(routes::refresh_books_token),
        )
        .route("/api/receipts/extract", post(routes::extract_receipt))
        .route(
            "/api/expenses",
            get(routes::list_expenses).post(routes::add_expense),
        )
        .route("/api/expenses/{id}", axum::routing::delete(routes::delete_expense))
        .route("/api/debug", get(routes::debug_crm))
        .route("/api/debug/leads", get(routes::debug_leads))
        .route("/api/debug/tags", get(routes::debug_tags))
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

pub async fn start_server(state: SharedState) -> std::io::Result<()> {
    let addr = state.config.bind_addr.clone();
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "dashboard API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}
