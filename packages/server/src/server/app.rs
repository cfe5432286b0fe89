//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    middleware,
    routing::get,
    Router,
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::domains::stores::AdmissionService;
use crate::kernel::ServerKernel;
use crate::server::middleware::extract_caller_identity;
use crate::server::routes::{
    create_store_handler, delete_store_handler, get_store_handler, health_handler,
    list_stores_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub kernel: Arc<ServerKernel>,
    pub admission: Arc<AdmissionService>,
}

/// Build the Axum application router
pub fn build_app(kernel: Arc<ServerKernel>, config: &Config) -> Router {
    let admission = Arc::new(AdmissionService::new(kernel.db_pool.clone(), config));

    let app_state = AppState {
        db_pool: kernel.db_pool.clone(),
        kernel,
        admission,
    };

    // CORS configuration - allow any origin, matching the local-first
    // deployment model of the control plane.
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    Router::new()
        .route(
            "/stores",
            get(list_stores_handler).post(create_store_handler),
        )
        .route(
            "/stores/:store_id",
            get(get_store_handler).delete(delete_store_handler),
        )
        .route("/healthz", get(health_handler))
        .layer(middleware::from_fn(extract_caller_identity))
        .layer(Extension(app_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
