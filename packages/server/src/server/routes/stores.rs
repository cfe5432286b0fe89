//! Store admission and read endpoints.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::domains::stores::models::{Store, StoreEngine, StoreEvent, StoreStatus};
use crate::domains::stores::AdmissionError;
use crate::server::app::AppState;
use crate::server::middleware::CallerIdentity;

const DETAIL_EVENT_LIMIT: i64 = 50;
const DISPLAY_NAME_MAX: usize = 120;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateStoreRequest {
    #[serde(default)]
    pub engine: StoreEngine,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub store_id: String,
    pub status: StoreStatus,
    pub namespace: String,
    pub queued_job_id: String,
}

#[derive(Debug, Serialize)]
pub struct StoreResponse {
    pub id: String,
    pub engine: StoreEngine,
    pub display_name: Option<String>,
    pub namespace: String,
    pub release_name: String,
    pub status: StoreStatus,
    pub url: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Store> for StoreResponse {
    fn from(store: Store) -> Self {
        Self {
            id: store.id.to_string(),
            engine: store.engine,
            display_name: store.display_name,
            namespace: store.namespace,
            release_name: store.release_name,
            status: store.status,
            url: store.url,
            last_error: store.last_error,
            created_at: store.created_at,
            updated_at: store.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StoreEventResponse {
    pub id: i64,
    pub event_type: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StoreDetailResponse {
    #[serde(flatten)]
    pub store: StoreResponse,
    pub events: Vec<StoreEventResponse>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Admission(AdmissionError::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Admission(AdmissionError::UnsupportedEngine) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Admission(AdmissionError::CapacityExhausted) => StatusCode::CONFLICT,
            ApiError::Admission(AdmissionError::NotFound) => StatusCode::NOT_FOUND,
            ApiError::Admission(AdmissionError::Internal(_)) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

fn parse_store_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("invalid store id".to_string()))
}

pub async fn create_store_handler(
    Extension(state): Extension<AppState>,
    Extension(CallerIdentity(identity)): Extension<CallerIdentity>,
    Json(payload): Json<CreateStoreRequest>,
) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
    if let Some(name) = &payload.display_name {
        if name.chars().count() > DISPLAY_NAME_MAX {
            return Err(ApiError::BadRequest(format!(
                "display_name must be at most {DISPLAY_NAME_MAX} characters"
            )));
        }
    }

    let receipt = state
        .admission
        .create_store(payload.engine, payload.display_name, &identity)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            store_id: receipt.store_id.to_string(),
            status: receipt.status,
            namespace: receipt.namespace,
            queued_job_id: receipt.queued_job_id.to_string(),
        }),
    ))
}

pub async fn list_stores_handler(
    Extension(state): Extension<AppState>,
) -> Result<Json<Vec<StoreResponse>>, ApiError> {
    let stores = Store::list_all(&state.db_pool).await?;
    Ok(Json(stores.into_iter().map(StoreResponse::from).collect()))
}

pub async fn get_store_handler(
    Extension(state): Extension<AppState>,
    Path(store_id): Path<String>,
) -> Result<Json<StoreDetailResponse>, ApiError> {
    let store_id = parse_store_id(&store_id)?;

    let store = Store::find_by_id(store_id, &state.db_pool)
        .await?
        .ok_or(AdmissionError::NotFound)?;

    let events = StoreEvent::find_recent_for_store(store.id, DETAIL_EVENT_LIMIT, &state.db_pool)
        .await?
        .into_iter()
        .map(|event| StoreEventResponse {
            id: event.id,
            event_type: event.event_type,
            message: event.message,
            created_at: event.created_at,
        })
        .collect();

    Ok(Json(StoreDetailResponse {
        store: StoreResponse::from(store),
        events,
    }))
}

pub async fn delete_store_handler(
    Extension(state): Extension<AppState>,
    Extension(CallerIdentity(identity)): Extension<CallerIdentity>,
    Path(store_id): Path<String>,
) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
    let store_id = parse_store_id(&store_id)?;

    let receipt = state.admission.delete_store(store_id, &identity).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            store_id: receipt.store_id.to_string(),
            status: receipt.status,
            namespace: receipt.namespace,
            queued_job_id: receipt.queued_job_id.to_string(),
        }),
    ))
}
