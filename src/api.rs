use std::time::Instant;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use cashbook_core::EntryId;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};

use crate::service::{
    CashEntryInput, CashEntryView, Cashbook, ReportView, ServiceError, WorkOrderInput, WorkOrderView,
};

#[derive(Clone)]
pub struct AppState {
    pub service: Cashbook,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(service: Cashbook, metrics: Option<PrometheusHandle>) -> Self {
        Self { service, metrics }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

#[derive(Serialize)]
struct OkBody {
    ok: bool,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServiceError::InvalidDate(_) | ServiceError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServiceError::NotFound(..) => (StatusCode::NOT_FOUND, self.to_string()),
            ServiceError::Storage(_) | ServiceError::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "operation failed".to_string())
            }
        };
        (status, Json(ErrorBody { success: false, error: message })).into_response()
    }
}

// Extractor rejections get the same JSON error body as every other 400.
impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        ServiceError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ServiceError {
    fn from(rejection: PathRejection) -> Self {
        ServiceError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ServiceError {
    fn from(rejection: QueryRejection) -> Self {
        ServiceError::Validation(rejection.body_text())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .route("/cash", get(list_cash).post(create_cash))
        .route("/cash/:id", get(get_cash).put(update_cash).delete(delete_cash))
        .route("/work-orders", get(list_work_orders).post(create_work_order))
        .route(
            "/work-orders/:id",
            get(get_work_order).put(update_work_order).delete(delete_work_order),
        )
        .route("/report", get(daily_report))
        .layer(middleware::from_fn(track_requests))
        .with_state(state)
}

pub async fn track_requests<B>(req: Request<B>, next: Next<B>) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    tracing::debug!(%method, %path, status, elapsed_ms = started.elapsed().as_millis() as u64, "Handled request");
    metrics::increment_counter!(
        "cashbook_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    );
    response
}

/// Storage backends are synchronous; keep them off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, ServiceError>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServiceError::Internal(format!("blocking task failed: {}", e)))?
}

async fn health(State(state): State<AppState>) -> Response {
    let service = state.service.clone();
    match tokio::task::spawn_blocking(move || service.diagnostics()).await {
        Ok(diagnostics) if diagnostics.is_healthy() => Json(diagnostics).into_response(),
        Ok(diagnostics) => (StatusCode::INTERNAL_SERVER_ERROR, Json(diagnostics)).into_response(),
        Err(e) => ServiceError::Internal(format!("health check task failed: {}", e)).into_response(),
    }
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics exporter not installed").into_response(),
    }
}

type JsonInput<T> = Result<Json<T>, JsonRejection>;
type IdPath = Result<Path<EntryId>, PathRejection>;
type DateFilter = Result<Query<DateQuery>, QueryRejection>;

async fn list_cash(State(state): State<AppState>, query: DateFilter) -> Result<Json<Vec<CashEntryView>>, ServiceError> {
    let Query(query) = query?;
    let service = state.service.clone();
    let views = blocking(move || service.list_cash(query.date.as_deref())).await?;
    Ok(Json(views))
}

async fn get_cash(State(state): State<AppState>, id: IdPath) -> Result<Json<CashEntryView>, ServiceError> {
    let Path(id) = id?;
    let service = state.service.clone();
    let view = blocking(move || service.get_cash(id)).await?;
    Ok(Json(view))
}

async fn create_cash(
    State(state): State<AppState>,
    input: JsonInput<CashEntryInput>,
) -> Result<(StatusCode, Json<CashEntryView>), ServiceError> {
    let Json(input) = input?;
    let service = state.service.clone();
    let view = blocking(move || service.create_cash(input)).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn update_cash(
    State(state): State<AppState>,
    id: IdPath,
    input: JsonInput<CashEntryInput>,
) -> Result<Json<CashEntryView>, ServiceError> {
    let Path(id) = id?;
    let Json(input) = input?;
    let service = state.service.clone();
    let view = blocking(move || service.update_cash(id, input)).await?;
    Ok(Json(view))
}

async fn delete_cash(State(state): State<AppState>, id: IdPath) -> Result<Response, ServiceError> {
    let Path(id) = id?;
    let service = state.service.clone();
    blocking(move || service.delete_cash(id)).await?;
    Ok(Json(OkBody { ok: true }).into_response())
}

async fn list_work_orders(
    State(state): State<AppState>,
    query: DateFilter,
) -> Result<Json<Vec<WorkOrderView>>, ServiceError> {
    let Query(query) = query?;
    let service = state.service.clone();
    let views = blocking(move || service.list_work_orders(query.date.as_deref())).await?;
    Ok(Json(views))
}

async fn get_work_order(State(state): State<AppState>, id: IdPath) -> Result<Json<WorkOrderView>, ServiceError> {
    let Path(id) = id?;
    let service = state.service.clone();
    let view = blocking(move || service.get_work_order(id)).await?;
    Ok(Json(view))
}

async fn create_work_order(
    State(state): State<AppState>,
    input: JsonInput<WorkOrderInput>,
) -> Result<(StatusCode, Json<WorkOrderView>), ServiceError> {
    let Json(input) = input?;
    let service = state.service.clone();
    let view = blocking(move || service.create_work_order(input)).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn update_work_order(
    State(state): State<AppState>,
    id: IdPath,
    input: JsonInput<WorkOrderInput>,
) -> Result<Json<WorkOrderView>, ServiceError> {
    let Path(id) = id?;
    let Json(input) = input?;
    let service = state.service.clone();
    let view = blocking(move || service.update_work_order(id, input)).await?;
    Ok(Json(view))
}

async fn delete_work_order(State(state): State<AppState>, id: IdPath) -> Result<Response, ServiceError> {
    let Path(id) = id?;
    let service = state.service.clone();
    blocking(move || service.delete_work_order(id)).await?;
    Ok(Json(OkBody { ok: true }).into_response())
}

async fn daily_report(State(state): State<AppState>, query: DateFilter) -> Result<Json<ReportView>, ServiceError> {
    let Query(query) = query?;
    let service = state.service.clone();
    let view = blocking(move || service.daily_report_view(query.date.as_deref())).await?;
    Ok(Json(view))
}
