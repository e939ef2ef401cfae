use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, Request, State};
use axum::http::header::HOST;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use mealplan_core::cascade::CascadeReport;
use mealplan_core::key::parse_key;
use mealplan_core::pagination::PageRequest;
use mealplan_core::tasks::{TaskRegistry, TaskRegistryConfig};
use mealplan_core::{PlanError, Planner};
use mealplan_db::models::{
    DailyPlanPatch, MealPlanPatch, NewDailyPlan, NewMealPlan, PlanId, PlanKind, WeeklyPlanPatch,
};

pub const CORRELATION_ID: HeaderName = HeaderName::from_static("x-correlation-id");

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }
}

impl From<PlanError> for AppError {
    fn from(err: PlanError) -> Self {
        let status = match &err {
            PlanError::NotFound { .. } => StatusCode::NOT_FOUND,
            PlanError::InvalidKey(_) => StatusCode::BAD_REQUEST,
            PlanError::IntegrityViolation(_) | PlanError::BucketOverlap { .. } => {
                StatusCode::CONFLICT
            }
            PlanError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
            PlanError::DeletionFailed { .. } | PlanError::TransientStore(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match &err {
            PlanError::DeletionFailed { source, .. } => format!("{err}: {source}"),
            _ => err.to_string(),
        };
        if status.is_server_error() {
            tracing::error!(error = %message, "request failed");
        }
        Self { status, message }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl From<ListParams> for PageRequest {
    fn from(params: ListParams) -> Self {
        PageRequest::new(params.skip, params.limit)
    }
}

#[derive(Debug, Deserialize)]
pub struct DateParams {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct StartTaskParams {
    pub meal_id: String,
}

#[derive(Debug, Deserialize)]
pub struct NewWeeklyPlan {
    pub start_date: NaiveDate,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AppState {
    pub planner: Planner,
    pub tasks: TaskRegistry,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        Self {
            planner: Planner::new(pool),
            tasks: TaskRegistry::default(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/mealplans", post(create_meal_plan).get(list_meal_plans))
        .route("/mealplans/start-task", post(start_meal_plan_task))
        .route("/mealplans/poll/{task_id}", get(poll_task))
        .route(
            "/mealplans/{meal_id}",
            get(get_meal_plan).put(update_meal_plan).delete(delete_meal_plan),
        )
        .route(
            "/weekly-mealplans",
            post(create_weekly_plan).get(plans_for_date),
        )
        .route("/weekly-mealplans/all", get(list_weekly_plans))
        .route(
            "/weekly-mealplans/{id}",
            get(get_weekly_plan)
                .put(update_weekly_plan)
                .delete(delete_weekly_plan),
        )
        .route(
            "/weekly-mealplans/{id}/daily-mealplans",
            get(daily_plans_for_week),
        )
        .route("/daily-mealplans", post(create_daily_plan).get(list_daily_plans))
        .route(
            "/daily-mealplans/{id}",
            get(get_daily_plan)
                .put(update_daily_plan)
                .delete(delete_daily_plan),
        )
        .layer(middleware::from_fn(correlation_id))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Tag every request with an `X-Correlation-ID` (reusing the caller's when
/// present), run it inside a span carrying the id, and echo it back.
async fn correlation_id(mut req: Request, next: Next) -> Response {
    let value = req
        .headers()
        .get(&CORRELATION_ID)
        .filter(|v| !v.is_empty())
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok());

    let Some(value) = value else {
        return next.run(req).await;
    };
    req.headers_mut().insert(CORRELATION_ID, value.clone());

    let span = tracing::info_span!(
        "request",
        correlation_id = %value.to_str().unwrap_or_default(),
        method = %req.method(),
        uri = %req.uri(),
    );
    let mut response = next.run(req).instrument(span).await;
    response.headers_mut().insert(CORRELATION_ID, value);
    response
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(
    pool: PgPool,
    bind: &str,
    port: u16,
    op_timeout: Option<Duration>,
) -> Result<()> {
    let state = AppState {
        planner: Planner::new(pool).with_deadline(op_timeout),
        tasks: TaskRegistry::new(TaskRegistryConfig::default()),
    };
    let cancel = CancellationToken::new();
    let sweeper = state.tasks.spawn_sweeper(cancel.clone());

    let app = build_router(state);
    let listener = bind_listener(bind, port).await?;
    let addr = listener.local_addr()?;
    tracing::info!(?op_timeout, "mealplan serve listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    sweeper.await?;
    tracing::info!("mealplan serve shut down");
    Ok(())
}

/// Bind a host name or an IPv4/IPv6 literal such as `::`.
async fn bind_listener(bind: &str, port: u16) -> Result<tokio::net::TcpListener> {
    tokio::net::TcpListener::bind((bind, port))
        .await
        .with_context(|| format!("failed to bind {bind} port {port}"))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Absolute URL of the requested path, without its query string.
fn base_url(headers: &HeaderMap, uri: &Uri) -> String {
    match headers.get(HOST).and_then(|h| h.to_str().ok()) {
        Some(host) => format!("http://{host}{}", uri.path()),
        None => uri.path().to_string(),
    }
}

fn deleted(kind: PlanKind, id: PlanId, report: CascadeReport) -> Response {
    Json(serde_json::json!({
        "message": format!("{} {id} has been deleted", kind.label()),
        "deleted": report,
    }))
    .into_response()
}

fn not_found(kind: PlanKind, id: PlanId) -> PlanError {
    PlanError::NotFound { kind, id }
}

// ---------------------------------------------------------------------------
// Handlers: meal plans
// ---------------------------------------------------------------------------

async fn index() -> &'static str {
    "Meal plan service is running"
}

async fn create_meal_plan(
    State(state): State<AppState>,
    Json(new): Json<NewMealPlan>,
) -> Result<Response, AppError> {
    let plan = state.planner.create_meal_plan(&new).await?;
    Ok((StatusCode::CREATED, Json(plan)).into_response())
}

async fn list_meal_plans(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, AppError> {
    let page = state
        .planner
        .list_meal_plans(params.into(), &base_url(&headers, &uri))
        .await?;
    Ok(Json(page).into_response())
}

async fn get_meal_plan(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Response, AppError> {
    let meal_id = parse_key(&raw)?;
    let plan = state
        .planner
        .get_meal_plan(meal_id)
        .await?
        .ok_or_else(|| not_found(PlanKind::MealPlan, meal_id))?;
    Ok(Json(plan).into_response())
}

async fn update_meal_plan(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(patch): Json<MealPlanPatch>,
) -> Result<Response, AppError> {
    let meal_id = parse_key(&raw)?;
    let plan = state.planner.update_meal_plan(meal_id, &patch).await?;
    Ok(Json(plan).into_response())
}

async fn delete_meal_plan(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Response, AppError> {
    let meal_id = parse_key(&raw)?;
    let report = state.planner.delete_meal_plan(meal_id).await?;
    Ok(deleted(PlanKind::MealPlan, meal_id, report))
}

async fn start_meal_plan_task(
    State(state): State<AppState>,
    Query(params): Query<StartTaskParams>,
) -> Result<Response, AppError> {
    let meal_id = parse_key(&params.meal_id)?;
    let task_id = state
        .tasks
        .start_meal_plan_fetch(state.planner.clone(), meal_id)
        .await;
    let body = serde_json::json!({
        "message": "Meal plan fetching initiated",
        "task_id": task_id,
        "status": 202,
    });
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

async fn poll_task(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Response, AppError> {
    let task_id =
        Uuid::parse_str(&raw).map_err(|_| AppError::not_found(format!("task {raw} not found")))?;
    let snapshot = state
        .tasks
        .poll(task_id)
        .await
        .ok_or_else(|| AppError::not_found(format!("task {task_id} not found")))?;
    Ok(Json(snapshot).into_response())
}

// ---------------------------------------------------------------------------
// Handlers: weekly plans
// ---------------------------------------------------------------------------

async fn create_weekly_plan(
    State(state): State<AppState>,
    Json(new): Json<NewWeeklyPlan>,
) -> Result<Response, AppError> {
    let week = state.planner.create_weekly_plan(new.start_date).await?;
    Ok((StatusCode::CREATED, Json(week)).into_response())
}

async fn list_weekly_plans(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, AppError> {
    let page = state
        .planner
        .list_weekly_plans(params.into(), &base_url(&headers, &uri))
        .await?;
    Ok(Json(page).into_response())
}

async fn plans_for_date(
    State(state): State<AppState>,
    Query(params): Query<DateParams>,
) -> Result<Response, AppError> {
    let plans = state.planner.plans_for_date(params.date).await?;
    if plans.is_empty() {
        return Err(AppError::not_found(format!(
            "no meal plans found for {}",
            params.date
        )));
    }
    Ok(Json(plans).into_response())
}

async fn get_weekly_plan(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_key(&raw)?;
    let week = state
        .planner
        .get_weekly_plan(id)
        .await?
        .ok_or_else(|| not_found(PlanKind::WeeklyPlan, id))?;
    Ok(Json(week).into_response())
}

async fn update_weekly_plan(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(patch): Json<WeeklyPlanPatch>,
) -> Result<Response, AppError> {
    let id = parse_key(&raw)?;
    let week = state.planner.update_weekly_plan(id, &patch).await?;
    Ok(Json(week).into_response())
}

async fn delete_weekly_plan(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_key(&raw)?;
    let report = state.planner.delete_weekly_plan(id).await?;
    Ok(deleted(PlanKind::WeeklyPlan, id, report))
}

async fn daily_plans_for_week(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_key(&raw)?;
    let days = state
        .planner
        .daily_plans_for_week(id)
        .await?
        .ok_or_else(|| not_found(PlanKind::WeeklyPlan, id))?;
    Ok(Json(days).into_response())
}

// ---------------------------------------------------------------------------
// Handlers: daily plans
// ---------------------------------------------------------------------------

async fn create_daily_plan(
    State(state): State<AppState>,
    Json(new): Json<NewDailyPlan>,
) -> Result<Response, AppError> {
    let day = state.planner.create_daily_plan(&new).await?;
    Ok((StatusCode::CREATED, Json(day)).into_response())
}

async fn list_daily_plans(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, AppError> {
    let page = state
        .planner
        .list_daily_plans(params.into(), &base_url(&headers, &uri))
        .await?;
    Ok(Json(page).into_response())
}

async fn get_daily_plan(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_key(&raw)?;
    let day = state
        .planner
        .get_daily_plan(id)
        .await?
        .ok_or_else(|| not_found(PlanKind::DailyPlan, id))?;
    Ok(Json(day).into_response())
}

async fn update_daily_plan(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(patch): Json<DailyPlanPatch>,
) -> Result<Response, AppError> {
    let id = parse_key(&raw)?;
    let day = state.planner.update_daily_plan(id, &patch).await?;
    Ok(Json(day).into_response())
}

async fn delete_daily_plan(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_key(&raw)?;
    let report = state.planner.delete_daily_plan(id).await?;
    Ok(deleted(PlanKind::DailyPlan, id, report))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use sqlx::PgPool;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use mealplan_test_utils::{create_test_db, drop_test_db};

    use super::{AppState, CORRELATION_ID, bind_listener, build_router};

    // -----------------------------------------------------------------------
    // HTTP helpers
    // -----------------------------------------------------------------------

    /// A pool that never connects, for requests rejected before the store.
    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(100))
            .connect_lazy("postgresql://localhost:1/unused")
            .unwrap()
    }

    async fn send(
        state: &AppState,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> axum::response::Response {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("host", "localhost:5002");
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        build_router(state.clone()).oneshot(request).await.unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    // -----------------------------------------------------------------------
    // Tests without a database
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn index_is_live() {
        let state = AppState::new(lazy_pool());
        let resp = send(&state, "GET", "/", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn non_integer_key_is_bad_request() {
        let state = AppState::new(lazy_pool());
        for uri in ["/mealplans/abc", "/weekly-mealplans/1.5", "/daily-mealplans/x"] {
            let resp = send(&state, "GET", uri, None).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
            let json = body_json(resp).await;
            assert!(json["error"].as_str().unwrap().contains("invalid key"));
        }
    }

    #[tokio::test]
    async fn correlation_id_is_generated_and_echoed() {
        let state = AppState::new(lazy_pool());

        let resp = send(&state, "GET", "/", None).await;
        let generated = resp.headers().get(&CORRELATION_ID).unwrap().to_str().unwrap();
        assert!(uuid::Uuid::parse_str(generated).is_ok());

        let request = Request::builder()
            .uri("/")
            .header("x-correlation-id", "abc-123")
            .body(Body::empty())
            .unwrap();
        let resp = build_router(state).oneshot(request).await.unwrap();
        assert_eq!(resp.headers().get(&CORRELATION_ID).unwrap(), "abc-123");
    }

    #[tokio::test]
    async fn listener_binds_host_names_and_reports_failures() {
        let listener = bind_listener("localhost", 0).await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());

        let err = bind_listener("not a host", 0).await.unwrap_err();
        assert!(err.to_string().contains("failed to bind not a host port 0"), "{err}");
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let state = AppState::new(lazy_pool());
        let resp = send(&state, "GET", &format!("/mealplans/poll/{}", uuid::Uuid::new_v4()), None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = send(&state, "GET", "/mealplans/poll/1729000000.123", None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    // -----------------------------------------------------------------------
    // Tests against a database
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn meal_plan_crud() {
        let (pool, db_name) = create_test_db().await;
        let state = AppState::new(pool.clone());

        let resp = send(
            &state,
            "POST",
            "/mealplans",
            Some(serde_json::json!({ "breakfast_recipe": 171, "lunch_recipe": 180 })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let json = body_json(resp).await;
        assert_eq!(json["meal_id"], 1);
        assert_eq!(json["dinner_recipe"], serde_json::Value::Null);

        let resp = send(
            &state,
            "PUT",
            "/mealplans/1",
            Some(serde_json::json!({ "dinner_recipe": 2 })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["breakfast_recipe"], 171);
        assert_eq!(json["dinner_recipe"], 2);

        let resp = send(&state, "DELETE", "/mealplans/1", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["deleted"]["meal_plans"], 1);

        let resp = send(&state, "GET", "/mealplans/1", None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = send(&state, "DELETE", "/mealplans/1", None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = send(&state, "PUT", "/mealplans/1", Some(serde_json::json!({}))).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn daily_plan_creates_week_and_week_delete_keeps_meal() {
        let (pool, db_name) = create_test_db().await;
        let state = AppState::new(pool.clone());

        send(&state, "POST", "/mealplans", Some(serde_json::json!({}))).await;
        let resp = send(
            &state,
            "POST",
            "/daily-mealplans",
            Some(serde_json::json!({ "date": "2024-10-03", "meal_id": 1 })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let day = body_json(resp).await;
        assert_eq!(day["day_plan_id"], 1);
        assert_eq!(day["week_plan_id"], 1);

        let resp = send(&state, "GET", "/weekly-mealplans/1", None).await;
        let week = body_json(resp).await;
        assert_eq!(week["start_date"], "2024-10-03");
        assert_eq!(week["end_date"], "2024-10-09");

        let resp = send(&state, "GET", "/weekly-mealplans?date=2024-10-05", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let plans = body_json(resp).await;
        assert_eq!(plans["weekly_plans"][0]["week_plan_id"], 1);

        let resp = send(&state, "GET", "/weekly-mealplans/1/daily-mealplans", None).await;
        assert_eq!(body_json(resp).await.as_array().unwrap().len(), 1);

        let resp = send(&state, "DELETE", "/weekly-mealplans/1", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["deleted"]["daily_plans"], 1);

        let resp = send(&state, "GET", "/daily-mealplans/1", None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = send(&state, "GET", "/mealplans/1", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let resp = send(&state, "GET", "/weekly-mealplans?date=2024-10-05", None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn list_links_use_request_host() {
        let (pool, db_name) = create_test_db().await;
        let state = AppState::new(pool.clone());

        for _ in 0..25 {
            send(&state, "POST", "/mealplans", Some(serde_json::json!({}))).await;
        }

        let resp = send(&state, "GET", "/mealplans?skip=10&limit=10", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["items"].as_array().unwrap().len(), 10);
        assert_eq!(
            json["links"]["next"]["href"],
            "http://localhost:5002/mealplans?skip=20&limit=10"
        );
        assert_eq!(
            json["links"]["last"]["href"],
            "http://localhost:5002/mealplans?skip=20&limit=10"
        );
        assert_eq!(
            json["links"]["previous"]["href"],
            "http://localhost:5002/mealplans?skip=0&limit=10"
        );

        let resp = send(&state, "GET", "/mealplans?skip=9223372036854775807", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert!(json["items"].as_array().unwrap().is_empty());
        assert!(json["links"].get("next").is_none());

        let resp = send(&state, "GET", "/weekly-mealplans/all", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert!(json["items"].as_array().unwrap().is_empty());
        assert!(json["links"].get("next").is_none());

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn integrity_failures_are_conflicts() {
        let (pool, db_name) = create_test_db().await;
        let state = AppState::new(pool.clone());

        // Missing meal plan: foreign key violation.
        let resp = send(
            &state,
            "POST",
            "/daily-mealplans",
            Some(serde_json::json!({ "date": "2024-10-03", "meal_id": 9 })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        // Overlapping buckets.
        send(&state, "POST", "/mealplans", Some(serde_json::json!({}))).await;
        for start in ["2024-10-01", "2024-10-03"] {
            let resp = send(
                &state,
                "POST",
                "/weekly-mealplans",
                Some(serde_json::json!({ "start_date": start })),
            )
            .await;
            assert_eq!(resp.status(), StatusCode::CREATED);
        }
        let resp = send(
            &state,
            "POST",
            "/daily-mealplans",
            Some(serde_json::json!({ "date": "2024-10-05", "meal_id": 1 })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let json = body_json(resp).await;
        assert!(json["error"].as_str().unwrap().contains("overlap"));

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn failed_cascade_is_server_error_with_cause() {
        let (pool, db_name) = create_test_db().await;
        let state = AppState::new(pool.clone());

        send(&state, "POST", "/mealplans", Some(serde_json::json!({}))).await;
        send(
            &state,
            "POST",
            "/daily-mealplans",
            Some(serde_json::json!({ "date": "2024-10-03", "meal_id": 1 })),
        )
        .await;

        // A second day on the same meal plan is refused.
        let resp = send(
            &state,
            "POST",
            "/daily-mealplans",
            Some(serde_json::json!({ "date": "2024-10-04", "meal_id": 1 })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        // Fail the meal delete that follows the daily delete.
        sqlx::query(
            r#"CREATE FUNCTION refuse_meal_delete() RETURNS trigger LANGUAGE plpgsql AS $$
            BEGIN
                RAISE EXCEPTION 'meal plan % is pinned', OLD.meal_id
                    USING ERRCODE = 'foreign_key_violation';
            END;
            $$"#,
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "CREATE TRIGGER meal_plans_refuse_delete BEFORE DELETE ON meal_plans \
             FOR EACH ROW EXECUTE FUNCTION refuse_meal_delete()",
        )
        .execute(&pool)
        .await
        .unwrap();

        let resp = send(&state, "DELETE", "/daily-mealplans/1", None).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        let message = json["error"].as_str().unwrap();
        assert!(message.starts_with("failed to delete daily plan 1"), "{message}");
        assert!(message.contains("integrity violation"), "{message}");

        let resp = send(&state, "GET", "/daily-mealplans/1", None).await;
        assert_eq!(resp.status(), StatusCode::OK);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn start_task_then_poll_until_completed() {
        let (pool, db_name) = create_test_db().await;
        let state = AppState::new(pool.clone());

        send(&state, "POST", "/mealplans", Some(serde_json::json!({ "lunch_recipe": 5 }))).await;

        let resp = send(&state, "POST", "/mealplans/start-task?meal_id=1", None).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let json = body_json(resp).await;
        let task_id = json["task_id"].as_str().unwrap().to_string();

        let mut last = serde_json::Value::Null;
        for _ in 0..100 {
            let resp = send(&state, "GET", &format!("/mealplans/poll/{task_id}"), None).await;
            assert_eq!(resp.status(), StatusCode::OK);
            last = body_json(resp).await;
            if last["status"] != "in-progress" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(last["status"], "completed");
        assert_eq!(last["task_id"], task_id);
        assert_eq!(last["meal_plan"]["lunch_recipe"], 5);

        let resp = send(&state, "POST", "/mealplans/start-task?meal_id=abc", None).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        pool.close().await;
        drop_test_db(&db_name).await;
    }
}
