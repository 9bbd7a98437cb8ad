// 🌐 REST API - locations and map view as JSON, plus the map page itself
//
// The pipeline is synchronous (blocking HTTP to the spreadsheet), so every
// handler runs it on the blocking pool behind one shared mutex.

use crate::data_quality::{QualityIssue, QualityReport};
use crate::display::{filter_by_state, group_by_state, MapView};
use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use crate::reconciliation::{ReconcileStats, ReconciliationReport};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Mutex<Pipeline>>,
}

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StateQuery {
    state: Option<String>,
}

#[derive(Serialize)]
struct StateSummary {
    state: String,
    count: usize,
    cities: Vec<String>,
}

#[derive(Serialize)]
struct QualityResponse {
    summary: QualityReport,
    stats: ReconcileStats,
    issues: Vec<QualityIssue>,
}

// ============================================================================
// Pipeline bridge
// ============================================================================

/// Run the pipeline off the async runtime and shape the report with `f`
async fn with_report<T, F>(state: &AppState, f: F) -> Response
where
    F: FnOnce(ReconciliationReport) -> T + Send + 'static,
    T: Serialize + Send + 'static,
{
    let pipeline = Arc::clone(&state.pipeline);
    let result = tokio::task::spawn_blocking(move || {
        // Cache entries are replaced wholesale; a poisoned guard is still consistent
        let mut pipeline = pipeline.lock().unwrap_or_else(|p| p.into_inner());
        pipeline.run().map(f)
    })
    .await;

    match result {
        Ok(Ok(data)) => (StatusCode::OK, Json(ApiResponse::ok(data))).into_response(),
        Ok(Err(e)) => pipeline_error(e),
        Err(e) => {
            tracing::error!("pipeline task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::err("internal error".to_string())),
            )
                .into_response()
        }
    }
}

fn pipeline_error(e: PipelineError) -> Response {
    let status = match e {
        PipelineError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(ApiResponse::<()>::err(e.to_string()))).into_response()
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/locations?state=TX - Reconciled locations, optionally one state
async fn get_locations(State(state): State<AppState>, Query(query): Query<StateQuery>) -> Response {
    with_report(&state, move |report| {
        filter_by_state(&report.locations, query.state.as_deref())
    })
    .await
}

/// GET /api/states - Every state with its location count and cities
async fn get_states(State(state): State<AppState>) -> Response {
    with_report(&state, |report| {
        group_by_state(&report.locations)
            .into_iter()
            .map(|group| StateSummary {
                cities: group.cities(),
                count: group.entries.len(),
                state: group.state,
            })
            .collect::<Vec<_>>()
    })
    .await
}

/// GET /api/view?state=TX - Viewport, markers and grouped listing
async fn get_view(State(state): State<AppState>, Query(query): Query<StateQuery>) -> Response {
    with_report(&state, move |report| {
        MapView::build(&report.locations, query.state.as_deref())
    })
    .await
}

/// GET /api/quality - Rows dropped by validation
async fn get_quality(State(state): State<AppState>) -> Response {
    with_report(&state, |report| QualityResponse {
        summary: report.quality(),
        stats: report.stats,
        issues: report.issues,
    })
    .await
}

/// POST /api/refresh - Drop the cached load
async fn refresh(State(state): State<AppState>) -> Response {
    let pipeline = Arc::clone(&state.pipeline);
    match tokio::task::spawn_blocking(move || {
        pipeline.lock().unwrap_or_else(|p| p.into_inner()).refresh()
    })
    .await
    {
        Ok(()) => Json(ApiResponse::ok("OK")).into_response(),
        Err(e) => {
            tracing::error!("refresh task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET / - Serve the map page
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(pipeline: Pipeline) -> Router {
    let state = AppState {
        pipeline: Arc::new(Mutex::new(pipeline)),
    };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/locations", get(get_locations))
        .route("/states", get(get_states))
        .route("/view", get(get_view))
        .route("/quality", get(get_quality))
        .route("/refresh", post(refresh))
        .with_state(state);

    Router::new()
        .route("/", get(serve_index))
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new("web"))
        .layer(CorsLayer::permissive())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::DataLoader;
    use crate::source::{RawRows, TabularSource};
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    struct FixedSource {
        branches: RawRows,
        coordinates: RawRows,
    }

    impl TabularSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        fn fetch_range(&self, range: &str) -> anyhow::Result<RawRows> {
            Ok(if range == "branches" {
                self.branches.clone()
            } else {
                self.coordinates.clone()
            })
        }
    }

    fn rows(data: &[&[&str]]) -> RawRows {
        data.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn app_with(branches: RawRows) -> Router {
        let source = FixedSource {
            branches,
            coordinates: rows(&[
                &["Branch Name", "Pub Name", "Latitude", "Longitude"],
                &["Austin", "Lucky Lizard", "30.27", "-97.74"],
                &["Dallas", "Trinity Hall", "32.78", "-96.80"],
                &["Boston", "Phoenix Landing", "42.36", "-71.10"],
            ]),
        };
        let loader = DataLoader::new(Box::new(source), "branches", "coordinates");
        router(Pipeline::new(loader, Duration::from_secs(3600)))
    }

    fn app() -> Router {
        app_with(rows(&[
            &["Timestamp", "Branch Name", "Pub Name", "Pub City", "Pub State", "Branch Twitter Handle"],
            &["9/14/2021 13:45:12", "Austin", "Lucky Lizard", "Austin", "TX", "@AustinGooners"],
            &["9/14/2021 13:45:12", "Dallas", "Trinity Hall", "Dallas", "TX"],
            &["9/14/2021 13:45:12", "Boston", "Phoenix Landing", "Cambridge", "MA"],
        ]))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(app(), "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "OK");
    }

    #[tokio::test]
    async fn test_locations_filtered_by_state() {
        let (status, body) = get_json(app(), "/api/locations?state=TX").await;

        assert_eq!(status, StatusCode::OK);
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["pub_state"], "TX");
        assert_eq!(data[0]["branch_name"], "Austin");
        assert_eq!(data[0]["latitude"], 30.27);
    }

    #[tokio::test]
    async fn test_states_summary() {
        let (_, body) = get_json(app(), "/api/states").await;

        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["state"], "MA");
        assert_eq!(data[1]["count"], 2);
        assert_eq!(data[1]["cities"], serde_json::json!(["Austin", "Dallas"]));
    }

    #[tokio::test]
    async fn test_view_zooms_to_state() {
        let (_, body) = get_json(app(), "/api/view?state=TX").await;

        let view = &body["data"];
        assert_eq!(view["state_filter"], "TX");
        assert_eq!(view["viewport"]["latitude"], 32.78);
        assert_eq!(view["markers"].as_array().unwrap().len(), 2);
        assert_eq!(
            view["groups"][0]["entries"][0]["links"]["twitter"],
            "https://twitter.com/AustinGooners"
        );
    }

    #[tokio::test]
    async fn test_empty_source_is_503() {
        let (status, body) = get_json(app_with(Vec::new()), "/api/view").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "no data found in branches table");
    }

    #[tokio::test]
    async fn test_refresh() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/refresh")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
