use crate::models::config::AppConfig;
use crate::models::control::{StickPosition, Throttle};
use crate::models::dashboard::{Coordinates, GpsPoint, GpsStats};
use crate::services::backend::DashboardBackend;
use crate::services::geocode::{GeocodeError, Geocoder};
use crate::services::gps;
use crate::services::session::ConsoleSession;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::warn;

// State
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<DashboardBackend>,
    pub geocoder: Arc<Geocoder>,
    pub session: Arc<ConsoleSession>,
    pub config: Arc<AppConfig>,
}

pub fn create_app(state: AppState) -> Router {
    let static_dir = state.config.server.static_dir.clone();

    Router::new()
        .route("/", get(root))
        .route("/api/dashboard_data", get(api_dashboard_data))
        .route("/api/flight_parameters", get(api_flight_parameters))
        .route("/api/surveillance_data", get(api_surveillance_data))
        .route("/api/generate_gps_points", post(api_generate_gps_points))
        .route("/api/geocode", post(api_geocode))
        .route("/api/session", get(api_session))
        .route("/api/controllers/:name/toggle", post(api_toggle_controller))
        .route("/api/manual/stick", post(api_manual_stick))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Upstream(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Upstream(m) => (StatusCode::BAD_GATEWAY, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<GeocodeError> for ApiError {
    fn from(err: GeocodeError) -> Self {
        match err {
            GeocodeError::EmptyAddress => ApiError::BadRequest(err.to_string()),
            GeocodeError::NotFound => ApiError::NotFound(err.to_string()),
            GeocodeError::InvalidCoordinates(_) | GeocodeError::Request(_) => {
                warn!("Geocoding failed: {}", err);
                ApiError::Upstream(err.to_string())
            }
        }
    }
}

// Routes
async fn root() -> impl IntoResponse {
    Redirect::to("/api/session")
}

async fn api_dashboard_data(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.backend.dashboard_data())
}

async fn api_flight_parameters(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.backend.flight_parameters())
}

async fn api_surveillance_data(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.backend.surveillance_objects())
}

#[derive(Deserialize)]
struct GpsRequest {
    lat: Option<Value>,
    lon: Option<Value>,
}

/// Accepts numbers and numeric strings.
fn coordinate(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Serialize)]
struct GpsResponse {
    points: Vec<GpsPoint>,
    stats: Option<GpsStats>,
}

async fn api_generate_gps_points(Json(req): Json<GpsRequest>) -> Result<Json<GpsResponse>, ApiError> {
    let (lat, lon) = match (coordinate(req.lat.as_ref()), coordinate(req.lon.as_ref())) {
        (Some(lat), Some(lon)) if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) => (lat, lon),
        _ => return Err(ApiError::BadRequest("Invalid or missing lat/lon".to_string())),
    };

    let base = Coordinates { lat, lon };
    let points = gps::generate_points(base, gps::POINTS_PER_REQUEST);
    let stats = gps::summarize(base, &points);

    Ok(Json(GpsResponse { points, stats }))
}

#[derive(Deserialize)]
struct GeocodeRequest {
    #[serde(default)]
    address: String,
}

async fn api_geocode(
    State(state): State<AppState>,
    Json(req): Json<GeocodeRequest>,
) -> Result<Json<Coordinates>, ApiError> {
    let found = state.geocoder.lookup(&req.address).await?;
    Ok(Json(found))
}

async fn api_session(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.session.report())
}

async fn api_toggle_controller(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state
        .session
        .toggle_controller(&name)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown controller: {}", name)))?;

    Ok(Json(json!({
        "name": name,
        "status": status,
        "summary": state.session.report().summary,
    })))
}

#[derive(Deserialize)]
struct StickRequest {
    dx: f64,
    dy: f64,
    max_distance: f64,
    #[serde(default)]
    throttle: u8,
    /// The pad snaps back to centre on release.
    #[serde(default)]
    released: bool,
}

async fn api_manual_stick(Json(req): Json<StickRequest>) -> impl IntoResponse {
    let stick = if req.released {
        StickPosition::centre()
    } else {
        StickPosition::clamp(req.dx, req.dy, req.max_distance)
    };
    Json(json!({
        "stick": stick,
        "deflection": stick.distance(),
        "throttle": Throttle::new(req.throttle).to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::backend::{BackendSnapshotSource, Feed};
    use crate::services::detection::TracingView;
    use crate::services::session::SessionSources;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let config = AppConfig::default();
        let backend = Arc::new(DashboardBackend::new());
        let sources = SessionSources {
            dashboard: Arc::new(BackendSnapshotSource::new(Arc::clone(&backend), Feed::Dashboard)),
            header: Arc::new(BackendSnapshotSource::new(Arc::clone(&backend), Feed::Header)),
            flight: Arc::new(BackendSnapshotSource::new(Arc::clone(&backend), Feed::Flight)),
            detections: None,
        };
        let session = ConsoleSession::open(&config, sources, Arc::new(TracingView));

        AppState {
            backend,
            geocoder: Arc::new(Geocoder::new(&config.geocoding).unwrap()),
            session: Arc::new(session),
            config: Arc::new(config),
        }
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn dashboard_data_has_every_panel() {
        let app = create_app(test_state());
        let response = app
            .oneshot(Request::get("/api/dashboard_data").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["controllers"].as_array().unwrap().len(), 5);
        assert!(body["system_status"]["connection"].is_u64());
        assert!(body["co_drive_logs"].is_array());
        assert!(body["cyber_threats"].is_array());
    }

    #[tokio::test]
    async fn gps_points_require_coordinates() {
        let app = create_app(test_state());
        let response = app
            .oneshot(post_json("/api/generate_gps_points", json!({ "lat": 37.7 })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["error"], "Invalid or missing lat/lon");
    }

    #[tokio::test]
    async fn gps_points_generated_with_stats() {
        let app = create_app(test_state());
        let response = app
            .oneshot(post_json(
                "/api/generate_gps_points",
                json!({ "lat": 37.7749, "lon": -122.4194 }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["points"].as_array().unwrap().len(), 50);
        assert!(body["stats"]["average_accuracy"].is_f64());
    }

    #[tokio::test]
    async fn gps_points_accept_numeric_strings() {
        let app = create_app(test_state());
        let response = app
            .oneshot(post_json(
                "/api/generate_gps_points",
                json!({ "lat": "37.7749", "lon": " -122.4194 " }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let app = create_app(test_state());
        let response = app
            .oneshot(post_json("/api/generate_gps_points", json!({ "lat": "north", "lon": -122.4 })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["error"], "Invalid or missing lat/lon");
    }

    #[tokio::test]
    async fn geocode_rejects_blank_address() {
        let app = create_app(test_state());
        let response = app
            .oneshot(post_json("/api/geocode", json!({ "address": "" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["error"], "Address is required");
    }

    #[tokio::test]
    async fn unknown_controller_toggle_is_not_found() {
        let app = create_app(test_state());
        let response = app
            .oneshot(post_json("/api/controllers/Nobody/toggle", json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn session_report_starts_all_clear() {
        let app = create_app(test_state());
        let response = app
            .oneshot(Request::get("/api/session").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["surveillance"]["state"], "ALL_CLEAR");
        assert_eq!(body["surveillance"]["action"], "Monitoring for threats...");
    }

    #[tokio::test]
    async fn manual_stick_is_clamped() {
        let app = create_app(test_state());
        let response = app
            .oneshot(post_json(
                "/api/manual/stick",
                json!({ "dx": 30.0, "dy": 40.0, "max_distance": 25.0, "throttle": 60 }),
            ))
            .await
            .unwrap();

        let body = read_json(response).await;
        assert!((body["stick"]["dx"].as_f64().unwrap() - 15.0).abs() < 1e-9);
        assert!((body["deflection"].as_f64().unwrap() - 25.0).abs() < 1e-9);
        assert_eq!(body["throttle"], "60%");

        let app = create_app(test_state());
        let response = app
            .oneshot(post_json(
                "/api/manual/stick",
                json!({ "dx": 30.0, "dy": 40.0, "max_distance": 25.0, "released": true }),
            ))
            .await
            .unwrap();
        let body = read_json(response).await;
        assert_eq!(body["stick"]["dx"], 0.0);
        assert_eq!(body["deflection"], 0.0);
        assert_eq!(body["throttle"], "0%");
    }
}
