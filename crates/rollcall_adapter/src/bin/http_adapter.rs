#![forbid(unsafe_code)]

use std::{env, net::SocketAddr, sync::Arc};

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use rollcall_adapter::{
    AdapterRuntime, CreateSessionAdapterRequest, MarkAdapterRequest, RegisterFaceAdapterRequest,
};

#[derive(Debug, serde::Deserialize)]
struct DaySheetQuery {
    day: Option<String>,
}

#[derive(Debug, serde::Serialize)]
struct AdapterErrorResponse {
    status: String,
    reason: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bind = env::var("ROLLCALL_HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let addr: SocketAddr = bind.parse()?;

    let runtime = Arc::new(AdapterRuntime::default());
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/session", post(create_session))
        .route("/v1/session/:session_id/scan", get(scan))
        .route("/v1/session/:session_id/sheet", get(day_sheet))
        .route("/v1/attendance/mark", post(mark_attendance))
        .route("/v1/biometric/register", post(register_face))
        .with_state(runtime);

    println!("rollcall_adapter_http listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

async fn healthz(State(runtime): State<Arc<AdapterRuntime>>) -> impl IntoResponse {
    (StatusCode::OK, Json(runtime.health_report()))
}

async fn create_session(
    State(runtime): State<Arc<AdapterRuntime>>,
    Json(request): Json<CreateSessionAdapterRequest>,
) -> impl IntoResponse {
    match runtime.create_session(request) {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(reason) => error_response(StatusCode::BAD_REQUEST, reason),
    }
}

async fn scan(
    State(runtime): State<Arc<AdapterRuntime>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match runtime.scan(&session_id) {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(reason) => error_response(StatusCode::NOT_FOUND, reason),
    }
}

async fn mark_attendance(
    State(runtime): State<Arc<AdapterRuntime>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(request): Json<MarkAdapterRequest>,
) -> impl IntoResponse {
    match runtime.mark_attendance(&peer.ip().to_string(), request) {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(reason) => error_response(StatusCode::BAD_REQUEST, reason),
    }
}

async fn register_face(
    State(runtime): State<Arc<AdapterRuntime>>,
    Json(request): Json<RegisterFaceAdapterRequest>,
) -> impl IntoResponse {
    match runtime.register_face(request) {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(reason) => error_response(StatusCode::BAD_REQUEST, reason),
    }
}

async fn day_sheet(
    State(runtime): State<Arc<AdapterRuntime>>,
    Path(session_id): Path<String>,
    Query(query): Query<DaySheetQuery>,
) -> impl IntoResponse {
    match runtime.day_sheet_csv(&session_id, query.day.as_deref()) {
        Ok(csv) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            csv,
        )
            .into_response(),
        Err(reason) => error_response(StatusCode::BAD_REQUEST, reason),
    }
}

fn error_response(code: StatusCode, reason: String) -> axum::response::Response {
    (
        code,
        Json(AdapterErrorResponse {
            status: "error".to_string(),
            reason,
        }),
    )
        .into_response()
}
