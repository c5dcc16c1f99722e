use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use sentinel_common::{
    utils::{current_timestamp, parse_address},
    MonitoredContract,
};
use sentinel_network::{serve_observer, EventBroadcaster};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::pipeline::{request_registration, PipelineCommand, SystemStatus};
use crate::registry::ContractResolver;

/// Cấu trúc phản hồi API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
    /// Unix milliseconds, cùng đơn vị với timestamp của event
    pub timestamp: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: "Operation successful".to_string(),
            data: Some(data),
            timestamp: current_timestamp(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            data: None,
            timestamp: current_timestamp(),
        }
    }
}

/// State dùng chung cho các handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub broadcaster: EventBroadcaster,
    pub status: Arc<SystemStatus>,
    pub commands: mpsc::Sender<PipelineCommand>,
    pub resolver: ContractResolver,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub monitored_contracts: usize,
    pub observers: usize,
    pub last_checked_block: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterContractRequest {
    pub address: String,
}

async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthReport>> {
    Json(ApiResponse::success(HealthReport {
        monitored_contracts: state.status.monitored_contracts(),
        observers: state.broadcaster.observer_count(),
        last_checked_block: state.status.last_checked_block(),
    }))
}

async fn list_contracts(State(state): State<AppState>) -> Json<ApiResponse<Vec<MonitoredContract>>> {
    Json(ApiResponse::success(state.status.contracts().await))
}

/// Đọc metadata contract trong task nền; pipeline ghi nhận ở đầu tick sau khi đọc xong
async fn register_contract(
    State(state): State<AppState>,
    Json(payload): Json<RegisterContractRequest>,
) -> (StatusCode, Json<ApiResponse<String>>) {
    let address = match parse_address(&payload.address) {
        Ok(address) => address,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(ApiResponse::error(e.to_string()))),
    };

    if state.commands.is_closed() {
        warn!(contract = ?address, "Pipeline đã dừng, không thể đăng ký");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::error("pipeline is not running")),
        );
    }

    info!(contract = ?address, "Nhận yêu cầu đăng ký contract");
    request_registration(state.resolver, address, state.commands);
    (StatusCode::ACCEPTED, Json(ApiResponse::success(format!("{:?}", address))))
}

async fn observer_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_observer(socket, state.broadcaster))
}

/// Router của status API
pub fn get_routes(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health))
        .route("/contracts", get(list_contracts).post(register_contract))
        .route("/ws", get(observer_socket))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Chạy API server cho tới khi `shutdown` hoàn tất
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = get_routes(state);
    info!(%addr, "API server đang khởi động");
    axum::Server::try_bind(&addr)?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("API server đã dừng");
    Ok(())
}
