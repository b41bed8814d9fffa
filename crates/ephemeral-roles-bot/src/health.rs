//! Health check endpoint

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use ephemeral_gateway::{Directory, Gateway};
use serde::{Deserialize, Serialize};
use serenity::prelude::TypeMapKey;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub bot_username: Option<String>,
    pub uptime_secs: u64,
    pub voice_state_updates: u64,
    #[serde(default)]
    pub gateway: GatewayStats,
}

/// Gateway occupancy at the time of the request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayStats {
    pub in_flight: usize,
    pub cached_guilds: usize,
}

type StatsFn = Arc<dyn Fn() -> GatewayStats + Send + Sync>;

/// Shared application state for health checks
#[derive(Clone)]
pub struct AppState {
    pub start_time: SystemTime,
    pub bot_username: Arc<RwLock<Option<String>>>,
    voice_state_updates: Arc<AtomicU64>,
    gateway_stats: Option<StatsFn>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            start_time: SystemTime::now(),
            bot_username: Arc::new(RwLock::new(None)),
            voice_state_updates: Arc::new(AtomicU64::new(0)),
            gateway_stats: None,
        }
    }

    /// Report `gateway` occupancy on `/health`.
    pub fn with_gateway<D: Directory>(mut self, gateway: Gateway<D>) -> Self {
        self.gateway_stats = Some(Arc::new(move || GatewayStats {
            in_flight: gateway.in_flight(),
            cached_guilds: gateway.cached_guilds(),
        }));
        self
    }

    pub async fn set_bot_username(&self, username: String) {
        let mut guard = self.bot_username.write().await;
        *guard = Some(username);
    }

    pub fn record_voice_state_update(&self) {
        self.voice_state_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn voice_state_updates(&self) -> u64 {
        self.voice_state_updates.load(Ordering::Relaxed)
    }

    async fn status(&self) -> HealthStatus {
        HealthStatus {
            status: "ok".to_string(),
            bot_username: self.bot_username.read().await.clone(),
            uptime_secs: self.start_time.elapsed().unwrap_or_default().as_secs(),
            voice_state_updates: self.voice_state_updates(),
            gateway: self
                .gateway_stats
                .as_ref()
                .map(|stats| stats())
                .unwrap_or_default(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeMapKey for AppState {
    type Value = AppState;
}

async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    (StatusCode::OK, Json(state.status().await))
}

async fn live_handler() -> StatusCode {
    StatusCode::OK
}

/// Create the health check router
pub fn create_health_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/live", get(live_handler))
        .with_state(state)
}

/// Start the health check server
pub async fn start_health_server(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = create_health_router(state);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Health check server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
