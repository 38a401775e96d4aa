//! HTTP server and API endpoints for the faucet server.

use crate::{
    config::FaucetConfig,
    error::{FaucetError, FaucetResult},
    eth::{validate_address, EthereumClient, FundsDispatcher, TransferPolicy},
    state::CooldownTracker,
};
use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct SharedState {
    pub tracker: Arc<CooldownTracker>,
    pub dispatcher: Arc<dyn FundsDispatcher>,
    pub policy: TransferPolicy,
    pub allowed_origin: HeaderValue,
}

/// Request for a faucet payout
#[derive(Debug, Serialize, Deserialize)]
pub struct SendRequest {
    /// Kept loose so that a missing or non-string address is reported as an
    /// invalid address rather than a malformed body.
    #[serde(default)]
    pub address: Option<serde_json::Value>,
}

/// Response after a successful payout
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendResponse {
    pub success: bool,
    #[serde(rename = "txHash")]
    pub tx_hash: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub faucet_address: String,
    pub faucet_balance_wei: Option<String>,
    pub rpc_connected: bool,
    pub funded_addresses: usize,
}

/// Create the HTTP router with all endpoints
pub fn create_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(state.allowed_origin.clone())
        .allow_methods([Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/send", post(send_funds))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(middleware::from_fn_with_state(state.clone(), enforce_origin)),
        )
        .with_state(state)
}

/// Reject browser requests coming from any origin but the configured one.
///
/// Requests without an `Origin` header are let through.
async fn enforce_origin(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    if let Some(origin) = request.headers().get(header::ORIGIN) {
        if origin != &state.allowed_origin {
            let origin = origin.to_str().unwrap_or("<non-ascii>").to_string();
            warn!("Rejected request from origin {}", origin);
            return FaucetError::OriginNotAllowed(origin).into_response();
        }
    }

    next.run(request).await
}

/// Root endpoint - provides basic information
async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "Faucet Server",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /send": "Send testnet funds to an address (provide address)",
            "GET /health": "Health check",
        }
    }))
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let balance = state.dispatcher.faucet_balance().await;
    let rpc_connected = balance.is_ok();

    if let Err(e) = &balance {
        warn!("Health check could not read faucet balance: {}", e);
    }

    Json(HealthResponse {
        status: if rpc_connected { "healthy" } else { "degraded" }.to_string(),
        faucet_address: state.dispatcher.faucet_address().to_string(),
        faucet_balance_wei: balance.ok().map(|b| b.to_string()),
        rpc_connected,
        funded_addresses: state.tracker.funded_count(),
    })
}

/// Send funds to the requested address
async fn send_funds(
    State(state): State<SharedState>,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> FaucetResult<Json<SendResponse>> {
    // Bodies that are not declared as JSON carry no address
    let Json(request) = payload.map_err(|e| match e {
        JsonRejection::MissingJsonContentType(_) => FaucetError::InvalidAddress(String::new()),
        e => FaucetError::InvalidRequest(e.body_text()),
    })?;

    let address = match &request.address {
        Some(serde_json::Value::String(address)) => address.as_str(),
        _ => return Err(FaucetError::InvalidAddress(String::new())),
    };

    dispense(&state, address).await.map(Json)
}

/// Validate, check the cooldown, transfer and record.
///
/// The cooldown permit is held until the transfer has either been recorded
/// or failed, so a failed transfer leaves the record as it was.
pub async fn dispense(state: &SharedState, raw_address: &str) -> FaucetResult<SendResponse> {
    let address = validate_address(raw_address).inspect_err(|_| {
        warn!("Rejected invalid address: {:?}", raw_address);
    })?;

    let permit = state.tracker.acquire(address).await;
    permit.check().inspect_err(|_| {
        warn!("Rejected {}: cooldown active", address);
    })?;

    let transfer = state.policy.transfer_to(address);
    info!("Sending {} wei to {}", transfer.value, address);

    match state.dispatcher.send_transfer(transfer).await {
        Ok(tx_hash) => {
            permit.record();
            info!("Funded {} (tx: {:#x})", address, tx_hash);
            Ok(SendResponse {
                success: true,
                tx_hash: format!("{:#x}", tx_hash),
            })
        }
        Err(e) => {
            error!("Transfer to {} failed: {}", address, e);
            Err(e)
        }
    }
}

/// Start the HTTP server
pub async fn start_server(config: &FaucetConfig) -> FaucetResult<()> {
    info!("Starting faucet server...");

    let tracker = Arc::new(CooldownTracker::new(chrono::Duration::hours(
        config.security.cooldown_hours as i64,
    )));
    let policy = TransferPolicy::from_config(config)?;
    let ethereum_client = Arc::new(EthereumClient::new(config)?);

    info!("Faucet wallet: {}", ethereum_client.faucet_address());
    match ethereum_client.faucet_balance().await {
        Ok(balance) if balance < policy.value => {
            warn!("Faucet balance {} wei is below one payout of {} wei", balance, policy.value)
        }
        Ok(balance) => info!("Faucet balance: {} wei", balance),
        Err(e) => warn!("Could not read faucet balance: {}", e),
    }

    let allowed_origin = HeaderValue::from_str(&config.http.allowed_origin).map_err(|e| {
        FaucetError::Internal(anyhow::anyhow!(
            "Invalid allowed origin {}: {}",
            config.http.allowed_origin,
            e
        ))
    })?;

    let shared_state = SharedState {
        tracker: tracker.clone(),
        dispatcher: ethereum_client,
        policy,
        allowed_origin,
    };

    // Start cleanup task
    let cleanup_interval = config.security.cleanup_interval_minutes;
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(cleanup_interval.saturating_mul(60)));

        loop {
            interval.tick().await;
            tracker.cleanup();
        }
    });

    let app = create_router(shared_state);

    let bind_addr = format!("{}:{}", config.http.bind_address, config.http.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| FaucetError::Internal(anyhow::anyhow!("Failed to bind to {}: {}", bind_addr, e)))?;

    info!("Faucet server listening on {}", bind_addr);
    info!("Endpoints:");
    info!("  GET  /         - Server information");
    info!("  GET  /health   - Health check");
    info!("  POST /send     - Send funds to an address");

    axum::serve(listener, app)
        .await
        .map_err(|e| FaucetError::Internal(anyhow::anyhow!("Server error: {}", e)))?;

    Ok(())
}
