use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ledger_core::bus::Channel;
use ledger_core::{Block, LedgerError, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::constants::{BUS_CHAIN_ROUTE, BUS_TRANSACTION_ROUTE};
use crate::state::{NodeError, NodeState, WalletInfo};

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct MineRequest {
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct TransactRequest {
    pub recipient: String,
    pub amount: u64,
}

pub struct ApiError(NodeError);

impl From<NodeError> for ApiError {
    fn from(e: NodeError) -> Self {
        ApiError(e)
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        ApiError(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            NodeError::Ledger(LedgerError::MiningCancelled)
            | NodeError::MiningInProgress
            | NodeError::PendingBeingMined { .. } => StatusCode::CONFLICT,
            NodeError::Ledger(LedgerError::Serialization(_)) | NodeError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            NodeError::Ledger(_) => StatusCode::BAD_REQUEST,
        };
        if status.is_server_error() {
            warn!("request failed: {}", self.0);
        }
        let body = Json(json!({ "type": "error", "message": self.0.to_string() }));
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: NodeState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/blocks", get(blocks))
        .route("/api/mine", post(mine))
        .route("/api/transact", post(transact))
        .route("/api/transaction-pool-map", get(pool_map))
        .route("/api/mine-transactions", post(mine_transactions))
        .route("/api/wallet-info", get(wallet_info))
        .route(BUS_CHAIN_ROUTE, post(bus_chain))
        .route(BUS_TRANSACTION_ROUTE, post(bus_transaction))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn blocks(State(state): State<NodeState>) -> Json<Vec<Block>> {
    Json(state.blocks().await)
}

async fn mine(
    State(state): State<NodeState>,
    Json(req): Json<MineRequest>,
) -> ApiResult<Json<Vec<Block>>> {
    state.mine_data(req.data).await?;
    Ok(Json(state.blocks().await))
}

async fn transact(
    State(state): State<NodeState>,
    Json(req): Json<TransactRequest>,
) -> ApiResult<Json<Transaction>> {
    let tx = state.transact(&req.recipient, req.amount).await?;
    Ok(Json(tx))
}

async fn pool_map(State(state): State<NodeState>) -> Json<HashMap<String, Transaction>> {
    Json(state.pool_map().await)
}

async fn mine_transactions(State(state): State<NodeState>) -> ApiResult<Json<Vec<Block>>> {
    state.mine_transactions().await?;
    Ok(Json(state.blocks().await))
}

async fn wallet_info(State(state): State<NodeState>) -> Json<WalletInfo> {
    Json(state.wallet_info().await)
}

async fn bus_chain(State(state): State<NodeState>, body: String) -> ApiResult<StatusCode> {
    state.receive(Channel::Chain, &body).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn bus_transaction(State(state): State<NodeState>, body: String) -> ApiResult<StatusCode> {
    state.receive(Channel::Transaction, &body).await?;
    Ok(StatusCode::NO_CONTENT)
}
