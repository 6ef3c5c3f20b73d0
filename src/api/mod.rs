pub mod admin;
pub mod health;
pub mod plans;
pub mod positions;

use crate::config::Config;
use crate::db::Repository;
use crate::domain::{Clock, Position};
use crate::orchestration::{AccountService, MaturityProcessor, PositionService};
use axum::{
    routing::{get, post, put},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub positions: PositionService,
    pub accounts: AccountService,
    pub maturity: MaturityProcessor,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            positions: PositionService::new(repo.clone(), clock.clone()),
            accounts: AccountService::new(repo.clone(), clock.clone()),
            maturity: MaturityProcessor::new(repo.clone(), clock, config.settlement_retry_max),
            repo,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/plans", get(plans::get_plans))
        .route(
            "/v1/positions",
            get(positions::get_positions).post(positions::create_position),
        )
        .route(
            "/v1/positions/:id/auto-resubmit",
            put(positions::set_auto_resubmit),
        )
        .route(
            "/v1/admin/process-positions",
            post(admin::process_positions),
        )
        .route("/v1/admin/positions/:id/status", put(admin::set_status))
        .route("/v1/admin/positions/:id/cancel", post(admin::cancel_position))
        .route("/v1/admin/accounts", post(admin::open_account))
        .route("/v1/admin/accounts/:owner_id/deposit", post(admin::deposit))
        .route("/v1/admin/accounts/:owner_id/withdraw", post(admin::withdraw))
        .route("/v1/admin/anomalies", get(admin::get_anomalies))
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionDto {
    pub id: String,
    pub owner_id: i64,
    pub amount: String,
    pub duration: u32,
    pub reward_percentage: String,
    pub status: String,
    pub start_date: String,
    pub end_date: String,
    pub estimated_income: String,
    pub profit: String,
    pub auto_resubmit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resubmitted_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resubmitted_as: Option<String>,
}

impl From<&Position> for PositionDto {
    fn from(p: &Position) -> Self {
        Self {
            id: p.id.to_string(),
            owner_id: p.owner_id.as_i64(),
            amount: p.principal.to_canonical_string(),
            duration: p.duration.days(),
            reward_percentage: p.reward_percentage.to_canonical_string(),
            status: p.state.to_string(),
            start_date: p.start_time.to_rfc3339(),
            end_date: p.end_time.to_rfc3339(),
            estimated_income: p.estimated_income.to_canonical_string(),
            profit: p.profit.to_canonical_string(),
            auto_resubmit: p.auto_resubmit,
            resubmitted_from: p.predecessor_id.as_ref().map(|id| id.to_string()),
            resubmitted_as: p.successor_id.as_ref().map(|id| id.to_string()),
        }
    }
}
