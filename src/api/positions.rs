use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::{AppState, PositionDto};
use crate::domain::{Decimal, OwnerId, PositionId};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePositionRequest {
    pub owner_id: i64,
    pub amount: Decimal,
    pub duration: i64,
    #[serde(default)]
    pub auto_resubmit: bool,
}

pub async fn create_position(
    State(state): State<AppState>,
    Json(body): Json<CreatePositionRequest>,
) -> Result<(StatusCode, Json<PositionDto>), AppError> {
    let position = state
        .positions
        .create_position(
            OwnerId::new(body.owner_id),
            body.amount,
            body.duration,
            body.auto_resubmit,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(PositionDto::from(&position))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionsQuery {
    pub owner_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionsResponse {
    pub positions: Vec<PositionDto>,
    pub summary: SummaryDto,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDto {
    pub total_invested: String,
    pub active_positions: usize,
    pub total_profit: String,
    pub total_estimated_income: String,
    pub available_balance: String,
    pub profit_loss: String,
}

pub async fn get_positions(
    Query(params): Query<PositionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<PositionsResponse>, AppError> {
    let owner_id = OwnerId::new(params.owner_id);
    let positions = state.positions.positions_for_owner(owner_id).await?;
    let summary = state.positions.owner_summary(owner_id).await?;

    Ok(Json(PositionsResponse {
        positions: positions.iter().map(PositionDto::from).collect(),
        summary: SummaryDto {
            total_invested: summary.total_invested.to_canonical_string(),
            active_positions: summary.active_count,
            total_profit: summary.total_profit.to_canonical_string(),
            total_estimated_income: summary.total_estimated_income.to_canonical_string(),
            available_balance: summary.available_balance.to_canonical_string(),
            profit_loss: summary.profit_loss.to_canonical_string(),
        },
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoResubmitRequest {
    pub owner_id: i64,
    pub auto_resubmit: bool,
}

pub async fn set_auto_resubmit(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<AutoResubmitRequest>,
) -> Result<Json<PositionDto>, AppError> {
    let position = state
        .positions
        .set_auto_resubmit(
            &PositionId::new(id),
            OwnerId::new(body.owner_id),
            body.auto_resubmit,
        )
        .await?;

    Ok(Json(PositionDto::from(&position)))
}
