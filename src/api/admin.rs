//! Back-office endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::api::{AppState, PositionDto};
use crate::domain::{Decimal, OwnerId, PositionId, PositionState, UserAccount};
use crate::error::AppError;
use crate::orchestration::SweepReport;

pub async fn process_positions(
    State(state): State<AppState>,
) -> Result<Json<SweepReport>, AppError> {
    let report = state
        .maturity
        .run_maturity_sweep()
        .await
        .map_err(|e| AppError::Internal(format!("Maturity sweep failed: {}", e)))?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

pub async fn set_status(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<PositionDto>, AppError> {
    let target = PositionState::from_str(&body.status).map_err(AppError::BadRequest)?;
    let position = state
        .positions
        .set_status(&PositionId::new(id), target)
        .await?;
    Ok(Json(PositionDto::from(&position)))
}

pub async fn cancel_position(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PositionDto>, AppError> {
    let position = state.positions.cancel_position(&PositionId::new(id)).await?;
    Ok(Json(PositionDto::from(&position)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDto {
    pub owner_id: i64,
    pub available_balance: String,
    pub profit_loss: String,
}

impl From<&UserAccount> for AccountDto {
    fn from(a: &UserAccount) -> Self {
        Self {
            owner_id: a.owner_id.as_i64(),
            available_balance: a.available_balance.to_canonical_string(),
            profit_loss: a.profit_loss.to_canonical_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAccountRequest {
    pub owner_id: i64,
    #[serde(default)]
    pub initial_balance: Decimal,
}

pub async fn open_account(
    State(state): State<AppState>,
    Json(body): Json<OpenAccountRequest>,
) -> Result<(StatusCode, Json<AccountDto>), AppError> {
    let account = state
        .accounts
        .open_account(OwnerId::new(body.owner_id), body.initial_balance)
        .await?;
    Ok((StatusCode::CREATED, Json(AccountDto::from(&account))))
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Decimal,
}

pub async fn deposit(
    Path(owner_id): Path<i64>,
    State(state): State<AppState>,
    Json(body): Json<AmountRequest>,
) -> Result<Json<AccountDto>, AppError> {
    let account = state
        .accounts
        .deposit(OwnerId::new(owner_id), body.amount)
        .await?;
    Ok(Json(AccountDto::from(&account)))
}

pub async fn withdraw(
    Path(owner_id): Path<i64>,
    State(state): State<AppState>,
    Json(body): Json<AmountRequest>,
) -> Result<Json<AccountDto>, AppError> {
    let account = state
        .accounts
        .withdraw(OwnerId::new(owner_id), body.amount)
        .await?;
    Ok(Json(AccountDto::from(&account)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyDto {
    pub position_id: String,
    pub owner_id: i64,
    pub kind: String,
    pub detail: String,
    pub time_ms: i64,
}

pub async fn get_anomalies(
    State(state): State<AppState>,
) -> Result<Json<Vec<AnomalyDto>>, AppError> {
    let anomalies = state
        .repo
        .list_anomalies()
        .await
        .map_err(|e| AppError::Internal(format!("Anomaly query failed: {}", e)))?;

    Ok(Json(
        anomalies
            .into_iter()
            .map(|a| AnomalyDto {
                position_id: a.position_id.to_string(),
                owner_id: a.owner_id.as_i64(),
                kind: a.kind.as_str().to_string(),
                detail: a.detail,
                time_ms: a.time_ms.as_ms(),
            })
            .collect(),
    ))
}
