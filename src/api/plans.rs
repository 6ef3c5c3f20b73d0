use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::AppState;
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlansResponse {
    pub plans: Vec<PlanDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDto {
    pub duration: u32,
    pub label: String,
    pub reward_percentage: String,
    pub min_amount: String,
    pub max_amount: String,
}

pub async fn get_plans(State(state): State<AppState>) -> Result<Json<PlansResponse>, AppError> {
    let plans = state
        .repo
        .list_plans()
        .await
        .map_err(|e| AppError::Internal(format!("Plan query failed: {}", e)))?;

    Ok(Json(PlansResponse {
        plans: plans
            .into_iter()
            .map(|p| PlanDto {
                duration: p.duration.days(),
                label: p.label,
                reward_percentage: p.reward_percentage.to_canonical_string(),
                min_amount: p.min_amount.to_canonical_string(),
                max_amount: p.max_amount.to_canonical_string(),
            })
            .collect(),
    }))
}
