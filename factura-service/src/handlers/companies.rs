//! Public company lookups for the ticket submission flow.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{Company, CompanySummary};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

/// Name search for the submission form. Queries under two characters come
/// back empty rather than erroring.
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<CompanySummary>>, AppError> {
    if params.q.trim().len() < 2 {
        return Ok(Json(Vec::new()));
    }
    let companies = state.db.search_companies(params.q.trim()).await?;
    Ok(Json(companies))
}

pub async fn get_company(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
) -> Result<Json<Company>, AppError> {
    let company = state
        .db
        .find_company_by_id(company_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Company not found")))?;
    Ok(Json(company))
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<CompanySummary>>, AppError> {
    let companies = state.db.list_companies().await?;
    Ok(Json(companies))
}
