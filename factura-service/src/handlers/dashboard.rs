use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::dtos::invoice::DashboardStats;
use crate::middleware::AuthUser;
use crate::AppState;

/// Company counters: invoice totals, pending queue, client count and
/// realized revenue.
pub async fn stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<DashboardStats>, AppError> {
    let company_id = user.require_company()?;

    let (invoices, pending, clients, revenue) = state.db.dashboard_stats(company_id).await?;

    Ok(Json(DashboardStats {
        invoices,
        pending,
        clients,
        revenue,
    }))
}
