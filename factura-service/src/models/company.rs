use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Issuing company. Owned by exactly one `COMPANY` user.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Company {
    pub company_id: Uuid,
    pub owner_user_id: Uuid,
    pub name: String,
    pub nif: String,
    pub address: String,
    pub postal_code: String,
    pub email: String,
    pub phone: String,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a company alongside its owner registration.
#[derive(Debug, Clone)]
pub struct NewCompany {
    pub owner_user_id: Uuid,
    pub name: String,
    pub nif: String,
    pub address: String,
    pub postal_code: String,
    pub email: String,
    pub phone: String,
}

/// Minimal company card for dropdowns and search results.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CompanySummary {
    pub company_id: Uuid,
    pub name: String,
    pub nif: String,
}
