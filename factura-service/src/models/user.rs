//! User model: both portal clients and company operators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Account flavor. A `Company` user owns a company row and reviews
/// incoming ticket requests; a `Client` user submits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserType {
    Client,
    Company,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Client => "CLIENT",
            UserType::Company => "COMPANY",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "CLIENT" => UserType::Client,
            _ => UserType::Company,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub nif: String,
    pub address: String,
    pub postal_code: String,
    pub phone: Option<String>,
    pub user_type: String,
    pub reset_token_hash: Option<String>,
    pub reset_token_expiry: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl User {
    pub fn user_type(&self) -> UserType {
        UserType::from_string(&self.user_type)
    }

    pub fn sanitized(&self) -> SanitizedUser {
        SanitizedUser {
            user_id: self.user_id,
            email: self.email.clone(),
            name: self.name.clone(),
            nif: self.nif.clone(),
            user_type: self.user_type.clone(),
            created_utc: self.created_utc,
        }
    }
}

/// Input for registering a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub nif: String,
    pub address: String,
    pub postal_code: String,
    pub phone: Option<String>,
    pub user_type: UserType,
}

/// User view safe to return over the API (no credential material).
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedUser {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub nif: String,
    pub user_type: String,
    pub created_utc: DateTime<Utc>,
}
