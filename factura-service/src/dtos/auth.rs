use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Company, SanitizedUser};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "NIF is required"))]
    pub nif: String,
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    #[validate(length(min = 1, message = "Postal code is required"))]
    pub postal_code: String,
    pub phone: Option<String>,
    /// "CLIENT" or "COMPANY"; defaults to COMPANY like the web flow.
    pub user_type: Option<String>,
    pub company: Option<RegisterCompany>,
}

/// Company block of a COMPANY registration. Absent fields fall back to the
/// owner's personal data.
#[derive(Debug, Deserialize)]
pub struct RegisterCompany {
    pub name: String,
    pub nif: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: SanitizedUser,
    pub company: Option<Company>,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: SanitizedUser,
    pub company: Option<Company>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
