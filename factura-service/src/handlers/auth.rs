//! Registration, login and password-reset handlers.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{Duration, Utc};
use rand::RngCore;
use service_core::error::AppError;
use sha2::{Digest, Sha256};
use validator::Validate;

use crate::dtos::auth::{
    AuthResponse, ForgotPasswordRequest, LoginRequest, MeResponse, MessageResponse,
    RegisterRequest, ResetPasswordRequest,
};
use crate::middleware::AuthUser;
use crate::models::{canonical_nif, NewCompany, NewUser, UserType};
use crate::utils::password::{hash_password, verify_password};
use crate::AppState;

const RESET_TOKEN_TTL_HOURS: i64 = 1;

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

#[tracing::instrument(skip(state, request))]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    request.validate()?;

    // Duplicate checks up front so the caller learns which field clashed;
    // the unique constraints backstop races.
    if state.db.find_user_by_email(&request.email).await?.is_some() {
        return Err(AppError::conflict("Email already registered"));
    }
    let nif = canonical_nif(&request.nif);
    if state.db.find_user_by_nif(&nif).await?.is_some() {
        return Err(AppError::conflict("NIF/CIF already registered"));
    }

    let user_type = request
        .user_type
        .as_deref()
        .map(UserType::from_string)
        .unwrap_or(UserType::Company);

    let password_hash = hash_password(&request.password)?;

    let user = state
        .db
        .insert_user(&NewUser {
            email: request.email.clone(),
            password_hash,
            name: request.name.clone(),
            nif,
            address: request.address.clone(),
            postal_code: request.postal_code.clone(),
            phone: request.phone.clone(),
            user_type,
        })
        .await?;

    // Company accounts get their company row in the same registration,
    // falling back to the owner's personal data for absent fields.
    let company = match (&request.company, user_type) {
        (Some(block), UserType::Company) => Some(
            state
                .db
                .insert_company(&NewCompany {
                    owner_user_id: user.user_id,
                    name: block.name.clone(),
                    nif: canonical_nif(block.nif.as_deref().unwrap_or(&user.nif)),
                    address: block.address.clone().unwrap_or_else(|| user.address.clone()),
                    postal_code: block
                        .postal_code
                        .clone()
                        .unwrap_or_else(|| user.postal_code.clone()),
                    email: block.email.clone().unwrap_or_else(|| user.email.clone()),
                    phone: block
                        .phone
                        .clone()
                        .or_else(|| user.phone.clone())
                        .unwrap_or_default(),
                })
                .await?,
        ),
        _ => None,
    };

    let token = state.jwt.issue_token(
        user.user_id,
        &user.email,
        company.as_ref().map(|c| c.company_id),
    )?;

    tracing::info!(user_id = %user.user_id, user_type = %user.user_type, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: user.sanitized(),
            company,
        }),
    ))
}

#[tracing::instrument(skip(state, request))]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    request.validate()?;

    // Same answer whether the account is missing or the password is wrong.
    let invalid = || AppError::Unauthorized(anyhow::anyhow!("Invalid credentials"));

    let user = state
        .db
        .find_user_by_email(&request.email)
        .await?
        .ok_or_else(invalid)?;

    verify_password(&request.password, &user.password_hash).map_err(|_| invalid())?;

    let company = state.db.find_company_by_owner(user.user_id).await?;
    let token = state.jwt.issue_token(
        user.user_id,
        &user.email,
        company.as_ref().map(|c| c.company_id),
    )?;

    Ok(Json(AuthResponse {
        token,
        user: user.sanitized(),
        company,
    }))
}

pub async fn me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<MeResponse>, AppError> {
    let user = state
        .db
        .find_user_by_id(claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    let company = state.db.find_company_by_owner(user.user_id).await?;

    Ok(Json(MeResponse {
        user: user.sanitized(),
        company,
    }))
}

/// Issue a password-reset token and mail the link. The answer is the same
/// whether or not the account exists, and an email failure never aborts the
/// operation.
#[tracing::instrument(skip(state, request))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    request.validate()?;

    let neutral = MessageResponse {
        message: "If the email exists, a reset link has been sent".to_string(),
    };

    let Some(user) = state.db.find_user_by_email(&request.email).await? else {
        return Ok(Json(neutral));
    };

    let mut token_bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut token_bytes);
    let token = hex::encode(token_bytes);

    state
        .db
        .store_reset_token(
            user.user_id,
            &sha256_hex(&token),
            Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS),
        )
        .await?;

    let reset_url = format!("{}/reset-password?token={}", state.config.frontend_url, token);

    if let Err(e) = state
        .email
        .send_password_reset_email(&user.email, &reset_url)
        .await
    {
        // The token is already stored; failing here would leak whether mail
        // delivery is configured.
        tracing::error!(error = %e, "Password reset email failed");
    }

    Ok(Json(neutral))
}

#[tracing::instrument(skip(state, request))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    request.validate()?;

    let user = state
        .db
        .find_user_by_reset_token(&sha256_hex(&request.token))
        .await?
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid or expired token")))?;

    let password_hash = hash_password(&request.password)?;
    state.db.update_password(user.user_id, &password_hash).await?;

    tracing::info!(user_id = %user.user_id, "Password reset completed");

    Ok(Json(MessageResponse {
        message: "Password updated successfully".to_string(),
    }))
}
