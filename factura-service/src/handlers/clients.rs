//! Company-scoped client management.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::auth::MessageResponse;
use crate::dtos::client::{ClientDetail, CreateClientRequest, UpdateClientRequest};
use crate::middleware::AuthUser;
use crate::models::{canonical_nif, Client, ClientFields, UpdateClient};
use crate::AppState;

fn client_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Client not found"))
}

pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Client>>, AppError> {
    let company_id = user.require_company()?;
    let clients = state.db.list_clients(company_id).await?;
    Ok(Json(clients))
}

pub async fn get_client(
    State(state): State<AppState>,
    user: AuthUser,
    Path(client_id): Path<Uuid>,
) -> Result<Json<ClientDetail>, AppError> {
    let company_id = user.require_company()?;

    let client = state
        .db
        .find_client(company_id, client_id)
        .await?
        .ok_or_else(client_not_found)?;

    let invoices = state.db.client_recent_invoices(client.client_id, 10).await?;

    Ok(Json(ClientDetail { client, invoices }))
}

/// NIF lookup used by the invoice form to autofill client data.
pub async fn search_by_nif(
    State(state): State<AppState>,
    user: AuthUser,
    Path(nif): Path<String>,
) -> Result<Json<Client>, AppError> {
    let company_id = user.require_company()?;

    let client = state
        .db
        .find_client_by_nif(company_id, &nif)
        .await?
        .ok_or_else(client_not_found)?;

    Ok(Json(client))
}

#[tracing::instrument(skip(state, request))]
pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<Client>), AppError> {
    let company_id = user.require_company()?;
    request.validate()?;

    let fields = ClientFields::new(
        request.name,
        &request.nif,
        request.email,
        request.address,
        request.postal_code,
        request.phone,
    );

    if state
        .db
        .find_client_by_nif(company_id, &fields.nif)
        .await?
        .is_some()
    {
        return Err(AppError::conflict("Client with this NIF already exists"));
    }

    let client = state.db.insert_client(company_id, &fields).await?;

    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(client_id): Path<Uuid>,
    Json(request): Json<UpdateClientRequest>,
) -> Result<Json<Client>, AppError> {
    let company_id = user.require_company()?;

    let input = UpdateClient {
        name: request.name,
        nif: request.nif.as_deref().map(canonical_nif),
        email: request.email,
        address: request.address,
        postal_code: request.postal_code,
        phone: request.phone,
    };

    let client = state
        .db
        .update_client(company_id, client_id, &input)
        .await?
        .ok_or_else(client_not_found)?;

    Ok(Json(client))
}

pub async fn delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(client_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let company_id = user.require_company()?;

    if !state.db.delete_client(company_id, client_id).await? {
        return Err(client_not_found());
    }

    Ok(Json(MessageResponse {
        message: "Client deleted successfully".to_string(),
    }))
}
