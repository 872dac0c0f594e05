//! Invoice workflow handlers: ticket intake, review, direct creation and
//! delivery.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::future::Future;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::auth::MessageResponse;
use crate::dtos::invoice::{
    ApproveInvoiceRequest, CreateInvoiceRequest, InvoiceActionResponse, InvoiceDetail,
    RejectInvoiceRequest, TicketClientData,
};
use crate::middleware::AuthUser;
use crate::models::{
    next_invoice_number, number_prefix, ClientFields, CreateDirectInvoice, CreateTicketInvoice,
    Invoice, LineItemInput, TaxBreakdown, TicketData, DEFAULT_TAX_RATE,
};
use crate::services::metrics::INVOICES_TOTAL;
use crate::services::pdf::render_invoice_pdf;
use crate::utils::ticket::{parse_ticket_text, ticket_fingerprint};
use crate::AppState;

/// Bounded retry around the read-then-write numbering sequence; the
/// `(company_id, number)` uniqueness constraint turns a lost race into a
/// conflict we can recompute from.
const NUMBERING_ATTEMPTS: u32 = 3;

const DEFAULT_REJECTION_REASON: &str = "No especificada";

fn request_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Solicitud no encontrada o ya procesada"))
}

fn invoice_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Factura no encontrada"))
}

/// Assemble the response shape for one invoice, loading its relations.
async fn invoice_detail(
    state: &AppState,
    invoice: Invoice,
    with_company: bool,
    with_requester: bool,
) -> Result<InvoiceDetail, AppError> {
    let items = state.db.invoice_items(invoice.invoice_id).await?;
    let client = state
        .db
        .find_client(invoice.company_id, invoice.client_id)
        .await?;
    let company = if with_company {
        state.db.find_company_by_id(invoice.company_id).await?
    } else {
        None
    };
    let requester = match (with_requester, invoice.requester_user_id) {
        (true, Some(user_id)) => state
            .db
            .find_user_by_id(user_id)
            .await?
            .map(|u| u.sanitized()),
        _ => None,
    };

    Ok(InvoiceDetail {
        invoice,
        company,
        client,
        requester,
        items,
    })
}

async fn detail_list(
    state: &AppState,
    invoices: Vec<Invoice>,
    with_company: bool,
    with_requester: bool,
) -> Result<Vec<InvoiceDetail>, AppError> {
    let mut details = Vec::with_capacity(invoices.len());
    for invoice in invoices {
        details.push(invoice_detail(state, invoice, with_company, with_requester).await?);
    }
    Ok(details)
}

/// Run a numbered write with the next free `YYYY-NNN` for the company,
/// recomputing and retrying when a concurrent writer takes the number
/// first (surfaced by `write` as a conflict).
async fn with_numbering<T, F, Fut>(
    state: &AppState,
    company_id: Uuid,
    mut write: F,
) -> Result<T, AppError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let year = Utc::now().year();
    let prefix = number_prefix(year);

    for attempt in 1..=NUMBERING_ATTEMPTS {
        let last = state.db.last_invoice_number(company_id, &prefix).await?;
        let number = next_invoice_number(year, last.as_deref());

        match write(number).await {
            Err(AppError::Conflict { .. }) if attempt < NUMBERING_ATTEMPTS => {
                tracing::warn!(attempt, company_id = %company_id, "Invoice number taken, retrying");
            }
            other => return other,
        }
    }

    Err(AppError::conflict(
        "Could not allocate an invoice number, please retry",
    ))
}

// ==================== Client endpoints ====================

struct TicketSubmission {
    image: Vec<u8>,
    company_id: Uuid,
    client_data: TicketClientData,
}

async fn read_ticket_submission(mut multipart: Multipart) -> Result<TicketSubmission, AppError> {
    let mut image = None;
    let mut company_id = None;
    let mut client_data = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "ticketImage" | "ticket_image" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;
                image = Some(bytes.to_vec());
            }
            "companyId" | "company_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;
                company_id = Some(text.trim().parse::<Uuid>().map_err(|_| {
                    AppError::BadRequest(anyhow::anyhow!("Company ID is not a valid UUID"))
                })?);
            }
            "clientData" | "client_data" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;
                client_data =
                    Some(serde_json::from_str::<TicketClientData>(&text).map_err(|e| {
                        AppError::BadRequest(anyhow::anyhow!("Invalid client data: {}", e))
                    })?);
            }
            _ => {}
        }
    }

    let image =
        image.ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Ticket image is required")))?;
    let company_id = company_id
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Company ID is required")))?;
    let client_data = client_data
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Client data is required")))?;

    Ok(TicketSubmission {
        image,
        company_id,
        client_data,
    })
}

/// Ticket intake: OCR, parse, dedup, client upsert, tax split, and a new
/// PENDING invoice.
#[tracing::instrument(skip(state, user, multipart))]
pub async fn request_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<InvoiceActionResponse>), AppError> {
    let submission = read_ticket_submission(multipart).await?;
    submission.client_data.validate()?;

    let raw_text = state.ocr.extract_text(submission.image).await?;
    let ticket = parse_ticket_text(&raw_text);

    // Parsing never fails, but the invoice flow needs amount and date.
    let (Some(amount), Some(date)) = (ticket.amount, ticket.date) else {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "No se pudieron extraer datos necesarios del ticket (fecha y/o importe)"
        )));
    };

    let company = state
        .db
        .find_company_by_id(submission.company_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Empresa no encontrada")))?;

    let ticket_hash = ticket_fingerprint(date, amount, company.company_id);
    if state
        .db
        .find_invoice_by_ticket_hash(company.company_id, &ticket_hash)
        .await?
        .is_some()
    {
        return Err(state
            .db
            .duplicate_ticket_conflict(company.company_id, &ticket_hash)
            .await);
    }

    let client_data = submission.client_data;
    let client = state
        .db
        .upsert_client(
            company.company_id,
            Some(user.0.sub),
            &ClientFields::new(
                client_data.name,
                &client_data.nif,
                client_data.email,
                client_data.address,
                client_data.postal_code,
                client_data.phone,
            ),
        )
        .await?;

    // The ticket total is tax-inclusive.
    let tax = TaxBreakdown::from_gross(amount, DEFAULT_TAX_RATE);

    let (invoice, items) = state
        .db
        .create_ticket_invoice(&CreateTicketInvoice {
            company_id: company.company_id,
            client_id: client.client_id,
            requester_user_id: user.0.sub,
            ticket_date: date,
            ticket_amount: amount,
            ticket_hash,
            ocr_payload: serde_json::to_value(&ticket)
                .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?,
            base_amount: tax.base,
            tax_rate: DEFAULT_TAX_RATE,
            tax_amount: tax.tax,
            total_amount: tax.total,
            items: ticket
                .items
                .iter()
                .map(|item| LineItemInput {
                    description: item.description.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
        })
        .await?;

    INVOICES_TOTAL.with_label_values(&["pending"]).inc();

    let message = format!("Solicitud enviada a {}", company.name);
    Ok((
        StatusCode::CREATED,
        Json(InvoiceActionResponse {
            invoice: InvoiceDetail {
                invoice,
                company: Some(company),
                client: Some(client),
                requester: None,
                items,
            },
            message,
        }),
    ))
}

pub async fn my_requests(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<InvoiceDetail>>, AppError> {
    let invoices = state.db.list_invoices_by_requester(user.0.sub).await?;
    Ok(Json(detail_list(&state, invoices, true, false).await?))
}

/// Raw OCR passthrough: image in, parsed ticket data out.
pub async fn ocr_preview(
    State(state): State<AppState>,
    _user: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<TicketData>, AppError> {
    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if matches!(name.as_str(), "image" | "ticketImage") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;
            image = Some(bytes.to_vec());
        }
    }
    let image = image.ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("No image provided")))?;

    let raw_text = state.ocr.extract_text(image).await?;
    Ok(Json(parse_ticket_text(&raw_text)))
}

// ==================== Company endpoints ====================

pub async fn pending(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<InvoiceDetail>>, AppError> {
    let company_id = user.require_company()?;
    let invoices = state.db.list_pending_invoices(company_id).await?;
    Ok(Json(detail_list(&state, invoices, false, true).await?))
}

pub async fn approved(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<InvoiceDetail>>, AppError> {
    let company_id = user.require_company()?;
    let invoices = state.db.list_approved_invoices(company_id).await?;
    Ok(Json(detail_list(&state, invoices, false, false).await?))
}

/// Approve a pending request: assign the next number, render the PDF, email
/// it to the client and advance to GENERATED.
///
/// When delivery fails the number stays consumed and the invoice stays
/// APPROVED with the failure recorded; the send endpoint retries delivery
/// without re-approval.
#[tracing::instrument(skip(state, user, request), fields(invoice_id = %invoice_id))]
pub async fn approve(
    State(state): State<AppState>,
    user: AuthUser,
    Path(invoice_id): Path<Uuid>,
    request: Option<Json<ApproveInvoiceRequest>>,
) -> Result<Json<InvoiceActionResponse>, AppError> {
    let company_id = user.require_company()?;
    let approver = user.0.sub;
    let notes = request.and_then(|Json(r)| r.notes);

    let approved = with_numbering(&state, company_id, |number| {
        let state = state.clone();
        let notes = notes.clone();
        async move {
            state
                .db
                .approve_invoice(company_id, invoice_id, approver, &number, notes.as_deref())
                .await?
                .ok_or_else(request_not_found)
        }
    })
    .await?;

    INVOICES_TOTAL.with_label_values(&["approved"]).inc();

    let company = state
        .db
        .find_company_by_id(company_id)
        .await?
        .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("Company row missing")))?;
    let client = state
        .db
        .find_client(company_id, approved.client_id)
        .await?
        .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("Client row missing")))?;
    let items = state.db.invoice_items(approved.invoice_id).await?;

    let pdf_bytes = render_invoice_pdf(&approved, &company, &client, &items)?;
    let number = approved.number.clone().unwrap_or_default();

    if let Err(e) = state
        .email
        .send_invoice_email(&client.email, &client.name, &company.name, &number, pdf_bytes)
        .await
    {
        state
            .db
            .record_delivery_failure(approved.invoice_id, &e.to_string())
            .await?;
        return Err(e);
    }

    let generated = state.db.mark_generated(approved.invoice_id).await?;
    INVOICES_TOTAL.with_label_values(&["generated"]).inc();

    Ok(Json(InvoiceActionResponse {
        invoice: InvoiceDetail {
            invoice: generated,
            company: Some(company),
            client: Some(client),
            requester: None,
            items,
        },
        message: "Factura generada y enviada al cliente".to_string(),
    }))
}

#[tracing::instrument(skip(state, user, request), fields(invoice_id = %invoice_id))]
pub async fn reject(
    State(state): State<AppState>,
    user: AuthUser,
    Path(invoice_id): Path<Uuid>,
    request: Option<Json<RejectInvoiceRequest>>,
) -> Result<Json<MessageResponse>, AppError> {
    let company_id = user.require_company()?;

    let reason = request
        .and_then(|Json(r)| r.reason)
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_string());

    state
        .db
        .reject_invoice(company_id, invoice_id, &reason)
        .await?
        .ok_or_else(request_not_found)?;

    INVOICES_TOTAL.with_label_values(&["rejected"]).inc();

    Ok(Json(MessageResponse {
        message: "Solicitud rechazada".to_string(),
    }))
}

/// Direct creation path: bill an existing client from a tax-exclusive base
/// amount. The invoice is born numbered and GENERATED; delivery happens
/// through the send endpoint.
#[tracing::instrument(skip(state, user, request))]
pub async fn create_direct(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceActionResponse>), AppError> {
    let company_id = user.require_company()?;
    let creator = user.0.sub;
    request.validate()?;

    if request.base_amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Base amount must be greater than zero"
        )));
    }

    let client = state
        .db
        .find_client(company_id, request.client_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))?;

    // The directly-entered amount is tax-exclusive.
    let rate = request.tax_rate.unwrap_or(DEFAULT_TAX_RATE);
    let tax = TaxBreakdown::from_base(request.base_amount, rate);

    let line_items: Vec<LineItemInput> = request
        .items
        .iter()
        .map(|item| LineItemInput {
            description: item.description.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
        })
        .collect();

    let client_id = client.client_id;
    let description = request.description.clone();

    let (invoice, items) = with_numbering(&state, company_id, |number| {
        let state = state.clone();
        let description = description.clone();
        let items = line_items.clone();
        async move {
            state
                .db
                .create_direct_invoice(&CreateDirectInvoice {
                    company_id,
                    client_id,
                    creator_user_id: creator,
                    number,
                    description,
                    base_amount: tax.base,
                    tax_rate: rate,
                    tax_amount: tax.tax,
                    total_amount: tax.total,
                    items,
                })
                .await
        }
    })
    .await?;

    INVOICES_TOTAL.with_label_values(&["generated"]).inc();

    Ok((
        StatusCode::CREATED,
        Json(InvoiceActionResponse {
            invoice: InvoiceDetail {
                invoice,
                company: None,
                client: Some(client),
                requester: None,
                items,
            },
            message: "Factura creada".to_string(),
        }),
    ))
}

/// Send or resend a produced invoice: re-render the PDF, re-send the email,
/// mark SENT. Re-sending needs no re-approval and does not check a prior
/// SENT status.
#[tracing::instrument(skip(state, user), fields(invoice_id = %invoice_id))]
pub async fn send(
    State(state): State<AppState>,
    user: AuthUser,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceActionResponse>, AppError> {
    let company_id = user.require_company()?;

    let invoice = state
        .db
        .find_company_invoice(company_id, invoice_id)
        .await?
        .ok_or_else(invoice_not_found)?;

    if !invoice.status().is_sendable() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Solo se pueden enviar facturas generadas"
        )));
    }

    let company = state
        .db
        .find_company_by_id(company_id)
        .await?
        .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("Company row missing")))?;
    let client = state
        .db
        .find_client(company_id, invoice.client_id)
        .await?
        .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("Client row missing")))?;
    let items = state.db.invoice_items(invoice.invoice_id).await?;

    let pdf_bytes = render_invoice_pdf(&invoice, &company, &client, &items)?;
    let number = invoice.number.clone().unwrap_or_default();

    if let Err(e) = state
        .email
        .send_invoice_email(&client.email, &client.name, &company.name, &number, pdf_bytes)
        .await
    {
        state
            .db
            .record_delivery_failure(invoice.invoice_id, &e.to_string())
            .await?;
        return Err(e);
    }

    let sent = state.db.mark_sent(invoice.invoice_id).await?;
    INVOICES_TOTAL.with_label_values(&["sent"]).inc();

    Ok(Json(InvoiceActionResponse {
        invoice: InvoiceDetail {
            invoice: sent,
            company: Some(company),
            client: Some(client),
            requester: None,
            items,
        },
        message: "Factura enviada al cliente".to_string(),
    }))
}

/// Invoice detail, visible to its requester or the owning company only.
pub async fn get_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceDetail>, AppError> {
    let invoice = state
        .db
        .find_invoice_for_actor(invoice_id, user.0.sub, user.0.company_id)
        .await?
        .ok_or_else(invoice_not_found)?;

    Ok(Json(invoice_detail(&state, invoice, true, true).await?))
}
