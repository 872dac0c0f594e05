use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Client, Company, Invoice, InvoiceItem, SanitizedUser};

/// Client identity asserted alongside a ticket submission (the
/// `clientData` multipart field, JSON-encoded).
#[derive(Debug, Deserialize, Validate)]
pub struct TicketClientData {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "NIF is required"))]
    pub nif: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    #[serde(default)]
    pub postal_code: String,
    pub phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveInvoiceRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectInvoiceRequest {
    pub reason: Option<String>,
}

/// Direct creation path: a company bills one of its clients without a
/// ticket, from a tax-exclusive base amount.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    pub client_id: uuid::Uuid,
    pub description: Option<String>,
    pub base_amount: Decimal,
    /// Percentage; defaults to the standard rate.
    pub tax_rate: Option<Decimal>,
    #[serde(default)]
    pub items: Vec<LineItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct LineItemRequest {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// Invoice with its related records, the shape list/detail endpoints
/// return.
#[derive(Debug, Serialize)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: Invoice,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<Company>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<Client>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester: Option<SanitizedUser>,
    pub items: Vec<InvoiceItem>,
}

#[derive(Debug, Serialize)]
pub struct InvoiceActionResponse {
    pub invoice: InvoiceDetail,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub invoices: i64,
    pub pending: i64,
    pub clients: i64,
    pub revenue: Decimal,
}
