//! Invoice model: lifecycle states, tax math and sequence numbering.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Default Spanish IVA rate, expressed as a percentage. This is the single
/// internal representation of the rate; both tax entry points convert from
/// it at the point of use.
pub const DEFAULT_TAX_RATE: Decimal = Decimal::from_parts(210, 0, 0, false, 1);

/// Invoice lifecycle status.
///
/// `PENDING -> APPROVED -> GENERATED` is the ticket path, `PENDING ->
/// REJECTED` its refusal, `GENERATED -> SENT` the (re)send operation used by
/// the direct creation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvoiceStatus {
    Pending,
    Approved,
    Generated,
    Rejected,
    Sent,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::Approved => "APPROVED",
            InvoiceStatus::Generated => "GENERATED",
            InvoiceStatus::Rejected => "REJECTED",
            InvoiceStatus::Sent => "SENT",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "APPROVED" => InvoiceStatus::Approved,
            "GENERATED" => InvoiceStatus::Generated,
            "REJECTED" => InvoiceStatus::Rejected,
            "SENT" => InvoiceStatus::Sent,
            _ => InvoiceStatus::Pending,
        }
    }

    /// Approval and rejection only act on pending requests.
    pub fn is_reviewable(&self) -> bool {
        matches!(self, InvoiceStatus::Pending)
    }

    /// Send/resend requires a numbered, produced invoice. A prior `SENT`
    /// status does not block re-sending.
    pub fn is_sendable(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Approved | InvoiceStatus::Generated | InvoiceStatus::Sent
        )
    }
}

/// Invoice row. Ticket-origin fields are only present when the invoice was
/// created from a photographed ticket.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub company_id: Uuid,
    pub client_id: Uuid,
    pub requester_user_id: Option<Uuid>,
    pub approver_user_id: Option<Uuid>,
    pub number: Option<String>,
    pub status: String,
    pub date: DateTime<Utc>,
    pub description: Option<String>,
    pub base_amount: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub ticket_date: Option<NaiveDate>,
    pub ticket_amount: Option<Decimal>,
    pub ticket_hash: Option<String>,
    pub ocr_payload: Option<serde_json::Value>,
    pub rejection_reason: Option<String>,
    pub approved_utc: Option<DateTime<Utc>>,
    pub generated_utc: Option<DateTime<Utc>>,
    pub last_delivery_utc: Option<DateTime<Utc>>,
    pub last_delivery_error: Option<String>,
}

impl Invoice {
    pub fn status(&self) -> InvoiceStatus {
        InvoiceStatus::from_string(&self.status)
    }
}

/// Invoice line item, owned exclusively by one invoice.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct InvoiceItem {
    pub item_id: Uuid,
    pub invoice_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub sort_order: i32,
}

/// Line item input for invoice creation; `total_price` is computed, never
/// taken from the caller.
#[derive(Debug, Clone)]
pub struct LineItemInput {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl LineItemInput {
    pub fn total_price(&self) -> Decimal {
        self.quantity * self.unit_price
    }
}

/// Input for creating a ticket-originated invoice (born `PENDING`,
/// un-numbered).
#[derive(Debug, Clone)]
pub struct CreateTicketInvoice {
    pub company_id: Uuid,
    pub client_id: Uuid,
    pub requester_user_id: Uuid,
    pub ticket_date: NaiveDate,
    pub ticket_amount: Decimal,
    pub ticket_hash: String,
    pub ocr_payload: serde_json::Value,
    pub base_amount: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub items: Vec<LineItemInput>,
}

/// Input for the direct creation path (born numbered, `GENERATED`).
#[derive(Debug, Clone)]
pub struct CreateDirectInvoice {
    pub company_id: Uuid,
    pub client_id: Uuid,
    pub creator_user_id: Uuid,
    pub number: String,
    pub description: Option<String>,
    pub base_amount: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub items: Vec<LineItemInput>,
}

/// Base / tax / total split. The one place both tax formulas live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxBreakdown {
    pub base: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl TaxBreakdown {
    /// Split a tax-inclusive gross amount (the ticket path):
    /// `base = gross / (1 + rate/100)`, `tax = gross - base`.
    pub fn from_gross(gross: Decimal, rate_pct: Decimal) -> Self {
        let base = gross * Decimal::ONE_HUNDRED / (Decimal::ONE_HUNDRED + rate_pct);
        Self {
            base,
            tax: gross - base,
            total: gross,
        }
    }

    /// Derive tax from a tax-exclusive base amount (the direct path):
    /// `tax = base * rate/100`, `total = base + tax`.
    pub fn from_base(base: Decimal, rate_pct: Decimal) -> Self {
        let tax = base * rate_pct / Decimal::ONE_HUNDRED;
        Self {
            base,
            tax,
            total: base + tax,
        }
    }
}

/// Round to cents for presentation. Storage and arithmetic keep full
/// precision; only rendered output goes through here.
pub fn money(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}

/// Prefix shared by all of a year's invoice numbers, e.g. `"2024-"`.
pub fn number_prefix(year: i32) -> String {
    format!("{}-", year)
}

/// Compute the next invoice number for a company + year given the current
/// greatest number (or `None` when the year has no invoices yet). The
/// numeric suffix is zero-padded to at least 3 digits; wider suffixes keep
/// their width.
pub fn next_invoice_number(year: i32, last: Option<&str>) -> String {
    let next = last
        .and_then(|n| n.strip_prefix(&number_prefix(year)))
        .and_then(|suffix| suffix.parse::<u32>().ok())
        .map(|n| n + 1)
        .unwrap_or(1);
    format!("{}-{:03}", year, next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn default_rate_is_21_percent() {
        assert_eq!(DEFAULT_TAX_RATE, dec("21.0"));
    }

    #[test]
    fn gross_split_round_trips() {
        let gross = dec("24.20");
        let split = TaxBreakdown::from_gross(gross, DEFAULT_TAX_RATE);
        assert_eq!(split.total, gross);
        assert_eq!(split.base + split.tax, gross);
        assert_eq!(money(split.base), dec("20.00"));
        assert_eq!(money(split.tax), dec("4.20"));
    }

    #[test]
    fn base_split_adds_tax() {
        let split = TaxBreakdown::from_base(dec("100"), DEFAULT_TAX_RATE);
        assert_eq!(split.tax, dec("21"));
        assert_eq!(split.total, dec("121"));
    }

    #[test]
    fn both_entry_points_agree_on_the_rate() {
        // Splitting the gross produced by the base path must recover it.
        let from_base = TaxBreakdown::from_base(dec("50"), DEFAULT_TAX_RATE);
        let from_gross = TaxBreakdown::from_gross(from_base.total, DEFAULT_TAX_RATE);
        assert_eq!(money(from_gross.base), dec("50.00"));
    }

    #[test]
    fn numbering_starts_at_one() {
        assert_eq!(next_invoice_number(2024, None), "2024-001");
    }

    #[test]
    fn numbering_increments_the_suffix() {
        assert_eq!(next_invoice_number(2024, Some("2024-007")), "2024-008");
        assert_eq!(next_invoice_number(2024, Some("2024-099")), "2024-100");
    }

    #[test]
    fn numbering_grows_past_three_digits() {
        assert_eq!(next_invoice_number(2024, Some("2024-999")), "2024-1000");
        assert_eq!(next_invoice_number(2024, Some("2024-1000")), "2024-1001");
    }

    #[test]
    fn numbering_ignores_other_years() {
        // A stale number from another year reseeds the sequence.
        assert_eq!(next_invoice_number(2025, Some("2024-044")), "2025-001");
    }

    #[test]
    fn status_round_trips_and_guards() {
        for status in [
            InvoiceStatus::Pending,
            InvoiceStatus::Approved,
            InvoiceStatus::Generated,
            InvoiceStatus::Rejected,
            InvoiceStatus::Sent,
        ] {
            assert_eq!(InvoiceStatus::from_string(status.as_str()), status);
        }
        assert!(InvoiceStatus::Pending.is_reviewable());
        assert!(!InvoiceStatus::Generated.is_reviewable());
        assert!(InvoiceStatus::Generated.is_sendable());
        assert!(InvoiceStatus::Sent.is_sendable());
        assert!(!InvoiceStatus::Pending.is_sendable());
        assert!(!InvoiceStatus::Rejected.is_sendable());
    }
}
