use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Best-effort structured view of an OCR'd purchase ticket. No field is
/// guaranteed present; callers validate what they need.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketData {
    pub company_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub items: Vec<TicketItem>,
    pub raw_text: String,
}

impl TicketData {
    /// Amount and date are the two fields the invoice flow cannot proceed
    /// without.
    pub fn has_mandatory_fields(&self) -> bool {
        self.amount.is_some() && self.date.is_some()
    }
}

/// Line item recognized on a ticket. `total_price` is computed from
/// quantity and unit price, not re-read from the source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}
