//! Ticket text heuristics: turn raw OCR output into structured fields, and
//! derive the dedup fingerprint.
//!
//! Parsing is best effort and never fails; absent fields come back as
//! `None` and the caller decides which ones are mandatory.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::{TicketData, TicketItem};

static TOTAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)total[:\s]*([0-9]+[,.]?[0-9]*)\s*€?").unwrap());
static CURRENCY_AMOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]+[,.]?[0-9]*)\s*€").unwrap());
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+[,.]?[0-9]*").unwrap());
static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})[/\-.](\d{1,2})[/\-.](\d{4}|\d{2})").unwrap());
// <description> <quantity> [x] <unit price>[€]
static ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.+?)\s+(\d+[,.]?\d*)\s*x?\s*([0-9]+[,.]?[0-9]*)\s*€?").unwrap());

/// Parse the OCR transcription of a ticket into structured fields.
pub fn parse_ticket_text(text: &str) -> TicketData {
    TicketData {
        company_name: extract_company_name(text),
        date: extract_date(text),
        amount: extract_amount(text),
        items: extract_items(text),
        raw_text: text.to_string(),
    }
}

/// Deterministic dedup key over `(ticket date, amount, company)`.
///
/// The date enters as a canonical ISO-8601 midnight timestamp and the
/// amount in normalized decimal form, so equal tickets always digest
/// equally regardless of how the inputs were written.
pub fn ticket_fingerprint(date: NaiveDate, amount: Decimal, company_id: Uuid) -> String {
    let payload = format!(
        "{}T00:00:00.000Z_{}_{}",
        date.format("%Y-%m-%d"),
        amount.normalize(),
        company_id
    );
    hex::encode(Sha256::digest(payload.as_bytes()))
}

/// Parse a numeric token, normalizing the decimal comma first.
fn parse_decimal(token: &str) -> Option<Decimal> {
    let normalized = token.replace(',', ".");
    Decimal::from_str(normalized.trim_end_matches('.')).ok()
}

/// Amount search, in priority order: a "total" label, then the last
/// €-suffixed token, then the maximum numeric token anywhere in the text.
fn extract_amount(text: &str) -> Option<Decimal> {
    if let Some(caps) = TOTAL_RE.captures(text) {
        if let Some(amount) = parse_decimal(&caps[1]) {
            return Some(amount);
        }
    }

    if let Some(caps) = CURRENCY_AMOUNT_RE.captures_iter(text).last() {
        if let Some(amount) = parse_decimal(&caps[1]) {
            return Some(amount);
        }
    }

    NUMBER_RE
        .find_iter(text)
        .filter_map(|m| parse_decimal(m.as_str()))
        .max()
}

/// First D[D]/M[M]/YYYY-style date in the text, `/`, `-` or `.` separated.
/// Two-digit years are expanded with a `20` prefix; tokens that are not a
/// valid calendar date are skipped.
fn extract_date(text: &str) -> Option<NaiveDate> {
    DATE_RE.captures_iter(text).find_map(|caps| {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let mut year: i32 = caps[3].parse().ok()?;
        if caps[3].len() == 2 {
            year += 2000;
        }
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// Tickets conventionally print the merchant name first: take the first
/// non-blank line.
fn extract_company_name(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Recognize `<description> <quantity> [x] <unit price>[€]` lines.
/// Everything else is silently dropped; totals are computed, not re-read.
fn extract_items(text: &str) -> Vec<TicketItem> {
    text.lines()
        .filter_map(|line| {
            let caps = ITEM_RE.captures(line)?;
            let description = caps[1].trim().to_string();
            if description.is_empty() {
                return None;
            }
            let quantity = parse_decimal(&caps[2])?;
            let unit_price = parse_decimal(&caps[3])?;
            Some(TicketItem {
                description,
                total_price: quantity * unit_price,
                quantity,
                unit_price,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    const SAMPLE: &str = "BAR PEPE S.L.\nCalle Mayor 1, Madrid\n15/03/2024 14:32\n\nCafe solo 2 x 1,20€\nTostada 1 x 2,50€\n\nTOTAL: 4,90€\n";

    #[test]
    fn parses_a_full_ticket() {
        let data = parse_ticket_text(SAMPLE);
        assert_eq!(data.company_name.as_deref(), Some("BAR PEPE S.L."));
        assert_eq!(data.date, NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(data.amount, Some(dec("4.90")));
        assert!(data.has_mandatory_fields());
        assert_eq!(data.raw_text, SAMPLE);
    }

    #[test]
    fn total_label_wins_over_other_amounts() {
        let text = "TIENDA\n01/02/2024\nArticulo 9,99€\nTotal 12,34";
        assert_eq!(extract_amount(text), Some(dec("12.34")));
    }

    #[test]
    fn falls_back_to_last_euro_amount() {
        let text = "TIENDA\n3,00€\n7,50€";
        assert_eq!(extract_amount(text), Some(dec("7.50")));
    }

    #[test]
    fn falls_back_to_largest_numeric_token() {
        let text = "TIENDA\nref 4221\nimporte 18,75 abonado 20";
        // No total label, no currency marker: the maximum number wins.
        assert_eq!(extract_amount(text), Some(dec("4221")));
    }

    #[test]
    fn no_numbers_means_no_amount() {
        assert_eq!(extract_amount("sin importes aqui"), None);
    }

    #[test]
    fn date_separators_and_short_years() {
        assert_eq!(
            extract_date("fecha 5-1-24"),
            NaiveDate::from_ymd_opt(2024, 1, 5)
        );
        assert_eq!(
            extract_date("31.12.2023"),
            NaiveDate::from_ymd_opt(2023, 12, 31)
        );
    }

    #[test]
    fn invalid_calendar_dates_are_skipped() {
        // 45/13/2024 is not a date; the next token is.
        assert_eq!(
            extract_date("45/13/2024 luego 02/06/2024"),
            NaiveDate::from_ymd_opt(2024, 6, 2)
        );
    }

    #[test]
    fn company_name_is_first_non_blank_line() {
        assert_eq!(
            extract_company_name("\n\n  FERRETERIA LOPEZ  \nCalle A"),
            Some("FERRETERIA LOPEZ".to_string())
        );
        assert_eq!(extract_company_name("\n \n"), None);
    }

    #[test]
    fn item_lines_compute_their_totals() {
        let items = extract_items("Cafe solo 2 x 1,20€");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "Cafe solo");
        assert_eq!(items[0].quantity, dec("2"));
        assert_eq!(items[0].unit_price, dec("1.20"));
        assert_eq!(items[0].total_price, dec("2.40"));
    }

    #[test]
    fn non_item_lines_are_dropped() {
        assert!(extract_items("GRACIAS POR SU VISITA").is_empty());
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let company = Uuid::from_u128(7);
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let a = ticket_fingerprint(date, dec("24.20"), company);
        let b = ticket_fingerprint(date, dec("24.20"), company);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_changes_with_any_input() {
        let company = Uuid::from_u128(7);
        let other_company = Uuid::from_u128(8);
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let base = ticket_fingerprint(date, dec("24.20"), company);

        assert_ne!(
            base,
            ticket_fingerprint(date.succ_opt().unwrap(), dec("24.20"), company)
        );
        assert_ne!(base, ticket_fingerprint(date, dec("24.21"), company));
        assert_ne!(base, ticket_fingerprint(date, dec("24.20"), other_company));
    }

    #[test]
    fn fingerprint_normalizes_amount_representation() {
        let company = Uuid::from_u128(7);
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(
            ticket_fingerprint(date, dec("24.20"), company),
            ticket_fingerprint(date, dec("24.2"), company)
        );
    }

    #[test]
    fn parser_never_panics_on_garbage() {
        for text in ["", "\0\0\0", "€€€", "1/1/1/1/1", "x\nx\nx"] {
            let _ = parse_ticket_text(text);
        }
    }
}
