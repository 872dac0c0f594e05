//! Integration tests for the ticket parsing pipeline: OCR text in,
//! structured ticket data out.

use chrono::NaiveDate;
use factura_service::models::{TaxBreakdown, DEFAULT_TAX_RATE};
use factura_service::utils::ticket::parse_ticket_text;
use rust_decimal::Decimal;
use std::str::FromStr;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[test]
fn parses_a_typical_spanish_ticket() {
    let text = "SUPERMERCADOS GARCIA S.A.\nAvda. de la Constitucion 12\n28010 Madrid\n\n15/03/2024 18:40\n\nLeche entera 2 x 1,10€\nPan integral 1 x 1,50€\nQueso curado 1 x 5,80€\n\nTOTAL: 24,20€\nIVA incluido\n";
    let ticket = parse_ticket_text(text);

    assert_eq!(
        ticket.company_name.as_deref(),
        Some("SUPERMERCADOS GARCIA S.A.")
    );
    assert_eq!(ticket.date, NaiveDate::from_ymd_opt(2024, 3, 15));
    assert_eq!(ticket.amount, Some(dec("24.20")));
    assert!(ticket.has_mandatory_fields());

    let leche = ticket
        .items
        .iter()
        .find(|i| i.description.contains("Leche"))
        .expect("milk line should parse");
    assert_eq!(leche.quantity, dec("2"));
    assert_eq!(leche.unit_price, dec("1.10"));
    assert_eq!(leche.total_price, dec("2.20"));
}

#[test]
fn ticket_without_total_label_uses_trailing_euro_amount() {
    let text = "BAR LOLA\n02-06-24\nMenu del dia 12,50€\n";
    let ticket = parse_ticket_text(text);

    assert_eq!(ticket.date, NaiveDate::from_ymd_opt(2024, 6, 2));
    assert_eq!(ticket.amount, Some(dec("12.50")));
}

#[test]
fn unusable_ticket_reports_absent_fields_instead_of_failing() {
    let ticket = parse_ticket_text("texto ilegible sin datos");
    assert_eq!(ticket.amount, None);
    assert_eq!(ticket.date, None);
    assert!(!ticket.has_mandatory_fields());
}

/// The §8-style end-to-end shape, minus persistence: a 24,20 € ticket
/// splits into ~20.00 base and ~4.20 tax at the default rate.
#[test]
fn parsed_amount_splits_into_base_and_tax() {
    let text = "FERRETERIA LOPEZ\n15/03/2024\nTOTAL 24,20€\n";
    let ticket = parse_ticket_text(text);
    let gross = ticket.amount.expect("amount");

    let tax = TaxBreakdown::from_gross(gross, DEFAULT_TAX_RATE);
    assert_eq!(tax.base.round_dp(2), dec("20.00"));
    assert_eq!(tax.tax.round_dp(2), dec("4.20"));
    assert_eq!(tax.total, gross);
}

#[test]
fn decimal_comma_and_decimal_point_parse_alike() {
    let comma = parse_ticket_text("TIENDA\n01/01/2024\nTOTAL: 9,95€");
    let point = parse_ticket_text("TIENDA\n01/01/2024\nTOTAL: 9.95€");
    assert_eq!(comma.amount, point.amount);
}
