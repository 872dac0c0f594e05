//! Reconciliation invariants: tax round-trips, gap-free numbering and
//! fingerprint behavior.

use chrono::NaiveDate;
use factura_service::models::{
    next_invoice_number, number_prefix, InvoiceStatus, TaxBreakdown, DEFAULT_TAX_RATE,
};
use factura_service::utils::ticket::ticket_fingerprint;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[test]
fn gross_split_reconstructs_the_gross_for_any_amount() {
    let tolerance = dec("0.0000001");

    // Every cent value up to 50 €, plus a few awkward magnitudes.
    let mut amounts: Vec<Decimal> = (0..5000).map(|cents| Decimal::new(cents, 2)).collect();
    amounts.extend([dec("999999.99"), dec("0.01"), dec("123456.78")]);

    for gross in amounts {
        let split = TaxBreakdown::from_gross(gross, DEFAULT_TAX_RATE);

        // tax is derived by subtraction, so base + tax is exact.
        assert_eq!(split.base + split.tax, gross);

        // Re-deriving the gross from the base through the other entry point
        // agrees within rounding tolerance.
        let rederived = TaxBreakdown::from_base(split.base, DEFAULT_TAX_RATE);
        let diff = (rederived.total - gross).abs();
        assert!(diff < tolerance, "gross {} drifted by {}", gross, diff);
    }
}

#[test]
fn sequential_numbering_is_gap_free() {
    let year = 2024;
    let mut last: Option<String> = None;

    for expected in 1..=1200u32 {
        let number = next_invoice_number(year, last.as_deref());
        if expected < 1000 {
            assert_eq!(number, format!("{}-{:03}", year, expected));
        } else {
            // Padding is a minimum width, not a maximum.
            assert_eq!(number, format!("{}-{}", year, expected));
        }
        last = Some(number);
    }
}

#[test]
fn numbering_restarts_each_year() {
    assert_eq!(next_invoice_number(2025, None), "2025-001");
    assert_eq!(number_prefix(2025), "2025-");
    // The previous year's maximum does not leak into the new year.
    assert_eq!(next_invoice_number(2025, Some("2024-999")), "2025-001");
}

#[test]
fn same_ticket_same_company_collides_and_other_company_does_not() {
    let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
    let amount = dec("24.20");
    let company_a = Uuid::from_u128(1);
    let company_b = Uuid::from_u128(2);

    let first = ticket_fingerprint(date, amount, company_a);
    let resubmitted = ticket_fingerprint(date, amount, company_a);
    let other_company = ticket_fingerprint(date, amount, company_b);

    // Resubmission to the same company is the collision dedup catches...
    assert_eq!(first, resubmitted);
    // ...while the same ticket sent to another company stays distinct.
    assert_ne!(first, other_company);
}

#[test]
fn fingerprints_spread_over_a_corpus_without_collisions() {
    let company = Uuid::from_u128(42);
    let mut seen = std::collections::HashSet::new();

    for day in 1..=28u32 {
        for cents in [999i64, 1050, 2420, 10000] {
            let date = NaiveDate::from_ymd_opt(2024, 5, day).unwrap();
            let digest = ticket_fingerprint(date, Decimal::new(cents, 2), company);
            assert!(seen.insert(digest), "collision at day {} cents {}", day, cents);
        }
    }
}

#[test]
fn lifecycle_guards_match_the_state_machine() {
    // Review operations act on PENDING only.
    assert!(InvoiceStatus::Pending.is_reviewable());
    for status in [
        InvoiceStatus::Approved,
        InvoiceStatus::Generated,
        InvoiceStatus::Rejected,
        InvoiceStatus::Sent,
    ] {
        assert!(!status.is_reviewable(), "{:?} must not be reviewable", status);
    }

    // Send acts on produced invoices, including re-sends.
    for status in [
        InvoiceStatus::Approved,
        InvoiceStatus::Generated,
        InvoiceStatus::Sent,
    ] {
        assert!(status.is_sendable(), "{:?} must be sendable", status);
    }
    assert!(!InvoiceStatus::Pending.is_sendable());
    assert!(!InvoiceStatus::Rejected.is_sendable());

    // Stored representation round-trips.
    assert_eq!(InvoiceStatus::from_string("GENERATED"), InvoiceStatus::Generated);
    assert_eq!(InvoiceStatus::Generated.as_str(), "GENERATED");
}
