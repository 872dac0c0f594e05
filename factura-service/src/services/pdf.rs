//! Invoice PDF rendering.
//!
//! A4 portrait, built-in Helvetica: header with title and issuer, a
//! two-column issuer/client block, the number + date line, an itemized or
//! single-concept body, the base/IVA/total summary, and a footer note.

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use rust_decimal::Decimal;
use service_core::error::AppError;

use crate::models::{money, Client, Company, Invoice, InvoiceItem};

fn format_eur(amount: Decimal) -> String {
    format!("{:.2} €", money(amount))
}

fn push_line(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    text: &str,
    font_size: f32,
    x: f32,
    y: f32,
) {
    layer.use_text(text, font_size, Mm(x), Mm(y), font);
}

fn divider(layer: &PdfLayerReference, y: f32) {
    layer.add_line(printpdf::Line {
        points: vec![
            (printpdf::Point::new(Mm(20.0), Mm(y)), false),
            (printpdf::Point::new(Mm(190.0), Mm(y)), false),
        ],
        is_closed: false,
    });
}

/// Render the invoice document and return the raw PDF bytes.
pub fn render_invoice_pdf(
    invoice: &Invoice,
    company: &Company,
    client: &Client,
    items: &[InvoiceItem],
) -> Result<Vec<u8>, AppError> {
    let (doc, page, layer) = PdfDocument::new("Factura", Mm(210.0), Mm(297.0), "Layer 1");
    let layer = doc.get_page(page).get_layer(layer);

    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?;
    let font_bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?;

    // Header
    push_line(&layer, &font_bold, "FACTURA", 24.0, 82.0, 275.0);
    push_line(&layer, &font, &company.name, 10.0, 82.0, 266.0);
    divider(&layer, 260.0);

    // Issuer block (left column)
    let mut y = 247.0;
    push_line(&layer, &font_bold, "DATOS DEL EMISOR:", 9.0, 20.0, y);
    for line in [
        company.name.as_str(),
        &format!("NIF: {}", company.nif),
        company.address.as_str(),
        company.email.as_str(),
        company.phone.as_str(),
    ] {
        y -= 5.0;
        push_line(&layer, &font, line, 9.0, 20.0, y);
    }

    // Client block (right column)
    let mut y = 247.0;
    push_line(&layer, &font_bold, "DATOS DEL CLIENTE:", 9.0, 120.0, y);
    for line in [
        client.name.as_str(),
        &format!("NIF: {}", client.nif),
        client.address.as_str(),
        client.email.as_str(),
    ] {
        y -= 5.0;
        push_line(&layer, &font, line, 9.0, 120.0, y);
    }

    // Number + date line
    let number = invoice.number.as_deref().unwrap_or("-");
    push_line(
        &layer,
        &font_bold,
        &format!("Nº Factura: {}", number),
        10.0,
        20.0,
        200.0,
    );
    push_line(
        &layer,
        &font_bold,
        &format!("Fecha: {}", invoice.date.format("%d/%m/%Y")),
        10.0,
        120.0,
        200.0,
    );
    divider(&layer, 195.0);

    // Body: itemized when line items exist, single concept otherwise
    let mut y = 185.0;
    push_line(&layer, &font_bold, "CONCEPTO", 9.0, 25.0, y);
    if !items.is_empty() {
        push_line(&layer, &font_bold, "CANT.", 9.0, 115.0, y);
        push_line(&layer, &font_bold, "PRECIO", 9.0, 140.0, y);
    }
    push_line(&layer, &font_bold, "IMPORTE", 9.0, 165.0, y);
    y -= 3.0;
    divider(&layer, y);
    y -= 7.0;

    if items.is_empty() {
        let concept = invoice
            .description
            .as_deref()
            .unwrap_or("Servicios prestados");
        push_line(&layer, &font, concept, 9.0, 25.0, y);
        push_line(&layer, &font, &format_eur(invoice.base_amount), 9.0, 165.0, y);
        y -= 7.0;
    } else {
        for item in items {
            if y < 60.0 {
                break;
            }
            push_line(&layer, &font, &item.description, 9.0, 25.0, y);
            push_line(&layer, &font, &format!("{}", item.quantity), 9.0, 115.0, y);
            push_line(&layer, &font, &format_eur(item.unit_price), 9.0, 140.0, y);
            push_line(&layer, &font, &format_eur(item.total_price), 9.0, 165.0, y);
            y -= 6.0;
        }
    }

    divider(&layer, y);
    y -= 8.0;

    // Summary block
    push_line(&layer, &font, "Base Imponible:", 10.0, 120.0, y);
    push_line(&layer, &font, &format_eur(invoice.base_amount), 10.0, 165.0, y);
    y -= 7.0;
    push_line(
        &layer,
        &font,
        &format!("IVA ({:.0}%):", invoice.tax_rate),
        10.0,
        120.0,
        y,
    );
    push_line(&layer, &font, &format_eur(invoice.tax_amount), 10.0, 165.0, y);
    y -= 8.0;
    push_line(&layer, &font_bold, "TOTAL:", 12.0, 120.0, y);
    push_line(
        &layer,
        &font_bold,
        &format_eur(invoice.total_amount),
        12.0,
        165.0,
        y,
    );

    // Footer
    push_line(&layer, &font, "Gracias por su confianza", 8.0, 85.0, 17.0);

    let mut writer = std::io::BufWriter::new(Vec::<u8>::new());
    doc.save(&mut writer)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?;
    writer
        .into_inner()
        .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::str::FromStr;
    use uuid::Uuid;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn fixture() -> (Invoice, Company, Client, Vec<InvoiceItem>) {
        let company_id = Uuid::new_v4();
        let client_id = Uuid::new_v4();
        let invoice_id = Uuid::new_v4();
        let company = Company {
            company_id,
            owner_user_id: Uuid::new_v4(),
            name: "Acme S.L.".into(),
            nif: "B12345678".into(),
            address: "Calle Mayor 1, Madrid".into(),
            postal_code: "28001".into(),
            email: "facturas@acme.example".into(),
            phone: "+34 600 000 000".into(),
            created_utc: Utc::now(),
        };
        let client = Client {
            client_id,
            company_id,
            user_id: None,
            name: "Juan Pérez".into(),
            nif: "12345678Z".into(),
            email: "juan@example.com".into(),
            address: "Avenida del Sol 5".into(),
            postal_code: "28002".into(),
            phone: None,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        };
        let invoice = Invoice {
            invoice_id,
            company_id,
            client_id,
            requester_user_id: None,
            approver_user_id: None,
            number: Some("2024-001".into()),
            status: "GENERATED".into(),
            date: Utc::now(),
            description: Some("Consultoría".into()),
            base_amount: dec("20.00"),
            tax_rate: dec("21.0"),
            tax_amount: dec("4.20"),
            total_amount: dec("24.20"),
            ticket_date: None,
            ticket_amount: None,
            ticket_hash: None,
            ocr_payload: None,
            rejection_reason: None,
            approved_utc: None,
            generated_utc: None,
            last_delivery_utc: None,
            last_delivery_error: None,
        };
        let items = vec![InvoiceItem {
            item_id: Uuid::new_v4(),
            invoice_id,
            description: "Cafe solo".into(),
            quantity: dec("2"),
            unit_price: dec("1.20"),
            total_price: dec("2.40"),
            sort_order: 0,
        }];
        (invoice, company, client, items)
    }

    #[test]
    fn renders_an_itemized_invoice() {
        let (invoice, company, client, items) = fixture();
        let bytes = render_invoice_pdf(&invoice, &company, &client, &items).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(bytes.len() > 500);
    }

    #[test]
    fn renders_a_single_concept_invoice() {
        let (invoice, company, client, _) = fixture();
        let bytes = render_invoice_pdf(&invoice, &company, &client, &[]).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn money_formatting_pads_to_cents() {
        assert_eq!(format_eur(dec("24.2")), "24.20 €");
        assert_eq!(format_eur(dec("7")), "7.00 €");
    }
}
