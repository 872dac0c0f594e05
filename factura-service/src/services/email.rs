//! Outbound email: invoice delivery (PDF attached) and password resets.

use lettre::{
    message::{header::ContentType, Attachment, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};
use service_core::axum::async_trait;
use service_core::error::AppError;
use std::time::Duration;

use crate::config::GmailConfig;
use crate::services::metrics::EMAILS_TOTAL;

#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Send the rendered invoice PDF to the client.
    async fn send_invoice_email(
        &self,
        to_email: &str,
        client_name: &str,
        company_name: &str,
        invoice_number: &str,
        pdf_bytes: Vec<u8>,
    ) -> Result<(), AppError>;

    /// Send a password reset link.
    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_url: &str,
    ) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct EmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl EmailService {
    pub fn new(config: &GmailConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(config.user.clone(), config.app_password.clone());

        let mailer = SmtpTransport::relay("smtp.gmail.com")
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?
            .credentials(creds)
            .port(587)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!("Email service initialized with Gmail SMTP");

        Ok(Self {
            mailer,
            from_email: config.user.clone(),
        })
    }

    /// Ship a built message from the blocking pool, so SMTP I/O never sits
    /// on the async runtime.
    async fn dispatch(&self, kind: &'static str, email: Message) -> Result<(), AppError> {
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                EMAILS_TOTAL.with_label_values(&[kind, "sent"]).inc();
                Ok(())
            }
            Err(e) => {
                EMAILS_TOTAL.with_label_values(&[kind, "failed"]).inc();
                tracing::error!(error = %e.to_string(), kind, "Failed to send email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }

    fn parse_mailbox(addr: &str) -> Result<Mailbox, AppError> {
        addr.parse()
            .map_err(|e: lettre::address::AddressError| AppError::InternalError(e.into()))
    }
}

#[async_trait]
impl EmailProvider for EmailService {
    async fn send_invoice_email(
        &self,
        to_email: &str,
        client_name: &str,
        company_name: &str,
        invoice_number: &str,
        pdf_bytes: Vec<u8>,
    ) -> Result<(), AppError> {
        let from = Self::parse_mailbox(&format!("{} <{}>", company_name, self.from_email))?;
        let to = Self::parse_mailbox(to_email)?;
        let cc = Self::parse_mailbox(&self.from_email)?;

        let html_body = format!(
            "<h2>Factura {number}</h2>\
             <p>Estimado/a {client},</p>\
             <p>Adjuntamos su factura.</p>",
            number = invoice_number,
            client = client_name,
        );
        let plain_body = format!(
            "Factura {}\n\nEstimado/a {},\n\nAdjuntamos su factura.",
            invoice_number, client_name
        );

        let attachment = Attachment::new(format!("Factura_{}.pdf", invoice_number)).body(
            pdf_bytes,
            ContentType::parse("application/pdf")
                .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?,
        );

        let email = Message::builder()
            .from(from)
            .to(to)
            .cc(cc)
            .subject(format!("Factura {} - {}", invoice_number, company_name))
            .multipart(
                MultiPart::mixed()
                    .multipart(
                        MultiPart::alternative()
                            .singlepart(SinglePart::plain(plain_body))
                            .singlepart(
                                SinglePart::builder()
                                    .header(ContentType::TEXT_HTML)
                                    .body(html_body),
                            ),
                    )
                    .singlepart(attachment),
            )?;

        tracing::info!(to = %to_email, number = %invoice_number, "Sending invoice email");
        self.dispatch("invoice", email).await
    }

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_url: &str,
    ) -> Result<(), AppError> {
        let html_body = format!(
            r#"<html>
                <body style="font-family: Arial, sans-serif;">
                    <h2>Restablecer contraseña</h2>
                    <p>Hemos recibido una solicitud para restablecer su contraseña. Pulse el enlace para elegir una nueva:</p>
                    <p>
                        <a href="{url}" style="background-color: #2196F3; color: white; padding: 14px 20px; text-decoration: none; border-radius: 4px;">
                            Restablecer contraseña
                        </a>
                    </p>
                    <p style="color: #666; font-size: 12px;">
                        El enlace caduca en 1 hora. Si no ha solicitado este cambio, ignore este mensaje.
                    </p>
                </body>
            </html>"#,
            url = reset_url
        );

        let plain_body = format!(
            "Restablecer contraseña\n\nVisite el siguiente enlace para elegir una nueva contraseña:\n\n{}\n\nEl enlace caduca en 1 hora. Si no ha solicitado este cambio, ignore este mensaje.",
            reset_url
        );

        let email = Message::builder()
            .from(Self::parse_mailbox(&self.from_email)?)
            .to(Self::parse_mailbox(to_email)?)
            .subject("Restablecer contraseña")
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(plain_body))
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )?;

        tracing::info!(to = %to_email, "Sending password reset email");
        self.dispatch("password_reset", email).await
    }
}

/// No-op provider for tests and mail-less environments.
#[derive(Clone)]
pub struct MockEmailService;

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_invoice_email(
        &self,
        _to_email: &str,
        _client_name: &str,
        _company_name: &str,
        _invoice_number: &str,
        _pdf_bytes: Vec<u8>,
    ) -> Result<(), AppError> {
        Ok(())
    }

    async fn send_password_reset_email(
        &self,
        _to_email: &str,
        _reset_url: &str,
    ) -> Result<(), AppError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_service_builds_from_config() {
        let config = GmailConfig {
            user: "facturas@example.com".to_string(),
            app_password: "app-password".to_string(),
        };
        assert!(EmailService::new(&config).is_ok());
    }
}
