//! OCR provider boundary: ship an image to OCR.space, get free text back.
//!
//! Only the HTTP call and envelope unwrapping live here; turning the text
//! into structured ticket fields is [`crate::utils::ticket`]'s job.

use serde::Deserialize;
use service_core::axum::async_trait;
use service_core::error::AppError;
use std::time::Instant;

use crate::config::OcrConfig;
use crate::services::metrics::OCR_REQUEST_DURATION;

#[async_trait]
pub trait OcrProvider: Send + Sync {
    /// Extract raw text from a ticket image.
    async fn extract_text(&self, image: Vec<u8>) -> Result<String, AppError>;
}

/// OCR.space response envelope. Fields we do not consume are left out.
#[derive(Debug, Deserialize)]
struct OcrSpaceEnvelope {
    #[serde(rename = "ParsedResults", default)]
    parsed_results: Vec<OcrSpaceResult>,
    #[serde(rename = "IsErroredOnProcessing", default)]
    is_errored: bool,
    #[serde(rename = "ErrorMessage", default)]
    error_message: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OcrSpaceResult {
    #[serde(rename = "ParsedText", default)]
    parsed_text: String,
}

#[derive(Clone)]
pub struct OcrSpaceClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    language: String,
}

impl OcrSpaceClient {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            language: config.language.clone(),
        }
    }
}

#[async_trait]
impl OcrProvider for OcrSpaceClient {
    async fn extract_text(&self, image: Vec<u8>) -> Result<String, AppError> {
        let started = Instant::now();

        let file_part = reqwest::multipart::Part::bytes(image)
            .file_name("ticket.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;

        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("language", self.language.clone())
            .text("isOverlayRequired", "true")
            .text("apikey", self.api_key.clone());

        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                OCR_REQUEST_DURATION
                    .with_label_values(&["error"])
                    .observe(started.elapsed().as_secs_f64());
                tracing::error!(error = %e, "OCR request failed");
                AppError::BadGateway(format!("OCR request failed: {}", e))
            })?;

        let mut envelope: OcrSpaceEnvelope = response.json().await.map_err(|e| {
            OCR_REQUEST_DURATION
                .with_label_values(&["error"])
                .observe(started.elapsed().as_secs_f64());
            AppError::BadGateway(format!("OCR response was not valid JSON: {}", e))
        })?;

        if envelope.is_errored || envelope.parsed_results.is_empty() {
            OCR_REQUEST_DURATION
                .with_label_values(&["error"])
                .observe(started.elapsed().as_secs_f64());
            let detail = envelope
                .error_message
                .map(|m| m.to_string())
                .unwrap_or_else(|| "Unknown error".to_string());
            tracing::error!(detail = %detail, "OCR provider returned no results");
            return Err(AppError::BadGateway(format!("OCR failed: {}", detail)));
        }

        OCR_REQUEST_DURATION
            .with_label_values(&["ok"])
            .observe(started.elapsed().as_secs_f64());

        Ok(envelope.parsed_results.swap_remove(0).parsed_text)
    }
}

/// Fixed-text provider for tests.
#[derive(Clone)]
pub struct MockOcrProvider {
    pub text: String,
}

#[async_trait]
impl OcrProvider for MockOcrProvider {
    async fn extract_text(&self, _image: Vec<u8>) -> Result<String, AppError> {
        Ok(self.text.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_deserializes_the_provider_shape() {
        let raw = r#"{
            "ParsedResults": [{"ParsedText": "BAR PEPE\nTOTAL: 4,90"}],
            "IsErroredOnProcessing": false
        }"#;
        let envelope: OcrSpaceEnvelope = serde_json::from_str(raw).unwrap();
        assert!(!envelope.is_errored);
        assert_eq!(
            envelope.parsed_results[0].parsed_text,
            "BAR PEPE\nTOTAL: 4,90"
        );
    }

    #[test]
    fn envelope_tolerates_missing_results() {
        let envelope: OcrSpaceEnvelope =
            serde_json::from_str(r#"{"IsErroredOnProcessing": true, "ErrorMessage": ["bad"]}"#)
                .unwrap();
        assert!(envelope.is_errored);
        assert!(envelope.parsed_results.is_empty());
    }
}
