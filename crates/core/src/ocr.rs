//! OCR collaborator interface.
//!
//! The engine is an opaque text-extraction black box behind a trait; the
//! production implementation posts the image to an external OCR service.
//! Language is fixed to a single locale.

use std::future::Future;

use serde::Deserialize;

use crate::error::{CoreError, CoreResult};

pub trait OcrEngine: Send + Sync {
    fn extract_text(&self, image: &[u8]) -> impl Future<Output = CoreResult<String>> + Send;
}

/// HTTP-backed OCR client.
#[derive(Clone)]
pub struct HttpOcrClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct OcrResponse {
    text: String,
}

impl HttpOcrClient {
    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

impl OcrEngine for HttpOcrClient {
    async fn extract_text(&self, image: &[u8]) -> CoreResult<String> {
        let part = reqwest::multipart::Part::bytes(image.to_vec()).file_name("receipt");
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("language", "eng");

        let mut request = self.client.post(&self.endpoint).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CoreError::Ocr(format!("request failed: {e}")))?
            .error_for_status()
            .map_err(|e| CoreError::Ocr(format!("service error: {e}")))?;

        let body: OcrResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Ocr(format!("unreadable response: {e}")))?;

        if body.text.trim().is_empty() {
            return Err(CoreError::Ocr("empty text extraction".to_string()));
        }

        Ok(body.text)
    }
}

/// Fixed-output engine for tests.
#[cfg(test)]
pub struct FixedOcr(pub String);

#[cfg(test)]
impl OcrEngine for FixedOcr {
    async fn extract_text(&self, _image: &[u8]) -> CoreResult<String> {
        Ok(self.0.clone())
    }
}
