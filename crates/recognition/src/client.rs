use crate::config::RecognitionConfig;
use crate::error::{FailureCause, Operation, RecognitionError};
use crate::record::FoodRecord;
use crate::wire::decode_records;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::sync::Arc;

/// Image bytes plus the metadata the multipart part carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Arc<[u8]>,
    pub file_name: String,
    pub mime: String,
}

impl ImagePayload {
    pub fn new(
        bytes: impl Into<Arc<[u8]>>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: file_name.into(),
            mime: mime.into(),
        }
    }
}

/// Food recognition as consumed by the scan controller.
///
/// One attempt per call: no retry, no backoff. An empty list is a successful
/// answer, not an error.
#[async_trait]
pub trait FoodRecognizer: Send + Sync {
    async fn analyze(&self, image: &ImagePayload) -> Result<Vec<FoodRecord>, RecognitionError>;

    async fn search(&self, query: &str) -> Result<Vec<FoodRecord>, RecognitionError>;
}

/// HTTP client for the food recognition service.
#[derive(Debug, Clone)]
pub struct RecognitionClient {
    http: reqwest::Client,
    base_url: String,
}

impl RecognitionClient {
    pub fn new(config: &RecognitionConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("food-scanner/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Connectivity probe. Returns the service's plain-text greeting.
    #[tracing::instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn health(&self) -> Result<String, RecognitionError> {
        let fail = |cause| RecognitionError::new(Operation::Health, cause);

        let resp = self
            .http
            .get(self.url("/api/food/test"))
            .send()
            .await
            .map_err(|e| fail(transport(e)))?;

        if !resp.status().is_success() {
            return Err(fail(FailureCause::Status(resp.status().as_u16())));
        }
        resp.text().await.map_err(|e| fail(transport(e)))
    }

    async fn records(
        operation: Operation,
        request: reqwest::RequestBuilder,
    ) -> Result<Vec<FoodRecord>, RecognitionError> {
        let fail = |cause| RecognitionError::new(operation, cause);

        let resp = request.send().await.map_err(|e| fail(transport(e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                body = %body,
                "Recognition service rejected request"
            );
            return Err(fail(FailureCause::Status(status.as_u16())));
        }

        let body = resp.bytes().await.map_err(|e| fail(transport(e)))?;
        let records = decode_records(&body).map_err(fail)?;
        tracing::debug!(count = records.len(), "Recognition records received");
        Ok(records)
    }
}

fn transport(err: reqwest::Error) -> FailureCause {
    FailureCause::Transport(err.to_string())
}

#[async_trait]
impl FoodRecognizer for RecognitionClient {
    #[tracing::instrument(
        skip(self, image),
        fields(file = %image.file_name, size = image.bytes.len())
    )]
    async fn analyze(&self, image: &ImagePayload) -> Result<Vec<FoodRecord>, RecognitionError> {
        let part = Part::bytes(image.bytes.to_vec())
            .file_name(image.file_name.clone())
            .mime_str(&image.mime)
            .map_err(|e| RecognitionError::new(Operation::Analyze, transport(e)))?;
        let form = Form::new().part("image", part);

        let request = self.http.post(self.url("/api/food/analyze")).multipart(form);
        Self::records(Operation::Analyze, request).await
    }

    #[tracing::instrument(skip(self))]
    async fn search(&self, query: &str) -> Result<Vec<FoodRecord>, RecognitionError> {
        let request = self
            .http
            .get(self.url("/api/food/search"))
            .query(&[("query", query)]);
        Self::records(Operation::Search, request).await
    }
}
