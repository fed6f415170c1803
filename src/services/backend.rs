use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProctorError, Result};

/// Bytes handed to the media-upload collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl SnapshotUpload {
    pub fn jpeg(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: "image/jpeg".to_string(),
            bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedMedia {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    pub snapshot_media_ids: Vec<String>,
    pub voice_detection_count: u32,
}

/// Cumulative monitoring state for one enrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringRecordRequest {
    pub enrollment_id: String,
    pub tab_switch_count: u32,
    pub fullscreen_exit_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_start_media_id: Option<String>,
    pub metadata: RecordMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitoringRecord {
    #[serde(default)]
    pub id: Option<String>,
}

#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, upload: SnapshotUpload) -> Result<UploadedMedia>;
}

#[async_trait]
pub trait MonitoringRecordSink: Send + Sync {
    async fn create(&self, request: MonitoringRecordRequest) -> Result<MonitoringRecord>;
}

/// REST client for the exam backend's media and monitoring endpoints.
/// Failures are returned as-is; there is no retry.
#[derive(Clone)]
pub struct HttpMonitoringClient {
    client: Client,
    base_url: String,
}

impl HttpMonitoringClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl MediaUploader for HttpMonitoringClient {
    async fn upload(&self, upload: SnapshotUpload) -> Result<UploadedMedia> {
        let failed = |e: reqwest::Error| ProctorError::UploadFailure(e.to_string());

        let size = upload.bytes.len();
        let part = Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.content_type)
            .map_err(failed)?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/media", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(failed)?;

        if !response.status().is_success() {
            return Err(ProctorError::UploadFailure(format!(
                "media endpoint returned {}",
                response.status()
            )));
        }

        let media: UploadedMedia = response.json().await.map_err(failed)?;
        debug!("Uploaded {} bytes as media {}", size, media.id);
        Ok(media)
    }
}

#[async_trait]
impl MonitoringRecordSink for HttpMonitoringClient {
    async fn create(&self, request: MonitoringRecordRequest) -> Result<MonitoringRecord> {
        let failed = |e: reqwest::Error| ProctorError::RecordCreationFailure(e.to_string());

        let response = self
            .client
            .post(format!("{}/monitoring", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(failed)?;

        if !response.status().is_success() {
            return Err(ProctorError::RecordCreationFailure(format!(
                "monitoring endpoint returned {}",
                response.status()
            )));
        }

        // Some deployments answer 201 with an empty body.
        let body = response.text().await.map_err(failed)?;
        if body.trim().is_empty() {
            return Ok(MonitoringRecord::default());
        }
        serde_json::from_str(&body).map_err(|e| ProctorError::RecordCreationFailure(e.to_string()))
    }
}
