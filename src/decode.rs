use base64::prelude::{Engine as _, BASE64_STANDARD};
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("decode request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("decode endpoint returned HTTP {0}")]
    Status(reqwest::StatusCode),
}

/// One decoded symbol as returned by the remote service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanResult {
    #[serde(rename = "type")]
    pub symbol_type: String,
    pub data: String,
}

/// Response shape shared by both decode endpoints. The server omits
/// `results` entirely when nothing was found, so everything defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct DecodeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub results: Vec<ScanResult>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize)]
struct FramePayload {
    image: String,
}

/// Client for the remote decode service. Both endpoints are documented in
/// the service contract: `POST /scan_frame` takes a data-URL encoded JPEG,
/// `POST /upload` takes a multipart `file` field.
#[derive(Clone)]
pub struct DecodeClient {
    http: reqwest::Client,
    base_url: String,
}

impl DecodeClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn scan_frame(&self, jpeg: &[u8]) -> Result<DecodeResponse, DecodeError> {
        let payload = FramePayload {
            image: jpeg_data_url(jpeg),
        };

        let response = self
            .http
            .post(format!("{}/scan_frame", self.base_url))
            .json(&payload)
            .send()
            .await?;

        parse_response(response).await
    }

    pub async fn upload(
        &self,
        file_name: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<DecodeResponse, DecodeError> {
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .send()
            .await?;

        parse_response(response).await
    }
}

async fn parse_response(response: reqwest::Response) -> Result<DecodeResponse, DecodeError> {
    if !response.status().is_success() {
        return Err(DecodeError::Status(response.status()));
    }
    Ok(response.json::<DecodeResponse>().await?)
}

pub fn jpeg_data_url(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", BASE64_STANDARD.encode(jpeg))
}
