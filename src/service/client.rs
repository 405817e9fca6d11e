//! HTTP client for the voice profile and synthesis endpoints
//!
//! Upload sends the recorded artifact as multipart form data; generation sends
//! a JSON body. Both endpoints answer with a JSON object, carrying `error` on
//! non-2xx responses.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::audio::RecordedAudio;

pub const UPLOAD_VOICE_PATH: &str = "/api/upload-voice";
pub const GENERATE_CALLOUT_PATH: &str = "/api/generate-callout";

/// Multipart field carrying the voice sample.
pub const UPLOAD_FIELD_NAME: &str = "audio";
pub const UPLOAD_FILE_NAME: &str = "voice_sample.wav";

/// Errors that can occur while talking to the service
#[derive(Debug, Clone)]
pub enum ServiceError {
    /// Base URL or returned resource locator could not be parsed
    InvalidUrl(String),
    /// Request could not complete
    NetworkError(String),
    /// Service answered non-2xx with an `error` message
    ApiError { status: u16, message: String },
    /// Response body missing or not in the expected shape
    ParseError(String),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::InvalidUrl(e) => write!(f, "Invalid URL: {}", e),
            ServiceError::NetworkError(e) => write!(f, "Network error: {}", e),
            ServiceError::ApiError { status, message } => {
                write!(f, "Service error ({}): {}", status, message)
            }
            ServiceError::ParseError(e) => write!(f, "Failed to parse service response: {}", e),
        }
    }
}

impl std::error::Error for ServiceError {}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    profile_id: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    audio_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// JSON body of a generation request
#[derive(Debug, Serialize)]
pub struct GenerateRequest<'a> {
    pub profile_id: &'a str,
    pub message: &'a str,
}

/// Client for one service deployment. Cheap to clone; the HTTP client is shared.
#[derive(Debug, Clone)]
pub struct CalloutService {
    client: Client,
    base_url: Url,
}

impl CalloutService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ServiceError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::NetworkError(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a locator returned by the service. Absolute locators pass
    /// through unchanged; relative ones are taken against the base URL.
    pub fn resolve(&self, location: &str) -> Result<Url, ServiceError> {
        self.base_url
            .join(location)
            .map_err(|e| ServiceError::InvalidUrl(format!("{}: {}", location, e)))
    }

    /// Upload a voice sample and return the new profile identifier.
    pub async fn upload_voice(&self, audio: &RecordedAudio) -> Result<String, ServiceError> {
        let url = self.resolve(UPLOAD_VOICE_PATH)?;

        log::info!(
            "Uploading voice sample: {} bytes ({:?})",
            audio.len(),
            audio.duration()
        );

        let part = Part::bytes(audio.bytes().to_vec())
            .file_name(UPLOAD_FILE_NAME)
            .mime_str(audio.content_type())
            .map_err(|e| ServiceError::ParseError(e.to_string()))?;

        let form = Form::new().part(UPLOAD_FIELD_NAME, part);

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ServiceError::NetworkError(e.to_string()))?;

        let body: UploadResponse = read_json(response).await?;
        log::info!("Voice profile created: {}", body.profile_id);
        Ok(body.profile_id)
    }

    /// Request a callout in the profile's voice and return its audio locator.
    pub async fn generate_callout(
        &self,
        profile_id: &str,
        message: &str,
    ) -> Result<String, ServiceError> {
        let url = self.resolve(GENERATE_CALLOUT_PATH)?;

        log::info!(
            "Generating callout for profile {} ({} chars)",
            profile_id,
            message.len()
        );

        let response = self
            .client
            .post(url)
            .json(&GenerateRequest {
                profile_id,
                message,
            })
            .send()
            .await
            .map_err(|e| ServiceError::NetworkError(e.to_string()))?;

        let body: GenerateResponse = read_json(response).await?;
        log::info!("Callout generated: {}", body.audio_url);
        Ok(body.audio_url)
    }

    /// Download generated audio for local playback.
    pub async fn fetch_audio(&self, audio_url: &str) -> Result<Vec<u8>, ServiceError> {
        let url = self.resolve(audio_url)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ServiceError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_body(status.as_u16(), response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ServiceError::NetworkError(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
    let status = response.status();

    if status.is_success() {
        response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::ParseError(e.to_string()))
    } else {
        Err(error_from_body(status.as_u16(), response).await)
    }
}

/// Non-2xx: the `error` field when present, otherwise the body is unusable.
async fn error_from_body(status: u16, response: Response) -> ServiceError {
    let error_text = match response.text().await {
        Ok(text) => text,
        Err(e) => return ServiceError::NetworkError(e.to_string()),
    };

    match serde_json::from_str::<ErrorResponse>(&error_text) {
        Ok(error_response) => {
            log::error!("Service error ({}): {}", status, error_response.error);
            ServiceError::ApiError {
                status,
                message: error_response.error,
            }
        }
        Err(e) => {
            log::error!("Service error ({}) with unreadable body: {}", status, error_text);
            ServiceError::ParseError(e.to_string())
        }
    }
}
