use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use serde_json::Value;

use crate::config::CoachConfig;
use crate::error::GenerationError;
use crate::generation::truncate_text;
use crate::media::extension_for_mime;

#[derive(Debug, Clone, PartialEq)]
pub struct ImageEditRequest {
    pub image: Vec<u8>,
    pub mime_type: String,
    pub instruction: String,
    pub size: String,
    pub quality: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

pub trait ImageEditProvider: Send + Sync {
    fn name(&self) -> &str;
    fn edit(&self, request: &ImageEditRequest) -> Result<EditedImage, GenerationError>;
}

/// OpenAI `/images/edits`.
pub struct OpenAiEditProvider {
    api_base: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiEditProvider {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        }
    }

    /// `None` when no key is configured; the edit stage is then skipped.
    pub fn from_config(config: &CoachConfig) -> Option<Self> {
        let api_key = config.openai_api_key.clone()?;
        Some(Self::new(
            config.openai_api_base.clone(),
            api_key,
            config.image_model.clone(),
            config.image_timeout,
        ))
    }

    fn endpoint(&self) -> String {
        format!("{}/images/edits", self.api_base)
    }

    fn form(&self, request: &ImageEditRequest) -> Result<MultipartForm, GenerationError> {
        let file_name = format!("space.{}", extension_for_mime(&request.mime_type));
        let part = MultipartPart::bytes(request.image.clone())
            .file_name(file_name)
            .mime_str(&request.mime_type)
            .map_err(|err| GenerationError::Transport(format!("invalid mime: {err}")))?;
        Ok(MultipartForm::new()
            .text("model", self.model.clone())
            .text("prompt", request.instruction.clone())
            .text("n", "1")
            .text("size", request.size.clone())
            .text("quality", request.quality.clone())
            .part("image", part))
    }
}

impl ImageEditProvider for OpenAiEditProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn edit(&self, request: &ImageEditRequest) -> Result<EditedImage, GenerationError> {
        let http = HttpClient::builder()
            .timeout(self.timeout)
            .build()
            .map_err(GenerationError::from_reqwest)?;
        let response = http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .multipart(self.form(request)?)
            .send()
            .map_err(GenerationError::from_reqwest)?;

        let status = response.status();
        let body = response.text().map_err(GenerationError::from_reqwest)?;
        if !status.is_success() {
            return Err(GenerationError::Provider {
                status: status.as_u16(),
                body: truncate_text(&body, 512),
            });
        }
        let parsed: Value = serde_json::from_str(&body).map_err(|err| {
            GenerationError::Transport(format!("OpenAI edits returned invalid JSON: {err}"))
        })?;
        let bytes = extract_edited_bytes(&parsed)?.ok_or(GenerationError::EmptyResponse)?;
        Ok(EditedImage {
            bytes,
            mime_type: "image/png".to_string(),
        })
    }
}

fn extract_edited_bytes(response: &Value) -> Result<Option<Vec<u8>>, GenerationError> {
    let encoded = response
        .get("data")
        .and_then(Value::as_array)
        .and_then(|rows| {
            rows.iter()
                .find_map(|row| row.get("b64_json").and_then(Value::as_str))
        });
    let Some(encoded) = encoded else {
        return Ok(None);
    };
    BASE64
        .decode(encoded.as_bytes())
        .map(Some)
        .map_err(|err| GenerationError::Transport(format!("edited image base64 decode failed: {err}")))
}
