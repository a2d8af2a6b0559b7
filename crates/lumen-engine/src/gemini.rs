use anyhow::{bail, Context, Result};
use lumen_contracts::conversation::{ContentPart, InlineData, Turn};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};

use crate::config::GeminiConfig;
use crate::error::truncate_text;
use crate::provider::{EditResponse, GenerateRequest, RemoteEditClient};

pub const REMOVE_BACKGROUND_INSTRUCTION: &str = "Remove the background from this image. \
Keep the main subject exactly as it is and make everything else fully transparent. \
Return only the edited image.";

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiClient {
    config: GeminiConfig,
    http: HttpClient,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn post(&self, payload: &Value) -> Result<Value> {
        let endpoint = self.config.endpoint();
        let response = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        response_json_or_error("Gemini", response)
    }
}

impl RemoteEditClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<EditResponse> {
        let payload = generate_payload(request);
        let response = self.post(&payload)?;
        extract_response(&response)
    }

    fn remove_background(&self, image: &InlineData) -> Result<EditResponse> {
        let payload = remove_background_payload(image);
        let response = self.post(&payload)?;
        extract_response(&response)
    }
}

pub(crate) fn generate_payload(request: &GenerateRequest) -> Value {
    let mut contents = request.context.clone();
    contents.push(request.user_turn.clone());
    json!({
        "contents": contents,
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"],
            "imageConfig": {
                "aspectRatio": request.aspect_ratio,
            },
        },
    })
}

pub(crate) fn remove_background_payload(image: &InlineData) -> Value {
    let turn = Turn::user(vec![
        ContentPart::inline(image.clone()),
        ContentPart::text(REMOVE_BACKGROUND_INSTRUCTION),
    ]);
    json!({
        "contents": [turn],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"],
        },
    })
}

/// Reads `candidates[0].content.parts`. A response without candidates yields
/// no parts and parts that do not match the wire shape are skipped with a
/// warning; the caller decides whether what is left is a failure.
pub(crate) fn extract_response(payload: &Value) -> Result<EditResponse> {
    let mut warnings = Vec::new();
    if let Some(reason) = payload
        .get("promptFeedback")
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str)
    {
        warnings.push(format!("Gemini blocked the request ({reason})."));
    }

    let Some(candidate) = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
    else {
        return Ok(EditResponse {
            parts: Vec::new(),
            warnings,
        });
    };

    if let Some(reason) = candidate.get("finishReason").and_then(Value::as_str) {
        if reason != "STOP" {
            warnings.push(format!("Gemini finished with reason {reason}."));
        }
    }

    let raw_parts = candidate
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let mut parts = Vec::with_capacity(raw_parts.len());
    for (index, raw) in raw_parts.iter().enumerate() {
        match serde_json::from_value::<ContentPart>(raw.clone()) {
            Ok(part) => parts.push(part),
            Err(err) => warnings.push(format!("Gemini part {index} skipped: {err}")),
        }
    }
    Ok(EditResponse { parts, warnings })
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}
