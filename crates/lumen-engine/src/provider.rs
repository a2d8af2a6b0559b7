use anyhow::{bail, Result};
use lumen_contracts::conversation::{ContentPart, InlineData, Turn};

use crate::config::GeminiConfig;
use crate::dryrun::DryrunClient;
use crate::gemini::GeminiClient;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    /// The prompt as the user typed it.
    pub prompt: String,
    pub aspect_ratio: String,
    /// Outgoing turn: reference images followed by the prompt text with the
    /// aspect-ratio directive appended.
    pub user_turn: Turn,
    /// Prior conversation, oldest first.
    pub context: Vec<Turn>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EditResponse {
    /// Every part the backend returned, in order.
    pub parts: Vec<ContentPart>,
    pub warnings: Vec<String>,
}

/// A generative backend. Each call is one request/response round trip.
pub trait RemoteEditClient: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerateRequest) -> Result<EditResponse>;
    fn remove_background(&self, image: &InlineData) -> Result<EditResponse>;
}

pub const PROVIDER_NAMES: &[&str] = &["dryrun", "gemini"];

pub fn client_for_provider(
    provider: &str,
    model: Option<&str>,
) -> Result<Box<dyn RemoteEditClient>> {
    client_for_provider_with_lookup(provider, model, |key| std::env::var(key).ok())
}

/// Like `client_for_provider`, reading configuration through `lookup`
/// instead of the process environment.
pub fn client_for_provider_with_lookup(
    provider: &str,
    model: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Box<dyn RemoteEditClient>> {
    match provider.trim().to_ascii_lowercase().as_str() {
        "dryrun" => Ok(Box::new(DryrunClient::new())),
        "gemini" => {
            let mut config = GeminiConfig::from_lookup(lookup)?;
            if let Some(model) = model.map(str::trim).filter(|value| !value.is_empty()) {
                config.model = model.to_string();
            }
            Ok(Box::new(GeminiClient::new(config)?))
        }
        other => bail!(
            "provider '{}' not registered (available: [{}])",
            other,
            PROVIDER_NAMES.join(", ")
        ),
    }
}
