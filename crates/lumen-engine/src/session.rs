use lumen_contracts::codec;
use lumen_contracts::conversation::{ContentPart, Conversation, Turn};
use lumen_contracts::events::{EventWriter, SessionEvent};
use lumen_contracts::history::{History, HistoryOrigin};
use lumen_contracts::image::ImageHandle;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{error_chain_text, truncate_text, SessionError, SessionOperation};
use crate::filters::FilterEditor;
use crate::provider::{GenerateRequest, RemoteEditClient};

pub const DEFAULT_ASPECT_RATIO: &str = "1:1";

/// Backend-calling work a front end may show as busy.
///
/// Generation and background removal each have their own slot; a front end
/// keeps at most one request in flight per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionSlot {
    Generation,
    BackgroundRemoval,
}

impl SessionSlot {
    pub fn for_operation(operation: SessionOperation) -> Self {
        match operation {
            SessionOperation::Generate => Self::Generation,
            SessionOperation::RemoveBackground => Self::BackgroundRemoval,
        }
    }

    pub fn busy_label(self) -> &'static str {
        match self {
            Self::Generation => "Generating...",
            Self::BackgroundRemoval => "Removing background...",
        }
    }
}

/// Everything a front end renders. Only `Session` mutates it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    current_image: Option<ImageHandle>,
    history: History,
    context: Conversation,
    pending_edit_seed: Option<ImageHandle>,
}

impl SessionState {
    pub fn current_image(&self) -> Option<&ImageHandle> {
        self.current_image.as_ref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn context(&self) -> &Conversation {
        &self.context
    }

    pub fn pending_edit_seed(&self) -> Option<&ImageHandle> {
        self.pending_edit_seed.as_ref()
    }
}

/// One iterative editing session against a remote backend.
///
/// Operations either fully apply or leave the state untouched. Event log
/// failures never fail an operation; they are queued for `take_warnings`.
pub struct Session {
    client: Box<dyn RemoteEditClient>,
    events: Option<EventWriter>,
    state: SessionState,
    warnings: Vec<String>,
}

impl Session {
    pub fn new(client: Box<dyn RemoteEditClient>) -> Self {
        Self {
            client,
            events: None,
            state: SessionState::default(),
            warnings: Vec::new(),
        }
    }

    pub fn with_events(client: Box<dyn RemoteEditClient>, events: EventWriter) -> Self {
        let mut session = Self::new(client);
        session.events = Some(events);
        let provider = session.client.name().to_string();
        session.emit(SessionEvent::SessionStarted, json!({ "provider": provider }));
        session
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    pub fn events(&self) -> Option<&EventWriter> {
        self.events.as_ref()
    }

    /// Drains backend notices and event-log failures gathered since the last call.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    pub fn generate(
        &mut self,
        prompt: &str,
        reference_images: &[ImageHandle],
        aspect_ratio: &str,
    ) -> Result<&SessionState, SessionError> {
        if prompt.trim().is_empty() {
            return Err(SessionError::EmptyPrompt);
        }
        let aspect_ratio = match aspect_ratio.trim() {
            "" => DEFAULT_ASPECT_RATIO,
            value => value,
        };

        let mut parts: Vec<ContentPart> = reference_images
            .iter()
            .map(|image| ContentPart::inline(codec::to_inline_data(image)))
            .collect();
        parts.push(ContentPart::text(format!(
            "{prompt}\n\n(Generate in {aspect_ratio} aspect ratio)"
        )));
        let request = GenerateRequest {
            prompt: prompt.to_string(),
            aspect_ratio: aspect_ratio.to_string(),
            user_turn: Turn::user(parts),
            context: self.state.context.turns().to_vec(),
        };

        let outcome = self
            .client
            .generate(&request)
            .map_err(|err| SessionError::transport(SessionOperation::Generate, &err))
            .and_then(|response| {
                let image = first_inline_image(&response.parts).ok_or(
                    SessionError::NoImageReturned {
                        operation: SessionOperation::Generate,
                    },
                )?;
                Ok((response, image))
            });
        let (response, image) = match outcome {
            Ok(value) => value,
            Err(err) => {
                self.emit(
                    SessionEvent::GenerationFailed,
                    json!({
                        "provider": self.client.name(),
                        "aspect_ratio": aspect_ratio,
                        "reference_images": reference_images.len(),
                        "error": err.to_string(),
                    }),
                );
                return Err(err);
            }
        };

        self.queue_backend_warnings(response.warnings);
        self.state.current_image = Some(image.clone());
        let entry_id = self
            .state
            .history
            .record(HistoryOrigin::Generated, prompt.to_string(), image.clone())
            .id;
        self.state
            .context
            .append_exchange(request.user_turn, Turn::model(response.parts));

        self.emit(
            SessionEvent::GenerationCompleted,
            json!({
                "provider": self.client.name(),
                "entry_id": entry_id,
                "prompt": truncate_text(prompt, 240),
                "aspect_ratio": aspect_ratio,
                "reference_images": reference_images.len(),
                "context_turns": self.state.context.len(),
                "image": image_summary(&image),
            }),
        );
        Ok(&self.state)
    }

    /// Marks the current image as the seed for the next generation.
    pub fn refine_with_ai(&mut self) -> Result<&SessionState, SessionError> {
        let current = self
            .state
            .current_image
            .clone()
            .ok_or(SessionError::NoCurrentImage)?;
        self.emit(
            SessionEvent::EditSeedPrepared,
            json!({ "image": image_summary(&current) }),
        );
        self.state.pending_edit_seed = Some(current);
        Ok(&self.state)
    }

    /// One-shot: a second call returns `None` until `refine_with_ai` runs again.
    pub fn take_edit_seed(&mut self) -> Option<ImageHandle> {
        self.state.pending_edit_seed.take()
    }

    /// Editor over the current image. Dropping it without `save_adjusted` cancels.
    pub fn adjust_locally(&self) -> Result<FilterEditor, SessionError> {
        self.state
            .current_image
            .clone()
            .map(FilterEditor::new)
            .ok_or(SessionError::NoCurrentImage)
    }

    pub fn save_adjusted(&mut self, image: ImageHandle) -> Result<&SessionState, SessionError> {
        self.state.current_image = Some(image.clone());
        let entry_id = self
            .state
            .history
            .record(
                HistoryOrigin::ManuallyAdjusted,
                sentinel_prompt(HistoryOrigin::ManuallyAdjusted),
                image.clone(),
            )
            .id;
        self.emit(
            SessionEvent::ImageAdjusted,
            json!({
                "entry_id": entry_id,
                "image": image_summary(&image),
            }),
        );
        Ok(&self.state)
    }

    /// Sends only the current image; the conversation is never touched.
    pub fn remove_background(&mut self) -> Result<&SessionState, SessionError> {
        let current = self
            .state
            .current_image
            .clone()
            .ok_or(SessionError::NoCurrentImage)?;

        let outcome = self
            .client
            .remove_background(&codec::to_inline_data(&current))
            .map_err(|err| SessionError::transport(SessionOperation::RemoveBackground, &err))
            .and_then(|response| {
                let image = first_inline_image(&response.parts).ok_or(
                    SessionError::NoImageReturned {
                        operation: SessionOperation::RemoveBackground,
                    },
                )?;
                Ok((response.warnings, image))
            });
        let (warnings, image) = match outcome {
            Ok(value) => value,
            Err(err) => {
                self.emit(
                    SessionEvent::BackgroundRemovalFailed,
                    json!({
                        "provider": self.client.name(),
                        "source": image_summary(&current),
                        "error": err.to_string(),
                    }),
                );
                return Err(err);
            }
        };

        self.queue_backend_warnings(warnings);
        self.state.current_image = Some(image.clone());
        let entry_id = self
            .state
            .history
            .record(
                HistoryOrigin::BackgroundRemoved,
                sentinel_prompt(HistoryOrigin::BackgroundRemoved),
                image.clone(),
            )
            .id;
        self.emit(
            SessionEvent::BackgroundRemoved,
            json!({
                "provider": self.client.name(),
                "entry_id": entry_id,
                "source": image_summary(&current),
                "image": image_summary(&image),
            }),
        );
        Ok(&self.state)
    }

    /// Shows an earlier image. Not an undo: history and context stay as they are.
    pub fn select_from_history(&mut self, image: ImageHandle) -> Result<&SessionState, SessionError> {
        self.emit(
            SessionEvent::HistorySelected,
            json!({ "image": image_summary(&image) }),
        );
        self.state.current_image = Some(image);
        Ok(&self.state)
    }

    /// `index` counts from the newest entry, as history is displayed.
    pub fn select_history_index(&mut self, index: usize) -> Result<&SessionState, SessionError> {
        let entry = self
            .state
            .history
            .get(index)
            .ok_or(SessionError::UnknownHistoryEntry {
                index,
                len: self.state.history.len(),
            })?;
        let image = entry.image.clone();
        let entry_id = entry.id;
        self.emit(
            SessionEvent::HistorySelected,
            json!({
                "index": index,
                "entry_id": entry_id,
                "image": image_summary(&image),
            }),
        );
        self.state.current_image = Some(image);
        Ok(&self.state)
    }

    /// Forgets history and conversation. The current image stays on screen.
    pub fn clear_history(&mut self) -> Result<&SessionState, SessionError> {
        let cleared_entries = self.state.history.len();
        let cleared_turns = self.state.context.len();
        self.state.history.clear();
        self.state.context.clear();
        self.emit(
            SessionEvent::HistoryCleared,
            json!({
                "cleared_entries": cleared_entries,
                "cleared_turns": cleared_turns,
            }),
        );
        Ok(&self.state)
    }

    fn queue_backend_warnings(&mut self, warnings: Vec<String>) {
        let provider = self.client.name().to_string();
        self.warnings.extend(
            warnings
                .into_iter()
                .map(|warning| format!("{provider}: {warning}")),
        );
    }

    fn emit(&mut self, event: SessionEvent, payload: Value) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        if let Err(err) = events.emit(event, map_object(payload)) {
            self.warnings.push(format!(
                "event log write failed ({event}): {}",
                error_chain_text(&err, 512)
            ));
        }
    }
}

/// First part carrying decodable, non-empty inline data.
fn first_inline_image(parts: &[ContentPart]) -> Option<ImageHandle> {
    let inline = parts.iter().find_map(ContentPart::as_inline)?;
    let image = codec::from_inline_data(inline).ok()?;
    (!image.is_empty()).then_some(image)
}

fn sentinel_prompt(origin: HistoryOrigin) -> String {
    origin.sentinel_prompt().unwrap_or_default().to_string()
}

fn image_summary(image: &ImageHandle) -> Value {
    let digest = Sha256::digest(image.bytes());
    json!({
        "bytes": image.len(),
        "mime_type": image.mime_type(),
        "sha256": hex::encode(&digest[..8]),
    })
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
