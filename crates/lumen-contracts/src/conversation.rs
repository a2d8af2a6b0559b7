use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineData {
    #[serde(rename = "mimeType", alias = "mime_type", default)]
    pub mime_type: String,
    #[serde(default)]
    pub data: String,
}

/// One unit of a turn's payload, in the backend's wire shape.
///
/// Either `text` or `inline_data` is set. Fields the backend attaches that
/// this crate does not model are kept in `extra` so a model turn is sent
/// back exactly as it was received.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(
        rename = "inlineData",
        alias = "inline_data",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub inline_data: Option<InlineData>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn inline(inline_data: InlineData) -> Self {
        Self {
            inline_data: Some(inline_data),
            ..Self::default()
        }
    }

    pub fn as_inline(&self) -> Option<&InlineData> {
        self.inline_data.as_ref()
    }

    pub fn as_text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl Turn {
    pub fn user(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    pub fn model(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::Model,
            parts,
        }
    }
}

/// Flat, append-only log of user/model turns.
///
/// Turns are only ever added in user/model pairs; the only other mutation is
/// wiping the whole log.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_exchange(&mut self, user: Turn, model: Turn) {
        self.turns.push(user);
        self.turns.push(model);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{ContentPart, Conversation, InlineData, Role, Turn};

    #[test]
    fn parts_serialize_to_wire_shape() -> anyhow::Result<()> {
        let text = serde_json::to_value(ContentPart::text("hi"))?;
        assert_eq!(text, json!({"text": "hi"}));

        let image = serde_json::to_value(ContentPart::inline(InlineData {
            mime_type: "image/png".to_string(),
            data: "AAAA".to_string(),
        }))?;
        assert_eq!(
            image,
            json!({"inlineData": {"mimeType": "image/png", "data": "AAAA"}})
        );
        Ok(())
    }

    #[test]
    fn unknown_part_fields_survive_roundtrip() -> anyhow::Result<()> {
        let raw = json!({
            "text": "Here is your logo.",
            "thoughtSignature": "sig-123",
        });
        let part: ContentPart = serde_json::from_value(raw.clone())?;
        assert_eq!(part.as_text(), Some("Here is your logo."));
        assert_eq!(part.extra.get("thoughtSignature"), Some(&json!("sig-123")));
        assert_eq!(serde_json::to_value(&part)?, raw);
        Ok(())
    }

    #[test]
    fn snake_case_inline_data_is_accepted() -> anyhow::Result<()> {
        let part: ContentPart = serde_json::from_value(json!({
            "inline_data": {"mime_type": "image/jpeg", "data": "Zm9v"}
        }))?;
        let inline = part.as_inline().cloned().unwrap_or(InlineData {
            mime_type: String::new(),
            data: String::new(),
        });
        assert_eq!(inline.mime_type, "image/jpeg");
        assert_eq!(inline.data, "Zm9v");
        Ok(())
    }

    #[test]
    fn conversation_grows_in_pairs_and_serializes_as_array() -> anyhow::Result<()> {
        let mut conversation = Conversation::new();
        conversation.append_exchange(
            Turn::user(vec![ContentPart::text("a red circle logo")]),
            Turn::model(vec![ContentPart::text("done")]),
        );
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.turns()[0].role, Role::User);
        assert_eq!(conversation.turns()[1].role, Role::Model);

        let encoded = serde_json::to_value(&conversation)?;
        assert_eq!(encoded[0]["role"], Value::String("user".to_string()));
        assert_eq!(encoded[1]["parts"][0]["text"], json!("done"));

        conversation.clear();
        assert!(conversation.is_empty());
        Ok(())
    }
}
