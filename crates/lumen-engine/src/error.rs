use std::fmt;

/// The two backend-calling operations, each with its own busy slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionOperation {
    Generate,
    RemoveBackground,
}

impl SessionOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::RemoveBackground => "remove_background",
        }
    }
}

impl fmt::Display for SessionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NoImageReturned,
    Transport,
}

/// Why a session operation was refused or did not produce a new image.
///
/// No variant is fatal: the session is unchanged and the user may retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("no current image")]
    NoCurrentImage,

    #[error("history has no entry at index {index} (len {len})")]
    UnknownHistoryEntry { index: usize, len: usize },

    #[error("{operation} returned no usable image")]
    NoImageReturned { operation: SessionOperation },

    #[error("{operation} failed: {message}")]
    Transport {
        operation: SessionOperation,
        message: String,
    },
}

impl SessionError {
    pub(crate) fn transport(operation: SessionOperation, err: &anyhow::Error) -> Self {
        Self::Transport {
            operation,
            message: error_chain_text(err, 2048),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyPrompt | Self::NoCurrentImage | Self::UnknownHistoryEntry { .. } => {
                ErrorKind::Validation
            }
            Self::NoImageReturned { .. } => ErrorKind::NoImageReturned,
            Self::Transport { .. } => ErrorKind::Transport,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyPrompt => "Please enter a design request.",
            Self::NoCurrentImage => "Generate or select an image first.",
            Self::UnknownHistoryEntry { .. } => "That history entry does not exist.",
            Self::NoImageReturned {
                operation: SessionOperation::Generate,
            } => "The AI didn't return an image. Please try a different prompt.",
            Self::NoImageReturned {
                operation: SessionOperation::RemoveBackground,
            } => "The AI couldn't remove the background. Please try again.",
            Self::Transport {
                operation: SessionOperation::Generate,
                ..
            } => "An error occurred while generating the image. Please try again.",
            Self::Transport {
                operation: SessionOperation::RemoveBackground,
                ..
            } => "An error occurred while removing the background. Please try again.",
        }
    }
}

/// Flattens an error chain into `outer | caused by: inner`, skipping
/// repeated messages.
pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use super::{error_chain_text, truncate_text, ErrorKind, SessionError, SessionOperation};

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(SessionError::EmptyPrompt.kind(), ErrorKind::Validation);
        assert_eq!(SessionError::NoCurrentImage.kind(), ErrorKind::Validation);
        assert_eq!(
            SessionError::NoImageReturned {
                operation: SessionOperation::Generate
            }
            .kind(),
            ErrorKind::NoImageReturned
        );
        assert_eq!(
            SessionError::Transport {
                operation: SessionOperation::RemoveBackground,
                message: "boom".to_string(),
            }
            .kind(),
            ErrorKind::Transport
        );
    }

    #[test]
    fn user_messages_depend_on_operation() {
        let generate = SessionError::NoImageReturned {
            operation: SessionOperation::Generate,
        };
        let remove = SessionError::NoImageReturned {
            operation: SessionOperation::RemoveBackground,
        };
        assert_ne!(generate.user_message(), remove.user_message());
        assert_eq!(
            SessionError::EmptyPrompt.user_message(),
            "Please enter a design request."
        );
    }

    #[test]
    fn transport_error_flattens_cause_chain() {
        let err = anyhow::anyhow!("connection reset").context("Gemini request failed");
        let session_err = SessionError::transport(SessionOperation::Generate, &err);
        assert_eq!(
            session_err.to_string(),
            "generate failed: Gemini request failed | caused by: connection reset"
        );
        assert_eq!(
            error_chain_text(&err, 10),
            format!("{}…", "Gemini req")
        );
    }

    #[test]
    fn truncate_text_keeps_short_values() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }
}
