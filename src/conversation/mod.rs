//! Conversation model for the document intake dialogue
//!
//! Holds the per-user [`ConversationState`], the normalized
//! [`InboundMessage`] envelope and the [`Reply`] sent back to the channel.
//! The decision logic itself lives in [`engine`].

mod catalog;
pub mod engine;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use catalog::{ActionOption, DocumentKind, MenuAction, MenuOptions};
pub use engine::{Action, Decision, DialogueEngine};

use crate::Result;

/// A document category chosen from the configured menu
///
/// Only [`MenuOptions`] hands these out, so every value in a state or record
/// corresponds to a configured [`DocumentKind`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentType {
    /// Stable identifier used in filenames (e.g. `driving_license`)
    pub id: String,
    /// Human label used in replies and stored records (e.g. `Driving License`)
    pub label: String,
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Where a user currently is in the guided dialogue
///
/// Absence of a stored entry is equivalent to [`ConversationState::Greeting`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Greeting,
    AwaitingAction,
    AwaitingSendDocType,
    AwaitingReceiveDocType,
    AwaitingDocumentMedia {
        doc_type: DocumentType,
    },
    /// Intake I/O is in flight for this user
    Processing {
        doc_type: DocumentType,
    },
    /// A stored entry that no longer decodes into a known state
    #[serde(skip)]
    Unrecognized {
        raw: String,
    },
}

impl ConversationState {
    /// Encode for a shared store
    ///
    /// Unrecognized entries encode back to their original raw text so a
    /// compare-and-set against them still matches.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn encode(&self) -> Result<String> {
        match self {
            Self::Unrecognized { raw } => Ok(raw.clone()),
            other => Ok(serde_json::to_string(other)?),
        }
    }

    /// Decode a stored entry, never failing
    #[must_use]
    pub fn decode(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "stored conversation state did not decode");
            Self::Unrecognized {
                raw: raw.to_string(),
            }
        })
    }

    /// Whether this is the implicit default state
    #[must_use]
    pub const fn is_greeting(&self) -> bool {
        matches!(self, Self::Greeting)
    }

    /// Short name for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::AwaitingAction => "awaiting_action",
            Self::AwaitingSendDocType => "awaiting_send_doc_type",
            Self::AwaitingReceiveDocType => "awaiting_receive_doc_type",
            Self::AwaitingDocumentMedia { .. } => "awaiting_document_media",
            Self::Processing { .. } => "processing",
            Self::Unrecognized { .. } => "unrecognized",
        }
    }
}

/// A media item attached to an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    /// Provider URL to download the media from
    pub url: String,
    /// MIME type reported by the provider
    pub content_type: String,
    /// Provider-assigned message identifier
    pub message_id: String,
}

/// A normalized inbound message from the messaging provider
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Provider-assigned message identifier
    pub message_id: String,

    /// Sender identifier (e.g. `whatsapp:+15551234567`)
    pub sender: String,

    /// Lower-cased body with surrounding and repeated whitespace removed
    pub body: String,

    /// Number of media items the provider reported
    pub media_count: usize,

    /// Media items, in provider order
    pub media: Vec<MediaRef>,
}

impl InboundMessage {
    /// Create a text-only message, normalizing the body
    #[must_use]
    pub fn new(message_id: impl Into<String>, sender: impl Into<String>, body: &str) -> Self {
        Self {
            message_id: message_id.into(),
            sender: sender.into(),
            body: normalize_body(body),
            media_count: 0,
            media: Vec::new(),
        }
    }

    /// Attach a media item
    #[must_use]
    pub fn with_media(mut self, url: impl Into<String>, content_type: impl Into<String>) -> Self {
        self.media.push(MediaRef {
            url: url.into(),
            content_type: content_type.into(),
            message_id: self.message_id.clone(),
        });
        self.media_count = self.media_count.max(self.media.len());
        self
    }

    /// First attached media item, if any
    #[must_use]
    pub fn first_media(&self) -> Option<&MediaRef> {
        self.media.first()
    }
}

/// Lower-case, trim and collapse internal whitespace
#[must_use]
pub fn normalize_body(body: &str) -> String {
    body.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Reply sent back to the user, one or more text segments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    segments: Vec<String>,
}

impl Reply {
    /// Single-segment reply
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            segments: vec![content.into()],
        }
    }

    /// Append a segment
    #[must_use]
    pub fn and(mut self, content: impl Into<String>) -> Self {
        self.segments.push(content.into());
        self
    }

    /// Text segments in send order
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether any segment contains the given text
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.segments.iter().any(|s| s.contains(needle))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("\n\n"))
    }
}
