//! Typed view over received message envelopes.
//!
//! Envelopes arrive as loosely-shaped JSON (`{ key, message: { <kind>: {..} } }`).
//! Only the media-bearing kinds are modelled; everything else is carried
//! through untouched in the `extra` maps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wrapper kinds whose payload is a nested `{ message: {..} }`.
const WRAPPER_KEYS: &[&str] = &[
    "ephemeralMessage",
    "viewOnceMessage",
    "viewOnceMessageV2",
    "viewOnceMessageV2Extension",
    "documentWithCaptionMessage",
];

/// Nesting limit when unwrapping wrapper kinds.
const MAX_WRAPPER_DEPTH: usize = 4;

/// A message as received from (or persisted for) a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub key: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Media kinds that can be downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
    Sticker,
}

impl MediaKind {
    /// Precedence order used when an envelope carries more than one media key.
    pub const ALL: &'static [MediaKind] = &[
        Self::Image,
        Self::Video,
        Self::Audio,
        Self::Document,
        Self::Sticker,
    ];

    /// Content key of this kind inside `message`.
    pub fn content_key(self) -> &'static str {
        match self {
            Self::Image => "imageMessage",
            Self::Video => "videoMessage",
            Self::Audio => "audioMessage",
            Self::Document => "documentMessage",
            Self::Sticker => "stickerMessage",
        }
    }

    pub fn from_content_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.content_key() == key)
    }

    /// Mime type assumed when the descriptor does not declare one.
    pub fn fallback_mime_type(self) -> &'static str {
        match self {
            Self::Sticker => "image/webp",
            _ => "application/octet-stream",
        }
    }
}

/// Location and key material of one media attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_path: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Media content of an envelope, one variant per known kind.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaMessage {
    Image(MediaDescriptor),
    Video(MediaDescriptor),
    Audio(MediaDescriptor),
    Document(MediaDescriptor),
    Sticker(MediaDescriptor),
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope carries no message content")]
    NoMessage,

    #[error("envelope carries no downloadable media (keys: {keys:?})")]
    UnsupportedContent { keys: Vec<String> },

    #[error("malformed {kind:?} descriptor: {source}")]
    MalformedDescriptor {
        kind: MediaKind,
        #[source]
        source: serde_json::Error,
    },
}

impl MediaMessage {
    fn from_parts(kind: MediaKind, descriptor: MediaDescriptor) -> Self {
        match kind {
            MediaKind::Image => Self::Image(descriptor),
            MediaKind::Video => Self::Video(descriptor),
            MediaKind::Audio => Self::Audio(descriptor),
            MediaKind::Document => Self::Document(descriptor),
            MediaKind::Sticker => Self::Sticker(descriptor),
        }
    }

    /// Extract the media content of `envelope`.
    ///
    /// Wrapper kinds (ephemeral, view-once, document-with-caption) are
    /// unwrapped first. Non-media keys such as `messageContextInfo` are
    /// skipped; if several media keys co-occur, [`MediaKind::ALL`] order wins.
    pub fn from_envelope(envelope: &MessageEnvelope) -> Result<Self, EnvelopeError> {
        let content = envelope.message.as_ref().ok_or(EnvelopeError::NoMessage)?;
        Self::from_content(content, 0)
    }

    fn from_content(content: &Map<String, Value>, depth: usize) -> Result<Self, EnvelopeError> {
        for kind in MediaKind::ALL {
            if let Some(raw) = content.get(kind.content_key()) {
                let descriptor = serde_json::from_value(raw.clone())
                    .map_err(|source| EnvelopeError::MalformedDescriptor { kind: *kind, source })?;
                return Ok(Self::from_parts(*kind, descriptor));
            }
        }

        if depth < MAX_WRAPPER_DEPTH {
            for wrapper in WRAPPER_KEYS {
                if let Some(inner) = content
                    .get(*wrapper)
                    .and_then(|w| w.get("message"))
                    .and_then(Value::as_object)
                {
                    return Self::from_content(inner, depth + 1);
                }
            }
        }

        Err(EnvelopeError::UnsupportedContent {
            keys: content.keys().cloned().collect(),
        })
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Image(_) => MediaKind::Image,
            Self::Video(_) => MediaKind::Video,
            Self::Audio(_) => MediaKind::Audio,
            Self::Document(_) => MediaKind::Document,
            Self::Sticker(_) => MediaKind::Sticker,
        }
    }

    pub fn descriptor(&self) -> &MediaDescriptor {
        match self {
            Self::Image(d) | Self::Video(d) | Self::Audio(d) | Self::Document(d) | Self::Sticker(d) => {
                d
            },
        }
    }

    /// Declared mime type, or the kind's fallback.
    pub fn mime_type(&self) -> &str {
        self.descriptor()
            .mimetype
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.kind().fallback_mime_type())
    }
}
