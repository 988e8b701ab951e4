use std::fmt;

use serde::{Deserialize, Serialize};

/// Server suffix for individual (phone number) addresses.
pub const USER_SERVER: &str = "s.whatsapp.net";

/// Server suffix for group addresses.
pub const GROUP_SERVER: &str = "g.us";

/// Kind of destination an address points at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    /// A single user, addressed by phone number.
    #[default]
    Number,
    /// A group conversation.
    Group,
}

impl AddressKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Group => "group",
        }
    }

    fn server(self) -> &'static str {
        match self {
            Self::Number => USER_SERVER,
            Self::Group => GROUP_SERVER,
        }
    }
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AddressKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "number" => Ok(Self::Number),
            "group" => Ok(Self::Group),
            other => Err(format!("unknown address kind: {other}")),
        }
    }
}

/// A protocol address (`<user>@<server>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Jid(String);

impl Jid {
    /// Wrap an already-formatted address without normalisation.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Normalise caller input into a full address.
    ///
    /// Input that already carries a server part is kept verbatim. Otherwise
    /// every non-digit is stripped (except `-` for legacy group ids) and the
    /// server suffix for `kind` is appended.
    pub fn format(raw: &str, kind: AddressKind) -> Self {
        let trimmed = raw.trim();
        if trimmed.contains('@') {
            return Self(trimmed.to_string());
        }
        let user: String = trimmed
            .chars()
            .filter(|c| c.is_ascii_digit() || (kind == AddressKind::Group && *c == '-'))
            .collect();
        Self(format!("{user}@{}", kind.server()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before `@`.
    pub fn user(&self) -> &str {
        self.0.split_once('@').map_or(self.0.as_str(), |(u, _)| u)
    }

    pub fn is_group(&self) -> bool {
        self.0.ends_with(GROUP_SERVER)
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Jid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Presence states a session can announce to a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Available,
    Unavailable,
    Composing,
    Recording,
    Paused,
}
