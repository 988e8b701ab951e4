use {
    courier_session::AddressKind,
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

/// Reference to a stored message to attach as reply context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteReference {
    /// Message id of the quoted message.
    pub id: String,
    /// Conversation holding the quoted message; defaults to the destination.
    #[serde(default, alias = "conversationId", skip_serializing_if = "Option::is_none")]
    pub remote_jid: Option<String>,
}

/// One outbound message to one destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(alias = "destination")]
    pub jid: String,
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: AddressKind,
    /// Opaque protocol content, forwarded untouched.
    #[serde(alias = "content")]
    pub message: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
    #[serde(default, alias = "quote", skip_serializing_if = "Option::is_none")]
    pub quoted: Option<QuoteReference>,
}

impl SendRequest {
    pub fn new(jid: impl Into<String>, message: Value) -> Self {
        Self {
            jid: jid.into(),
            kind: AddressKind::default(),
            message,
            options: None,
            quoted: None,
        }
    }

    pub fn with_kind(mut self, kind: AddressKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_quote(mut self, quote: QuoteReference) -> Self {
        self.quoted = Some(quote);
        self
    }
}

/// One job of a bulk send: a send request plus its pacing delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkItem {
    #[serde(flatten)]
    pub send: SendRequest,
    /// Pause before this job, in milliseconds. Ignored for the first job.
    #[serde(default, alias = "delayMs", skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
}

impl BulkItem {
    pub fn new(send: SendRequest) -> Self {
        Self { send, delay: None }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay = Some(delay_ms);
        self
    }
}

/// Target of a delete or delete-for-me request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    #[serde(alias = "destination")]
    pub jid: String,
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: AddressKind,
    /// Protocol key of the message to delete.
    pub message: Value,
}
