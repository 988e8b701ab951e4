use std::sync::Arc;

use {
    courier_session::{EventSink, Jid, LifecycleEvent, Presence, SessionCapability, topics},
    serde_json::{Value, json},
    tracing::{error, info, warn},
};

use crate::{
    Error, Result, SEND_FAILED,
    quote::QuoteResolver,
    request::SendRequest,
};

/// Mark the session available toward `jid` before sending.
///
/// Best effort: a failure here is logged and the send goes ahead.
pub(crate) async fn announce_available(
    session: &dyn SessionCapability,
    session_id: &str,
    jid: &str,
) {
    if let Err(e) = session.set_presence(Presence::Available, jid).await {
        warn!(session_id, jid, error = %e, "failed to update presence");
    }
}

/// Sends one message and reports the outcome as a `send.message` event.
#[derive(Clone)]
pub struct Dispatcher {
    quotes: QuoteResolver,
    events: Arc<dyn EventSink>,
}

impl Dispatcher {
    pub fn new(quotes: QuoteResolver, events: Arc<dyn EventSink>) -> Self {
        Self { quotes, events }
    }

    /// Validate, optionally quote, then send `request` through `session`.
    ///
    /// Every outcome publishes exactly one `send.message` event: the
    /// destination and protocol result on success, an error event otherwise.
    pub async fn send(
        &self,
        session_id: &str,
        session: &dyn SessionCapability,
        request: &SendRequest,
    ) -> Result<Value> {
        match self.try_send(session_id, session, request).await {
            Ok((jid, result)) => {
                info!(session_id, jid = %jid, "message sent");
                self.events
                    .publish(LifecycleEvent::success(
                        topics::SEND_MESSAGE,
                        session_id,
                        json!({ "jid": jid, "result": result }),
                    ))
                    .await;
                Ok(result)
            },
            Err(e) => {
                error!(session_id, jid = %request.jid, error = %e, "message send failed");
                self.events
                    .publish(LifecycleEvent::error(
                        topics::SEND_MESSAGE,
                        session_id,
                        format!("{SEND_FAILED}: {e}"),
                    ))
                    .await;
                Err(e)
            },
        }
    }

    async fn try_send(
        &self,
        session_id: &str,
        session: &dyn SessionCapability,
        request: &SendRequest,
    ) -> Result<(Jid, Value)> {
        let jid = session
            .validate_address(&request.jid, request.kind)
            .await
            .map_err(|e| Error::transport("validate address", e))?
            .ok_or_else(|| Error::invalid_destination(&request.jid))?;

        let options = match &request.quoted {
            Some(quote) => self
                .quotes
                .resolve(session_id, quote, jid.as_str())
                .await?
                .ok_or_else(|| Error::QuoteNotFound {
                    message_id: quote.id.clone(),
                })?
                .apply(request.options.as_ref()),
            None => request.options.clone().unwrap_or_default(),
        };

        announce_available(session, session_id, jid.as_str()).await;

        let result = session
            .send_message(jid.as_str(), &request.message, &options)
            .await
            .map_err(|e| Error::transport("send message", e))?;
        Ok((jid, result))
    }
}
