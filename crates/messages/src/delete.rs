use {
    courier_session::{Jid, SessionCapability},
    serde_json::{Value, json},
    tracing::info,
};

use crate::{Error, Result, request::DeleteRequest};

async fn checked_destination(
    session: &dyn SessionCapability,
    request: &DeleteRequest,
) -> Result<Jid> {
    let exists = session
        .address_exists(&request.jid, request.kind)
        .await
        .map_err(|e| Error::transport("check address", e))?;
    if !exists {
        return Err(Error::invalid_destination(&request.jid));
    }
    Ok(Jid::format(&request.jid, request.kind))
}

/// Revoke a message for everyone in the conversation.
pub async fn delete_for_everyone(
    session_id: &str,
    session: &dyn SessionCapability,
    request: &DeleteRequest,
) -> Result<Value> {
    let jid = checked_destination(session, request).await?;
    let result = session
        .send_message(
            jid.as_str(),
            &json!({ "delete": request.message }),
            &Default::default(),
        )
        .await
        .map_err(|e| Error::transport("delete message", e))?;
    info!(session_id, jid = %jid, "message deleted for everyone");
    Ok(result)
}

/// Remove a message from this account's view of the conversation only.
pub async fn delete_for_me(
    session_id: &str,
    session: &dyn SessionCapability,
    request: &DeleteRequest,
) -> Result<Value> {
    let jid = checked_destination(session, request).await?;
    let result = session
        .modify_conversation(
            &json!({ "clear": { "messages": [request.message] } }),
            jid.as_str(),
        )
        .await
        .map_err(|e| Error::transport("clear message", e))?;
    info!(session_id, jid = %jid, "message deleted for me");
    Ok(result)
}
