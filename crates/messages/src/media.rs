use {
    bytes::Bytes,
    courier_session::{MediaKind, MediaMessage, MessageEnvelope, SessionCapability},
    tracing::{debug, info, warn},
};

use crate::{Error, Result};

/// Decrypted media bytes and the content type to serve them with.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedMedia {
    pub bytes: Bytes,
    pub mime_type: String,
    pub kind: MediaKind,
}

/// Downloads the media attachment of a received message.
#[derive(Debug, Default, Clone, Copy)]
pub struct MediaRetriever;

impl MediaRetriever {
    /// Fetch the media carried by `envelope`.
    ///
    /// When the protocol reports the media as expired, one re-upload is
    /// requested from the sender and the fetch retried once.
    pub async fn download(
        &self,
        session_id: &str,
        session: &dyn SessionCapability,
        envelope: &MessageEnvelope,
    ) -> Result<DownloadedMedia> {
        let media = MediaMessage::from_envelope(envelope).map_err(Error::media_decode)?;
        debug!(session_id, kind = ?media.kind(), "downloading media");

        let bytes = match session.fetch_media(&media).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_media_expired() => {
                info!(session_id, "media expired, requesting re-upload");
                let refreshed = session
                    .request_media_reupload(envelope)
                    .await
                    .map_err(|e| {
                        warn!(session_id, error = %e, "media re-upload request failed");
                        Error::media_decode(e)
                    })?;
                let media = MediaMessage::from_envelope(&refreshed).map_err(Error::media_decode)?;
                session.fetch_media(&media).await.map_err(|e| {
                    warn!(session_id, error = %e, "media still unavailable after re-upload");
                    if e.is_media_expired() {
                        Error::media_decode(e)
                    } else {
                        Error::transport("fetch media", e)
                    }
                })?
            },
            Err(e) => return Err(Error::transport("fetch media", e)),
        };

        Ok(DownloadedMedia {
            bytes,
            mime_type: media.mime_type().to_string(),
            kind: media.kind(),
        })
    }
}
