use std::{sync::Arc, time::Duration};

use {
    courier_session::{EventSink, Jid, LifecycleEvent, SessionCapability, topics},
    serde::Serialize,
    serde_json::{Value, json},
    tracing::{debug, error, info, warn},
};

use crate::{
    Error, JID_NOT_FOUND, Result, SEND_FAILED,
    dispatch::announce_available,
    quote::QuoteResolver,
    request::BulkItem,
};

/// Pause before each bulk job after the first, unless the job sets its own.
pub const DEFAULT_BULK_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkSuccess {
    pub index: usize,
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkFailure {
    pub index: usize,
    pub error: String,
}

/// Per-job outcomes of a bulk send, each list in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkOutcome {
    pub results: Vec<BulkSuccess>,
    pub errors: Vec<BulkFailure>,
}

impl BulkOutcome {
    /// True when at least one job ran and none succeeded.
    pub fn is_total_failure(&self) -> bool {
        self.results.is_empty() && !self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len() + self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum JobStatus {
    Sent { jid: Jid, result: Value },
    UnknownDestination,
}

/// Runs a list of sends one at a time, pacing them with per-job delays.
#[derive(Clone)]
pub struct BulkDispatcher {
    quotes: QuoteResolver,
    events: Arc<dyn EventSink>,
    default_delay: Duration,
}

impl BulkDispatcher {
    pub fn new(quotes: QuoteResolver, events: Arc<dyn EventSink>) -> Self {
        Self {
            quotes,
            events,
            default_delay: DEFAULT_BULK_DELAY,
        }
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Send every item in order. A job never starts before the previous one
    /// has finished, and no job failure stops the run.
    ///
    /// A job whose destination does not exist is recorded and skipped
    /// without consuming its delay. A quote missing from history is dropped
    /// and the message goes out unquoted.
    ///
    /// Dropping the future stops the run after the current job; messages
    /// already sent are not recalled, so a retried request may deliver twice.
    pub async fn send_bulk(
        &self,
        session_id: &str,
        session: &dyn SessionCapability,
        items: &[BulkItem],
    ) -> BulkOutcome {
        info!(session_id, jobs = items.len(), "starting bulk send");
        let mut outcome = BulkOutcome::default();

        for (index, item) in items.iter().enumerate() {
            match self.run_job(session_id, session, index, item).await {
                Ok(JobStatus::Sent { jid, result }) => {
                    debug!(session_id, index, jid = %jid, "bulk job sent");
                    self.events
                        .publish(LifecycleEvent::success(
                            topics::SEND_MESSAGE,
                            session_id,
                            json!({ "jid": jid, "result": result }),
                        ))
                        .await;
                    outcome.results.push(BulkSuccess { index, result });
                },
                Ok(JobStatus::UnknownDestination) => {
                    warn!(session_id, index, jid = %item.send.jid, "bulk job destination does not exist");
                    outcome.errors.push(BulkFailure {
                        index,
                        error: JID_NOT_FOUND.to_string(),
                    });
                },
                Err(e) => {
                    error!(session_id, index, jid = %item.send.jid, error = %e, "bulk job failed");
                    self.events
                        .publish(LifecycleEvent::error(
                            topics::SEND_MESSAGE,
                            session_id,
                            format!("{SEND_FAILED}: {e}"),
                        ))
                        .await;
                    outcome.errors.push(BulkFailure {
                        index,
                        error: SEND_FAILED.to_string(),
                    });
                },
            }
        }

        info!(
            session_id,
            sent = outcome.results.len(),
            failed = outcome.errors.len(),
            "bulk send finished"
        );
        outcome
    }

    async fn run_job(
        &self,
        session_id: &str,
        session: &dyn SessionCapability,
        index: usize,
        item: &BulkItem,
    ) -> Result<JobStatus> {
        let send = &item.send;
        let exists = session
            .address_exists(&send.jid, send.kind)
            .await
            .map_err(|e| Error::transport("check address", e))?;
        if !exists {
            return Ok(JobStatus::UnknownDestination);
        }

        if index > 0 {
            let delay = item
                .delay
                .map_or(self.default_delay, Duration::from_millis);
            tokio::time::sleep(delay).await;
        }

        let jid = Jid::format(&send.jid, send.kind);
        let options = match &send.quoted {
            Some(quote) => match self.quotes.resolve(session_id, quote, jid.as_str()).await? {
                Some(resolved) => resolved.apply(send.options.as_ref()),
                None => {
                    debug!(session_id, index, quote_id = %quote.id, "sending without missing quote");
                    send.options.clone().unwrap_or_default()
                },
            },
            None => send.options.clone().unwrap_or_default(),
        };

        announce_available(session, session_id, jid.as_str()).await;

        let result = session
            .send_message(jid.as_str(), &send.message, &options)
            .await
            .map_err(|e| Error::transport("send message", e))?;
        Ok(JobStatus::Sent { jid, result })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            request::{QuoteReference, SendRequest},
            testing::{MockSession, RecordingSink, stored},
        },
        courier_store::{InMemoryMessageStore, MessageStore},
        tokio::time::Instant,
    };

    fn dispatcher() -> (BulkDispatcher, Arc<RecordingSink>, Arc<InMemoryMessageStore>) {
        let store = Arc::new(InMemoryMessageStore::new());
        let events = Arc::new(RecordingSink::default());
        (
            BulkDispatcher::new(QuoteResolver::new(store.clone()), events.clone()),
            events,
            store,
        )
    }

    fn item(jid: &str, text: &str) -> BulkItem {
        BulkItem::new(SendRequest::new(jid, json!({ "text": text })))
    }

    #[tokio::test(start_paused = true)]
    async fn jobs_run_in_order_with_default_pacing() {
        let (bulk, events, _) = dispatcher();
        let session = MockSession::with_known(&["111", "222", "333"]);
        let items = vec![item("111", "a"), item("222", "b"), item("333", "c")];

        let start = Instant::now();
        let outcome = bulk.send_bulk("s1", &session, &items).await;

        assert_eq!(outcome.results.len(), 3);
        assert!(outcome.errors.is_empty());
        assert_eq!(
            outcome.results.iter().map(|r| r.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        let sends = session.sends();
        let order: Vec<_> = sends.iter().map(|s| s.0.as_str()).collect();
        assert_eq!(
            order,
            vec!["111@s.whatsapp.net", "222@s.whatsapp.net", "333@s.whatsapp.net"]
        );
        assert_eq!(sends[0].3.duration_since(start), Duration::ZERO);
        assert!(sends[1].3.duration_since(sends[0].3) >= DEFAULT_BULK_DELAY);
        assert!(sends[2].3.duration_since(sends[1].3) >= DEFAULT_BULK_DELAY);

        assert_eq!(events.events().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn per_job_delay_overrides_default() {
        let (bulk, ..) = dispatcher();
        let session = MockSession::with_known(&["111", "222"]);
        let items = vec![
            item("111", "a").with_delay(60_000),
            item("222", "b").with_delay(250),
        ];

        bulk.send_bulk("s1", &session, &items).await;
        let sends = session.sends();
        let gap = sends[1].3.duration_since(sends[0].3);
        assert!(gap >= Duration::from_millis(250));
        assert!(gap < DEFAULT_BULK_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_destination_is_recorded_and_skipped() {
        let (bulk, events, _) = dispatcher();
        let session = MockSession::with_known(&["111", "333"]);
        let items = vec![item("111", "a"), item("222", "b"), item("333", "c")];

        let start = Instant::now();
        let outcome = bulk.send_bulk("s1", &session, &items).await;

        assert_eq!(
            outcome.errors,
            vec![BulkFailure {
                index: 1,
                error: JID_NOT_FOUND.into()
            }]
        );
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[1].index, 2);

        // only the surviving job after the first waits
        let sends = session.sends();
        assert_eq!(sends.len(), 2);
        let waited = sends[1].3.duration_since(start);
        assert!(waited >= DEFAULT_BULK_DELAY);
        assert!(waited < DEFAULT_BULK_DELAY * 2);

        assert!(events.events().iter().all(|e| !e.is_error()));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_send_does_not_stop_the_run() {
        let (bulk, events, _) = dispatcher();
        let session = MockSession::with_known(&["111", "222", "333"]).failing_send("222");
        let items = vec![item("111", "a"), item("222", "b"), item("333", "c")];

        let outcome = bulk.send_bulk("s1", &session, &items).await;
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(
            outcome.errors,
            vec![BulkFailure {
                index: 1,
                error: SEND_FAILED.into()
            }]
        );
        assert!(!outcome.is_total_failure());

        let events = events.events();
        assert_eq!(events.len(), 3);
        assert!(events[1].is_error());
        assert!(events[1].message.as_deref().unwrap().contains("send rejected"));
    }

    #[tokio::test(start_paused = true)]
    async fn check_failure_counts_as_job_failure() {
        let (bulk, ..) = dispatcher();
        let session = MockSession::with_known(&["111"]).failing_check("111");

        let outcome = bulk.send_bulk("s1", &session, &[item("111", "a")]).await;
        assert_eq!(outcome.errors[0].error, SEND_FAILED);
        assert!(outcome.is_total_failure());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_quote_sends_unquoted() {
        let (bulk, _, store) = dispatcher();
        store
            .upsert(stored("s1", "111@s.whatsapp.net", "Q1"))
            .await
            .unwrap();
        let session = MockSession::with_known(&["111"]);

        let mut quoted = item("111", "a");
        quoted.send.quoted = Some(QuoteReference {
            id: "Q1".into(),
            remote_jid: None,
        });
        let mut dangling = item("111", "b");
        dangling.send.quoted = Some(QuoteReference {
            id: "gone".into(),
            remote_jid: None,
        });

        let outcome = bulk.send_bulk("s1", &session, &[quoted, dangling]).await;
        assert_eq!(outcome.results.len(), 2);

        let sends = session.sends();
        assert_eq!(sends[0].2["quoted"]["key"]["id"], "Q1");
        assert!(!sends[1].2.contains_key("quoted"));
    }

    #[tokio::test(start_paused = true)]
    async fn total_failure_needs_non_empty_input() {
        let (bulk, ..) = dispatcher();
        let session = MockSession::with_known(&[]);

        let empty = bulk.send_bulk("s1", &session, &[]).await;
        assert!(empty.is_empty());
        assert!(!empty.is_total_failure());

        let all_bad = bulk
            .send_bulk(
                "s1",
                &session,
                &[item("111", "a"), item("222", "b"), item("333", "c")],
            )
            .await;
        assert!(all_bad.results.is_empty());
        assert_eq!(all_bad.errors.len(), 3);
        let indexes: Vec<usize> = all_bad.errors.iter().map(|e| e.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert!(all_bad.is_total_failure());
    }

    #[tokio::test(start_paused = true)]
    async fn configured_default_delay_applies() {
        let (bulk, ..) = dispatcher();
        let bulk = bulk.with_default_delay(Duration::from_millis(10));
        let session = MockSession::with_known(&["111", "222"]);

        bulk.send_bulk("s1", &session, &[item("111", "a"), item("222", "b")])
            .await;
        let sends = session.sends();
        let gap = sends[1].3.duration_since(sends[0].3);
        assert!(gap >= Duration::from_millis(10));
        assert!(gap < DEFAULT_BULK_DELAY);
    }
}
