//! Outbound message dispatch pipeline.
//!
//! Request flow: session lookup → destination validation → optional quote
//! resolution against stored history → presence → send → lifecycle event.
//! Bulk sends run the same steps job by job, strictly in input order, with a
//! pause before every job but the first.

pub mod bulk;
pub mod delete;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod media;
pub mod quote;
pub mod request;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use {
    bulk::{BulkDispatcher, BulkFailure, BulkOutcome, BulkSuccess, DEFAULT_BULK_DELAY},
    dispatch::Dispatcher,
    error::{Error, JID_NOT_FOUND, Result, SEND_FAILED},
    history::{DEFAULT_PAGE_SIZE, MessagePage},
    media::{DownloadedMedia, MediaRetriever},
    quote::{QuoteResolver, ResolvedQuote},
    request::{BulkItem, DeleteRequest, QuoteReference, SendRequest},
    service::{DispatchSettings, MessageService},
};
