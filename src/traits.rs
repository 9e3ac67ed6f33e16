//! The interfaces the host application implements
//!
//! The engine and the push pipeline never own persistence: the local event
//! store, the applied-change sink and the durable pending-operation log are
//! all behind these traits.

use async_trait::async_trait;
use url::Url;

use crate::error::DavResult;
use crate::event::Event;
use crate::push::{Operation, PendingOperation};
use crate::resource::Etag;

/// One locally known event, as the host stores it
#[derive(Clone, Debug, PartialEq)]
pub struct LocalEventEntry {
    pub uid: String,
    /// The ETag at which this copy was last synced, if it ever was
    pub etag: Option<Etag>,
    pub event: Event,
}

/// Read access to the host's local event store. Pure reads, no side effects
#[async_trait]
pub trait LocalEventProvider: Send + Sync {
    /// Every event the host currently stores for this calendar
    async fn get_local_events(&self, calendar_url: &Url) -> DavResult<Vec<LocalEventEntry>>;

    /// Reverse-resolve a server href to a uid, when the host tracks hrefs.
    /// The engine only asks when its own url map has no answer
    async fn find_uid_by_href(&self, _href: &str) -> Option<String> {
        None
    }
}

/// Where the engine delivers the changes a sync computed.
///
/// Every method must be idempotent: a crashed-and-redone sync will replay
/// changes the host may already have applied.
#[async_trait]
pub trait SyncResultHandler: Send {
    /// A server-side creation or modification. The server copy is authoritative;
    /// unsynced local edits are the push pipeline's business, not this callback's
    async fn upsert_event(&mut self, event: Event);

    /// The event vanished from the server
    async fn delete_event(&mut self, uid: &str);

    /// Remember the server version of an event the host now has
    async fn record_etag(&mut self, uid: &str, href: &str, etag: &Etag);
}

/// The durable queue of local mutations awaiting a push.
///
/// Implementations must survive process restarts; the pipeline coalesces
/// before appending, so the log stays a minimal representation of local intent.
#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Persist a new operation and return its id
    async fn append(&mut self, op: Operation) -> DavResult<u64>;

    /// All pending operations, in queue order
    async fn list(&self) -> DavResult<Vec<PendingOperation>>;

    /// Remove an operation that was pushed successfully
    async fn remove(&mut self, op_id: u64) -> DavResult<()>;

    /// Replace an operation in place (coalescing keeps the original id and
    /// thus the original queue position)
    async fn replace(&mut self, op_id: u64, op: Operation) -> DavResult<()>;

    /// Drop an operation without pushing it (coalesced away, or terminally failed)
    async fn discard(&mut self, op_id: u64) -> DavResult<()>;

    /// Record a failed attempt so retry accounting survives restarts
    async fn record_failure(&mut self, op_id: u64, error: &str) -> DavResult<()>;
}
