//! The push pipeline: queued local mutations, coalescing, precondition-guarded
//! uploads and conflict resolution.
//!
//! Local edits never hit the server directly. They are appended to a durable
//! [`PendingStore`] — coalesced on enqueue so the store holds at most one live
//! operation per uid — and flushed serially by [`PushPipeline::push`]. A `412`
//! from the server parks the operation in the conflict queue until the host
//! picks a [`ConflictStrategy`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::client::CalDavClient;
use crate::error::{DavError, DavResult};
use crate::event::Event;
use crate::resource::{Etag, EventWithMetadata};
use crate::traits::PendingStore;

/// How many failed attempts an operation gets before it is dropped as terminal
pub const DEFAULT_MAX_PUSH_RETRIES: u32 = 3;

/// A local mutation awaiting its push to the server
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Create {
        calendar_url: Url,
        event: Event,
    },
    Update {
        event: Event,
        href: String,
        /// The version this edit was based on; the PUT asserts it with `If-Match`
        base_etag: Option<Etag>,
    },
    Delete {
        uid: String,
        href: String,
        base_etag: Option<Etag>,
    },
}

impl Operation {
    pub fn uid(&self) -> &str {
        match self {
            Operation::Create { event, .. } => event.uid(),
            Operation::Update { event, .. } => event.uid(),
            Operation::Delete { uid, .. } => uid,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Operation::Create { .. } => "create",
            Operation::Update { .. } => "update",
            Operation::Delete { .. } => "delete",
        }
    }
}

/// An [`Operation`] as the store holds it, with its bookkeeping
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Monotonic sequence number; also the queue order
    pub id: u64,
    pub op: Operation,
    pub retries: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What replacing a prior pending operation with a newer one yields
#[derive(Clone, Debug, PartialEq)]
pub enum CoalesceOutcome {
    /// Both operations cancel out (a created-then-deleted event never existed
    /// as far as the server is concerned)
    DropBoth,
    /// The prior operation is replaced in place, keeping its queue position
    Replace(Operation),
}

/// Collapse two operations on the same uid into their minimal equivalent
pub fn coalesce(prior: &Operation, new: Operation) -> CoalesceOutcome {
    use CoalesceOutcome::{DropBoth, Replace};
    use Operation::{Create, Delete, Update};

    match (prior, new) {
        // the server never saw the event; newer content folds into the create
        (Create { calendar_url, .. }, Update { event, .. })
        | (Create { calendar_url, .. }, Create { event, .. }) => Replace(Create {
            calendar_url: calendar_url.clone(),
            event,
        }),
        (Create { .. }, Delete { .. }) => DropBoth,

        (Update { href, base_etag, .. }, Update { event, .. })
        | (Update { href, base_etag, .. }, Create { event, .. }) => Replace(Update {
            event,
            href: href.clone(),
            base_etag: base_etag.clone(),
        }),
        (Update { href, base_etag, .. }, Delete { uid, .. }) => Replace(Delete {
            uid,
            href: href.clone(),
            base_etag: base_etag.clone(),
        }),

        // a delete followed by a create is an update of the still-existing
        // resource, keeping its href
        (Delete { href, base_etag, .. }, Create { event, .. })
        | (Delete { href, base_etag, .. }, Update { event, .. }) => Replace(Update {
            event,
            href: href.clone(),
            base_etag: base_etag.clone(),
        }),
        (Delete { .. }, new @ Delete { .. }) => Replace(new),
    }
}

/// How the host wants a parked conflict settled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictStrategy {
    /// Drop the local operation; the server copy is handed back for adoption
    ServerWins,
    /// Re-read the server ETag and replay the local operation against it
    LocalWins,
    /// Whichever copy has the later revision stamp wins; ties go to the server
    NewestWins,
    /// A host-supplied merger combines both copies; the result is replayed
    Manual,
}

/// The outcome of a conflict resolution
#[derive(Clone, Debug)]
pub enum ConflictResolution {
    /// The local operation was dropped. When the resource still exists, the
    /// current server copy is included so the host can adopt it
    ServerKept(Option<EventWithMetadata>),
    /// The local operation (possibly merged) was replayed and accepted
    Replayed(PushedChange),
}

/// One successfully pushed change, for the host to record
#[derive(Clone, Debug, PartialEq)]
pub struct PushedChange {
    pub uid: String,
    pub href: String,
    /// The ETag of the new server version; absent when the server did not
    /// provide one (or the change was a deletion)
    pub etag: Option<Etag>,
    pub deleted: bool,
}

/// What one [`PushPipeline::push`] run did
#[derive(Clone, Debug, Default)]
pub struct PushReport {
    pub pushed: usize,
    /// Failed this run but kept for a later retry
    pub failed: usize,
    /// Dropped after exhausting their retry budget
    pub dropped: usize,
    /// Parked (or already parked) waiting for conflict resolution
    pub conflicts: usize,
    /// Operations still in the store after this run
    pub remaining: usize,
    pub completed: Vec<PushedChange>,
}

/// Flushes pending local operations to the server, in queue order
pub struct PushPipeline<S: PendingStore> {
    client: CalDavClient,
    store: S,
    /// Ids of operations parked after a 412. They stay in the durable store;
    /// only the parking is in-memory (a restart re-discovers the conflict on
    /// the next push)
    conflicts: Vec<u64>,
    max_retries: u32,
}

impl<S: PendingStore> PushPipeline<S> {
    pub fn new(client: CalDavClient, store: S) -> Self {
        Self {
            client,
            store,
            conflicts: Vec::new(),
            max_retries: DEFAULT_MAX_PUSH_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The operations currently parked on a conflict
    pub async fn conflicts(&self) -> DavResult<Vec<PendingOperation>> {
        let pending = self.store.list().await?;
        Ok(pending.into_iter().filter(|op| self.conflicts.contains(&op.id)).collect())
    }

    /// Queue the creation of an event
    pub async fn queue_create(&mut self, calendar_url: Url, event: Event) -> DavResult<()> {
        self.enqueue(Operation::Create { calendar_url, event }).await
    }

    /// Queue a modification of an event the server already has
    pub async fn queue_update(
        &mut self,
        event: Event,
        href: String,
        base_etag: Option<Etag>,
    ) -> DavResult<()> {
        self.enqueue(Operation::Update { event, href, base_etag }).await
    }

    /// Queue the deletion of an event
    pub async fn queue_delete(
        &mut self,
        uid: String,
        href: String,
        base_etag: Option<Etag>,
    ) -> DavResult<()> {
        self.enqueue(Operation::Delete { uid, href, base_etag }).await
    }

    /// Coalesce-then-persist. The store never holds two live operations for
    /// the same uid
    async fn enqueue(&mut self, new_op: Operation) -> DavResult<()> {
        let pending = self.store.list().await?;
        let prior = pending
            .iter()
            .find(|pending_op| !self.conflicts.contains(&pending_op.id) && pending_op.op.uid() == new_op.uid());

        match prior {
            None => {
                self.store.append(new_op).await?;
            }
            Some(prior_op) => match coalesce(&prior_op.op, new_op) {
                CoalesceOutcome::DropBoth => {
                    log::debug!(
                        "Pending {} of {} cancelled out by the newer operation",
                        prior_op.op.kind(),
                        prior_op.op.uid()
                    );
                    self.store.discard(prior_op.id).await?;
                }
                CoalesceOutcome::Replace(merged) => {
                    self.store.replace(prior_op.id, merged).await?;
                }
            },
        }
        Ok(())
    }

    /// Flush the queue, serially and in order. Conflicts are parked, transient
    /// failures stay queued until their retry budget runs out
    pub async fn push(&mut self) -> DavResult<PushReport> {
        let pending = self.store.list().await?;
        let mut report = PushReport::default();

        for pending_op in pending {
            if self.conflicts.contains(&pending_op.id) {
                report.conflicts += 1;
                continue;
            }

            match self.execute(&pending_op.op).await {
                Ok(change) => {
                    self.store.remove(pending_op.id).await?;
                    report.pushed += 1;
                    report.completed.push(change);
                }
                Err(err) if err.is_conflict() => {
                    log::info!(
                        "Conflict pushing {} of {}: {}. Parking it for resolution.",
                        pending_op.op.kind(),
                        pending_op.op.uid(),
                        err
                    );
                    self.store.record_failure(pending_op.id, &err.to_string()).await?;
                    self.conflicts.push(pending_op.id);
                    report.conflicts += 1;
                }
                Err(err) => {
                    log::warn!(
                        "Unable to push {} of {}: {}",
                        pending_op.op.kind(),
                        pending_op.op.uid(),
                        err
                    );
                    self.store.record_failure(pending_op.id, &err.to_string()).await?;
                    if pending_op.retries + 1 >= self.max_retries {
                        log::error!(
                            "Dropping {} of {} after {} failed attempts",
                            pending_op.op.kind(),
                            pending_op.op.uid(),
                            pending_op.retries + 1
                        );
                        self.store.discard(pending_op.id).await?;
                        report.dropped += 1;
                    } else {
                        report.failed += 1;
                    }
                }
            }
        }

        report.remaining = self.store.list().await?.len();
        Ok(report)
    }

    async fn execute(&self, op: &Operation) -> DavResult<PushedChange> {
        match op {
            Operation::Create { calendar_url, event } => {
                let (href, etag) = self.client.create_event(calendar_url, event).await?;
                self.confirm_after_write(&href).await;
                Ok(PushedChange { uid: event.uid().to_string(), href, etag, deleted: false })
            }
            Operation::Update { event, href, base_etag } => {
                let etag = self.client.update_event(href, event, base_etag.as_ref()).await?;
                self.confirm_after_write(href).await;
                Ok(PushedChange {
                    uid: event.uid().to_string(),
                    href: href.clone(),
                    etag,
                    deleted: false,
                })
            }
            Operation::Delete { uid, href, base_etag } => {
                self.client.delete_event(href, base_etag.as_ref()).await?;
                Ok(PushedChange { uid: uid.clone(), href: href.clone(), etag: None, deleted: true })
            }
        }
    }

    /// Post-write visibility check on eventually-consistent providers.
    /// Invisibility is logged, never an error
    async fn confirm_after_write(&self, href: &str) {
        if self.client.quirks().post_write_read_retries == 0 {
            return;
        }
        match self.client.confirm_visibility(href).await {
            Ok(true) => {}
            Ok(false) => log::info!("Write to {} not visible yet, relying on the next sync", href),
            Err(err) => log::debug!("Unable to confirm visibility of {}: {}", href, err),
        }
    }

    /// Settle a parked conflict.
    ///
    /// `merger` is only consulted by [`ConflictStrategy::Manual`]; it receives
    /// `(local, server)` and returns the event to replay.
    pub async fn resolve_conflict(
        &mut self,
        op_id: u64,
        strategy: ConflictStrategy,
        merger: Option<&(dyn Fn(&Event, &Event) -> Event + Send + Sync)>,
    ) -> DavResult<ConflictResolution> {
        let pending_op = self
            .store
            .list()
            .await?
            .into_iter()
            .find(|pending_op| pending_op.id == op_id)
            .ok_or_else(|| DavError::argument(format!("no pending operation with id {}", op_id)))?;

        let href = self.href_of(&pending_op.op)?;
        let server_copy = self.fetch_server_copy(&href).await?;
        let fresh_etag = match &server_copy {
            Some(server) => server.etag.clone(),
            None => self.client.get_event_etag(&href).await?,
        };

        let keep_local = match strategy {
            ConflictStrategy::ServerWins => false,
            ConflictStrategy::LocalWins => true,
            ConflictStrategy::NewestWins => {
                let local_stamp = match &pending_op.op {
                    Operation::Create { event, .. } | Operation::Update { event, .. } => {
                        event.revision_stamp()
                    }
                    // a deletion has no event left to stamp; its queue time stands in
                    Operation::Delete { .. } => pending_op.created_at,
                };
                match &server_copy {
                    // strictly later wins; a tie goes to the server, deterministically
                    Some(server) => local_stamp > server.event.revision_stamp(),
                    None => true,
                }
            }
            ConflictStrategy::Manual => true,
        };

        if !keep_local {
            self.store.discard(op_id).await?;
            self.unpark(op_id);
            return Ok(ConflictResolution::ServerKept(server_copy));
        }

        let change = match &pending_op.op {
            Operation::Delete { uid, .. } => {
                if strategy == ConflictStrategy::Manual {
                    return Err(DavError::argument("a deletion cannot be merged manually"));
                }
                self.client.delete_event(&href, fresh_etag.as_ref()).await?;
                PushedChange { uid: uid.clone(), href: href.clone(), etag: None, deleted: true }
            }
            Operation::Create { event, .. } | Operation::Update { event, .. } => {
                let to_replay = match strategy {
                    ConflictStrategy::Manual => {
                        let merger = merger.ok_or_else(|| {
                            DavError::argument("the Manual strategy needs a merger")
                        })?;
                        let server = server_copy.as_ref().ok_or_else(|| {
                            DavError::argument("the server copy vanished; nothing to merge against")
                        })?;
                        merger(event, &server.event)
                    }
                    _ => event.clone(),
                };
                // the conflicting resource exists, so even a parked create
                // replays as a plain overwrite of that version
                let etag = self.client.update_event(&href, &to_replay, fresh_etag.as_ref()).await?;
                self.confirm_after_write(&href).await;
                PushedChange {
                    uid: to_replay.uid().to_string(),
                    href: href.clone(),
                    etag,
                    deleted: false,
                }
            }
        };

        self.store.remove(op_id).await?;
        self.unpark(op_id);
        Ok(ConflictResolution::Replayed(change))
    }

    fn unpark(&mut self, op_id: u64) {
        self.conflicts.retain(|id| *id != op_id);
    }

    fn href_of(&self, op: &Operation) -> DavResult<String> {
        match op {
            Operation::Update { href, .. } | Operation::Delete { href, .. } => Ok(href.clone()),
            // a create conflicts when the target href is already taken
            Operation::Create { calendar_url, event } => Ok(self
                .client
                .build_event_url(calendar_url, event.uid())?
                .path()
                .to_string()),
        }
    }

    async fn fetch_server_copy(&self, href: &str) -> DavResult<Option<EventWithMetadata>> {
        let collection = collection_of(href);
        let collection_url = self.client.resolve_href(&collection)?;
        let events = self.client.fetch_events_by_href(&collection_url, &[href.to_string()]).await?;
        Ok(events.into_iter().next())
    }
}

/// The collection path an event href lives in (everything up to the last `/`)
fn collection_of(href: &str) -> String {
    match href.rfind('/') {
        Some(index) => href[..=index].to_string(),
        None => "/".to_string(),
    }
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct PendingData {
    next_id: u64,
    ops: Vec<PendingOperation>,
}

impl PendingData {
    fn append(&mut self, op: Operation) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.ops.push(PendingOperation {
            id,
            op,
            retries: 0,
            last_error: None,
            created_at: Utc::now(),
        });
        id
    }

    fn position(&self, op_id: u64) -> DavResult<usize> {
        self.ops
            .iter()
            .position(|pending_op| pending_op.id == op_id)
            .ok_or_else(|| DavError::argument(format!("no pending operation with id {}", op_id)))
    }
}

/// A [`PendingStore`] that lives in memory. Useful for tests and for hosts
/// that do their own durable journaling elsewhere
#[derive(Default, Debug)]
pub struct MemoryPendingStore {
    data: PendingData,
}

impl MemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingStore for MemoryPendingStore {
    async fn append(&mut self, op: Operation) -> DavResult<u64> {
        Ok(self.data.append(op))
    }

    async fn list(&self) -> DavResult<Vec<PendingOperation>> {
        Ok(self.data.ops.clone())
    }

    async fn remove(&mut self, op_id: u64) -> DavResult<()> {
        let position = self.data.position(op_id)?;
        self.data.ops.remove(position);
        Ok(())
    }

    async fn replace(&mut self, op_id: u64, op: Operation) -> DavResult<()> {
        let position = self.data.position(op_id)?;
        self.data.ops[position].op = op;
        Ok(())
    }

    async fn discard(&mut self, op_id: u64) -> DavResult<()> {
        self.remove(op_id).await
    }

    async fn record_failure(&mut self, op_id: u64, error: &str) -> DavResult<()> {
        let position = self.data.position(op_id)?;
        let pending_op = &mut self.data.ops[position];
        pending_op.retries += 1;
        pending_op.last_error = Some(error.to_string());
        Ok(())
    }
}

/// A [`PendingStore`] that persists its queue in a JSON file, so queued local
/// mutations survive a restart
#[derive(Debug)]
pub struct FilePendingStore {
    backing_file: PathBuf,
    data: PendingData,
}

impl FilePendingStore {
    /// Initialize a store from the content of a valid backing file if it exists.
    /// Returns an error otherwise
    pub fn from_file(path: &Path) -> DavResult<Self> {
        let file = std::fs::File::open(path)
            .map_err(|err| DavError::argument(format!("unable to open file {:?}: {}", path, err)))?;
        let data = serde_json::from_reader(file)
            .map_err(|err| DavError::parse(format!("unable to read pending store {:?}: {}", path, err)))?;

        Ok(Self { backing_file: PathBuf::from(path), data })
    }

    /// Initialize an empty store backed by the given path
    pub fn new(path: &Path) -> Self {
        Self { backing_file: PathBuf::from(path), data: PendingData::default() }
    }

    fn save_to_file(&self) -> DavResult<()> {
        let file = std::fs::File::create(&self.backing_file).map_err(|err| {
            DavError::argument(format!("unable to save file {:?}: {}", self.backing_file, err))
        })?;
        serde_json::to_writer(file, &self.data)
            .map_err(|err| DavError::parse(format!("unable to serialize: {}", err)))
    }
}

#[async_trait]
impl PendingStore for FilePendingStore {
    async fn append(&mut self, op: Operation) -> DavResult<u64> {
        let id = self.data.append(op);
        self.save_to_file()?;
        Ok(id)
    }

    async fn list(&self) -> DavResult<Vec<PendingOperation>> {
        Ok(self.data.ops.clone())
    }

    async fn remove(&mut self, op_id: u64) -> DavResult<()> {
        let position = self.data.position(op_id)?;
        self.data.ops.remove(position);
        self.save_to_file()
    }

    async fn replace(&mut self, op_id: u64, op: Operation) -> DavResult<()> {
        let position = self.data.position(op_id)?;
        self.data.ops[position].op = op;
        self.save_to_file()
    }

    async fn discard(&mut self, op_id: u64) -> DavResult<()> {
        self.remove(op_id).await
    }

    async fn record_failure(&mut self, op_id: u64, error: &str) -> DavResult<()> {
        let position = self.data.position(op_id)?;
        let pending_op = &mut self.data.ops[position];
        pending_op.retries += 1;
        pending_op.last_error = Some(error.to_string());
        self.save_to_file()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::{EventEnd, EventTime};
    use chrono::TimeZone;

    fn event(uid: &str, summary: &str) -> Event {
        let dtstamp = Utc.with_ymd_and_hms(2023, 4, 1, 12, 0, 0).unwrap();
        let start = EventTime::Utc(Utc.with_ymd_and_hms(2023, 4, 5, 14, 0, 0).unwrap());
        let end = EventEnd::Duration("PT1H".into());
        Event::new(uid.into(), summary.into(), start, end, dtstamp).unwrap()
    }

    fn cal_url() -> Url {
        "https://caldav.example.org/cal/".parse().unwrap()
    }

    #[test]
    fn test_coalesce_create_then_update() {
        let prior = Operation::Create { calendar_url: cal_url(), event: event("u1", "one") };
        let newer = Operation::Update {
            event: event("u1", "two"),
            href: "/cal/u1.ics".into(),
            base_etag: None,
        };
        match coalesce(&prior, newer) {
            CoalesceOutcome::Replace(Operation::Create { event, .. }) => {
                assert_eq!(event.summary(), "two")
            }
            other => panic!("expected a collapsed create, got {:?}", other),
        }
    }

    #[test]
    fn test_coalesce_create_then_delete_cancels_out() {
        let prior = Operation::Create { calendar_url: cal_url(), event: event("u1", "one") };
        let newer = Operation::Delete { uid: "u1".into(), href: "/cal/u1.ics".into(), base_etag: None };
        assert_eq!(coalesce(&prior, newer), CoalesceOutcome::DropBoth);
    }

    #[test]
    fn test_coalesce_update_chains() {
        let etag = Some(Etag::from_wire("\"v1\""));
        let prior = Operation::Update {
            event: event("u1", "one"),
            href: "/cal/u1.ics".into(),
            base_etag: etag.clone(),
        };

        let newer = Operation::Update { event: event("u1", "two"), href: "/cal/u1.ics".into(), base_etag: None };
        match coalesce(&prior, newer) {
            CoalesceOutcome::Replace(Operation::Update { event, base_etag, .. }) => {
                assert_eq!(event.summary(), "two");
                // the base the first edit was made against still guards the PUT
                assert_eq!(base_etag, etag);
            }
            other => panic!("expected a collapsed update, got {:?}", other),
        }

        let delete = Operation::Delete { uid: "u1".into(), href: "/cal/u1.ics".into(), base_etag: None };
        match coalesce(&prior, delete) {
            CoalesceOutcome::Replace(Operation::Delete { base_etag, .. }) => {
                assert_eq!(base_etag, etag)
            }
            other => panic!("expected a delete, got {:?}", other),
        }
    }

    #[test]
    fn test_coalesce_delete_then_create_becomes_update() {
        let etag = Some(Etag::from_wire("\"v1\""));
        let prior = Operation::Delete {
            uid: "u1".into(),
            href: "/cal/u1.ics".into(),
            base_etag: etag.clone(),
        };
        let newer = Operation::Create { calendar_url: cal_url(), event: event("u1", "reborn") };
        match coalesce(&prior, newer) {
            CoalesceOutcome::Replace(Operation::Update { event, href, base_etag }) => {
                assert_eq!(event.summary(), "reborn");
                assert_eq!(href, "/cal/u1.ics");
                assert_eq!(base_etag, etag);
            }
            other => panic!("expected an update keeping the href, got {:?}", other),
        }
    }

    #[test]
    fn test_coalesce_is_idempotent() {
        // coalescing a chain, then coalescing the result again, changes nothing
        let prior = Operation::Create { calendar_url: cal_url(), event: event("u1", "one") };
        let newer = Operation::Update {
            event: event("u1", "two"),
            href: "/cal/u1.ics".into(),
            base_etag: None,
        };
        let first = match coalesce(&prior, newer.clone()) {
            CoalesceOutcome::Replace(op) => op,
            other => panic!("unexpected {:?}", other),
        };
        let second = match coalesce(&first, newer) {
            CoalesceOutcome::Replace(op) => op,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_memory_store_queue_order_and_bookkeeping() {
        let mut store = MemoryPendingStore::new();
        let id0 = store.append(Operation::Delete { uid: "a".into(), href: "/cal/a.ics".into(), base_etag: None }).await.unwrap();
        let id1 = store.append(Operation::Delete { uid: "b".into(), href: "/cal/b.ics".into(), base_etag: None }).await.unwrap();
        assert!(id0 < id1);

        store.record_failure(id0, "boom").await.unwrap();
        let ops = store.list().await.unwrap();
        assert_eq!(ops[0].retries, 1);
        assert_eq!(ops[0].last_error.as_deref(), Some("boom"));

        store.remove(id0).await.unwrap();
        let ops = store.list().await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].id, id1);
        assert!(store.remove(id0).await.is_err());
    }

    #[test]
    fn test_collection_of() {
        assert_eq!(collection_of("/cal/user/e1.ics"), "/cal/user/");
        assert_eq!(collection_of("naked"), "/");
    }
}
