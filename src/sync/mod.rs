//! The incremental sync engine.
//!
//! One entry point, [`SyncEngine::sync_with_incremental`], drives a full or
//! incremental sync of one calendar as an explicit state machine:
//!
//! * no usable sync token (first sync, or a forced full sync) → full fetch;
//! * a prior token → RFC 6578 sync-collection report, falling back to a full
//!   fetch when the server declares the token expired (403/410);
//! * entries that came back as bare ETags → follow-up multiget;
//! * then diff, apply through the host's [`SyncResultHandler`], and finalize
//!   into a fresh [`SyncState`].
//!
//! The engine never mutates the previous state: it returns a new value inside
//! the [`SyncReport`], which the host persists atomically. Crash recovery is
//! then trivial: either the new state was persisted or the old one still holds,
//! and re-running the sync converges either way.

pub mod sync_progress;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::client::{CalDavClient, SyncResult};
use crate::resource::{Etag, EventWithMetadata, ResourceHref};
use crate::traits::{LocalEventProvider, SyncResultHandler};
use self::sync_progress::{FeedbackSender, SyncEvent, SyncProgress};

/// How many items will be batched in a single HTTP request when downloading from the server
#[cfg(not(test))]
const DOWNLOAD_BATCH_SIZE: usize = 30;
/// How many items will be batched in a single HTTP request when downloading from the server
#[cfg(test)]
const DOWNLOAD_BATCH_SIZE: usize = 3;

/// How many parse failures a resource gets before it is quarantined
pub const DEFAULT_MAX_PARSE_RETRIES: u32 = 3;

/// A host-controlled flag the engine polls after every suspension point.
/// Setting it makes the running sync return `cancelled = true` without
/// touching the previous state
pub type CancelFlag = Arc<AtomicBool>;

/// The persistent per-calendar sync cursor.
///
/// Created by the engine on the first successful sync and replaced wholesale
/// on each completed one; the host persists it verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub calendar_url: Url,
    pub ctag: Option<String>,
    pub sync_token: Option<String>,
    /// href → last seen ETag
    pub etags: HashMap<String, Etag>,
    /// uid → href
    pub url_map: HashMap<String, String>,
    pub last_sync: Option<DateTime<Utc>>,
}

impl SyncState {
    pub fn new(calendar_url: Url) -> Self {
        Self {
            calendar_url,
            ctag: None,
            sync_token: None,
            etags: HashMap::new(),
            url_map: HashMap::new(),
            last_sync: None,
        }
    }

    /// The uid an href maps to, per the reverse of `url_map`
    fn uid_for_href(&self, href: &str) -> Option<String> {
        self.url_map
            .iter()
            .find(|(_, mapped)| mapped.as_str() == href)
            .map(|(uid, _)| uid.clone())
    }
}

/// What one sync did, and the new cursor to persist when it advanced
#[derive(Clone, Debug, Default)]
pub struct SyncReport {
    /// No unrecoverable error happened
    pub success: bool,
    /// Something went wrong, even if the sync still made progress
    pub has_errors: bool,
    pub is_full_sync: bool,
    pub cancelled: bool,
    pub upserted: usize,
    pub deleted: usize,
    /// Hrefs whose calendar data did not parse this time
    pub parse_failures: Vec<String>,
    /// The state to persist. `None` when nothing must change (cancellation,
    /// or a failure before anything could be applied safely)
    pub new_state: Option<SyncState>,
}

impl SyncReport {
    fn cancelled() -> Self {
        Self { cancelled: true, ..Self::default() }
    }

    fn failed(previous: Option<&SyncState>, is_full_sync: bool) -> Self {
        Self {
            is_full_sync,
            has_errors: true,
            // the previous cursor is handed back untouched so the next sync
            // re-attempts the same window
            new_state: previous.cloned(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct FailureRecord {
    failure_count: u32,
    first_seen_at: DateTime<Utc>,
    etag: Option<Etag>,
}

/// Tracks resources whose calendar data keeps failing to parse, and
/// quarantines them after a threshold so one poisoned event cannot stall a
/// calendar forever.
///
/// A quarantined href is excluded from fetches until either the tracker is
/// cleared explicitly or the resource's ETag changes on the server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailureTracker {
    max_retries: u32,
    entries: HashMap<String, FailureRecord>,
}

impl FailureTracker {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries, entries: HashMap::new() }
    }

    pub fn record_failure(&mut self, href: &str, etag: Option<&Etag>) {
        let entry = self.entries.entry(href.to_string()).or_insert_with(|| FailureRecord {
            failure_count: 0,
            first_seen_at: Utc::now(),
            etag: None,
        });
        entry.failure_count += 1;
        if etag.is_some() {
            entry.etag = etag.cloned();
        }
    }

    /// Whether this href should be skipped. A changed ETag clears the record:
    /// the server has a new version that deserves a fresh chance
    pub fn is_quarantined(&mut self, href: &str, current_etag: Option<&Etag>) -> bool {
        let entry = match self.entries.get(href) {
            None => return false,
            Some(entry) => entry,
        };

        if let (Some(current), Some(recorded)) = (current_etag, entry.etag.as_ref()) {
            if current != recorded {
                log::info!("Resource {} changed on the server, lifting its quarantine", href);
                self.entries.remove(href);
                return false;
            }
        }

        entry.failure_count >= self.max_retries
    }

    pub fn failure_count(&self, href: &str) -> u32 {
        self.entries.get(href).map(|entry| entry.failure_count).unwrap_or(0)
    }

    /// Lift the quarantine of one resource (an administrative action)
    pub fn clear(&mut self, href: &str) {
        self.entries.remove(href);
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
    }
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PARSE_RETRIES)
    }
}

/// The phases of one sync run. Transitions are handled in a single match so
/// that the token-expired fall-back and the parse-failure retention stay
/// visible as explicit edges
enum Phase {
    FullFetch,
    IncrementalReport { token: String },
    Multiget { result: SyncResult },
}

/// A deletion to apply locally
struct Deletion {
    uid: String,
    href: Option<String>,
}

/// What the diff phase computed, ready to be applied
struct ChangeSet {
    upserts: Vec<EventWithMetadata>,
    deletions: Vec<Deletion>,
    is_full: bool,
    /// The token the sync-collection report advanced to, when one ran
    report_token: Option<String>,
    /// Starting point for the maps of the new state
    base_etags: HashMap<String, Etag>,
    base_url_map: HashMap<String, String>,
}

/// The per-calendar synchronization engine.
///
/// One engine instance serializes the syncs of its calendar: taking `&mut self`
/// makes overlapping runs unrepresentable. Engines for disjoint calendars may
/// run in parallel.
pub struct SyncEngine {
    client: CalDavClient,
    failure_tracker: FailureTracker,
}

impl SyncEngine {
    pub fn new(client: CalDavClient) -> Self {
        Self { client, failure_tracker: FailureTracker::default() }
    }

    pub fn with_failure_tracker(client: CalDavClient, failure_tracker: FailureTracker) -> Self {
        Self { client, failure_tracker }
    }

    pub fn client(&self) -> &CalDavClient {
        &self.client
    }

    /// The quarantine bookkeeping, exposed so a host can clear entries
    pub fn failure_tracker_mut(&mut self) -> &mut FailureTracker {
        &mut self.failure_tracker
    }

    /// Synchronize one calendar, incrementally when the previous state allows
    /// it. See the module documentation for the machine this drives
    pub async fn sync_with_incremental(
        &mut self,
        calendar_url: &Url,
        previous_state: Option<&SyncState>,
        local: &dyn LocalEventProvider,
        handler: &mut dyn SyncResultHandler,
        force_full_sync: bool,
        cancel: Option<&CancelFlag>,
    ) -> SyncReport {
        let mut progress = SyncProgress::new();
        self.run_sync(calendar_url, previous_state, local, handler, force_full_sync, cancel, &mut progress)
            .await
    }

    /// Same as [`Self::sync_with_incremental`], reporting progress on a
    /// [`feedback_channel`](sync_progress::feedback_channel)
    pub async fn sync_with_feedback(
        &mut self,
        calendar_url: &Url,
        previous_state: Option<&SyncState>,
        local: &dyn LocalEventProvider,
        handler: &mut dyn SyncResultHandler,
        force_full_sync: bool,
        cancel: Option<&CancelFlag>,
        feedback: FeedbackSender,
    ) -> SyncReport {
        let mut progress = SyncProgress::new_with_feedback_channel(feedback);
        self.run_sync(calendar_url, previous_state, local, handler, force_full_sync, cancel, &mut progress)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_sync(
        &mut self,
        calendar_url: &Url,
        previous_state: Option<&SyncState>,
        local: &dyn LocalEventProvider,
        handler: &mut dyn SyncResultHandler,
        force_full_sync: bool,
        cancel: Option<&CancelFlag>,
        progress: &mut SyncProgress,
    ) -> SyncReport {
        progress.info(&format!("Starting a sync of {}", calendar_url));
        progress.feedback(SyncEvent::Started);

        let report = self
            .run_sync_inner(calendar_url, previous_state, local, handler, force_full_sync, cancel, progress)
            .await;

        progress.feedback(SyncEvent::Finished { success: report.success });
        report
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_sync_inner(
        &mut self,
        calendar_url: &Url,
        previous_state: Option<&SyncState>,
        local: &dyn LocalEventProvider,
        handler: &mut dyn SyncResultHandler,
        force_full_sync: bool,
        cancel: Option<&CancelFlag>,
        progress: &mut SyncProgress,
    ) -> SyncReport {
        let previous_token = previous_state.and_then(|state| state.sync_token.clone());
        let mut parse_failures: Vec<String> = Vec::new();

        let mut phase = match (&previous_token, force_full_sync) {
            (_, true) | (None, _) => Phase::FullFetch,
            (Some(token), false) => Phase::IncrementalReport { token: token.clone() },
        };

        // Phase transitions loop until a diff is ready
        let changes = loop {
            if is_cancelled(cancel) {
                progress.info("Sync cancelled");
                return SyncReport::cancelled();
            }

            phase = match phase {
                Phase::FullFetch => {
                    progress.debug("Fetching the full event list");
                    let server_events = match self.client.fetch_events(calendar_url, None).await {
                        Err(err) => {
                            progress.error(&format!("Unable to fetch events: {}", err));
                            return SyncReport::failed(previous_state, true);
                        }
                        Ok(events) => events,
                    };

                    let local_entries = match local.get_local_events(calendar_url).await {
                        Err(err) => {
                            progress.error(&format!("Unable to list local events: {}", err));
                            return SyncReport::failed(previous_state, true);
                        }
                        Ok(entries) => entries,
                    };

                    break diff_full(server_events, local_entries, previous_state, &mut self.failure_tracker);
                }

                Phase::IncrementalReport { token } => {
                    progress.debug("Running a sync-collection report");
                    match self.client.sync_collection(calendar_url, &token).await {
                        Err(err) if err.is_token_expired() => {
                            // The server forgot our token; a full sync reseeds it
                            progress.info(&format!(
                                "Sync token rejected by the server ({}), falling back to a full sync",
                                err
                            ));
                            Phase::FullFetch
                        }
                        Err(err) if err.is_parse_error() => {
                            progress.error(&format!("Unparseable sync report: {}", err));
                            return SyncReport::failed(previous_state, false);
                        }
                        Err(err) => {
                            progress.error(&format!("Sync report failed: {}", err));
                            return SyncReport::failed(previous_state, false);
                        }
                        Ok(result) if !result.added_hrefs.is_empty() => Phase::Multiget { result },
                        Ok(result) => {
                            break self
                                .diff_incremental(result, Vec::new(), previous_state, local)
                                .await;
                        }
                    }
                }

                Phase::Multiget { mut result } => {
                    let to_fetch: Vec<ResourceHref> = std::mem::take(&mut result.added_hrefs);
                    let fetched = self
                        .multiget_with_isolation(calendar_url, to_fetch, &mut parse_failures, progress)
                        .await;
                    break self.diff_incremental(result, fetched, previous_state, local).await;
                }
            };
        };

        if is_cancelled(cancel) {
            progress.info("Sync cancelled");
            return SyncReport::cancelled();
        }

        // Apply phase: hand every change to the host, updating the maps as we go
        let is_full = changes.is_full;
        let mut etags = changes.base_etags;
        let mut url_map = changes.base_url_map;
        let mut upserted = 0;
        let mut deleted = 0;

        for deletion in &changes.deletions {
            progress.debug(&format!("> Applying deletion of {} locally", deletion.uid));
            handler.delete_event(&deletion.uid).await;
            if let Some(href) = &deletion.href {
                etags.remove(href);
            }
            url_map.remove(&deletion.uid);
            deleted += 1;
            progress.increment_counter(1);
            progress.feedback(SyncEvent::InProgress {
                calendar: calendar_url.to_string(),
                items_done_already: progress.counter(),
                details: deletion.uid.clone(),
            });

            if is_cancelled(cancel) {
                progress.info("Sync cancelled");
                return SyncReport::cancelled();
            }
        }

        for upsert in &changes.upserts {
            progress.debug(&format!("> Applying upsert of {} locally", upsert.href));
            let uid = upsert.uid().to_string();
            handler.upsert_event(upsert.event.clone()).await;
            if let Some(etag) = &upsert.etag {
                handler.record_etag(&uid, &upsert.href, etag).await;
                etags.insert(upsert.href.clone(), etag.clone());
            }
            url_map.insert(uid, upsert.href.clone());
            upserted += 1;
            progress.increment_counter(1);
            progress.feedback(SyncEvent::InProgress {
                calendar: calendar_url.to_string(),
                items_done_already: progress.counter(),
                details: upsert.event.summary().to_string(),
            });

            if is_cancelled(cancel) {
                progress.info("Sync cancelled");
                return SyncReport::cancelled();
            }
        }

        // Finalize phase: advance the cursor, unless parse failures require
        // re-attempting the same window next time
        let (ctag, sync_token) = if parse_failures.is_empty() {
            let sync_token = match changes.report_token.clone() {
                Some(token) => Some(token),
                None => match self.client.get_sync_token(calendar_url).await {
                    Ok(token) => token,
                    Err(err) => {
                        progress.warn(&format!("Unable to read the new sync token: {}", err));
                        previous_token.clone()
                    }
                },
            };
            let ctag = match self.client.get_ctag(calendar_url).await {
                Ok(ctag) => ctag,
                Err(err) => {
                    progress.debug(&format!("Unable to read the collection ctag: {}", err));
                    previous_state.and_then(|state| state.ctag.clone())
                }
            };
            (ctag, sync_token)
        } else {
            progress.info(&format!(
                "{} resources failed to parse; keeping the previous sync token so they are re-attempted",
                parse_failures.len()
            ));
            (
                previous_state.and_then(|state| state.ctag.clone()),
                previous_token.clone(),
            )
        };

        let new_state = SyncState {
            calendar_url: calendar_url.clone(),
            ctag,
            sync_token,
            etags,
            url_map,
            last_sync: Some(Utc::now()),
        };

        progress.info(&format!(
            "Sync ended: {} upserts, {} deletions, {} parse failures",
            upserted,
            deleted,
            parse_failures.len()
        ));

        SyncReport {
            success: progress.is_success(),
            has_errors: !progress.is_success() || !parse_failures.is_empty(),
            is_full_sync: is_full,
            cancelled: false,
            upserted,
            deleted,
            parse_failures,
            new_state: Some(new_state),
        }
    }

    /// Fetch the given resources in batches. A batch-level parse failure is
    /// isolated by re-fetching each href on its own, so one poisoned resource
    /// only costs itself
    async fn multiget_with_isolation(
        &mut self,
        calendar_url: &Url,
        resources: Vec<ResourceHref>,
        parse_failures: &mut Vec<String>,
        progress: &mut SyncProgress,
    ) -> Vec<EventWithMetadata> {
        let mut fetched = Vec::new();

        let wanted: Vec<ResourceHref> = resources
            .into_iter()
            .filter(|resource| {
                let quarantined = self
                    .failure_tracker
                    .is_quarantined(&resource.href, resource.etag.as_ref());
                if quarantined {
                    log::debug!("Skipping quarantined resource {}", resource.href);
                }
                !quarantined
            })
            .collect();

        for batch in wanted.chunks(DOWNLOAD_BATCH_SIZE) {
            let hrefs: Vec<String> = batch.iter().map(|resource| resource.href.clone()).collect();

            match self.client.multiget(calendar_url, &hrefs).await {
                Ok(outcome) => {
                    for href in &outcome.failed {
                        let etag = batch
                            .iter()
                            .find(|resource| &resource.href == href)
                            .and_then(|resource| resource.etag.as_ref());
                        self.failure_tracker.record_failure(href, etag);
                        parse_failures.push(href.clone());
                    }
                    for href in &outcome.missing {
                        progress.debug(&format!("Resource {} vanished before the multiget", href));
                    }
                    fetched.extend(outcome.events);
                }
                Err(err) if err.is_parse_error() => {
                    progress.debug(&format!(
                        "Batch multiget failed to parse ({}), isolating {} hrefs",
                        err,
                        batch.len()
                    ));
                    for resource in batch {
                        match self.client.multiget(calendar_url, &[resource.href.clone()]).await {
                            Ok(outcome) if outcome.failed.is_empty() => {
                                fetched.extend(outcome.events);
                            }
                            Ok(_) | Err(_) => {
                                self.failure_tracker
                                    .record_failure(&resource.href, resource.etag.as_ref());
                                parse_failures.push(resource.href.clone());
                            }
                        }
                    }
                }
                Err(err) => {
                    progress.warn(&format!(
                        "Unable to fetch a batch of {} resources: {}. Skipping them this time.",
                        hrefs.len(),
                        err
                    ));
                }
            }
        }

        fetched
    }

    /// Turn a sync-collection result (plus any multiget follow-up) into a
    /// change set against the previous state
    async fn diff_incremental(
        &mut self,
        result: SyncResult,
        fetched: Vec<EventWithMetadata>,
        previous_state: Option<&SyncState>,
        local: &dyn LocalEventProvider,
    ) -> ChangeSet {
        let mut upserts = result.added;
        upserts.extend(fetched);

        let mut deletions = Vec::new();
        for href in &result.deleted {
            let uid = match previous_state.and_then(|state| state.uid_for_href(href)) {
                Some(uid) => Some(uid),
                None => local.find_uid_by_href(href).await,
            };
            match uid {
                Some(uid) => deletions.push(Deletion { uid, href: Some(href.clone()) }),
                None => {
                    log::debug!("Deleted href {} maps to no known uid, nothing to do locally", href)
                }
            }
        }

        ChangeSet {
            upserts,
            deletions,
            is_full: false,
            report_token: result.new_sync_token,
            base_etags: previous_state.map(|state| state.etags.clone()).unwrap_or_default(),
            base_url_map: previous_state.map(|state| state.url_map.clone()).unwrap_or_default(),
        }
    }
}

/// Full-sync diff: the server list replaces the local list
fn diff_full(
    server_events: Vec<EventWithMetadata>,
    local_entries: Vec<crate::traits::LocalEventEntry>,
    previous_state: Option<&SyncState>,
    failure_tracker: &mut FailureTracker,
) -> ChangeSet {
    let server_events: Vec<EventWithMetadata> = server_events
        .into_iter()
        .filter(|event| !failure_tracker.is_quarantined(&event.href, event.etag.as_ref()))
        .collect();

    let server_uids: HashSet<&str> = server_events.iter().map(|event| event.uid()).collect();
    let local_uids: HashSet<&str> =
        local_entries.iter().map(|entry| entry.uid.as_str()).collect();

    // The complete server listing rebuilds the maps from scratch
    let mut base_etags = HashMap::new();
    let mut base_url_map = HashMap::new();
    for event in &server_events {
        if let Some(etag) = &event.etag {
            base_etags.insert(event.href.clone(), etag.clone());
        }
        base_url_map.insert(event.uid().to_string(), event.href.clone());
    }

    let deletions = local_entries
        .iter()
        .filter(|entry| !server_uids.contains(entry.uid.as_str()))
        .map(|entry| Deletion {
            uid: entry.uid.clone(),
            href: previous_state.and_then(|state| state.url_map.get(&entry.uid).cloned()),
        })
        .collect();

    let upserts = server_events
        .into_iter()
        .filter(|event| {
            if !local_uids.contains(event.uid()) {
                return true;
            }
            let stored_etag = previous_state.and_then(|state| state.etags.get(&event.href));
            match (&event.etag, stored_etag) {
                (Some(server), Some(stored)) => server != stored,
                // no basis for comparison: re-apply, the handler is idempotent
                _ => true,
            }
        })
        .collect();

    ChangeSet {
        upserts,
        deletions,
        is_full: true,
        report_token: None,
        base_etags,
        base_url_map,
    }
}

fn is_cancelled(cancel: Option<&CancelFlag>) -> bool {
    cancel.map(|flag| flag.load(Ordering::Relaxed)).unwrap_or(false)
}
