//! This module provides a client to connect to a CalDAV server

use std::convert::TryFrom;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use url::Url;

use crate::calendar::{Account, CalendarRef, SupportedComponents};
use crate::dav::xml::escape_xml;
use crate::dav::{DavAdapter, DavResponse, HttpTransport, Multistatus};
use crate::error::{DavError, DavResult};
use crate::event::Event;
use crate::quirks::QuirkProfile;
use crate::resource::{Etag, EtagInfo, EventWithMetadata, ResourceHref};

static DAVCLIENT_BODY: &str = r#"
    <d:propfind xmlns:d="DAV:">
       <d:prop>
           <d:current-user-principal />
       </d:prop>
    </d:propfind>
"#;

static HOMESET_BODY: &str = r#"
    <d:propfind xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav" >
      <d:self/>
      <d:prop>
        <c:calendar-home-set />
      </d:prop>
    </d:propfind>
"#;

static CAL_LIST_BODY: &str = r#"
    <d:propfind xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav" xmlns:cs="http://calendarserver.org/ns/" xmlns:a="http://apple.com/ns/ical/">
       <d:prop>
         <d:displayname />
         <d:resourcetype />
         <a:calendar-color />
         <c:supported-calendar-component-set />
         <cs:getctag />
         <d:sync-token />
       </d:prop>
    </d:propfind>
"#;

static CTAG_BODY: &str = r#"
    <d:propfind xmlns:d="DAV:" xmlns:cs="http://calendarserver.org/ns/">
      <d:prop>
        <cs:getctag />
      </d:prop>
    </d:propfind>
"#;

static SYNC_TOKEN_BODY: &str = r#"
    <d:propfind xmlns:d="DAV:">
      <d:prop>
        <d:sync-token />
      </d:prop>
    </d:propfind>
"#;

static EVENT_ETAG_BODY: &str = r#"
    <d:propfind xmlns:d="DAV:">
      <d:prop>
        <d:getetag />
      </d:prop>
    </d:propfind>
"#;

/// Characters kept untouched in event hrefs; everything else becomes `_`
fn is_href_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '@' || c == '.' || c == '-'
}

/// Backoff base for the post-write visibility loop
const CONSISTENCY_BACKOFF: Duration = Duration::from_millis(100);

/// The parsed outcome of an RFC 6578 sync-collection report
#[derive(Clone, Debug, Default)]
pub struct SyncResult {
    /// Events the server returned fully materialized
    pub added: Vec<EventWithMetadata>,
    /// Hrefs the server flagged as gone (404/410 entries)
    pub deleted: Vec<String>,
    /// Hrefs that came back with an ETag but no calendar data (iCloud style);
    /// they need a follow-up multiget
    pub added_hrefs: Vec<ResourceHref>,
    pub new_sync_token: Option<String>,
}

/// The outcome of a calendar-multiget, distinguishing why entries are missing
#[derive(Clone, Debug, Default)]
pub struct MultigetOutcome {
    pub events: Vec<EventWithMetadata>,
    /// Hrefs the server answered 404 for (resource vanished, not an error)
    pub missing: Vec<String>,
    /// Hrefs whose calendar data did not parse
    pub failed: Vec<String>,
}

/// A CalDAV source that fetches its data from a CalDAV server
pub struct CalDavClient {
    adapter: DavAdapter,
    base_url: Url,
    quirks: QuirkProfile,
}

impl CalDavClient {
    /// Create a client. This does not start a connection
    pub fn new(base_url: Url, quirks: QuirkProfile, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            adapter: DavAdapter::new(transport),
            base_url,
            quirks,
        }
    }

    pub fn quirks(&self) -> &QuirkProfile {
        &self.quirks
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a server href (absolute path or full URL) against the base URL
    pub fn resolve_href(&self, href: &str) -> DavResult<Url> {
        self.base_url
            .join(href)
            .map_err(|err| DavError::argument(format!("invalid href {:?}: {}", href, err)))
    }

    /// Walk from the base URL to the list of calendars of the account:
    /// principal, then calendar home set, then the home set's members
    pub async fn discover_account(&self) -> DavResult<Account> {
        let principal = self.discover_principal().await?;

        let multistatus = self
            .adapter
            .propfind(&principal, 0, HOMESET_BODY.to_string(), &self.quirks)
            .await?;
        let home_href = first_prop_href(&multistatus, "calendar-home-set", &self.quirks)
            .ok_or_else(|| DavError::parse("no calendar-home-set in principal answer"))?;
        let home_set = self.resolve_href(&home_href)?;
        log::debug!("Calendar home set URL is {:?}", home_set.path());

        let multistatus = self
            .adapter
            .propfind(&home_set, 1, CAL_LIST_BODY.to_string(), &self.quirks)
            .await?;

        let mut calendars = Vec::new();
        for response in &multistatus.responses {
            let display_name = response
                .prop_text("displayname", &self.quirks)
                .unwrap_or_else(|| "<no name>".to_string());
            log::debug!("Considering calendar {}", display_name);

            // We filter out non-calendar resources
            let is_calendar = response
                .prop("resourcetype")
                .map(|rt| rt.children().any(|child| child.name() == "calendar"))
                .unwrap_or(false);
            if !is_calendar {
                continue;
            }

            // We filter out collections that cannot hold anything, such as the
            // root collection with its empty supported-calendar-component-set
            let supported_components = match response.prop("supported-calendar-component-set") {
                None => continue,
                Some(element) if element.children().count() == 0 => continue,
                Some(element) => match SupportedComponents::try_from(element) {
                    Err(err) => {
                        log::warn!(
                            "Calendar {} has invalid supported components ({})! Ignoring it.",
                            display_name,
                            err
                        );
                        continue;
                    }
                    Ok(sc) => sc,
                },
            };

            let url = match self.resolve_href(&response.href) {
                Err(err) => {
                    log::warn!("Calendar {} has an invalid URL ({})! Ignoring it.", display_name, err);
                    continue;
                }
                Ok(url) => url,
            };

            let color = response
                .prop_text("calendar-color", &self.quirks)
                .and_then(|text| csscolorparser::parse(&text).ok());

            let calendar = CalendarRef {
                url,
                display_name,
                color,
                supported_components,
                ctag: response.prop_text("getctag", &self.quirks),
                sync_token: response.prop_text("sync-token", &self.quirks),
            };
            log::info!("Found calendar {}", calendar.display_name);
            calendars.push(calendar);
        }

        Ok(Account { principal, home_set, calendars })
    }

    async fn discover_principal(&self) -> DavResult<Url> {
        let attempt = self
            .adapter
            .propfind(&self.base_url, 0, DAVCLIENT_BODY.to_string(), &self.quirks)
            .await;

        let multistatus = match attempt {
            Ok(multistatus) => multistatus,
            // Some servers only answer discovery at the well-known location
            Err(err) if err.is_not_found() => {
                let well_known = self.base_url.join("/.well-known/caldav")?;
                self.adapter
                    .propfind(&well_known, 0, DAVCLIENT_BODY.to_string(), &self.quirks)
                    .await?
            }
            Err(err) => return Err(err),
        };

        let href = first_prop_href(&multistatus, "current-user-principal", &self.quirks)
            .ok_or_else(|| DavError::parse("no current-user-principal in server answer"))?;
        let principal = self.resolve_href(&href)?;
        log::debug!("Principal URL is {}", href);
        Ok(principal)
    }

    /// Read the collection's CTag. A server without the CalendarServer
    /// extension yields `Ok(None)`
    pub async fn get_ctag(&self, calendar_url: &Url) -> DavResult<Option<String>> {
        let multistatus = self
            .adapter
            .propfind(calendar_url, 0, CTAG_BODY.to_string(), &self.quirks)
            .await?;
        Ok(first_prop_text(&multistatus, "getctag", &self.quirks))
    }

    /// Read the collection's RFC 6578 sync token. A server without
    /// sync-collection support yields `Ok(None)`
    pub async fn get_sync_token(&self, calendar_url: &Url) -> DavResult<Option<String>> {
        let multistatus = self
            .adapter
            .propfind(calendar_url, 0, SYNC_TOKEN_BODY.to_string(), &self.quirks)
            .await?;
        Ok(first_prop_text(&multistatus, "sync-token", &self.quirks))
    }

    /// Fetch the calendar's events, fully materialized, optionally restricted
    /// to a UTC time range.
    ///
    /// Entries whose calendar data does not parse are logged and skipped; they
    /// never fail the whole batch.
    pub async fn fetch_events(
        &self,
        calendar_url: &Url,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> DavResult<Vec<EventWithMetadata>> {
        let body = calendar_query_body(range, true);
        let multistatus = self.adapter.report(calendar_url, 1, body, &self.quirks).await?;

        let mut events = Vec::new();
        for response in &multistatus.responses {
            if response.is_gone() {
                continue;
            }
            match self.event_from_response(response) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => continue,
                Err(err) => {
                    log::warn!("Unparseable event at {}: {}. Skipping it.", response.href, err);
                }
            }
        }
        Ok(events)
    }

    /// Fetch only `(href, etag)` pairs in the given UTC time range. The request
    /// body carries no calendar-data element at all, so the server does not
    /// serialize event bodies
    pub async fn fetch_etags_in_range(
        &self,
        calendar_url: &Url,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DavResult<Vec<EtagInfo>> {
        let body = calendar_query_body(Some((start, end)), false);
        let multistatus = self.adapter.report(calendar_url, 1, body, &self.quirks).await?;

        let mut etags = Vec::new();
        for response in &multistatus.responses {
            if response.is_gone() {
                continue;
            }
            match response.etag(&self.quirks) {
                Some(etag) => etags.push(EtagInfo { href: response.href.clone(), etag }),
                None => log::debug!("Response for {} carries no etag, skipping it", response.href),
            }
        }
        Ok(etags)
    }

    /// Fetch full resources for a set of hrefs with a calendar-multiget.
    ///
    /// An empty href list returns immediately without any network call.
    /// Per-href 404 entries are dropped silently: partial success is success.
    pub async fn fetch_events_by_href(
        &self,
        calendar_url: &Url,
        hrefs: &[String],
    ) -> DavResult<Vec<EventWithMetadata>> {
        Ok(self.multiget(calendar_url, hrefs).await?.events)
    }

    /// Like [`Self::fetch_events_by_href`], but reports which hrefs were
    /// missing on the server and which ones had unparseable calendar data.
    /// The sync engine needs the distinction to isolate poisoned resources
    pub async fn multiget(
        &self,
        calendar_url: &Url,
        hrefs: &[String],
    ) -> DavResult<MultigetOutcome> {
        if hrefs.is_empty() {
            return Ok(MultigetOutcome::default());
        }

        let href_elements: String = hrefs
            .iter()
            .map(|href| format!("        <D:href>{}</D:href>\n", escape_xml(href)))
            .collect();
        let body = format!(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<C:calendar-multiget xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
    <D:prop>
        <D:getetag/>
        <C:calendar-data/>
    </D:prop>
{}</C:calendar-multiget>"#,
            href_elements
        );

        let multistatus = self.adapter.report(calendar_url, 1, body, &self.quirks).await?;

        let mut outcome = MultigetOutcome::default();
        for response in &multistatus.responses {
            if response.is_gone() {
                outcome.missing.push(response.href.clone());
                continue;
            }
            match self.event_from_response(response) {
                Ok(Some(event)) => outcome.events.push(event),
                Ok(None) => outcome.missing.push(response.href.clone()),
                Err(err) => {
                    log::warn!("Unparseable event at {}: {}", response.href, err);
                    outcome.failed.push(response.href.clone());
                }
            }
        }
        Ok(outcome)
    }

    /// Run an RFC 6578 sync-collection report against the previous sync token
    /// (the empty string on an initial sync).
    ///
    /// An expired token surfaces as `Http(403)` or `Http(410)` depending on
    /// the server; callers treat both the same way.
    pub async fn sync_collection(&self, calendar_url: &Url, sync_token: &str) -> DavResult<SyncResult> {
        let body = format!(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<D:sync-collection xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
    <D:sync-token>{}</D:sync-token>
    <D:sync-level>1</D:sync-level>
    <D:prop>
        <D:getetag/>
        <C:calendar-data/>
    </D:prop>
</D:sync-collection>"#,
            escape_xml(sync_token)
        );

        let multistatus = self.adapter.report(calendar_url, 0, body, &self.quirks).await?;

        let mut result = SyncResult {
            new_sync_token: multistatus.sync_token.clone(),
            ..SyncResult::default()
        };

        for response in &multistatus.responses {
            if response.is_gone() {
                result.deleted.push(response.href.clone());
                continue;
            }

            let etag = response.etag(&self.quirks);
            match self.event_from_response(response) {
                Ok(Some(event)) => result.added.push(event),
                Ok(None) => {
                    // iCloud answers with bare ETags; those resources need a
                    // follow-up multiget
                    match etag {
                        Some(etag) => result
                            .added_hrefs
                            .push(ResourceHref::new(response.href.clone(), Some(etag))),
                        None => log::debug!(
                            "Sync entry {} has neither data nor etag, ignoring it",
                            response.href
                        ),
                    }
                }
                Err(err) => {
                    // Poisoned inline data: hand the href to the multiget path,
                    // which knows how to isolate and quarantine it
                    log::warn!("Unparseable sync entry at {}: {}", response.href, err);
                    result.added_hrefs.push(ResourceHref::new(response.href.clone(), etag));
                }
            }
        }

        dedup_by_href_last_occurrence(&mut result);
        Ok(result)
    }

    /// Create an event on the server. The href is derived from the uid; the
    /// `If-None-Match: *` precondition makes a clash a `412` instead of an
    /// overwrite
    pub async fn create_event(
        &self,
        calendar_url: &Url,
        event: &Event,
    ) -> DavResult<(String, Option<Etag>)> {
        let url = self.build_event_url(calendar_url, event.uid())?;
        let body = crate::ical::build_from(event)?;
        let etag = self
            .adapter
            .put(&url, body, "text/calendar; charset=utf-8", None, true, &self.quirks)
            .await?;
        Ok((url.path().to_string(), etag))
    }

    /// Replace an event on the server. With an ETag, the write only succeeds
    /// against that exact version; a `412` means someone else won the race
    pub async fn update_event(
        &self,
        href: &str,
        event: &Event,
        etag: Option<&Etag>,
    ) -> DavResult<Option<Etag>> {
        let url = self.resolve_href(href)?;
        let body = crate::ical::build_from(event)?;
        self.adapter
            .put(&url, body, "text/calendar; charset=utf-8", etag, false, &self.quirks)
            .await
    }

    /// Delete an event, optionally guarded by its last known ETag
    pub async fn delete_event(&self, href: &str, etag: Option<&Etag>) -> DavResult<()> {
        let url = self.resolve_href(href)?;
        self.adapter.delete(&url, etag, &self.quirks).await
    }

    /// Read the current ETag of a single resource. `Ok(None)` when the
    /// resource does not exist
    pub async fn get_event_etag(&self, href: &str) -> DavResult<Option<Etag>> {
        let url = self.resolve_href(href)?;
        match self
            .adapter
            .propfind(&url, 0, EVENT_ETAG_BODY.to_string(), &self.quirks)
            .await
        {
            Ok(multistatus) => Ok(multistatus
                .responses
                .first()
                .and_then(|response| response.etag(&self.quirks))),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// After a write on an eventually-consistent server, poll until the
    /// resource is visible. Never an error: the return value only says whether
    /// visibility was confirmed within the profile's retry budget
    pub async fn confirm_visibility(&self, href: &str) -> DavResult<bool> {
        let mut backoff = CONSISTENCY_BACKOFF;
        for attempt in 0..=self.quirks.post_write_read_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            if self.get_event_etag(href).await?.is_some() {
                return Ok(true);
            }
            log::debug!("Resource {} not visible yet (attempt {})", href, attempt + 1);
        }
        Ok(false)
    }

    /// Derive the canonical event URL for a uid inside a calendar.
    ///
    /// The uid is sanitized to `[A-Za-z0-9@.-]` (anything else becomes `_`);
    /// inputs that smell like path traversal are rejected before any network
    /// interaction. Sanitization is deterministic and idempotent
    pub fn build_event_url(&self, calendar_url: &Url, uid: &str) -> DavResult<Url> {
        if uid.is_empty() {
            return Err(DavError::argument("uid must not be empty"));
        }
        if uid.contains("..") {
            return Err(DavError::argument("path traversal in uid"));
        }
        if uid.contains('/') || uid.contains('\\') {
            return Err(DavError::argument("path separator in uid"));
        }
        if uid.chars().any(|c| c.is_control()) {
            return Err(DavError::argument("control character in uid"));
        }

        let sanitized: String = uid.chars().map(|c| if is_href_safe(c) { c } else { '_' }).collect();

        let file_name = format!("{}.ics", sanitized);
        let url = calendar_url
            .join(&file_name)
            .map_err(|err| DavError::argument(format!("invalid event URL: {}", err)))?;

        // The result must stay inside the calendar collection
        if !url.path().starts_with(calendar_url.path()) {
            return Err(DavError::argument("path traversal in uid"));
        }

        Ok(url)
    }

    /// Parse a response entry into an event, when it carries calendar data.
    ///
    /// `Ok(None)` means there was no calendar-data to parse; `Err` means the
    /// data was there but did not parse
    fn event_from_response(&self, response: &DavResponse) -> DavResult<Option<EventWithMetadata>> {
        let data = match response.prop_text("calendar-data", &self.quirks) {
            None => return Ok(None),
            Some(data) => data,
        };

        let events = crate::ical::parse(&data)?;
        // A resource is one scheduling object: a master event, possibly with
        // recurrence override instances. The master is what sync tracks
        let event = events
            .iter()
            .find(|event| event.recurrence_id().is_none())
            .or_else(|| events.first())
            .cloned()
            .ok_or_else(|| DavError::parse("resource contains no event"))?;
        if events.len() > 1 {
            log::debug!(
                "Resource {} has {} override instances; tracking the master event",
                response.href,
                events.len() - 1
            );
        }

        Ok(Some(EventWithMetadata::new(
            response.href.clone(),
            response.etag(&self.quirks),
            event,
        )))
    }
}

fn first_prop_text(multistatus: &Multistatus, name: &str, quirks: &QuirkProfile) -> Option<String> {
    multistatus
        .responses
        .iter()
        .find_map(|response| response.prop_text(name, quirks))
}

/// Extract the href child of a property (the shape of current-user-principal
/// and calendar-home-set answers)
fn first_prop_href(multistatus: &Multistatus, name: &str, quirks: &QuirkProfile) -> Option<String> {
    multistatus.responses.iter().find_map(|response| {
        let prop = response.prop(name)?;
        let href = crate::dav::xml::first_named(prop, "href")?;
        let text = crate::dav::xml::element_text(href, quirks);
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    })
}

fn calendar_query_body(range: Option<(DateTime<Utc>, DateTime<Utc>)>, with_data: bool) -> String {
    let data_prop = if with_data { "        <C:calendar-data/>\n" } else { "" };
    let time_range = match range {
        Some((start, end)) => format!(
            r#"                <C:time-range start="{}" end="{}"/>"#,
            start.format("%Y%m%dT%H%M%SZ"),
            end.format("%Y%m%dT%H%M%SZ")
        ),
        None => String::new(),
    };

    format!(
        r#"<?xml version="1.0" encoding="utf-8" ?>
<C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
    <D:prop>
        <D:getetag/>
{}    </D:prop>
    <C:filter>
        <C:comp-filter name="VCALENDAR">
            <C:comp-filter name="VEVENT">
{}
            </C:comp-filter>
        </C:comp-filter>
    </C:filter>
</C:calendar-query>"#,
        data_prop, time_range
    )
}

/// iCloud has been observed repeating hrefs inside one sync report; the last
/// occurrence wins everywhere
fn dedup_by_href_last_occurrence(result: &mut SyncResult) {
    fn keep_last<T, F: Fn(&T) -> String>(items: &mut Vec<T>, href_of: F) {
        let mut kept: Vec<T> =
            items.drain(..).rev().unique_by(|item| href_of(item)).collect();
        kept.reverse();
        *items = kept;
    }

    keep_last(&mut result.added, |event| event.href.clone());
    keep_last(&mut result.deleted, |href| href.clone());
    keep_last(&mut result.added_hrefs, |resource| resource.href.clone());
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::quirks::Auth;

    fn client() -> CalDavClient {
        let transport = Arc::new(crate::dav::ReqwestTransport::new().unwrap());
        let base: Url = "https://caldav.example.org/".parse().unwrap();
        CalDavClient::new(base, QuirkProfile::rfc_strict(Auth::None), transport)
    }

    #[test]
    fn test_build_event_url_sanitizes() {
        let client = client();
        let calendar: Url = "https://caldav.example.org/calendars/user/main/".parse().unwrap();

        let url = client.build_event_url(&calendar, "simple-uid@host.tld").unwrap();
        assert_eq!(url.path(), "/calendars/user/main/simple-uid@host.tld.ics");

        // odd but harmless characters collapse to underscores
        let url = client.build_event_url(&calendar, "uid with spaces:and#marks").unwrap();
        assert_eq!(url.path(), "/calendars/user/main/uid_with_spaces_and_marks.ics");
    }

    #[test]
    fn test_build_event_url_is_idempotent() {
        let client = client();
        let calendar: Url = "https://caldav.example.org/cal/".parse().unwrap();

        let once = client.build_event_url(&calendar, "uid with spaces").unwrap();
        let file_stem = once.path().rsplit('/').next().unwrap().trim_end_matches(".ics").to_string();
        let twice = client.build_event_url(&calendar, &file_stem).unwrap();
        assert_eq!(once.path().replace(".ics", ""), twice.path().replace(".ics", ""));
    }

    #[test]
    fn test_build_event_url_rejects_traversal() {
        let client = client();
        let calendar: Url = "https://caldav.example.org/calendars/user/main/".parse().unwrap();

        for evil in ["../../etc/passwd", "a/b", "a\\b", "..", "uid\u{7}bell", ""] {
            let result = client.build_event_url(&calendar, evil);
            assert!(
                matches!(result, Err(DavError::Argument { .. })),
                "{:?} should have been rejected",
                evil
            );
        }
    }

    #[test]
    fn test_calendar_query_body_etag_only_has_no_calendar_data() {
        let start = DateTime::parse_from_rfc3339("2023-04-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let end = DateTime::parse_from_rfc3339("2023-05-01T00:00:00Z").unwrap().with_timezone(&Utc);

        let etag_only = calendar_query_body(Some((start, end)), false);
        assert!(!etag_only.contains("calendar-data"));
        assert!(etag_only.contains(r#"start="20230401T000000Z""#));
        assert!(etag_only.contains(r#"end="20230501T000000Z""#));

        let full = calendar_query_body(Some((start, end)), true);
        assert!(full.contains("calendar-data"));
        assert!(full.contains("getetag"));
    }

    #[test]
    fn test_dedup_keeps_last_occurrence() {
        let mut result = SyncResult {
            added_hrefs: vec![
                ResourceHref::new("/cal/e1.ics".into(), Some(Etag::from_wire("\"v1\""))),
                ResourceHref::new("/cal/e2.ics".into(), Some(Etag::from_wire("\"v1\""))),
                ResourceHref::new("/cal/e1.ics".into(), Some(Etag::from_wire("\"v2\""))),
            ],
            deleted: vec!["/cal/gone.ics".into(), "/cal/gone.ics".into()],
            ..SyncResult::default()
        };
        dedup_by_href_last_occurrence(&mut result);

        assert_eq!(result.added_hrefs.len(), 2);
        // order preserved, later etag kept
        assert_eq!(result.added_hrefs[0].href, "/cal/e2.ics");
        assert_eq!(result.added_hrefs[1].href, "/cal/e1.ics");
        assert_eq!(result.added_hrefs[1].etag.as_ref().unwrap().as_str(), "v2");
        assert_eq!(result.deleted.len(), 1);
    }
}
