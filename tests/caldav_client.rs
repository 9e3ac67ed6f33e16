//! Protocol-level tests of the CalDAV client against the mock transport.


use std::sync::Arc;

use chrono::{DateTime, Utc};
use larder::{DavError, Etag};

use scenarii::*;

fn utc_range() -> (DateTime<Utc>, DateTime<Utc>) {
    (utc("2023-04-01 00:00:00"), utc("2023-05-01 00:00:00"))
}

#[tokio::test]
async fn test_discovery_walks_to_the_calendars() {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = MockTransport::new();
    transport.stub(
        "PROPFIND",
        "/",
        Some("current-user-principal"),
        multistatus_response(&multistatus(
            &[prop_entry(
                "/",
                "<d:current-user-principal><d:href>/principals/users/alice/</d:href></d:current-user-principal>",
            )],
            None,
        )),
    );
    transport.stub(
        "PROPFIND",
        "/principals/users/alice/",
        Some("calendar-home-set"),
        multistatus_response(&multistatus(
            &[prop_entry(
                "/principals/users/alice/",
                "<cal:calendar-home-set><d:href>/calendars/user/</d:href></cal:calendar-home-set>",
            )],
            None,
        )),
    );
    // one real calendar, one addressbook-ish collection to be filtered out
    let calendar_props = r#"
        <d:displayname>Family</d:displayname>
        <d:resourcetype><d:collection/><cal:calendar/></d:resourcetype>
        <a:calendar-color xmlns:a="http://apple.com/ns/ical/">#FF0000FF</a:calendar-color>
        <cal:supported-calendar-component-set>
            <cal:comp name="VEVENT"/>
        </cal:supported-calendar-component-set>
        <cs:getctag xmlns:cs="http://calendarserver.org/ns/">ctag-7</cs:getctag>
        <d:sync-token>sync-7</d:sync-token>
    "#;
    let non_calendar_props = r#"
        <d:displayname>Contacts</d:displayname>
        <d:resourcetype><d:collection/></d:resourcetype>
    "#;
    transport.stub(
        "PROPFIND",
        "/calendars/user/",
        None,
        multistatus_response(&multistatus(
            &[
                prop_entry("/calendars/user/family/", calendar_props),
                prop_entry("/calendars/user/contacts/", non_calendar_props),
            ],
            None,
        )),
    );

    let client = make_client(Arc::clone(&transport));
    let account = client.discover_account().await.unwrap();

    assert_eq!(account.principal.path(), "/principals/users/alice/");
    assert_eq!(account.home_set.path(), "/calendars/user/");
    assert_eq!(account.calendars.len(), 1);

    let calendar = &account.calendars[0];
    assert_eq!(calendar.display_name, "Family");
    assert_eq!(calendar.url.path(), "/calendars/user/family/");
    assert!(calendar.supports_events());
    assert!(calendar.color.is_some());
    assert_eq!(calendar.ctag.as_deref(), Some("ctag-7"));
    assert_eq!(calendar.sync_token.as_deref(), Some("sync-7"));

    // the listing request went out with Depth: 1
    let listing = &transport.requests_matching("PROPFIND", "/calendars/user/")[0];
    assert_eq!(listing.header("Depth"), Some("1"));
}

#[tokio::test]
async fn test_missing_properties_are_none_not_errors() {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = MockTransport::new();
    // a multistatus that simply lacks the asked-for property
    transport.stub(
        "PROPFIND",
        CAL_PATH,
        None,
        multistatus_response(&multistatus(&[prop_entry(CAL_PATH, "")], None)),
    );

    let client = make_client(Arc::clone(&transport));
    assert_eq!(client.get_ctag(&calendar_url()).await.unwrap(), None);
    assert_eq!(client.get_sync_token(&calendar_url()).await.unwrap(), None);
}

#[tokio::test]
async fn test_fetch_events_skips_unparseable_entries() {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = MockTransport::new();
    transport.stub(
        "REPORT",
        CAL_PATH,
        Some("calendar-query"),
        multistatus_response(&multistatus(
            &[
                event_entry(
                    &format!("{}good.ics", CAL_PATH),
                    "v-good",
                    &simple_ical("uid-good", "Fine", "20230401T080000Z"),
                ),
                event_entry(&format!("{}rotten.ics", CAL_PATH), "v-rot", "BEGIN:VCALENDAR\nJUNK"),
            ],
            None,
        )),
    );

    let client = make_client(Arc::clone(&transport));
    let events = client.fetch_events(&calendar_url(), None).await.unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].uid(), "uid-good");
    assert_eq!(events[0].etag.as_ref().unwrap().as_str(), "v-good");
    assert_eq!(events[0].href, "/calendars/user/main/good.ics");
}

#[tokio::test]
async fn test_fetch_events_time_range_bounds() {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = MockTransport::new();
    transport.stub(
        "REPORT",
        CAL_PATH,
        Some("calendar-query"),
        multistatus_response(&multistatus(&[], None)),
    );

    let client = make_client(Arc::clone(&transport));
    let (start, end) = utc_range();
    client.fetch_events(&calendar_url(), Some((start, end))).await.unwrap();

    let request = &transport.requests_matching("REPORT", CAL_PATH)[0];
    assert!(request.body.contains(r#"<C:time-range start="20230401T000000Z" end="20230501T000000Z"/>"#));
    assert!(request.body.contains("VEVENT"));
}

#[tokio::test]
async fn test_etag_only_query_requests_no_calendar_data() {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = MockTransport::new();
    transport.stub(
        "REPORT",
        CAL_PATH,
        Some("calendar-query"),
        multistatus_response(&multistatus(
            &[etag_entry(&format!("{}e1.ics", CAL_PATH), "v-1")],
            None,
        )),
    );

    let client = make_client(Arc::clone(&transport));
    let (start, end) = utc_range();
    let etags = client.fetch_etags_in_range(&calendar_url(), start, end).await.unwrap();

    assert_eq!(etags.len(), 1);
    assert_eq!(etags[0].etag.as_str(), "v-1");

    let request = &transport.requests_matching("REPORT", CAL_PATH)[0];
    assert!(!request.body.contains("calendar-data"));
    assert!(request.body.contains("getetag"));
}

#[tokio::test]
async fn test_multiget_empty_input_makes_no_network_call() {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = MockTransport::new();
    let client = make_client(Arc::clone(&transport));

    let events = client.fetch_events_by_href(&calendar_url(), &[]).await.unwrap();
    assert!(events.is_empty());
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_multiget_drops_404_entries() {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = MockTransport::new();
    let here = format!("{}here.ics", CAL_PATH);
    let vanished = format!("{}vanished.ics", CAL_PATH);
    transport.stub(
        "REPORT",
        CAL_PATH,
        Some("calendar-multiget"),
        multistatus_response(&multistatus(
            &[
                event_entry(&here, "v-here", &simple_ical("uid-here", "Here", "20230401T080000Z")),
                gone_entry(&vanished, 404),
            ],
            None,
        )),
    );

    let client = make_client(Arc::clone(&transport));
    let events = client
        .fetch_events_by_href(&calendar_url(), &[here.clone(), vanished.clone()])
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].href, here);
}

#[tokio::test]
async fn test_sync_collection_parses_all_three_entry_kinds() {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = MockTransport::new();
    let full = format!("{}full.ics", CAL_PATH);
    let bare = format!("{}bare.ics", CAL_PATH);
    let gone = format!("{}gone.ics", CAL_PATH);
    transport.stub(
        "REPORT",
        CAL_PATH,
        Some("sync-collection"),
        multistatus_response(&multistatus(
            &[
                event_entry(&full, "v-full", &simple_ical("uid-full", "Full", "20230401T080000Z")),
                etag_entry(&bare, "v-bare"),
                gone_entry(&gone, 404),
            ],
            Some("token-9"),
        )),
    );

    let client = make_client(Arc::clone(&transport));
    let result = client.sync_collection(&calendar_url(), "token-8").await.unwrap();

    assert_eq!(result.added.len(), 1);
    assert_eq!(result.added[0].uid(), "uid-full");
    assert_eq!(result.added_hrefs.len(), 1);
    assert_eq!(result.added_hrefs[0].href, bare);
    assert_eq!(result.deleted, vec![gone]);
    assert_eq!(result.new_sync_token.as_deref(), Some("token-9"));

    // the previous token was sent in the request body
    let request = &transport.requests_matching("REPORT", CAL_PATH)[0];
    assert!(request.body.contains("<D:sync-token>token-8</D:sync-token>"));
}

#[tokio::test]
async fn test_sync_collection_deduplicates_by_last_occurrence() {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = MockTransport::new();
    let e1 = format!("{}e1.ics", CAL_PATH);
    let e2 = format!("{}e2.ics", CAL_PATH);
    // iCloud has been seen emitting the same href twice in one report
    transport.stub(
        "REPORT",
        CAL_PATH,
        Some("sync-collection"),
        multistatus_response(&multistatus(
            &[etag_entry(&e1, "v-1"), etag_entry(&e2, "v-1"), etag_entry(&e1, "v-1")],
            Some("token-2"),
        )),
    );

    let client = make_icloud_client(Arc::clone(&transport));
    let result = client.sync_collection(&calendar_url(), "token-1").await.unwrap();

    assert_eq!(result.added_hrefs.len(), 2);
    let hrefs: Vec<&str> = result.added_hrefs.iter().map(|r| r.href.as_str()).collect();
    assert!(hrefs.contains(&e1.as_str()));
    assert!(hrefs.contains(&e2.as_str()));
}

#[tokio::test]
async fn test_sync_collection_expired_token_is_an_http_error() {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = MockTransport::new();
    transport.stub("REPORT", CAL_PATH, Some("sync-collection"), response(410, "gone"));

    let client = make_client(Arc::clone(&transport));
    let err = client.sync_collection(&calendar_url(), "stale").await.unwrap_err();
    assert!(err.is_token_expired());
}

#[tokio::test]
async fn test_create_event_uses_if_none_match() {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = MockTransport::new();
    transport.stub("PUT", &format!("{}uid-1.ics", CAL_PATH), None, put_created("v-new"));

    let client = make_client(Arc::clone(&transport));
    let event = test_event("uid-1", "Fresh", utc("2023-04-01 08:00:00"));
    let (href, etag) = client.create_event(&calendar_url(), &event).await.unwrap();

    assert_eq!(href, "/calendars/user/main/uid-1.ics");
    assert_eq!(etag.unwrap().as_str(), "v-new");

    let request = &transport.requests_matching("PUT", &href)[0];
    assert_eq!(request.header("If-None-Match"), Some("*"));
    assert!(request.header("If-Match").is_none());
    assert!(request.body.contains("UID:uid-1"));
    assert!(request.body.contains("SUMMARY:Fresh"));
}

#[tokio::test]
async fn test_create_conflict_means_resource_exists() {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = MockTransport::new();
    transport.stub("PUT", &format!("{}uid-1.ics", CAL_PATH), None, response(412, "exists"));

    let client = make_client(Arc::clone(&transport));
    let event = test_event("uid-1", "Fresh", utc("2023-04-01 08:00:00"));
    let err = client.create_event(&calendar_url(), &event).await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_path_traversal_uid_never_reaches_the_network() {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = MockTransport::new();
    let client = make_client(Arc::clone(&transport));

    let event = test_event("../../etc/passwd", "Evil", utc("2023-04-01 08:00:00"));
    let err = client.create_event(&calendar_url(), &event).await.unwrap_err();

    assert!(matches!(err, DavError::Argument { .. }));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_delete_event_sends_if_match() {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = MockTransport::new();
    let href = format!("{}uid-1.ics", CAL_PATH);
    transport.stub("DELETE", &href, None, no_content());

    let client = make_client(Arc::clone(&transport));
    client.delete_event(&href, Some(&Etag::from_wire("\"v-1\""))).await.unwrap();

    let request = &transport.requests_matching("DELETE", &href)[0];
    assert_eq!(request.header("If-Match"), Some("\"v-1\""));
}

#[tokio::test]
async fn test_oversized_response_is_refused() {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = MockTransport::new();
    let huge = "x".repeat(10 * 1024 * 1024 + 1);
    transport.stub("PROPFIND", CAL_PATH, None, response(207, &huge));

    let client = make_client(Arc::clone(&transport));
    let err = client.get_ctag(&calendar_url()).await.unwrap_err();
    match err {
        DavError::Http { code, message, .. } => {
            assert_eq!(code, 0);
            assert!(message.contains("too large"));
        }
        other => panic!("expected the size guard, got {:?}", other),
    }
}

#[tokio::test]
async fn test_icloud_default_namespace_response_parses() {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = MockTransport::new();
    // the whole tree in the default namespace, as iCloud serves it
    let body = format!(
        "<?xml version=\"1.0\"?>\n<multistatus xmlns=\"DAV:\" xmlns:cal=\"urn:ietf:params:xml:ns:caldav\">\n  <response>\n    <href>{}e1.ics</href>\n    <propstat>\n      <prop>\n        <getetag>\"v-icloud\"</getetag>\n        <cal:calendar-data>{}</cal:calendar-data>\n      </prop>\n      <status>HTTP/1.1 200 OK</status>\n    </propstat>\n  </response>\n</multistatus>",
        CAL_PATH,
        simple_ical("uid-1", "From iCloud", "20230401T080000Z"),
    );
    transport.stub("REPORT", CAL_PATH, Some("calendar-query"), response(207, &body));

    let client = make_icloud_client(Arc::clone(&transport));
    let events = client.fetch_events(&calendar_url(), None).await.unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].uid(), "uid-1");
    assert_eq!(events[0].etag.as_ref().unwrap().as_str(), "v-icloud");
}

#[tokio::test]
async fn test_genuine_cdata_section_parses_clean() {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = MockTransport::new();
    let href = format!("{}cdata.ics", CAL_PATH);
    // a well-formed CDATA section around the calendar data; the XML parser
    // consumes the delimiters before any quirk handling runs
    let wrapped = format!(
        "<![CDATA[{}]]>",
        simple_ical("uid-cdata", "Wrapped", "20230401T080000Z")
    );
    transport.stub(
        "REPORT",
        CAL_PATH,
        Some("calendar-query"),
        multistatus_response(&multistatus(&[event_entry(&href, "v-1", &wrapped)], None)),
    );

    let client = make_google_client(Arc::clone(&transport));
    let events = client.fetch_events(&calendar_url(), None).await.unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].uid(), "uid-cdata");
    assert_eq!(events[0].event.summary(), "Wrapped");
}

#[tokio::test]
async fn test_escaped_cdata_markers_need_the_google_quirk() {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = MockTransport::new();
    let href = format!("{}double.ics", CAL_PATH);
    // the double-wrapped shape: the markers are escaped as text, so they
    // survive XML decoding and land inside the property value
    let double_wrapped = format!(
        "&lt;![CDATA[{}]]&gt;",
        simple_ical("uid-double", "Double wrapped", "20230401T080000Z")
    );
    transport.stub(
        "REPORT",
        CAL_PATH,
        Some("calendar-query"),
        multistatus_response(&multistatus(&[event_entry(&href, "v-1", &double_wrapped)], None)),
    );

    // the strict profile leaves the markers in place, so the iCalendar parse
    // fails and the entry is skipped
    let strict = make_client(Arc::clone(&transport));
    let events = strict.fetch_events(&calendar_url(), None).await.unwrap();
    assert!(events.is_empty());

    // the google profile strips them and the event comes through
    let google = make_google_client(Arc::clone(&transport));
    let events = google.fetch_events(&calendar_url(), None).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].uid(), "uid-double");
    assert_eq!(events[0].event.summary(), "Double wrapped");
}

#[tokio::test]
async fn test_eventual_consistency_confirmation_retries() {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = MockTransport::new();
    let href = format!("{}uid-1.ics", CAL_PATH);
    // not visible on the first read, visible on the second
    transport.stub("PROPFIND", &href, None, response(404, "not yet"));
    transport.stub(
        "PROPFIND",
        &href,
        None,
        multistatus_response(&multistatus(
            &[prop_entry(&href, "<d:getetag>\"v-now\"</d:getetag>")],
            None,
        )),
    );

    let client = make_icloud_client(Arc::clone(&transport));
    let visible = client.confirm_visibility(&href).await.unwrap();

    assert!(visible);
    assert_eq!(transport.requests_matching("PROPFIND", &href).len(), 2);
}
