//! XML helpers shared by the protocol adapter and the client

use minidom::Element;

use crate::quirks::QuirkProfile;

/// The `DAV:` namespace
pub const NS_DAV: &str = "DAV:";
/// The CalDAV namespace (prefix `C` in request bodies)
pub const NS_CALDAV: &str = "urn:ietf:params:xml:ns:caldav";
/// The CalendarServer extensions namespace (prefix `CS` in request bodies)
pub const NS_CALENDARSERVER: &str = "http://calendarserver.org/ns/";
/// The Apple iCal extensions namespace (calendar-color)
pub const NS_APPLE_ICAL: &str = "http://apple.com/ns/ical/";

/// Depth-first, document-order traversal of an element tree, root included.
///
/// Multistatus bodies nest properties at unpredictable depths (servers differ
/// on where they put `href`s, for one), so lookups walk the whole subtree
/// instead of assuming a shape.
pub struct Descendants<'a> {
    pending: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.pending.pop()?;
        let tail = self.pending.len();
        self.pending.extend(current.children());
        // children land on the stack first-to-last; flip them so popping
        // keeps document order
        self.pending[tail..].reverse();
        Some(current)
    }
}

/// Iterate over `root` and everything below it
pub fn descendants(root: &Element) -> Descendants<'_> {
    Descendants { pending: vec![root] }
}

/// Every element in the tree with the given local name, in document order
pub fn all_named<'a>(root: &'a Element, name: &str) -> Vec<&'a Element> {
    descendants(root).filter(|el| el.name() == name).collect()
}

/// The first element in the tree with the given local name
pub fn first_named<'a>(root: &'a Element, name: &str) -> Option<&'a Element> {
    descendants(root).find(|el| el.name() == name)
}

/// Whether this element belongs to the `DAV:` namespace, modulo the iCloud
/// default-namespace quirk
pub fn is_dav_element(el: &Element, name: &str, quirks: &QuirkProfile) -> bool {
    el.name() == name && (quirks.tolerate_default_dav_namespace || el.ns().as_deref() == Some(NS_DAV))
}

/// Extract the text of an element the way servers mean it: CDATA markers
/// unwrapped (when the profile says so) and surrounding whitespace removed
pub fn element_text(el: &Element, quirks: &QuirkProfile) -> String {
    normalize_text(&el.text(), quirks)
}

/// Normalize a text leaf: trim surrounding whitespace and, when the quirk
/// profile asks for it, strip `<![CDATA[...]]>` markers that survived XML
/// decoding.
///
/// A well-formed CDATA section never reaches this function: the XML parser
/// consumes its delimiters, so `raw` is already the inner text. The quirk
/// targets endpoints that escape the markers as text (`&lt;![CDATA[...]]&gt;`)
/// around property values; after decoding, such a value literally starts with
/// the marker and would poison the downstream iCalendar parse.
pub fn normalize_text(raw: &str, quirks: &QuirkProfile) -> String {
    let trimmed = raw.trim();
    if quirks.unwrap_cdata {
        if let Some(inner) = trimmed
            .strip_prefix("<![CDATA[")
            .and_then(|rest| rest.strip_suffix("]]>"))
        {
            return inner.to_string();
        }
    }
    trimmed.to_string()
}

/// Parse an HTTP status line (`HTTP/1.1 404 Not Found`) into its status code
pub fn parse_status_line(line: &str) -> Option<u16> {
    line.split_whitespace().nth(1)?.parse().ok()
}

/// Escape a string for inclusion in an XML text node or attribute value
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::quirks::{Auth, QuirkProfile};

    const SAMPLE: &str = r#"
        <d:multistatus xmlns:d="DAV:" xmlns:cal="urn:ietf:params:xml:ns:caldav">
            <d:response>
                <d:href>/calendars/user/main/event1.ics</d:href>
                <d:propstat>
                    <d:prop><d:getetag>"v1"</d:getetag></d:prop>
                    <d:status>HTTP/1.1 200 OK</d:status>
                </d:propstat>
            </d:response>
            <d:response>
                <d:href>/calendars/user/main/event2.ics</d:href>
            </d:response>
        </d:multistatus>
    "#;

    #[test]
    fn test_tree_lookups() {
        let root: Element = SAMPLE.parse().unwrap();
        assert_eq!(all_named(&root, "response").len(), 2);
        assert_eq!(all_named(&root, "href").len(), 2);
        assert_eq!(all_named(&root, "getetag").len(), 1);
        assert!(first_named(&root, "status").is_some());
        assert!(first_named(&root, "nonexistent").is_none());
        // the walk includes the root itself
        assert!(first_named(&root, "multistatus").is_some());
    }

    #[test]
    fn test_descendants_walk_document_order() {
        let root: Element = SAMPLE.parse().unwrap();
        let hrefs: Vec<String> =
            all_named(&root, "href").iter().map(|el| el.text()).collect();
        assert_eq!(
            hrefs,
            vec![
                "/calendars/user/main/event1.ics".to_string(),
                "/calendars/user/main/event2.ics".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_status_line() {
        assert_eq!(parse_status_line("HTTP/1.1 200 OK"), Some(200));
        assert_eq!(parse_status_line("HTTP/1.1 404 Not Found"), Some(404));
        assert_eq!(parse_status_line("garbage"), None);
    }

    #[test]
    fn test_cdata_unwrapping() {
        let tolerant = QuirkProfile::google(Auth::None);
        let strict = QuirkProfile::rfc_strict(Auth::None);

        // the decoded shape of a double-wrapped value: the server escaped the
        // markers, so they survive XML parsing as literal text
        assert_eq!(normalize_text("<![CDATA[Some text]]>", &tolerant), "Some text");
        assert_eq!(normalize_text("<![CDATA[Some text]]>", &strict), "<![CDATA[Some text]]>");
        assert_eq!(normalize_text("  padded  ", &tolerant), "padded");
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a < b & c > \"d\""), "a &lt; b &amp; c &gt; &quot;d&quot;");
        assert_eq!(escape_xml("plain"), "plain");
    }
}
