//! Wire-level addressing values: hrefs and version tags

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::event::Event;

/// An opaque per-resource version tag, as returned by the server in `getetag`
/// and in `ETag` headers.
///
/// Servers quote their ETags on the wire (`"abcd-12"`); some quirky servers
/// occasionally double-quote them. Construction via [`Etag::from_wire`] strips the
/// enclosing quotes so that comparisons are consistent no matter where the tag came from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Etag {
    tag: String,
}

impl Etag {
    /// Build an ETag from a wire value, stripping enclosing double quotes
    pub fn from_wire(raw: &str) -> Self {
        let mut tag = raw.trim();
        while tag.len() >= 2 && tag.starts_with('"') && tag.ends_with('"') {
            tag = &tag[1..tag.len() - 1];
        }
        Self { tag: tag.to_string() }
    }

    /// Keep a wire value untouched, quotes and all.
    /// Only useful with quirk profiles that disable quote stripping
    pub fn raw(raw: &str) -> Self {
        Self { tag: raw.trim().to_string() }
    }

    pub fn as_str(&self) -> &str {
        &self.tag
    }

    /// The value to send back in `If-Match` headers (re-quoted)
    pub fn to_header_value(&self) -> String {
        format!("\"{}\"", self.tag)
    }
}

impl From<String> for Etag {
    fn from(tag: String) -> Self {
        Self::from_wire(&tag)
    }
}

impl Display for Etag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag)
    }
}

/// A server resource address together with the version we last saw for it.
///
/// Equality is by `href` only: two `ResourceHref`s naming the same resource are
/// the same resource, whatever their version.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceHref {
    pub href: String,
    pub etag: Option<Etag>,
}

impl ResourceHref {
    pub fn new(href: String, etag: Option<Etag>) -> Self {
        Self { href, etag }
    }
}

impl PartialEq for ResourceHref {
    fn eq(&self, other: &Self) -> bool {
        self.href == other.href
    }
}
impl Eq for ResourceHref {}

impl std::hash::Hash for ResourceHref {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.href.hash(state);
    }
}

/// An `(href, etag)` pair from an ETag-only calendar-query
#[derive(Clone, Debug, PartialEq)]
pub struct EtagInfo {
    pub href: String,
    pub etag: Etag,
}

/// A fully materialized event together with its server address.
///
/// The `href` is authoritative for addressing the resource; the `uid` inside
/// the event is authoritative for identity. Both survive round-trips.
#[derive(Clone, Debug, PartialEq)]
pub struct EventWithMetadata {
    pub href: String,
    pub etag: Option<Etag>,
    pub event: Event,
}

impl EventWithMetadata {
    pub fn new(href: String, etag: Option<Etag>, event: Event) -> Self {
        Self { href, etag, event }
    }

    pub fn uid(&self) -> &str {
        self.event.uid()
    }
}
