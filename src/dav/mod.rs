//! The WebDAV protocol adapter: request assembly and `multistatus` parsing.
//!
//! This layer is stateless. It knows how to speak the WebDAV verbs
//! (`PROPFIND`, `REPORT`, `PUT`, `DELETE`, `MKCALENDAR`) over an abstract
//! [`HttpTransport`] and how to decode the `multistatus` answers, but it knows
//! nothing about calendars: that is the client's business.

pub mod xml;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use minidom::Element;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use url::Url;

use crate::error::{DavError, DavResult};
use crate::quirks::{Auth, QuirkProfile};
use crate::resource::Etag;
use self::xml::{element_text, is_dav_element, parse_status_line};

/// Responses larger than this are refused outright rather than parsed
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

/// How many times a request is attempted before its failure is reported
const MAX_TRANSPORT_ATTEMPTS: u32 = 2;
/// Backoff bounds between transport attempts, in milliseconds
const RETRY_BACKOFF_MS: (u64, u64) = (500, 2000);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// An HTTP request, described independently of any HTTP library
#[derive(Clone, Debug)]
pub struct HttpRequest {
    /// The method verb, including WebDAV extension verbs (`PROPFIND`, `REPORT`...)
    pub method: String,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub auth: Auth,
}

impl HttpRequest {
    pub fn new(method: &str, url: Url, auth: Auth) -> Self {
        Self {
            method: method.to_string(),
            url,
            headers: Vec::new(),
            body: None,
            auth,
        }
    }

    pub fn header(mut self, name: &str, value: impl ToString) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }
}

/// An HTTP response: status, headers (lower-cased names), raw body
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body as UTF-8 text
    pub fn text(&self) -> DavResult<String> {
        String::from_utf8(self.body.clone())
            .map_err(|err| DavError::parse(format!("response body is not UTF-8: {}", err)))
    }
}

/// The transport contract the adapter runs on.
///
/// Implementations own connection pooling, redirects and transient-failure
/// retries; the adapter only ever sees the terminal outcome of a request.
/// Implementations must preserve `Authorization` across same-host redirects.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> DavResult<HttpResponse>;
}

/// The default transport, backed by a pooled [`reqwest::Client`].
///
/// Retries transient faults (network errors and 5xx) with a bounded backoff
/// before reporting the terminal outcome.
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> DavResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(READ_TIMEOUT)
            .build()
            .map_err(|err| DavError::network(format!("unable to build HTTP client: {}", err)))?;
        Ok(Self { http })
    }

    async fn attempt(&self, request: &HttpRequest) -> DavResult<HttpResponse> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|err| DavError::argument(format!("invalid HTTP method {}: {}", request.method, err)))?;

        let mut builder = self.http.request(method, request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.auth {
            Auth::None => builder,
            Auth::Basic { username, password } => builder.basic_auth(username, Some(password)),
            Auth::Bearer { token } => builder.bearer_auth(token),
        };
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
            }
        }
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse { status, headers, body })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> DavResult<HttpResponse> {
        let mut last_failure = None;

        for attempt in 0..MAX_TRANSPORT_ATTEMPTS {
            if attempt > 0 {
                let backoff = (RETRY_BACKOFF_MS.0 * (1 << attempt)).min(RETRY_BACKOFF_MS.1);
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            match self.attempt(&request).await {
                Ok(response) if response.status >= 500 => {
                    log::debug!("{} {} answered {}, will retry", request.method, request.url, response.status);
                    last_failure = Some(Ok(response));
                }
                Err(err @ DavError::Network { .. }) => {
                    log::debug!("{} {} failed ({}), will retry", request.method, request.url, err);
                    last_failure = Some(Err(err));
                }
                outcome => return outcome,
            }
        }

        match last_failure {
            Some(outcome) => outcome,
            None => Err(DavError::network("no attempt was made")),
        }
    }
}

/// One `propstat` block: a status code and the property elements it covers
#[derive(Clone, Debug)]
pub struct PropStat {
    pub status: u16,
    pub props: Vec<Element>,
}

impl PropStat {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One `response` element of a `multistatus` body
#[derive(Clone, Debug)]
pub struct DavResponse {
    pub href: String,
    /// A resource-level status, present on tombstone entries (404/410)
    pub status: Option<u16>,
    pub propstats: Vec<PropStat>,
}

impl DavResponse {
    /// Look a property up by local name among the successful propstats
    pub fn prop(&self, name: &str) -> Option<&Element> {
        self.propstats
            .iter()
            .filter(|ps| ps.is_ok())
            .flat_map(|ps| ps.props.iter())
            .find(|el| el.name() == name)
    }

    /// The normalized text of a successful property
    pub fn prop_text(&self, name: &str, quirks: &QuirkProfile) -> Option<String> {
        self.prop(name).map(|el| element_text(el, quirks)).filter(|text| !text.is_empty())
    }

    /// The resource ETag, unquoted per the quirk profile
    pub fn etag(&self, quirks: &QuirkProfile) -> Option<Etag> {
        self.prop_text("getetag", quirks).map(|raw| etag_from_wire(&raw, quirks))
    }

    /// Whether the server flagged this entry as gone (a resource-level 404 or 410)
    pub fn is_gone(&self) -> bool {
        matches!(self.status, Some(404) | Some(410))
    }
}

/// A parsed `multistatus` response
#[derive(Clone, Debug, Default)]
pub struct Multistatus {
    pub responses: Vec<DavResponse>,
    /// The root-level sync token of an RFC 6578 sync-collection report
    pub sync_token: Option<String>,
}

/// Build an [`Etag`] from a wire value, honoring the quote-stripping quirk
pub fn etag_from_wire(raw: &str, quirks: &QuirkProfile) -> Etag {
    if quirks.strip_etag_quotes {
        Etag::from_wire(raw)
    } else {
        Etag::raw(raw)
    }
}

/// Parse a `multistatus` body.
///
/// Namespace handling is tolerant per the quirk profile: element lookup goes by
/// local name, with the `DAV:` namespace only enforced for strict profiles.
pub fn parse_multistatus(text: &str, quirks: &QuirkProfile) -> DavResult<Multistatus> {
    let root: Element = text
        .parse()
        .map_err(|err| DavError::parse(format!("invalid multistatus XML: {}", err)))?;

    if !is_dav_element(&root, "multistatus", quirks) {
        return Err(DavError::parse(format!(
            "expected a multistatus root element, got <{}>",
            root.name()
        )));
    }

    let mut responses = Vec::new();
    for response_el in root.children().filter(|el| is_dav_element(el, "response", quirks)) {
        let href = match xml::first_named(response_el, "href") {
            Some(el) => element_text(el, quirks),
            None => {
                log::warn!("multistatus response without an href, skipping it");
                continue;
            }
        };

        // A status element directly under <response> marks the whole resource
        let status = response_el
            .children()
            .find(|el| is_dav_element(el, "status", quirks))
            .and_then(|el| parse_status_line(&el.text()));

        let mut propstats = Vec::new();
        for propstat_el in response_el.children().filter(|el| is_dav_element(el, "propstat", quirks)) {
            let ps_status = propstat_el
                .children()
                .find(|el| is_dav_element(el, "status", quirks))
                .and_then(|el| parse_status_line(&el.text()))
                .unwrap_or(200);

            let props = match propstat_el.children().find(|el| is_dav_element(el, "prop", quirks)) {
                Some(prop_el) => prop_el.children().cloned().collect(),
                None => Vec::new(),
            };

            propstats.push(PropStat { status: ps_status, props });
        }

        responses.push(DavResponse { href, status, propstats });
    }

    let sync_token = root
        .children()
        .find(|el| is_dav_element(el, "sync-token", quirks))
        .map(|el| element_text(el, quirks))
        .filter(|token| !token.is_empty());

    Ok(Multistatus { responses, sync_token })
}

/// The stateless WebDAV request/response engine
pub struct DavAdapter {
    transport: Arc<dyn HttpTransport>,
}

impl DavAdapter {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    async fn execute_checked(&self, request: HttpRequest) -> DavResult<HttpResponse> {
        let response = self.transport.execute(request).await?;
        if response.body.len() > MAX_RESPONSE_SIZE {
            return Err(DavError::http(0, "response too large"));
        }
        Ok(response)
    }

    async fn request_multistatus(
        &self,
        method: &str,
        url: &Url,
        depth: u32,
        body: String,
        quirks: &QuirkProfile,
    ) -> DavResult<Multistatus> {
        let request = HttpRequest::new(method, url.clone(), quirks.auth.clone())
            .header("Depth", depth)
            .header(CONTENT_TYPE.as_str(), "application/xml; charset=utf-8")
            .body(body);

        let response = self.execute_checked(request).await?;
        if !response.is_success() {
            return Err(http_error(&response, method));
        }

        parse_multistatus(&response.text()?, quirks)
    }

    /// Issue a `PROPFIND` and parse its `multistatus` answer
    pub async fn propfind(
        &self,
        url: &Url,
        depth: u32,
        body: String,
        quirks: &QuirkProfile,
    ) -> DavResult<Multistatus> {
        self.request_multistatus("PROPFIND", url, depth, body, quirks).await
    }

    /// Issue a `REPORT` and parse its `multistatus` answer
    pub async fn report(
        &self,
        url: &Url,
        depth: u32,
        body: String,
        quirks: &QuirkProfile,
    ) -> DavResult<Multistatus> {
        self.request_multistatus("REPORT", url, depth, body, quirks).await
    }

    /// `PUT` a resource body, with optional ETag preconditions.
    ///
    /// `if_match` asserts the resource still has that version; `if_none_match_any`
    /// asserts the resource does not exist yet. Returns the new ETag when the
    /// server provides one (not all do).
    pub async fn put(
        &self,
        url: &Url,
        body: String,
        content_type: &str,
        if_match: Option<&Etag>,
        if_none_match_any: bool,
        quirks: &QuirkProfile,
    ) -> DavResult<Option<Etag>> {
        let mut request = HttpRequest::new("PUT", url.clone(), quirks.auth.clone())
            .header(CONTENT_TYPE.as_str(), content_type)
            .body(body);
        if let Some(etag) = if_match {
            request = request.header("If-Match", etag.to_header_value());
        }
        if if_none_match_any {
            request = request.header("If-None-Match", "*");
        }

        let response = self.execute_checked(request).await?;
        if !response.is_success() {
            return Err(http_error(&response, "PUT"));
        }

        Ok(response.header("etag").map(|raw| etag_from_wire(raw, quirks)))
    }

    /// `DELETE` a resource, optionally guarded by an ETag precondition
    pub async fn delete(
        &self,
        url: &Url,
        if_match: Option<&Etag>,
        quirks: &QuirkProfile,
    ) -> DavResult<()> {
        let mut request = HttpRequest::new("DELETE", url.clone(), quirks.auth.clone());
        if let Some(etag) = if_match {
            request = request.header("If-Match", etag.to_header_value());
        }

        let response = self.execute_checked(request).await?;
        if !response.is_success() {
            return Err(http_error(&response, "DELETE"));
        }
        Ok(())
    }

    /// Create a calendar collection with `MKCALENDAR`
    pub async fn mkcalendar(
        &self,
        url: &Url,
        display_name: &str,
        description: Option<&str>,
        quirks: &QuirkProfile,
    ) -> DavResult<()> {
        let description_fragment = match description {
            Some(text) => format!(
                "<C:calendar-description>{}</C:calendar-description>",
                xml::escape_xml(text)
            ),
            None => String::new(),
        };
        let body = format!(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<C:mkcalendar xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:set>
    <D:prop>
      <D:displayname>{}</D:displayname>
      {}
    </D:prop>
  </D:set>
</C:mkcalendar>"#,
            xml::escape_xml(display_name),
            description_fragment,
        );

        let request = HttpRequest::new("MKCALENDAR", url.clone(), quirks.auth.clone())
            .header(CONTENT_TYPE.as_str(), "application/xml; charset=utf-8")
            .body(body);

        let response = self.execute_checked(request).await?;
        if !response.is_success() {
            return Err(http_error(&response, "MKCALENDAR"));
        }
        Ok(())
    }
}

fn http_error(response: &HttpResponse, method: &str) -> DavError {
    let body = response.text().ok().filter(|text| !text.is_empty());
    DavError::Http {
        code: response.status,
        message: format!("{} answered {}", method, response.status),
        body,
    }
}
