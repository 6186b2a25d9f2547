//!
//! bookshelf classification client
//! -------------------------------
//! Talks to an OCLC-Classify-style bibliographic service. Two calls are made,
//! both a single GET with `summary=true`:
//!
//! - `title=<q>` returns a `<works>` list of candidate works;
//! - `owi=<id>` returns one `<work>` plus DDC recommendations, from which the
//!   `mostPopular/@sfa` code is taken as the book's classification.
//!
//! Responses are tag/attribute XML. Element and attribute names are matched on
//! their local part, so the service's default namespace does not matter.
//! There is no retry and no caching; every call is a fresh round trip bounded
//! by the configured timeout.

use std::collections::HashMap;
use std::time::Duration;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LookupError;

/// Response code the service uses for "unexpected error" and above.
const SERVICE_ERROR_CODE: u32 = 200;

/// One candidate work from a title search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub author: String,
    #[serde(rename = "year")]
    pub publication_year: String,
    #[serde(rename = "id")]
    pub external_id: String,
}

/// A single work resolved by identifier, with its best-match classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRecord {
    pub title: String,
    pub author: String,
    #[serde(rename = "id")]
    pub external_id: String,
    pub classification: String,
}

#[derive(Clone)]
pub struct ClassifyClient {
    http: reqwest::Client,
    endpoint: String,
}

impl ClassifyClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("bookshelf/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| LookupError::Unavailable(e.to_string()))?;
        Ok(Self { http, endpoint: endpoint.into() })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Candidate works for a free-text title. No matches is an empty Vec.
    pub async fn search_by_title(&self, query: &str) -> Result<Vec<SearchResult>, LookupError> {
        let body = self.fetch("title", query).await?;
        parse_search(&body)
    }

    pub async fn lookup_by_identifier(&self, id: &str) -> Result<WorkRecord, LookupError> {
        let body = self.fetch("owi", id).await?;
        parse_work(&body, id)
    }

    async fn fetch(&self, param: &str, value: &str) -> Result<String, LookupError> {
        let sep = if self.endpoint.contains('?') { '&' } else { '?' };
        let url = format!("{}{}summary=true&{}={}", self.endpoint, sep, param, urlencoding::encode(value));
        debug!(%url, "classify request");
        let resp = self.http.get(&url).send().await.map_err(|e| {
            warn!(error = %e, "classify request failed");
            LookupError::Unavailable(e.to_string())
        })?;
        let status = resp.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "classify returned non-success status");
            return Err(LookupError::Unavailable(format!("HTTP {}", status.as_u16())));
        }
        resp.text().await.map_err(|e| LookupError::Unavailable(e.to_string()))
    }
}

/// An element of the response with its ancestry, e.g. `["classify", "works", "work"]`.
#[derive(Debug)]
struct Element {
    path: Vec<String>,
    attrs: HashMap<String, String>,
}

impl Element {
    fn is(&self, path: &[&str]) -> bool {
        // Root name is not checked.
        self.path.len() == path.len() + 1 && self.path[1..].iter().zip(path).all(|(a, b)| a == b)
    }

    fn attr(&self, name: &str) -> String {
        self.attrs.get(name).cloned().unwrap_or_default()
    }
}

fn local(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

fn read_element(start: &BytesStart<'_>, stack: &[String]) -> Result<Element, LookupError> {
    let mut attrs = HashMap::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| LookupError::Malformed(e.to_string()))?;
        let value = attr.unescape_value().map_err(|e| LookupError::Malformed(e.to_string()))?;
        attrs.insert(local(attr.key.local_name().as_ref()), value.into_owned());
    }
    let mut path = stack.to_vec();
    path.push(local(start.local_name().as_ref()));
    Ok(Element { path, attrs })
}

/// Flatten a document into its elements in document order.
fn elements(xml: &str) -> Result<Vec<Element>, LookupError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut stack: Vec<String> = Vec::new();
    let mut out = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let el = read_element(&e, &stack)?;
                stack = el.path.clone();
                out.push(el);
            }
            Ok(Event::Empty(e)) => out.push(read_element(&e, &stack)?),
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(LookupError::Malformed(e.to_string())),
        }
    }
    if out.is_empty() {
        return Err(LookupError::Malformed("document has no root element".into()));
    }
    if !stack.is_empty() {
        return Err(LookupError::Malformed(format!("unclosed element <{}>", stack.join("/"))));
    }
    Ok(out)
}

fn response_code(els: &[Element]) -> Option<u32> {
    els.iter().find(|e| e.is(&["response"])).and_then(|e| e.attrs.get("code")?.parse().ok())
}

fn check_service_error(els: &[Element]) -> Result<(), LookupError> {
    match response_code(els) {
        Some(code) if code >= SERVICE_ERROR_CODE => {
            Err(LookupError::Unavailable(format!("service reported error code {code}")))
        }
        _ => Ok(()),
    }
}

pub(crate) fn parse_search(xml: &str) -> Result<Vec<SearchResult>, LookupError> {
    let els = elements(xml)?;
    check_service_error(&els)?;
    Ok(els
        .iter()
        .filter(|e| e.is(&["works", "work"]))
        .map(|e| SearchResult {
            title: e.attr("title"),
            author: e.attr("author"),
            publication_year: e.attr("hyr"),
            external_id: e.attr("owi"),
        })
        .collect())
}

pub(crate) fn parse_work(xml: &str, requested: &str) -> Result<WorkRecord, LookupError> {
    let els = elements(xml)?;
    check_service_error(&els)?;
    let work = els
        .iter()
        .find(|e| e.is(&["work"]))
        .ok_or_else(|| LookupError::NotFound(requested.to_string()))?;
    let classification = els
        .iter()
        .find(|e| e.is(&["recommendations", "ddc", "mostPopular"]))
        .map(|e| e.attr("sfa"))
        .unwrap_or_default();
    Ok(WorkRecord {
        title: work.attr("title"),
        author: work.attr("author"),
        external_id: work.attr("owi"),
        classification,
    })
}
