//! Metadata lookup by identifier
//!
//! Used when a PDF carries no usable document info. A DOI is resolved
//! through the CrossRef works API, an arXiv id through the arXiv export
//! API (Atom feed).

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::metadata::MetadataRecord;

const CROSSREF_WORKS_URL: &str = "https://api.crossref.org/works";
const ARXIV_QUERY_URL: &str = "https://export.arxiv.org/api/query";
const ARXIV_JOURNAL: &str = "arXiv";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    Doi,
    Arxiv,
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn lookup(&self, kind: IdentifierKind, identifier: &str) -> AppResult<MetadataRecord>;
}

/// CrossRef and arXiv over HTTP.
pub struct RemoteLookup {
    client: Client,
    crossref_url: String,
    arxiv_url: String,
}

impl RemoteLookup {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            crossref_url: CROSSREF_WORKS_URL.to_string(),
            arxiv_url: ARXIV_QUERY_URL.to_string(),
        }
    }

    /// Point both lookups at other base URLs.
    pub fn with_endpoints(mut self, crossref_url: &str, arxiv_url: &str) -> Self {
        self.crossref_url = crossref_url.trim_end_matches('/').to_string();
        self.arxiv_url = arxiv_url.to_string();
        self
    }

    async fn get(&self, request: reqwest::RequestBuilder) -> AppResult<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| AppError::Lookup(format!("Request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(AppError::Lookup(format!("HTTP {}", response.status())));
        }
        Ok(response)
    }

    async fn crossref(&self, doi: &str) -> AppResult<MetadataRecord> {
        let url = format!("{}/{}", self.crossref_url, doi);
        let response = self.get(self.client.get(url)).await?;
        let body: CrossRefResponse = response
            .json()
            .await
            .map_err(|e| AppError::Lookup(format!("Failed to parse CrossRef response: {}", e)))?;
        Ok(record_from_crossref(body.message))
    }

    async fn arxiv(&self, id: &str) -> AppResult<MetadataRecord> {
        let request = self.client.get(&self.arxiv_url).query(&[("id_list", id)]);
        let feed = self
            .get(request)
            .await?
            .text()
            .await
            .map_err(|e| AppError::Lookup(format!("Failed to read arXiv response: {}", e)))?;
        record_from_atom(&feed)
    }
}

#[async_trait]
impl MetadataSource for RemoteLookup {
    async fn lookup(&self, kind: IdentifierKind, identifier: &str) -> AppResult<MetadataRecord> {
        log::info!("Looking up {:?} {}", kind, identifier);
        let record = match kind {
            IdentifierKind::Doi => self.crossref(identifier).await?,
            IdentifierKind::Arxiv => self.arxiv(identifier).await?,
        };
        if record.is_empty() {
            return Err(AppError::ExtractionEmpty);
        }
        Ok(record)
    }
}

#[derive(Debug, Deserialize)]
struct CrossRefResponse {
    message: CrossRefWork,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CrossRefWork {
    title: Vec<String>,
    author: Vec<CrossRefAuthor>,
    #[serde(rename = "container-title")]
    container_title: Vec<String>,
    subject: Vec<String>,
    issued: Option<CrossRefDate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CrossRefAuthor {
    given: Option<String>,
    family: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CrossRefDate {
    #[serde(rename = "date-parts")]
    date_parts: Vec<Vec<Option<i64>>>,
}

fn record_from_crossref(work: CrossRefWork) -> MetadataRecord {
    let authors: Vec<String> = work
        .author
        .into_iter()
        .filter_map(|a| {
            let full = match (a.given, a.family) {
                (Some(given), Some(family)) => format!("{} {}", given.trim(), family.trim()),
                (given, family) => given.or(family).or(a.name).unwrap_or_default(),
            };
            let full = full.trim().to_string();
            (!full.is_empty()).then_some(full)
        })
        .collect();

    let year = work
        .issued
        .and_then(|d| d.date_parts.into_iter().next())
        .and_then(|parts| parts.into_iter().next().flatten())
        .map(|y| y.to_string())
        .unwrap_or_default();

    MetadataRecord {
        title: first_trimmed(work.title),
        authors: authors.join(", "),
        year,
        journal: first_trimmed(work.container_title),
        keywords: work.subject.join(", "),
    }
}

fn first_trimmed(values: Vec<String>) -> String {
    values
        .into_iter()
        .next()
        .map(|v| collapse_whitespace(&v))
        .unwrap_or_default()
}

struct AtomPatterns {
    entry: Regex,
    id: Regex,
    title: Regex,
    author: Regex,
    published: Regex,
    category: Regex,
}

fn atom_patterns() -> &'static AtomPatterns {
    static PATTERNS: OnceLock<AtomPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| AtomPatterns {
        entry: Regex::new(r"(?s)<entry>(.*?)</entry>").expect("valid entry pattern"),
        id: Regex::new(r"(?s)<id>(.*?)</id>").expect("valid id pattern"),
        title: Regex::new(r"(?s)<title[^>]*>(.*?)</title>").expect("valid title pattern"),
        author: Regex::new(r"(?s)<author>\s*<name>(.*?)</name>").expect("valid author pattern"),
        published: Regex::new(r"<published>\s*(\d{4})").expect("valid published pattern"),
        category: Regex::new(r#"<category[^>]*\bterm="([^"]+)""#).expect("valid category pattern"),
    })
}

/// First entry of an arXiv Atom feed. arXiv reports unknown ids as an
/// entry whose id points at its errors page.
fn record_from_atom(feed: &str) -> AppResult<MetadataRecord> {
    let patterns = atom_patterns();
    let entry = patterns
        .entry
        .captures(feed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| AppError::Lookup("arXiv returned no entry".to_string()))?;

    let capture = |re: &Regex| {
        re.captures(entry)
            .and_then(|c| c.get(1))
            .map(|m| collapse_whitespace(&unescape_xml(m.as_str())))
            .unwrap_or_default()
    };

    if capture(&patterns.id).contains("/api/errors") {
        return Err(AppError::Lookup(format!(
            "arXiv rejected the id: {}",
            capture(&patterns.title)
        )));
    }

    let authors: Vec<String> = patterns
        .author
        .captures_iter(entry)
        .map(|c| collapse_whitespace(&unescape_xml(&c[1])))
        .collect();
    let categories: Vec<String> = patterns
        .category
        .captures_iter(entry)
        .map(|c| c[1].to_string())
        .collect();

    Ok(MetadataRecord {
        title: capture(&patterns.title),
        authors: authors.join(", "),
        year: capture(&patterns.published),
        journal: ARXIV_JOURNAL.to_string(),
        keywords: categories.join(", "),
    })
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
