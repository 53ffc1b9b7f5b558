//! Comics catalog extractor
//!
//! Queries a ComicVine-style search API for the issue matching a comic
//! archive. The query is `Series Volume` when an earlier extractor found a
//! series, otherwise the title.
//!
//! Response contract (first result wins):
//! `{"results": [{"name", "issue_number", "description", "deck", "cover_date",
//!   "volume": {"name", "publisher": {"name"}}, "publisher": {"name"},
//!   "person_credits": [{"name", "role"}]}]}`

use super::http::{CatalogHttp, CatalogOptions, CatalogResponse};
use super::strip_markup;
use crate::types::{
    raw_keys, ExtractContext, ExtractedMetadata, ExtractionError, FileInfo, MetadataExtractor,
};
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Comic archive extensions
pub const COMIC_EXTENSIONS: &[&str] = &["cbz", "cbr", "cb7", "cbt"];

const SERVICE: &str = "comic_catalog";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Issue>,
}

#[derive(Debug, Default, Deserialize)]
struct Issue {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    issue_number: Option<String>,
    #[serde(default)]
    description: Option<String>,
    /// Short blurb, used when description is missing
    #[serde(default)]
    deck: Option<String>,
    #[serde(default)]
    cover_date: Option<String>,
    #[serde(default)]
    volume: Option<Volume>,
    #[serde(default)]
    publisher: Option<Named>,
    #[serde(default)]
    person_credits: Vec<Credit>,
}

#[derive(Debug, Deserialize)]
struct Volume {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    publisher: Option<Named>,
}

#[derive(Debug, Deserialize)]
struct Named {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Credit {
    name: String,
    #[serde(default)]
    role: String,
}

/// Comics catalog lookup extractor
pub struct ComicCatalogClient {
    http: CatalogHttp,
    base_url: String,
    api_key: Option<String>,
}

impl ComicCatalogClient {
    pub fn with_options(options: CatalogOptions) -> reqwest::Result<Self> {
        Ok(Self {
            http: CatalogHttp::new(SERVICE, &options)?,
            base_url: options.base_url,
            api_key: options.api_key,
        })
    }

    /// Client with a default timeout
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> reqwest::Result<Self> {
        Self::with_options(
            CatalogOptions::new(base_url, Duration::from_secs(10)).with_api_key(api_key),
        )
    }
}

fn search_query(known: &ExtractedMetadata) -> Option<String> {
    match known.raw_value(raw_keys::SERIES) {
        Some(series) => Some(match known.raw_value(raw_keys::VOLUME) {
            Some(volume) => format!("{} {}", series, volume),
            None => series.to_string(),
        }),
        None if known.has_title() => Some(known.title.trim().to_string()),
        None => None,
    }
}

fn issue_to_metadata(issue: Issue) -> ExtractedMetadata {
    let mut metadata = ExtractedMetadata::new();

    if let Some(name) = issue.name {
        metadata.title = name.trim().to_string();
    }
    if let Some(text) = issue.description.or(issue.deck) {
        metadata.description = strip_markup(&text);
    }
    if let Some(number) = issue.issue_number {
        metadata.set_raw(raw_keys::VOLUME, number);
    }

    let mut publisher = issue.publisher.and_then(|p| p.name);
    if let Some(volume) = issue.volume {
        if let Some(series) = volume.name {
            metadata.set_raw(raw_keys::SERIES, series);
        }
        publisher = publisher.or_else(|| volume.publisher.and_then(|p| p.name));
    }
    if let Some(publisher) = publisher {
        metadata.set_raw(raw_keys::PUBLISHER, publisher);
    }

    let writer = issue
        .person_credits
        .into_iter()
        .find(|c| c.role.to_lowercase().split(',').any(|r| r.trim() == "writer"));
    if let Some(writer) = writer {
        metadata.set_raw(raw_keys::AUTHOR, writer.name);
    }

    metadata.created_at = issue
        .cover_date
        .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive));

    metadata
}

#[async_trait]
impl MetadataExtractor for ComicCatalogClient {
    fn name(&self) -> &'static str {
        SERVICE
    }

    fn can_extract(&self, file: &FileInfo) -> bool {
        file.has_extension(COMIC_EXTENSIONS)
    }

    async fn extract(
        &self,
        file: &FileInfo,
        known: &ExtractedMetadata,
        ctx: &ExtractContext,
    ) -> Result<ExtractedMetadata, ExtractionError> {
        let query = search_query(known).ok_or_else(|| ExtractionError::NotAvailable {
            path: file.path.clone(),
            extractor: SERVICE,
            reason: "no series or title to look up".to_string(),
        })?;
        debug!(query = %query, "Querying comics catalog");

        let url = format!("{}/search/", self.base_url);
        let mut request = self.http.client().get(&url).query(&[
            ("query", query.as_str()),
            ("resources", "issue"),
            ("format", "json"),
            ("limit", "1"),
        ]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("api_key", key.as_str())]);
        }

        let no_match = || ExtractionError::NoMatch {
            path: file.path.clone(),
            service: SERVICE,
            query: query.clone(),
        };

        match self.http.get_json::<SearchResponse>(&file.path, request, &ctx.cancel).await? {
            CatalogResponse::Found(search) => search
                .results
                .into_iter()
                .next()
                .map(issue_to_metadata)
                .ok_or_else(no_match),
            CatalogResponse::NotFound => Err(no_match()),
        }
    }
}
