//! Open Library catalog extractor
//!
//! Looks a book up by ISBN (`/isbn/{isbn}.json`) when an earlier extractor
//! found one, falling back to a title search (`/search.json?title=`). Fills
//! title, author, publisher, description and subjects.
//!
//! # API Reference
//! - Books: https://openlibrary.org/dev/docs/api/books
//! - Search: https://openlibrary.org/dev/docs/api/search

use super::http::{CatalogHttp, CatalogOptions, CatalogResponse};
use crate::types::{
    raw_keys, ExtractContext, ExtractedMetadata, ExtractionError, FileInfo, MetadataExtractor,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Open Library production endpoint
pub const OPEN_LIBRARY_URL: &str = "https://openlibrary.org";

const SERVICE: &str = "open_library";

/// Subjects beyond this many are noise
const MAX_SUBJECTS: usize = 10;

/// Book record, as returned by both the ISBN and search endpoints
#[derive(Debug, Default, Deserialize)]
struct OpenLibraryBook {
    #[serde(default)]
    title: Option<String>,
    /// ISBN endpoint: `[{"name": ...}]` (sometimes only `key`)
    #[serde(default)]
    authors: Vec<AuthorRef>,
    /// Search endpoint
    #[serde(default)]
    author_name: Vec<String>,
    #[serde(default)]
    publishers: Vec<String>,
    #[serde(default)]
    publisher: Vec<String>,
    #[serde(default)]
    description: Option<Description>,
    #[serde(default)]
    subjects: Vec<String>,
    #[serde(default)]
    subject: Vec<String>,
    #[serde(default)]
    first_publish_year: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct AuthorRef {
    #[serde(default)]
    name: Option<String>,
}

/// Plain string or `{"type": ..., "value": ...}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Description {
    Text(String),
    Typed { value: String },
}

impl Description {
    fn into_text(self) -> String {
        match self {
            Description::Text(text) => text,
            Description::Typed { value } => value,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<OpenLibraryBook>,
}

/// Open Library lookup extractor
pub struct OpenLibraryClient {
    http: CatalogHttp,
    base_url: String,
}

impl OpenLibraryClient {
    /// Client for the public service with a 10 second timeout
    pub fn new() -> reqwest::Result<Self> {
        Self::with_options(CatalogOptions::new(OPEN_LIBRARY_URL, Duration::from_secs(10)))
    }

    pub fn with_options(options: CatalogOptions) -> reqwest::Result<Self> {
        Ok(Self {
            http: CatalogHttp::new(SERVICE, &options)?,
            base_url: options.base_url,
        })
    }

    async fn query_by_isbn(
        &self,
        file: &Path,
        isbn: &str,
        ctx: &ExtractContext,
    ) -> Result<ExtractedMetadata, ExtractionError> {
        let isbn: String = isbn.chars().filter(|c| *c != '-' && !c.is_whitespace()).collect();
        debug!(isbn = %isbn, "Querying Open Library by ISBN");

        let url = format!("{}/isbn/{}.json", self.base_url, isbn);
        let request = self.http.client().get(&url);

        match self.http.get_json::<OpenLibraryBook>(file, request, &ctx.cancel).await? {
            CatalogResponse::Found(book) => Ok(book_to_metadata(book)),
            CatalogResponse::NotFound => Err(ExtractionError::NoMatch {
                path: file.to_path_buf(),
                service: SERVICE,
                query: isbn,
            }),
        }
    }

    async fn query_by_title(
        &self,
        file: &Path,
        title: &str,
        ctx: &ExtractContext,
    ) -> Result<ExtractedMetadata, ExtractionError> {
        debug!(title = %title, "Querying Open Library by title");

        let url = format!("{}/search.json", self.base_url);
        let request = self
            .http
            .client()
            .get(&url)
            .query(&[("title", title), ("limit", "1")]);

        let no_match = || ExtractionError::NoMatch {
            path: file.to_path_buf(),
            service: SERVICE,
            query: title.to_string(),
        };

        match self.http.get_json::<SearchResponse>(file, request, &ctx.cancel).await? {
            CatalogResponse::Found(search) => search
                .docs
                .into_iter()
                .next()
                .map(book_to_metadata)
                .ok_or_else(no_match),
            CatalogResponse::NotFound => Err(no_match()),
        }
    }
}

fn book_to_metadata(book: OpenLibraryBook) -> ExtractedMetadata {
    let mut metadata = ExtractedMetadata::new();

    if let Some(title) = book.title {
        metadata.title = title.trim().to_string();
    }

    let author = book
        .authors
        .into_iter()
        .find_map(|a| a.name)
        .or_else(|| book.author_name.into_iter().next());
    if let Some(author) = author {
        metadata.set_raw(raw_keys::AUTHOR, author);
    }

    let publisher = book
        .publishers
        .into_iter()
        .next()
        .or_else(|| book.publisher.into_iter().next());
    if let Some(publisher) = publisher {
        metadata.set_raw(raw_keys::PUBLISHER, publisher);
    }

    if let Some(description) = book.description {
        metadata.description = description.into_text().trim().to_string();
    }

    let subjects = if book.subjects.is_empty() { book.subject } else { book.subjects };
    for subject in subjects.into_iter().take(MAX_SUBJECTS) {
        metadata.add_tag(subject);
    }

    if let Some(year) = book.first_publish_year {
        metadata.set_raw("first_publish_year", year.to_string());
    }

    metadata
}

#[async_trait]
impl MetadataExtractor for OpenLibraryClient {
    fn name(&self) -> &'static str {
        SERVICE
    }

    fn can_extract(&self, file: &FileInfo) -> bool {
        file.has_extension(&["pdf", "epub"])
    }

    async fn extract(
        &self,
        file: &FileInfo,
        known: &ExtractedMetadata,
        ctx: &ExtractContext,
    ) -> Result<ExtractedMetadata, ExtractionError> {
        let title = known.title.trim();

        if let Some(isbn) = known.raw_value(raw_keys::ISBN) {
            match self.query_by_isbn(&file.path, isbn, ctx).await {
                Ok(metadata) => return Ok(metadata),
                Err(e) if e.is_cancelled() || title.is_empty() => return Err(e),
                Err(e) => debug!(error = %e, "ISBN lookup failed, trying title"),
            }
        }

        if title.is_empty() {
            return Err(ExtractionError::NotAvailable {
                path: file.path.clone(),
                extractor: SERVICE,
                reason: "no ISBN or title to look up".to_string(),
            });
        }

        self.query_by_title(&file.path, title, ctx).await
    }
}
