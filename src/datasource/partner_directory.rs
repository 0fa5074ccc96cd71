//! Read-only client for the external partner directory.
//!
//! The directory is a paginated REST registry of partner identities. The engine
//! only reads `reference -> display name` pairs from it, during repair flows.

use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Upper bound on pages walked by [`fetch_all_partners`].
const MAX_PAGES: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerRecord {
    pub external_ref: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryPage {
    pub records: Vec<PartnerRecord>,
    /// Cursor for the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Directory not configured")]
    NotConfigured,
}

#[async_trait]
pub trait PartnerDirectory: Send + Sync + fmt::Debug {
    /// Fetch one page. `cursor` is `None` for the first page.
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<DirectoryPage, DirectoryError>;
}

/// Walk every page of the directory.
pub async fn fetch_all_partners(
    directory: &dyn PartnerDirectory,
) -> Result<Vec<PartnerRecord>, DirectoryError> {
    let mut records = Vec::new();
    let mut seen_cursors = HashSet::new();
    let mut cursor: Option<String> = None;

    for _ in 0..MAX_PAGES {
        let page = directory.fetch_page(cursor.as_deref()).await?;
        records.extend(page.records);

        match page.next_cursor {
            Some(next) if seen_cursors.insert(next.clone()) => cursor = Some(next),
            Some(next) => {
                warn!(cursor = %next, "Partner directory repeated a cursor, stopping pagination");
                break;
            }
            None => break,
        }
    }

    Ok(records)
}

/// HTTP directory client. Retries 429 and 5xx with exponential backoff.
#[derive(Debug, Clone)]
pub struct HttpPartnerDirectory {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpPartnerDirectory {
    pub fn new(base_url: String, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn get_page(&self, cursor: Option<&str>) -> Result<Value, DirectoryError> {
        let url = format!("{}/partners", self.base_url);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let mut request = self.client.get(&url);
            if let Some(cursor) = cursor {
                request = request.query(&[("offset", cursor)]);
            }
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = request.send().await.map_err(|e| {
                backoff::Error::transient(DirectoryError::Network(e.to_string()))
            })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(DirectoryError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(DirectoryError::Http {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(DirectoryError::Http {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| backoff::Error::permanent(DirectoryError::Parse(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl PartnerDirectory for HttpPartnerDirectory {
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<DirectoryPage, DirectoryError> {
        debug!(cursor = ?cursor, "Fetching partner directory page");
        let body = self.get_page(cursor).await?;
        parse_page(&body)
    }
}

/// Parse `{"records": [{"id", "fields": {"Name"}}], "offset"}`.
/// Also accepts a flat `name` on the record.
pub fn parse_page(body: &Value) -> Result<DirectoryPage, DirectoryError> {
    let items = body
        .get("records")
        .and_then(Value::as_array)
        .ok_or_else(|| DirectoryError::Parse("Expected records array".to_string()))?;

    let mut records = Vec::with_capacity(items.len());
    for item in items {
        let Some(external_ref) = item.get("id").and_then(Value::as_str) else {
            warn!(record = %item, "Directory record without id, skipping");
            continue;
        };
        let display_name = item
            .get("fields")
            .and_then(|f| f.get("Name"))
            .or_else(|| item.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        records.push(PartnerRecord {
            external_ref: external_ref.to_string(),
            display_name: display_name.trim().to_string(),
        });
    }

    let next_cursor = body
        .get("offset")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(DirectoryPage {
        records,
        next_cursor,
    })
}

/// In-memory directory for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct MockPartnerDirectory {
    pages: Vec<Vec<PartnerRecord>>,
}

impl MockPartnerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, records: Vec<PartnerRecord>) -> Self {
        self.pages.push(records);
        self
    }
}

#[async_trait]
impl PartnerDirectory for MockPartnerDirectory {
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<DirectoryPage, DirectoryError> {
        let index = match cursor {
            None => 0,
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| DirectoryError::Parse(format!("bad cursor {}", c)))?,
        };
        let records = self.pages.get(index).cloned().unwrap_or_default();
        let next_cursor = (index + 1 < self.pages.len()).then(|| (index + 1).to_string());
        Ok(DirectoryPage {
            records,
            next_cursor,
        })
    }
}

/// Placeholder used when no directory URL is configured.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredDirectory;

#[async_trait]
impl PartnerDirectory for UnconfiguredDirectory {
    async fn fetch_page(&self, _cursor: Option<&str>) -> Result<DirectoryPage, DirectoryError> {
        Err(DirectoryError::NotConfigured)
    }
}
