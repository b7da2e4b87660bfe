//! Row store client: PostgREST-style REST API in front of the recipes table.
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use reqwest::header::{HeaderMap, CONTENT_RANGE};
use reqwest::{Client, Method, Url};
use serde_json::json;
use std::fmt;
use tracing::{debug, info, instrument, warn};

use crate::config::{ConfigError, StoreConfig};
use crate::error::{Error, Result};
use crate::model::{Record, RecordId, RecordStatus, Stats};

const REST_PREFIX: &str = "rest/v1/";
const SELECT_COLUMNS: &str = "id,title,body,status,image_path,image_url,last_posted_at,created_at";
/// Never-posted first, then the longest-unposted, then the oldest.
const PUBLISH_ORDER: &str = "last_posted_at.asc.nullsfirst,created_at.asc";

/// A single PostgREST column filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    column: String,
    expr: String,
}

impl RowFilter {
    pub fn eq(column: &str, value: &str) -> Self {
        Self {
            column: column.to_string(),
            expr: format!("eq.{value}"),
        }
    }

    pub fn is_null(column: &str) -> Self {
        Self {
            column: column.to_string(),
            expr: "is.null".into(),
        }
    }

    pub fn not_null(column: &str) -> Self {
        Self {
            column: column.to_string(),
            expr: "not.is.null".into(),
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Highest-priority ready recipe, if any.
    async fn fetch_next_ready(&self) -> Result<Option<Record>>;

    /// Stamp `last_posted_at` with today's date.
    async fn mark_posted(&self, id: &RecordId) -> Result<()>;

    /// Number of rows matching every filter.
    async fn count(&self, filters: &[RowFilter]) -> Result<u64>;
}

#[derive(Clone)]
pub struct SupabaseStore {
    http: Client,
    base_url: Url,
    table: String,
    service_key: String,
}

impl fmt::Debug for SupabaseStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseStore")
            .field("base_url", &self.base_url)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl SupabaseStore {
    pub fn from_config(cfg: &StoreConfig) -> Result<Self> {
        let base_url = Url::parse(&format!("{}/", cfg.url.trim_end_matches('/')))
            .map_err(|e| ConfigError::Invalid(format!("invalid store URL {}: {e}", cfg.url)))?;
        let http = Client::builder()
            .user_agent("recipe-poster/0.1")
            .timeout(cfg.timeout())
            .build()?;
        Ok(Self {
            http,
            base_url,
            table: cfg.table.clone(),
            service_key: cfg.service_key.clone(),
        })
    }

    fn table_url(&self) -> Result<Url> {
        self.base_url
            .join(&format!("{REST_PREFIX}{}", self.table))
            .map_err(|e| Error::Transport(format!("invalid table URL: {e}")))
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }

    pub fn build_fetch_next_request(&self) -> Result<reqwest::Request> {
        let status = format!("eq.{}", RecordStatus::READY);
        self.request(Method::GET, self.table_url()?)
            .query(&[
                ("select", SELECT_COLUMNS),
                ("status", status.as_str()),
                ("order", PUBLISH_ORDER),
                ("limit", "1"),
            ])
            .build()
            .map_err(Error::from)
    }

    pub fn build_mark_posted_request(
        &self,
        id: &RecordId,
        date: NaiveDate,
    ) -> Result<reqwest::Request> {
        let filter = format!("eq.{id}");
        self.request(Method::PATCH, self.table_url()?)
            .query(&[("id", filter.as_str())])
            .json(&json!({ "last_posted_at": date.format("%Y-%m-%d").to_string() }))
            .build()
            .map_err(Error::from)
    }

    pub fn build_count_request(&self, filters: &[RowFilter]) -> Result<reqwest::Request> {
        let mut query: Vec<(&str, &str)> = vec![("select", "id")];
        query.extend(filters.iter().map(|f| (f.column(), f.expr())));
        self.request(Method::GET, self.table_url()?)
            .header("Prefer", "count=exact")
            .query(&query)
            .build()
            .map_err(Error::from)
    }

    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        let method = request.method().clone();
        let path = request.url().path().to_string();
        debug!(%method, %path, "sending store request");

        let res = self
            .http
            .execute(request)
            .await
            .map_err(|e| Error::Transport(format!("failed to reach store: {e}")))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%method, %path, %status, "store request failed");
            return Err(Error::Transport(format!("store error {status}: {body}")));
        }
        Ok(res)
    }
}

#[async_trait]
impl RecordStore for SupabaseStore {
    #[instrument(skip_all)]
    async fn fetch_next_ready(&self) -> Result<Option<Record>> {
        let request = self.build_fetch_next_request()?;
        let res = self.execute(request).await?;
        let rows: Vec<Record> = res
            .json()
            .await
            .map_err(|e| Error::Transport(format!("invalid store response: {e}")))?;
        Ok(rows.into_iter().next())
    }

    #[instrument(skip_all, fields(record_id = %id))]
    async fn mark_posted(&self, id: &RecordId) -> Result<()> {
        let today = Local::now().date_naive();
        let request = self.build_mark_posted_request(id, today)?;
        self.execute(request).await?;
        info!(%today, "marked recipe posted");
        Ok(())
    }

    #[instrument(skip_all)]
    async fn count(&self, filters: &[RowFilter]) -> Result<u64> {
        let request = self.build_count_request(filters)?;
        let res = self.execute(request).await?;
        Ok(total_from_headers(res.headers()))
    }
}

/// Total from `Content-Range: 0-9/30` (or `*/0` for an empty set).
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

fn total_from_headers(headers: &HeaderMap) -> u64 {
    let raw = headers
        .get(CONTENT_RANGE)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    parse_content_range_total(raw).unwrap_or_else(|| {
        warn!(content_range = raw, "store returned no exact count; assuming 0");
        0
    })
}

/// Gather the `/stats` numbers with four count queries.
pub async fn collect_stats(store: &dyn RecordStore) -> Result<Stats> {
    let ready = RowFilter::eq("status", RecordStatus::READY);
    let total = store.count(&[]).await?;
    let ready_count = store.count(std::slice::from_ref(&ready)).await?;
    let posted = store.count(&[RowFilter::not_null("last_posted_at")]).await?;
    let remaining_ready = store
        .count(&[ready, RowFilter::is_null("last_posted_at")])
        .await?;
    Ok(Stats {
        total,
        ready: ready_count,
        posted,
        remaining_ready,
    })
}
