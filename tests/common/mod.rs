#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

use recipe_poster::error::{Error, Result};
use recipe_poster::model::{PublishedId, Record, RecordId, RecordStatus};
use recipe_poster::publisher::{ObjectStorage, PhotoChannel, Publisher};
use recipe_poster::store::{RecordStore, RowFilter};

pub const BASE_URL: &str = "https://project.supabase.co";
pub const BUCKET: &str = "recipe-images";

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

pub fn recipe(id: &str, title: &str) -> Record {
    Record {
        id: RecordId::from(id),
        title: title.to_string(),
        body: format!("How to make {title}."),
        status: RecordStatus::Ready,
        image_path: None,
        image_url: Some(format!("https://cdn.example/{id}.jpg")),
        last_posted_at: None,
        created_at: None,
    }
}

pub fn created(mut rec: Record, day: u32) -> Record {
    rec.created_at = Some(Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap());
    rec
}

pub fn posted_on(mut rec: Record, month: u32, day: u32) -> Record {
    rec.last_posted_at = NaiveDate::from_ymd_opt(2024, month, day);
    rec
}

pub fn with_status(mut rec: Record, status: &str) -> Record {
    rec.status = RecordStatus::Other(status.to_string());
    rec
}

/// In-memory table that orders rows the way the REST query does.
#[derive(Clone, Default)]
pub struct MemoryStore {
    rows: Arc<Mutex<Vec<Record>>>,
    calls: Arc<Mutex<Vec<String>>>,
    fail_mark: bool,
    fail_fetch: bool,
}

impl MemoryStore {
    pub fn with_rows(rows: Vec<Record>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(rows)),
            ..Default::default()
        }
    }

    pub fn failing_mark(mut self) -> Self {
        self.fail_mark = true;
        self
    }

    pub fn failing_fetch(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    pub async fn row(&self, id: &str) -> Option<Record> {
        self.rows
            .lock()
            .await
            .iter()
            .find(|r| r.id.as_str() == id)
            .cloned()
    }

    fn matches(rec: &Record, filter: &RowFilter) -> bool {
        match (filter.column(), filter.expr()) {
            ("status", expr) => expr.strip_prefix("eq.") == Some(rec.status.as_str()),
            ("last_posted_at", "is.null") => rec.last_posted_at.is_none(),
            ("last_posted_at", "not.is.null") => rec.last_posted_at.is_some(),
            (column, expr) => panic!("unsupported filter {column}={expr}"),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch_next_ready(&self) -> Result<Option<Record>> {
        self.calls.lock().await.push("fetch_next_ready".into());
        if self.fail_fetch {
            return Err(Error::Transport("store error 500: boom".into()));
        }
        let rows = self.rows.lock().await;
        let mut ready: Vec<&Record> = rows.iter().filter(|r| r.is_ready()).collect();
        // last_posted_at asc nulls first, then created_at asc
        ready.sort_by_key(|r| (r.last_posted_at.is_some(), r.last_posted_at, r.created_at));
        Ok(ready.first().map(|r| (*r).clone()))
    }

    async fn mark_posted(&self, id: &RecordId) -> Result<()> {
        self.calls.lock().await.push(format!("mark_posted:{id}"));
        if self.fail_mark {
            return Err(Error::Transport("store error 503: unavailable".into()));
        }
        let mut rows = self.rows.lock().await;
        for row in rows.iter_mut().filter(|r| &r.id == id) {
            row.last_posted_at = Some(today());
        }
        Ok(())
    }

    async fn count(&self, filters: &[RowFilter]) -> Result<u64> {
        self.calls.lock().await.push("count".into());
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|r| filters.iter().all(|f| Self::matches(r, f)))
            .count() as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoCall {
    pub photo_url: String,
    pub caption: String,
}

#[derive(Clone, Default)]
pub struct RecordingChannel {
    responses: Arc<Mutex<VecDeque<Result<PublishedId>>>>,
    calls: Arc<Mutex<Vec<PhotoCall>>>,
}

impl RecordingChannel {
    pub fn with_responses(responses: Vec<Result<PublishedId>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    pub fn rejecting(reason: &str) -> Self {
        Self::with_responses(vec![Err(Error::Delivery(reason.to_string()))])
    }

    pub async fn calls(&self) -> Vec<PhotoCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl PhotoChannel for RecordingChannel {
    async fn send_photo(&self, photo_url: &str, caption: &str) -> Result<PublishedId> {
        self.calls.lock().await.push(PhotoCall {
            photo_url: photo_url.to_string(),
            caption: caption.to_string(),
        });
        let mut guard = self.responses.lock().await;
        guard.pop_front().unwrap_or(Ok(1000))
    }
}

pub fn publisher(channel: &RecordingChannel) -> Publisher {
    let storage = ObjectStorage::new(BASE_URL, BUCKET).unwrap();
    Publisher::new(storage, Arc::new(channel.clone()))
}
