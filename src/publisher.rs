//! Formats a recipe as a photo post and hands it to the channel.
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::{ConfigError, StoreConfig, TelegramConfig};
use crate::error::{Error, Result};
use crate::model::{PublishedId, Record};

/// Telegram's limit for photo captions.
pub const CAPTION_LIMIT: usize = 1024;

/// Everything but RFC 3986 unreserved characters gets escaped.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Public object URLs: `<base>/storage/v1/object/public/<bucket>/<path>`.
#[derive(Debug, Clone)]
pub struct ObjectStorage {
    /// `<base>/storage/v1/object/public/<bucket>/`, already encoded.
    prefix: String,
}

impl ObjectStorage {
    pub fn new(base_url: &str, bucket: &str) -> Result<Self> {
        let base = base_url.trim_end_matches('/');
        let parsed = Url::parse(base).map_err(|e| {
            ConfigError::Invalid(format!("invalid storage URL {base_url}: {e}"))
        })?;
        if parsed.cannot_be_a_base() {
            let msg = format!("storage URL {base_url} cannot be a base");
            return Err(ConfigError::Invalid(msg).into());
        }
        Ok(Self {
            prefix: format!(
                "{base}/storage/v1/object/public/{}/",
                utf8_percent_encode(bucket, KEY_SEGMENT)
            ),
        })
    }

    pub fn from_config(cfg: &StoreConfig) -> Result<Self> {
        Self::new(&cfg.url, &cfg.bucket)
    }

    /// Each `/`-separated piece of `path` is percent-encoded on its own;
    /// `.` and `..` pieces are part of the key and are kept as written.
    pub fn public_url(&self, path: &str) -> String {
        let key = path
            .split('/')
            .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT).to_string())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}{key}", self.prefix)
    }
}

/// Photo to post: an explicit `image_url` wins over a storage key.
pub fn resolve_photo_url(record: &Record, storage: &ObjectStorage) -> Option<String> {
    let non_blank = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    };
    if let Some(url) = non_blank(&record.image_url) {
        return Some(url);
    }
    non_blank(&record.image_path).map(|path| storage.public_url(&path))
}

/// `<b>title</b>`, blank line, body; cut hard at [`CAPTION_LIMIT`] characters.
pub fn build_caption(record: &Record) -> String {
    let caption = format!("<b>{}</b>\n\n{}", record.title.trim(), record.body.trim());
    truncate_chars(&caption, CAPTION_LIMIT).to_string()
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Destination that accepts a photo with an HTML caption.
#[async_trait]
pub trait PhotoChannel: Send + Sync {
    async fn send_photo(&self, photo_url: &str, caption: &str) -> Result<PublishedId>;
}

/// Resolves media, builds the caption and delivers through a [`PhotoChannel`].
#[derive(Clone)]
pub struct Publisher {
    storage: ObjectStorage,
    channel: Arc<dyn PhotoChannel>,
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl Publisher {
    pub fn new(storage: ObjectStorage, channel: Arc<dyn PhotoChannel>) -> Self {
        Self { storage, channel }
    }

    pub fn storage(&self) -> &ObjectStorage {
        &self.storage
    }

    #[instrument(skip_all, fields(record_id = %record.id))]
    pub async fn publish(&self, record: &Record) -> Result<PublishedId> {
        let photo_url = resolve_photo_url(record, &self.storage).ok_or_else(|| Error::NoMedia {
            id: record.id.clone(),
        })?;
        let caption = build_caption(record);
        debug!(%photo_url, caption_len = caption.chars().count(), "publishing recipe");
        let message_id = self.channel.send_photo(&photo_url, &caption).await?;
        info!(message_id, "recipe published");
        Ok(message_id)
    }
}

/// How the photo reaches Telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Telegram fetches the URL itself.
    Url,
    /// Download the bytes here and upload them as multipart.
    Upload,
}

/// Bot API `sendPhoto` against the configured channel.
#[derive(Clone)]
pub struct TelegramChannel {
    http: Client,
    api_url: Url,
    token: String,
    chat_id: String,
    mode: DeliveryMode,
}

impl fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramChannel")
            .field("api_url", &self.api_url)
            .field("chat_id", &self.chat_id)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

impl TelegramChannel {
    pub fn from_config(cfg: &TelegramConfig, mode: DeliveryMode) -> Result<Self> {
        let api_url = Url::parse(cfg.api_url.trim_end_matches('/')).map_err(|e| {
            ConfigError::Invalid(format!("invalid Bot API URL {}: {e}", cfg.api_url))
        })?;
        let http = Client::builder()
            .user_agent("recipe-poster/0.1")
            .timeout(cfg.timeout())
            .build()?;
        Ok(Self {
            http,
            api_url,
            token: cfg.bot_token.clone(),
            chat_id: cfg.chat_id.clone(),
            mode,
        })
    }

    fn send_photo_url(&self) -> Result<Url> {
        // Tokens contain ':', so the path is spliced in rather than joined.
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| ConfigError::Invalid(format!("invalid Bot API URL {}", self.api_url)))?
            .pop_if_empty()
            .push(&format!("bot{}", self.token))
            .push("sendPhoto");
        Ok(url)
    }

    fn text_fields<'a>(&'a self, caption: &'a str) -> [(&'static str, &'a str); 4] {
        [
            ("chat_id", self.chat_id.as_str()),
            ("caption", caption),
            ("parse_mode", "HTML"),
            ("disable_web_page_preview", "true"),
        ]
    }

    /// URL delivery: a plain form post, Telegram downloads the photo.
    pub fn build_url_request(&self, photo_url: &str, caption: &str) -> Result<reqwest::Request> {
        let mut form: Vec<(&str, &str)> = self.text_fields(caption).to_vec();
        form.push(("photo", photo_url));
        self.http
            .post(self.send_photo_url()?)
            .form(&form)
            .build()
            .map_err(Error::from)
    }

    /// Upload delivery: the photo travels as a multipart file part.
    pub fn build_upload_request(
        &self,
        bytes: Vec<u8>,
        file_name: String,
        caption: &str,
    ) -> Result<reqwest::Request> {
        let form = self
            .text_fields(caption)
            .into_iter()
            .fold(Form::new(), |form, (name, value)| {
                form.text(name, value.to_string())
            })
            .part("photo", Part::bytes(bytes).file_name(file_name));
        self.http
            .post(self.send_photo_url()?)
            .multipart(form)
            .build()
            .map_err(Error::from)
    }

    async fn download(&self, photo_url: &str) -> Result<Vec<u8>> {
        let res = self
            .http
            .get(photo_url)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("failed to download photo: {e}")))?;
        if !res.status().is_success() {
            return Err(Error::Transport(format!(
                "photo download failed {}: {photo_url}",
                res.status()
            )));
        }
        let bytes = res.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl PhotoChannel for TelegramChannel {
    async fn send_photo(&self, photo_url: &str, caption: &str) -> Result<PublishedId> {
        let request = match self.mode {
            DeliveryMode::Url => self.build_url_request(photo_url, caption)?,
            DeliveryMode::Upload => {
                let bytes = self.download(photo_url).await?;
                debug!(size = bytes.len(), "downloaded photo for upload");
                self.build_upload_request(bytes, file_name_from_url(photo_url), caption)?
            }
        };

        let res = self
            .http
            .execute(request)
            .await
            .map_err(|e| Error::Transport(format!("failed to reach Telegram: {e}")))?;
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        interpret_response(status, &body)
    }
}

fn interpret_response(status: reqwest::StatusCode, body: &str) -> Result<PublishedId> {
    let parsed: Option<ApiResponse> = serde_json::from_str(body).ok();
    if !status.is_success() {
        let detail = parsed
            .and_then(|r| r.description)
            .unwrap_or_else(|| body.to_string());
        warn!(%status, "sendPhoto failed");
        return Err(Error::Transport(format!("telegram error {status}: {detail}")));
    }
    match parsed {
        Some(ApiResponse {
            ok: true,
            result: Some(msg),
            ..
        }) => Ok(msg.message_id),
        Some(ApiResponse { ok: true, .. }) => {
            Err(Error::Delivery("sendPhoto returned no message".into()))
        }
        Some(ApiResponse { description, .. }) => Err(Error::Delivery(
            description.unwrap_or_else(|| body.to_string()),
        )),
        None => Err(Error::Delivery(format!("unreadable sendPhoto response: {body}"))),
    }
}

fn file_name_from_url(photo_url: &str) -> String {
    Url::parse(photo_url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segments| segments.last().map(str::to_owned))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "photo.jpg".to_string())
}
