use thiserror::Error;

use crate::config::ConfigError;
use crate::model::RecordId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Network failure or non-2xx response from the row store or the Bot API.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("recipe {id} has neither image_url nor image_path")]
    NoMedia { id: RecordId },

    /// The Bot API answered 2xx but with `ok: false`.
    #[error("delivery rejected: {0}")]
    Delivery(String),

    /// The photo went out but the store did not take the mark. The record
    /// stays eligible and may be posted again by the next cycle.
    #[error("published recipe {id} ({title}) but failed to mark it posted: {source}")]
    MarkPosted {
        id: RecordId,
        title: String,
        #[source]
        source: Box<Error>,
    },
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}
