use tracing::{error, info, instrument};

use crate::error::{Error, Result};
use crate::model::{CycleOutcome, Record};
use crate::publisher::{build_caption, resolve_photo_url, Publisher};
use crate::store::RecordStore;

/// One publish cycle: fetch the next ready recipe, post it, mark it posted.
///
/// Nothing is retried. A failed mark after a successful post is reported as
/// [`Error::MarkPosted`]; the recipe stays eligible for the next cycle.
#[instrument(skip_all)]
pub async fn publish_next(store: &dyn RecordStore, publisher: &Publisher) -> Result<CycleOutcome> {
    let Some(record) = store.fetch_next_ready().await? else {
        info!("no ready recipes");
        return Ok(CycleOutcome::Idle);
    };
    info!(record_id = %record.id, title = record.display_title(), "selected recipe");

    let message_id = publisher.publish(&record).await?;

    if let Err(err) = store.mark_posted(&record.id).await {
        error!(record_id = %record.id, ?err, "published but mark failed");
        return Err(Error::MarkPosted {
            id: record.id.clone(),
            title: record.display_title().to_string(),
            source: Box::new(err),
        });
    }

    Ok(CycleOutcome::Published {
        title: record.display_title().to_string(),
        record_id: record.id,
        message_id,
    })
}

/// What the next cycle would post, without sending or marking anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub record: Record,
    pub photo_url: Option<String>,
    pub caption: String,
}

pub async fn preview_next(
    store: &dyn RecordStore,
    publisher: &Publisher,
) -> Result<Option<Preview>> {
    let Some(record) = store.fetch_next_ready().await? else {
        return Ok(None);
    };
    Ok(Some(Preview {
        photo_url: resolve_photo_url(&record, publisher.storage()),
        caption: build_caption(&record),
        record,
    }))
}
