//! Picks the feed that has waited longest and runs one fetch cycle on it.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{Database, Feed};
use crate::error::{Error, Result};
use crate::fetcher::Fetcher;
use crate::ingest::{IngestReport, Ingestor};

/// Outcome of one successful cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub feed_id: Uuid,
    pub feed_name: String,
    pub channel_title: String,
    pub ingest: IngestReport,
}

pub struct Scheduler {
    db: Arc<Database>,
    fetcher: Fetcher,
    ingestor: Ingestor,
}

impl Scheduler {
    pub fn new(db: Arc<Database>, fetcher: Fetcher) -> Self {
        let ingestor = Ingestor::new(db.clone());
        Self {
            db,
            fetcher,
            ingestor,
        }
    }

    /// The least recently fetched feed, never-fetched feeds first.
    pub async fn select_next(&self) -> Result<Feed> {
        self.db
            .next_feed_to_fetch()
            .await?
            .ok_or(Error::NoFeedsAvailable)
    }

    /// Select, mark, fetch and ingest one feed.
    ///
    /// The feed is stamped as fetched before the request goes out, so a feed
    /// whose fetch fails waits for its next turn instead of being picked again
    /// straight away.
    pub async fn schedule_next(&self, cancel: &CancellationToken) -> Result<CycleReport> {
        let feed = self.select_next().await?;
        debug!(
            "Selected feed '{}' (last fetched: {:?})",
            feed.name, feed.last_fetched_at
        );

        self.db.mark_feed_fetched(feed.id, Utc::now()).await?;

        info!("Fetching feed: {} ({})", feed.name, feed.url);
        let parsed = self.fetcher.fetch(&feed.url, cancel).await?;

        info!("Scraping feed \"{}\"", parsed.title);
        let ingest = self.ingestor.ingest(feed.id, &parsed).await?;

        info!(
            "Added {} new posts for feed '{}' ({} already stored, {} failed)",
            ingest.created, feed.name, ingest.duplicates, ingest.failed
        );

        Ok(CycleReport {
            feed_id: feed.id,
            feed_name: feed.name,
            channel_title: parsed.title,
            ingest,
        })
    }
}
