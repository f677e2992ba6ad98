//! Turns parsed feed items into stored posts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{Database, InsertOutcome, NewPost};
use crate::error::{Error, Result};
use crate::fetcher::{FeedItem, ParsedFeed};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    /// Posts written by this batch.
    pub created: usize,
    /// Items whose URL was already stored.
    pub duplicates: usize,
    /// Items with no link.
    pub skipped: usize,
    /// Items whose insert failed for a reason other than a duplicate URL.
    pub failed: usize,
}

/// Parse an item's `pubDate` as an RFC 2822 HTTP-date
/// (`Mon, 02 Jan 2006 15:04:05 -0700`, or with a zone name such as `GMT`).
pub fn parse_pub_date(item: &FeedItem) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(&item.pub_date)
        .map(|published| published.with_timezone(&Utc))
        .map_err(|source| Error::DateParse {
            link: item.link.clone(),
            value: item.pub_date.clone(),
            source,
        })
}

pub struct Ingestor {
    db: Arc<Database>,
}

impl Ingestor {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store every item of `feed` as a post owned by `feed_id`.
    ///
    /// Every item's publication date is parsed before the first insert, so a
    /// malformed date fails the whole batch with nothing written, even on an
    /// item that would otherwise be skipped. Duplicate URLs are counted and
    /// skipped; other insert failures are logged and the remaining items are
    /// still stored.
    pub async fn ingest(&self, feed_id: Uuid, feed: &ParsedFeed) -> Result<IngestReport> {
        let dates = feed
            .items
            .iter()
            .map(parse_pub_date)
            .collect::<Result<Vec<_>>>()?;

        let mut report = IngestReport::default();

        for (index, (item, published_at)) in feed.items.iter().zip(dates).enumerate() {
            info!("\t{}. {}", index + 1, item.title);

            if item.link.is_empty() {
                warn!("Skipping item with no link: {}", item.title);
                report.skipped += 1;
                continue;
            }

            let post = NewPost::new(
                feed_id,
                Some(item.title.clone()),
                item.link.clone(),
                Some(item.description.clone()),
                published_at,
            );

            match self.db.insert_post(&post).await {
                Ok(InsertOutcome::Created) => report.created += 1,
                Ok(InsertOutcome::Duplicate) => {
                    debug!("Post already stored: {}", post.url);
                    report.duplicates += 1;
                }
                Err(e) => {
                    warn!("Failed to save post {}: {}", post.url, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
