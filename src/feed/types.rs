use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Event;

/// One unit of feed delivery: the events committed atomically for an
/// aggregate, stamped with the feed's sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub sequence_number: u64,
    pub aggregate_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub events: Vec<Event>,
}

impl FeedEntry {
    /// The entry timestamp as a UTC date, if it is in chrono's range.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// A single page of feed entries returned by the API.
///
/// `has_more` tells the consumer whether further entries are available past
/// this page at the current cursor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(default)]
    pub entries: Vec<FeedEntry>,
    #[serde(default)]
    pub has_more: bool,
}

/// Per-feed counters returned by the feed listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedInfo {
    pub aggregate_type: String,
    #[serde(default)]
    pub aggregate_count: u64,
    #[serde(default)]
    pub batch_count: u64,
    #[serde(default)]
    pub event_count: u64,
}
