//! Feeds: the ordered, append-only log of aggregate changes.
//!
//! - [`types`] - wire types for entries, pages and the feed listing
//! - [`fetcher`] - single-page fetch, head sequence number and listing on
//!   [`Client`](crate::Client), plus the [`FeedSource`] seam
//! - [`consumer`] - the polling loop that delivers entries to a handler or a
//!   channel
//!
//! # Example
//!
//! ```ignore
//! let cancel = CancellationToken::new();
//! client
//!     .consume("payment", 0, &cancel, |entry| {
//!         println!("{} {}", entry.sequence_number, entry.aggregate_id);
//!         Ok::<_, Error>(())
//!     })
//!     .await?;
//! ```

mod consumer;
mod fetcher;
mod types;

pub use consumer::FeedConsumer;
pub use fetcher::{FeedSource, SEQUENCE_NUMBER_HEADER};
pub use types::{FeedEntry, FeedInfo, Page};
