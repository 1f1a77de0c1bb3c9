//! Client library for the Serialized event-sourcing API.
//!
//! The [`Client`] covers aggregates, feeds, projections and reactions. The
//! interesting part is the feed consumer ([`FeedConsumer`]): a cancellable
//! loop that drains a feed page by page and then keeps tailing it, handing
//! each entry to the caller in sequence order.
//!
//! ```ignore
//! use serialized::{Client, Error};
//! use tokio_util::sync::CancellationToken;
//!
//! let client = Client::builder()
//!     .access_key("...")
//!     .secret_access_key("...")
//!     .build()?;
//!
//! let cancel = CancellationToken::new();
//! let result = client
//!     .consume("payment", 0, &cancel, |entry| {
//!         println!("{} {}", entry.sequence_number, entry.aggregate_id);
//!         Ok::<_, Error>(())
//!     })
//!     .await;
//! ```

pub mod aggregate;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod feed;
pub mod projection;
pub mod reaction;
pub mod util;

pub use aggregate::Aggregate;
pub use client::{Client, ClientBuilder};
pub use config::{Config, ConfigError};
pub use error::{BoxError, Error, Result};
pub use event::Event;
pub use feed::{FeedConsumer, FeedEntry, FeedInfo, FeedSource, Page};
pub use projection::{EventHandler, Function, Projection, ProjectionDefinition};
pub use reaction::{Action, ReactionDefinition};
