use std::future::Future;

use reqwest::{Method, StatusCode};
use serde::Deserialize;

use crate::client::{expect_found, expect_status, Client};
use crate::error::{Error, Result};
use crate::feed::types::{FeedInfo, Page};

/// Header carrying the feed head position on `HEAD /feeds/{name}`.
pub const SEQUENCE_NUMBER_HEADER: &str = "Serialized-SequenceNumber-Current";

/// Source of feed pages for a [`FeedConsumer`](crate::feed::FeedConsumer).
///
/// [`Client`] is the production implementation; tests plug in scripted
/// sources to drive the consumer without a network.
pub trait FeedSource {
    /// Fetches the page of entries that follow `since` on `feed`.
    fn fetch_page(&self, feed: &str, since: u64) -> impl Future<Output = Result<Page>> + Send;
}

impl<S: FeedSource + Sync> FeedSource for &S {
    fn fetch_page(&self, feed: &str, since: u64) -> impl Future<Output = Result<Page>> + Send {
        (**self).fetch_page(feed, since)
    }
}

impl FeedSource for Client {
    fn fetch_page(&self, feed: &str, since: u64) -> impl Future<Output = Result<Page>> + Send {
        Client::fetch_page(self, feed, since)
    }
}

#[derive(Default, Deserialize)]
struct FeedList {
    #[serde(default)]
    feeds: Vec<FeedInfo>,
}

impl Client {
    /// Fetches one page of `feed` starting after sequence number `since`.
    ///
    /// `since = 0` reads from the beginning and sends no query parameter.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the feed does not exist
    /// - [`Error::UnexpectedStatus`] for any other non-200 response
    /// - [`Error::Decode`] if the body is not a valid page
    pub async fn fetch_page(&self, feed: &str, since: u64) -> Result<Page> {
        let mut url = self.endpoint(&["feeds", feed])?;
        if since > 0 {
            url.query_pairs_mut()
                .append_pair("since", &since.to_string());
        }

        tracing::debug!(feed = %feed, since = since, "Fetching feed page");
        let response = self.send(self.request(Method::GET, url)).await?;
        expect_found(&response, StatusCode::OK, || format!("feed '{feed}'"))?;

        let page: Page = self.read_json(response).await?;
        tracing::debug!(
            feed = %feed,
            entries = page.entries.len(),
            has_more = page.has_more,
            "Fetched feed page"
        );
        Ok(page)
    }

    /// Returns the highest sequence number currently available on `feed`.
    ///
    /// Uses a `HEAD` request, so no entries are transferred; the value is read
    /// from the `Serialized-SequenceNumber-Current` response header.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the feed does not exist
    /// - [`Error::MissingHeader`] if the header is absent or not a number
    pub async fn current_sequence_number(&self, feed: &str) -> Result<u64> {
        let url = self.endpoint(&["feeds", feed])?;
        let response = self.send(self.request(Method::HEAD, url)).await?;
        expect_found(&response, StatusCode::OK, || format!("feed '{feed}'"))?;

        response
            .headers()
            .get(SEQUENCE_NUMBER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .ok_or(Error::MissingHeader(SEQUENCE_NUMBER_HEADER))
    }

    /// Lists all feeds with their aggregate, batch and event counts.
    pub async fn feeds(&self) -> Result<Vec<FeedInfo>> {
        let url = self.endpoint(&["feeds"])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        expect_status(&response, StatusCode::OK)?;

        let list: FeedList = self.read_json(response).await?;
        Ok(list.feeds)
    }
}
