//! Long-running, cancellable feed consumption.
//!
//! A [`FeedConsumer`] drains a feed page by page from a cursor, hands each
//! entry to the caller in sequence order, and then keeps tailing the feed at a
//! fixed poll interval. It runs as one sequential loop: there is never more
//! than one fetch or handler call in flight.
//!
//! # Polling
//!
//! Each round starts by sleeping one poll interval, the first round included.
//! While the last page reported `hasMore`, the next page is fetched
//! immediately; once caught up the consumer sleeps again before asking. Both
//! the sleep and the in-flight fetch race the cancellation token.
//!
//! # Delivery
//!
//! The cursor moves after each delivered entry, not after each page, so a
//! failing handler leaves it on the last entry that was handled. Entries at or
//! below the cursor are skipped.
use std::convert::Infallible;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::{Client, DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL};
use crate::error::{BoxError, Error, Result};
use crate::feed::fetcher::FeedSource;
use crate::feed::types::FeedEntry;

/// Sequential consumer of a single feed.
#[derive(Debug)]
pub struct FeedConsumer<S> {
    source: S,
    feed: String,
    cursor: u64,
    poll_interval: Duration,
    fetch_now: bool,
}

impl<S: FeedSource> FeedConsumer<S> {
    /// Creates a consumer that delivers entries after sequence number `since`.
    ///
    /// `since = 0` starts from the beginning of the feed.
    pub fn new(source: S, feed: impl Into<String>, since: u64) -> Self {
        Self {
            source,
            feed: feed.into(),
            cursor: since,
            poll_interval: DEFAULT_POLL_INTERVAL,
            fetch_now: false,
        }
    }

    /// Sets the wait between polls once caught up.
    ///
    /// Intervals shorter than [`MIN_POLL_INTERVAL`] are raised to it.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        if interval < MIN_POLL_INTERVAL {
            tracing::warn!(requested = ?interval, used = ?MIN_POLL_INTERVAL, "Poll interval too short");
        }
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn feed(&self) -> &str {
        &self.feed
    }

    /// Sequence number of the last delivered entry.
    ///
    /// Safe to persist between runs; a new consumer started from this value
    /// resumes right after it.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Runs the consumption loop, calling `handler` once per entry.
    ///
    /// Only returns on failure or cancellation.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] once `cancel` fires
    /// - [`Error::Handler`] if `handler` fails; [`cursor`](Self::cursor) stays
    ///   on the previous entry
    /// - any error from fetching a page, unchanged
    pub async fn run<F, E>(&mut self, cancel: &CancellationToken, mut handler: F) -> Result<Infallible>
    where
        F: FnMut(&FeedEntry) -> Result<(), E>,
        E: Into<BoxError>,
    {
        tracing::info!(feed = %self.feed, since = self.cursor, "Consuming feed");
        loop {
            for entry in self.next_page(cancel).await? {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                if self.is_stale(&entry) {
                    continue;
                }

                handler(&entry).map_err(|e| Error::Handler {
                    sequence_number: entry.sequence_number,
                    source: e.into(),
                })?;
                self.cursor = entry.sequence_number;
            }
        }
    }

    /// Waits out the poll interval if needed, then fetches the next page.
    async fn next_page(&mut self, cancel: &CancellationToken) -> Result<Vec<FeedEntry>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if !self.fetch_now {
            tracing::trace!(feed = %self.feed, interval = ?self.poll_interval, "Waiting for next poll");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        let page = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            page = self.source.fetch_page(&self.feed, self.cursor) => page?,
        };

        self.fetch_now = page.has_more;
        Ok(page.entries)
    }

    fn is_stale(&self, entry: &FeedEntry) -> bool {
        if entry.sequence_number > self.cursor {
            return false;
        }
        tracing::warn!(
            feed = %self.feed,
            sequence_number = entry.sequence_number,
            cursor = self.cursor,
            "Skipping feed entry at or below cursor"
        );
        true
    }
}

impl<S> FeedConsumer<S>
where
    S: FeedSource + Send + Sync + 'static,
{
    /// Moves the loop onto a spawned task that sends entries over a channel.
    ///
    /// Entries are sent as the channel accepts them; `buffer` bounds how far
    /// the producer can run ahead. The last message is the error that ended
    /// the loop, [`Error::Cancelled`] included. Dropping the receiver stops
    /// the task.
    pub fn subscribe(
        mut self,
        cancel: CancellationToken,
        buffer: usize,
    ) -> mpsc::Receiver<Result<FeedEntry>> {
        let (tx, rx) = mpsc::channel(buffer.max(1));

        tokio::spawn(async move {
            match self.produce(&cancel, &tx).await {
                Ok(()) => {
                    tracing::debug!(feed = %self.feed, cursor = self.cursor, "Receiver dropped, stopping feed task");
                }
                Err(e) => {
                    tracing::debug!(feed = %self.feed, error = %e, "Feed task finished");
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        rx
    }

    /// Returns `Ok(())` only when the receiver has gone away.
    async fn produce(
        &mut self,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<Result<FeedEntry>>,
    ) -> Result<()> {
        loop {
            for entry in self.next_page(cancel).await? {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                if self.is_stale(&entry) {
                    continue;
                }

                let sequence_number = entry.sequence_number;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    sent = tx.send(Ok(entry)) => {
                        if sent.is_err() {
                            return Ok(());
                        }
                    }
                }
                self.cursor = sequence_number;
            }
        }
    }
}

impl Client {
    /// A consumer for `feed` that uses this client's poll interval.
    pub fn consumer(&self, feed: impl Into<String>, since: u64) -> FeedConsumer<Client> {
        FeedConsumer::new(self.clone(), feed, since).with_poll_interval(self.poll_interval())
    }

    /// Consumes `feed` from `since`, calling `handler` for every entry until
    /// cancelled or failed. See [`FeedConsumer::run`].
    pub async fn consume<F, E>(
        &self,
        feed: &str,
        since: u64,
        cancel: &CancellationToken,
        handler: F,
    ) -> Result<Infallible>
    where
        F: FnMut(&FeedEntry) -> Result<(), E>,
        E: Into<BoxError>,
    {
        self.consumer(feed, since).run(cancel, handler).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::Page;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::sync::Mutex;
    use tokio::time::Instant;

    const INTERVAL: Duration = Duration::from_secs(2);
    /// Returned once the script runs out, to end a run without cancellation.
    const EXHAUSTED: u16 = 599;

    /// Serves pre-recorded pages and remembers every request.
    struct ScriptedSource {
        pages: Mutex<VecDeque<Result<Page>>>,
        calls: Mutex<Vec<(u64, Instant)>>,
    }

    impl ScriptedSource {
        fn new(pages: impl IntoIterator<Item = Page>) -> Self {
            Self {
                pages: Mutex::new(pages.into_iter().map(Ok).collect()),
                calls: Mutex::default(),
            }
        }

        fn since_values(&self) -> Vec<u64> {
            self.calls.lock().unwrap().iter().map(|(s, _)| *s).collect()
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
        }
    }

    impl FeedSource for ScriptedSource {
        fn fetch_page(&self, _feed: &str, since: u64) -> impl Future<Output = Result<Page>> + Send {
            self.calls.lock().unwrap().push((since, Instant::now()));
            let next = self
                .pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(Error::UnexpectedStatus(EXHAUSTED)));
            std::future::ready(next)
        }
    }

    /// A source whose fetches never complete.
    struct StalledSource;

    impl FeedSource for StalledSource {
        fn fetch_page(&self, _feed: &str, _since: u64) -> impl Future<Output = Result<Page>> + Send {
            std::future::pending()
        }
    }

    fn entry(sequence_number: u64) -> FeedEntry {
        FeedEntry {
            sequence_number,
            aggregate_id: format!("agg-{sequence_number}"),
            timestamp: 1_700_000_000_000 + sequence_number as i64,
            events: Vec::new(),
        }
    }

    fn page(seqs: &[u64], has_more: bool) -> Page {
        Page {
            entries: seqs.iter().copied().map(entry).collect(),
            has_more,
        }
    }

    /// The clock only moves on timers, so one interval (give or take the
    /// timer wheel's millisecond rounding) separates waited fetches.
    fn assert_waited(before: Instant, after: Instant) {
        let gap = after - before;
        assert!(gap >= INTERVAL, "waited only {:?}", gap);
        assert!(gap < INTERVAL + Duration::from_millis(5), "waited {:?}", gap);
    }

    fn assert_exhausted(result: Result<Infallible>) {
        match result {
            Err(Error::UnexpectedStatus(EXHAUSTED)) => {}
            other => panic!("Expected end of script, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_entries_in_order_across_pages() {
        let source = ScriptedSource::new([page(&[1, 2], true), page(&[3], false), page(&[4, 5], false)]);
        let mut consumer = FeedConsumer::new(&source, "payment", 0).with_poll_interval(INTERVAL);
        let cancel = CancellationToken::new();

        let mut seen = Vec::new();
        let result = consumer
            .run(&cancel, |e| {
                seen.push(e.sequence_number);
                Ok::<_, Error>(())
            })
            .await;

        assert_exhausted(result);
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert_eq!(consumer.cursor(), 5);
        assert_eq!(source.since_values(), vec![0, 2, 3, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetches_immediately_while_has_more() {
        let source = ScriptedSource::new([page(&[1], true), page(&[2], false), page(&[], false)]);
        let mut consumer = FeedConsumer::new(&source, "payment", 0).with_poll_interval(INTERVAL);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        let result = consumer.run(&cancel, |_| Ok::<_, Error>(())).await;
        assert_exhausted(result);

        let times = source.call_times();
        assert_eq!(times.len(), 4);
        assert_waited(start, times[0]);
        assert_eq!(times[1], times[0]);
        assert_waited(times[1], times[2]);
        assert_waited(times[2], times[3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_page_with_has_more_refetches() {
        let source = ScriptedSource::new([page(&[], true), page(&[1], false)]);
        let mut consumer = FeedConsumer::new(&source, "payment", 0).with_poll_interval(INTERVAL);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        let result = consumer.run(&cancel, |_| Ok::<_, Error>(())).await;
        assert_exhausted(result);

        let times = source.call_times();
        assert_waited(start, times[0]);
        assert_eq!(times[1], times[0]);
        assert_eq!(source.since_values(), vec![0, 0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_fetch_starts_after_last_entry() {
        let source = ScriptedSource::new([page(&[5], false)]);
        let mut consumer = FeedConsumer::new(&source, "payment", 0).with_poll_interval(INTERVAL);
        let cancel = CancellationToken::new();

        let result = consumer.run(&cancel, |_| Ok::<_, Error>(())).await;
        assert_exhausted(result);
        assert_eq!(source.since_values(), vec![0, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_from_given_cursor() {
        let source = ScriptedSource::new([page(&[11, 12], false)]);
        let mut consumer = FeedConsumer::new(&source, "payment", 10).with_poll_interval(INTERVAL);
        let cancel = CancellationToken::new();

        let result = consumer.run(&cancel, |_| Ok::<_, Error>(())).await;
        assert_exhausted(result);
        assert_eq!(source.since_values(), vec![10, 12]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_calls_nothing() {
        let source = ScriptedSource::new([page(&[1, 2, 3], false)]);
        let mut consumer = FeedConsumer::new(&source, "payment", 0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut calls = 0;
        let result = consumer
            .run(&cancel, |_| {
                calls += 1;
                Ok::<_, Error>(())
            })
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(calls, 0);
        assert!(source.since_values().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_in_flight_fetch() {
        let mut consumer =
            FeedConsumer::new(StalledSource, "payment", 0).with_poll_interval(Duration::from_millis(100));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let mut calls = 0;
        let result = consumer
            .run(&cancel, |_| {
                calls += 1;
                Ok::<_, Error>(())
            })
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_poll_wait() {
        let source = ScriptedSource::new([page(&[], false)]);
        let mut consumer =
            FeedConsumer::new(&source, "payment", 0).with_poll_interval(Duration::from_secs(3600));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result = consumer.run(&cancel, |_| Ok::<_, Error>(())).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(Instant::now() - start < Duration::from_secs(3600));
        assert!(source.since_values().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fetch_waits_one_interval() {
        let source = ScriptedSource::new([page(&[1], false)]);
        let mut consumer = FeedConsumer::new(&source, "payment", 0).with_poll_interval(INTERVAL);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let result = consumer.run(&cancel, |_| Ok::<_, Error>(())).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(source.since_values().is_empty());
        assert_eq!(consumer.cursor(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_poll_interval_is_raised_to_minimum() {
        let source = ScriptedSource::new([page(&[], false), page(&[], false), page(&[], false)]);
        let mut consumer = FeedConsumer::new(&source, "payment", 0).with_poll_interval(Duration::ZERO);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        let result = consumer.run(&cancel, |_| Ok::<_, Error>(())).await;
        assert_exhausted(result);

        let times = source.call_times();
        assert_eq!(times.len(), 4);
        assert!(times[0] - start >= MIN_POLL_INTERVAL);
        assert!(times.windows(2).all(|w| w[1] - w[0] >= MIN_POLL_INTERVAL));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_page_stops_before_next_entry() {
        let source = ScriptedSource::new([page(&[1, 2, 3], false)]);
        let mut consumer = FeedConsumer::new(&source, "payment", 0);
        let cancel = CancellationToken::new();

        let mut seen = Vec::new();
        let result = consumer
            .run(&cancel, |e| {
                seen.push(e.sequence_number);
                cancel.cancel();
                Ok::<_, Error>(())
            })
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(seen, vec![1]);
        assert_eq!(consumer.cursor(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_error_keeps_cursor_on_last_success() {
        let source = ScriptedSource::new([page(&[1, 2, 3], false)]);
        let mut consumer = FeedConsumer::new(&source, "payment", 0);
        let cancel = CancellationToken::new();

        let result = consumer
            .run(&cancel, |e| {
                if e.sequence_number == 2 {
                    Err("projection store unavailable")
                } else {
                    Ok(())
                }
            })
            .await;

        match result {
            Err(Error::Handler {
                sequence_number,
                source,
            }) => {
                assert_eq!(sequence_number, 2);
                assert_eq!(source.to_string(), "projection store unavailable");
            }
            other => panic!("Expected Handler error, got {:?}", other),
        }
        assert_eq!(consumer.cursor(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_after_handler_error() {
        let source = ScriptedSource::new([page(&[1, 2, 3], false), page(&[2, 3], false)]);
        let mut consumer = FeedConsumer::new(&source, "payment", 0);
        let cancel = CancellationToken::new();

        let mut fail = true;
        let mut seen = Vec::new();
        let mut handler = |e: &FeedEntry| {
            if e.sequence_number == 2 && std::mem::take(&mut fail) {
                return Err("transient");
            }
            seen.push(e.sequence_number);
            Ok(())
        };

        assert!(matches!(
            consumer.run(&cancel, &mut handler).await,
            Err(Error::Handler { .. })
        ));
        assert_exhausted(consumer.run(&cancel, &mut handler).await);
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(source.since_values(), vec![0, 1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entries_are_skipped() {
        let source = ScriptedSource::new([page(&[3, 4], true), page(&[4, 5], false)]);
        let mut consumer = FeedConsumer::new(&source, "payment", 2);
        let cancel = CancellationToken::new();

        let mut seen = Vec::new();
        let result = consumer
            .run(&cancel, |e| {
                seen.push(e.sequence_number);
                Ok::<_, Error>(())
            })
            .await;

        assert_exhausted(result);
        assert_eq!(seen, vec![3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_propagates() {
        let source = ScriptedSource::new([page(&[1], true)]);
        source
            .pages
            .lock()
            .unwrap()
            .push_back(Err(Error::not_found("feed 'payment'")));
        let mut consumer = FeedConsumer::new(&source, "payment", 0);
        let cancel = CancellationToken::new();

        let result = consumer.run(&cancel, |_| Ok::<_, Error>(())).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        assert_eq!(consumer.cursor(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_streams_entries_then_error() {
        let source = ScriptedSource::new([page(&[1, 2], true), page(&[3], false)]);
        let consumer = FeedConsumer::new(source, "payment", 0).with_poll_interval(INTERVAL);

        let mut rx = consumer.subscribe(CancellationToken::new(), 1);
        let mut seen = Vec::new();
        let last = loop {
            match rx.recv().await {
                Some(Ok(entry)) => seen.push(entry.sequence_number),
                Some(Err(e)) => break e,
                None => panic!("Channel closed without a terminating error"),
            }
        };

        assert_eq!(seen, vec![1, 2, 3]);
        assert!(matches!(last, Error::UnexpectedStatus(EXHAUSTED)));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_ends_with_cancelled() {
        let source = ScriptedSource::new([page(&[1], false)]);
        let consumer =
            FeedConsumer::new(source, "payment", 0).with_poll_interval(Duration::from_secs(60));
        let cancel = CancellationToken::new();

        let mut rx = consumer.subscribe(cancel.clone(), 4);
        assert_eq!(rx.recv().await.unwrap().unwrap().sequence_number, 1);

        cancel.cancel();
        assert!(matches!(rx.recv().await, Some(Err(Error::Cancelled))));
        assert!(rx.recv().await.is_none());
    }

    proptest! {
        #[test]
        fn prop_delivery_is_strictly_increasing_without_gaps(
            pages in prop::collection::vec(
                (prop::collection::vec(1u64..5, 0..6), any::<bool>()),
                0..8,
            )
        ) {
            // Deltas become strictly increasing sequence numbers across pages.
            let mut next = 0u64;
            let script: Vec<Page> = pages
                .iter()
                .map(|(deltas, has_more)| {
                    let seqs: Vec<u64> = deltas.iter().map(|d| { next += d; next }).collect();
                    page(&seqs, *has_more)
                })
                .collect();
            let served: Vec<u64> = script
                .iter()
                .flat_map(|p| p.entries.iter().map(|e| e.sequence_number))
                .collect();

            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            let source = ScriptedSource::new(script);
            let (result, seen, cursor) = rt.block_on(async {
                let mut consumer = FeedConsumer::new(&source, "payment", 0).with_poll_interval(INTERVAL);
                let mut seen = Vec::new();
                let result = consumer
                    .run(&CancellationToken::new(), |e| {
                        seen.push(e.sequence_number);
                        Ok::<_, Error>(())
                    })
                    .await;
                (result, seen, consumer.cursor())
            });

            prop_assert!(matches!(result, Err(Error::UnexpectedStatus(EXHAUSTED))));
            prop_assert_eq!(&seen, &served);
            prop_assert!(seen.windows(2).all(|w| w[0] < w[1]));
            prop_assert_eq!(cursor, served.last().copied().unwrap_or(0));
        }
    }
}
