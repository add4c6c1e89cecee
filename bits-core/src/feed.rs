//! Paginated timeline feed.
//!
//! [`TimelineFeed`] is the synchronous state machine: it hands out
//! [`FetchTicket`]s and folds page responses back in. [`Timeline`] drives it
//! against a [`BitStore`].
//!
//! States: `Idle -> Fetching(0) -> Ready(has_more) -> Fetching(n+1) -> ...`,
//! with `Failed(n)` retrying the same page. Every reset (filter change or
//! cache invalidation) starts a new epoch; responses carrying an older epoch
//! are discarded on arrival. At most one fetch is in flight per epoch, so
//! pages are always appended in ascending order.
//!
//! Writes bump a shared [`CacheVersion`]. The feed treats a version bump
//! exactly like a filter change: full reset, refetch from page 0.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{watch, Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::BitsError;
use crate::filter::BitFilter;
use crate::models::Bit;
use crate::store::{BitStore, Page};
use crate::timeline::{group_by_month, MonthGroup};

/// Rows per page window. A page with exactly this many rows means more may
/// follow.
pub const PAGE_SIZE: usize = 20;

// ============================================================================
// CacheVersion
// ============================================================================

/// Single versioned key covering every cached bit query.
#[derive(Debug, Clone)]
pub struct CacheVersion {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for CacheVersion {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheVersion {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Invalidate every view derived from the previous version.
    pub fn bump(&self) -> u64 {
        self.tx.send_modify(|v| *v += 1);
        self.current()
    }
}

// ============================================================================
// TimelineFeed state machine
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedState {
    Idle,
    Fetching { page: usize },
    Ready { has_more: bool },
    Failed { page: usize, message: String },
}

/// A page request issued by the feed. Hand it back to [`TimelineFeed::apply`]
/// together with the store's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub epoch: u64,
    pub version: u64,
    pub page: usize,
    pub page_size: usize,
    pub filter: BitFilter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    /// The page was appended.
    Appended {
        page: usize,
        rows: usize,
        has_more: bool,
    },
    /// The response belonged to a superseded epoch and was dropped.
    Stale,
    /// Nothing to do: a fetch is already in flight or the feed is exhausted.
    Skipped,
}

#[derive(Debug)]
pub struct TimelineFeed {
    filter: BitFilter,
    page_size: usize,
    epoch: u64,
    seen_version: u64,
    state: FeedState,
    pages_loaded: usize,
    bits: Vec<Bit>,
    ids: HashSet<Uuid>,
    total: Option<u64>,
}

impl Default for TimelineFeed {
    fn default() -> Self {
        Self::new(PAGE_SIZE)
    }
}

impl TimelineFeed {
    pub fn new(page_size: usize) -> Self {
        Self {
            filter: BitFilter::default(),
            page_size: page_size.max(1),
            epoch: 0,
            seen_version: 0,
            state: FeedState::Idle,
            pages_loaded: 0,
            bits: Vec::new(),
            ids: HashSet::new(),
            total: None,
        }
    }

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    pub fn filter(&self) -> &BitFilter {
        &self.filter
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Merged, ordered collection of every page held for the current epoch.
    pub fn bits(&self) -> &[Bit] {
        &self.bits
    }

    pub fn pages_loaded(&self) -> usize {
        self.pages_loaded
    }

    pub fn total_count(&self) -> Option<u64> {
        self.total
    }

    pub fn has_more(&self) -> bool {
        matches!(self.state, FeedState::Ready { has_more: true })
    }

    pub fn is_fetching(&self) -> bool {
        matches!(self.state, FeedState::Fetching { .. })
    }

    /// Whether `version` has moved past the one this feed was built from.
    pub fn is_outdated(&self, version: u64) -> bool {
        self.seen_version != version
    }

    pub fn groups(&self) -> Vec<MonthGroup> {
        group_by_month(&self.bits)
    }

    /// Switch filters. Drops every held page and requests page 0.
    pub fn set_filter(&mut self, filter: BitFilter, version: u64) -> FetchTicket {
        self.filter = filter;
        self.reset(version)
    }

    /// Cache invalidation: same as a filter change, keeping the filter.
    pub fn invalidate(&mut self, version: u64) -> FetchTicket {
        self.reset(version)
    }

    /// Request the next page. `None` while a fetch is in flight or once the
    /// last page came back short. From `Idle` this is the first page, from
    /// `Failed` it re-issues the page that failed.
    pub fn load_more(&mut self) -> Option<FetchTicket> {
        let page = match &self.state {
            FeedState::Idle => 0,
            FeedState::Fetching { .. } => return None,
            FeedState::Ready { has_more: false } => return None,
            FeedState::Ready { has_more: true } => self.pages_loaded,
            FeedState::Failed { page, .. } => *page,
        };
        self.state = FeedState::Fetching { page };
        Some(self.ticket(page))
    }

    /// Fold a store response into the feed.
    ///
    /// Responses for another epoch, or for a page other than the one in
    /// flight, return [`FeedOutcome::Stale`] and change nothing. A failure keeps
    /// the pages already held and is returned to the caller.
    pub fn apply(
        &mut self,
        ticket: &FetchTicket,
        result: Result<Page, BitsError>,
    ) -> Result<FeedOutcome, BitsError> {
        if ticket.epoch != self.epoch || self.state != (FeedState::Fetching { page: ticket.page }) {
            tracing::debug!(
                ticket_epoch = ticket.epoch,
                epoch = self.epoch,
                page = ticket.page,
                "Discarding stale timeline page"
            );
            return Ok(FeedOutcome::Stale);
        }

        match result {
            Ok(page) => {
                let rows = page.rows.len();
                let has_more = rows == self.page_size;
                for bit in page.rows {
                    if self.ids.insert(bit.id) {
                        self.bits.push(bit);
                    }
                }
                if page.total.is_some() {
                    self.total = page.total;
                }
                self.pages_loaded = ticket.page + 1;
                self.state = FeedState::Ready { has_more };
                Ok(FeedOutcome::Appended {
                    page: ticket.page,
                    rows,
                    has_more,
                })
            }
            Err(e) => {
                tracing::warn!(page = ticket.page, error = %e, "Timeline page fetch failed");
                self.state = FeedState::Failed {
                    page: ticket.page,
                    message: e.to_string(),
                };
                Err(e)
            }
        }
    }

    fn reset(&mut self, version: u64) -> FetchTicket {
        self.epoch += 1;
        self.seen_version = version;
        self.pages_loaded = 0;
        self.bits.clear();
        self.ids.clear();
        self.total = None;
        self.state = FeedState::Fetching { page: 0 };
        self.ticket(0)
    }

    fn ticket(&self, page: usize) -> FetchTicket {
        FetchTicket {
            epoch: self.epoch,
            version: self.seen_version,
            page,
            page_size: self.page_size,
            filter: self.filter.clone(),
        }
    }
}

// ============================================================================
// Timeline driver
// ============================================================================

/// Async driver pairing a [`TimelineFeed`] with its store.
///
/// The feed lock is never held across a store call, so overlapping calls see
/// the in-flight state: a second `load_more` is skipped rather than queued,
/// and a `set_filter` issued mid-fetch makes the earlier response stale.
///
/// Every accessor first catches up with the [`CacheVersion`]: if a write
/// landed since the held pages were fetched, the feed is reset to page 0
/// before answering and the refetch starts in the background.
#[derive(Clone)]
pub struct Timeline {
    store: Arc<dyn BitStore>,
    version: CacheVersion,
    feed: Arc<Mutex<TimelineFeed>>,
}

impl Timeline {
    pub fn new(store: Arc<dyn BitStore>, version: CacheVersion, page_size: usize) -> Self {
        Self {
            store,
            version,
            feed: Arc::new(Mutex::new(TimelineFeed::new(page_size))),
        }
    }

    /// Apply a new filter and fetch its first page.
    pub async fn set_filter(&self, filter: BitFilter) -> Result<FeedOutcome, BitsError> {
        let ticket = {
            let mut feed = self.feed.lock().await;
            feed.set_filter(filter, self.version.current())
        };
        self.run(ticket).await
    }

    /// Fetch the next page, or restart from page 0 if a write happened since
    /// the held pages were fetched.
    pub async fn load_more(&self) -> Result<FeedOutcome, BitsError> {
        let ticket = {
            let mut feed = self.feed.lock().await;
            let current = self.version.current();
            if feed.is_outdated(current) {
                Some(feed.invalidate(current))
            } else {
                feed.load_more()
            }
        };
        match ticket {
            Some(ticket) => self.run(ticket).await,
            None => Ok(FeedOutcome::Skipped),
        }
    }

    /// Unconditional reset to page 0 under the current filter.
    pub async fn refresh(&self) -> Result<FeedOutcome, BitsError> {
        let ticket = {
            let mut feed = self.feed.lock().await;
            feed.invalidate(self.version.current())
        };
        self.run(ticket).await
    }

    /// Reset only if a write bumped the cache version.
    pub async fn refresh_if_stale(&self) -> Result<FeedOutcome, BitsError> {
        let ticket = {
            let mut feed = self.feed.lock().await;
            let current = self.version.current();
            if feed.is_outdated(current) {
                Some(feed.invalidate(current))
            } else {
                None
            }
        };
        match ticket {
            Some(ticket) => self.run(ticket).await,
            None => Ok(FeedOutcome::Skipped),
        }
    }

    pub async fn bits(&self) -> Vec<Bit> {
        self.current_feed().await.bits().to_vec()
    }

    pub async fn groups(&self) -> Vec<MonthGroup> {
        self.current_feed().await.groups()
    }

    pub async fn state(&self) -> FeedState {
        self.current_feed().await.state().clone()
    }

    pub async fn has_more(&self) -> bool {
        self.current_feed().await.has_more()
    }

    pub async fn total_count(&self) -> Option<u64> {
        self.current_feed().await.total_count()
    }

    pub async fn filter(&self) -> BitFilter {
        self.feed.lock().await.filter().clone()
    }

    /// Lock the feed, resetting it first if the cache version moved on.
    async fn current_feed(&self) -> MutexGuard<'_, TimelineFeed> {
        let mut feed = self.feed.lock().await;
        let current = self.version.current();
        if feed.is_outdated(current) {
            let ticket = feed.invalidate(current);
            tracing::debug!(version = current, epoch = ticket.epoch, "Timeline reset after write");
            let timeline = self.clone();
            tokio::spawn(async move {
                if let Err(e) = timeline.run(ticket).await {
                    tracing::debug!(error = %e, "Background timeline refetch failed");
                }
            });
        }
        feed
    }

    async fn run(&self, mut ticket: FetchTicket) -> Result<FeedOutcome, BitsError> {
        loop {
            tracing::debug!(
                page = ticket.page,
                epoch = ticket.epoch,
                "Fetching timeline page"
            );
            let result = self
                .store
                .list_bits(&ticket.filter, ticket.page, ticket.page_size)
                .await;

            let mut feed = self.feed.lock().await;
            let current = self.version.current();
            if ticket.version != current && ticket.epoch == feed.epoch() {
                // a write landed while this page was in flight
                ticket = feed.invalidate(current);
                continue;
            }
            return feed.apply(&ticket, result);
        }
    }
}
