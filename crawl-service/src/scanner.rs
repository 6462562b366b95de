use imgur_client::{GalleryApi, RateLimitedClient};
use reposter_core::{CoreError, GalleryItem, Section};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Item(GalleryItem),
    /// Every page of the cycle has been yielded; the scanner sleeps next.
    CycleComplete { cycle: u64, pages: u32 },
}

/// Endless pull-based walk over one gallery section.
///
/// A cycle reads pages `0..pages_per_cycle` in order and yields their items
/// in feed order, dropping ids already yielded earlier in the same cycle.
/// Between cycles it sleeps for the poll interval. It keeps no memory across
/// cycles; history lives in the dedup store.
#[derive(Debug)]
pub struct FeedScanner {
    section: Section,
    pages_per_cycle: u32,
    poll_interval: Duration,
    shutdown: CancellationToken,
    buffer: VecDeque<GalleryItem>,
    seen_this_cycle: HashSet<String>,
    next_page: u32,
    cycle: u64,
    pending_sleep: bool,
}

impl FeedScanner {
    pub fn new(
        section: Section,
        pages_per_cycle: u32,
        poll_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            section,
            pages_per_cycle,
            poll_interval,
            shutdown,
            buffer: VecDeque::new(),
            seen_this_cycle: HashSet::new(),
            next_page: 0,
            cycle: 0,
            pending_sleep: false,
        }
    }

    pub fn section(&self) -> Section {
        self.section
    }

    /// `Ok(None)` only once shutdown was requested.
    pub async fn next_event<A: GalleryApi>(
        &mut self,
        client: &mut RateLimitedClient<A>,
    ) -> Result<Option<ScanEvent>, CoreError> {
        loop {
            if self.shutdown.is_cancelled() {
                return Ok(None);
            }

            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(ScanEvent::Item(item)));
            }

            if self.pending_sleep {
                debug!("{} scan sleeping for {:?}", self.section, self.poll_interval);
                tokio::select! {
                    _ = self.shutdown.cancelled() => return Ok(None),
                    _ = sleep(self.poll_interval) => {}
                }
                self.pending_sleep = false;
                continue;
            }

            if self.next_page >= self.pages_per_cycle {
                let cycle = self.cycle;
                self.cycle += 1;
                self.next_page = 0;
                self.seen_this_cycle.clear();
                self.pending_sleep = true;
                return Ok(Some(ScanEvent::CycleComplete {
                    cycle,
                    pages: self.pages_per_cycle,
                }));
            }

            let page = self.next_page;
            let items = match client.list_gallery(&self.section.query(page)).await {
                Ok(items) => items,
                Err(CoreError::Cancelled) => return Ok(None),
                Err(error) => return Err(error),
            };
            self.next_page += 1;

            let total = items.len();
            for item in items {
                if self.seen_this_cycle.insert(item.id.clone()) {
                    self.buffer.push_back(item);
                }
            }
            debug!(
                "{} page {} returned {} items, {} new this cycle",
                self.section,
                page,
                total,
                self.buffer.len()
            );
        }
    }

    pub async fn next_item<A: GalleryApi>(
        &mut self,
        client: &mut RateLimitedClient<A>,
    ) -> Result<Option<GalleryItem>, CoreError> {
        loop {
            match self.next_event(client).await? {
                Some(ScanEvent::Item(item)) => return Ok(Some(item)),
                Some(ScanEvent::CycleComplete { .. }) => continue,
                None => return Ok(None),
            }
        }
    }
}
