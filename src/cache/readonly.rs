use crate::sync::{Arc, Mutex};
use crate::{address, cache, config, interconn as ic, mem_fetch, tag_array};

use cache::base::ReadRequest;
use cache::{RequestStatus, ReservationFailure};

/// Read-only cache, e.g. for constants and instructions.
#[derive(Debug)]
pub struct ReadOnly<CC = cache::CacheControllerUnit> {
    inner: cache::base::Base<CC>,
}

impl ReadOnly {
    pub fn new(
        name: String,
        cache_config: Arc<config::Cache>,
        stats: Arc<Mutex<stats::Cache>>,
        miss_queue_status: mem_fetch::Status,
    ) -> Result<Self, config::Error> {
        let cache_controller =
            cache::CacheControllerUnit::new(cache::Config::from(&*cache_config));
        Self::with_controller(name, cache_config, stats, miss_queue_status, cache_controller)
    }
}

impl<CC> ReadOnly<CC>
where
    CC: cache::CacheController + Clone,
{
    pub fn with_controller(
        name: String,
        cache_config: Arc<config::Cache>,
        stats: Arc<Mutex<stats::Cache>>,
        miss_queue_status: mem_fetch::Status,
        cache_controller: CC,
    ) -> Result<Self, config::Error> {
        cache_config.validate_read_only()?;
        let inner = cache::base::Builder {
            name,
            stats,
            cache_controller,
            cache_config,
            miss_queue_status,
        }
        .build();
        Ok(Self { inner })
    }
}

impl<CC> ReadOnly<CC> {
    #[must_use]
    pub fn base(&self) -> &cache::base::Base<CC> {
        &self.inner
    }

    #[must_use]
    pub fn ready_accesses(&self) -> Option<&std::collections::VecDeque<mem_fetch::MemFetch>> {
        self.inner.ready_accesses()
    }
}

impl<CC> cache::Component for ReadOnly<CC> {
    fn cycle(&mut self, cycle: u64) {
        self.inner.cycle(cycle);
    }
}

impl<CC> cache::Cache for ReadOnly<CC>
where
    CC: cache::CacheController,
{
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn stats(&self) -> &Arc<Mutex<stats::Cache>> {
        &self.inner.stats
    }

    /// Access read only cache.
    ///
    /// # Panics
    /// If the fetch is a write.
    fn access(
        &mut self,
        addr: address,
        fetch: mem_fetch::MemFetch,
        events: &mut Vec<cache::Event>,
        time: u64,
    ) -> RequestStatus {
        assert!(
            !fetch.is_write(),
            "{}: read only cache cannot handle write {}",
            self.inner.name,
            fetch
        );
        let block_addr = self.inner.cache_controller.block_addr(addr);
        let (cache_index, probe_status) = self.inner.tag_array.probe(block_addr);

        log::debug!(
            "{}::access({}, block={}, cache_index={:?}) probe status={:?}",
            self.inner.name,
            fetch,
            block_addr,
            cache_index,
            probe_status,
        );

        let status = match (probe_status, cache_index) {
            (_, None) => self
                .inner
                .reservation_fail(&fetch, ReservationFailure::LINE_ALLOC_FAIL),
            (RequestStatus::HIT, Some(_)) => {
                // update LRU state
                let _ = self.inner.tag_array.access(block_addr, time);
                RequestStatus::HIT
            }
            (_, Some(_)) if self.inner.miss_queue_full(0) => self
                .inner
                .reservation_fail(&fetch, ReservationFailure::MISS_QUEUE_FULL),
            (_, Some(cache_index)) => {
                match self.inner.send_read_request(
                    block_addr,
                    cache_index,
                    fetch.clone(),
                    None,
                    time,
                    events,
                ) {
                    Ok(ReadRequest::Merged) => RequestStatus::HIT_RESERVED,
                    Ok(ReadRequest::Sent { .. }) => RequestStatus::MISS,
                    Err(reason) => self.inner.reservation_fail(&fetch, reason),
                }
            }
        };

        let stat_status = cache::select_status(probe_status, status);
        self.inner
            .stats
            .lock()
            .inc(fetch.access_kind(), stat_status, 1);
        status
    }

    fn has_ready_accesses(&self) -> bool {
        self.inner.has_ready_accesses()
    }

    fn next_access(&mut self) -> Option<mem_fetch::MemFetch> {
        self.inner.next_access()
    }

    fn fill(&mut self, fetch: mem_fetch::MemFetch, time: u64) {
        // lines are never dirty, evictions need no write-back
        let _ = self.inner.fill(fetch, time);
    }

    fn flush(&mut self) -> usize {
        self.inner.flush()
    }

    fn invalidate(&mut self) {
        self.inner.invalidate();
    }

    fn waiting_for_fill(&self, fetch: &mem_fetch::MemFetch) -> bool {
        self.inner.waiting_for_fill(fetch)
    }

    fn write_allocate_policy(&self) -> cache::config::WriteAllocatePolicy {
        self.inner.cache_config.write_allocate_policy
    }

    fn set_top_port(&mut self, port: ic::Port<mem_fetch::MemFetch>) {
        self.inner.set_top_port(port);
    }

    fn tag_array_stats(&self) -> tag_array::Stats {
        self.inner.tag_array.stats()
    }

    fn new_window(&mut self) {
        self.inner.tag_array.new_window();
    }

    fn windowed_miss_rate(&self) -> f32 {
        self.inner.tag_array.windowed_miss_rate()
    }
}
