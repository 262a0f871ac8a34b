//! Texture cache.
//!
//! A read-only prefetching cache modeled after
//! "Prefetching in a Texture Cache Architecture" (Igehy et al., 1998).
//!
//! Accesses flow through four bounded queues:
//! fragment fifo, request fifo, reorder buffer (ROB) and result fifo.
//! Tags are updated when an access is admitted, so a later access to a line
//! whose fetch is still in flight already hits. The ROB releases results
//! strictly in admission order.

use crate::sync::{Arc, Mutex};
use crate::{
    address, cache, config, fifo::Fifo, interconn as ic, mem_fetch, tag_array,
};
use cache::{CacheController, RequestStatus, ReservationFailure};
use std::collections::HashMap;

/// An admitted access waiting for its data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fragment {
    pub request: mem_fetch::MemFetch,
    pub cache_index: usize,
    pub miss: bool,
    pub data_size: u32,
}

impl std::fmt::Display for Fragment {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Fragment({}, index={}, miss={})",
            self.request, self.cache_index, self.miss
        )
    }
}

/// Reorder buffer entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RobEntry {
    pub index: usize,
    pub request: mem_fetch::MemFetch,
    pub block_addr: address,
    pub ready: bool,
    pub ready_time: u64,
}

impl std::fmt::Display for RobEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Rob({}, block={}, ready={})",
            self.request, self.block_addr, self.ready
        )
    }
}

/// Presence record of a line in the data array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DataBlock {
    pub valid: bool,
    pub block_addr: address,
}

pub struct Texture<CC = cache::CacheControllerUnit> {
    pub name: String,
    pub stats: Arc<Mutex<stats::Cache>>,
    pub cache_controller: CC,
    pub cache_config: cache::Config,
    pub tags: tag_array::TagArray<CC>,

    fragment_fifo: Fifo<Fragment>,
    request_fifo: Fifo<mem_fetch::MemFetch>,
    rob: Fifo<RobEntry>,
    result_fifo: Fifo<mem_fetch::MemFetch>,

    /// Maps outstanding fetches to their ROB slot.
    pending: HashMap<u64, usize>,
    data: Vec<DataBlock>,
    top_port: Option<ic::Port<mem_fetch::MemFetch>>,
}

impl<CC> std::fmt::Debug for Texture<CC> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("name", &self.name)
            .field("fragment_fifo", &self.fragment_fifo.len())
            .field("request_fifo", &self.request_fifo.len())
            .field("rob", &self.rob.len())
            .field("result_fifo", &self.result_fifo.len())
            .finish_non_exhaustive()
    }
}

impl Texture {
    pub fn new(
        name: String,
        cache_config: Arc<config::Cache>,
        stats: Arc<Mutex<stats::Cache>>,
    ) -> Result<Self, config::Error> {
        let cache_controller =
            cache::CacheControllerUnit::new(cache::Config::from(&*cache_config));
        Self::with_controller(name, cache_config, stats, cache_controller)
    }
}

impl<CC> Texture<CC>
where
    CC: CacheController + Clone,
{
    pub fn with_controller(
        name: String,
        cache_config: Arc<config::Cache>,
        stats: Arc<Mutex<stats::Cache>>,
        cache_controller: CC,
    ) -> Result<Self, config::Error> {
        cache_config.validate_texture()?;
        let result_fifo_entries = cache_config
            .result_fifo_entries
            .ok_or(config::Error::MissingResultFifo)?;
        let config = cache::Config::from(&*cache_config);
        let tags = tag_array::TagArray::with_controller(config.clone(), cache_controller.clone());
        let data = vec![DataBlock::default(); config.total_lines];
        Ok(Self {
            name,
            stats,
            cache_controller,
            tags,
            fragment_fifo: Fifo::new(cache_config.fragment_fifo_entries()),
            request_fifo: Fifo::new(cache_config.request_fifo_entries()),
            rob: Fifo::new(cache_config.rob_entries()),
            result_fifo: Fifo::new(result_fifo_entries),
            pending: HashMap::new(),
            data,
            cache_config: config,
            top_port: None,
        })
    }
}

impl<CC> Texture<CC> {
    /// The data array, for inspection.
    #[must_use]
    pub fn data_blocks(&self) -> &[DataBlock] {
        &self.data
    }

    fn reservation_fail(
        &self,
        fetch: &mem_fetch::MemFetch,
        reason: ReservationFailure,
    ) -> RequestStatus {
        log::debug!("{}::access({}) => {:?}", self.name, fetch, reason);
        let mut stats = self.stats.lock();
        stats.inc(fetch.access_kind(), reason, 1);
        stats.inc(fetch.access_kind(), RequestStatus::RESERVATION_FAIL, 1);
        RequestStatus::RESERVATION_FAIL
    }

    fn log_queues(&self, cycle: u64) {
        if !log::log_enabled!(log::Level::Trace) {
            return;
        }
        log::trace!(
            "{}::cycle({}) fragments={} requests={} rob={} results={}",
            self.name,
            cycle,
            console::style(&self.fragment_fifo).cyan(),
            console::style(&self.request_fifo).yellow(),
            console::style(&self.rob).magenta(),
            console::style(&self.result_fifo).green(),
        );
    }
}

impl<CC> cache::Component for Texture<CC> {
    /// Advances the pipeline by one cycle.
    ///
    /// Sends the next request to memory and retires the oldest fragment
    /// once its ROB slot is ready.
    fn cycle(&mut self, cycle: u64) {
        self.log_queues(cycle);

        // send next request to lower level of memory
        if let (Some(fetch), Some(port)) = (self.request_fifo.first(), &self.top_port) {
            let mut port = port.lock();
            if port.can_send(&[fetch.packet_size()]) {
                if let Some(mut fetch) = self.request_fifo.pop() {
                    log::debug!("{}::memport::push({})", self.name, fetch);
                    fetch.set_status(mem_fetch::Status::IN_ICNT_TO_MEM, cycle);
                    port.send(ic::Packet {
                        data: fetch,
                        time: cycle,
                    });
                }
            }
        }

        // read ready lines from cache
        let head_ready = self.rob.first().is_some_and(|entry| entry.ready);
        if self.fragment_fifo.is_empty() || !head_ready || self.result_fifo.full() {
            return;
        }
        let (Some(fragment), Some(rob_entry)) = (self.fragment_fifo.pop(), self.rob.pop()) else {
            return;
        };
        debug_assert_eq!(fragment.request, rob_entry.request);
        if fragment.miss {
            self.data[fragment.cache_index] = DataBlock {
                valid: true,
                block_addr: rob_entry.block_addr,
            };
        }
        let mut request = fragment.request;
        request.set_status(mem_fetch::Status::IN_SHADER_FETCHED, cycle);
        log::debug!(
            "{}::cycle({}) {} ready (at {})",
            self.name,
            cycle,
            request,
            rob_entry.ready_time
        );
        self.result_fifo.push(request);
    }
}

impl<CC> cache::Cache for Texture<CC>
where
    CC: CacheController,
{
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn stats(&self) -> &Arc<Mutex<stats::Cache>> {
        &self.stats
    }

    /// Admits an access into the pipeline.
    ///
    /// Returns `MISS` if a fetch was issued and `HIT_RESERVED` otherwise,
    /// never `HIT`.
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
            "{}: texture cache cannot handle write {}",
            self.name,
            fetch
        );
        if self.request_fifo.full() {
            return self.reservation_fail(&fetch, ReservationFailure::MISS_QUEUE_FULL);
        }
        if self.fragment_fifo.full() || self.rob.full() {
            return self.reservation_fail(&fetch, ReservationFailure::MSHR_ENTRY_FAIL);
        }

        let block_addr = self.cache_controller.block_addr(addr);
        let tag_array::AccessStatus { index, status, .. } = self.tags.access(block_addr, time);
        let Some(cache_index) = index else {
            return self.reservation_fail(&fetch, ReservationFailure::LINE_ALLOC_FAIL);
        };

        let data_size = fetch.data_size();
        let miss = status == RequestStatus::MISS;
        let rob_entry = RobEntry {
            index: cache_index,
            request: fetch.clone(),
            block_addr,
            ready: !miss,
            ready_time: if miss { 0 } else { time },
        };
        let rob_index = self.rob.push(rob_entry);

        let status = if miss {
            // the line is valid from now on, later accesses queue behind this one
            self.tags.fill_on_miss(cache_index, time);

            let mut request = fetch.clone();
            request.access.addr = block_addr;
            request.access.req_size_bytes = self.cache_config.line_size;
            request.set_status(mem_fetch::Status::IN_L1T_MISS_QUEUE, time);
            self.pending.insert(request.uid, rob_index);
            self.request_fifo.push(request);
            events.push(cache::Event::ReadRequestSent);
            RequestStatus::MISS
        } else {
            RequestStatus::HIT_RESERVED
        };

        log::debug!(
            "{}::access({}, block={}, cache_index={}) => {:?} (rob slot {})",
            self.name,
            fetch,
            block_addr,
            cache_index,
            status,
            rob_index
        );
        self.stats.lock().inc(fetch.access_kind(), status, 1);
        self.fragment_fifo.push(Fragment {
            request: fetch,
            cache_index,
            miss,
            data_size,
        });
        status
    }

    fn has_ready_accesses(&self) -> bool {
        !self.result_fifo.is_empty()
    }

    fn next_access(&mut self) -> Option<mem_fetch::MemFetch> {
        self.result_fifo.pop()
    }

    /// Marks the ROB slot of the fetch ready.
    ///
    /// # Panics
    /// If the fetch was not issued by this cache.
    fn fill(&mut self, fetch: mem_fetch::MemFetch, time: u64) {
        let Some(rob_index) = self.pending.remove(&fetch.uid) else {
            panic!(
                "{}: texture fill for unknown request {} (uid={})",
                self.name, fetch, fetch.uid
            );
        };
        let Some(entry) = self.rob.peek_mut(rob_index) else {
            panic!("{}: rob slot {} of {} is empty", self.name, rob_index, fetch);
        };
        debug_assert_eq!(entry.request.uid, fetch.uid);
        entry.ready = true;
        entry.ready_time = time;
        entry
            .request
            .set_status(mem_fetch::Status::IN_SHADER_L1T_ROB, time);
        log::debug!("{}::fill({}) rob slot {} ready", self.name, fetch, rob_index);
    }

    fn flush(&mut self) -> usize {
        self.tags.flush()
    }

    fn invalidate(&mut self) {
        self.tags.invalidate();
        self.data.fill(DataBlock::default());
    }

    fn waiting_for_fill(&self, fetch: &mem_fetch::MemFetch) -> bool {
        self.pending.contains_key(&fetch.uid)
    }

    fn write_allocate_policy(&self) -> cache::config::WriteAllocatePolicy {
        self.cache_config.write_allocate_policy
    }

    fn set_top_port(&mut self, port: ic::Port<mem_fetch::MemFetch>) {
        self.top_port = Some(port);
    }

    fn tag_array_stats(&self) -> tag_array::Stats {
        self.tags.stats()
    }

    fn new_window(&mut self) {
        self.tags.new_window();
    }

    fn windowed_miss_rate(&self) -> f32 {
        self.tags.windowed_miss_rate()
    }
}

#[cfg(test)]
mod tests {
    use crate::cache::{Cache, Component, Event, RequestStatus, ReservationFailure};
    use crate::interconn::Packet;
    use crate::mem_fetch::{access::Kind as AccessKind, Status};
    use crate::testing;
    use color_eyre::eyre;

    #[test]
    fn test_completes_in_admission_order() -> eyre::Result<()> {
        testing::init_logging();
        let mut cache = testing::texture(testing::texture_config(4, 4))?;
        let (queue, port) = testing::port(8);
        cache.set_top_port(port);
        let mut events = Vec::new();

        // warm up line B
        let warm = testing::fetch(AccessKind::TEXTURE_ACC_R, 128);
        assert_eq!(cache.access(128, warm.clone(), &mut events, 0), RequestStatus::MISS);
        cache.cycle(0);
        let reply = queue.lock().pop().unwrap();
        cache.fill(reply.data, 1);
        cache.cycle(1);
        assert_eq!(cache.next_access(), Some(warm));

        // R1 misses on A, R2 hits on B
        events.clear();
        let r1 = testing::fetch(AccessKind::TEXTURE_ACC_R, 0);
        let r2 = testing::fetch(AccessKind::TEXTURE_ACC_R, 132);
        assert_eq!(cache.access(0, r1.clone(), &mut events, 2), RequestStatus::MISS);
        assert_eq!(
            cache.access(132, r2.clone(), &mut events, 2),
            RequestStatus::HIT_RESERVED
        );
        assert_eq!(events, vec![Event::ReadRequestSent]);

        for cycle in 2..10 {
            cache.cycle(cycle);
            assert!(!cache.has_ready_accesses(), "R2 must wait for R1");
        }
        let reply = queue.lock().pop().unwrap();
        assert!(cache.waiting_for_fill(&reply.data));
        cache.fill(reply.data, 10);
        cache.cycle(10);
        cache.cycle(11);

        let first = cache.next_access().unwrap();
        assert_eq!(first, r1);
        assert_eq!(first.status, Status::IN_SHADER_FETCHED);
        assert_eq!(cache.next_access(), Some(r2));
        assert_eq!(cache.next_access(), None);
        assert_eq!(cache.data_blocks().iter().filter(|block| block.valid).count(), 2);
        Ok(())
    }

    #[test]
    fn test_access_to_inflight_line_waits() -> eyre::Result<()> {
        let mut cache = testing::texture(testing::texture_config(1, 2))?;
        let mut events = Vec::new();
        let r1 = testing::fetch(AccessKind::TEXTURE_ACC_R, 0);
        let r2 = testing::fetch(AccessKind::TEXTURE_ACC_R, 64);
        assert_eq!(cache.access(0, r1.clone(), &mut events, 0), RequestStatus::MISS);
        // the tag is valid immediately, no second fetch
        assert_eq!(
            cache.access(64, r2.clone(), &mut events, 0),
            RequestStatus::HIT_RESERVED
        );
        assert_eq!(events.len(), 1);

        cache.cycle(1);
        assert!(!cache.has_ready_accesses());
        cache.fill(r1.clone(), 2);
        for cycle in 3..6 {
            cache.cycle(cycle);
        }
        let completed: Vec<_> = std::iter::from_fn(|| cache.next_access()).collect();
        assert_eq!(completed, vec![r1, r2]);
        Ok(())
    }

    #[test]
    fn test_full_queues_reject() -> eyre::Result<()> {
        let mut config = testing::texture_config(4, 4);
        // request fifo
        config.mshr_max_merge = 1;
        let mut cache = testing::texture(config)?;
        let mut events = Vec::new();
        let fetch = testing::fetch(AccessKind::TEXTURE_ACC_R, 0);
        assert_eq!(cache.access(0, fetch, &mut events, 0), RequestStatus::MISS);
        let fetch = testing::fetch(AccessKind::TEXTURE_ACC_R, 128);
        assert_eq!(
            cache.access(128, fetch, &mut events, 0),
            RequestStatus::RESERVATION_FAIL
        );

        let mut config = testing::texture_config(4, 4);
        // rob
        config.miss_queue_size = 1;
        let mut cache = testing::texture(config)?;
        let fetch = testing::fetch(AccessKind::TEXTURE_ACC_R, 0);
        assert_eq!(cache.access(0, fetch, &mut events, 0), RequestStatus::MISS);
        let fetch = testing::fetch(AccessKind::TEXTURE_ACC_R, 4);
        assert_eq!(
            cache.access(4, fetch, &mut events, 0),
            RequestStatus::RESERVATION_FAIL
        );
        let stats = cache.stats().lock().clone();
        assert_eq!(
            stats.get(AccessKind::TEXTURE_ACC_R, ReservationFailure::MSHR_ENTRY_FAIL),
            1
        );
        Ok(())
    }

    #[test]
    fn test_refused_requests_back_up() -> eyre::Result<()> {
        let mut config = testing::texture_config(4, 4);
        config.mshr_max_merge = 2;
        let mut cache = testing::texture(config)?;
        let (queue, port) = testing::port(1);
        cache.set_top_port(port);
        queue.lock().push(Packet {
            data: testing::fetch(AccessKind::GLOBAL_ACC_R, 0x1000),
            time: 0,
        });

        let mut events = Vec::new();
        let r1 = testing::fetch(AccessKind::TEXTURE_ACC_R, 0);
        let r2 = testing::fetch(AccessKind::TEXTURE_ACC_R, 128);
        assert_eq!(cache.access(0, r1.clone(), &mut events, 0), RequestStatus::MISS);
        assert_eq!(cache.access(128, r2.clone(), &mut events, 0), RequestStatus::MISS);
        cache.cycle(0);

        // both requests are still queued
        let r3 = testing::fetch(AccessKind::TEXTURE_ACC_R, 256);
        assert_eq!(
            cache.access(256, r3.clone(), &mut events, 1),
            RequestStatus::RESERVATION_FAIL
        );
        let stats = cache.stats().lock().clone();
        assert_eq!(
            stats.get(AccessKind::TEXTURE_ACC_R, ReservationFailure::MISS_QUEUE_FULL),
            1
        );

        let _ = queue.lock().pop();
        cache.cycle(1);
        let sent = queue.lock().pop().unwrap();
        assert_eq!(sent.data, r1);
        assert_eq!(sent.data.status, Status::IN_ICNT_TO_MEM);
        assert_eq!(cache.access(256, r3, &mut events, 2), RequestStatus::MISS);

        cache.cycle(2);
        assert_eq!(queue.lock().pop().map(|packet| packet.data), Some(r2));
        Ok(())
    }

    #[test]
    fn test_result_fifo_backpressure() -> eyre::Result<()> {
        let mut config = testing::texture_config(4, 4);
        config.result_fifo_entries = Some(1);
        let mut cache = testing::texture(config)?;
        let mut events = Vec::new();
        let r1 = testing::fetch(AccessKind::TEXTURE_ACC_R, 0);
        let r2 = testing::fetch(AccessKind::TEXTURE_ACC_R, 8);
        let _ = cache.access(0, r1.clone(), &mut events, 0);
        let _ = cache.access(8, r2.clone(), &mut events, 0);
        cache.fill(r1.clone(), 1);
        for cycle in 1..4 {
            cache.cycle(cycle);
        }
        assert_eq!(cache.next_access(), Some(r1));
        assert_eq!(cache.next_access(), None);
        cache.cycle(4);
        assert_eq!(cache.next_access(), Some(r2));
        Ok(())
    }

    #[test]
    #[should_panic(expected = "unknown request")]
    fn test_fill_for_unknown_request_panics() {
        let mut cache = testing::texture(testing::texture_config(4, 4)).unwrap();
        cache.fill(testing::fetch(AccessKind::TEXTURE_ACC_R, 0), 0);
    }
}
