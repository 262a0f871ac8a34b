use crate::sync::{Arc, Mutex};
use crate::{address, cache, config, interconn as ic, mem_fetch, tag_array};

use cache::base::ReadRequest;
use cache::policy::{self, WriteHit, WriteMiss};
use cache::{RequestStatus, ReservationFailure};
use mem_fetch::access::Kind as AccessKind;

#[derive(Debug, Clone)]
pub struct Builder<CC> {
    pub name: String,
    pub stats: Arc<Mutex<stats::Cache>>,
    pub cache_controller: CC,
    pub cache_config: Arc<config::Cache>,
    pub miss_queue_status: mem_fetch::Status,
    pub write_alloc_type: AccessKind,
    pub write_back_type: AccessKind,
}

/// Read-write data cache.
///
/// Write hits and write misses are handled according to the configured
/// write policy and write-allocate policy.
pub struct Data<CC = cache::CacheControllerUnit> {
    pub inner: cache::base::Base<CC>,
    policy: policy::Policy,

    /// Specifies type of write allocate request (e.g., L1 or L2)
    write_alloc_type: AccessKind,
    /// Specifies type of writeback request (e.g., L1 or L2)
    write_back_type: AccessKind,
}

impl<CC> std::fmt::Debug for Data<CC> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("inner", &self.inner)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<CC> Builder<CC>
where
    CC: cache::CacheController + Clone,
{
    pub fn build(self) -> Result<Data<CC>, config::Error> {
        self.cache_config.validate_data()?;
        let policy = policy::Policy::new(
            self.cache_config.write_policy,
            self.cache_config.write_allocate_policy,
        )?;
        let inner = super::base::Builder {
            name: self.name,
            stats: self.stats,
            cache_controller: self.cache_controller,
            cache_config: self.cache_config,
            miss_queue_status: self.miss_queue_status,
        }
        .build();
        Ok(Data {
            inner,
            policy,
            write_alloc_type: self.write_alloc_type,
            write_back_type: self.write_back_type,
        })
    }
}

impl<CC> Data<CC> {
    /// Queues a write to the lower memory level.
    fn send_write_request(
        &mut self,
        fetch: mem_fetch::MemFetch,
        event: cache::Event,
        time: u64,
        events: &mut Vec<cache::Event>,
    ) {
        log::debug!("{}::send_write_request({})", self.inner.name, fetch);
        events.push(event);
        self.inner.push_miss_queue(fetch, time);
    }

    /// Queues the write-back of an evicted dirty line.
    fn send_write_back(
        &mut self,
        evicted: tag_array::EvictedBlockInfo,
        fetch: &mem_fetch::MemFetch,
        time: u64,
        events: &mut Vec<cache::Event>,
    ) {
        let writeback = mem_fetch::Builder {
            access: mem_fetch::access::Builder {
                kind: self.write_back_type,
                addr: evicted.block_addr,
                req_size_bytes: evicted.modified_size,
            }
            .build(),
            warp_id: fetch.warp_id,
            core_id: fetch.core_id,
            pc: None,
            is_atomic: false,
        }
        .build();
        let event = cache::Event::WriteBackRequestSent {
            evicted_block: Some(evicted),
        };
        self.send_write_request(writeback, event, time, events);
    }

    fn writes_back_evictions(&self) -> bool {
        self.inner.cache_config.write_policy != cache::config::WritePolicy::WRITE_THROUGH
    }
}

impl<CC> Data<CC>
where
    CC: cache::CacheController,
{
    /// Write-back hit: mark block as modified.
    fn write_hit_write_back(
        &mut self,
        addr: address,
        cache_index: usize,
        fetch: &mem_fetch::MemFetch,
        time: u64,
    ) -> RequestStatus {
        let block_addr = self.inner.cache_controller.block_addr(addr);
        log::debug!(
            "handling WRITE HIT WRITE BACK for {} (block_addr={}, cache_idx={})",
            fetch,
            block_addr,
            cache_index,
        );

        // update LRU state
        let tag_array::AccessStatus { index, .. } = self.inner.tag_array.access(block_addr, time);
        debug_assert_eq!(index, Some(cache_index));
        self.inner.tag_array.set_modified(cache_index);
        RequestStatus::HIT
    }

    /// Write-through hit: send the write, the line stays clean.
    fn write_hit_write_through(
        &mut self,
        addr: address,
        cache_index: usize,
        fetch: &mem_fetch::MemFetch,
        time: u64,
        events: &mut Vec<cache::Event>,
    ) -> RequestStatus {
        if self.inner.miss_queue_full(0) {
            return self
                .inner
                .reservation_fail(fetch, ReservationFailure::MISS_QUEUE_FULL);
        }
        let block_addr = self.inner.cache_controller.block_addr(addr);
        log::debug!(
            "handling WRITE HIT WRITE THROUGH for {} (block_addr={}, cache_idx={})",
            fetch,
            block_addr,
            cache_index,
        );

        // update LRU state
        let _ = self.inner.tag_array.access(block_addr, time);
        self.send_write_request(fetch.clone(), cache::Event::WriteRequestSent, time, events);
        RequestStatus::HIT
    }

    /// Write-evict hit.
    /// Send request to lower level memory and invalidate corresponding block
    fn write_hit_write_evict(
        &mut self,
        cache_index: usize,
        fetch: &mem_fetch::MemFetch,
        time: u64,
        events: &mut Vec<cache::Event>,
    ) -> RequestStatus {
        if self.inner.miss_queue_full(0) {
            return self
                .inner
                .reservation_fail(fetch, ReservationFailure::MISS_QUEUE_FULL);
        }
        log::debug!(
            "handling WRITE HIT WRITE EVICT for {} (cache_idx={})",
            fetch,
            cache_index,
        );

        // generate a write-through/evict
        self.send_write_request(fetch.clone(), cache::Event::WriteRequestSent, time, events);
        self.inner.tag_array.invalidate_line(cache_index);
        RequestStatus::HIT
    }

    fn write_hit(
        &mut self,
        addr: address,
        cache_index: usize,
        fetch: &mem_fetch::MemFetch,
        time: u64,
        events: &mut Vec<cache::Event>,
    ) -> RequestStatus {
        match self.policy.write_hit(fetch.access_kind()) {
            WriteHit::WriteBack => self.write_hit_write_back(addr, cache_index, fetch, time),
            WriteHit::WriteThrough => {
                self.write_hit_write_through(addr, cache_index, fetch, time, events)
            }
            WriteHit::WriteEvict => self.write_hit_write_evict(cache_index, fetch, time, events),
        }
    }

    /// No write-allocate miss: send the write, no line is reserved.
    fn write_miss_no_write_allocate(
        &mut self,
        fetch: &mem_fetch::MemFetch,
        time: u64,
        events: &mut Vec<cache::Event>,
    ) -> RequestStatus {
        if self.inner.miss_queue_full(0) {
            return self
                .inner
                .reservation_fail(fetch, ReservationFailure::MISS_QUEUE_FULL);
        }
        log::debug!("handling WRITE MISS NO WRITE ALLOCATE for {}", fetch);

        // on miss, generate write through
        // (no write buffering -- too many threads for that)
        self.send_write_request(fetch.clone(), cache::Event::WriteRequestSent, time, events);
        RequestStatus::MISS
    }

    /// Write-allocate miss: fetch the line before the write is applied.
    ///
    /// Writes that stay in the cache are merged into the fetched line,
    /// all others are sent right away.
    fn write_miss_write_allocate(
        &mut self,
        addr: address,
        cache_index: usize,
        fetch: &mem_fetch::MemFetch,
        time: u64,
        events: &mut Vec<cache::Event>,
    ) -> RequestStatus {
        // the read, the write and a write-back of the victim
        if self.inner.miss_queue_full(2) {
            return self
                .inner
                .reservation_fail(fetch, ReservationFailure::MISS_QUEUE_FULL);
        }
        let block_addr = self.inner.cache_controller.block_addr(addr);
        log::debug!(
            "handling WRITE MISS WRITE ALLOCATE for {} (block_addr={}, cache_idx={})",
            fetch,
            block_addr,
            cache_index,
        );

        let outcome = match self.inner.send_read_request(
            block_addr,
            cache_index,
            fetch.clone(),
            Some(self.write_alloc_type),
            time,
            events,
        ) {
            Ok(outcome) => outcome,
            Err(reason) => return self.inner.reservation_fail(fetch, reason),
        };

        let retains_write = self.policy.retains_writes(fetch.access_kind())
            && self.inner.cache_config.allocate_policy == cache::config::AllocatePolicy::ON_MISS;
        if retains_write {
            self.inner.tag_array.set_modified_on_fill(cache_index);
        } else {
            self.send_write_request(fetch.clone(), cache::Event::WriteRequestSent, time, events);
        }

        match outcome {
            ReadRequest::Merged => RequestStatus::HIT_RESERVED,
            ReadRequest::Sent { evicted } => {
                if let Some(evicted) = evicted.filter(|_| self.writes_back_evictions()) {
                    self.send_write_back(evicted, fetch, time, events);
                }
                RequestStatus::MISS
            }
        }
    }

    fn write_miss(
        &mut self,
        addr: address,
        cache_index: Option<usize>,
        fetch: &mem_fetch::MemFetch,
        time: u64,
        events: &mut Vec<cache::Event>,
    ) -> RequestStatus {
        match (self.policy.write_miss, cache_index) {
            (WriteMiss::NoWriteAllocate, _) => {
                self.write_miss_no_write_allocate(fetch, time, events)
            }
            (WriteMiss::WriteAllocate, Some(cache_index)) => {
                self.write_miss_write_allocate(addr, cache_index, fetch, time, events)
            }
            (WriteMiss::WriteAllocate, None) => self
                .inner
                .reservation_fail(fetch, ReservationFailure::LINE_ALLOC_FAIL),
        }
    }

    /// Read hit: update LRU state.
    fn read_hit(
        &mut self,
        addr: address,
        cache_index: usize,
        fetch: &mem_fetch::MemFetch,
        time: u64,
    ) -> RequestStatus {
        let block_addr = self.inner.cache_controller.block_addr(addr);
        let _ = self.inner.tag_array.access(block_addr, time);

        // atomics modify the line in place
        if fetch.is_atomic() {
            self.inner.tag_array.set_modified(cache_index);
        }
        RequestStatus::HIT
    }

    /// Read miss: reserve a line and fetch it.
    fn read_miss(
        &mut self,
        addr: address,
        cache_index: usize,
        fetch: &mem_fetch::MemFetch,
        time: u64,
        events: &mut Vec<cache::Event>,
    ) -> RequestStatus {
        // the read and a write-back of the victim
        if self.inner.miss_queue_full(1) {
            return self
                .inner
                .reservation_fail(fetch, ReservationFailure::MISS_QUEUE_FULL);
        }
        let block_addr = self.inner.cache_controller.block_addr(addr);
        match self.inner.send_read_request(
            block_addr,
            cache_index,
            fetch.clone(),
            None,
            time,
            events,
        ) {
            Err(reason) => self.inner.reservation_fail(fetch, reason),
            Ok(ReadRequest::Merged) => RequestStatus::HIT_RESERVED,
            Ok(ReadRequest::Sent { evicted }) => {
                // write back the victim, write-through caches are never dirty
                if let Some(evicted) = evicted.filter(|_| self.writes_back_evictions()) {
                    self.send_write_back(evicted, fetch, time, events);
                }
                RequestStatus::MISS
            }
        }
    }

    /// Dispatches the access to the policy handler for the probe result.
    fn process_tag_probe(
        &mut self,
        addr: address,
        cache_index: Option<usize>,
        probe_status: RequestStatus,
        fetch: &mem_fetch::MemFetch,
        time: u64,
        events: &mut Vec<cache::Event>,
    ) -> RequestStatus {
        match (fetch.is_write(), probe_status, cache_index) {
            (true, RequestStatus::HIT, Some(cache_index)) => {
                self.write_hit(addr, cache_index, fetch, time, events)
            }
            // no-write-allocate writes do not need a line
            (true, RequestStatus::RESERVATION_FAIL, _)
                if self.policy.write_miss == WriteMiss::WriteAllocate =>
            {
                self.inner
                    .reservation_fail(fetch, ReservationFailure::LINE_ALLOC_FAIL)
            }
            (true, _, cache_index) => self.write_miss(addr, cache_index, fetch, time, events),
            (false, RequestStatus::HIT, Some(cache_index)) => {
                self.read_hit(addr, cache_index, fetch, time)
            }
            (false, RequestStatus::HIT_RESERVED | RequestStatus::MISS, Some(cache_index)) => {
                self.read_miss(addr, cache_index, fetch, time, events)
            }
            (false, _, _) => self
                .inner
                .reservation_fail(fetch, ReservationFailure::LINE_ALLOC_FAIL),
        }
    }

    /// Accesses the data cache.
    pub fn access(
        &mut self,
        addr: address,
        fetch: mem_fetch::MemFetch,
        events: &mut Vec<cache::Event>,
        time: u64,
    ) -> RequestStatus {
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

        let access_status =
            self.process_tag_probe(addr, cache_index, probe_status, &fetch, time, events);
        let stat_status = cache::select_status(probe_status, access_status);
        self.inner
            .stats
            .lock()
            .inc(fetch.access_kind(), stat_status, 1);

        log::debug!(
            "{}::access({}) => {:?} events={:?}",
            self.inner.name,
            fetch,
            access_status,
            events
        );
        access_status
    }

    /// Response from the lower memory level.
    ///
    /// A dirty line evicted on fill is written back. Fills cannot be
    /// refused, so the write-back is queued even if the miss queue is at
    /// capacity; `cycle` drains it like any other request.
    pub fn fill(&mut self, fetch: mem_fetch::MemFetch, time: u64) -> Option<cache::Event> {
        let template = fetch.clone();
        let evicted = self.inner.fill(fetch, time)?;
        if !self.writes_back_evictions() {
            return None;
        }
        if self.inner.miss_queue_full(0) {
            log::warn!(
                "{}::fill({}) write-back of {} exceeds miss queue size {}",
                self.inner.name,
                template,
                evicted.block_addr,
                self.inner.cache_config.miss_queue_size,
            );
        }
        let mut events = Vec::with_capacity(1);
        self.send_write_back(evicted, &template, time, &mut events);
        events.pop()
    }

    pub fn set_top_port(&mut self, port: ic::Port<mem_fetch::MemFetch>) {
        self.inner.set_top_port(port);
    }
}

impl<CC> cache::Component for Data<CC> {
    fn cycle(&mut self, cycle: u64) {
        self.inner.cycle(cycle);
    }
}
