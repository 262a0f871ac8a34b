use crate::sync::{Arc, Mutex};
use crate::{
    address, cache, config, interconn as ic, mem_fetch,
    mshr::{self, MSHR},
    tag_array,
};
use console::style;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PendingRequest {
    block_addr: address,
    addr: address,
    cache_index: usize,
    data_size: u32,
}

/// Outcome of an accepted read request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReadRequest {
    /// Merged into an outstanding miss, no new fetch was sent.
    Merged,
    /// A new fetch was queued, possibly evicting a dirty line.
    Sent {
        evicted: Option<tag_array::EvictedBlockInfo>,
    },
}

/// Base cache
///
/// Implements the protocol shared by the read-only and data caches:
/// misses are tracked in the MSHR table and sent through a bounded miss queue.
/// Each cache implements its own `access` function.
pub struct Base<CC = cache::CacheControllerUnit> {
    pub name: String,
    pub stats: Arc<Mutex<stats::Cache>>,
    pub cache_controller: CC,
    pub cache_config: cache::Config,

    pub miss_queue: VecDeque<mem_fetch::MemFetch>,
    pub miss_queue_status: mem_fetch::Status,
    pub mshrs: mshr::Table<mem_fetch::MemFetch>,
    pub tag_array: tag_array::TagArray<CC>,
    pending: HashMap<address, PendingRequest>,
    top_port: Option<ic::Port<mem_fetch::MemFetch>>,
}

impl<CC> std::fmt::Debug for Base<CC> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Base")
            .field("name", &self.name)
            .field("miss_queue", &self.miss_queue.len())
            .field("mshrs", &self.mshrs.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct Builder<CC> {
    pub name: String,
    pub stats: Arc<Mutex<stats::Cache>>,
    pub cache_controller: CC,
    pub cache_config: Arc<config::Cache>,
    pub miss_queue_status: mem_fetch::Status,
}

impl<CC> Builder<CC>
where
    CC: cache::CacheController + Clone,
{
    #[must_use]
    pub fn build(self) -> Base<CC> {
        let cache_config = cache::Config::from(&*self.cache_config);
        let tag_array = tag_array::TagArray::with_controller(
            cache_config.clone(),
            self.cache_controller.clone(),
        );

        debug_assert_eq!(self.cache_config.mshr_kind, mshr::Kind::ASSOC);
        let mshrs = mshr::Table::new(
            self.cache_config.mshr_entries,
            self.cache_config.mshr_max_merge,
        );

        let miss_queue = VecDeque::with_capacity(self.cache_config.miss_queue_size);

        Base {
            name: self.name,
            tag_array,
            mshrs,
            top_port: None,
            stats: self.stats,
            cache_config,
            cache_controller: self.cache_controller,
            pending: HashMap::new(),
            miss_queue,
            miss_queue_status: self.miss_queue_status,
        }
    }
}

impl<CC> Base<CC>
where
    CC: cache::CacheController,
{
    /// Read miss handler.
    ///
    /// Merges into an outstanding miss or allocates a new MSHR entry and
    /// queues a line-sized fetch. With `write_allocate`, the fetch is a new
    /// read of that kind and the original write waits in the MSHR.
    ///
    /// Callers must have checked the miss queue.
    pub fn send_read_request(
        &mut self,
        block_addr: address,
        cache_index: usize,
        fetch: mem_fetch::MemFetch,
        write_allocate: Option<mem_fetch::access::Kind>,
        time: u64,
        events: &mut Vec<cache::Event>,
    ) -> Result<ReadRequest, cache::ReservationFailure> {
        let mshr_addr = self.cache_controller.mshr_addr(fetch.addr());
        let mshr_entry = self.mshrs.get(mshr_addr);
        let mshr_hit = mshr_entry.is_some();
        let mshr_ready = mshr_entry.is_some_and(mshr::Entry::is_ready);
        let mshr_full = self.mshrs.full(mshr_addr);

        log::debug!(
            "{}::send_read_request({}, uid={}) (mshr_hit={}, mshr_full={}, miss_queue={}, block={}, mshr_addr={})",
            self.name,
            fetch,
            fetch.uid,
            mshr_hit,
            mshr_full,
            self.miss_queue.len(),
            block_addr,
            mshr_addr,
        );

        if mshr_ready {
            return Err(cache::ReservationFailure::MSHR_RW_PENDING);
        }
        if mshr_full {
            return Err(if mshr_hit {
                cache::ReservationFailure::MSHR_MERGE_ENTRY_FAIL
            } else {
                cache::ReservationFailure::MSHR_ENTRY_FAIL
            });
        }

        if mshr_hit {
            // add to mshr (hit_reserved + miss)
            let _ = self.tag_array.access(block_addr, time);
            self.stats
                .lock()
                .inc(fetch.access_kind(), cache::RequestStatus::MSHR_HIT, 1);
            self.mshrs.add(mshr_addr, fetch);
            return Ok(ReadRequest::Merged);
        }

        debug_assert!(self.miss_queue.len() < self.cache_config.miss_queue_size);
        let tag_array::AccessStatus { index, evicted, .. } =
            self.tag_array.access(block_addr, time);
        debug_assert_eq!(index, Some(cache_index));

        self.pending.insert(
            mshr_addr,
            PendingRequest {
                block_addr: mshr_addr,
                addr: fetch.addr(),
                cache_index,
                data_size: fetch.data_size(),
            },
        );

        // replace address with mshr block address
        let (mut outbound, event) = match write_allocate {
            Some(kind) => {
                let fetch = mem_fetch::Builder {
                    access: mem_fetch::access::Builder {
                        kind,
                        addr: mshr_addr,
                        req_size_bytes: self.cache_config.atom_size,
                    }
                    .build(),
                    warp_id: fetch.warp_id,
                    core_id: fetch.core_id,
                    pc: fetch.pc,
                    is_atomic: false,
                }
                .build();
                (fetch, cache::Event::WriteAllocateSent)
            }
            None => {
                let mut fetch = fetch.clone();
                fetch.access.req_size_bytes = self.cache_config.atom_size;
                fetch.access.addr = mshr_addr;
                (fetch, cache::Event::ReadRequestSent)
            }
        };
        outbound.set_status(self.miss_queue_status, time);

        log::trace!(
            "{}::send_read_request({}) adding {} to miss queue",
            self.name,
            fetch,
            outbound
        );
        self.mshrs.add(mshr_addr, fetch);
        self.miss_queue.push_back(outbound);
        events.push(event);

        Ok(ReadRequest::Sent { evicted })
    }

    /// Interface for response from lower memory level.
    ///
    /// Completes the line fill and makes the merged requests ready.
    ///
    /// # Returns
    /// The dirty line evicted when allocating on fill.
    ///
    /// # Panics
    /// If there is no pending request for the fetch.
    pub fn fill(
        &mut self,
        fetch: mem_fetch::MemFetch,
        time: u64,
    ) -> Option<tag_array::EvictedBlockInfo> {
        let mshr_addr = self.cache_controller.mshr_addr(fetch.addr());
        let Some(pending) = self.pending.remove(&mshr_addr) else {
            panic!(
                "{}: fill for {} (uid={}) without pending request for block {}",
                self.name, fetch, fetch.uid, mshr_addr
            );
        };
        log::debug!(
            "{}::fill({}, block={}, original addr={}, size={})",
            self.name,
            fetch,
            pending.block_addr,
            pending.addr,
            pending.data_size,
        );

        let (cache_index, evicted) = match self.cache_config.allocate_policy {
            cache::config::AllocatePolicy::ON_MISS => {
                self.tag_array.fill_on_miss(pending.cache_index, time);
                (pending.cache_index, None)
            }
            cache::config::AllocatePolicy::ON_FILL => {
                self.tag_array.fill_on_fill(pending.block_addr, time)
            }
        };

        let flags = self.mshrs.mark_ready(pending.block_addr).unwrap_or_default();
        if flags.has_atomic
            && self.cache_config.allocate_policy == cache::config::AllocatePolicy::ON_MISS
        {
            // mark line as dirty for atomic operation
            self.tag_array.set_modified(cache_index);
        }
        evicted
    }
}

impl<CC> cache::Component for Base<CC> {
    /// Sends next request to lower level memory.
    fn cycle(&mut self, cycle: u64) {
        let Some(ref port) = self.top_port else {
            return;
        };

        log::debug!(
            "{}::cycle({}) miss queue={:?}",
            self.name,
            cycle,
            style(
                self.miss_queue
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
            )
            .blue(),
        );

        // process miss queue
        let Some(fetch) = self.miss_queue.front() else {
            return;
        };
        let mut port = port.lock();
        if !port.can_send(&[fetch.packet_size()]) {
            log::trace!("{}::cycle({}) memory port busy", self.name, cycle);
            return;
        }
        if let Some(mut fetch) = self.miss_queue.pop_front() {
            log::debug!(
                "{}::memport::push({}, data size={}, control size={})",
                self.name,
                fetch.addr(),
                fetch.data_size(),
                fetch.control_size(),
            );
            fetch.set_status(mem_fetch::Status::IN_ICNT_TO_MEM, cycle);
            port.send(ic::Packet {
                data: fetch,
                time: cycle,
            });
        }
    }
}

impl<CC> Base<CC> {
    /// Checks whether the miss queue cannot take `n` more requests
    /// in addition to the one being handled.
    #[must_use]
    pub fn miss_queue_full(&self, n: usize) -> bool {
        self.miss_queue.len() + n >= self.cache_config.miss_queue_size
    }

    /// Queues a request for the lower memory level.
    pub fn push_miss_queue(&mut self, mut fetch: mem_fetch::MemFetch, time: u64) {
        fetch.set_status(self.miss_queue_status, time);
        log::trace!("{}::push_miss_queue({})", self.name, fetch);
        self.miss_queue.push_back(fetch);
    }

    /// Records a rejected access.
    pub fn reservation_fail(
        &self,
        fetch: &mem_fetch::MemFetch,
        reason: cache::ReservationFailure,
    ) -> cache::RequestStatus {
        log::debug!("{}::access({}) => {:?}", self.name, fetch, reason);
        self.stats.lock().inc(fetch.access_kind(), reason, 1);
        cache::RequestStatus::RESERVATION_FAIL
    }

    /// Are any (accepted) accesses that had to wait for memory now ready?
    ///
    /// Note: does not include accesses that "HIT"
    #[must_use]
    pub fn has_ready_accesses(&self) -> bool {
        self.mshrs.has_ready_accesses()
    }

    #[must_use]
    pub fn ready_accesses(&self) -> Option<&VecDeque<mem_fetch::MemFetch>> {
        self.mshrs.ready_accesses()
    }

    /// Pop next ready access
    ///
    /// Note: does not include accesses that "HIT"
    pub fn next_access(&mut self) -> Option<mem_fetch::MemFetch> {
        self.mshrs.pop_next_ready_access()
    }

    pub fn set_top_port(&mut self, port: ic::Port<mem_fetch::MemFetch>) {
        self.top_port = Some(port);
    }
}

impl<CC> Base<CC>
where
    CC: cache::CacheController,
{
    /// Flush all entries in cache
    ///
    /// Outstanding misses are not affected.
    pub fn flush(&mut self) -> usize {
        self.tag_array.flush()
    }

    /// Invalidate all entries in cache
    pub fn invalidate(&mut self) {
        self.tag_array.invalidate();
    }

    /// Checks if fetch is waiting to be filled by lower memory level
    #[must_use]
    pub fn waiting_for_fill(&self, fetch: &mem_fetch::MemFetch) -> bool {
        let mshr_addr = self.cache_controller.mshr_addr(fetch.addr());
        self.pending.contains_key(&mshr_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::{Builder, ReadRequest};
    use crate::cache::{self, Component, Event, RequestStatus, ReservationFailure};
    use crate::mem_fetch::{self, access::Kind as AccessKind};
    use crate::mshr::MSHR;
    use crate::sync::{Arc, Mutex};
    use crate::testing;
    use color_eyre::eyre;

    fn base(config: crate::config::Cache) -> super::Base {
        let config = Arc::new(config);
        Builder {
            name: "base".to_string(),
            stats: Arc::new(Mutex::new(stats::Cache::default())),
            cache_controller: cache::CacheControllerUnit::new(cache::Config::from(&*config)),
            cache_config: config,
            miss_queue_status: mem_fetch::Status::IN_L1D_MISS_QUEUE,
        }
        .build()
    }

    #[test]
    fn test_send_read_request_and_fill() -> eyre::Result<()> {
        testing::init_logging();
        let mut base = base(testing::read_only_config(1, 2));
        let (queue, port) = testing::port(4);
        base.set_top_port(port);

        let fetch = testing::fetch(AccessKind::GLOBAL_ACC_R, 132);
        let (index, status) = base.tag_array.probe(128);
        assert_eq!(status, RequestStatus::MISS);

        let mut events = Vec::new();
        let outcome = base
            .send_read_request(128, index.unwrap(), fetch.clone(), None, 0, &mut events)
            .map_err(|reason| eyre::eyre!("{reason:?}"))?;
        assert_eq!(outcome, ReadRequest::Sent { evicted: None });
        assert_eq!(events, vec![Event::ReadRequestSent]);
        assert!(base.waiting_for_fill(&fetch));

        base.cycle(1);
        let packet = queue.lock().pop().unwrap();
        assert_eq!(packet.time, 1);
        assert_eq!(packet.data.addr(), 128);
        assert_eq!(packet.data.data_size(), 128);
        assert_eq!(packet.data.uid, fetch.uid);
        assert_eq!(packet.data.status, mem_fetch::Status::IN_ICNT_TO_MEM);

        assert!(!base.has_ready_accesses());
        assert_eq!(base.fill(packet.data, 5), None);
        assert!(!base.waiting_for_fill(&fetch));
        assert!(base.tag_array.get_block(index.unwrap()).is_valid());
        assert_eq!(base.ready_accesses().map(|ready| ready.len()), Some(1));
        let ready = base.next_access().unwrap();
        assert_eq!(ready.addr(), 132);
        assert_eq!(ready.data_size(), 4);
        assert!(!base.has_ready_accesses());
        Ok(())
    }

    #[test]
    fn test_write_allocate_sends_new_read() -> eyre::Result<()> {
        let mut base = base(testing::data_config(1, 2));
        let write = testing::fetch(AccessKind::GLOBAL_ACC_W, 0);
        let mut events = Vec::new();
        base.send_read_request(
            0,
            0,
            write.clone(),
            Some(AccessKind::L1_WR_ALLOC_R),
            0,
            &mut events,
        )
        .map_err(|reason| eyre::eyre!("{reason:?}"))?;
        assert_eq!(events, vec![Event::WriteAllocateSent]);
        let queued = base.miss_queue.front().unwrap();
        assert_ne!(queued.uid, write.uid);
        assert_eq!(queued.access_kind(), AccessKind::L1_WR_ALLOC_R);
        assert!(!queued.is_write());
        assert_eq!(queued.status, mem_fetch::Status::IN_L1D_MISS_QUEUE);
        assert!(base.mshrs.get(0).unwrap().requests().any(|f| *f == write));
        Ok(())
    }

    #[test]
    fn test_merging_is_limited() {
        let mut config = testing::read_only_config(1, 2);
        config.mshr_max_merge = 2;
        config.mshr_entries = 1;
        let mut base = base(config);
        let mut events = Vec::new();

        let mut send = |base: &mut super::Base, addr| {
            base.send_read_request(
                addr & !127,
                0,
                testing::fetch(AccessKind::GLOBAL_ACC_R, addr),
                None,
                0,
                &mut events,
            )
        };
        assert!(matches!(send(&mut base, 0), Ok(ReadRequest::Sent { .. })));
        assert_eq!(send(&mut base, 4), Ok(ReadRequest::Merged));
        assert_eq!(
            send(&mut base, 8),
            Err(ReservationFailure::MSHR_MERGE_ENTRY_FAIL)
        );
        assert_eq!(
            send(&mut base, 128),
            Err(ReservationFailure::MSHR_ENTRY_FAIL)
        );
        assert_eq!(base.miss_queue.len(), 1);
        assert_eq!(
            base.stats
                .lock()
                .count(RequestStatus::MSHR_HIT),
            1
        );
    }

    #[test]
    #[should_panic(expected = "without pending request")]
    fn test_fill_without_pending_request_panics() {
        let mut base = base(testing::read_only_config(1, 2));
        let _ = base.fill(testing::fetch(AccessKind::GLOBAL_ACC_R, 0), 0);
    }
}
