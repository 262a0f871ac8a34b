use crate::sync::{Arc, Mutex};
use crate::{address, cache, config, interconn as ic, mem_fetch, tag_array};

/// Second level data cache.
///
/// Same protocol as the L1, but write-allocate fetches and write-backs are
/// issued as L2 accesses and queued misses are tagged as partition traffic.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct DataL2<CC = cache::CacheControllerUnit> {
    pub inner: cache::data::Data<CC>,
    pub cache_config: Arc<config::Cache>,
}

impl DataL2 {
    pub fn new(
        name: String,
        cache_config: Arc<config::Cache>,
        stats: Arc<Mutex<stats::Cache>>,
    ) -> Result<Self, config::Error> {
        cache_config.validate_data()?;
        let cache_controller =
            cache::CacheControllerUnit::new(cache::Config::from(&*cache_config));
        Self::with_controller(name, cache_config, stats, cache_controller)
    }
}

impl<CC> DataL2<CC>
where
    CC: cache::CacheController + Clone,
{
    pub fn with_controller(
        name: String,
        cache_config: Arc<config::Cache>,
        stats: Arc<Mutex<stats::Cache>>,
        cache_controller: CC,
    ) -> Result<Self, config::Error> {
        let inner = cache::data::Builder {
            name,
            stats,
            cache_controller,
            cache_config: Arc::clone(&cache_config),
            miss_queue_status: mem_fetch::Status::IN_PARTITION_L2_MISS_QUEUE,
            write_alloc_type: mem_fetch::access::Kind::L2_WR_ALLOC_R,
            write_back_type: mem_fetch::access::Kind::L2_WRBK_ACC,
        }
        .build()?;
        Ok(Self {
            inner,
            cache_config,
        })
    }
}

impl<CC> cache::Component for DataL2<CC> {
    fn cycle(&mut self, cycle: u64) {
        self.inner.cycle(cycle);
    }
}

impl<CC> cache::Cache for DataL2<CC>
where
    CC: cache::CacheController,
{
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn stats(&self) -> &Arc<Mutex<stats::Cache>> {
        &self.inner.inner.stats
    }

    fn access(
        &mut self,
        addr: address,
        fetch: mem_fetch::MemFetch,
        events: &mut Vec<cache::Event>,
        time: u64,
    ) -> cache::RequestStatus {
        self.inner.access(addr, fetch, events, time)
    }

    fn has_ready_accesses(&self) -> bool {
        self.inner.inner.has_ready_accesses()
    }

    fn next_access(&mut self) -> Option<mem_fetch::MemFetch> {
        self.inner.inner.next_access()
    }

    fn fill(&mut self, fetch: mem_fetch::MemFetch, time: u64) {
        if let Some(event) = self.inner.fill(fetch, time) {
            log::debug!("{}::fill => {:?}", self.inner.inner.name, event);
        }
    }

    fn flush(&mut self) -> usize {
        self.inner.inner.flush()
    }

    fn invalidate(&mut self) {
        self.inner.inner.invalidate();
    }

    fn waiting_for_fill(&self, fetch: &mem_fetch::MemFetch) -> bool {
        self.inner.inner.waiting_for_fill(fetch)
    }

    fn write_allocate_policy(&self) -> cache::config::WriteAllocatePolicy {
        self.cache_config.write_allocate_policy
    }

    fn set_top_port(&mut self, port: ic::Port<mem_fetch::MemFetch>) {
        self.inner.set_top_port(port);
    }

    fn tag_array_stats(&self) -> tag_array::Stats {
        self.inner.inner.tag_array.stats()
    }

    fn new_window(&mut self) {
        self.inner.inner.tag_array.new_window();
    }

    fn windowed_miss_rate(&self) -> f32 {
        self.inner.inner.tag_array.windowed_miss_rate()
    }
}
