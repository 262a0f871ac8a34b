use crate::sync::{Arc, Mutex};
use crate::{address, cache, config, interconn as ic, mem_fetch, tag_array};

/// First level data cache.
///
/// Write-allocate fetches and write-backs are issued as L1 accesses.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct DataL1<CC = cache::CacheControllerUnit> {
    pub inner: cache::data::Data<CC>,
    pub cache_config: Arc<config::Cache>,
}

impl DataL1 {
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

impl<CC> DataL1<CC>
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
            miss_queue_status: mem_fetch::Status::IN_L1D_MISS_QUEUE,
            write_alloc_type: mem_fetch::access::Kind::L1_WR_ALLOC_R,
            write_back_type: mem_fetch::access::Kind::L1_WRBK_ACC,
        }
        .build()?;
        Ok(Self {
            inner,
            cache_config,
        })
    }
}

impl<CC> cache::Component for DataL1<CC> {
    fn cycle(&mut self, cycle: u64) {
        self.inner.cycle(cycle);
    }
}

impl<CC> cache::Cache for DataL1<CC>
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

#[cfg(test)]
mod tests {
    use super::DataL1;
    use crate::cache::{config::WritePolicy, Cache};
    use crate::config;
    use crate::sync::{Arc, Mutex};
    use crate::testing;

    #[test]
    fn test_rejects_write_back_on_fill() {
        let mut cache_config = testing::data_config(4, 4);
        cache_config.write_policy = WritePolicy::WRITE_BACK;
        cache_config.allocate_policy = crate::cache::config::AllocatePolicy::ON_FILL;
        let stats = Arc::new(Mutex::new(stats::Cache::default()));
        let err = DataL1::new("l1d".to_string(), Arc::new(cache_config), stats).unwrap_err();
        assert!(matches!(err, config::Error::WriteBackOnFill(_)));
    }

    #[test]
    fn test_write_allocate_policy() -> color_eyre::eyre::Result<()> {
        let cache_config = testing::data_config(4, 4);
        let want = cache_config.write_allocate_policy;
        let cache = testing::l1(cache_config)?;
        assert_eq!(cache.write_allocate_policy(), want);
        assert!(cache.as_any().downcast_ref::<DataL1>().is_some());
        Ok(())
    }
}
