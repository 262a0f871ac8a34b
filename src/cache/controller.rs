use crate::address;

/// Cache controller.
///
/// The cache controller intercepts read and write memory requests before passing them
/// on to the memory controller. It processes a request by dividing the address of the
/// request into three fields, the tag field, the set index field, and the data index field.
///
/// First, the controller uses the set index portion of the address to locate the cache
/// line within the cache memory that might hold the requested code or data. This cache
/// line contains the cache-tag and status bits, which the controller uses to determine
/// the actual data stored there.
///
/// The controller then checks the valid bit to determine if the cache line is active,
/// and compares the cache-tag to the tag field of the requested address.
/// If both the status check and comparison succeed, it is a cache hit.
/// If either the status check or comparison fails, it is a cache miss.
///
/// [ARM System Developer's Guide, 2004]
#[allow(clippy::module_name_repetitions)]
pub trait CacheController: Sync + Send + 'static {
    /// Compute cache line tag for an address.
    #[must_use]
    fn tag(&self, addr: address) -> address;

    /// Compute block address for an address.
    #[must_use]
    fn block_addr(&self, addr: address) -> address;

    /// Compute set index for an address.
    #[must_use]
    fn set_index(&self, addr: address) -> u64;

    /// Compute miss status handling register address.
    ///
    /// The default implementation uses the block address.
    #[must_use]
    fn mshr_addr(&self, addr: address) -> address {
        self.block_addr(addr)
    }
}

pub mod unit {
    use crate::{
        address, cache,
        cache::set_index::{self, SetIndexer},
        sync::Arc,
    };

    #[derive(Debug, Clone)]
    pub struct CacheControllerUnit {
        set_index_function: Arc<dyn SetIndexer>,
        config: cache::Config,
    }

    impl CacheControllerUnit {
        #[must_use]
        pub fn new(config: cache::Config) -> Self {
            let set_index_function = set_index::build(
                config.set_index_function,
                config.num_sets,
                config.line_size,
            );
            Self {
                set_index_function,
                config,
            }
        }
    }

    impl super::CacheController for CacheControllerUnit {
        #[inline]
        fn tag(&self, addr: address) -> address {
            // The tag includes both index and tag bits, so set index
            // functions that map different indices to the same set
            // still compare unambiguously.
            self.block_addr(addr)
        }

        #[inline]
        fn block_addr(&self, addr: address) -> address {
            addr & !u64::from(self.config.line_size - 1)
        }

        #[inline]
        fn set_index(&self, addr: address) -> u64 {
            self.set_index_function.compute_set_index(addr)
        }
    }
}

pub use unit::CacheControllerUnit;

#[cfg(test)]
mod tests {
    use super::{CacheController, CacheControllerUnit};
    use crate::{cache, testing};

    #[test]
    fn test_address_decomposition() {
        let config = cache::Config::from(&testing::data_config(4, 2));
        let controller = CacheControllerUnit::new(config);
        let addr = 3 * 128 + 17 + 4 * 128 * 5;
        assert_eq!(controller.block_addr(addr), addr - 17);
        assert_eq!(controller.tag(addr), controller.block_addr(addr));
        assert_eq!(controller.mshr_addr(addr), controller.block_addr(addr));
        assert_eq!(controller.set_index(addr), 3);
    }
}
