use crate::{address, cache::config::SetIndexFunction};

pub trait SetIndexer: std::fmt::Debug + Send + Sync + 'static {
    /// Compute set index of an address.
    #[must_use]
    fn compute_set_index(&self, addr: address) -> u64;
}

/// Builds the set index function selected by the configuration.
#[must_use]
pub fn build(
    function: SetIndexFunction,
    num_sets: usize,
    line_size: u32,
) -> std::sync::Arc<dyn SetIndexer> {
    match function {
        SetIndexFunction::LINEAR => std::sync::Arc::new(linear::SetIndex::new(num_sets, line_size)),
        SetIndexFunction::FERMI_HASH => {
            std::sync::Arc::new(fermi::SetIndex::new(num_sets, line_size))
        }
    }
}

pub mod fermi {
    // Set Indexing function from
    // "A Detailed GPU Cache Model Based on Reuse
    // Distance Theory" Cedric Nugteren et al. HPCA 2014
    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    pub struct SetIndex {
        pub num_sets: usize,
        pub line_size_log2: u32,
    }

    impl SetIndex {
        #[must_use]
        pub fn new(num_sets: usize, line_size: u32) -> Self {
            assert!(
                matches!(num_sets, 32 | 64),
                "bad cache config: num sets should be 32 or 64 for fermi set index function (got {num_sets})",
            );
            Self {
                num_sets,
                line_size_log2: line_size.ilog2(),
            }
        }
    }

    impl super::SetIndexer for SetIndex {
        fn compute_set_index(&self, addr: super::address) -> u64 {
            // lower xor value is bits 7-11
            let lower_xor = (addr >> self.line_size_log2) & 0x1F;

            // upper xor value is bits 13, 14, 15, 17, and 19
            let mut upper_xor = (addr & 0xE000) >> 13; // Bits 13, 14, 15
            upper_xor |= (addr & 0x20000) >> 14; // Bit 17
            upper_xor |= (addr & 0x80000) >> 15; // Bit 19

            let mut set_idx = lower_xor ^ upper_xor;

            // 48KB cache prepends the set_index with bit 12
            if self.num_sets == 64 {
                set_idx |= (addr & 0x1000) >> 7;
            }
            debug_assert!(set_idx < self.num_sets as u64, "set index out of bounds");
            set_idx
        }
    }
}

pub mod linear {
    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    pub struct SetIndex {
        pub num_sets: usize,
        pub line_size_log2: u32,
    }

    impl SetIndex {
        #[must_use]
        pub fn new(num_sets: usize, line_size: u32) -> Self {
            Self {
                num_sets,
                line_size_log2: line_size.ilog2(),
            }
        }
    }

    impl super::SetIndexer for SetIndex {
        #[inline]
        fn compute_set_index(&self, addr: super::address) -> u64 {
            (addr >> self.line_size_log2) & (self.num_sets as u64 - 1)
        }
    }
}
