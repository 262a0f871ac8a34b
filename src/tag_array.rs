use crate::{
    address,
    cache::{self, block, controller::CacheController, CacheControllerUnit, RequestStatus},
};

/// A dirty line that was evicted and must be written back.
#[derive(Debug, Clone, Default, Hash, PartialEq, Eq)]
pub struct EvictedBlockInfo {
    pub block_addr: address,
    pub modified_size: u32,
}

#[derive(Debug, PartialEq, Eq, Hash)]
pub struct AccessStatus {
    pub index: Option<usize>,
    pub writeback: bool,
    pub evicted: Option<EvictedBlockInfo>,
    pub status: RequestStatus,
}

/// Snapshot of the tag array counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Stats {
    pub num_accesses: usize,
    pub num_misses: usize,
    pub num_pending_hits: usize,
    pub num_reservation_fails: usize,
    pub num_dirty: usize,
    pub num_used_lines: usize,
}

/// Tag array.
///
/// Lines are laid out set by set, `num_sets x associativity` in total.
#[derive(Debug)]
pub struct TagArray<CC = CacheControllerUnit> {
    lines: Vec<block::Line>,
    num_access: usize,
    num_miss: usize,
    num_pending_hit: usize,
    num_reservation_fail: usize,
    num_dirty: usize,

    prev_snapshot_access: usize,
    prev_snapshot_miss: usize,

    cache_controller: CC,
    cache_config: cache::Config,
}

impl TagArray<CacheControllerUnit> {
    #[must_use]
    pub fn new(cache_config: cache::Config) -> Self {
        let cache_controller = CacheControllerUnit::new(cache_config.clone());
        Self::with_controller(cache_config, cache_controller)
    }
}

impl<CC> TagArray<CC>
where
    CC: CacheController,
{
    #[must_use]
    pub fn with_controller(cache_config: cache::Config, cache_controller: CC) -> Self {
        let lines = (0..cache_config.total_lines)
            .map(|_| block::Line::new(cache_config.line_size))
            .collect();
        Self {
            lines,
            num_access: 0,
            num_miss: 0,
            num_pending_hit: 0,
            num_reservation_fail: 0,
            num_dirty: 0,
            prev_snapshot_access: 0,
            prev_snapshot_miss: 0,
            cache_controller,
            cache_config,
        }
    }

    /// Accesses the tag array.
    ///
    /// Updates the counters and the recency of hit lines.
    /// Under `ON_MISS` allocation, a miss reserves the victim line right away.
    pub fn access(&mut self, addr: address, time: u64) -> AccessStatus {
        self.num_access += 1;

        let mut writeback = false;
        let mut evicted = None;

        let (index, status) = self.probe(addr);
        log::trace!(
            "tag_array::access(addr={}, time={}) => {:?} (index={:?})",
            addr,
            time,
            status,
            index
        );
        match (index, status) {
            (Some(index), RequestStatus::HIT | RequestStatus::HIT_RESERVED) => {
                if status == RequestStatus::HIT_RESERVED {
                    self.num_pending_hit += 1;
                }
                self.lines[index].set_last_access_time(time);
            }
            (Some(index), RequestStatus::MISS) => {
                self.num_miss += 1;
                if self.cache_config.allocate_policy == cache::config::AllocatePolicy::ON_MISS {
                    evicted = self.allocate(index, addr, time);
                    writeback = evicted.is_some();
                }
            }
            (None, RequestStatus::RESERVATION_FAIL) => {
                self.num_miss += 1;
                self.num_reservation_fail += 1;
            }
            (index, status) => {
                unreachable!("tag array probe returned {status:?} with index {index:?}")
            }
        }
        AccessStatus {
            index,
            writeback,
            evicted,
            status,
        }
    }

    /// Probes the tag array without changing any state.
    ///
    /// # Returns
    /// A tuple with the cache index `Option<usize>` and cache request status.
    /// The index is the matching line on a hit or the victim on a miss,
    /// and `None` when every way of the set is reserved.
    #[must_use]
    pub fn probe(&self, block_addr: address) -> (Option<usize>, RequestStatus) {
        let set_index = self.cache_controller.set_index(block_addr) as usize;
        let tag = self.cache_controller.tag(block_addr);
        let associativity = self.cache_config.associativity;

        let mut invalid_line = None;
        let mut valid_line = None;
        let mut valid_time = u64::MAX;
        let mut all_reserved = true;

        for way in 0..associativity {
            let idx = set_index * associativity + way;
            let line = &self.lines[idx];
            if line.tag == tag {
                match line.status {
                    block::Status::RESERVED => {
                        return (Some(idx), RequestStatus::HIT_RESERVED);
                    }
                    block::Status::VALID | block::Status::MODIFIED => {
                        return (Some(idx), RequestStatus::HIT);
                    }
                    block::Status::INVALID => {}
                }
            }
            if line.is_reserved() {
                continue;
            }
            all_reserved = false;
            if line.is_invalid() {
                invalid_line.get_or_insert(idx);
                continue;
            }
            let time = match self.cache_config.replacement_policy {
                cache::config::ReplacementPolicy::LRU => line.last_access_time(),
                cache::config::ReplacementPolicy::FIFO => line.alloc_time(),
            };
            if time < valid_time {
                valid_time = time;
                valid_line = Some(idx);
            }
        }

        if all_reserved {
            // miss and not enough space in cache to allocate on miss
            return (None, RequestStatus::RESERVATION_FAIL);
        }

        match invalid_line.or(valid_line) {
            Some(idx) => (Some(idx), RequestStatus::MISS),
            None => unreachable!("unreserved way is neither invalid nor valid"),
        }
    }

    fn allocate(&mut self, index: usize, addr: address, time: u64) -> Option<EvictedBlockInfo> {
        let tag = self.cache_controller.tag(addr);
        let block_addr = self.cache_controller.block_addr(addr);
        let line = &mut self.lines[index];
        let evicted = if line.is_modified() {
            self.num_dirty -= 1;
            Some(EvictedBlockInfo {
                block_addr: line.block_addr,
                modified_size: line.modified_size(),
            })
        } else {
            None
        };
        log::trace!(
            "tag_array::allocate(index={}, tag={}, evicted={:?}, time={})",
            index,
            tag,
            evicted,
            time,
        );
        line.allocate(tag, block_addr, time);
        evicted
    }

    /// Completes the fill of a line reserved on miss.
    ///
    /// # Panics
    /// If the line is not reserved.
    pub fn fill_on_miss(&mut self, index: usize, time: u64) {
        let line = &mut self.lines[index];
        assert!(
            line.is_reserved(),
            "fill on miss for line {index} in status {:?} (expected RESERVED)",
            line.status
        );
        log::trace!(
            "tag_array::fill(index={}, block={}, time={}) (on miss)",
            index,
            line.block_addr,
            time
        );
        line.fill(time);
        if line.is_modified() {
            self.num_dirty += 1;
        }
    }

    /// Allocates and fills a line for `addr` in one step.
    ///
    /// # Returns
    /// The filled line index and the evicted dirty line, if any.
    ///
    /// # Panics
    /// If every way of the set is reserved, which cannot happen when
    /// lines are allocated on fill.
    pub fn fill_on_fill(&mut self, addr: address, time: u64) -> (usize, Option<EvictedBlockInfo>) {
        let (index, status) = self.probe(addr);
        log::trace!(
            "tag_array::fill(addr={}, time={}) (on fill) status={:?}",
            addr,
            time,
            status
        );
        let Some(index) = index else {
            panic!("fill on fill for {addr}: all ways are reserved");
        };
        let evicted = match status {
            RequestStatus::MISS => self.allocate(index, addr, time),
            _ => {
                // already present, the fill only refreshes the line
                if self.lines[index].is_modified() {
                    self.num_dirty -= 1;
                }
                None
            }
        };
        let line = &mut self.lines[index];
        line.fill(time);
        if line.is_modified() {
            self.num_dirty += 1;
        }
        (index, evicted)
    }

    /// Marks a present line as modified.
    pub fn set_modified(&mut self, index: usize) {
        let line = &mut self.lines[index];
        if !line.is_modified() {
            self.num_dirty += 1;
        }
        line.set_status(block::Status::MODIFIED);
    }

    /// Makes the pending fill of a reserved line leave it modified.
    pub fn set_modified_on_fill(&mut self, index: usize) {
        self.lines[index].set_modified_on_fill(true);
    }

    /// Invalidates a single line without writing it back.
    pub fn invalidate_line(&mut self, index: usize) {
        let line = &mut self.lines[index];
        if line.is_modified() {
            self.num_dirty -= 1;
        }
        line.invalidate();
    }

    /// Invalidates all modified lines.
    ///
    /// No write-backs are generated.
    ///
    /// # Returns
    /// The number of dirty lines dropped.
    pub fn flush(&mut self) -> usize {
        let mut flushed = 0;
        for line in &mut self.lines {
            if line.is_modified() {
                flushed += 1;
            }
            line.invalidate();
        }
        log::debug!("tag_array::flush() dropped {} dirty lines", flushed);
        self.num_dirty = 0;
        flushed
    }

    /// Invalidates all tags stored in this array.
    ///
    /// This effectively resets the tag array.
    pub fn invalidate(&mut self) {
        for line in &mut self.lines {
            line.invalidate();
        }
        self.num_dirty = 0;
    }

    /// Starts a new statistics window.
    pub fn new_window(&mut self) {
        self.prev_snapshot_access = self.num_access;
        self.prev_snapshot_miss = self.num_miss;
    }

    /// Miss rate since the last call to `new_window`.
    #[must_use]
    pub fn windowed_miss_rate(&self) -> f32 {
        let accesses = self.num_access - self.prev_snapshot_access;
        let misses = self.num_miss - self.prev_snapshot_miss;
        if accesses == 0 {
            0.0
        } else {
            misses as f32 / accesses as f32
        }
    }

    #[must_use]
    pub fn num_used_lines(&self) -> usize {
        self.lines.iter().filter(|line| !line.is_invalid()).count()
    }

    #[inline]
    #[must_use]
    pub fn num_dirty(&self) -> usize {
        self.num_dirty
    }

    #[inline]
    #[must_use]
    pub fn num_accesses(&self) -> usize {
        self.num_access
    }

    #[inline]
    #[must_use]
    pub fn num_misses(&self) -> usize {
        self.num_miss
    }

    #[inline]
    #[must_use]
    pub fn num_pending_hits(&self) -> usize {
        self.num_pending_hit
    }

    #[inline]
    #[must_use]
    pub fn num_reservation_fails(&self) -> usize {
        self.num_reservation_fail
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        Stats {
            num_accesses: self.num_access,
            num_misses: self.num_miss,
            num_pending_hits: self.num_pending_hit,
            num_reservation_fails: self.num_reservation_fail,
            num_dirty: self.num_dirty,
            num_used_lines: self.num_used_lines(),
        }
    }

    /// The maximum number of tags this array can hold.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.lines.len()
    }

    #[inline]
    #[must_use]
    pub fn get_block(&self, idx: usize) -> &block::Line {
        &self.lines[idx]
    }

    #[inline]
    #[must_use]
    pub fn cache_controller(&self) -> &CC {
        &self.cache_controller
    }
}

#[cfg(test)]
mod tests {
    use super::{EvictedBlockInfo, Stats, TagArray};
    use crate::cache::{
        self, block,
        config::{AllocatePolicy, ReplacementPolicy},
        RequestStatus,
    };
    use crate::testing;
    use pretty_assertions_sorted as diff;

    const LINE: u64 = 128;

    fn tag_array(num_sets: usize, associativity: usize) -> TagArray {
        let config = testing::data_config(num_sets, associativity);
        TagArray::new(cache::Config::from(&config))
    }

    /// Allocates and fills the line for `addr`.
    fn bring_in(tags: &mut TagArray, addr: u64, time: u64) -> usize {
        let status = tags.access(addr, time);
        assert_eq!(status.status, RequestStatus::MISS);
        let index = status.index.unwrap();
        tags.fill_on_miss(index, time);
        index
    }

    #[test]
    fn test_lru_evicts_least_recently_used() {
        testing::init_logging();
        let mut tags = tag_array(1, 4);
        for (i, addr) in [0, LINE, 2 * LINE, 3 * LINE].into_iter().enumerate() {
            bring_in(&mut tags, addr, i as u64);
        }
        // touch A so that B becomes the oldest
        assert_eq!(tags.access(0, 10).status, RequestStatus::HIT);

        let (index, status) = tags.probe(4 * LINE);
        assert_eq!(status, RequestStatus::MISS);
        assert_eq!(tags.get_block(index.unwrap()).block_addr, LINE);
    }

    #[test]
    fn test_fifo_evicts_oldest_allocation() {
        let mut config = testing::data_config(1, 4);
        config.replacement_policy = ReplacementPolicy::FIFO;
        let mut tags = TagArray::new(cache::Config::from(&config));
        for (i, addr) in [0, LINE, 2 * LINE, 3 * LINE].into_iter().enumerate() {
            bring_in(&mut tags, addr, i as u64);
        }
        // recency does not matter for FIFO
        assert_eq!(tags.access(0, 10).status, RequestStatus::HIT);

        let (index, status) = tags.probe(4 * LINE);
        assert_eq!(status, RequestStatus::MISS);
        assert_eq!(tags.get_block(index.unwrap()).block_addr, 0);
    }

    #[test]
    fn test_lookup_has_no_side_effects() {
        let mut tags = tag_array(2, 2);
        bring_in(&mut tags, 0, 0);
        let before = tags.stats();
        let first = tags.probe(0);
        let second = tags.probe(0);
        assert_eq!(first, second);
        assert_eq!(first.1, RequestStatus::HIT);
        assert_eq!(tags.probe(4 * LINE).1, RequestStatus::MISS);
        diff::assert_eq!(tags.stats(), before);
        assert_eq!(tags.get_block(first.0.unwrap()).last_access_time(), 0);
    }

    #[test]
    fn test_all_reserved_is_reservation_fail() {
        let mut tags = tag_array(1, 2);
        assert_eq!(tags.access(0, 0).status, RequestStatus::MISS);
        assert_eq!(tags.access(LINE, 0).status, RequestStatus::MISS);
        assert_eq!(tags.access(0, 1).status, RequestStatus::HIT_RESERVED);

        let status = tags.access(2 * LINE, 2);
        assert_eq!(status.status, RequestStatus::RESERVATION_FAIL);
        assert_eq!(status.index, None);
        diff::assert_eq!(
            tags.stats(),
            Stats {
                num_accesses: 4,
                num_misses: 3,
                num_pending_hits: 1,
                num_reservation_fails: 1,
                num_dirty: 0,
                num_used_lines: 2,
            }
        );
    }

    #[test]
    fn test_dirty_victim_is_written_back() {
        let mut tags = tag_array(1, 1);
        let index = bring_in(&mut tags, 0, 0);
        tags.set_modified(index);
        assert_eq!(tags.num_dirty(), 1);

        let status = tags.access(LINE, 1);
        assert_eq!(status.status, RequestStatus::MISS);
        assert!(status.writeback);
        diff::assert_eq!(
            status.evicted,
            Some(EvictedBlockInfo {
                block_addr: 0,
                modified_size: 128,
            })
        );
        assert_eq!(tags.num_dirty(), 0);
        assert_eq!(tags.get_block(index).status, block::Status::RESERVED);
    }

    #[test]
    #[should_panic(expected = "expected RESERVED")]
    fn test_fill_on_miss_requires_reserved_line() {
        let mut tags = tag_array(1, 2);
        let index = bring_in(&mut tags, 0, 0);
        tags.fill_on_miss(index, 1);
    }

    #[test]
    fn test_fill_on_fill_allocates_and_evicts() {
        let mut config = testing::data_config(1, 1);
        config.allocate_policy = AllocatePolicy::ON_FILL;
        config.write_policy = cache::config::WritePolicy::WRITE_THROUGH;
        let mut tags = TagArray::new(cache::Config::from(&config));

        // misses do not reserve under ON_FILL
        let status = tags.access(0, 0);
        assert_eq!(status.status, RequestStatus::MISS);
        assert_eq!(tags.get_block(status.index.unwrap()).status, block::Status::INVALID);

        let (index, evicted) = tags.fill_on_fill(0, 5);
        assert_eq!(evicted, None);
        assert!(tags.get_block(index).is_valid());
        assert_eq!(tags.get_block(index).fill_time(), 5);

        tags.set_modified(index);
        let (_, evicted) = tags.fill_on_fill(LINE, 6);
        assert_eq!(evicted.map(|block| block.block_addr), Some(0));
        assert_eq!(tags.num_dirty(), 0);
    }

    #[test]
    fn test_windowed_miss_rate() {
        let mut tags = tag_array(1, 4);
        assert!(tags.windowed_miss_rate().abs() < f32::EPSILON);
        bring_in(&mut tags, 0, 0);
        let _ = tags.access(0, 1);
        assert!((tags.windowed_miss_rate() - 0.5).abs() < f32::EPSILON);

        tags.new_window();
        assert!(tags.windowed_miss_rate().abs() < f32::EPSILON);
        for time in 2..5 {
            let _ = tags.access(0, time);
        }
        bring_in(&mut tags, LINE, 5);
        assert!((tags.windowed_miss_rate() - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn test_flush_and_invalidate() {
        let mut tags = tag_array(2, 2);
        let a = bring_in(&mut tags, 0, 0);
        let _ = bring_in(&mut tags, LINE, 0);
        let _ = bring_in(&mut tags, 2 * LINE, 0);
        tags.set_modified(a);
        assert_eq!(tags.num_used_lines(), 3);

        assert_eq!(tags.flush(), 1);
        assert_eq!(tags.num_used_lines(), 0);
        assert_eq!(tags.num_dirty(), 0);
        assert_eq!(tags.probe(0).1, RequestStatus::MISS);

        let _ = bring_in(&mut tags, 0, 1);
        tags.invalidate();
        assert_eq!(tags.num_used_lines(), 0);
    }

    #[test]
    fn test_invalidate_line_keeps_dirty_count() {
        let mut tags = tag_array(1, 2);
        let a = bring_in(&mut tags, 0, 0);
        tags.set_modified(a);
        tags.set_modified(a);
        assert_eq!(tags.num_dirty(), 1);
        tags.invalidate_line(a);
        assert_eq!(tags.num_dirty(), 0);
        assert_eq!(tags.probe(0).1, RequestStatus::MISS);
    }
}
