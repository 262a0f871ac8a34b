use crate::address;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, strum::EnumIter)]
pub enum Status {
    INVALID = 0,
    RESERVED,
    VALID,
    MODIFIED,
}

/// A single cache line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Line {
    pub tag: address,
    pub block_addr: address,

    pub status: Status,

    alloc_time: u64,
    fill_time: u64,
    pub last_access_time: u64,

    set_modified_on_fill: bool,
    line_size: u32,
}

impl std::fmt::Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Line")
            .field("addr", &self.block_addr)
            .field("status", &self.status)
            .finish()
    }
}

impl Line {
    #[must_use]
    pub fn new(line_size: u32) -> Self {
        Self {
            tag: 0,
            block_addr: 0,
            status: Status::INVALID,
            alloc_time: 0,
            fill_time: 0,
            last_access_time: 0,
            set_modified_on_fill: false,
            line_size,
        }
    }

    /// Reserves the line for an outstanding fill of `block_addr`.
    #[inline]
    pub fn allocate(&mut self, tag: address, block_addr: address, time: u64) {
        self.tag = tag;
        self.block_addr = block_addr;
        self.alloc_time = time;
        self.last_access_time = time;
        self.fill_time = 0;
        self.status = Status::RESERVED;
        self.set_modified_on_fill = false;
    }

    #[inline]
    pub fn fill(&mut self, time: u64) {
        self.status = if self.set_modified_on_fill {
            Status::MODIFIED
        } else {
            Status::VALID
        };
        self.fill_time = time;
    }

    /// Makes the next fill leave the line dirty.
    ///
    /// Used by write-allocate misses that merge their write into the
    /// fetched line.
    #[inline]
    pub fn set_modified_on_fill(&mut self, modified: bool) {
        self.set_modified_on_fill = modified;
    }

    #[inline]
    pub fn invalidate(&mut self) {
        self.status = Status::INVALID;
        self.set_modified_on_fill = false;
    }

    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status == Status::VALID
    }

    #[inline]
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.status == Status::MODIFIED
    }

    #[inline]
    #[must_use]
    pub fn is_invalid(&self) -> bool {
        self.status == Status::INVALID
    }

    #[inline]
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.status == Status::RESERVED
    }

    #[inline]
    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    #[inline]
    pub fn set_last_access_time(&mut self, time: u64) {
        self.last_access_time = time;
    }

    #[inline]
    #[must_use]
    pub fn alloc_time(&self) -> u64 {
        self.alloc_time
    }

    #[inline]
    #[must_use]
    pub fn fill_time(&self) -> u64 {
        self.fill_time
    }

    #[inline]
    #[must_use]
    pub fn last_access_time(&self) -> u64 {
        self.last_access_time
    }

    /// Number of bytes written back when this line is evicted dirty.
    #[inline]
    #[must_use]
    pub fn modified_size(&self) -> u32 {
        self.line_size
    }
}

#[cfg(test)]
mod tests {
    use super::{Line, Status};

    #[test]
    fn test_fill_honors_modified_on_fill() {
        let mut line = Line::new(128);
        assert!(line.is_invalid());
        line.allocate(1, 128, 10);
        assert!(line.is_reserved());
        assert_eq!(line.alloc_time(), 10);
        line.fill(20);
        assert_eq!(line.status, Status::VALID);
        assert_eq!(line.fill_time(), 20);

        line.allocate(2, 256, 30);
        line.set_modified_on_fill(true);
        line.fill(40);
        assert!(line.is_modified());
        assert_eq!(line.modified_size(), 128);

        // reallocation clears the flag
        line.allocate(3, 384, 50);
        line.fill(60);
        assert!(line.is_valid());
    }
}
