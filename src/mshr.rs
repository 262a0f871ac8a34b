use super::{address, mem_fetch};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Miss status handling register kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    TEX_FIFO, // F
    ASSOC,    // A
}

/// Flags of an entry whose fill arrived.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ReadyFlags {
    pub has_atomic: bool,
}

/// Miss status handling entry.
#[derive(Debug)]
pub struct Entry<F> {
    requests: VecDeque<F>,
    has_atomic: bool,
    ready: bool,
}

impl<F> Entry<F> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// The fill for this entry arrived and its requests are being drained.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    #[must_use]
    pub fn has_atomic(&self) -> bool {
        self.has_atomic
    }

    pub fn requests(&self) -> impl Iterator<Item = &F> + '_ {
        self.requests.iter()
    }
}

impl<F> Default for Entry<F> {
    fn default() -> Self {
        Self {
            requests: VecDeque::new(),
            has_atomic: false,
            ready: false,
        }
    }
}

/// Miss status handling register table.
#[derive(Debug)]
pub struct Table<F> {
    num_entries: usize,
    max_merged: usize,
    entries: HashMap<address, Entry<F>>,
    /// Block addresses of entries whose fill arrived, oldest first.
    ///
    /// It may take several cycles to drain the merged requests.
    current_response: VecDeque<address>,
}

pub trait MSHR<F> {
    /// Checks if there is no more space for tracking a new memory access.
    ///
    /// For an existing entry this is whether the merge limit is reached,
    /// otherwise whether all entries are in use.
    #[must_use]
    fn full(&self, block_addr: address) -> bool;

    /// Checks if there is a pending entry for the block address.
    #[must_use]
    fn probe(&self, block_addr: address) -> bool;

    /// Get pending requests for a given block address.
    #[must_use]
    fn get(&self, block_addr: address) -> Option<&Entry<F>>;

    /// Add or merge access.
    ///
    /// # Panics
    /// If the table has no room for the access, see `full`.
    fn add(&mut self, block_addr: address, fetch: F);
}

impl MSHR<mem_fetch::MemFetch> for Table<mem_fetch::MemFetch> {
    fn full(&self, block_addr: address) -> bool {
        match self.entries.get(&block_addr) {
            Some(entry) => entry.requests.len() >= self.max_merged,
            None => self.entries.len() >= self.num_entries,
        }
    }

    fn probe(&self, block_addr: address) -> bool {
        self.entries.contains_key(&block_addr)
    }

    fn get(&self, block_addr: address) -> Option<&Entry<mem_fetch::MemFetch>> {
        self.entries.get(&block_addr)
    }

    fn add(&mut self, block_addr: address, fetch: mem_fetch::MemFetch) {
        assert!(
            !self.full(block_addr),
            "mshr table has no room for {fetch} (block {block_addr})"
        );
        let entry = self.entries.entry(block_addr).or_default();

        // indicate that this MSHR entry contains an atomic operation
        entry.has_atomic |= fetch.is_atomic();
        log::trace!(
            "mshr_table::add(block_addr={}, fetch={}) merged={}",
            block_addr,
            fetch,
            entry.requests.len()
        );
        entry.requests.push_back(fetch);
    }
}

impl Table<mem_fetch::MemFetch> {
    #[must_use]
    pub fn new(num_entries: usize, max_merged: usize) -> Self {
        let entries = HashMap::with_capacity(num_entries);
        Self {
            num_entries,
            max_merged,
            entries,
            current_response: VecDeque::new(),
        }
    }

    /// Accept a new cache fill response: mark entry ready for processing
    ///
    /// # Returns
    /// The flags of the ready entry, or `None` if there is no entry.
    pub fn mark_ready(&mut self, block_addr: address) -> Option<ReadyFlags> {
        let flags = match self.entries.get_mut(&block_addr) {
            Some(entry) if !entry.ready => {
                entry.ready = true;
                self.current_response.push_back(block_addr);
                Some(ReadyFlags {
                    has_atomic: entry.has_atomic,
                })
            }
            Some(entry) => Some(ReadyFlags {
                has_atomic: entry.has_atomic,
            }),
            None => None,
        };
        log::trace!(
            "mshr_table::mark_ready(block_addr={}, flags={:?})",
            block_addr,
            flags
        );
        debug_assert!(self.current_response.len() <= self.entries.len());
        flags
    }

    /// Returns true if ready accesses exist
    #[must_use]
    pub fn has_ready_accesses(&self) -> bool {
        !self.current_response.is_empty()
    }

    /// Returns next ready accesses
    #[must_use]
    pub fn ready_accesses(&self) -> Option<&VecDeque<mem_fetch::MemFetch>> {
        let block_addr = self.current_response.front()?;
        let entry = self.entries.get(block_addr)?;
        Some(&entry.requests)
    }

    /// Number of entries in use.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns next ready access
    ///
    /// The entry is retired once its last request was popped.
    pub fn pop_next_ready_access(&mut self) -> Option<mem_fetch::MemFetch> {
        let block_addr = *self.current_response.front()?;
        let entry = self.entries.get_mut(&block_addr)?;

        debug_assert!(!entry.requests.is_empty());
        let fetch = entry.requests.pop_front();

        // check if this was the last request.
        // If so, clear the current response and remove the entry
        if entry.requests.is_empty() {
            self.entries.remove(&block_addr);
            self.current_response.pop_front();
        }
        fetch
    }
}
