//! Replays a strided access stream against a single cache.

use crate::cache::config::{
    AllocatePolicy, ReplacementPolicy, SetIndexFunction, WriteAllocatePolicy, WritePolicy,
};
use crate::cache::{self, event, Cache, Component};
use crate::sync::{Arc, Mutex};
use crate::{config, interconn as ic, mem_fetch, memory, mshr, tag_array};

/// Number of requests the backing memory keeps in flight.
pub const MEMORY_QUEUE_SIZE: usize = 64;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::Error),

    #[error("stride and footprint must be non-zero")]
    EmptyStream,

    #[error("no progress after {cycles} cycles ({completed}/{outstanding} accesses completed)")]
    NoProgress {
        cycles: u64,
        completed: u64,
        outstanding: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum CacheKind {
    L1,
    L2,
    Readonly,
    Texture,
}

impl CacheKind {
    /// A 16KB 4-way cache of this kind.
    #[must_use]
    pub fn default_config(self) -> config::Cache {
        let data = config::Cache {
            num_sets: 32,
            line_size: 128,
            associativity: 4,
            replacement_policy: ReplacementPolicy::LRU,
            write_policy: WritePolicy::WRITE_BACK,
            allocate_policy: AllocatePolicy::ON_MISS,
            write_allocate_policy: WriteAllocatePolicy::WRITE_ALLOCATE,
            set_index_function: SetIndexFunction::LINEAR,
            mshr_kind: mshr::Kind::ASSOC,
            mshr_entries: 32,
            mshr_max_merge: 8,
            miss_queue_size: 8,
            result_fifo_entries: None,
        };
        match self {
            Self::L1 => config::Cache {
                set_index_function: SetIndexFunction::FERMI_HASH,
                ..data
            },
            Self::L2 => data,
            Self::Readonly => config::Cache {
                write_policy: WritePolicy::READ_ONLY,
                write_allocate_policy: WriteAllocatePolicy::NO_WRITE_ALLOCATE,
                ..data
            },
            Self::Texture => config::Cache {
                write_policy: WritePolicy::READ_ONLY,
                write_allocate_policy: WriteAllocatePolicy::NO_WRITE_ALLOCATE,
                mshr_kind: mshr::Kind::TEX_FIFO,
                mshr_entries: 128,
                mshr_max_merge: 32,
                miss_queue_size: 128,
                result_fifo_entries: Some(2),
                ..data
            },
        }
    }

    pub fn build(
        self,
        cache_config: Arc<config::Cache>,
        stats: Arc<Mutex<stats::Cache>>,
    ) -> Result<Box<dyn Cache>, config::Error> {
        let name = format!("{self:?}").to_lowercase();
        Ok(match self {
            Self::L1 => Box::new(cache::DataL1::new(name, cache_config, stats)?),
            Self::L2 => Box::new(cache::DataL2::new(name, cache_config, stats)?),
            Self::Readonly => Box::new(cache::ReadOnly::new(
                name,
                cache_config,
                stats,
                mem_fetch::Status::IN_L1C_MISS_QUEUE,
            )?),
            Self::Texture => Box::new(cache::Texture::new(name, cache_config, stats)?),
        })
    }

    /// Only data caches accept writes.
    #[must_use]
    pub fn accepts_writes(self) -> bool {
        matches!(self, Self::L1 | Self::L2)
    }

    #[must_use]
    pub fn access_kind(self, write: bool) -> mem_fetch::access::Kind {
        use mem_fetch::access::Kind;
        match self {
            Self::L1 | Self::L2 if write => Kind::GLOBAL_ACC_W,
            Self::L1 | Self::L2 => Kind::GLOBAL_ACC_R,
            Self::Readonly => Kind::CONST_ACC_R,
            Self::Texture => Kind::TEXTURE_ACC_R,
        }
    }
}

/// Access stream `addr(i) = (i * stride) % footprint`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    pub kind: CacheKind,
    pub accesses: u64,
    pub stride: u64,
    pub footprint: u64,
    /// Every n-th access is a write (data caches only).
    pub write_every: Option<u64>,
    pub latency: u64,
    /// Accesses per miss rate window.
    pub window: u64,
}

impl Stream {
    fn is_write(&self, index: u64) -> bool {
        self.kind.accepts_writes()
            && self
                .write_every
                .is_some_and(|n| n > 0 && index % n == n - 1)
    }

    fn fetch(&self, index: u64) -> mem_fetch::MemFetch {
        mem_fetch::Builder {
            access: mem_fetch::access::Builder {
                kind: self.kind.access_kind(self.is_write(index)),
                addr: (index * self.stride) % self.footprint,
                req_size_bytes: 4,
            }
            .build(),
            warp_id: 0,
            core_id: None,
            pc: None,
            is_atomic: false,
        }
        .build()
    }
}

/// Outcome of a replay.
#[derive(Debug, Clone)]
pub struct Summary {
    pub cycles: u64,
    pub issued: u64,
    pub completed: u64,
    /// Tag array miss rate of each completed window.
    pub miss_rates: Vec<f32>,
    pub reads_sent: u64,
    pub writes_sent: u64,
    pub write_allocates_sent: u64,
    pub write_backs_sent: u64,
    pub memory_reads: usize,
    pub memory_writes: usize,
    pub tag_array: tag_array::Stats,
    pub stats: stats::Cache,
}

/// Replays `stream` against a fresh cache backed by fixed latency memory.
///
/// Rejected accesses are retried every cycle until accepted. The replay
/// ends once every accepted access that waits for memory has completed.
pub fn run(stream: &Stream, cache_config: config::Cache) -> Result<Summary, Error> {
    if stream.stride == 0 || stream.footprint == 0 {
        return Err(Error::EmptyStream);
    }
    let stats = Arc::new(Mutex::new(stats::Cache::default()));
    let mut cache = stream
        .kind
        .build(Arc::new(cache_config), Arc::clone(&stats))?;
    let memory = Arc::new(Mutex::new(memory::FixedLatency::new(
        stream.latency,
        MEMORY_QUEUE_SIZE,
    )));
    let port: ic::Port<mem_fetch::MemFetch> = memory.clone();
    cache.set_top_port(port);

    let no_write_allocate =
        cache.write_allocate_policy() == WriteAllocatePolicy::NO_WRITE_ALLOCATE;
    let window = stream.window.max(1);
    let max_cycles = (stream.accesses + 1) * (stream.latency + 16) * 4;

    let mut summary = Summary {
        cycles: 0,
        issued: 0,
        completed: 0,
        miss_rates: Vec::new(),
        reads_sent: 0,
        writes_sent: 0,
        write_allocates_sent: 0,
        write_backs_sent: 0,
        memory_reads: 0,
        memory_writes: 0,
        tag_array: tag_array::Stats::default(),
        stats: stats::Cache::default(),
    };
    let mut events = Vec::new();
    let mut outstanding = 0;
    let mut pending: Option<mem_fetch::MemFetch> = None;
    let mut cycle = 0;

    while summary.issued < stream.accesses || pending.is_some() || summary.completed < outstanding
    {
        if cycle > max_cycles {
            return Err(Error::NoProgress {
                cycles: cycle,
                completed: summary.completed,
                outstanding,
            });
        }

        if pending.is_none() && summary.issued < stream.accesses {
            pending = Some(stream.fetch(summary.issued));
            summary.issued += 1;
        }

        if let Some(fetch) = pending.take() {
            events.clear();
            let status = cache.access(fetch.addr(), fetch.clone(), &mut events, cycle);
            log::trace!("cycle {cycle}: {fetch} => {status:?} {events:?}");
            match status {
                cache::RequestStatus::RESERVATION_FAIL => pending = Some(fetch),
                cache::RequestStatus::HIT => {}
                // writes that do not allocate are done once sent
                _ if fetch.is_write() && no_write_allocate => {}
                _ => outstanding += 1,
            }
            summary.reads_sent += u64::from(event::was_read_sent(&events));
            summary.writes_sent += u64::from(event::was_write_sent(&events));
            summary.write_allocates_sent += u64::from(event::was_writeallocate_sent(&events));
            summary.write_backs_sent += u64::from(event::was_writeback_sent(&events).is_some());

            if pending.is_none() && summary.issued % window == 0 {
                summary.miss_rates.push(cache.windowed_miss_rate());
                cache.new_window();
            }
        }

        cache.cycle(cycle);
        let reply = memory.lock().ready(cycle);
        if let Some(reply) = reply {
            if cache.waiting_for_fill(&reply) {
                cache.fill(reply, cycle);
            }
        }
        while cache.next_access().is_some() {
            summary.completed += 1;
        }
        cycle += 1;
    }

    summary.cycles = cycle;
    summary.tag_array = cache.tag_array_stats();
    summary.stats = stats.lock().clone();
    summary.stats.shave();
    let memory = memory.lock();
    summary.memory_reads = memory.num_reads();
    summary.memory_writes = memory.num_writes();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::{run, CacheKind, Error, Stream};
    use crate::cache::RequestStatus;
    use crate::testing;
    use color_eyre::eyre;

    fn stream(kind: CacheKind) -> Stream {
        Stream {
            kind,
            accesses: 512,
            stride: 32,
            footprint: 64 * 1024,
            write_every: None,
            latency: 20,
            window: 128,
        }
    }

    #[test]
    fn test_every_cache_kind_completes() -> eyre::Result<()> {
        testing::init_logging();
        for kind in [
            CacheKind::L1,
            CacheKind::L2,
            CacheKind::Readonly,
            CacheKind::Texture,
        ] {
            let stream = stream(kind);
            let summary = run(&stream, kind.default_config())?;
            assert_eq!(summary.issued, 512, "{kind:?}");
            assert_eq!(summary.miss_rates.len(), 4, "{kind:?}");
            // four accesses per 128 byte line, each line missed once
            assert_eq!(summary.memory_reads, 128, "{kind:?}");
            assert_eq!(summary.reads_sent, 128, "{kind:?}");
            assert_eq!(summary.memory_writes, 0, "{kind:?}");
            assert!(summary.cycles > stream.latency, "{kind:?}");
            assert_eq!(summary.stats.count(RequestStatus::HIT), 0, "{kind:?}");
        }
        Ok(())
    }

    #[test]
    fn test_dirty_lines_are_written_back() -> eyre::Result<()> {
        let stream = Stream {
            accesses: 4096,
            write_every: Some(4),
            ..stream(CacheKind::L2)
        };
        let summary = run(&stream, CacheKind::L2.default_config())?;
        assert_eq!(summary.issued, 4096);
        assert_eq!(summary.writes_sent, 0, "write hits stay in the cache");
        assert!(summary.write_backs_sent > 0);
        assert_eq!(summary.memory_writes as u64, summary.write_backs_sent);
        Ok(())
    }

    #[test]
    fn test_empty_stream_is_rejected() {
        let stream = Stream {
            stride: 0,
            ..stream(CacheKind::L1)
        };
        assert!(matches!(
            run(&stream, CacheKind::L1.default_config()),
            Err(Error::EmptyStream)
        ));
    }
}
