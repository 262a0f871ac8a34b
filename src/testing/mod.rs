use crate::cache::config::{
    AllocatePolicy, ReplacementPolicy, SetIndexFunction, WriteAllocatePolicy, WritePolicy,
};
use crate::sync::{Arc, Mutex};
use crate::{cache, config, fifo::Fifo, interconn as ic, mem_fetch, mshr};

static LOGGER: std::sync::Once = std::sync::Once::new();

pub fn init_logging() {
    LOGGER.call_once(|| {
        env_logger::builder().is_test(true).init();
    });
}

fn build_fetch(kind: mem_fetch::access::Kind, addr: u64, is_atomic: bool) -> mem_fetch::MemFetch {
    mem_fetch::Builder {
        access: mem_fetch::access::Builder {
            kind,
            addr,
            req_size_bytes: 4,
        }
        .build(),
        warp_id: 0,
        core_id: None,
        pc: None,
        is_atomic,
    }
    .build()
}

/// A 4 byte request from warp 0.
#[must_use]
pub fn fetch(kind: mem_fetch::access::Kind, addr: u64) -> mem_fetch::MemFetch {
    build_fetch(kind, addr, false)
}

/// A 4 byte global atomic from warp 0.
#[must_use]
pub fn atomic_fetch(addr: u64) -> mem_fetch::MemFetch {
    build_fetch(mem_fetch::access::Kind::GLOBAL_ACC_R, addr, true)
}

/// Write-back, write-allocate data cache with 128 byte lines.
#[must_use]
pub fn data_config(num_sets: usize, associativity: usize) -> config::Cache {
    config::Cache {
        num_sets,
        line_size: 128,
        associativity,
        replacement_policy: ReplacementPolicy::LRU,
        write_policy: WritePolicy::WRITE_BACK,
        allocate_policy: AllocatePolicy::ON_MISS,
        write_allocate_policy: WriteAllocatePolicy::WRITE_ALLOCATE,
        set_index_function: SetIndexFunction::LINEAR,
        mshr_kind: mshr::Kind::ASSOC,
        mshr_entries: 8,
        mshr_max_merge: 4,
        miss_queue_size: 8,
        result_fifo_entries: None,
    }
}

#[must_use]
pub fn read_only_config(num_sets: usize, associativity: usize) -> config::Cache {
    config::Cache {
        write_policy: WritePolicy::READ_ONLY,
        write_allocate_policy: WriteAllocatePolicy::NO_WRITE_ALLOCATE,
        ..data_config(num_sets, associativity)
    }
}

/// Texture cache with 8 fragments, 4 outstanding requests, 8 ROB slots and
/// 2 result slots.
#[must_use]
pub fn texture_config(num_sets: usize, associativity: usize) -> config::Cache {
    config::Cache {
        mshr_kind: mshr::Kind::TEX_FIFO,
        mshr_entries: 8,
        mshr_max_merge: 4,
        miss_queue_size: 8,
        result_fifo_entries: Some(2),
        ..read_only_config(num_sets, associativity)
    }
}

/// A bounded memory port that keeps every packet it accepts.
#[must_use]
pub fn port(
    capacity: usize,
) -> (
    Arc<Mutex<Fifo<ic::Packet<mem_fetch::MemFetch>>>>,
    ic::Port<mem_fetch::MemFetch>,
) {
    let queue = Arc::new(Mutex::new(Fifo::new(capacity)));
    let port: ic::Port<mem_fetch::MemFetch> = queue.clone();
    (queue, port)
}

fn stats() -> Arc<Mutex<stats::Cache>> {
    Arc::new(Mutex::new(stats::Cache::default()))
}

pub fn l1(cache_config: config::Cache) -> Result<cache::DataL1, config::Error> {
    cache::DataL1::new("l1d".to_string(), Arc::new(cache_config), stats())
}

pub fn read_only(cache_config: config::Cache) -> Result<cache::ReadOnly, config::Error> {
    cache::ReadOnly::new(
        "l1c".to_string(),
        Arc::new(cache_config),
        stats(),
        mem_fetch::Status::IN_L1C_MISS_QUEUE,
    )
}

pub fn texture(cache_config: config::Cache) -> Result<cache::Texture, config::Error> {
    cache::Texture::new("l1t".to_string(), Arc::new(cache_config), stats())
}
