//! Fixed latency backing memory.

use crate::{interconn as ic, mem_fetch};
use std::collections::VecDeque;

/// Memory that answers every read after a fixed number of cycles.
///
/// Writes are absorbed without a reply.
#[derive(Debug)]
pub struct FixedLatency {
    pub latency: u64,
    capacity: usize,
    queue: VecDeque<(u64, mem_fetch::MemFetch)>,
    num_writes: usize,
    num_reads: usize,
}

impl FixedLatency {
    #[must_use]
    pub fn new(latency: u64, capacity: usize) -> Self {
        Self {
            latency,
            capacity,
            queue: VecDeque::with_capacity(capacity),
            num_writes: 0,
            num_reads: 0,
        }
    }

    /// Pops the next reply due at or before `time`.
    pub fn ready(&mut self, time: u64) -> Option<mem_fetch::MemFetch> {
        match self.queue.front() {
            Some((ready_cycle, _)) if *ready_cycle <= time => {
                let (_, mut fetch) = self.queue.pop_front()?;
                fetch.set_reply();
                fetch.set_status(mem_fetch::Status::IN_ICNT_TO_SHADER, time);
                Some(fetch)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn num_reads(&self) -> usize {
        self.num_reads
    }

    #[must_use]
    pub fn num_writes(&self) -> usize {
        self.num_writes
    }
}

impl ic::Connection<ic::Packet<mem_fetch::MemFetch>> for FixedLatency {
    fn can_send(&self, packets: &[u32]) -> bool {
        self.queue.len() + packets.len() <= self.capacity
    }

    fn send(&mut self, packet: ic::Packet<mem_fetch::MemFetch>) {
        let ic::Packet { data: mut fetch, time } = packet;
        if fetch.is_write() {
            log::trace!("memory: absorbed write {}", fetch);
            self.num_writes += 1;
            return;
        }
        let ready_cycle = time + self.latency;
        log::trace!("memory: {} ready at {}", fetch, ready_cycle);
        fetch.set_status(mem_fetch::Status::IN_PARTITION_DRAM_LATENCY_QUEUE, time);
        self.num_reads += 1;
        self.queue.push_back((ready_cycle, fetch));
    }
}

#[cfg(test)]
mod tests {
    use super::FixedLatency;
    use crate::interconn::{Connection, Packet};
    use crate::mem_fetch::{self, access::Kind as AccessKind};
    use crate::testing;

    #[test]
    fn test_reads_return_after_latency() {
        let mut memory = FixedLatency::new(10, 4);
        let read = testing::fetch(AccessKind::GLOBAL_ACC_R, 0x100);
        memory.send(Packet {
            data: read.clone(),
            time: 5,
        });
        assert_eq!(memory.num_reads(), 1);
        assert_eq!(memory.ready(14), None);
        let reply = memory.ready(15).unwrap();
        assert_eq!(reply, read);
        assert_eq!(reply.kind, mem_fetch::Kind::READ_REPLY);
        assert_eq!(memory.ready(16), None);
    }

    #[test]
    fn test_writes_are_absorbed() {
        let mut memory = FixedLatency::new(1, 4);
        memory.send(Packet {
            data: testing::fetch(AccessKind::L1_WRBK_ACC, 0),
            time: 0,
        });
        memory.send(Packet {
            data: testing::fetch(AccessKind::GLOBAL_ACC_W, 4),
            time: 0,
        });
        assert_eq!(memory.num_writes(), 2);
        assert_eq!(memory.num_reads(), 0);
        assert!(memory.can_send(&[8; 4]), "writes take no queue slots");
        assert_eq!(memory.ready(100), None);
    }

    #[test]
    fn test_capacity_backpressure() {
        let mut memory = FixedLatency::new(1, 1);
        assert!(memory.can_send(&[8]));
        memory.send(Packet {
            data: testing::fetch(AccessKind::GLOBAL_ACC_R, 0),
            time: 0,
        });
        assert!(!memory.can_send(&[8]));
        assert!(memory.ready(1).is_some());
        assert!(memory.can_send(&[8]));
    }
}
