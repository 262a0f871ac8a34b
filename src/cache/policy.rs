use super::config::{WriteAllocatePolicy, WritePolicy};
use crate::{config, mem_fetch::access};

/// Behavior of a data cache on a write hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteHit {
    /// Mark the line modified, nothing is sent.
    WriteBack,
    /// Send the write, the line stays clean.
    WriteThrough,
    /// Send the write and invalidate the line.
    WriteEvict,
}

/// Write hit handling as configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum HitPolicy {
    Uniform(WriteHit),
    /// Write-back for local accesses, write-evict for global accesses.
    ByScope,
}

/// Behavior of a data cache on a write miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteMiss {
    WriteAllocate,
    NoWriteAllocate,
}

/// Write handlers of a data cache, selected once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Policy {
    hit: HitPolicy,
    pub write_miss: WriteMiss,
}

impl Policy {
    pub fn new(
        write_policy: WritePolicy,
        write_allocate_policy: WriteAllocatePolicy,
    ) -> Result<Self, config::Error> {
        let hit = match write_policy {
            WritePolicy::WRITE_BACK => HitPolicy::Uniform(WriteHit::WriteBack),
            WritePolicy::WRITE_THROUGH => HitPolicy::Uniform(WriteHit::WriteThrough),
            WritePolicy::WRITE_EVICT => HitPolicy::Uniform(WriteHit::WriteEvict),
            WritePolicy::LOCAL_WB_GLOBAL_WT => HitPolicy::ByScope,
            policy @ WritePolicy::READ_ONLY => {
                return Err(config::Error::BadWritePolicy {
                    cache: "data",
                    policy,
                })
            }
        };
        let write_miss = match write_allocate_policy {
            WriteAllocatePolicy::WRITE_ALLOCATE => WriteMiss::WriteAllocate,
            WriteAllocatePolicy::NO_WRITE_ALLOCATE => WriteMiss::NoWriteAllocate,
        };
        Ok(Self { hit, write_miss })
    }

    /// Write hit handler for an access of the given kind.
    #[must_use]
    pub fn write_hit(&self, kind: access::Kind) -> WriteHit {
        match self.hit {
            HitPolicy::Uniform(write_hit) => write_hit,
            HitPolicy::ByScope if kind.is_global() => WriteHit::WriteEvict,
            HitPolicy::ByScope => WriteHit::WriteBack,
        }
    }

    /// Whether writes of this kind stay in the cache until eviction.
    #[must_use]
    pub fn retains_writes(&self, kind: access::Kind) -> bool {
        self.write_hit(kind) == WriteHit::WriteBack
    }
}

#[cfg(test)]
mod tests {
    use super::{Policy, WriteHit, WriteMiss};
    use crate::cache::config::{WriteAllocatePolicy, WritePolicy};
    use crate::mem_fetch::access::Kind;

    #[test]
    fn test_local_write_back_global_write_evict() -> color_eyre::eyre::Result<()> {
        let policy = Policy::new(
            WritePolicy::LOCAL_WB_GLOBAL_WT,
            WriteAllocatePolicy::NO_WRITE_ALLOCATE,
        )?;
        assert_eq!(policy.write_miss, WriteMiss::NoWriteAllocate);
        assert_eq!(policy.write_hit(Kind::GLOBAL_ACC_W), WriteHit::WriteEvict);
        assert_eq!(policy.write_hit(Kind::LOCAL_ACC_W), WriteHit::WriteBack);
        assert!(policy.retains_writes(Kind::LOCAL_ACC_W));
        assert!(!policy.retains_writes(Kind::GLOBAL_ACC_W));
        Ok(())
    }

    #[test]
    fn test_uniform_policies() -> color_eyre::eyre::Result<()> {
        let policy = Policy::new(WritePolicy::WRITE_THROUGH, WriteAllocatePolicy::WRITE_ALLOCATE)?;
        assert_eq!(policy.write_miss, WriteMiss::WriteAllocate);
        for kind in [Kind::GLOBAL_ACC_W, Kind::LOCAL_ACC_W] {
            assert_eq!(policy.write_hit(kind), WriteHit::WriteThrough);
            assert!(!policy.retains_writes(kind));
        }

        let policy = Policy::new(WritePolicy::WRITE_EVICT, WriteAllocatePolicy::NO_WRITE_ALLOCATE)?;
        assert_eq!(policy.write_hit(Kind::LOCAL_ACC_W), WriteHit::WriteEvict);
        Ok(())
    }

    #[test]
    fn test_read_only_is_not_a_data_policy() {
        assert!(Policy::new(WritePolicy::READ_ONLY, WriteAllocatePolicy::NO_WRITE_ALLOCATE).is_err());
    }
}
