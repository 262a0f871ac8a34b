use crate::cache::config::{
    AllocatePolicy, ReplacementPolicy, SetIndexFunction, WriteAllocatePolicy, WritePolicy,
};
use crate::{address, mshr};

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{what} must be a power of two (got {value})")]
    NotPowerOfTwo { what: &'static str, value: usize },

    #[error("{what} must not be zero")]
    Zero { what: &'static str },

    #[error(
        "write policy {0:?} cannot allocate new lines on fill: \
         a fill evicting a dirty line needs buffer space the fill itself is holding"
    )]
    WriteBackOnFill(WritePolicy),

    #[error("{cache} cache does not support write policy {policy:?}")]
    BadWritePolicy {
        cache: &'static str,
        policy: WritePolicy,
    },

    #[error("{cache} cache requires mshr kind {want:?} (got {have:?})")]
    BadMshrKind {
        cache: &'static str,
        want: mshr::Kind,
        have: mshr::Kind,
    },

    #[error("texture cache must allocate on miss (got {0:?})")]
    TextureOnFill(AllocatePolicy),

    #[error("texture cache requires result fifo entries")]
    MissingResultFifo,

    #[error("{cache} cache requires a miss queue of at least {min} entries (got {have})")]
    MissQueueTooSmall {
        cache: &'static str,
        min: usize,
        have: usize,
    },

    #[error("fermi set index function requires 32 or 64 sets (got {0})")]
    FermiNumSets(usize),

    #[error("failed to parse cache config")]
    Parse(#[from] serde_yaml::Error),

    #[error("failed to read cache config")]
    Io(#[from] std::io::Error),
}

/// Configuration of a single cache instance.
///
/// For `TEX_FIFO` caches the numeric limits are interpreted as the depth of
/// the texture pipeline queues, see [`Cache::fragment_fifo_entries`] and
/// friends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cache {
    pub num_sets: usize,
    pub line_size: u32,
    pub associativity: usize,

    pub replacement_policy: ReplacementPolicy,
    pub write_policy: WritePolicy,
    pub allocate_policy: AllocatePolicy,
    pub write_allocate_policy: WriteAllocatePolicy,
    #[serde(default)]
    pub set_index_function: SetIndexFunction,

    pub mshr_kind: mshr::Kind,
    pub mshr_entries: usize,
    pub mshr_max_merge: usize,

    pub miss_queue_size: usize,
    #[serde(default)]
    pub result_fifo_entries: Option<usize>,
}

impl std::fmt::Display for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let size = human_bytes::human_bytes(self.total_bytes() as f64);
        write!(
            f,
            "{size} ({} set, {}-way, {} byte line, {:?}, {:?})",
            self.num_sets,
            self.associativity,
            self.line_size,
            self.replacement_policy,
            self.write_policy,
        )
    }
}

impl Cache {
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// The total size of the cache in bytes.
    #[inline]
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.line_size as usize * self.num_sets * self.associativity
    }

    /// Number of lines in total.
    #[inline]
    #[must_use]
    pub fn total_lines(&self) -> usize {
        self.num_sets * self.associativity
    }

    #[inline]
    #[must_use]
    pub fn line_size_log2(&self) -> u32 {
        self.line_size.ilog2()
    }

    #[inline]
    #[must_use]
    pub fn num_sets_log2(&self) -> u32 {
        self.num_sets.ilog2()
    }

    /// Size of a single fetch to the next memory level.
    #[inline]
    #[must_use]
    pub fn atom_size(&self) -> u32 {
        self.line_size
    }

    /// Block address
    #[inline]
    #[must_use]
    pub fn block_addr(&self, addr: address) -> address {
        addr & !u64::from(self.line_size - 1)
    }

    #[inline]
    #[must_use]
    pub fn fragment_fifo_entries(&self) -> usize {
        self.mshr_entries
    }

    #[inline]
    #[must_use]
    pub fn request_fifo_entries(&self) -> usize {
        self.mshr_max_merge
    }

    #[inline]
    #[must_use]
    pub fn rob_entries(&self) -> usize {
        self.miss_queue_size
    }

    /// Checks the configuration for invalid combinations shared by all caches.
    pub fn validate(&self) -> Result<(), Error> {
        for (what, value) in [
            ("number of sets", self.num_sets),
            ("line size", self.line_size as usize),
        ] {
            if value == 0 {
                return Err(Error::Zero { what });
            }
            if !value.is_power_of_two() {
                return Err(Error::NotPowerOfTwo { what, value });
            }
        }
        for (what, value) in [
            ("associativity", self.associativity),
            ("number of mshr entries", self.mshr_entries),
            ("mshr merge limit", self.mshr_max_merge),
            ("miss queue size", self.miss_queue_size),
        ] {
            if value == 0 {
                return Err(Error::Zero { what });
            }
        }
        if self.allocate_policy == AllocatePolicy::ON_FILL
            && matches!(
                self.write_policy,
                WritePolicy::WRITE_BACK | WritePolicy::LOCAL_WB_GLOBAL_WT
            )
        {
            return Err(Error::WriteBackOnFill(self.write_policy));
        }
        if self.set_index_function == SetIndexFunction::FERMI_HASH
            && !matches!(self.num_sets, 32 | 64)
        {
            return Err(Error::FermiNumSets(self.num_sets));
        }
        Ok(())
    }

    /// Checks the configuration of a read-write data cache.
    pub fn validate_data(&self) -> Result<(), Error> {
        const CACHE: &str = "data";
        self.validate()?;
        if self.write_policy == WritePolicy::READ_ONLY {
            return Err(Error::BadWritePolicy {
                cache: CACHE,
                policy: self.write_policy,
            });
        }
        self.validate_mshr_kind(CACHE, mshr::Kind::ASSOC)?;

        // a read miss may need a write-back as well,
        // a write-allocate miss may additionally send the write
        let min = match self.write_allocate_policy {
            WriteAllocatePolicy::WRITE_ALLOCATE => 3,
            WriteAllocatePolicy::NO_WRITE_ALLOCATE => 2,
        };
        if self.miss_queue_size < min {
            return Err(Error::MissQueueTooSmall {
                cache: CACHE,
                min,
                have: self.miss_queue_size,
            });
        }
        Ok(())
    }

    /// Checks the configuration of a read-only cache.
    pub fn validate_read_only(&self) -> Result<(), Error> {
        const CACHE: &str = "read-only";
        self.validate()?;
        self.validate_read_only_policy(CACHE)?;
        self.validate_mshr_kind(CACHE, mshr::Kind::ASSOC)
    }

    /// Checks the configuration of a texture cache.
    pub fn validate_texture(&self) -> Result<(), Error> {
        const CACHE: &str = "texture";
        self.validate()?;
        self.validate_read_only_policy(CACHE)?;
        self.validate_mshr_kind(CACHE, mshr::Kind::TEX_FIFO)?;
        if self.allocate_policy != AllocatePolicy::ON_MISS {
            return Err(Error::TextureOnFill(self.allocate_policy));
        }
        match self.result_fifo_entries {
            None => Err(Error::MissingResultFifo),
            Some(0) => Err(Error::Zero {
                what: "result fifo entries",
            }),
            Some(_) => Ok(()),
        }
    }

    fn validate_read_only_policy(&self, cache: &'static str) -> Result<(), Error> {
        if self.write_policy == WritePolicy::READ_ONLY {
            Ok(())
        } else {
            Err(Error::BadWritePolicy {
                cache,
                policy: self.write_policy,
            })
        }
    }

    fn validate_mshr_kind(&self, cache: &'static str, want: mshr::Kind) -> Result<(), Error> {
        if self.mshr_kind == want {
            Ok(())
        } else {
            Err(Error::BadMshrKind {
                cache,
                want,
                have: self.mshr_kind,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cache, Error};
    use crate::cache::config::{
        AllocatePolicy, ReplacementPolicy, SetIndexFunction, WriteAllocatePolicy, WritePolicy,
    };
    use crate::{mshr, testing};
    use color_eyre::eyre;
    use pretty_assertions_sorted as diff;

    #[test]
    fn test_parse_l1_data_config() -> eyre::Result<()> {
        let config = Cache::from_yaml(
            r"
num_sets: 64
line_size: 128
associativity: 6
replacement_policy: LRU
write_policy: LOCAL_WB_GLOBAL_WT
allocate_policy: ON_MISS
write_allocate_policy: NO_WRITE_ALLOCATE
mshr_kind: ASSOC
mshr_entries: 128
mshr_max_merge: 8
miss_queue_size: 8
",
        )?;
        diff::assert_eq!(
            config,
            Cache {
                num_sets: 64,
                line_size: 128,
                associativity: 6,
                replacement_policy: ReplacementPolicy::LRU,
                write_policy: WritePolicy::LOCAL_WB_GLOBAL_WT,
                allocate_policy: AllocatePolicy::ON_MISS,
                write_allocate_policy: WriteAllocatePolicy::NO_WRITE_ALLOCATE,
                set_index_function: SetIndexFunction::LINEAR,
                mshr_kind: mshr::Kind::ASSOC,
                mshr_entries: 128,
                mshr_max_merge: 8,
                miss_queue_size: 8,
                result_fifo_entries: None,
            }
        );
        config.validate_data()?;
        assert_eq!(
            config.to_string(),
            "48 KiB (64 set, 6-way, 128 byte line, LRU, LOCAL_WB_GLOBAL_WT)"
        );
        Ok(())
    }

    #[test]
    fn test_texture_queue_depths() -> eyre::Result<()> {
        let config = Cache::from_yaml(
            r"
num_sets: 16
line_size: 128
associativity: 24
replacement_policy: LRU
write_policy: READ_ONLY
allocate_policy: ON_MISS
write_allocate_policy: NO_WRITE_ALLOCATE
mshr_kind: TEX_FIFO
mshr_entries: 128
mshr_max_merge: 4
miss_queue_size: 128
result_fifo_entries: 2
",
        )?;
        config.validate_texture()?;
        assert_eq!(config.fragment_fifo_entries(), 128);
        assert_eq!(config.request_fifo_entries(), 4);
        assert_eq!(config.rob_entries(), 128);
        assert_eq!(config.result_fifo_entries, Some(2));
        Ok(())
    }

    #[test]
    fn test_write_back_on_fill_is_rejected() {
        let mut config = testing::data_config(1, 4);
        config.write_policy = WritePolicy::WRITE_BACK;
        config.allocate_policy = AllocatePolicy::ON_FILL;
        assert!(matches!(
            config.validate(),
            Err(Error::WriteBackOnFill(WritePolicy::WRITE_BACK))
        ));

        config.write_policy = WritePolicy::WRITE_THROUGH;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_non_power_of_two_geometry_is_rejected() {
        let mut config = testing::data_config(3, 4);
        assert!(matches!(
            config.validate(),
            Err(Error::NotPowerOfTwo {
                what: "number of sets",
                value: 3
            })
        ));
        config.num_sets = 4;
        config.line_size = 100;
        assert!(matches!(
            config.validate(),
            Err(Error::NotPowerOfTwo { value: 100, .. })
        ));
    }

    #[test]
    fn test_policies_must_match_cache_kind() {
        let config = testing::data_config(1, 4);
        assert!(matches!(
            config.validate_read_only(),
            Err(Error::BadWritePolicy {
                cache: "read-only",
                ..
            })
        ));
        assert!(matches!(
            config.validate_texture(),
            Err(Error::BadWritePolicy { .. })
        ));

        let mut config = testing::read_only_config(1, 4);
        assert!(config.validate_read_only().is_ok());
        assert!(matches!(
            config.validate_data(),
            Err(Error::BadWritePolicy { cache: "data", .. })
        ));
        assert!(matches!(
            config.validate_texture(),
            Err(Error::BadMshrKind {
                want: mshr::Kind::TEX_FIFO,
                ..
            })
        ));
        config.write_allocate_policy = WriteAllocatePolicy::WRITE_ALLOCATE;
        config.write_policy = WritePolicy::WRITE_BACK;
        config.miss_queue_size = 2;
        assert!(matches!(
            config.validate_data(),
            Err(Error::MissQueueTooSmall { min: 3, have: 2, .. })
        ));
    }

    #[test]
    fn test_fermi_hash_requires_32_or_64_sets() {
        let mut config = testing::data_config(16, 4);
        config.set_index_function = SetIndexFunction::FERMI_HASH;
        assert!(matches!(config.validate(), Err(Error::FermiNumSets(16))));
        config.num_sets = 32;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_policy_fails_to_parse() {
        let err = Cache::from_yaml("num_sets: 1\nwrite_policy: WRITE_SOMETIMES\n");
        assert!(matches!(err, Err(Error::Parse(_))));
    }
}
