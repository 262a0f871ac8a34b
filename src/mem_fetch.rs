use super::address;
use serde::{Deserialize, Serialize};
use std::sync::atomic;

pub const READ_PACKET_SIZE: u8 = 8;

// bytes: 6 address, 2 miscelaneous.
pub const WRITE_PACKET_SIZE: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    READ_REQUEST = 0,
    WRITE_REQUEST,
    READ_REPLY,
    WRITE_ACK,
}

/// Where a fetch currently is in the memory hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Status {
    INITIALIZED,
    IN_L1D_MISS_QUEUE,
    IN_L1T_MISS_QUEUE,
    IN_L1C_MISS_QUEUE,
    IN_ICNT_TO_MEM,
    IN_PARTITION_L2_MISS_QUEUE,
    IN_PARTITION_DRAM_LATENCY_QUEUE,
    IN_ICNT_TO_SHADER,
    IN_SHADER_L1T_ROB,
    IN_SHADER_FETCHED,
}

pub mod access {
    use serde::{Deserialize, Serialize};

    #[derive(
        Debug,
        strum::EnumIter,
        Clone,
        Copy,
        PartialEq,
        Eq,
        Hash,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
    )]
    pub enum Kind {
        GLOBAL_ACC_R,
        LOCAL_ACC_R,
        CONST_ACC_R,
        TEXTURE_ACC_R,
        GLOBAL_ACC_W,
        LOCAL_ACC_W,
        L1_WRBK_ACC,
        L2_WRBK_ACC,
        INST_ACC_R,
        L1_WR_ALLOC_R,
        L2_WR_ALLOC_R,
    }

    impl Kind {
        #[must_use]
        pub fn is_write(self) -> bool {
            matches!(
                self,
                Kind::GLOBAL_ACC_W | Kind::LOCAL_ACC_W | Kind::L1_WRBK_ACC | Kind::L2_WRBK_ACC
            )
        }

        /// Accesses to the global memory space.
        #[must_use]
        pub fn is_global(self) -> bool {
            matches!(self, Kind::GLOBAL_ACC_R | Kind::GLOBAL_ACC_W)
        }

        #[must_use]
        pub fn is_writeback(self) -> bool {
            matches!(self, Kind::L1_WRBK_ACC | Kind::L2_WRBK_ACC)
        }
    }

    impl From<Kind> for stats::cache::AccessKind {
        fn from(kind: Kind) -> Self {
            match kind {
                Kind::GLOBAL_ACC_R => Self::GLOBAL_ACC_R,
                Kind::LOCAL_ACC_R => Self::LOCAL_ACC_R,
                Kind::CONST_ACC_R => Self::CONST_ACC_R,
                Kind::TEXTURE_ACC_R => Self::TEXTURE_ACC_R,
                Kind::GLOBAL_ACC_W => Self::GLOBAL_ACC_W,
                Kind::LOCAL_ACC_W => Self::LOCAL_ACC_W,
                Kind::L1_WRBK_ACC => Self::L1_WRBK_ACC,
                Kind::L2_WRBK_ACC => Self::L2_WRBK_ACC,
                Kind::INST_ACC_R => Self::INST_ACC_R,
                Kind::L1_WR_ALLOC_R => Self::L1_WR_ALLOC_R,
                Kind::L2_WR_ALLOC_R => Self::L2_WR_ALLOC_R,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct MemAccess {
        pub addr: crate::address,
        pub req_size_bytes: u32,
        pub is_write: bool,
        pub kind: Kind,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct Builder {
        pub kind: Kind,
        pub addr: crate::address,
        pub req_size_bytes: u32,
    }

    impl Builder {
        #[must_use]
        pub fn build(self) -> MemAccess {
            MemAccess {
                addr: self.addr,
                req_size_bytes: self.req_size_bytes,
                is_write: self.kind.is_write(),
                kind: self.kind,
            }
        }
    }

    impl std::fmt::Display for MemAccess {
        fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "{:?}@{}", self.kind, self.addr)
        }
    }

    impl MemAccess {
        #[must_use]
        pub fn control_size(&self) -> u32 {
            if self.is_write {
                u32::from(super::WRITE_PACKET_SIZE)
            } else {
                u32::from(super::READ_PACKET_SIZE)
            }
        }

        #[must_use]
        pub fn data_size(&self) -> u32 {
            self.req_size_bytes
        }

        #[must_use]
        pub fn size(&self) -> u32 {
            self.data_size() + self.control_size()
        }
    }
}

/// A memory request travelling through the memory hierarchy.
///
/// Identity (equality and hashing) is the unique id only.
#[derive(Clone, Debug)]
pub struct MemFetch {
    pub uid: u64,
    pub access: access::MemAccess,
    pub kind: Kind,
    pub warp_id: usize,
    pub core_id: Option<usize>,
    /// Program counter of the issuing instruction, for diagnostics only.
    pub pc: Option<usize>,
    atomic: bool,

    pub status: Status,
    pub last_status_change: Option<u64>,
}

impl std::fmt::Display for MemFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}({:?}@{})", self.kind, self.access_kind(), self.addr())
    }
}

impl Eq for MemFetch {}

impl PartialEq for MemFetch {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid
    }
}

impl std::hash::Hash for MemFetch {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uid.hash(state);
    }
}

static MEM_FETCH_UID: atomic::AtomicU64 = atomic::AtomicU64::new(0);

/// Generate a unique ID that can be used to identify fetch requests
pub fn generate_uid() -> u64 {
    MEM_FETCH_UID.fetch_add(1, atomic::Ordering::SeqCst)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Builder {
    pub access: access::MemAccess,
    pub warp_id: usize,
    pub core_id: Option<usize>,
    pub pc: Option<usize>,
    pub is_atomic: bool,
}

impl Builder {
    #[must_use]
    pub fn build(self) -> MemFetch {
        let kind = if self.access.is_write {
            Kind::WRITE_REQUEST
        } else {
            Kind::READ_REQUEST
        };
        MemFetch {
            uid: generate_uid(),
            access: self.access,
            kind,
            warp_id: self.warp_id,
            core_id: self.core_id,
            pc: self.pc,
            atomic: self.is_atomic,
            status: Status::INITIALIZED,
            last_status_change: None,
        }
    }
}

impl MemFetch {
    #[must_use]
    pub fn addr(&self) -> address {
        self.access.addr
    }

    #[must_use]
    pub fn access_kind(&self) -> access::Kind {
        self.access.kind
    }

    #[must_use]
    pub fn is_write(&self) -> bool {
        self.access.is_write
    }

    /// Atomics are performed as global reads that modify the line.
    #[must_use]
    pub fn is_atomic(&self) -> bool {
        self.atomic
    }

    #[must_use]
    pub fn is_reply(&self) -> bool {
        matches!(self.kind, Kind::READ_REPLY | Kind::WRITE_ACK)
    }

    #[must_use]
    pub fn data_size(&self) -> u32 {
        self.access.data_size()
    }

    #[must_use]
    pub fn control_size(&self) -> u32 {
        self.access.control_size()
    }

    #[must_use]
    pub fn size(&self) -> u32 {
        self.data_size() + self.control_size()
    }

    /// Size of the packet when sent over the interconnect.
    ///
    /// Reads only carry the request header, writes carry their data.
    #[must_use]
    pub fn packet_size(&self) -> u32 {
        if self.is_write() {
            self.size()
        } else {
            self.control_size()
        }
    }

    pub fn set_status(&mut self, status: Status, time: u64) {
        self.status = status;
        self.last_status_change = Some(time);
    }

    pub fn set_reply(&mut self) {
        assert!(
            !self.access.kind.is_writeback(),
            "writeback {self} does not get a reply"
        );
        match self.kind {
            Kind::READ_REQUEST => {
                debug_assert!(!self.is_write());
                self.kind = Kind::READ_REPLY;
            }
            Kind::WRITE_REQUEST => {
                debug_assert!(self.is_write());
                self.kind = Kind::WRITE_ACK;
            }
            Kind::READ_REPLY | Kind::WRITE_ACK => {}
        }
    }
}
