use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::IntoEnumIterator;

/// Kind of the access a counter is kept for.
#[derive(
    Debug,
    strum::EnumIter,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub enum AccessKind {
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

#[derive(
    Debug,
    strum::EnumIter,
    Clone,
    Copy,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
pub enum RequestStatus {
    HIT = 0,
    HIT_RESERVED,
    MISS,
    RESERVATION_FAIL,
    MSHR_HIT,
}

#[derive(
    Debug,
    strum::EnumIter,
    Clone,
    Copy,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
pub enum ReservationFailure {
    /// all line are reserved
    LINE_ALLOC_FAIL = 0,
    /// MISS queue (i.e. interconnect or DRAM) is full
    MISS_QUEUE_FULL,
    MSHR_ENTRY_FAIL,
    MSHR_MERGE_ENTRY_FAIL,
    MSHR_RW_PENDING,
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccessStat {
    ReservationFailure(ReservationFailure),
    Status(RequestStatus),
}

#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Cache {
    pub accesses: HashMap<(AccessKind, AccessStat), usize>,
}

impl Default for Cache {
    fn default() -> Self {
        let mut accesses = HashMap::new();
        for access_kind in AccessKind::iter() {
            for status in RequestStatus::iter() {
                accesses.insert((access_kind, AccessStat::Status(status)), 0);
            }
            for failure in ReservationFailure::iter() {
                accesses.insert((access_kind, AccessStat::ReservationFailure(failure)), 0);
            }
        }
        Self { accesses }
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut accesses: Vec<_> = self
            .accesses
            .iter()
            .filter(|(_, &count)| count > 0)
            .map(|((access_kind, access_stat), count)| {
                let key = match access_stat {
                    AccessStat::Status(status) => {
                        format!("{access_kind:?}[{status:?}]")
                    }
                    AccessStat::ReservationFailure(failure) => {
                        format!("{access_kind:?}[{failure:?}]")
                    }
                };
                (key, count)
            })
            .collect();
        accesses.sort_by_key(|(key, _)| key.clone());

        let mut out = f.debug_struct("CacheStats");
        for (key, count) in accesses {
            out.field(&key, count);
        }
        out.finish_non_exhaustive()
    }
}

impl Cache {
    /// Drop all zero counters.
    pub fn shave(&mut self) {
        self.accesses.retain(|_, v| *v > 0);
    }

    /// Number of accesses that were accepted or rejected by the cache.
    ///
    /// Reservation failure reasons are not counted, since each rejected
    /// access is already counted as `RESERVATION_FAIL`.
    #[must_use]
    pub fn total_accesses(&self) -> usize {
        self.accesses
            .iter()
            .filter(|((_, stat), _)| {
                matches!(
                    stat,
                    AccessStat::Status(
                        RequestStatus::HIT
                            | RequestStatus::HIT_RESERVED
                            | RequestStatus::MISS
                            | RequestStatus::RESERVATION_FAIL
                    )
                )
            })
            .map(|(_, count)| count)
            .sum()
    }

    /// Count for a status summed over all access kinds.
    #[must_use]
    pub fn count(&self, access: impl Into<AccessStat>) -> usize {
        let access = access.into();
        self.accesses
            .iter()
            .filter(|((_, stat), _)| *stat == access)
            .map(|(_, count)| count)
            .sum()
    }

    #[must_use]
    pub fn get(&self, kind: impl Into<AccessKind>, access: impl Into<AccessStat>) -> usize {
        self.accesses
            .get(&(kind.into(), access.into()))
            .copied()
            .unwrap_or(0)
    }

    #[inline]
    pub fn inc(
        &mut self,
        kind: impl Into<AccessKind>,
        access: impl Into<AccessStat>,
        count: usize,
    ) {
        *self
            .accesses
            .entry((kind.into(), access.into()))
            .or_insert(0) += count;
    }
}

impl From<RequestStatus> for AccessStat {
    fn from(status: RequestStatus) -> Self {
        Self::Status(status)
    }
}

impl From<ReservationFailure> for AccessStat {
    fn from(failure: ReservationFailure) -> Self {
        Self::ReservationFailure(failure)
    }
}
