pub mod base;
pub mod block;
pub mod config;
pub mod controller;
pub mod data;
pub mod event;
pub mod l1;
pub mod l2;
pub mod policy;
pub mod readonly;
pub mod set_index;
pub mod tex;

pub use config::Config;
pub use controller::{CacheController, CacheControllerUnit};
pub use data::Data;
pub use event::Event;
pub use l1::DataL1;
pub use l2::DataL2;
pub use readonly::ReadOnly;
pub use tex::Texture;

use crate::sync::{Arc, Mutex};
use crate::{address, interconn as ic, mem_fetch, tag_array};

#[derive(Debug, strum::EnumIter, Clone, Copy, Hash, PartialEq, Eq)]
pub enum RequestStatus {
    HIT = 0,
    HIT_RESERVED,
    MISS,
    RESERVATION_FAIL,
    MSHR_HIT,
}

impl From<RequestStatus> for stats::cache::RequestStatus {
    fn from(status: RequestStatus) -> Self {
        match status {
            RequestStatus::HIT => Self::HIT,
            RequestStatus::HIT_RESERVED => Self::HIT_RESERVED,
            RequestStatus::MISS => Self::MISS,
            RequestStatus::RESERVATION_FAIL => Self::RESERVATION_FAIL,
            RequestStatus::MSHR_HIT => Self::MSHR_HIT,
        }
    }
}

impl From<RequestStatus> for stats::cache::AccessStat {
    fn from(status: RequestStatus) -> Self {
        Self::Status(status.into())
    }
}

/// Why an access could not be accepted in this cycle.
#[derive(Debug, strum::EnumIter, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ReservationFailure {
    /// all line are reserved
    LINE_ALLOC_FAIL = 0,
    /// MISS queue (i.e. interconnect or DRAM) is full
    MISS_QUEUE_FULL,
    MSHR_ENTRY_FAIL,
    MSHR_MERGE_ENTRY_FAIL,
    /// the pending entry already received its fill
    MSHR_RW_PENDING,
}

impl From<ReservationFailure> for stats::cache::ReservationFailure {
    fn from(failure: ReservationFailure) -> Self {
        match failure {
            ReservationFailure::LINE_ALLOC_FAIL => Self::LINE_ALLOC_FAIL,
            ReservationFailure::MISS_QUEUE_FULL => Self::MISS_QUEUE_FULL,
            ReservationFailure::MSHR_ENTRY_FAIL => Self::MSHR_ENTRY_FAIL,
            ReservationFailure::MSHR_MERGE_ENTRY_FAIL => Self::MSHR_MERGE_ENTRY_FAIL,
            ReservationFailure::MSHR_RW_PENDING => Self::MSHR_RW_PENDING,
        }
    }
}

impl From<ReservationFailure> for stats::cache::AccessStat {
    fn from(failure: ReservationFailure) -> Self {
        Self::ReservationFailure(failure.into())
    }
}

/// Status recorded in the statistics for an access.
///
/// An accepted access to a reserved line counts as `HIT_RESERVED`, even if
/// the handler reports it as a miss.
#[must_use]
pub fn select_status(probe: RequestStatus, access: RequestStatus) -> RequestStatus {
    match probe {
        RequestStatus::HIT_RESERVED if access != RequestStatus::RESERVATION_FAIL => {
            RequestStatus::HIT_RESERVED
        }
        _ => access,
    }
}

pub trait Component {
    fn cycle(&mut self, cycle: u64);
}

pub trait Cache: Send + Sync + Component + 'static {
    fn as_any(&self) -> &dyn std::any::Any;

    fn stats(&self) -> &Arc<Mutex<stats::Cache>>;

    /// Accesses the cache.
    ///
    /// Memory traffic caused by the access is reported in `events`.
    /// `RESERVATION_FAIL` leaves the cache unchanged and the access should
    /// be retried in a later cycle.
    fn access(
        &mut self,
        addr: address,
        fetch: mem_fetch::MemFetch,
        events: &mut Vec<event::Event>,
        time: u64,
    ) -> RequestStatus;

    /// Are any (accepted) accesses that had to wait for memory now ready?
    ///
    /// Accesses that hit are never reported as ready.
    fn has_ready_accesses(&self) -> bool;

    /// Pop next ready access.
    fn next_access(&mut self) -> Option<mem_fetch::MemFetch>;

    /// Response from the lower memory level.
    ///
    /// # Panics
    /// If the fetch has no outstanding request.
    fn fill(&mut self, fetch: mem_fetch::MemFetch, time: u64);

    /// Invalidate all modified lines, returning their number.
    fn flush(&mut self) -> usize;

    /// Invalidate all lines.
    fn invalidate(&mut self);

    /// Checks if fetch is waiting to be filled by lower memory level.
    fn waiting_for_fill(&self, fetch: &mem_fetch::MemFetch) -> bool;

    fn write_allocate_policy(&self) -> config::WriteAllocatePolicy;

    fn set_top_port(&mut self, port: ic::Port<mem_fetch::MemFetch>);

    fn tag_array_stats(&self) -> tag_array::Stats;

    /// Start a new window for the windowed miss rate.
    fn new_window(&mut self);

    fn windowed_miss_rate(&self) -> f32;
}

#[cfg(test)]
mod tests {
    use super::{select_status, RequestStatus};

    #[test]
    fn test_select_status() {
        assert_eq!(
            select_status(RequestStatus::HIT_RESERVED, RequestStatus::MISS),
            RequestStatus::HIT_RESERVED
        );
        assert_eq!(
            select_status(RequestStatus::HIT_RESERVED, RequestStatus::RESERVATION_FAIL),
            RequestStatus::RESERVATION_FAIL
        );
        assert_eq!(
            select_status(RequestStatus::MISS, RequestStatus::HIT_RESERVED),
            RequestStatus::HIT_RESERVED
        );
        assert_eq!(
            select_status(RequestStatus::HIT, RequestStatus::HIT),
            RequestStatus::HIT
        );
    }
}
