#![allow(
    clippy::upper_case_acronyms,
    non_camel_case_types,
    clippy::too_many_arguments,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]

pub mod cache;
pub mod config;
pub mod fifo;
pub mod interconn;
pub mod mem_fetch;
pub mod memory;
pub mod mshr;
pub mod replay;
pub mod sync;
pub mod tag_array;

#[cfg(test)]
pub mod testing;

pub use cache::Cache;

/// A simulated memory address.
pub type address = u64;
