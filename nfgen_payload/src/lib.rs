//! Synthetic NetFlow payload generation.
//!
//! This library builds NetFlow version 5 export packets with field values
//! that are individually randomized but mutually consistent, suitable for
//! stress-driving collector software without a real router.

#![deny(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use rand::distr::weighted;

pub use netflow_v5::NetFlowV5;

pub mod common;
pub mod netflow_v5;

/// Errors related to packet construction
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Requested record count falls outside what a NetFlow v5 packet holds
    #[error("Requested {requested} flow records, a NetFlow v5 packet holds 1 to 30")]
    InvalidRecordCount {
        /// The record count the caller asked for
        requested: u16,
    },
    /// Output buffer cannot hold the computed packet
    #[error("Buffer of {capacity} bytes cannot hold a {required} byte packet")]
    BufferTooSmall {
        /// Bytes the packet needs
        required: usize,
        /// Bytes the caller supplied
        capacity: usize,
    },
    /// IO operation failed
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),
    /// See [`weighted::Error`]
    #[error(transparent)]
    Weights(#[from] weighted::Error),
    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}
