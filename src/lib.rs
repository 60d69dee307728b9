//! ringbridge - parallel token-range access to a wide-column store
//!
//! Splits a cluster's token ring into balanced partitions, reads each
//! partition as a lazy sequence of pages, converts rows between the store's
//! wire form and generic or typed rows, and writes rows back in batches,
//! creating the destination table when asked to.

pub mod codec;
pub mod config;
pub mod error;
pub mod job;
pub mod model;
pub mod output;
pub mod reader;
mod retry;
pub mod ring;
pub mod store;
pub mod writer;

pub use config::Config;
pub use error::{Error, Result, StoreError};
pub use job::Job;
pub use model::{Cell, Record, Row, Value};
