//! Token ring model and partition planning

mod splitter;
mod token;

pub use splitter::{Partition, RingEntry, TokenRangeSplitter};
pub use token::{Token, TokenRange, RING_SPAN};
