//! Connection activity counters

mod counters;

pub use counters::*;
