//! Analysis modules.
//!
//! Statistics and insights computed over a window of journal records.

pub mod aggregator;

pub use aggregator::*;
