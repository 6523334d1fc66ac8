//! Overlap module: communication links between partitions and the rules for
//! fusing ghost data across them.
//!
//! This module re-exports the [`links`] and [`delta`] submodules.

pub mod delta;
pub mod links;
pub mod perf;
