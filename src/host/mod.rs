//! Host-facing contract and stdio bridge for native shell integration.

pub mod contract;
pub mod stdio;
