//! Host-facing contract and stdio bridge for native overlay shells.

pub mod channel;
pub mod contract;
pub mod stdio;
