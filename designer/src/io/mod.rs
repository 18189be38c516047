//! I/O helpers for designer commands.

pub mod backend;
pub mod config;
pub mod primer_blast;
pub mod report;
pub mod targets;
pub mod throttle;
