//! Side-effecting code: configuration files, persistence, traces.

pub mod config;
pub mod persistence;
pub mod replay;
pub mod trace;
