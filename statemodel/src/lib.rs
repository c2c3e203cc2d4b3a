//! Abstract state model engine for automated exploration of interactive
//! systems.
//!
//! A driver observes the system under test, reports concrete states and
//! actions, and asks which action to execute next. The engine abstracts
//! observations into a deterministic graph, records runs as sequences and
//! chooses actions with pluggable selectors. The architecture enforces a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (identity, graphs, selection,
//!   sequences). No filesystem or thread I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (configuration, persistence,
//!   trace files, replay).

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
