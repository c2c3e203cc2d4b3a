//! Deterministic, pure logic of the state model.
//!
//! Core modules are free of filesystem and process side effects. They operate
//! on in-memory data structures and return deterministic outputs suitable for
//! tests; the only nondeterminism is an unseeded selector RNG.

pub mod abstraction;
pub mod concrete;
pub mod error;
pub mod events;
pub mod identity;
pub mod manager;
pub mod model;
pub mod navigable;
pub mod registry;
pub mod selector;
pub mod sequence;
pub mod types;
