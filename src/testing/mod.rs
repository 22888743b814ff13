//! Testing utilities
//!
//! Handlers that record callbacks instead of printing them, so the harness
//! can be exercised without inspecting process output.

pub mod mocks;

pub use mocks::*;
