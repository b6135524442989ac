//! cvd-daemon library target.
//!
//! Exposes the router, state and read-side queries for integration tests.
//! The binary `main.rs` depends on this library target.

pub mod api_types;
pub mod query;
pub mod routes;
pub mod state;
