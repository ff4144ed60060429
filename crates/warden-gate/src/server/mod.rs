//! HTTP surface of the gate.

pub mod routes;

pub use routes::{AppState, build_router};
