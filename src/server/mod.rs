//! HTTP surface for the affinity engine.
//!
//! A thin JSON layer for the chat-dispatch and admin tooling. Each route
//! forwards to one [`crate::engine::AffinityEngine`] operation.

pub mod routes;

pub use routes::{app_router, AppState};
