//! Backend adapters and image hosts for the generation orchestrator.
//!
//! Provides the hosted prediction client (submit + poll), a configurable
//! mock backend, a placeholder fallback wrapper, and the hosts that persist
//! produced images.

pub mod api;
pub mod fallback;
pub mod host;
pub mod mock;
pub mod prediction;
