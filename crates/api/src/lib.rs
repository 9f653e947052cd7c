//! Generation task orchestrator API server library.
//!
//! Exposes the core building blocks (config, state, engine, error handling,
//! routes, background jobs) so integration tests and the binary entrypoint
//! can both access them.

pub mod app;
pub mod background;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod state;
