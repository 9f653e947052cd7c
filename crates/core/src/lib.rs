pub mod backend;
pub mod batch;
pub mod error;
pub mod gallery;
pub mod progress;
pub mod task;
pub mod types;
