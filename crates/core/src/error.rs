use uuid::Uuid;

use crate::task::Stage;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid transition for task {id}: {from} -> {to}")]
    InvalidTransition { id: Uuid, from: Stage, to: Stage },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a `NotFound` keyed by a UUID.
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
