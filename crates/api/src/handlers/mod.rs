pub mod batch;
pub mod gallery;
pub mod generation;
pub mod progress;

use banana_core::error::CoreError;
use banana_core::task::MAX_PROMPT_LEN;
use uuid::Uuid;

use crate::error::AppResult;

/// Prompt length bound in the integer type `validator` expects.
pub(crate) const PROMPT_MAX_LEN: u64 = MAX_PROMPT_LEN as u64;

/// Parse a path id. Anything that is not a UUID cannot name a stored
/// entity, so it is reported as `NotFound`.
pub(crate) fn parse_id(entity: &'static str, raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| {
        CoreError::NotFound {
            entity,
            id: raw.to_string(),
        }
        .into()
    })
}
