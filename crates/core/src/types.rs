/// Identifier of a single generation/edit task. Generated at submission.
pub type TaskId = uuid::Uuid;

/// Identifier of a batch of tasks.
pub type BatchId = uuid::Uuid;

/// Identifier of a gallery item, independent of the task that produced it.
pub type GalleryItemId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
