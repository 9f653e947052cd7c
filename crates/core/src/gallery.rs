//! Capacity-bounded, insertion-ordered gallery of completed results.
//!
//! Adding beyond capacity evicts the oldest item first (FIFO). Listing
//! returns newest first.

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::task::{ImageFormat, TaskKind};
use crate::types::{GalleryItemId, TaskId, Timestamp};

/// Default number of items retained.
pub const DEFAULT_GALLERY_CAPACITY: usize = 100;

const ENTITY: &str = "GalleryItem";

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryItem {
    pub id: GalleryItemId,
    pub kind: TaskKind,
    pub prompt: String,
    pub image_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<ImageFormat>,
    /// Task that produced the item. The task may since have been evicted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub created_at: Timestamp,
}

impl GalleryItem {
    pub fn new(kind: TaskKind, prompt: impl Into<String>, image_ref: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            kind,
            prompt: prompt.into(),
            image_ref: image_ref.into(),
            format: None,
            task_id: None,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }
}

/// Filter for [`GalleryStore::list`]. All fields are optional.
#[derive(Debug, Clone, Default)]
pub struct GalleryQuery {
    pub kind: Option<TaskKind>,
    /// Case-insensitive substring of the prompt.
    pub search: Option<String>,
    pub limit: Option<usize>,
}

impl GalleryQuery {
    fn matches(&self, item: &GalleryItem, needle: Option<&str>) -> bool {
        if self.kind.is_some_and(|kind| kind != item.kind) {
            return false;
        }
        match needle {
            Some(needle) => item.prompt.to_lowercase().contains(needle),
            None => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Oldest item at the front, newest at the back.
pub struct GalleryStore {
    items: RwLock<VecDeque<GalleryItem>>,
    capacity: usize,
}

impl GalleryStore {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "gallery capacity must be at least 1");
        Self {
            items: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an item, evicting the oldest one first when full.
    ///
    /// Returns the evicted item, if any. Fails with `Conflict` if an item
    /// with the same id is already stored.
    pub fn add(&self, item: GalleryItem) -> Result<Option<GalleryItem>, CoreError> {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        if items.iter().any(|existing| existing.id == item.id) {
            return Err(CoreError::Conflict(format!(
                "Gallery item {} already exists",
                item.id
            )));
        }

        let evicted = if items.len() >= self.capacity {
            items.pop_front()
        } else {
            None
        };
        items.push_back(item);
        Ok(evicted)
    }

    /// Matching items, newest first.
    pub fn list(&self, query: &GalleryQuery) -> Vec<GalleryItem> {
        let needle = query
            .search
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        items
            .iter()
            .rev()
            .filter(|item| query.matches(item, needle.as_deref()))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: GalleryItemId) -> Result<GalleryItem, CoreError> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|item| item.id == id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(ENTITY, id))
    }

    /// Remove exactly the item with `id`. Fails with `NotFound` if absent.
    pub fn delete(&self, id: GalleryItemId) -> Result<GalleryItem, CoreError> {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        let index = items
            .iter()
            .position(|item| item.id == id)
            .ok_or_else(|| CoreError::not_found(ENTITY, id))?;
        items
            .remove(index)
            .ok_or_else(|| CoreError::Internal(format!("Gallery index {index} vanished")))
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for GalleryStore {
    fn default() -> Self {
        Self::new(DEFAULT_GALLERY_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
