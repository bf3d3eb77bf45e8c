//! Checklist entry model.

use serde::{Deserialize, Serialize};

/// Typed view of a `todoList` record payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub text: String,
    /// Missing in very old payloads; treated as not done.
    #[serde(default)]
    pub done: bool,
}

impl TodoItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            done: false,
        }
    }

    /// Returns a copy with the completion flag flipped.
    pub fn toggled(&self) -> Self {
        Self {
            text: self.text.clone(),
            done: !self.done,
        }
    }
}
