//! Board-scoped label palette.
//!
//! One [`LabelRegistry`] is created per board session and handed to every
//! component that renders or edits labels. Cloning the registry clones the
//! handle, not the palette: all clones see the same labels. The palette is
//! dropped with the last handle when the board session ends.

use std::sync::Arc;

use parking_lot::RwLock;

use super::BoardError;

/// Fallback color for labels created without one.
pub const DEFAULT_LABEL_COLOR: &str = "#9e9e9e";

/// A named, colored tag that tasks refer to by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    /// Display name; unique per board, compared case-insensitively.
    pub name: String,
    /// CSS-style color string.
    pub color: String,
}

/// Shared handle to the board's label palette.
#[derive(Debug, Clone, Default)]
pub struct LabelRegistry {
    labels: Arc<RwLock<Vec<Label>>>,
}

impl LabelRegistry {
    /// Creates an empty palette.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a label. `color` falls back to [`DEFAULT_LABEL_COLOR`].
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::LabelNameEmpty`] for a blank name, or
    /// [`BoardError::LabelExists`] if the name is taken (case-insensitive).
    pub fn add(&self, name: &str, color: Option<&str>) -> Result<Label, BoardError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BoardError::LabelNameEmpty);
        }
        let mut labels = self.labels.write();
        if labels.iter().any(|l| l.name.eq_ignore_ascii_case(name)) {
            return Err(BoardError::LabelExists(name.to_string()));
        }
        let label = Label {
            name: name.to_string(),
            color: color.unwrap_or(DEFAULT_LABEL_COLOR).to_string(),
        };
        labels.push(label.clone());
        drop(labels);
        tracing::debug!(label = %label.name, "label added");
        Ok(label)
    }

    /// Finds a label by name, ignoring ASCII case.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Label> {
        self.labels
            .read()
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Resolves a task's label names, skipping names not in the palette.
    #[must_use]
    pub fn resolve(&self, names: &[String]) -> Vec<Label> {
        names.iter().filter_map(|n| self.lookup(n)).collect()
    }

    /// All labels in insertion order.
    #[must_use]
    pub fn all(&self) -> Vec<Label> {
        self.labels.read().clone()
    }

    /// Number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.read().len()
    }

    /// True if the palette is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.read().is_empty()
    }
}
