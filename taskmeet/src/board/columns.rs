//! The ordered set of status columns on a board.

use taskmeet_proto::task::DEFAULT_STATUSES;

use super::BoardError;

/// Ordered, duplicate-free list of column names.
///
/// Always contains the default statuses, which cannot be removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSet {
    names: Vec<String>,
}

impl Default for ColumnSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnSet {
    /// Creates a set holding only the default statuses.
    #[must_use]
    pub fn new() -> Self {
        Self {
            names: DEFAULT_STATUSES.iter().map(ToString::to_string).collect(),
        }
    }

    /// Creates the default set followed by `extra` columns, skipping duplicates.
    #[must_use]
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for name in extra {
            set.observe(name.as_ref());
        }
        set
    }

    /// Returns true if `name` is one of the protected default statuses.
    #[must_use]
    pub fn is_protected(name: &str) -> bool {
        DEFAULT_STATUSES.contains(&name)
    }

    /// Appends a new column.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::ColumnExists`] if already present, or
    /// [`BoardError::ColumnNameEmpty`] for a blank name.
    pub fn add(&mut self, name: &str) -> Result<(), BoardError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BoardError::ColumnNameEmpty);
        }
        if self.contains(name) {
            return Err(BoardError::ColumnExists(name.to_string()));
        }
        self.names.push(name.to_string());
        Ok(())
    }

    /// Removes a non-default column.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::ProtectedColumn`] for a default status, or
    /// [`BoardError::ColumnNotFound`] if absent.
    pub fn remove(&mut self, name: &str) -> Result<(), BoardError> {
        if Self::is_protected(name) {
            return Err(BoardError::ProtectedColumn(name.to_string()));
        }
        let idx = self
            .position(name)
            .ok_or_else(|| BoardError::ColumnNotFound(name.to_string()))?;
        self.names.remove(idx);
        Ok(())
    }

    /// Adds `name` if it is not already present. Used for statuses seen on
    /// loaded tasks. Blank names are ignored.
    pub fn observe(&mut self, name: &str) {
        let name = name.trim();
        if !name.is_empty() && !self.contains(name) {
            self.names.push(name.to_string());
        }
    }

    /// Returns true if the column exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Returns the index of a column in board order.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// The first column, where tasks with a missing status land.
    #[must_use]
    pub fn first(&self) -> &str {
        self.names.first().map_or(DEFAULT_STATUSES[0], String::as_str)
    }

    /// Column names in board order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always false; the defaults cannot be removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
