//! Two-level result of a best-effort batch (one item per marker or clip).

use serde::Serialize;

/// Result of processing one item of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome<T> {
    Succeeded { index: u32, value: T },
    Failed { index: u32, error: String },
}

impl<T> ItemOutcome<T> {
    pub fn index(&self) -> u32 {
        match self {
            ItemOutcome::Succeeded { index, .. } | ItemOutcome::Failed { index, .. } => *index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Succeeded { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallOutcome {
    /// Every item succeeded
    Complete,
    /// At least one item succeeded and at least one failed
    Partial,
    /// No item succeeded
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome<T> {
    pub overall: OverallOutcome,
    pub items: Vec<ItemOutcome<T>>,
}

impl<T> BatchOutcome<T> {
    /// Summarize items. An empty batch counts as failed.
    pub fn from_items(items: Vec<ItemOutcome<T>>) -> Self {
        let succeeded = items.iter().filter(|i| i.is_success()).count();
        let overall = if succeeded == 0 {
            OverallOutcome::Failed
        } else if succeeded == items.len() {
            OverallOutcome::Complete
        } else {
            OverallOutcome::Partial
        };
        Self { overall, items }
    }

    pub fn has_successes(&self) -> bool {
        self.overall != OverallOutcome::Failed
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &T> {
        self.items.iter().filter_map(|item| match item {
            ItemOutcome::Succeeded { value, .. } => Some(value),
            ItemOutcome::Failed { .. } => None,
        })
    }

    /// Successful values, in item order.
    pub fn into_succeeded(self) -> Vec<T> {
        self.items
            .into_iter()
            .filter_map(|item| match item {
                ItemOutcome::Succeeded { value, .. } => Some(value),
                ItemOutcome::Failed { .. } => None,
            })
            .collect()
    }

    pub fn failed_count(&self) -> usize {
        self.items.iter().filter(|i| !i.is_success()).count()
    }
}
