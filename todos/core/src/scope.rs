use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::task::{ParseError, Task};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The predefined subsets the dashboard organises tasks into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Scope {
    #[default]
    Today,
    Completed,
    Pending,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::Today, Scope::Completed, Scope::Pending];

    /// `today` is the caller's local calendar date; a task is due today when
    /// its due date falls in `[local midnight, local midnight + 24h)`.
    pub fn contains(&self, task: &Task, today: NaiveDate) -> bool {
        match self {
            Scope::Today => task.due_date == Some(today),
            Scope::Completed => task.completed,
            Scope::Pending => !task.completed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Today => "today",
            Scope::Completed => "completed",
            Scope::Pending => "pending",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Scope::Today => "Today's Todos",
            Scope::Completed => "Completed",
            Scope::Pending => "Pending",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scope::ALL
            .into_iter()
            .find(|scope| scope.as_str() == s.trim())
            .ok_or_else(|| ParseError::UnknownScope(s.to_string()))
    }
}

/// Number of tasks per scope, used for tab labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScopeCounts {
    pub today: usize,
    pub completed: usize,
    pub pending: usize,
}

/// One owner's tasks split into the three scopes, each in input order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Scoped {
    pub today: Vec<Task>,
    pub completed: Vec<Task>,
    pub pending: Vec<Task>,
}

impl Scoped {
    pub fn partition(tasks: &[Task], today: NaiveDate) -> Self {
        let pick = |scope: Scope| -> Vec<Task> {
            tasks
                .iter()
                .filter(|task| scope.contains(task, today))
                .cloned()
                .collect()
        };
        Self {
            today: pick(Scope::Today),
            completed: pick(Scope::Completed),
            pending: pick(Scope::Pending),
        }
    }

    pub fn get(&self, scope: Scope) -> &[Task] {
        match scope {
            Scope::Today => &self.today,
            Scope::Completed => &self.completed,
            Scope::Pending => &self.pending,
        }
    }

    pub fn counts(&self) -> ScopeCounts {
        ScopeCounts {
            today: self.today.len(),
            completed: self.completed.len(),
            pending: self.pending.len(),
        }
    }

    /// Distinct categories across all three scopes.
    pub fn categories(&self) -> Vec<String> {
        available_categories(
            self.today
                .iter()
                .chain(self.completed.iter())
                .chain(self.pending.iter()),
        )
    }
}

/// Distinct, non-empty categories of `tasks`, sorted lexicographically.
pub fn available_categories<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Vec<String> {
    tasks
        .into_iter()
        .filter_map(|task| task.category.as_deref())
        .map(str::trim)
        .filter(|category| !category.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
