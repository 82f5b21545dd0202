//! Filter, sort and selection state for a list of tasks.
//!
//! [`ViewState`] is plain data. It changes only through [`ViewState::update`]
//! and is turned into the rendered list by [`ViewState::visible`].
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::task::{ParseError, Priority, Task, TaskId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Either the "all" sentinel or one exact value to match.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Filter<T> {
    All,
    Only(T),
}

impl<T> Default for Filter<T> {
    fn default() -> Self {
        Filter::All
    }
}

impl<T: PartialEq> Filter<T> {
    pub fn admits(&self, value: &T) -> bool {
        match self {
            Filter::All => true,
            Filter::Only(wanted) => wanted == value,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Filter::All)
    }
}

impl Filter<String> {
    /// `""` and `"all"` select every category, anything else is an exact match.
    pub fn from_param(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed == "all" {
            Filter::All
        } else {
            Filter::Only(trimmed.to_string())
        }
    }

    pub fn as_param(&self) -> &str {
        match self {
            Filter::All => "all",
            Filter::Only(category) => category,
        }
    }

    fn admits_category(&self, category: Option<&String>) -> bool {
        match self {
            Filter::All => true,
            Filter::Only(wanted) => category == Some(wanted),
        }
    }
}

impl Filter<Option<Priority>> {
    /// `""` and `"all"` select every task, `"none"` selects tasks without a priority.
    pub fn from_param(value: &str) -> Result<Self, ParseError> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed == "all" {
            return Ok(Filter::All);
        }
        Priority::parse_optional(trimmed).map(Filter::Only)
    }

    pub fn as_param(&self) -> &str {
        match self {
            Filter::All => "all",
            Filter::Only(None) => "none",
            Filter::Only(Some(priority)) => priority.as_str(),
        }
    }
}

/// Ordering applied to the filtered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SortKey {
    #[default]
    CreatedDesc,
    CreatedAsc,
    DueDateAsc,
    DueDateDesc,
    TitleAsc,
    TitleDesc,
    PriorityDesc,
    PriorityAsc,
}

impl SortKey {
    pub const ALL: [SortKey; 8] = [
        SortKey::CreatedDesc,
        SortKey::CreatedAsc,
        SortKey::DueDateAsc,
        SortKey::DueDateDesc,
        SortKey::TitleAsc,
        SortKey::TitleDesc,
        SortKey::PriorityDesc,
        SortKey::PriorityAsc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::CreatedDesc => "created_desc",
            SortKey::CreatedAsc => "created_asc",
            SortKey::DueDateAsc => "due_date_asc",
            SortKey::DueDateDesc => "due_date_desc",
            SortKey::TitleAsc => "title_asc",
            SortKey::TitleDesc => "title_desc",
            SortKey::PriorityDesc => "priority_desc",
            SortKey::PriorityAsc => "priority_asc",
        }
    }

    /// Human readable label for sort pickers.
    pub fn label(&self) -> &'static str {
        match self {
            SortKey::CreatedDesc => "Newest First",
            SortKey::CreatedAsc => "Oldest First",
            SortKey::DueDateAsc => "Due Date (Early)",
            SortKey::DueDateDesc => "Due Date (Late)",
            SortKey::TitleAsc => "Title (A-Z)",
            SortKey::TitleDesc => "Title (Z-A)",
            SortKey::PriorityDesc => "Priority (High)",
            SortKey::PriorityAsc => "Priority (Low)",
        }
    }

    /// Compares two tasks under this key. `Equal` means "keep input order".
    pub fn compare(&self, a: &Task, b: &Task) -> Ordering {
        match self {
            SortKey::CreatedDesc => b.created_at.cmp(&a.created_at),
            SortKey::CreatedAsc => a.created_at.cmp(&b.created_at),
            SortKey::DueDateAsc => compare_due(a.due_date, b.due_date, false),
            SortKey::DueDateDesc => compare_due(a.due_date, b.due_date, true),
            SortKey::TitleAsc => compare_title(&a.title, &b.title),
            SortKey::TitleDesc => compare_title(&b.title, &a.title),
            SortKey::PriorityDesc => Priority::rank(b.priority).cmp(&Priority::rank(a.priority)),
            SortKey::PriorityAsc => Priority::rank(a.priority).cmp(&Priority::rank(b.priority)),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s.trim())
            .ok_or_else(|| ParseError::UnknownSortKey(s.to_string()))
    }
}

// Undated tasks go last in both directions.
fn compare_due(a: Option<NaiveDate>, b: Option<NaiveDate>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) if descending => b.cmp(&a),
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// Accents are folded away for the primary comparison and only separate titles
// that are otherwise equal. Case never does.
fn compare_title(a: &str, b: &str) -> Ordering {
    let folded = |title: &str| deunicode::deunicode(title).to_lowercase();
    folded(a)
        .cmp(&folded(b))
        .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
}

/// Every way the view state can change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SetSearch(String),
    SetCategory(Filter<String>),
    SetPriority(Filter<Option<Priority>>),
    SetSort(SortKey),
    Toggle(TaskId),
    SetSelected(TaskId, bool),
    SelectAll(Vec<TaskId>),
    ClearSelection,
    /// Back to the default search, filters and sort. Selection is kept.
    ResetFilters,
}

/// User chosen filter, sort and selection for one list of tasks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ViewState {
    pub search_query: String,
    pub category: Filter<String>,
    pub priority: Filter<Option<Priority>>,
    pub sort_key: SortKey,
    pub selection: BTreeSet<TaskId>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one action. This is the only place the state is mutated.
    pub fn update(&mut self, action: Action) {
        match action {
            Action::SetSearch(query) => self.search_query = query,
            Action::SetCategory(filter) => self.category = filter,
            Action::SetPriority(filter) => self.priority = filter,
            Action::SetSort(key) => self.sort_key = key,
            Action::Toggle(id) => {
                if !self.selection.remove(&id) {
                    self.selection.insert(id);
                }
            }
            Action::SetSelected(id, true) => {
                self.selection.insert(id);
            }
            Action::SetSelected(id, false) => {
                self.selection.remove(&id);
            }
            Action::SelectAll(ids) => self.selection.extend(ids),
            Action::ClearSelection => self.selection.clear(),
            Action::ResetFilters => {
                self.search_query.clear();
                self.category = Filter::All;
                self.priority = Filter::All;
                self.sort_key = SortKey::default();
            }
        }
    }

    /// Builder style variant of [`ViewState::update`].
    pub fn with(mut self, action: Action) -> Self {
        self.update(action);
        self
    }

    /// True when the task passes the search, category and priority predicates.
    pub fn matches(&self, task: &Task) -> bool {
        self.matches_needle(task, &self.search_query.to_lowercase())
    }

    fn matches_needle(&self, task: &Task, needle: &str) -> bool {
        task.mentions(needle)
            && self.category.admits_category(task.category.as_ref())
            && self.priority.admits(&task.priority)
    }

    /// Filters `tasks` and sorts the result stably by the active key.
    pub fn visible<'a>(&self, tasks: &'a [Task]) -> Vec<&'a Task> {
        let needle = self.search_query.to_lowercase();
        let mut visible: Vec<&Task> = tasks
            .iter()
            .filter(|task| self.matches_needle(task, &needle))
            .collect();
        visible.sort_by(|a, b| self.sort_key.compare(a, b));
        visible
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selection.contains(id)
    }

    pub fn selected_ids(&self) -> Vec<TaskId> {
        self.selection.iter().cloned().collect()
    }

    pub fn has_active_filters(&self) -> bool {
        !self.search_query.is_empty() || !self.category.is_all() || !self.priority.is_all()
    }
}
