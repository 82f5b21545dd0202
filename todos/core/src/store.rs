//! The persistence boundary and the "mutate, then reload" controller.
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::scope::{Scope, Scoped};
use crate::task::{AccountId, ParseError, Task, TaskId};
use crate::view::{Action, ViewState};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Failure reported by the persistence collaborator. A batched call either
/// succeeds for every id or fails as a whole.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Storage backend rejected the request: {0}")]
    Backend(String),
    #[error("Batch touched {affected} of {requested} todos")]
    PartialBatch { requested: usize, affected: usize },
}

/// Persistence operations the dashboard needs. Implemented by the server over
/// its database and by fakes in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Loads every task of `owner`, newest first.
    async fn list_tasks(&self, owner: &str) -> Result<Vec<Task>, StoreError>;

    /// Deletes all `ids` owned by `owner` in one request.
    async fn delete_tasks(&self, owner: &str, ids: &[TaskId]) -> Result<u64, StoreError>;

    /// Sets `completed` on all `ids` owned by `owner` in one request.
    async fn set_completed(
        &self,
        owner: &str,
        ids: &[TaskId],
        completed: bool,
    ) -> Result<u64, StoreError>;
}

/// An operation applied to every selected task at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BulkAction {
    Delete,
    Complete,
    Uncomplete,
}

impl BulkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkAction::Delete => "delete",
            BulkAction::Complete => "complete",
            BulkAction::Uncomplete => "uncomplete",
        }
    }

    fn past_tense(&self) -> &'static str {
        match self {
            BulkAction::Delete => "Deleted",
            BulkAction::Complete => "Marked complete:",
            BulkAction::Uncomplete => "Marked incomplete:",
        }
    }

    pub fn failure_message(&self) -> &'static str {
        match self {
            BulkAction::Delete => "Failed to delete todos",
            BulkAction::Complete => "Failed to mark todos complete",
            BulkAction::Uncomplete => "Failed to mark todos incomplete",
        }
    }
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BulkAction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "delete" => Ok(BulkAction::Delete),
            "complete" => Ok(BulkAction::Complete),
            "uncomplete" => Ok(BulkAction::Uncomplete),
            other => Err(ParseError::UnknownBulkAction(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// A transient message shown once after a user action.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

fn count_label(count: u64) -> String {
    if count == 1 {
        "1 todo".to_string()
    } else {
        format!("{count} todos")
    }
}

/// One owner's tasks plus the view state applied to them.
///
/// The local list is never patched in place: every successful mutation is
/// followed by [`Dashboard::reload`], and a failed one leaves both the list
/// and the selection as they were.
#[derive(Debug, Clone)]
pub struct Dashboard {
    owner: AccountId,
    tasks: Vec<Task>,
    pub view: ViewState,
}

impl Dashboard {
    /// Builds a dashboard from an already loaded list.
    pub fn new(owner: impl Into<AccountId>, tasks: Vec<Task>, view: ViewState) -> Self {
        Self {
            owner: owner.into(),
            tasks,
            view,
        }
    }

    #[tracing::instrument(skip(store))]
    pub async fn load<S>(store: &S, owner: &str, view: ViewState) -> Result<Self, StoreError>
    where
        S: TaskStore + ?Sized,
    {
        let tasks = store.list_tasks(owner).await?;
        Ok(Self::new(owner, tasks, view))
    }

    /// Replaces the local list with the authoritative one.
    pub async fn reload<S>(&mut self, store: &S) -> Result<(), StoreError>
    where
        S: TaskStore + ?Sized,
    {
        self.tasks = store.list_tasks(&self.owner).await?;
        Ok(())
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn scoped(&self, today: NaiveDate) -> Scoped {
        Scoped::partition(&self.tasks, today)
    }

    /// Filtered and sorted tasks of one scope.
    pub fn visible(&self, scope: Scope, today: NaiveDate) -> Vec<Task> {
        let in_scope: Vec<Task> = self
            .tasks
            .iter()
            .filter(|task| scope.contains(task, today))
            .cloned()
            .collect();
        self.view.visible(&in_scope).into_iter().cloned().collect()
    }

    pub fn categories(&self, today: NaiveDate) -> Vec<String> {
        self.scoped(today).categories()
    }

    /// Runs `action` on the current selection as one batched request.
    ///
    /// Returns exactly one notice. On failure the task list and the selection
    /// are left untouched so the user can retry.
    #[tracing::instrument(skip(self, store), fields(owner = %self.owner, selected = self.view.selection.len()))]
    pub async fn run_bulk<S>(&mut self, store: &S, action: BulkAction) -> Notice
    where
        S: TaskStore + ?Sized,
    {
        let ids = self.view.selected_ids();
        if ids.is_empty() {
            return Notice::info("No todos selected");
        }

        let result = match action {
            BulkAction::Delete => store.delete_tasks(&self.owner, &ids).await,
            BulkAction::Complete => store.set_completed(&self.owner, &ids, true).await,
            BulkAction::Uncomplete => store.set_completed(&self.owner, &ids, false).await,
        };

        let affected = match result {
            Ok(affected) => affected,
            Err(err) => {
                tracing::error!("Bulk {} failed: {}", action, err);
                return Notice::error(action.failure_message());
            }
        };

        self.view.update(Action::ClearSelection);
        if let Err(err) = self.reload(store).await {
            tracing::error!("Failed to reload todos after bulk {}: {}", action, err);
            return Notice::error("Failed to reload todos");
        }

        tracing::info!("Bulk {} touched {} todos", action, affected);
        Notice::success(format!("{} {}", action.past_tense(), count_label(affected)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::tests::task;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    fn two_tasks() -> Vec<Task> {
        vec![task("t1", "One", 1), task("t2", "Two", 2)]
    }

    fn selecting(ids: &[&str]) -> ViewState {
        ViewState::new().with(Action::SelectAll(ids.iter().map(|id| id.to_string()).collect()))
    }

    #[tokio::test]
    async fn bulk_delete_clears_selection_and_reloads() {
        let mut store = MockTaskStore::new();
        store
            .expect_delete_tasks()
            .withf(|owner, ids| owner == "owner" && ids.len() == 2 && ids[0] == "t1" && ids[1] == "t2")
            .times(1)
            .returning(|_, ids| Ok(ids.len() as u64));
        store
            .expect_list_tasks()
            .withf(|owner| owner == "owner")
            .times(1)
            .returning(|_| Ok(vec![task("t3", "Three", 3)]));

        let mut dashboard = Dashboard::new("owner", two_tasks(), selecting(&["t1", "t2"]));
        let notice = dashboard.run_bulk(&store, BulkAction::Delete).await;

        assert_eq!(notice, Notice::success("Deleted 2 todos"));
        assert!(dashboard.view.selection.is_empty());
        let remaining: Vec<&str> = dashboard.tasks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(remaining, vec!["t3"]);
    }

    #[tokio::test]
    async fn failed_bulk_complete_keeps_list_and_selection() {
        let mut store = MockTaskStore::new();
        store
            .expect_set_completed()
            .withf(|_, ids, completed| ids.len() == 2 && *completed)
            .times(1)
            .returning(|_, _, _| Err(StoreError::Backend("connection reset".to_string())));
        store.expect_list_tasks().never();

        let mut dashboard = Dashboard::new("owner", two_tasks(), selecting(&["t1", "t2"]));
        let before = dashboard.tasks().to_vec();
        let notice = dashboard.run_bulk(&store, BulkAction::Complete).await;

        assert_eq!(notice, Notice::error("Failed to mark todos complete"));
        assert!(notice.is_error());
        assert_eq!(dashboard.tasks(), before.as_slice());
        assert_eq!(dashboard.view.selected_ids(), vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn partial_batch_is_reported_as_failure() {
        let mut store = MockTaskStore::new();
        store
            .expect_delete_tasks()
            .times(1)
            .returning(|_, ids| {
                Err(StoreError::PartialBatch {
                    requested: ids.len(),
                    affected: 1,
                })
            });

        let mut dashboard = Dashboard::new("owner", two_tasks(), selecting(&["t1", "missing"]));
        let notice = dashboard.run_bulk(&store, BulkAction::Delete).await;

        assert_eq!(notice, Notice::error("Failed to delete todos"));
        assert_eq!(dashboard.view.selection.len(), 2);
    }

    #[tokio::test]
    async fn empty_selection_sends_no_request() {
        let mut store = MockTaskStore::new();
        store.expect_delete_tasks().never();
        store.expect_set_completed().never();
        store.expect_list_tasks().never();

        let mut dashboard = Dashboard::new("owner", two_tasks(), ViewState::new());
        let notice = dashboard.run_bulk(&store, BulkAction::Uncomplete).await;

        assert_eq!(notice, Notice::info("No todos selected"));
    }

    #[tokio::test]
    async fn hidden_selected_tasks_are_still_targeted() {
        let mut store = MockTaskStore::new();
        store
            .expect_set_completed()
            .withf(|_, ids, completed| ids.len() == 1 && ids[0] == "t1" && !*completed)
            .times(1)
            .returning(|_, _, _| Ok(1));
        store.expect_list_tasks().returning(|_| Ok(two_tasks()));

        let view = selecting(&["t1"]).with(Action::SetSearch("two".to_string()));
        let mut dashboard = Dashboard::new("owner", two_tasks(), view);
        assert!(
            dashboard
                .visible(Scope::Pending, today())
                .iter()
                .all(|t| t.id != "t1")
        );

        let notice = dashboard.run_bulk(&store, BulkAction::Uncomplete).await;

        assert_eq!(notice, Notice::success("Marked incomplete: 1 todo"));
    }

    #[tokio::test]
    async fn reload_failure_after_success_is_reported() {
        let mut store = MockTaskStore::new();
        store.expect_delete_tasks().returning(|_, _| Ok(1));
        store
            .expect_list_tasks()
            .returning(|_| Err(StoreError::Backend("timeout".to_string())));

        let mut dashboard = Dashboard::new("owner", two_tasks(), selecting(&["t1"]));
        let notice = dashboard.run_bulk(&store, BulkAction::Delete).await;

        assert_eq!(notice, Notice::error("Failed to reload todos"));
        assert!(dashboard.view.selection.is_empty());
        assert_eq!(dashboard.tasks().len(), 2);
    }

    #[tokio::test]
    async fn can_load_and_derive_scopes() {
        let mut store = MockTaskStore::new();
        store.expect_list_tasks().times(1).returning(|_| {
            let mut done = task("done", "Done", 1);
            done.completed = true;
            done.category = Some("Home".to_string());
            let mut open = task("open", "Open", 2);
            open.category = Some("Work".to_string());
            Ok(vec![done, open])
        });

        let dashboard = Dashboard::load(&store, "owner", ViewState::new())
            .await
            .unwrap();

        assert_eq!(dashboard.owner(), "owner");
        assert_eq!(dashboard.categories(today()), vec!["Home", "Work"]);
        assert_eq!(dashboard.visible(Scope::Completed, today())[0].id, "done");
        assert_eq!(dashboard.visible(Scope::Pending, today())[0].id, "open");
    }

    #[test]
    fn can_parse_bulk_action() {
        assert_eq!("delete".parse::<BulkAction>(), Ok(BulkAction::Delete));
        assert_eq!("complete".parse::<BulkAction>(), Ok(BulkAction::Complete));
        assert!("archive".parse::<BulkAction>().is_err());
    }
}
