//! Core domain models and view-model logic for the todo dashboard.
//!
//! Nothing in this crate performs I/O. Persistence is reached through the
//! [`TaskStore`] trait, which the server implements over its database.
pub mod form;
pub mod scope;
pub mod store;
pub mod task;
pub mod view;

pub use form::{AssignDraft, FormErrors, NewTask, TaskDraft};
pub use scope::{Scope, ScopeCounts, Scoped, available_categories};
pub use store::{BulkAction, Dashboard, Notice, NoticeLevel, StoreError, TaskStore};
pub use task::{Account, AccountId, ParseError, Priority, Task, TaskId};
pub use view::{Action, Filter, SortKey, ViewState};
