use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use todos_core::{NewTask, Priority, StoreError, Task, TaskId, TaskStore};

use crate::entities::*;

pub mod api;
pub mod web;

/// Error type for TodoService operations.
#[derive(Debug, thiserror::Error)]
pub enum TodoServiceError {
    /// The todo does not exist or belongs to another account.
    #[error("Todo {0} not found")]
    TodoNotFound(TaskId),
    /// A batched operation matched fewer rows than ids were requested and was rolled back.
    #[error("Batch touched {affected} of {requested} todos and was rolled back")]
    PartialBatch { requested: usize, affected: usize },
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl From<todo::Model> for Task {
    fn from(model: todo::Model) -> Self {
        let priority = model
            .priority
            .as_deref()
            .and_then(|p| Priority::parse_optional(p).ok())
            .flatten();
        Task {
            id: model.id,
            owner_id: model.owner_id,
            title: model.title,
            description: model.description,
            completed: model.completed,
            due_date: model.due_date,
            category: model.category,
            priority,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

fn unique_ids(ids: &[TaskId]) -> Vec<TaskId> {
    ids.iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub struct TodoService<'a> {
    db: &'a DatabaseConnection,
}

impl TodoService<'_> {
    pub fn new(db: &DatabaseConnection) -> TodoService<'_> {
        TodoService { db }
    }

    /// Retrieves every todo of `owner_id`, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_todos(&self, owner_id: &str) -> Result<Vec<Task>, TodoServiceError> {
        let todos = todo::Entity::find()
            .filter(todo::Column::OwnerId.eq(owner_id))
            .order_by_desc(todo::Column::CreatedAt)
            .all(self.db)
            .await?
            .into_iter()
            .map(Task::from)
            .collect();
        Ok(todos)
    }

    /// Retrieves one todo, only if it belongs to `owner_id`.
    #[tracing::instrument(skip(self))]
    pub async fn get_todo(&self, owner_id: &str, id: &str) -> Result<Task, TodoServiceError> {
        Ok(Task::from(self.find_owned(owner_id, id).await?))
    }

    /// Creates a todo owned by `owner_id`.
    ///
    /// # Arguments
    ///
    /// * `owner_id` - Account the todo belongs to. This is the assignee when an admin assigns it.
    /// * `new_task` - Already validated fields.
    ///
    /// # Returns
    ///
    /// A `Result` containing the created `Task` if successful, or an error otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn create_todo(
        &self,
        owner_id: &str,
        new_task: NewTask,
    ) -> Result<Task, TodoServiceError> {
        let now = Utc::now();
        let active_model = todo::ActiveModel {
            id: ActiveValue::Set(uuid::Uuid::new_v4().to_string()),
            owner_id: ActiveValue::Set(owner_id.to_string()),
            title: ActiveValue::Set(new_task.title),
            description: ActiveValue::Set(new_task.description),
            completed: ActiveValue::Set(false),
            due_date: ActiveValue::Set(new_task.due_date),
            category: ActiveValue::Set(new_task.category),
            priority: ActiveValue::Set(new_task.priority.map(|p| p.as_str().to_string())),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
        };
        Ok(Task::from(active_model.insert(self.db).await?))
    }

    /// Replaces the editable fields of a todo. Completion is left as it is.
    #[tracing::instrument(skip(self))]
    pub async fn update_todo(
        &self,
        owner_id: &str,
        id: &str,
        new_task: NewTask,
    ) -> Result<Task, TodoServiceError> {
        let model = self.find_owned(owner_id, id).await?;
        let mut active_model: todo::ActiveModel = model.into();
        active_model.title = ActiveValue::Set(new_task.title);
        active_model.description = ActiveValue::Set(new_task.description);
        active_model.due_date = ActiveValue::Set(new_task.due_date);
        active_model.category = ActiveValue::Set(new_task.category);
        active_model.priority = ActiveValue::Set(new_task.priority.map(|p| p.as_str().to_string()));
        active_model.updated_at = ActiveValue::Set(Utc::now());
        Ok(Task::from(active_model.update(self.db).await?))
    }

    /// Flips the completion flag of one todo.
    #[tracing::instrument(skip(self))]
    pub async fn toggle_todo(&self, owner_id: &str, id: &str) -> Result<Task, TodoServiceError> {
        let model = self.find_owned(owner_id, id).await?;
        let completed = !model.completed;
        let mut active_model: todo::ActiveModel = model.into();
        active_model.completed = ActiveValue::Set(completed);
        active_model.updated_at = ActiveValue::Set(Utc::now());
        Ok(Task::from(active_model.update(self.db).await?))
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_todo(&self, owner_id: &str, id: &str) -> Result<Task, TodoServiceError> {
        let model = self.find_owned(owner_id, id).await?;
        let deleted = Task::from(model.clone());
        todo::Entity::delete_by_id(model.id).exec(self.db).await?;
        Ok(deleted)
    }

    /// Deletes several todos in one transaction.
    ///
    /// Either every id is deleted or none is: when any id is unknown or owned
    /// by someone else the transaction is rolled back.
    ///
    /// # Returns
    ///
    /// The number of deleted todos.
    #[tracing::instrument(skip(self))]
    pub async fn delete_todos(&self, owner_id: &str, ids: &[TaskId]) -> Result<u64, TodoServiceError> {
        let ids = unique_ids(ids);
        if ids.is_empty() {
            return Ok(0);
        }
        let requested = ids.len();

        let txn = self.db.begin().await?;
        let result = todo::Entity::delete_many()
            .filter(todo::Column::OwnerId.eq(owner_id))
            .filter(todo::Column::Id.is_in(ids))
            .exec(&txn)
            .await?;
        Self::finish_batch(txn, requested, result.rows_affected).await
    }

    /// Sets the completion flag on several todos in one transaction, with the
    /// same all-or-nothing rule as [`TodoService::delete_todos`].
    #[tracing::instrument(skip(self))]
    pub async fn set_completed(
        &self,
        owner_id: &str,
        ids: &[TaskId],
        completed: bool,
    ) -> Result<u64, TodoServiceError> {
        let ids = unique_ids(ids);
        if ids.is_empty() {
            return Ok(0);
        }
        let requested = ids.len();

        let txn = self.db.begin().await?;
        let result = todo::Entity::update_many()
            .col_expr(todo::Column::Completed, Expr::value(completed))
            .col_expr(todo::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(todo::Column::OwnerId.eq(owner_id))
            .filter(todo::Column::Id.is_in(ids))
            .exec(&txn)
            .await?;
        Self::finish_batch(txn, requested, result.rows_affected).await
    }

    async fn finish_batch(
        txn: DatabaseTransaction,
        requested: usize,
        affected: u64,
    ) -> Result<u64, TodoServiceError> {
        if affected != requested as u64 {
            txn.rollback().await?;
            tracing::warn!(
                "Rolled back batch: {} of {} todos matched",
                affected,
                requested
            );
            return Err(TodoServiceError::PartialBatch {
                requested,
                affected: affected as usize,
            });
        }
        txn.commit().await?;
        Ok(affected)
    }

    async fn find_owned(&self, owner_id: &str, id: &str) -> Result<todo::Model, TodoServiceError> {
        todo::Entity::find_by_id(id.to_string())
            .filter(todo::Column::OwnerId.eq(owner_id))
            .one(self.db)
            .await?
            .ok_or_else(|| TodoServiceError::TodoNotFound(id.to_string()))
    }
}

impl From<TodoServiceError> for StoreError {
    fn from(err: TodoServiceError) -> Self {
        match err {
            TodoServiceError::PartialBatch {
                requested,
                affected,
            } => StoreError::PartialBatch {
                requested,
                affected,
            },
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// [`TaskStore`] over the application database.
#[derive(Clone, Debug)]
pub struct DbTaskStore {
    db: Arc<DatabaseConnection>,
}

impl DbTaskStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaskStore for DbTaskStore {
    async fn list_tasks(&self, owner: &str) -> Result<Vec<Task>, StoreError> {
        Ok(TodoService::new(&self.db).list_todos(owner).await?)
    }

    async fn delete_tasks(&self, owner: &str, ids: &[TaskId]) -> Result<u64, StoreError> {
        Ok(TodoService::new(&self.db).delete_todos(owner, ids).await?)
    }

    async fn set_completed(
        &self,
        owner: &str,
        ids: &[TaskId],
        completed: bool,
    ) -> Result<u64, StoreError> {
        Ok(TodoService::new(&self.db)
            .set_completed(owner, ids, completed)
            .await?)
    }
}
