use crate::auth::CurrentUser;
use crate::todo::web::{TodoState, today};
use crate::todo::{DbTaskStore, TodoService};
use crate::web::api::ServerErrorResponse;
use axum::{
    Extension, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use todos_core::{
    Action, BulkAction, Dashboard, Filter, FormErrors, Priority, Scope, SortKey, Task, TaskDraft,
    TaskStore, ViewState,
};
use utoipa::{IntoParams, ToSchema};

/// JSON representation of a todo for API responses.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TodoJson {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    /// Due date as `YYYY-MM-DD`
    pub due_date: Option<String>,
    pub category: Option<String>,
    /// One of `low`, `medium`, `high`, or null
    pub priority: Option<String>,
    /// RFC 3339 creation timestamp
    pub created_at: String,
}

impl From<Task> for TodoJson {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            title: task.title,
            description: task.description,
            completed: task.completed,
            due_date: task.due_date.map(|date| date.format("%Y-%m-%d").to_string()),
            category: task.category,
            priority: task.priority.map(|p| p.as_str().to_string()),
            created_at: task.created_at.to_rfc3339(),
        }
    }
}

/// Number of todos in each scope, before filters are applied.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScopeCountsJson {
    pub today: usize,
    pub completed: usize,
    pub pending: usize,
}

/// API response for listing todos.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TodosResponse {
    /// Filtered and sorted todos of the requested scope
    pub todos: Vec<TodoJson>,
    pub count: usize,
    /// Categories present in any scope, sorted
    pub categories: Vec<String>,
    pub counts: ScopeCountsJson,
}

/// Query parameters for listing todos. Unknown values fall back to defaults.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(default)]
pub struct TodosQuery {
    /// `today` (default), `completed` or `pending`
    pub scope: Option<String>,
    /// Case-insensitive search over title and description
    pub q: Option<String>,
    /// Exact category, or `all`
    pub category: Option<String>,
    /// `low`, `medium`, `high`, `none` or `all`
    pub priority: Option<String>,
    /// Sort key such as `created_desc` or `title_asc`
    pub sort: Option<String>,
}

impl TodosQuery {
    fn scope(&self) -> Scope {
        self.scope
            .as_deref()
            .and_then(|scope| scope.parse().ok())
            .unwrap_or_default()
    }

    fn view_state(&self) -> ViewState {
        let priority = self
            .priority
            .as_deref()
            .map(Filter::<Option<Priority>>::from_param)
            .and_then(Result::ok)
            .unwrap_or_default();
        let sort_key = self
            .sort
            .as_deref()
            .and_then(|sort| sort.parse::<SortKey>().ok())
            .unwrap_or_default();

        ViewState::new()
            .with(Action::SetSearch(self.q.clone().unwrap_or_default()))
            .with(Action::SetCategory(Filter::<String>::from_param(
                self.category.as_deref().unwrap_or_default(),
            )))
            .with(Action::SetPriority(priority))
            .with(Action::SetSort(sort_key))
    }
}

/// JSON request payload for creating a todo.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct CreateTodoRequest {
    pub title: String,
    pub description: Option<String>,
    /// `YYYY-MM-DD`
    pub due_date: Option<String>,
    pub category: Option<String>,
    /// `low`, `medium`, `high` or `none`
    pub priority: Option<String>,
}

impl From<CreateTodoRequest> for TaskDraft {
    fn from(request: CreateTodoRequest) -> Self {
        TaskDraft {
            title: request.title,
            description: request.description.unwrap_or_default(),
            due_date: request.due_date.unwrap_or_default(),
            category: request.category.unwrap_or_default(),
            priority: request.priority.unwrap_or_default(),
        }
    }
}

/// Field validation failures.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidationErrorResponse {
    pub error: String,
    pub messages: Vec<String>,
}

impl From<FormErrors> for ValidationErrorResponse {
    fn from(errors: FormErrors) -> Self {
        Self {
            error: "VALIDATION_FAILED".to_string(),
            messages: errors.messages().into_iter().map(str::to_string).collect(),
        }
    }
}

/// JSON request payload for a bulk action.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkRequest {
    /// `delete`, `complete` or `uncomplete`
    pub action: String,
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BulkResponse {
    pub affected: u64,
}

fn server_error(message: &str) -> (StatusCode, Json<ServerErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ServerErrorResponse::new(message.to_string())),
    )
}

/// Handler for GET /api/v1/todos - Returns the caller's todos of one scope.
#[tracing::instrument(skip(state, user), fields(user = %user.id))]
#[utoipa::path(
    get,
    path = "/api/v1/todos",
    params(TodosQuery),
    responses(
        (status = 200, description = "Successfully retrieved todos", body = TodosResponse),
        (status = 401, description = "Not logged in", body = crate::auth::api::v1::ErrorResponse),
        (status = 500, description = "Internal server error", body = ServerErrorResponse)
    ),
    tag = "Todos"
)]
pub async fn get_todos_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<TodosQuery>,
) -> Result<Json<TodosResponse>, (StatusCode, Json<ServerErrorResponse>)> {
    let store = DbTaskStore::new(state.db.clone());
    let dashboard = Dashboard::load(&store, &user.id, query.view_state())
        .await
        .map_err(|err| {
            tracing::error!("Failed to get todos: {}", err);
            server_error("Failed to retrieve todos")
        })?;

    let today = today();
    let counts = dashboard.scoped(today).counts();
    let todos: Vec<TodoJson> = dashboard
        .visible(query.scope(), today)
        .into_iter()
        .map(TodoJson::from)
        .collect();

    Ok(Json(TodosResponse {
        count: todos.len(),
        todos,
        categories: dashboard.categories(today),
        counts: ScopeCountsJson {
            today: counts.today,
            completed: counts.completed,
            pending: counts.pending,
        },
    }))
}

/// Handler for POST /api/v1/todos - Creates a todo for the caller.
#[tracing::instrument(skip(state, user, request), fields(user = %user.id))]
#[utoipa::path(
    post,
    path = "/api/v1/todos",
    request_body = CreateTodoRequest,
    responses(
        (status = 201, description = "Todo created", body = TodoJson),
        (status = 422, description = "Invalid input", body = ValidationErrorResponse),
        (status = 500, description = "Internal server error", body = ServerErrorResponse)
    ),
    tag = "Todos"
)]
pub async fn create_todo_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<CreateTodoRequest>,
) -> Response {
    let new_task = match TaskDraft::from(request).validate() {
        Ok(new_task) => new_task,
        Err(errors) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ValidationErrorResponse::from(errors)),
            )
                .into_response();
        }
    };

    match TodoService::new(&state.db)
        .create_todo(&user.id, new_task)
        .await
    {
        Ok(task) => (StatusCode::CREATED, Json(TodoJson::from(task))).into_response(),
        Err(err) => {
            tracing::error!("Failed to create todo: {}", err);
            server_error("Failed to create todo").into_response()
        }
    }
}

/// Handler for POST /api/v1/todos/bulk - Applies one action to several todos.
///
/// All ids must belong to the caller. Otherwise nothing is changed.
#[tracing::instrument(skip(state, user), fields(user = %user.id))]
#[utoipa::path(
    post,
    path = "/api/v1/todos/bulk",
    request_body = BulkRequest,
    responses(
        (status = 200, description = "Every todo was updated", body = BulkResponse),
        (status = 400, description = "Unknown action", body = ServerErrorResponse),
        (status = 404, description = "Some todos were not found, nothing changed", body = ServerErrorResponse),
        (status = 500, description = "Internal server error", body = ServerErrorResponse)
    ),
    tag = "Todos"
)]
pub async fn bulk_todos_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<BulkRequest>,
) -> Result<Json<BulkResponse>, (StatusCode, Json<ServerErrorResponse>)> {
    let action: BulkAction = request.action.parse().map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ServerErrorResponse::new(format!(
                "Unknown bulk action '{}'",
                request.action
            ))),
        )
    })?;

    let store = DbTaskStore::new(state.db.clone());
    let result = match action {
        BulkAction::Delete => store.delete_tasks(&user.id, &request.ids).await,
        BulkAction::Complete => store.set_completed(&user.id, &request.ids, true).await,
        BulkAction::Uncomplete => store.set_completed(&user.id, &request.ids, false).await,
    };

    match result {
        Ok(affected) => Ok(Json(BulkResponse { affected })),
        Err(todos_core::StoreError::PartialBatch { .. }) => Err((
            StatusCode::NOT_FOUND,
            Json(ServerErrorResponse::new(
                "Some todos were not found, nothing was changed".to_string(),
            )),
        )),
        Err(err) => {
            tracing::error!("Bulk {} failed: {}", action, err);
            Err(server_error(action.failure_message()))
        }
    }
}

/// Creates and returns the todos API router.
pub fn create_api_router(state: Arc<TodoState>) -> Router {
    Router::new()
        .route("/todos", get(get_todos_handler).post(create_todo_handler))
        .route("/todos/bulk", post(bulk_todos_handler))
        .with_state(state)
}
