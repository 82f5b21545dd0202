use askama::Template;
use axum::{
    Router,
    extract::{Extension, Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::{Form, Query};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use todos_core::{
    Action, BulkAction, Dashboard, Filter, FormErrors, Notice, NoticeLevel, Priority, Scope,
    SortKey, StoreError, TaskDraft, ViewState,
};

use crate::auth::CurrentUser;
use crate::todo::{DbTaskStore, TodoService, TodoServiceError};

/// Event name HTMX listens for to refresh the todo table.
const TODOS_CHANGED: &str = "todos-changed";

#[derive(Clone, Debug)]
pub struct TodoState {
    pub db: Arc<sea_orm::DatabaseConnection>,
}

/// Query or form parameters describing the active scope, filters, sort and
/// selection. Unknown values fall back to the defaults.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ViewParams {
    pub scope: String,
    pub q: String,
    pub category: String,
    pub priority: String,
    pub sort: String,
    pub selected: Vec<String>,
    /// `all` selects every visible todo, `none` clears the selection.
    pub select: String,
}

impl ViewParams {
    pub fn scope(&self) -> Scope {
        self.scope.parse().unwrap_or_default()
    }

    pub fn view_state(&self) -> ViewState {
        let priority = Filter::<Option<Priority>>::from_param(&self.priority).unwrap_or_else(|err| {
            tracing::warn!("Ignoring priority filter: {}", err);
            Filter::All
        });
        let sort_key = if self.sort.trim().is_empty() {
            SortKey::default()
        } else {
            self.sort.parse().unwrap_or_else(|err| {
                tracing::warn!("Ignoring sort key: {}", err);
                SortKey::default()
            })
        };

        ViewState::new()
            .with(Action::SetSearch(self.q.clone()))
            .with(Action::SetCategory(Filter::<String>::from_param(&self.category)))
            .with(Action::SetPriority(priority))
            .with(Action::SetSort(sort_key))
            .with(Action::SelectAll(self.selected.clone()))
    }

    /// Applies the `select` shortcut against what is currently visible.
    fn apply_select(&self, dashboard: &mut Dashboard, today: NaiveDate) {
        match self.select.as_str() {
            "all" => {
                let ids = dashboard
                    .visible(self.scope(), today)
                    .into_iter()
                    .map(|task| task.id)
                    .collect();
                dashboard.view.update(Action::SelectAll(ids));
            }
            "none" => dashboard.view.update(Action::ClearSelection),
            _ => {}
        }
    }
}

/// Form body of `POST /todos/bulk`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BulkForm {
    pub action: String,
    pub scope: String,
    pub q: String,
    pub category: String,
    pub priority: String,
    pub sort: String,
    pub selected: Vec<String>,
}

impl BulkForm {
    fn view_params(&self) -> ViewParams {
        ViewParams {
            scope: self.scope.clone(),
            q: self.q.clone(),
            category: self.category.clone(),
            priority: self.priority.clone(),
            sort: self.sort.clone(),
            selected: self.selected.clone(),
            select: String::new(),
        }
    }
}

/// Custom error type for todo handler operations. Every variant is shown to
/// the user as a transient error notice.
#[derive(Debug, thiserror::Error)]
pub enum TodoWebError {
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    #[error("{message}")]
    Service {
        message: &'static str,
        #[source]
        source: TodoServiceError,
    },
    #[error("{message}")]
    Store {
        message: &'static str,
        #[source]
        source: StoreError,
    },
}

impl TodoWebError {
    fn service(message: &'static str) -> impl FnOnce(TodoServiceError) -> Self {
        move |source| TodoWebError::Service { message, source }
    }
}

impl axum::response::IntoResponse for TodoWebError {
    fn into_response(self) -> axum::response::Response {
        tracing::error!("Todo request failed: {:?}", self);
        let (status_code, user_facing_error_message) = match &self {
            TodoWebError::Service {
                source: TodoServiceError::TodoNotFound(_),
                ..
            } => (StatusCode::NOT_FOUND, "Todo not found".to_string()),
            TodoWebError::Service { message, .. } | TodoWebError::Store { message, .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
            }
            TodoWebError::Template(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An unexpected error occurred while processing your request. Please try again later."
                    .to_string(),
            ),
        };

        let notice = NoticeTemplate::new(&Notice::error(user_facing_error_message), false);
        let Ok(rendered) = notice.render() else {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        };

        let mut response = (status_code, Html(rendered)).into_response();
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("hx-retarget"),
            HeaderValue::from_static("#notice"),
        );
        headers.insert(
            HeaderName::from_static("hx-reswap"),
            HeaderValue::from_static("innerHTML"),
        );
        response.headers_mut().extend(headers);
        response
    }
}

/// Calendar date the scopes are computed against.
pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

pub(crate) fn level_name(level: NoticeLevel) -> &'static str {
    match level {
        NoticeLevel::Info => "info",
        NoticeLevel::Success => "success",
        NoticeLevel::Error => "error",
    }
}

pub(crate) struct NoticeView {
    pub level: &'static str,
    pub message: String,
}

impl From<&Notice> for NoticeView {
    fn from(notice: &Notice) -> Self {
        Self {
            level: level_name(notice.level),
            message: notice.message.clone(),
        }
    }
}

pub(crate) struct SelectOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

impl SelectOption {
    fn new(value: &str, label: &str, current: &str) -> Self {
        Self {
            value: value.to_string(),
            label: label.to_string(),
            selected: value == current,
        }
    }
}

pub(crate) fn priority_options(current: &str, any_label: Option<&str>) -> Vec<SelectOption> {
    let mut options = Vec::new();
    if let Some(label) = any_label {
        options.push(SelectOption::new("all", label, current));
    }
    for priority in Priority::ALL.iter().rev() {
        options.push(SelectOption::new(priority.as_str(), priority.label(), current));
    }
    options.push(SelectOption::new(
        if any_label.is_some() { "none" } else { "" },
        "No Priority",
        current,
    ));
    options
}

pub(crate) struct ScopeTab {
    pub value: &'static str,
    pub label: &'static str,
    pub count: usize,
    pub active: bool,
}

pub(crate) struct TodoRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub due: String,
    pub overdue: bool,
    pub category: String,
    pub priority: String,
    pub priority_label: String,
    pub selected: bool,
}

#[derive(Template)]
#[template(path = "todos/todo_table.html")]
pub(crate) struct TodoTableTemplate {
    pub base_path: String,
    pub read_only: bool,
    pub scope: &'static str,
    pub tabs: Vec<ScopeTab>,
    pub search: String,
    pub categories: Vec<SelectOption>,
    pub priorities: Vec<SelectOption>,
    pub sorts: Vec<SelectOption>,
    pub rows: Vec<TodoRow>,
    pub hidden_selected: Vec<String>,
    pub selected_count: usize,
    pub all_visible_selected: bool,
    pub has_active_filters: bool,
    pub empty_message: &'static str,
    pub notice: Option<NoticeView>,
}

impl TodoTableTemplate {
    /// Builds the table of one scope from the dashboard's current view state.
    pub(crate) fn build(
        dashboard: &Dashboard,
        scope: Scope,
        today: NaiveDate,
        base_path: String,
        read_only: bool,
        notice: Option<&Notice>,
    ) -> Self {
        let view = &dashboard.view;
        let visible = dashboard.visible(scope, today);
        let counts = dashboard.scoped(today).counts();

        let tabs = Scope::ALL
            .into_iter()
            .map(|tab| ScopeTab {
                value: tab.as_str(),
                label: tab.label(),
                count: match tab {
                    Scope::Today => counts.today,
                    Scope::Completed => counts.completed,
                    Scope::Pending => counts.pending,
                },
                active: tab == scope,
            })
            .collect();

        let current_category = view.category.as_param();
        let mut category_names = dashboard.categories(today);
        if let Filter::Only(category) = &view.category {
            if !category_names.contains(category) {
                category_names.push(category.clone());
            }
        }
        let categories = std::iter::once(SelectOption::new("all", "All Categories", current_category))
            .chain(
                category_names
                    .iter()
                    .map(|name| SelectOption::new(name, name, current_category)),
            )
            .collect();

        let sorts = SortKey::ALL
            .iter()
            .map(|key| SelectOption::new(key.as_str(), key.label(), view.sort_key.as_str()))
            .collect();

        let rows: Vec<TodoRow> = visible
            .iter()
            .map(|task| TodoRow {
                id: task.id.clone(),
                title: task.title.clone(),
                description: task.description.clone().unwrap_or_default(),
                completed: task.completed,
                due: task
                    .due_date
                    .map(|date| date.format("%b %d, %Y").to_string())
                    .unwrap_or_default(),
                overdue: !task.completed && task.due_date.is_some_and(|date| date < today),
                category: task.category.clone().unwrap_or_default(),
                priority: task.priority.map(|p| p.as_str()).unwrap_or_default().to_string(),
                priority_label: task.priority.map(|p| p.label()).unwrap_or_default().to_string(),
                selected: view.is_selected(&task.id),
            })
            .collect();

        let hidden_selected = view
            .selection
            .iter()
            .filter(|id| !visible.iter().any(|task| &&task.id == id))
            .cloned()
            .collect();

        let empty_message = if view.has_active_filters() {
            "No todos match your filters"
        } else {
            match scope {
                Scope::Today => "No todos due today",
                Scope::Completed => "No completed todos yet",
                Scope::Pending => "No pending todos",
            }
        };

        Self {
            base_path,
            read_only,
            scope: scope.as_str(),
            tabs,
            search: view.search_query.clone(),
            categories,
            priorities: priority_options(view.priority.as_param(), Some("All Priorities")),
            sorts,
            all_visible_selected: !rows.is_empty() && rows.iter().all(|row| row.selected),
            rows,
            hidden_selected,
            selected_count: view.selection.len(),
            has_active_filters: view.has_active_filters(),
            empty_message,
            notice: notice.map(NoticeView::from),
        }
    }
}

#[derive(Template)]
#[template(path = "todos/dashboard.html")]
struct DashboardTemplate {
    user_name: String,
    is_admin: bool,
    table_html: String,
}

#[derive(Template)]
#[template(path = "todos/todo_form.html")]
struct TodoFormTemplate {
    heading: &'static str,
    action: String,
    method: &'static str,
    submit_label: &'static str,
    draft: TaskDraft,
    errors: FormErrors,
    priorities: Vec<SelectOption>,
}

impl TodoFormTemplate {
    fn create(draft: TaskDraft, errors: FormErrors) -> Self {
        Self {
            heading: "Create New Todo",
            action: "/todos".to_string(),
            method: "post",
            submit_label: "Create Todo",
            priorities: priority_options(&draft.priority, None),
            draft,
            errors,
        }
    }

    fn edit(id: &str, draft: TaskDraft, errors: FormErrors) -> Self {
        Self {
            heading: "Edit Todo",
            action: format!("/todos/{}", id),
            method: "put",
            submit_label: "Save Changes",
            priorities: priority_options(&draft.priority, None),
            draft,
            errors,
        }
    }
}

#[derive(Template)]
#[template(path = "todos/notice.html")]
pub(crate) struct NoticeTemplate {
    notice: NoticeView,
    close_modal: bool,
}

impl NoticeTemplate {
    pub(crate) fn new(notice: &Notice, close_modal: bool) -> Self {
        Self {
            notice: NoticeView::from(notice),
            close_modal,
        }
    }
}

/// Renders a notice and tells the page to reload the todo table.
fn changed_response(notice: Notice, close_modal: bool) -> Result<Response, TodoWebError> {
    let html = NoticeTemplate::new(&notice, close_modal).render()?;
    let mut response = Html(html).into_response();
    response.headers_mut().insert(
        HeaderName::from_static("hx-trigger"),
        HeaderValue::from_static(TODOS_CHANGED),
    );
    Ok(response)
}

fn invalid_form_response(template: TodoFormTemplate) -> Result<Response, TodoWebError> {
    let html = template.render()?;
    let mut response = (StatusCode::UNPROCESSABLE_ENTITY, Html(html)).into_response();
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("hx-retarget"),
        HeaderValue::from_static("#todo-form"),
    );
    headers.insert(
        HeaderName::from_static("hx-reswap"),
        HeaderValue::from_static("outerHTML"),
    );
    response.headers_mut().extend(headers);
    Ok(response)
}

/// Loads the caller's dashboard for `params`. A failed load is shown as an
/// empty list with an error notice.
async fn load_dashboard(
    store: &DbTaskStore,
    owner_id: &str,
    params: &ViewParams,
    today: NaiveDate,
) -> (Dashboard, Option<Notice>) {
    let view = params.view_state();
    let mut dashboard = match Dashboard::load(store, owner_id, view.clone()).await {
        Ok(dashboard) => dashboard,
        Err(err) => {
            tracing::error!("Failed to load todos for {}: {}", owner_id, err);
            return (
                Dashboard::new(owner_id, Vec::new(), view),
                Some(Notice::error("Failed to load todos")),
            );
        }
    };
    params.apply_select(&mut dashboard, today);
    (dashboard, None)
}

/// Handler for GET /dashboard that renders the full page.
#[tracing::instrument(skip(state, user), fields(user = %user.id))]
async fn dashboard_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
    Query(params): Query<ViewParams>,
) -> Result<Html<String>, TodoWebError> {
    let store = DbTaskStore::new(state.db.clone());
    let today = today();
    let (dashboard, notice) = load_dashboard(&store, &user.id, &params, today).await;

    let table_html = TodoTableTemplate::build(
        &dashboard,
        params.scope(),
        today,
        "/todos/table".to_string(),
        false,
        notice.as_ref(),
    )
    .render()?;

    let template = DashboardTemplate {
        user_name: user.display_name().to_string(),
        is_admin: user.is_admin,
        table_html,
    };
    template.render().map(Html).map_err(TodoWebError::from)
}

/// Handler for GET /todos/table that returns just the table fragment.
#[tracing::instrument(skip(state, user), fields(user = %user.id))]
async fn todo_table_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
    Query(params): Query<ViewParams>,
) -> Result<Html<String>, TodoWebError> {
    let store = DbTaskStore::new(state.db.clone());
    let today = today();
    let (dashboard, notice) = load_dashboard(&store, &user.id, &params, today).await;

    TodoTableTemplate::build(
        &dashboard,
        params.scope(),
        today,
        "/todos/table".to_string(),
        false,
        notice.as_ref(),
    )
    .render()
    .map(Html)
    .map_err(TodoWebError::from)
}

/// Handler for POST /todos/bulk that runs one batched action on the selection
/// and returns the refreshed table with a single notice.
#[tracing::instrument(skip(state, user, form), fields(user = %user.id, action = %form.action))]
async fn bulk_action_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
    Form(form): Form<BulkForm>,
) -> Result<Html<String>, TodoWebError> {
    let store = DbTaskStore::new(state.db.clone());
    let today = today();
    let params = form.view_params();

    let mut dashboard = Dashboard::load(&store, &user.id, params.view_state())
        .await
        .map_err(|source| TodoWebError::Store {
            message: "Failed to load todos",
            source,
        })?;

    let notice = match form.action.parse::<BulkAction>() {
        Ok(action) => dashboard.run_bulk(&store, action).await,
        Err(err) => {
            tracing::warn!("Rejected bulk request: {}", err);
            Notice::error("Unknown bulk action")
        }
    };

    TodoTableTemplate::build(
        &dashboard,
        params.scope(),
        today,
        "/todos/table".to_string(),
        false,
        Some(&notice),
    )
    .render()
    .map(Html)
    .map_err(TodoWebError::from)
}

/// Handler for GET /todos/new that serves the create form.
#[tracing::instrument]
async fn new_todo_form_handler() -> Result<Html<String>, TodoWebError> {
    let template = TodoFormTemplate::create(TaskDraft::default(), FormErrors::default());
    template.render().map(Html).map_err(TodoWebError::from)
}

/// Handler for POST /todos. Invalid input re-renders the form with 422.
#[tracing::instrument(skip(state, user), fields(user = %user.id))]
async fn create_todo_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
    axum::Form(draft): axum::Form<TaskDraft>,
) -> Result<Response, TodoWebError> {
    let new_task = match draft.validate() {
        Ok(new_task) => new_task,
        Err(errors) => return invalid_form_response(TodoFormTemplate::create(draft, errors)),
    };

    TodoService::new(&state.db)
        .create_todo(&user.id, new_task)
        .await
        .map_err(TodoWebError::service("Failed to create todo"))?;
    changed_response(Notice::success("Todo created successfully"), true)
}

/// Handler for GET /todos/{id}/edit that serves the edit form.
#[tracing::instrument(skip(state, user), fields(user = %user.id))]
async fn edit_todo_form_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Html<String>, TodoWebError> {
    let task = TodoService::new(&state.db)
        .get_todo(&user.id, &id)
        .await
        .map_err(TodoWebError::service("Failed to load todo"))?;

    let template = TodoFormTemplate::edit(&id, TaskDraft::from_task(&task), FormErrors::default());
    template.render().map(Html).map_err(TodoWebError::from)
}

/// Handler for PUT /todos/{id}.
#[tracing::instrument(skip(state, user), fields(user = %user.id))]
async fn update_todo_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    axum::Form(draft): axum::Form<TaskDraft>,
) -> Result<Response, TodoWebError> {
    let new_task = match draft.validate() {
        Ok(new_task) => new_task,
        Err(errors) => return invalid_form_response(TodoFormTemplate::edit(&id, draft, errors)),
    };

    TodoService::new(&state.db)
        .update_todo(&user.id, &id, new_task)
        .await
        .map_err(TodoWebError::service("Failed to update todo"))?;
    changed_response(Notice::success("Todo updated"), true)
}

/// Handler for POST /todos/{id}/toggle.
#[tracing::instrument(skip(state, user), fields(user = %user.id))]
async fn toggle_todo_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Response, TodoWebError> {
    let task = TodoService::new(&state.db)
        .toggle_todo(&user.id, &id)
        .await
        .map_err(TodoWebError::service("Failed to update todo"))?;

    let message = if task.completed {
        "Todo marked complete"
    } else {
        "Todo marked incomplete"
    };
    changed_response(Notice::success(message), false)
}

/// Handler for DELETE /todos/{id}.
#[tracing::instrument(skip(state, user), fields(user = %user.id))]
async fn delete_todo_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Response, TodoWebError> {
    TodoService::new(&state.db)
        .delete_todo(&user.id, &id)
        .await
        .map_err(TodoWebError::service("Failed to delete todo"))?;
    changed_response(Notice::success("Todo deleted"), false)
}

/// Creates and returns the todo router with all dashboard routes.
pub fn create_todo_router(state: Arc<TodoState>) -> Router {
    Router::new()
        .route("/dashboard", get(dashboard_handler))
        .route("/todos", post(create_todo_handler))
        .route("/todos/new", get(new_todo_form_handler))
        .route("/todos/table", get(todo_table_handler))
        .route("/todos/bulk", post(bulk_action_handler))
        .route(
            "/todos/{id}",
            axum::routing::put(update_todo_handler).delete(delete_todo_handler),
        )
        .route("/todos/{id}/edit", get(edit_todo_form_handler))
        .route("/todos/{id}/toggle", post(toggle_todo_handler))
        .with_state(state)
}
