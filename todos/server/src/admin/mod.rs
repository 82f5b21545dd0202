//! Admin area: account management, read-only todo views and assignment.
use askama::Template;
use axum::{
    Router,
    extract::{Extension, Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::Query;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use todos_core::{Account, AssignDraft, Dashboard, FormErrors, Notice};

use crate::account::{AccountService, AccountServiceError};
use crate::auth::CurrentUser;
use crate::todo::web::{
    NoticeTemplate, NoticeView, SelectOption, TodoTableTemplate, ViewParams, priority_options,
    today,
};
use crate::todo::{DbTaskStore, TodoService, TodoServiceError};

#[derive(Clone, Debug)]
pub struct AdminState {
    pub db: Arc<DatabaseConnection>,
}

/// Custom error type for admin handler operations.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    #[error("{message}")]
    Account {
        message: &'static str,
        #[source]
        source: AccountServiceError,
    },
    #[error("{message}")]
    Todo {
        message: &'static str,
        #[source]
        source: TodoServiceError,
    },
}

impl AdminError {
    fn account(message: &'static str) -> impl FnOnce(AccountServiceError) -> Self {
        move |source| AdminError::Account { message, source }
    }
}

impl axum::response::IntoResponse for AdminError {
    fn into_response(self) -> axum::response::Response {
        tracing::error!("Admin request failed: {:?}", self);
        let (status_code, message) = match &self {
            AdminError::Account {
                source: source @ AccountServiceError::SelfModification,
                ..
            } => (StatusCode::BAD_REQUEST, source.to_string()),
            AdminError::Account {
                source: AccountServiceError::AccountNotFound(_),
                ..
            } => (StatusCode::NOT_FOUND, "User not found".to_string()),
            AdminError::Account { message, .. } | AdminError::Todo { message, .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
            }
            AdminError::Template(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An unexpected error occurred while processing your request. Please try again later."
                    .to_string(),
            ),
        };

        let Ok(rendered) = NoticeTemplate::new(&Notice::error(message), false).render() else {
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

struct UserRow {
    id: String,
    email: String,
    name: String,
    initials: String,
    is_admin: bool,
    is_blocked: bool,
    joined: String,
    is_self: bool,
}

impl UserRow {
    fn new(account: &Account, current_user_id: &str) -> Self {
        Self {
            id: account.id.clone(),
            email: account.email.clone(),
            name: account
                .full_name
                .clone()
                .unwrap_or_else(|| "No name".to_string()),
            initials: account.initials(),
            is_admin: account.is_admin,
            is_blocked: account.is_blocked,
            joined: account.created_at.format("%b %d, %Y").to_string(),
            is_self: account.id == current_user_id,
        }
    }
}

#[derive(Template)]
#[template(path = "admin/users.html")]
struct AdminUsersTemplate {
    user_name: String,
    is_admin: bool,
    table_html: String,
}

#[derive(Template)]
#[template(path = "admin/users_table.html")]
struct UsersTableTemplate {
    users: Vec<UserRow>,
    notice: Option<NoticeView>,
}

#[derive(Template)]
#[template(path = "admin/user_todos.html")]
struct UserTodosTemplate {
    user_name: String,
    is_admin: bool,
    owner_name: String,
    owner_email: String,
    table_html: String,
}

#[derive(Template)]
#[template(path = "admin/assign.html")]
struct AssignPageTemplate {
    user_name: String,
    is_admin: bool,
    form_html: String,
}

#[derive(Template)]
#[template(path = "admin/assign_form.html")]
struct AssignFormTemplate {
    assignees: Vec<SelectOption>,
    draft: AssignDraft,
    errors: FormErrors,
    priorities: Vec<SelectOption>,
    notice: Option<NoticeView>,
}

impl AssignFormTemplate {
    fn new(
        accounts: &[Account],
        draft: AssignDraft,
        errors: FormErrors,
        notice: Option<&Notice>,
    ) -> Self {
        let assignees = accounts
            .iter()
            .map(|account| SelectOption {
                value: account.id.clone(),
                label: match &account.full_name {
                    Some(name) => format!("{} ({})", name, account.email),
                    None => account.email.clone(),
                },
                selected: account.id == draft.assignee_id,
            })
            .collect();
        Self {
            assignees,
            priorities: priority_options(&draft.task.priority, None),
            draft,
            errors,
            notice: notice.map(NoticeView::from),
        }
    }
}

async fn render_users_table(
    db: &DatabaseConnection,
    current_user_id: &str,
    notice: Option<&Notice>,
) -> Result<String, AdminError> {
    let accounts = AccountService::new(db)
        .list_accounts()
        .await
        .map_err(AdminError::account("Failed to load users"))?;
    let template = UsersTableTemplate {
        users: accounts
            .iter()
            .map(|account| UserRow::new(account, current_user_id))
            .collect(),
        notice: notice.map(NoticeView::from),
    };
    Ok(template.render()?)
}

/// Handler for GET /admin that lists every account.
#[tracing::instrument(skip(state, user), fields(admin = %user.id))]
async fn users_page_handler(
    State(state): State<Arc<AdminState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Html<String>, AdminError> {
    let table_html = render_users_table(&state.db, &user.id, None).await?;
    let template = AdminUsersTemplate {
        user_name: user.display_name().to_string(),
        is_admin: user.is_admin,
        table_html,
    };
    template.render().map(Html).map_err(AdminError::from)
}

/// Handler for POST /admin/users/{id}/admin.
#[tracing::instrument(skip(state, user), fields(admin = %user.id))]
async fn toggle_admin_handler(
    State(state): State<Arc<AdminState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Html<String>, AdminError> {
    let account = AccountService::new(&state.db)
        .toggle_admin(&user.id, &id)
        .await
        .map_err(AdminError::account("Failed to update admin status"))?;

    let notice = if account.is_admin {
        Notice::success("User promoted to admin")
    } else {
        Notice::success("User removed from admin")
    };
    render_users_table(&state.db, &user.id, Some(&notice))
        .await
        .map(Html)
}

/// Handler for POST /admin/users/{id}/block.
#[tracing::instrument(skip(state, user), fields(admin = %user.id))]
async fn toggle_blocked_handler(
    State(state): State<Arc<AdminState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Html<String>, AdminError> {
    let account = AccountService::new(&state.db)
        .toggle_blocked(&user.id, &id)
        .await
        .map_err(AdminError::account("Failed to update block status"))?;

    let notice = if account.is_blocked {
        Notice::success("User blocked")
    } else {
        Notice::success("User unblocked")
    };
    render_users_table(&state.db, &user.id, Some(&notice))
        .await
        .map(Html)
}

/// Handler for DELETE /admin/users/{id}. Removes the account and its todos.
#[tracing::instrument(skip(state, user), fields(admin = %user.id))]
async fn delete_user_handler(
    State(state): State<Arc<AdminState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Html<String>, AdminError> {
    AccountService::new(&state.db)
        .delete_account(&user.id, &id)
        .await
        .map_err(AdminError::account("Failed to delete user"))?;

    let notice = Notice::success("User deleted successfully");
    render_users_table(&state.db, &user.id, Some(&notice))
        .await
        .map(Html)
}

/// Handler for GET /admin/users/{id}/todos, a read-only dashboard of one
/// account. Unknown accounts redirect back to the user list.
#[tracing::instrument(skip(state, user), fields(admin = %user.id))]
async fn user_todos_handler(
    State(state): State<Arc<AdminState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Query(params): Query<ViewParams>,
) -> Result<Response, AdminError> {
    let owner = match AccountService::new(&state.db).get_account(&id).await {
        Ok(owner) => owner,
        Err(AccountServiceError::AccountNotFound(_)) => {
            tracing::warn!("No account {} to show todos for", id);
            return Ok(Redirect::to("/admin").into_response());
        }
        Err(source) => {
            return Err(AdminError::Account {
                message: "Failed to load user",
                source,
            });
        }
    };

    let tasks = TodoService::new(&state.db)
        .list_todos(&owner.id)
        .await
        .map_err(|source| AdminError::Todo {
            message: "Failed to load todos",
            source,
        })?;
    let dashboard = Dashboard::new(owner.id.clone(), tasks, params.view_state());
    let table_html = TodoTableTemplate::build(
        &dashboard,
        params.scope(),
        today(),
        format!("/admin/users/{}/todos", owner.id),
        true,
        None,
    )
    .render()?;

    let template = UserTodosTemplate {
        user_name: user.display_name().to_string(),
        is_admin: user.is_admin,
        owner_name: owner.display_name().to_string(),
        owner_email: owner.email.clone(),
        table_html,
    };
    Ok(Html(template.render()?).into_response())
}

/// Handler for GET /admin/assign that serves the assignment form.
#[tracing::instrument(skip(state, user), fields(admin = %user.id))]
async fn assign_page_handler(
    State(state): State<Arc<AdminState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Html<String>, AdminError> {
    let accounts = AccountService::new(&state.db)
        .list_assignable_accounts()
        .await
        .map_err(AdminError::account("Failed to load users"))?;
    let form_html =
        AssignFormTemplate::new(&accounts, AssignDraft::default(), FormErrors::default(), None)
            .render()?;

    let template = AssignPageTemplate {
        user_name: user.display_name().to_string(),
        is_admin: user.is_admin,
        form_html,
    };
    template.render().map(Html).map_err(AdminError::from)
}

/// Handler for POST /admin/assign. Creates a todo owned by the chosen account.
#[tracing::instrument(skip(state, user, draft), fields(admin = %user.id))]
async fn assign_todo_handler(
    State(state): State<Arc<AdminState>>,
    Extension(user): Extension<CurrentUser>,
    axum::Form(draft): axum::Form<AssignDraft>,
) -> Result<Response, AdminError> {
    let accounts = AccountService::new(&state.db)
        .list_assignable_accounts()
        .await
        .map_err(AdminError::account("Failed to load users"))?;

    let validated = draft.validate().and_then(|(assignee_id, new_task)| {
        match accounts.iter().find(|account| account.id == assignee_id) {
            Some(assignee) => Ok((assignee, new_task)),
            None => Err(FormErrors {
                assignee: Some("Please select a user".to_string()),
                ..Default::default()
            }),
        }
    });

    let (assignee, new_task) = match validated {
        Ok(valid) => valid,
        Err(errors) => {
            let html = AssignFormTemplate::new(&accounts, draft, errors, None).render()?;
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(html)).into_response());
        }
    };

    TodoService::new(&state.db)
        .create_todo(&assignee.id, new_task)
        .await
        .map_err(|source| AdminError::Todo {
            message: "Failed to assign todo",
            source,
        })?;
    tracing::info!("Assigned todo to {}", assignee.id);

    let notice = Notice::success(format!(
        "Todo assigned to {} successfully",
        assignee.display_name()
    ));
    let html =
        AssignFormTemplate::new(&accounts, AssignDraft::default(), FormErrors::default(), Some(&notice))
            .render()?;
    Ok(Html(html).into_response())
}

/// Creates and returns the admin router. Callers must layer
/// [`crate::auth::require_admin_middleware`] on top.
pub fn create_admin_router(state: Arc<AdminState>) -> Router {
    Router::new()
        .route("/admin", get(users_page_handler))
        .route("/admin/users/{id}", axum::routing::delete(delete_user_handler))
        .route("/admin/users/{id}/admin", post(toggle_admin_handler))
        .route("/admin/users/{id}/block", post(toggle_blocked_handler))
        .route("/admin/users/{id}/todos", get(user_todos_handler))
        .route(
            "/admin/assign",
            get(assign_page_handler).post(assign_todo_handler),
        )
        .with_state(state)
}
