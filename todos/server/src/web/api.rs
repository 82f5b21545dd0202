use std::sync::Arc;

use crate::{
    auth::{self, AuthState},
    todo::web::TodoState,
};

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use utoipa::{OpenApi, ToSchema};

/// Generic error body for failed API requests.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ServerErrorResponse {
    /// Human readable description of what went wrong
    pub message: String,
}

impl ServerErrorResponse {
    pub fn new(message: String) -> Self {
        Self { message }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::api::v1::json_login_handler,
        crate::todo::api::v1::get_todos_handler,
        crate::todo::api::v1::create_todo_handler,
        crate::todo::api::v1::bulk_todos_handler,
    ),
    components(schemas(
        auth::api::v1::JsonLoginRequest,
        auth::api::v1::LoginResponse,
        auth::api::v1::ErrorResponse,
        crate::todo::api::v1::TodoJson,
        crate::todo::api::v1::TodosResponse,
        crate::todo::api::v1::ScopeCountsJson,
        crate::todo::api::v1::CreateTodoRequest,
        crate::todo::api::v1::ValidationErrorResponse,
        crate::todo::api::v1::BulkRequest,
        crate::todo::api::v1::BulkResponse,
        ServerErrorResponse,
    )),
    tags(
        (name = "Auth", description = "Token based login"),
        (name = "Todos", description = "Todos of the authenticated account")
    )
)]
pub struct ApiDoc;

/// Creates the API routes for JSON API endpoints.
pub fn create_api_router(auth_state: Arc<AuthState>, todo_state: Arc<TodoState>) -> axum::Router {
    let login_router = auth::api::v1::create_api_router(auth_state.clone());
    let todos_router = crate::todo::api::v1::create_api_router(todo_state);
    let protected_routes = todos_router
        .layer(ServiceBuilder::new().layer(from_fn(auth::api::v1::require_auth_middleware)));
    let public_routes = login_router;
    let api_routes = public_routes.merge(protected_routes);
    Router::new()
        .nest("/api/v1", api_routes)
        .layer(ServiceBuilder::new().layer(from_fn_with_state(
            auth_state,
            auth::api::v1::auth_user_middleware,
        )))
}
