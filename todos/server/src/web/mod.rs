use askama::Template;
use axum::Router;
use axum::extract::Extension;
use axum::http::{HeaderName, StatusCode, header};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::{Html, IntoResponse, Redirect, Response};
use migration::MigratorTrait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::account::AccountService;
use crate::admin::{AdminState, create_admin_router};
use crate::auth::{
    AuthState, CurrentUser, FilteredMakeSpan, auth_user_middleware, create_login_router,
    login_redirect_middleware, require_admin_middleware,
};
use crate::config::{self, Config};
use crate::todo::web::{TodoState, create_todo_router};

pub mod api;

/// Custom error type for web handler operations.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    /// Represents an error during template rendering.
    /// The specific `askama::Error` is captured as the source of this error.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
}

impl axum::response::IntoResponse for WebError {
    fn into_response(self) -> axum::response::Response {
        tracing::error!("Web request failed: {:?}", self);
        let user_facing_error_message =
            "An unexpected error occurred while processing your request. Please try again later.";
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!(
                "<h1>Internal Server Error</h1><p>{}</p>",
                user_facing_error_message
            )),
        )
            .into_response()
    }
}

/// Connects to `db_url` and applies every pending migration.
///
/// An in-memory SQLite database only lives as long as its connection, so
/// the pool is pinned to a single connection for such URLs.
pub async fn connect_database(db_url: &str) -> anyhow::Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(db_url.to_string());
    if db_url.starts_with("sqlite") && db_url.contains(":memory:") {
        options.max_connections(1).min_connections(1);
    }
    options.sqlx_logging(false);

    let db = Database::connect(options).await?;
    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");
    Ok(db)
}

/// Builds the complete application router over an already migrated database.
pub fn create_app(config: &Config, db: DatabaseConnection) -> Router {
    let db = Arc::new(db);
    let auth_state = Arc::new(AuthState::from_config(config, db.clone()));
    let todo_state = Arc::new(TodoState { db: db.clone() });
    let admin_state = Arc::new(AdminState { db });

    let admin_routes = create_admin_router(admin_state).layer(from_fn(require_admin_middleware));

    let protected_routes = Router::new()
        .merge(create_todo_router(todo_state.clone()))
        .merge(admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(auth_state.clone(), auth_user_middleware))
                .layer(from_fn(login_redirect_middleware)),
        );

    let public_routes = Router::new()
        .route("/health", axum::routing::get(health_check_handler))
        .route("/", axum::routing::get(welcome_handler))
        .merge(create_login_router(auth_state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(auth_state.clone(), auth_user_middleware)),
        );

    Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .merge(api::create_api_router(auth_state, todo_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api::ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetSensitiveRequestHeadersLayer::new([
                    header::AUTHORIZATION,
                    header::COOKIE,
                ]))
                .layer(TraceLayer::new_for_http().make_span_with(FilteredMakeSpan))
                .layer(CorsLayer::new().expose_headers([
                    HeaderName::from_static("hx-retarget"),
                    HeaderName::from_static("hx-reswap"),
                    HeaderName::from_static("hx-redirect"),
                    HeaderName::from_static("hx-trigger"),
                ])),
        )
}

#[tracing::instrument(skip(config))]
pub async fn start_web_server(config: config::Config) -> anyhow::Result<()> {
    let server_address = format!("0.0.0.0:{}", &config.port);
    let listener = tokio::net::TcpListener::bind(&server_address).await?;
    tracing::info!("Web server running on http://{}", server_address);

    let db = connect_database(&config.db_url).await?;
    let admin = AccountService::new(&db)
        .ensure_admin(&config.admin_email, &config.admin_password)
        .await?;
    tracing::info!("Bootstrap admin {} is ready", admin.email);

    let app = create_app(&config, db);
    axum::serve(listener, app).await?;
    Ok(())
}

#[tracing::instrument]
pub async fn health_check_handler() -> &'static str {
    "OK"
}

/// Signed in visitors go straight to their dashboard.
#[tracing::instrument(skip(current_user))]
pub async fn welcome_handler(
    current_user: Option<Extension<CurrentUser>>,
) -> Result<Response, WebError> {
    if current_user.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }
    let template = IndexTemplate;
    Ok(Html(template.render()?).into_response())
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate;
