use askama::Template;
use axum::Router;
use axum::extract::{Extension, Form, MatchedPath, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use jsonwebtoken::encode;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use todos_core::{Account, AccountId};
use tower_http::trace::MakeSpan;
use tracing::Span;

use crate::account::{AccountService, AccountServiceError};
use crate::config::Config;

pub mod api;

/// Name of the cookie holding the session JWT.
pub const AUTH_COOKIE: &str = "auth_token";

/// Represents the currently authenticated, non-blocked account.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: AccountId,
    pub email: String,
    pub full_name: Option<String>,
    pub is_admin: bool,
}

impl CurrentUser {
    pub fn display_name(&self) -> &str {
        Account::name_or_email(self.full_name.as_deref(), &self.email)
    }
}

impl From<Account> for CurrentUser {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            full_name: account.full_name,
            is_admin: account.is_admin,
        }
    }
}

/// Marker extension set when a valid token belongs to a blocked account.
#[derive(Debug, Clone)]
pub struct BlockedAccount;

/// Authentication state containing the JWT secret and the account store.
#[derive(Clone)]
pub struct AuthState {
    pub jwt_secret: String,
    pub db: Arc<DatabaseConnection>,
}

impl AuthState {
    /// Creates a new AuthState from the application config.
    pub fn from_config(config: &Config, db: Arc<DatabaseConnection>) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            db,
        }
    }

    /// Resolves the account behind a token. Blocked accounts are returned as
    /// `Err(BlockedAccount)`, unknown or invalid tokens as `Ok(None)`.
    async fn resolve(&self, token: &str) -> Result<Option<CurrentUser>, BlockedAccount> {
        let Ok(claims) = decode_jwt(token, &self.jwt_secret).await else {
            return Ok(None);
        };
        match AccountService::new(&self.db).get_account(&claims.sub).await {
            Ok(account) if account.is_blocked => Err(BlockedAccount),
            Ok(account) => Ok(Some(CurrentUser::from(account))),
            Err(err) => {
                if !matches!(err, AccountServiceError::AccountNotFound(_)) {
                    tracing::error!("Failed to load account for token: {}", err);
                }
                Ok(None)
            }
        }
    }
}

/// Creates the router for login, signup, logout and the blocked page.
pub fn create_login_router(state: Arc<AuthState>) -> Router<()> {
    Router::new()
        .route(
            "/login",
            axum::routing::get(login_page_handler).post(login_handler),
        )
        .route("/login/blocked", axum::routing::get(blocked_page_handler))
        .route(
            "/signup",
            axum::routing::get(signup_page_handler).post(signup_handler),
        )
        .route("/logout", axum::routing::post(logout_handler))
        .with_state(state)
}

/// Authentication middleware that checks the session cookie and sets the
/// CurrentUser extension. It never redirects.
pub async fn auth_user_middleware(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token_cookie) = jar.get(AUTH_COOKIE) {
        match state.resolve(token_cookie.value()).await {
            Ok(Some(current_user)) => {
                request.extensions_mut().insert(current_user);
            }
            Ok(None) => {}
            Err(blocked) => {
                request.extensions_mut().insert(blocked);
            }
        }
    }

    next.run(request).await
}

/// Redirects anonymous requests to the login page and blocked accounts to the
/// blocked page. Must run after auth_user_middleware.
pub async fn login_redirect_middleware(request: Request, next: Next) -> Response {
    if request.extensions().get::<CurrentUser>().is_some() {
        return next.run(request).await;
    }

    if request.extensions().get::<BlockedAccount>().is_some() {
        return Redirect::to("/login/blocked").into_response();
    }
    Redirect::to("/login").into_response()
}

/// Lets only admins through; everyone else is sent back to their dashboard.
/// Must run after login_redirect_middleware.
pub async fn require_admin_middleware(request: Request, next: Next) -> Response {
    let is_admin = request
        .extensions()
        .get::<CurrentUser>()
        .is_some_and(|user| user.is_admin);

    if !is_admin {
        return Redirect::to("/dashboard").into_response();
    }

    next.run(request).await
}

/// Represents the login request payload.
#[derive(serde::Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Represents the signup request payload.
#[derive(serde::Deserialize, Debug)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: String,
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub struct Claims {
    pub exp: usize, // Expiry time of the token
    pub iat: usize, // Issued at time of the token
    pub sub: AccountId,
}

/// Custom error type for authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    #[error("JWT operation failed")]
    JwtError,
    #[error("Account lookup failed")]
    Account(#[from] AccountServiceError),
}

impl axum::response::IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        tracing::error!("Authentication request failed: {:?}", self);
        let user_facing_error_message =
            "An unexpected error occurred while processing your request. Please try again later.";
        (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!(
                "<h1>Internal Server Error</h1><p>{}</p>",
                user_facing_error_message
            )),
        )
            .into_response()
    }
}

/// Handles the login request.
/// Checks the submitted email and password against the stored accounts.
/// If a user is already logged in, returns a success message.
pub async fn login_handler(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    current_user: Option<Extension<CurrentUser>>,
    Form(payload): Form<LoginRequest>,
) -> Result<(CookieJar, Response), AuthError> {
    if let Some(Extension(user)) = current_user {
        return handle_already_logged_in_user(jar, &user).await;
    }

    handle_login_attempt(state, jar, payload).await
}

#[tracing::instrument(skip(jar))]
async fn handle_already_logged_in_user(
    jar: CookieJar,
    user: &CurrentUser,
) -> Result<(CookieJar, Response), AuthError> {
    let html = LoginSuccessTemplate {
        name: user.display_name(),
    }
    .render()
    .map_err(AuthError::from)?;

    Ok((jar, with_htmx_redirect(Html(html).into_response(), "/dashboard")))
}

/// Validates credentials and either returns success with a session cookie or
/// an inline error fragment.
#[tracing::instrument(skip(state, jar, payload))]
async fn handle_login_attempt(
    state: Arc<AuthState>,
    jar: CookieJar,
    payload: LoginRequest,
) -> Result<(CookieJar, Response), AuthError> {
    let service = AccountService::new(&state.db);
    match service.authenticate(&payload.email, &payload.password).await {
        Ok(account) => start_session(&state, jar, &account).await,
        Err(AccountServiceError::InvalidCredentials) => {
            let error_message = LoginErrorMessageTemplate
                .render()
                .map_err(AuthError::from)?;
            Ok((
                jar,
                retarget(Html(error_message).into_response(), "#login-message"),
            ))
        }
        Err(AccountServiceError::Blocked(id)) => {
            tracing::info!("Blocked account {} tried to log in", id);
            let html = BlockedTemplate.render().map_err(AuthError::from)?;
            Ok((
                jar,
                with_htmx_redirect(Html(html).into_response(), "/login/blocked"),
            ))
        }
        Err(err) => Err(AuthError::from(err)),
    }
}

/// Handles the signup request. Successful signups are logged in right away.
#[tracing::instrument(skip(state, jar, payload))]
pub async fn signup_handler(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    Form(payload): Form<SignupRequest>,
) -> Result<(CookieJar, Response), AuthError> {
    let service = AccountService::new(&state.db);
    let full_name = Some(payload.full_name).filter(|name| !name.trim().is_empty());
    match service
        .sign_up(&payload.email, &payload.password, full_name)
        .await
    {
        Ok(account) => start_session(&state, jar, &account).await,
        Err(
            err @ (AccountServiceError::DuplicateEmail(_)
            | AccountServiceError::InvalidEmail
            | AccountServiceError::WeakPassword),
        ) => {
            let html = SignupErrorMessageTemplate {
                message: err.to_string(),
            }
            .render()
            .map_err(AuthError::from)?;
            Ok((jar, retarget(Html(html).into_response(), "#signup-message")))
        }
        Err(err) => Err(AuthError::from(err)),
    }
}

/// Clears the session cookie.
#[tracing::instrument(skip(jar))]
pub async fn logout_handler(jar: CookieJar) -> (CookieJar, Response) {
    let jar = jar.remove(Cookie::build(AUTH_COOKIE).path("/"));
    (jar, Redirect::to("/login").into_response())
}

async fn start_session(
    state: &AuthState,
    jar: CookieJar,
    account: &Account,
) -> Result<(CookieJar, Response), AuthError> {
    let jwt_token = encode_jwt(account.id.clone(), &state.jwt_secret)
        .await
        .map_err(|_| AuthError::JwtError)?;

    let cookie = Cookie::build((AUTH_COOKIE, jwt_token))
        .http_only(true)
        .secure(false) // Set to true in production with HTTPS
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(24))
        .path("/")
        .build();

    let html = LoginSuccessTemplate {
        name: account.display_name(),
    }
    .render()
    .map_err(AuthError::from)?;

    Ok((
        jar.add(cookie),
        with_htmx_redirect(Html(html).into_response(), "/dashboard"),
    ))
}

fn with_htmx_redirect(mut response: Response, location: &'static str) -> Response {
    response.headers_mut().insert(
        HeaderName::from_static("hx-redirect"),
        HeaderValue::from_static(location),
    );
    response
}

fn retarget(mut response: Response, target: &'static str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("hx-retarget"),
        HeaderValue::from_static(target),
    );
    headers.insert(
        HeaderName::from_static("hx-reswap"),
        HeaderValue::from_static("outerHTML"),
    );
    response.headers_mut().extend(headers);
    response
}

pub async fn encode_jwt(account_id: AccountId, jwt_secret: &str) -> anyhow::Result<String> {
    let now = chrono::Utc::now();
    let expire = chrono::Duration::hours(24);
    let exp = (now + expire).timestamp() as usize;
    let iat = now.timestamp() as usize;
    let claims = Claims {
        exp,
        iat,
        sub: account_id,
    };
    let jwt = encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(jwt_secret.as_bytes()),
    )?;
    Ok(jwt)
}

pub async fn decode_jwt(token: &str, jwt_secret: &str) -> anyhow::Result<Claims> {
    let token_data = jsonwebtoken::decode(
        token,
        &jsonwebtoken::DecodingKey::from_secret(jwt_secret.as_bytes()),
        &jsonwebtoken::Validation::default(),
    )?;
    Ok(token_data.claims)
}

#[derive(Template)]
#[template(path = "login/login_success.html")]
pub struct LoginSuccessTemplate<'a> {
    pub name: &'a str,
}

#[derive(Template)]
#[template(path = "login/login_error_message.html")]
pub struct LoginErrorMessageTemplate;

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub email: Option<String>,
}

#[derive(Template)]
#[template(path = "login/blocked.html")]
pub struct BlockedTemplate;

#[derive(Template)]
#[template(path = "signup.html")]
pub struct SignupTemplate;

#[derive(Template)]
#[template(path = "signup/signup_error_message.html")]
pub struct SignupErrorMessageTemplate {
    pub message: String,
}

/// Handles GET requests to display the login page.
#[tracing::instrument]
pub async fn login_page_handler(
    current_user: Option<Extension<CurrentUser>>,
) -> Result<Html<String>, AuthError> {
    let email = current_user.map(|Extension(user)| user.email);

    let template = LoginTemplate { email };
    template.render().map(Html).map_err(AuthError::from)
}

#[tracing::instrument]
pub async fn signup_page_handler() -> Result<Html<String>, AuthError> {
    SignupTemplate.render().map(Html).map_err(AuthError::from)
}

#[tracing::instrument]
pub async fn blocked_page_handler() -> Result<Html<String>, AuthError> {
    BlockedTemplate.render().map(Html).map_err(AuthError::from)
}

/// Custom span maker that filters sensitive data from credential requests.
/// This implementation avoids logging request bodies and cookies for security.
#[derive(Clone, Debug)]
pub struct FilteredMakeSpan;

const SENSITIVE_PATHS: [&str; 3] = ["/login", "/signup", "/api/v1/login"];

impl<B> MakeSpan<B> for FilteredMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> Span {
        let uri = request.uri();
        let method = request.method();
        let matched_path = request
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str);

        if SENSITIVE_PATHS.contains(&uri.path()) {
            tracing::info_span!(
                "request",
                method = %method,
                uri = %uri,
                matched_path,
                sensitive_route = true,
            )
        } else {
            tracing::info_span!(
                "request",
                method = %method,
                uri = %uri,
                matched_path,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn config() -> Config {
        Config {
            db_url: "sqlite::memory:".to_string(),
            port: 8080,
            jwt_secret: "test_secret".to_string(),
            admin_email: "admin@example.com".to_string(),
            admin_password: "password".to_string(),
        }
    }

    #[test]
    fn blank_full_name_displays_the_email() {
        let mut user = CurrentUser {
            id: "acc-1".to_string(),
            email: "kim@example.com".to_string(),
            full_name: Some("   ".to_string()),
            is_admin: false,
        };
        assert_eq!(user.display_name(), "kim@example.com");

        user.full_name = Some("Kim Lee".to_string());
        assert_eq!(user.display_name(), "Kim Lee");

        user.full_name = None;
        assert_eq!(user.display_name(), "kim@example.com");
    }

    #[tokio::test]
    async fn can_round_trip_jwt_claims() {
        let token = encode_jwt("acc-1".to_string(), "secret").await.unwrap();

        let claims = decode_jwt(&token, "secret").await.unwrap();

        assert_eq!(claims.sub, "acc-1");
        assert!(claims.exp > claims.iat);
        assert!(decode_jwt(&token, "other secret").await.is_err());
    }

    #[tokio::test]
    async fn auth_middlewares_work_together() {
        use axum::body::Body;
        use axum::http::{Request, StatusCode};
        use axum::middleware::{from_fn, from_fn_with_state};
        use tower::ServiceExt;

        let config = config();
        let db = crate::web::connect_database(&config.db_url).await.unwrap();
        let account = AccountService::new(&db)
            .sign_up("user@example.com", "password123", None)
            .await
            .unwrap();
        let auth_state = Arc::new(AuthState::from_config(&config, Arc::new(db)));

        // Layers run bottom to top
        let app = axum::Router::new()
            .route(
                "/protected",
                axum::routing::get(|| async { "Protected content" }),
            )
            .layer(from_fn(login_redirect_middleware))
            .layer(from_fn_with_state(auth_state.clone(), auth_user_middleware));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/protected")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers().get("location").unwrap();
        assert_eq!(location, "/login");

        let jwt_token = encode_jwt(account.id.clone(), &config.jwt_secret)
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/protected")
                    .header("cookie", format!("{}={}", AUTH_COOKIE, jwt_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body, "Protected content");

        // A token for an account that no longer exists is anonymous
        let stale_token = encode_jwt("missing".to_string(), &config.jwt_secret)
            .await
            .unwrap();
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/protected")
                    .header("cookie", format!("{}={}", AUTH_COOKIE, stale_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers().get("location").unwrap(), "/login");
    }
}
