/// JSON request payload for API login
#[derive(serde::Deserialize, Debug, ToSchema)]
pub struct JsonLoginRequest {
    pub email: String,
    pub password: String,
}

/// JSON response for successful API login
#[derive(serde::Serialize, serde::Deserialize, Debug, ToSchema)]
pub struct LoginResponse {
    pub token: String,
}

/// JSON response for API errors
#[derive(serde::Serialize, serde::Deserialize, Debug, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

use crate::account::{AccountService, AccountServiceError};
use crate::auth::{AuthState, BlockedAccount, CurrentUser, encode_jwt};
use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use utoipa::ToSchema;

/// Creates a JSON API router for authentication endpoints.
pub fn create_api_router(state: Arc<AuthState>) -> Router<()> {
    Router::new()
        .route("/login", axum::routing::post(json_login_handler))
        .with_state(state)
}

/// API authentication middleware that extracts the current user from the Authorization Bearer header.
/// Sets the CurrentUser extension if a valid JWT for a non-blocked account is found.
pub async fn auth_user_middleware(
    State(state): State<Arc<AuthState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    let token = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if let Some(token) = token {
        match state.resolve(token).await {
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

/// Middleware that ensures the current user is authenticated.
/// Returns UNAUTHORIZED if the CurrentUser extension is not found in the request
/// and FORBIDDEN for blocked accounts.
/// This middleware should be applied after auth_user_middleware.
pub async fn require_auth_middleware(request: Request, next: Next) -> Response {
    if request.extensions().get::<CurrentUser>().is_some() {
        return next.run(request).await;
    }

    if request.extensions().get::<BlockedAccount>().is_some() {
        let error_response = ErrorResponse::new("ACCOUNT_BLOCKED", "This account has been blocked");
        return (StatusCode::FORBIDDEN, Json(error_response)).into_response();
    }

    let error_response = ErrorResponse::new(
        "UNAUTHORIZED",
        "Authentication required to access this resource",
    );
    (StatusCode::UNAUTHORIZED, Json(error_response)).into_response()
}

/// Handles JSON login requests and returns a JWT token.
/// Validates credentials and returns either a success response with token or an error.
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    post,
    path = "/api/v1/login",
    request_body = JsonLoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid email or password", body = ErrorResponse),
        (status = 403, description = "Account is blocked", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn json_login_handler(
    State(state): State<Arc<AuthState>>,
    Json(payload): Json<JsonLoginRequest>,
) -> Result<Json<LoginResponse>, (StatusCode, Json<ErrorResponse>)> {
    let service = AccountService::new(&state.db);
    let account = match service.authenticate(&payload.email, &payload.password).await {
        Ok(account) => account,
        Err(AccountServiceError::InvalidCredentials) => {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new(
                    "INVALID_CREDENTIALS",
                    "Invalid email or password",
                )),
            ));
        }
        Err(AccountServiceError::Blocked(_)) => {
            return Err((
                StatusCode::FORBIDDEN,
                Json(ErrorResponse::new(
                    "ACCOUNT_BLOCKED",
                    "This account has been blocked",
                )),
            ));
        }
        Err(err) => {
            tracing::error!("Failed to authenticate: {}", err);
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(
                    "INTERNAL_ERROR",
                    "Failed to check credentials",
                )),
            ));
        }
    };

    let jwt_token = encode_jwt(account.id, &state.jwt_secret)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(
                    "JWT_ERROR",
                    "Failed to generate authentication token",
                )),
            )
        })?;

    Ok(Json(LoginResponse { token: jwt_token }))
}
