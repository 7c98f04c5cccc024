/// Authentication Routes
///
/// Login, registration, token refresh, logout and current user information.
/// Every failed login or refresh answers with the same 401 body; the precise
/// reason only reaches the logs.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AccessTokenClaims, LoginOutcome, RefreshOutcome};
use crate::domain::{NewUser, Role, TokenPair};
use crate::error::{AppError, AuthError, DatabaseError, ErrorContext, USERNAME_UNIQUE_CONSTRAINT};
use crate::startup::AppState;
use crate::validators::validate_registration;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub user_name: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub user_name: String,
    pub password: String,
    pub confirm_password: String,
}

/// Body of refresh and logout
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Success envelope shared by the auth endpoints
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    pub trace_id: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(context: &ErrorContext, message: &str, data: T) -> HttpResponse {
        HttpResponse::Ok().json(ApiResponse {
            success: true,
            status_code: 200,
            message: message.to_string(),
            trace_id: context.request_id.clone(),
            data,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub access_token: String,
    pub refresh_token: String,
    pub user_name: String,
    pub role: String,
}

impl LoginResult {
    fn new(pair: TokenPair, user_name: String, role: String) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            user_name,
            role,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub user_name: String,
    pub role: String,
}

/// POST /api/auth/login
///
/// # Errors
/// - 401: unknown user, wrong password or disabled account (indistinguishable)
/// - 500: persistence failure
pub async fn login(
    form: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login").with_user_name(form.user_name.as_str());

    let outcome = state
        .authenticator
        .validate(&form.user_name, &form.password)
        .await
        .map_err(|e| {
            context.log_error(&e);
            e
        })?;

    let user = match outcome {
        LoginOutcome::Success(user) => user,
        LoginOutcome::Failure(reason) => {
            tracing::warn!(
                request_id = %context.request_id,
                reason = reason.reason(),
                "Login rejected"
            );
            return Err(AuthError::InvalidCredentials.into());
        }
    };

    let pair = state.issuer.issue(&user).await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = user.id,
        "User logged in successfully"
    );

    let result = LoginResult::new(pair, user.username, user.role.to_string());
    Ok(ApiResponse::ok(&context, "Login successful", result))
}

/// POST /api/auth/register
///
/// Creates a `User` account and logs it in.
///
/// # Errors
/// - 400: validation failure (field and message in `errors`)
/// - 409: username already taken
pub async fn register(
    form: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");

    let input = validate_registration(&form.user_name, &form.password, &form.confirm_password)?;

    if state.users.exists(&input.username).await? {
        return Err(DatabaseError::UniqueConstraintViolation(USERNAME_UNIQUE_CONSTRAINT.to_string()).into());
    }

    let password_hash = crate::auth::hash_password(&input.password, state.password_hash_cost)?;

    // The store's unique constraint still guards against a concurrent insert.
    let user = state
        .users
        .insert(NewUser {
            username: input.username,
            password_hash,
            role: Role::User,
            is_active: true,
        })
        .await?;

    let pair = state.issuer.issue(&user).await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = user.id,
        "User registered successfully"
    );

    let result = LoginResult::new(pair, user.username, user.role.to_string());
    Ok(ApiResponse::ok(&context, "Registration successful", result))
}

/// POST /api/auth/refresh
///
/// Rotates the presented refresh token. The old token is dead afterwards,
/// so a replayed token is refused.
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let pair = match state.issuer.refresh(&form.refresh_token).await? {
        RefreshOutcome::Rotated(pair) => pair,
        RefreshOutcome::Rejected(reason) => {
            tracing::warn!(
                request_id = %context.request_id,
                reason = %reason,
                "Refresh rejected"
            );
            return Err(AuthError::InvalidRefreshToken.into());
        }
    };

    let claims = state.issuer.parse_claims(&pair.access_token).claims_or_default();

    tracing::info!(request_id = %context.request_id, "Token refreshed successfully");

    let result = LoginResult::new(pair, claims.user_name, claims.role);
    Ok(ApiResponse::ok(&context, "Token refreshed", result))
}

/// POST /api/auth/logout
///
/// Always 204, whether or not the token was known.
pub async fn logout(
    form: web::Json<RefreshRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let revoked = state.issuer.logout(&form.refresh_token).await?;
    tracing::info!(revoked, "Logout processed");
    Ok(HttpResponse::NoContent().finish())
}

/// POST /api/auth/logout-all
///
/// Revokes every outstanding refresh token of the caller.
/// **Requires a valid access token.**
pub async fn logout_all(
    claims: web::ReqData<AccessTokenClaims>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("logout_all").with_user_name(claims.sub.as_str());

    let Some(user) = state.users.find_by_username(&claims.sub).await? else {
        let err = AppError::from(AuthError::TokenInvalid);
        context.log_error(&err);
        return Err(err);
    };

    let revoked = state.issuer.logout_all(&user).await?;
    tracing::info!(
        request_id = %context.request_id,
        user_id = user.id,
        revoked,
        "All sessions revoked"
    );

    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/auth/me
///
/// **Requires a valid access token.** Answers from the token claims alone.
pub async fn current_user(claims: web::ReqData<AccessTokenClaims>) -> HttpResponse {
    let context = ErrorContext::new("current_user");
    let claims = claims.into_inner();
    ApiResponse::ok(
        &context,
        "OK",
        CurrentUser {
            user_name: claims.name,
            role: claims.role,
        },
    )
}
