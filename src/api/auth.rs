//! Public auth endpoints
//!
//! Registration, login, and the password-reset flow. Registration never
//! takes a password: buyers receive issued credentials on approval, and
//! sellers establish theirs through the reset flow once approved.

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};

use super::dto::{
    AccountResponse, LoginRequest, LoginResponse, PasswordResetConfirm, PasswordResetRequest,
    PasswordResetVerify, PasswordResetVerifyResponse, RegisterRequest,
};
use crate::auth::password::verify_password;
use crate::auth::session::{create_session_token, Session};
use crate::data::{AccountsRepository, ApprovalStatus, OtpPurpose};
use crate::error::AppError;
use crate::AppState;

/// Create auth router
///
/// Routes:
/// - POST /auth/register - Create a pending seller/buyer account
/// - POST /auth/login - Exchange credentials for a session token
/// - POST /auth/password-reset/request - Issue a one-time code
/// - POST /auth/password-reset/verify - Check a code without consuming it
/// - POST /auth/password-reset/confirm - Apply a new password
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/password-reset/request", post(password_reset_request))
        .route("/password-reset/verify", post(password_reset_verify))
        .route("/password-reset/confirm", post(password_reset_confirm))
}

/// POST /auth/register
async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), AppError> {
    let account = state
        .moderation
        .register(&request.email, &request.display_name, request.role)
        .await?;
    Ok((StatusCode::CREATED, Json(account.into())))
}

/// POST /auth/login
///
/// Accepts an email or an issued buyer account id. Only approved accounts
/// with a password can sign in; blacklisted sellers still can, since the
/// reapplication endpoint requires a session.
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let account = state
        .db
        .get_account_by_login(&request.identifier)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let stored_hash = account.password_hash.as_deref().ok_or(AppError::Unauthorized)?;
    if !verify_password(&request.password, stored_hash)? {
        return Err(AppError::Unauthorized);
    }

    if account.approval_status != ApprovalStatus::Approved {
        return Err(AppError::Forbidden);
    }

    let now = Utc::now();
    let session = Session {
        account_id: account.id.clone(),
        role: account.role,
        email: account.email.clone(),
        created_at: now,
        expires_at: now + Duration::seconds(state.config.auth.session_max_age),
    };
    let token = create_session_token(&session, &state.config.auth.session_secret)?;

    let cookie = Cookie::build(("session", token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.server.protocol.eq_ignore_ascii_case("https"))
        .build();

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            token,
            account: account.into(),
        }),
    ))
}

/// POST /auth/password-reset/request
///
/// Always returns 202: the response never reveals whether the address is
/// registered.
async fn password_reset_request(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<StatusCode, AppError> {
    match state
        .otp
        .request_code(&request.email, OtpPurpose::PasswordReset)
        .await
    {
        Ok(_) | Err(AppError::NotFound) => Ok(StatusCode::ACCEPTED),
        Err(e) => Err(e),
    }
}

/// POST /auth/password-reset/verify
async fn password_reset_verify(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetVerify>,
) -> Result<Json<PasswordResetVerifyResponse>, AppError> {
    let valid = state
        .otp
        .verify_code(&request.email, &request.code, OtpPurpose::PasswordReset)
        .await?;
    Ok(Json(PasswordResetVerifyResponse { valid }))
}

/// POST /auth/password-reset/confirm
async fn password_reset_confirm(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetConfirm>,
) -> Result<StatusCode, AppError> {
    if request.new_password.len() < 8 {
        return Err(AppError::Validation(
            "password must be at least 8 characters".to_string(),
        ));
    }

    state
        .otp
        .consume_for_password_reset(&request.email, &request.code, &request.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
