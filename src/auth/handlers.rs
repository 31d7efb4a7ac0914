use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use super::{
    dto::{AuthResponse, LoginRequest, RegisterRequest},
    extractors::{cleared_cookie, session_cookie, AuthUser},
    jwt::JwtKeys,
    password::{hash_password, verify_password},
    validation::{is_valid_email, validate_password, validate_username},
};
use crate::{
    error::{is_unique_violation, AppError},
    extract::JsonBody,
    state::AppState,
    users::{
        dto::ProfileResponse,
        repo::{NewUser, User},
    },
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/user", get(current_user))
}

fn issue_session(
    state: &AppState,
    jar: CookieJar,
    user: User,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.sign(user.id, &user.username)?;
    let jar = jar.add(session_cookie(token.clone(), &keys, state.config.cookie_secure));
    Ok((
        jar,
        Json(AuthResponse {
            token,
            user: user.into(),
        }),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(mut payload): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), AppError> {
    payload.username = payload.username.trim().to_string();
    payload.email = payload.email.trim().to_lowercase();

    validate_username(&payload.username)?;
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::validation("Invalid email"));
    }
    validate_password(&payload.password)?;

    if User::exists_with(&state.db, &payload.username, &payload.email).await? {
        warn!(username = %payload.username, "username or email already registered");
        return Err(AppError::conflict("Username or email already registered"));
    }

    let display_name = payload
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(&payload.username)
        .to_string();
    let language = payload.language.unwrap_or_default();
    let hash = hash_password(&payload.password)?;

    let user = User::create(
        &state.db,
        NewUser {
            username: &payload.username,
            display_name: &display_name,
            email: &payload.email,
            password_hash: &hash,
            language: language.tag(),
        },
    )
    .await
    .map_err(|e| {
        // lost a race with a concurrent registration
        if is_unique_violation(&e) {
            AppError::conflict("Username or email already registered")
        } else {
            e.into()
        }
    })?;

    info!(user_id = user.id, username = %user.username, "user registered");
    let (jar, body) = issue_session(&state, jar, user)?;
    Ok((StatusCode::CREATED, jar, body))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let login = payload.username.trim();
    if login.is_empty() || payload.password.is_empty() {
        return Err(AppError::validation("Username and password are required"));
    }

    let Some(user) = User::find_by_login(&state.db, login).await? else {
        warn!(login, "login unknown user");
        return Err(AppError::unauthorized("Invalid credentials"));
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = user.id, "login invalid password");
        return Err(AppError::unauthorized("Invalid credentials"));
    }

    info!(user_id = user.id, username = %user.username, "user logged in");
    issue_session(&state, jar, user)
}

/// Tokens are stateless; logging out only drops the cookie.
#[instrument(skip(jar))]
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<Value>) {
    (
        jar.remove(cleared_cookie()),
        Json(json!({ "message": "Logged out" })),
    )
}

#[instrument(skip(state))]
pub async fn current_user(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let record = User::find_by_id(&state.db, user.id).await?.ok_or_else(|| {
        warn!(user_id = user.id, "token for missing user");
        AppError::unauthorized("User not found")
    })?;
    Ok(Json(record.into()))
}
