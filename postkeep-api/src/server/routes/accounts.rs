use crate::server::{
    Result, ServerError, ServerRouter, ServerState,
    json::{Created, Json},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use postkeep_common::model::{
    auth::{PasswordDigest, TokenIssuer, TokenPair},
    user::{CreateUser, User, Username, check_email},
};
use postkeep_db::repository::UserRepository;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::spawn_blocking;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_post(signup).typed_post(login)
}

#[derive(Serialize)]
struct AccountResponse {
    message: &'static str,
    user: User,
    tokens: TokenPair,
}

/// Empty strings count as missing.
fn present(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.is_empty())
}

#[derive(TypedPath)]
#[typed_path("/signup")]
struct SignupPath;

#[derive(Deserialize)]
struct SignupRequest {
    username: Option<String>,
    password: Option<String>,
    email: Option<String>,
}

#[axum::debug_handler(state = ServerState)]
async fn signup(
    SignupPath: SignupPath,
    State(users): State<Arc<dyn UserRepository>>,
    State(tokens): State<Arc<TokenIssuer>>,
    Json(request): Json<SignupRequest>,
) -> Result<Created<AccountResponse>> {
    let (Some(username), Some(password), Some(email)) = (
        present(request.username),
        present(request.password),
        present(request.email),
    ) else {
        return Err(ServerError::MissingFields("All fields are required."));
    };

    let username = Username::new(username)?;
    check_email(&email)?;
    let password = spawn_blocking(move || PasswordDigest::hash(&password)).await??;

    let user = users
        .create_user(&CreateUser {
            username,
            email,
            password,
        })
        .await?;
    let tokens = tokens.issue_pair(user.id)?;

    info!(user_id = %user.id, username = user.username.get(), "User signed up");

    Ok(Created(AccountResponse {
        message: "User created successfully",
        user,
        tokens,
    }))
}

#[derive(TypedPath)]
#[typed_path("/login")]
struct LoginPath;

#[derive(Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

#[axum::debug_handler(state = ServerState)]
async fn login(
    LoginPath: LoginPath,
    State(users): State<Arc<dyn UserRepository>>,
    State(tokens): State<Arc<TokenIssuer>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AccountResponse>> {
    let (Some(email), Some(password)) = (present(request.email), present(request.password))
    else {
        return Err(ServerError::MissingFields("Email and password are required."));
    };

    let credentials = users
        .fetch_credentials_by_email(&email)
        .await?
        .ok_or(ServerError::UserByEmailNotFound)?;

    let digest = credentials.password;
    if !spawn_blocking(move || digest.verify(&password)).await?? {
        info!(user_id = %credentials.user.id, "Login with wrong password");
        return Err(ServerError::InvalidCredentials);
    }

    let tokens = tokens.issue_pair(credentials.user.id)?;

    info!(user_id = %credentials.user.id, "User logged in");

    Ok(Json(AccountResponse {
        message: "Login successful",
        user: credentials.user,
        tokens,
    }))
}
