use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use json::Json;
use postkeep_common::{
    model::{
        Id,
        auth::{PasswordHashError, TokenDecodeError, TokenEncodeError, TokenIssuer},
        post::PostMarker,
        user::{InvalidEmailError, InvalidUsernameError, UserMarker},
    },
    validation::FieldErrors,
};
use postkeep_db::repository::{DbError, PostRepository, UserRepository};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, error};

mod auth;
mod json;
mod routes;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub users: Arc<dyn UserRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub tokens: Arc<TokenIssuer>,
}

impl ServerState {
    pub fn new<R>(repository: Arc<R>, tokens: TokenIssuer) -> Self
    where
        R: UserRepository + PostRepository + 'static,
    {
        Self {
            users: repository.clone(),
            posts: repository,
            tokens: Arc::new(tokens),
        }
    }
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("{0}")]
    MissingFields(&'static str),
    #[error(transparent)]
    InvalidUsername(#[from] InvalidUsernameError),
    #[error(transparent)]
    InvalidEmail(#[from] InvalidEmailError),
    #[error(transparent)]
    InvalidPost(#[from] FieldErrors),
    #[error("Authorization header was missing or invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("The provided token is invalid: {0}")]
    InvalidToken(#[from] TokenDecodeError),
    #[error("The user of the provided token does not exist.")]
    UnknownTokenUser(Id<UserMarker>),
    #[error("Invalid credentials.")]
    InvalidCredentials,
    #[error("No user with this email exists.")]
    UserByEmailNotFound,
    #[error("Post with id {0} was not found.")]
    PostByIdNotFound(Id<PostMarker>),
    #[error(transparent)]
    PasswordHash(#[from] PasswordHashError),
    #[error(transparent)]
    TokenEncode(#[from] TokenEncodeError),
    #[error("Blocking task failed: {0}")]
    Blocking(#[from] JoinError),
    #[error(transparent)]
    Database(#[from] DbError),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::JsonRejection(_)
            | ServerError::MissingFields(_)
            | ServerError::InvalidUsername(_)
            | ServerError::InvalidEmail(_)
            | ServerError::InvalidPost(_) => StatusCode::BAD_REQUEST,
            ServerError::InvalidAuthorizationHeader(_)
            | ServerError::InvalidToken(_)
            | ServerError::UnknownTokenUser(_)
            | ServerError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::UserByEmailNotFound
            | ServerError::PostByIdNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Database(DbError::Conflict(_)) => StatusCode::CONFLICT,
            ServerError::JsonResponse(_)
            | ServerError::PasswordHash(_)
            | ServerError::TokenEncode(_)
            | ServerError::Blocking(_)
            | ServerError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<FieldErrors>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        let error = if status.is_server_error() {
            error!(error = %self, %status, "Replying with error");
            "Internal server error".to_owned()
        } else {
            debug!(error = %self, %status, "Rejecting request");
            self.to_string()
        };

        let fields = match self {
            ServerError::InvalidPost(fields) => Some(fields),
            _ => None,
        };

        let error_response = ErrorResponse {
            status: status.as_u16(),
            error,
            fields,
        };
        (status, Json(error_response)).into_response()
    }
}
