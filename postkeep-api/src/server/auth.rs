use crate::server::ServerError;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use postkeep_common::model::{Id, auth::TokenIssuer, user::UserMarker};
use postkeep_db::repository::UserRepository;
use std::sync::Arc;
use tracing::debug;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// The user a request's bearer access token was issued to.
///
/// Extracting this rejects the request with 401 unless the token has a valid
/// signature, is not expired, is an access token and its user still exists.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct AuthenticatedUser {
    id: Id<UserMarker>,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user_id(self) -> Id<UserMarker> {
        self.id
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<TokenIssuer>: FromRef<S>,
    Arc<dyn UserRepository>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user_id = {
            let header = AuthorizationHeader::from_request_parts(parts, state)
                .await
                .map_err(ServerError::InvalidAuthorizationHeader)?;

            Arc::<TokenIssuer>::from_ref(state).decode_access(header.token())?
        };

        let users = Arc::<dyn UserRepository>::from_ref(state);
        if users.fetch_user(user_id).await?.is_none() {
            return Err(ServerError::UnknownTokenUser(user_id));
        }

        debug!(%user_id, "Authenticated request");
        Ok(Self { id: user_id })
    }
}
