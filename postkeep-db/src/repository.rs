use async_trait::async_trait;
use postkeep_common::{
    model::{
        Id, ModelValidationError, PostkeepSnowflakeGenerator,
        post::{Post, PostContent, PostMarker, PostPatch},
        user::{CreateUser, Credentials, User, UserMarker},
    },
    snowflake::{ProcessId, SnowflakeTimestampError, WorkerId},
};
use sqlx::migrate::MigrateError;
use std::{
    fmt::{Debug, Display, Formatter},
    sync::{Mutex, PoisonError},
};
use thiserror::Error;

pub const USERNAME_CONSTRAINT: &str = "users_username_unique";
pub const EMAIL_CONSTRAINT: &str = "users_email_unique";

pub type Result<T, E = DbError> = std::result::Result<T, E>;

/// A user column that must be unique across all users.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum UniqueField {
    Username,
    Email,
}

impl Display for UniqueField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            UniqueField::Username => "username",
            UniqueField::Email => "email",
        })
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("A user with this {0} already exists.")]
    Conflict(UniqueField),
    #[error("Could not generate an id: {0}")]
    Snowflake(#[from] SnowflakeTimestampError),
    #[error("Migrating the database failed: {0}")]
    Migrate(#[from] MigrateError),
    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err
            && db_err.is_unique_violation()
        {
            match db_err.constraint() {
                Some(USERNAME_CONSTRAINT) => return DbError::Conflict(UniqueField::Username),
                Some(EMAIL_CONSTRAINT) => return DbError::Conflict(UniqueField::Email),
                _ => {}
            }
        }

        DbError::Sqlx(err)
    }
}

/// Storage of accounts. Implementations enforce unique usernames and emails
/// and report violations as [`DbError::Conflict`].
#[async_trait]
pub trait UserRepository: Debug + Send + Sync {
    async fn create_user(&self, user: &CreateUser) -> Result<User>;

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>>;

    async fn fetch_credentials_by_email(&self, email: &str) -> Result<Option<Credentials>>;
}

/// Storage of posts. Every operation is scoped to the owning user, a post of
/// another user behaves exactly like a missing one.
#[async_trait]
pub trait PostRepository: Debug + Send + Sync {
    async fn list_by_owner(&self, owner: Id<UserMarker>) -> Result<Vec<Post>>;

    async fn get_by_id_and_owner(
        &self,
        post_id: Id<PostMarker>,
        owner: Id<UserMarker>,
    ) -> Result<Option<Post>>;

    async fn create(&self, owner: Id<UserMarker>, content: &PostContent) -> Result<Post>;

    /// `None` if no such post exists for `owner`. The author is never changed.
    async fn update(
        &self,
        post_id: Id<PostMarker>,
        owner: Id<UserMarker>,
        patch: &PostPatch,
    ) -> Result<Option<Post>>;

    /// `false` if no such post exists for `owner`.
    async fn delete(&self, post_id: Id<PostMarker>, owner: Id<UserMarker>) -> Result<bool>;
}

#[derive(Debug)]
pub struct IdGenerator(Mutex<PostkeepSnowflakeGenerator>);

impl IdGenerator {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self(Mutex::new(PostkeepSnowflakeGenerator::new(
            worker_id, process_id,
        )))
    }

    pub fn next<Marker>(&self) -> Result<Id<Marker>> {
        let snowflake = self
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()?;

        Ok(snowflake.into())
    }
}
