use crate::{
    record::{CredentialsRecord, PostRecord, UserRecord},
    repository::{IdGenerator, PostRepository, Result, UserRepository},
};
use async_trait::async_trait;
use postkeep_common::{
    model::{
        Id,
        post::{Post, PostContent, PostMarker, PostPatch},
        user::{CreateUser, Credentials, User, UserMarker},
    },
    snowflake::{ProcessId, WorkerId},
};
use sqlx::{PgPool, migrate::Migrator, postgres::PgPoolOptions, query, query_as};
use tracing::info;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Postgres backed storage.
#[derive(Debug)]
pub struct DbClient {
    pool: PgPool,
    ids: IdGenerator,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            pool,
            ids: IdGenerator::new(worker_id, process_id),
        }
    }

    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        worker_id: WorkerId,
        process_id: ProcessId,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self::new(pool, worker_id, process_id))
    }

    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        info!("Database schema is up to date");

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl UserRepository for DbClient {
    async fn create_user(&self, user: &CreateUser) -> Result<User> {
        let user_id = self.ids.next::<UserMarker>()?;

        let record = query_as::<_, UserRecord>(
            "
            INSERT INTO users.users (user_snowflake, username, email, password)
            VALUES ($1, $2, $3, $4)
            RETURNING user_snowflake, username, email
            ",
        )
        .bind(user_id.to_db())
        .bind(user.username.get())
        .bind(&user.email)
        .bind(user.password.as_phc_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(User::try_from(record)?)
    }

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.user_snowflake,
                users.username,
                users.email
            FROM
                users.users
            WHERE
                users.user_snowflake = $1
            ",
        )
        .bind(user_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    async fn fetch_credentials_by_email(&self, email: &str) -> Result<Option<Credentials>> {
        let record = query_as::<_, CredentialsRecord>(
            "
            SELECT
                users.user_snowflake,
                users.username,
                users.email,
                users.password
            FROM
                users.users
            WHERE
                users.email = $1
            ",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        let credentials = record.map(Credentials::try_from).transpose()?;
        Ok(credentials)
    }
}

#[async_trait]
impl PostRepository for DbClient {
    async fn list_by_owner(&self, owner: Id<UserMarker>) -> Result<Vec<Post>> {
        let records = query_as::<_, PostRecord>(
            "
            SELECT
                posts.post_snowflake,
                posts.user_snowflake,
                posts.title,
                posts.content
            FROM
                posts.posts
            WHERE
                posts.user_snowflake = $1
            ORDER BY
                posts.post_snowflake
            ",
        )
        .bind(owner.to_db())
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Post::from).collect())
    }

    async fn get_by_id_and_owner(
        &self,
        post_id: Id<PostMarker>,
        owner: Id<UserMarker>,
    ) -> Result<Option<Post>> {
        let record = query_as::<_, PostRecord>(
            "
            SELECT
                posts.post_snowflake,
                posts.user_snowflake,
                posts.title,
                posts.content
            FROM
                posts.posts
            WHERE
                posts.post_snowflake = $1 AND posts.user_snowflake = $2
            ",
        )
        .bind(post_id.to_db())
        .bind(owner.to_db())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Post::from))
    }

    async fn create(&self, owner: Id<UserMarker>, content: &PostContent) -> Result<Post> {
        let post_id = self.ids.next::<PostMarker>()?;

        let record = query_as::<_, PostRecord>(
            "
            INSERT INTO posts.posts (post_snowflake, user_snowflake, title, content)
            VALUES ($1, $2, $3, $4)
            RETURNING post_snowflake, user_snowflake, title, content
            ",
        )
        .bind(post_id.to_db())
        .bind(owner.to_db())
        .bind(&content.title)
        .bind(&content.content)
        .fetch_one(&self.pool)
        .await?;

        Ok(record.into())
    }

    async fn update(
        &self,
        post_id: Id<PostMarker>,
        owner: Id<UserMarker>,
        patch: &PostPatch,
    ) -> Result<Option<Post>> {
        let record = query_as::<_, PostRecord>(
            "
            UPDATE posts.posts
            SET
                title = COALESCE($3, posts.title),
                content = COALESCE($4, posts.content)
            WHERE
                posts.post_snowflake = $1 AND posts.user_snowflake = $2
            RETURNING post_snowflake, user_snowflake, title, content
            ",
        )
        .bind(post_id.to_db())
        .bind(owner.to_db())
        .bind(patch.title.as_deref())
        .bind(patch.content.as_deref())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Post::from))
    }

    async fn delete(&self, post_id: Id<PostMarker>, owner: Id<UserMarker>) -> Result<bool> {
        let result = query(
            "
            DELETE FROM posts.posts
            WHERE posts.post_snowflake = $1 AND posts.user_snowflake = $2
            ",
        )
        .bind(post_id.to_db())
        .bind(owner.to_db())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
