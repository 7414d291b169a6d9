use crate::repository::{
    DbError, IdGenerator, PostRepository, Result, UniqueField, UserRepository,
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
use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

#[derive(Debug, Default)]
struct MemoryState {
    users: BTreeMap<Id<UserMarker>, Credentials>,
    posts: BTreeMap<Id<PostMarker>, Post>,
}

/// Process-local storage, for development without a database and for tests.
///
/// Every operation holds one lock for its whole duration, so each one is
/// atomic just like a single statement against Postgres.
#[derive(Debug)]
pub struct MemoryClient {
    state: Mutex<MemoryState>,
    ids: IdGenerator,
}

impl MemoryClient {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            state: Mutex::default(),
            ids: IdGenerator::new(worker_id, process_id),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new(WorkerId::default(), ProcessId::default())
    }
}

#[async_trait]
impl UserRepository for MemoryClient {
    async fn create_user(&self, user: &CreateUser) -> Result<User> {
        let mut state = self.state();

        for existing in state.users.values() {
            if existing.user.username == user.username {
                return Err(DbError::Conflict(UniqueField::Username));
            }
            if existing.user.email == user.email {
                return Err(DbError::Conflict(UniqueField::Email));
            }
        }

        let created = User {
            id: self.ids.next()?,
            username: user.username.clone(),
            email: user.email.clone(),
        };
        state.users.insert(
            created.id,
            Credentials {
                user: created.clone(),
                password: user.password.clone(),
            },
        );

        Ok(created)
    }

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        Ok(self
            .state()
            .users
            .get(&user_id)
            .map(|credentials| credentials.user.clone()))
    }

    async fn fetch_credentials_by_email(&self, email: &str) -> Result<Option<Credentials>> {
        Ok(self
            .state()
            .users
            .values()
            .find(|credentials| credentials.user.email == email)
            .cloned())
    }
}

#[async_trait]
impl PostRepository for MemoryClient {
    async fn list_by_owner(&self, owner: Id<UserMarker>) -> Result<Vec<Post>> {
        Ok(self
            .state()
            .posts
            .values()
            .filter(|post| post.author == owner)
            .cloned()
            .collect())
    }

    async fn get_by_id_and_owner(
        &self,
        post_id: Id<PostMarker>,
        owner: Id<UserMarker>,
    ) -> Result<Option<Post>> {
        Ok(self
            .state()
            .posts
            .get(&post_id)
            .filter(|post| post.author == owner)
            .cloned())
    }

    async fn create(&self, owner: Id<UserMarker>, content: &PostContent) -> Result<Post> {
        let post = Post {
            id: self.ids.next()?,
            author: owner,
            title: content.title.clone(),
            content: content.content.clone(),
        };
        self.state().posts.insert(post.id, post.clone());

        Ok(post)
    }

    async fn update(
        &self,
        post_id: Id<PostMarker>,
        owner: Id<UserMarker>,
        patch: &PostPatch,
    ) -> Result<Option<Post>> {
        let mut state = self.state();
        let Some(post) = state
            .posts
            .get_mut(&post_id)
            .filter(|post| post.author == owner)
        else {
            return Ok(None);
        };

        patch.apply(post);
        Ok(Some(post.clone()))
    }

    async fn delete(&self, post_id: Id<PostMarker>, owner: Id<UserMarker>) -> Result<bool> {
        let mut state = self.state();
        if state
            .posts
            .get(&post_id)
            .is_some_and(|post| post.author == owner)
        {
            state.posts.remove(&post_id);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        memory::MemoryClient,
        repository::{DbError, PostRepository, UniqueField, UserRepository},
    };
    use postkeep_common::model::{
        Id,
        auth::PasswordDigest,
        post::{PostContent, PostPatch},
        user::{CreateUser, User, Username},
    };

    fn create_user(username: &str, email: &str) -> CreateUser {
        CreateUser {
            username: Username::new(username.to_owned()).unwrap(),
            email: email.to_owned(),
            // never verified here, hashing would only slow the tests down
            password: PasswordDigest::from_phc_string(String::new()),
        }
    }

    async fn user(client: &MemoryClient, username: &str) -> User {
        client
            .create_user(&create_user(username, &format!("{username}@example.com")))
            .await
            .unwrap()
    }

    fn content(content: &str) -> PostContent {
        PostContent {
            title: String::new(),
            content: content.to_owned(),
        }
    }

    #[tokio::test]
    async fn usernames_and_emails_are_unique() {
        let client = MemoryClient::default();
        user(&client, "alice").await;

        let err = client
            .create_user(&create_user("alice", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(UniqueField::Username)));

        let err = client
            .create_user(&create_user("bob", "alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(UniqueField::Email)));
    }

    #[tokio::test]
    async fn credentials_by_email() {
        let client = MemoryClient::default();
        let alice = user(&client, "alice").await;

        let credentials = client
            .fetch_credentials_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(credentials.user, alice);
        assert!(
            client
                .fetch_credentials_by_email("nobody@example.com")
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(client.fetch_user(alice.id).await.unwrap(), Some(alice));
    }

    #[tokio::test]
    async fn posts_are_scoped_to_their_owner() {
        let client = MemoryClient::default();
        let alice = user(&client, "alice").await;
        let bob = user(&client, "bob").await;

        let first = client.create(alice.id, &content("first")).await.unwrap();
        let second = client.create(alice.id, &content("second")).await.unwrap();
        client.create(bob.id, &content("bob's")).await.unwrap();

        assert_eq!(first.author, alice.id);
        assert_eq!(
            client.list_by_owner(alice.id).await.unwrap(),
            [first.clone(), second]
        );
        assert_eq!(client.list_by_owner(bob.id).await.unwrap().len(), 1);

        assert_eq!(
            client.get_by_id_and_owner(first.id, alice.id).await.unwrap(),
            Some(first.clone())
        );
        assert_eq!(
            client.get_by_id_and_owner(first.id, bob.id).await.unwrap(),
            None
        );

        let patch = PostPatch {
            title: None,
            content: Some("hijacked".to_owned()),
        };
        assert_eq!(client.update(first.id, bob.id, &patch).await.unwrap(), None);
        assert!(!client.delete(first.id, bob.id).await.unwrap());
        assert_eq!(
            client.get_by_id_and_owner(first.id, alice.id).await.unwrap(),
            Some(first)
        );
    }

    #[tokio::test]
    async fn update_and_delete() {
        let client = MemoryClient::default();
        let alice = user(&client, "alice").await;
        let post = client.create(alice.id, &content("draft")).await.unwrap();

        let patch = PostPatch {
            title: Some("Title".to_owned()),
            content: None,
        };
        let updated = client
            .update(post.id, alice.id, &patch)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "Title");
        assert_eq!(updated.content, "draft");
        assert_eq!(updated.author, alice.id);

        assert!(client.delete(post.id, alice.id).await.unwrap());
        assert!(!client.delete(post.id, alice.id).await.unwrap());
        assert_eq!(
            client.get_by_id_and_owner(post.id, alice.id).await.unwrap(),
            None
        );
        assert_eq!(
            client.update(Id::from(1_u64), alice.id, &patch).await.unwrap(),
            None
        );
    }
}
