use crate::server::{
    Result, ServerError, ServerRouter, ServerState,
    auth::AuthenticatedUser,
    json::{Created, Json},
};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use postkeep_common::model::{
    Id,
    post::{Post, PostContent, PostDraft, PostMarker, PostPatch},
};
use postkeep_db::repository::PostRepository;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(list_posts)
        .typed_post(create_post)
        .typed_get(get_post)
        .typed_put(update_post)
        .typed_delete(delete_post)
}

#[derive(TypedPath)]
#[typed_path("/posts/")]
struct PostsPath;

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}", rejection(ServerError))]
struct PostPath {
    id: Id<PostMarker>,
}

#[axum::debug_handler(state = ServerState)]
async fn list_posts(
    PostsPath: PostsPath,
    State(posts): State<Arc<dyn PostRepository>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Post>>> {
    let posts = posts.list_by_owner(user.user_id()).await?;

    Ok(Json(posts))
}

#[axum::debug_handler(state = ServerState)]
async fn create_post(
    PostsPath: PostsPath,
    State(posts): State<Arc<dyn PostRepository>>,
    user: AuthenticatedUser,
    Json(draft): Json<PostDraft>,
) -> Result<Created<Post>> {
    let content = PostContent::try_from(draft)?;
    let post = posts.create(user.user_id(), &content).await?;

    debug!(post_id = %post.id, user_id = %user.user_id(), "Created post");

    Ok(Created(post))
}

#[axum::debug_handler(state = ServerState)]
async fn get_post(
    PostPath { id }: PostPath,
    State(posts): State<Arc<dyn PostRepository>>,
    user: AuthenticatedUser,
) -> Result<Json<Post>> {
    let post = posts
        .get_by_id_and_owner(id, user.user_id())
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(post))
}

#[axum::debug_handler(state = ServerState)]
async fn update_post(
    PostPath { id }: PostPath,
    State(posts): State<Arc<dyn PostRepository>>,
    user: AuthenticatedUser,
    Json(draft): Json<PostDraft>,
) -> Result<Json<Post>> {
    let patch = match PostPatch::try_from(draft) {
        Ok(patch) => patch,
        Err(errors) => {
            // a missing post takes precedence over a bad payload
            posts
                .get_by_id_and_owner(id, user.user_id())
                .await?
                .ok_or(ServerError::PostByIdNotFound(id))?;
            return Err(errors.into());
        }
    };

    let post = posts
        .update(id, user.user_id(), &patch)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    debug!(post_id = %id, user_id = %user.user_id(), "Updated post");

    Ok(Json(post))
}

#[axum::debug_handler(state = ServerState)]
async fn delete_post(
    PostPath { id }: PostPath,
    State(posts): State<Arc<dyn PostRepository>>,
    user: AuthenticatedUser,
) -> Result<StatusCode> {
    if !posts.delete(id, user.user_id()).await? {
        return Err(ServerError::PostByIdNotFound(id));
    }

    debug!(post_id = %id, user_id = %user.user_id(), "Deleted post");

    Ok(StatusCode::NO_CONTENT)
}
