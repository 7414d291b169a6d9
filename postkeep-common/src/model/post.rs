use crate::{
    model::{Id, user::UserMarker},
    validation::{FieldErrors, REQUIRED, max_chars, non_blank},
};
use serde::{Deserialize, Serialize};

pub const POST_TITLE_MAX_LEN: usize = 200;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub author: Id<UserMarker>,
    pub title: String,
    pub content: String,
}

/// A post body as sent by a client, before validation.
///
/// Anything else in the body, `author` and `id` included, is ignored: the
/// author of a post is always the authenticated user.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub struct PostDraft {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Validated fields of a new post.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct PostContent {
    pub title: String,
    pub content: String,
}

/// Validated partial update of a post. `None` leaves the field untouched.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct PostPatch {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl PostPatch {
    pub fn apply(&self, post: &mut Post) {
        if let Some(title) = &self.title {
            post.title.clone_from(title);
        }
        if let Some(content) = &self.content {
            post.content.clone_from(content);
        }
    }
}

fn validate_title(title: &str, errors: &mut FieldErrors) -> Option<String> {
    max_chars(title.trim().to_owned(), POST_TITLE_MAX_LEN)
        .map_err(|message| errors.add("title", message))
        .ok()
}

fn validate_content(content: &str, errors: &mut FieldErrors) -> Option<String> {
    non_blank(content)
        .map_err(|message| errors.add("content", message))
        .ok()
}

impl TryFrom<PostDraft> for PostContent {
    type Error = FieldErrors;

    fn try_from(draft: PostDraft) -> Result<Self, Self::Error> {
        let mut errors = FieldErrors::new();

        let title = validate_title(draft.title.as_deref().unwrap_or_default(), &mut errors);
        let content = match draft.content {
            Some(content) => validate_content(&content, &mut errors),
            None => {
                errors.add("content", REQUIRED);
                None
            }
        };

        errors.into_result(())?;
        Ok(Self {
            title: title.unwrap_or_default(),
            content: content.unwrap_or_default(),
        })
    }
}

impl TryFrom<PostDraft> for PostPatch {
    type Error = FieldErrors;

    fn try_from(draft: PostDraft) -> Result<Self, Self::Error> {
        let mut errors = FieldErrors::new();

        let title = draft
            .title
            .and_then(|title| validate_title(&title, &mut errors));
        let content = draft
            .content
            .and_then(|content| validate_content(&content, &mut errors));

        errors.into_result(Self { title, content })
    }
}
