use crate::model::{Id, auth::PasswordDigest};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;

pub const USERNAME_MAX_LEN: usize = 150;
pub const EMAIL_MAX_LEN: usize = 254;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

/// The public face of an account, as returned by signup and login.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct User {
    pub id: Id<UserMarker>,
    pub username: Username,
    pub email: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreateUser {
    pub username: Username,
    pub email: String,
    pub password: PasswordDigest,
}

/// A user together with the stored digest of their password.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Credentials {
    pub user: User,
    pub password: PasswordDigest,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct Username(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The username is invalid: {0:?}")]
pub struct InvalidUsernameError(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The email address has {0} characters, at most 254 are allowed.")]
pub struct InvalidEmailError(usize);

/// Emails are only checked against the size of their column.
pub fn check_email(email: &str) -> Result<(), InvalidEmailError> {
    let len = email.chars().count();
    if len <= EMAIL_MAX_LEN {
        Ok(())
    } else {
        Err(InvalidEmailError(len))
    }
}

impl Username {
    pub fn new(username: String) -> Result<Self, InvalidUsernameError> {
        let len = username.chars().count();
        if len > 0 && len <= USERNAME_MAX_LEN {
            Ok(Username(username))
        } else {
            Err(InvalidUsernameError(username))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for Username {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Username::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"Username"))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::user::{EMAIL_MAX_LEN, USERNAME_MAX_LEN, Username, check_email};

    #[test]
    fn username_bounds() {
        assert!(Username::new(String::new()).is_err());
        assert!(Username::new("a".repeat(USERNAME_MAX_LEN)).is_ok());
        assert!(Username::new("a".repeat(USERNAME_MAX_LEN + 1)).is_err());
        // counted in characters, not bytes
        assert!(Username::new("ü".repeat(USERNAME_MAX_LEN)).is_ok());
    }

    #[test]
    fn username_deserialize_validates() {
        assert_eq!(
            serde_json::from_str::<Username>("\"alice\"").unwrap().get(),
            "alice"
        );
        assert!(serde_json::from_str::<Username>("\"\"").is_err());
    }

    #[test]
    fn email_bounds() {
        assert!(check_email("alice@example.com").is_ok());
        assert!(check_email(&"a".repeat(EMAIL_MAX_LEN)).is_ok());
        assert!(check_email(&"a".repeat(EMAIL_MAX_LEN + 1)).is_err());
    }
}
