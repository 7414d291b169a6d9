use crate::{
    model::{Id, user::UserMarker},
    util::PositiveDuration,
};
use argon2::{
    Argon2, PasswordHasher, PasswordVerifier,
    password_hash::{self, PasswordHash, SaltString},
};
use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use thiserror::Error;
use time::UtcDateTime;

pub const PASSWORD_SALT_LEN: usize = 16;
pub const TOKEN_ID_LEN: usize = 16;
pub const TOKEN_ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Hashing password failed: {0}")]
pub struct PasswordHashError(password_hash::Error);

#[derive(Debug, Error)]
pub enum TokenEncodeError {
    #[error("Encoding token failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("Token expiry is out of range for an issue time of {0}")]
    ExpiryOutOfRange(UtcDateTime),
}

#[derive(Debug, Error)]
pub enum TokenDecodeError {
    #[error("Token was rejected: {0}")]
    Rejected(#[from] jsonwebtoken::errors::Error),
    #[error("Expected an access token, got a {0:?} token")]
    WrongTokenType(TokenType),
}

/// Argon2 digest of a password in PHC string format.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    /// Hashes `password` with a fresh random salt. This is deliberately slow,
    /// async callers should run it on a blocking thread.
    pub fn hash(password: &str) -> Result<Self, PasswordHashError> {
        let salt_bytes: [u8; PASSWORD_SALT_LEN] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes).map_err(PasswordHashError)?;

        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(PasswordHashError)?;

        Ok(Self(hash.to_string()))
    }

    /// `Ok(false)` means the password did not match, an error means the
    /// stored digest itself is unusable.
    pub fn verify(&self, password: &str) -> Result<bool, PasswordHashError> {
        let digest = PasswordHash::new(&self.0).map_err(PasswordHashError)?;

        match Argon2::default().verify_password(password.as_bytes(), &digest) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(err) => Err(PasswordHashError(err)),
        }
    }

    #[must_use]
    pub fn from_phc_string(phc: String) -> Self {
        Self(phc)
    }

    #[must_use]
    pub fn as_phc_str(&self) -> &str {
        &self.0
    }
}

impl Debug for PasswordDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PasswordDigest").field(&"[redacted]").finish()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct Claims {
    pub token_type: TokenType,
    pub user_id: Id<UserMarker>,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TokenPair {
    pub refresh: String,
    pub access: String,
}

impl Debug for TokenPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("refresh", &"[redacted]")
            .field("access", &"[redacted]")
            .finish()
    }
}

/// Signs and verifies the stateless token pairs handed out on signup and login.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_lifetime: PositiveDuration,
    refresh_lifetime: PositiveDuration,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(
        secret: &[u8],
        access_lifetime: PositiveDuration,
        refresh_lifetime: PositiveDuration,
    ) -> Self {
        let mut validation = Validation::new(TOKEN_ALGORITHM);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            access_lifetime,
            refresh_lifetime,
        }
    }

    pub fn issue_pair(&self, user_id: Id<UserMarker>) -> Result<TokenPair, TokenEncodeError> {
        self.issue_pair_at(user_id, UtcDateTime::now())
    }

    pub fn issue_pair_at(
        &self,
        user_id: Id<UserMarker>,
        issued_at: UtcDateTime,
    ) -> Result<TokenPair, TokenEncodeError> {
        Ok(TokenPair {
            refresh: self.encode(TokenType::Refresh, user_id, issued_at)?,
            access: self.encode(TokenType::Access, user_id, issued_at)?,
        })
    }

    fn encode(
        &self,
        token_type: TokenType,
        user_id: Id<UserMarker>,
        issued_at: UtcDateTime,
    ) -> Result<String, TokenEncodeError> {
        let lifetime = match token_type {
            TokenType::Access => self.access_lifetime,
            TokenType::Refresh => self.refresh_lifetime,
        };

        let claims = Claims {
            token_type,
            user_id,
            iat: issued_at.unix_timestamp(),
            exp: issued_at
                .checked_add(lifetime.get())
                .ok_or(TokenEncodeError::ExpiryOutOfRange(issued_at))?
                .unix_timestamp(),
            jti: generate_token_id(),
        };

        Ok(jsonwebtoken::encode(
            &Header::new(TOKEN_ALGORITHM),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Checks signature and expiry of any token issued here.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenDecodeError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }

    pub fn decode_access(&self, token: &str) -> Result<Id<UserMarker>, TokenDecodeError> {
        let claims = self.decode(token)?;

        match claims.token_type {
            TokenType::Access => Ok(claims.user_id),
            other => Err(TokenDecodeError::WrongTokenType(other)),
        }
    }
}

impl Debug for TokenIssuer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("keys", &"[redacted]")
            .field("access_lifetime", &self.access_lifetime)
            .field("refresh_lifetime", &self.refresh_lifetime)
            .finish_non_exhaustive()
    }
}

fn generate_token_id() -> String {
    let bytes: [u8; TOKEN_ID_LEN] = rand::random();
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use crate::{
        model::{
            Id,
            auth::{PasswordDigest, TokenDecodeError, TokenEncodeError, TokenIssuer, TokenType},
            user::UserMarker,
        },
        util::PositiveDuration,
    };
    use jsonwebtoken::errors::ErrorKind;
    use time::{Duration, UtcDateTime};

    fn issuer(secret: &[u8]) -> TokenIssuer {
        TokenIssuer::new(
            secret,
            PositiveDuration::from_seconds(300).unwrap(),
            PositiveDuration::from_seconds(86_400).unwrap(),
        )
    }

    #[test]
    fn password_digest_verifies() {
        let digest = PasswordDigest::hash("hunter2").unwrap();

        assert!(digest.as_phc_str().starts_with("$argon2id$"));
        assert!(!digest.as_phc_str().contains("hunter2"));
        assert!(digest.verify("hunter2").unwrap());
        assert!(!digest.verify("hunter3").unwrap());
    }

    #[test]
    fn password_digest_is_salted() {
        let first = PasswordDigest::hash("same").unwrap();
        let second = PasswordDigest::hash("same").unwrap();

        assert_ne!(first, second);
        assert!(second.verify("same").unwrap());
    }

    #[test]
    fn garbage_digest_is_an_error() {
        let digest = PasswordDigest::from_phc_string("not a phc string".to_owned());
        assert!(digest.verify("anything").is_err());
    }

    #[test]
    fn token_pair_is_bound_to_user() {
        let issuer = issuer(b"secret");
        let user_id = Id::<UserMarker>::from(1234_u64);

        let pair = issuer.issue_pair(user_id).unwrap();

        assert_eq!(issuer.decode_access(&pair.access).unwrap(), user_id);

        let refresh = issuer.decode(&pair.refresh).unwrap();
        assert_eq!(refresh.token_type, TokenType::Refresh);
        assert_eq!(refresh.user_id, user_id);
        assert_eq!(refresh.exp - refresh.iat, 86_400);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let issuer = issuer(b"secret");
        let pair = issuer.issue_pair(Id::from(1_u64)).unwrap();

        assert!(matches!(
            issuer.decode_access(&pair.refresh),
            Err(TokenDecodeError::WrongTokenType(TokenType::Refresh))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let issuer = issuer(b"secret");
        let pair = issuer
            .issue_pair_at(Id::from(1_u64), UtcDateTime::now() - Duration::hours(1))
            .unwrap();

        match issuer.decode_access(&pair.access) {
            Err(TokenDecodeError::Rejected(err)) => {
                assert!(matches!(err.kind(), ErrorKind::ExpiredSignature));
            }
            other => panic!("expected an expired token, got {other:?}"),
        }
        // the refresh token lives longer
        assert!(issuer.decode(&pair.refresh).is_ok());
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let pair = issuer(b"other secret").issue_pair(Id::from(1_u64)).unwrap();

        assert!(matches!(
            issuer(b"secret").decode_access(&pair.access),
            Err(TokenDecodeError::Rejected(_))
        ));
        assert!(issuer(b"secret").decode_access("not.a.token").is_err());
    }

    #[test]
    fn tokens_are_unique() {
        let issuer = issuer(b"secret");
        let now = UtcDateTime::now();

        let first = issuer.issue_pair_at(Id::from(1_u64), now).unwrap();
        let second = issuer.issue_pair_at(Id::from(1_u64), now).unwrap();

        assert_ne!(first.access, second.access);
    }

    #[test]
    fn oversized_lifetime_is_an_error() {
        let issuer = TokenIssuer::new(
            b"secret",
            PositiveDuration::from_seconds(300).unwrap(),
            PositiveDuration::from_seconds(i64::MAX / 2).unwrap(),
        );

        assert!(matches!(
            issuer.issue_pair(Id::from(1_u64)),
            Err(TokenEncodeError::ExpiryOutOfRange(_))
        ));
    }
}
