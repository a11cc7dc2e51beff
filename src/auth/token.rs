//! Access tokens.
//!
//! A raw token reads `showcase_<lookup>_<secret>`. The lookup finds the stored
//! row; the token itself is only ever kept as an argon2id hash.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{Role, Token, User};

const ARGON2_MEMORY_KIB: u32 = 64 * 1024;
const ARGON2_ITERATIONS: u32 = 1;
const ARGON2_PARALLELISM: u32 = 4;
const ARGON2_OUTPUT_LEN: usize = 32;

const TOKEN_PREFIX: &str = "showcase";
const LOOKUP_LENGTH: usize = 8;
const SECRET_BYTES: usize = 12;
const SECRET_LENGTH: usize = SECRET_BYTES * 2;

pub const PARENT_TOKEN_DAYS: i64 = 90;

/// Lifetime a user's token gets when the admin does not pick one.
/// Parent tokens lapse after [`PARENT_TOKEN_DAYS`]; the rest last until revoked.
#[must_use]
pub fn default_lifetime(role: Role) -> Option<Duration> {
    match role {
        Role::Parent => Some(Duration::days(PARENT_TOKEN_DAYS)),
        Role::Student | Role::Teacher => None,
    }
}

/// A freshly minted token. `raw` is handed out once and never stored.
#[derive(Debug)]
pub struct IssuedToken {
    pub raw: String,
    pub token: Token,
}

/// The two halves of a raw token.
#[derive(Debug, PartialEq, Eq)]
pub struct TokenParts<'a> {
    pub lookup: &'a str,
    pub secret: &'a str,
}

pub struct TokenIssuer {
    argon2: Argon2<'static>,
}

impl TokenIssuer {
    pub fn new() -> Result<Self> {
        Self::with_cost(ARGON2_MEMORY_KIB, ARGON2_ITERATIONS, ARGON2_PARALLELISM)
    }

    fn with_cost(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, Some(ARGON2_OUTPUT_LEN))
            .map_err(|e| Error::Hash(format!("invalid argon2 parameters: {e}")))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Issues a token that never expires and carries no user.
    pub fn issue_admin(&self) -> Result<IssuedToken> {
        self.issue(None, None)
    }

    /// Issues a token for `user`. Without a lifetime the role default applies.
    pub fn issue_for(&self, user: &User, lifetime: Option<Duration>) -> Result<IssuedToken> {
        let lifetime = lifetime.or_else(|| default_lifetime(user.role));
        self.issue(Some(user), lifetime)
    }

    fn issue(&self, user: Option<&User>, lifetime: Option<Duration>) -> Result<IssuedToken> {
        let lookup = generate_lookup();
        let raw = format!("{TOKEN_PREFIX}_{lookup}_{}", generate_secret());
        let now = Utc::now();

        let token = Token {
            id: Uuid::new_v4().to_string(),
            token_hash: self.hash(&raw)?,
            token_lookup: lookup,
            is_admin: user.is_none(),
            user_id: user.map(|u| u.id.clone()),
            created_at: now,
            expires_at: lifetime.map(|lifetime| now + lifetime),
            last_used_at: None,
        };

        Ok(IssuedToken { raw, token })
    }

    fn hash(&self, raw: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(raw.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::Hash(e.to_string()))
    }
}

/// Checks a raw token against a stored PHC string, using the parameters the
/// string records.
pub fn verify_token(raw: &str, hash: &str) -> Result<bool> {
    let parsed =
        PasswordHash::new(hash).map_err(|e| Error::Hash(format!("invalid hash format: {e}")))?;

    match Argon2::default().verify_password(raw.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(Error::Hash(e.to_string())),
    }
}

pub fn parse_token(raw: &str) -> Result<TokenParts<'_>> {
    let (lookup, secret) = raw
        .strip_prefix(TOKEN_PREFIX)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|rest| rest.split_once('_'))
        .ok_or(Error::InvalidTokenFormat)?;

    let is_hex = |s: &str| s.bytes().all(|b| b.is_ascii_hexdigit());
    if lookup.len() != LOOKUP_LENGTH
        || secret.len() != SECRET_LENGTH
        || !is_hex(lookup)
        || !is_hex(secret)
    {
        return Err(Error::InvalidTokenFormat);
    }

    Ok(TokenParts { lookup, secret })
}

fn generate_lookup() -> String {
    let mut lookup = Uuid::new_v4().simple().to_string();
    lookup.truncate(LOOKUP_LENGTH);
    lookup
}

fn generate_secret() -> String {
    let bytes: [u8; SECRET_BYTES] = rand::thread_rng().r#gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        User {
            id: "user-1".to_string(),
            username: "ada".to_string(),
            role,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_issued_token_round_trips_through_parse() {
        let issued = TokenIssuer::new().unwrap().issue_admin().unwrap();

        let parts = parse_token(&issued.raw).unwrap();
        assert_eq!(parts.lookup, issued.token.token_lookup);
        assert_eq!(parts.secret.len(), 24);
        assert!(issued.raw.starts_with("showcase_"));
        assert!(issued.token.is_admin);
        assert!(issued.token.user_id.is_none());
        assert!(issued.token.expires_at.is_none());
        assert!(issued.token.token_hash.starts_with("$argon2id$"));
    }

    #[test]
    fn test_bad_argon2_cost_is_an_error() {
        assert!(matches!(
            TokenIssuer::with_cost(ARGON2_MEMORY_KIB, ARGON2_ITERATIONS, 0),
            Err(Error::Hash(_))
        ));
    }

    #[test]
    fn test_verify_token() {
        let issued = TokenIssuer::new().unwrap().issue_admin().unwrap();

        assert!(verify_token(&issued.raw, &issued.token.token_hash).unwrap());

        let mut wrong = issued.raw.clone();
        wrong.replace_range(wrong.len() - 4.., "0000");
        if wrong == issued.raw {
            wrong.replace_range(wrong.len() - 4.., "ffff");
        }
        assert!(!verify_token(&wrong, &issued.token.token_hash).unwrap());

        assert!(matches!(
            verify_token(&issued.raw, "not-a-hash"),
            Err(Error::Hash(_))
        ));
    }

    #[test]
    fn test_role_decides_default_lifetime() {
        let issuer = TokenIssuer::new().unwrap();

        let student = issuer.issue_for(&user(Role::Student), None).unwrap();
        assert!(student.token.expires_at.is_none());
        assert!(!student.token.is_admin);
        assert_eq!(student.token.user_id.as_deref(), Some("user-1"));

        let parent = issuer.issue_for(&user(Role::Parent), None).unwrap();
        let lifetime = parent.token.expires_at.unwrap() - parent.token.created_at;
        assert_eq!(lifetime, Duration::days(PARENT_TOKEN_DAYS));

        let short = issuer
            .issue_for(&user(Role::Parent), Some(Duration::hours(1)))
            .unwrap();
        let lifetime = short.token.expires_at.unwrap() - short.token.created_at;
        assert_eq!(lifetime, Duration::hours(1));
    }

    #[test]
    fn test_parse_token_rejects_malformed() {
        for raw in [
            "invalid_12345678_123456789012345678901234",
            "showcase_12345678",
            "showcase12345678_123456789012345678901234",
            "showcase_1234567z_123456789012345678901234",
            "showcase_12345678_zzzzzzzzzzzzzzzzzzzzzzzz",
            "showcase_12345678_1234567890123456789012345",
            "showcase_12345678_12345678901234567890123_",
        ] {
            assert!(
                matches!(parse_token(raw), Err(Error::InvalidTokenFormat)),
                "{raw}"
            );
        }
    }
}
