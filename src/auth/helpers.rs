use chrono::Utc;

use super::{parse_token, verify_token};
use crate::server::AppState;
use crate::types::{Token, User};

#[derive(Debug)]
pub enum TokenValidationError {
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    InternalError,
}

pub struct ValidatedToken {
    pub token: Token,
    pub user: Option<User>,
}

/// The username a browser may send with a token over Basic auth when it does
/// not use the owner's own name.
pub const BASIC_TOKEN_USERNAME: &str = "x-token";

/// A token as presented in the `Authorization` header.
#[derive(Debug, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    /// Browsers reach project pages with Basic auth so that relative asset
    /// requests carry the token too. The password is the token.
    Basic { username: String, token: String },
}

impl Credentials {
    pub fn token(&self) -> &str {
        match self {
            Self::Bearer(token) | Self::Basic { token, .. } => token,
        }
    }

    /// Basic credentials must name the token's owner or [`BASIC_TOKEN_USERNAME`].
    pub fn matches(&self, validated: &ValidatedToken) -> bool {
        match self {
            Self::Bearer(_) => true,
            Self::Basic { username, .. } => {
                username == BASIC_TOKEN_USERNAME
                    || validated
                        .user
                        .as_ref()
                        .is_some_and(|user| &user.username == username)
            }
        }
    }
}

/// Pulls credentials out of an `Authorization` header.
///
/// `Ok(None)` means no header was sent at all.
pub fn extract_credentials(
    auth_header: Option<&str>,
) -> Result<Option<Credentials>, TokenValidationError> {
    let Some(header) = auth_header else {
        return Ok(None);
    };

    let credentials = if let Some(token) = header.strip_prefix("Bearer ") {
        Credentials::Bearer(token.trim().to_string())
    } else if let Some(encoded) = header.strip_prefix("Basic ") {
        decode_basic(encoded.trim())?
    } else {
        return Err(TokenValidationError::InvalidScheme);
    };

    if credentials.token().is_empty() {
        return Err(TokenValidationError::InvalidToken);
    }

    Ok(Some(credentials))
}

fn decode_basic(encoded: &str) -> Result<Credentials, TokenValidationError> {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let decoded = STANDARD
        .decode(encoded)
        .map_err(|_| TokenValidationError::InvalidToken)?;
    let decoded = String::from_utf8(decoded).map_err(|_| TokenValidationError::InvalidToken)?;

    let (username, token) = decoded
        .split_once(':')
        .ok_or(TokenValidationError::InvalidToken)?;

    Ok(Credentials::Basic {
        username: username.to_string(),
        token: token.trim().to_string(),
    })
}

/// Checks a raw token against the store and loads the user it belongs to.
pub fn validate_token(
    state: &AppState,
    raw_token: &str,
) -> Result<ValidatedToken, TokenValidationError> {
    let parts = parse_token(raw_token).map_err(|_| TokenValidationError::InvalidToken)?;

    let token = state
        .store
        .get_token_by_lookup(parts.lookup)
        .map_err(|_| TokenValidationError::InternalError)?
        .ok_or(TokenValidationError::InvalidToken)?;

    if !verify_token(raw_token, &token.token_hash)
        .map_err(|_| TokenValidationError::InternalError)?
    {
        return Err(TokenValidationError::InvalidToken);
    }

    if token.expires_at.is_some_and(|expires_at| expires_at < Utc::now()) {
        return Err(TokenValidationError::TokenExpired);
    }

    let user = match &token.user_id {
        Some(user_id) => state
            .store
            .get_user(user_id)
            .map_err(|_| TokenValidationError::InternalError)?,
        None => None,
    };

    if let Err(e) = state.store.update_token_last_used(&token.id) {
        tracing::warn!("Failed to update token last_used_at: {e}");
    }

    Ok(ValidatedToken { token, user })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use chrono::Utc;

    use crate::types::Role;

    fn basic(credentials: &str) -> String {
        format!("Basic {}", STANDARD.encode(credentials))
    }

    fn validated(username: Option<&str>) -> ValidatedToken {
        ValidatedToken {
            token: Token {
                id: "t-1".to_string(),
                token_hash: String::new(),
                token_lookup: "12345678".to_string(),
                is_admin: username.is_none(),
                user_id: username.map(|_| "u-1".to_string()),
                created_at: Utc::now(),
                expires_at: None,
                last_used_at: None,
            },
            user: username.map(|name| User {
                id: "u-1".to_string(),
                username: name.to_string(),
                role: Role::Teacher,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }),
        }
    }

    #[test]
    fn test_extract_bearer_credentials() {
        assert_eq!(
            extract_credentials(Some("Bearer showcase_abc_def")).unwrap(),
            Some(Credentials::Bearer("showcase_abc_def".to_string()))
        );
        assert_eq!(extract_credentials(None).unwrap(), None);
        assert!(matches!(
            extract_credentials(Some("Token showcase_abc_def")),
            Err(TokenValidationError::InvalidScheme)
        ));
        assert!(matches!(
            extract_credentials(Some("Bearer   ")),
            Err(TokenValidationError::InvalidToken)
        ));
    }

    #[test]
    fn test_extract_basic_credentials() {
        assert_eq!(
            extract_credentials(Some(&basic("x-token:showcase_abc_def"))).unwrap(),
            Some(Credentials::Basic {
                username: "x-token".to_string(),
                token: "showcase_abc_def".to_string(),
            })
        );
        assert!(matches!(
            extract_credentials(Some(&basic("grace:"))),
            Err(TokenValidationError::InvalidToken)
        ));
        assert!(matches!(
            extract_credentials(Some(&basic("no-colon"))),
            Err(TokenValidationError::InvalidToken)
        ));
        assert!(matches!(
            extract_credentials(Some("Basic !!!")),
            Err(TokenValidationError::InvalidToken)
        ));
    }

    #[test]
    fn test_basic_username_must_name_owner() {
        let basic_as = |username: &str| Credentials::Basic {
            username: username.to_string(),
            token: "t".to_string(),
        };
        let grace = validated(Some("grace"));

        assert!(basic_as("grace").matches(&grace));
        assert!(basic_as(BASIC_TOKEN_USERNAME).matches(&grace));
        assert!(!basic_as("bob").matches(&grace));
        assert!(!basic_as("grace").matches(&validated(None)));
        assert!(Credentials::Bearer("t".to_string()).matches(&grace));
    }
}
