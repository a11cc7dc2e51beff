mod helpers;
mod middleware;
mod token;

pub use middleware::{AuthError, RequireAdmin, RequireUser};
pub use token::{
    IssuedToken, PARENT_TOKEN_DAYS, TokenIssuer, TokenParts, default_lifetime, parse_token,
    verify_token,
};
