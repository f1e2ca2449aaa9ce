//! Owner resolution for incoming requests
//!
//! Sessions and logins are handled outside this service. By the time a
//! request reaches the proof API it carries a bearer token that maps to
//! exactly one owner.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use zkb_core::config::AuthConfig;

/// Identifier of the authenticated account that owns a record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait Authenticator: Send + Sync {
    /// Resolve a bearer token. `None` means unauthenticated.
    fn authenticate(&self, token: &str) -> Option<OwnerId>;
}

/// Static token table from `[auth.tokens]`
#[derive(Clone, Default)]
pub struct TokenAuthenticator {
    tokens: BTreeMap<String, OwnerId>,
}

impl TokenAuthenticator {
    pub fn new(tokens: impl IntoIterator<Item = (String, OwnerId)>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config
                .tokens
                .iter()
                .map(|(token, owner)| (token.clone(), OwnerId::new(owner.trim()))),
        )
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Authenticator for TokenAuthenticator {
    fn authenticate(&self, token: &str) -> Option<OwnerId> {
        self.tokens.get(token).cloned()
    }
}

// Tokens never show up in logs
impl fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthenticator")
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_token_resolves() {
        let mut config = AuthConfig::default();
        config.tokens.insert("t-alice".into(), " alice ".into());
        let auth = TokenAuthenticator::from_config(&config);

        assert_eq!(auth.authenticate("t-alice"), Some(OwnerId::new("alice")));
        assert_eq!(auth.authenticate("t-bob"), None);
        assert_eq!(auth.authenticate(""), None);
    }

    #[test]
    fn test_debug_hides_tokens() {
        let auth = TokenAuthenticator::new([("secret-token".to_string(), OwnerId::new("a"))]);
        let debug = format!("{auth:?}");
        assert!(!debug.contains("secret-token"));
    }
}
