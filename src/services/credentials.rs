//! Bearer credentials from the host's auth session

use async_trait::async_trait;

use crate::error::Result;

/// Environment variable read by [`EnvCredential`]
pub const ACCESS_TOKEN_ENV: &str = "GENIE_ACCESS_TOKEN";

/// Source of the access token for the signed-in user
///
/// `Ok(None)` means "no session"; the client fails fast in that case and
/// never touches the network.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self) -> Result<Option<String>>;
}

/// Fixed token, e.g. from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticCredential {
    token: Option<String>,
}

impl StaticCredential {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn access_token(&self) -> Result<Option<String>> {
        Ok(self.token.clone())
    }
}

/// Token read from an environment variable on every request
#[derive(Debug, Clone)]
pub struct EnvCredential {
    var: String,
}

impl EnvCredential {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvCredential {
    fn default() -> Self {
        Self::new(ACCESS_TOKEN_ENV)
    }
}

#[async_trait]
impl CredentialProvider for EnvCredential {
    async fn access_token(&self) -> Result<Option<String>> {
        Ok(std::env::var(&self.var)
            .ok()
            .filter(|t| !t.trim().is_empty()))
    }
}
