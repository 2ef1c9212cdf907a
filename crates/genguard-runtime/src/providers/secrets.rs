//! Credential handling for the AI provider and operator webhooks.
//!
//! Credentials are wrapped in [`secrecy::SecretString`] as soon as they are
//! read and only exposed at the point of use (an HTTP header).
//!
//! ```ignore
//! let key = ApiCredential::resolve(config.api_key.as_deref(), Some("OPENAI_API_KEY"), "AI API key");
//! request.bearer_auth(key.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use super::ProviderError;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Runtime configuration file
    Config,
    /// Environment variable
    Environment,
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A securely-stored credential.
///
/// `Debug` and `Display` print `[REDACTED]` instead of the value.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Configured value first, then `env_var`. Empty values count as missing.
    pub fn resolve(
        configured: Option<&str>,
        env_var: Option<&str>,
        name: &'static str,
    ) -> Option<Self> {
        if let Some(value) = configured.filter(|v| !v.is_empty()) {
            return Some(Self::new(value, CredentialSource::Config, name));
        }

        env_var
            .and_then(|var| std::env::var(var).ok())
            .filter(|v| !v.is_empty())
            .map(|value| Self::new(value, CredentialSource::Environment, name))
    }

    /// Like [`resolve`](Self::resolve), but a missing credential is an error.
    pub fn require(
        configured: Option<&str>,
        env_var: &str,
        name: &'static str,
    ) -> Result<Self, ProviderError> {
        Self::resolve(configured, Some(env_var), name).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "{} required: set 'api_key' in config or {} environment variable",
                name, env_var
            ))
        })
    }

    /// Expose the value. Call only where the value is sent.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}
