pub mod api_key;
pub mod session_store;

mod error;

pub use error::AuthError;
pub use session_store::{CredentialStore, MemoryStore, SessionFileStore};

use serde::{Deserialize, Serialize};
use socialmarket_config::ProviderDef;

/// Upstream provider the backend calls on the user's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Copy generation.
    Anthropic,
    /// Image generation.
    #[serde(rename = "openai")]
    OpenAI,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Anthropic, Provider::OpenAI];

    pub fn id(self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAI => "openai",
        }
    }

    pub fn def(self) -> &'static ProviderDef {
        match self {
            Provider::Anthropic => &socialmarket_config::BUILT_IN_PROVIDERS[0],
            Provider::OpenAI => &socialmarket_config::BUILT_IN_PROVIDERS[1],
        }
    }

    pub fn display_name(self) -> &'static str {
        self.def().name
    }

    pub fn header(self) -> &'static str {
        self.def().header
    }

    /// Resolves a backend `service` identifier, case-insensitively.
    pub fn from_service(service: &str) -> Option<Self> {
        let def = socialmarket_config::find_provider_def(service.trim())?;
        Self::ALL.into_iter().find(|p| p.id() == def.id)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Which credentials a generation request runs under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Nothing chosen yet; requests must not be sent.
    #[default]
    Unset,
    /// Shared backend keys, quota-limited.
    Free,
    /// The user's own keys.
    Byok,
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMode::Unset => write!(f, "unset"),
            AuthMode::Free => write!(f, "free"),
            AuthMode::Byok => write!(f, "byok"),
        }
    }
}

/// The user's own key pair. Held for one client session only.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default)]
    pub anthropic_key: String,
    #[serde(default)]
    pub openai_key: String,
}

impl Credentials {
    pub fn new(anthropic_key: impl Into<String>, openai_key: impl Into<String>) -> Self {
        Self {
            anthropic_key: anthropic_key.into().trim().to_string(),
            openai_key: openai_key.into().trim().to_string(),
        }
    }

    pub fn key(&self, provider: Provider) -> &str {
        match provider {
            Provider::Anthropic => &self.anthropic_key,
            Provider::OpenAI => &self.openai_key,
        }
    }

    /// Both keys present.
    pub fn is_complete(&self) -> bool {
        !self.anthropic_key.is_empty() && !self.openai_key.is_empty()
    }

    /// Complete and each key matches its provider's format.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Reports the first provider whose key is missing or malformed.
    pub fn validate(&self) -> Result<(), AuthError> {
        for provider in Provider::ALL {
            let key = self.key(provider);
            if key.is_empty() {
                return Err(AuthError::MissingKey { provider });
            }
            if !api_key::validate(provider, key) {
                return Err(AuthError::InvalidKeyFormat { provider });
            }
        }
        Ok(())
    }

    pub fn masked(&self, provider: Provider) -> String {
        api_key::mask(provider, self.key(provider))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("anthropic_key", &self.masked(Provider::Anthropic))
            .field("openai_key", &self.masked(Provider::OpenAI))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Credentials {
        Credentials::new(
            "sk-ant-REDACTED",
            "sk-proj-ABCDEFGHIJ0123456789",
        )
    }

    #[test]
    fn complete_requires_both_keys() {
        assert!(valid().is_complete());
        assert!(!Credentials::new("", "sk-proj-ABCDEFGHIJ0123456789").is_complete());
        assert!(!Credentials::new("sk-ant-REDACTED", "").is_complete());
        assert!(!Credentials::default().is_complete());
    }

    #[test]
    fn new_trims_whitespace() {
        let creds = Credentials::new("  sk-ant-REDACTED\n", " ");
        assert_eq!(creds.anthropic_key, "sk-ant-REDACTED");
        assert!(creds.openai_key.is_empty());
        assert!(!creds.is_complete());
    }

    #[test]
    fn validate_names_first_bad_provider() {
        assert!(valid().is_valid());

        let err = Credentials::new("", "sk-proj-ABCDEFGHIJ0123456789")
            .validate()
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingKey { provider: Provider::Anthropic }));

        let err = Credentials::new("sk-ant-REDACTED", "not-a-key")
            .validate()
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidKeyFormat { provider: Provider::OpenAI }));
        assert!(err.to_string().contains("OpenAI"));
    }

    #[test]
    fn complete_but_malformed_is_not_valid() {
        let creds = Credentials::new("short", "also-short");
        assert!(creds.is_complete());
        assert!(!creds.is_valid());
    }

    #[test]
    fn debug_never_prints_keys() {
        let rendered = format!("{:?}", valid());
        assert!(!rendered.contains("abcdefghij0123456789"));
        assert!(!rendered.contains("ABCDEFGHIJ0123456789"));
        assert!(rendered.contains("sk-ant-…6789"));
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let json = serde_json::to_value(valid()).unwrap();
        assert_eq!(json["anthropicKey"], "sk-ant-REDACTED");
        assert_eq!(json["openaiKey"], "sk-proj-ABCDEFGHIJ0123456789");
    }

    #[test]
    fn provider_from_service() {
        assert_eq!(Provider::from_service("anthropic"), Some(Provider::Anthropic));
        assert_eq!(Provider::from_service("OpenAI"), Some(Provider::OpenAI));
        assert_eq!(Provider::from_service("dalle"), None);
        assert_eq!(Provider::OpenAI.header(), "X-OpenAI-Key");
        assert_eq!(Provider::Anthropic.to_string(), "Anthropic");
    }

    #[test]
    fn provider_defs_line_up_with_variants() {
        for provider in Provider::ALL {
            assert_eq!(provider.def().id, provider.id());
            assert_eq!(Provider::from_service(provider.id()), Some(provider));
        }
    }
}
