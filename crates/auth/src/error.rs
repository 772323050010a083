use crate::Provider;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{} API key is missing", .provider.display_name())]
    MissingKey { provider: Provider },

    #[error("{} API key is not in the expected format ({}...)", .provider.display_name(), .provider.def().key_prefix)]
    InvalidKeyFormat { provider: Provider },

    #[error("Failed to write session credentials: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Failed to encode session credentials: {0}")]
    Encode(#[from] serde_json::Error),
}
