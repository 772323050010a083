pub mod types;

mod error;

pub use error::{
    classify, normalize, ApiErrorDetail, Classified, ClientError, ErrorCategory, Failure,
    ModeHint,
};
pub use types::*;

use async_trait::async_trait;
use socialmarket_auth::{AuthMode, Credentials, Provider};

const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// The backend operations the session layer depends on.
#[async_trait]
pub trait Backend: Send + Sync {
    /// One submission, one network call. Never retried here.
    async fn dispatch(
        &self,
        brief: &CampaignBrief,
        mode: AuthMode,
        credentials: Option<&Credentials>,
        wants_image: bool,
    ) -> Result<CampaignResponse, ClientError>;

    /// Fresh on every call; no caching.
    async fn free_tier_status(&self) -> Result<FreeTierStatus, ClientError>;

    async fn health(&self) -> bool;
}

/// Generation endpoint picked for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Copy plus image, both keys.
    Full,
    /// Copy only, Anthropic key only.
    CopyOnly,
    /// Shared keys; the image flag travels as a query parameter.
    Free { generate_image: bool },
}

impl Route {
    pub fn for_mode(mode: AuthMode, wants_image: bool) -> Option<Self> {
        match mode {
            AuthMode::Unset => None,
            AuthMode::Byok if wants_image => Some(Route::Full),
            AuthMode::Byok => Some(Route::CopyOnly),
            AuthMode::Free => Some(Route::Free {
                generate_image: wants_image,
            }),
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Route::Full => "/api/v1/campaigns/generate-full",
            Route::CopyOnly => "/api/v1/campaigns/generate-copy",
            Route::Free { .. } => "/api/v1/campaigns/generate-free",
        }
    }

    /// Providers whose keys ride along with the request.
    pub fn providers(self) -> &'static [Provider] {
        match self {
            Route::Full => &[Provider::Anthropic, Provider::OpenAI],
            Route::CopyOnly => &[Provider::Anthropic],
            Route::Free { .. } => &[],
        }
    }
}

pub struct CampaignClient {
    client: reqwest::Client,
    base_url: String,
}

impl CampaignClient {
    pub fn new(base_url: Option<String>, timeout: std::time::Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    pub fn from_config(config: &socialmarket_config::Config) -> Self {
        Self::new(
            Some(config.api.base_url.clone()),
            std::time::Duration::from_secs(config.api.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Builds the generation request without sending it. Refuses when the
    /// mode or credentials cannot back the chosen route.
    pub fn build_generate_request(
        &self,
        brief: &CampaignBrief,
        mode: AuthMode,
        credentials: Option<&Credentials>,
        wants_image: bool,
    ) -> Result<reqwest::Request, ClientError> {
        let route = Route::for_mode(mode, wants_image)
            .ok_or_else(|| ClientError::NotReady("no auth mode selected".to_string()))?;

        if mode == AuthMode::Byok {
            let pair = credentials.ok_or_else(|| {
                ClientError::NotReady("no API keys entered".to_string())
            })?;
            if let Some(missing) = Provider::ALL.into_iter().find(|&p| pair.key(p).is_empty()) {
                return Err(ClientError::NotReady(format!(
                    "{} API key is missing",
                    missing.display_name()
                )));
            }
        }

        let mut builder = self
            .client
            .post(format!("{}{}", self.base_url, route.path()))
            .header("content-type", "application/json")
            .json(brief);

        if let Route::Free { generate_image } = route {
            builder = builder.query(&[("generate_image", generate_image)]);
        }

        if let Some(pair) = credentials.filter(|_| mode == AuthMode::Byok) {
            for &provider in route.providers() {
                builder = builder.header(provider.header(), pair.key(provider));
            }
        }

        builder
            .build()
            .map_err(|e| ClientError::NotReady(format!("invalid request: {e}")))
    }
}

#[async_trait]
impl Backend for CampaignClient {
    async fn dispatch(
        &self,
        brief: &CampaignBrief,
        mode: AuthMode,
        credentials: Option<&Credentials>,
        wants_image: bool,
    ) -> Result<CampaignResponse, ClientError> {
        let request = self.build_generate_request(brief, mode, credentials, wants_image)?;
        tracing::debug!(%mode, wants_image, url = %request.url(), "Dispatching campaign request");

        let resp = self
            .client
            .execute(request)
            .await
            .map_err(ClientError::Network)?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            let body = resp.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), "Campaign request failed");
            return Err(ClientError::from_http(
                status.as_u16(),
                body,
                retry_after.as_deref(),
            ));
        }

        // A stalled or cut-off body is a transport failure, not a bad payload.
        let bytes = resp.bytes().await.map_err(ClientError::Network)?;
        serde_json::from_slice::<CampaignResponse>(&bytes)
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn free_tier_status(&self) -> Result<FreeTierStatus, ClientError> {
        let resp = self
            .client
            .get(format!("{}/api/v1/campaigns/free-tier-status", self.base_url))
            .send()
            .await
            .map_err(|e| ClientError::StatusUnavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::StatusUnavailable(format!(
                "backend returned {}",
                status.as_u16()
            )));
        }

        let tier: FreeTierStatus = resp
            .json()
            .await
            .map_err(|e| ClientError::StatusUnavailable(e.to_string()))?;
        if tier.limit == 0 {
            return Err(ClientError::StatusUnavailable(
                "free tier limit is zero".to_string(),
            ));
        }
        Ok(tier)
    }

    async fn health(&self) -> bool {
        let resp = match self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::debug!(status = resp.status().as_u16(), "Health check failed");
                return false;
            }
            Err(e) => {
                tracing::debug!(error = %e, "Health check unreachable");
                return false;
            }
        };
        matches!(
            resp.json::<HealthResponse>().await,
            Ok(h) if h.status == "healthy"
        )
    }
}
