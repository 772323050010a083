use serde::{Deserialize, Serialize};

fn default_tone() -> String {
    "friendly and professional".to_string()
}

fn default_platforms() -> Vec<String> {
    vec!["Instagram".to_string(), "Facebook".to_string()]
}

fn default_true() -> bool {
    true
}

/// What the user wants a campaign for. Sent verbatim as the request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignBrief {
    pub business_name: String,
    pub business_type: String,
    pub target_audience: String,
    pub campaign_goal: String,
    pub key_messages: String,
    #[serde(default = "default_tone")]
    pub tone: String,
    #[serde(default = "default_platforms")]
    pub platforms: Vec<String>,
    #[serde(default = "default_true")]
    pub include_hashtags: bool,
    #[serde(default = "default_true")]
    pub include_emoji: bool,
    #[serde(default)]
    pub seasonal_hook: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformCopy {
    pub platform: String,
    #[serde(alias = "copy")]
    pub content: String,
    #[serde(default)]
    pub character_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignResponse {
    #[serde(default = "default_true")]
    pub success: bool,
    pub business_name: String,
    #[serde(default)]
    pub copies: Vec<PlatformCopy>,
    #[serde(default)]
    pub image_prompt: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub revised_image_prompt: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl CampaignResponse {
    /// The prompt the image was actually generated from, if any.
    pub fn effective_image_prompt(&self) -> Option<&str> {
        self.revised_image_prompt
            .as_deref()
            .or(self.image_prompt.as_deref())
    }
}

/// Shared-quota snapshot. Advisory: the backend re-checks on every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeTierStatus {
    pub remaining: u32,
    pub limit: u32,
}

impl FreeTierStatus {
    pub fn is_available(&self) -> bool {
        self.remaining > 0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct HealthResponse {
    pub status: String,
}
