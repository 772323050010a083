//! Backend failure classification.
//!
//! Every failed request ends here and leaves as a [`Classified`]: a closed
//! category, one canonical message for the user, and a hint telling the
//! auth-mode controller whether to re-prompt for credentials.

use serde::{Deserialize, Serialize};
use socialmarket_auth::Provider;

/// Longest backend detail passed through to the user.
const MAX_DETAIL_CHARS: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Request not sent: {0}")]
    NotReady(String),

    #[error("No response from backend: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Backend returned {status}")]
    Api {
        status: u16,
        body: String,
        retry_after: Option<u64>,
    },

    #[error("Could not decode backend response: {0}")]
    Decode(String),

    #[error("Free tier status unavailable: {0}")]
    StatusUnavailable(String),
}

impl ClientError {
    pub fn from_http(status: u16, body: String, retry_after: Option<&str>) -> Self {
        Self::Api {
            status,
            body,
            retry_after: retry_after.and_then(|s| s.trim().parse::<u64>().ok()),
        }
    }

    /// Collapses any client failure into a user-facing outcome.
    pub fn classify(&self) -> Classified {
        match self {
            Self::Network(_) => classify(&Failure::NoResponse),
            Self::Api {
                status,
                body,
                retry_after,
            } => {
                let mut classified = classify(&Failure::Response {
                    status: *status,
                    body,
                });
                classified.retry_after = classified.retry_after.or(*retry_after);
                classified
            }
            Self::NotReady(_) => Classified::new(
                ErrorCategory::InvalidKey,
                GENERIC_INVALID_KEY.to_string(),
                ModeHint::Reprompt,
            ),
            Self::Decode(_) | Self::StatusUnavailable(_) => Classified::new(
                ErrorCategory::Unknown,
                GENERIC_UNKNOWN.to_string(),
                ModeHint::Keep,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    InvalidKey,
    RateLimited,
    FreeTierExhausted,
    UpstreamUnavailable,
    FreeTierUnavailable,
    NetworkUnreachable,
    Unknown,
}

impl ErrorCategory {
    pub fn code(self) -> &'static str {
        match self {
            ErrorCategory::InvalidKey => "invalid_key",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::FreeTierExhausted => "free_tier_exhausted",
            ErrorCategory::UpstreamUnavailable => "upstream_unavailable",
            ErrorCategory::FreeTierUnavailable => "free_tier_unavailable",
            ErrorCategory::NetworkUnreachable => "network_unreachable",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// What the failure suggests for the auth mode, independent of the mode the
/// request ran under. The controller's transition table has the final say.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeHint {
    /// Leave the mode alone; just show the message.
    Keep,
    /// Return to credential entry with the current keys pre-filled.
    Reprompt,
    /// Drop the active mode entirely.
    ResetMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub category: ErrorCategory,
    pub message: String,
    pub hint: ModeHint,
    /// Provider whose key was rejected, when the backend said so.
    pub provider: Option<Provider>,
    pub retry_after: Option<u64>,
}

impl Classified {
    fn new(category: ErrorCategory, message: String, hint: ModeHint) -> Self {
        Self {
            category,
            message,
            hint,
            provider: None,
            retry_after: None,
        }
    }
}

/// Transport-independent view of a failed request.
#[derive(Debug, Clone, Copy)]
pub enum Failure<'a> {
    /// Connection refused, DNS failure, timeout: nothing came back.
    NoResponse,
    Response { status: u16, body: &'a str },
}

/// Normalized backend error envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiErrorDetail {
    pub success: bool,
    pub error: Option<String>,
    pub detail: Option<String>,
    pub service: Option<String>,
    pub remaining: Option<u32>,
    pub limit: Option<u32>,
    pub retry_after: Option<u64>,
}

type ShapeMatcher = fn(&serde_json::Value) -> Option<ApiErrorDetail>;

/// Tried in order; the first match wins.
const SHAPES: &[ShapeMatcher] = &[flat_shape, nested_shape, message_only_shape];

/// Non-negative whole number, also when sent as `3600.0`.
fn whole_number(value: &serde_json::Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
            .map(|f| f as u64)
    })
}

/// Reads each field on its own so one mistyped field cannot hide the code.
fn with_error_code(value: &serde_json::Value) -> Option<ApiErrorDetail> {
    let code = value.get("error")?.as_str().filter(|e| !e.is_empty())?;
    let count = |key: &str| whole_number(&value[key]).and_then(|n| u32::try_from(n).ok());
    Some(ApiErrorDetail {
        success: value["success"].as_bool().unwrap_or(false),
        error: Some(code.to_string()),
        detail: value["detail"].as_str().map(str::to_string),
        service: value["service"].as_str().map(str::to_string),
        remaining: count("remaining"),
        limit: count("limit"),
        retry_after: whole_number(&value["retry_after"]),
    })
}

/// `{ "error": "...", "detail": "...", ... }`
fn flat_shape(value: &serde_json::Value) -> Option<ApiErrorDetail> {
    with_error_code(value)
}

/// `{ "detail": { "error": "...", ... } }`
fn nested_shape(value: &serde_json::Value) -> Option<ApiErrorDetail> {
    value.get("detail").filter(|d| d.is_object()).and_then(with_error_code)
}

/// `{ "detail": "..." }`, or a wrapper with only a human message left.
fn message_only_shape(value: &serde_json::Value) -> Option<ApiErrorDetail> {
    let message = value["detail"]
        .as_str()
        .or_else(|| value["detail"]["detail"].as_str())
        .or_else(|| value["message"].as_str())?;
    Some(ApiErrorDetail {
        detail: Some(message.to_string()),
        ..ApiErrorDetail::default()
    })
}

/// Runs the shape matchers over a raw body. `None` means the body is unusable.
pub fn normalize(body: &str) -> Option<ApiErrorDetail> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    if !value.is_object() {
        return None;
    }
    SHAPES.iter().find_map(|shape| shape(&value))
}

const NETWORK_UNREACHABLE: &str =
    "Could not reach the server. Please check your internet connection and try again.";
const GENERIC_INVALID_KEY: &str = "Invalid API key. Please check your keys and try again.";
const RATE_LIMITED: &str = "Too many requests. Please slow down and try again in a moment.";
const GENERIC_UPSTREAM: &str =
    "The AI service is temporarily unavailable. Please try again in a moment.";
const FREE_TIER_UNAVAILABLE: &str =
    "The free tier is currently unavailable. Please enter your own API keys to continue.";
const GENERIC_UNKNOWN: &str = "Something went wrong. Please try again.";

fn invalid_key_message(provider: Provider) -> String {
    format!("Your {provider} API key was rejected. Please update your {provider} key and try again.")
}

fn free_tier_exhausted_message(limit: Option<u32>) -> String {
    match limit {
        Some(limit) => format!(
            "You've used all {limit} free generations for today. Enter your own API keys to keep going."
        ),
        None => "You've used all of today's free generations. Enter your own API keys to keep going."
            .to_string(),
    }
}

fn backend_detail(detail: Option<&ApiErrorDetail>) -> Option<String> {
    let text = detail?.detail.as_deref()?.trim();
    if text.is_empty() {
        return None;
    }
    if text.chars().count() > MAX_DETAIL_CHARS {
        let cut: String = text.chars().take(MAX_DETAIL_CHARS).collect();
        Some(format!("{cut}..."))
    } else {
        Some(text.to_string())
    }
}

pub fn classify(failure: &Failure<'_>) -> Classified {
    let (status, body) = match failure {
        Failure::NoResponse => {
            return Classified::new(
                ErrorCategory::NetworkUnreachable,
                NETWORK_UNREACHABLE.to_string(),
                ModeHint::Keep,
            );
        }
        Failure::Response { status, body } => (*status, *body),
    };

    let detail = normalize(body);
    let code = detail.as_ref().and_then(|d| d.error.as_deref());

    let mut classified = match (status, code) {
        (401, Some("invalid_api_key")) => {
            let provider = detail
                .as_ref()
                .and_then(|d| d.service.as_deref())
                .and_then(Provider::from_service);
            let message = match provider {
                Some(p) => invalid_key_message(p),
                None => GENERIC_INVALID_KEY.to_string(),
            };
            let mut c = Classified::new(ErrorCategory::InvalidKey, message, ModeHint::Reprompt);
            c.provider = provider;
            c
        }
        (401, _) => Classified::new(
            ErrorCategory::InvalidKey,
            GENERIC_INVALID_KEY.to_string(),
            ModeHint::Reprompt,
        ),
        (429, Some("free_tier_limit_reached")) => Classified::new(
            ErrorCategory::FreeTierExhausted,
            free_tier_exhausted_message(detail.as_ref().and_then(|d| d.limit)),
            ModeHint::ResetMode,
        ),
        (429, _) => Classified::new(
            ErrorCategory::RateLimited,
            RATE_LIMITED.to_string(),
            ModeHint::Keep,
        ),
        (502, _) => Classified::new(
            ErrorCategory::UpstreamUnavailable,
            backend_detail(detail.as_ref()).unwrap_or_else(|| GENERIC_UPSTREAM.to_string()),
            ModeHint::Keep,
        ),
        (503, _) => Classified::new(
            ErrorCategory::FreeTierUnavailable,
            FREE_TIER_UNAVAILABLE.to_string(),
            ModeHint::Keep,
        ),
        _ => Classified::new(
            ErrorCategory::Unknown,
            backend_detail(detail.as_ref()).unwrap_or_else(|| GENERIC_UNKNOWN.to_string()),
            ModeHint::Keep,
        ),
    };
    classified.retry_after = detail.and_then(|d| d.retry_after);
    classified
}
