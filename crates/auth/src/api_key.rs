use std::sync::LazyLock;

use regex::Regex;

use crate::Provider;

// Both patterns are anchored. An Anthropic-shaped key also matches the OpenAI
// pattern; each provider is checked on its own.
static ANTHROPIC_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^sk-ant-[A-Za-z0-9_-]{20,}$").expect("anthropic key pattern is valid")
});

static OPENAI_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^sk-[A-Za-z0-9_-]{20,}$").expect("openai key pattern is valid")
});

/// Syntactic check only. A key that passes can still be rejected upstream.
pub fn validate(provider: Provider, raw_key: &str) -> bool {
    match provider {
        Provider::Anthropic => ANTHROPIC_KEY_RE.is_match(raw_key),
        Provider::OpenAI => OPENAI_KEY_RE.is_match(raw_key),
    }
}

/// Shortened form safe to print, e.g. `sk-ant-…wxyz`.
pub fn mask(provider: Provider, raw_key: &str) -> String {
    if raw_key.is_empty() {
        return "(not set)".to_string();
    }
    let prefix = provider.def().key_prefix;
    let chars: Vec<char> = raw_key.chars().collect();
    if !raw_key.starts_with(prefix) || chars.len() < prefix.len() + 8 {
        return "…".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{prefix}…{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAIL_20: &str = "abcdefghij0123456789";

    #[test]
    fn anthropic_accepts_prefixed_key() {
        assert!(validate(Provider::Anthropic, &format!("sk-ant-{TAIL_20}")));
        assert!(validate(Provider::Anthropic, "sk-ant-REDACTED"));
    }

    #[test]
    fn anthropic_rejects_short_or_wrong_prefix() {
        assert!(!validate(Provider::Anthropic, "sk-ant-abcdefghij012345678"));
        assert!(!validate(Provider::Anthropic, &format!("sk-{TAIL_20}")));
        assert!(!validate(Provider::Anthropic, &format!("xsk-ant-{TAIL_20}")));
        assert!(!validate(Provider::Anthropic, ""));
    }

    #[test]
    fn anthropic_rejects_disallowed_characters() {
        assert!(!validate(Provider::Anthropic, &format!("sk-ant-{TAIL_20}!")));
        assert!(!validate(Provider::Anthropic, &format!("sk-ant-{TAIL_20} ")));
        assert!(!validate(Provider::Anthropic, &format!(" sk-ant-{TAIL_20}")));
    }

    #[test]
    fn openai_accepts_prefixed_key() {
        assert!(validate(Provider::OpenAI, &format!("sk-{TAIL_20}")));
        assert!(validate(Provider::OpenAI, "sk-proj-AbCdEfGhIjKlMnOpQrStUv"));
    }

    #[test]
    fn openai_rejects_short_or_wrong_prefix() {
        assert!(!validate(Provider::OpenAI, "sk-abcdefghij012345678"));
        assert!(!validate(Provider::OpenAI, &format!("pk-{TAIL_20}")));
        assert!(!validate(Provider::OpenAI, TAIL_20));
    }

    #[test]
    fn anthropic_shaped_key_also_passes_openai_pattern() {
        let key = format!("sk-ant-{TAIL_20}");
        assert!(validate(Provider::Anthropic, &key));
        assert!(validate(Provider::OpenAI, &key));
    }

    #[test]
    fn mask_keeps_prefix_and_tail() {
        assert_eq!(
            mask(Provider::Anthropic, &format!("sk-ant-{TAIL_20}")),
            "sk-ant-…6789"
        );
        assert_eq!(mask(Provider::OpenAI, &format!("sk-{TAIL_20}")), "sk-…6789");
    }

    #[test]
    fn mask_hides_unrecognised_keys() {
        assert_eq!(mask(Provider::OpenAI, "hunter2"), "…");
        assert_eq!(mask(Provider::OpenAI, ""), "(not set)");
    }
}
