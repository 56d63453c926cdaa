use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const TEXT_TOKEN_CAP: u32 = 200;
pub const ANALYSIS_TOKEN_CAP: u32 = 1500;

const TEXT_TIMEOUT_MIN_MS: u64 = 10_000;
const TEXT_TIMEOUT_MAX_MS: u64 = 15_000;

#[derive(Debug, Clone, PartialEq)]
pub struct CoachConfig {
    pub anthropic_api_key: Option<String>,
    pub anthropic_api_base: String,
    pub text_model: String,
    pub vision_model: String,
    pub openai_api_key: Option<String>,
    pub openai_api_base: String,
    pub image_model: String,
    pub text_timeout: Duration,
    pub vision_timeout: Duration,
    pub image_timeout: Duration,
    pub detailed_weight: f64,
    pub events_path: PathBuf,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl CoachConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolves every setting through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let base = |key: &str, default: &str| {
            get(key)
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let millis = |key: &str, default: u64| {
            get(key)
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(default)
        };

        Self {
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            anthropic_api_base: base("ANTHROPIC_API_BASE", "https://api.anthropic.com/v1"),
            text_model: get("TIDY_TEXT_MODEL")
                .unwrap_or_else(|| "claude-3-5-haiku-latest".to_string()),
            vision_model: get("TIDY_VISION_MODEL")
                .unwrap_or_else(|| "claude-sonnet-4-20250514".to_string()),
            openai_api_key: get("OPENAI_API_KEY").or_else(|| get("OPENAI_API_KEY_BACKUP")),
            openai_api_base: base("OPENAI_API_BASE", "https://api.openai.com/v1"),
            image_model: get("TIDY_IMAGE_MODEL").unwrap_or_else(|| "gpt-image-1".to_string()),
            text_timeout: Duration::from_millis(
                millis("TIDY_TEXT_TIMEOUT_MS", 12_000)
                    .clamp(TEXT_TIMEOUT_MIN_MS, TEXT_TIMEOUT_MAX_MS),
            ),
            vision_timeout: Duration::from_millis(millis("TIDY_VISION_TIMEOUT_MS", 45_000)),
            image_timeout: Duration::from_millis(millis("TIDY_IMAGE_TIMEOUT_MS", 90_000)),
            detailed_weight: get("TIDY_DETAILED_WEIGHT")
                .and_then(|value| value.parse::<f64>().ok())
                .filter(|value| value.is_finite())
                .unwrap_or(0.2)
                .clamp(0.0, 1.0),
            events_path: get("TIDY_EVENTS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("events.jsonl")),
        }
    }
}
