use crate::constants::{DEFAULT_OPENAI_HOST, DEFAULT_PROMPT_NAME, DEFAULT_PROMPTLAYER_HOST};
use reqwest::Url;
use std::fmt::Display;
use std::str::FromStr;

/// How the itinerary is produced from the stored prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptStrategy {
    /// One PromptLayer call resolves the template and runs the model.
    ManagedRun,
    /// Fetch the template from PromptLayer, call OpenAI directly, then log the request.
    TemplateFetch { openai_api_key: String },
}

impl PromptStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ManagedRun => "run",
            Self::TemplateFetch { .. } => "template",
        }
    }
}

/// Value of `PROMPT_STRATEGY`, before the key it needs is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StrategyName {
    Run,
    Template,
}

impl FromStr for StrategyName {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "run" | "managed-run" => Ok(Self::Run),
            "template" | "template-fetch" => Ok(Self::Template),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestValidation {
    /// Absent fields fall back to defaults.
    Defaults,
    /// `destination` and `duration` must be present and non-empty.
    Required,
}

impl FromStr for RequestValidation {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "defaults" => Ok(Self::Defaults),
            "required" => Ok(Self::Required),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsPolicy {
    /// Analytics failures are logged and the itinerary is still returned.
    BestEffort,
    /// The first analytics failure fails the request.
    Required,
}

impl FromStr for AnalyticsPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "best-effort" | "best_effort" => Ok(Self::BestEffort),
            "required" => Ok(Self::Required),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub promptlayer_api_key: String,
    pub promptlayer_host: Url,
    pub openai_host: String,
    /// Release label pinning the template version (`ENV`).
    pub release_label: Option<String>,
    pub prompt_name: String,
    pub strategy: PromptStrategy,
    pub validation: RequestValidation,
    pub analytics: AnalyticsPolicy,
}

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { name: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(name) => write!(f, "{name} not found in env"),
            Self::Invalid { name, value } => write!(f, "Invalid value for {name}: {value}"),
        }
    }
}
impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let strategy = match parse_or(&get, "PROMPT_STRATEGY", StrategyName::Run)? {
            StrategyName::Run => PromptStrategy::ManagedRun,
            StrategyName::Template => PromptStrategy::TemplateFetch {
                openai_api_key: get("OPENAI_API_KEY")
                    .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?,
            },
        };
        let promptlayer_host = get("PROMPTLAYER_HOST")
            .unwrap_or_else(|| DEFAULT_PROMPTLAYER_HOST.to_string());

        Ok(Self {
            promptlayer_api_key: get("PROMPTLAYER_API_KEY")
                .ok_or(ConfigError::Missing("PROMPTLAYER_API_KEY"))?,
            promptlayer_host: base_url("PROMPTLAYER_HOST", promptlayer_host)?,
            openai_host: get("OPENAI_HOST").unwrap_or_else(|| DEFAULT_OPENAI_HOST.to_string()),
            release_label: get("ENV"),
            prompt_name: get("PROMPT_NAME").unwrap_or_else(|| DEFAULT_PROMPT_NAME.to_string()),
            strategy,
            validation: parse_or(&get, "REQUEST_VALIDATION", RequestValidation::Defaults)?,
            analytics: parse_or(&get, "ANALYTICS_POLICY", AnalyticsPolicy::Required)?,
        })
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr<Err = String>,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(value) => value
            .parse()
            .map_err(|value| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

/// Parses a host that endpoint paths can be appended to.
fn base_url(name: &'static str, value: String) -> Result<Url, ConfigError> {
    match Url::parse(&value) {
        Ok(url) if !url.cannot_be_a_base() => Ok(url),
        _ => Err(ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
pub fn test_config(promptlayer_host: &str, strategy: PromptStrategy) -> Config {
    Config {
        promptlayer_api_key: "pl-test-key".into(),
        promptlayer_host: promptlayer_host.parse().unwrap(),
        openai_host: promptlayer_host.into(),
        release_label: Some("prod".into()),
        prompt_name: DEFAULT_PROMPT_NAME.into(),
        strategy,
        validation: RequestValidation::Defaults,
        analytics: AnalyticsPolicy::Required,
    }
}

#[cfg(test)]
fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: std::collections::HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn config_defaults() {
    let config = Config::from_lookup(lookup(&[("PROMPTLAYER_API_KEY", "pl_123")])).unwrap();
    assert_eq!(config.promptlayer_api_key, "pl_123");
    assert_eq!(config.promptlayer_host.as_str(), "https://api.promptlayer.com/");
    assert_eq!(config.prompt_name, DEFAULT_PROMPT_NAME);
    assert_eq!(config.strategy, PromptStrategy::ManagedRun);
    assert_eq!(config.validation, RequestValidation::Defaults);
    assert_eq!(config.analytics, AnalyticsPolicy::Required);
    assert_eq!(config.release_label, None);
}

#[test]
fn config_requires_promptlayer_key() {
    let err = Config::from_lookup(lookup(&[("PROMPTLAYER_API_KEY", "  ")])).unwrap_err();
    assert_eq!(err, ConfigError::Missing("PROMPTLAYER_API_KEY"));
}

#[test]
fn template_strategy_requires_openai_key() {
    let vars = [("PROMPTLAYER_API_KEY", "pl_123"), ("PROMPT_STRATEGY", "template")];
    let err = Config::from_lookup(lookup(&vars)).unwrap_err();
    assert_eq!(err, ConfigError::Missing("OPENAI_API_KEY"));

    let vars = [
        ("PROMPTLAYER_API_KEY", "pl_123"),
        ("PROMPT_STRATEGY", "Template"),
        ("OPENAI_API_KEY", "sk_123"),
        ("ENV", "staging"),
        ("REQUEST_VALIDATION", "required"),
        ("ANALYTICS_POLICY", "best-effort"),
    ];
    let config = Config::from_lookup(lookup(&vars)).unwrap();
    assert_eq!(config.analytics, AnalyticsPolicy::BestEffort);
    assert_eq!(
        config.strategy,
        PromptStrategy::TemplateFetch { openai_api_key: "sk_123".into() }
    );
    assert_eq!(config.strategy.name(), "template");
    assert_eq!(config.release_label.as_deref(), Some("staging"));
    assert_eq!(config.validation, RequestValidation::Required);
}

#[test]
fn config_rejects_unknown_values() {
    let vars = [("PROMPTLAYER_API_KEY", "pl_123"), ("ANALYTICS_POLICY", "sometimes")];
    let err = Config::from_lookup(lookup(&vars)).unwrap_err();
    assert_eq!(err.to_string(), "Invalid value for ANALYTICS_POLICY: sometimes");
}

#[test]
fn promptlayer_host_must_be_a_base_url() {
    for host in ["api.promptlayer.com", "mailto:ops@example.com"] {
        let vars = [("PROMPTLAYER_API_KEY", "pl_123"), ("PROMPTLAYER_HOST", host)];
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid { name: "PROMPTLAYER_HOST", value: host.to_string() }
        );
    }
}
