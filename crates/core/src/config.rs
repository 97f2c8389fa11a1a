use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `DEMAND_GEN__` (the environment
/// wins).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub google_ads: GoogleAdsConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Google Ads API credentials and endpoints.
#[derive(Clone, Deserialize)]
pub struct GoogleAdsConfig {
    #[serde(default)]
    pub customer_id: String,
    /// Manager account id, sent as `login-customer-id` when set.
    #[serde(default)]
    pub login_customer_id: Option<String>,
    #[serde(default)]
    pub developer_token: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default = "default_google_ads_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_google_ads_version")]
    pub api_version: String,
    #[serde(default = "default_oauth_token_url")]
    pub token_url: String,
}

/// OpenAI chat completion settings.
#[derive(Clone, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

/// Scheduling, rule thresholds and budget guardrails for the optimizer.
#[derive(Debug, Clone, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_realtime_interval_secs")]
    pub realtime_interval_secs: u64,
    #[serde(default = "default_insight_interval_secs")]
    pub insight_interval_secs: u64,
    #[serde(default = "default_startup_jitter_ms")]
    pub startup_jitter_ms: u64,
    #[serde(default = "default_max_concurrent_campaigns")]
    pub max_concurrent_campaigns: usize,
    #[serde(default = "default_base_roas")]
    pub base_roas: f64,
    #[serde(default = "default_increase_roas_threshold")]
    pub increase_roas_threshold: f64,
    #[serde(default = "default_decrease_roas_threshold")]
    pub decrease_roas_threshold: f64,
    #[serde(default = "default_budget_increase_factor")]
    pub budget_increase_factor: f64,
    #[serde(default = "default_budget_decrease_factor")]
    pub budget_decrease_factor: f64,
    #[serde(default = "default_expand_conversion_rate")]
    pub expand_conversion_rate: f64,
    #[serde(default = "default_min_quality_score")]
    pub min_quality_score: f64,
    #[serde(default = "default_wasted_spend_min_cost")]
    pub wasted_spend_min_cost: f64,
    #[serde(default = "default_wasted_spend_min_clicks")]
    pub wasted_spend_min_clicks: u64,
    #[serde(default = "default_min_daily_budget")]
    pub min_daily_budget: f64,
    #[serde(default = "default_max_daily_budget")]
    pub max_daily_budget: f64,
    /// Largest relative budget change a model recommendation may apply.
    #[serde(default = "default_max_recommendation_change")]
    pub max_recommendation_change: f64,
    #[serde(default = "default_asset_score_threshold")]
    pub asset_score_threshold: f64,
    /// Number of applied actions kept per campaign for insight prompts.
    #[serde(default = "default_action_history")]
    pub action_history: usize,
}

/// Caps of the four efficiency score components. They are policy, not law.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_roas_weight")]
    pub roas_weight: f64,
    #[serde(default = "default_conversion_weight")]
    pub conversion_weight: f64,
    #[serde(default = "default_quality_weight")]
    pub quality_weight: f64,
    #[serde(default = "default_cost_weight")]
    pub cost_weight: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Duration the circuit stays open before moving to half-open.
    #[serde(default = "default_open_duration_secs")]
    pub open_duration_secs: u64,
    /// Number of successful requests in half-open to close the circuit.
    #[serde(default = "default_half_open_successes")]
    pub half_open_successes: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_host")]
    pub host: String,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default functions
fn default_node_id() -> String {
    "optimizer-01".to_string()
}
fn default_google_ads_base_url() -> String {
    "https://googleads.googleapis.com".to_string()
}
fn default_google_ads_version() -> String {
    "v17".to_string()
}
fn default_oauth_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}
fn default_openai_model() -> String {
    "gpt-4o".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_realtime_interval_secs() -> u64 {
    15 * 60
}
fn default_insight_interval_secs() -> u64 {
    60 * 60
}
fn default_startup_jitter_ms() -> u64 {
    5_000
}
fn default_max_concurrent_campaigns() -> usize {
    8
}
fn default_base_roas() -> f64 {
    4.0
}
fn default_increase_roas_threshold() -> f64 {
    6.0
}
fn default_decrease_roas_threshold() -> f64 {
    2.0
}
fn default_budget_increase_factor() -> f64 {
    1.2
}
fn default_budget_decrease_factor() -> f64 {
    0.8
}
fn default_expand_conversion_rate() -> f64 {
    5.0
}
fn default_min_quality_score() -> f64 {
    6.0
}
fn default_wasted_spend_min_cost() -> f64 {
    50_000.0
}
fn default_wasted_spend_min_clicks() -> u64 {
    20
}
fn default_min_daily_budget() -> f64 {
    10_000.0
}
fn default_max_daily_budget() -> f64 {
    10_000_000.0
}
fn default_max_recommendation_change() -> f64 {
    0.5
}
fn default_asset_score_threshold() -> f64 {
    70.0
}
fn default_action_history() -> usize {
    20
}
fn default_roas_weight() -> f64 {
    40.0
}
fn default_conversion_weight() -> f64 {
    30.0
}
fn default_quality_weight() -> f64 {
    20.0
}
fn default_cost_weight() -> f64 {
    10.0
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_jitter() -> bool {
    true
}
fn default_call_timeout_ms() -> u64 {
    30_000
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_open_duration_secs() -> u64 {
    300
}
fn default_half_open_successes() -> u32 {
    1
}
fn default_metrics_host() -> String {
    "0.0.0.0".to_string()
}
fn default_metrics_port() -> u16 {
    9091
}

impl Default for GoogleAdsConfig {
    fn default() -> Self {
        Self {
            customer_id: String::new(),
            login_customer_id: None,
            developer_token: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            api_base_url: default_google_ads_base_url(),
            api_version: default_google_ads_version(),
            token_url: default_oauth_token_url(),
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_openai_model(),
            base_url: default_openai_base_url(),
            temperature: default_temperature(),
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            realtime_interval_secs: default_realtime_interval_secs(),
            insight_interval_secs: default_insight_interval_secs(),
            startup_jitter_ms: default_startup_jitter_ms(),
            max_concurrent_campaigns: default_max_concurrent_campaigns(),
            base_roas: default_base_roas(),
            increase_roas_threshold: default_increase_roas_threshold(),
            decrease_roas_threshold: default_decrease_roas_threshold(),
            budget_increase_factor: default_budget_increase_factor(),
            budget_decrease_factor: default_budget_decrease_factor(),
            expand_conversion_rate: default_expand_conversion_rate(),
            min_quality_score: default_min_quality_score(),
            wasted_spend_min_cost: default_wasted_spend_min_cost(),
            wasted_spend_min_clicks: default_wasted_spend_min_clicks(),
            min_daily_budget: default_min_daily_budget(),
            max_daily_budget: default_max_daily_budget(),
            max_recommendation_change: default_max_recommendation_change(),
            asset_score_threshold: default_asset_score_threshold(),
            action_history: default_action_history(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            roas_weight: default_roas_weight(),
            conversion_weight: default_conversion_weight(),
            quality_weight: default_quality_weight(),
            cost_weight: default_cost_weight(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            open_duration_secs: default_open_duration_secs(),
            half_open_successes: default_half_open_successes(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            host: default_metrics_host(),
            port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            google_ads: GoogleAdsConfig::default(),
            openai: OpenAiConfig::default(),
            optimizer: OptimizerConfig::default(),
            scoring: ScoringConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

// ─── Secret redaction ───────────────────────────────────────────────────

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl fmt::Debug for GoogleAdsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleAdsConfig")
            .field("customer_id", &self.customer_id)
            .field("login_customer_id", &self.login_customer_id)
            .field("developer_token", &redact(&self.developer_token))
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("api_base_url", &self.api_base_url)
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file overlaid with
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            tracing::debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let builder = builder.add_source(
            config::Environment::with_prefix("DEMAND_GEN")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Check credentials and guardrail ordering before anything talks to
    /// the outside world.
    pub fn validate(&self) -> Result<(), crate::CampaignError> {
        let missing: Vec<&str> = [
            ("google_ads.customer_id", self.google_ads.customer_id.is_empty()),
            (
                "google_ads.developer_token",
                self.google_ads.developer_token.is_empty(),
            ),
            ("google_ads.client_id", self.google_ads.client_id.is_empty()),
            (
                "google_ads.client_secret",
                self.google_ads.client_secret.is_empty(),
            ),
            (
                "google_ads.refresh_token",
                self.google_ads.refresh_token.is_empty(),
            ),
            ("openai.api_key", self.openai.api_key.is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, empty)| empty.then_some(name))
        .collect();

        if !missing.is_empty() {
            return Err(crate::CampaignError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        let opt = &self.optimizer;
        if !(opt.min_daily_budget > 0.0 && opt.min_daily_budget <= opt.max_daily_budget) {
            return Err(crate::CampaignError::Config(format!(
                "invalid budget guardrail [{}, {}]",
                opt.min_daily_budget, opt.max_daily_budget
            )));
        }
        if opt.decrease_roas_threshold >= opt.increase_roas_threshold {
            return Err(crate::CampaignError::Config(
                "decrease_roas_threshold must be below increase_roas_threshold".to_string(),
            ));
        }
        if opt.realtime_interval_secs == 0 || opt.insight_interval_secs == 0 {
            return Err(crate::CampaignError::Config(
                "optimizer intervals must be non-zero".to_string(),
            ));
        }
        if opt.max_concurrent_campaigns == 0 {
            return Err(crate::CampaignError::Config(
                "max_concurrent_campaigns must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> AppConfig {
        let mut config = AppConfig::default();
        config.google_ads.customer_id = "1234567890".into();
        config.google_ads.developer_token = "dev-token".into();
        config.google_ads.client_id = "client".into();
        config.google_ads.client_secret = "secret".into();
        config.google_ads.refresh_token = "refresh".into();
        config.openai.api_key = "sk-test".into();
        config
    }

    #[test]
    fn test_defaults_match_loop_cadence() {
        let config = AppConfig::default();
        assert_eq!(config.optimizer.realtime_interval_secs, 900);
        assert_eq!(config.optimizer.insight_interval_secs, 3600);
        assert_eq!(config.optimizer.base_roas, 4.0);
        assert_eq!(config.scoring.roas_weight + config.scoring.conversion_weight
            + config.scoring.quality_weight + config.scoring.cost_weight, 100.0);
    }

    #[test]
    fn test_validate_reports_missing_credentials() {
        let err = AppConfig::default().validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("google_ads.customer_id"));
        assert!(msg.contains("openai.api_key"));

        assert!(configured().validate().is_ok());
    }

    #[test]
    fn test_validate_guardrails() {
        let mut config = configured();
        config.optimizer.min_daily_budget = 500.0;
        config.optimizer.max_daily_budget = 100.0;
        assert!(config.validate().is_err());

        let mut config = configured();
        config.optimizer.decrease_roas_threshold = 7.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = configured();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk-test"));
        assert!(!rendered.contains("refresh\""));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("1234567890"));
    }
}
