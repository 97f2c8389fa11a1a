use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Performance Max campaign as known to the ad platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    /// `customers/{cid}/campaigns/{id}`
    pub resource_name: String,
    pub budget_resource_name: String,
    #[serde(default)]
    pub asset_group_resource_name: Option<String>,
    pub daily_budget: f64,
    pub bidding: BiddingStrategy,
    pub status: CampaignStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BiddingStrategy {
    pub target_roas: f64,
    /// CPC ceiling and floor from the bidding plan. `None` when read back
    /// from a platform that does not report them.
    #[serde(default)]
    pub max_cpc: Option<f64>,
    #[serde(default)]
    pub min_cpc: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Enabled,
    Paused,
    Removed,
}

/// Metrics for a single campaign, refetched on every poll.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceSnapshot {
    pub campaign_id: String,
    pub roas: f64,
    /// Percent, e.g. `5.2` for 5.2%.
    pub conversion_rate: f64,
    /// Click-weighted keyword quality score, 1-10. `None` when the
    /// campaign has no keyword-level data.
    #[serde(default)]
    pub quality_score: Option<f64>,
    pub cost_per_click: f64,
    pub cost_per_acquisition: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: f64,
    pub cost: f64,
    #[serde(default)]
    pub keywords: Vec<KeywordPerformance>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordPerformance {
    pub text: String,
    pub cost: f64,
    pub clicks: u64,
    pub conversions: f64,
}

/// Hint for the platform's automated targeting. Generated once when a
/// campaign is created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AudienceSignal {
    HighValue {
        confidence: f64,
        expected_roas: f64,
        description: String,
    },
    Lookalike {
        confidence: f64,
        expected_roas: f64,
        description: String,
        seed: String,
    },
    Intent {
        confidence: f64,
        expected_roas: f64,
        description: String,
        #[serde(default)]
        search_themes: Vec<String>,
    },
    Behavioral {
        confidence: f64,
        expected_roas: f64,
        description: String,
        #[serde(default)]
        interests: Vec<String>,
    },
}

impl AudienceSignal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Self::HighValue { .. } => SignalKind::HighValue,
            Self::Lookalike { .. } => SignalKind::Lookalike,
            Self::Intent { .. } => SignalKind::Intent,
            Self::Behavioral { .. } => SignalKind::Behavioral,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Self::HighValue { confidence, .. }
            | Self::Lookalike { confidence, .. }
            | Self::Intent { confidence, .. }
            | Self::Behavioral { confidence, .. } => *confidence,
        }
    }

    pub fn expected_roas(&self) -> f64 {
        match self {
            Self::HighValue { expected_roas, .. }
            | Self::Lookalike { expected_roas, .. }
            | Self::Intent { expected_roas, .. }
            | Self::Behavioral { expected_roas, .. } => *expected_roas,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::HighValue { description, .. }
            | Self::Lookalike { description, .. }
            | Self::Intent { description, .. }
            | Self::Behavioral { description, .. } => description,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    HighValue,
    Lookalike,
    Intent,
    Behavioral,
}

/// A model-scored creative line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredAsset {
    pub text: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AssetSet {
    pub headlines: Vec<ScoredAsset>,
    pub descriptions: Vec<ScoredAsset>,
    pub calls_to_action: Vec<ScoredAsset>,
}

impl AssetSet {
    pub fn len(&self) -> usize {
        self.headlines.len() + self.descriptions.len() + self.calls_to_action.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep only assets scoring strictly above `threshold`.
    pub fn retain_above(&mut self, threshold: f64) {
        self.headlines.retain(|a| a.score > threshold);
        self.descriptions.retain(|a| a.score > threshold);
        self.calls_to_action.retain(|a| a.score > threshold);
    }
}

/// Business parameters a campaign is launched from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessProfile {
    pub business_name: String,
    pub industry: String,
    pub target_audience: String,
    pub landing_url: String,
    pub monthly_budget: f64,
    pub average_order_value: f64,
    /// Twelve monthly demand percentages, 100 = average month.
    pub seasonality: Vec<f64>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Model-proposed budget and return target for a new campaign.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignStrategy {
    pub daily_budget: f64,
    pub target_roas: f64,
    #[serde(default)]
    pub focus_keywords: Vec<String>,
    #[serde(default)]
    pub rationale: String,
}

/// Everything the ad platform needs to create a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignDraft {
    pub name: String,
    pub landing_url: String,
    pub daily_budget: f64,
    pub bidding: BiddingStrategy,
    pub audience_signals: Vec<AudienceSignal>,
    pub assets: AssetSet,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetingChange {
    Expand,
    Narrow,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Hourly model recommendation for one campaign.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub optimizations: Vec<String>,
    pub budget_recommendation: Option<f64>,
    pub target_adjustment: Option<TargetingChange>,
    pub priority: Priority,
}

/// A change the optimizer applies to a live campaign.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OptimizationAction {
    AdjustBudget { from: f64, to: f64, reason: String },
    AdjustTargeting { change: TargetingChange },
    RefreshAssets,
    AddNegativeKeywords { keywords: Vec<String> },
}

impl OptimizationAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AdjustBudget { .. } => "adjust_budget",
            Self::AdjustTargeting { .. } => "adjust_targeting",
            Self::RefreshAssets => "refresh_assets",
            Self::AddNegativeKeywords { .. } => "add_negative_keywords",
        }
    }
}

/// Record of an action that reached the ad platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedAction {
    pub idempotency_key: String,
    pub campaign_id: String,
    pub action: OptimizationAction,
    pub applied_at: DateTime<Utc>,
}

/// Payload submitted to the model by the hourly insight cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignInsights {
    pub campaign_id: String,
    pub campaign_name: String,
    pub daily_budget: f64,
    pub target_roas: f64,
    pub snapshot: Option<PerformanceSnapshot>,
    pub efficiency_score: Option<f64>,
    pub recent_actions: Vec<OptimizationAction>,
}
