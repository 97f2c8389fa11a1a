//! Fixed prompt templates. Every prompt asks for a single JSON object whose
//! shape matches the corresponding decoder in [`crate::decode`].

use demand_core::types::{BusinessProfile, Campaign, CampaignInsights};
use serde::{Deserialize, Serialize};

use crate::decode::{MAX_CTA_CHARS, MAX_DESCRIPTION_CHARS, MAX_HEADLINE_CHARS};

/// What the asset prompt is written around.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetBrief {
    pub product: String,
    pub audience: String,
    pub keywords: Vec<String>,
}

impl AssetBrief {
    pub fn from_profile(profile: &BusinessProfile) -> Self {
        Self {
            product: format!("{} ({})", profile.business_name, profile.industry),
            audience: profile.target_audience.clone(),
            keywords: profile.keywords.clone(),
        }
    }

    pub fn from_campaign(campaign: &Campaign, keywords: Vec<String>) -> Self {
        Self {
            product: campaign.name.clone(),
            audience: "existing converters of this campaign".to_string(),
            keywords,
        }
    }
}

pub const STRATEGY_SYSTEM: &str = "You are a performance marketing strategist for Google Ads \
Performance Max campaigns. Reply with one JSON object and nothing else.";

pub const SIGNALS_SYSTEM: &str = "You design audience signals for Google Ads Performance Max. \
Reply with one JSON object and nothing else.";

pub const ASSETS_SYSTEM: &str = "You write ad copy for Google Ads Performance Max and grade \
each line from 0 to 100 by expected click-through. Reply with one JSON object and nothing else.";

pub const RECOMMENDATION_SYSTEM: &str = "You review live Google Ads campaigns and recommend \
changes. Only mark priority high when the data clearly supports acting now. Reply with one \
JSON object and nothing else.";

pub fn strategy_prompt(profile: &BusinessProfile) -> String {
    format!(
        "Business: {name}\nIndustry: {industry}\nTarget audience: {audience}\n\
Monthly budget: {budget}\nAverage order value: {aov}\nMonthly demand index (100 = average): {season:?}\n\
Seed keywords: {keywords}\n\n\
Propose a daily budget and target ROAS. Respond as:\n\
{{\"daily_budget\": number, \"target_roas\": number, \"focus_keywords\": [string], \"rationale\": string}}",
        name = profile.business_name,
        industry = profile.industry,
        audience = profile.target_audience,
        budget = profile.monthly_budget,
        aov = profile.average_order_value,
        season = profile.seasonality,
        keywords = profile.keywords.join(", "),
    )
}

pub fn audience_signals_prompt(profile: &BusinessProfile) -> String {
    format!(
        "Business: {name}\nIndustry: {industry}\nTarget audience: {audience}\n\
Seed keywords: {keywords}\n\n\
Suggest up to 10 audience signals. Each has a type (high_value, lookalike, intent or behavioral), \
a confidence between 0 and 1, an expected_roas between 0 and 50 and a description. \
Intent signals add search_themes, behavioral signals add interests, lookalike signals add seed.\n\
Respond as: {{\"signals\": [{{\"type\": string, \"confidence\": number, \"expected_roas\": number, \
\"description\": string}}]}}",
        name = profile.business_name,
        industry = profile.industry,
        audience = profile.target_audience,
        keywords = profile.keywords.join(", "),
    )
}

pub fn assets_prompt(brief: &AssetBrief) -> String {
    format!(
        "Product: {product}\nAudience: {audience}\nKeywords: {keywords}\n\n\
Write 5 to 15 headlines (max {MAX_HEADLINE_CHARS} characters), 2 to 5 descriptions \
(max {MAX_DESCRIPTION_CHARS} characters) and up to 3 calls to action \
(max {MAX_CTA_CHARS} characters). Score each from 0 to 100.\n\
Respond as: {{\"headlines\": [{{\"text\": string, \"score\": number}}], \
\"descriptions\": [{{\"text\": string, \"score\": number}}], \
\"calls_to_action\": [{{\"text\": string, \"score\": number}}]}}",
        product = brief.product,
        audience = brief.audience,
        keywords = brief.keywords.join(", "),
    )
}

pub fn recommendation_prompt(insights: &CampaignInsights) -> String {
    let payload = serde_json::to_string_pretty(insights).unwrap_or_else(|_| "{}".to_string());
    format!(
        "Campaign data:\n{payload}\n\n\
Recommend optimizations. budget_recommendation is an absolute daily budget or null; \
target_adjustment is \"expand\", \"narrow\" or null; priority is high, medium or low.\n\
Respond as: {{\"optimizations\": [string], \"budget_recommendation\": number | null, \
\"target_adjustment\": string | null, \"priority\": string}}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> BusinessProfile {
        BusinessProfile {
            business_name: "Seaside Villas".into(),
            industry: "hospitality".into(),
            target_audience: "couples".into(),
            landing_url: "https://example.com".into(),
            monthly_budget: 3_000_000.0,
            average_order_value: 250_000.0,
            seasonality: vec![100.0; 12],
            keywords: vec!["pool villa".into(), "ocean view".into()],
        }
    }

    #[test]
    fn test_prompts_carry_profile_and_limits() {
        let p = profile();
        let strategy = strategy_prompt(&p);
        assert!(strategy.contains("Seaside Villas"));
        assert!(strategy.contains("pool villa, ocean view"));
        assert!(strategy.contains("\"daily_budget\": number"));

        let assets = assets_prompt(&AssetBrief::from_profile(&p));
        assert!(assets.contains("max 30 characters"));
        assert!(assets.contains("Seaside Villas (hospitality)"));
    }
}
