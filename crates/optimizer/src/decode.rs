//! Strict decoding of model output. Anything that does not fit the expected
//! shape or ranges is `MalformedOutput`, never a partially trusted value.

use demand_core::types::{
    AssetSet, AudienceSignal, CampaignStrategy, Priority, Recommendation, ScoredAsset,
    TargetingChange,
};
use demand_core::{CampaignError, CampaignResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

pub const MAX_HEADLINE_CHARS: usize = 30;
pub const MAX_DESCRIPTION_CHARS: usize = 90;
pub const MAX_CTA_CHARS: usize = 25;
pub const MAX_SIGNALS: usize = 10;
pub const MAX_EXPECTED_ROAS: f64 = 50.0;
const MAX_SCORE: f64 = 100.0;

fn malformed(msg: impl Into<String>) -> CampaignError {
    CampaignError::MalformedOutput(msg.into())
}

/// Parse `raw` as a JSON object, tolerating a surrounding markdown fence.
fn parse_object(raw: &str) -> CampaignResult<Value> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let value: Value =
        serde_json::from_str(body).map_err(|e| malformed(format!("not valid JSON: {e}")))?;
    if !value.is_object() {
        return Err(malformed("expected a JSON object"));
    }
    Ok(value)
}

fn from_object<T: DeserializeOwned>(value: Value, what: &str) -> CampaignResult<T> {
    serde_json::from_value(value).map_err(|e| malformed(format!("{what}: {e}")))
}

fn positive(value: f64, field: &str) -> CampaignResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(malformed(format!("{field} must be a positive number, got {value}")))
    }
}

pub fn decode_strategy(raw: &str) -> CampaignResult<CampaignStrategy> {
    let mut strategy: CampaignStrategy = from_object(parse_object(raw)?, "strategy")?;
    positive(strategy.daily_budget, "daily_budget")?;
    positive(strategy.target_roas, "target_roas")?;
    if strategy.target_roas > MAX_EXPECTED_ROAS {
        return Err(malformed(format!(
            "target_roas {} above {MAX_EXPECTED_ROAS}",
            strategy.target_roas
        )));
    }
    strategy.focus_keywords = strategy
        .focus_keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    Ok(strategy)
}

#[derive(Deserialize)]
struct SignalsEnvelope {
    signals: Vec<AudienceSignal>,
}

pub fn decode_audience_signals(raw: &str) -> CampaignResult<Vec<AudienceSignal>> {
    let envelope: SignalsEnvelope = from_object(parse_object(raw)?, "audience signals")?;
    if envelope.signals.is_empty() {
        return Err(malformed("no audience signals returned"));
    }

    let mut signals = envelope.signals;
    signals.truncate(MAX_SIGNALS);
    for signal in &signals {
        let confidence = signal.confidence();
        if !(0.0..=1.0).contains(&confidence) {
            return Err(malformed(format!(
                "{:?} signal confidence {confidence} outside [0, 1]",
                signal.kind()
            )));
        }
        let roas = signal.expected_roas();
        if !(0.0..=MAX_EXPECTED_ROAS).contains(&roas) {
            return Err(malformed(format!(
                "{:?} signal expected_roas {roas} outside [0, {MAX_EXPECTED_ROAS}]",
                signal.kind()
            )));
        }
        if signal.description().trim().is_empty() {
            return Err(malformed(format!("{:?} signal has no description", signal.kind())));
        }
    }
    Ok(signals)
}

#[derive(Deserialize)]
struct RawAssets {
    headlines: Vec<ScoredAsset>,
    descriptions: Vec<ScoredAsset>,
    #[serde(default, alias = "ctas")]
    calls_to_action: Vec<ScoredAsset>,
}

/// Decode a scored asset set and keep entries scoring above `threshold`.
///
/// Out-of-range scores reject the whole response. Blank or overlong lines
/// are dropped individually.
pub fn decode_assets(raw: &str, threshold: f64) -> CampaignResult<AssetSet> {
    let assets: RawAssets = from_object(parse_object(raw)?, "assets")?;
    if assets.headlines.is_empty() && assets.descriptions.is_empty() {
        return Err(malformed("no headlines or descriptions returned"));
    }

    let mut set = AssetSet {
        headlines: clean(assets.headlines, MAX_HEADLINE_CHARS, "headline")?,
        descriptions: clean(assets.descriptions, MAX_DESCRIPTION_CHARS, "description")?,
        calls_to_action: clean(assets.calls_to_action, MAX_CTA_CHARS, "call to action")?,
    };
    set.retain_above(threshold);
    Ok(set)
}

fn clean(items: Vec<ScoredAsset>, max_chars: usize, what: &str) -> CampaignResult<Vec<ScoredAsset>> {
    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        if !(item.score.is_finite() && (0.0..=MAX_SCORE).contains(&item.score)) {
            return Err(malformed(format!(
                "{what} score {} outside [0, {MAX_SCORE}]",
                item.score
            )));
        }
        let text = item.text.trim();
        let chars = text.chars().count();
        if chars == 0 || chars > max_chars {
            tracing::debug!(what, chars, max_chars, "Dropping asset outside length limit");
            continue;
        }
        kept.push(ScoredAsset {
            text: text.to_string(),
            score: item.score,
        });
    }
    Ok(kept)
}

#[derive(Deserialize)]
struct RawRecommendation {
    #[serde(default)]
    optimizations: Vec<String>,
    #[serde(default)]
    budget_recommendation: Option<f64>,
    #[serde(default)]
    target_adjustment: Option<String>,
    priority: String,
}

pub fn decode_recommendation(raw: &str) -> CampaignResult<Recommendation> {
    let rec: RawRecommendation = from_object(parse_object(raw)?, "recommendation")?;

    let priority = match rec.priority.trim().to_ascii_lowercase().as_str() {
        "high" => Priority::High,
        "medium" => Priority::Medium,
        "low" => Priority::Low,
        other => return Err(malformed(format!("unknown priority {other:?}"))),
    };

    let budget_recommendation = rec
        .budget_recommendation
        .map(|b| positive(b, "budget_recommendation"))
        .transpose()?;

    let target_adjustment = match rec.target_adjustment.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) => match s.to_ascii_lowercase().as_str() {
            "expand" => Some(TargetingChange::Expand),
            "narrow" => Some(TargetingChange::Narrow),
            "none" | "null" => None,
            other => return Err(malformed(format!("unknown target_adjustment {other:?}"))),
        },
    };

    Ok(Recommendation {
        optimizations: rec
            .optimizations
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect(),
        budget_recommendation,
        target_adjustment,
        priority,
    })
}
