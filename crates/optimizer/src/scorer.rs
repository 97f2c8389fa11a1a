//! Campaign efficiency score: four capped components summing to at most 100.

use demand_core::config::ScoringConfig;
use demand_core::types::PerformanceSnapshot;
use serde::{Deserialize, Serialize};

/// ROAS at which the ROAS component reaches its cap.
const REFERENCE_ROAS: f64 = 4.0;
const CONVERSION_FACTOR: f64 = 6.0;
const QUALITY_FACTOR: f64 = 2.5;
const COST_FACTOR: f64 = 100.0;
const MAX_SCORE: f64 = 100.0;

/// Component caps. Defaults to the 40/30/20/10 split.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreWeights {
    pub roas: f64,
    pub conversion: f64,
    pub quality: f64,
    pub cost: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self::from(&ScoringConfig::default())
    }
}

impl From<&ScoringConfig> for ScoreWeights {
    fn from(config: &ScoringConfig) -> Self {
        Self {
            roas: sanitize_cap(config.roas_weight),
            conversion: sanitize_cap(config.conversion_weight),
            quality: sanitize_cap(config.quality_weight),
            cost: sanitize_cap(config.cost_weight),
        }
    }
}

fn sanitize_cap(cap: f64) -> f64 {
    if cap.is_finite() && cap > 0.0 {
        cap
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EfficiencyBreakdown {
    pub roas: f64,
    pub conversion: f64,
    pub quality: f64,
    pub cost: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Default)]
pub struct EfficiencyScorer {
    weights: ScoreWeights,
}

impl EfficiencyScorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    pub fn score(&self, snapshot: &PerformanceSnapshot) -> EfficiencyBreakdown {
        let w = &self.weights;

        let roas = capped(snapshot.roas / REFERENCE_ROAS * w.roas, w.roas);
        let conversion = capped(snapshot.conversion_rate * CONVERSION_FACTOR, w.conversion);
        let quality = snapshot
            .quality_score
            .map(|q| capped(q * QUALITY_FACTOR, w.quality))
            .unwrap_or(0.0);
        let cost = if snapshot.cost_per_click.is_finite() && snapshot.cost_per_click > 0.0 {
            capped(COST_FACTOR / snapshot.cost_per_click, w.cost)
        } else {
            0.0
        };

        let total = (roas + conversion + quality + cost).clamp(0.0, MAX_SCORE);
        EfficiencyBreakdown {
            roas,
            conversion,
            quality,
            cost,
            total,
        }
    }
}

/// Clamp into `[0, cap]`; NaN contributes nothing.
fn capped(value: f64, cap: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(roas: f64, conversion_rate: f64, quality: Option<f64>, cpc: f64) -> PerformanceSnapshot {
        PerformanceSnapshot {
            campaign_id: "c-1".into(),
            roas,
            conversion_rate,
            quality_score: quality,
            cost_per_click: cpc,
            cost_per_acquisition: 0.0,
            impressions: 0,
            clicks: 0,
            conversions: 0.0,
            cost: 0.0,
            keywords: Vec::new(),
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_component_formulas() {
        let scorer = EfficiencyScorer::default();
        let b = scorer.score(&snapshot(2.0, 2.5, Some(6.0), 20.0));
        assert_eq!(b.roas, 20.0);
        assert_eq!(b.conversion, 15.0);
        assert_eq!(b.quality, 15.0);
        assert_eq!(b.cost, 5.0);
        assert_eq!(b.total, 55.0);
    }

    #[test]
    fn test_components_are_capped() {
        let b = EfficiencyScorer::default().score(&snapshot(40.0, 90.0, Some(10.0), 0.5));
        assert_eq!(b.roas, 40.0);
        assert_eq!(b.conversion, 30.0);
        assert_eq!(b.quality, 20.0);
        assert_eq!(b.cost, 10.0);
        assert_eq!(b.total, 100.0);
    }

    #[test]
    fn test_zero_or_negative_cpc_scores_nothing() {
        let scorer = EfficiencyScorer::default();
        assert_eq!(scorer.score(&snapshot(4.0, 1.0, Some(5.0), 0.0)).cost, 0.0);
        assert_eq!(scorer.score(&snapshot(4.0, 1.0, Some(5.0), -3.0)).cost, 0.0);
        assert_eq!(scorer.score(&snapshot(4.0, 1.0, Some(5.0), f64::NAN)).cost, 0.0);
    }

    #[test]
    fn test_missing_quality_scores_nothing() {
        let b = EfficiencyScorer::default().score(&snapshot(4.0, 0.0, None, 1_000.0));
        assert_eq!(b.quality, 0.0);
        assert_eq!(b.total, 40.0 + 0.1);
    }

    #[test]
    fn test_total_always_in_range() {
        let scorer = EfficiencyScorer::default();
        let values = [
            f64::NEG_INFINITY,
            -1e12,
            -1.0,
            0.0,
            1e-9,
            0.5,
            3.9,
            6.1,
            1e6,
            f64::MAX,
            f64::INFINITY,
            f64::NAN,
        ];
        for &roas in &values {
            for &rate in &values {
                for &quality in &values {
                    for &cpc in &values {
                        let total = scorer.score(&snapshot(roas, rate, Some(quality), cpc)).total;
                        assert!(
                            (0.0..=100.0).contains(&total),
                            "roas={roas} rate={rate} q={quality} cpc={cpc} -> {total}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_custom_weights_still_bounded() {
        let scorer = EfficiencyScorer::new(ScoreWeights::from(&ScoringConfig {
            roas_weight: 80.0,
            conversion_weight: 60.0,
            quality_weight: f64::NAN,
            cost_weight: -5.0,
        }));
        assert_eq!(scorer.weights().quality, 0.0);
        assert_eq!(scorer.weights().cost, 0.0);
        let b = scorer.score(&snapshot(100.0, 100.0, Some(10.0), 0.1));
        assert_eq!(b.total, 100.0);
    }
}
