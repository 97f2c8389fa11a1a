//! Threshold rules that turn a performance snapshot into optimization
//! actions. Pure: nothing here talks to the outside world.

use std::collections::HashSet;

use demand_core::config::OptimizerConfig;
use demand_core::types::{OptimizationAction, PerformanceSnapshot, TargetingChange};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BudgetDecision {
    Increase { factor: f64 },
    Decrease { factor: f64 },
    Hold,
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    config: OptimizerConfig,
}

impl RuleSet {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn budget_decision(&self, roas: f64) -> BudgetDecision {
        if roas > self.config.increase_roas_threshold {
            BudgetDecision::Increase {
                factor: self.config.budget_increase_factor,
            }
        } else if roas < self.config.decrease_roas_threshold {
            BudgetDecision::Decrease {
                factor: self.config.budget_decrease_factor,
            }
        } else {
            BudgetDecision::Hold
        }
    }

    /// Clamp a proposed daily budget into the configured guardrail.
    pub fn clamp_budget(&self, amount: f64) -> f64 {
        amount.clamp(self.config.min_daily_budget, self.config.max_daily_budget)
    }

    /// Accept a model-recommended budget only if it sits inside the
    /// guardrail and within the allowed relative change from `current`.
    pub fn vet_recommended_budget(&self, current: f64, proposed: f64) -> Option<f64> {
        if !(proposed.is_finite() && current.is_finite() && current > 0.0) {
            return None;
        }
        if proposed < self.config.min_daily_budget || proposed > self.config.max_daily_budget {
            return None;
        }
        let change = (proposed - current).abs() / current;
        if change > self.config.max_recommendation_change || change <= f64::EPSILON {
            return None;
        }
        Some(proposed)
    }

    /// Keywords that burned money without converting and are not already
    /// excluded, in descending cost order.
    pub fn wasted_keywords(
        &self,
        snapshot: &PerformanceSnapshot,
        existing_negatives: &HashSet<String>,
    ) -> Vec<String> {
        let mut wasted: Vec<_> = snapshot
            .keywords
            .iter()
            .filter(|k| {
                k.conversions <= 0.0
                    && k.cost >= self.config.wasted_spend_min_cost
                    && k.clicks >= self.config.wasted_spend_min_clicks
                    && !existing_negatives.contains(&k.text.to_lowercase())
            })
            .collect();
        wasted.sort_by(|a, b| b.cost.total_cmp(&a.cost));

        let mut seen = HashSet::new();
        wasted
            .into_iter()
            .map(|k| k.text.to_lowercase())
            .filter(|text| seen.insert(text.clone()))
            .collect()
    }

    /// All actions the snapshot calls for, budget change first.
    pub fn evaluate(
        &self,
        snapshot: &PerformanceSnapshot,
        current_budget: f64,
        existing_negatives: &HashSet<String>,
    ) -> Vec<OptimizationAction> {
        let mut actions = Vec::new();

        // ROAS is undefined until the campaign has spent something, and a
        // zero budget means the listing did not report one.
        let decision = if snapshot.cost > 0.0 && current_budget > 0.0 {
            self.budget_decision(snapshot.roas)
        } else {
            BudgetDecision::Hold
        };
        let proposal = match decision {
            BudgetDecision::Increase { factor } => {
                let to = self.clamp_budget(current_budget * factor);
                (to > current_budget).then_some((to, "roas_above_target"))
            }
            BudgetDecision::Decrease { factor } => {
                let to = self.clamp_budget(current_budget * factor);
                (to < current_budget).then_some((to, "roas_below_floor"))
            }
            BudgetDecision::Hold => None,
        };
        if let Some((to, reason)) = proposal {
            actions.push(OptimizationAction::AdjustBudget {
                from: current_budget,
                to,
                reason: format!("{reason} roas={:.2}", snapshot.roas),
            });
        }

        if snapshot.conversion_rate > self.config.expand_conversion_rate {
            actions.push(OptimizationAction::AdjustTargeting {
                change: TargetingChange::Expand,
            });
        }

        if let Some(quality) = snapshot.quality_score {
            if quality < self.config.min_quality_score {
                actions.push(OptimizationAction::RefreshAssets);
            }
        }

        let wasted = self.wasted_keywords(snapshot, existing_negatives);
        if !wasted.is_empty() {
            actions.push(OptimizationAction::AddNegativeKeywords { keywords: wasted });
        }

        actions
    }
}
