//! The two optimization cycles. The realtime cycle applies threshold rules
//! to fresh snapshots; the insight cycle asks the model for a
//! recommendation and applies it only when it is high priority.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use demand_connectors::{AdPlatform, GuardedCaller};
use demand_core::config::OptimizerConfig;
use demand_core::types::{Campaign, OptimizationAction, PerformanceSnapshot, Priority};
use demand_core::{CampaignError, CampaignResult};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::executor::{ActionExecutor, ApplyOutcome};
use crate::generator::CampaignGenerator;
use crate::rules::RuleSet;
use crate::scorer::{EfficiencyScorer, ScoreWeights};
use crate::store::OptimizationStore;

/// Breaker key for account-level calls that belong to no campaign.
pub const ACCOUNT_KEY: &str = "_account";
/// How long applied idempotency keys are remembered.
const APPLIED_KEY_RETENTION_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    Realtime,
    Insight,
}

impl CycleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Realtime => "realtime",
            Self::Insight => "insight",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: u64,
    pub kind: CycleKind,
    pub campaigns: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub actions_applied: usize,
}

pub struct OptimizationEngine {
    ads: Arc<dyn AdPlatform>,
    ads_caller: Arc<GuardedCaller>,
    generator: Arc<CampaignGenerator>,
    executor: ActionExecutor,
    store: Arc<OptimizationStore>,
    rules: RuleSet,
    scorer: EfficiencyScorer,
    max_concurrent: usize,
}

impl OptimizationEngine {
    pub fn new(
        ads: Arc<dyn AdPlatform>,
        ads_caller: Arc<GuardedCaller>,
        generator: Arc<CampaignGenerator>,
        store: Arc<OptimizationStore>,
        config: OptimizerConfig,
        weights: ScoreWeights,
    ) -> Self {
        let executor = ActionExecutor::new(
            ads.clone(),
            ads_caller.clone(),
            generator.clone(),
            store.clone(),
        );
        Self {
            ads,
            ads_caller,
            generator,
            executor,
            store,
            max_concurrent: config.max_concurrent_campaigns.max(1),
            rules: RuleSet::new(config),
            scorer: EfficiencyScorer::new(weights),
        }
    }

    pub fn store(&self) -> &Arc<OptimizationStore> {
        &self.store
    }

    pub async fn run_realtime_cycle(self: &Arc<Self>) -> CampaignResult<CycleReport> {
        self.run_cycle(CycleKind::Realtime).await
    }

    pub async fn run_insight_cycle(self: &Arc<Self>) -> CampaignResult<CycleReport> {
        let report = self.run_cycle(CycleKind::Insight).await?;
        let cutoff = Utc::now() - chrono::Duration::hours(APPLIED_KEY_RETENTION_HOURS);
        let pruned = self.store.prune_applied(cutoff);
        if pruned > 0 {
            debug!(pruned, "Pruned applied action keys");
        }
        Ok(report)
    }

    async fn run_cycle(self: &Arc<Self>, kind: CycleKind) -> CampaignResult<CycleReport> {
        let cycle_id = self.store.next_cycle_id();
        let campaigns = self.list_campaigns().await?;
        metrics::counter!("optimizer.cycle.campaigns", "kind" => kind.as_str())
            .increment(campaigns.len() as u64);
        info!(cycle_id, kind = kind.as_str(), campaigns = campaigns.len(), "Starting cycle");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        for campaign in &campaigns {
            let engine = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let campaign_id = campaign.id.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = match kind {
                    CycleKind::Realtime => engine.optimize_campaign(&campaign_id, cycle_id).await,
                    CycleKind::Insight => engine.review_campaign(&campaign_id, cycle_id).await,
                };
                (campaign_id, result)
            });
        }

        let mut report = CycleReport {
            cycle_id,
            kind,
            campaigns: campaigns.len(),
            succeeded: 0,
            failed: 0,
            actions_applied: 0,
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(applied))) => {
                    report.succeeded += 1;
                    report.actions_applied += applied;
                }
                Ok((campaign_id, Err(e))) => {
                    report.failed += 1;
                    metrics::counter!(
                        "optimizer.campaign.failures",
                        "kind" => kind.as_str(),
                        "error" => e.kind()
                    )
                    .increment(1);
                    warn!(campaign_id = %campaign_id, cycle_id, error = %e, "Campaign optimization failed");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(cycle_id, error = %e, "Campaign task panicked");
                }
            }
        }

        info!(
            cycle_id,
            kind = kind.as_str(),
            succeeded = report.succeeded,
            failed = report.failed,
            actions = report.actions_applied,
            "Cycle complete"
        );
        Ok(report)
    }

    async fn list_campaigns(&self) -> CampaignResult<Vec<Campaign>> {
        let listed_at = Utc::now();
        let ads = &self.ads;
        let campaigns = self
            .ads_caller
            .call(ACCOUNT_KEY, "list_active_campaigns", || async move {
                ads.list_active_campaigns().await
            })
            .await?;
        let listed: HashSet<String> = campaigns.iter().map(|c| c.id.clone()).collect();
        let dropped = self.store.retain_listed(&listed);
        if dropped > 0 {
            debug!(dropped, "Forgot campaigns no longer listed");
        }
        for campaign in &campaigns {
            self.store.observe_campaign(campaign.clone(), listed_at);
        }
        Ok(campaigns)
    }

    async fn fetch_snapshot(&self, campaign: &Campaign) -> CampaignResult<PerformanceSnapshot> {
        let ads = &self.ads;
        let snapshot = self
            .ads_caller
            .call(&campaign.id, "fetch_performance", || async move {
                ads.fetch_performance(campaign).await
            })
            .await?;
        let breakdown = self.scorer.score(&snapshot);
        debug!(
            campaign_id = %campaign.id,
            roas = snapshot.roas,
            score = breakdown.total,
            "Scored campaign"
        );
        self.store.record_snapshot(snapshot.clone(), breakdown.total);
        Ok(snapshot)
    }

    fn known_campaign(&self, campaign_id: &str) -> CampaignResult<Campaign> {
        self.store
            .campaign(campaign_id)
            .ok_or_else(|| CampaignError::Validation(format!("unknown campaign {campaign_id}")))
    }

    /// Realtime pass over one campaign. Returns the number of actions
    /// applied.
    pub async fn optimize_campaign(&self, campaign_id: &str, cycle_id: u64) -> CampaignResult<usize> {
        let lock = self.store.campaign_lock(campaign_id);
        let _guard = lock.lock().await;

        let campaign = self.known_campaign(campaign_id)?;
        let snapshot = self.fetch_snapshot(&campaign).await?;
        let actions = self.rules.evaluate(
            &snapshot,
            campaign.daily_budget,
            &self.store.negatives(campaign_id),
        );
        self.apply_all(&campaign, actions, cycle_id).await
    }

    /// Insight pass over one campaign. Returns the number of actions
    /// applied.
    pub async fn review_campaign(&self, campaign_id: &str, cycle_id: u64) -> CampaignResult<usize> {
        let lock = self.store.campaign_lock(campaign_id);
        let _guard = lock.lock().await;

        let campaign = self.known_campaign(campaign_id)?;
        if self.store.latest_snapshot(campaign_id).is_none() {
            self.fetch_snapshot(&campaign).await?;
        }
        let insights = self
            .store
            .insights(campaign_id)
            .ok_or_else(|| CampaignError::Validation(format!("unknown campaign {campaign_id}")))?;

        let recommendation = self.generator.recommendation(&insights).await?;
        for note in &recommendation.optimizations {
            info!(campaign_id, note = %note, "Model optimization note");
        }
        if recommendation.priority != Priority::High {
            debug!(campaign_id, priority = ?recommendation.priority, "Recommendation not acted on");
            return Ok(0);
        }

        let mut actions = Vec::new();
        if let Some(proposed) = recommendation.budget_recommendation {
            let current = campaign.daily_budget;
            match self.rules.vet_recommended_budget(current, proposed) {
                Some(to) => actions.push(OptimizationAction::AdjustBudget {
                    from: current,
                    to,
                    reason: "model_recommendation".to_string(),
                }),
                None => warn!(
                    campaign_id,
                    current,
                    proposed,
                    "Recommended budget outside guardrails, ignoring"
                ),
            }
        }
        if let Some(change) = recommendation.target_adjustment {
            actions.push(OptimizationAction::AdjustTargeting { change });
        }
        self.apply_all(&campaign, actions, cycle_id).await
    }

    /// Apply actions in order. A failed action is logged and the rest still
    /// run, except on shutdown.
    async fn apply_all(
        &self,
        campaign: &Campaign,
        actions: Vec<OptimizationAction>,
        cycle_id: u64,
    ) -> CampaignResult<usize> {
        let mut applied = 0;
        for action in actions {
            let kind = action.kind();
            match self.executor.apply(campaign, action, cycle_id).await {
                Ok(ApplyOutcome::Applied) => applied += 1,
                Ok(ApplyOutcome::AlreadyApplied) => {}
                Err(CampaignError::Cancelled) => return Err(CampaignError::Cancelled),
                Err(e) => {
                    metrics::counter!("optimizer.actions.failed", "kind" => kind).increment(1);
                    warn!(campaign_id = %campaign.id, action = kind, error = %e, "Action failed");
                }
            }
        }
        Ok(applied)
    }
}
