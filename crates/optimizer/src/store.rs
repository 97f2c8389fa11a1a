//! In-memory optimizer state shared by both cycles and the launcher.
//!
//! Nothing here is authoritative: the ad platform owns campaigns and
//! budgets. The store only remembers what the optimizer has seen and done
//! so the cycles can coordinate.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use demand_core::types::{
    AppliedAction, Campaign, CampaignInsights, OptimizationAction, PerformanceSnapshot,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

const DEFAULT_REVIEW_CAPACITY: usize = 1_000;

/// Key under which an action is applied at most once.
///
/// Every cycle run draws a fresh cycle id, so the key only dedupes work
/// re-entering a campaign within one cycle. A failed action is not replayed
/// by key: the next cycle re-derives it from a fresh snapshot.
pub fn idempotency_key(campaign_id: &str, cycle_id: u64, action: &OptimizationAction) -> String {
    format!("{campaign_id}:{cycle_id}:{}", action.kind())
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct BudgetRecord {
    amount: f64,
    as_of: DateTime<Utc>,
}

/// Model output that failed validation, kept for a human to look at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: Uuid,
    /// Which generator produced it, e.g. `assets`.
    pub source: String,
    /// Campaign id or business name the request was made for.
    pub subject: String,
    pub error: String,
    pub recorded_at: DateTime<Utc>,
}

pub struct OptimizationStore {
    campaigns: DashMap<String, Campaign>,
    budgets: DashMap<String, BudgetRecord>,
    snapshots: DashMap<String, PerformanceSnapshot>,
    scores: DashMap<String, f64>,
    negatives: DashMap<String, HashSet<String>>,
    history: DashMap<String, VecDeque<AppliedAction>>,
    applied: DashMap<String, DateTime<Utc>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    review: parking_lot::Mutex<VecDeque<ReviewRecord>>,
    review_capacity: usize,
    history_limit: usize,
    cycle_seq: AtomicU64,
}

impl Default for OptimizationStore {
    fn default() -> Self {
        Self::new(20)
    }
}

impl OptimizationStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            campaigns: DashMap::new(),
            budgets: DashMap::new(),
            snapshots: DashMap::new(),
            scores: DashMap::new(),
            negatives: DashMap::new(),
            history: DashMap::new(),
            applied: DashMap::new(),
            locks: DashMap::new(),
            review: parking_lot::Mutex::new(VecDeque::new()),
            review_capacity: DEFAULT_REVIEW_CAPACITY,
            history_limit: history_limit.max(1),
            cycle_seq: AtomicU64::new(0),
        }
    }

    pub fn next_cycle_id(&self) -> u64 {
        self.cycle_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// The async mutex serializing all work on one campaign.
    pub fn campaign_lock(&self, campaign_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(campaign_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ─── Campaigns & budgets ────────────────────────────────────────────

    /// Record a campaign as listed by the platform at `as_of`. The cached
    /// budget is only replaced if no newer value has been written since.
    pub fn observe_campaign(&self, campaign: Campaign, as_of: DateTime<Utc>) {
        self.observe_budget(&campaign.id, campaign.daily_budget, as_of);
        self.campaigns.insert(campaign.id.clone(), campaign);
    }

    pub fn register_campaign(&self, campaign: Campaign) {
        self.observe_campaign(campaign, Utc::now());
    }

    fn observe_budget(&self, campaign_id: &str, amount: f64, as_of: DateTime<Utc>) {
        self.budgets
            .entry(campaign_id.to_string())
            .and_modify(|record| {
                if as_of >= record.as_of {
                    *record = BudgetRecord { amount, as_of };
                }
            })
            .or_insert(BudgetRecord { amount, as_of });
    }

    /// Record a budget this process just set on the platform.
    pub fn set_budget(&self, campaign_id: &str, amount: f64) {
        let now = Utc::now();
        self.budgets
            .insert(campaign_id.to_string(), BudgetRecord { amount, as_of: now });
        if let Some(mut campaign) = self.campaigns.get_mut(campaign_id) {
            campaign.daily_budget = amount;
        }
    }

    pub fn budget(&self, campaign_id: &str) -> Option<f64> {
        self.budgets.get(campaign_id).map(|r| r.amount)
    }

    pub fn campaign(&self, campaign_id: &str) -> Option<Campaign> {
        self.campaigns.get(campaign_id).map(|c| {
            let mut campaign = c.clone();
            if let Some(amount) = self.budget(campaign_id) {
                campaign.daily_budget = amount;
            }
            campaign
        })
    }

    pub fn campaign_count(&self) -> usize {
        self.campaigns.len()
    }

    /// Forget every campaign missing from a full listing. Applied keys are
    /// left to age out through [`prune_applied`](Self::prune_applied).
    pub fn retain_listed(&self, listed: &HashSet<String>) -> usize {
        let before = self.campaigns.len();
        self.campaigns.retain(|id, _| listed.contains(id));
        self.budgets.retain(|id, _| listed.contains(id));
        self.snapshots.retain(|id, _| listed.contains(id));
        self.scores.retain(|id, _| listed.contains(id));
        self.negatives.retain(|id, _| listed.contains(id));
        self.history.retain(|id, _| listed.contains(id));
        self.locks.retain(|id, _| listed.contains(id));
        before - self.campaigns.len()
    }

    // ─── Performance ────────────────────────────────────────────────────

    pub fn record_snapshot(&self, snapshot: PerformanceSnapshot, efficiency_score: f64) {
        self.scores
            .insert(snapshot.campaign_id.clone(), efficiency_score);
        self.snapshots.insert(snapshot.campaign_id.clone(), snapshot);
    }

    pub fn latest_snapshot(&self, campaign_id: &str) -> Option<PerformanceSnapshot> {
        self.snapshots.get(campaign_id).map(|s| s.clone())
    }

    pub fn efficiency_score(&self, campaign_id: &str) -> Option<f64> {
        self.scores.get(campaign_id).map(|s| *s)
    }

    // ─── Negatives ──────────────────────────────────────────────────────

    pub fn negatives(&self, campaign_id: &str) -> HashSet<String> {
        self.negatives
            .get(campaign_id)
            .map(|n| n.clone())
            .unwrap_or_default()
    }

    pub fn add_negatives(&self, campaign_id: &str, keywords: &[String]) {
        let mut entry = self.negatives.entry(campaign_id.to_string()).or_default();
        entry.extend(keywords.iter().map(|k| k.to_lowercase()));
    }

    // ─── Applied actions ────────────────────────────────────────────────

    pub fn is_applied(&self, key: &str) -> bool {
        self.applied.contains_key(key)
    }

    pub fn record_applied(&self, applied: AppliedAction) {
        self.applied
            .insert(applied.idempotency_key.clone(), applied.applied_at);

        let mut history = self.history.entry(applied.campaign_id.clone()).or_default();
        if history.len() >= self.history_limit {
            history.pop_front();
        }
        history.push_back(applied);
    }

    /// Most recent last.
    pub fn recent_actions(&self, campaign_id: &str) -> Vec<AppliedAction> {
        self.history
            .get(campaign_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Forget idempotency keys applied before `before`. Returns how many
    /// were dropped.
    pub fn prune_applied(&self, before: DateTime<Utc>) -> usize {
        let prior = self.applied.len();
        self.applied.retain(|_, applied_at| *applied_at >= before);
        prior - self.applied.len()
    }

    // ─── Insights ───────────────────────────────────────────────────────

    pub fn insights(&self, campaign_id: &str) -> Option<CampaignInsights> {
        let campaign = self.campaign(campaign_id)?;
        Some(CampaignInsights {
            campaign_id: campaign.id.clone(),
            campaign_name: campaign.name.clone(),
            daily_budget: campaign.daily_budget,
            target_roas: campaign.bidding.target_roas,
            snapshot: self.latest_snapshot(campaign_id),
            efficiency_score: self.efficiency_score(campaign_id),
            recent_actions: self
                .recent_actions(campaign_id)
                .into_iter()
                .map(|a| a.action)
                .collect(),
        })
    }

    // ─── Review queue ───────────────────────────────────────────────────

    /// Queue rejected model output for manual review, evicting the oldest
    /// entry when full.
    pub fn push_review(&self, source: &str, subject: &str, error: &str) {
        let mut queue = self.review.lock();
        if queue.len() >= self.review_capacity {
            queue.pop_front();
        }
        queue.push_back(ReviewRecord {
            id: Uuid::new_v4(),
            source: source.to_string(),
            subject: subject.to_string(),
            error: error.to_string(),
            recorded_at: Utc::now(),
        });
    }

    pub fn review_items(&self, limit: usize) -> Vec<ReviewRecord> {
        self.review.lock().iter().take(limit).cloned().collect()
    }

    pub fn review_depth(&self) -> usize {
        self.review.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use demand_core::types::{BiddingStrategy, CampaignStatus};

    fn campaign(id: &str, budget: f64) -> Campaign {
        Campaign {
            id: id.into(),
            name: format!("Campaign {id}"),
            resource_name: format!("customers/1/campaigns/{id}"),
            budget_resource_name: format!("customers/1/campaignBudgets/{id}"),
            asset_group_resource_name: None,
            daily_budget: budget,
            bidding: BiddingStrategy {
                target_roas: 4.0,
                max_cpc: None,
                min_cpc: None,
            },
            status: CampaignStatus::Enabled,
        }
    }

    fn applied(campaign_id: &str, cycle: u64, at: DateTime<Utc>) -> AppliedAction {
        let action = OptimizationAction::RefreshAssets;
        AppliedAction {
            idempotency_key: idempotency_key(campaign_id, cycle, &action),
            campaign_id: campaign_id.into(),
            action,
            applied_at: at,
        }
    }

    #[test]
    fn test_stale_listing_does_not_overwrite_newer_budget() {
        let store = OptimizationStore::default();
        let listed_at = Utc::now() - Duration::seconds(5);
        store.observe_campaign(campaign("c-1", 100_000.0), listed_at);
        store.set_budget("c-1", 120_000.0);

        // a listing taken before the write arrives late
        store.observe_campaign(campaign("c-1", 100_000.0), listed_at);
        assert_eq!(store.budget("c-1"), Some(120_000.0));
        assert_eq!(store.campaign("c-1").unwrap().daily_budget, 120_000.0);

        store.observe_campaign(campaign("c-1", 90_000.0), Utc::now() + Duration::seconds(1));
        assert_eq!(store.budget("c-1"), Some(90_000.0));
    }

    #[test]
    fn test_applied_keys_and_history() {
        let store = OptimizationStore::new(2);
        let now = Utc::now();
        for cycle in 1..=3 {
            store.record_applied(applied("c-1", cycle, now));
        }
        assert!(store.is_applied("c-1:1:refresh_assets"));
        assert!(!store.is_applied("c-1:4:refresh_assets"));
        assert_eq!(store.recent_actions("c-1").len(), 2);
        assert_eq!(
            store.recent_actions("c-1")[1].idempotency_key,
            "c-1:3:refresh_assets"
        );
    }

    #[test]
    fn test_prune_applied() {
        let store = OptimizationStore::default();
        let now = Utc::now();
        store.record_applied(applied("c-1", 1, now - Duration::days(3)));
        store.record_applied(applied("c-1", 2, now));
        assert_eq!(store.prune_applied(now - Duration::days(1)), 1);
        assert!(!store.is_applied("c-1:1:refresh_assets"));
        assert!(store.is_applied("c-1:2:refresh_assets"));
    }

    #[test]
    fn test_negatives_are_case_folded() {
        let store = OptimizationStore::default();
        store.add_negatives("c-1", &["Free Stay".to_string()]);
        assert!(store.negatives("c-1").contains("free stay"));
        assert!(store.negatives("c-2").is_empty());
    }

    #[test]
    fn test_review_queue_is_bounded() {
        let mut store = OptimizationStore::default();
        store.review_capacity = 2;
        store.push_review("assets", "c-1", "score 140");
        store.push_review("assets", "c-2", "not JSON");
        store.push_review("recommendation", "c-3", "unknown priority");
        assert_eq!(store.review_depth(), 2);
        assert_eq!(store.review_items(10)[0].subject, "c-2");
    }

    #[test]
    fn test_insights_reflect_store() {
        let store = OptimizationStore::default();
        assert!(store.insights("c-1").is_none());
        store.register_campaign(campaign("c-1", 50_000.0));
        store.record_applied(applied("c-1", 1, Utc::now()));
        let insights = store.insights("c-1").unwrap();
        assert_eq!(insights.daily_budget, 50_000.0);
        assert!(insights.snapshot.is_none());
        assert_eq!(insights.recent_actions, vec![OptimizationAction::RefreshAssets]);
    }

    #[tokio::test]
    async fn test_campaign_lock_is_shared_per_campaign() {
        let store = OptimizationStore::default();
        let a = store.campaign_lock("c-1");
        let b = store.campaign_lock("c-1");
        assert!(Arc::ptr_eq(&a, &b));

        let _held = a.lock().await;
        assert!(b.try_lock().is_err());
        assert!(store.campaign_lock("c-2").try_lock().is_ok());
    }

    #[test]
    fn test_retain_listed_forgets_missing_campaigns() {
        let store = OptimizationStore::default();
        store.register_campaign(campaign("c-1", 50_000.0));
        store.register_campaign(campaign("c-2", 60_000.0));
        store.add_negatives("c-2", &["free stay".to_string()]);
        store.record_applied(applied("c-2", 1, Utc::now()));
        let _ = store.campaign_lock("c-2");

        let listed: HashSet<String> = ["c-1".to_string()].into_iter().collect();
        assert_eq!(store.retain_listed(&listed), 1);
        assert_eq!(store.campaign_count(), 1);
        assert!(store.campaign("c-2").is_none());
        assert!(store.budget("c-2").is_none());
        assert!(store.negatives("c-2").is_empty());
        assert!(store.recent_actions("c-2").is_empty());
        assert!(!store.locks.contains_key("c-2"));
        // applied keys age out on their own schedule
        assert!(store.is_applied("c-2:1:refresh_assets"));
        assert_eq!(store.budget("c-1"), Some(50_000.0));
    }

    #[test]
    fn test_cycle_ids_increase() {
        let store = OptimizationStore::default();
        assert_eq!(store.next_cycle_id(), 1);
        assert_eq!(store.next_cycle_id(), 2);
    }
}
