#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use demand_connectors::{AdPlatform, GuardedCaller, LanguageModel, RetryPolicy};
use demand_core::config::{CircuitBreakerConfig, OptimizerConfig};
use demand_core::types::{
    AssetSet, BiddingStrategy, Campaign, CampaignDraft, CampaignStatus, KeywordPerformance,
    PerformanceSnapshot, TargetingChange,
};
use demand_core::{CampaignError, CampaignResult};
use demand_optimizer::prompts;
use demand_optimizer::{CampaignGenerator, CampaignLauncher, OptimizationEngine, OptimizationStore, ScoreWeights};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

pub fn campaign(id: &str, daily_budget: f64) -> Campaign {
    Campaign {
        id: id.into(),
        name: format!("Campaign {id}"),
        resource_name: format!("customers/123/campaigns/{id}"),
        budget_resource_name: format!("customers/123/campaignBudgets/{id}"),
        asset_group_resource_name: Some(format!("customers/123/assetGroups/{id}")),
        daily_budget,
        bidding: BiddingStrategy {
            target_roas: 4.0,
            max_cpc: None,
            min_cpc: None,
        },
        status: CampaignStatus::Enabled,
    }
}

pub fn snapshot(campaign_id: &str, roas: f64) -> PerformanceSnapshot {
    PerformanceSnapshot {
        campaign_id: campaign_id.into(),
        roas,
        conversion_rate: 3.0,
        quality_score: Some(7.5),
        cost_per_click: 900.0,
        cost_per_acquisition: 30_000.0,
        impressions: 20_000,
        clicks: 400,
        conversions: 12.0,
        cost: 360_000.0,
        keywords: Vec::new(),
        fetched_at: Utc::now(),
    }
}

pub fn keyword(text: &str, cost: f64, clicks: u64, conversions: f64) -> KeywordPerformance {
    KeywordPerformance {
        text: text.into(),
        cost,
        clicks,
        conversions,
    }
}

/// In-memory ad platform that records every mutation.
#[derive(Default)]
pub struct MockAds {
    campaigns: Mutex<Vec<Campaign>>,
    snapshots: Mutex<HashMap<String, PerformanceSnapshot>>,
    rejected: Mutex<HashSet<String>>,
    transient_fetch_failures: Mutex<HashMap<String, usize>>,
    create_failure: Mutex<Option<CampaignError>>,
    call_delay: Mutex<Option<Duration>>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub budget_updates: Mutex<Vec<(String, f64)>>,
    pub targeting_changes: Mutex<Vec<(String, TargetingChange)>>,
    pub negative_keywords: Mutex<Vec<(String, Vec<String>)>>,
    pub uploads: Mutex<Vec<(String, AssetSet)>>,
    pub drafts: Mutex<Vec<CampaignDraft>>,
}

impl MockAds {
    pub fn with_campaigns(entries: Vec<(Campaign, PerformanceSnapshot)>) -> Arc<Self> {
        let ads = Self::default();
        for (campaign, snapshot) in entries {
            ads.snapshots.lock().insert(campaign.id.clone(), snapshot);
            ads.campaigns.lock().push(campaign);
        }
        Arc::new(ads)
    }

    pub fn set_snapshot(&self, snapshot: PerformanceSnapshot) {
        self.snapshots
            .lock()
            .insert(snapshot.campaign_id.clone(), snapshot);
    }

    pub fn remove_campaign(&self, campaign_id: &str) {
        self.campaigns.lock().retain(|c| c.id != campaign_id);
    }

    pub fn reject_fetch(&self, campaign_id: &str) {
        self.rejected.lock().insert(campaign_id.to_string());
    }

    pub fn fail_fetch_transiently(&self, campaign_id: &str, times: usize) {
        self.transient_fetch_failures
            .lock()
            .insert(campaign_id.to_string(), times);
    }

    pub fn fail_create(&self, err: CampaignError) {
        *self.create_failure.lock() = Some(err);
    }

    pub fn delay_calls(&self, delay: Duration) {
        *self.call_delay.lock() = Some(delay);
    }

    /// Tracks how many campaign calls overlap.
    async fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let delay = *self.call_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AdPlatform for MockAds {
    fn platform_name(&self) -> &'static str {
        "mock"
    }

    async fn list_active_campaigns(&self) -> CampaignResult<Vec<Campaign>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.campaigns.lock().clone())
    }

    async fn fetch_performance(&self, campaign: &Campaign) -> CampaignResult<PerformanceSnapshot> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        if self.rejected.lock().contains(&campaign.id) {
            return Err(CampaignError::rejected("mock", "CUSTOMER_NOT_ENABLED"));
        }
        {
            let mut failures = self.transient_fetch_failures.lock();
            if let Some(left) = failures.get_mut(&campaign.id) {
                if *left > 0 {
                    *left -= 1;
                    return Err(CampaignError::transient("mock", "503 backend unavailable"));
                }
            }
        }
        self.snapshots
            .lock()
            .get(&campaign.id)
            .cloned()
            .ok_or_else(|| CampaignError::rejected("mock", "unknown campaign"))
    }

    async fn create_campaign(&self, draft: &CampaignDraft) -> CampaignResult<Campaign> {
        self.drafts.lock().push(draft.clone());
        if let Some(err) = self.create_failure.lock().take() {
            return Err(err);
        }
        let mut created = campaign("c-new", draft.daily_budget);
        created.name = draft.name.clone();
        created.bidding = draft.bidding;
        self.campaigns.lock().push(created.clone());
        Ok(created)
    }

    async fn update_budget(&self, campaign: &Campaign, daily_budget: f64) -> CampaignResult<()> {
        self.enter().await;
        self.budget_updates
            .lock()
            .push((campaign.id.clone(), daily_budget));
        if let Some(listed) = self.campaigns.lock().iter_mut().find(|c| c.id == campaign.id) {
            listed.daily_budget = daily_budget;
        }
        Ok(())
    }

    async fn adjust_targeting(&self, campaign: &Campaign, change: TargetingChange) -> CampaignResult<()> {
        self.enter().await;
        self.targeting_changes
            .lock()
            .push((campaign.id.clone(), change));
        Ok(())
    }

    async fn add_negative_keywords(&self, campaign: &Campaign, keywords: &[String]) -> CampaignResult<()> {
        self.negative_keywords
            .lock()
            .push((campaign.id.clone(), keywords.to_vec()));
        Ok(())
    }

    async fn upload_assets(&self, campaign: &Campaign, assets: &AssetSet) -> CampaignResult<()> {
        self.uploads.lock().push((campaign.id.clone(), assets.clone()));
        Ok(())
    }
}

/// Language model that answers each prompt family with a scripted reply.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<HashMap<&'static str, String>>,
    pub calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, system: &'static str, body: &str) {
        self.replies.lock().insert(system, body.to_string());
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, system: &str, _user: &str) -> CampaignResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .get(system)
            .cloned()
            .ok_or_else(|| CampaignError::rejected("scripted", "no reply configured"))
    }
}

pub const GOOD_ASSETS: &str = r#"{
    "headlines": [{"text": "Private Pool Villas", "score": 92}, {"text": "Sea View Stays", "score": 81}],
    "descriptions": [{"text": "Quiet villas a short walk from the beach.", "score": 88}],
    "calls_to_action": [{"text": "Book now", "score": 77}]
}"#;

pub fn scripted_defaults(model: &ScriptedModel) {
    model.reply(
        prompts::STRATEGY_SYSTEM,
        r#"{"daily_budget": 200000, "target_roas": 5.5, "focus_keywords": ["pool villa"], "rationale": "peak season"}"#,
    );
    model.reply(
        prompts::SIGNALS_SYSTEM,
        r#"{"signals": [
            {"type": "high_value", "confidence": 0.9, "expected_roas": 6.0, "description": "Repeat guests"},
            {"type": "intent", "confidence": 0.7, "expected_roas": 4.5, "description": "Villa searchers",
             "search_themes": ["pool villa", "ocean view stay"]}
        ]}"#,
    );
    model.reply(prompts::ASSETS_SYSTEM, GOOD_ASSETS);
    model.reply(
        prompts::RECOMMENDATION_SYSTEM,
        r#"{"optimizations": ["Hold steady"], "budget_recommendation": null, "target_adjustment": null, "priority": "low"}"#,
    );
}

pub struct Harness {
    pub engine: Arc<OptimizationEngine>,
    pub launcher: CampaignLauncher,
    pub store: Arc<OptimizationStore>,
    pub ads: Arc<MockAds>,
    pub model: Arc<ScriptedModel>,
    pub cancel: CancellationToken,
    pub config: OptimizerConfig,
}

fn caller(service: &'static str, cancel: CancellationToken) -> Arc<GuardedCaller> {
    Arc::new(GuardedCaller::new(
        service,
        RetryPolicy {
            max_retries: 2,
            initial_backoff_ms: 50,
            max_backoff_ms: 200,
            backoff_multiplier: 2.0,
            jitter: false,
        },
        Duration::from_secs(5),
        CircuitBreakerConfig::default(),
        cancel,
    ))
}

pub fn harness(ads: Arc<MockAds>, model: Arc<ScriptedModel>) -> Harness {
    harness_with(ads, model, OptimizerConfig::default())
}

pub fn harness_with(ads: Arc<MockAds>, model: Arc<ScriptedModel>, config: OptimizerConfig) -> Harness {
    let cancel = CancellationToken::new();
    let store = Arc::new(OptimizationStore::new(config.action_history));
    let ads_caller = caller("google_ads", cancel.clone());
    let model_caller = caller("openai", cancel.clone());

    let generator = Arc::new(CampaignGenerator::new(
        model.clone(),
        model_caller,
        store.clone(),
        config.asset_score_threshold,
    ));
    let engine = Arc::new(OptimizationEngine::new(
        ads.clone(),
        ads_caller.clone(),
        generator.clone(),
        store.clone(),
        config.clone(),
        ScoreWeights::default(),
    ));
    let launcher = CampaignLauncher::new(
        ads.clone(),
        ads_caller,
        generator,
        store.clone(),
        config.clone(),
    );

    Harness {
        engine,
        launcher,
        store,
        ads,
        model,
        cancel,
        config,
    }
}
