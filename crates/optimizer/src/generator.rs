//! Model-backed generators for strategy, audience signals, creative assets
//! and hourly recommendations.

use std::sync::Arc;

use demand_connectors::{GuardedCaller, LanguageModel};
use demand_core::types::{
    AssetSet, AudienceSignal, BusinessProfile, CampaignInsights, CampaignStrategy, Recommendation,
};
use demand_core::{CampaignError, CampaignResult};
use tracing::{debug, warn};

use crate::decode;
use crate::prompts::{self, AssetBrief};
use crate::store::OptimizationStore;

pub struct CampaignGenerator {
    model: Arc<dyn LanguageModel>,
    caller: Arc<GuardedCaller>,
    store: Arc<OptimizationStore>,
    asset_threshold: f64,
}

impl CampaignGenerator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        caller: Arc<GuardedCaller>,
        store: Arc<OptimizationStore>,
        asset_threshold: f64,
    ) -> Self {
        Self {
            model,
            caller,
            store,
            asset_threshold,
        }
    }

    /// One guarded model call followed by strict decoding. Decode failures
    /// are counted and queued for review; they are not retried.
    async fn generate<T>(
        &self,
        key: &str,
        source: &'static str,
        system: &str,
        user: String,
        decode: impl FnOnce(&str) -> CampaignResult<T>,
    ) -> CampaignResult<T> {
        let model = &self.model;
        let user = user.as_str();
        let raw = self
            .caller
            .call(key, source, || async move { model.complete(system, user).await })
            .await?;

        match decode(&raw) {
            Ok(value) => {
                debug!(key, source, "Model output accepted");
                Ok(value)
            }
            Err(err) => {
                if matches!(err, CampaignError::MalformedOutput(_)) {
                    metrics::counter!("decode.malformed_output", "source" => source).increment(1);
                    self.store.push_review(source, key, &err.to_string());
                }
                warn!(key, source, error = %err, "Rejected model output");
                Err(err)
            }
        }
    }

    pub async fn strategy(&self, profile: &BusinessProfile) -> CampaignResult<CampaignStrategy> {
        self.generate(
            &profile.business_name,
            "strategy",
            prompts::STRATEGY_SYSTEM,
            prompts::strategy_prompt(profile),
            decode::decode_strategy,
        )
        .await
    }

    pub async fn audience_signals(
        &self,
        profile: &BusinessProfile,
    ) -> CampaignResult<Vec<AudienceSignal>> {
        self.generate(
            &profile.business_name,
            "audience_signals",
            prompts::SIGNALS_SYSTEM,
            prompts::audience_signals_prompt(profile),
            decode::decode_audience_signals,
        )
        .await
    }

    /// Generate and score creative, keeping lines above the threshold.
    /// `key` selects the breaker, normally the campaign id.
    pub async fn assets(&self, key: &str, brief: &AssetBrief) -> CampaignResult<AssetSet> {
        let threshold = self.asset_threshold;
        self.generate(
            key,
            "assets",
            prompts::ASSETS_SYSTEM,
            prompts::assets_prompt(brief),
            |raw| decode::decode_assets(raw, threshold),
        )
        .await
    }

    pub async fn recommendation(
        &self,
        insights: &CampaignInsights,
    ) -> CampaignResult<Recommendation> {
        self.generate(
            &insights.campaign_id,
            "recommendation",
            prompts::RECOMMENDATION_SYSTEM,
            prompts::recommendation_prompt(insights),
            decode::decode_recommendation,
        )
        .await
    }
}
