//! Creates a new Performance Max campaign from a business profile.

use std::sync::Arc;

use chrono::Utc;
use demand_connectors::{AdPlatform, GuardedCaller};
use demand_core::config::OptimizerConfig;
use demand_core::types::{BusinessProfile, Campaign, CampaignDraft};
use demand_core::{CampaignError, CampaignResult};
use tracing::info;

use crate::bidding::{current_month, BiddingCalculator};
use crate::executor::require_usable;
use crate::generator::CampaignGenerator;
use crate::prompts::AssetBrief;
use crate::rules::RuleSet;
use crate::store::OptimizationStore;

const DAYS_PER_MONTH: f64 = 30.4;

pub struct CampaignLauncher {
    ads: Arc<dyn AdPlatform>,
    ads_caller: Arc<GuardedCaller>,
    generator: Arc<CampaignGenerator>,
    store: Arc<OptimizationStore>,
    bidding: BiddingCalculator,
    rules: RuleSet,
    min_daily_budget: f64,
}

impl CampaignLauncher {
    pub fn new(
        ads: Arc<dyn AdPlatform>,
        ads_caller: Arc<GuardedCaller>,
        generator: Arc<CampaignGenerator>,
        store: Arc<OptimizationStore>,
        config: OptimizerConfig,
    ) -> Self {
        Self {
            ads,
            ads_caller,
            generator,
            store,
            bidding: BiddingCalculator::new(config.base_roas),
            min_daily_budget: config.min_daily_budget,
            rules: RuleSet::new(config),
        }
    }

    pub async fn launch(&self, profile: &BusinessProfile) -> CampaignResult<Campaign> {
        self.launch_for_month(profile, current_month()).await
    }

    /// Build and create a campaign using the seasonality of `month`
    /// (0 = January).
    pub async fn launch_for_month(
        &self,
        profile: &BusinessProfile,
        month: usize,
    ) -> CampaignResult<Campaign> {
        validate_profile(profile)?;
        let monthly_cap = profile.monthly_budget / DAYS_PER_MONTH;
        if monthly_cap < self.min_daily_budget {
            return Err(CampaignError::Validation(format!(
                "monthly budget {} allows {:.0} per day, below the minimum daily budget {}",
                profile.monthly_budget, monthly_cap, self.min_daily_budget
            )));
        }
        let plan = self
            .bidding
            .calculate(profile.average_order_value, &profile.seasonality, month)?;

        let strategy = self.generator.strategy(profile).await?;
        let audience_signals = self.generator.audience_signals(profile).await?;
        let assets = self
            .generator
            .assets(&profile.business_name, &AssetBrief::from_profile(profile))
            .await?;
        require_usable(&assets)?;

        // The monthly budget is a hard ceiling, applied after the guardrail.
        let daily_budget = self
            .rules
            .clamp_budget(strategy.daily_budget)
            .min(monthly_cap);
        info!(
            business = %profile.business_name,
            model_roas = strategy.target_roas,
            plan_roas = plan.target_roas,
            daily_budget,
            rationale = %strategy.rationale,
            "Campaign strategy ready"
        );

        let draft = CampaignDraft {
            name: format!(
                "{} PMax {}",
                profile.business_name,
                Utc::now().format("%Y-%m-%d")
            ),
            landing_url: profile.landing_url.clone(),
            daily_budget,
            bidding: plan.strategy(),
            audience_signals,
            assets,
        };

        let ads = &self.ads;
        let draft = &draft;
        let campaign = self
            .ads_caller
            .call_once(&profile.business_name, "create_campaign", || async move {
                ads.create_campaign(draft).await
            })
            .await?;

        self.store.register_campaign(campaign.clone());
        metrics::counter!("optimizer.campaigns.launched").increment(1);
        info!(
            campaign_id = %campaign.id,
            name = %campaign.name,
            signals = draft.audience_signals.len(),
            assets = draft.assets.len(),
            "Campaign launched"
        );
        Ok(campaign)
    }
}

fn validate_profile(profile: &BusinessProfile) -> CampaignResult<()> {
    if profile.business_name.trim().is_empty() {
        return Err(CampaignError::Validation("business name is required".into()));
    }
    if !(profile.landing_url.starts_with("https://") || profile.landing_url.starts_with("http://")) {
        return Err(CampaignError::Validation(format!(
            "landing url must be http(s), got {:?}",
            profile.landing_url
        )));
    }
    if !(profile.monthly_budget.is_finite() && profile.monthly_budget > 0.0) {
        return Err(CampaignError::Validation(format!(
            "monthly budget must be positive, got {}",
            profile.monthly_budget
        )));
    }
    Ok(())
}
