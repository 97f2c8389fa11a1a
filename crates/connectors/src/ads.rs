//! Ad platform seam. The optimizer only ever talks to this trait; the
//! Google Ads REST client is one implementation.

use async_trait::async_trait;
use demand_core::types::{AssetSet, Campaign, CampaignDraft, PerformanceSnapshot, TargetingChange};
use demand_core::CampaignResult;

/// Campaign management operations on an external ad platform.
///
/// Budget and targeting updates are absolute sets and safe to repeat.
/// Creates (campaigns, assets, negative criteria) are not.
#[async_trait]
pub trait AdPlatform: Send + Sync {
    fn platform_name(&self) -> &'static str;

    async fn list_active_campaigns(&self) -> CampaignResult<Vec<Campaign>>;

    async fn fetch_performance(&self, campaign: &Campaign) -> CampaignResult<PerformanceSnapshot>;

    async fn create_campaign(&self, draft: &CampaignDraft) -> CampaignResult<Campaign>;

    /// Set the campaign's daily budget to `daily_budget`.
    async fn update_budget(&self, campaign: &Campaign, daily_budget: f64) -> CampaignResult<()>;

    async fn adjust_targeting(&self, campaign: &Campaign, change: TargetingChange) -> CampaignResult<()>;

    async fn add_negative_keywords(&self, campaign: &Campaign, keywords: &[String]) -> CampaignResult<()>;

    async fn upload_assets(&self, campaign: &Campaign, assets: &AssetSet) -> CampaignResult<()>;
}
