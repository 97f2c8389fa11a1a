//! Applies optimization actions to the ad platform, at most once per
//! idempotency key.

use std::sync::Arc;

use chrono::Utc;
use demand_connectors::{AdPlatform, GuardedCaller};
use demand_core::types::{AppliedAction, AssetSet, Campaign, OptimizationAction};
use demand_core::{CampaignError, CampaignResult};
use tracing::{debug, info};

use crate::generator::CampaignGenerator;
use crate::prompts::AssetBrief;
use crate::store::{idempotency_key, OptimizationStore};

/// Keywords handed to the asset prompt when refreshing a live campaign.
const BRIEF_KEYWORDS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The same action already went through in this cycle.
    AlreadyApplied,
}

pub struct ActionExecutor {
    ads: Arc<dyn AdPlatform>,
    caller: Arc<GuardedCaller>,
    generator: Arc<CampaignGenerator>,
    store: Arc<OptimizationStore>,
}

impl ActionExecutor {
    pub fn new(
        ads: Arc<dyn AdPlatform>,
        caller: Arc<GuardedCaller>,
        generator: Arc<CampaignGenerator>,
        store: Arc<OptimizationStore>,
    ) -> Self {
        Self {
            ads,
            caller,
            generator,
            store,
        }
    }

    /// Apply `action` to `campaign` as part of cycle `cycle_id`.
    ///
    /// Callers must hold the campaign lock from
    /// [`OptimizationStore::campaign_lock`].
    pub async fn apply(
        &self,
        campaign: &Campaign,
        action: OptimizationAction,
        cycle_id: u64,
    ) -> CampaignResult<ApplyOutcome> {
        let key = idempotency_key(&campaign.id, cycle_id, &action);
        if self.store.is_applied(&key) {
            debug!(campaign_id = %campaign.id, key = %key, "Action already applied, skipping");
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        let ads = &self.ads;
        let id = campaign.id.as_str();
        match &action {
            OptimizationAction::AdjustBudget { to, .. } => {
                let to = *to;
                self.caller
                    .call(id, "update_budget", || async move {
                        ads.update_budget(campaign, to).await
                    })
                    .await?;
                self.store.set_budget(id, to);
            }
            OptimizationAction::AdjustTargeting { change } => {
                let change = *change;
                self.caller
                    .call(id, "adjust_targeting", || async move {
                        ads.adjust_targeting(campaign, change).await
                    })
                    .await?;
            }
            OptimizationAction::RefreshAssets => {
                let assets = self.fresh_assets(campaign).await?;
                let assets = &assets;
                self.caller
                    .call_once(id, "upload_assets", || async move {
                        ads.upload_assets(campaign, assets).await
                    })
                    .await?;
            }
            OptimizationAction::AddNegativeKeywords { keywords } => {
                let keywords = keywords.as_slice();
                self.caller
                    .call_once(id, "add_negative_keywords", || async move {
                        ads.add_negative_keywords(campaign, keywords).await
                    })
                    .await?;
                self.store.add_negatives(id, keywords);
            }
        }

        metrics::counter!("optimizer.actions.applied", "kind" => action.kind()).increment(1);
        info!(
            campaign_id = %campaign.id,
            cycle_id,
            action = action.kind(),
            "Applied optimization action"
        );
        self.store.record_applied(AppliedAction {
            idempotency_key: key,
            campaign_id: campaign.id.clone(),
            action,
            applied_at: Utc::now(),
        });
        Ok(ApplyOutcome::Applied)
    }

    async fn fresh_assets(&self, campaign: &Campaign) -> CampaignResult<AssetSet> {
        let mut keywords: Vec<_> = self
            .store
            .latest_snapshot(&campaign.id)
            .map(|s| s.keywords)
            .unwrap_or_default()
            .into_iter()
            .filter(|k| k.conversions > 0.0)
            .collect();
        keywords.sort_by(|a, b| b.conversions.total_cmp(&a.conversions));
        let brief = AssetBrief::from_campaign(
            campaign,
            keywords
                .into_iter()
                .take(BRIEF_KEYWORDS)
                .map(|k| k.text)
                .collect(),
        );

        let assets = self.generator.assets(&campaign.id, &brief).await?;
        require_usable(&assets)?;
        Ok(assets)
    }
}

/// A Performance Max asset group needs at least one headline and one
/// description.
pub(crate) fn require_usable(assets: &AssetSet) -> CampaignResult<()> {
    if assets.headlines.is_empty() || assets.descriptions.is_empty() {
        return Err(CampaignError::MalformedOutput(format!(
            "only {} headlines and {} descriptions passed the score threshold",
            assets.headlines.len(),
            assets.descriptions.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use demand_core::types::ScoredAsset;

    #[test]
    fn test_require_usable() {
        let line = |t: &str| ScoredAsset {
            text: t.into(),
            score: 90.0,
        };
        let mut assets = AssetSet {
            headlines: vec![line("Pool Villas")],
            descriptions: Vec::new(),
            calls_to_action: vec![line("Book now")],
        };
        assert!(matches!(
            require_usable(&assets),
            Err(CampaignError::MalformedOutput(_))
        ));
        assets.descriptions.push(line("Quiet stays by the sea."));
        assert!(require_usable(&assets).is_ok());
    }
}
