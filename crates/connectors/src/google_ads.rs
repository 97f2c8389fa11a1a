//! Google Ads REST client (GAQL search + mutate endpoints) with OAuth2
//! refresh-token exchange.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use demand_core::config::GoogleAdsConfig;
use demand_core::types::{
    AssetSet, AudienceSignal, BiddingStrategy, Campaign, CampaignDraft, CampaignStatus,
    KeywordPerformance, PerformanceSnapshot, TargetingChange,
};
use demand_core::{CampaignError, CampaignResult};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ads::AdPlatform;
use crate::http::{check_status, decode_error, transport_error};

const SERVICE: &str = "google_ads";
/// Refresh the access token this long before it actually expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Value>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct MutateResponse {
    #[serde(default)]
    results: Vec<MutateResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MutateResult {
    resource_name: String,
}

pub struct GoogleAdsClient {
    http: reqwest::Client,
    config: GoogleAdsConfig,
    customer_id: String,
    token: tokio::sync::Mutex<Option<AccessToken>>,
}

impl GoogleAdsClient {
    pub fn new(config: GoogleAdsConfig, request_timeout: Duration) -> CampaignResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| CampaignError::Config(format!("google ads http client: {e}")))?;
        let customer_id = digits(&config.customer_id);
        if customer_id.is_empty() {
            return Err(CampaignError::Config("google_ads.customer_id is empty".into()));
        }

        info!(customer_id = %customer_id, version = %config.api_version, "Google Ads client initialized");

        Ok(Self {
            http,
            config,
            customer_id,
            token: tokio::sync::Mutex::new(None),
        })
    }

    fn customer_url(&self, suffix: &str) -> String {
        format!(
            "{}/{}/customers/{}/{}",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.api_version,
            self.customer_id,
            suffix
        )
    }

    fn customer_resource(&self) -> String {
        format!("customers/{}", self.customer_id)
    }

    async fn access_token(&self) -> CampaignResult<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(token.value.clone());
            }
        }

        debug!("Refreshing Google Ads access token");
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", self.config.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;
        let body: TokenResponse = response.json().await.map_err(|e| decode_error(SERVICE, e))?;

        let value = body.access_token;
        *guard = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        });
        Ok(value)
    }

    async fn post<R: serde::de::DeserializeOwned>(&self, suffix: &str, body: &Value) -> CampaignResult<R> {
        let token = self.access_token().await?;
        let mut request = self
            .http
            .post(self.customer_url(suffix))
            .bearer_auth(token)
            .header("developer-token", &self.config.developer_token)
            .json(body);
        if let Some(login) = self.config.login_customer_id.as_deref() {
            request = request.header("login-customer-id", digits(login));
        }

        let response = request.send().await.map_err(|e| transport_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;
        response.json::<R>().await.map_err(|e| decode_error(SERVICE, e))
    }

    /// Run a GAQL query, following pagination.
    async fn search(&self, query: &str) -> CampaignResult<Vec<Value>> {
        let mut rows = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut body = json!({ "query": query });
            if let Some(token) = &page_token {
                body["pageToken"] = json!(token);
            }
            let page: SearchResponse = self.post("googleAds:search", &body).await?;
            rows.extend(page.results);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(rows)
    }

    /// Apply mutate operations to one resource collection and return the
    /// resulting resource names.
    async fn mutate(&self, collection: &str, operations: Vec<Value>) -> CampaignResult<Vec<String>> {
        if operations.is_empty() {
            return Ok(Vec::new());
        }
        let response: MutateResponse = self
            .post(&format!("{collection}:mutate"), &json!({ "operations": operations }))
            .await?;
        Ok(response.results.into_iter().map(|r| r.resource_name).collect())
    }

    async fn mutate_one(&self, collection: &str, operation: Value) -> CampaignResult<String> {
        self.mutate(collection, vec![operation])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CampaignError::rejected(SERVICE, format!("{collection} mutate returned no result")))
    }

    async fn attach_signals(&self, asset_group: &str, signals: &[AudienceSignal]) -> CampaignResult<()> {
        let mut operations = Vec::new();
        for signal in signals {
            match signal {
                AudienceSignal::Intent { search_themes, .. } => {
                    operations.extend(search_themes.iter().map(|theme| {
                        json!({ "create": { "assetGroup": asset_group, "searchTheme": { "text": theme } } })
                    }));
                }
                other => {
                    debug!(kind = ?other.kind(), "Signal has no direct asset group mapping, skipping");
                }
            }
        }
        let created = self.mutate("assetGroupSignals", operations).await?;
        debug!(count = created.len(), "Attached search theme signals");
        Ok(())
    }
}

#[async_trait]
impl AdPlatform for GoogleAdsClient {
    fn platform_name(&self) -> &'static str {
        SERVICE
    }

    async fn list_active_campaigns(&self) -> CampaignResult<Vec<Campaign>> {
        let rows = self
            .search(
                "SELECT campaign.id, campaign.name, campaign.resource_name, campaign.status, \
                 campaign.campaign_budget, campaign_budget.amount_micros, \
                 campaign.maximize_conversion_value.target_roas \
                 FROM campaign \
                 WHERE campaign.status = 'ENABLED' \
                 AND campaign.advertising_channel_type IN ('PERFORMANCE_MAX', 'SEARCH')",
            )
            .await?;

        let mut campaigns: Vec<Campaign> = rows.iter().filter_map(campaign_from_row).collect();

        if !campaigns.is_empty() {
            let ids: Vec<&str> = campaigns.iter().map(|c| c.id.as_str()).collect();
            let groups = self
                .search(&format!(
                    "SELECT asset_group.resource_name, campaign.id FROM asset_group \
                     WHERE campaign.id IN ({})",
                    ids.join(", ")
                ))
                .await?;
            for row in &groups {
                let (Some(campaign_id), Some(group)) = (
                    text(row, &["campaign", "id"]),
                    text(row, &["assetGroup", "resourceName"]),
                ) else {
                    continue;
                };
                if let Some(campaign) = campaigns
                    .iter_mut()
                    .find(|c| c.id == campaign_id && c.asset_group_resource_name.is_none())
                {
                    campaign.asset_group_resource_name = Some(group);
                }
            }
        }

        Ok(campaigns)
    }

    async fn fetch_performance(&self, campaign: &Campaign) -> CampaignResult<PerformanceSnapshot> {
        let id = gaql_id(&campaign.id)?;
        let totals = self
            .search(&format!(
                "SELECT campaign.id, metrics.impressions, metrics.clicks, metrics.cost_micros, \
                 metrics.conversions, metrics.conversions_value \
                 FROM campaign WHERE campaign.id = {id} AND segments.date DURING LAST_7_DAYS"
            ))
            .await?;
        let keywords = self
            .search(&format!(
                "SELECT ad_group_criterion.keyword.text, \
                 ad_group_criterion.quality_info.quality_score, \
                 metrics.cost_micros, metrics.clicks, metrics.conversions \
                 FROM keyword_view WHERE campaign.id = {id} AND segments.date DURING LAST_7_DAYS"
            ))
            .await?;

        Ok(snapshot_from_rows(&campaign.id, &totals, &keywords))
    }

    async fn create_campaign(&self, draft: &CampaignDraft) -> CampaignResult<Campaign> {
        let suffix = Uuid::new_v4().simple().to_string();

        let budget_resource = self
            .mutate_one(
                "campaignBudgets",
                json!({ "create": {
                    "name": format!("{} budget {}", draft.name, &suffix[..8]),
                    "amountMicros": to_micros(draft.daily_budget).to_string(),
                    "deliveryMethod": "STANDARD",
                    "explicitlyShared": false,
                }}),
            )
            .await?;

        let campaign_resource = self
            .mutate_one(
                "campaigns",
                json!({ "create": {
                    "name": draft.name,
                    "status": "ENABLED",
                    "advertisingChannelType": "PERFORMANCE_MAX",
                    "campaignBudget": budget_resource,
                    "maximizeConversionValue": { "targetRoas": draft.bidding.target_roas },
                }}),
            )
            .await?;

        let asset_group = self
            .mutate_one(
                "assetGroups",
                json!({ "create": {
                    "name": format!("{} assets", draft.name),
                    "campaign": campaign_resource,
                    "finalUrls": [draft.landing_url],
                    "status": "ENABLED",
                }}),
            )
            .await?;

        let campaign = Campaign {
            id: last_segment(&campaign_resource),
            name: draft.name.clone(),
            resource_name: campaign_resource,
            budget_resource_name: budget_resource,
            asset_group_resource_name: Some(asset_group.clone()),
            daily_budget: draft.daily_budget,
            bidding: draft.bidding,
            status: CampaignStatus::Enabled,
        };

        self.upload_assets(&campaign, &draft.assets).await?;
        self.attach_signals(&asset_group, &draft.audience_signals).await?;

        info!(campaign_id = %campaign.id, name = %campaign.name, "Campaign created on Google Ads");
        Ok(campaign)
    }

    async fn update_budget(&self, campaign: &Campaign, daily_budget: f64) -> CampaignResult<()> {
        if !(daily_budget.is_finite() && daily_budget > 0.0) {
            return Err(CampaignError::Validation(format!("invalid daily budget {daily_budget}")));
        }
        self.mutate_one(
            "campaignBudgets",
            json!({
                "update": {
                    "resourceName": campaign.budget_resource_name,
                    "amountMicros": to_micros(daily_budget).to_string(),
                },
                "updateMask": "amount_micros",
            }),
        )
        .await?;
        Ok(())
    }

    async fn adjust_targeting(&self, campaign: &Campaign, change: TargetingChange) -> CampaignResult<()> {
        self.mutate_one(
            "campaigns",
            json!({
                "update": {
                    "resourceName": campaign.resource_name,
                    "urlExpansionOptOut": change == TargetingChange::Narrow,
                },
                "updateMask": "url_expansion_opt_out",
            }),
        )
        .await?;
        Ok(())
    }

    async fn add_negative_keywords(&self, campaign: &Campaign, keywords: &[String]) -> CampaignResult<()> {
        let operations = keywords
            .iter()
            .map(|keyword| {
                json!({ "create": {
                    "campaign": campaign.resource_name,
                    "negative": true,
                    "keyword": { "text": keyword, "matchType": "PHRASE" },
                }})
            })
            .collect();
        self.mutate("campaignCriteria", operations).await?;
        Ok(())
    }

    async fn upload_assets(&self, campaign: &Campaign, assets: &AssetSet) -> CampaignResult<()> {
        let asset_group = campaign.asset_group_resource_name.as_deref().ok_or_else(|| {
            CampaignError::rejected(SERVICE, format!("campaign {} has no asset group", campaign.id))
        })?;

        let mut creates = Vec::new();
        let mut field_types = Vec::new();
        for headline in &assets.headlines {
            creates.push(json!({ "create": { "textAsset": { "text": headline.text } } }));
            field_types.push("HEADLINE");
        }
        for description in &assets.descriptions {
            creates.push(json!({ "create": { "textAsset": { "text": description.text } } }));
            field_types.push("DESCRIPTION");
        }
        let mut seen_ctas = Vec::new();
        for cta in &assets.calls_to_action {
            let kind = call_to_action_type(&cta.text);
            if seen_ctas.contains(&kind) {
                continue;
            }
            seen_ctas.push(kind);
            creates.push(json!({ "create": { "callToActionAsset": { "callToAction": kind } } }));
            field_types.push("CALL_TO_ACTION_SELECTION");
        }

        let created = self.mutate("assets", creates).await?;
        let links = created
            .iter()
            .zip(field_types)
            .map(|(asset, field_type)| {
                json!({ "create": {
                    "asset": asset,
                    "assetGroup": asset_group,
                    "fieldType": field_type,
                }})
            })
            .collect();
        self.mutate("assetGroupAssets", links).await?;

        debug!(campaign_id = %campaign.id, customer = %self.customer_resource(), count = created.len(), "Assets uploaded");
        Ok(())
    }
}

// ─── Row decoding ───────────────────────────────────────────────────────

fn digits(id: &str) -> String {
    id.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Campaign ids are interpolated into GAQL, so only plain digits pass.
fn gaql_id(id: &str) -> CampaignResult<&str> {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        Ok(id)
    } else {
        Err(CampaignError::Validation(format!("invalid campaign id {id:?}")))
    }
}

/// Currency amount to micros, rounded to the nearest hundredth.
pub fn to_micros(amount: f64) -> i64 {
    (amount * 100.0).round() as i64 * 10_000
}

pub fn from_micros(micros: f64) -> f64 {
    micros / 1_000_000.0
}

fn last_segment(resource_name: &str) -> String {
    resource_name.rsplit('/').next().unwrap_or(resource_name).to_string()
}

fn lookup<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(value, |v, k| v.get(*k))
}

/// Numeric field; int64 values arrive as JSON strings.
fn number(value: &Value, keys: &[&str]) -> f64 {
    lookup(value, keys)
        .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .unwrap_or(0.0)
}

fn text(value: &Value, keys: &[&str]) -> Option<String> {
    lookup(value, keys).and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn campaign_from_row(row: &Value) -> Option<Campaign> {
    let id = text(row, &["campaign", "id"])?;
    let status = match text(row, &["campaign", "status"]).as_deref() {
        Some("ENABLED") => CampaignStatus::Enabled,
        Some("PAUSED") => CampaignStatus::Paused,
        _ => CampaignStatus::Removed,
    };
    Some(Campaign {
        name: text(row, &["campaign", "name"]).unwrap_or_else(|| id.clone()),
        resource_name: text(row, &["campaign", "resourceName"])?,
        budget_resource_name: text(row, &["campaign", "campaignBudget"])?,
        asset_group_resource_name: None,
        daily_budget: from_micros(number(row, &["campaignBudget", "amountMicros"])),
        bidding: BiddingStrategy {
            target_roas: number(row, &["campaign", "maximizeConversionValue", "targetRoas"]),
            max_cpc: None,
            min_cpc: None,
        },
        status,
        id,
    })
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

pub(crate) fn snapshot_from_rows(
    campaign_id: &str,
    totals: &[Value],
    keyword_rows: &[Value],
) -> PerformanceSnapshot {
    let mut impressions = 0.0;
    let mut clicks = 0.0;
    let mut cost = 0.0;
    let mut conversions = 0.0;
    let mut value = 0.0;
    for row in totals {
        impressions += number(row, &["metrics", "impressions"]);
        clicks += number(row, &["metrics", "clicks"]);
        cost += from_micros(number(row, &["metrics", "costMicros"]));
        conversions += number(row, &["metrics", "conversions"]);
        value += number(row, &["metrics", "conversionsValue"]);
    }

    let mut keywords = Vec::with_capacity(keyword_rows.len());
    let mut weighted_quality = 0.0;
    let mut quality_clicks = 0.0;
    for row in keyword_rows {
        let Some(keyword_text) = text(row, &["adGroupCriterion", "keyword", "text"]) else {
            continue;
        };
        let kw_clicks = number(row, &["metrics", "clicks"]);
        let quality = number(row, &["adGroupCriterion", "qualityInfo", "qualityScore"]);
        if quality > 0.0 {
            // keywords without clicks still count once
            let weight = kw_clicks.max(1.0);
            weighted_quality += quality * weight;
            quality_clicks += weight;
        }
        keywords.push(KeywordPerformance {
            text: keyword_text,
            cost: from_micros(number(row, &["metrics", "costMicros"])),
            clicks: kw_clicks as u64,
            conversions: number(row, &["metrics", "conversions"]),
        });
    }

    PerformanceSnapshot {
        campaign_id: campaign_id.to_string(),
        roas: ratio(value, cost),
        conversion_rate: ratio(conversions * 100.0, clicks),
        quality_score: (quality_clicks > 0.0).then(|| weighted_quality / quality_clicks),
        cost_per_click: ratio(cost, clicks),
        cost_per_acquisition: ratio(cost, conversions),
        impressions: impressions as u64,
        clicks: clicks as u64,
        conversions,
        cost,
        keywords,
        fetched_at: Utc::now(),
    }
}

/// Map free-text call to action onto the platform's fixed enum.
pub(crate) fn call_to_action_type(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    if lower.contains("book") || lower.contains("reserve") || lower.contains("예약") {
        "BOOK_NOW"
    } else if lower.contains("sign up") || lower.contains("join") {
        "SIGN_UP"
    } else if lower.contains("contact") || lower.contains("call") || lower.contains("문의") {
        "CONTACT_US"
    } else if lower.contains("shop") || lower.contains("buy") {
        "SHOP_NOW"
    } else if lower.contains("quote") {
        "GET_QUOTE"
    } else {
        "LEARN_MORE"
    }
}
