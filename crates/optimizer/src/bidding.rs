//! Seasonal bidding arithmetic: target ROAS, CPA and CPC bounds from the
//! average order value.

use chrono::{Datelike, Utc};
use demand_core::types::BiddingStrategy;
use demand_core::{CampaignError, CampaignResult};
use serde::{Deserialize, Serialize};

const MONTHS: usize = 12;
const MAX_CPC_SHARE: f64 = 0.3;
const MIN_CPC_SHARE: f64 = 0.05;
/// Seasonal multiplier above which mobile bids are boosted.
const MOBILE_BOOST_ABOVE: f64 = 1.2;
const MOBILE_BOOST: f64 = 1.15;
const TABLET_MULTIPLIER: f64 = 0.9;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DeviceBidMultipliers {
    pub mobile: f64,
    pub desktop: f64,
    pub tablet: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BiddingPlan {
    pub seasonal_multiplier: f64,
    pub target_roas: f64,
    pub target_cpa: f64,
    pub max_cpc: f64,
    pub min_cpc: f64,
    pub devices: DeviceBidMultipliers,
}

impl BiddingPlan {
    pub fn strategy(&self) -> BiddingStrategy {
        BiddingStrategy {
            target_roas: self.target_roas,
            max_cpc: Some(self.max_cpc),
            min_cpc: Some(self.min_cpc),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BiddingCalculator {
    base_roas: f64,
}

impl BiddingCalculator {
    pub fn new(base_roas: f64) -> Self {
        Self { base_roas }
    }

    /// Derive a bidding plan for `month` (0 = January, clamped to 11).
    ///
    /// `seasonality` holds twelve demand percentages where 100 is an
    /// average month.
    pub fn calculate(
        &self,
        average_order_value: f64,
        seasonality: &[f64],
        month: usize,
    ) -> CampaignResult<BiddingPlan> {
        if !(self.base_roas.is_finite() && self.base_roas > 0.0) {
            return Err(CampaignError::Validation(format!(
                "base ROAS must be positive, got {}",
                self.base_roas
            )));
        }
        if !(average_order_value.is_finite() && average_order_value > 0.0) {
            return Err(CampaignError::Validation(format!(
                "average order value must be positive, got {average_order_value}"
            )));
        }
        if seasonality.len() != MONTHS {
            return Err(CampaignError::Validation(format!(
                "seasonality needs {MONTHS} monthly values, got {}",
                seasonality.len()
            )));
        }
        if let Some((idx, bad)) = seasonality
            .iter()
            .enumerate()
            .find(|(_, v)| !(v.is_finite() && **v > 0.0))
        {
            return Err(CampaignError::Validation(format!(
                "seasonality[{idx}] must be positive, got {bad}"
            )));
        }

        let month = month.min(MONTHS - 1);
        let seasonal_multiplier = seasonality[month] / 100.0;
        let target_roas = self.base_roas * seasonal_multiplier;
        let target_cpa = average_order_value / target_roas;

        Ok(BiddingPlan {
            seasonal_multiplier,
            target_roas,
            target_cpa,
            max_cpc: target_cpa * MAX_CPC_SHARE,
            min_cpc: target_cpa * MIN_CPC_SHARE,
            devices: DeviceBidMultipliers {
                mobile: if seasonal_multiplier > MOBILE_BOOST_ABOVE {
                    MOBILE_BOOST
                } else {
                    1.0
                },
                desktop: 1.0,
                tablet: TABLET_MULTIPLIER,
            },
        })
    }
}

/// Zero-based index of the current UTC month.
pub fn current_month() -> usize {
    Utc::now().month0() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(value: f64) -> Vec<f64> {
        vec![value; 12]
    }

    #[test]
    fn test_worked_example() {
        let mut seasonality = flat(100.0);
        seasonality[6] = 120.0;
        let plan = BiddingCalculator::new(4.0)
            .calculate(100_000.0, &seasonality, 6)
            .unwrap();

        assert!((plan.seasonal_multiplier - 1.2).abs() < 1e-12);
        assert!((plan.target_roas - 4.8).abs() < 1e-12);
        assert_eq!(plan.target_cpa.round(), 20_833.0);
        assert_eq!(plan.max_cpc.round(), 6_250.0);
        assert_eq!(plan.min_cpc.round(), 1_042.0);
        // exactly 1.2 does not boost mobile
        assert_eq!(plan.devices.mobile, 1.0);
        assert_eq!(plan.devices.desktop, 1.0);
        assert_eq!(plan.devices.tablet, 0.9);
    }

    #[test]
    fn test_peak_season_boosts_mobile() {
        let plan = BiddingCalculator::new(4.0)
            .calculate(50_000.0, &flat(150.0), 0)
            .unwrap();
        assert_eq!(plan.devices.mobile, 1.15);
    }

    #[test]
    fn test_cpa_times_roas_recovers_aov() {
        let calc = BiddingCalculator::new(4.0);
        for aov in [1.0, 99.99, 100_000.0, 7_654_321.0] {
            for pct in [1.0, 35.5, 100.0, 120.0, 480.0] {
                let plan = calc.calculate(aov, &flat(pct), 3).unwrap();
                let recovered = plan.target_cpa * plan.target_roas;
                assert!((recovered - aov).abs() <= aov * 1e-9, "aov={aov} pct={pct}");
                assert!(plan.max_cpc > plan.min_cpc);
            }
        }
    }

    #[test]
    fn test_month_is_clamped() {
        let mut seasonality = flat(100.0);
        seasonality[11] = 200.0;
        let plan = BiddingCalculator::new(4.0)
            .calculate(1_000.0, &seasonality, 40)
            .unwrap();
        assert_eq!(plan.seasonal_multiplier, 2.0);
    }

    #[test]
    fn test_malformed_input_is_rejected() {
        let calc = BiddingCalculator::new(4.0);
        assert!(matches!(
            calc.calculate(1_000.0, &[100.0; 11], 0),
            Err(CampaignError::Validation(_))
        ));
        assert!(calc.calculate(1_000.0, &[100.0; 13], 0).is_err());

        let mut zero = flat(100.0);
        zero[4] = 0.0;
        assert!(calc.calculate(1_000.0, &zero, 0).is_err());

        let mut nan = flat(100.0);
        nan[2] = f64::NAN;
        assert!(calc.calculate(1_000.0, &nan, 0).is_err());

        assert!(calc.calculate(0.0, &flat(100.0), 0).is_err());
        assert!(calc.calculate(f64::INFINITY, &flat(100.0), 0).is_err());
        assert!(BiddingCalculator::new(0.0)
            .calculate(1_000.0, &flat(100.0), 0)
            .is_err());
    }

    #[test]
    fn test_strategy_carries_cpc_bounds() {
        let plan = BiddingCalculator::new(4.0)
            .calculate(40_000.0, &flat(100.0), 0)
            .unwrap();
        let strategy = plan.strategy();
        assert_eq!(strategy.target_roas, 4.0);
        assert!((strategy.max_cpc.unwrap() - 3_000.0).abs() < 1e-6);
        assert!((strategy.min_cpc.unwrap() - 500.0).abs() < 1e-6);
    }
}
