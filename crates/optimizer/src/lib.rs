//! Campaign optimization: bidding arithmetic, efficiency scoring, threshold
//! rules, validated model generators, and the scheduler that keeps live
//! campaigns tuned.

pub mod bidding;
pub mod decode;
pub mod engine;
pub mod executor;
pub mod generator;
pub mod launcher;
pub mod prompts;
pub mod rules;
pub mod scheduler;
pub mod scorer;
pub mod store;

pub use bidding::{BiddingCalculator, BiddingPlan};
pub use engine::{CycleReport, OptimizationEngine};
pub use executor::ActionExecutor;
pub use generator::CampaignGenerator;
pub use launcher::CampaignLauncher;
pub use rules::RuleSet;
pub use scheduler::OptimizationScheduler;
pub use scorer::{EfficiencyBreakdown, EfficiencyScorer, ScoreWeights};
pub use store::OptimizationStore;
