//! Outbound plumbing: the ad platform and language model seams, their HTTP
//! implementations, and the guarded call runtime every external call goes
//! through.

pub mod ads;
pub mod google_ads;
mod http;
pub mod llm;
pub mod runtime;

pub use ads::AdPlatform;
pub use google_ads::GoogleAdsClient;
pub use llm::{LanguageModel, OpenAiClient};
pub use runtime::{CircuitBreaker, CircuitState, GuardedCaller, RetryPolicy};
