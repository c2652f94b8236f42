// Subscription Plans Module
//
// Plan tiers and the per-plan request rate limiter.

pub mod plan;
pub mod rate_limit;

pub use plan::{PlanDuration, SubscriptionPlan};
pub use rate_limit::{rate_limit, RateLimiter};
