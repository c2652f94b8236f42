// Per-user request rate limiting
//
// Each user gets a fixed 60 second window whose size is the request limit of
// their current subscription plan. Plans are looked up through the store and
// cached per user for a bounded time. Expired windows and plans are swept
// whenever a new one is opened, so idle users do not accumulate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::store::Store;
use crate::subscriptions::plan::SubscriptionPlan;

/// Length of one rate-limit window
pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct CachedPlan {
    plan: SubscriptionPlan,
    fetched_at: Instant,
}

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    started_at: Instant,
    count: u32,
}

pub struct RateLimiter {
    store: Arc<dyn Store>,
    plan_ttl: Duration,
    window: Duration,
    plans: RwLock<HashMap<i32, CachedPlan>>,
    counters: Mutex<HashMap<i32, WindowCounter>>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn Store>, plan_ttl: Duration) -> Self {
        Self {
            store,
            plan_ttl,
            window: WINDOW,
            plans: RwLock::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Override the window length
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Current plan of a user, served from the per-user cache when fresh
    ///
    /// A failed lookup is logged and answered with the fallback plan without
    /// being cached, so the next request retries the store.
    pub async fn plan_for(&self, user_id: i32) -> SubscriptionPlan {
        if let Some(cached) = self.plans.read().await.get(&user_id) {
            if cached.fetched_at.elapsed() < self.plan_ttl {
                return cached.plan;
            }
        }

        let plan = match self.store.current_plan(user_id).await {
            Ok(name) => SubscriptionPlan::resolve(name.as_deref()),
            Err(e) => {
                warn!("Plan lookup failed for user {}: {}", user_id, e);
                return SubscriptionPlan::resolve(None);
            }
        };

        let mut plans = self.plans.write().await;
        plans.retain(|_, cached| cached.fetched_at.elapsed() < self.plan_ttl);
        plans.insert(
            user_id,
            CachedPlan {
                plan,
                fetched_at: Instant::now(),
            },
        );
        plan
    }

    /// Count one request for `user_id`
    ///
    /// # Returns
    /// `ApiError::TooManyRequests` carrying the seconds left in the window
    /// once the plan's limit has been reached.
    pub async fn check(&self, user_id: i32) -> Result<(), ApiError> {
        let plan = self.plan_for(user_id).await;
        let limit = plan.requests_per_minute();
        let now = Instant::now();

        let mut counters = self.counters.lock().await;
        let window_open = counters
            .get(&user_id)
            .is_some_and(|counter| now.duration_since(counter.started_at) < self.window);
        if !window_open {
            counters.retain(|_, counter| now.duration_since(counter.started_at) < self.window);
        }
        let counter = counters.entry(user_id).or_insert(WindowCounter {
            started_at: now,
            count: 0,
        });

        let elapsed = now.duration_since(counter.started_at);
        if elapsed >= self.window {
            counter.started_at = now;
            counter.count = 0;
        }

        if counter.count >= limit {
            let remaining = self.window.saturating_sub(now.duration_since(counter.started_at));
            let retry_after_secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
            debug!(
                "User {} exceeded {} plan limit of {}/min",
                user_id, plan, limit
            );
            return Err(ApiError::TooManyRequests {
                retry_after_secs: retry_after_secs.max(1),
            });
        }

        counter.count += 1;
        Ok(())
    }

    /// Users with a live window counter
    #[cfg(test)]
    async fn tracked_users(&self) -> usize {
        self.counters.lock().await.len()
    }
}

/// Middleware applying the caller's plan limit to protected routes
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    user: AuthenticatedUser,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    limiter.check(user.user_id).await?;
    Ok(next.run(request).await)
}
