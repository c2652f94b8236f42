use serde::{Deserialize, Serialize};

/// Subscription tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    Basic,
    Premium,
    Pro,
    Enterprise,
}

/// How long a subscription to a plan runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanDuration {
    Months(u32),
    /// Negotiated per contract
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanTerms {
    pub plan: SubscriptionPlan,
    pub requests_per_minute: u32,
    pub duration: PlanDuration,
}

const PLAN_TABLE: [PlanTerms; 4] = [
    PlanTerms {
        plan: SubscriptionPlan::Basic,
        requests_per_minute: 2,
        duration: PlanDuration::Months(1),
    },
    PlanTerms {
        plan: SubscriptionPlan::Premium,
        requests_per_minute: 3,
        duration: PlanDuration::Months(6),
    },
    PlanTerms {
        plan: SubscriptionPlan::Pro,
        requests_per_minute: 4,
        duration: PlanDuration::Months(12),
    },
    PlanTerms {
        plan: SubscriptionPlan::Enterprise,
        requests_per_minute: 5,
        duration: PlanDuration::Custom,
    },
];

/// Plan applied to users without an active subscription or with an
/// unrecognised plan name
pub const FALLBACK_PLAN: SubscriptionPlan = SubscriptionPlan::Basic;

impl SubscriptionPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPlan::Basic => "basic",
            SubscriptionPlan::Premium => "premium",
            SubscriptionPlan::Pro => "pro",
            SubscriptionPlan::Enterprise => "enterprise",
        }
    }

    /// Parse a plan name, case-insensitively
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        PLAN_TABLE
            .iter()
            .map(|terms| terms.plan)
            .find(|plan| plan.as_str() == name)
    }

    /// Plan for a stored plan name, falling back explicitly
    pub fn resolve(name: Option<&str>) -> Self {
        name.and_then(Self::parse).unwrap_or(FALLBACK_PLAN)
    }

    pub fn terms(&self) -> PlanTerms {
        PLAN_TABLE
            .iter()
            .copied()
            .find(|terms| terms.plan == *self)
            .unwrap_or(PLAN_TABLE[0])
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.terms().requests_per_minute
    }

    pub fn duration(&self) -> PlanDuration {
        self.terms().duration
    }
}

impl std::fmt::Display for SubscriptionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
