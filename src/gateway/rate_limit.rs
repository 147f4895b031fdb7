use super::{EndpointClass, GatewayError};
use crate::error::ConfigurationError;
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;

type DirectRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// What to do when a bucket is empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RateLimitPolicy {
    /// Wait for a token, up to `timeout_ms`
    Block { timeout_ms: u64 },
    FailFast,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        RateLimitPolicy::Block { timeout_ms: 2_000 }
    }
}

/// Token bucket shape: steady refill rate plus burst capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BucketConfig {
    pub per_second: u32,
    pub burst: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub market_data: BucketConfig,
    pub account: BucketConfig,
    pub order: BucketConfig,
    pub policy: RateLimitPolicy,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            market_data: BucketConfig {
                per_second: 20,
                burst: 40,
            },
            account: BucketConfig {
                per_second: 5,
                burst: 10,
            },
            order: BucketConfig {
                per_second: 10,
                burst: 20,
            },
            policy: RateLimitPolicy::default(),
        }
    }
}

impl RateLimitSettings {
    pub fn bucket(&self, class: EndpointClass) -> BucketConfig {
        match class {
            EndpointClass::MarketData => self.market_data,
            EndpointClass::Account => self.account,
            EndpointClass::Order => self.order,
        }
    }
}

/// One endpoint class's bucket
struct TokenBucket {
    class: EndpointClass,
    limiter: DirectRateLimiter,
}

impl TokenBucket {
    fn new(class: EndpointClass, config: BucketConfig) -> Result<Self, String> {
        let per_second = NonZeroU32::new(config.per_second)
            .ok_or_else(|| format!("{} rate limit per_second must be positive", class))?;
        let burst = NonZeroU32::new(config.burst)
            .ok_or_else(|| format!("{} rate limit burst must be positive", class))?;

        let quota = Quota::per_second(per_second).allow_burst(burst);
        Ok(Self {
            class,
            limiter: RateLimiter::direct(quota),
        })
    }
}

/// Per-class token buckets for one exchange account
///
/// Safe to share between bots; governor keeps bucket state in atomics.
pub struct RateLimitBudget {
    buckets: Vec<TokenBucket>,
    policy: RateLimitPolicy,
}

impl RateLimitBudget {
    pub fn new(settings: &RateLimitSettings) -> Result<Self, ConfigurationError> {
        let mut buckets = Vec::new();
        let mut violations = Vec::new();

        for class in EndpointClass::ALL {
            match TokenBucket::new(class, settings.bucket(class)) {
                Ok(bucket) => buckets.push(bucket),
                Err(violation) => violations.push(violation),
            }
        }
        ConfigurationError::check(violations)?;

        Ok(Self {
            buckets,
            policy: settings.policy,
        })
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Take one token for `class`, waiting or failing per the configured policy
    pub async fn acquire(&self, class: EndpointClass) -> Result<(), GatewayError> {
        let Some(bucket) = self.buckets.iter().find(|b| b.class == class) else {
            return Ok(());
        };

        match self.policy {
            RateLimitPolicy::FailFast => bucket
                .limiter
                .check()
                .map_err(|_| GatewayError::RateLimited { class }),
            RateLimitPolicy::Block { timeout_ms } => {
                tokio::time::timeout(Duration::from_millis(timeout_ms), bucket.limiter.until_ready())
                    .await
                    .map_err(|_| {
                        tracing::warn!(%class, timeout_ms, "Timed out waiting for rate limit token");
                        GatewayError::RateLimited { class }
                    })
            }
        }
    }
}
