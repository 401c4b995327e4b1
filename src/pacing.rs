//! Block pacing
//!
//! Spaces out block fetches so a window of blocks does not exceed the node's
//! rate limits.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

/// How the driver waits between blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingPolicy {
    /// No waiting.
    None,
    /// Sleep a fixed duration between consecutive blocks.
    FixedDelay(Duration),
    /// Allow at most this many block fetches per minute (token bucket, burst 1).
    TokenBucket(NonZeroU32),
}

pub struct Pacer {
    policy: PacingPolicy,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl Pacer {
    pub fn new(policy: PacingPolicy) -> Self {
        let limiter = match policy {
            PacingPolicy::TokenBucket(per_minute) => {
                Some(RateLimiter::direct(Quota::per_minute(per_minute).allow_burst(NonZeroU32::MIN)))
            }
            _ => None,
        };
        Self { policy, limiter }
    }

    pub fn policy(&self) -> PacingPolicy {
        self.policy
    }

    /// Wait until the block at `index` within the window may be fetched.
    pub async fn before_block(&self, index: u64) {
        match (self.policy, &self.limiter) {
            (PacingPolicy::FixedDelay(delay), _) if index > 0 && !delay.is_zero() => {
                debug!("Waiting {:?} before next block", delay);
                tokio::time::sleep(delay).await;
            }
            (PacingPolicy::TokenBucket(_), Some(limiter)) => {
                limiter.until_ready().await;
            }
            _ => {}
        }
    }
}
