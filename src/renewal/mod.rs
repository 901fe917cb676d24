//! Startup reconciliation and the periodic renewal sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info};

use crate::accounts::now_ms;
use crate::store::Registry;

/// Re-validate and re-subscribe every account whose last successful renewal
/// is older than `stale_after`. Bots are probed first; users go straight to a
/// refresh since their tokens are the ones that expire. An account evicted by
/// its own validation is not renewed.
pub async fn reconcile_stale(registry: &Registry, stale_after: Duration) {
    let threshold = stale_after.as_millis() as i64;
    let now = now_ms();

    for id in registry.bot_ids().await {
        let Some(mut bot) = registry.bot(&id).await else {
            continue;
        };
        if now - bot.last_renew_time <= threshold {
            debug!("bot {} renewed recently, skipping", id);
            continue;
        }
        if bot.validate(registry).await {
            bot.renew_web_hooks(registry).await;
        }
    }

    for id in registry.user_ids().await {
        let Some(mut user) = registry.user(&id).await else {
            continue;
        };
        if now - user.last_renew_time <= threshold {
            debug!("user {} renewed recently, skipping", id);
            continue;
        }
        if user.refresh(registry).await {
            user.renew_web_hooks(registry).await;
        }
    }
}

/// Periodic sweep keeping subscriptions and credentials from lapsing between
/// webhook-driven renewals.
pub struct RenewalRunner {
    registry: Arc<Registry>,
    interval: Duration,
    stale_after: Duration,
}

impl RenewalRunner {
    pub fn new(registry: Arc<Registry>, interval: Duration, stale_after: Duration) -> Self {
        Self {
            registry,
            interval,
            stale_after,
        }
    }

    pub async fn run(&self) {
        info!("starting renewal sweep with interval {:?}", self.interval);
        loop {
            sleep(self.interval).await;
            reconcile_stale(&self.registry, self.stale_after).await;
        }
    }
}
