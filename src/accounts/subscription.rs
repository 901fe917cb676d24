//! Webhook subscription reconciliation, shared by both account kinds.
//!
//! The goal state is exactly one live remote subscription whose delivery
//! address is this process's canonical webhook URL for the entity's kind.
//! Renewal creates the fresh subscription before tearing stale ones down, so
//! the window with zero active subscriptions is minimized at the cost of a
//! brief window with two. Interleaved renewals for the same account can leave
//! duplicates behind; the next renewal pass converges back to one.

use tracing::{debug, warn};

use crate::platform::{ApiError, Credential, DeliveryMode, PlatformApi, SubscriptionInfo};

/// Kind-specific subscription constants: where events are delivered, which
/// events are requested, and for how long.
#[derive(Debug, Clone)]
pub struct SubscriptionProfile {
    pub kind: &'static str,
    pub delivery_address: String,
    pub event_filters: Vec<String>,
    pub expires_in: i64,
}

/// Create a fresh subscription for the profile's event set.
pub async fn setup_web_hook(
    api: &dyn PlatformApi,
    token: &Credential,
    profile: &SubscriptionProfile,
) -> Result<SubscriptionInfo, ApiError> {
    api.create_subscription(
        token,
        &profile.event_filters,
        DeliveryMode::webhook(profile.delivery_address.clone()),
        profile.expires_in,
    )
    .await
}

/// Full reconciliation: list, filter to this kind's delivery address, create
/// the replacement, then delete everything previously matched.
///
/// List and create failures propagate so the caller knows not to advance
/// `lastRenewTime`; a failed delete only leaves one extra subscription
/// behind, which the next pass picks up, so those are logged and skipped.
pub async fn renew_web_hooks(
    api: &dyn PlatformApi,
    token: &Credential,
    profile: &SubscriptionProfile,
) -> Result<(), ApiError> {
    let subs = api.list_subscriptions(token).await?;
    let stale: Vec<SubscriptionInfo> = subs
        .into_iter()
        .filter(|s| s.delivery_address() == profile.delivery_address)
        .collect();
    debug!(
        "{} subs at canonical address: {}",
        profile.kind,
        stale
            .iter()
            .map(|s| s.id.as_str())
            .collect::<Vec<_>>()
            .join(",")
    );

    setup_web_hook(api, token, profile).await?;

    for sub in &stale {
        if let Err(e) = api.delete_subscription(token, &sub.id).await {
            warn!("{} delete of stale subscription {} failed: {}", profile.kind, sub.id, e);
        }
    }
    Ok(())
}

/// Narrow renewal used when one specific subscription is known to be
/// expiring: create the replacement, then delete that one.
pub async fn renew_subscription(
    api: &dyn PlatformApi,
    token: &Credential,
    profile: &SubscriptionProfile,
    id: &str,
) -> Result<(), ApiError> {
    setup_web_hook(api, token, profile).await?;
    if let Err(e) = api.delete_subscription(token, id).await {
        warn!("{} delete of expiring subscription {} failed: {}", profile.kind, id, e);
    }
    Ok(())
}
