//! Process configuration and the per-kind subscription constants.

use std::path::PathBuf;
use std::time::Duration;

use crate::accounts::subscription::SubscriptionProfile;

/// Webhook delivery and OAuth redirect paths registered under the public base
/// URL. Bots and users use distinct endpoints.
pub const BOT_WEBHOOK_PATH: &str = "/bot-webhook";
pub const USER_WEBHOOK_PATH: &str = "/user-webhook";
pub const BOT_OAUTH_PATH: &str = "/bot-oauth";
pub const USER_OAUTH_PATH: &str = "/user-oauth";

/// Expiry window requested for every webhook subscription (seconds).
pub const SUBSCRIPTION_EXPIRES_IN: i64 = 7 * 24 * 60 * 60;

/// Accounts whose last successful renewal is older than this get
/// re-validated and re-subscribed by the sweep.
pub const STALE_AFTER: Duration = Duration::from_secs(30 * 60);

/// How often the renewal sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Quiet period before coalesced registry mutations are flushed to the
/// snapshot store.
pub const SNAPSHOT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Event filter that makes the platform deliver a reminder before a
/// subscription expires, so it can be renewed in place.
pub fn renewal_reminder_filter() -> String {
    "/restapi/v1.0/subscription/~?threshold=3600&interval=900".to_string()
}

pub fn bot_event_filters() -> Vec<String> {
    vec![
        "/restapi/v1.0/glip/posts".to_string(),
        "/restapi/v1.0/glip/groups".to_string(),
        renewal_reminder_filter(),
    ]
}

pub fn user_event_filters() -> Vec<String> {
    vec![
        "/restapi/v1.0/account/~/extension/~/message-store".to_string(),
        renewal_reminder_filter(),
    ]
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Remote REST API base URL.
    pub api_base: String,
    /// Public base URL of this process, used to build delivery addresses and
    /// OAuth redirect URIs.
    pub public_base: String,
    pub bot_client_id: String,
    pub bot_client_secret: String,
    pub user_client_id: String,
    pub user_client_secret: String,
    pub snapshot_file: PathBuf,
    pub bind: String,
    pub port: u16,
}

impl Config {
    fn public_url(&self, path: &str) -> String {
        format!("{}{}", self.public_base.trim_end_matches('/'), path)
    }

    pub fn bot_redirect_uri(&self) -> String {
        self.public_url(BOT_OAUTH_PATH)
    }

    pub fn user_redirect_uri(&self) -> String {
        self.public_url(USER_OAUTH_PATH)
    }

    pub fn bot_profile(&self) -> SubscriptionProfile {
        SubscriptionProfile {
            kind: "bot",
            delivery_address: self.public_url(BOT_WEBHOOK_PATH),
            event_filters: bot_event_filters(),
            expires_in: SUBSCRIPTION_EXPIRES_IN,
        }
    }

    pub fn user_profile(&self) -> SubscriptionProfile {
        SubscriptionProfile {
            kind: "user",
            delivery_address: self.public_url(USER_WEBHOOK_PATH),
            event_filters: user_event_filters(),
            expires_in: SUBSCRIPTION_EXPIRES_IN,
        }
    }

    /// Authorization URL a user follows to link `group_id` to `bot_id`. The
    /// group/bot pair rides in `state` and comes back on the OAuth redirect.
    pub fn user_authorize_uri(&self, group_id: &str, bot_id: &str) -> String {
        format!(
            "{}/restapi/oauth/authorize?response_type=code&client_id={}&redirect_uri={}&state={}:{}",
            self.api_base.trim_end_matches('/'),
            self.user_client_id,
            self.user_redirect_uri(),
            group_id,
            bot_id,
        )
    }
}
