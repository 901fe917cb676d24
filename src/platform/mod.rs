//! Remote chat/voicemail API access.
//!
//! Everything the rest of the crate knows about the remote REST API goes
//! through the [`PlatformApi`] trait, so entities can be exercised in tests
//! with a substitute client. [`HttpPlatformApi`] is the real implementation,
//! constructed once per account kind with that kind's OAuth client pair.

pub mod client;
pub mod error;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use client::HttpPlatformApi;
pub use error::ApiError;
pub use types::{
    Credential, DeliveryMode, SubscriptionInfo, SyncParams, SyncResponse, SyncType,
    VoicemailRecord,
};

use async_trait::async_trait;

#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Exchange an authorization code for a credential.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<Credential, ApiError>;

    /// Exchange the refresh token for a fresh credential.
    async fn refresh(&self, current: &Credential) -> Result<Credential, ApiError>;

    /// Cheap authenticated probe against the account's own extension.
    async fn probe(&self, token: &Credential) -> Result<(), ApiError>;

    async fn list_subscriptions(&self, token: &Credential)
        -> Result<Vec<SubscriptionInfo>, ApiError>;

    async fn create_subscription(
        &self,
        token: &Credential,
        event_filters: &[String],
        delivery: DeliveryMode,
        expires_in: i64,
    ) -> Result<SubscriptionInfo, ApiError>;

    async fn delete_subscription(&self, token: &Credential, id: &str) -> Result<(), ApiError>;

    /// Latest `count` voicemail records from the message store.
    async fn list_voice_mails(
        &self,
        token: &Credential,
        count: u32,
    ) -> Result<Vec<VoicemailRecord>, ApiError>;

    async fn sync_voice_mails(
        &self,
        token: &Credential,
        params: &SyncParams,
    ) -> Result<SyncResponse, ApiError>;

    /// Post a text message into a chat group.
    async fn post_group_message(
        &self,
        token: &Credential,
        group_id: &str,
        text: &str,
    ) -> Result<(), ApiError>;
}
