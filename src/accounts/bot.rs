use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{now_ms, subscription, KindContext};
use crate::store::snapshot::BotRecord;
use crate::store::Registry;

/// A chat-bot account. Bots own the posting side of the relay: users link a
/// chat group to a bot, and voicemail notifications for that group are posted
/// through the bot's credential.
#[derive(Clone)]
pub struct Bot {
    pub token: crate::platform::Credential,
    pub last_renew_time: i64,
    /// Unknown record fields, preserved across snapshot round trips.
    pub(crate) extra: Map<String, Value>,
    ctx: KindContext,
}

impl Bot {
    pub fn hydrate(record: BotRecord, ctx: KindContext) -> Self {
        Self {
            token: record.token,
            last_renew_time: record.last_renew_time,
            extra: record.extra,
            ctx,
        }
    }

    pub fn record(&self) -> BotRecord {
        BotRecord {
            token: self.token.clone(),
            last_renew_time: self.last_renew_time,
            extra: self.extra.clone(),
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.token.owner_id
    }

    /// Exchange an authorization code for a credential. Failure is logged and
    /// yields no entity; the account simply stays unauthorized.
    pub async fn authorize(ctx: KindContext, code: &str, redirect_uri: &str) -> Option<Self> {
        match ctx.api.exchange_code(code, redirect_uri).await {
            Ok(token) => Some(Self {
                token,
                last_renew_time: 0,
                extra: Map::new(),
                ctx,
            }),
            Err(e) => {
                warn!("bot authorize failed: {}", e);
                None
            }
        }
    }

    /// Exchange the refresh token for a fresh credential. Failure means the
    /// credential is permanently revoked: the bot is evicted.
    pub async fn refresh(&mut self, registry: &Registry) -> bool {
        match self.ctx.api.refresh(&self.token).await {
            Ok(token) => {
                self.token = token;
                self.last_renew_time = now_ms();
                registry.put_bot(self.clone()).await;
                true
            }
            Err(e) => {
                warn!("bot {} refresh failed: {}", self.owner_id(), e);
                registry.remove_bot(self.owner_id()).await;
                info!("bot {} refresh token has expired", self.owner_id());
                false
            }
        }
    }

    /// Cheap authenticated probe. The two "account gone" error codes evict
    /// the bot; any other failure gets exactly one refresh attempt.
    pub async fn validate(&mut self, registry: &Registry) -> bool {
        match self.ctx.api.probe(&self.token).await {
            Ok(()) => true,
            Err(e) if e.is_account_gone() => {
                registry.remove_bot(self.owner_id()).await;
                info!("bot {} has been deleted", self.owner_id());
                false
            }
            Err(e) => {
                warn!("bot {} probe failed, trying refresh: {}", self.owner_id(), e);
                self.refresh(registry).await
            }
        }
    }

    pub async fn setup_web_hook(&self) {
        if let Err(e) = subscription::setup_web_hook(&*self.ctx.api, &self.token, &self.ctx.profile).await
        {
            warn!("bot {} setup_web_hook failed: {}", self.owner_id(), e);
        }
    }

    /// Reconcile remote subscriptions down to one at the bot delivery
    /// address. `last_renew_time` advances only on a fully successful pass.
    pub async fn renew_web_hooks(&mut self, registry: &Registry) {
        match subscription::renew_web_hooks(&*self.ctx.api, &self.token, &self.ctx.profile).await {
            Ok(()) => {
                self.last_renew_time = now_ms();
                registry.put_bot(self.clone()).await;
            }
            Err(e) => warn!("bot {} renew_web_hooks failed: {}", self.owner_id(), e),
        }
    }

    pub async fn renew_subscription(&self, id: &str) {
        if let Err(e) =
            subscription::renew_subscription(&*self.ctx.api, &self.token, &self.ctx.profile, id)
                .await
        {
            warn!("bot {} renew_subscription failed: {}", self.owner_id(), e);
        }
    }

    pub async fn del_subscription(&self, id: &str) {
        debug!("deleting bot {} subscription {}", self.owner_id(), id);
        if let Err(e) = self.ctx.api.delete_subscription(&self.token, id).await {
            warn!("bot {} del_subscription failed: {}", self.owner_id(), e);
        }
    }

    /// Post `text` into a chat group. Errors are logged and swallowed; the
    /// user-visible failure mode is a notification that never arrives.
    pub async fn send_message(&self, group_id: &str, text: &str) {
        if let Err(e) = self
            .ctx
            .api
            .post_group_message(&self.token, group_id, text)
            .await
        {
            warn!("bot {} send_message to group {} failed: {}", self.owner_id(), group_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::platform::testing::harness;

    #[tokio::test]
    async fn validate_keeps_a_healthy_bot_untouched() {
        let h = harness().with_bot("b1").await;
        let mut bot = h.registry.bot("b1").await.unwrap();
        let before = bot.token.clone();

        assert!(bot.validate(&h.registry).await);
        assert_eq!(h.registry.bot("b1").await.unwrap().token, before);
        assert_eq!(h.bot_api.with(|s| s.refresh_calls), 0);
    }

    #[tokio::test]
    async fn validate_evicts_on_account_gone_codes() {
        for code in ["OAU-232", "CMN-405"] {
            let h = harness().with_bot("b1").await;
            h.bot_api.with(|s| s.probe_error_code = Some(code.to_string()));

            let mut bot = h.registry.bot("b1").await.unwrap();
            assert!(!bot.validate(&h.registry).await);
            assert!(h.registry.bot("b1").await.is_none());
        }
    }

    #[tokio::test]
    async fn validate_retries_with_exactly_one_refresh() {
        let h = harness().with_bot("b1").await;
        h.bot_api.with(|s| s.probe_error_code = Some("TokenInvalid".to_string()));

        let mut bot = h.registry.bot("b1").await.unwrap();
        assert!(bot.validate(&h.registry).await);
        assert_eq!(h.bot_api.with(|s| s.refresh_calls), 1);
        // The refreshed credential was written back.
        assert_eq!(h.registry.bot("b1").await.unwrap().token, bot.token);
    }

    #[tokio::test]
    async fn validate_evicts_when_the_fallback_refresh_fails() {
        let h = harness().with_bot("b1").await;
        h.bot_api.with(|s| {
            s.probe_error_code = Some("TokenInvalid".to_string());
            s.refresh_fails = true;
        });

        let mut bot = h.registry.bot("b1").await.unwrap();
        assert!(!bot.validate(&h.registry).await);
        assert_eq!(h.bot_api.with(|s| s.refresh_calls), 1);
        assert!(h.registry.bot("b1").await.is_none());
    }

    #[tokio::test]
    async fn refresh_success_advances_last_renew_time() {
        let h = harness().with_bot("b1").await;
        let mut bot = h.registry.bot("b1").await.unwrap();
        let before = bot.last_renew_time;

        assert!(bot.refresh(&h.registry).await);
        let stored = h.registry.bot("b1").await.unwrap();
        assert!(stored.last_renew_time >= before);
        assert_ne!(stored.token.access_token, "at-b1");
    }

    #[tokio::test]
    async fn refresh_failure_removes_the_bot() {
        let h = harness().with_bot("b1").await;
        h.bot_api.with(|s| s.refresh_fails = true);

        let mut bot = h.registry.bot("b1").await.unwrap();
        assert!(!bot.refresh(&h.registry).await);
        assert!(h.registry.bot("b1").await.is_none());
    }

    #[tokio::test]
    async fn renew_web_hooks_failure_leaves_last_renew_time_alone() {
        let h = harness().with_bot("b1").await;
        h.bot_api.with(|s| s.list_fails = true);

        let mut bot = h.registry.bot("b1").await.unwrap();
        let before = h.registry.bot("b1").await.unwrap().last_renew_time;
        bot.renew_web_hooks(&h.registry).await;
        assert_eq!(h.registry.bot("b1").await.unwrap().last_renew_time, before);
    }
}
