use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{now_ms, subscription, KindContext};
use crate::platform::{ApiError, SyncParams, SyncResponse, VoicemailRecord};
use crate::relay;
use crate::store::snapshot::UserRecord;
use crate::store::Registry;

/// A phone-system user account. Users own the receiving side of the relay:
/// their message store is watched for new voicemail, and each linked chat
/// group names the bot that posts the notification there.
#[derive(Clone)]
pub struct User {
    pub token: crate::platform::Credential,
    pub last_renew_time: i64,
    /// groupId -> owner id of the bot relaying into that group.
    pub groups: HashMap<String, String>,
    pub(crate) extra: Map<String, Value>,
    ctx: KindContext,
}

impl User {
    pub fn hydrate(record: UserRecord, ctx: KindContext) -> Self {
        Self {
            token: record.token,
            last_renew_time: record.last_renew_time,
            groups: record.groups,
            extra: record.extra,
            ctx,
        }
    }

    pub fn record(&self) -> UserRecord {
        UserRecord {
            token: self.token.clone(),
            last_renew_time: self.last_renew_time,
            groups: self.groups.clone(),
            extra: self.extra.clone(),
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.token.owner_id
    }

    pub async fn authorize(ctx: KindContext, code: &str, redirect_uri: &str) -> Option<Self> {
        match ctx.api.exchange_code(code, redirect_uri).await {
            Ok(token) => Some(Self {
                token,
                last_renew_time: 0,
                groups: HashMap::new(),
                extra: Map::new(),
                ctx,
            }),
            Err(e) => {
                warn!("user authorize failed: {}", e);
                None
            }
        }
    }

    pub async fn refresh(&mut self, registry: &Registry) -> bool {
        match self.ctx.api.refresh(&self.token).await {
            Ok(token) => {
                self.token = token;
                self.last_renew_time = now_ms();
                registry.put_user(self.clone()).await;
                true
            }
            Err(e) => {
                warn!("user {} refresh failed: {}", self.owner_id(), e);
                registry.remove_user(self.owner_id()).await;
                info!("user {} refresh token has expired", self.owner_id());
                false
            }
        }
    }

    pub async fn validate(&mut self, registry: &Registry) -> bool {
        match self.ctx.api.probe(&self.token).await {
            Ok(()) => true,
            Err(e) if e.is_account_gone() => {
                registry.remove_user(self.owner_id()).await;
                info!("user {} has been deleted", self.owner_id());
                false
            }
            Err(e) => {
                warn!("user {} probe failed, trying refresh: {}", self.owner_id(), e);
                self.refresh(registry).await
            }
        }
    }

    pub async fn setup_web_hook(&self) {
        if let Err(e) =
            subscription::setup_web_hook(&*self.ctx.api, &self.token, &self.ctx.profile).await
        {
            warn!("user {} setup_web_hook failed: {}", self.owner_id(), e);
        }
    }

    pub async fn renew_web_hooks(&mut self, registry: &Registry) {
        match subscription::renew_web_hooks(&*self.ctx.api, &self.token, &self.ctx.profile).await {
            Ok(()) => {
                self.last_renew_time = now_ms();
                registry.put_user(self.clone()).await;
            }
            Err(e) => warn!("user {} renew_web_hooks failed: {}", self.owner_id(), e),
        }
    }

    pub async fn renew_subscription(&self, id: &str) {
        if let Err(e) =
            subscription::renew_subscription(&*self.ctx.api, &self.token, &self.ctx.profile, id)
                .await
        {
            warn!("user {} renew_subscription failed: {}", self.owner_id(), e);
        }
    }

    pub async fn del_subscription(&self, id: &str) {
        debug!("deleting user {} subscription {}", self.owner_id(), id);
        if let Err(e) = self.ctx.api.delete_subscription(&self.token, id).await {
            warn!("user {} del_subscription failed: {}", self.owner_id(), e);
        }
    }

    /// Link a chat group to the bot that should relay into it. The first link
    /// ever added is the one-time trigger for this user's webhook
    /// subscription; later links reuse it.
    pub async fn add_group(&mut self, registry: &Registry, group_id: &str, bot_id: &str) {
        let had_no_group = self.groups.is_empty();
        self.groups.insert(group_id.to_string(), bot_id.to_string());
        registry.put_user(self.clone()).await;
        if had_no_group {
            self.setup_web_hook().await;
        }
    }

    /// Latest `count` voicemail records, used for cold-start reconciliation.
    pub async fn get_voice_mails(&self, count: u32) -> Result<Vec<VoicemailRecord>, ApiError> {
        self.ctx.api.list_voice_mails(&self.token, count).await
    }

    /// Incremental fetch. The default performs a full sync of the 10 most
    /// recent records; callers that persist `sync_info.sync_token` from the
    /// response can pass it back for an incremental sync instead.
    pub async fn sync_voice_mails(&self, params: SyncParams) -> Result<SyncResponse, ApiError> {
        self.ctx.api.sync_voice_mails(&self.token, &params).await
    }

    /// Fetch the latest voicemails, extract a summary for each, and relay the
    /// formatted notification to every linked group. A reader failure for one
    /// mail degrades to an empty summary rather than aborting the batch.
    pub async fn process_voice_mail(&self, registry: &Registry, count: u32) {
        let mails = match self.get_voice_mails(count).await {
            Ok(mails) => mails,
            Err(e) => {
                warn!("user {} voicemail fetch failed: {}", self.owner_id(), e);
                return;
            }
        };
        for mail in &mails {
            let summary = match registry.reader().read_mail(mail, &self.token).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!("user {} voicemail read failed: {:#}", self.owner_id(), e);
                    relay::MailSummary::default()
                }
            };
            let text = relay::format_notification(self.owner_id(), &summary);
            self.send_voice_mail_info(registry, &text).await;
        }
    }

    /// Post `text` into every linked group via its owning bot. A group whose
    /// bot has been evicted is skipped; the link is dead until that bot
    /// re-authorizes.
    pub async fn send_voice_mail_info(&self, registry: &Registry, text: &str) {
        for (group_id, bot_id) in &self.groups {
            match registry.bot(bot_id).await {
                Some(bot) => bot.send_message(group_id, text).await,
                None => {
                    debug!("bot {} for group {} not registered, skipping", bot_id, group_id)
                }
            }
        }
    }
}
