//! Stateful in-memory `PlatformApi` double and registry harness shared by the
//! unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::accounts::subscription::SubscriptionProfile;
use crate::accounts::{Bot, KindContext, User};
use crate::relay::{MetadataReader, VoicemailReader};
use crate::store::snapshot::{BotRecord, UserRecord};
use crate::store::{Registry, RegistryEvent};

use super::error::ApiError;
use super::types::{
    Credential, DeliveryMode, SubscriptionInfo, SyncInfo, SyncParams, SyncResponse,
    VoicemailRecord,
};
use super::PlatformApi;

pub(crate) fn credential(owner_id: &str) -> Credential {
    Credential {
        owner_id: owner_id.to_string(),
        access_token: format!("at-{owner_id}"),
        refresh_token: format!("rt-{owner_id}"),
        expires_in: Some(3600),
        extra: serde_json::Map::new(),
    }
}

fn status_error(code: &str) -> ApiError {
    ApiError::Status {
        status: 400,
        code: Some(code.to_string()),
        message: format!("{{\"errorCode\":\"{code}\"}}"),
    }
}

#[derive(Default)]
pub(crate) struct FakeState {
    next_sub_id: u32,
    refresh_serial: u32,
    /// Live remote subscriptions, mutated by create/delete.
    pub subs: Vec<SubscriptionInfo>,
    /// Error code the probe endpoint should fail with, if any.
    pub probe_error_code: Option<String>,
    pub refresh_fails: bool,
    pub list_fails: bool,
    pub create_fails: bool,
    /// Subscription ids whose delete call should fail.
    pub failing_deletes: Vec<String>,
    pub voicemails: Vec<VoicemailRecord>,
    pub list_mail_calls: u32,
    pub refresh_calls: u32,
    pub setup_calls: u32,
    pub deleted: Vec<String>,
    pub posted: Vec<(String, String)>,
    pub sync_requests: Vec<SyncParams>,
    /// Chronological record of subscription operations.
    pub op_log: Vec<String>,
}

#[derive(Default)]
pub(crate) struct FakeApi {
    pub state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Live subscriptions whose delivery address matches `address`.
    pub fn live_at(&self, address: &str) -> Vec<SubscriptionInfo> {
        self.with(|s| {
            s.subs
                .iter()
                .filter(|sub| sub.delivery_address() == address)
                .cloned()
                .collect()
        })
    }
}

#[async_trait]
impl PlatformApi for FakeApi {
    async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> Result<Credential, ApiError> {
        if code == "bad-code" {
            return Err(status_error("OAU-250"));
        }
        Ok(credential(&format!("owner-{code}")))
    }

    async fn refresh(&self, current: &Credential) -> Result<Credential, ApiError> {
        self.with(|s| {
            s.refresh_calls += 1;
            if s.refresh_fails {
                return Err(status_error("OAU-213"));
            }
            s.refresh_serial += 1;
            let mut fresh = credential(&current.owner_id);
            fresh.access_token = format!("at-{}-{}", current.owner_id, s.refresh_serial);
            Ok(fresh)
        })
    }

    async fn probe(&self, _token: &Credential) -> Result<(), ApiError> {
        self.with(|s| match &s.probe_error_code {
            Some(code) => Err(status_error(code)),
            None => Ok(()),
        })
    }

    async fn list_subscriptions(
        &self,
        _token: &Credential,
    ) -> Result<Vec<SubscriptionInfo>, ApiError> {
        self.with(|s| {
            s.op_log.push("list".to_string());
            if s.list_fails {
                return Err(status_error("CMN-301"));
            }
            Ok(s.subs.clone())
        })
    }

    async fn create_subscription(
        &self,
        _token: &Credential,
        event_filters: &[String],
        delivery: DeliveryMode,
        expires_in: i64,
    ) -> Result<SubscriptionInfo, ApiError> {
        self.with(|s| {
            s.op_log.push(format!("create:{}", delivery.address));
            if s.create_fails {
                return Err(status_error("SUB-406"));
            }
            s.next_sub_id += 1;
            s.setup_calls += 1;
            let sub = SubscriptionInfo {
                id: format!("sub-{}", s.next_sub_id),
                event_filters: event_filters.to_vec(),
                delivery_mode: delivery,
                expires_in: Some(expires_in),
            };
            s.subs.push(sub.clone());
            Ok(sub)
        })
    }

    async fn delete_subscription(&self, _token: &Credential, id: &str) -> Result<(), ApiError> {
        self.with(|s| {
            s.op_log.push(format!("delete:{id}"));
            if s.failing_deletes.iter().any(|f| f == id) {
                return Err(status_error("SUB-404"));
            }
            s.subs.retain(|sub| sub.id != id);
            s.deleted.push(id.to_string());
            Ok(())
        })
    }

    async fn list_voice_mails(
        &self,
        _token: &Credential,
        count: u32,
    ) -> Result<Vec<VoicemailRecord>, ApiError> {
        self.with(|s| {
            s.list_mail_calls += 1;
            Ok(s.voicemails.iter().take(count as usize).cloned().collect())
        })
    }

    async fn sync_voice_mails(
        &self,
        _token: &Credential,
        params: &SyncParams,
    ) -> Result<SyncResponse, ApiError> {
        self.with(|s| {
            s.sync_requests.push(params.clone());
            Ok(SyncResponse {
                records: s.voicemails.clone(),
                sync_info: Some(SyncInfo {
                    sync_token: "token-1".to_string(),
                    sync_type: Some(params.sync_type),
                    sync_time: None,
                }),
            })
        })
    }

    async fn post_group_message(
        &self,
        _token: &Credential,
        group_id: &str,
        text: &str,
    ) -> Result<(), ApiError> {
        self.with(|s| {
            s.posted.push((group_id.to_string(), text.to_string()));
            Ok(())
        })
    }
}

pub(crate) fn bot_profile() -> SubscriptionProfile {
    SubscriptionProfile {
        kind: "bot",
        delivery_address: "https://relay.example.com/bot-webhook".to_string(),
        event_filters: crate::config::bot_event_filters(),
        expires_in: crate::config::SUBSCRIPTION_EXPIRES_IN,
    }
}

pub(crate) fn user_profile() -> SubscriptionProfile {
    SubscriptionProfile {
        kind: "user",
        delivery_address: "https://relay.example.com/user-webhook".to_string(),
        event_filters: crate::config::user_event_filters(),
        expires_in: crate::config::SUBSCRIPTION_EXPIRES_IN,
    }
}

/// A registry wired to fake per-kind APIs, plus handles to poke their state.
pub(crate) struct TestHarness {
    pub registry: Arc<Registry>,
    pub bot_api: Arc<FakeApi>,
    pub user_api: Arc<FakeApi>,
    pub events: UnboundedReceiver<RegistryEvent>,
}

impl TestHarness {
    pub async fn with_bot(self, owner_id: &str) -> Self {
        let record = BotRecord {
            token: credential(owner_id),
            last_renew_time: 0,
            extra: serde_json::Map::new(),
        };
        let bot = Bot::hydrate(record, self.registry.bot_context().clone());
        self.registry.put_bot(bot).await;
        self
    }

    pub async fn with_user(self, owner_id: &str, groups: &[(&str, &str)]) -> Self {
        let record = UserRecord {
            token: credential(owner_id),
            last_renew_time: 0,
            groups: groups
                .iter()
                .map(|(g, b)| (g.to_string(), b.to_string()))
                .collect(),
            extra: serde_json::Map::new(),
        };
        let user = User::hydrate(record, self.registry.user_context().clone());
        self.registry.put_user(user).await;
        self
    }
}

pub(crate) fn harness() -> TestHarness {
    harness_with_reader(Arc::new(MetadataReader))
}

pub(crate) fn harness_with_reader(reader: Arc<dyn VoicemailReader>) -> TestHarness {
    let bot_api = Arc::new(FakeApi::new());
    let user_api = Arc::new(FakeApi::new());
    let (registry, events) = Registry::new(
        KindContext::new(bot_api.clone(), bot_profile()),
        KindContext::new(user_api.clone(), user_profile()),
        reader,
    );
    TestHarness {
        registry,
        bot_api,
        user_api,
        events,
    }
}
