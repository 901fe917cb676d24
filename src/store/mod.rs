//! In-memory account registry and its persistence machinery.
//!
//! The registry is the one shared resource in the process: the startup
//! reconciliation pass, the webhook handlers and the renewal sweep all read
//! and write it. Entities are cloned out under a short read lock and written
//! back under a short write lock; no lock is ever held across a remote call,
//! so interleavings between logical tasks are possible and accepted (see the
//! subscription module on the duplicate-subscription race).

pub mod persist;
pub mod snapshot;

pub use snapshot::{FileSnapshotStore, RawSnapshot, Snapshot, SnapshotStore};

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use tracing::warn;

use crate::accounts::{now_ms, Bot, KindContext, User};
use crate::relay::VoicemailReader;
use snapshot::{BotRecord, UserRecord};

/// Published on every registry mutation; the persistence reactor coalesces
/// these into snapshot writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    BotStored { owner_id: String },
    BotEvicted { owner_id: String },
    UserStored { owner_id: String },
    UserEvicted { owner_id: String },
    Hydrated,
}

#[derive(Default)]
struct Inner {
    last_init_time: i64,
    bots: HashMap<String, Bot>,
    users: HashMap<String, User>,
    /// Unknown top-level snapshot fields, carried through load -> save.
    extra: Map<String, Value>,
}

pub struct Registry {
    inner: RwLock<Inner>,
    events: UnboundedSender<RegistryEvent>,
    bot_ctx: KindContext,
    user_ctx: KindContext,
    reader: Arc<dyn VoicemailReader>,
}

impl Registry {
    pub fn new(
        bot_ctx: KindContext,
        user_ctx: KindContext,
        reader: Arc<dyn VoicemailReader>,
    ) -> (Arc<Self>, UnboundedReceiver<RegistryEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let registry = Arc::new(Self {
            inner: RwLock::new(Inner::default()),
            events,
            bot_ctx,
            user_ctx,
            reader,
        });
        (registry, rx)
    }

    pub fn bot_context(&self) -> &KindContext {
        &self.bot_ctx
    }

    pub fn user_context(&self) -> &KindContext {
        &self.user_ctx
    }

    pub fn reader(&self) -> &dyn VoicemailReader {
        self.reader.as_ref()
    }

    /// Build typed entities from a loaded snapshot. A record whose credential
    /// does not deserialize is logged and dropped; the rest of the load
    /// proceeds. Entities are keyed by their credential's owner id.
    pub async fn hydrate(&self, raw: RawSnapshot) {
        let mut inner = self.inner.write().await;
        inner.last_init_time = now_ms();
        inner.extra = raw.extra;

        for (key, value) in raw.bots {
            match serde_json::from_value::<BotRecord>(value) {
                Ok(record) => {
                    let owner_id = record.token.owner_id.clone();
                    if owner_id != key {
                        warn!("bot record key {} does not match owner id {}", key, owner_id);
                    }
                    inner.bots.insert(owner_id, Bot::hydrate(record, self.bot_ctx.clone()));
                }
                Err(e) => warn!("dropping malformed bot record {}: {}", key, e),
            }
        }
        for (key, value) in raw.users {
            match serde_json::from_value::<UserRecord>(value) {
                Ok(record) => {
                    let owner_id = record.token.owner_id.clone();
                    if owner_id != key {
                        warn!("user record key {} does not match owner id {}", key, owner_id);
                    }
                    inner
                        .users
                        .insert(owner_id, User::hydrate(record, self.user_ctx.clone()));
                }
                Err(e) => warn!("dropping malformed user record {}: {}", key, e),
            }
        }
        drop(inner);
        // The refreshed lastInitTime should land durably even if nothing else
        // changes before the first mutation.
        self.emit(RegistryEvent::Hydrated);
    }

    /// The whole registry as one snapshot document.
    pub async fn dehydrate(&self) -> Snapshot {
        let inner = self.inner.read().await;
        Snapshot {
            last_init_time: inner.last_init_time,
            bots: inner
                .bots
                .iter()
                .map(|(id, bot)| (id.clone(), bot.record()))
                .collect(),
            users: inner
                .users
                .iter()
                .map(|(id, user)| (id.clone(), user.record()))
                .collect(),
            extra: inner.extra.clone(),
        }
    }

    pub async fn bot(&self, id: &str) -> Option<Bot> {
        self.inner.read().await.bots.get(id).cloned()
    }

    pub async fn user(&self, id: &str) -> Option<User> {
        self.inner.read().await.users.get(id).cloned()
    }

    pub async fn bot_ids(&self) -> Vec<String> {
        self.inner.read().await.bots.keys().cloned().collect()
    }

    pub async fn user_ids(&self) -> Vec<String> {
        self.inner.read().await.users.keys().cloned().collect()
    }

    pub async fn put_bot(&self, bot: Bot) {
        let owner_id = bot.owner_id().to_string();
        self.inner.write().await.bots.insert(owner_id.clone(), bot);
        self.emit(RegistryEvent::BotStored { owner_id });
    }

    pub async fn put_user(&self, user: User) {
        let owner_id = user.owner_id().to_string();
        self.inner.write().await.users.insert(owner_id.clone(), user);
        self.emit(RegistryEvent::UserStored { owner_id });
    }

    /// Eviction: besides administrative deletion, this is the only way an
    /// entity leaves the registry.
    pub async fn remove_bot(&self, id: &str) -> bool {
        let removed = self.inner.write().await.bots.remove(id).is_some();
        if removed {
            self.emit(RegistryEvent::BotEvicted {
                owner_id: id.to_string(),
            });
        }
        removed
    }

    pub async fn remove_user(&self, id: &str) -> bool {
        let removed = self.inner.write().await.users.remove(id).is_some();
        if removed {
            self.emit(RegistryEvent::UserEvicted {
                owner_id: id.to_string(),
            });
        }
        removed
    }

    fn emit(&self, event: RegistryEvent) {
        // The reactor owning the receiver may already be gone during
        // shutdown; a dropped event only costs a snapshot write.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::harness;

    fn raw(value: serde_json::Value) -> RawSnapshot {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn hydration_keys_entities_by_owner_id() {
        let mut h = harness();
        h.registry
            .hydrate(raw(serde_json::json!({
                "lastInitTime": 1,
                "bots": {
                    "b1": { "token": { "owner_id": "b1", "access_token": "a", "refresh_token": "r" } },
                },
                "users": {
                    "u1": {
                        "token": { "owner_id": "u1", "access_token": "a", "refresh_token": "r" },
                        "groups": { "g1": "b1" },
                    },
                },
            })))
            .await;

        let bot = h.registry.bot("b1").await.unwrap();
        assert_eq!(bot.owner_id(), "b1");
        let user = h.registry.user("u1").await.unwrap();
        assert_eq!(user.owner_id(), "u1");
        assert_eq!(user.groups["g1"], "b1");
        assert_eq!(h.events.recv().await, Some(RegistryEvent::Hydrated));
    }

    #[tokio::test]
    async fn malformed_record_is_dropped_without_failing_the_load() {
        let h = harness();
        h.registry
            .hydrate(raw(serde_json::json!({
                "bots": {
                    "broken": { "lastRenewTime": 3 },
                    "b2": { "token": { "owner_id": "b2", "access_token": "a", "refresh_token": "r" } },
                },
            })))
            .await;

        assert!(h.registry.bot("broken").await.is_none());
        assert!(h.registry.bot("b2").await.is_some());
    }

    #[tokio::test]
    async fn unknown_fields_survive_a_load_save_round_trip() {
        let h = harness();
        h.registry
            .hydrate(raw(serde_json::json!({
                "caches": { "x": 1 },
                "users": {
                    "u1": {
                        "token": { "owner_id": "u1", "access_token": "a", "refresh_token": "r" },
                        "legacyField": true,
                    },
                },
            })))
            .await;

        let snapshot = h.registry.dehydrate().await;
        assert_eq!(snapshot.extra["caches"]["x"], 1);
        assert_eq!(snapshot.users["u1"].extra["legacyField"], true);
        assert!(snapshot.last_init_time > 0);
    }

    #[tokio::test]
    async fn mutations_publish_events() {
        let mut h = harness();
        h.registry
            .hydrate(raw(serde_json::json!({
                "bots": {
                    "b1": { "token": { "owner_id": "b1", "access_token": "a", "refresh_token": "r" } },
                },
            })))
            .await;
        assert_eq!(h.events.recv().await, Some(RegistryEvent::Hydrated));

        assert!(h.registry.remove_bot("b1").await);
        assert_eq!(
            h.events.recv().await,
            Some(RegistryEvent::BotEvicted {
                owner_id: "b1".to_string()
            })
        );
        // Removing an absent entity is a no-op and publishes nothing.
        assert!(!h.registry.remove_bot("b1").await);
        assert!(h.events.try_recv().is_err());
    }
}
