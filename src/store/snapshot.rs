//! The durable snapshot: one JSON document holding the entire registry.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::platform::Credential;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotRecord {
    pub token: Credential,
    #[serde(default)]
    pub last_renew_time: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub token: Credential,
    #[serde(default)]
    pub last_renew_time: i64,
    /// Which bot relays this user's voicemail alerts into which chat group.
    #[serde(default)]
    pub groups: HashMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The write-side document, produced wholesale by `Registry::dehydrate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub last_init_time: i64,
    pub bots: HashMap<String, BotRecord>,
    pub users: HashMap<String, UserRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The load-side twin of [`Snapshot`]. Records stay untyped here so that one
/// malformed record is dropped during hydration instead of failing the whole
/// load.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSnapshot {
    #[serde(default)]
    pub last_init_time: i64,
    #[serde(default)]
    pub bots: HashMap<String, Value>,
    #[serde(default)]
    pub users: HashMap<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Durable blob holding the snapshot. Callers treat failures as advisory:
/// in-memory state stays authoritative until the next successful write.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self) -> Result<RawSnapshot>;
    async fn save(&self, snapshot: &Snapshot) -> Result<()>;
}

/// JSON-file snapshot store.
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self) -> Result<RawSnapshot> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("reading snapshot {}", self.path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing snapshot {}", self.path.display()))
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::write(&self.path, bytes)
            .await
            .with_context(|| format!("writing snapshot {}", self.path.display()))
    }
}
