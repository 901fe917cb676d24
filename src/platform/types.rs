use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// OAuth-style token bundle identifying an authorized account.
///
/// `owner_id` is the stable primary key for both Bot and User entities.
/// Fields the token endpoint returns beyond the ones modelled here (scope,
/// endpoint ids, ...) are preserved verbatim so a snapshot written by a newer
/// build survives a round trip through this one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Credential {
    pub owner_id: String,
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A remote webhook subscription resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInfo {
    pub id: String,
    #[serde(default)]
    pub event_filters: Vec<String>,
    pub delivery_mode: DeliveryMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
}

impl SubscriptionInfo {
    pub fn delivery_address(&self) -> &str {
        &self.delivery_mode.address
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryMode {
    pub transport_type: String,
    pub address: String,
}

impl DeliveryMode {
    pub fn webhook(address: impl Into<String>) -> Self {
        Self {
            transport_type: "WebHook".to_string(),
            address: address.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionList {
    #[serde(default)]
    pub records: Vec<SubscriptionInfo>,
}

/// One voicemail record from the message store. Only the fields the relay
/// formats are typed; the rest ride along untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoicemailRecord {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<CallerInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_duration: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncType {
    FSync,
    ISync,
}

/// Parameters for the incremental message-sync endpoint. The default is a
/// full sync of the 10 most recent records; callers that keep the returned
/// sync token can switch to `ISync` for incremental fetches.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncParams {
    pub record_count: u32,
    pub sync_type: SyncType,
    pub sync_token: Option<String>,
}

impl Default for SyncParams {
    fn default() -> Self {
        Self {
            record_count: 10,
            sync_type: SyncType::FSync,
            sync_token: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    #[serde(default)]
    pub records: Vec<VoicemailRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_info: Option<SyncInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfo {
    pub sync_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_type: Option<SyncType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_time: Option<String>,
}
