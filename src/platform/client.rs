use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::json;
use tracing::debug;

use super::error::ApiError;
use super::types::{
    Credential, DeliveryMode, SubscriptionInfo, SubscriptionList, SyncParams, SyncResponse,
    SyncType, VoicemailRecord,
};
use super::PlatformApi;

/// REST client for the remote chat/voicemail platform.
///
/// One instance exists per account kind, carrying that kind's OAuth client
/// id/secret. Tokens are not stored here; every call takes the credential of
/// the account it acts for.
#[derive(Clone)]
pub struct HttpPlatformApi {
    client: Client,
    api_base: String,
    client_id: String,
    client_secret: String,
}

impl HttpPlatformApi {
    pub fn new(api_base: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn bearer(&self, builder: RequestBuilder, token: &Credential) -> RequestBuilder {
        builder.bearer_auth(&token.access_token)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<Credential, ApiError> {
        let resp = self
            .client
            .post(self.url("/restapi/oauth/token"))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await?;
        let resp = check(resp).await?;
        Ok(resp.json::<Credential>().await?)
    }
}

/// Turn a non-success response into `ApiError::Status`, extracting the remote
/// `errorCode` when the body is the platform's JSON error shape.
async fn check(resp: Response) -> Result<Response, ApiError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let message = resp.text().await.unwrap_or_default();
    let code = serde_json::from_str::<serde_json::Value>(&message)
        .ok()
        .and_then(|v| v["errorCode"].as_str().map(String::from));
    Err(ApiError::Status {
        status,
        code,
        message,
    })
}

#[async_trait]
impl PlatformApi for HttpPlatformApi {
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<Credential, ApiError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    async fn refresh(&self, current: &Credential) -> Result<Credential, ApiError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", &current.refresh_token),
        ])
        .await
    }

    async fn probe(&self, token: &Credential) -> Result<(), ApiError> {
        let resp = self
            .bearer(
                self.client
                    .get(self.url("/restapi/v1.0/account/~/extension/~")),
                token,
            )
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn list_subscriptions(
        &self,
        token: &Credential,
    ) -> Result<Vec<SubscriptionInfo>, ApiError> {
        let resp = self
            .bearer(self.client.get(self.url("/restapi/v1.0/subscription")), token)
            .send()
            .await?;
        let resp = check(resp).await?;
        Ok(resp.json::<SubscriptionList>().await?.records)
    }

    async fn create_subscription(
        &self,
        token: &Credential,
        event_filters: &[String],
        delivery: DeliveryMode,
        expires_in: i64,
    ) -> Result<SubscriptionInfo, ApiError> {
        let body = json!({
            "eventFilters": event_filters,
            "expiresIn": expires_in,
            "deliveryMode": delivery,
        });
        let resp = self
            .bearer(self.client.post(self.url("/restapi/v1.0/subscription")), token)
            .json(&body)
            .send()
            .await?;
        let resp = check(resp).await?;
        Ok(resp.json::<SubscriptionInfo>().await?)
    }

    async fn delete_subscription(&self, token: &Credential, id: &str) -> Result<(), ApiError> {
        debug!("deleting subscription {}", id);
        let resp = self
            .bearer(
                self.client
                    .delete(self.url(&format!("/restapi/v1.0/subscription/{id}"))),
                token,
            )
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn list_voice_mails(
        &self,
        token: &Credential,
        count: u32,
    ) -> Result<Vec<VoicemailRecord>, ApiError> {
        let per_page = count.to_string();
        let resp = self
            .bearer(
                self.client
                    .get(self.url("/restapi/v1.0/account/~/extension/~/message-store"))
                    .query(&[
                        ("messageType", "VoiceMail"),
                        ("perPage", per_page.as_str()),
                    ]),
                token,
            )
            .send()
            .await?;
        let resp = check(resp).await?;
        Ok(resp.json::<MessagePage>().await?.records)
    }

    async fn sync_voice_mails(
        &self,
        token: &Credential,
        params: &SyncParams,
    ) -> Result<SyncResponse, ApiError> {
        let mut query: Vec<(&str, String)> = vec![
            ("messageType", "VoiceMail".to_string()),
            ("recordCount", params.record_count.to_string()),
        ];
        match params.sync_type {
            SyncType::FSync => query.push(("syncType", "FSync".to_string())),
            SyncType::ISync => {
                query.push(("syncType", "ISync".to_string()));
                if let Some(ref sync_token) = params.sync_token {
                    query.push(("syncToken", sync_token.clone()));
                }
            }
        }
        let resp = self
            .bearer(
                self.client
                    .get(self.url("/restapi/v1.0/account/~/extension/~/message-sync"))
                    .query(&query),
                token,
            )
            .send()
            .await?;
        let resp = check(resp).await?;
        Ok(resp.json::<SyncResponse>().await?)
    }

    async fn post_group_message(
        &self,
        token: &Credential,
        group_id: &str,
        text: &str,
    ) -> Result<(), ApiError> {
        let resp = self
            .bearer(
                self.client
                    .post(self.url(&format!("/restapi/v1.0/glip/groups/{group_id}/posts"))),
                token,
            )
            .json(&json!({ "text": text }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

/// Message-store list pages use the same `{ "records": [...] }` envelope.
#[derive(serde::Deserialize)]
struct MessagePage {
    #[serde(default)]
    records: Vec<VoicemailRecord>,
}
