//! OAuth redirect endpoints and webhook intake.
//!
//! This is deliberately thin plumbing: handlers decode the request, look up
//! the entity, and hand off to its lifecycle/relay methods. Webhook handlers
//! always acknowledge with 200: the platform retries deliveries it considers
//! failed, and a malformed payload will not get better on retry.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::accounts::{Bot, User};
use crate::config::{
    Config, BOT_OAUTH_PATH, BOT_WEBHOOK_PATH, USER_OAUTH_PATH, USER_WEBHOOK_PATH,
};
use crate::store::Registry;

/// Header the platform sends on its subscription handshake; echoing it back
/// proves ownership of the delivery address.
const VALIDATION_TOKEN: &str = "validation-token";

pub struct Server {
    config: Config,
    registry: Arc<Registry>,
}

struct AppState {
    config: Config,
    registry: Arc<Registry>,
}

impl Server {
    pub fn new(config: Config, registry: Arc<Registry>) -> Self {
        Self { config, registry }
    }

    pub async fn run(&self) -> Result<()> {
        let state = Arc::new(AppState {
            config: self.config.clone(),
            registry: self.registry.clone(),
        });

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let app = Router::new()
            .route("/health", get(health))
            .route(BOT_OAUTH_PATH, get(bot_oauth))
            .route(USER_OAUTH_PATH, get(user_oauth))
            .route(BOT_WEBHOOK_PATH, post(bot_webhook))
            .route(USER_WEBHOOK_PATH, post(user_webhook))
            .layer(cors)
            .with_state(state);

        let addr: SocketAddr = format!("{}:{}", self.config.bind, self.config.port).parse()?;
        info!("listening on http://{}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct OauthQuery {
    code: Option<String>,
    state: Option<String>,
}

async fn bot_oauth(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OauthQuery>,
) -> Response {
    let Some(code) = query.code else {
        return (StatusCode::BAD_REQUEST, "missing code").into_response();
    };
    let ctx = state.registry.bot_context().clone();
    match Bot::authorize(ctx, &code, &state.config.bot_redirect_uri()).await {
        Some(mut bot) => {
            info!("bot {} authorized", bot.owner_id());
            state.registry.put_bot(bot.clone()).await;
            bot.renew_web_hooks(&state.registry).await;
            (StatusCode::OK, "bot connected").into_response()
        }
        None => (StatusCode::BAD_REQUEST, "authorization failed").into_response(),
    }
}

async fn user_oauth(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OauthQuery>,
) -> Response {
    let Some(code) = query.code else {
        return (StatusCode::BAD_REQUEST, "missing code").into_response();
    };
    // The group/bot pair the user is linking rides in the OAuth state.
    let Some((group_id, bot_id)) = query
        .state
        .as_deref()
        .and_then(|s| s.split_once(':'))
        .map(|(g, b)| (g.to_string(), b.to_string()))
    else {
        return (StatusCode::BAD_REQUEST, "missing or malformed state").into_response();
    };

    let ctx = state.registry.user_context().clone();
    match User::authorize(ctx, &code, &state.config.user_redirect_uri()).await {
        Some(fresh) => {
            // Re-authorization keeps the existing group links; only the
            // credential is replaced.
            let mut user = match state.registry.user(fresh.owner_id()).await {
                Some(mut existing) => {
                    existing.token = fresh.token;
                    existing
                }
                None => fresh,
            };
            info!("user {} linked group {} to bot {}", user.owner_id(), group_id, bot_id);
            user.add_group(&state.registry, &group_id, &bot_id).await;
            (StatusCode::OK, "voicemail alerts linked").into_response()
        }
        None => (StatusCode::BAD_REQUEST, "authorization failed").into_response(),
    }
}

/// Inbound webhook delivery payload. Only the routing fields are typed.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WebhookEnvelope {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub body: serde_json::Value,
}

fn validation_echo(headers: &HeaderMap) -> Option<Response> {
    headers.get(VALIDATION_TOKEN).map(|token| {
        let mut resp = StatusCode::OK.into_response();
        resp.headers_mut().insert(VALIDATION_TOKEN, token.clone());
        resp
    })
}

async fn bot_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(resp) = validation_echo(&headers) {
        return resp;
    }
    match serde_json::from_slice::<WebhookEnvelope>(&body) {
        Ok(envelope) => handle_bot_event(&state.registry, envelope).await,
        Err(e) => warn!("unparseable bot webhook payload: {}", e),
    }
    StatusCode::OK.into_response()
}

async fn user_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(resp) = validation_echo(&headers) {
        return resp;
    }
    match serde_json::from_slice::<WebhookEnvelope>(&body) {
        Ok(envelope) => handle_user_event(&state.registry, envelope).await,
        Err(e) => warn!("unparseable user webhook payload: {}", e),
    }
    StatusCode::OK.into_response()
}

pub(crate) async fn handle_bot_event(registry: &Registry, envelope: WebhookEnvelope) {
    let Some(owner_id) = envelope.owner_id.as_deref() else {
        debug!("bot event {} without owner id", envelope.event);
        return;
    };
    let Some(bot) = registry.bot(owner_id).await else {
        debug!("event for unregistered bot {}", owner_id);
        return;
    };
    if envelope.event.contains("/subscription") {
        if let Some(id) = envelope.subscription_id.as_deref() {
            bot.renew_subscription(id).await;
        }
    } else {
        // Chat post/group events keep the subscription alive but carry no
        // relay work; command parsing happens elsewhere.
        debug!("ignoring bot chat event {}", envelope.event);
    }
}

pub(crate) async fn handle_user_event(registry: &Registry, envelope: WebhookEnvelope) {
    let Some(owner_id) = envelope.owner_id.as_deref() else {
        debug!("user event {} without owner id", envelope.event);
        return;
    };
    let Some(user) = registry.user(owner_id).await else {
        debug!("event for unregistered user {}", owner_id);
        return;
    };
    if envelope.event.contains("message-store") {
        let count = new_mail_count(&envelope.body);
        user.process_voice_mail(registry, count).await;
    } else if envelope.event.contains("/subscription") {
        if let Some(id) = envelope.subscription_id.as_deref() {
            user.renew_subscription(id).await;
        }
    } else {
        debug!("unhandled user event {}", envelope.event);
    }
}

/// Number of new voicemails announced by a message-store event body,
/// defaulting to 10 when the body does not say.
fn new_mail_count(body: &serde_json::Value) -> u32 {
    let total: u64 = body["changes"]
        .as_array()
        .map(|changes| {
            changes
                .iter()
                .filter(|c| c["type"] == "VoiceMail")
                .filter_map(|c| c["newCount"].as_u64())
                .sum()
        })
        .unwrap_or(0);
    if total == 0 {
        10
    } else {
        total as u32
    }
}
