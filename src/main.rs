use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use voicemail_relay::accounts::KindContext;
use voicemail_relay::config::{Config, SNAPSHOT_DEBOUNCE, STALE_AFTER, SWEEP_INTERVAL};
use voicemail_relay::platform::HttpPlatformApi;
use voicemail_relay::relay::MetadataReader;
use voicemail_relay::renewal::{self, RenewalRunner};
use voicemail_relay::server::Server;
use voicemail_relay::store::{persist, FileSnapshotStore, RawSnapshot, Registry, SnapshotStore};

#[derive(Parser)]
#[command(name = "voicemail-relay", version, about = "Relay voicemail notifications into team chat groups")]
struct Cli {
    /// Remote REST API base URL
    #[arg(long, env = "RELAY_API_SERVER")]
    api_server: String,

    /// Public base URL of this process (webhook delivery + OAuth redirects)
    #[arg(long, env = "RELAY_PUBLIC_SERVER")]
    public_server: String,

    #[arg(long, env = "RELAY_BOT_CLIENT_ID")]
    bot_client_id: String,

    #[arg(long, env = "RELAY_BOT_CLIENT_SECRET", hide_env_values = true)]
    bot_client_secret: String,

    #[arg(long, env = "RELAY_USER_CLIENT_ID")]
    user_client_id: String,

    #[arg(long, env = "RELAY_USER_CLIENT_SECRET", hide_env_values = true)]
    user_client_secret: String,

    /// Path of the snapshot document
    #[arg(long, env = "RELAY_SNAPSHOT_FILE", default_value = "snapshot.json")]
    snapshot_file: PathBuf,

    #[arg(long, env = "RELAY_BIND", default_value = "0.0.0.0")]
    bind: String,

    #[arg(long, env = "RELAY_PORT", default_value_t = 8080)]
    port: u16,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config = Config {
        api_base: cli.api_server,
        public_base: cli.public_server,
        bot_client_id: cli.bot_client_id,
        bot_client_secret: cli.bot_client_secret,
        user_client_id: cli.user_client_id,
        user_client_secret: cli.user_client_secret,
        snapshot_file: cli.snapshot_file,
        bind: cli.bind,
        port: cli.port,
    };

    let store: Arc<dyn SnapshotStore> = Arc::new(FileSnapshotStore::new(&config.snapshot_file));
    let bot_api = Arc::new(HttpPlatformApi::new(
        &config.api_base,
        &config.bot_client_id,
        &config.bot_client_secret,
    ));
    let user_api = Arc::new(HttpPlatformApi::new(
        &config.api_base,
        &config.user_client_id,
        &config.user_client_secret,
    ));

    let (registry, events) = Registry::new(
        KindContext::new(bot_api, config.bot_profile()),
        KindContext::new(user_api, config.user_profile()),
        Arc::new(MetadataReader),
    );

    // A missing or unreadable snapshot means a fresh deployment; the next
    // successful write recreates it.
    let snapshot = match store.load().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!("snapshot load failed, starting empty: {:#}", e);
            RawSnapshot::default()
        }
    };
    registry.hydrate(snapshot).await;
    persist::spawn(registry.clone(), store, events, SNAPSHOT_DEBOUNCE);

    info!("reconciling accounts loaded from snapshot");
    renewal::reconcile_stale(&registry, STALE_AFTER).await;

    let runner = RenewalRunner::new(registry.clone(), SWEEP_INTERVAL, STALE_AFTER);
    tokio::spawn(async move { runner.run().await });

    Server::new(config, registry).run().await
}
