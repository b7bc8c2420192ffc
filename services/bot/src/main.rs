use anyhow::Context as _;
use reqwest::Client;
use tracing::{error, info};

use gatepass_bot::config::BotConfig;
use gatepass_bot::infra::credentials::Credentials;
use gatepass_bot::infra::firestore::FirestoreCodePool;
use gatepass_bot::infra::telegram::TelegramClient;
use gatepass_bot::router::build_router;
use gatepass_bot::usecase::engine::AllocationEngine;
use gatepass_bot::worker::Poller;
use gatepass_core::health::Heartbeat;
use gatepass_core::tracing::init_tracing;

/// Static bearer accepted by the Firestore emulator.
const EMULATOR_TOKEN: &str = "owner";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = BotConfig::from_env().context("failed to load configuration")?;

    let client = Client::builder()
        .timeout(config.request_timeout)
        .build()
        .context("failed to build HTTP client")?;

    let telegram = TelegramClient::new(
        client.clone(),
        &config.telegram_api_base,
        &config.telegram_bot_token,
        &config.command,
        config.poll_timeout,
        config.request_timeout,
    );

    let credentials = match (&config.service_account_json, config.firestore_emulator) {
        (_, true) => Credentials::Static(EMULATOR_TOKEN.to_owned()),
        (Some(json), false) => Credentials::service_account(client.clone(), json)?,
        (None, false) => anyhow::bail!("SERVICE_ACCOUNT_JSON is required"),
    };
    let store = FirestoreCodePool::new(
        client,
        &config.firestore_api_base,
        &config.firebase_project_id,
        &config.access_codes_collection,
        &config.assignments_collection,
        credentials,
    )?;

    let engine = AllocationEngine::new(
        config.engine_policy(),
        telegram.clone(),
        store,
        telegram.clone(),
    );

    let heartbeat = Heartbeat::new(config.heartbeat_stale_after());
    let addr = format!("0.0.0.0:{}", config.health_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let router = build_router(heartbeat.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "health server stopped");
        }
    });
    info!(
        %addr,
        groups = ?config.monitored_groups,
        command = %config.command,
        emulator = config.firestore_emulator,
        "gatepass bot starting"
    );

    let mut poller = Poller::new(telegram, engine, config.poll_error_delay, heartbeat);
    poller.run().await;
    Ok(())
}
