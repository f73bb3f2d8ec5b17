use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use uuid::Uuid;

use grant_drain::clients::http::{
    HttpClientConfig, HttpCustodianClient, HttpIssuerClient, HttpPublisher, HttpReputationClient,
    HttpWalletService,
};
use grant_drain::config::Config;
use grant_drain::drain::{BatchSubmitter, DrainExecutor, MintExecutor, PollChecker, RetryArbiter};
use grant_drain::signing_worker::SigningWorker;
use grant_drain::suggestion_pipeline::SuggestionPipeline;
use grant_drain::{db, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting grant-drain service...");

    let config = Arc::new(Config::from_env()?);

    info!("Connecting to database...");
    let db = db::init_db(&config.database_url).await?;
    let ro_db = match &config.ro_database_url {
        Some(url) => db::init_ro_db(url).await?,
        None => db.clone(),
    };
    info!("Database connected and migrations applied");

    let issuer_base = std::env::var("ISSUER_SERVICE_URL")
        .unwrap_or_else(|_| "http://localhost:4000".to_string());
    let issuer_token = std::env::var("ISSUER_SERVICE_TOKEN").unwrap_or_default();
    let wallet_base = std::env::var("WALLET_SERVICE_URL")
        .unwrap_or_else(|_| "http://localhost:4001".to_string());
    let wallet_token = std::env::var("WALLET_SERVICE_TOKEN").unwrap_or_default();
    let reputation_base = std::env::var("REPUTATION_SERVICE_URL")
        .unwrap_or_else(|_| "http://localhost:4002".to_string());
    let reputation_token = std::env::var("REPUTATION_SERVICE_TOKEN").unwrap_or_default();
    let events_base =
        std::env::var("EVENTS_SERVICE_URL").unwrap_or_else(|_| "http://localhost:4003".to_string());
    let events_token = std::env::var("EVENTS_SERVICE_TOKEN").unwrap_or_default();

    let issuer_client = Arc::new(HttpIssuerClient::new(HttpClientConfig::new(
        issuer_base,
        issuer_token,
    )));
    let wallet_service = Arc::new(HttpWalletService::new(HttpClientConfig::new(
        wallet_base,
        wallet_token,
    )));
    let reputation = Arc::new(HttpReputationClient::new(HttpClientConfig::new(
        reputation_base,
        reputation_token,
    )));
    let publisher = Arc::new(HttpPublisher::new(HttpClientConfig::new(
        events_base,
        events_token,
    )));

    // Three custodian providers, matching the synchronous / batched / polled
    // transfer semantics described in SPEC_FULL.md §4.5.2.
    let provider_a_url =
        std::env::var("CUSTODIAN_A_URL").unwrap_or_else(|_| "http://localhost:4010".to_string());
    let provider_a_token = std::env::var("CUSTODIAN_A_TOKEN").unwrap_or_default();
    let provider_b_url =
        std::env::var("CUSTODIAN_B_URL").unwrap_or_else(|_| "http://localhost:4011".to_string());
    let provider_b_token = std::env::var("CUSTODIAN_B_TOKEN").unwrap_or_default();
    let provider_c_url =
        std::env::var("CUSTODIAN_C_URL").unwrap_or_else(|_| "http://localhost:4012".to_string());
    let provider_c_token = std::env::var("CUSTODIAN_C_TOKEN").unwrap_or_default();

    let custodian_a = Arc::new(HttpCustodianClient::synchronous(
        "provider-a",
        HttpClientConfig::new(provider_a_url, provider_a_token),
    ));
    let custodian_b = Arc::new(HttpCustodianClient::batched(
        "provider-b",
        HttpClientConfig::new(provider_b_url, provider_b_token),
    ));
    let custodian_c = Arc::new(HttpCustodianClient::polled(
        "provider-c",
        HttpClientConfig::new(provider_c_url, provider_c_token),
    ));

    let mut custodians: HashMap<String, Arc<dyn grant_drain::CustodianClient>> = HashMap::new();
    custodians.insert("provider-a".to_string(), custodian_a.clone());
    custodians.insert("provider-b".to_string(), custodian_b.clone());
    custodians.insert("provider-c".to_string(), custodian_c.clone());

    let state = Arc::new(AppState::new(
        db.clone(),
        ro_db,
        config.clone(),
        issuer_client.clone(),
        wallet_service.clone(),
        reputation.clone(),
        publisher.clone(),
        custodians.clone(),
    ));
    info!("App state initialized");

    let signing_worker =
        SigningWorker::new(db.clone(), issuer_client.clone(), state.metrics.clone());
    tokio::spawn(signing_worker.run(Duration::from_secs(2)));

    // A second, worker-owned `SuggestionPipeline` drives the background
    // redemption loop; `AppState::suggestion_pipeline` handles inbound
    // submissions. Both share the same pool and pause duration, only the
    // in-memory pause flag is per-instance, which is fine since only the
    // worker instance ever calls `tick`.
    let suggestion_worker = SuggestionPipeline::new(
        db.clone(),
        issuer_client,
        publisher,
        state.metrics.clone(),
        config.suggestion_pause,
    );
    tokio::spawn(suggestion_worker.run(Duration::from_secs(5)));

    let drain_executor = DrainExecutor::new(db.clone(), custodians.clone(), state.metrics.clone());
    tokio::spawn(drain_executor.run(Duration::from_secs(3)));

    let batch_submitter = BatchSubmitter::new(db.clone(), custodian_b, state.metrics.clone());
    tokio::spawn(batch_submitter.run(Duration::from_secs(30)));

    let poll_checker = PollChecker::new(
        db.clone(),
        custodian_c,
        config.poll_checker_staleness,
        state.metrics.clone(),
    );
    tokio::spawn(poll_checker.run(Duration::from_secs(60)));

    let mint_executor = MintExecutor::new(
        db.clone(),
        state.issuer_client.clone(),
        state.wallet_service.clone(),
        state.metrics.clone(),
    );
    tokio::spawn(mint_executor.run(Duration::from_secs(30)));

    let (attestation_tx, attestation_rx) = tokio::sync::mpsc::channel::<Uuid>(64);
    let retry_arbiter = RetryArbiter::new(db.clone(), state.metrics.clone());
    tokio::spawn(retry_arbiter.run(attestation_rx));
    // Held open so the channel stays alive for future wallet-attestation
    // producers; nothing publishes to it yet.
    std::mem::forget(attestation_tx);

    info!("Background workers spawned");

    let app = grant_drain::app(state).await;

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("grant-drain listening on port {}", config.port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
