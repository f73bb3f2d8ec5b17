pub mod claim_engine;
pub mod clients;
pub mod config;
pub mod db;
pub mod drain;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod issuer_registry;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod poll_query;
pub mod signing_worker;
pub mod suggestion_pipeline;

use axum::{
    routing::{get, patch, post},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use clients::{CustodianClient, IssuerClient, Publisher, ReputationClient, WalletService};
pub use db::Db;
pub use self::config::Config;
pub use observability::{Logger, MetricsCollector};

use claim_engine::ClaimEngine;
use drain::ingest::DrainIngest;
use drain::retry_arbiter::RetryArbiter;
use issuer_registry::IssuerRegistry;
use poll_query::PollQuery;
use suggestion_pipeline::SuggestionPipeline;

/// Application state shared across handlers.
///
/// Grounded in `control-plane`'s `AppState`: one shared clone held by every
/// handler, but the collaborator fields are now the external-service traits
/// (`clients::mod.rs`) and the domain engines rather than the teacher's
/// auth/subscription/webhook plumbing.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub ro_db: Db,
    pub config: Arc<Config>,
    pub metrics: MetricsCollector,
    pub rate_limiter: middleware::rate_limit::RateLimiter,

    pub issuer_client: Arc<dyn IssuerClient>,
    pub wallet_service: Arc<dyn WalletService>,
    pub reputation: Arc<dyn ReputationClient>,
    pub publisher: Arc<dyn Publisher>,
    pub custodians: HashMap<String, Arc<dyn CustodianClient>>,

    pub claim_engine: Arc<ClaimEngine>,
    pub issuer_registry: Arc<IssuerRegistry>,
    pub suggestion_pipeline: Arc<SuggestionPipeline>,
    pub drain_ingest: Arc<DrainIngest>,
    pub retry_arbiter: Arc<RetryArbiter>,
    pub poll_query: Arc<PollQuery>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Db,
        ro_db: Db,
        config: Arc<Config>,
        issuer_client: Arc<dyn IssuerClient>,
        wallet_service: Arc<dyn WalletService>,
        reputation: Arc<dyn ReputationClient>,
        publisher: Arc<dyn Publisher>,
        custodians: HashMap<String, Arc<dyn CustodianClient>>,
    ) -> Self {
        let metrics = MetricsCollector::new();

        let claim_engine = Arc::new(ClaimEngine::new(db.clone(), config.grant_activity_window, metrics.clone()));
        let issuer_registry = Arc::new(IssuerRegistry::new(db.clone(), issuer_client.clone()));
        let suggestion_pipeline = Arc::new(SuggestionPipeline::new(
            db.clone(),
            issuer_client.clone(),
            publisher.clone(),
            metrics.clone(),
            config.suggestion_pause,
        ));
        let drain_ingest = Arc::new(DrainIngest::new(
            db.clone(),
            wallet_service.clone(),
            reputation.clone(),
            config.withdrawal_limit_total,
        ));
        let retry_arbiter = Arc::new(RetryArbiter::new(db.clone(), metrics.clone()));
        let poll_query = Arc::new(PollQuery::new(db.clone()));

        Self {
            db,
            ro_db,
            config,
            metrics,
            rate_limiter: middleware::rate_limit::RateLimiter::new(60, 100),
            issuer_client,
            wallet_service,
            reputation,
            publisher,
            custodians,
            claim_engine,
            issuer_registry,
            suggestion_pipeline,
            drain_ingest,
            retry_arbiter,
            poll_query,
        }
    }
}

/// Build the API router.
pub async fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    let v1 = Router::new()
        .route(
            "/promotions",
            get(handlers::claims::get_available_promotions).post(handlers::claims::create_promotion),
        )
        .route(
            "/promotions/:promotion_id/claims/:wallet_id",
            post(handlers::claims::claim_promotion),
        )
        .route("/claims/:claim_id", get(handlers::claims::get_claim))
        .route(
            "/wallets/:wallet_id/claim-summary",
            get(handlers::claims::get_claim_summary),
        )
        .route("/suggestions", post(handlers::suggestions::suggest))
        .route("/wallets/:wallet_id/drain", post(handlers::drains::drain))
        .route(
            "/wallets/:wallet_id/drain/custodian",
            get(handlers::drains::get_custodian_drain_info),
        )
        .route(
            "/drain-batches/:batch_id",
            get(handlers::drains::get_drain_poll),
        )
        .route(
            "/wallets/:wallet_id/drain/erred",
            patch(handlers::drains::patch_drain_job_erred),
        )
        .route(
            "/claims/clobbered",
            post(handlers::drains::report_clobbered_claims),
        )
        .route(
            "/wallets/:wallet_id/bat-loss",
            post(handlers::drains::report_bat_loss),
        )
        .route(
            "/wallets/:wallet_id/bap-event",
            post(handlers::drains::report_bap_event),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::require_bearer_token))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/health/detail", get(health::health_detail))
        .with_state(state);

    Router::new()
        .nest("/v1", v1)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
