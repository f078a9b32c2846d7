//! Quill Entitlements service entry point.

use std::sync::Arc;
use std::time::Duration;

use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use quill_entitlements::adapters::apple::{AppleReceiptVerifier, JwsNotificationVerifier};
use quill_entitlements::adapters::google::{GooglePlayVerifier, ServiceAccountTokenProvider};
use quill_entitlements::adapters::http::billing::{billing_router, BillingAppState};
use quill_entitlements::adapters::postgres::{PostgresEntitlementStore, PostgresTrialLedgerStore};
use quill_entitlements::adapters::stripe::StripeWebhookVerifier;
use quill_entitlements::application::TrialLedgerService;
use quill_entitlements::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.server.log_level))
        .init();

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let token_provider = Arc::new(ServiceAccountTokenProvider::new(&config.google));

    let state = BillingAppState {
        entitlement_store: Arc::new(PostgresEntitlementStore::new(pool.clone())),
        trial_ledger: Arc::new(TrialLedgerService::new(
            Arc::new(PostgresTrialLedgerStore::new(pool)),
            config.trial.email_hash_salt.clone(),
        )),
        apple_verifier: Arc::new(AppleReceiptVerifier::new(&config.apple)),
        google_verifier: Arc::new(GooglePlayVerifier::new(&config.google, token_provider)),
        apple_notification_verifier: Arc::new(JwsNotificationVerifier::new(&config.apple)?),
        stripe_webhook_verifier: Arc::new(
            StripeWebhookVerifier::new(config.stripe.webhook_secret.clone())
                .with_require_livemode(config.stripe.require_livemode && config.is_production()),
        ),
    };

    let addr = config.server.socket_addr();
    let app = billing_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(%addr, "quill-entitlements listening");
    axum::serve(listener, app).await?;

    Ok(())
}
