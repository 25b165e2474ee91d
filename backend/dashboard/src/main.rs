//! Event approval dashboard — entry point.
//!
//! Serves the dashboard's REST API over the approval and budget ledgers,
//! and runs a background task that follows wallet account changes.

mod api;
mod approval;
mod chain;
mod config;
mod errors;
mod ledger;
mod models;
mod repository;
mod roles;
mod rpc;
mod session;

#[cfg(test)]
mod memory;
#[cfg(test)]
mod test_api;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use approval::{ApprovalService, BudgetAdapter};
use config::Config;
use ledger::{AccountProvider, ApprovalLedger};
use repository::EventRepository;
use roles::RoleResolver;
use rpc::{ApprovalContract, BudgetContract, RpcClient, RpcWallet};
use session::WalletSession;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
    let chain = Arc::new(config.chain.clone());
    info!(
        "Approval chain: {}",
        chain
            .stages()
            .iter()
            .map(|r| r.label.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    );

    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let rpc = RpcClient::new(
        client,
        config.rpc_url.clone(),
        config.rpc_max_retries,
        config.confirm_timeout(),
        config.confirm_poll(),
    );

    let approval_ledger: Arc<dyn ApprovalLedger> =
        Arc::new(ApprovalContract::new(rpc.clone(), config.approval_contract.clone()));
    let budget = config
        .budget_contract
        .clone()
        .map(|contract| BudgetAdapter::new(Arc::new(BudgetContract::new(rpc.clone(), contract))));
    let wallet: Arc<dyn AccountProvider> = Arc::new(RpcWallet::new(rpc));

    // ─── Wallet session ───────────────────────────────────
    let session = Arc::new(WalletSession::new(Some(wallet)));
    match session.restore().await {
        Ok(Some(account)) => info!("Restored wallet account {account}"),
        Ok(None) => info!("No wallet account authorised yet; waiting for connect"),
        Err(e) => warn!("Could not restore wallet session: {e}"),
    }
    tokio::spawn(session::watch_accounts(
        session.clone(),
        Duration::from_secs(config.account_poll_secs),
    ));
    let resolver = RoleResolver::new(approval_ledger.clone(), chain.clone());
    tokio::spawn(session::log_role_changes(session.subscribe(), resolver.clone()));

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState {
        session,
        resolver,
        events: EventRepository::new(
            approval_ledger.clone(),
            chain.clone(),
            config.default_department.clone(),
        ),
        approvals: ApprovalService::new(approval_ledger, budget, chain.clone()),
        chain,
    });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/session", get(api::get_session))
        .route("/session/connect", post(api::connect))
        .route("/chain", get(api::get_chain))
        .route("/events", get(api::list_events).post(api::create_event))
        .route("/events/:id", get(api::get_event))
        .route("/events/:id/approve", post(api::approve_event))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
