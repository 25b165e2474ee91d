//! Axum REST API handlers — the dashboard's backend.
//!
//! Every handler starts from a fresh [`SessionContext`] and fresh ledger
//! reads; nothing is cached between requests.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use tracing::warn;

use crate::approval::machine::ChainProgress;
use crate::approval::{chain_progress, decide, ApprovalOutcome, ApprovalService, Decision};
use crate::chain::{Role, RoleChain};
use crate::errors::{DashboardError, Result};
use crate::models::{short_account, Event, EventSummary, NewEventForm, TxReceipt};
use crate::repository::EventRepository;
use crate::roles::{ResolvedRole, RoleResolver};
use crate::session::{SessionContext, WalletSession};

pub struct ApiState {
    pub session: Arc<WalletSession>,
    pub resolver: RoleResolver,
    pub events: EventRepository,
    pub approvals: ApprovalService,
    pub chain: Arc<RoleChain>,
}

impl ApiState {
    async fn context(&self) -> SessionContext {
        SessionContext::load(&self.session, &self.resolver).await
    }
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub account: Option<String>,
    pub account_short: Option<String>,
    pub role: ResolvedRole,
    pub role_label: String,
}

#[derive(Debug, Serialize)]
pub struct ChainResponse {
    pub stages: Vec<Role>,
}

#[derive(Debug, Serialize)]
pub struct DashboardEntry {
    #[serde(flatten)]
    pub event: EventSummary,
    pub progress: String,
    /// The viewer holds an approving role and the event is still open.
    pub can_review: bool,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub count: usize,
    pub events: Vec<DashboardEntry>,
}

#[derive(Debug, Serialize)]
pub struct EventDetailResponse {
    pub event: Event,
    pub progress: ChainProgress,
    #[serde(flatten)]
    pub decision: Decision,
    pub can_approve: bool,
    pub notice: Option<String>,
    pub approval_pending: bool,
    /// Only present for a viewer whose stage carries budget authority.
    pub department_balance: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub receipt: TxReceipt,
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub outcome: ApprovalOutcome,
    /// The re-read event; absent if the refresh itself failed.
    pub event: Option<Event>,
    pub progress: Option<ChainProgress>,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /session`
pub async fn get_session(State(state): State<Arc<ApiState>>) -> Json<SessionResponse> {
    Json(session_response(state.context().await))
}

/// `POST /session/connect`
pub async fn connect(State(state): State<Arc<ApiState>>) -> Result<Json<SessionResponse>> {
    state.session.connect().await?;
    Ok(Json(session_response(state.context().await)))
}

fn session_response(ctx: SessionContext) -> SessionResponse {
    SessionResponse {
        account_short: ctx.account.as_deref().map(short_account),
        role_label: ctx.role.label().to_string(),
        account: ctx.account,
        role: ctx.role,
    }
}

/// `GET /chain`
pub async fn get_chain(State(state): State<Arc<ApiState>>) -> Json<ChainResponse> {
    Json(ChainResponse {
        stages: state.chain.stages().to_vec(),
    })
}

/// `GET /events`
pub async fn list_events(State(state): State<Arc<ApiState>>) -> Result<Json<DashboardResponse>> {
    let ctx = state.context().await;
    let is_approver = ctx.role.approver().is_some();
    let total = state.chain.len();

    let events: Vec<DashboardEntry> = state
        .events
        .list_events()
        .await?
        .into_iter()
        .map(|event| DashboardEntry {
            progress: format!("{}/{total}", event.approval_count.min(total)),
            can_review: is_approver && !event.is_final_approved && event.approval_count < total,
            event,
        })
        .collect();

    Ok(Json(DashboardResponse {
        count: events.len(),
        events,
    }))
}

/// `POST /events`
pub async fn create_event(
    State(state): State<Arc<ApiState>>,
    Json(form): Json<NewEventForm>,
) -> Result<Json<CreatedResponse>> {
    let new_event = form.validate()?;
    let ctx = state.context().await;
    let receipt = state.events.create_event(&ctx, &new_event).await?;
    Ok(Json(CreatedResponse { receipt }))
}

/// `GET /events/:id`
pub async fn get_event(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<u64>,
) -> Result<Json<EventDetailResponse>> {
    let ctx = state.context().await;
    let event = state.events.get_event(id).await?;

    let decision = decide(&event, &state.chain, &ctx);
    let department_balance = match (
        ctx.role.approver(),
        event.department.as_deref(),
        state.approvals.budget(),
    ) {
        (Some(role), Some(department), Some(budget)) => {
            budget.balance_for(role, department).await?
        }
        _ => None,
    };

    Ok(Json(EventDetailResponse {
        progress: chain_progress(&event, &state.chain),
        can_approve: decision == Decision::Approve,
        notice: decision.message(),
        approval_pending: state.approvals.is_pending(id),
        decision,
        department_balance,
        event,
    }))
}

/// `POST /events/:id/approve`
pub async fn approve_event(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<u64>,
) -> Result<Json<ApproveResponse>> {
    let ctx = state.context().await;
    let account = ctx.require_account()?;
    let role = ctx.role.approver().ok_or_else(|| {
        DashboardError::NotAuthorized(format!("{} is not an approving role", ctx.role.label()))
    })?;

    let event = state.events.get_event(id).await?;
    let outcome = state.approvals.approve_stage(&event, role, account).await?;

    // The approval has landed; a failed refresh must not hide that.
    let event = match state.events.get_event(id).await {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Refresh after approving event {id} failed: {e}");
            None
        }
    };
    Ok(Json(ApproveResponse {
        progress: event.as_ref().map(|e| chain_progress(e, &state.chain)),
        outcome,
        event,
    }))
}
