use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::api::{self, ApiState};
use crate::approval::{ApprovalService, BudgetAdapter, Decision};
use crate::chain::RoleChain;
use crate::errors::DashboardError;
use crate::memory::MemoryLedger;
use crate::models::NewEventForm;
use crate::repository::EventRepository;
use crate::roles::{ResolvedRole, RoleResolver};
use crate::session::WalletSession;

fn setup() -> (Arc<MemoryLedger>, Arc<ApiState>) {
    let ledger = Arc::new(MemoryLedger::four_stage());
    ledger.assign_role("0xMentor", "Mentor");
    ledger.assign_role("0xHod", "HOD");
    ledger.assign_role("0xClub", "Club");
    ledger.set_balance("CSE", 10_000);

    let chain = Arc::new(ledger.chain().clone());
    let state = Arc::new(ApiState {
        session: Arc::new(WalletSession::new(Some(ledger.clone()))),
        resolver: RoleResolver::new(ledger.clone(), chain.clone()),
        events: EventRepository::new(ledger.clone(), chain.clone(), None),
        approvals: ApprovalService::new(
            ledger.clone(),
            Some(BudgetAdapter::new(ledger.clone())),
            chain.clone(),
        ),
        chain,
    });
    (ledger, state)
}

fn act_as(state: &ApiState, account: &str) {
    state.session.handle_accounts_changed(&[account.to_string()]);
}

fn form(club: &str, title: &str, description: &str, amount: &str) -> NewEventForm {
    NewEventForm {
        club_name: club.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        amount: amount.to_string(),
    }
}

#[tokio::test]
async fn test_session_reports_role_and_short_account() {
    let (ledger, state) = setup();

    let Json(session) = api::get_session(State(state.clone())).await;
    assert_eq!(session.role, ResolvedRole::NotConnected);
    assert_eq!(session.role_label, "Not connected");

    ledger.set_wallet_accounts(&["0x8bEd325124B0e9Cb6BD2F423855a1A1B56534667"]);
    ledger.assign_role("0x8bEd325124B0e9Cb6BD2F423855a1A1B56534667", "Dean");
    let Json(session) = api::connect(State(state.clone())).await.unwrap();
    assert_eq!(session.account_short.as_deref(), Some("0x8bEd...4667"));
    assert_eq!(session.role_label, "Dean");
    assert!(session.role.approver().is_some());
}

#[tokio::test]
async fn test_dashboard_lists_events_with_progress() {
    let (ledger, state) = setup();
    ledger.seed_event("Robotics", 5_000, "CSE");
    let done = ledger.seed_event("Drama", 1_000, "ARTS");
    ledger.set_approval_count(done, 4);

    act_as(&state, "0xMentor");
    let Json(dashboard) = api::list_events(State(state.clone())).await.unwrap();

    assert_eq!(dashboard.count, 2);
    assert_eq!(dashboard.events[0].event.club_name, "Robotics");
    assert_eq!(dashboard.events[0].progress, "0/4");
    assert!(dashboard.events[0].can_review);
    assert_eq!(dashboard.events[1].progress, "4/4");
    assert!(dashboard.events[1].event.is_final_approved);
    assert!(!dashboard.events[1].can_review);

    // A proposer sees the same list but cannot review.
    act_as(&state, "0xClub");
    let Json(dashboard) = api::list_events(State(state)).await.unwrap();
    assert!(dashboard.events.iter().all(|e| !e.can_review));
}

#[tokio::test]
async fn test_event_detail_shows_decision_and_balance() {
    let (ledger, state) = setup();
    let id = ledger.seed_event("Robotics", 5_000, "CSE");

    act_as(&state, "0xHod");
    let Json(detail) = api::get_event(State(state.clone()), Path(id)).await.unwrap();
    assert!(!detail.can_approve);
    assert_eq!(
        detail.decision,
        Decision::NotYourTurn {
            required: "Mentor".to_string()
        }
    );
    assert!(detail.notice.unwrap().contains("requires Mentor approval"));
    assert_eq!(detail.department_balance, Some(10_000));

    // Mentor holds no budget authority, so no balance read happens.
    act_as(&state, "0xMentor");
    let Json(detail) = api::get_event(State(state), Path(id)).await.unwrap();
    assert!(detail.can_approve);
    assert_eq!(detail.department_balance, None);
    assert_eq!(detail.progress.label, "0/4");
    assert!(!detail.approval_pending);
}

#[tokio::test]
async fn test_approve_through_api() {
    let (ledger, state) = setup();
    let id = ledger.seed_event("Robotics", 5_000, "CSE");

    act_as(&state, "0xMentor");
    let Json(resp) = api::approve_event(State(state.clone()), Path(id)).await.unwrap();
    assert_eq!(resp.outcome.approval_count, 1);
    assert_eq!(resp.progress.unwrap().label, "1/4");

    // The same account cannot approve again.
    let err = api::approve_event(State(state.clone()), Path(id)).await.unwrap_err();
    assert!(matches!(err, DashboardError::NotAuthorized(_)));

    act_as(&state, "0xHod");
    let Json(resp) = api::approve_event(State(state.clone()), Path(id)).await.unwrap();
    assert!(resp.outcome.deduction.is_some());
    assert_eq!(ledger.balance("CSE"), 5_000);
    let event = resp.event.unwrap();
    assert_eq!(event.approval_count, 2);
    assert_eq!(event.approvals[1].role, "HOD");

    let Json(detail) = api::get_event(State(state.clone()), Path(id)).await.unwrap();
    assert_eq!(detail.decision, Decision::AlreadySigned);

    // Another HOD holder sees the stage as done rather than signed.
    ledger.assign_role("0xHod2", "HOD");
    act_as(&state, "0xHod2");
    let Json(detail) = api::get_event(State(state), Path(id)).await.unwrap();
    assert_eq!(detail.decision, Decision::StageCompleted);
}

#[tokio::test]
async fn test_approve_requires_connection_and_approver_role() {
    let (ledger, state) = setup();
    let id = ledger.seed_event("Robotics", 5_000, "CSE");

    let err = api::approve_event(State(state.clone()), Path(id)).await.unwrap_err();
    assert!(matches!(err, DashboardError::NotConnected));

    act_as(&state, "0xClub");
    let err = api::approve_event(State(state), Path(id)).await.unwrap_err();
    assert_eq!(err.kind(), "not_authorized");
    assert!(!ledger.calls().contains(&"approveEvent"));
}

#[tokio::test]
async fn test_create_event_validates_form() {
    let (ledger, state) = setup();
    act_as(&state, "0xClub");

    for bad in [
        form("", "Hackathon", "48h build", "5000"),
        form("Robotics", "Hackathon", "48h build", "abc"),
        form("Robotics", "Hackathon", "48h build", "0"),
    ] {
        let err = api::create_event(State(state.clone()), Json(bad)).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }
    assert!(!ledger.calls().contains(&"createEvent"));

    let Json(created) = api::create_event(
        State(state.clone()),
        Json(form("Robotics", "Hackathon", "48h build", "5000")),
    )
    .await
    .unwrap();
    assert!(created.receipt.tx_hash.starts_with("0x"));

    let Json(dashboard) = api::list_events(State(state)).await.unwrap();
    assert_eq!(dashboard.count, 1);
    assert_eq!(dashboard.events[0].event.requested_amount, 5_000);
    assert_eq!(dashboard.events[0].event.created_by, "0xClub");
}

#[tokio::test]
async fn test_create_event_requires_connection() {
    let (_ledger, state) = setup();
    let err = api::create_event(
        State(state),
        Json(form("Robotics", "Hackathon", "48h build", "5000")),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DashboardError::NotConnected));
}

#[tokio::test]
async fn test_read_failure_surfaces_and_role_degrades() {
    let (ledger, state) = setup();
    ledger.seed_event("Robotics", 5_000, "CSE");
    act_as(&state, "0xMentor");
    ledger.fail_reads("gateway down");

    let err = api::list_events(State(state.clone())).await.unwrap_err();
    assert_eq!(err.kind(), "read_failed");

    let Json(session) = api::get_session(State(state)).await;
    assert_eq!(session.role, ResolvedRole::Unknown);
    assert_eq!(session.role_label, "Unknown");
}

#[tokio::test]
async fn test_chain_endpoint_lists_stages() {
    let (_ledger, state) = setup();
    let Json(chain) = api::get_chain(State(state)).await;
    let labels: Vec<_> = chain.stages.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, ["Mentor", "HOD", "Dean", "VC"]);
    assert_eq!(chain.stages, RoleChain::four_stage().stages().to_vec());
}
