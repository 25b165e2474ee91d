//! # Approval state machine
//!
//! There is no stored state: every decision is a pure function of the event
//! snapshot (`approval_count`, `is_final_approved`, recorded signers), the
//! acting role and the acting account.
//!
//! ```text
//! count 0 ──Mentor──► 1 ──HOD──► 2 ──Dean──► 3 ──VC──► 4 (final)
//! ```
//!
//! Two distinct "already" checks exist and both are needed:
//!
//! - [`has_signed`] is per account and gates approval. An account that signed
//!   one stage may never sign another stage of the same event, even after
//!   being granted a later role.
//! - [`already_approved`] is per role and only drives messaging. Gating on it
//!   would lock a role's other holders out of every later event.

use serde::Serialize;

use crate::chain::{Role, RoleChain};
use crate::models::{short_account, Event};
use crate::roles::ResolvedRole;
use crate::session::SessionContext;

/// Whether `account` is the legitimate next approver of `event` under `role`.
pub fn can_approve(event: &Event, role: &Role, account: &str) -> bool {
    if event.is_final_approved {
        return false;
    }
    if has_signed(event, account) {
        return false;
    }
    role.sequence_index == event.approval_count
}

/// `role`'s stage has been passed, whoever filled it.
pub fn already_approved(event: &Event, role: &Role) -> bool {
    event.approval_count > role.sequence_index
}

/// `account` appears among the event's recorded signers.
pub fn has_signed(event: &Event, account: &str) -> bool {
    event
        .approvals
        .iter()
        .any(|a| a.signer.eq_ignore_ascii_case(account))
}

/// The role whose turn it is, or `None` once the event is final.
pub fn next_stage<'a>(event: &Event, chain: &'a RoleChain) -> Option<&'a Role> {
    if event.is_final_approved {
        return None;
    }
    chain.stage(event.approval_count)
}

/// Approval count after one more successful approval; `None` past the chain end.
pub fn advance(approval_count: usize, chain_len: usize) -> Option<usize> {
    (approval_count < chain_len).then_some(approval_count + 1)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Finalized,
    AlreadySigned,
    /// Someone else's turn; `required` names the stage that is open.
    NotYourTurn { required: String },
    /// The viewer's stage was already passed.
    StageCompleted,
    /// Not connected, unknown or not an approving role.
    NoApprovalRole,
}

impl Decision {
    pub fn message(&self) -> Option<String> {
        match self {
            Decision::Approve | Decision::NoApprovalRole => None,
            Decision::Finalized => Some("This event has received final approval".to_string()),
            Decision::AlreadySigned => Some("You've already approved this event".to_string()),
            Decision::StageCompleted => {
                Some("Your stage of the approval chain is already complete".to_string())
            }
            Decision::NotYourTurn { required } => Some(format!(
                "You are not the next approver in the sequence. The current approval stage requires {required} approval."
            )),
        }
    }
}

/// Combine the session with an event snapshot into what the viewer may do.
pub fn decide(event: &Event, chain: &RoleChain, ctx: &SessionContext) -> Decision {
    if event.is_final_approved {
        return Decision::Finalized;
    }
    let Some(account) = ctx.account.as_deref() else {
        return Decision::NoApprovalRole;
    };
    if has_signed(event, account) {
        return Decision::AlreadySigned;
    }

    let Some(role) = ctx.role.approver() else {
        return match &ctx.role {
            // A lookup failure still tells the viewer whose turn it is.
            ResolvedRole::Unknown => not_your_turn(event, chain),
            _ => Decision::NoApprovalRole,
        };
    };

    if can_approve(event, role, account) {
        Decision::Approve
    } else if already_approved(event, role) {
        Decision::StageCompleted
    } else {
        not_your_turn(event, chain)
    }
}

fn not_your_turn(event: &Event, chain: &RoleChain) -> Decision {
    match next_stage(event, chain) {
        Some(stage) => Decision::NotYourTurn {
            required: stage.label.clone(),
        },
        None => Decision::Finalized,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageStatus {
    pub sequence_index: usize,
    pub label: String,
    pub has_budget_authority: bool,
    pub completed: bool,
    pub signer: Option<String>,
    pub signer_short: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainProgress {
    pub completed: usize,
    pub total: usize,
    pub label: String,
    pub stages: Vec<StageStatus>,
}

/// Stage-by-stage status. Completion follows `approval_count`; signers are
/// shown only where the approval list already has them.
pub fn chain_progress(event: &Event, chain: &RoleChain) -> ChainProgress {
    let completed = event.approval_count.min(chain.len());
    let stages = chain
        .stages()
        .iter()
        .map(|role| {
            let signer = event
                .approvals
                .get(role.sequence_index)
                .map(|a| a.signer.clone());
            StageStatus {
                sequence_index: role.sequence_index,
                label: role.label.clone(),
                has_budget_authority: role.has_budget_authority,
                completed: event.approval_count > role.sequence_index,
                signer_short: signer.as_deref().map(short_account),
                signer,
            }
        })
        .collect();

    ChainProgress {
        completed,
        total: chain.len(),
        label: format!("{completed}/{}", chain.len()),
        stages,
    }
}
