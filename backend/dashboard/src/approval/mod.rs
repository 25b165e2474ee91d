//! Approval façade: the single write path for stage approvals.
//!
//! `approve_stage` sequences the two ledgers for one logical action:
//!
//! 1. budget deduction, only for a budget-authority stage, and only
//!    proceeding once the deduction is confirmed;
//! 2. the approval transaction itself.
//!
//! The local [`machine::can_approve`] check is advisory. The ledger
//! re-validates every approval and its verdict wins, so losing a race to a
//! concurrent approver surfaces as an ordinary [`DashboardError::Transaction`].
//! If the budget was already charged when the approval fails, the error is
//! [`DashboardError::DeductedWithoutApproval`] and carries the deduction receipt.

pub mod budget;
pub mod machine;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{error, info};

use crate::chain::{Role, RoleChain};
use crate::errors::{DashboardError, LedgerError, Result};
use crate::ledger::ApprovalLedger;
use crate::models::{Event, TxReceipt};

pub use budget::BudgetAdapter;
pub use machine::{advance, can_approve, chain_progress, decide, Decision};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalOutcome {
    pub event_id: u64,
    pub stage: String,
    /// Count the ledger now holds, assuming no one else acted in between.
    pub approval_count: usize,
    pub deduction: Option<TxReceipt>,
    pub approval: TxReceipt,
}

pub struct ApprovalService {
    ledger: Arc<dyn ApprovalLedger>,
    budget: Option<BudgetAdapter>,
    chain: Arc<RoleChain>,
    in_flight: Arc<Mutex<HashSet<u64>>>,
}

/// Marks an event as having an approval in flight until dropped.
struct InFlight {
    set: Arc<Mutex<HashSet<u64>>>,
    event_id: u64,
}

impl InFlight {
    fn acquire(set: &Arc<Mutex<HashSet<u64>>>, event_id: u64) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(event_id);
        inserted.then(|| Self {
            set: set.clone(),
            event_id,
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.event_id);
    }
}

impl ApprovalService {
    pub fn new(
        ledger: Arc<dyn ApprovalLedger>,
        budget: Option<BudgetAdapter>,
        chain: Arc<RoleChain>,
    ) -> Self {
        Self {
            ledger,
            budget,
            chain,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn budget(&self) -> Option<&BudgetAdapter> {
        self.budget.as_ref()
    }

    /// Whether an approval for `event_id` is currently being submitted.
    pub fn is_pending(&self, event_id: u64) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&event_id)
    }

    /// Approve `event`'s current stage as `account` acting under `role`.
    ///
    /// The caller re-reads the event afterwards; nothing is cached here.
    pub async fn approve_stage(
        &self,
        event: &Event,
        role: &Role,
        account: &str,
    ) -> Result<ApprovalOutcome> {
        let _guard = InFlight::acquire(&self.in_flight, event.id)
            .ok_or(DashboardError::ApprovalPending(event.id))?;

        let next_count = advance(event.approval_count, self.chain.len())
            .filter(|_| can_approve(event, role, account))
            .ok_or_else(|| {
                DashboardError::NotAuthorized(format!(
                    "{account} acting as {} cannot approve event {} at stage {}",
                    role.label, event.id, event.approval_count
                ))
            })?;

        let deduction = if role.has_budget_authority {
            Some(self.deduct_for(event, account).await?)
        } else {
            None
        };

        let approval = match self.ledger.approve_event(event.id, account).await {
            Ok(receipt) => receipt,
            Err(e) => return Err(Self::approval_failed(event, account, deduction, e)),
        };

        info!(
            "Event {} approved at stage {} ({}) by {account}",
            event.id, role.sequence_index, role.label
        );

        Ok(ApprovalOutcome {
            event_id: event.id,
            stage: role.label.clone(),
            approval_count: next_count,
            deduction,
            approval,
        })
    }

    fn approval_failed(
        event: &Event,
        account: &str,
        deduction: Option<TxReceipt>,
        err: LedgerError,
    ) -> DashboardError {
        match deduction {
            Some(deduction) => {
                error!(
                    "Approval of event {} by {account} failed after deduction {}: {err}",
                    event.id, deduction.tx_hash
                );
                DashboardError::DeductedWithoutApproval {
                    deduction,
                    source: err,
                }
            }
            None => {
                error!("Approval of event {} by {account} failed: {err}", event.id);
                DashboardError::from_write(err, DashboardError::Transaction)
            }
        }
    }

    async fn deduct_for(&self, event: &Event, account: &str) -> Result<TxReceipt> {
        let budget = self.budget.as_ref().ok_or_else(|| {
            DashboardError::Config(
                "stage has budget authority but no budget ledger is configured".to_string(),
            )
        })?;
        let department = event.department.as_deref().ok_or_else(|| {
            DashboardError::InvalidInput(format!("event {} has no department to charge", event.id))
        })?;

        budget
            .deduct(department, event.requested_amount, account)
            .await
            .map_err(|e| {
                error!(
                    "Deduction of {} from {department} for event {} failed: {e}",
                    event.requested_amount, event.id
                );
                DashboardError::from_write(e, DashboardError::Deduction)
            })
    }
}
