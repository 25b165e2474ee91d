//! Department budget adapter.
//!
//! Balances may be read by anyone holding a budget-authority role. The
//! deduction is only visible to the approval façade in the parent module,
//! so funds can never leave a department without a matching approval.

use std::sync::Arc;

use tracing::info;

use crate::chain::Role;
use crate::errors::{DashboardError, Result};
use crate::ledger::{BudgetLedger, LedgerResult};
use crate::models::TxReceipt;

#[derive(Clone)]
pub struct BudgetAdapter {
    ledger: Arc<dyn BudgetLedger>,
}

impl BudgetAdapter {
    pub fn new(ledger: Arc<dyn BudgetLedger>) -> Self {
        Self { ledger }
    }

    /// Remaining balance of `department`, or `None` without touching the
    /// ledger when `role` carries no budget authority.
    pub async fn balance_for(&self, role: &Role, department: &str) -> Result<Option<u64>> {
        if !role.has_budget_authority {
            return Ok(None);
        }
        let balance = self
            .ledger
            .get_department_balance(department)
            .await
            .map_err(DashboardError::Read)?;
        Ok(Some(balance))
    }

    pub(super) async fn deduct(
        &self,
        department: &str,
        amount: u64,
        from: &str,
    ) -> LedgerResult<TxReceipt> {
        info!("Deducting {amount} from department {department} (signer {from})");
        self.ledger.approve_event(department, amount, from).await
    }
}
