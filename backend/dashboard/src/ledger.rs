//! Capabilities the dashboard needs from the outside world.
//!
//! Both ledgers and the wallet are external systems of record; the dashboard
//! only ever sees them through these traits. [`crate::rpc`] implements them
//! against a JSON-RPC gateway.
//!
//! Every mutating call names its signer (`from`) explicitly and resolves
//! only once the ledger has confirmed the transaction.

use async_trait::async_trait;

use crate::errors::LedgerError;
use crate::models::{ApprovalEntry, EventRecord, TxReceipt};

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

#[async_trait]
pub trait ApprovalLedger: Send + Sync {
    async fn event_count(&self) -> LedgerResult<u64>;

    async fn fetch_event(&self, id: u64) -> LedgerResult<EventRecord>;

    async fn get_approvals(&self, id: u64) -> LedgerResult<Vec<ApprovalEntry>>;

    /// Role label assigned to `account`, as the ledger names it.
    async fn get_role(&self, account: &str) -> LedgerResult<String>;

    async fn create_event(
        &self,
        from: &str,
        club_name: &str,
        title: &str,
        description: &str,
        requested_amount: u64,
    ) -> LedgerResult<TxReceipt>;

    /// Record `from`'s approval of the event's current stage.
    async fn approve_event(&self, id: u64, from: &str) -> LedgerResult<TxReceipt>;
}

#[async_trait]
pub trait BudgetLedger: Send + Sync {
    async fn get_department_balance(&self, department: &str) -> LedgerResult<u64>;

    /// Deduct `amount` from `department`'s balance.
    async fn approve_event(&self, department: &str, amount: u64, from: &str)
        -> LedgerResult<TxReceipt>;
}

/// The wallet the dashboard signs with.
#[async_trait]
pub trait AccountProvider: Send + Sync {
    /// Ask the wallet to connect; may prompt the user.
    async fn request_accounts(&self) -> LedgerResult<Vec<String>>;

    /// Accounts already authorised, without prompting.
    async fn accounts(&self) -> LedgerResult<Vec<String>>;
}
