//! Funding-proposal types, as read from the approval ledger and as served to
//! the dashboard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{DashboardError, Result};

/// Core event record exactly as the ledger's `fetchEvent` reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub club_name: String,
    pub title: String,
    pub description: String,
    pub requested_amount: u64,
    pub created_by: String,
    pub is_final_approved: bool,
    pub approval_count: usize,
    /// Only reported by deployments that carry a budget ledger.
    pub department: Option<String>,
}

/// One entry of the ledger's `getApprovals` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalEntry {
    pub signer: String,
    pub role: String,
    /// Unix seconds.
    pub timestamp: i64,
}

/// Proof that a transaction was confirmed by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub ledger: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalRecord {
    pub signer: String,
    pub role: String,
    /// Position of `role` in the configured chain; `None` for labels the chain does not know.
    pub sequence_index: Option<usize>,
    pub timestamp: DateTime<Utc>,
}

/// A funding proposal with its approval history, as one fresh snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub id: u64,
    pub club_name: String,
    pub title: String,
    pub description: String,
    pub requested_amount: u64,
    pub created_by: String,
    pub department: Option<String>,
    /// Authoritative for gating, even when `approvals` is momentarily out of step.
    pub approval_count: usize,
    pub is_final_approved: bool,
    pub approvals: Vec<ApprovalRecord>,
}

/// Dashboard list entry. Built from the core record only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventSummary {
    pub id: u64,
    pub club_name: String,
    pub title: String,
    pub description: String,
    pub requested_amount: u64,
    pub created_by: String,
    pub approval_count: usize,
    pub is_final_approved: bool,
}

/// The creation form as submitted. Every field arrives as text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewEventForm {
    #[serde(default)]
    pub club_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub amount: String,
}

/// A validated creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub club_name: String,
    pub title: String,
    pub description: String,
    pub requested_amount: u64,
}

impl NewEventForm {
    pub fn validate(&self) -> Result<NewEvent> {
        let club_name = required("club name", &self.club_name)?;
        let title = required("title", &self.title)?;
        let description = required("description", &self.description)?;
        let amount = required("amount", &self.amount)?;

        let requested_amount: u64 = amount.parse().map_err(|_| {
            DashboardError::InvalidInput(format!("amount must be numeric, got '{amount}'"))
        })?;
        if requested_amount == 0 {
            return Err(DashboardError::InvalidInput(
                "amount must be greater than zero".to_string(),
            ));
        }

        Ok(NewEvent {
            club_name,
            title,
            description,
            requested_amount,
        })
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DashboardError::InvalidInput(format!("{field} is required")));
    }
    Ok(value.to_string())
}

/// `0x12345678…` → `0x1234...5678`, the way the dashboard badges accounts.
pub fn short_account(account: &str) -> String {
    let chars: Vec<char> = account.chars().collect();
    if chars.len() <= 10 {
        return account.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
