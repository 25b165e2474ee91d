//! Role resolution: which stage of the chain, if any, an account acts for.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::chain::{Role, RoleChain};
use crate::ledger::ApprovalLedger;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "role", rename_all = "snake_case")]
pub enum ResolvedRole {
    NotConnected,
    /// The lookup failed; treated as "cannot approve".
    Unknown,
    /// A ledger role outside the approval chain (e.g. a club proposer).
    Member(String),
    Approver(Role),
}

impl ResolvedRole {
    pub fn approver(&self) -> Option<&Role> {
        match self {
            Self::Approver(role) => Some(role),
            _ => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::NotConnected => "Not connected",
            Self::Unknown => "Unknown",
            Self::Member(label) => label,
            Self::Approver(role) => &role.label,
        }
    }
}

#[derive(Clone)]
pub struct RoleResolver {
    ledger: Arc<dyn ApprovalLedger>,
    chain: Arc<RoleChain>,
}

impl RoleResolver {
    pub fn new(ledger: Arc<dyn ApprovalLedger>, chain: Arc<RoleChain>) -> Self {
        Self { ledger, chain }
    }

    /// Never fails: lookup errors are logged and reported as [`ResolvedRole::Unknown`].
    pub async fn resolve_role(&self, account: Option<&str>) -> ResolvedRole {
        let Some(account) = account else {
            return ResolvedRole::NotConnected;
        };

        match self.ledger.get_role(account).await {
            Ok(label) => match self.chain.role(&label) {
                Some(role) => ResolvedRole::Approver(role.clone()),
                None => ResolvedRole::Member(label.trim().to_string()),
            },
            Err(e) => {
                warn!("Error getting role for {account}: {e}");
                ResolvedRole::Unknown
            }
        }
    }
}
