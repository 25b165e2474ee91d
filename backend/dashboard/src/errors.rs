//! Application-wide error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::TxReceipt;

/// A failure reported by (or while talking to) one of the ledgers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Transport failure, timeout or an unreachable gateway.
    #[error("ledger unreachable: {0}")]
    Connectivity(String),

    /// The ledger refused or reverted the call. The message is the ledger's own.
    #[error("{0}")]
    Rejected(String),

    #[error("malformed ledger response: {0}")]
    Malformed(String),
}

impl LedgerError {
    /// The underlying message without any classification prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Connectivity(m) | Self::Rejected(m) | Self::Malformed(m) => m,
        }
    }
}

#[derive(Debug, Error)]
pub enum DashboardError {
    /// No wallet/account capability is available at all.
    #[error("No wallet session available: {0}")]
    NoSession(String),

    #[error("Wallet not connected")]
    NotConnected,

    #[error("Failed to read from ledger: {0}")]
    Read(LedgerError),

    #[error("Ledger connectivity error: {0}")]
    Connectivity(String),

    #[error("Budget deduction failed: {0}")]
    Deduction(LedgerError),

    #[error("Approval transaction failed: {0}")]
    Transaction(LedgerError),

    /// The budget was charged but the approval that should match it failed.
    #[error(
        "Budget deducted in {} but the approval failed: {source}",
        .deduction.tx_hash
    )]
    DeductedWithoutApproval {
        deduction: TxReceipt,
        source: LedgerError,
    },

    #[error("Not authorised to approve: {0}")]
    NotAuthorized(String),

    #[error("An approval for event {0} is already in progress")]
    ApprovalPending(u64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DashboardError>;

impl DashboardError {
    /// Short machine-readable identifier used by the frontend to pick a message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoSession(_) => "no_session",
            Self::NotConnected => "not_connected",
            Self::Read(_) => "read_failed",
            Self::Connectivity(_) => "connectivity",
            Self::Deduction(_) => "deduction_failed",
            Self::Transaction(_) => "transaction_failed",
            Self::DeductedWithoutApproval { .. } => "deducted_without_approval",
            Self::NotAuthorized(_) => "not_authorized",
            Self::ApprovalPending(_) => "approval_pending",
            Self::InvalidInput(_) => "invalid_input",
            Self::Config(_) => "config",
        }
    }

    /// The ledger's message, unmodified, when this error came from a ledger.
    pub fn ledger_message(&self) -> Option<&str> {
        match self {
            Self::Read(e) | Self::Deduction(e) | Self::Transaction(e) => Some(e.message()),
            Self::DeductedWithoutApproval { source, .. } => Some(source.message()),
            Self::Connectivity(m) => Some(m),
            _ => None,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::NoSession(_) | Self::NotConnected => StatusCode::UNAUTHORIZED,
            Self::Read(_) | Self::Connectivity(_) => StatusCode::BAD_GATEWAY,
            Self::Deduction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Transaction(_)
            | Self::DeductedWithoutApproval { .. }
            | Self::ApprovalPending(_) => StatusCode::CONFLICT,
            Self::NotAuthorized(_) => StatusCode::FORBIDDEN,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wrap a failed write: transport problems stay connectivity failures,
    /// everything else is attributed to the step that failed.
    pub(crate) fn from_write(err: LedgerError, step: fn(LedgerError) -> DashboardError) -> Self {
        match err {
            LedgerError::Connectivity(m) => Self::Connectivity(m),
            other => step(other),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
    /// The ledger's own message, for showing verbatim.
    pub ledger_message: Option<String>,
    /// Set when the view is stale and should be re-read (e.g. a lost race).
    pub refresh: bool,
    /// A confirmed deduction left without its approval.
    pub deduction: Option<TxReceipt>,
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
            kind: self.kind(),
            ledger_message: self.ledger_message().map(String::from),
            refresh: matches!(
                self,
                Self::Transaction(_) | Self::DeductedWithoutApproval { .. }
            ),
            deduction: match &self {
                Self::DeductedWithoutApproval { deduction, .. } => Some(deduction.clone()),
                _ => None,
            },
        };
        (self.status(), Json(body)).into_response()
    }
}
