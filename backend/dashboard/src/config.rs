//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::chain::RoleChain;
use crate::errors::{DashboardError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// JSON-RPC ledger gateway endpoint
    pub rpc_url: String,
    /// Contract id of the approval ledger (events, approvals, roles)
    pub approval_contract: String,
    /// Contract id of the budget ledger; only needed when a stage has budget authority
    pub budget_contract: Option<String>,
    /// Ordered reviewer roles
    pub chain: RoleChain,
    /// Department charged when an event record carries none
    pub default_department: Option<String>,
    /// Port for the REST API server
    pub api_port: u16,
    /// How often (in seconds) to check the wallet for account changes
    pub account_poll_secs: u64,
    /// Retries for ledger reads; writes are never retried
    pub rpc_max_retries: u32,
    /// How long to wait for a submitted transaction to confirm
    pub confirm_timeout_secs: u64,
    /// Interval between receipt polls while waiting for confirmation
    pub confirm_poll_millis: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let chain = RoleChain::parse(
            &lookup("APPROVAL_CHAIN").unwrap_or_else(|| "four_stage".to_string()),
        )?;

        let budget_contract = lookup("BUDGET_CONTRACT").filter(|v| !v.trim().is_empty());
        if chain.has_budget_stage() && budget_contract.is_none() {
            return Err(DashboardError::Config(
                "BUDGET_CONTRACT is required when a stage has budget authority".to_string(),
            ));
        }

        Ok(Config {
            rpc_url: lookup("RPC_URL").unwrap_or_else(|| "http://127.0.0.1:8545".to_string()),
            approval_contract: lookup("APPROVAL_CONTRACT")
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    DashboardError::Config(
                        "APPROVAL_CONTRACT environment variable is required".to_string(),
                    )
                })?,
            budget_contract,
            chain,
            default_department: lookup("DEFAULT_DEPARTMENT").filter(|v| !v.trim().is_empty()),
            api_port: parse_or(&lookup, "API_PORT", 3001)?,
            account_poll_secs: parse_or(&lookup, "ACCOUNT_POLL_SECS", 5)?,
            rpc_max_retries: parse_or(&lookup, "RPC_MAX_RETRIES", 3)?,
            confirm_timeout_secs: parse_or(&lookup, "CONFIRM_TIMEOUT_SECS", 120)?,
            confirm_poll_millis: parse_or(&lookup, "CONFIRM_POLL_MILLIS", 1500)?,
        })
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn confirm_poll(&self) -> Duration {
        Duration::from_millis(self.confirm_poll_millis)
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| DashboardError::Config(format!("Invalid {key}"))),
        None => Ok(default),
    }
}
