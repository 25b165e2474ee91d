//! JSON-RPC ledger gateway client — implements the ledger and wallet
//! capabilities of [`crate::ledger`].
//!
//! ## Gateway methods
//!
//! | Method             | Use                                             |
//! |--------------------|-------------------------------------------------|
//! | `contract_call`    | read-only contract call                         |
//! | `contract_send`    | submit a transaction, returns its hash          |
//! | `contract_receipt` | `null` while pending, then `success`/`reverted` |
//! | `accounts_request` | connect the wallet (may prompt)                 |
//! | `accounts_list`    | accounts already authorised                     |
//!
//! ## Resilience
//!
//! * Reads back off exponentially on transport errors, rate limiting and
//!   soft RPC errors, up to the configured retry count.
//! * Writes are submitted exactly once. A resubmission is always an explicit
//!   user action, since a blind retry could approve or deduct twice.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::LedgerError;
use crate::ledger::{AccountProvider, ApprovalLedger, BudgetLedger, LedgerResult};
use crate::models::{ApprovalEntry, EventRecord, TxReceipt};

const INITIAL_BACKOFF_MILLIS: u64 = 500;
const MAX_BACKOFF_MILLIS: u64 = 8_000;

/// Execution reverted by the contract.
const REVERT_CODE: i64 = 3;

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// Why a single request did not produce a result.
#[derive(Debug)]
enum Failure {
    Transport(String),
    RateLimited,
    Rpc(RpcError),
    Decode(String),
}

impl Failure {
    fn is_transient(&self) -> bool {
        match self {
            Failure::Transport(_) | Failure::RateLimited => true,
            // Reverts and malformed requests will fail the same way again.
            Failure::Rpc(e) => !(e.code == REVERT_CODE || e.code == -32600 || e.code == -32601),
            Failure::Decode(_) => false,
        }
    }

    fn into_ledger_error(self) -> LedgerError {
        match self {
            Failure::Transport(m) => LedgerError::Connectivity(m),
            Failure::RateLimited => {
                LedgerError::Connectivity("rate-limited by gateway".to_string())
            }
            Failure::Rpc(e) => LedgerError::Rejected(e.message),
            Failure::Decode(m) => LedgerError::Malformed(m),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────

/// Shared connection to the gateway. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: Client,
    url: String,
    max_retries: u32,
    confirm_timeout: Duration,
    confirm_poll: Duration,
}

impl RpcClient {
    pub fn new(
        client: Client,
        url: impl Into<String>,
        max_retries: u32,
        confirm_timeout: Duration,
        confirm_poll: Duration,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            max_retries,
            confirm_timeout,
            confirm_poll,
        }
    }

    async fn request_once(&self, method: &str, params: &Value) -> Result<Value, Failure> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(|e| Failure::Transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Failure::RateLimited);
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| Failure::Decode(e.to_string()))?;

        if let Some(err) = body.error {
            return Err(Failure::Rpc(err));
        }
        Ok(body.result.unwrap_or(Value::Null))
    }

    /// Issue a read, retrying transient failures with exponential back-off.
    async fn read(&self, method: &str, params: Value) -> LedgerResult<Value> {
        let mut backoff = INITIAL_BACKOFF_MILLIS;
        let mut attempt = 0;

        loop {
            match self.request_once(method, &params).await {
                Ok(value) => return Ok(value),
                Err(failure) if failure.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "{method} failed (attempt {attempt}, retrying in {backoff}ms): {failure:?}"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF_MILLIS);
                }
                Err(failure) => return Err(failure.into_ledger_error()),
            }
        }
    }

    async fn call(&self, contract: &str, function: &str, args: Value) -> LedgerResult<Value> {
        let value = self
            .read(
                "contract_call",
                json!({ "contract": contract, "function": function, "args": args }),
            )
            .await?;
        debug!("{contract}.{function} -> {value}");
        Ok(value)
    }

    /// Submit a transaction once and wait for the ledger to confirm it.
    async fn send(
        &self,
        contract: &str,
        function: &str,
        args: Value,
        from: &str,
    ) -> LedgerResult<TxReceipt> {
        let params = json!({
            "contract": contract,
            "function": function,
            "args": args,
            "from": from,
        });
        let submitted = self
            .request_once("contract_send", &params)
            .await
            .map_err(Failure::into_ledger_error)?;
        let tx_hash = decode_tx_hash(&submitted)?;
        info!("Submitted {contract}.{function} from {from}: {tx_hash}");

        let receipt = self.wait_for_receipt(&tx_hash).await?;
        info!("Confirmed {tx_hash} (ledger={:?})", receipt.ledger);
        Ok(receipt)
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> LedgerResult<TxReceipt> {
        let deadline = Instant::now() + self.confirm_timeout;

        loop {
            match self
                .request_once("contract_receipt", &json!({ "txHash": tx_hash }))
                .await
            {
                Ok(value) => match decode_receipt(tx_hash, &value)? {
                    ReceiptStatus::Pending => {}
                    ReceiptStatus::Confirmed(receipt) => return Ok(receipt),
                    ReceiptStatus::Reverted(reason) => return Err(LedgerError::Rejected(reason)),
                },
                // The transaction is already out; keep waiting for it rather than failing.
                Err(failure) if failure.is_transient() => {
                    warn!("Receipt poll for {tx_hash} failed: {failure:?}");
                }
                Err(failure) => return Err(failure.into_ledger_error()),
            }

            if Instant::now() >= deadline {
                return Err(LedgerError::Connectivity(format!(
                    "transaction {tx_hash} not confirmed within {}s",
                    self.confirm_timeout.as_secs()
                )));
            }
            tokio::time::sleep(self.confirm_poll).await;
        }
    }
}

// ─────────────────────────────────────────────────────────
// Capabilities
// ─────────────────────────────────────────────────────────

/// The approval ledger contract.
#[derive(Debug, Clone)]
pub struct ApprovalContract {
    rpc: RpcClient,
    contract: String,
}

impl ApprovalContract {
    pub fn new(rpc: RpcClient, contract: impl Into<String>) -> Self {
        Self {
            rpc,
            contract: contract.into(),
        }
    }
}

#[async_trait]
impl ApprovalLedger for ApprovalContract {
    async fn event_count(&self) -> LedgerResult<u64> {
        let value = self.rpc.call(&self.contract, "eventCount", json!([])).await?;
        decode_u64(&value).ok_or_else(|| malformed("eventCount", &value))
    }

    async fn fetch_event(&self, id: u64) -> LedgerResult<EventRecord> {
        let value = self.rpc.call(&self.contract, "fetchEvent", json!([id])).await?;
        decode_event_record(&value)
    }

    async fn get_approvals(&self, id: u64) -> LedgerResult<Vec<ApprovalEntry>> {
        let value = self
            .rpc
            .call(&self.contract, "getApprovals", json!([id]))
            .await?;
        decode_approvals(&value)
    }

    async fn get_role(&self, account: &str) -> LedgerResult<String> {
        let value = self
            .rpc
            .call(&self.contract, "getRole", json!([account]))
            .await?;
        value
            .as_str()
            .map(String::from)
            .ok_or_else(|| malformed("getRole", &value))
    }

    async fn create_event(
        &self,
        from: &str,
        club_name: &str,
        title: &str,
        description: &str,
        requested_amount: u64,
    ) -> LedgerResult<TxReceipt> {
        self.rpc
            .send(
                &self.contract,
                "createEvent",
                json!([club_name, title, description, requested_amount]),
                from,
            )
            .await
    }

    async fn approve_event(&self, id: u64, from: &str) -> LedgerResult<TxReceipt> {
        self.rpc
            .send(&self.contract, "approveEvent", json!([id]), from)
            .await
    }
}

/// The department budget contract.
#[derive(Debug, Clone)]
pub struct BudgetContract {
    rpc: RpcClient,
    contract: String,
}

impl BudgetContract {
    pub fn new(rpc: RpcClient, contract: impl Into<String>) -> Self {
        Self {
            rpc,
            contract: contract.into(),
        }
    }
}

#[async_trait]
impl BudgetLedger for BudgetContract {
    async fn get_department_balance(&self, department: &str) -> LedgerResult<u64> {
        let value = self
            .rpc
            .call(&self.contract, "getDepartmentBalance", json!([department]))
            .await?;
        decode_u64(&value).ok_or_else(|| malformed("getDepartmentBalance", &value))
    }

    async fn approve_event(
        &self,
        department: &str,
        amount: u64,
        from: &str,
    ) -> LedgerResult<TxReceipt> {
        self.rpc
            .send(&self.contract, "approveEvent", json!([department, amount]), from)
            .await
    }
}

/// The gateway's wallet.
#[derive(Debug, Clone)]
pub struct RpcWallet {
    rpc: RpcClient,
}

impl RpcWallet {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl AccountProvider for RpcWallet {
    async fn request_accounts(&self) -> LedgerResult<Vec<String>> {
        let value = self
            .rpc
            .request_once("accounts_request", &json!([]))
            .await
            .map_err(Failure::into_ledger_error)?;
        decode_accounts(&value)
    }

    async fn accounts(&self) -> LedgerResult<Vec<String>> {
        let value = self.rpc.read("accounts_list", json!([])).await?;
        decode_accounts(&value)
    }
}

// ─────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum ReceiptStatus {
    Pending,
    Confirmed(TxReceipt),
    Reverted(String),
}

fn malformed(what: &str, value: &Value) -> LedgerError {
    LedgerError::Malformed(format!("unexpected {what} result: {value}"))
}

/// Integers arrive as JSON numbers, decimal strings or `0x` hex strings.
fn decode_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16).ok(),
                None => s.parse().ok(),
            }
        }
        _ => None,
    }
}

fn decode_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.parse().ok(),
        other => decode_u64(other).map(|n| n != 0),
    }
}

/// Pick field `key` from an object, or position `index` from a tuple.
fn field<'a>(value: &'a Value, key: &str, index: usize) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => items.get(index),
        _ => None,
    }
}

fn string_field(value: &Value, key: &str, index: usize) -> LedgerResult<String> {
    field(value, key, index)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| malformed(key, value))
}

fn decode_event_record(value: &Value) -> LedgerResult<EventRecord> {
    let number = |key: &str, index: usize| {
        field(value, key, index)
            .and_then(decode_u64)
            .ok_or_else(|| malformed(key, value))
    };

    Ok(EventRecord {
        club_name: string_field(value, "clubName", 0)?,
        title: string_field(value, "title", 1)?,
        description: string_field(value, "description", 2)?,
        requested_amount: number("requestedAmount", 3)?,
        created_by: string_field(value, "createdBy", 4)?,
        is_final_approved: field(value, "isFinalApproved", 5)
            .and_then(decode_bool)
            .ok_or_else(|| malformed("isFinalApproved", value))?,
        approval_count: number("approvalCount", 6)? as usize,
        department: field(value, "department", 7)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from),
    })
}

fn decode_approvals(value: &Value) -> LedgerResult<Vec<ApprovalEntry>> {
    let items = value.as_array().ok_or_else(|| malformed("getApprovals", value))?;
    items
        .iter()
        .map(|item| {
            Ok(ApprovalEntry {
                signer: string_field(item, "signer", 0)?,
                role: string_field(item, "role", 1)?,
                timestamp: field(item, "timestamp", 2)
                    .and_then(decode_u64)
                    .and_then(|t| i64::try_from(t).ok())
                    .ok_or_else(|| malformed("timestamp", item))?,
            })
        })
        .collect()
}

fn decode_accounts(value: &Value) -> LedgerResult<Vec<String>> {
    let items = value.as_array().ok_or_else(|| malformed("accounts", value))?;
    Ok(items
        .iter()
        .filter_map(|v| v.as_str())
        .map(String::from)
        .collect())
}

fn decode_tx_hash(value: &Value) -> LedgerResult<String> {
    value
        .as_str()
        .or_else(|| value.get("txHash").and_then(|v| v.as_str()))
        .map(String::from)
        .ok_or_else(|| malformed("contract_send", value))
}

fn decode_receipt(tx_hash: &str, value: &Value) -> LedgerResult<ReceiptStatus> {
    if value.is_null() {
        return Ok(ReceiptStatus::Pending);
    }
    match value.get("status").and_then(|v| v.as_str()) {
        Some("pending") => Ok(ReceiptStatus::Pending),
        Some("success") => Ok(ReceiptStatus::Confirmed(TxReceipt {
            tx_hash: tx_hash.to_string(),
            ledger: value.get("ledger").and_then(decode_u64),
        })),
        Some("reverted") => Ok(ReceiptStatus::Reverted(
            value
                .get("reason")
                .and_then(|v| v.as_str())
                .unwrap_or("transaction reverted")
                .to_string(),
        )),
        _ => Err(malformed("contract_receipt", value)),
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
