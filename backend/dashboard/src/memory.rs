//! In-memory stand-in for both ledgers and the wallet, for tests.
//!
//! It re-validates approvals the way the real contracts do (stage order,
//! one signature per account, sufficient department balance), records the
//! name of every ledger call in order, and can inject read failures,
//! rejections and a racing approver.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::chain::RoleChain;
use crate::errors::LedgerError;
use crate::ledger::{AccountProvider, ApprovalLedger, BudgetLedger, LedgerResult};
use crate::models::{ApprovalEntry, EventRecord, TxReceipt};

#[derive(Default)]
struct State {
    events: Vec<EventRecord>,
    approvals: Vec<Vec<ApprovalEntry>>,
    roles: HashMap<String, String>,
    balances: HashMap<String, u64>,
    wallet: Vec<String>,
    calls: Vec<&'static str>,
    tx_counter: u64,
    read_failure: Option<String>,
    write_failure: Option<LedgerError>,
    /// Account that sneaks in an approval right before the next `approveEvent`.
    racer: Option<String>,
    /// Count reported by `eventCount` instead of the real one.
    reported_count: Option<u64>,
    /// The next `approveEvent` waits on this before touching state.
    approval_gate: Option<Arc<Notify>>,
}

pub struct MemoryLedger {
    chain: RoleChain,
    state: Mutex<State>,
}

impl MemoryLedger {
    pub fn new(chain: RoleChain) -> Self {
        Self {
            chain,
            state: Mutex::new(State::default()),
        }
    }

    pub fn three_stage() -> Self {
        Self::new(RoleChain::three_stage())
    }

    pub fn four_stage() -> Self {
        Self::new(RoleChain::four_stage())
    }

    pub fn chain(&self) -> &RoleChain {
        &self.chain
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    // ── Setup ────────────────────────────────────────────────

    pub fn assign_role(&self, account: &str, role: &str) {
        self.state()
            .roles
            .insert(account.to_lowercase(), role.to_string());
    }

    pub fn set_balance(&self, department: &str, balance: u64) {
        self.state().balances.insert(department.to_string(), balance);
    }

    pub fn balance(&self, department: &str) -> u64 {
        self.state().balances.get(department).copied().unwrap_or(0)
    }

    pub fn set_wallet_accounts(&self, accounts: &[&str]) {
        self.state().wallet = accounts.iter().map(|a| a.to_string()).collect();
    }

    /// Insert an event directly, bypassing `createEvent`. Returns its id.
    pub fn seed_event(&self, club_name: &str, amount: u64, department: &str) -> u64 {
        let mut state = self.state();
        state.events.push(EventRecord {
            club_name: club_name.to_string(),
            title: format!("{club_name} event"),
            description: format!("Proposal from {club_name}"),
            requested_amount: amount,
            created_by: "0xClub".to_string(),
            is_final_approved: false,
            approval_count: 0,
            department: (!department.is_empty()).then(|| department.to_string()),
        });
        state.approvals.push(Vec::new());
        (state.events.len() - 1) as u64
    }

    /// Overwrite the stored count without touching the approval list.
    pub fn set_approval_count(&self, id: u64, count: usize) {
        let mut state = self.state();
        let is_final = count >= self.chain.len();
        let record = &mut state.events[id as usize];
        record.approval_count = count;
        record.is_final_approved = is_final;
    }

    pub fn record(&self, id: u64) -> EventRecord {
        self.state().events[id as usize].clone()
    }

    pub fn approvals(&self, id: u64) -> Vec<ApprovalEntry> {
        self.state().approvals[id as usize].clone()
    }

    // ── Failure injection ────────────────────────────────────

    pub fn fail_reads(&self, message: &str) {
        self.state().read_failure = Some(message.to_string());
    }

    pub fn fail_writes(&self, error: LedgerError) {
        self.state().write_failure = Some(error);
    }

    pub fn race_next_approval(&self, account: &str) {
        self.state().racer = Some(account.to_string());
    }

    pub fn report_event_count(&self, count: u64) {
        self.state().reported_count = Some(count);
    }

    /// Hold the next `approveEvent` until `gate` is notified.
    pub fn hold_next_approval(&self, gate: Arc<Notify>) {
        self.state().approval_gate = Some(gate);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    // ── Ledger rules ─────────────────────────────────────────

    /// Apply an approval the way the contract does.
    pub fn approve_event_as(&self, id: u64, from: &str) -> LedgerResult<TxReceipt> {
        let mut state = self.state();
        self.apply_approval(&mut state, id, from)?;
        Ok(next_receipt(&mut state))
    }

    fn apply_approval(&self, state: &mut State, id: u64, from: &str) -> LedgerResult<()> {
        let role_label = state
            .roles
            .get(&from.to_lowercase())
            .cloned()
            .ok_or_else(|| LedgerError::Rejected("Caller has no role".to_string()))?;
        let record = state
            .events
            .get(id as usize)
            .ok_or_else(|| LedgerError::Rejected("Event does not exist".to_string()))?;

        if record.is_final_approved {
            return Err(LedgerError::Rejected("Event already fully approved".to_string()));
        }
        if state.approvals[id as usize]
            .iter()
            .any(|a| a.signer.eq_ignore_ascii_case(from))
        {
            return Err(LedgerError::Rejected("Already approved".to_string()));
        }
        let role = self
            .chain
            .role(&role_label)
            .ok_or_else(|| LedgerError::Rejected("Role cannot approve".to_string()))?;
        if role.sequence_index != record.approval_count {
            return Err(LedgerError::Rejected("Not your turn to approve".to_string()));
        }

        let label = role.label.clone();
        let count = record.approval_count + 1;
        let is_final = count >= self.chain.len();

        let record = &mut state.events[id as usize];
        record.approval_count = count;
        record.is_final_approved = is_final;
        state.approvals[id as usize].push(ApprovalEntry {
            signer: from.to_string(),
            role: label,
            timestamp: 1_704_067_200 + count as i64,
        });
        Ok(())
    }

    fn read<T>(
        &self,
        call: &'static str,
        f: impl FnOnce(&State) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let mut state = self.state();
        state.calls.push(call);
        if let Some(message) = &state.read_failure {
            return Err(LedgerError::Connectivity(message.clone()));
        }
        f(&*state)
    }

    fn write<T>(
        &self,
        call: &'static str,
        f: impl FnOnce(&mut State) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let mut state = self.state();
        state.calls.push(call);
        if let Some(error) = state.write_failure.take() {
            return Err(error);
        }
        f(&mut *state)
    }
}

fn next_receipt(state: &mut State) -> TxReceipt {
    state.tx_counter += 1;
    TxReceipt {
        tx_hash: format!("0x{:064x}", state.tx_counter),
        ledger: Some(1_000 + state.tx_counter),
    }
}

fn missing(id: u64) -> LedgerError {
    LedgerError::Rejected(format!("Event {id} does not exist"))
}

#[async_trait]
impl ApprovalLedger for MemoryLedger {
    async fn event_count(&self) -> LedgerResult<u64> {
        self.read("eventCount", |s| {
            Ok(s.reported_count.unwrap_or(s.events.len() as u64))
        })
    }

    async fn fetch_event(&self, id: u64) -> LedgerResult<EventRecord> {
        self.read("fetchEvent", |s| {
            s.events.get(id as usize).cloned().ok_or_else(|| missing(id))
        })
    }

    async fn get_approvals(&self, id: u64) -> LedgerResult<Vec<ApprovalEntry>> {
        self.read("getApprovals", |s| {
            s.approvals.get(id as usize).cloned().ok_or_else(|| missing(id))
        })
    }

    async fn get_role(&self, account: &str) -> LedgerResult<String> {
        self.read("getRole", |s| {
            Ok(s.roles.get(&account.to_lowercase()).cloned().unwrap_or_default())
        })
    }

    async fn create_event(
        &self,
        from: &str,
        club_name: &str,
        title: &str,
        description: &str,
        requested_amount: u64,
    ) -> LedgerResult<TxReceipt> {
        self.write("createEvent", |s| {
            s.events.push(EventRecord {
                club_name: club_name.to_string(),
                title: title.to_string(),
                description: description.to_string(),
                requested_amount,
                created_by: from.to_string(),
                is_final_approved: false,
                approval_count: 0,
                department: None,
            });
            s.approvals.push(Vec::new());
            Ok(next_receipt(s))
        })
    }

    async fn approve_event(&self, id: u64, from: &str) -> LedgerResult<TxReceipt> {
        let gate = self.state().approval_gate.take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.write("approveEvent", |s| {
            if let Some(racer) = s.racer.take() {
                self.apply_approval(s, id, &racer)?;
            }
            self.apply_approval(s, id, from)?;
            Ok(next_receipt(s))
        })
    }
}

#[async_trait]
impl BudgetLedger for MemoryLedger {
    async fn get_department_balance(&self, department: &str) -> LedgerResult<u64> {
        self.read("getDepartmentBalance", |s| {
            Ok(s.balances.get(department).copied().unwrap_or(0))
        })
    }

    async fn approve_event(
        &self,
        department: &str,
        amount: u64,
        _from: &str,
    ) -> LedgerResult<TxReceipt> {
        self.write("deduct", |s| {
            let balance = s.balances.get(department).copied().unwrap_or(0);
            if balance < amount {
                return Err(LedgerError::Rejected("Insufficient department balance".to_string()));
            }
            s.balances.insert(department.to_string(), balance - amount);
            Ok(next_receipt(s))
        })
    }
}

#[async_trait]
impl AccountProvider for MemoryLedger {
    async fn request_accounts(&self) -> LedgerResult<Vec<String>> {
        Ok(self.state().wallet.clone())
    }

    async fn accounts(&self) -> LedgerResult<Vec<String>> {
        Ok(self.state().wallet.clone())
    }
}
