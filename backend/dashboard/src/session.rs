//! Wallet session: which account the dashboard is acting as.
//!
//! The current account lives in a [`watch`] channel so that request handlers
//! read a consistent value and background listeners see every change.
//! [`watch_accounts`] polls the wallet on an interval and feeds account
//! changes back into the session.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::errors::{DashboardError, Result};
use crate::ledger::AccountProvider;
use crate::roles::{ResolvedRole, RoleResolver};

pub struct WalletSession {
    provider: Option<Arc<dyn AccountProvider>>,
    account: watch::Sender<Option<String>>,
}

impl WalletSession {
    pub fn new(provider: Option<Arc<dyn AccountProvider>>) -> Self {
        let (account, _) = watch::channel(None);
        Self { provider, account }
    }

    pub fn current(&self) -> Option<String> {
        self.account.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.account.subscribe()
    }

    fn provider(&self) -> Result<&Arc<dyn AccountProvider>> {
        self.provider
            .as_ref()
            .ok_or_else(|| DashboardError::NoSession("no wallet provider configured".to_string()))
    }

    /// The connect action: ask the wallet for accounts and adopt the first.
    pub async fn connect(&self) -> Result<String> {
        let accounts = self
            .provider()?
            .request_accounts()
            .await
            .map_err(|e| {
                warn!("Wallet connection failed: {e}");
                DashboardError::NoSession(e.to_string())
            })?;
        self.handle_accounts_changed(&accounts);
        self.current().ok_or(DashboardError::NotConnected)
    }

    /// Adopt accounts the wallet has already authorised, without prompting.
    pub async fn restore(&self) -> Result<Option<String>> {
        let accounts = self
            .provider()?
            .accounts()
            .await
            .map_err(|e| DashboardError::NoSession(e.to_string()))?;
        if !accounts.is_empty() {
            self.handle_accounts_changed(&accounts);
        }
        Ok(self.current())
    }

    /// Apply an account-change notification: the first account, or none.
    pub fn handle_accounts_changed(&self, accounts: &[String]) {
        let next = accounts.first().cloned();
        self.account.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            info!("Wallet account changed: {:?} -> {:?}", current, next);
            *current = next.clone();
            true
        });
    }
}

/// Long-running task: poll the wallet and propagate account changes.
pub async fn watch_accounts(session: Arc<WalletSession>, interval: Duration) {
    let Some(provider) = session.provider.clone() else {
        warn!("No wallet provider; account watcher not started");
        return;
    };

    loop {
        match provider.accounts().await {
            Ok(accounts) => session.handle_accounts_changed(&accounts),
            Err(e) => warn!("Account poll failed: {e}"),
        }
        tokio::time::sleep(interval).await;
    }
}

/// Report the role behind every account switch. The role is looked up
/// fresh for each new account.
pub async fn log_role_changes(mut rx: watch::Receiver<Option<String>>, resolver: RoleResolver) {
    while rx.changed().await.is_ok() {
        let account = rx.borrow_and_update().clone();
        let role = resolver.resolve_role(account.as_deref()).await;
        match account {
            Some(account) => info!("Acting as {account} ({})", role.label()),
            None => info!("Wallet disconnected"),
        }
    }
}

/// `{account, role}` for one request. Rebuilt every time; never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionContext {
    pub account: Option<String>,
    pub role: ResolvedRole,
}

impl SessionContext {
    pub async fn load(session: &WalletSession, resolver: &RoleResolver) -> Self {
        let account = session.current();
        let role = resolver.resolve_role(account.as_deref()).await;
        Self { account, role }
    }

    pub fn require_account(&self) -> Result<&str> {
        self.account.as_deref().ok_or(DashboardError::NotConnected)
    }
}
