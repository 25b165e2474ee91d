//! Event repository — fresh snapshots of funding proposals from the approval
//! ledger, plus the creation transaction.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::chain::RoleChain;
use crate::errors::{DashboardError, Result};
use crate::ledger::ApprovalLedger;
use crate::models::{
    ApprovalEntry, ApprovalRecord, Event, EventRecord, EventSummary, NewEvent, TxReceipt,
};
use crate::session::SessionContext;

#[derive(Clone)]
pub struct EventRepository {
    ledger: Arc<dyn ApprovalLedger>,
    chain: Arc<RoleChain>,
    default_department: Option<String>,
}

impl EventRepository {
    pub fn new(
        ledger: Arc<dyn ApprovalLedger>,
        chain: Arc<RoleChain>,
        default_department: Option<String>,
    ) -> Self {
        Self {
            ledger,
            chain,
            default_department,
        }
    }

    /// All events in creation order. Re-invoke to refresh.
    pub async fn list_events(&self) -> Result<Vec<EventSummary>> {
        let count = self.ledger.event_count().await.map_err(DashboardError::Read)?;

        let mut events = Vec::new();
        for id in 0..count {
            let record = self.ledger.fetch_event(id).await.map_err(DashboardError::Read)?;
            events.push(self.summary(id, record));
        }
        Ok(events)
    }

    /// One event with its approval history.
    ///
    /// The core record and the approval list are two reads, so a concurrent
    /// approval can land between them. The record's `approval_count` is kept
    /// as the authority; the list is returned as read.
    pub async fn get_event(&self, id: u64) -> Result<Event> {
        let record = self.ledger.fetch_event(id).await.map_err(DashboardError::Read)?;
        let approvals = self.ledger.get_approvals(id).await.map_err(DashboardError::Read)?;

        if approvals.len() != record.approval_count {
            warn!(
                "Event {id}: approval list has {} entries but approvalCount is {}",
                approvals.len(),
                record.approval_count
            );
        }

        let is_final_approved = self.is_final(&record);
        Ok(Event {
            id,
            department: record
                .department
                .or_else(|| self.default_department.clone()),
            approvals: approvals.into_iter().map(|a| self.approval_record(a)).collect(),
            club_name: record.club_name,
            title: record.title,
            description: record.description,
            requested_amount: record.requested_amount,
            created_by: record.created_by,
            approval_count: record.approval_count,
            is_final_approved,
        })
    }

    /// Submit a new proposal. Any connected account may propose.
    pub async fn create_event(&self, ctx: &SessionContext, event: &NewEvent) -> Result<TxReceipt> {
        let from = ctx.require_account()?;
        let receipt = self
            .ledger
            .create_event(
                from,
                &event.club_name,
                &event.title,
                &event.description,
                event.requested_amount,
            )
            .await
            .map_err(|e| DashboardError::from_write(e, DashboardError::Transaction))?;
        info!("Event '{}' proposed by {from} ({})", event.title, receipt.tx_hash);
        Ok(receipt)
    }

    fn is_final(&self, record: &EventRecord) -> bool {
        record.is_final_approved || record.approval_count >= self.chain.len()
    }

    fn summary(&self, id: u64, record: EventRecord) -> EventSummary {
        EventSummary {
            id,
            is_final_approved: self.is_final(&record),
            club_name: record.club_name,
            title: record.title,
            description: record.description,
            requested_amount: record.requested_amount,
            created_by: record.created_by,
            approval_count: record.approval_count,
        }
    }

    fn approval_record(&self, entry: ApprovalEntry) -> ApprovalRecord {
        let stage = self.chain.role(&entry.role);
        ApprovalRecord {
            sequence_index: stage.map(|r| r.sequence_index),
            role: stage.map(|r| r.label.clone()).unwrap_or(entry.role),
            signer: entry.signer,
            timestamp: DateTime::<Utc>::from_timestamp(entry.timestamp, 0).unwrap_or_default(),
        }
    }
}
