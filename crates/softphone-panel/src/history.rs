//! Call history collaborator
//!
//! The panel never writes history itself; it emits [`HistoryUpdate`]s and the
//! runtime hands them to a [`CallHistory`] implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use softphone_call_core::{CallDirection, CallId, CallSummary, RemoteContact};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::PanelResult;

/// One change to the call log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HistoryUpdate {
    /// An inbound call started ringing
    StartIncoming {
        call_id: CallId,
        number: String,
        contact: Option<RemoteContact>,
    },
    /// We started dialing
    StartOutgoing { call_id: CallId, number: String },
    /// The call was answered
    Accepted { call_id: CallId },
    /// The established call ended; `done` is false when the user postponed it
    Finalize { summary: CallSummary, done: bool },
    /// The caller hung up before we answered
    Missed { summary: CallSummary },
    /// We hung up before the callee answered
    Canceled { summary: CallSummary },
    /// The call was refused by either side
    Rejected { summary: CallSummary },
    /// The call ended without an outcome (errors, denied microphone)
    Abandoned { call_id: CallId },
}

impl HistoryUpdate {
    pub fn call_id(&self) -> CallId {
        match self {
            Self::StartIncoming { call_id, .. }
            | Self::StartOutgoing { call_id, .. }
            | Self::Accepted { call_id }
            | Self::Abandoned { call_id } => *call_id,
            Self::Finalize { summary, .. }
            | Self::Missed { summary }
            | Self::Canceled { summary }
            | Self::Rejected { summary } => summary.call_id,
        }
    }
}

/// Status of a call log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Ringing,
    Ongoing,
    Done,
    /// Ended, with a follow-up still to do
    Pending,
    Missed,
    Canceled,
    Rejected,
    Abandoned,
}

/// A call log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub call_id: CallId,
    pub direction: CallDirection,
    pub number: String,
    pub contact: Option<RemoteContact>,
    pub status: HistoryStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    fn ringing(
        call_id: CallId,
        direction: CallDirection,
        number: String,
        contact: Option<RemoteContact>,
    ) -> Self {
        Self {
            call_id,
            direction,
            number,
            contact,
            status: HistoryStatus::Ringing,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    fn close(&mut self, summary: &CallSummary, status: HistoryStatus) {
        self.status = status;
        self.started_at = summary.started_at;
        self.ended_at = Some(summary.ended_at);
    }
}

/// Call log collaborator fed by the panel
#[async_trait]
pub trait CallHistory: Send + Sync {
    async fn record(&self, update: HistoryUpdate) -> PanelResult<()>;
}

/// Call log kept in memory, newest entry last
///
/// ```rust
/// use softphone_panel::{CallHistory, HistoryStatus, HistoryUpdate, InMemoryCallHistory};
/// # tokio_test::block_on(async {
/// let history = InMemoryCallHistory::new();
/// let call_id = uuid::Uuid::new_v4();
/// history
///     .record(HistoryUpdate::StartOutgoing { call_id, number: "101".into() })
///     .await
///     .unwrap();
/// history.record(HistoryUpdate::Abandoned { call_id }).await.unwrap();
/// assert_eq!(history.entry(call_id).await.unwrap().status, HistoryStatus::Abandoned);
/// # });
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryCallHistory {
    entries: Arc<RwLock<Vec<HistoryEntry>>>,
}

impl InMemoryCallHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.read().await.clone()
    }

    pub async fn entry(&self, call_id: CallId) -> Option<HistoryEntry> {
        self.entries
            .read()
            .await
            .iter()
            .rev()
            .find(|entry| entry.call_id == call_id)
            .cloned()
    }
}

#[async_trait]
impl CallHistory for InMemoryCallHistory {
    async fn record(&self, update: HistoryUpdate) -> PanelResult<()> {
        let mut entries = self.entries.write().await;
        let call_id = update.call_id();
        debug!(%call_id, ?update, "Recording call history");

        let index = entries.iter().rposition(|entry| entry.call_id == call_id);
        match (update, index) {
            (HistoryUpdate::StartIncoming { number, contact, .. }, None) => {
                entries.push(HistoryEntry::ringing(
                    call_id,
                    CallDirection::Inbound,
                    number,
                    contact,
                ));
            }
            (HistoryUpdate::StartOutgoing { number, .. }, None) => {
                entries.push(HistoryEntry::ringing(
                    call_id,
                    CallDirection::Outbound,
                    number,
                    None,
                ));
            }
            (HistoryUpdate::Accepted { .. }, Some(i)) => entries[i].status = HistoryStatus::Ongoing,
            (HistoryUpdate::Finalize { summary, done }, Some(i)) => {
                let status = if done {
                    HistoryStatus::Done
                } else {
                    HistoryStatus::Pending
                };
                entries[i].close(&summary, status);
            }
            (HistoryUpdate::Missed { summary }, Some(i)) => {
                entries[i].close(&summary, HistoryStatus::Missed)
            }
            (HistoryUpdate::Canceled { summary }, Some(i)) => {
                entries[i].close(&summary, HistoryStatus::Canceled)
            }
            (HistoryUpdate::Rejected { summary }, Some(i)) => {
                entries[i].close(&summary, HistoryStatus::Rejected)
            }
            (HistoryUpdate::Abandoned { .. }, Some(i)) => {
                entries[i].status = HistoryStatus::Abandoned;
                entries[i].ended_at = Some(Utc::now());
            }
            (update, _) => debug!(%call_id, ?update, "History update does not match the log"),
        }
        Ok(())
    }
}
