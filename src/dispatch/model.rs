//! Orders, workers, and the read-only views handed to the presentation layer.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Serialize, Serializer};

use super::DispatchError;

/// Unique, never-reused order number. Assigned at submission, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique, never-reused bot number. Assigned when the bot is added, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Priority class of an order. VIP is always served before NORMAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Normal,
    Vip,
}

impl Priority {
    /// Label used on the counter board.
    pub fn label(self) -> &'static str {
        match self {
            Priority::Normal => "Normal",
            Priority::Vip => "VIP",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Normal => write!(f, "NORMAL"),
            Priority::Vip => write!(f, "VIP"),
        }
    }
}

impl FromStr for Priority {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Priority::Normal),
            "vip" => Ok(Priority::Vip),
            _ => Err(DispatchError::InvalidPriority(s.to_string())),
        }
    }
}

/// A submitted order. The record never changes after submission; status is
/// derived from where the dispatcher currently holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub priority: Priority,
    #[serde(rename = "submitted_at_ms", serialize_with = "as_millis")]
    pub submitted_at: Duration,
}

/// Derived lifecycle position of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    /// Pending, with a bot bound to it.
    Processing,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkerStatus {
    Idle,
    Processing,
}

/// One row of the pending column, in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingEntry {
    pub order: Order,
    pub worker: Option<WorkerId>,
}

/// One row of the complete column, in completion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedOrder {
    pub order: Order,
    pub worker: WorkerId,
    #[serde(rename = "completed_at_ms", serialize_with = "as_millis")]
    pub completed_at: Duration,
}

/// A live bot and the order it is bound to, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerView {
    pub id: WorkerId,
    pub order: Option<OrderId>,
}

impl WorkerView {
    pub fn status(&self) -> WorkerStatus {
        match self.order {
            Some(_) => WorkerStatus::Processing,
            None => WorkerStatus::Idle,
        }
    }
}

/// Result of removing a bot: its id and the order it released, if it was busy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedWorker {
    pub id: WorkerId,
    pub preempted: Option<Order>,
}

/// Point-in-time copy of everything the presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    #[serde(rename = "now_ms", serialize_with = "as_millis")]
    pub now: Duration,
    #[serde(rename = "processing_ms", serialize_with = "as_millis")]
    pub processing: Duration,
    pub workers: Vec<WorkerView>,
    pub pending: Vec<PendingEntry>,
    pub completed: Vec<CompletedOrder>,
}

impl Snapshot {
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

/// Whole milliseconds in `value`, saturating at `u64::MAX`.
pub fn millis(value: Duration) -> u64 {
    u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
}

fn as_millis<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(millis(*value))
}
