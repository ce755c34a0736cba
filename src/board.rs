//! Text rendering of the counter board.

use std::fmt;

use crate::dispatch::{Order, Snapshot, WorkerId};

/// `Order #3 (VIP)`, with ` (Bot 2)` appended while a bot holds it.
pub fn order_label(order: &Order, worker: Option<WorkerId>) -> String {
    match worker {
        Some(worker) => format!(
            "Order #{} ({}) (Bot {})",
            order.id,
            order.priority.label(),
            worker
        ),
        None => format!("Order #{} ({})", order.id, order.priority.label()),
    }
}

/// The bot count, the PENDING column and the COMPLETE column of a snapshot.
pub struct Board<'a>(pub &'a Snapshot);

impl fmt::Display for Board<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.0;
        writeln!(f, "Bot Count: {}", snapshot.worker_count())?;
        writeln!(f, "PENDING")?;
        for entry in &snapshot.pending {
            writeln!(f, "  {}", order_label(&entry.order, entry.worker))?;
        }
        writeln!(f, "COMPLETE")?;
        for done in &snapshot.completed {
            writeln!(f, "  {}", order_label(&done.order, None))?;
        }
        Ok(())
    }
}
