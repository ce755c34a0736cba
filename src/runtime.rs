//! Real-time driver for a [`Dispatcher`].
//!
//! One tokio task owns the dispatcher. Callers talk to it through a
//! [`RuntimeHandle`]; commands and completion deadlines are handled one at a
//! time on that task, so no two events ever interleave. The dispatcher's
//! virtual clock tracks wall-clock time elapsed since the task started.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::dispatch::{
    millis, DispatchError, Dispatcher, Order, Priority, RemovedWorker, Snapshot, WorkerId,
};

const COMMAND_BUFFER: usize = 64;
const NOT_RUNNING: &str = "dispatcher runtime is not running";

enum Command {
    Submit {
        priority: Priority,
        reply: oneshot::Sender<Result<Order, DispatchError>>,
    },
    AddWorker {
        reply: oneshot::Sender<Result<WorkerId, DispatchError>>,
    },
    RemoveWorker {
        reply: oneshot::Sender<Option<RemovedWorker>>,
    },
    Snapshot {
        reply: oneshot::Sender<Snapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<Snapshot>,
    },
}

/// Cloneable handle to a running dispatcher task.
#[derive(Clone)]
pub struct RuntimeHandle {
    tx: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

/// Move `dispatcher` onto its own task and start its clock.
pub fn spawn(dispatcher: Dispatcher) -> RuntimeHandle {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let (publish, snapshots) = watch::channel(dispatcher.snapshot());
    tokio::spawn(run(dispatcher, rx, publish));
    RuntimeHandle { tx, snapshots }
}

impl RuntimeHandle {
    async fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).await.map_err(|_| anyhow!(NOT_RUNNING))
    }

    pub async fn submit_order(&self, priority: Priority) -> Result<Order> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Submit { priority, reply }).await?;
        let order = rx.await.context(NOT_RUNNING)??;
        Ok(order)
    }

    pub async fn add_worker(&self) -> Result<WorkerId> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::AddWorker { reply }).await?;
        let worker = rx.await.context(NOT_RUNNING)??;
        Ok(worker)
    }

    pub async fn remove_worker(&self) -> Result<Option<RemovedWorker>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RemoveWorker { reply }).await?;
        rx.await.context(NOT_RUNNING)
    }

    pub async fn snapshot(&self) -> Result<Snapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.context(NOT_RUNNING)
    }

    /// Snapshots published after every event that changed state.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Stop the task and return the final state. Pending timers are dropped.
    pub async fn shutdown(self) -> Result<Snapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply }).await?;
        rx.await.context(NOT_RUNNING)
    }
}

async fn sleep_until_due(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run(
    mut dispatcher: Dispatcher,
    mut rx: mpsc::Receiver<Command>,
    publish: watch::Sender<Snapshot>,
) {
    let started = Instant::now();
    info!(
        processing_ms = millis(dispatcher.processing_duration()),
        "Dispatcher runtime started"
    );

    loop {
        let due = dispatcher.next_due();
        let deadline = due.map(|due| started + due);

        let command = tokio::select! {
            command = rx.recv() => command,
            _ = sleep_until_due(deadline) => {
                let target = started.elapsed().max(due.unwrap_or(Duration::ZERO));
                let fired = dispatcher.advance_to(target);
                if !fired.is_empty() {
                    publish.send_replace(dispatcher.snapshot());
                }
                continue;
            }
        };

        let Some(command) = command else {
            debug!("All runtime handles dropped");
            break;
        };

        // Anything that fell due while the command was in flight fires first.
        let mut changed = !dispatcher.advance_to(started.elapsed()).is_empty();

        match command {
            Command::Submit { priority, reply } => {
                let _ = reply.send(dispatcher.submit_order(priority));
                changed = true;
            }
            Command::AddWorker { reply } => {
                let _ = reply.send(dispatcher.add_worker());
                changed = true;
            }
            Command::RemoveWorker { reply } => {
                let removed = dispatcher.remove_worker();
                changed |= removed.is_some();
                let _ = reply.send(removed);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(dispatcher.snapshot());
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(dispatcher.snapshot());
                break;
            }
        }
        if changed {
            publish.send_replace(dispatcher.snapshot());
        }
    }

    info!(
        completed = dispatcher.completed_orders().len(),
        "Dispatcher runtime stopped"
    );
}
