//! Order dispatch engine.
//!
//! A [`Dispatcher`] owns every order and bot, binds idle bots to pending
//! orders (VIP first, FIFO within a class), completes orders when their
//! processing timer fires, and returns work to the queue when a busy bot is
//! removed. Every operation runs to completion before the next one starts;
//! time only moves when the caller advances the clock.

pub mod model;
pub mod queue;
pub mod timer;

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;

pub use self::model::{
    millis, CompletedOrder, Order, OrderId, OrderStatus, PendingEntry, Priority, RemovedWorker,
    Snapshot, WorkerId, WorkerStatus, WorkerView,
};
use self::queue::PendingQueues;
use self::timer::{CompletionTimers, TimerHandle};

/// Processing time of a single order when nothing else is configured.
pub const DEFAULT_PROCESSING: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid priority '{0}': expected 'normal' or 'vip'")]
    InvalidPriority(String),

    #[error("{kind} id space exhausted")]
    IdSpaceExhausted { kind: &'static str },
}

/// Registry entry for a live bot.
#[derive(Debug, Default)]
struct WorkerSlot {
    order: Option<Order>,
    completion: Option<TimerHandle>,
}

/// The single authority over order and bot state.
#[derive(Debug)]
pub struct Dispatcher {
    processing: Duration,
    now: Duration,
    last_order_id: u64,
    last_worker_id: u64,
    queues: PendingQueues,
    idle: VecDeque<WorkerId>,
    /// Every order ever submitted.
    orders: BTreeMap<OrderId, Order>,
    /// Orders not yet complete, in submission order.
    pending: BTreeSet<OrderId>,
    /// Live bots in the order they were added.
    workers: BTreeMap<WorkerId, WorkerSlot>,
    /// Reverse of the worker -> order binding.
    holders: HashMap<OrderId, WorkerId>,
    completed: Vec<CompletedOrder>,
    timers: CompletionTimers,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_PROCESSING)
    }
}

impl Dispatcher {
    pub fn new(processing: Duration) -> Self {
        Self {
            processing,
            now: Duration::ZERO,
            last_order_id: 0,
            last_worker_id: 0,
            queues: PendingQueues::new(),
            idle: VecDeque::new(),
            orders: BTreeMap::new(),
            pending: BTreeSet::new(),
            workers: BTreeMap::new(),
            holders: HashMap::new(),
            completed: Vec::new(),
            timers: CompletionTimers::new(),
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.processing())
    }

    /// Accept a new order and dispatch it if a bot is free.
    pub fn submit_order(&mut self, priority: Priority) -> Result<Order, DispatchError> {
        let id = self
            .last_order_id
            .checked_add(1)
            .ok_or(DispatchError::IdSpaceExhausted { kind: "order" })?;
        self.last_order_id = id;

        let order = Order {
            id: OrderId(id),
            priority,
            submitted_at: self.now,
        };
        self.orders.insert(order.id, order);
        self.pending.insert(order.id);
        self.queues.push_back(order);
        info!(order = %order.id, %priority, "Order submitted");

        self.dispatch();
        Ok(order)
    }

    /// Hire a new bot and give it work if any is waiting.
    pub fn add_worker(&mut self) -> Result<WorkerId, DispatchError> {
        let id = self
            .last_worker_id
            .checked_add(1)
            .ok_or(DispatchError::IdSpaceExhausted { kind: "worker" })?;
        self.last_worker_id = id;

        let worker = WorkerId(id);
        self.workers.insert(worker, WorkerSlot::default());
        self.idle.push_back(worker);
        info!(worker = %worker, total = self.workers.len(), "Bot added");

        self.dispatch();
        Ok(worker)
    }

    /// Remove the most recently added bot, busy or not.
    ///
    /// A busy bot's completion is cancelled and its order goes back to the
    /// head of its priority queue. No new work is dispatched. Returns `None`
    /// when there are no bots.
    pub fn remove_worker(&mut self) -> Option<RemovedWorker> {
        let Some((id, slot)) = self.workers.pop_last() else {
            debug!("No bots to remove");
            return None;
        };

        let preempted = match slot.order {
            Some(order) => {
                let cancelled = self.timers.cancel(id);
                debug_assert_eq!(
                    cancelled, slot.completion,
                    "timer out of sync with bot {id}"
                );
                self.holders.remove(&order.id);
                self.queues.requeue_front(order);
                warn!(
                    worker = %id,
                    order = %order.id,
                    "Bot removed mid-order; order requeued at head"
                );
                Some(order)
            }
            None => {
                self.idle.retain(|&w| w != id);
                info!(worker = %id, "Idle bot removed");
                None
            }
        };

        Some(RemovedWorker { id, preempted })
    }

    /// Move the clock forward by `by`, firing every completion that falls due.
    pub fn advance(&mut self, by: Duration) -> Vec<CompletedOrder> {
        self.advance_to(self.now.saturating_add(by))
    }

    /// Move the clock to `target`, firing completions in deadline order.
    ///
    /// Completions scheduled by work dispatched during the call fire too if
    /// their deadline is within `target`. A target in the past is a no-op.
    pub fn advance_to(&mut self, target: Duration) -> Vec<CompletedOrder> {
        let mut fired = Vec::new();
        while let Some((due, worker)) = self.timers.pop_due(target) {
            self.now = self.now.max(due);
            fired.extend(self.complete(worker));
        }
        self.now = self.now.max(target);
        fired
    }

    fn complete(&mut self, worker: WorkerId) -> Option<CompletedOrder> {
        let slot = self.workers.get_mut(&worker)?;
        let order = slot.order.take()?;
        slot.completion = None;

        self.holders.remove(&order.id);
        self.pending.remove(&order.id);
        let done = CompletedOrder {
            order,
            worker,
            completed_at: self.now,
        };
        self.completed.push(done.clone());
        self.idle.push_back(worker);
        info!(order = %order.id, worker = %worker, "Order complete");

        self.dispatch();
        Some(done)
    }

    /// Bind idle bots to pending orders until either runs out.
    fn dispatch(&mut self) {
        while let Some(&worker) = self.idle.front() {
            let Some(order) = self.queues.pop_next() else {
                break;
            };
            self.idle.pop_front();
            self.assign(worker, order);
        }
        debug!(
            idle = self.idle.len(),
            queued = self.queues.len(),
            "Dispatch settled"
        );
    }

    fn assign(&mut self, worker: WorkerId, order: Order) {
        let Some(slot) = self.workers.get_mut(&worker) else {
            // The idle queue only ever holds registered bots.
            self.queues.requeue_front(order);
            return;
        };
        let due = self.now.saturating_add(self.processing);
        slot.order = Some(order);
        slot.completion = Some(self.timers.schedule(worker, due));
        self.holders.insert(order.id, worker);
        info!(
            order = %order.id,
            worker = %worker,
            priority = %order.priority,
            due_ms = millis(due),
            "Order assigned"
        );
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn processing_duration(&self) -> Duration {
        self.processing
    }

    /// Earliest pending completion deadline.
    pub fn next_due(&self) -> Option<Duration> {
        self.timers.next_due()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn idle_worker_count(&self) -> usize {
        self.idle.len()
    }

    pub fn submitted_count(&self) -> usize {
        self.orders.len()
    }

    /// Orders waiting in the queue for `priority` (bound orders excluded).
    pub fn queued_count(&self, priority: Priority) -> usize {
        self.queues.len_of(priority)
    }

    pub fn order_status(&self, id: OrderId) -> Option<OrderStatus> {
        if !self.orders.contains_key(&id) {
            return None;
        }
        Some(if self.holders.contains_key(&id) {
            OrderStatus::Processing
        } else if self.pending.contains(&id) {
            OrderStatus::Pending
        } else {
            OrderStatus::Complete
        })
    }

    /// Bot currently bound to `id`.
    pub fn order_holder(&self, id: OrderId) -> Option<WorkerId> {
        self.holders.get(&id).copied()
    }

    /// Order currently bound to `worker`.
    pub fn worker_order(&self, worker: WorkerId) -> Option<OrderId> {
        self.workers
            .get(&worker)
            .and_then(|slot| slot.order.map(|o| o.id))
    }

    /// Every incomplete order in submission order, with its binding.
    pub fn pending_orders(&self) -> Vec<PendingEntry> {
        self.pending
            .iter()
            .filter_map(|id| self.orders.get(id))
            .map(|&order| PendingEntry {
                order,
                worker: self.order_holder(order.id),
            })
            .collect()
    }

    /// Completed orders in the order they finished.
    pub fn completed_orders(&self) -> &[CompletedOrder] {
        &self.completed
    }

    /// Live bots in the order they were added.
    pub fn workers(&self) -> Vec<WorkerView> {
        self.workers
            .iter()
            .map(|(&id, slot)| WorkerView {
                id,
                order: slot.order.map(|o| o.id),
            })
            .collect()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            now: self.now,
            processing: self.processing,
            workers: self.workers(),
            pending: self.pending_orders(),
            completed: self.completed.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(100);

    fn ids(entries: &[CompletedOrder]) -> Vec<u64> {
        entries.iter().map(|c| c.order.id.0).collect()
    }

    /// Every order sits in exactly one place; every bot is idle xor bound.
    fn assert_consistent(d: &Dispatcher) {
        let queued = d.queues.len();
        let bound = d.workers.values().filter(|s| s.order.is_some()).count();
        assert_eq!(queued + bound + d.completed.len(), d.orders.len());
        assert_eq!(bound, d.holders.len());
        assert_eq!(bound + d.idle.len(), d.workers.len());
        assert_eq!(bound, d.timers.len());
        for (&id, slot) in &d.workers {
            match slot.order {
                Some(order) => {
                    assert_eq!(d.holders.get(&order.id), Some(&id));
                    assert!(!d.idle.contains(&id));
                }
                None => assert!(d.idle.contains(&id)),
            }
        }
    }

    #[test]
    fn test_submit_without_bots_stays_queued() {
        let mut d = Dispatcher::new(TICK);
        let order = d.submit_order(Priority::Normal).unwrap();

        assert_eq!(order.id, OrderId(1));
        assert_eq!(d.order_status(order.id), Some(OrderStatus::Pending));
        assert_eq!(d.queued_count(Priority::Normal), 1);
        assert!(d.advance(TICK * 5).is_empty());
        assert_consistent(&d);
    }

    #[test]
    fn test_add_worker_picks_up_waiting_orders() {
        let mut d = Dispatcher::new(TICK);
        d.submit_order(Priority::Normal).unwrap();
        d.submit_order(Priority::Normal).unwrap();
        let bot = d.add_worker().unwrap();

        assert_eq!(d.worker_order(bot), Some(OrderId(1)));
        assert_eq!(d.order_status(OrderId(2)), Some(OrderStatus::Pending));
        assert_eq!(d.next_due(), Some(TICK));
        assert_consistent(&d);
    }

    #[test]
    fn test_advance_fires_chained_completions() {
        let mut d = Dispatcher::new(TICK);
        d.add_worker().unwrap();
        for _ in 0..3 {
            d.submit_order(Priority::Normal).unwrap();
        }

        let fired = d.advance(TICK * 3);
        assert_eq!(ids(&fired), vec![1, 2, 3]);
        assert_eq!(fired[2].completed_at, TICK * 3);
        assert_eq!(d.now(), TICK * 3);
        assert_eq!(d.idle_worker_count(), 1);
        assert_consistent(&d);
    }

    #[test]
    fn test_advance_to_past_is_noop() {
        let mut d = Dispatcher::new(TICK);
        d.advance(TICK * 2);
        assert!(d.advance_to(TICK).is_empty());
        assert_eq!(d.now(), TICK * 2);
    }

    #[test]
    fn test_remove_idle_worker_leaves_queue_alone() {
        let mut d = Dispatcher::new(TICK);
        d.add_worker().unwrap();
        let removed = d.remove_worker().unwrap();

        assert_eq!(removed.id, WorkerId(1));
        assert!(removed.preempted.is_none());
        assert_eq!(d.idle_worker_count(), 0);
        assert_consistent(&d);
    }

    #[test]
    fn test_remove_busy_worker_cancels_its_timer() {
        let mut d = Dispatcher::new(TICK);
        d.submit_order(Priority::Vip).unwrap();
        d.add_worker().unwrap();
        d.advance(TICK / 2);

        let removed = d.remove_worker().unwrap();
        assert_eq!(removed.preempted.map(|o| o.id), Some(OrderId(1)));
        assert!(d.next_due().is_none());
        assert!(d.advance(TICK * 2).is_empty());
        assert_eq!(d.order_status(OrderId(1)), Some(OrderStatus::Pending));
        assert_consistent(&d);
    }

    #[test]
    fn test_preempted_work_restarts_from_scratch() {
        let mut d = Dispatcher::new(TICK);
        d.submit_order(Priority::Normal).unwrap();
        d.add_worker().unwrap();
        d.advance(TICK / 2);
        d.remove_worker();
        d.add_worker().unwrap();

        // A full interval from re-assignment, not the remainder.
        assert_eq!(d.next_due(), Some(TICK / 2 + TICK));
        assert!(d.advance(TICK / 2).is_empty());
        assert_eq!(ids(&d.advance(TICK / 2)), vec![1]);
    }

    #[test]
    fn test_worker_ids_are_never_reused() {
        let mut d = Dispatcher::new(TICK);
        d.add_worker().unwrap();
        d.add_worker().unwrap();
        d.remove_worker();
        assert_eq!(d.add_worker().unwrap(), WorkerId(3));
    }

    #[test]
    fn test_order_id_exhaustion_leaves_state_unchanged() {
        let mut d = Dispatcher::new(TICK);
        d.last_order_id = u64::MAX;
        let err = d.submit_order(Priority::Vip).unwrap_err();

        assert!(matches!(err, DispatchError::IdSpaceExhausted { kind: "order" }));
        assert_eq!(d.submitted_count(), 0);
        assert_consistent(&d);
    }

    #[test]
    fn test_worker_id_exhaustion_is_reported() {
        let mut d = Dispatcher::new(TICK);
        d.last_worker_id = u64::MAX;
        assert!(d.add_worker().is_err());
        assert_eq!(d.worker_count(), 0);
    }

    #[test]
    fn test_unknown_order_has_no_status() {
        let d = Dispatcher::default();
        assert_eq!(d.processing_duration(), DEFAULT_PROCESSING);
        assert!(d.order_status(OrderId(9)).is_none());
    }

    #[test]
    fn test_from_config_uses_processing_ms() {
        let config = DispatchConfig { processing_ms: 250 };
        let d = Dispatcher::from_config(&config);
        assert_eq!(d.processing_duration(), Duration::from_millis(250));
    }
}
