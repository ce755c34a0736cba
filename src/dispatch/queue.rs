//! Two-class pending queue with strict priority.
//!
//! Priority order: VIP > NORMAL. Within a class, orders leave in submission
//! order, except that preempted orders re-enter at the head of their class.

use std::collections::VecDeque;

use super::model::{Order, Priority};

/// Pending orders, one FIFO per priority class.
#[derive(Debug, Default)]
pub struct PendingQueues {
    vip: VecDeque<Order>,
    normal: VecDeque<Order>,
}

impl PendingQueues {
    pub fn new() -> Self {
        Self::default()
    }

    fn class_mut(&mut self, priority: Priority) -> &mut VecDeque<Order> {
        match priority {
            Priority::Vip => &mut self.vip,
            Priority::Normal => &mut self.normal,
        }
    }

    /// Append a freshly submitted order to the tail of its class.
    pub fn push_back(&mut self, order: Order) {
        self.class_mut(order.priority).push_back(order);
    }

    /// Put a preempted order back at the head of its class.
    pub fn requeue_front(&mut self, order: Order) {
        self.class_mut(order.priority).push_front(order);
    }

    /// Take the next order to serve: VIP head if any, else NORMAL head.
    pub fn pop_next(&mut self) -> Option<Order> {
        self.vip.pop_front().or_else(|| self.normal.pop_front())
    }

    pub fn len_of(&self, priority: Priority) -> usize {
        match priority {
            Priority::Vip => self.vip.len(),
            Priority::Normal => self.normal.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.vip.len() + self.normal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vip.is_empty() && self.normal.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::model::OrderId;
    use std::time::Duration;

    fn order(id: u64, priority: Priority) -> Order {
        Order {
            id: OrderId(id),
            priority,
            submitted_at: Duration::ZERO,
        }
    }

    fn drain(queues: &mut PendingQueues) -> Vec<u64> {
        std::iter::from_fn(|| queues.pop_next()).map(|o| o.id.0).collect()
    }

    #[test]
    fn test_vip_drains_before_normal() {
        let mut queues = PendingQueues::new();
        queues.push_back(order(1, Priority::Normal));
        queues.push_back(order(2, Priority::Vip));
        queues.push_back(order(3, Priority::Normal));
        queues.push_back(order(4, Priority::Vip));

        assert_eq!(drain(&mut queues), vec![2, 4, 1, 3]);
        assert!(queues.is_empty());
    }

    #[test]
    fn test_requeued_order_goes_to_head_of_its_class() {
        let mut queues = PendingQueues::new();
        queues.push_back(order(3, Priority::Normal));
        queues.push_back(order(4, Priority::Vip));
        queues.requeue_front(order(2, Priority::Normal));

        assert_eq!(queues.len_of(Priority::Normal), 2);
        assert_eq!(queues.len_of(Priority::Vip), 1);
        // The requeued NORMAL order stays behind VIP work.
        assert_eq!(drain(&mut queues), vec![4, 2, 3]);
    }

    #[test]
    fn test_pop_on_empty_is_none() {
        let mut queues = PendingQueues::new();
        assert!(queues.pop_next().is_none());
        assert_eq!(queues.len(), 0);
    }
}
