//! Bounded, order-preserving consultation request queue.
//!
//! Most-recent-first, fixed small capacity (the desk display shows five
//! slots). Identity is the hub-assigned request id: re-delivery of a known
//! id replaces the entry in place so at-least-once duplicates and status
//! updates are both absorbed the same way.

use std::collections::VecDeque;

use crate::messages::ConsultationRequest;

pub const DEFAULT_CAPACITY: usize = 5;

#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub request: ConsultationRequest,
    /// Transient "new" marker, cleared once by the display consumer.
    pub fresh: bool,
}

/// Outcome of `insert_or_update`, used by the coordinator to pick the
/// notification kind. Capacity management stays internal; the operation
/// itself never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueUpdate {
    Inserted,
    Updated,
}

#[derive(Debug)]
pub struct RequestQueue {
    entries: VecDeque<QueueEntry>,
    capacity: usize,
}

impl RequestQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Same id: replace in place, keep position, mark fresh. New id: insert
    /// at the head and evict the tail entry when over capacity. An id that
    /// was already evicted is a fresh insert again; the queue keeps no
    /// memory of evicted ids.
    pub fn insert_or_update(&mut self, request: ConsultationRequest) -> QueueUpdate {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.request.id == request.id) {
            entry.request = request;
            entry.fresh = true;
            return QueueUpdate::Updated;
        }
        self.entries.push_front(QueueEntry { request, fresh: true });
        while self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
        QueueUpdate::Inserted
    }

    /// Clears the fresh marker for one entry. Returns false when the id is
    /// not (or no longer) in the queue.
    pub fn consume_freshness(&mut self, id: u64) -> bool {
        match self.entries.iter_mut().find(|e| e.request.id == id) {
            Some(entry) => {
                entry.fresh = false;
                true
            }
            None => false,
        }
    }

    /// Current ordered contents, most recent first. Read-only copy for the
    /// display layer.
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.entries.iter().cloned().collect()
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::RequestStatus;
    use time::OffsetDateTime;

    fn request(id: u64, name: &str, status: RequestStatus) -> ConsultationRequest {
        ConsultationRequest {
            id,
            requester_name: name.into(),
            details: format!("question {id}"),
            course_code: None,
            requested_at: OffsetDateTime::UNIX_EPOCH,
            status,
        }
    }

    fn ids(queue: &RequestQueue) -> Vec<u64> {
        queue.snapshot().iter().map(|e| e.request.id).collect()
    }

    #[test]
    fn six_distinct_ids_evict_the_oldest() {
        let mut q = RequestQueue::new(5);
        for id in 1..=6 {
            assert_eq!(q.insert_or_update(request(id, "A", RequestStatus::Pending)), QueueUpdate::Inserted);
        }
        assert_eq!(q.len(), 5);
        assert_eq!(ids(&q), vec![6, 5, 4, 3, 2]);
    }

    #[test]
    fn update_in_place_keeps_position_and_size() {
        let mut q = RequestQueue::new(5);
        for id in 1..=5 {
            q.insert_or_update(request(id, "A", RequestStatus::Pending));
        }
        let update = q.insert_or_update(request(3, "A", RequestStatus::Accepted));
        assert_eq!(update, QueueUpdate::Updated);
        assert_eq!(q.len(), 5);
        assert_eq!(ids(&q), vec![5, 4, 3, 2, 1]);
        let snap = q.snapshot();
        let entry = snap.iter().find(|e| e.request.id == 3).unwrap();
        assert_eq!(entry.request.status, RequestStatus::Accepted);
        assert!(entry.fresh);
    }

    #[test]
    fn evicted_id_comes_back_as_fresh_insert() {
        let mut q = RequestQueue::new(2);
        q.insert_or_update(request(1, "A", RequestStatus::Pending));
        q.insert_or_update(request(2, "B", RequestStatus::Pending));
        q.insert_or_update(request(3, "C", RequestStatus::Pending)); // evicts 1
        assert_eq!(ids(&q), vec![3, 2]);

        // A late update for the evicted id lands at the head again.
        let update = q.insert_or_update(request(1, "A", RequestStatus::Accepted));
        assert_eq!(update, QueueUpdate::Inserted);
        assert_eq!(ids(&q), vec![1, 3]);
    }

    #[test]
    fn freshness_is_consumed_once() {
        let mut q = RequestQueue::new(5);
        q.insert_or_update(request(1, "A", RequestStatus::Pending));
        assert!(q.snapshot()[0].fresh);
        assert!(q.consume_freshness(1));
        assert!(!q.snapshot()[0].fresh);
        assert!(!q.consume_freshness(99));
    }

    #[test]
    fn update_remarks_entry_fresh_after_consumption() {
        let mut q = RequestQueue::new(5);
        q.insert_or_update(request(1, "A", RequestStatus::Pending));
        q.consume_freshness(1);
        q.insert_or_update(request(1, "A", RequestStatus::Accepted));
        assert!(q.snapshot()[0].fresh);
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let mut q = RequestQueue::new(0);
        q.insert_or_update(request(1, "A", RequestStatus::Pending));
        q.insert_or_update(request(2, "B", RequestStatus::Pending));
        assert_eq!(q.len(), 1);
        assert_eq!(ids(&q), vec![2]);
    }
}
