use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::event::Event;

/// Heap entry ordered by (timestamp, insertion sequence).
///
/// `BinaryHeap` is a max-heap, so comparisons are reversed to pop the
/// earliest entry first. The sequence number makes the tie-break stable:
/// equal timestamps drain in insertion order, which is what makes a run
/// reproducible.
struct Entry {
    timestamp: i64,
    seq: u64,
    event: Event,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.timestamp, other.seq).cmp(&(self.timestamp, self.seq))
    }
}

/// Single ordered event queue; the engine is its only consumer.
#[derive(Default)]
pub struct EventQueue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        EventQueue {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn push(&mut self, event: Event) {
        let entry = Entry {
            timestamp: event.timestamp(),
            seq: self.next_seq,
            event,
        };
        self.next_seq += 1;
        self.heap.push(entry);
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop().map(|e| e.event)
    }

    /// Timestamp of the earliest queued event.
    pub fn peek_timestamp(&self) -> Option<i64> {
        self.heap.peek().map(|e| e.timestamp)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}
