//! Bounded FIFO of charging events waiting for a free charging point.

use std::collections::VecDeque;

use crate::vehicle::ChargingEvent;

/// Sentinel used for `next_leave` when the queue is empty — larger than any
/// realistic simulation horizon.
pub const NEXT_LEAVE_SENTINEL: f64 = f64::INFINITY;

#[derive(Debug)]
pub struct WaitingQueue {
    capacity: usize,
    events: VecDeque<ChargingEvent>,
    /// Earliest `leaving_time` among queued events, or `+inf` when empty.
    pub next_leave: f64,
}

impl WaitingQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: VecDeque::new(),
            next_leave: NEXT_LEAVE_SENTINEL,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn has_room(&self) -> bool {
        self.events.len() < self.capacity
    }

    /// Appends `event`. Returns `false` (and drops the event) if the queue
    /// is full.
    pub fn enqueue(&mut self, event: ChargingEvent) -> bool {
        if !self.has_room() {
            return false;
        }
        self.events.push_back(event);
        self.refresh_watermark();
        true
    }

    pub fn dequeue(&mut self) -> Option<ChargingEvent> {
        let head = self.events.pop_front();
        self.refresh_watermark();
        head
    }

    /// Drops every queued event whose `leaving_time <= now`.
    pub fn purge_stale(&mut self, now: f64) {
        self.events.retain(|e| e.leaving_time() > now);
        self.refresh_watermark();
    }

    pub fn empty(&mut self) -> Vec<ChargingEvent> {
        let drained: Vec<_> = self.events.drain(..).collect();
        self.next_leave = NEXT_LEAVE_SENTINEL;
        drained
    }

    fn refresh_watermark(&mut self) {
        self.next_leave = self
            .events
            .iter()
            .map(|e| e.leaving_time())
            .fold(NEXT_LEAVE_SENTINEL, f64::min);
    }
}
