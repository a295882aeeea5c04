/*
    WD1772 Emulation

    Copyright 2026 The WD1772 Emulation Authors

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    scheduler.rs

    A deterministic event queue. Controllers never wait: they schedule an
    event for a future cycle and return.
*/

use std::{cmp::Ordering, collections::BinaryHeap};

use crate::devices::fdc::legacy::Agenda;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FdcEvent {
    /// The cycle engine's next step is due.
    Update,
    /// A legacy controller agenda fires.
    Agenda(Agenda),
}

/// The scheduling collaborator the controllers depend on.
pub trait Scheduler {
    /// Schedule `event` with argument `arg` to fire at cycle `at`.
    fn schedule(&mut self, at: u64, event: FdcEvent, arg: u32);
    /// Remove every pending instance of `event`.
    fn cancel(&mut self, event: FdcEvent);
    fn is_pending(&self, event: FdcEvent) -> bool;
    /// Remove every pending legacy agenda.
    fn cancel_agendas(&mut self);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QueuedEvent {
    pub at: u64,
    pub seq: u64,
    pub event: FdcEvent,
    pub arg: u32,
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on (time, insertion order).
        other.at.cmp(&self.at).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Clone, Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<QueuedEvent>,
    seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn next_time(&self) -> Option<u64> {
        self.heap.peek().map(|e| e.at)
    }

    /// Pop the earliest event due at or before `now`.
    pub fn pop_due(&mut self, now: u64) -> Option<QueuedEvent> {
        if self.heap.peek().is_some_and(|e| e.at <= now) {
            self.heap.pop()
        }
        else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl Scheduler for EventQueue {
    fn schedule(&mut self, at: u64, event: FdcEvent, arg: u32) {
        self.seq += 1;
        self.heap.push(QueuedEvent {
            at,
            seq: self.seq,
            event,
            arg,
        });
    }

    fn cancel(&mut self, event: FdcEvent) {
        self.heap.retain(|e| e.event != event);
    }

    fn is_pending(&self, event: FdcEvent) -> bool {
        self.heap.iter().any(|e| e.event == event)
    }

    fn cancel_agendas(&mut self) {
        self.heap.retain(|e| !matches!(e.event, FdcEvent::Agenda(_)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_and_ties() {
        let mut q = EventQueue::new();
        q.schedule(200, FdcEvent::Update, 0);
        q.schedule(100, FdcEvent::Agenda(Agenda::Seek), 0);
        q.schedule(100, FdcEvent::Agenda(Agenda::Verify), 0);

        assert!(q.pop_due(99).is_none());
        assert_eq!(q.pop_due(1000).map(|e| e.event), Some(FdcEvent::Agenda(Agenda::Seek)));
        assert_eq!(q.pop_due(1000).map(|e| e.event), Some(FdcEvent::Agenda(Agenda::Verify)));
        assert_eq!(q.pop_due(1000).map(|e| e.event), Some(FdcEvent::Update));
        assert!(q.is_empty());
    }

    #[test]
    fn test_cancel() {
        let mut q = EventQueue::new();
        q.schedule(10, FdcEvent::Agenda(Agenda::Seek), 1);
        q.schedule(20, FdcEvent::Agenda(Agenda::Seek), 2);
        q.schedule(30, FdcEvent::Agenda(Agenda::Finished), 0);
        q.schedule(40, FdcEvent::Update, 0);
        q.cancel(FdcEvent::Agenda(Agenda::Seek));
        assert!(!q.is_pending(FdcEvent::Agenda(Agenda::Seek)));
        assert_eq!(q.len(), 2);
        q.cancel_agendas();
        assert_eq!(q.next_time(), Some(40));
    }

    #[test]
    fn test_cancel_agendas_through_trait_object() {
        let mut q = EventQueue::new();
        q.schedule(10, FdcEvent::Agenda(Agenda::Seek), 0);
        q.schedule(20, FdcEvent::Update, 0);
        {
            let scheduler: &mut dyn Scheduler = &mut q;
            scheduler.cancel_agendas();
            assert!(!scheduler.is_pending(FdcEvent::Agenda(Agenda::Seek)));
        }
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop_due(100).map(|e| e.event), Some(FdcEvent::Update));
    }
}
