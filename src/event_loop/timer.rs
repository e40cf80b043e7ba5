//! Timer queue.
//!
//! A min-heap of `(due, id)` pairs next to a map holding the timers
//! themselves. Cancelling only removes the map entry; the stale heap entry
//! is dropped when it reaches the top.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

use super::{EventId, TimerCallback};

/// Stand-in deadline for delays past what `Instant` can represent.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `now + delay`, clamped instead of overflowing.
pub(super) fn deadline(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

pub(super) struct Timer<C> {
    pub(super) due: Instant,
    pub(super) repeat: Option<Duration>,
    /// `None` while the callback is running.
    pub(super) callback: Option<TimerCallback<C>>,
}

pub(super) struct TimerQueue<C> {
    heap: BinaryHeap<Reverse<(Instant, EventId)>>,
    timers: HashMap<EventId, Timer<C>>,
}

impl<C> TimerQueue<C> {
    pub(super) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            timers: HashMap::new(),
        }
    }

    pub(super) fn insert(
        &mut self,
        id: EventId,
        due: Instant,
        repeat: Option<Duration>,
        callback: TimerCallback<C>,
    ) {
        self.heap.push(Reverse((due, id)));
        self.timers.insert(
            id,
            Timer {
                due,
                repeat,
                callback: Some(callback),
            },
        );
    }

    pub(super) fn cancel(&mut self, id: EventId) -> bool {
        self.timers.remove(&id).is_some()
    }

    pub(super) fn len(&self) -> usize {
        self.timers.len()
    }

    /// True if the heap entry still describes a live timer.
    fn is_current(&self, due: Instant, id: EventId) -> bool {
        self.timers.get(&id).is_some_and(|timer| timer.due == due)
    }

    /// Earliest pending deadline, discarding stale heap entries.
    pub(super) fn next_due(&mut self) -> Option<Instant> {
        while let Some(&Reverse((due, id))) = self.heap.peek() {
            if self.is_current(due, id) {
                return Some(due);
            }
            self.heap.pop();
        }
        None
    }

    /// Pops every timer due at or before `now`, in deadline order.
    pub(super) fn take_due(&mut self, now: Instant) -> Vec<EventId> {
        let mut due = Vec::new();
        while let Some(at) = self.next_due() {
            if at > now {
                break;
            }
            if let Some(Reverse((_, id))) = self.heap.pop() {
                due.push(id);
            }
        }
        due
    }

    pub(super) fn take_callback(&mut self, id: EventId) -> Option<TimerCallback<C>> {
        self.timers.get_mut(&id)?.callback.take()
    }

    /// Puts a callback back after it ran. Repeating timers are re-armed,
    /// one-shot timers are dropped. Does nothing if the timer was cancelled
    /// while running.
    pub(super) fn finish(&mut self, id: EventId, callback: TimerCallback<C>, now: Instant) {
        let Some(timer) = self.timers.get_mut(&id) else {
            return;
        };
        match timer.repeat {
            Some(interval) => {
                timer.due = deadline(now, interval);
                timer.callback = Some(callback);
                self.heap.push(Reverse((timer.due, id)));
            }
            None => {
                self.timers.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> TimerCallback<()> {
        Box::new(|_, _| Ok(()))
    }

    #[test]
    fn test_due_order() {
        let mut q = TimerQueue::new();
        let now = Instant::now();
        q.insert(EventId(1), now + Duration::from_millis(30), None, noop());
        q.insert(EventId(2), now + Duration::from_millis(10), None, noop());
        q.insert(EventId(3), now + Duration::from_secs(60), None, noop());

        assert_eq!(q.next_due(), Some(now + Duration::from_millis(10)));
        let due = q.take_due(now + Duration::from_millis(50));
        assert_eq!(due, vec![EventId(2), EventId(1)]);
    }

    #[test]
    fn test_cancel_is_lazy() {
        let mut q = TimerQueue::new();
        let now = Instant::now();
        q.insert(EventId(1), now, None, noop());
        q.insert(EventId(2), now + Duration::from_millis(5), None, noop());

        assert!(q.cancel(EventId(1)));
        assert!(!q.cancel(EventId(1)));
        assert_eq!(q.len(), 1);
        assert_eq!(q.next_due(), Some(now + Duration::from_millis(5)));
    }

    #[test]
    fn test_repeat_rearms() {
        let mut q = TimerQueue::new();
        let now = Instant::now();
        let every = Duration::from_millis(100);
        q.insert(EventId(7), now, Some(every), noop());

        assert_eq!(q.take_due(now), vec![EventId(7)]);
        let cb = q.take_callback(EventId(7)).unwrap();
        q.finish(EventId(7), cb, now);

        assert_eq!(q.len(), 1);
        assert_eq!(q.next_due(), Some(now + every));
        assert!(q.take_due(now).is_empty());
    }

    #[test]
    fn test_huge_delays_do_not_overflow() {
        let mut q = TimerQueue::new();
        let now = Instant::now();
        assert!(deadline(now, Duration::MAX) > now + Duration::from_secs(3600));

        q.insert(EventId(1), now, Some(Duration::MAX), noop());
        q.take_due(now);
        let cb = q.take_callback(EventId(1)).unwrap();
        q.finish(EventId(1), cb, now);

        assert_eq!(q.len(), 1);
        assert!(q.take_due(now + Duration::from_secs(3600)).is_empty());
    }

    #[test]
    fn test_one_shot_dropped_after_run() {
        let mut q = TimerQueue::new();
        let now = Instant::now();
        q.insert(EventId(1), now, None, noop());

        q.take_due(now);
        let cb = q.take_callback(EventId(1)).unwrap();
        q.finish(EventId(1), cb, now);
        assert_eq!(q.len(), 0);
        assert_eq!(q.next_due(), None);
    }
}
