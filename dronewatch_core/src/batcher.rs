//! Fixed-window batch coalescing.
//!
//! `Coalescer` has no clock and no runtime: the caller passes the current
//! monotonic time in and polls `deadline()`. The telemetry engine races the
//! deadline against its submit channel; the simulator drives it from a
//! virtual clock.
//!
//! ```text
//! idle --push--> armed(deadline = now + window) --push--> armed (same deadline)
//!                   |                                        |
//!                   +------------- take() at deadline -------+--> idle
//! ```

use crate::telemetry::{DroneUpdate, UpdateBatch};
use std::time::Duration;

/// Buffers update batches and releases them once per window.
#[derive(Debug, Clone)]
pub struct Coalescer {
    window: Duration,
    buffer: Vec<UpdateBatch>,
    deadline: Option<Duration>,
}

impl Coalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            buffer: Vec::new(),
            deadline: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Buffer a batch. Returns true if this push armed a new deadline.
    ///
    /// Empty batches are ignored and never arm the timer.
    pub fn push(&mut self, batch: UpdateBatch, now: Duration) -> bool {
        if batch.is_empty() {
            return false;
        }
        self.buffer.push(batch);

        if self.deadline.is_none() {
            self.deadline = Some(now + self.window);
            true
        } else {
            false
        }
    }

    /// When the pending window closes, if one is armed.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn is_due(&self, now: Duration) -> bool {
        self.deadline.map_or(false, |d| now >= d)
    }

    /// Time left until the deadline (zero when overdue).
    pub fn remaining(&self, now: Duration) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_sub(now))
    }

    /// Release everything buffered, in arrival order, and disarm.
    pub fn take(&mut self) -> Option<Vec<DroneUpdate>> {
        self.deadline = None;
        if self.buffer.is_empty() {
            return None;
        }
        Some(UpdateBatch::concat(std::mem::take(&mut self.buffer)))
    }

    /// Disarm and discard the buffer. Returns the number of updates dropped.
    pub fn cancel(&mut self) -> usize {
        self.deadline = None;
        let dropped = self.pending_updates();
        self.buffer.clear();
        dropped
    }

    /// Batches waiting for the deadline.
    pub fn pending_batches(&self) -> usize {
        self.buffer.len()
    }

    /// Updates waiting for the deadline.
    pub fn pending_updates(&self) -> usize {
        self.buffer.iter().map(UpdateBatch::len).sum()
    }
}

impl Default for Coalescer {
    fn default() -> Self {
        Self::new(Duration::from_millis(80))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TrackStore;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn batch(ids: &[&str]) -> UpdateBatch {
        UpdateBatch::new(
            ids.iter()
                .enumerate()
                .map(|(i, id)| DroneUpdate::at(i as f64, 1.0).with_property("serial", *id))
                .collect(),
        )
    }

    #[test]
    fn test_first_push_arms_once() {
        let mut c = Coalescer::default();
        assert!(c.push(batch(&["a"]), ms(5)));
        assert!(!c.push(batch(&["b"]), ms(40)));
        assert_eq!(c.deadline(), Some(ms(85)));
        assert!(!c.is_due(ms(84)));
        assert!(c.is_due(ms(85)));
        assert_eq!(c.remaining(ms(60)), Some(ms(25)));
    }

    #[test]
    fn test_empty_batch_never_arms() {
        let mut c = Coalescer::default();
        assert!(!c.push(UpdateBatch::default(), ms(0)));
        assert_eq!(c.deadline(), None);
        assert!(c.take().is_none());
    }

    #[test]
    fn test_take_preserves_arrival_order_and_resets() {
        let mut c = Coalescer::default();
        c.push(batch(&["a", "b"]), ms(0));
        c.push(batch(&["c"]), ms(10));

        let updates = c.take().unwrap();
        let ids: Vec<&str> = updates.iter().filter_map(|u| u.transport_id()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(c.deadline(), None);
        assert_eq!(c.pending_batches(), 0);

        // next push opens a fresh window
        assert!(c.push(batch(&["d"]), ms(200)));
        assert_eq!(c.deadline(), Some(ms(280)));
    }

    #[test]
    fn test_cancel_discards() {
        let mut c = Coalescer::default();
        c.push(batch(&["a", "b"]), ms(0));
        c.push(batch(&["c"]), ms(1));
        assert_eq!(c.cancel(), 3);
        assert_eq!(c.deadline(), None);
        assert!(c.take().is_none());
    }

    #[test]
    fn test_ten_ids_in_five_sub_batches_merge_once() {
        let sub_batches = vec![
            batch(&["d0", "d1"]),
            batch(&["d2", "d3"]),
            batch(&["d4", "d5"]),
            batch(&["d6", "d7"]),
            batch(&["d8", "d9"]),
        ];

        let mut c = Coalescer::default();
        let mut coalesced = TrackStore::with_defaults().unwrap();
        for (i, b) in sub_batches.iter().enumerate() {
            c.push(b.clone(), ms(i as u64 * 15));
        }
        assert!(!c.is_due(ms(79)));
        let report = coalesced.apply_batch(&c.take().unwrap(), 0);
        assert_eq!(report.created, 10);
        assert_eq!(coalesced.snapshot().version(), 1);

        let mut direct = TrackStore::with_defaults().unwrap();
        direct.apply_batch(&UpdateBatch::concat(sub_batches), 0);

        let (a, b) = (coalesced.snapshot(), direct.snapshot());
        assert_eq!(a.len(), 10);
        for key in a.keys() {
            assert_eq!(a.get(key), b.get(key));
        }
    }
}
