use alloc::collections::VecDeque;

use log::warn;

use super::BatchRecord;
use crate::clock::Calibration;

/// FIFO of batch records awaiting transmission
///
/// Bounded: when full, the oldest record is evicted to make room so memory
/// stays fixed during long outages. The reducer is the only producer and the
/// transmission pipeline the only consumer.
#[derive(Debug)]
pub struct BatchQueue {
    records: VecDeque<BatchRecord>,
    capacity: usize,
    evicted: u32,
}

impl BatchQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            // Grown on demand; a full day of batches is not reserved up front.
            records: VecDeque::new(),
            capacity,
            evicted: 0,
        }
    }

    /// Append a record, returning the evicted oldest record if the queue was full
    pub fn push(&mut self, record: BatchRecord) -> Option<BatchRecord> {
        let evicted = if self.records.len() >= self.capacity {
            self.evicted = self.evicted.saturating_add(1);
            let oldest = self.records.pop_front();
            if let Some(oldest) = &oldest {
                warn!(" Batch queue full ({}), dropping oldest: {}", self.capacity, oldest);
            }
            oldest
        } else {
            None
        };

        self.records.push_back(record);
        evicted
    }

    pub fn pop_front(&mut self) -> Option<BatchRecord> {
        self.records.pop_front()
    }

    pub fn front(&self) -> Option<&BatchRecord> {
        self.records.front()
    }

    /// Move every queued timestamp into the epoch frame after the first calibration
    pub fn rebase_all(&mut self, calibration: &Calibration) {
        if !calibration.is_initial() {
            return;
        }
        for record in self.records.iter_mut() {
            record.timestamp_ms = calibration.rebase(record.timestamp_ms);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records evicted because the queue was full
    pub fn evicted(&self) -> u32 {
        self.evicted
    }

    pub fn iter(&self) -> impl Iterator<Item = &BatchRecord> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ts: u64) -> BatchRecord {
        BatchRecord::new(ts as f32, 0.0, ts)
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = BatchQueue::with_capacity(4);
        queue.push(record(1));
        queue.push(record(2));
        queue.push(record(3));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop_front().map(|r| r.timestamp_ms), Some(1));
        assert_eq!(queue.pop_front().map(|r| r.timestamp_ms), Some(2));
        assert_eq!(queue.pop_front().map(|r| r.timestamp_ms), Some(3));
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        let mut queue = BatchQueue::with_capacity(2);
        assert!(queue.push(record(1)).is_none());
        assert!(queue.push(record(2)).is_none());

        let evicted = queue.push(record(3));
        assert_eq!(evicted.map(|r| r.timestamp_ms), Some(1));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.evicted(), 1);
        assert_eq!(queue.front().map(|r| r.timestamp_ms), Some(2));
    }

    #[test]
    fn test_zero_capacity_still_holds_one() {
        let mut queue = BatchQueue::with_capacity(0);
        queue.push(record(1));
        queue.push(record(2));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.capacity(), 1);
    }

    #[test]
    fn test_rebase_only_on_initial_calibration() {
        let mut queue = BatchQueue::with_capacity(8);
        queue.push(record(5_000));
        queue.push(record(15_000));

        let drift = Calibration::Drift {
            previous_millis: 20_000,
            epoch_millis: 1_700_000_000_000,
        };
        queue.rebase_all(&drift);
        assert_eq!(queue.front().map(|r| r.timestamp_ms), Some(5_000));

        let initial = Calibration::Initial {
            device_millis: 20_000,
            epoch_millis: 1_700_000_000_000,
        };
        queue.rebase_all(&initial);
        let timestamps: alloc::vec::Vec<u64> = queue.iter().map(|r| r.timestamp_ms).collect();
        assert_eq!(timestamps, [1_699_999_985_000, 1_699_999_995_000]);
    }
}
