//! Admission queue between the feed task and the simulation driver.

use crate::entity::TradeEvent;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Trade events accumulated between two admission ticks.
pub type Batch = Vec<TradeEvent>;

/// Thread-shared buffer of decoded events awaiting admission.
///
/// Cloning yields another handle to the same buffer. Producers `enqueue`
/// from any thread; the driver calls `drain_all` once per admission tick.
#[derive(Debug, Clone, Default)]
pub struct AdmissionQueue {
    inner: Arc<QueueInner>,
}

#[derive(Debug, Default)]
struct QueueInner {
    buffer: Mutex<Vec<TradeEvent>>,
    total_enqueued: AtomicU64,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event to the pending batch.
    pub fn enqueue(&self, event: TradeEvent) {
        self.inner.buffer.lock().push(event);
        self.inner.total_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes everything buffered since the previous drain.
    ///
    /// Swaps the buffer out under the lock, so a concurrent `enqueue` lands
    /// either in this batch or the next one, never in neither.
    pub fn drain_all(&self) -> Batch {
        std::mem::take(&mut *self.inner.buffer.lock())
    }

    /// Number of events currently waiting.
    pub fn len(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events enqueued over the queue's lifetime.
    pub fn total_enqueued(&self) -> u64 {
        self.inner.total_enqueued.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{IdGenerator, Side};
    use std::collections::HashSet;
    use std::sync::atomic::AtomicBool;

    fn event(ids: &IdGenerator) -> TradeEvent {
        TradeEvent::new(ids.next_id(), Side::Buy, 100.0, 1.0)
    }

    #[test]
    fn test_drain_empties_queue() {
        let ids = IdGenerator::default();
        let queue = AdmissionQueue::new();

        queue.enqueue(event(&ids));
        queue.enqueue(event(&ids));
        assert_eq!(queue.len(), 2);

        let batch = queue.drain_all();
        assert_eq!(batch.len(), 2);
        assert!(queue.is_empty());
        assert!(queue.drain_all().is_empty());
        assert_eq!(queue.total_enqueued(), 2);
    }

    #[test]
    fn test_clones_share_buffer() {
        let ids = IdGenerator::default();
        let producer = AdmissionQueue::new();
        let consumer = producer.clone();

        producer.enqueue(event(&ids));
        assert_eq!(consumer.drain_all().len(), 1);
    }

    #[test]
    fn test_concurrent_enqueue_then_single_drain() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 2_500;

        let ids = Arc::new(IdGenerator::default());
        let queue = AdmissionQueue::new();

        std::thread::scope(|scope| {
            for _ in 0..PRODUCERS {
                let queue = queue.clone();
                let ids = Arc::clone(&ids);
                scope.spawn(move || {
                    for _ in 0..PER_PRODUCER {
                        queue.enqueue(event(&ids));
                    }
                });
            }
        });

        let batch = queue.drain_all();
        assert_eq!(batch.len(), PRODUCERS * PER_PRODUCER);

        let unique: HashSet<_> = batch.iter().map(|e| e.id()).collect();
        assert_eq!(unique.len(), PRODUCERS * PER_PRODUCER);
    }

    #[test]
    fn test_concurrent_drain_loses_nothing() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 5_000;

        let ids = Arc::new(IdGenerator::default());
        let queue = AdmissionQueue::new();
        let done = AtomicBool::new(false);
        let mut collected = Vec::new();

        std::thread::scope(|scope| {
            let consumer = {
                let queue = queue.clone();
                let done = &done;
                scope.spawn(move || {
                    let mut seen = Vec::new();
                    while !done.load(Ordering::Acquire) {
                        seen.extend(queue.drain_all());
                        std::thread::yield_now();
                    }
                    seen
                })
            };

            let producers: Vec<_> = (0..PRODUCERS)
                .map(|_| {
                    let queue = queue.clone();
                    let ids = Arc::clone(&ids);
                    scope.spawn(move || {
                        for _ in 0..PER_PRODUCER {
                            queue.enqueue(event(&ids));
                        }
                    })
                })
                .collect();

            for producer in producers {
                producer.join().unwrap();
            }
            done.store(true, Ordering::Release);
            collected = consumer.join().unwrap();
        });

        collected.extend(queue.drain_all());

        let unique: HashSet<_> = collected.iter().map(|e| e.id()).collect();
        assert_eq!(collected.len(), PRODUCERS * PER_PRODUCER);
        assert_eq!(unique.len(), collected.len());
    }
}
