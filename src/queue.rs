//! Delivery queue between the ingestion task and the delivery loop
//!
//! FIFO hand-off with a wake signal. Producers never block; the single
//! consumer waits on [`DeliveryQueue::drain_blocking`] while the queue is empty
//! and the liveness predicate holds.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{trace, warn};

use crate::types::Payload;

/// What to do when producers outpace the consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum QueuePolicy {
    /// Keep every payload. Memory grows without limit under a stalled consumer.
    #[default]
    Unbounded,

    /// Keep at most `capacity` payloads, discarding the oldest on overflow.
    DropOldest { capacity: usize },
}

/// Ordered, thread-safe payload queue.
#[derive(Debug, Default)]
pub struct DeliveryQueue {
    items: Mutex<VecDeque<Payload>>,
    notify: Notify,
    policy: QueuePolicy,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl DeliveryQueue {
    pub fn new(policy: QueuePolicy) -> Self {
        Self { policy, ..Self::default() }
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<Payload>> {
        // Critical sections never panic midway, so a poisoned queue is still consistent.
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a payload and wake one waiting consumer.
    ///
    /// Returns the payload discarded to make room, if the policy dropped one.
    pub fn enqueue(&self, payload: Payload) -> Option<Payload> {
        let evicted = {
            let mut items = self.items();
            let evicted = match self.policy {
                QueuePolicy::DropOldest { capacity } if items.len() >= capacity => {
                    items.pop_front()
                }
                _ => None,
            };
            items.push_back(payload);
            trace!("Enqueued payload ({} queued)", items.len());
            evicted
        };

        if evicted.is_some() {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!("Delivery queue full, dropped oldest payload ({} dropped so far)", total);
        }
        self.notify.notify_one();
        evicted
    }

    /// Remove the next payload without waiting.
    pub fn try_dequeue(&self) -> Option<Payload> {
        self.items().pop_front()
    }

    /// Wait for the next payload.
    ///
    /// Returns the next payload in insertion order as soon as one is queued.
    /// While the queue is empty, blocks as long as `keep_alive` holds and the
    /// queue is not closed; `keep_alive` is re-checked at least every
    /// `poll_interval`. Returns `None` once the queue is empty and liveness is gone.
    pub async fn drain_blocking<F>(&self, keep_alive: F, poll_interval: Duration) -> Option<Payload>
    where
        F: Fn() -> bool,
    {
        loop {
            if let Some(payload) = self.try_dequeue() {
                return Some(payload);
            }
            if self.is_closed() || !keep_alive() {
                return None;
            }
            // notify_one stores a permit, so an enqueue racing this wait is not lost.
            let _ = tokio::time::timeout(poll_interval, self.notify.notified()).await;
        }
    }

    /// Stop waiting consumers. Already queued payloads can still be drained.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Payloads discarded by the overflow policy so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn payload(n: u32) -> Payload {
        Payload::from(n.to_string().into_bytes())
    }

    proptest! {
        #[test]
        fn unbounded_queue_preserves_insertion_order(values in prop::collection::vec(any::<u32>(), 0..64)) {
            let queue = DeliveryQueue::new(QueuePolicy::Unbounded);
            for v in &values {
                prop_assert!(queue.enqueue(payload(*v)).is_none());
            }
            let drained: Vec<_> = std::iter::from_fn(|| queue.try_dequeue()).collect();
            let expected: Vec<_> = values.iter().map(|v| payload(*v)).collect();
            prop_assert_eq!(drained, expected);
        }
    }

    #[test]
    fn drop_oldest_keeps_the_newest_payloads() {
        let queue = DeliveryQueue::new(QueuePolicy::DropOldest { capacity: 2 });
        assert!(queue.enqueue(payload(1)).is_none());
        assert!(queue.enqueue(payload(2)).is_none());
        assert_eq!(queue.enqueue(payload(3)), Some(payload(1)));

        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.try_dequeue(), Some(payload(2)));
        assert_eq!(queue.try_dequeue(), Some(payload(3)));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn waiting_consumer_wakes_on_enqueue() {
        let queue = Arc::new(DeliveryQueue::new(QueuePolicy::Unbounded));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.drain_blocking(|| true, Duration::from_secs(30)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(payload(7));

        let received = tokio::time::timeout(Duration::from_secs(5), consumer)
            .await
            .expect("consumer did not wake")
            .unwrap();
        assert_eq!(received, Some(payload(7)));
    }

    #[tokio::test]
    async fn empty_queue_returns_once_liveness_fails() {
        let queue = DeliveryQueue::new(QueuePolicy::Unbounded);
        let checks = AtomicUsize::new(0);
        let keep_alive = || checks.fetch_add(1, Ordering::SeqCst) < 2;

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            queue.drain_blocking(keep_alive, Duration::from_millis(5)),
        )
        .await
        .expect("drain_blocking did not observe liveness change");

        assert!(result.is_none());
        assert_eq!(checks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn queued_payloads_drain_even_after_liveness_fails() {
        let queue = DeliveryQueue::new(QueuePolicy::Unbounded);
        queue.enqueue(payload(1));
        assert_eq!(queue.drain_blocking(|| false, Duration::from_millis(5)).await, Some(payload(1)));
        assert_eq!(queue.drain_blocking(|| false, Duration::from_millis(5)).await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_producers_lose_nothing_and_keep_their_own_order() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 250;

        let queue = Arc::new(DeliveryQueue::new(QueuePolicy::Unbounded));
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for seq in 0..PER_PRODUCER {
                        queue.enqueue(Payload::from(format!("{producer}:{seq}").into_bytes()));
                        if seq % 16 == 0 {
                            std::thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let received = tokio::time::timeout(Duration::from_secs(10), async {
            let mut received = Vec::with_capacity(PRODUCERS * PER_PRODUCER);
            while received.len() < PRODUCERS * PER_PRODUCER {
                if let Some(payload) = queue.drain_blocking(|| true, Duration::from_millis(5)).await {
                    received.push(payload);
                }
            }
            received
        })
        .await
        .expect("consumer did not receive every payload");

        for producer in producers {
            producer.join().unwrap();
        }
        assert!(queue.is_empty());

        let mut last_seq = vec![None; PRODUCERS];
        for payload in &received {
            let text = std::str::from_utf8(payload.as_bytes()).unwrap();
            let (producer, seq) = text.split_once(':').unwrap();
            let producer: usize = producer.parse().unwrap();
            let seq: usize = seq.parse().unwrap();
            // Strictly increasing per producer rules out both reordering and duplicates.
            assert!(last_seq[producer].is_none_or(|last| seq > last), "{text} out of order");
            last_seq[producer] = Some(seq);
        }
        assert_eq!(received.len(), PRODUCERS * PER_PRODUCER);
        assert!(last_seq.iter().all(|last| *last == Some(PER_PRODUCER - 1)));
    }

    #[tokio::test]
    async fn close_releases_a_waiting_consumer() {
        let queue = Arc::new(DeliveryQueue::new(QueuePolicy::Unbounded));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.drain_blocking(|| true, Duration::from_secs(30)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let received = tokio::time::timeout(Duration::from_secs(5), consumer)
            .await
            .expect("close did not wake the consumer")
            .unwrap();
        assert!(received.is_none());
    }
}
