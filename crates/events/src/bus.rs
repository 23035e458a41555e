//! Per-job-class progress event bus.
//!
//! [`ProgressBus`] owns one [`ProgressChannel`] per [`JobClass`]. Each
//! channel keeps a registry of subscriber queues and copies every
//! published event into each of them, so any number of streaming
//! connections can watch the same class without racing for events.
//!
//! Subscriptions unregister themselves on drop. Publishing never blocks
//! and never fails; with no subscribers the event is simply discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gridlab_core::types::JobClass;
use parking_lot::RwLock;

use crate::event::ProgressEvent;
use crate::queue::{Recv, SubscriberQueue};

/// Default per-subscriber queue bound.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// ProgressChannel
// ---------------------------------------------------------------------------

/// Fan-out channel for a single job class.
pub struct ProgressChannel {
    class: JobClass,
    queue_capacity: usize,
    next_subscriber_id: AtomicU64,
    subscribers: RwLock<HashMap<u64, Arc<SubscriberQueue>>>,
    published: AtomicU64,
}

impl ProgressChannel {
    fn new(class: JobClass, queue_capacity: usize) -> Self {
        Self {
            class,
            queue_capacity,
            next_subscriber_id: AtomicU64::new(1),
            subscribers: RwLock::new(HashMap::new()),
            published: AtomicU64::new(0),
        }
    }

    pub fn class(&self) -> JobClass {
        self.class
    }

    /// Copy `event` into every registered subscriber queue.
    pub fn publish(&self, event: ProgressEvent) {
        self.published.fetch_add(1, Ordering::Relaxed);
        let subscribers = self.subscribers.read();
        for queue in subscribers.values() {
            queue.push(event.clone());
        }
    }

    /// Register a new subscriber queue.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(SubscriberQueue::new(self.queue_capacity));
        self.subscribers.write().insert(id, Arc::clone(&queue));
        tracing::debug!(job_class = %self.class, subscriber_id = id, "Progress subscriber registered");

        Subscription {
            id,
            queue,
            channel: Arc::clone(self),
        }
    }

    fn unsubscribe(&self, id: u64) {
        if self.subscribers.write().remove(&id).is_some() {
            tracing::debug!(job_class = %self.class, subscriber_id = id, "Progress subscriber removed");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Total events published on this channel since startup.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Close every subscriber queue so open streams finish.
    fn close_all(&self) {
        for queue in self.subscribers.read().values() {
            queue.close();
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A registered consumer of one job class's events.
///
/// Receives a copy of every event published after it was created. Events
/// published before subscription are not replayed.
pub struct Subscription {
    id: u64,
    queue: Arc<SubscriberQueue>,
    channel: Arc<ProgressChannel>,
}

impl Subscription {
    pub fn class(&self) -> JobClass {
        self.channel.class
    }

    /// Wait for the next event; `None` once the bus has shut down.
    pub async fn recv(&self) -> Option<ProgressEvent> {
        self.queue.recv().await
    }

    /// Wait up to `timeout` for the next event.
    pub async fn recv_timeout(&self, timeout: Duration) -> Recv {
        self.queue.recv_timeout(timeout).await
    }

    /// Log events shed from this subscriber's queue under overload.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.channel.unsubscribe(self.id);
    }
}

// ---------------------------------------------------------------------------
// ProgressBus
// ---------------------------------------------------------------------------

/// Snapshot of one channel's activity.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChannelStats {
    pub job_class: JobClass,
    pub subscribers: usize,
    pub published: u64,
}

/// One progress channel per job class.
///
/// Designed to be shared via `Arc<ProgressBus>` between the supervisor
/// (producer side) and the streaming endpoints (consumer side).
pub struct ProgressBus {
    channels: HashMap<JobClass, Arc<ProgressChannel>>,
}

impl ProgressBus {
    pub fn new(queue_capacity: usize) -> Self {
        let channels = JobClass::ALL
            .into_iter()
            .map(|class| (class, Arc::new(ProgressChannel::new(class, queue_capacity))))
            .collect();
        Self { channels }
    }

    pub fn channel(&self, class: JobClass) -> Arc<ProgressChannel> {
        // Every class is registered in `new`.
        Arc::clone(&self.channels[&class])
    }

    /// Route `event` to the channel of its job class.
    pub fn publish(&self, event: ProgressEvent) {
        self.channels[&event.job_class].publish(event);
    }

    pub fn subscribe(&self, class: JobClass) -> Subscription {
        self.channels[&class].subscribe()
    }

    /// Open subscriptions across all classes.
    pub fn subscriber_count(&self) -> usize {
        self.channels.values().map(|c| c.subscriber_count()).sum()
    }

    pub fn stats(&self) -> Vec<ChannelStats> {
        JobClass::ALL
            .into_iter()
            .map(|class| {
                let channel = &self.channels[&class];
                ChannelStats {
                    job_class: class,
                    subscribers: channel.subscriber_count(),
                    published: channel.published_count(),
                }
            })
            .collect()
    }

    /// Close every open subscription. Used during graceful shutdown.
    pub fn close_all(&self) {
        for channel in self.channels.values() {
            channel.close_all();
        }
        tracing::info!("Progress bus closed all subscriptions");
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use gridlab_core::types::JobStatus;

    use super::*;
    use crate::event::EventPayload;

    fn progress(job_id: &str, class: JobClass, seq: u64) -> ProgressEvent {
        ProgressEvent::new(
            job_id,
            class,
            seq,
            EventPayload::Progress {
                percent: 10.0,
                message: String::new(),
            },
        )
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let bus = ProgressBus::default();
        let a = bus.subscribe(JobClass::Forecast);
        let b = bus.subscribe(JobClass::Forecast);

        bus.publish(progress("j1", JobClass::Forecast, 0));
        bus.publish(progress("j1", JobClass::Forecast, 1));

        for sub in [&a, &b] {
            assert_eq!(sub.recv().await.unwrap().seq, 0);
            assert_eq!(sub.recv().await.unwrap().seq, 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn classes_never_share_a_channel() {
        let bus = ProgressBus::default();
        let forecast = bus.subscribe(JobClass::Forecast);
        let optimization = bus.subscribe(JobClass::NetworkOptimization);

        bus.publish(progress("j1", JobClass::Forecast, 0));

        assert!(matches!(
            forecast.recv_timeout(Duration::from_secs(1)).await,
            Recv::Event(_)
        ));
        assert!(matches!(
            optimization.recv_timeout(Duration::from_secs(1)).await,
            Recv::Idle
        ));
    }

    #[test]
    fn publish_without_subscribers_is_discarded() {
        let bus = ProgressBus::default();
        bus.publish(progress("orphan", JobClass::ProfileGeneration, 0));
        assert_eq!(bus.channel(JobClass::ProfileGeneration).published_count(), 1);
    }

    #[test]
    fn dropping_subscription_unregisters_it() {
        let bus = ProgressBus::default();
        let sub = bus.subscribe(JobClass::Forecast);
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn interleaved_jobs_keep_per_job_order() {
        let bus = ProgressBus::default();
        let sub = bus.subscribe(JobClass::Forecast);

        for seq in 0..3 {
            bus.publish(progress("a", JobClass::Forecast, seq));
            bus.publish(progress("b", JobClass::Forecast, seq));
        }

        let mut per_job: HashMap<String, Vec<u64>> = HashMap::new();
        for _ in 0..6 {
            let event = sub.recv().await.unwrap();
            per_job.entry(event.job_id.clone()).or_default().push(event.seq);
        }
        assert_eq!(per_job["a"], vec![0, 1, 2]);
        assert_eq!(per_job["b"], vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn close_all_ends_open_subscriptions() {
        let bus = ProgressBus::default();
        let sub = bus.subscribe(JobClass::Forecast);
        bus.publish(ProgressEvent::new(
            "j",
            JobClass::Forecast,
            0,
            EventPayload::Terminal {
                status: JobStatus::Completed,
                failure: None,
                error: None,
            },
        ));

        bus.close_all();

        assert!(sub.recv().await.unwrap().is_terminal());
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn stats_report_every_class() {
        let bus = ProgressBus::default();
        let _sub = bus.subscribe(JobClass::NetworkOptimization);
        let stats = bus.stats();
        assert_eq!(stats.len(), 3);
        let opt = stats
            .iter()
            .find(|s| s.job_class == JobClass::NetworkOptimization)
            .unwrap();
        assert_eq!(opt.subscribers, 1);
    }
}
