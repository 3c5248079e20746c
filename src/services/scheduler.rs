use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::MAX_DURATION_SECS;
use crate::domain::ListingItem;
use crate::errors::{WatchError, WatchResult};
use crate::services::registry::SubscriberRegistry;
use crate::services::subscriber::{SharedSubscriber, SubscriberId};
use crate::sources::ListingSource;

/// Receives the filtered new listings of a cycle; never called with an empty batch.
pub type ItemsCallback = Arc<dyn Fn(SubscriberId, Vec<ListingItem>) + Send + Sync>;

/// Receives tick-time failures; the cycle keeps running afterwards.
pub type ErrorCallback = Arc<dyn Fn(SubscriberId, WatchError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Running => "running",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

struct Job {
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Job {
    /// Signal the cycle and wait for it. A tick already running finishes first.
    async fn cancel_and_wait(self, id: SubscriberId) {
        let _ = self.cancel.send(());
        if let Err(e) = self.handle.await {
            tracing::error!(subscriber = id, "Polling cycle ended abnormally: {}", e);
        }
    }
}

type JobSlot = Arc<Mutex<Option<Job>>>;

/// Drop a job whose task has ended without being cancelled, so the slot
/// reads as idle again.
fn reap_dead_job(id: SubscriberId, job: &mut Option<Job>) {
    if job.as_ref().is_some_and(|j| j.handle.is_finished()) {
        tracing::error!(subscriber = id, "Polling cycle died, clearing fetch job");
        *job = None;
    }
}

/// Runs one recurring polling cycle per running subscriber.
///
/// Each subscriber has its own job slot, so starting or stopping one
/// subscriber never waits on another subscriber's tick.
pub struct Scheduler {
    registry: Arc<SubscriberRegistry>,
    source: Arc<dyn ListingSource>,
    fetch_timeout: Duration,
    jobs: std::sync::Mutex<HashMap<SubscriberId, JobSlot>>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<SubscriberRegistry>,
        source: Arc<dyn ListingSource>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            source,
            fetch_timeout,
            jobs: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, id: SubscriberId) -> JobSlot {
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(id)
            .or_default()
            .clone()
    }

    fn existing_slot(&self, id: SubscriberId) -> Option<JobSlot> {
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&id)
            .cloned()
    }

    pub async fn start(
        &self,
        id: SubscriberId,
        interval: Duration,
        on_items: ItemsCallback,
        on_error: ErrorCallback,
    ) -> WatchResult<()> {
        if interval.is_zero() {
            return Err(WatchError::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if interval > Duration::from_secs(MAX_DURATION_SECS) {
            return Err(WatchError::Config(format!(
                "poll interval must be at most {} seconds",
                MAX_DURATION_SECS
            )));
        }
        let first_tick = Instant::now().checked_add(interval).ok_or_else(|| {
            WatchError::Config(format!(
                "poll interval of {}s is out of range",
                interval.as_secs()
            ))
        })?;

        let subscriber = self
            .registry
            .get(id)
            .ok_or_else(|| WatchError::NotFound(format!("subscriber {}", id)))?;

        let slot = self.slot(id);
        let mut job = slot.lock().await;
        reap_dead_job(id, &mut job);
        if job.is_some() {
            return Err(WatchError::AlreadyRunning(id));
        }

        let (cancel, cancelled) = oneshot::channel();
        let cycle = PollCycle {
            id,
            subscriber,
            source: self.source.clone(),
            fetch_timeout: self.fetch_timeout,
            first_tick,
            interval,
            on_items,
            on_error,
        };
        let handle = tokio::spawn(cycle.run(cancelled));

        *job = Some(Job { cancel, handle });

        tracing::info!(
            subscriber = id,
            interval_secs = interval.as_secs(),
            "Fetch job started"
        );
        Ok(())
    }

    /// Stop the cycle for `id`. Once this returns no further tick or callback
    /// for the subscriber will run.
    pub async fn stop(&self, id: SubscriberId) -> WatchResult<()> {
        let slot = self
            .existing_slot(id)
            .ok_or(WatchError::NotRunning(id))?;

        let mut job = slot.lock().await;
        reap_dead_job(id, &mut job);
        let running = job.take().ok_or(WatchError::NotRunning(id))?;
        running.cancel_and_wait(id).await;

        tracing::info!(subscriber = id, "Fetch job stopped");
        Ok(())
    }

    pub async fn job_state(&self, id: SubscriberId) -> JobState {
        let Some(slot) = self.existing_slot(id) else {
            return JobState::Idle;
        };

        let mut job = slot.lock().await;
        reap_dead_job(id, &mut job);
        if job.is_some() {
            JobState::Running
        } else {
            JobState::Idle
        }
    }

    /// Stop every running cycle and wait for all of them
    pub async fn shutdown(&self) {
        let slots: Vec<(SubscriberId, JobSlot)> = self
            .jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(id, slot)| (*id, slot.clone()))
            .collect();

        let mut stopped = 0;
        for (id, slot) in slots {
            if let Some(job) = slot.lock().await.take() {
                job.cancel_and_wait(id).await;
                stopped += 1;
            }
        }

        tracing::info!(stopped, "Scheduler shut down");
    }
}

struct PollCycle {
    id: SubscriberId,
    subscriber: SharedSubscriber,
    source: Arc<dyn ListingSource>,
    fetch_timeout: Duration,
    first_tick: Instant,
    interval: Duration,
    on_items: ItemsCallback,
    on_error: ErrorCallback,
}

impl PollCycle {
    async fn run(self, mut cancelled: oneshot::Receiver<()>) {
        let mut ticker = interval_at(self.first_tick, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut cancelled => break,
                _ = ticker.tick() => {}
            }

            self.tick().await;
        }
    }

    async fn tick(&self) {
        let report = {
            let mut subscriber = self.subscriber.lock().await;
            subscriber
                .poll_all(self.source.as_ref(), self.fetch_timeout)
                .await
        };

        let (items, failures) = report.into_parts();

        tracing::debug!(
            subscriber = self.id,
            new = items.len(),
            failed = failures.len(),
            "Tick complete"
        );

        if !items.is_empty() {
            (self.on_items)(self.id, items);
        }

        for failure in failures {
            tracing::warn!(subscriber = self.id, "{}", failure);
            (self.on_error)(self.id, failure);
        }
    }
}
