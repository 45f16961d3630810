//! Dynamic check scheduling.
//!
//! The scheduler owns one recurring job per active target, keyed by
//! target id. `refresh()` tears the whole set down and rebuilds it from
//! the store, which is how hot reconfiguration works: the admin side
//! edits targets and fires a config event, the listener calls
//! `refresh()`, and no process restart is needed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::db::models::{MonitoredTarget, TargetStatus};
use crate::db::services::TargetStore;
use crate::monitoring::alert::AlertDispatcher;
use crate::monitoring::prober::Probe;
use crate::monitoring::transition;

/// Routing category for all monitoring alerts.
pub const ALERT_CATEGORY: &str = "monitoring";

pub const DEFAULT_POOL_SIZE: usize = 10;

/// Cancellable reference to one scheduled recurring check.
struct JobHandle {
    cancel: Arc<Notify>,
    task: JoinHandle<()>,
}

pub struct MonitorScheduler {
    store: Arc<dyn TargetStore>,
    prober: Arc<dyn Probe>,
    alerts: Arc<AlertDispatcher>,
    /// Caps the number of concurrently executing check ticks.
    probe_permits: Arc<Semaphore>,
    /// Mutated only from the refresh path; the mutex also serializes
    /// accidental overlapping refreshes.
    jobs: Mutex<HashMap<i64, JobHandle>>,
}

impl MonitorScheduler {
    pub fn new(
        store: Arc<dyn TargetStore>,
        prober: Arc<dyn Probe>,
        alerts: Arc<AlertDispatcher>,
        pool_size: usize,
    ) -> Self {
        Self {
            store,
            prober,
            alerts,
            probe_permits: Arc::new(Semaphore::new(pool_size.max(1))),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Establish the initial schedule.
    pub async fn start(&self) {
        self.refresh().await;
    }

    /// Reload all active targets and replace the current job set.
    ///
    /// Cancellation is non-interrupting: an in-flight tick of a
    /// cancelled job finishes normally, only future ticks are
    /// suppressed. If loading targets fails the previous set stays
    /// cancelled and monitoring pauses until the next refresh.
    pub async fn refresh(&self) {
        info!("Refreshing monitoring schedule...");
        let mut jobs = self.jobs.lock().await;

        let cancelled = jobs.len();
        for (_, job) in jobs.drain() {
            job.cancel.notify_one();
        }

        let targets = match self.store.list_active_targets().await {
            Ok(targets) => targets,
            Err(e) => {
                error!(error = %e, "Failed to load active targets; monitoring paused until next refresh");
                return;
            }
        };

        let mut scheduled = 0;
        for target in targets {
            if target.interval_seconds <= 0 {
                warn!(
                    target_id = target.id,
                    name = %target.name,
                    interval_seconds = target.interval_seconds,
                    "Skipping target with non-positive interval"
                );
                continue;
            }
            jobs.insert(target.id, self.spawn_job(&target));
            scheduled += 1;
        }

        info!(cancelled = cancelled, scheduled = scheduled, "Monitoring schedule refreshed");
    }

    /// Tear down all jobs for process shutdown. Unlike `refresh()` this
    /// also aborts the underlying tasks; the process is going away.
    pub async fn stop(&self) {
        let mut jobs = self.jobs.lock().await;
        let stopped = jobs.len();
        for (_, job) in jobs.drain() {
            job.cancel.notify_one();
            job.task.abort();
        }
        info!(stopped = stopped, "Monitor scheduler stopped");
    }

    /// Number of currently scheduled jobs.
    pub async fn job_count(&self) -> usize {
        self.jobs.lock().await.len()
    }

    fn spawn_job(&self, target: &MonitoredTarget) -> JobHandle {
        let cancel = Arc::new(Notify::new());
        let cancelled = Arc::clone(&cancel);
        let store = Arc::clone(&self.store);
        let prober = Arc::clone(&self.prober);
        let alerts = Arc::clone(&self.alerts);
        let permits = Arc::clone(&self.probe_permits);
        let target_id = target.id;
        let period = Duration::from_secs(target.interval_seconds as u64);

        let task = tokio::spawn(async move {
            // Fixed-rate ticking, matching the scheduling contract the
            // admin side relies on. A check that overruns its own
            // interval is re-invoked immediately on the next tick.
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = cancelled.notified() => break,
                    _ = ticker.tick() => {}
                }
                check_target(&*store, &*prober, &alerts, &permits, target_id).await;
            }
            debug!(target_id = target_id, "Check job cancelled");
        });

        JobHandle { cancel, task }
    }
}

/// One check tick for one target.
///
/// Looks the target up fresh so a tick firing after cancellation (or
/// after the target was deleted or deactivated) no-ops gracefully.
async fn check_target(
    store: &dyn TargetStore,
    prober: &dyn Probe,
    alerts: &AlertDispatcher,
    permits: &Semaphore,
    target_id: i64,
) {
    let Ok(_permit) = permits.acquire().await else {
        // Semaphore is never closed while the scheduler lives.
        return;
    };

    let target = match store.find_target(target_id).await {
        Ok(Some(target)) => target,
        Ok(None) => {
            debug!(target_id = target_id, "Target no longer exists, skipping stale tick");
            return;
        }
        Err(e) => {
            error!(target_id = target_id, error = %e, "Failed to load target for check");
            return;
        }
    };

    if !target.is_active {
        debug!(target_id = target.id, "Target deactivated, skipping stale tick");
        return;
    }

    let checked_at = chrono::Utc::now();
    let current = match prober.try_probe(&target.hostname).await {
        Ok(status) => {
            let status = TargetStatus::from(status);
            debug!(hostname = %target.hostname, status = %status, "Ping finished");
            status
        }
        Err(e) => {
            error!(hostname = %target.hostname, error = %e, "Error checking target");
            TargetStatus::Error
        }
    };

    if let Some(kind) = transition::decide(target.last_status, current) {
        let message = transition::format_alert(kind, &target, target.last_status, checked_at);
        alerts.dispatch(ALERT_CATEGORY, &message).await;
    }

    if let Err(e) = store.save_status(target.id, current, checked_at).await {
        error!(
            target_id = target.id,
            error = %e,
            "Failed to persist check result; result lost for this cycle"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BroadcastBus, BusError, BusSubscription, MessageBus};
    use crate::db::services::StoreError;
    use crate::monitoring::alert::ALERT_CHANNEL;
    use crate::monitoring::prober::{ProbeError, ProbeStatus};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MemoryStore {
        targets: StdMutex<HashMap<i64, MonitoredTarget>>,
        saves: StdMutex<Vec<(i64, TargetStatus)>>,
        fail_list: AtomicBool,
    }

    impl MemoryStore {
        fn new(targets: Vec<MonitoredTarget>) -> Self {
            Self {
                targets: StdMutex::new(targets.into_iter().map(|t| (t.id, t)).collect()),
                saves: StdMutex::new(Vec::new()),
                fail_list: AtomicBool::new(false),
            }
        }

        fn saves(&self) -> Vec<(i64, TargetStatus)> {
            self.saves.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TargetStore for MemoryStore {
        async fn list_active_targets(&self) -> Result<Vec<MonitoredTarget>, StoreError> {
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(StoreError::Database(sqlx::Error::PoolClosed));
            }
            Ok(self
                .targets
                .lock()
                .unwrap()
                .values()
                .filter(|t| t.is_active)
                .cloned()
                .collect())
        }

        async fn find_target(&self, id: i64) -> Result<Option<MonitoredTarget>, StoreError> {
            Ok(self.targets.lock().unwrap().get(&id).cloned())
        }

        async fn save_status(
            &self,
            id: i64,
            status: TargetStatus,
            checked_at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            let mut targets = self.targets.lock().unwrap();
            if let Some(target) = targets.get_mut(&id) {
                target.last_status = status;
                target.last_checked_at = Some(checked_at);
            }
            self.saves.lock().unwrap().push((id, status));
            Ok(())
        }
    }

    /// Probe double that replays a scripted sequence of outcomes and
    /// then reports UP forever.
    struct ScriptedProber {
        outcomes: StdMutex<VecDeque<Result<ProbeStatus, ProbeError>>>,
    }

    impl ScriptedProber {
        fn new(outcomes: Vec<Result<ProbeStatus, ProbeError>>) -> Self {
            Self {
                outcomes: StdMutex::new(outcomes.into()),
            }
        }
    }

    #[async_trait]
    impl Probe for ScriptedProber {
        async fn try_probe(&self, _hostname: &str) -> Result<ProbeStatus, ProbeError> {
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(ProbeStatus::Up))
        }
    }

    /// Bus whose publishes always fail.
    struct FailingBus;

    #[async_trait]
    impl MessageBus for FailingBus {
        async fn publish(&self, _channel: &str, _payload: &str) -> Result<(), BusError> {
            Err(BusError::Publish("bus unavailable".to_string()))
        }

        async fn subscribe(&self, _channel: &str) -> Result<BusSubscription, BusError> {
            Err(BusError::ChannelClosed)
        }
    }

    fn target(id: i64, interval: i32, last_status: TargetStatus) -> MonitoredTarget {
        MonitoredTarget {
            id,
            name: format!("host-{id}"),
            hostname: format!("10.0.0.{id}"),
            interval_seconds: interval,
            is_active: true,
            last_status,
            last_checked_at: None,
        }
    }

    fn scheduler(store: Arc<MemoryStore>, prober: Arc<dyn Probe>) -> MonitorScheduler {
        let alerts = Arc::new(AlertDispatcher::new(Arc::new(BroadcastBus::new())));
        MonitorScheduler::new(store, prober, alerts, DEFAULT_POOL_SIZE)
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_is_idempotent() {
        let store = Arc::new(MemoryStore::new(vec![
            target(1, 30, TargetStatus::Up),
            target(2, 60, TargetStatus::Up),
        ]));
        let sched = scheduler(store.clone(), Arc::new(ScriptedProber::new(vec![])));

        sched.refresh().await;
        assert_eq!(sched.job_count().await, 2);
        sched.refresh().await;
        assert_eq!(sched.job_count().await, 2);

        sched.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn non_positive_interval_is_skipped() {
        let store = Arc::new(MemoryStore::new(vec![
            target(1, 30, TargetStatus::Up),
            target(2, 0, TargetStatus::Up),
        ]));
        let sched = scheduler(store.clone(), Arc::new(ScriptedProber::new(vec![])));

        sched.refresh().await;
        assert_eq!(sched.job_count().await, 1);

        sched.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn store_failure_leaves_schedule_empty() {
        let store = Arc::new(MemoryStore::new(vec![target(1, 30, TargetStatus::Up)]));
        let sched = scheduler(store.clone(), Arc::new(ScriptedProber::new(vec![])));

        sched.refresh().await;
        assert_eq!(sched.job_count().await, 1);

        store.fail_list.store(true, Ordering::SeqCst);
        sched.refresh().await;
        assert_eq!(sched.job_count().await, 0);

        sched.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn jobs_tick_until_stopped() {
        let store = Arc::new(MemoryStore::new(vec![target(1, 30, TargetStatus::Up)]));
        let sched = scheduler(store.clone(), Arc::new(ScriptedProber::new(vec![])));

        sched.start().await;
        tokio::time::sleep(Duration::from_secs(61)).await;
        let ticked = store.saves().len();
        assert!(ticked >= 2, "expected at least two ticks, saw {ticked}");

        sched.stop().await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(store.saves().len(), ticked);
    }

    #[tokio::test]
    async fn stale_tick_for_missing_target_noops() {
        let store = Arc::new(MemoryStore::new(vec![]));
        let prober = ScriptedProber::new(vec![]);
        let alerts = AlertDispatcher::new(Arc::new(BroadcastBus::new()));
        let permits = Semaphore::new(1);

        check_target(&*store, &prober, &alerts, &permits, 42).await;

        assert!(store.saves().is_empty());
    }

    #[tokio::test]
    async fn stale_tick_for_deactivated_target_noops() {
        let mut inactive = target(1, 30, TargetStatus::Up);
        inactive.is_active = false;
        let store = Arc::new(MemoryStore::new(vec![inactive]));
        let prober = ScriptedProber::new(vec![]);
        let alerts = AlertDispatcher::new(Arc::new(BroadcastBus::new()));
        let permits = Semaphore::new(1);

        check_target(&*store, &prober, &alerts, &permits, 1).await;

        assert!(store.saves().is_empty());
    }

    #[tokio::test]
    async fn publish_failure_does_not_block_persistence() {
        let store = Arc::new(MemoryStore::new(vec![target(1, 30, TargetStatus::Up)]));
        let prober = ScriptedProber::new(vec![Ok(ProbeStatus::Down)]);
        let alerts = AlertDispatcher::new(Arc::new(FailingBus));
        let permits = Semaphore::new(1);

        check_target(&*store, &prober, &alerts, &permits, 1).await;

        assert_eq!(store.saves(), vec![(1, TargetStatus::Down)]);
    }

    #[tokio::test]
    async fn down_transition_emits_one_detailed_alert() {
        let mut switch = target(1, 30, TargetStatus::Up);
        switch.name = "core-switch".to_string();
        switch.hostname = "10.0.0.1".to_string();
        let store = Arc::new(MemoryStore::new(vec![switch]));
        let prober = ScriptedProber::new(vec![Ok(ProbeStatus::Down), Ok(ProbeStatus::Down)]);
        let bus = Arc::new(BroadcastBus::new());
        let mut sub = bus.subscribe(ALERT_CHANNEL).await.unwrap();
        let alerts = AlertDispatcher::new(bus.clone());
        let permits = Semaphore::new(1);

        check_target(&*store, &prober, &alerts, &permits, 1).await;
        // Second consecutive DOWN is steady state, no further alert.
        check_target(&*store, &prober, &alerts, &permits, 1).await;
        bus.publish(ALERT_CHANNEL, "sentinel").await.unwrap();

        let alert = sub.recv().await.unwrap();
        assert!(alert.starts_with("monitoring|"));
        assert!(alert.contains("core-switch"));
        assert!(alert.contains("10.0.0.1"));
        assert!(alert.contains("DOWN"));
        assert_eq!(sub.recv().await.unwrap(), "sentinel");

        assert_eq!(
            store.saves(),
            vec![(1, TargetStatus::Down), (1, TargetStatus::Down)]
        );
    }

    #[tokio::test]
    async fn repeated_probe_faults_alert_once() {
        let store = Arc::new(MemoryStore::new(vec![target(1, 30, TargetStatus::Up)]));
        let prober = ScriptedProber::new(vec![
            Err(ProbeError::EmptyHostname),
            Err(ProbeError::EmptyHostname),
        ]);
        let bus = Arc::new(BroadcastBus::new());
        let mut sub = bus.subscribe(ALERT_CHANNEL).await.unwrap();
        let alerts = AlertDispatcher::new(bus.clone());
        let permits = Semaphore::new(1);

        check_target(&*store, &prober, &alerts, &permits, 1).await;
        check_target(&*store, &prober, &alerts, &permits, 1).await;
        bus.publish(ALERT_CHANNEL, "sentinel").await.unwrap();

        let alert = sub.recv().await.unwrap();
        assert!(alert.contains("ERROR"));
        assert_eq!(sub.recv().await.unwrap(), "sentinel");

        assert_eq!(
            store.saves(),
            vec![(1, TargetStatus::Error), (1, TargetStatus::Error)]
        );
    }
}
