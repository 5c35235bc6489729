//! Periodic per-entity action scheduler.
//!
//! # Responsibilities
//! - Run an async action against each registered entity on its own timer
//! - Support one-shot and repeating registrations
//! - Change an entity's period or cancel it at any time
//!
//! # Design Decisions
//! - One Tokio task per entity; a slow action never delays another entity
//! - The next tick of an entity is armed only after its action finished,
//!   so ticks for the same entity never overlap
//! - Every registration carries a version; a timer whose version is no longer
//!   current exits without calling the action
//! - Errors and panics from the action are logged, never propagated

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Error type scheduled actions may return.
pub type ActionError = Box<dyn Error + Send + Sync>;

type EntityAction<T> = dyn Fn(T) -> BoxFuture<'static, Result<(), ActionError>> + Send + Sync;

struct Registration {
    version: u64,
    period_tx: watch::Sender<Duration>,
    cancel: CancellationToken,
    armed: bool,
}

struct SchedulerInner<T> {
    action: Box<EntityAction<T>>,
    run_once: bool,
    started: AtomicBool,
    next_version: AtomicU64,
    registrations: Mutex<HashMap<T, Registration>>,
    shutdown: CancellationToken,
}

impl<T> SchedulerInner<T>
where
    T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    fn lock(&self) -> MutexGuard<'_, HashMap<T, Registration>> {
        self.registrations.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_current(&self, entity: &T, version: u64) -> bool {
        self.lock()
            .get(entity)
            .map(|r| r.version == version)
            .unwrap_or(false)
    }

    fn remove_if_current(&self, entity: &T, version: u64) {
        let mut registrations = self.lock();
        if registrations.get(entity).map(|r| r.version) == Some(version) {
            registrations.remove(entity);
        }
    }

    fn arm(self: &Arc<Self>, entity: T, registration: &mut Registration) {
        registration.armed = true;
        tokio::spawn(run_timer(
            self.clone(),
            entity,
            registration.version,
            registration.period_tx.subscribe(),
            registration.cancel.clone(),
        ));
    }
}

async fn run_timer<T>(
    inner: Arc<SchedulerInner<T>>,
    entity: T,
    version: u64,
    mut period_rx: watch::Receiver<Duration>,
    cancel: CancellationToken,
) where
    T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    loop {
        let waiting_since = Instant::now();
        loop {
            let period = *period_rx.borrow_and_update();
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = period_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    // Re-measure against the new period; time already waited counts.
                    continue;
                }
                _ = tokio::time::sleep_until(waiting_since + period) => break,
            }
        }

        if cancel.is_cancelled() || !inner.is_current(&entity, version) {
            return;
        }

        let action = AssertUnwindSafe(async { (inner.action)(entity.clone()).await });
        match action.catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(entity = ?entity, error = %e, "Scheduled action failed");
            }
            Err(_) => {
                tracing::error!(entity = ?entity, "Scheduled action panicked");
            }
        }

        if inner.run_once {
            inner.remove_if_current(&entity, version);
            return;
        }
        if cancel.is_cancelled() {
            return;
        }
    }
}

/// Runs an action against registered entities on independent timers.
///
/// Must be used from within a Tokio runtime once started. Dropping the
/// scheduler cancels every outstanding timer.
pub struct EntityActionScheduler<T> {
    inner: Arc<SchedulerInner<T>>,
}

impl<T> EntityActionScheduler<T>
where
    T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    /// Create a scheduler.
    ///
    /// With `auto_start` false, registrations made before [`start`](Self::start)
    /// are held until then. With `run_once` true each registration fires once
    /// and is removed.
    pub fn new<F, Fut>(action: F, auto_start: bool, run_once: bool) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
    {
        let action: Box<EntityAction<T>> = Box::new(move |entity: T| action(entity).boxed());
        Self {
            inner: Arc::new(SchedulerInner {
                action,
                run_once,
                started: AtomicBool::new(auto_start),
                next_version: AtomicU64::new(0),
                registrations: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Begin dispatching. Registrations made before this call are armed now.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut registrations = self.inner.lock();
        for (entity, registration) in registrations.iter_mut() {
            if !registration.armed {
                self.inner.arm(entity.clone(), registration);
            }
        }
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    /// Register `entity`, replacing any existing registration for it.
    pub fn schedule_entity(&self, entity: T, period: Duration) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        let version = self.inner.next_version.fetch_add(1, Ordering::Relaxed) + 1;
        let (period_tx, _) = watch::channel(period);
        let mut registration = Registration {
            version,
            period_tx,
            cancel: self.inner.shutdown.child_token(),
            armed: false,
        };

        let mut registrations = self.inner.lock();
        if let Some(previous) = registrations.remove(&entity) {
            previous.cancel.cancel();
        }
        if self.is_started() {
            self.inner.arm(entity.clone(), &mut registration);
        }
        registrations.insert(entity, registration);
    }

    /// Change the period of an existing registration.
    ///
    /// A waiting timer keeps the time it already waited and fires once the
    /// new period has elapsed since its last tick. A running action is not
    /// interrupted and the new period applies from its next tick. Setting the
    /// current period again is a no-op.
    pub fn change_period(&self, entity: &T, period: Duration) -> bool {
        match self.inner.lock().get(entity) {
            Some(registration) => {
                registration.period_tx.send_if_modified(|current| {
                    if *current == period {
                        false
                    } else {
                        *current = period;
                        true
                    }
                });
                true
            }
            None => false,
        }
    }

    /// Cancel the registration for `entity`. Its action will not run again.
    pub fn unschedule_entity(&self, entity: &T) -> bool {
        match self.inner.lock().remove(entity) {
            Some(registration) => {
                registration.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, entity: &T) -> bool {
        self.inner.lock().contains_key(entity)
    }

    pub fn scheduled_count(&self) -> usize {
        self.inner.lock().len()
    }

    /// Stop every timer. Further registrations are ignored.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.lock().clear();
    }
}

impl<T> Drop for EntityActionScheduler<T> {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl<T> fmt::Debug for EntityActionScheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityActionScheduler")
            .field("run_once", &self.inner.run_once)
            .field("started", &self.inner.started.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    fn counting_scheduler(
        auto_start: bool,
        run_once: bool,
    ) -> (EntityActionScheduler<&'static str>, Arc<StdMutex<Vec<&'static str>>>) {
        let calls = Arc::new(StdMutex::new(Vec::new()));
        let sink = calls.clone();
        let scheduler = EntityActionScheduler::new(
            move |entity: &'static str| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(entity);
                    Ok(())
                }
            },
            auto_start,
            run_once,
        );
        (scheduler, calls)
    }

    fn count(calls: &Arc<StdMutex<Vec<&'static str>>>, entity: &str) -> usize {
        calls.lock().unwrap().iter().filter(|e| **e == entity).count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeats_on_period() {
        let (scheduler, calls) = counting_scheduler(true, false);
        scheduler.schedule_entity("a", Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(count(&calls, "a"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unschedule_before_first_tick_never_runs() {
        let (scheduler, calls) = counting_scheduler(true, false);
        scheduler.schedule_entity("a", Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(scheduler.unschedule_entity(&"a"));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count(&calls, "a"), 0);
        assert!(!scheduler.is_scheduled(&"a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_start() {
        let (scheduler, calls) = counting_scheduler(false, false);
        scheduler.schedule_entity("a", Duration::from_secs(1));
        scheduler.schedule_entity("b", Duration::from_secs(1));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(calls.lock().unwrap().is_empty());

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(count(&calls, "a"), 1);
        assert_eq!(count(&calls, "b"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_once_removes_registration() {
        let (scheduler, calls) = counting_scheduler(true, true);
        scheduler.schedule_entity("a", Duration::from_secs(2));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count(&calls, "a"), 1);
        assert!(!scheduler.is_scheduled(&"a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_period_applies_to_waiting_timer() {
        let (scheduler, calls) = counting_scheduler(true, false);
        scheduler.schedule_entity("a", Duration::from_secs(100));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(scheduler.change_period(&"a", Duration::from_secs(2)));
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(count(&calls, "a"), 1);

        assert!(!scheduler.change_period(&"missing", Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_period_does_not_delay_ticks() {
        let (scheduler, calls) = counting_scheduler(true, false);
        scheduler.schedule_entity("a", Duration::from_secs(10));

        // t = 5, 10, ..., 55
        for _ in 0..11 {
            tokio::time::sleep(Duration::from_secs(5)).await;
            assert!(scheduler.change_period(&"a", Duration::from_secs(10)));
        }
        assert_eq!(count(&calls, "a"), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_period_keeps_elapsed_time() {
        let (scheduler, calls) = counting_scheduler(true, false);
        scheduler.schedule_entity("a", Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(6)).await;

        scheduler.change_period(&"a", Duration::from_secs(8));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(count(&calls, "a"), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count(&calls, "a"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_period_before_start() {
        let (scheduler, calls) = counting_scheduler(false, false);
        scheduler.schedule_entity("a", Duration::from_secs(100));
        scheduler.change_period(&"a", Duration::from_secs(1));
        scheduler.start();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(count(&calls, "a"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_discards_previous_timer() {
        let (scheduler, calls) = counting_scheduler(true, true);
        scheduler.schedule_entity("a", Duration::from_secs(5));
        scheduler.schedule_entity("a", Duration::from_secs(20));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count(&calls, "a"), 0);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(count(&calls, "a"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_action_keeps_timer_alive() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let scheduler = EntityActionScheduler::new(
            move |_: u32| {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        return Err::<(), ActionError>("boom".into());
                    }
                    if n == 1 {
                        panic!("worse");
                    }
                    Ok(())
                }
            },
            true,
            false,
        );
        scheduler.schedule_entity(1, Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entities_are_independent() {
        let (scheduler, calls) = counting_scheduler(true, false);
        scheduler.schedule_entity("fast", Duration::from_secs(1));
        scheduler.schedule_entity("slow", Duration::from_secs(4));

        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(count(&calls, "fast"), 4);
        assert_eq!(count(&calls, "slow"), 1);
        assert_eq!(scheduler.scheduled_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_everything() {
        let (scheduler, calls) = counting_scheduler(true, false);
        scheduler.schedule_entity("a", Duration::from_secs(1));
        scheduler.shutdown();
        scheduler.schedule_entity("b", Duration::from_secs(1));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(scheduler.scheduled_count(), 0);
    }
}
