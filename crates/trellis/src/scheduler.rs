//! Task scheduling abstraction.
//!
//! Housekeeping sweeps and background listeners are scheduled through the
//! [`Scheduler`] trait, decoupled from any specific timer implementation.
//! Two interchangeable backends exist, selected by a single config flag:
//! the tokio-backed one for production, and a manual one whose periodic
//! tasks only run when explicitly ticked, for deterministic tests and
//! shutdown boundaries.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

/// A boxed unit future, the unit of scheduled work.
pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A factory producing one run of a periodic task.
pub type PeriodicTask = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// Which scheduler backend the engine should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerBackend {
    /// Spawn onto the tokio runtime with real timers.
    #[default]
    Tokio,
    /// Register periodic tasks for explicit ticking; run one-shot tasks
    /// immediately without delay.
    Manual,
}

/// Scheduling contract consumed by the engine.
pub trait Scheduler: Send + Sync {
    /// Run `task` repeatedly at the given interval until shutdown.
    fn run_periodic(&self, name: &'static str, interval: Duration, task: PeriodicTask);

    /// Run a task once after a delay.
    fn run_once(&self, name: &'static str, delay: Duration, task: TaskFuture);

    /// Run a task as soon as possible.
    fn run_async(&self, name: &'static str, task: TaskFuture);

    /// Stop all scheduled work.
    fn shutdown(&self);
}

/// Production scheduler backed by the tokio runtime.
#[derive(Default)]
pub struct TokioScheduler {
    handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl TokioScheduler {
    /// Create a new tokio-backed scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&self, handle: tokio::task::JoinHandle<()>) {
        self.handles.lock().unwrap().push(handle);
    }
}

impl Scheduler for TokioScheduler {
    fn run_periodic(&self, name: &'static str, interval: Duration, task: PeriodicTask) {
        debug!(task = name, ?interval, "scheduling periodic task");
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; consume it so the task
            // first runs one full interval after scheduling.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                task().await;
            }
        });
        self.track(handle);
    }

    fn run_once(&self, name: &'static str, delay: Duration, task: TaskFuture) {
        debug!(task = name, ?delay, "scheduling one-shot task");
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        self.track(handle);
    }

    fn run_async(&self, name: &'static str, task: TaskFuture) {
        debug!(task = name, "spawning async task");
        self.track(tokio::spawn(task));
    }

    fn shutdown(&self) {
        for handle in self.handles.lock().unwrap().drain(..) {
            handle.abort();
        }
    }
}

/// Deterministic scheduler: periodic tasks run only on explicit [`tick`].
///
/// One-shot and async tasks are spawned immediately, ignoring delays, so
/// listeners wired through [`Scheduler::run_async`] still work.
///
/// [`tick`]: ManualScheduler::tick
#[derive(Default)]
pub struct ManualScheduler {
    periodic: Mutex<Vec<(&'static str, PeriodicTask)>>,
    handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl ManualScheduler {
    /// Create a new manual scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every registered periodic task once, in registration order.
    ///
    /// Returns how many tasks ran.
    pub async fn tick(&self) -> usize {
        let tasks: Vec<(&'static str, PeriodicTask)> =
            self.periodic.lock().unwrap().clone();
        for (name, task) in &tasks {
            debug!(task = name, "manual tick");
            task().await;
        }
        tasks.len()
    }
}

impl Scheduler for ManualScheduler {
    fn run_periodic(&self, name: &'static str, _interval: Duration, task: PeriodicTask) {
        self.periodic.lock().unwrap().push((name, task));
    }

    fn run_once(&self, name: &'static str, _delay: Duration, task: TaskFuture) {
        debug!(task = name, "running one-shot task without delay");
        self.handles.lock().unwrap().push(tokio::spawn(task));
    }

    fn run_async(&self, name: &'static str, task: TaskFuture) {
        debug!(task = name, "spawning async task");
        self.handles.lock().unwrap().push(tokio::spawn(task));
    }

    fn shutdown(&self) {
        self.periodic.lock().unwrap().clear();
        for handle in self.handles.lock().unwrap().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_task(counter: Arc<AtomicUsize>) -> PeriodicTask {
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn test_manual_periodic_runs_only_on_tick() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.run_periodic(
            "count",
            Duration::from_secs(3600),
            counting_task(Arc::clone(&counter)),
        );
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        assert_eq!(scheduler.tick().await, 1);
        assert_eq!(scheduler.tick().await, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_manual_shutdown_drops_periodic_tasks() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.run_periodic(
            "count",
            Duration::from_secs(3600),
            counting_task(Arc::clone(&counter)),
        );
        scheduler.shutdown();

        assert_eq!(scheduler.tick().await, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tokio_periodic_fires() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.run_periodic(
            "count",
            Duration::from_millis(5),
            counting_task(Arc::clone(&counter)),
        );

        tokio::time::sleep(Duration::from_millis(40)).await;
        scheduler.shutdown();

        assert!(counter.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_tokio_run_once_after_delay() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let inner = Arc::clone(&counter);
        scheduler.run_once(
            "bump",
            Duration::from_millis(5),
            Box::pin(async move {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        scheduler.shutdown();
    }
}
