//! Long-running work (classification, bulk edits) as tracked, cancellable tasks.
//!
//! Tasks run on tokio's blocking pool. Every task is in the [ActiveTasks] registry from
//! [ActiveTasks::spawn] until it ends; a guard owned by the worker removes it however the work
//! ends, including panics.

use parking_lot::{Mutex, RwLock};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};
use tokio::{sync::mpsc::UnboundedSender, task::JoinHandle};

use crate::{
    error::KometError,
    event::{KometEvent, TaskOutcome},
};

/// Progress and cancellation state shared between a task and its observers.
#[derive(Debug)]
pub struct TaskProgress {
    id: u64,
    title: String,
    total: AtomicU64,
    completed: AtomicU64,
    message: Mutex<String>,
    cancelled: AtomicBool,
}

impl TaskProgress {
    fn new(id: u64, title: String) -> Self {
        TaskProgress {
            id,
            title,
            total: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            message: Mutex::new(String::new()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Progress for work run outside the registry, e.g. a synchronous classification.
    pub fn detached(title: impl Into<String>) -> Self {
        Self::new(0, title.into())
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Release);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    pub fn advance(&self, units: u64) {
        self.completed.fetch_add(units, Ordering::AcqRel);
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Completed share in `0.0..=1.0`; zero until a total is known.
    pub fn fraction(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => (self.completed() as f64 / total as f64).min(1.0),
        }
    }

    pub fn set_message(&self, message: impl Into<String>) {
        *self.message.lock() = message.into();
    }

    pub fn message(&self) -> String {
        self.message.lock().clone()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Cooperative cancellation point between units of work.
    pub fn check_cancelled(&self) -> Result<(), KometError> {
        if self.is_cancelled() {
            Err(KometError::OperationCancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug)]
pub struct ActiveTasks {
    next_id: AtomicU64,
    tasks: RwLock<BTreeMap<u64, Arc<TaskProgress>>>,
    events: Option<UnboundedSender<KometEvent>>,
}

impl ActiveTasks {
    pub fn new(events: Option<UnboundedSender<KometEvent>>) -> Self {
        ActiveTasks {
            next_id: AtomicU64::new(1),
            tasks: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    pub fn active(&self) -> Vec<Arc<TaskProgress>> {
        self.tasks.read().values().cloned().collect()
    }

    pub fn get(&self, id: u64) -> Option<Arc<TaskProgress>> {
        self.tasks.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Request cancellation of task `id`. False when no such task is running.
    pub fn cancel(&self, id: u64) -> bool {
        match self.get(id) {
            Some(progress) => {
                progress.cancel();
                true
            }
            None => false,
        }
    }

    fn send(&self, event: KometEvent) {
        if let Some(tx) = &self.events {
            if let Err(e) = tx.send(event) {
                tracing::warn!("{}", KometError::from(e));
            }
        }
    }

    /// Run `work` on the blocking pool. Must be called from within a tokio runtime.
    pub fn spawn<T, F>(self: &Arc<Self>, title: impl Into<String>, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&TaskProgress) -> Result<T, KometError> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
        let progress = Arc::new(TaskProgress::new(id, title.into()));
        self.tasks.write().insert(id, progress.clone());
        tracing::info!("[Task {id}] Started {}", progress.title());
        self.send(KometEvent::TaskStarted(id, progress.title().to_string()));

        let mut guard = TaskGuard {
            registry: self.clone(),
            progress: progress.clone(),
            outcome: TaskOutcome::Failed("task panicked".to_string()),
        };
        let handle = tokio::task::spawn_blocking(move || {
            let result = work(&guard.progress);
            guard.outcome = match &result {
                Ok(_) => TaskOutcome::Succeeded,
                Err(KometError::OperationCancelled) => TaskOutcome::Cancelled,
                Err(e) => TaskOutcome::Failed(e.to_string()),
            };
            result
        });
        TaskHandle { progress, handle }
    }
}

/// Removes its task from the registry when the worker finishes, fails or unwinds.
struct TaskGuard {
    registry: Arc<ActiveTasks>,
    progress: Arc<TaskProgress>,
    outcome: TaskOutcome,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let id = self.progress.id();
        self.registry.tasks.write().remove(&id);
        match &self.outcome {
            TaskOutcome::Failed(reason) => {
                tracing::error!("[Task {id}] {} failed: {reason}", self.progress.title())
            }
            outcome => tracing::info!("[Task {id}] {} ended: {outcome:?}", self.progress.title()),
        }
        self.registry.send(KometEvent::TaskFinished(
            id,
            self.progress.title().to_string(),
            self.outcome.clone(),
        ));
    }
}

/// Awaitable result of a spawned task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    progress: Arc<TaskProgress>,
    handle: JoinHandle<Result<T, KometError>>,
}

impl<T> TaskHandle<T> {
    pub fn progress(&self) -> &Arc<TaskProgress> {
        &self.progress
    }

    pub fn cancel(&self) {
        self.progress.cancel();
    }

    /// Wait for the task. A panic in the worker surfaces as a task error.
    pub async fn join(self) -> Result<T, KometError> {
        self.handle.await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_task_is_tracked_until_it_ends() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let tasks = Arc::new(ActiveTasks::new(Some(tx)));
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let handle = tasks.spawn("wait", move |progress| {
            progress.set_total(2);
            progress.advance(1);
            release_rx
                .recv()
                .map_err(|e| KometError::Task(e.to_string()))?;
            progress.advance(1);
            Ok(42)
        });
        assert_eq!(tasks.len(), 1);
        assert!(tasks.get(handle.progress().id()).is_some());
        release_tx.send(()).unwrap();
        assert_eq!(handle.join().await.unwrap(), 42);
        assert!(tasks.is_empty());
        assert!(matches!(rx.recv().await, Some(KometEvent::TaskStarted(_, _))));
        assert!(matches!(
            rx.recv().await,
            Some(KometEvent::TaskFinished(_, _, TaskOutcome::Succeeded))
        ));
    }

    #[tokio::test]
    async fn test_cancellation_and_failure_clean_up() {
        let tasks = Arc::new(ActiveTasks::new(None));
        let handle = tasks.spawn("spin", |progress| loop {
            progress.check_cancelled()?;
            std::thread::sleep(Duration::from_millis(1));
        });
        assert!(tasks.cancel(handle.progress().id()));
        let result: Result<(), KometError> = handle.join().await;
        assert_eq!(result, Err(KometError::OperationCancelled));

        let failing = tasks.spawn("fail", |_| -> Result<(), KometError> {
            Err(KometError::Reasoner("unreachable".to_string()))
        });
        assert!(matches!(failing.join().await, Err(KometError::Reasoner(_))));

        let panicking = tasks.spawn("panic", |_| -> Result<(), KometError> { panic!("boom") });
        assert!(matches!(panicking.join().await, Err(KometError::Task(_))));
        assert!(tasks.is_empty());
        assert!(!tasks.cancel(999));
    }

    #[test]
    fn test_progress_fraction() {
        let progress = TaskProgress::detached("local");
        assert_eq!(progress.fraction(), 0.0);
        progress.set_total(4);
        progress.advance(1);
        assert_eq!(progress.fraction(), 0.25);
        progress.set_message("step");
        assert_eq!(progress.message(), "step");
        assert!(progress.check_cancelled().is_ok());
    }
}
