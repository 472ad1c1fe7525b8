//! Lab runtime for deterministic execution.
//!
//! Tasks are polled one per step in the order they were woken. There is no
//! randomness and no wall clock, so the same program always produces the
//! same interleaving.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Wake, Waker};

use super::config::LabConfig;

type LocalTask<'a> = Pin<Box<dyn Future<Output = ()> + 'a>>;

/// Ready queue shared with task wakers.
#[derive(Debug, Default)]
struct ReadyQueue {
    order: VecDeque<usize>,
    queued: HashSet<usize>,
}

impl ReadyQueue {
    fn schedule(&mut self, task: usize) {
        if self.queued.insert(task) {
            self.order.push_back(task);
        }
    }

    fn pop(&mut self) -> Option<usize> {
        let task = self.order.pop_front()?;
        self.queued.remove(&task);
        Some(task)
    }
}

struct TaskWaker {
    task: usize,
    ready: Arc<Mutex<ReadyQueue>>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.ready
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .schedule(self.task);
    }
}

/// The deterministic lab runtime.
///
/// Spawned futures may borrow anything that outlives the runtime, so tests
/// can share primitives by reference without `Rc` or `'static` bounds.
///
/// # Example
///
/// ```
/// use coopsync::Notify;
/// use coopsync::lab::{LabConfig, LabRuntime};
///
/// let notify = Notify::new();
/// let mut lab = LabRuntime::new(LabConfig::default());
/// let waiter = lab.spawn(async { notify.notified().await.is_ok() });
/// lab.run_until_quiescent();
/// assert!(!waiter.is_finished());
///
/// notify.notify_all();
/// lab.run_until_quiescent();
/// assert_eq!(waiter.take(), Some(true));
/// ```
pub struct LabRuntime<'a> {
    config: LabConfig,
    /// Spawned tasks; `None` once complete.
    tasks: Vec<Option<LocalTask<'a>>>,
    ready: Arc<Mutex<ReadyQueue>>,
    /// Number of steps executed.
    steps: u64,
}

impl<'a> LabRuntime<'a> {
    /// Creates a new lab runtime with the given configuration.
    #[must_use]
    pub fn new(config: LabConfig) -> Self {
        Self {
            config,
            tasks: Vec::new(),
            ready: Arc::new(Mutex::new(ReadyQueue::default())),
            steps: 0,
        }
    }

    /// Returns the number of steps executed.
    #[must_use]
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Returns a reference to the configuration.
    #[must_use]
    pub const fn config(&self) -> &LabConfig {
        &self.config
    }

    /// Returns the number of spawned tasks that have not completed.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.tasks.iter().filter(|task| task.is_some()).count()
    }

    /// Returns true if no task is ready to run.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.ready_queue().order.is_empty()
    }

    /// Spawns a task. It first runs on the next step that reaches it.
    pub fn spawn<F>(&mut self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'a,
        F::Output: 'a,
    {
        let slot = Rc::new(RefCell::new(None));
        let output = Rc::clone(&slot);
        let task = self.tasks.len();
        self.tasks.push(Some(Box::pin(async move {
            let value = future.await;
            *output.borrow_mut() = Some(value);
        })));
        self.ready_queue().schedule(task);
        tracing::trace!(task, "lab task spawned");
        JoinHandle { task, slot }
    }

    /// Runs until no task is ready or the step limit is reached.
    ///
    /// Returns the number of steps executed.
    pub fn run_until_quiescent(&mut self) -> u64 {
        let start_steps = self.steps;

        while !self.is_quiescent() {
            if let Some(max) = self.config.max_steps {
                if self.steps >= max {
                    tracing::warn!(max_steps = max, "lab step limit reached");
                    break;
                }
            }
            self.step();
        }

        let blocked = self.pending_tasks();
        if blocked > 0 && self.is_quiescent() {
            tracing::debug!(blocked, "lab quiescent with blocked tasks");
            assert!(
                !self.config.panic_on_stall,
                "lab stalled with {blocked} blocked task(s)"
            );
        }
        self.steps - start_steps
    }

    /// Drives `future` to completion, running other spawned tasks as needed.
    ///
    /// # Panics
    ///
    /// Panics if every task blocks before `future` completes.
    pub fn block_on<F>(&mut self, future: F) -> F::Output
    where
        F: Future + 'a,
        F::Output: 'a,
    {
        let handle = self.spawn(future);
        loop {
            if let Some(value) = handle.take() {
                return value;
            }
            if self.is_quiescent() {
                panic!("block_on future stalled with no runnable tasks");
            }
            self.step();
        }
    }

    /// Executes a single step: polls the next ready task.
    fn step(&mut self) {
        let Some(task) = self.ready_queue().pop() else {
            return;
        };
        self.steps += 1;

        let Some(mut future) = self.tasks.get_mut(task).and_then(Option::take) else {
            return;
        };
        let waker = Waker::from(Arc::new(TaskWaker {
            task,
            ready: Arc::clone(&self.ready),
        }));
        let mut cx = Context::from_waker(&waker);
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(()) => tracing::trace!(task, step = self.steps, "lab task completed"),
            Poll::Pending => self.tasks[task] = Some(future),
        }
    }

    fn ready_queue(&self) -> std::sync::MutexGuard<'_, ReadyQueue> {
        self.ready.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for LabRuntime<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabRuntime")
            .field("config", &self.config)
            .field("pending_tasks", &self.pending_tasks())
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

/// Handle to the output of a task spawned on a [`LabRuntime`].
#[derive(Debug)]
pub struct JoinHandle<T> {
    task: usize,
    slot: Rc<RefCell<Option<T>>>,
}

impl<T> JoinHandle<T> {
    /// Returns the task's index in spawn order.
    #[must_use]
    pub const fn task(&self) -> usize {
        self.task
    }

    /// Returns true once the task has produced its output and it has not
    /// been taken.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Takes the task's output if it has completed.
    pub fn take(&self) -> Option<T> {
        self.slot.borrow_mut().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab::yield_now;

    #[test]
    fn empty_runtime_is_quiescent() {
        let mut runtime = LabRuntime::new(LabConfig::default());
        assert!(runtime.is_quiescent());
        assert_eq!(runtime.run_until_quiescent(), 0);
    }

    #[test]
    fn tasks_interleave_in_wake_order() {
        let log = RefCell::new(Vec::new());
        let mut runtime = LabRuntime::new(LabConfig::default());
        for id in 0..3 {
            let log = &log;
            runtime.spawn(async move {
                log.borrow_mut().push((id, 0));
                yield_now().await;
                log.borrow_mut().push((id, 1));
            });
        }
        let steps = runtime.run_until_quiescent();
        assert_eq!(steps, 6);
        assert_eq!(
            *log.borrow(),
            [(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (2, 1)]
        );
        assert_eq!(runtime.pending_tasks(), 0);
    }

    #[test]
    fn block_on_returns_output() {
        let mut runtime = LabRuntime::new(LabConfig::default());
        let value = runtime.block_on(async {
            yield_now().await;
            7
        });
        assert_eq!(value, 7);
    }

    #[test]
    fn step_limit_stops_run() {
        let mut runtime = LabRuntime::new(LabConfig::new().max_steps(5));
        runtime.spawn(async {
            for _ in 0..1_000 {
                yield_now().await;
            }
        });
        assert_eq!(runtime.run_until_quiescent(), 5);
        assert_eq!(runtime.pending_tasks(), 1);
    }

    #[test]
    #[should_panic(expected = "lab stalled")]
    fn stall_panics_when_configured() {
        let notify = crate::Notify::new();
        let mut runtime = LabRuntime::new(LabConfig::new().panic_on_stall(true));
        runtime.spawn(async {
            let _ = notify.notified().await;
        });
        runtime.run_until_quiescent();
    }
}
