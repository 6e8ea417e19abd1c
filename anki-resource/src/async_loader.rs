//! Background worker for long-running decode and upload work.
//!
//! One dedicated OS thread consumes an owned FIFO of boxed tasks behind a
//! mutex + condvar pair. Tasks can cooperatively pause the worker or ask to
//! be resubmitted at the tail of the queue; nothing is ever interrupted
//! mid-run. Submission order is preserved for tasks that never resubmit.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use anki_util::time::Timer;

use crate::Error;

const POISON: &str = "async loader state poisoned";

/// In/out context handed to every task run.
///
/// Both fields are outputs: the loader resets them before each run and acts
/// on them after the run returns.
#[derive(Debug, Default)]
pub struct TaskContext {
    /// Park the worker after this task completes, until
    /// [`AsyncLoader::resume`].
    pub pause_after: bool,
    /// Re-enqueue this same task at the tail of the queue.
    pub resubmit_me: bool,
}

/// A unit of asynchronous loading work, consumed exactly once by the worker
/// unless it extends its life through [`TaskContext::resubmit_me`].
pub trait LoaderTask: Send {
    fn run(&mut self, ctx: &mut TaskContext) -> Result<(), Error>;
}

impl<F> LoaderTask for F
where
    F: FnMut(&mut TaskContext) -> Result<(), Error> + Send,
{
    fn run(&mut self, ctx: &mut TaskContext) -> Result<(), Error> {
        self(ctx)
    }
}

struct State {
    queue: VecDeque<Box<dyn LoaderTask>>,
    stopping: bool,
    paused: bool,
    /// A task is currently executing outside the lock.
    running: bool,
}

struct Shared {
    state: Mutex<State>,
    condvar: Condvar,
    completed: AtomicU64,
}

/// Asynchronous resource loader.
///
/// ```ignore
/// let loader = AsyncLoader::start();
/// loader.submit(|_ctx: &mut TaskContext| {
///     // ... decode something expensive ...
///     Ok(())
/// })?;
/// ```
pub struct AsyncLoader {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncLoader {
    /// Spawn the worker thread.
    pub fn start() -> AsyncLoader {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                stopping: false,
                paused: false,
                running: false,
            }),
            condvar: Condvar::new(),
            completed: AtomicU64::new(0),
        });

        let worker = {
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("anki-async-loader".to_owned())
                .spawn(move || worker_loop(&shared))
                .expect("failed to spawn async loader worker")
        };

        AsyncLoader {
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Enqueue `task` at the tail and wake the worker.
    pub fn submit<T: LoaderTask + 'static>(&self, task: T) -> Result<(), Error> {
        let mut state = self.shared.state.lock().expect(POISON);
        if state.stopping {
            return Err(Error::AlreadyStopped);
        }
        state.queue.push_back(Box::new(task));
        self.shared.condvar.notify_all();
        Ok(())
    }

    /// Pause the loader.
    ///
    /// Blocks the caller until the currently running task (if any) completes;
    /// queued tasks are retained but none executes until
    /// [`AsyncLoader::resume`].
    pub fn pause(&self) -> Result<(), Error> {
        let mut state = self.shared.state.lock().expect(POISON);
        if state.stopping {
            return Err(Error::Stopped);
        }
        state.paused = true;
        while state.running {
            state = self.shared.condvar.wait(state).expect(POISON);
        }
        Ok(())
    }

    /// Unpark the worker.
    pub fn resume(&self) -> Result<(), Error> {
        let mut state = self.shared.state.lock().expect(POISON);
        if state.stopping {
            return Err(Error::Stopped);
        }
        state.paused = false;
        self.shared.condvar.notify_all();
        Ok(())
    }

    /// Total number of completed task runs, including resubmitted and failed
    /// runs. Monotonically non-decreasing.
    pub fn completed_count(&self) -> u64 {
        self.shared.completed.load(Ordering::Acquire)
    }

    /// Stop the loader.
    ///
    /// Further submissions are refused, still-queued tasks are destroyed
    /// without running, the in-flight task (if any) finishes, and the worker
    /// is joined.
    pub fn stop(&self) -> Result<(), Error> {
        let discarded = {
            let mut state = self.shared.state.lock().expect(POISON);
            if state.stopping {
                return Err(Error::AlreadyStopped);
            }
            state.stopping = true;
            let discarded: Vec<_> = state.queue.drain(..).collect();
            self.shared.condvar.notify_all();
            discarded
        };
        if !discarded.is_empty() {
            tracing::debug!(discarded = discarded.len(), "discarding queued tasks on stop");
        }
        // Destroyed without running, outside the lock; task teardown may take
        // other locks.
        drop(discarded);

        let worker = self.worker.lock().expect(POISON).take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                tracing::error!("async loader worker did not shut down cleanly");
            }
        }
        Ok(())
    }
}

impl Drop for AsyncLoader {
    fn drop(&mut self) {
        // Idempotent: the loader may have been stopped explicitly already.
        let _ = self.stop();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let task = {
            let mut state = shared.state.lock().expect(POISON);
            loop {
                if state.stopping {
                    return;
                }
                if !state.paused && !state.queue.is_empty() {
                    break;
                }
                state = shared.condvar.wait(state).expect(POISON);
            }
            let task = state.queue.pop_front().expect("queue checked non-empty");
            state.running = true;
            task
        };

        let mut task = Some(task);
        let mut ctx = TaskContext::default();
        let mut timer = Timer::start();
        let result = task.as_mut().expect("task present").run(&mut ctx);
        timer.stop();

        {
            let mut state = shared.state.lock().expect(POISON);
            state.running = false;
            if result.is_ok() && ctx.resubmit_me && !state.stopping {
                // Tail, not head: work submitted while this task ran is not
                // starved by the requeue.
                state.queue.push_back(task.take().expect("task present"));
            }
            if ctx.pause_after && !state.stopping {
                state.paused = true;
            }
            shared.condvar.notify_all();
        }

        // Destroy outside the lock; a task's teardown may take other locks
        // (cache eviction) or submit follow-up work.
        drop(task);

        match result {
            Ok(()) => {
                tracing::trace!(elapsed_seconds = timer.elapsed_seconds(), "async task completed")
            }
            Err(err) => tracing::error!(%err, "async task failed"),
        }
        shared.completed.fetch_add(1, Ordering::Release);
    }
}
