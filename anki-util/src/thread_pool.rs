//! Fixed-size thread pool with one-shot barrier dispatch.
//!
//! The pool owns `worker_count` OS threads for its whole lifetime. Work is
//! dispatched in steps: the caller [`assign`]s at most one task per worker,
//! then [`wait_all`] releases every worker through a start barrier, blocks
//! until all of them have met again at an end barrier, and reports any
//! failures. Tasks on distinct workers run concurrently with no ordering
//! guarantees between them; callers synchronise through [`wait_all`] alone.
//!
//! [`assign`]: ThreadPool::assign
//! [`wait_all`]: ThreadPool::wait_all

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread::JoinHandle;

/// A unit of work bound to a single worker for one dispatch.
///
/// Implemented for any matching `FnMut` closure. The pool guarantees the task
/// runs at most once per dispatch; it is stateless with respect to other
/// tasks on the same tick.
pub trait ThreadPoolTask: Send {
    fn run(&mut self, worker_index: u32, worker_count: u32) -> Result<(), anyhow::Error>;
}

impl<F> ThreadPoolTask for F
where
    F: FnMut(u32, u32) -> Result<(), anyhow::Error> + Send,
{
    fn run(&mut self, worker_index: u32, worker_count: u32) -> Result<(), anyhow::Error> {
        self(worker_index, worker_count)
    }
}

/// Failure of a single worker during one dispatch.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker {worker} task failed: {source}")]
    TaskFailed {
        worker: u32,
        #[source]
        source: anyhow::Error,
    },
    #[error("worker {worker} task panicked")]
    WorkerPanic { worker: u32 },
}

/// All failures collected from one [`ThreadPool::wait_all`] dispatch.
#[derive(Debug, thiserror::Error)]
#[error("{} thread pool worker(s) failed", .errors.len())]
pub struct AggregateError {
    pub errors: Vec<WorkerError>,
}

struct Shared {
    /// Rendezvous that releases workers into a dispatch.
    start: Barrier,
    /// Rendezvous that ends a dispatch; tripping it returns the caller.
    end: Barrier,
    /// One assignment slot per worker.
    slots: Vec<Mutex<Option<Box<dyn ThreadPoolTask>>>>,
    /// Failures recorded during the current dispatch.
    failures: Mutex<Vec<WorkerError>>,
    quit: AtomicBool,
}

/// Fixed set of worker threads executing one assigned task per dispatch.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawn a pool of `worker_count` threads. Typical sizes are 2-32.
    ///
    /// # Panics
    /// * If `worker_count` is zero.
    pub fn new(worker_count: u32) -> ThreadPool {
        assert!(worker_count > 0, "thread pool needs at least one worker");

        let shared = Arc::new(Shared {
            // Both barriers include the dispatching caller.
            start: Barrier::new(worker_count as usize + 1),
            end: Barrier::new(worker_count as usize + 1),
            slots: (0..worker_count).map(|_| Mutex::new(None)).collect(),
            failures: Mutex::new(Vec::new()),
            quit: AtomicBool::new(false),
        });

        let workers = (0..worker_count)
            .map(|index| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("anki-pool-{index}"))
                    .spawn(move || worker_loop(&shared, index, worker_count))
                    .expect("failed to spawn thread pool worker")
            })
            .collect();

        ThreadPool { shared, workers }
    }

    /// Number of workers in the pool.
    pub fn worker_count(&self) -> u32 {
        self.workers.len() as u32
    }

    /// Bind `task` to `worker_index` for the next dispatch, overwriting any
    /// prior unexecuted assignment for that worker.
    ///
    /// # Panics
    /// * If `worker_index` is out of range.
    pub fn assign<T: ThreadPoolTask + 'static>(&mut self, worker_index: u32, task: T) {
        let slot = self
            .shared
            .slots
            .get(worker_index as usize)
            .expect("worker index out of range");
        *slot.lock().expect("thread pool slot poisoned") = Some(Box::new(task));
    }

    /// Release the workers to run their assignments and block until every
    /// worker has completed. Per-worker failures are returned aggregated; the
    /// pool itself survives both task errors and task panics.
    pub fn wait_all(&mut self) -> Result<(), AggregateError> {
        self.shared.start.wait();
        self.shared.end.wait();

        let mut failures = self.shared.failures.lock().expect("thread pool state poisoned");
        if failures.is_empty() {
            Ok(())
        } else {
            Err(AggregateError {
                errors: failures.drain(..).collect(),
            })
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shared.quit.store(true, Ordering::Release);
        // Release the workers one final time so they can observe the quit
        // flag; they exit before reaching the end barrier.
        self.shared.start.wait();
        for worker in self.workers.drain(..) {
            if let Err(err) = worker.join() {
                tracing::error!(?err, "thread pool worker did not shut down cleanly");
            }
        }
    }
}

fn worker_loop(shared: &Shared, index: u32, count: u32) {
    loop {
        shared.start.wait();
        if shared.quit.load(Ordering::Acquire) {
            return;
        }

        let task = shared.slots[index as usize]
            .lock()
            .expect("thread pool slot poisoned")
            .take();
        if let Some(mut task) = task {
            let result = panic::catch_unwind(AssertUnwindSafe(|| task.run(index, count)));
            let failure = match result {
                Ok(Ok(())) => None,
                Ok(Err(source)) => Some(WorkerError::TaskFailed { worker: index, source }),
                Err(_) => Some(WorkerError::WorkerPanic { worker: index }),
            };
            if let Some(failure) = failure {
                tracing::warn!(%failure, "thread pool task failed");
                shared
                    .failures
                    .lock()
                    .expect("thread pool state poisoned")
                    .push(failure);
            }
        }

        shared.end.wait();
    }
}

/// Split `[0, problem_size)` into per-worker `[start, end)` ranges.
///
/// Ranges are disjoint, cover the whole problem, and the last worker absorbs
/// any remainder.
///
/// # Panics
/// * If `worker_count` is zero or `worker_index` is out of range.
pub fn split_threaded_problem(
    problem_size: usize,
    worker_index: u32,
    worker_count: u32,
) -> (usize, usize) {
    assert!(worker_count > 0, "cannot split work across zero workers");
    assert!(worker_index < worker_count, "worker index out of range");

    let div = problem_size / worker_count as usize;
    let start = worker_index as usize * div;
    let end = if worker_index == worker_count - 1 {
        problem_size
    } else {
        start + div
    };
    (start, end)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::time;

    #[test]
    fn smoketest_dispatch() {
        let mut pool = ThreadPool::new(4);
        let total = Arc::new(AtomicUsize::new(0));

        for i in 0..4 {
            let total = Arc::clone(&total);
            pool.assign(i, move |index: u32, _count: u32| {
                assert_eq!(index, i);
                total.fetch_add(index as usize + 1, Ordering::Relaxed);
                Ok(())
            });
        }
        pool.wait_all().unwrap();

        assert_eq!(total.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn workers_run_concurrently() {
        let mut pool = ThreadPool::new(4);
        let mut timer = time::Timer::start();

        for i in 0..4 {
            pool.assign(i, |_index: u32, _count: u32| {
                time::sleep(0.05);
                Ok(())
            });
        }
        pool.wait_all().unwrap();
        timer.stop();

        // Sleeping tasks overlap, so the wall time tracks the slowest task
        // rather than the sum of all four.
        assert!(timer.elapsed_seconds() < 0.15);
    }

    #[test]
    fn single_worker_runs_sequentially() {
        let mut pool = ThreadPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            pool.assign(0, move |_index: u32, count: u32| {
                assert_eq!(count, 1);
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(())
            });
            pool.wait_all().unwrap();
        }

        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn assignment_overwrites() {
        let mut pool = ThreadPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));

        let first = Arc::clone(&counter);
        pool.assign(0, move |_: u32, _: u32| {
            first.fetch_add(100, Ordering::Relaxed);
            Ok(())
        });
        let second = Arc::clone(&counter);
        pool.assign(0, move |_: u32, _: u32| {
            second.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
        pool.wait_all().unwrap();

        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn failures_are_aggregated() {
        let mut pool = ThreadPool::new(3);

        pool.assign(0, |_: u32, _: u32| Ok(()));
        pool.assign(1, |_: u32, _: u32| Err(anyhow::anyhow!("boom")));
        pool.assign(2, |_: u32, _: u32| -> Result<(), anyhow::Error> {
            panic!("kaboom")
        });

        let err = pool.wait_all().unwrap_err();
        assert_eq!(err.errors.len(), 2);
        assert!(err
            .errors
            .iter()
            .any(|e| matches!(e, WorkerError::TaskFailed { worker: 1, .. })));
        assert!(err
            .errors
            .iter()
            .any(|e| matches!(e, WorkerError::WorkerPanic { worker: 2 })));

        // The pool survives and a clean dispatch succeeds afterwards.
        pool.assign(0, |_: u32, _: u32| Ok(()));
        pool.wait_all().unwrap();
    }

    #[test]
    fn dispatch_with_no_assignments() {
        let mut pool = ThreadPool::new(2);
        pool.wait_all().unwrap();
        pool.wait_all().unwrap();
    }

    #[test]
    fn split_covers_problem() {
        for worker_count in 1..17u32 {
            for problem_size in 0..100usize {
                let mut covered = 0;
                let mut next_expected = 0;
                for index in 0..worker_count {
                    let (start, end) = split_threaded_problem(problem_size, index, worker_count);
                    assert!(start <= end);
                    // Ranges are disjoint and contiguous.
                    assert_eq!(start, next_expected);
                    next_expected = end;
                    covered += end - start;
                }
                assert_eq!(covered, problem_size);
                assert_eq!(next_expected, problem_size);
            }
        }
    }
}
