//! A small owned thread pool: a task queue, a fixed set of worker threads,
//! and a `wait_completion` barrier.
//!
//! This is deliberately not a global/shared pool — each encoder or learner
//! owns one and it dies with its owner. Two condition variables do the
//! coordination: one wakes workers when a task is submitted, the other
//! wakes `wait_completion` when the queue drains and no task is mid-flight.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    queue: Mutex<VecDeque<Task>>,
    // Counts tasks that are queued or currently running. Incremented on
    // submit, before the task is visible to any worker; decremented only
    // after the task function returns. Keeping this as one counter (rather
    // than a queue-length check plus a separate active-worker count) avoids
    // a gap where a worker has dequeued a task but not yet marked it active,
    // during which `wait_completion` could otherwise observe an empty queue
    // and return before the task actually ran.
    pending: Mutex<usize>,
    work_cv: Condvar,
    complete_cv: Condvar,
    stop: AtomicBool,
}

/// A fixed-size pool of worker threads owned by a single encoder or
/// learner instance.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawn `thread_count` workers. `0` means "use hardware concurrency,
    /// falling back to 8 if that can't be determined" (spec §6
    /// environment note).
    #[must_use]
    pub fn new(thread_count: usize) -> Self {
        let thread_count = if thread_count == 0 {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(8)
        } else {
            thread_count
        };

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            pending: Mutex::new(0),
            work_cv: Condvar::new(),
            complete_cv: Condvar::new(),
            stop: AtomicBool::new(false),
        });

        let workers = (0..thread_count)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || worker_loop(&shared))
            })
            .collect();

        Self { shared, workers }
    }

    /// Number of worker threads in the pool.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue a task for execution on some worker thread.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self
            .shared
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner()) += 1;
        {
            let mut queue = self.shared.queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.push_back(Box::new(task));
        }
        self.shared.work_cv.notify_one();
    }

    /// Block until every submitted task has run to completion.
    pub fn wait_completion(&self) {
        let mut pending = self
            .shared
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        while *pending != 0 {
            pending = self
                .shared
                .complete_cv
                .wait(pending)
                .unwrap_or_else(|e| e.into_inner());
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        self.shared.work_cv.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(shared: &Arc<Shared>) {
    loop {
        let task = {
            let mut queue = shared.queue.lock().unwrap_or_else(|e| e.into_inner());
            loop {
                if shared.stop.load(Ordering::Relaxed) {
                    return;
                }
                if let Some(task) = queue.pop_front() {
                    break task;
                }
                queue = shared
                    .work_cv
                    .wait(queue)
                    .unwrap_or_else(|e| e.into_inner());
            }
        };

        task();
        {
            let mut pending = shared
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            *pending -= 1;
            if *pending == 0 {
                shared.complete_cv.notify_all();
            }
        }
    }
}

/// Run `items` through `f`, either inline (pool has one thread or fewer
/// real workers than worth the dispatch overhead) or split across the
/// pool, preserving input order in the returned `Vec`.
pub fn map_ordered<T, R, F>(pool: &ThreadPool, items: Vec<T>, f: F) -> Vec<R>
where
    T: Send + 'static,
    R: Send + Default + 'static,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    if pool.thread_count() <= 1 || items.len() <= 1 {
        return items.into_iter().map(f).collect();
    }

    let n = items.len();
    let results: Vec<Mutex<Option<R>>> = (0..n).map(|_| Mutex::new(None)).collect();
    let results = Arc::new(results);
    let f = Arc::new(f);

    for (i, item) in items.into_iter().enumerate() {
        let results = Arc::clone(&results);
        let f = Arc::clone(&f);
        pool.submit(move || {
            let value = f(item);
            *results[i].lock().unwrap_or_else(|e| e.into_inner()) = Some(value);
        });
    }
    pool.wait_completion();

    Arc::try_unwrap(results)
        .unwrap_or_else(|_| panic!("worker tasks outlived wait_completion"))
        .into_iter()
        .map(|cell| cell.into_inner().unwrap_or_else(|e| e.into_inner()).unwrap_or_default())
        .collect()
}
