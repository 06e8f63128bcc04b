//! A bounded thread-pool executor for running independent units of work
//! (builds, packaging jobs, publishes) with a worker-count cap and
//! fail-fast cancellation, mirroring a CI job matrix's `max-parallel`.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use crate::context::RunContext;
use crate::errors::Result;

/// One independent unit of work submitted to an [`Executor`].
///
/// `T` is the task's own identifying payload (a `BuildSpec`, a target
/// triple, ...), carried alongside the result so callers can tell which
/// task a given [`TaskResult`] belongs to without relying on submission
/// order.
pub trait Task: Send + 'static {
    /// What running this task actually produces on success.
    type Output: Send + 'static;

    /// Run the task to completion. Implementations should check
    /// `ctx.check()` at any internal loop/subprocess boundary so
    /// cancellation is observed promptly.
    fn run(self, ctx: &RunContext) -> Result<Self::Output>;
}

/// The outcome of running one task, paired with the task's own label for
/// reporting.
pub struct TaskResult<T> {
    /// A caller-supplied label identifying which task this result is for.
    pub label: String,
    /// `Ok` on success, `Err` (including `Err(Cancelled)`) otherwise.
    pub outcome: Result<T>,
}

/// Runs a batch of [`Task`]s across a bounded pool of OS threads.
pub struct Executor {
    workers: usize,
    fail_fast: bool,
    progress: Option<Arc<dyn Fn(usize, usize) + Send + Sync>>,
}

impl Default for Executor {
    fn default() -> Self {
        Self { workers: default_worker_count(), fail_fast: false, progress: None }
    }
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of concurrently running tasks. `0` is treated as 1.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Cancel the shared [`RunContext`] as soon as one task fails, so
    /// in-flight and not-yet-started tasks stop promptly.
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Call `f(completed, total)` as each result arrives, in completion
    /// order — a caller-supplied progress bar/log line, not a correctness
    /// knob.
    pub fn with_progress(mut self, f: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(f));
        self
    }

    /// Run every `(label, task)` pair to completion, in at most
    /// `self.workers` concurrent threads, and return one [`TaskResult`]
    /// per input, in submission order.
    pub fn execute<T>(&self, ctx: &RunContext, tasks: Vec<(String, T)>) -> Vec<TaskResult<T::Output>>
    where
        T: Task,
    {
        let total = tasks.len();
        if total == 0 {
            return Vec::new();
        }
        let (job_tx, job_rx) = mpsc::channel::<(usize, String, T)>();
        let job_rx = Arc::new(std::sync::Mutex::new(job_rx));
        let (result_tx, result_rx) = mpsc::channel::<(usize, TaskResult<T::Output>)>();

        for (i, (label, task)) in tasks.into_iter().enumerate() {
            job_tx.send((i, label, task)).expect("executor job channel closed early");
        }
        drop(job_tx);

        let worker_count = self.workers.min(total);
        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let ctx = ctx.clone();
            let fail_fast = self.fail_fast;
            handles.push(thread::spawn(move || loop {
                let job = { job_rx.lock().expect("executor job lock poisoned").recv() };
                let Ok((index, label, task)) = job else { break };
                if ctx.is_cancelled() {
                    debug!(worker_id, %label, "skipping task, context already cancelled");
                    let outcome = Err(crate::errors::ForgecastError::Cancelled);
                    let _ = result_tx.send((index, TaskResult { label, outcome }));
                    continue;
                }
                let outcome = task.run(&ctx);
                if outcome.is_err() && fail_fast {
                    warn!(%label, "task failed, cancelling remaining work");
                    ctx.cancel();
                }
                let _ = result_tx.send((index, TaskResult { label, outcome }));
            }));
        }
        drop(result_tx);

        let mut indexed: Vec<(usize, TaskResult<T::Output>)> = Vec::with_capacity(total);
        for (completed, item) in result_rx.iter().enumerate() {
            if let Some(progress) = &self.progress {
                progress(completed + 1, total);
            }
            indexed.push(item);
        }
        for handle in handles {
            let _ = handle.join();
        }
        indexed.sort_by_key(|(i, _)| *i);
        indexed.into_iter().map(|(_, r)| r).collect()
    }
}

/// Mirrors the common CI default: one worker per logical core, floored
/// at 1 when that can't be determined.
fn default_worker_count() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Run `f` over every item in `items`, at most `workers` at a time,
/// returning results in input order. A thin convenience wrapper over
/// [`Executor`] for call sites that don't need a named [`Task`] type.
pub fn parallel_map<I, O, F>(ctx: &RunContext, items: Vec<I>, workers: usize, f: F) -> Vec<Result<O>>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I, &RunContext) -> Result<O> + Send + Sync + 'static,
{
    struct Closure<I, O, F> {
        item: I,
        f: Arc<F>,
        _out: std::marker::PhantomData<O>,
    }
    impl<I, O, F> Task for Closure<I, O, F>
    where
        I: Send + 'static,
        O: Send + 'static,
        F: Fn(I, &RunContext) -> Result<O> + Send + Sync + 'static,
    {
        type Output = O;
        fn run(self, ctx: &RunContext) -> Result<O> {
            (self.f)(self.item, ctx)
        }
    }

    let f = Arc::new(f);
    let tasks = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            (
                i.to_string(),
                Closure { item, f: Arc::clone(&f), _out: std::marker::PhantomData },
            )
        })
        .collect();

    Executor::new()
        .with_workers(workers)
        .execute(ctx, tasks)
        .into_iter()
        .map(|r| r.outcome)
        .collect()
}

/// Like [`parallel_map`], but for work that has no useful output of its
/// own and should short-circuit: the moment any item errors, `fail_fast`
/// cancels the shared context so queued items are drained with a
/// cancellation error instead of starting, and the first error is
/// propagated to the caller.
pub fn for_each<I, F>(ctx: &RunContext, items: Vec<I>, workers: usize, f: F) -> Result<()>
where
    I: Send + 'static,
    F: Fn(I, &RunContext) -> Result<()> + Send + Sync + 'static,
{
    let results = parallel_map(ctx, items, workers, f);
    for result in results {
        result?;
    }
    Ok(())
}

/// A fixed-size permit pool, for callers that need a finer-grained
/// concurrency cap than an outer [`Executor`]'s worker count (e.g. "at
/// most 2 concurrent uploads to the same registry" nested inside a wider
/// worker pool). Cheaply `Clone`, so one instance can be shared across
/// the threads an `Executor` spawns.
#[derive(Clone)]
pub struct Semaphore {
    state: Arc<(std::sync::Mutex<usize>, std::sync::Condvar)>,
    limit: usize,
}

impl Semaphore {
    pub fn new(limit: usize) -> Self {
        Self { state: Arc::new((std::sync::Mutex::new(0), std::sync::Condvar::new())), limit: limit.max(1) }
    }

    /// Block until a slot is free or `ctx` is cancelled, re-checking
    /// cancellation between short waits rather than only once up front.
    pub fn acquire(&self, ctx: &RunContext) -> Result<SemaphoreGuard<'_>> {
        let (lock, cvar) = &*self.state;
        let mut held = lock.lock().expect("semaphore lock poisoned");
        loop {
            ctx.check()?;
            if *held < self.limit {
                *held += 1;
                return Ok(SemaphoreGuard { semaphore: self });
            }
            let (new_held, _) =
                cvar.wait_timeout(held, std::time::Duration::from_millis(25)).expect("semaphore lock poisoned");
            held = new_held;
        }
    }

    fn release(&self) {
        let (lock, cvar) = &*self.state;
        let mut held = lock.lock().expect("semaphore lock poisoned");
        *held = held.saturating_sub(1);
        cvar.notify_one();
    }
}

/// RAII handle returned by [`Semaphore::acquire`]; releases its slot on drop.
pub struct SemaphoreGuard<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

/// One named group of homogeneous tasks inside a [`run_pipeline`] call.
pub struct Stage<T: Task> {
    pub name: String,
    pub tasks: Vec<(String, T)>,
    /// `true` runs every task in this stage concurrently (bounded by the
    /// caller's `workers`); `false` runs them one at a time, in order.
    pub parallel: bool,
}

/// Run a sequence of [`Stage`]s with the executor's usual
/// parallel/fail-fast/ordering semantics applied per stage, stopping
/// before any stage that comes after one containing a task error.
pub fn run_pipeline<T: Task>(
    ctx: &RunContext,
    stages: Vec<Stage<T>>,
    workers: usize,
) -> Vec<Vec<TaskResult<T::Output>>> {
    let mut all = Vec::with_capacity(stages.len());
    for stage in stages {
        if ctx.is_cancelled() {
            break;
        }
        debug!(stage = %stage.name, tasks = stage.tasks.len(), "running executor stage");
        let stage_workers = if stage.parallel { workers } else { 1 };
        let results = Executor::new().with_workers(stage_workers).with_fail_fast(true).execute(ctx, stage.tasks);
        let stage_failed = results.iter().any(|r| r.outcome.is_err());
        all.push(results);
        if stage_failed {
            warn!(stage = %stage.name, "stage failed, stopping pipeline");
            break;
        }
    }
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTask {
        fail: bool,
        counter: Arc<AtomicUsize>,
    }

    impl Task for CountingTask {
        type Output = usize;
        fn run(self, _ctx: &RunContext) -> Result<usize> {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(crate::errors::ForgecastError::Config { message: "boom".into() })
            } else {
                Ok(n)
            }
        }
    }

    #[test]
    fn runs_every_task_and_preserves_submission_order_in_results() {
        let ctx = RunContext::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<_> = (0..5)
            .map(|i| (format!("task-{i}"), CountingTask { fail: false, counter: Arc::clone(&counter) }))
            .collect();
        let results = Executor::new().with_workers(2).execute(&ctx, tasks);
        assert_eq!(results.len(), 5);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.label, format!("task-{i}"));
            assert!(r.outcome.is_ok());
        }
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn fail_fast_cancels_context_after_first_failure() {
        let ctx = RunContext::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let tasks = vec![
            ("a".to_string(), CountingTask { fail: true, counter: Arc::clone(&counter) }),
            ("b".to_string(), CountingTask { fail: false, counter: Arc::clone(&counter) }),
        ];
        let _ = Executor::new().with_workers(1).with_fail_fast(true).execute(&ctx, tasks);
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn parallel_map_applies_function_to_every_item() {
        let ctx = RunContext::new();
        let results = parallel_map(&ctx, vec![1, 2, 3], 3, |n, _ctx| Ok(n * 2));
        let values: Vec<i32> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![2, 4, 6]);
    }

    #[test]
    fn for_each_propagates_the_first_error() {
        let ctx = RunContext::new();
        let err = for_each(&ctx, vec![1, 2, 3], 1, |n, _ctx| {
            if n == 2 {
                Err(crate::errors::ForgecastError::Config { message: "boom".into() })
            } else {
                Ok(())
            }
        });
        assert!(err.is_err());
    }

    #[test]
    fn semaphore_never_lets_more_than_limit_holders_through_at_once() {
        let ctx = RunContext::new();
        let semaphore = Semaphore::new(2);
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let results = parallel_map(&ctx, (0..6).collect(), 6, {
            let semaphore = semaphore.clone();
            let concurrent = Arc::clone(&concurrent);
            let max_seen = Arc::clone(&max_seen);
            move |_n, ctx| {
                let _permit = semaphore.acquire(ctx)?;
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(10));
                concurrent.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        });
        for r in results {
            r.unwrap();
        }
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn run_pipeline_stops_before_the_stage_after_a_failure() {
        let ctx = RunContext::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let ok_stage = |label: &str, fail: bool| Stage {
            name: label.to_owned(),
            tasks: vec![(label.to_owned(), CountingTask { fail, counter: Arc::clone(&counter) })],
            parallel: true,
        };
        let stages = vec![ok_stage("first", false), ok_stage("second", true), ok_stage("third", false)];
        let results = run_pipeline(&ctx, stages, 2);
        assert_eq!(results.len(), 2);
        assert!(results[0][0].outcome.is_ok());
        assert!(results[1][0].outcome.is_err());
    }
}
