//! Per-build worker pool.
//!
//! Every parallel phase of a build is a flat "for i in 0..count call f(i)"
//! loop. [`BuildContext::run_on_individual`] hands indices out one at a
//! time from a single shared counter; there is no chunking or stealing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use visbake_core::{Error, Result};

/// Owns the worker threads for one build invocation.
pub struct BuildContext {
    pool: ThreadPool,
}

impl BuildContext {
    /// Create a context with `threads` workers; 0 uses every available core.
    pub fn new(threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("visbake-worker-{i}"))
            .build()
            .map_err(|e| Error::InvalidOptions(format!("cannot start worker pool: {e}")))?;
        Ok(Self { pool })
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Call `f(i)` for every `i` in `0..count` on the worker pool and wait
    /// for all of them to finish.
    pub fn run_on_individual<F>(&self, name: &str, count: usize, show_progress: bool, f: F)
    where
        F: Fn(usize) + Sync,
    {
        self.dispatch(name, count, show_progress, |i| {
            f(i);
            true
        });
    }

    /// Like [`run_on_individual`](Self::run_on_individual), but stops
    /// handing out work after the first error and returns it.
    pub fn try_run_on_individual<F>(
        &self,
        name: &str,
        count: usize,
        show_progress: bool,
        f: F,
    ) -> Result<()>
    where
        F: Fn(usize) -> Result<()> + Sync,
    {
        let failure: Mutex<Option<Error>> = Mutex::new(None);
        self.dispatch(name, count, show_progress, |i| match f(i) {
            Ok(()) => true,
            Err(err) => {
                failure.lock().get_or_insert(err);
                false
            }
        });
        match failure.into_inner() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Worker loop shared by both entry points. `f` returns false to stop
    /// every worker.
    fn dispatch<F>(&self, name: &str, count: usize, show_progress: bool, f: F)
    where
        F: Fn(usize) -> bool + Sync,
    {
        if count == 0 {
            return;
        }
        let start = Instant::now();
        let dispatch = Mutex::new(0usize);
        let completed = AtomicUsize::new(0);
        let step = (count / 10).max(1);

        self.pool.broadcast(|_| loop {
            let index = {
                let mut next = dispatch.lock();
                if *next >= count {
                    break;
                }
                let index = *next;
                *next += 1;
                index
            };

            if !f(index) {
                // Drain the counter so every worker stops.
                *dispatch.lock() = count;
                break;
            }

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if show_progress && done % step == 0 {
                tracing::debug!(phase = name, "{}%", done * 100 / count);
            }
        });

        tracing::debug!(
            phase = name,
            count,
            completed = completed.into_inner(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "phase complete"
        );
    }
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("threads", &self.threads())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn visits_every_index_once() {
        let ctx = BuildContext::new(4).unwrap();
        let hits: Vec<AtomicU64> = (0..1000).map(|_| AtomicU64::new(0)).collect();
        ctx.run_on_individual("count", hits.len(), false, |i| {
            hits[i].fetch_add(1, Ordering::Relaxed);
        });
        assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn first_error_is_returned() {
        let ctx = BuildContext::new(2).unwrap();
        let result = ctx.try_run_on_individual("fail", 100, false, |i| {
            if i == 17 {
                Err(Error::Invariant("seventeen".into()))
            } else {
                Ok(())
            }
        });
        assert!(matches!(result, Err(Error::Invariant(_))));
    }

    #[test]
    fn zero_count_is_a_no_op() {
        let ctx = BuildContext::new(1).unwrap();
        ctx.run_on_individual("nothing", 0, true, |_| unreachable!());
        assert_eq!(ctx.threads(), 1);
    }
}
