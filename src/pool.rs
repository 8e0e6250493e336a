//! Bounded worker pool for one cycle of independent trials.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::TpmError;

/// Fixed-size pool; each worker blocks on its own external process.
pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self, TpmError> {
        if workers == 0 {
            return Err(TpmError::Config("worker pool needs at least one worker".into()));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("tpm-worker-{:02}", i))
            .build()?;
        Ok(Self { pool })
    }

    pub fn size(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `job` over every item and blocks until all are done.
    ///
    /// Results come back in submission order. The first failing job fails the
    /// whole batch; no partial result is returned.
    pub fn run_batch<T, R, F>(&self, items: &[T], job: F) -> Result<Vec<R>, TpmError>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R, TpmError> + Sync + Send,
    {
        self.pool
            .install(|| items.par_iter().with_max_len(1).map(&job).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_results_in_submission_order() {
        let pool = WorkerPool::new(4).unwrap();
        let items: Vec<u64> = (0..12).collect();
        let out = pool
            .run_batch(&items, |&i| {
                // Early items finish last
                thread::sleep(Duration::from_millis(5 * (12 - i)));
                Ok(i * 10)
            })
            .unwrap();
        assert_eq!(out, (0..12).map(|i| i * 10).collect::<Vec<_>>());
    }

    #[test]
    fn test_jobs_run_on_distinct_workers() {
        let pool = WorkerPool::new(4).unwrap();
        assert_eq!(pool.size(), 4);
        let names = Mutex::new(HashSet::new());
        let items: Vec<usize> = (0..4).collect();
        pool.run_batch(&items, |_| {
            thread::sleep(Duration::from_millis(50));
            let name = thread::current().name().map(str::to_string);
            names.lock().unwrap().insert(name);
            Ok(())
        })
        .unwrap();
        assert!(names.lock().unwrap().len() > 1);
    }

    #[test]
    fn test_single_failure_fails_batch() {
        let pool = WorkerPool::new(3).unwrap();
        let items: Vec<usize> = (0..6).collect();
        let result = pool.run_batch(&items, |&i| {
            if i == 4 {
                Err(TpmError::EmptyOutput {
                    command: format!("trial {}", i),
                })
            } else {
                Ok(i)
            }
        });
        assert!(matches!(result, Err(TpmError::EmptyOutput { .. })));
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(WorkerPool::new(0), Err(TpmError::Config(_))));
    }
}
