//! Actor-style serialized job execution.
//!
//! Completion callbacks run on whatever runtime worker delivered them, so
//! stateful objects shared between sessions (a room, a lobby) would need a
//! lock held across every mutation. A [`JobQueue`] replaces that: callers
//! push closures, and the queue guarantees they run one at a time in push
//! order. State touched only from jobs on one queue needs no further
//! synchronization.
//!
//! Known limitation, kept on purpose: a long-running job delays every job
//! behind it on the same queue (head-of-line blocking). Ordering and
//! exclusivity are the contract; running jobs in parallel would break it.

use std::collections::VecDeque;

use parking_lot::Mutex;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Inner {
    jobs: VecDeque<Job>,
    /// True while some thread is draining the queue.
    flushing: bool,
}

/// Serialized task queue: jobs run exactly once, in push order, never
/// concurrently with each other.
pub struct JobQueue {
    inner: Mutex<Inner>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                jobs: VecDeque::new(),
                flushing: false,
            }),
        }
    }

    /// Enqueues a job. If no other thread is currently draining the queue,
    /// the calling thread takes over draining and runs jobs (its own and any
    /// pushed meanwhile) until the queue is empty.
    ///
    /// Safe to call from inside a job on the same queue: the nested push
    /// only enqueues, and the already-running drain loop picks it up.
    pub fn push(&self, job: impl FnOnce() + Send + 'static) {
        let drain = {
            let mut inner = self.inner.lock();
            inner.jobs.push_back(Box::new(job));
            if inner.flushing {
                false
            } else {
                // First pusher claims drain responsibility.
                inner.flushing = true;
                true
            }
        };

        if drain {
            self.flush();
        }
    }

    /// Runs queued jobs until none remain. Each job executes outside the
    /// lock so pushes from other threads (or from the job itself) only pay
    /// for the enqueue.
    fn flush(&self) {
        loop {
            let job = {
                let mut inner = self.inner.lock();
                match inner.jobs.pop_front() {
                    Some(job) => job,
                    None => {
                        inner.flushing = false;
                        return;
                    }
                }
            };
            job();
        }
    }

    /// Number of jobs waiting (excluding the one currently running).
    pub fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().jobs.is_empty()
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_jobs_run_in_push_order() {
        let queue = JobQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let log = Arc::clone(&log);
            queue.push(move || log.lock().push(i));
        }

        assert_eq!(*log.lock(), (0..10).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_every_job_runs_exactly_once_under_contention() {
        let queue = Arc::new(JobQueue::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let threads = 8;
        let jobs_per_thread = 1000;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..jobs_per_thread {
                        let counter = Arc::clone(&counter);
                        queue.push(move || {
                            counter.fetch_add(1, Ordering::Relaxed);
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.load(Ordering::Relaxed), threads * jobs_per_thread);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_jobs_never_run_concurrently() {
        let queue = Arc::new(JobQueue::new());
        let active = Arc::new(AtomicUsize::new(0));
        let overlapped = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let active = Arc::clone(&active);
                let overlapped = Arc::clone(&overlapped);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let active = Arc::clone(&active);
                        let overlapped = Arc::clone(&overlapped);
                        queue.push(move || {
                            if active.fetch_add(1, Ordering::SeqCst) != 0 {
                                overlapped.fetch_add(1, Ordering::SeqCst);
                            }
                            std::hint::spin_loop();
                            active.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(overlapped.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reentrant_push_from_inside_a_job() {
        let queue = Arc::new(JobQueue::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        {
            let queue_inner = Arc::clone(&queue);
            let log_outer = Arc::clone(&log);
            let log_inner = Arc::clone(&log);
            queue.push(move || {
                log_outer.lock().push("outer");
                queue_inner.push(move || log_inner.lock().push("inner"));
            });
        }

        // The draining thread picked the nested job up after the outer one.
        assert_eq!(*log.lock(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_per_thread_push_order_is_preserved() {
        let queue = Arc::new(JobQueue::new());
        let log: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..4)
            .map(|tid| {
                let queue = Arc::clone(&queue);
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for seq in 0..500 {
                        let log = Arc::clone(&log);
                        queue.push(move || log.lock().push((tid, seq)));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        // Jobs from one thread must appear in that thread's push order.
        let log = log.lock();
        let mut last_seq = [None::<usize>; 4];
        for &(tid, seq) in log.iter() {
            if let Some(prev) = last_seq[tid] {
                assert!(seq > prev, "thread {tid} job {seq} ran before {prev}");
            }
            last_seq[tid] = Some(seq);
        }
        assert_eq!(log.len(), 4 * 500);
    }
}
