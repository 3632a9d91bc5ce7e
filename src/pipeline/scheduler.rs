//! Sliding-window scheduler for per-page model calls.
//!
//! Jobs wait in a queue; at most `concurrency` of them are in flight at any
//! time. Whenever the window is full (or the queue is empty) the scheduler
//! waits for one in-flight job to settle, stores its outcome, and refills the
//! window. It returns once both the queue and the window are empty.
//!
//! Outcomes go into a slot arena pre-sized to the number of jobs and indexed
//! by job position. Each slot is written exactly once, by the settlement of
//! its own job, so the returned `Vec` is already in job order no matter in
//! which order the jobs completed.
//!
//! A failing job never affects its siblings: the scheduler does not retry and
//! does not abort. A job that exceeds the per-call timeout settles as
//! [`Outcome::TimedOut`]. Cancelling through a [`CancelHandle`] stops new
//! jobs from starting and drops the in-flight ones; their slots, and the
//! slots of jobs that never started, hold [`Outcome::Cancelled`].

use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// How one job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<R> {
    /// The job ran to completion (its own result may still be an error).
    Completed(R),
    /// The per-call deadline elapsed first.
    TimedOut,
    /// The run was cancelled before the job settled.
    Cancelled,
}

/// Cloneable handle that cancels a running conversion.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`CancelHandle::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only ends on `true`.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Scheduler limits.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Upper bound on unsettled jobs. Values below 1 are treated as 1.
    pub concurrency: usize,
    /// Per-job deadline; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Limits {
    pub fn new(concurrency: usize, timeout_secs: u64) -> Self {
        Self {
            concurrency: concurrency.max(1),
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        }
    }
}

/// Run `task` over every job with at most `limits.concurrency` in flight.
///
/// `on_settle(position, &outcome)` is called once per settled job, in
/// completion order. Jobs that never started because of cancellation are
/// not reported there.
pub async fn run_bounded<J, R, F, Fut, S>(
    jobs: Vec<J>,
    limits: Limits,
    cancel: Option<&CancelHandle>,
    mut task: F,
    mut on_settle: S,
) -> Vec<Outcome<R>>
where
    F: FnMut(J) -> Fut,
    Fut: Future<Output = R>,
    S: FnMut(usize, &Outcome<R>),
{
    let total = jobs.len();
    let concurrency = limits.concurrency.max(1);
    let mut slots: Vec<Option<Outcome<R>>> = (0..total).map(|_| None).collect();
    let mut queue: VecDeque<(usize, J)> = jobs.into_iter().enumerate().collect();
    let mut in_flight = FuturesUnordered::new();

    loop {
        if cancel.is_some_and(CancelHandle::is_cancelled) {
            break;
        }

        while in_flight.len() < concurrency {
            let Some((pos, job)) = queue.pop_front() else {
                break;
            };
            let call = task(job);
            let deadline = limits.timeout;
            in_flight.push(async move {
                let outcome = match deadline {
                    Some(limit) => match tokio::time::timeout(limit, call).await {
                        Ok(result) => Outcome::Completed(result),
                        Err(_) => Outcome::TimedOut,
                    },
                    None => Outcome::Completed(call.await),
                };
                (pos, outcome)
            });
        }

        let settled = match cancel {
            Some(handle) => tokio::select! {
                next = in_flight.next() => next,
                _ = handle.cancelled() => break,
            },
            None => in_flight.next().await,
        };

        // `None`: nothing in flight and nothing queued.
        let Some((pos, outcome)) = settled else {
            break;
        };
        debug!("Job {} settled ({} in flight, {} queued)", pos, in_flight.len(), queue.len());
        on_settle(pos, &outcome);
        slots[pos] = Some(outcome);
    }

    if !queue.is_empty() || !in_flight.is_empty() {
        debug!(
            "Cancelled with {} in flight and {} queued",
            in_flight.len(),
            queue.len()
        );
    }

    slots
        .into_iter()
        .map(|slot| slot.unwrap_or(Outcome::Cancelled))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::sleep;

    #[tokio::test]
    async fn results_follow_job_order_despite_reverse_completion() {
        let jobs: Vec<usize> = (0..5).collect();
        let mut completion = Vec::new();

        let out = run_bounded(
            jobs,
            Limits::new(5, 0),
            None,
            |i| async move {
                sleep(Duration::from_millis(20 * (5 - i as u64))).await;
                format!("page{i}")
            },
            |pos, _| completion.push(pos),
        )
        .await;

        assert_eq!(completion, vec![4, 3, 2, 1, 0]);
        let texts: Vec<_> = out
            .into_iter()
            .map(|o| match o {
                Outcome::Completed(s) => s,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(texts, vec!["page0", "page1", "page2", "page3", "page4"]);
    }

    #[tokio::test]
    async fn never_exceeds_concurrency() {
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let out = run_bounded(
            (0..12).collect::<Vec<u64>>(),
            Limits::new(3, 0),
            None,
            |i| {
                let live = Arc::clone(&live);
                let peak = Arc::clone(&peak);
                async move {
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(5 + (i * 7) % 11)).await;
                    live.fetch_sub(1, Ordering::SeqCst);
                    i
                }
            },
            |_, _| {},
        )
        .await;

        assert_eq!(out.len(), 12);
        assert!(out.iter().all(|o| matches!(o, Outcome::Completed(_))));
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failures_do_not_stop_siblings() {
        let out = run_bounded(
            vec![1, 2, 3, 4],
            Limits::new(2, 0),
            None,
            |i| async move {
                if i % 2 == 0 {
                    Err(format!("boom {i}"))
                } else {
                    Ok(i)
                }
            },
            |_, _| {},
        )
        .await;

        assert_eq!(
            out,
            vec![
                Outcome::Completed(Ok(1)),
                Outcome::Completed(Err("boom 2".to_string())),
                Outcome::Completed(Ok(3)),
                Outcome::Completed(Err("boom 4".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn slow_job_times_out_without_blocking_others() {
        let out = run_bounded(
            vec![0u64, 10_000, 0],
            Limits {
                concurrency: 2,
                timeout: Some(Duration::from_millis(50)),
            },
            None,
            |ms| async move {
                sleep(Duration::from_millis(ms)).await;
                ms
            },
            |_, _| {},
        )
        .await;

        assert_eq!(
            out,
            vec![Outcome::Completed(0), Outcome::TimedOut, Outcome::Completed(0)]
        );
    }

    #[tokio::test]
    async fn cancel_stops_remaining_jobs() {
        let handle = CancelHandle::new();
        let started = Arc::new(Mutex::new(Vec::new()));
        let trigger = handle.clone();

        let out = run_bounded(
            (0..6).collect::<Vec<usize>>(),
            Limits::new(2, 0),
            Some(&handle),
            |i| {
                started.lock().unwrap().push(i);
                async move {
                    if i == 1 {
                        sleep(Duration::from_secs(30)).await;
                    }
                    i
                }
            },
            |pos, _| {
                if pos == 0 {
                    trigger.cancel();
                }
            },
        )
        .await;

        assert!(handle.is_cancelled());
        assert_eq!(out[0], Outcome::Completed(0));
        assert!(out[1..].iter().all(|o| *o == Outcome::Cancelled), "{out:?}");
        assert_eq!(*started.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn cancel_from_another_task_interrupts_wait() {
        let handle = CancelHandle::new();
        let remote = handle.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            remote.cancel();
        });

        let out = run_bounded(
            vec![(), ()],
            Limits::new(1, 0),
            Some(&handle),
            |_| sleep(Duration::from_secs(30)),
            |_, _| {},
        )
        .await;

        assert_eq!(out, vec![Outcome::Cancelled, Outcome::Cancelled]);
    }

    #[tokio::test]
    async fn empty_job_list_returns_immediately() {
        let out: Vec<Outcome<()>> =
            run_bounded(Vec::<()>::new(), Limits::new(4, 0), None, |_| async {}, |_, _| {}).await;
        assert!(out.is_empty());
    }

    #[test]
    fn limits_normalise_inputs() {
        let l = Limits::new(0, 0);
        assert_eq!(l.concurrency, 1);
        assert_eq!(l.timeout, None);
        assert_eq!(Limits::new(3, 7).timeout, Some(Duration::from_secs(7)));
    }
}
