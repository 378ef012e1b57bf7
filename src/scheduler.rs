use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::error::{AnalysisError, Result};

type Unit<C> = Box<dyn FnOnce(&mut C) -> Result<()> + Send + 'static>;
type Listener = Box<dyn FnMut(&RunSummary) + Send + 'static>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Completed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub completed: usize,
    pub elapsed: Duration,
}

/// Runs queued units of work strictly in order against a shared context.
///
/// The context is moved into each unit's worker thread and handed back when
/// the unit returns, so a unit only ever sees state its predecessors finished
/// writing. Completion listeners fire once per successful `run_all`.
pub struct Scheduler<C> {
    label: String,
    queue: VecDeque<(String, Unit<C>)>,
    listeners: Vec<Listener>,
    timeout: Option<Duration>,
    state: SchedulerState,
}

impl<C: Send + 'static> Scheduler<C> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            queue: VecDeque::new(),
            listeners: Vec::new(),
            timeout: None,
            state: SchedulerState::Idle,
        }
    }

    /// Fail a run when any single unit takes longer than `timeout`.
    /// A zero duration means no timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|after| !after.is_zero());
        self
    }

    /// Add a unit to the end of the queue. A `Completed` scheduler goes back
    /// to `Idle`.
    pub fn queue<F>(&mut self, name: impl Into<String>, unit: F)
    where
        F: FnOnce(&mut C) -> Result<()> + Send + 'static,
    {
        if self.state == SchedulerState::Completed {
            self.state = SchedulerState::Idle;
        }
        self.queue.push_back((name.into(), Box::new(unit)));
    }

    pub fn on_completed<F>(&mut self, listener: F)
    where
        F: FnMut(&RunSummary) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Execute every queued unit, then notify listeners.
    ///
    /// The first failing unit aborts the run: the rest of the queue is
    /// discarded, listeners are not notified and the error is returned.
    pub fn run_all(&mut self, mut context: C) -> Result<(C, RunSummary)> {
        self.state = SchedulerState::Running;
        let total = self.queue.len();
        let started = Instant::now();
        let mut completed = 0;

        while let Some((name, unit)) = self.queue.pop_front() {
            match self.run_unit(&name, unit, context) {
                Ok(ctx) => {
                    context = ctx;
                    completed += 1;
                    log::debug!("[{}] Task '{}' completed ({} / {})", self.label, name, completed, total);
                }
                Err(err) => {
                    log::error!("[{}] Task '{}' failed: {}", self.label, name, err);
                    self.queue.clear();
                    self.state = SchedulerState::Idle;
                    return Err(err);
                }
            }
        }

        self.state = SchedulerState::Completed;
        let summary = RunSummary {
            completed,
            elapsed: started.elapsed(),
        };
        for listener in &mut self.listeners {
            listener(&summary);
        }

        Ok((context, summary))
    }

    fn run_unit(&self, name: &str, unit: Unit<C>, mut context: C) -> Result<C> {
        let (tx, rx) = flume::bounded(1);

        std::thread::Builder::new()
            .name(thread_name(&format!("{}-{}", self.label, name)))
            .spawn(move || {
                let outcome = unit(&mut context).map(|()| context);
                // Receiver is gone after a timeout; nothing left to report to.
                let _ = tx.send(outcome);
            })
            .map_err(|e| AnalysisError::TaskFailed {
                task: name.to_string(),
                reason: format!("failed to spawn worker: {}", e),
            })?;

        match self.timeout {
            Some(after) => rx.recv_timeout(after).map_err(|e| match e {
                flume::RecvTimeoutError::Timeout => AnalysisError::Timeout {
                    task: name.to_string(),
                    after,
                },
                flume::RecvTimeoutError::Disconnected => worker_vanished(name),
            })?,
            None => rx.recv().map_err(|_| worker_vanished(name))?,
        }
    }
}

/// Thread names may not contain NUL bytes.
pub(crate) fn thread_name(name: &str) -> String {
    name.replace('\0', "")
}

fn worker_vanished(name: &str) -> AnalysisError {
    AnalysisError::TaskFailed {
        task: name.to_string(),
        reason: "worker exited without a result (panicked?)".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn runs_units_in_queue_order() {
        let mut scheduler: Scheduler<Vec<&'static str>> = Scheduler::new("order");
        scheduler.queue("a", |seen| {
            seen.push("a");
            Ok(())
        });
        scheduler.queue("b", |seen| {
            std::thread::sleep(Duration::from_millis(10));
            seen.push("b");
            Ok(())
        });
        scheduler.queue("c", |seen| {
            seen.push("c");
            Ok(())
        });
        assert_eq!(scheduler.pending(), 3);

        let (seen, summary) = scheduler.run_all(Vec::new()).unwrap();
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(summary.completed, 3);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.state(), SchedulerState::Completed);

        scheduler.queue("d", |_| Ok(()));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn unit_sees_predecessor_output() {
        let mut scheduler: Scheduler<Option<u32>> = Scheduler::new("chain");
        scheduler.queue("produce", |slot| {
            std::thread::sleep(Duration::from_millis(20));
            *slot = Some(21);
            Ok(())
        });
        scheduler.queue("consume", |slot| {
            let value = slot.ok_or(AnalysisError::StageOrder("consume before produce"))?;
            *slot = Some(value * 2);
            Ok(())
        });
        let (slot, _) = scheduler.run_all(None).unwrap();
        assert_eq!(slot, Some(42));
    }

    #[test]
    fn completion_fires_once_per_run() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut scheduler: Scheduler<()> = Scheduler::new("once");
        let counter = Arc::clone(&fired);
        scheduler.on_completed(move |summary| {
            assert_eq!(summary.completed, 2);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        scheduler.queue("one", |_| Ok(()));
        scheduler.queue("two", |_| Ok(()));
        scheduler.run_all(()).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        scheduler.queue("three", |_| Ok(()));
        scheduler.queue("four", |_| Ok(()));
        scheduler.run_all(()).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_run_still_completes() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let mut scheduler: Scheduler<()> = Scheduler::new("empty");
        scheduler.on_completed(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let (_, summary) = scheduler.run_all(()).unwrap();
        assert_eq!(summary.completed, 0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn slow_unit_times_out() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let mut scheduler: Scheduler<()> =
            Scheduler::new("slow").with_timeout(Some(Duration::from_millis(20)));
        scheduler.on_completed(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.queue("sleepy", |_| {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        });
        scheduler.queue("never", |_| Ok(()));

        let err = scheduler.run_all(()).unwrap_err();
        assert!(matches!(err, AnalysisError::Timeout { ref task, .. } if task == "sleepy"));
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn zero_timeout_means_no_timeout() {
        let mut scheduler: Scheduler<u32> =
            Scheduler::new("zero").with_timeout(Some(Duration::ZERO));
        scheduler.queue("slow", |n| {
            std::thread::sleep(Duration::from_millis(20));
            *n += 1;
            Ok(())
        });
        scheduler.queue("next", |n| {
            *n += 1;
            Ok(())
        });
        let (n, summary) = scheduler.run_all(0).unwrap();
        assert_eq!(n, 2);
        assert_eq!(summary.completed, 2);
    }

    #[test]
    fn nul_in_label_is_stripped_from_thread_names() {
        assert_eq!(thread_name("a\0b-segment"), "ab-segment");
        let mut scheduler: Scheduler<()> = Scheduler::new("a\0b");
        scheduler.queue("unit\0", |_| Ok(()));
        assert!(scheduler.run_all(()).is_ok());
    }

    #[test]
    fn failing_unit_stops_the_run() {
        let ran = Arc::new(AtomicUsize::new(0));
        let after = Arc::clone(&ran);
        let mut scheduler: Scheduler<()> = Scheduler::new("fail");
        scheduler.queue("bad", |_| Err(AnalysisError::InvalidConfig("nope".into())));
        scheduler.queue("skipped", move |_| {
            after.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(matches!(
            scheduler.run_all(()),
            Err(AnalysisError::InvalidConfig(_))
        ));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn panicking_unit_is_reported() {
        let mut scheduler: Scheduler<()> = Scheduler::new("panic");
        scheduler.queue("boom", |_| panic!("boom"));
        assert!(matches!(
            scheduler.run_all(()),
            Err(AnalysisError::TaskFailed { ref task, .. }) if task == "boom"
        ));
    }
}
