use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use steady_time::TimeSource;

use crate::timer::Timer;

/// State shared between the scheduler and its submission handles.
struct Shared {
    clock: Arc<dyn TimeSource>,
    /// Intake FIFO: timers submitted but not yet merged into the live set,
    /// each stamped with its submission time.
    pending: Mutex<VecDeque<(u64, Timer)>>,
    running: AtomicBool,
}

impl Shared {
    fn lock_pending(&self) -> MutexGuard<'_, VecDeque<(u64, Timer)>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn submit(&self, interval: Duration, repeat: u64, callback: impl FnMut() + Send + 'static) {
        // Construct the timer (and read the clock) outside the intake lock;
        // the lock is held only to append one entry.
        let timer = Timer::new(&*self.clock, interval, repeat, callback);
        let submitted_at = self.clock.now_ns();
        self.lock_pending().push_back((submitted_at, timer));
    }
}

/// Single-threaded cooperative timer scheduler.
///
/// Exactly one thread drives [`tick`](TimerScheduler::tick) (the `&mut self`
/// receiver enforces this); submissions may come from any thread through a
/// [`SchedulerHandle`]. Callbacks run inline on the driving thread, so a slow
/// callback delays every other due timer in the same tick.
///
/// The live set is an insertion-ordered bag keyed by submission time and
/// scanned linearly every tick; simultaneously due timers therefore fire in
/// submission order, not due-time order. This is a deliberate compatibility
/// choice, not an optimization target.
pub struct TimerScheduler {
    shared: Arc<Shared>,
    live: Vec<(u64, Timer)>,
}

/// Cloneable submission handle for a [`TimerScheduler`].
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
}

impl SchedulerHandle {
    /// Queue a timer for the scheduler to pick up on a future tick.
    ///
    /// Never blocks on the live set; safe from any number of concurrent
    /// callers. `next_due` is stamped with the current time, so the first
    /// firing happens once `interval` has elapsed from submission.
    pub fn submit(&self, interval: Duration, repeat: u64, callback: impl FnMut() + Send + 'static) {
        self.shared.submit(interval, repeat, callback);
    }

    /// Ask a running scheduler loop to exit after its current tick.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
    }
}

impl TimerScheduler {
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        Self {
            shared: Arc::new(Shared {
                clock,
                pending: Mutex::new(VecDeque::new()),
                running: AtomicBool::new(false),
            }),
            live: Vec::new(),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Submit directly from the driving thread. Equivalent to going through
    /// a [`SchedulerHandle`].
    pub fn submit(&self, interval: Duration, repeat: u64, callback: impl FnMut() + Send + 'static) {
        self.shared.submit(interval, repeat, callback);
    }

    /// One scheduling pass: drain the intake queue into the live set, then
    /// fire every live timer whose `next_due` is at or before the current
    /// time, retiring timers with no repeats left.
    ///
    /// The intake mutex is taken exactly once; when both the intake queue and
    /// the live set are empty this returns immediately. A callback panic
    /// propagates to the caller and aborts the remainder of the scan; timers
    /// not yet visited stay live and are retried on the next tick.
    pub fn tick(&mut self) {
        {
            let mut pending = self.shared.lock_pending();
            if pending.is_empty() && self.live.is_empty() {
                return;
            }
            while let Some(entry) = pending.pop_front() {
                self.live.push(entry);
            }
        }

        let now_ns = self.shared.clock.now_ns();
        let mut i = 0;
        while i < self.live.len() {
            let timer = &mut self.live[i].1;
            if timer.next_due_ns() <= now_ns {
                // `fire` already advances `next_due`; no re-arm needed here.
                timer.fire();
                if timer.is_exhausted() {
                    self.live.remove(i);
                    continue;
                }
            }
            i += 1;
        }
    }

    /// Busy-poll loop: tick back-to-back with no pacing until
    /// [`stop`](TimerScheduler::stop) is observed.
    ///
    /// This burns a full core; prefer [`start_paced`](TimerScheduler::start_paced)
    /// unless tick latency matters more than CPU.
    pub fn start(&mut self) {
        self.run(None);
    }

    /// Like [`start`](TimerScheduler::start) but sleeps `pace` between ticks.
    /// The recommended way to run the scheduler; due timers are then fired
    /// with up to `pace` of extra latency.
    pub fn start_paced(&mut self, pace: Duration) {
        self.run(Some(pace));
    }

    fn run(&mut self, pace: Option<Duration>) {
        self.shared.running.store(true, Ordering::SeqCst);
        tracing::debug!(?pace, "scheduler loop started");
        while self.shared.running.load(Ordering::SeqCst) {
            self.tick();
            if let Some(pace) = pace {
                thread::sleep(pace);
            }
        }
        tracing::debug!("scheduler loop stopped");
    }

    /// Make the next loop iteration exit. Does not interrupt an in-flight
    /// tick or callback.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
    }

    /// Number of timers currently merged into the live set.
    pub fn live_timers(&self) -> usize {
        self.live.len()
    }
}
