use std::time::Duration;

use steady_time::TimeSource;

/// Repeat-forever sentinel: the maximum representable count, decremented on
/// every fire like any finite count. Practically inexhaustible, not special.
pub const REPEAT_FOREVER: u64 = u64::MAX;

/// One schedulable unit: an interval, a remaining repeat count, the next due
/// time and a callback. Carries no concurrency of its own; whoever holds the
/// timer decides when [`Timer::fire`] runs.
pub struct Timer {
    interval_ns: u64,
    remaining: u64,
    next_due_ns: u64,
    /// Advisory completion estimate computed at arm time; the scheduler's
    /// firing decision only ever looks at `next_due_ns`.
    end_ns: u64,
    callback: Option<Box<dyn FnMut() + Send>>,
}

impl Timer {
    /// A timer with no callback. Dead on construction: `fire` never does
    /// anything until [`Timer::reset`] arms it.
    pub fn unarmed() -> Self {
        Self {
            interval_ns: 0,
            remaining: 0,
            next_due_ns: 0,
            end_ns: 0,
            callback: None,
        }
    }

    /// A timer firing up to `repeat` times, `interval` apart, first due one
    /// `interval` after construction.
    ///
    /// A zero `interval` is accepted and fires as fast as the holder calls
    /// `fire`; a zero `repeat` makes the timer dead on arrival. The repeat
    /// count is saturated downward if `interval * repeat` would overflow the
    /// nanosecond range.
    pub fn new(
        clock: &dyn TimeSource,
        interval: Duration,
        repeat: u64,
        callback: impl FnMut() + Send + 'static,
    ) -> Self {
        let mut timer = Self::unarmed();
        timer.reset(clock, interval, repeat, callback);
        timer
    }

    /// Fully replace the schedule: prior interval, repeat count and callback
    /// are discarded and `next_due`/`end_time` recomputed as in [`Timer::new`].
    pub fn reset(
        &mut self,
        clock: &dyn TimeSource,
        interval: Duration,
        repeat: u64,
        callback: impl FnMut() + Send + 'static,
    ) {
        let interval_ns = interval.as_nanos().min(u64::MAX as u128) as u64;
        let now_ns = clock.now_ns();
        let remaining = if interval_ns == 0 {
            repeat
        } else {
            repeat.min((u64::MAX - now_ns) / interval_ns)
        };
        self.interval_ns = interval_ns;
        self.remaining = remaining;
        self.next_due_ns = now_ns.saturating_add(interval_ns);
        self.end_ns = self
            .next_due_ns
            .saturating_add(interval_ns.saturating_mul(remaining));
        self.callback = Some(Box::new(callback));
    }

    /// Invoke the callback once, advance `next_due` by the interval and
    /// consume one repeat. No-op on a dead timer (no callback or no repeats
    /// left); returns whether the callback ran.
    ///
    /// The callback runs synchronously on the calling thread; a panic inside
    /// it propagates to the caller untouched.
    pub fn fire(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        let Some(callback) = self.callback.as_mut() else {
            return false;
        };
        callback();
        self.next_due_ns = self.next_due_ns.saturating_add(self.interval_ns);
        self.remaining -= 1;
        true
    }

    /// Dead timers are skipped and retired by the scheduler.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0 || self.callback.is_none()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.interval_ns)
    }

    pub fn remaining_repeats(&self) -> u64 {
        self.remaining
    }

    pub fn next_due_ns(&self) -> u64 {
        self.next_due_ns
    }

    pub fn end_ns(&self) -> u64 {
        self.end_ns
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::unarmed()
    }
}
