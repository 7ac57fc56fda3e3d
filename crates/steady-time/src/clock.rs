use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::calibration::{CalibrationCell, Sample};
use crate::tsc;

/// How often the calibration thread re-samples the trusted clock. Shorter
/// intervals track frequency drift more closely at the cost of more wakeups.
pub const CALIBRATION_INTERVAL: Duration = Duration::from_millis(20);

/// A monotonic nanosecond clock.
///
/// Implementations must be cheap enough to call on every scheduler tick.
pub trait TimeSource: Send + Sync {
    /// Nanoseconds since an arbitrary per-clock epoch.
    fn now_ns(&self) -> u64;
}

/// Monotonic clock that amortizes the cost of the system clock by
/// re-synchronizing the CPU cycle counter against it in the background.
///
/// Until the calibration thread has published its first rate (and always, on
/// targets without a usable cycle counter), `now_ns` delegates to
/// [`Instant`]; afterwards it is a counter read plus a multiply.
pub struct CalibratedClock {
    epoch: Instant,
    cell: CalibrationCell,
    calibrator_claimed: AtomicBool,
}

impl CalibratedClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            epoch: Instant::now(),
            cell: CalibrationCell::new(),
            calibrator_claimed: AtomicBool::new(false),
        })
    }

    /// Nanoseconds since this clock was created.
    pub fn now_ns(&self) -> u64 {
        match self.cell.read() {
            None => self.trusted_now_ns(),
            Some((checkpoint, cycles_per_ns)) => {
                let elapsed_cycles = tsc::read_counter().wrapping_sub(checkpoint.counter);
                checkpoint
                    .trusted_ns
                    .saturating_add((elapsed_cycles as f32 / cycles_per_ns) as u64)
            }
        }
    }

    /// Whether the fast path is active.
    pub fn is_calibrated(&self) -> bool {
        self.cell.is_calibrated()
    }

    fn trusted_now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Spawn the background calibration thread.
    ///
    /// Idempotent: only the first caller actually starts a calibrator, later
    /// calls (and the threads they would spawn) return immediately. The
    /// thread runs for the lifetime of the process.
    pub fn spawn_calibration(self: &Arc<Self>) {
        let clock = Arc::clone(self);
        let builder = thread::Builder::new().name("steady-calibration".into());
        match builder.spawn(move || clock.run_calibration()) {
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(%err, "failed to spawn calibration thread; staying on trusted clock");
            }
        }
    }

    /// Calibration loop body. Runs forever on the calling thread.
    ///
    /// Returns immediately if another calibrator already claimed this clock
    /// or the target has no usable cycle counter.
    pub fn run_calibration(&self) {
        if self
            .calibrator_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        if !tsc::available() {
            tracing::debug!("no hardware cycle counter; calibration is a no-op");
            return;
        }
        loop {
            thread::sleep(CALIBRATION_INTERVAL);
            self.calibrate_once();
        }
    }

    fn calibrate_once(&self) {
        let previous = self.cell.active_sample();
        let sample = Sample {
            trusted_ns: self.trusted_now_ns(),
            counter: tsc::read_counter(),
        };

        let rate = match previous {
            // First sample: nothing to derive a rate from yet.
            None => None,
            Some(prev) => {
                let delta_ns = sample.trusted_ns.saturating_sub(prev.trusted_ns);
                if delta_ns == 0 {
                    // Trusted clock too coarse to resolve the interval; keep
                    // the old rate but still hand readers the fresh sample.
                    tracing::debug!("zero trusted-clock delta; skipping rate update");
                    None
                } else {
                    let delta_cycles = sample.counter.wrapping_sub(prev.counter);
                    let rate = (delta_cycles as f32 / delta_ns as f32).max(f32::MIN_POSITIVE);
                    if !self.cell.is_calibrated() {
                        tracing::debug!(cycles_per_ns = rate, "calibrated; fast path enabled");
                    } else {
                        tracing::trace!(cycles_per_ns = rate, "recalibrated");
                    }
                    Some(rate)
                }
            }
        };

        self.cell.publish(sample, rate);
    }
}

impl TimeSource for CalibratedClock {
    fn now_ns(&self) -> u64 {
        CalibratedClock::now_ns(self)
    }
}

/// Deterministic clock for tests: time only moves when told to.
pub struct FakeClock {
    now_ns: AtomicU64,
}

impl FakeClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now_ns: AtomicU64::new(0),
        })
    }

    pub fn set_ns(&self, now_ns: u64) {
        self.now_ns.store(now_ns, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now_ns.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl TimeSource for FakeClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;

    #[test]
    fn uncalibrated_clock_tracks_the_trusted_clock() {
        let clock = CalibratedClock::new();
        assert!(!clock.is_calibrated());

        let a = clock.now_ns();
        thread::sleep(Duration::from_millis(5));
        let b = clock.now_ns();
        assert!(b > a, "clock did not advance across a real delay");
    }

    #[test]
    fn fake_clock_is_fully_deterministic() {
        let clock = FakeClock::new();
        assert_eq!(clock.now_ns(), 0);
        clock.advance(Duration::from_millis(100));
        assert_eq!(clock.now_ns(), 100_000_000);
        clock.set_ns(7);
        assert_eq!(clock.now_ns(), 7);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn calibrated_clock_keeps_advancing_once_the_fast_path_kicks_in() {
        let clock = CalibratedClock::new();
        clock.spawn_calibration();
        // Redundant start: must not spawn a second calibrator.
        clock.spawn_calibration();

        // Two calibration rounds are needed before a rate exists.
        thread::sleep(Duration::from_millis(100));

        let a = clock.now_ns();
        thread::sleep(Duration::from_millis(50));
        let b = clock.now_ns();

        let elapsed = b.saturating_sub(a);
        assert!(b > a, "clock did not advance");
        // Loose bounds: either path (fast or fallback) must roughly track
        // real time for a 50ms wait.
        assert!(
            (10_000_000..1_000_000_000).contains(&elapsed),
            "implausible elapsed time: {elapsed}ns"
        );
    }

    #[test]
    fn run_calibration_is_idempotent_per_clock() {
        let clock = CalibratedClock::new();
        assert!(clock
            .calibrator_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok());
        // The claim is already taken, so this returns instead of looping
        // forever.
        clock.run_calibration();
    }
}
