//! Calibrated monotonic time for the timer subsystem.
//!
//! All timers run against a single nanosecond-resolution [`TimeSource`]. In
//! production that is [`CalibratedClock`], which amortizes the cost of the
//! system monotonic clock by periodically re-synchronizing the CPU cycle
//! counter against it on a background thread; unit tests can drive consumers
//! deterministically via [`FakeClock`].

mod calibration;
mod clock;
mod tsc;

pub use clock::{CalibratedClock, FakeClock, TimeSource, CALIBRATION_INTERVAL};
