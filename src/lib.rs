//! Embeddable timer subsystem: a TSC-calibrated monotonic clock plus a
//! single-threaded cooperative timer scheduler.
//!
//! This crate is a thin facade over the workspace members; see
//! [`steady_time`] and [`steady_timers`] for the actual machinery.

pub use steady_time::{CalibratedClock, FakeClock, TimeSource, CALIBRATION_INTERVAL};
pub use steady_timers::{
    SchedulerHandle, ThreadTimer, ThreadTimerError, Timer, TimerScheduler, REPEAT_FOREVER,
};
