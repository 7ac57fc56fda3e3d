//! Repeatable callback timers without a thread per timer.
//!
//! [`TimerScheduler`] multiplexes any number of [`Timer`]s onto one driving
//! thread: submissions from arbitrary threads land in a mutex-guarded intake
//! queue and each [`TimerScheduler::tick`] drains it, fires whatever is due
//! and retires exhausted timers. [`ThreadTimer`] is the simpler alternative
//! for callers who can afford one dedicated thread per timer.

mod scheduler;
mod thread_timer;
mod timer;

pub use scheduler::{SchedulerHandle, TimerScheduler};
pub use thread_timer::{ThreadTimer, ThreadTimerError};
pub use timer::{Timer, REPEAT_FOREVER};
