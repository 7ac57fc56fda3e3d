use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use crate::timer::REPEAT_FOREVER;

#[derive(Debug, Error)]
pub enum ThreadTimerError {
    #[error("timer is already running")]
    AlreadyRunning,
    #[error("failed to spawn timer thread: {0}")]
    Spawn(#[from] io::Error),
}

/// One dedicated OS thread per timer: sleep `interval`, fire, repeat.
///
/// No shared scheduling state and no tick loop; the trade-off against
/// [`TimerScheduler`](crate::TimerScheduler) is one thread (and one blocking
/// sleep) per timer. Stopping joins the worker, so in-flight callbacks finish
/// before [`ThreadTimer::stop`] returns.
pub struct ThreadTimer {
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadTimer {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Start firing `callback` every `interval`, up to `repeat` times
    /// ([`REPEAT_FOREVER`] runs until stopped; zero runs nothing).
    ///
    /// The running flag is re-checked after each sleep, so no firing happens
    /// once [`ThreadTimer::stop`] has begun. Rejected while a previous
    /// schedule is still running.
    pub fn start(
        &mut self,
        interval: Duration,
        repeat: u64,
        mut callback: impl FnMut() + Send + 'static,
    ) -> Result<(), ThreadTimerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ThreadTimerError::AlreadyRunning);
        }
        // A finished worker leaves the flag cleared but the handle parked
        // here; reap it before spawning the replacement.
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }

        let running = Arc::clone(&self.running);
        let worker = thread::Builder::new()
            .name("steady-thread-timer".into())
            .spawn(move || {
                let mut fired = 0u64;
                while running.load(Ordering::SeqCst) && (repeat == REPEAT_FOREVER || fired < repeat)
                {
                    thread::sleep(interval);
                    // Re-check: stop() during the sleep wins over the firing.
                    if !running.load(Ordering::SeqCst) {
                        return;
                    }
                    callback();
                    fired += 1;
                }
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|err| {
                self.running.store(false, Ordering::SeqCst);
                ThreadTimerError::Spawn(err)
            })?;
        self.worker = Some(worker);
        Ok(())
    }

    /// Whether the worker is still scheduled to fire.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop firing and join the worker thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            tracing::debug!("stopping thread timer");
            let _ = worker.join();
        }
    }
}

impl Default for ThreadTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
