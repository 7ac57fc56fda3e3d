//! Double-buffered calibration state shared between the calibration thread
//! and `now()` readers.
//!
//! One writer, many readers, no locks: the writer fills the inactive slot and
//! then publishes it with a release store of the active index; readers
//! acquire-load the index and only ever dereference the slot it designates,
//! so they never observe a partially written checkpoint.

#[cfg(all(feature = "loom", test))]
use loom::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize};
#[cfg(not(all(feature = "loom", test)))]
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize};

use std::sync::atomic::Ordering;

/// One paired (trusted-time, cycle-counter) calibration sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Sample {
    pub trusted_ns: u64,
    pub counter: u64,
}

/// A slot whose counter is zero has never been written.
const UNSET_COUNTER: u64 = 0;

struct Slot {
    trusted_ns: AtomicU64,
    counter: AtomicU64,
}

impl Slot {
    fn new() -> Self {
        Self {
            trusted_ns: AtomicU64::new(0),
            counter: AtomicU64::new(UNSET_COUNTER),
        }
    }
}

pub(crate) struct CalibrationCell {
    slots: [Slot; 2],
    active: AtomicUsize,
    /// Cycles per nanosecond, stored as `f32` bits. Writes are
    /// monotonically-improving estimates, so readers tolerate a stale value.
    rate_bits: AtomicU32,
    calibrated: AtomicBool,
}

impl CalibrationCell {
    pub(crate) fn new() -> Self {
        Self {
            slots: [Slot::new(), Slot::new()],
            active: AtomicUsize::new(0),
            rate_bits: AtomicU32::new(1.0f32.to_bits()),
            calibrated: AtomicBool::new(false),
        }
    }

    /// Writer-side view of the most recently published sample, if any.
    ///
    /// Only the (single) calibration thread may call this; it reads the
    /// active slot, which no one else writes.
    pub(crate) fn active_sample(&self) -> Option<Sample> {
        let slot = &self.slots[self.active.load(Ordering::Relaxed)];
        let counter = slot.counter.load(Ordering::Relaxed);
        if counter == UNSET_COUNTER {
            return None;
        }
        Some(Sample {
            trusted_ns: slot.trusted_ns.load(Ordering::Relaxed),
            counter,
        })
    }

    /// Store `sample` into the inactive slot and flip the active index.
    ///
    /// When `rate` (cycles per nanosecond) is given it is published along
    /// with the sample and the cell becomes calibrated. Single writer only.
    pub(crate) fn publish(&self, sample: Sample, rate: Option<f32>) {
        let next = 1 - self.active.load(Ordering::Relaxed);
        let slot = &self.slots[next];
        slot.trusted_ns.store(sample.trusted_ns, Ordering::Relaxed);
        slot.counter.store(sample.counter, Ordering::Relaxed);
        if let Some(rate) = rate {
            self.rate_bits.store(rate.to_bits(), Ordering::Relaxed);
            // Release pairs with the acquire load in `read`: a reader that
            // observes `calibrated` also sees the slot contents and the rate
            // stored above.
            self.calibrated.store(true, Ordering::Release);
        }
        // The release store of the index publishes the flip itself; slot
        // contents were made visible either by this store or by the
        // `calibrated` store above.
        self.active.store(next, Ordering::Release);
    }

    /// Reader-side snapshot: the active sample plus the current rate, or
    /// `None` until a rate has been published.
    pub(crate) fn read(&self) -> Option<(Sample, f32)> {
        if !self.calibrated.load(Ordering::Acquire) {
            return None;
        }
        let slot = &self.slots[self.active.load(Ordering::Acquire)];
        let sample = Sample {
            trusted_ns: slot.trusted_ns.load(Ordering::Relaxed),
            counter: slot.counter.load(Ordering::Relaxed),
        };
        let rate = f32::from_bits(self.rate_bits.load(Ordering::Relaxed));
        Some((sample, rate))
    }

    pub(crate) fn is_calibrated(&self) -> bool {
        self.calibrated.load(Ordering::Relaxed)
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn unpublished_cell_reads_none() {
        let cell = CalibrationCell::new();
        assert!(cell.active_sample().is_none());
        assert!(cell.read().is_none());
        assert!(!cell.is_calibrated());
    }

    #[test]
    fn rateless_publish_keeps_cell_uncalibrated() {
        let cell = CalibrationCell::new();
        cell.publish(
            Sample {
                trusted_ns: 5,
                counter: 50,
            },
            None,
        );
        // The sample is visible to the writer for the next rate computation,
        // but readers stay on the trusted fallback.
        assert_eq!(
            cell.active_sample(),
            Some(Sample {
                trusted_ns: 5,
                counter: 50,
            })
        );
        assert!(cell.read().is_none());
    }

    #[test]
    fn publish_with_rate_calibrates_and_exposes_latest_sample() {
        let cell = CalibrationCell::new();
        cell.publish(
            Sample {
                trusted_ns: 5,
                counter: 50,
            },
            None,
        );
        cell.publish(
            Sample {
                trusted_ns: 9,
                counter: 90,
            },
            Some(2.5),
        );

        let (sample, rate) = cell.read().expect("calibrated");
        assert_eq!(sample.trusted_ns, 9);
        assert_eq!(sample.counter, 90);
        assert_eq!(rate, 2.5);
        assert!(cell.is_calibrated());
    }

    #[test]
    fn concurrent_reads_never_observe_torn_checkpoints() {
        let cell = Arc::new(CalibrationCell::new());
        let done = Arc::new(AtomicBool::new(false));

        let writer_cell = cell.clone();
        let writer_done = done.clone();
        let writer = thread::spawn(move || {
            // Paced like the real calibration loop: a slot is only rewritten
            // two publishes after it was last handed to readers.
            for k in 1u64..=500 {
                // Counter is always 10x the trusted time, so a torn pair is
                // detectable on the reader side.
                writer_cell.publish(
                    Sample {
                        trusted_ns: k,
                        counter: k * 10,
                    },
                    Some(k as f32),
                );
                thread::sleep(std::time::Duration::from_micros(200));
            }
            writer_done.store(true, Ordering::SeqCst);
        });

        let reader_cell = cell.clone();
        let reader = thread::spawn(move || {
            let mut last_seen = 0u64;
            while !done.load(Ordering::SeqCst) {
                if let Some((sample, rate)) = reader_cell.read() {
                    assert_eq!(sample.counter, sample.trusted_ns * 10);
                    assert!(rate > 0.0);
                    // Samples are published in order, so observations never
                    // go backwards.
                    assert!(sample.trusted_ns >= last_seen);
                    last_seen = sample.trusted_ns;
                }
            }
        });

        writer.join().unwrap();
        reader.join().unwrap();
    }
}
