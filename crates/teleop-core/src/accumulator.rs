//! [`CommandAccumulator`] – the only state shared between the input side and
//! the planning loop.
//!
//! Input callbacks call [`CommandAccumulator::accumulate`] at whatever rate
//! the operator's device produces deltas.  The planning loop calls
//! [`CommandAccumulator::take`] once per cycle.  Both go through the same
//! mutex, so a cycle always sees the sum of whole updates and the offset it
//! leaves behind is exactly zero.
//!
//! # Example
//!
//! ```
//! use teleop_core::accumulator::CommandAccumulator;
//! use teleop_types::{MotionDelta, Vec3};
//!
//! let acc = CommandAccumulator::new(2.0).unwrap();
//! acc.accumulate(MotionDelta::new(0.001, 0.0, 0.0)).unwrap();
//! acc.accumulate(MotionDelta::new(0.001, 0.0, -0.5)).unwrap();
//!
//! assert_eq!(acc.take(), Vec3::new(0.004, 0.0, -1.0));
//! assert_eq!(acc.take(), Vec3::zero());
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use teleop_types::{MotionDelta, TeleopError, Vec3};
use tracing::debug;

/// Thread-safe running sum of scaled operator deltas.
#[derive(Debug)]
pub struct CommandAccumulator {
    scale: f64,
    offset: Mutex<Vec3>,
}

impl CommandAccumulator {
    /// Create an empty accumulator that multiplies every delta by `scale`.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::InvalidConfig`] if `scale` is NaN or infinite.
    pub fn new(scale: f64) -> Result<Self, TeleopError> {
        if !scale.is_finite() {
            return Err(TeleopError::InvalidConfig(format!(
                "sensitivity scale must be finite, got {scale}"
            )));
        }
        Ok(Self {
            scale,
            offset: Mutex::new(Vec3::zero()),
        })
    }

    /// The configured sensitivity factor.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Add `delta * scale` to the pending offset.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::InvalidDelta`] when the delta is not finite or
    /// when adding it would overflow the offset.  The pending offset is left
    /// exactly as it was.
    pub fn accumulate(&self, delta: MotionDelta) -> Result<(), TeleopError> {
        let raw = delta.as_vec3();
        if !raw.is_finite() {
            return Err(TeleopError::InvalidDelta(format!(
                "non-finite component in ({}, {}, {})",
                delta.dx, delta.dy, delta.dz
            )));
        }

        let updated = {
            let mut offset = self.lock();
            let next = *offset + raw * self.scale;
            if !next.is_finite() {
                return Err(TeleopError::InvalidDelta(format!(
                    "accumulated offset would overflow: ({}, {}, {})",
                    next.x, next.y, next.z
                )));
            }
            *offset = next;
            next
        };

        debug!(x = updated.x, y = updated.y, z = updated.z, "control value");
        Ok(())
    }

    /// Return the pending offset and reset it to zero in one step.
    pub fn take(&self) -> Vec3 {
        std::mem::take(&mut *self.lock())
    }

    // A panic while holding the lock cannot leave a half-written `Vec3`
    // behind, so a poisoned mutex is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Vec3> {
        self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a.x - b.x).abs() < 1e-12 && (a.y - b.y).abs() < 1e-12 && (a.z - b.z).abs() < 1e-12
    }

    #[test]
    fn fresh_accumulator_is_empty() {
        let acc = CommandAccumulator::new(1.0).unwrap();
        assert_eq!(acc.take(), Vec3::zero());
    }

    #[test]
    fn deltas_are_scaled_and_summed() {
        let acc = CommandAccumulator::new(0.5).unwrap();
        acc.accumulate(MotionDelta::new(0.002, 0.004, 0.0)).unwrap();
        acc.accumulate(MotionDelta::new(0.002, 0.0, -0.008)).unwrap();
        assert!(approx(acc.take(), Vec3::new(0.002, 0.002, -0.004)));
    }

    #[test]
    fn three_deltas_combine_into_one_offset() {
        let acc = CommandAccumulator::new(1.0).unwrap();
        acc.accumulate(MotionDelta::new(0.001, 0.0, 0.0)).unwrap();
        acc.accumulate(MotionDelta::new(0.001, 0.0, 0.0)).unwrap();
        acc.accumulate(MotionDelta::new(0.0005, 0.0, 0.0)).unwrap();
        assert!(approx(acc.take(), Vec3::new(0.0025, 0.0, 0.0)));
    }

    #[test]
    fn take_clears_the_offset() {
        let acc = CommandAccumulator::new(1.0).unwrap();
        acc.accumulate(MotionDelta::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(acc.take(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(acc.take(), Vec3::zero());
    }

    #[test]
    fn non_finite_scale_is_rejected() {
        assert!(matches!(
            CommandAccumulator::new(f64::NAN),
            Err(TeleopError::InvalidConfig(_))
        ));
        assert!(CommandAccumulator::new(f64::INFINITY).is_err());
    }

    #[test]
    fn non_finite_delta_is_rejected_and_offset_untouched() {
        let acc = CommandAccumulator::new(1.0).unwrap();
        acc.accumulate(MotionDelta::new(0.01, 0.0, 0.0)).unwrap();

        let err = acc
            .accumulate(MotionDelta::new(f64::NAN, 0.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, TeleopError::InvalidDelta(_)));
        assert!(
            acc.accumulate(MotionDelta::new(0.0, f64::NEG_INFINITY, 0.0))
                .is_err()
        );

        assert_eq!(acc.take(), Vec3::new(0.01, 0.0, 0.0));
    }

    #[test]
    fn overflowing_update_is_rejected() {
        let acc = CommandAccumulator::new(1.0).unwrap();
        acc.accumulate(MotionDelta::new(f64::MAX, 0.0, 0.0)).unwrap();
        assert!(acc.accumulate(MotionDelta::new(f64::MAX, 0.0, 0.0)).is_err());
        assert_eq!(acc.take(), Vec3::new(f64::MAX, 0.0, 0.0));
    }

    #[test]
    fn concurrent_accumulation_loses_nothing() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 1000;

        let acc = Arc::new(CommandAccumulator::new(1.0).unwrap());
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let acc = Arc::clone(&acc);
                thread::spawn(move || {
                    for _ in 0..PER_THREAD {
                        acc.accumulate(MotionDelta::new(1.0, 2.0, -1.0)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let n = (THREADS * PER_THREAD) as f64;
        assert_eq!(acc.take(), Vec3::new(n, 2.0 * n, -n));
        assert_eq!(acc.take(), Vec3::zero());
    }

    #[test]
    fn concurrent_take_observes_whole_updates_only() {
        // Each writer adds (1, 1, 1); a torn read would show unequal
        // components.  Everything taken plus the remainder must equal the
        // total written.
        const THREADS: usize = 4;
        const PER_THREAD: usize = 2000;

        let acc = Arc::new(CommandAccumulator::new(1.0).unwrap());
        let barrier = Arc::new(Barrier::new(THREADS + 1));
        let writers: Vec<_> = (0..THREADS)
            .map(|_| {
                let acc = Arc::clone(&acc);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..PER_THREAD {
                        acc.accumulate(MotionDelta::new(1.0, 1.0, 1.0)).unwrap();
                    }
                })
            })
            .collect();

        barrier.wait();
        let mut taken = 0.0;
        for _ in 0..500 {
            let snap = acc.take();
            assert_eq!(snap.x, snap.y);
            assert_eq!(snap.y, snap.z);
            taken += snap.x;
        }
        for w in writers {
            w.join().unwrap();
        }
        taken += acc.take().x;

        assert_eq!(taken, (THREADS * PER_THREAD) as f64);
        assert_eq!(acc.take(), Vec3::zero());
    }
}
