use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};

/// Shape of the simulated progress bar while a job is in flight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressCurve {
    pub tick_interval: Duration,
    pub max_increment: f32,
    pub hold_at: f32,
}

impl Default for ProgressCurve {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(200),
            max_increment: 15.0,
            hold_at: 90.0,
        }
    }
}

/// Random-walk progress that climbs toward `hold_at` and then stays there.
pub struct ProgressSimulator<R = StdRng> {
    curve: ProgressCurve,
    value: f32,
    rng: R,
}

impl ProgressSimulator<StdRng> {
    pub fn new(curve: ProgressCurve, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(curve, rng)
    }
}

impl<R: Rng> ProgressSimulator<R> {
    pub fn with_rng(curve: ProgressCurve, rng: R) -> Self {
        Self {
            curve,
            value: 0.0,
            rng,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn is_holding(&self) -> bool {
        self.value >= self.ceiling()
    }

    fn ceiling(&self) -> f32 {
        if self.curve.hold_at.is_nan() {
            0.0
        } else {
            self.curve.hold_at.min(100.0)
        }
    }

    pub fn tick(&mut self) -> f32 {
        if self.is_holding() {
            return self.value;
        }
        let max_increment = self.curve.max_increment;
        let increment = if max_increment > 0.0 && max_increment.is_finite() {
            self.rng.gen_range(0.0..max_increment)
        } else {
            0.0
        };
        self.value = (self.value + increment).min(self.ceiling());
        self.value
    }
}
