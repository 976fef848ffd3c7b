//! Timing Simulator: randomized human cadence for every simulated interaction.
//!
//! Each interval draws uniformly from its own `[min, max]` millisecond range. The default
//! generator is seeded from entropy; tests use `instant()` (zero variance) or `seeded()`.

use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    pub const fn fixed(ms: u64) -> Self {
        Self { min_ms: ms, max_ms: ms }
    }

    /// Parses `"40-160"` (or a single `"250"`) as milliseconds.
    pub fn parse(spec: &str) -> Result<Self, String> {
        let parse_ms = |s: &str| {
            s.trim()
                .parse::<u64>()
                .map_err(|_| format!("'{spec}' is not a millisecond range like 40-160"))
        };
        match spec.split_once('-') {
            Some((min, max)) => Ok(Self::new(parse_ms(min)?, parse_ms(max)?)),
            None => parse_ms(spec).map(Self::fixed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    Keystroke,
    Field,
    Step,
    Job,
}

/// Per-interval ranges. Keystrokes are the tightest, inter-job pauses the widest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingProfile {
    pub keystroke: DelayRange,
    pub field: DelayRange,
    pub step: DelayRange,
    pub job: DelayRange,
}

impl Default for TimingProfile {
    fn default() -> Self {
        Self {
            keystroke: DelayRange::new(40, 160),
            field: DelayRange::new(400, 1_500),
            step: DelayRange::new(1_500, 3_500),
            job: DelayRange::new(3_000, 8_000),
        }
    }
}

impl TimingProfile {
    pub fn zero() -> Self {
        Self {
            keystroke: DelayRange::fixed(0),
            field: DelayRange::fixed(0),
            step: DelayRange::fixed(0),
            job: DelayRange::fixed(0),
        }
    }

    fn range(&self, interval: Interval) -> DelayRange {
        match interval {
            Interval::Keystroke => self.keystroke,
            Interval::Field => self.field,
            Interval::Step => self.step,
            Interval::Job => self.job,
        }
    }
}

pub struct TimingSimulator {
    profile: TimingProfile,
    rng: Mutex<StdRng>,
}

impl TimingSimulator {
    pub fn new(profile: TimingProfile) -> Self {
        Self {
            profile,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(profile: TimingProfile, seed: u64) -> Self {
        Self {
            profile,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Zero-delay simulator for tests.
    pub fn instant() -> Self {
        Self::seeded(TimingProfile::zero(), 0)
    }

    pub fn sample(&self, interval: Interval) -> Duration {
        let range = self.profile.range(interval);
        if range.min_ms == range.max_ms {
            return Duration::from_millis(range.min_ms);
        }
        let ms = match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(range.min_ms..=range.max_ms),
            // Poisoned: use the midpoint.
            Err(_) => range.min_ms + (range.max_ms - range.min_ms) / 2,
        };
        Duration::from_millis(ms)
    }

    pub async fn pause(&self, interval: Interval) {
        let delay = self.sample(interval);
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}
