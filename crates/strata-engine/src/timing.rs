//! Fixed-rate loop pacing.
//!
//! Every engine thread runs at its own cadence. [`Cadence`] sleeps until the
//! next deadline and reports the clamped delta since the previous wake-up.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Largest delta reported to a loop body, in seconds.
const MAX_DT: f32 = 0.25;

/// Number of recent deltas kept for rate averaging.
const MAX_SAMPLES: usize = 120;

/// Paces a loop at a fixed rate.
#[derive(Debug)]
pub struct Cadence {
    /// Wake-ups per second
    hz: f64,
    /// Time between wake-ups
    period: Duration,
    /// When the next wake-up is due
    next_deadline: Instant,
    /// Previous wake-up
    last_wake: Instant,
    /// Recent deltas for averaging
    samples: VecDeque<f32>,
}

impl Cadence {
    /// Creates a cadence of `hz` wake-ups per second (at least one per
    /// thousand seconds).
    #[must_use]
    pub fn new(hz: f64) -> Self {
        let hz = hz.max(0.001);
        let period = Duration::from_secs_f64(1.0 / hz);
        let now = Instant::now();
        Self {
            hz,
            period,
            next_deadline: now + period,
            last_wake: now,
            samples: VecDeque::with_capacity(MAX_SAMPLES),
        }
    }

    /// Configured rate.
    #[must_use]
    pub fn hz(&self) -> f64 {
        self.hz
    }

    /// Time between wake-ups.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Sleeps until the next deadline and returns the elapsed seconds since
    /// the previous wake-up, clamped to [`MAX_DT`].
    ///
    /// A loop that falls more than one period behind skips the missed
    /// deadlines instead of bursting to catch up.
    pub fn wait(&mut self) -> f32 {
        let now = Instant::now();
        if now < self.next_deadline {
            let sleep_time = self.next_deadline - now;
            if sleep_time > Duration::from_millis(1) {
                std::thread::sleep(sleep_time - Duration::from_millis(1));
            }
            while Instant::now() < self.next_deadline {
                std::hint::spin_loop();
            }
        }

        let woke = Instant::now();
        self.next_deadline += self.period;
        if woke > self.next_deadline {
            self.next_deadline = woke + self.period;
        }

        let dt = (woke - self.last_wake).as_secs_f32().min(MAX_DT);
        self.last_wake = woke;

        self.samples.push_back(dt);
        if self.samples.len() > MAX_SAMPLES {
            self.samples.pop_front();
        }
        dt
    }

    /// Achieved rate averaged over recent wake-ups.
    #[must_use]
    pub fn average_rate(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let avg = self.samples.iter().sum::<f32>() / self.samples.len() as f32;
        if avg > 0.0 {
            1.0 / avg
        } else {
            0.0
        }
    }

    /// Restarts pacing from now (call after a pause).
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.last_wake = now;
        self.next_deadline = now + self.period;
        self.samples.clear();
    }
}
