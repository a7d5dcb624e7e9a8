//! Virtual clocks.
//!
//! The VM is driven by the host in frames of arbitrary length. These
//! clocks turn the elapsed wall-clock time of each frame into a whole
//! number of ticks at a fixed frequency. Time that doesn't add up to a
//! full tick is carried over to the next frame, so the long-run tick rate
//! stays correct no matter how fast or slow the host's frames are.
use std::time::Duration;

use crate::constants::*;

/// Fixed-rate tick accumulator.
///
/// Elapsed time is stored as `nanoseconds * frequency`, so one tick
/// is exactly [`NANOS_IN_SECOND`] units and no precision is lost when
/// the tick period isn't a whole number of nanoseconds (60Hz, for example).
#[derive(Debug, Clone)]
pub struct Clock {
    frequency: u64,
    acc: u128,
}

impl Clock {
    /// Creates a clock ticking `frequency` times per second.
    pub fn new(frequency: u64) -> Self {
        Self { frequency, acc: 0 }
    }

    /// Set the clock state back to zero.
    pub fn reset(&mut self) {
        self.acc = 0;
    }

    /// Add elapsed time and consume the number of whole ticks that are due.
    ///
    /// The fractional remainder stays in the accumulator.
    pub fn advance(&mut self, delta: Duration) -> u64 {
        self.acc += delta.as_nanos() * self.frequency as u128;

        let due = self.acc / NANOS_IN_SECOND as u128;
        self.acc -= due * NANOS_IN_SECOND as u128;

        due as u64
    }

    /// Time accumulated towards the next tick.
    #[cfg(test)]
    pub(crate) fn remainder(&self) -> Duration {
        if self.frequency == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos((self.acc / self.frequency as u128) as u64)
        }
    }
}

/// Delay and sound timers, counting down at 60Hz.
#[derive(Debug, Clone)]
pub struct Timer {
    clock: Clock,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Self {
        Self {
            clock: Clock::new(TIMER_FREQUENCY),
        }
    }

    pub fn reset(&mut self) {
        self.clock.reset();
    }

    /// Advance the timers by the elapsed wall-clock time.
    ///
    /// Each due tick decrements both timers by one, stopping at zero.
    /// Returns the number of ticks that elapsed.
    pub fn advance(&mut self, delta: Duration, delay: &mut u8, sound: &mut u8) -> u64 {
        let ticks = self.clock.advance(delta);

        // Timers saturate at zero, so only the first 255 ticks can make a difference.
        let steps = ticks.min(u8::MAX as u64) as u8;
        *delay = delay.saturating_sub(steps);
        *sound = sound.saturating_sub(steps);

        ticks
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clock_carries_remainder() {
        let mut clock = Clock::new(1000);

        // 1.5 cycles, then another 1.5 cycles
        assert_eq!(clock.advance(Duration::from_micros(1500)), 1);
        assert_eq!(clock.remainder(), Duration::from_micros(500));
        assert_eq!(clock.advance(Duration::from_micros(1500)), 2);
        assert_eq!(clock.remainder(), Duration::ZERO);
    }

    #[test]
    fn test_clock_sub_tick_frames() {
        let mut clock = Clock::new(60);
        let total: u64 = (0..1000)
            .map(|_| clock.advance(Duration::from_millis(1)))
            .sum();
        assert_eq!(total, 60);
    }

    #[test]
    fn test_zero_frequency() {
        let mut clock = Clock::new(0);
        assert_eq!(clock.advance(Duration::from_secs(10)), 0);
        assert_eq!(clock.remainder(), Duration::ZERO);
    }

    /// Decrement rate must not depend on frame granularity.
    #[test]
    fn test_timer_frame_granularity() {
        let mut fine = Timer::new();
        let (mut fine_delay, mut fine_sound) = (200, 0);
        for _ in 0..1000 {
            fine.advance(Duration::from_millis(1), &mut fine_delay, &mut fine_sound);
        }

        let mut coarse = Timer::new();
        let (mut coarse_delay, mut coarse_sound) = (200, 0);
        for _ in 0..60 {
            coarse.advance(
                Duration::from_nanos(16_666_667),
                &mut coarse_delay,
                &mut coarse_sound,
            );
        }

        assert_eq!(fine_delay, 140);
        assert_eq!(fine_delay, coarse_delay);
        assert_eq!(fine_sound, 0);
        assert_eq!(coarse_sound, 0);
    }

    #[test]
    fn test_timer_floor() {
        let mut timer = Timer::new();
        let (mut delay, mut sound) = (3, 10);
        let ticks = timer.advance(Duration::from_millis(100), &mut delay, &mut sound);
        assert_eq!(ticks, 6);
        assert_eq!(delay, 0);
        assert_eq!(sound, 4);

        // Long stalls must not wrap around.
        let mut delay = 255;
        timer.advance(Duration::from_secs(3600), &mut delay, &mut sound);
        assert_eq!(delay, 0);
        assert_eq!(sound, 0);
    }
}
