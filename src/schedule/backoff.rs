// src/schedule/backoff.rs

//! Power-law backoff with symmetric jitter.
//!
//! `delay = attempts^factor * (1 + U(-j/100, +j/100)) * unit`. Power growth
//! keeps early re-polls frequent while later polls space out sharply; the
//! jitter spreads items that share a history length across time.

use rand::Rng;

use crate::error::{AppError, Result};

/// Validated backoff parameters.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    factor: f64,
    jitter_percent: f64,
    unit_ms: u64,
}

impl Backoff {
    /// Build a backoff policy, rejecting parameters that could yield a
    /// zero or negative delay.
    pub fn new(factor: f64, jitter_percent: f64, unit_ms: u64) -> Result<Self> {
        if !factor.is_finite() || factor <= 1.0 {
            return Err(AppError::config(format!(
                "backoff factor must be > 1, got {factor}"
            )));
        }
        if !jitter_percent.is_finite() || !(0.0..100.0).contains(&jitter_percent) {
            return Err(AppError::config(format!(
                "backoff jitter percent must be in [0, 100), got {jitter_percent}"
            )));
        }
        if unit_ms == 0 {
            return Err(AppError::config("backoff unit must be > 0"));
        }
        Ok(Self {
            factor,
            jitter_percent,
            unit_ms,
        })
    }

    /// Delay in milliseconds before the next poll. `attempts` starts at 1.
    pub fn delay_ms(&self, attempts: u32) -> i64 {
        debug_assert!(attempts >= 1, "backoff requires attempts >= 1");
        let attempts = attempts.max(1);

        let jitter = if self.jitter_percent == 0.0 {
            0.0
        } else {
            let bound = self.jitter_percent / 100.0;
            rand::thread_rng().gen_range(-bound..bound)
        };

        let nominal = (attempts as f64).powf(self.factor) * (1.0 + jitter);
        (nominal * self.unit_ms as f64).round() as i64
    }
}

/// One-shot helper mirroring `Backoff::delay_ms`.
pub fn backoff_delay_ms(
    attempts: u32,
    factor: f64,
    jitter_percent: f64,
    unit_ms: u64,
) -> Result<i64> {
    Ok(Backoff::new(factor, jitter_percent, unit_ms)?.delay_ms(attempts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_degenerate_parameters() {
        assert!(Backoff::new(1.0, 10.0, 60_000).is_err());
        assert!(Backoff::new(0.5, 10.0, 60_000).is_err());
        assert!(Backoff::new(4.0, -1.0, 60_000).is_err());
        assert!(Backoff::new(4.0, 100.0, 60_000).is_err());
        assert!(Backoff::new(4.0, 10.0, 0).is_err());
    }

    #[test]
    fn test_deterministic_without_jitter() {
        let b = Backoff::new(2.0, 0.0, 1_000).unwrap();
        assert_eq!(b.delay_ms(1), 1_000);
        assert_eq!(b.delay_ms(2), 4_000);
        assert_eq!(b.delay_ms(3), 9_000);
    }

    #[test]
    fn test_strictly_increasing_in_attempts() {
        let b = Backoff::new(4.0, 0.0, 60_000).unwrap();
        let mut prev = 0;
        for attempts in 1..=10 {
            let d = b.delay_ms(attempts);
            assert!(d > prev, "delay must grow with attempts");
            prev = d;
        }
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let b = Backoff::new(2.0, 10.0, 1_000).unwrap();
        for _ in 0..200 {
            let d = b.delay_ms(3);
            // nominal 9_000, +-10%
            assert!((8_100..=9_900).contains(&d));
            assert!(d >= 0);
        }
    }
}
