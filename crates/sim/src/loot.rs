//! Loot spawn-count model.
//!
//! The chance that a shortage slot is filled grows with the time since the
//! last successful spawn: after one `base_interval` it equals `probability`,
//! after two it is `1 - (1 - probability)^2`, and so on.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct LootGenerator {
    base_interval: Duration,
    probability: f64,
    time_without_loot: Duration,
}

impl LootGenerator {
    /// `probability` is clamped into `[0, 1]`.
    pub fn new(base_interval: Duration, probability: f64) -> Self {
        Self {
            base_interval,
            probability: probability.clamp(0.0, 1.0),
            time_without_loot: Duration::ZERO,
        }
    }

    pub fn base_interval(&self) -> Duration {
        self.base_interval
    }

    /// Number of items to spawn after `time_delta` more time has passed.
    ///
    /// Spawns never exceed the shortage `looter_count - loot_count`; with no
    /// looters nothing spawns.
    pub fn generate(&mut self, time_delta: Duration, loot_count: usize, looter_count: usize) -> usize {
        self.time_without_loot += time_delta;

        let shortage = looter_count.saturating_sub(loot_count);
        if shortage == 0 {
            return 0;
        }

        let probability = if self.base_interval.is_zero() {
            1.0
        } else {
            let ratio = self.time_without_loot.as_secs_f64() / self.base_interval.as_secs_f64();
            (1.0 - (1.0 - self.probability).powf(ratio)).clamp(0.0, 1.0)
        };

        let generated = (shortage as f64 * probability).round() as usize;
        if generated > 0 {
            self.time_without_loot = Duration::ZERO;
        }
        generated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_no_looters_no_loot() {
        let mut generator = LootGenerator::new(SECOND, 1.0);
        assert_eq!(generator.generate(SECOND * 10, 0, 0), 0);
    }

    #[test]
    fn test_no_shortage_no_loot() {
        let mut generator = LootGenerator::new(SECOND, 1.0);
        assert_eq!(generator.generate(SECOND * 10, 4, 4), 0);
        assert_eq!(generator.generate(SECOND * 10, 5, 4), 0);
    }

    #[test]
    fn test_certain_probability_fills_shortage() {
        let mut generator = LootGenerator::new(SECOND, 1.0);
        assert_eq!(generator.generate(SECOND, 1, 4), 3);
    }

    #[test]
    fn test_zero_time_zero_loot() {
        let mut generator = LootGenerator::new(SECOND, 0.5);
        assert_eq!(generator.generate(Duration::ZERO, 0, 10), 0);
    }

    #[test]
    fn test_partial_probability_after_one_interval() {
        let mut generator = LootGenerator::new(SECOND, 0.5);
        // 10 * 0.5 = 5
        assert_eq!(generator.generate(SECOND, 0, 10), 5);
    }

    #[test]
    fn test_below_period_is_not_guaranteed() {
        let mut generator = LootGenerator::new(SECOND, 0.5);
        // 1 - 0.5^0.1 ≈ 0.067; one looter rounds to zero
        assert_eq!(generator.generate(SECOND / 10, 0, 1), 0);
    }

    #[test]
    fn test_time_accumulates_until_spawn() {
        let mut generator = LootGenerator::new(SECOND, 0.5);
        // 0.25s: p ≈ 0.159 → 0 items
        assert_eq!(generator.generate(SECOND / 4, 0, 2), 0);
        // accumulated 1.25s: p ≈ 0.58 → round(1.16) = 1
        assert_eq!(generator.generate(SECOND, 0, 2), 1);
        // accumulator reset: 0.25s again → 0
        assert_eq!(generator.generate(SECOND / 4, 0, 2), 0);
    }

    #[test]
    fn test_monotonic_in_demand() {
        let counts: Vec<usize> = (0..8)
            .map(|looters| LootGenerator::new(SECOND, 0.5).generate(SECOND, 0, looters))
            .collect();
        assert!(counts.windows(2).all(|w| w[0] <= w[1]), "{counts:?}");
    }
}
