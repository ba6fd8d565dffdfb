use std::time::Duration;

use rand::Rng;

use outreach_common::config::PacingConfig;

/// Delay between consecutive actions: a fixed base plus uniform jitter.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    config: PacingConfig,
}

impl Pacing {
    pub fn new(config: PacingConfig) -> Self {
        Self { config }
    }

    /// Base plus a uniform draw from `[jitter_min, jitter_max]` seconds.
    pub fn delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let PacingConfig {
            base_secs,
            jitter_min_secs,
            jitter_max_secs,
        } = self.config;
        let jitter = if jitter_max_secs > jitter_min_secs {
            rng.random_range(jitter_min_secs..=jitter_max_secs)
        } else {
            jitter_min_secs
        };
        Duration::from_secs(base_secs + jitter)
    }

    pub fn bounds(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.config.base_secs + self.config.jitter_min_secs),
            Duration::from_secs(self.config.base_secs + self.config.jitter_max_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn delay_stays_within_bounds() {
        let pacing = Pacing::new(PacingConfig {
            base_secs: 240,
            jitter_min_secs: 0,
            jitter_max_secs: 60,
        });
        let (lo, hi) = pacing.bounds();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..500 {
            let d = pacing.delay(&mut rng);
            assert!(d >= lo && d <= hi, "{d:?} outside [{lo:?}, {hi:?}]");
        }
    }

    #[test]
    fn fixed_jitter_is_exact() {
        let pacing = Pacing::new(PacingConfig {
            base_secs: 30,
            jitter_min_secs: 5,
            jitter_max_secs: 5,
        });
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pacing.delay(&mut rng), Duration::from_secs(35));
    }
}
