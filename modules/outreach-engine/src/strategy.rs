use rand::Rng;

use outreach_common::StrategyWeights;

/// Weighted random choice over content strategies.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    weights: StrategyWeights,
}

impl StrategySelector {
    pub fn new(weights: StrategyWeights) -> Self {
        Self { weights }
    }

    /// Draw uniformly in `[0, total)` and walk the declared order.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        let draw = rng.random::<f64>() * self.weights.total() as f64;
        self.weights.pick_with_draw(draw)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn zero_weight_is_never_chosen() {
        let s = StrategySelector::new(
            StrategyWeights::from_pairs([("muted", 0), ("insight", 1)]).unwrap(),
        );
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            assert_eq!(s.pick(&mut rng), "insight");
        }
    }

    #[test]
    fn frequencies_track_weights() {
        let s = StrategySelector::new(
            StrategyWeights::from_pairs([
                ("insight", 40),
                ("question", 25),
                ("story", 20),
                ("agree_expand", 15),
            ])
            .unwrap(),
        );
        let mut rng = StdRng::seed_from_u64(42);
        let n = 20_000;
        let mut counts: HashMap<&str, u32> = HashMap::new();
        for _ in 0..n {
            *counts.entry(s.pick(&mut rng)).or_default() += 1;
        }
        for (name, weight) in [
            ("insight", 40.0),
            ("question", 25.0),
            ("story", 20.0),
            ("agree_expand", 15.0),
        ] {
            let share = f64::from(counts[name]) / f64::from(n) * 100.0;
            assert!(
                (share - weight).abs() < 2.0,
                "{name}: expected ~{weight}%, got {share:.1}%"
            );
        }
    }
}
