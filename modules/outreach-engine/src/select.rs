use std::cmp::Ordering;

use outreach_common::Candidate;

/// Preference order: popularity descending, then earliest observed, then id.
/// Total, so the same input always yields the same order.
pub fn compare(a: &Candidate, b: &Candidate) -> Ordering {
    b.popularity
        .cmp(&a.popularity)
        .then_with(|| a.observed_at.cmp(&b.observed_at))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn rank(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(compare);
    candidates
}

/// Up to `batch_size` candidates in preference order.
pub fn pick_batch(candidates: Vec<Candidate>, batch_size: usize) -> Vec<Candidate> {
    let mut ranked = rank(candidates);
    ranked.truncate(batch_size);
    ranked
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::testing::candidate;

    #[test]
    fn most_popular_wins() {
        let ranked = rank(vec![candidate("a", 12), candidate("b", 40), candidate("c", 18)]);
        assert_eq!(ranked[0].id, "b");
    }

    #[test]
    fn ties_break_on_observation_then_id() {
        let now = Utc::now();
        let mut late = candidate("a", 10);
        late.observed_at = now;
        let mut early = candidate("z", 10);
        early.observed_at = now - Duration::seconds(5);
        let mut same_time = candidate("b", 10);
        same_time.observed_at = now;

        let ids: Vec<_> = rank(vec![late, same_time, early])
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, ["z", "a", "b"]);
    }

    #[test]
    fn batch_is_truncated_in_order() {
        let ids: Vec<_> = pick_batch(
            vec![candidate("a", 1), candidate("b", 3), candidate("c", 2)],
            2,
        )
        .into_iter()
        .map(|c| c.id)
        .collect();
        assert_eq!(ids, ["b", "c"]);
    }

    #[test]
    fn empty_input_picks_nothing() {
        assert!(pick_batch(Vec::new(), 5).is_empty());
    }
}
