use std::fmt;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use outreach_common::config::EligibilityRules;
use outreach_common::Candidate;

/// Why a candidate failed eligibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    TooShort { chars: usize },
    Unpopular { popularity: u64 },
    TooOld { age_hours: i64 },
    Denylisted { term: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { chars } => write!(f, "text too short ({chars} chars)"),
            Self::Unpopular { popularity } => write!(f, "popularity {popularity} below minimum"),
            Self::TooOld { age_hours } => write!(f, "published {age_hours}h ago"),
            Self::Denylisted { term } => write!(f, "matches denylisted term '{term}'"),
        }
    }
}

/// Pure eligibility check against [`EligibilityRules`].
pub struct CandidateFilter {
    rules: EligibilityRules,
    denylist: Vec<String>,
}

impl CandidateFilter {
    pub fn new(rules: EligibilityRules) -> Self {
        let denylist = rules
            .denylist
            .iter()
            .map(|term| term.trim().to_lowercase())
            .filter(|term| !term.is_empty())
            .collect();
        Self { rules, denylist }
    }

    pub fn is_eligible(&self, candidate: &Candidate, now: DateTime<Utc>) -> bool {
        self.rejection(candidate, now).is_none()
    }

    /// The first rule `candidate` violates, if any. Candidates without a
    /// publish time are never too old.
    pub fn rejection(&self, candidate: &Candidate, now: DateTime<Utc>) -> Option<Rejection> {
        let chars = candidate.text.trim().chars().count();
        if chars < self.rules.min_text_chars {
            return Some(Rejection::TooShort { chars });
        }

        if candidate.popularity < self.rules.min_popularity {
            return Some(Rejection::Unpopular {
                popularity: candidate.popularity,
            });
        }

        if let (Some(max_hours), Some(published)) =
            (self.rules.max_age_hours, candidate.published_at)
        {
            let age = now - published;
            if age > Duration::hours(i64::from(max_hours)) {
                return Some(Rejection::TooOld {
                    age_hours: age.num_hours(),
                });
            }
        }

        let text = candidate.text.to_lowercase();
        self.denylist
            .iter()
            .find(|term| text.contains(term.as_str()))
            .map(|term| Rejection::Denylisted { term: term.clone() })
    }

    /// Keep the eligible candidates, preserving order.
    pub fn retain_eligible(&self, candidates: Vec<Candidate>, now: DateTime<Utc>) -> Vec<Candidate> {
        candidates
            .into_iter()
            .filter(|c| match self.rejection(c, now) {
                None => true,
                Some(reason) => {
                    debug!(candidate_id = %c.id, %reason, "Candidate ineligible");
                    false
                }
            })
            .collect()
    }
}
