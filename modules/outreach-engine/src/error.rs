use thiserror::Error;

use outreach_common::OutreachError;

use crate::engagement::LoopState;

/// A run that ended on an unrecoverable error, with where it happened.
#[derive(Debug, Error)]
#[error("run failed while {state}{}: {source}", candidate_context(.candidate_id))]
pub struct RunFailure {
    pub state: LoopState,
    pub candidate_id: Option<String>,
    pub source: OutreachError,
}

fn candidate_context(candidate_id: &Option<String>) -> String {
    match candidate_id {
        Some(id) => format!(" (candidate {id})"),
        None => String::new(),
    }
}

impl RunFailure {
    pub fn new(state: LoopState, candidate_id: Option<&str>, source: OutreachError) -> Self {
        Self {
            state,
            candidate_id: candidate_id.map(String::from),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn message_names_state_and_candidate() {
        let failure = RunFailure::new(
            LoopState::Acting,
            Some("urn:li:activity:9"),
            OutreachError::Actuator("target closed".into()),
        );
        assert_eq!(
            failure.to_string(),
            "run failed while acting (candidate urn:li:activity:9): Actuator error: target closed"
        );
    }

    #[test]
    fn message_without_candidate() {
        let failure = RunFailure::new(
            LoopState::Scanning,
            None,
            OutreachError::Timeout {
                operation: "list_candidates",
                timeout: Duration::from_secs(120),
            },
        );
        assert_eq!(
            failure.to_string(),
            "run failed while scanning: list_candidates timed out after 120s"
        );
    }
}
