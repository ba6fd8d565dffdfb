use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use driver_client::{ActionReport, DriverClient, DriverError, SessionHandle};
use outreach_common::{ActionType, Candidate, ObservedActivity};

use crate::traits::{ActionOutcome, Actuator, ActuatorSession};

/// Actuator backed by the browser-driver sidecar and one anti-detect profile.
pub struct DriverActuator {
    client: Arc<DriverClient>,
    profile_id: String,
}

impl DriverActuator {
    pub fn new(client: DriverClient, profile_id: impl Into<String>) -> Self {
        Self {
            client: Arc::new(client),
            profile_id: profile_id.into(),
        }
    }
}

#[async_trait]
impl Actuator for DriverActuator {
    async fn start_session(&self) -> Result<Box<dyn ActuatorSession>> {
        let handle = self.client.start_session(&self.profile_id).await?;
        info!(session_id = %handle.session_id, "Browser session started");
        Ok(Box::new(DriverSession {
            client: self.client.clone(),
            handle,
        }))
    }
}

struct DriverSession {
    client: Arc<DriverClient>,
    handle: SessionHandle,
}

/// Map a driver reply onto the loop's failure classes. A rejection means the
/// page lacked the control; anything else means the session is unusable.
fn classify(report: Result<ActionReport, DriverError>) -> ActionOutcome {
    match report {
        Ok(ActionReport::Done) => ActionOutcome::Ok,
        Ok(ActionReport::Rejected { reason }) => ActionOutcome::SoftFail(reason),
        Err(e) => ActionOutcome::HardFail(e.to_string()),
    }
}

#[async_trait]
impl ActuatorSession for DriverSession {
    async fn list_candidates(
        &mut self,
        action: ActionType,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>> {
        Ok(self
            .client
            .list_candidates(&self.handle, action, query, limit)
            .await?)
    }

    async fn perform_action(
        &mut self,
        action: ActionType,
        candidate: &Candidate,
        content: &str,
    ) -> ActionOutcome {
        let report = self
            .client
            .perform_action(&self.handle, action, candidate, content)
            .await;
        if let Err(ref e) = report {
            warn!(candidate_id = %candidate.id, error = %e, "Driver action failed");
        }
        classify(report)
    }

    async fn recent_activity(&mut self, limit: usize) -> Result<Vec<ObservedActivity>> {
        Ok(self.client.recent_activity(&self.handle, limit).await?)
    }

    async fn close(&mut self) -> Result<()> {
        self.client.close_session(&self.handle).await?;
        info!(session_id = %self.handle.session_id, "Browser session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_is_soft_and_transport_errors_are_hard() {
        assert_eq!(classify(Ok(ActionReport::Done)), ActionOutcome::Ok);
        assert_eq!(
            classify(Ok(ActionReport::Rejected {
                reason: "comment box not found".into()
            })),
            ActionOutcome::SoftFail("comment box not found".into())
        );
        assert!(matches!(
            classify(Err(DriverError::Api {
                status: 500,
                message: "target closed".into()
            })),
            ActionOutcome::HardFail(_)
        ));
    }
}
