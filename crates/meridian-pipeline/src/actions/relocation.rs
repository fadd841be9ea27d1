use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use meridian_core::types::{DetectedTrigger, OutboundMessage, ResolvedContext};
use meridian_identity::TimezoneIdentity;

use crate::traits::ActionHandler;

/// Handles relocation triggers by invalidating the user's timezone
/// confidence. Returns no messages — the pipeline raises
/// `needs_state_collection` and the orchestrator opens the follow-up session.
pub struct RelocationHandler {
    identity: Arc<TimezoneIdentity>,
}

impl RelocationHandler {
    pub fn new(identity: Arc<TimezoneIdentity>) -> Self {
        Self { identity }
    }
}

#[async_trait]
impl ActionHandler for RelocationHandler {
    async fn handle(
        &self,
        trigger: &DetectedTrigger,
        context: &ResolvedContext,
    ) -> Result<Vec<OutboundMessage>, String> {
        debug!(
            user_id = %context.user_id,
            city = trigger.data["city"].as_str().unwrap_or(""),
            "relocation detected; resetting confidence"
        );
        self.identity
            .reset_confidence(context.platform, &context.user_id)
            .map_err(|e| e.to_string())?;
        Ok(Vec::new())
    }
}
