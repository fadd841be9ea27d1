use async_trait::async_trait;

use meridian_core::types::{DetectedTrigger, NormalizedEvent, OutboundMessage, ResolvedContext};

/// A detector inspects one event and returns zero or more triggers.
///
/// Errors are strings on purpose: a failing detector is skipped and its
/// error recorded on the pipeline result, never raised across the pipeline
/// boundary.
#[async_trait]
pub trait TriggerDetector: Send + Sync {
    fn name(&self) -> &'static str;

    async fn detect(&self, event: &NormalizedEvent) -> Result<Vec<DetectedTrigger>, String>;
}

/// An action handler turns one trigger plus the resolved context into
/// outbound messages (possibly none).
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(
        &self,
        trigger: &DetectedTrigger,
        context: &ResolvedContext,
    ) -> Result<Vec<OutboundMessage>, String>;
}
