use async_trait::async_trait;

use meridian_core::types::{DetectedTrigger, OutboundMessage, ResolvedContext};
use meridian_sessions::ui;

use crate::traits::ActionHandler;

/// Replies to `@bot` / "help" mentions with a short usage blurb.
pub struct MentionHandler;

#[async_trait]
impl ActionHandler for MentionHandler {
    async fn handle(
        &self,
        _trigger: &DetectedTrigger,
        context: &ResolvedContext,
    ) -> Result<Vec<OutboundMessage>, String> {
        Ok(vec![OutboundMessage::plain(
            context.platform,
            &context.chat_id,
            ui::help_blurb(),
        )])
    }
}
