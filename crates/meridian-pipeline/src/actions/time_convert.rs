use async_trait::async_trait;

use meridian_core::types::{DetectedTrigger, OutboundMessage, ParseMode, ResolvedContext};
use meridian_parse::format_time_conversion;

use crate::traits::ActionHandler;

/// Converts a detected time into every target timezone and formats the reply.
pub struct TimeConversionHandler;

#[async_trait]
impl ActionHandler for TimeConversionHandler {
    async fn handle(
        &self,
        trigger: &DetectedTrigger,
        context: &ResolvedContext,
    ) -> Result<Vec<OutboundMessage>, String> {
        let hour = trigger.data["hour"].as_u64().unwrap_or(0) as u8;
        let minute = trigger.data["minute"].as_u64().unwrap_or(0) as u8;
        let is_tomorrow = trigger.data["is_tomorrow"].as_bool().unwrap_or(false);

        // Trigger-level source beats the context-resolved one.
        let source_tz = trigger.data["source_tz"]
            .as_str()
            .map(String::from)
            .or_else(|| context.source_timezone.clone());

        let Some(source_tz) = source_tz else {
            return Ok(Vec::new());
        };
        if context.target_timezones.is_empty() {
            return Ok(Vec::new());
        }

        let text = format_time_conversion(
            hour,
            minute,
            &source_tz,
            &context.target_timezones,
            is_tomorrow,
            &context.team_timezones,
            None,
            "",
        );
        if text.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![OutboundMessage {
            platform: context.platform,
            chat_id: context.chat_id.clone(),
            text,
            reply_to_message_id: context.reply_to_message_id.clone(),
            parse_mode: ParseMode::Plain,
        }])
    }
}
