use tracing::{error, info};

use meridian_core::types::{OutboundMessage, Platform};

use crate::slack::SlackSender;
use crate::telegram::TelegramSender;
use crate::whatsapp::WhatsAppSender;

/// Routes outbound messages to the sender for their platform.
///
/// A platform without a configured sender drops its messages with an error
/// log; one failed send never blocks the rest of the batch.
pub struct OutboundDispatcher {
    telegram: Option<TelegramSender>,
    slack: Option<SlackSender>,
    whatsapp: Option<WhatsAppSender>,
}

impl OutboundDispatcher {
    pub fn new(
        telegram: Option<TelegramSender>,
        slack: Option<SlackSender>,
        whatsapp: Option<WhatsAppSender>,
    ) -> Self {
        Self {
            telegram,
            slack,
            whatsapp,
        }
    }

    /// Send every message; returns how many succeeded.
    pub async fn send_all(&self, messages: &[OutboundMessage]) -> usize {
        let mut sent = 0;
        for message in messages {
            let ok = match message.platform {
                Platform::Telegram => match &self.telegram {
                    Some(sender) => sender.send(message).await,
                    None => {
                        error!("telegram sender not configured; dropping message");
                        false
                    }
                },
                Platform::Slack => match &self.slack {
                    Some(sender) => sender.send(message).await,
                    None => {
                        error!("slack sender not configured; dropping message");
                        false
                    }
                },
                Platform::Whatsapp => match &self.whatsapp {
                    Some(sender) => sender.send(message).await,
                    None => {
                        error!("whatsapp sender not configured; dropping message");
                        false
                    }
                },
                Platform::Discord => {
                    // Discord outbound is not wired; the inbound route is a
                    // stub as well.
                    error!("discord outbound is not supported; dropping message");
                    false
                }
            };
            if ok {
                sent += 1;
            }
        }
        if sent < messages.len() {
            info!(
                sent,
                total = messages.len(),
                "outbound fan-out finished with failures"
            );
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_platforms_drop_without_panicking() {
        let dispatcher = OutboundDispatcher::new(None, None, None);
        let messages = vec![
            OutboundMessage::plain(Platform::Telegram, "c1", "hi"),
            OutboundMessage::plain(Platform::Discord, "c2", "hi"),
        ];
        assert_eq!(dispatcher.send_all(&messages).await, 0);
    }

    #[tokio::test]
    async fn empty_batch_sends_nothing() {
        let dispatcher = OutboundDispatcher::new(None, None, None);
        assert_eq!(dispatcher.send_all(&[]).await, 0);
    }
}
