//! Liveness check.

use regex::Regex;

use glados_core::prelude::*;

use crate::compile;

/// Answers "glados, are you alive?" and friends.
pub struct IAmAlive {
    name: String,
    outbox: Outbox,
    alive_re: Regex,
}

impl IAmAlive {
    pub fn new(ctx: PluginContext) -> PluginResult<Self> {
        Ok(Self {
            name: ctx.name,
            outbox: ctx.outbox,
            alive_re: compile(r"(?i)^glados.*alive")?,
        })
    }
}

#[async_trait]
impl Plugin for IAmAlive {
    fn name(&self) -> &str {
        &self.name
    }

    fn help_text(&self) -> &str {
        "Ask \"glados, are you alive?\" to check on me."
    }

    fn consumes(&self) -> bool {
        true
    }

    fn can_handle(&self, msg: &InboundMessage) -> bool {
        msg.is_chat() && self.alive_re.is_match(msg.text())
    }

    async fn handle(&mut self, msg: &InboundMessage) -> PluginResult<()> {
        let Some(channel) = msg.channel.as_deref() else {
            return Ok(());
        };
        self.outbox.reply("I am still alive", channel).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, memory};

    #[tokio::test]
    async fn test_answers_alive_questions() {
        let (ctx, recorder) = context("IAmAlive", memory());
        let mut plugin = IAmAlive::new(ctx).unwrap();

        let msg = InboundMessage::message("U1", "C1", "GLaDOS, are you still alive?");
        assert!(plugin.can_handle(&msg));
        plugin.handle(&msg).await.unwrap();

        assert_eq!(
            *recorder.posts.lock(),
            [("I am still alive".to_string(), "C1".to_string())]
        );
    }

    #[test]
    fn test_ignores_other_messages() {
        let (ctx, _) = context("IAmAlive", memory());
        let plugin = IAmAlive::new(ctx).unwrap();

        assert!(!plugin.can_handle(&InboundMessage::message("U1", "C1", "is glados alive")));
        assert!(!plugin.can_handle(&InboundMessage::message("U1", "C1", "glados help")));
    }
}
