//! Reaction responder.

use regex::Regex;

use glados_core::prelude::*;

use crate::compile;

const REACTIONS: [(&str, &str); 2] = [
    (r"(?i)\bay+(\b|lmao)", "ayylmao"),
    (r"(?i)\btrigger(\b|ed)|\bPTSD", "triggergif"),
];

/// Reacts to a few phrases with custom emoji.
pub struct AyyLmao {
    name: String,
    outbox: Outbox,
    reactions: Vec<(Regex, &'static str)>,
}

impl AyyLmao {
    pub fn new(ctx: PluginContext) -> PluginResult<Self> {
        let reactions = REACTIONS
            .iter()
            .map(|(pattern, reaction)| Ok((compile(pattern)?, *reaction)))
            .collect::<PluginResult<_>>()?;
        Ok(Self {
            name: ctx.name,
            outbox: ctx.outbox,
            reactions,
        })
    }

    fn matching(&self, text: &str) -> impl Iterator<Item = &'static str> {
        self.reactions
            .iter()
            .filter(move |(re, _)| re.is_match(text))
            .map(|(_, reaction)| *reaction)
    }
}

#[async_trait]
impl Plugin for AyyLmao {
    fn name(&self) -> &str {
        &self.name
    }

    fn help_text(&self) -> &str {
        ":ayylmao:"
    }

    fn consumes(&self) -> bool {
        true
    }

    fn can_handle(&self, msg: &InboundMessage) -> bool {
        msg.is_chat() && self.matching(msg.text()).next().is_some()
    }

    async fn handle(&mut self, msg: &InboundMessage) -> PluginResult<()> {
        let reactions: Vec<_> = self.matching(msg.text()).collect();
        for reaction in reactions {
            self.outbox.react(msg, reaction).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, memory};

    fn frame(text: &str) -> InboundMessage {
        let mut msg = InboundMessage::message("U1", "C1", text);
        msg.ts = Some("1700000000.000100".into());
        msg
    }

    #[tokio::test]
    async fn test_reacts_to_every_matching_phrase() {
        let (ctx, recorder) = context("AyyLmao", memory());
        let mut plugin = AyyLmao::new(ctx).unwrap();

        let msg = frame("ayyy that got me triggered");
        assert!(plugin.can_handle(&msg));
        plugin.handle(&msg).await.unwrap();

        assert_eq!(*recorder.reactions.lock(), ["ayylmao", "triggergif"]);
    }

    #[test]
    fn test_word_boundaries() {
        let (ctx, _) = context("AyyLmao", memory());
        let plugin = AyyLmao::new(ctx).unwrap();

        assert!(plugin.can_handle(&frame("ayylmao")));
        assert!(plugin.can_handle(&frame("ptsd flashbacks")));
        assert!(!plugin.can_handle(&frame("okay then")));
        assert!(!plugin.can_handle(&frame("retrigger")));
    }
}
