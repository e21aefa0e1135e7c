//! Karma counter.
//!
//! Counts live in the session table `karma`, keyed by the lowercased name.

use regex::Regex;
use serde::{Deserialize, Serialize};

use glados_core::SharedSession;
use glados_core::prelude::*;

use crate::compile;

const TABLE: &str = "karma";

const HELP_TEXT: &str = "A plugin for tracking karma.
Usage:
NAME++
NAME--
karma NAME";

/// Stored karma of one name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KarmaItem {
    pub plus: u64,
    pub minus: u64,
}

impl KarmaItem {
    /// Net karma.
    pub fn total(&self) -> i64 {
        self.plus as i64 - self.minus as i64
    }
}

enum Command {
    Report(String),
    Add(String),
    Take(String),
}

/// `NAME++`, `NAME--` and `karma NAME`.
pub struct Karmator {
    name: String,
    outbox: Outbox,
    session: SharedSession,
    karma_re: Regex,
    add_re: Regex,
    take_re: Regex,
}

impl Karmator {
    pub fn new(ctx: PluginContext) -> PluginResult<Self> {
        Ok(Self {
            name: ctx.name,
            outbox: ctx.outbox,
            session: ctx.session,
            karma_re: compile(r"(?i)^karma ([A-Za-z_]+)")?,
            add_re: compile(r"([A-Za-z_]+)\+\+")?,
            take_re: compile(r"([A-Za-z_]+)--")?,
        })
    }

    /// One command per message; a report wins over `++`, `++` over `--`.
    fn command(&self, text: &str) -> Option<Command> {
        let capture = |re: &Regex| re.captures(text).map(|c| c[1].to_lowercase());
        capture(&self.karma_re)
            .map(Command::Report)
            .or_else(|| capture(&self.add_re).map(Command::Add))
            .or_else(|| capture(&self.take_re).map(Command::Take))
    }

    fn item(&self, name: &str) -> PluginResult<KarmaItem> {
        Ok(self.session.lock().get(TABLE, name)?.unwrap_or_default())
    }

    fn update(&self, name: &str, f: impl FnOnce(&mut KarmaItem)) -> PluginResult<()> {
        let mut item = self.item(name)?;
        f(&mut item);
        self.session.lock().put(TABLE, name, &item)?;
        Ok(())
    }
}

#[async_trait]
impl Plugin for Karmator {
    fn name(&self) -> &str {
        &self.name
    }

    fn help_text(&self) -> &str {
        HELP_TEXT
    }

    fn can_handle(&self, msg: &InboundMessage) -> bool {
        msg.is_chat() && self.command(msg.text()).is_some()
    }

    async fn handle(&mut self, msg: &InboundMessage) -> PluginResult<()> {
        match self.command(msg.text()) {
            Some(Command::Report(name)) => {
                let Some(channel) = msg.channel.as_deref() else {
                    return Ok(());
                };
                let item = self.item(&name)?;
                let reply = format!(
                    "{name}: {} [{}++, {}--]",
                    item.total(),
                    item.plus,
                    item.minus
                );
                self.outbox.reply(reply, channel).await?;
            }
            Some(Command::Add(name)) => self.update(&name, |item| item.plus += 1)?,
            Some(Command::Take(name)) => self.update(&name, |item| item.minus += 1)?,
            None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, memory};

    fn say(text: &str) -> InboundMessage {
        InboundMessage::message("U1", "C1", text)
    }

    #[tokio::test]
    async fn test_counts_and_reports() {
        let session = memory();
        let (ctx, recorder) = context("Karmator", session.clone());
        let mut karma = Karmator::new(ctx).unwrap();

        for text in ["Rust++", "rust++ is great", "rust--", "borrowck--"] {
            assert!(karma.can_handle(&say(text)), "{text}");
            karma.handle(&say(text)).await.unwrap();
        }
        karma.handle(&say("karma RUST")).await.unwrap();
        karma.handle(&say("karma nobody")).await.unwrap();

        assert_eq!(
            *recorder.posts.lock(),
            [
                ("rust: 1 [2++, 1--]".to_string(), "C1".to_string()),
                ("nobody: 0 [0++, 0--]".to_string(), "C1".to_string()),
            ]
        );
        let stored: Option<KarmaItem> = session.lock().get(TABLE, "borrowck").unwrap();
        assert_eq!(stored, Some(KarmaItem { plus: 0, minus: 1 }));
    }

    #[test]
    fn test_ignores_plain_chatter() {
        let (ctx, _) = context("Karmator", memory());
        let karma = Karmator::new(ctx).unwrap();

        assert!(!karma.can_handle(&say("good morning")));
        assert!(!karma.can_handle(&say("what is my karma")));
    }
}
