//! Weekly professional-development reminder.
//!
//! Meant to be driven from the system cron:
//!
//! ```text
//! 0 10 * * 1  glados inject --plugin PDReminder --no-data
//! ```

use glados_core::prelude::*;

/// Posted to the general channel on every injection.
pub const PD_REMINDER: &str = "@channel: *Don't forget to do PD this week!*";

pub struct PDReminder {
    name: String,
    outbox: Outbox,
}

impl PDReminder {
    pub fn new(ctx: PluginContext) -> Self {
        Self {
            name: ctx.name,
            outbox: ctx.outbox,
        }
    }
}

#[async_trait]
impl InjectionPlugin for PDReminder {
    fn name(&self) -> &str {
        &self.name
    }

    fn help_text(&self) -> &str {
        "Reminds you to do PD."
    }

    async fn handle_injection(&mut self, _payload: &str) -> PluginResult<()> {
        self.outbox.post_general(PD_REMINDER).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, memory};

    #[tokio::test]
    async fn test_posts_to_general() {
        let (ctx, recorder) = context("PDReminder", memory());
        let mut plugin = PDReminder::new(ctx);

        plugin.handle_injection("").await.unwrap();

        assert_eq!(
            *recorder.posts.lock(),
            [(PD_REMINDER.to_string(), "C1".to_string())]
        );
    }
}
