//! The plugin contract.
//!
//! Three capability sets, one per manifest category:
//!
//! | Category | Trait | Driven by |
//! |----------|-------|-----------|
//! | `immediate` | [`Plugin`] | inbound messages |
//! | `timed` | [`TimedPlugin`] | inbound messages and the cron interval |
//! | `injection` | [`InjectionPlugin`] | control-socket payloads |
//!
//! All hooks run on the router task, one at a time, with exclusive access
//! to the plugin (`&mut self`), so plugin state needs no locking.
//!
//! # Example
//!
//! ```rust,ignore
//! use glados_core::prelude::*;
//!
//! struct Echo { ctx: PluginContext }
//!
//! #[async_trait]
//! impl Plugin for Echo {
//!     fn name(&self) -> &str { &self.ctx.name }
//!     fn help_text(&self) -> &str { "Say ping, get pong." }
//!     fn consumes(&self) -> bool { true }
//!
//!     fn can_handle(&self, msg: &InboundMessage) -> bool {
//!         msg.is_chat() && msg.text() == "ping"
//!     }
//!
//!     async fn handle(&mut self, msg: &InboundMessage) -> PluginResult<()> {
//!         let channel = msg.channel.as_deref().unwrap_or_default();
//!         self.ctx.outbox.reply("pong", channel).await?;
//!         Ok(())
//!     }
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PluginError, PluginResult};
use crate::event::InboundMessage;

/// Declared category of a plugin in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginCategory {
    /// Handles inbound messages.
    #[serde(alias = "normal")]
    Immediate,
    /// Handles inbound messages and runs on a cron interval.
    Timed,
    /// Receives payloads injected through the control socket.
    #[serde(alias = "async")]
    Injection,
}

impl fmt::Display for PluginCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Immediate => "immediate",
            Self::Timed => "timed",
            Self::Injection => "injection",
        })
    }
}

impl FromStr for PluginCategory {
    type Err = PluginError;

    /// Case-insensitive; accepts the `normal` and `async` aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" | "normal" => Ok(Self::Immediate),
            "timed" => Ok(Self::Timed),
            "injection" | "async" => Ok(Self::Injection),
            other => Err(PluginError::InvalidContract(format!(
                "unknown plugin category {other:?}"
            ))),
        }
    }
}

/// A message handler.
#[async_trait]
pub trait Plugin: Send {
    /// Friendly name, used by the built-in help.
    fn name(&self) -> &str;

    /// Help text shown by `glados help <name>`. Must not be empty.
    fn help_text(&self) -> &str;

    /// When `true`, no later plugin sees a message this plugin handled.
    ///
    /// This is a static declaration; it holds even if [`handle`](Self::handle)
    /// fails.
    fn consumes(&self) -> bool {
        false
    }

    /// Called once before the router starts dispatching.
    async fn setup(&mut self) -> PluginResult<()> {
        Ok(())
    }

    /// Called once during shutdown. The session is committed afterwards.
    async fn teardown(&mut self) {}

    /// Pure predicate: should [`handle`](Self::handle) run for this message?
    fn can_handle(&self, msg: &InboundMessage) -> bool;

    /// Performs the plugin's side effects for a message.
    async fn handle(&mut self, msg: &InboundMessage) -> PluginResult<()>;
}

/// A message handler that is also run on a schedule.
#[async_trait]
pub trait TimedPlugin: Plugin {
    /// Five-field cron expression, e.g. `"*/5 * * * *"`.
    fn interval(&self) -> &str;

    /// Runs whenever the interval comes due.
    async fn run_timed_event(&mut self) -> PluginResult<()>;
}

/// A handler fed directly from the local control socket.
#[async_trait]
pub trait InjectionPlugin: Send {
    /// Name used to address the plugin from the control socket.
    fn name(&self) -> &str;

    /// Help text shown by `glados help <name>`. Must not be empty.
    fn help_text(&self) -> &str;

    /// Called once before the router starts dispatching.
    async fn setup(&mut self) -> PluginResult<()> {
        Ok(())
    }

    /// Called once during shutdown.
    async fn teardown(&mut self) {}

    /// Handles an injected payload.
    async fn handle_injection(&mut self, payload: &str) -> PluginResult<()>;
}
