//! # GLaDOS Core
//!
//! Building blocks shared by every layer of the gateway.
//!
//! ## Foundation
//!
//! - **Events**: the single tagged [`Event`] type flowing through the router
//!   queue, and the decoded [`InboundMessage`] wire frame.
//! - **Directories**: read-only id → name lookups built from the bootstrap
//!   handshake ([`Directories`]).
//! - **Errors**: [`PluginError`], [`TransportError`], [`ScheduleError`],
//!   [`SessionError`].
//!
//! ## Plugin contract
//!
//! - [`Plugin`]: message handlers (predicate + handler + lifecycle hooks).
//! - [`TimedPlugin`]: message handlers that are also driven by a cron
//!   interval.
//! - [`InjectionPlugin`]: handlers fed directly from the control socket.
//! - [`PluginContext`]: the collaborator set handed to every plugin factory
//!   ([`Outbox`], [`Directories`], [`SharedSession`], debug flag).
//!
//! ## Data flow
//!
//! ```text
//! ┌──────────────┐
//! │  Connection  │──┐
//! └──────────────┘  │   ┌────────────┐     ┌─────────┐
//!                   ├──▶│ EventQueue │────▶│ Router  │──▶ plugins
//! ┌──────────────┐  │   └────────────┘     └─────────┘
//! │    Timer     │──┘
//! └──────────────┘
//! ```

pub mod context;
pub mod directory;
pub mod error;
pub mod event;
pub mod plugin;
pub mod schedule;
pub mod session;
pub mod transcript;

pub use context::{Attachment, Messenger, OutboundMessage, Outbox, PluginContext};
pub use directory::{ChannelInfo, Directories, UserInfo};
pub use error::{
    PluginError, PluginResult, ScheduleError, ScheduleResult, SessionError, SessionResult,
    TransportError, TransportResult,
};
pub use event::{Event, EventReceiver, EventSender, InboundMessage, event_queue};
pub use plugin::{InjectionPlugin, Plugin, PluginCategory, TimedPlugin};
pub use schedule::{CronInterval, TimedSchedule, truncate_to_minute};
pub use session::{Session, SharedSession};
pub use transcript::{SharedTranscript, Transcript};

/// Prelude for plugin authors.
pub mod prelude {
    pub use super::context::{Attachment, OutboundMessage, Outbox, PluginContext};
    pub use super::error::{PluginError, PluginResult};
    pub use super::event::InboundMessage;
    pub use super::plugin::{InjectionPlugin, Plugin, TimedPlugin};
    pub use async_trait::async_trait;
}
