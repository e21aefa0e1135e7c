//! Collaborators handed to plugins.
//!
//! Every plugin factory receives a [`PluginContext`]. The context bundles the
//! [`Outbox`] (replies and reactions), the read-only [`Directories`], the
//! shared [`Session`](crate::Session) and the debug flag.
//!
//! The outbox is a thin layer over a [`Messenger`], the narrow outbound
//! contract of the messaging service. The real implementation lives in
//! `glados-transport`; tests substitute a recording fake.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::directory::Directories;
use crate::error::{TransportError, TransportResult};
use crate::event::InboundMessage;
use crate::session::SharedSession;
use crate::transcript::SharedTranscript;

// =============================================================================
// Outbound messages
// =============================================================================

/// A rich attachment.
///
/// Only `fallback` is interpreted locally (it is appended to transcript
/// lines); every other field is forwarded untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    /// Plain-text summary of the attachment.
    pub fallback: String,
    /// Remaining service-specific fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Attachment {
    /// Creates an attachment with only a fallback text.
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            fallback: fallback.into(),
            fields: Map::new(),
        }
    }

    /// Adds a service-specific field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// A message to post.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    /// Destination channel id.
    pub channel: String,
    /// Message text.
    pub text: String,
    /// Optional rich attachments.
    pub attachments: Option<Vec<Attachment>>,
    /// Turn `@name` and `#channel` into links.
    pub link_names: bool,
    /// Unfurl links; `None` leaves the service default.
    pub unfurl_links: Option<bool>,
    /// Post as the bot user rather than as an app.
    pub as_user: bool,
}

impl OutboundMessage {
    /// A plain text message with mention linking enabled.
    pub fn new(text: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            text: text.into(),
            attachments: None,
            link_names: true,
            unfurl_links: None,
            as_user: true,
        }
    }

    /// Attaches rich attachments.
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = Some(attachments);
        self
    }

    /// Sets mention linking.
    pub fn link_names(mut self, enabled: bool) -> Self {
        self.link_names = enabled;
        self
    }

    /// Sets link unfurling.
    pub fn unfurl_links(mut self, enabled: bool) -> Self {
        self.unfurl_links = Some(enabled);
        self
    }

    /// Text written to the transcript for this message.
    pub fn transcript_text(&self) -> String {
        match self.attachments.as_deref().and_then(<[Attachment]>::first) {
            Some(first) => format!("{}|{}", self.text, first.fallback),
            None => self.text.clone(),
        }
    }
}

// =============================================================================
// Messenger
// =============================================================================

/// Outbound side of the messaging service.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Posts a message.
    async fn post_message(&self, message: &OutboundMessage) -> TransportResult<()>;

    /// Attaches a reaction to the message identified by `channel` + `timestamp`.
    async fn add_reaction(
        &self,
        channel: &str,
        timestamp: &str,
        reaction: &str,
    ) -> TransportResult<()>;
}

// =============================================================================
// Outbox
// =============================================================================

/// Reply and reaction functions shared by all plugins.
///
/// Every posted message is also appended to the channel transcript under the
/// bot's display name.
#[derive(Clone)]
pub struct Outbox {
    messenger: Arc<dyn Messenger>,
    transcript: SharedTranscript,
    directories: Arc<Directories>,
}

impl Outbox {
    /// Creates an outbox.
    pub fn new(
        messenger: Arc<dyn Messenger>,
        transcript: SharedTranscript,
        directories: Arc<Directories>,
    ) -> Self {
        Self {
            messenger,
            transcript,
            directories,
        }
    }

    /// Posts a fully specified message.
    pub async fn send(&self, message: OutboundMessage) -> TransportResult<()> {
        let speaker = self
            .directories
            .user_name(self.directories.self_id())
            .unwrap_or_else(|| self.directories.self_id())
            .to_string();
        // Logged before posting, so a failed post still shows in the transcript.
        self.transcript
            .lock()
            .record(&message.channel, &speaker, &message.transcript_text());

        debug!(channel = %message.channel, len = message.text.len(), "Posting message");
        self.messenger.post_message(&message).await
    }

    /// Posts plain text to a channel.
    pub async fn reply(&self, text: impl Into<String>, channel: &str) -> TransportResult<()> {
        self.send(OutboundMessage::new(text, channel)).await
    }

    /// Posts plain text to the general channel (the debug channel in debug mode).
    pub async fn post_general(&self, text: impl Into<String>) -> TransportResult<()> {
        let channel = self
            .directories
            .general_channel()
            .ok_or_else(|| TransportError::SendFailed("no general channel known".to_string()))?
            .to_string();
        self.reply(text, &channel).await
    }

    /// Attaches a reaction to an inbound message.
    pub async fn react(&self, msg: &InboundMessage, reaction: &str) -> TransportResult<()> {
        let (Some(channel), Some(ts)) = (msg.channel.as_deref(), msg.ts.as_deref()) else {
            return Err(TransportError::Protocol(
                "cannot react to a message without channel and timestamp".to_string(),
            ));
        };
        self.messenger.add_reaction(channel, ts, reaction).await
    }
}

// =============================================================================
// PluginContext
// =============================================================================

/// Everything a plugin factory receives.
#[derive(Clone)]
pub struct PluginContext {
    /// Registered class name of the plugin being constructed.
    pub name: String,
    /// Reply and reaction functions.
    pub outbox: Outbox,
    /// Read-only user and channel directories.
    pub directories: Arc<Directories>,
    /// Persistent session.
    pub session: SharedSession,
    /// Whether the gateway runs in debug mode.
    pub debug: bool,
}

impl PluginContext {
    /// Returns a copy of the context carrying another plugin name.
    pub fn for_plugin(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_text_includes_first_fallback() {
        let msg = OutboundMessage::new("price", "C1")
            .with_attachments(vec![Attachment::new("Black Lotus"), Attachment::new("x")]);
        assert_eq!(msg.transcript_text(), "price|Black Lotus");
        assert_eq!(OutboundMessage::new("hi", "C1").transcript_text(), "hi");
    }

    #[test]
    fn test_attachment_serializes_flat() {
        let att = Attachment::new("fb").with_field("image_url", "http://x/y.png");
        let value = serde_json::to_value(&att).unwrap();
        assert_eq!(value["fallback"], "fb");
        assert_eq!(value["image_url"], "http://x/y.png");
    }

    #[test]
    fn test_defaults() {
        let msg = OutboundMessage::new("hi", "C1");
        assert!(msg.link_names);
        assert!(msg.as_user);
        assert_eq!(msg.unfurl_links, None);
        assert_eq!(msg.clone().unfurl_links(false).unfurl_links, Some(false));
    }

    struct Unreachable;

    #[async_trait]
    impl Messenger for Unreachable {
        async fn post_message(&self, _: &OutboundMessage) -> TransportResult<()> {
            Err(TransportError::SendFailed("service unreachable".into()))
        }

        async fn add_reaction(&self, _: &str, _: &str, _: &str) -> TransportResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_send_records_transcript_before_posting() {
        use crate::directory::{ChannelInfo, UserInfo};
        use crate::transcript::Transcript;

        let dir = tempfile::tempdir().unwrap();
        let users = [UserInfo {
            id: "USELF".into(),
            name: "glados".into(),
            is_bot: true,
        }];
        let channels = [ChannelInfo {
            id: "C1".into(),
            name: "general".into(),
            is_archived: false,
            is_general: true,
        }];
        let directories = Arc::new(Directories::build(
            "USELF",
            &users,
            &channels,
            "aperture-science",
            false,
        ));
        let date = chrono::Local::now().date_naive();
        let transcript = Transcript::open(dir.path(), &directories, date).shared();
        let outbox = Outbox::new(Arc::new(Unreachable), transcript.clone(), directories);

        assert!(outbox.reply("hello", "C1").await.is_err());
        transcript.lock().close();

        let path = dir
            .path()
            .join("general")
            .join(format!("{}.log", date.format("%Y-%m-%d")));
        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.trim_end().ends_with("] glados: hello"));
    }
}
