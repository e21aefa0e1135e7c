//! Event model for the gateway.
//!
//! Every unit of work entering the router is an [`Event`]. Drivers construct
//! events and push them onto the shared queue created by [`event_queue`];
//! from that point the router owns them exclusively.
//!
//! Inbound wire frames are decoded into [`InboundMessage`], which keeps the
//! handful of fields the router's filters look at plus the raw JSON for
//! plugins that need anything else.

use serde::de;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

// ============================================================================
// Event
// ============================================================================

/// A discrete unit of work for the router.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Periodic tick from the timer driver.
    Timer,
    /// A frame received from the messaging service.
    Inbound(InboundMessage),
    /// The connection to the messaging service went away.
    ConnectionClosed {
        /// WebSocket close code (1006 when the stream ended without one).
        code: u16,
        /// Close reason, if the remote side sent one.
        reason: Option<String>,
    },
    /// A payload injected through the local control socket.
    Injection {
        /// Declared name of the target injection plugin.
        plugin: String,
        /// Opaque payload forwarded verbatim.
        payload: String,
    },
}

impl Event {
    /// Short name used in logs and tracing spans.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Timer => "timer",
            Self::Inbound(_) => "inbound",
            Self::ConnectionClosed { .. } => "connection_closed",
            Self::Injection { .. } => "injection",
        }
    }
}

/// Producer half of the router queue. Sending never blocks.
pub type EventSender = mpsc::UnboundedSender<Event>;

/// Consumer half of the router queue.
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Creates the ordered multi-producer, single-consumer router queue.
pub fn event_queue() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

// ============================================================================
// InboundMessage
// ============================================================================

/// A string field of a frame object. Services reuse some keys for objects
/// (`user_change` carries a `user` object), so non-strings read as absent.
fn string_field(frame: &Map<String, Value>, key: &str) -> Option<String> {
    frame.get(key).and_then(Value::as_str).map(str::to_string)
}

fn present(frame: &Map<String, Value>, key: &str) -> bool {
    frame.get(key).is_some_and(|v| !v.is_null())
}

/// A decoded inbound frame.
///
/// Frames are JSON objects with at least a `type` field. Transport
/// acknowledgements (`{"ok": true, "reply_to": ..}`) carry no `type`, which
/// is why [`kind`](Self::kind) is optional.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Frame `type` (`"message"`, `"hello"`, `"presence_change"`, ...).
    pub kind: Option<String>,
    /// Origin channel id.
    pub channel: Option<String>,
    /// Origin user id.
    pub user: Option<String>,
    /// Message text.
    pub text: Option<String>,
    /// Set for edited/deleted/bot messages (`subtype` or nested `message`).
    pub subtype: bool,
    /// Message timestamp, used as the message id for reactions.
    pub ts: Option<String>,
    /// Set when the frame contains an `ok` field (a transport acknowledgement).
    pub ack: bool,
    /// The full frame.
    pub raw: Value,
}

impl InboundMessage {
    /// Decodes a frame from its JSON text.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Decodes a frame from an already parsed JSON value.
    ///
    /// Fails only when the value is not a JSON object.
    pub fn from_value(raw: Value) -> serde_json::Result<Self> {
        let Some(frame) = raw.as_object() else {
            return Err(de::Error::custom("frame is not a JSON object"));
        };
        Ok(Self {
            kind: string_field(frame, "type"),
            channel: string_field(frame, "channel"),
            user: string_field(frame, "user"),
            text: string_field(frame, "text"),
            subtype: present(frame, "subtype") || present(frame, "message"),
            ts: string_field(frame, "ts"),
            ack: present(frame, "ok"),
            raw,
        })
    }

    /// Convenience constructor for a plain user message.
    pub fn message(user: &str, channel: &str, text: &str) -> Self {
        let raw = serde_json::json!({
            "type": "message",
            "user": user,
            "channel": channel,
            "text": text,
        });
        Self {
            kind: Some("message".to_string()),
            channel: Some(channel.to_string()),
            user: Some(user.to_string()),
            text: Some(text.to_string()),
            subtype: false,
            ts: None,
            ack: false,
            raw,
        }
    }

    /// Whether this is a `message`-typed frame.
    pub fn is_message(&self) -> bool {
        self.kind.as_deref() == Some("message")
    }

    /// Whether this is a top-level user message with text, the only kind
    /// most plugins care about.
    pub fn is_chat(&self) -> bool {
        self.is_message() && !self.subtype && self.text.is_some()
    }

    /// The message text, or `""` when absent.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_message() {
        let msg = InboundMessage::from_json(
            r#"{"type":"message","user":"U1","channel":"C1","text":"ping","ts":"1.2"}"#,
        )
        .unwrap();
        assert!(msg.is_chat());
        assert_eq!(msg.user.as_deref(), Some("U1"));
        assert_eq!(msg.channel.as_deref(), Some("C1"));
        assert_eq!(msg.text(), "ping");
        assert_eq!(msg.ts.as_deref(), Some("1.2"));
        assert!(!msg.ack);
    }

    #[test]
    fn test_decode_edited_message_is_subtype() {
        let msg = InboundMessage::from_json(
            r#"{"type":"message","channel":"C1","subtype":"message_changed","message":{"text":"x"}}"#,
        )
        .unwrap();
        assert!(msg.subtype);
        assert!(msg.text.is_none());
        assert!(!msg.is_chat());
    }

    #[test]
    fn test_decode_ack_frame() {
        let msg = InboundMessage::from_json(r#"{"ok":true,"reply_to":1,"text":"hi"}"#).unwrap();
        assert!(msg.ack);
        assert!(msg.kind.is_none());
        assert!(!msg.is_message());
    }

    #[test]
    fn test_decode_frames_with_object_fields() {
        let change = InboundMessage::from_json(
            r#"{"type":"user_change","user":{"id":"U1","name":"chell"}}"#,
        )
        .unwrap();
        assert_eq!(change.kind.as_deref(), Some("user_change"));
        assert!(change.user.is_none());
        assert_eq!(change.raw["user"]["name"], "chell");

        let created = InboundMessage::from_json(
            r#"{"type":"channel_created","channel":{"id":"C9","name":"test-chamber"}}"#,
        )
        .unwrap();
        assert!(created.channel.is_none());
        assert!(!created.is_chat());
        assert_eq!(created.raw["channel"]["id"], "C9");
    }

    #[test]
    fn test_decode_null_fields_are_absent() {
        let msg = InboundMessage::from_json(
            r#"{"type":"message","user":"U1","channel":"C1","text":"hi","subtype":null,"ok":null}"#,
        )
        .unwrap();
        assert!(!msg.subtype);
        assert!(!msg.ack);
        assert!(msg.is_chat());
    }

    #[test]
    fn test_decode_rejects_non_object() {
        assert!(InboundMessage::from_json("[1, 2, 3]").is_err());
        assert!(InboundMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_event_names() {
        assert_eq!(Event::Timer.name(), "timer");
        let closed = Event::ConnectionClosed {
            code: 1006,
            reason: None,
        };
        assert_eq!(closed.name(), "connection_closed");
    }

    #[tokio::test]
    async fn test_queue_preserves_order() {
        let (tx, mut rx) = event_queue();
        tx.send(Event::Timer).unwrap();
        tx.send(Event::Inbound(InboundMessage::message("U1", "C1", "a")))
            .unwrap();
        tx.send(Event::Timer).unwrap();
        drop(tx);

        let mut names = Vec::new();
        while let Some(ev) = rx.recv().await {
            names.push(ev.name());
        }
        assert_eq!(names, ["timer", "inbound", "timer"]);
    }
}
