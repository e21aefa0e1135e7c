//! Web API client: bootstrap handshake and outbound calls.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use glados_core::{
    ChannelInfo, Messenger, OutboundMessage, TransportError, TransportResult, UserInfo,
};

/// Default Web API root.
pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

const RTM_START: &str = "rtm.start";
const POST_MESSAGE: &str = "chat.postMessage";
const ADD_REACTION: &str = "reactions.add";

// =============================================================================
// Bootstrap
// =============================================================================

/// The bot's own identity.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SelfInfo {
    /// Bot user id.
    pub id: String,
    /// Bot display name.
    #[serde(default)]
    pub name: String,
}

/// Result of the bootstrap handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct Bootstrap {
    /// WebSocket endpoint for the real-time event stream.
    pub url: String,
    /// The bot's own identity.
    #[serde(rename = "self")]
    pub self_info: SelfInfo,
    /// Known users.
    #[serde(default)]
    pub users: Vec<UserInfo>,
    /// Known channels, archived ones included.
    #[serde(default)]
    pub channels: Vec<ChannelInfo>,
}

/// Turns an `{"ok": false, "error": ..}` envelope into an error.
fn check_ok(method: &str, body: &Value) -> TransportResult<()> {
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(());
    }
    let error = body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown_error")
        .to_string();
    Err(TransportError::Api {
        method: method.to_string(),
        error,
    })
}

/// Builds the JSON body for `chat.postMessage`.
fn post_message_body(message: &OutboundMessage) -> Value {
    let mut body = json!({
        "channel": message.channel,
        "text": message.text,
        "as_user": message.as_user,
        "link_names": message.link_names,
    });
    if let Some(attachments) = &message.attachments {
        body["attachments"] = json!(attachments);
    }
    if let Some(unfurl) = message.unfurl_links {
        body["unfurl_links"] = json!(unfurl);
    }
    body
}

// =============================================================================
// SlackApi
// =============================================================================

/// Token-authenticated Web API client.
#[derive(Debug, Clone)]
pub struct SlackApi {
    client: Client,
    base: String,
    token: String,
}

impl SlackApi {
    /// Creates a client for `base` (e.g. [`DEFAULT_API_BASE`]).
    pub fn new(
        base: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> TransportResult<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base, method)
    }

    /// Performs the bootstrap handshake.
    pub async fn bootstrap(&self) -> TransportResult<Bootstrap> {
        let url = self.method_url(RTM_START);
        info!(url = %url, "Starting real-time session");

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| TransportError::ConnectionFailed {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        check_ok(RTM_START, &body)?;

        let bootstrap: Bootstrap = serde_json::from_value(body)?;
        info!(
            self_id = %bootstrap.self_info.id,
            users = bootstrap.users.len(),
            channels = bootstrap.channels.len(),
            "Bootstrap complete"
        );
        Ok(bootstrap)
    }

    async fn call(&self, method: &str, body: &Value) -> TransportResult<()> {
        let resp = self
            .client
            .post(self.method_url(method))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!(
                "HTTP {} error: {}",
                status.as_u16(),
                text
            )));
        }

        let reply: Value = resp
            .json()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        debug!(method, response = %reply, "API call finished");
        check_ok(method, &reply)
    }
}

#[async_trait]
impl Messenger for SlackApi {
    async fn post_message(&self, message: &OutboundMessage) -> TransportResult<()> {
        let result = self.call(POST_MESSAGE, &post_message_body(message)).await;
        if let Err(e) = &result {
            warn!(channel = %message.channel, error = %e, "Failed to post message");
        }
        result
    }

    async fn add_reaction(
        &self,
        channel: &str,
        timestamp: &str,
        reaction: &str,
    ) -> TransportResult<()> {
        let body = json!({
            "channel": channel,
            "timestamp": timestamp,
            "name": reaction,
        });
        self.call(ADD_REACTION, &body).await
    }
}
