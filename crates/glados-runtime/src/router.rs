//! Event Router: the single consumer of the event queue.
//!
//! The router owns every plugin and processes one [`Event`] at a time, in
//! arrival order:
//!
//! - [`Event::Timer`]: each timed plugin whose cron interval is due runs
//!   `run_timed_event`, in registration order.
//! - [`Event::ConnectionClosed`]: processing stops and shutdown begins.
//! - [`Event::Inbound`]: the message is written to the channel transcript,
//!   run through the filters below and offered to each plugin in
//!   registration order.
//! - [`Event::Injection`]: the payload goes straight to the named injection
//!   plugin, bypassing filters.
//!
//! # Inbound filters
//!
//! Applied in order, stopping at the first match:
//!
//! 1. malformed: a `message` frame without text (or any subtype frame
//!    without text) is dropped;
//! 2. channel isolation: in debug mode only the debug channel is processed,
//!    in production mode the debug channel is ignored; frames without a
//!    channel pass;
//! 3. bot sender: frames from known bots, the gateway itself included, are
//!    dropped;
//! 4. help: `<bot> help` and `<bot> help <plugin>` are answered from plugin
//!    metadata and never reach the plugins;
//! 5. acknowledgements: frames carrying an `ok` field are dropped.
//!
//! # Dispatch
//!
//! For each plugin, `can_handle` decides; a match runs `handle`, and routing
//! stops after it when the plugin's static `consumes` flag is set, whether or
//! not `handle` succeeded. Errors and panics from plugin hooks are logged
//! and never leave the router.

use std::future::Future;
use std::ops::ControlFlow;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use chrono::{DateTime, Local};
use futures::FutureExt;
use tracing::{Instrument, debug, debug_span, error, info, trace, warn};

use glados_core::{
    Directories, Event, EventReceiver, InboundMessage, Outbox, PluginContext, PluginError,
    PluginResult, SharedSession, SharedTranscript,
};

use crate::registry::{ActivePlugin, PluginManager};

/// Router lifecycle.
///
/// ```text
/// Starting ──► Running ──► Closing ──► Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    /// Plugins are being loaded and set up.
    Starting,
    /// Events are being dequeued.
    Running,
    /// Teardown, commit and driver shutdown in progress.
    Closing,
    /// Everything has stopped.
    Stopped,
}

/// Why the router stopped dequeuing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The messaging service closed the connection.
    ConnectionClosed { code: u16, reason: Option<String> },
    /// An external termination signal arrived.
    Signal,
    /// Every producer went away.
    QueueClosed,
}

/// Router behavior switches.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Restrict processing to the debug channel.
    pub debug: bool,
    /// First word of the help trigger.
    pub bot_name: String,
    /// Commit the session after every successfully handled message.
    pub commit_after_handle: bool,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            debug: false,
            bot_name: "glados".to_string(),
            commit_after_handle: false,
        }
    }
}

/// Outcome of the inbound filters.
#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Dispatch,
    Malformed,
    OtherChannel,
    FromBot,
    Help(HelpRequest),
    Ack,
}

#[derive(Debug, PartialEq, Eq)]
enum HelpRequest {
    List,
    Plugin(String),
}

/// Reply when `<bot> help <name>` names no admitted plugin.
pub fn unknown_plugin_reply(name: &str) -> String {
    format!("I don't have a plugin called \"{name}\".")
}

/// The dispatch core.
pub struct EventRouter {
    plugins: PluginManager,
    outbox: Outbox,
    directories: Arc<Directories>,
    session: SharedSession,
    transcript: SharedTranscript,
    settings: RouterSettings,
    help_trigger: String,
    state: RouterState,
}

impl EventRouter {
    /// Creates a router over an already loaded plugin set.
    pub fn new(
        plugins: PluginManager,
        ctx: &PluginContext,
        transcript: SharedTranscript,
        settings: RouterSettings,
    ) -> Self {
        let help_trigger = format!("{} help", settings.bot_name.trim().to_ascii_lowercase());
        Self {
            plugins,
            outbox: ctx.outbox.clone(),
            directories: ctx.directories.clone(),
            session: ctx.session.clone(),
            transcript,
            settings,
            help_trigger,
            state: RouterState::Starting,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RouterState {
        self.state
    }

    /// The admitted plugins.
    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    /// Runs plugin setup and enters `Running`.
    pub async fn start(&mut self) {
        self.plugins.setup_all().await;
        self.state = RouterState::Running;
        info!(plugins = self.plugins.len(), "Router running");
    }

    /// Dequeues and processes events until the connection closes, `shutdown`
    /// resolves, or every producer is gone. An event already being processed
    /// is always finished first.
    pub async fn run<S>(&mut self, events: &mut EventReceiver, shutdown: S) -> ShutdownReason
    where
        S: Future<Output = ()>,
    {
        if self.state == RouterState::Starting {
            self.start().await;
        }
        tokio::pin!(shutdown);

        let reason = loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break ShutdownReason::Signal,
                event = events.recv() => match event {
                    Some(event) => {
                        if let ControlFlow::Break(reason) = self.process(event).await {
                            break reason;
                        }
                    }
                    None => break ShutdownReason::QueueClosed,
                },
            }
        };

        self.state = RouterState::Closing;
        info!(reason = ?reason, "Router stopped dequeuing");
        reason
    }

    /// Processes one event.
    pub async fn process(&mut self, event: Event) -> ControlFlow<ShutdownReason> {
        let span = debug_span!("event", event_name = event.name());
        async move {
            match event {
                Event::Timer => self.on_timer(Local::now()).await,
                Event::ConnectionClosed { code, reason } => {
                    warn!(code, reason = ?reason, "Connection closed, shutting down");
                    return ControlFlow::Break(ShutdownReason::ConnectionClosed { code, reason });
                }
                Event::Inbound(msg) => self.on_inbound(&msg).await,
                Event::Injection { plugin, payload } => self.on_injection(&plugin, &payload).await,
            }
            ControlFlow::Continue(())
        }
        .instrument(span)
        .await
    }

    /// Runs every timed plugin that is due at `now`.
    pub async fn on_timer(&mut self, now: DateTime<Local>) {
        for active in self.plugins.iter_mut() {
            let ActivePlugin::Timed { plugin, schedule } = active else {
                continue;
            };
            if !schedule.poll(now) {
                continue;
            }
            debug!(plugin = %plugin.name(), interval = %schedule.interval(), "Running timed event");
            let result = catch_async(plugin.run_timed_event()).await;
            if let Err(e) = result {
                error!(plugin = %plugin.name(), error = %e, "Timed event failed");
            }
        }
    }

    async fn on_inbound(&mut self, msg: &InboundMessage) {
        self.record_inbound(msg);

        match self.filter(msg) {
            Verdict::Dispatch => self.dispatch(msg).await,
            Verdict::Help(request) => self.answer_help(msg, request).await,
            verdict => trace!(verdict = ?verdict, "Inbound frame filtered"),
        }
    }

    async fn on_injection(&mut self, name: &str, payload: &str) {
        let Some(plugin) = self.plugins.injection_mut(name) else {
            warn!(plugin = %name, "No injection plugin with that name");
            return;
        };
        debug!(plugin = %name, len = payload.len(), "Forwarding injection");
        if let Err(e) = catch_async(plugin.handle_injection(payload)).await {
            error!(plugin = %name, error = %e, "Injection handler failed");
        }
    }

    // ─── Filters ────────────────────────────────────────────────────────────

    fn filter(&self, msg: &InboundMessage) -> Verdict {
        if (msg.is_message() || msg.subtype) && msg.text.is_none() {
            return Verdict::Malformed;
        }

        if let Some(channel) = msg.channel.as_deref() {
            let debug_channel = self.directories.debug_channel();
            let in_debug_channel = debug_channel == Some(channel);
            if self.settings.debug != in_debug_channel {
                return Verdict::OtherChannel;
            }
        }

        if msg.user.as_deref().is_some_and(|u| self.directories.is_bot(u)) {
            return Verdict::FromBot;
        }

        if let Some(request) = self.help_request(msg) {
            return Verdict::Help(request);
        }

        if msg.ack {
            return Verdict::Ack;
        }

        Verdict::Dispatch
    }

    fn help_request(&self, msg: &InboundMessage) -> Option<HelpRequest> {
        if !msg.is_chat() {
            return None;
        }
        let text = msg.text().trim();
        let lowered = text.to_ascii_lowercase();
        if lowered == self.help_trigger {
            return Some(HelpRequest::List);
        }
        let rest = lowered.strip_prefix(&self.help_trigger)?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        // ASCII lowercasing keeps byte offsets, so slice the original spelling.
        let name = text[text.len() - rest.len()..].trim();
        Some(HelpRequest::Plugin(name.to_string()))
    }

    async fn answer_help(&self, msg: &InboundMessage, request: HelpRequest) {
        let Some(channel) = msg.channel.as_deref() else {
            return;
        };
        let reply = match request {
            HelpRequest::List => {
                let names: Vec<&str> = self.plugins.names().collect();
                if names.is_empty() {
                    "I don't have any plugins loaded.".to_string()
                } else {
                    format!(
                        "I have these plugins: {}\nSay \"{} <plugin>\" to learn more about one.",
                        names.join(", "),
                        self.help_trigger
                    )
                }
            }
            HelpRequest::Plugin(name) => match self.plugins.find(&name) {
                Some(plugin) => plugin.help_text().to_string(),
                None => unknown_plugin_reply(&name),
            },
        };
        if let Err(e) = self.outbox.reply(reply, channel).await {
            error!(channel = %channel, error = %e, "Failed to send help");
        }
    }

    // ─── Dispatch ───────────────────────────────────────────────────────────

    async fn dispatch(&mut self, msg: &InboundMessage) {
        let mut handled = false;

        for plugin in self.plugins.iter_mut() {
            if !plugin.handles_messages() {
                continue;
            }

            let wants = match catch_unwind(AssertUnwindSafe(|| plugin.can_handle(msg))) {
                Ok(wants) => wants,
                Err(payload) => {
                    error!(
                        plugin = %plugin.name(),
                        error = %PluginError::from_panic(payload),
                        "can_handle panicked, skipping plugin"
                    );
                    false
                }
            };
            if !wants {
                continue;
            }

            trace!(plugin = %plugin.name(), "Plugin handling message");
            match catch_async(plugin.handle(msg)).await {
                Ok(()) => handled = true,
                Err(e) => error!(
                    plugin = %plugin.name(),
                    channel = ?msg.channel,
                    user = ?msg.user,
                    error = %e,
                    "Plugin failed to handle message"
                ),
            }

            if plugin.consumes() {
                trace!(plugin = %plugin.name(), "Message consumed");
                break;
            }
        }

        if handled && self.settings.commit_after_handle {
            self.commit_session();
        }
    }

    fn record_inbound(&self, msg: &InboundMessage) {
        if !msg.is_chat() {
            return;
        }
        let Some(channel) = msg.channel.as_deref() else {
            return;
        };
        let user = msg.user.as_deref().unwrap_or("unknown");
        let speaker = self.directories.user_name(user).unwrap_or(user);
        self.transcript.lock().record(channel, speaker, msg.text());
    }

    fn commit_session(&self) {
        if let Err(e) = self.session.lock().commit() {
            error!(error = %e, "Failed to commit session");
        }
    }

    // ─── Shutdown ───────────────────────────────────────────────────────────

    /// Tears down every plugin, commits the session and closes the
    /// transcripts. Only the first call has an effect.
    pub async fn close(&mut self) {
        if self.state == RouterState::Stopped {
            return;
        }
        self.state = RouterState::Closing;
        self.plugins.teardown_all().await;
        self.commit_session();
        self.transcript.lock().close();
        self.state = RouterState::Stopped;
        info!("Router closed");
    }
}

/// Awaits a plugin future, turning a panic into an error.
async fn catch_async<F>(fut: F) -> PluginResult<()>
where
    F: Future<Output = PluginResult<()>>,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(PluginError::from_panic(payload)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use glados_core::{
        ChannelInfo, Messenger, OutboundMessage, Session, Transcript, TransportResult, UserInfo,
    };

    struct NullMessenger;

    #[async_trait]
    impl Messenger for NullMessenger {
        async fn post_message(&self, _message: &OutboundMessage) -> TransportResult<()> {
            Ok(())
        }

        async fn add_reaction(&self, _: &str, _: &str, _: &str) -> TransportResult<()> {
            Ok(())
        }
    }

    fn router(debug: bool) -> EventRouter {
        let users = [
            UserInfo {
                id: "U1".into(),
                name: "chell".into(),
                is_bot: false,
            },
            UserInfo {
                id: "B1".into(),
                name: "wheatley".into(),
                is_bot: true,
            },
        ];
        let channels = [
            ChannelInfo {
                id: "C1".into(),
                name: "general".into(),
                is_archived: false,
                is_general: true,
            },
            ChannelInfo {
                id: "CD".into(),
                name: "aperture-science".into(),
                is_archived: false,
                is_general: false,
            },
        ];
        let directories = Arc::new(Directories::build(
            "USELF",
            &users,
            &channels,
            "aperture-science",
            debug,
        ));
        let transcript = Transcript::disabled().shared();
        let ctx = PluginContext {
            name: String::new(),
            outbox: Outbox::new(Arc::new(NullMessenger), transcript.clone(), directories.clone()),
            directories,
            session: Session::in_memory().shared(),
            debug,
        };
        EventRouter::new(
            PluginManager::from_plugins(Vec::new()),
            &ctx,
            transcript,
            RouterSettings {
                debug,
                ..Default::default()
            },
        )
    }

    fn frame(json: &str) -> InboundMessage {
        InboundMessage::from_json(json).unwrap()
    }

    #[test]
    fn test_filter_order() {
        let prod = router(false);

        assert_eq!(
            prod.filter(&frame(r#"{"type":"message","channel":"C1","user":"U1"}"#)),
            Verdict::Malformed
        );
        assert_eq!(
            prod.filter(&InboundMessage::message("U1", "CD", "hi")),
            Verdict::OtherChannel
        );
        assert_eq!(
            prod.filter(&InboundMessage::message("B1", "C1", "glados help")),
            Verdict::FromBot
        );
        assert_eq!(
            prod.filter(&InboundMessage::message("USELF", "C1", "hi")),
            Verdict::FromBot
        );
        assert_eq!(
            prod.filter(&InboundMessage::message("U1", "C1", "  GLaDOS Help ")),
            Verdict::Help(HelpRequest::List)
        );
        assert_eq!(
            prod.filter(&frame(r#"{"ok":true,"reply_to":1,"ts":"1.0","text":"x"}"#)),
            Verdict::Ack
        );
        assert_eq!(
            prod.filter(&InboundMessage::message("U1", "C1", "hello")),
            Verdict::Dispatch
        );
        // Frames without a channel bypass isolation.
        assert_eq!(
            prod.filter(&frame(r#"{"type":"presence_change","user":"U1"}"#)),
            Verdict::Dispatch
        );
    }

    #[test]
    fn test_debug_mode_isolation() {
        let debug = router(true);
        assert_eq!(
            debug.filter(&InboundMessage::message("U1", "C1", "hi")),
            Verdict::OtherChannel
        );
        assert_eq!(
            debug.filter(&InboundMessage::message("U1", "CD", "hi")),
            Verdict::Dispatch
        );
    }

    #[test]
    fn test_help_request_parsing() {
        let r = router(false);
        let req = |text: &str| r.help_request(&InboundMessage::message("U1", "C1", text));

        assert_eq!(req("glados help"), Some(HelpRequest::List));
        assert_eq!(
            req("glados help Karmator"),
            Some(HelpRequest::Plugin("Karmator".into()))
        );
        assert_eq!(
            req("GLADOS HELP  remindme "),
            Some(HelpRequest::Plugin("remindme".into()))
        );
        assert_eq!(req("glados helpful"), None);
        assert_eq!(req("please glados help"), None);
    }

    #[test]
    fn test_unknown_plugin_reply() {
        assert_eq!(
            unknown_plugin_reply("Nope"),
            "I don't have a plugin called \"Nope\"."
        );
    }

    #[tokio::test]
    async fn test_connection_closed_breaks() {
        let mut r = router(false);
        let flow = r
            .process(Event::ConnectionClosed {
                code: 1006,
                reason: None,
            })
            .await;
        assert_eq!(
            flow,
            ControlFlow::Break(ShutdownReason::ConnectionClosed {
                code: 1006,
                reason: None
            })
        );
        assert_eq!(r.process(Event::Timer).await, ControlFlow::Continue(()));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut r = router(false);
        r.start().await;
        assert_eq!(r.state(), RouterState::Running);
        r.close().await;
        r.close().await;
        assert_eq!(r.state(), RouterState::Stopped);
    }
}
