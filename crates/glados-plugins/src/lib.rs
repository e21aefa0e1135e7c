//! # GLaDOS Plugins
//!
//! The skills shipped with the `glados` binary:
//!
//! | Class        | Category  | Behavior |
//! |--------------|-----------|----------|
//! | `IAmAlive`   | immediate | answers `glados ... alive` |
//! | `Karmator`   | immediate | `name++`, `name--`, `karma name` |
//! | `AyyLmao`    | immediate | reacts to a few phrases |
//! | `RemindMe`   | timed     | `glados remind me in 5 minutes ...` |
//! | `PDReminder` | injection | weekly reminder, triggered from cron via `glados inject` |
//!
//! Call [`register_builtin`] to make them available to the manifest.

pub mod alive;
pub mod karma;
pub mod lmao;
pub mod pd_reminder;
pub mod remind;

pub use alive::IAmAlive;
pub use karma::Karmator;
pub use lmao::AyyLmao;
pub use pd_reminder::PDReminder;
pub use remind::RemindMe;

use glados_core::{PluginError, PluginResult};
use glados_runtime::PluginRegistry;
use regex::Regex;

/// Registers every built-in plugin class under its class name.
pub fn register_builtin(registry: &mut PluginRegistry) -> &mut PluginRegistry {
    registry
        .register_immediate("IAmAlive", |ctx| Ok(Box::new(IAmAlive::new(ctx)?)))
        .register_immediate("Karmator", |ctx| Ok(Box::new(Karmator::new(ctx)?)))
        .register_immediate("AyyLmao", |ctx| Ok(Box::new(AyyLmao::new(ctx)?)))
        .register_timed("RemindMe", |ctx| Ok(Box::new(RemindMe::new(ctx)?)))
        .register_injection("PDReminder", |ctx| Ok(Box::new(PDReminder::new(ctx))))
}

/// Compiles a plugin pattern; a bad pattern fails plugin construction.
pub(crate) fn compile(pattern: &str) -> PluginResult<Regex> {
    Regex::new(pattern).map_err(|e| PluginError::InvalidContract(e.to_string()))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use glados_core::{
        ChannelInfo, Directories, Messenger, OutboundMessage, Outbox, PluginContext, Session,
        SharedSession, Transcript, TransportResult, UserInfo,
    };

    /// Records every outbound call.
    #[derive(Default)]
    pub struct Recorder {
        pub posts: Mutex<Vec<(String, String)>>,
        pub reactions: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Messenger for Recorder {
        async fn post_message(&self, message: &OutboundMessage) -> TransportResult<()> {
            self.posts
                .lock()
                .push((message.text.clone(), message.channel.clone()));
            Ok(())
        }

        async fn add_reaction(&self, _: &str, _: &str, reaction: &str) -> TransportResult<()> {
            self.reactions.lock().push(reaction.to_string());
            Ok(())
        }
    }

    pub fn context(name: &str, session: SharedSession) -> (PluginContext, Arc<Recorder>) {
        let users = [UserInfo {
            id: "U1".into(),
            name: "chell".into(),
            is_bot: false,
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
        let recorder = Arc::new(Recorder::default());
        let ctx = PluginContext {
            name: name.to_string(),
            outbox: Outbox::new(
                recorder.clone(),
                Transcript::disabled().shared(),
                directories.clone(),
            ),
            directories,
            session,
            debug: false,
        };
        (ctx, recorder)
    }

    pub fn memory() -> SharedSession {
        Session::in_memory().shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glados_runtime::Manifest;
    use glados_runtime::PluginManager;

    #[test]
    fn test_builtin_manifest_admits_everything() {
        let mut registry = PluginRegistry::new();
        register_builtin(&mut registry);
        assert_eq!(registry.len(), 5);

        let manifest = Manifest::parse(
            r#"{
                "alive": {"plugin_class": "IAmAlive", "plugin_type": "normal"},
                "karma": {"plugin_class": "Karmator", "plugin_type": "normal"},
                "lmao": {"plugin_class": "AyyLmao", "plugin_type": "normal"},
                "remind": {"plugin_class": "RemindMe", "plugin_type": "timed"},
                "pd": {"plugin_class": "PDReminder", "plugin_type": "async"}
            }"#,
        )
        .unwrap();
        let (ctx, _) = testing::context("", testing::memory());
        let plugins = PluginManager::load(&manifest, &registry, &ctx, chrono::Local::now());

        let names: Vec<_> = plugins.names().collect();
        assert_eq!(names, ["IAmAlive", "Karmator", "AyyLmao", "RemindMe", "PDReminder"]);
    }
}
