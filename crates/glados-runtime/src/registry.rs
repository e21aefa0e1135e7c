//! Static plugin registry and plugin lifecycle management.
//!
//! [`PluginRegistry`] maps a class name to a factory. It is filled at
//! compile time by the binary (see `glados_plugins::register_builtin`) and
//! consulted once at startup.
//!
//! [`PluginManager`] owns the admitted plugins. It:
//!
//! - Walks the [`Manifest`] in order and instantiates every entry through the
//!   registry with its own [`PluginContext`].
//! - Validates each instance before admitting it: the declared category must
//!   match the factory, help text must be non-empty, a timed plugin's
//!   interval must be a valid five-field cron expression, and names must be
//!   unique. A failure drops that one plugin and is logged.
//! - Drives `setup` (registration order, before the router runs) and
//!   `teardown` (exactly once, at shutdown).
//!
//! The admitted list never changes after [`setup_all`](PluginManager::setup_all).
//!
//! ```text
//! Manifest entry ──► registry lookup ──► factory(ctx) ──► validate ──► Admitted
//!     setup_all()   ──► Active   (setup succeeded)
//!                   ──► dropped  (setup failed or panicked)
//!     teardown_all() ──► Stopped
//! ```

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use chrono::{DateTime, Local};
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use glados_core::{
    CronInterval, InboundMessage, InjectionPlugin, Plugin, PluginCategory, PluginContext,
    PluginError, PluginResult, TimedPlugin, TimedSchedule,
};

use crate::error::{RegistryError, RegistryResult};
use crate::manifest::{Manifest, ManifestEntry};

// =============================================================================
// Factories
// =============================================================================

type ImmediateFactory = Box<dyn Fn(PluginContext) -> PluginResult<Box<dyn Plugin>> + Send + Sync>;
type TimedFactory = Box<dyn Fn(PluginContext) -> PluginResult<Box<dyn TimedPlugin>> + Send + Sync>;
type InjectionFactory =
    Box<dyn Fn(PluginContext) -> PluginResult<Box<dyn InjectionPlugin>> + Send + Sync>;

/// Constructor for one plugin class, tagged with its category.
pub enum PluginFactory {
    Immediate(ImmediateFactory),
    Timed(TimedFactory),
    Injection(InjectionFactory),
}

impl PluginFactory {
    /// Category the factory produces.
    pub fn category(&self) -> PluginCategory {
        match self {
            Self::Immediate(_) => PluginCategory::Immediate,
            Self::Timed(_) => PluginCategory::Timed,
            Self::Injection(_) => PluginCategory::Injection,
        }
    }
}

/// Class name → factory.
#[derive(Default)]
pub struct PluginRegistry {
    factories: HashMap<String, PluginFactory>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, class: &str, factory: PluginFactory) -> &mut Self {
        if self.factories.insert(class.to_string(), factory).is_some() {
            warn!(class = %class, "Duplicate plugin factory, last registration wins");
        }
        self
    }

    /// Registers an immediate plugin class.
    pub fn register_immediate<F>(&mut self, class: &str, factory: F) -> &mut Self
    where
        F: Fn(PluginContext) -> PluginResult<Box<dyn Plugin>> + Send + Sync + 'static,
    {
        self.insert(class, PluginFactory::Immediate(Box::new(factory)))
    }

    /// Registers a timed plugin class.
    pub fn register_timed<F>(&mut self, class: &str, factory: F) -> &mut Self
    where
        F: Fn(PluginContext) -> PluginResult<Box<dyn TimedPlugin>> + Send + Sync + 'static,
    {
        self.insert(class, PluginFactory::Timed(Box::new(factory)))
    }

    /// Registers an injection plugin class.
    pub fn register_injection<F>(&mut self, class: &str, factory: F) -> &mut Self
    where
        F: Fn(PluginContext) -> PluginResult<Box<dyn InjectionPlugin>> + Send + Sync + 'static,
    {
        self.insert(class, PluginFactory::Injection(Box::new(factory)))
    }

    /// Category of a registered class.
    pub fn category(&self, class: &str) -> Option<PluginCategory> {
        self.factories.get(class).map(PluginFactory::category)
    }

    /// Number of registered classes.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether no class is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Builds and validates the plugin named by `entry`.
    ///
    /// `base` seeds the `last_run` time of timed plugins.
    pub fn instantiate(
        &self,
        entry: &ManifestEntry,
        ctx: &PluginContext,
        base: DateTime<Local>,
    ) -> RegistryResult<ActivePlugin> {
        let class = entry.plugin_class.as_str();
        let declared: PluginCategory =
            entry
                .plugin_type
                .parse()
                .map_err(|_| RegistryError::UnknownCategory {
                    class: class.to_string(),
                    category: entry.plugin_type.clone(),
                })?;

        let factory = self
            .factories
            .get(class)
            .ok_or_else(|| RegistryError::UnknownClass(class.to_string()))?;

        if factory.category() != declared {
            return Err(RegistryError::CategoryMismatch {
                class: class.to_string(),
                registered: factory.category(),
                declared,
            });
        }

        let ctx = ctx.for_plugin(class);
        let construction = |source| RegistryError::Construction {
            class: class.to_string(),
            source,
        };

        let plugin = match factory {
            PluginFactory::Immediate(f) => {
                ActivePlugin::Immediate(guarded(|| f(ctx)).map_err(construction)?)
            }
            PluginFactory::Timed(f) => {
                let plugin = guarded(|| f(ctx)).map_err(construction)?;
                let expr = guarded(|| Ok(plugin.interval().to_string())).map_err(construction)?;
                let interval = CronInterval::parse(&expr).map_err(|source| {
                    RegistryError::InvalidInterval {
                        class: class.to_string(),
                        source,
                    }
                })?;
                ActivePlugin::Timed {
                    plugin,
                    schedule: TimedSchedule::new(interval, base),
                }
            }
            PluginFactory::Injection(f) => {
                ActivePlugin::Injection(guarded(|| f(ctx)).map_err(construction)?)
            }
        };

        let help_missing =
            guarded(|| Ok(plugin.help_text().trim().is_empty())).map_err(construction)?;
        if help_missing {
            return Err(RegistryError::MissingHelp(class.to_string()));
        }

        Ok(plugin)
    }
}

/// Runs synchronous plugin code, turning a panic into an error.
fn guarded<T>(f: impl FnOnce() -> PluginResult<T>) -> PluginResult<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(PluginError::from_panic(payload)))
}

// =============================================================================
// ActivePlugin
// =============================================================================

/// An admitted plugin.
pub enum ActivePlugin {
    /// Message handler.
    Immediate(Box<dyn Plugin>),
    /// Message handler with a schedule.
    Timed {
        plugin: Box<dyn TimedPlugin>,
        schedule: TimedSchedule,
    },
    /// Control-socket handler.
    Injection(Box<dyn InjectionPlugin>),
}

impl ActivePlugin {
    /// Declared name.
    pub fn name(&self) -> &str {
        match self {
            Self::Immediate(p) => p.name(),
            Self::Timed { plugin, .. } => plugin.name(),
            Self::Injection(p) => p.name(),
        }
    }

    /// Help text.
    pub fn help_text(&self) -> &str {
        match self {
            Self::Immediate(p) => p.help_text(),
            Self::Timed { plugin, .. } => plugin.help_text(),
            Self::Injection(p) => p.help_text(),
        }
    }

    /// Category.
    pub fn category(&self) -> PluginCategory {
        match self {
            Self::Immediate(_) => PluginCategory::Immediate,
            Self::Timed { .. } => PluginCategory::Timed,
            Self::Injection(_) => PluginCategory::Injection,
        }
    }

    /// Whether the plugin takes part in message dispatch.
    pub fn handles_messages(&self) -> bool {
        !matches!(self, Self::Injection(_))
    }

    /// Static consume flag. Injection plugins never consume messages.
    pub fn consumes(&self) -> bool {
        match self {
            Self::Immediate(p) => p.consumes(),
            Self::Timed { plugin, .. } => plugin.consumes(),
            Self::Injection(_) => false,
        }
    }

    /// Dispatch predicate. Injection plugins never handle messages.
    pub fn can_handle(&self, msg: &InboundMessage) -> bool {
        match self {
            Self::Immediate(p) => p.can_handle(msg),
            Self::Timed { plugin, .. } => plugin.can_handle(msg),
            Self::Injection(_) => false,
        }
    }

    /// Message handler.
    pub async fn handle(&mut self, msg: &InboundMessage) -> PluginResult<()> {
        match self {
            Self::Immediate(p) => p.handle(msg).await,
            Self::Timed { plugin, .. } => plugin.handle(msg).await,
            Self::Injection(_) => Ok(()),
        }
    }

    async fn setup(&mut self) -> PluginResult<()> {
        match self {
            Self::Immediate(p) => p.setup().await,
            Self::Timed { plugin, .. } => plugin.setup().await,
            Self::Injection(p) => p.setup().await,
        }
    }

    async fn teardown(&mut self) {
        match self {
            Self::Immediate(p) => p.teardown().await,
            Self::Timed { plugin, .. } => plugin.teardown().await,
            Self::Injection(p) => p.teardown().await,
        }
    }
}

// =============================================================================
// PluginManager
// =============================================================================

/// Lifecycle state of the admitted plugin set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginLoadState {
    /// Constructed and validated; `setup` not yet run.
    Admitted,
    /// `setup` ran; plugins receive events.
    Active,
    /// `teardown` ran.
    Stopped,
}

/// Owner of the admitted plugins, in registration order.
pub struct PluginManager {
    plugins: Vec<ActivePlugin>,
    state: PluginLoadState,
}

impl PluginManager {
    /// Instantiates every manifest entry, skipping the ones that fail.
    pub fn load(
        manifest: &Manifest,
        registry: &PluginRegistry,
        ctx: &PluginContext,
        base: DateTime<Local>,
    ) -> Self {
        let mut plugins: Vec<ActivePlugin> = Vec::with_capacity(manifest.len());

        for entry in manifest.entries() {
            let admitted = registry.instantiate(entry, ctx, base).and_then(|plugin| {
                let duplicate = plugins
                    .iter()
                    .any(|p| p.name().eq_ignore_ascii_case(plugin.name()));
                if duplicate {
                    Err(RegistryError::DuplicateName(plugin.name().to_string()))
                } else {
                    Ok(plugin)
                }
            });

            match admitted {
                Ok(plugin) => {
                    info!(
                        module = %entry.module,
                        plugin = %plugin.name(),
                        category = %plugin.category(),
                        "Plugin admitted"
                    );
                    plugins.push(plugin);
                }
                Err(e) => {
                    error!(module = %entry.module, class = %entry.plugin_class, error = %e, "Problem loading plugin");
                }
            }
        }

        info!(
            admitted = plugins.len(),
            configured = manifest.len(),
            "Plugin loading finished"
        );
        Self::from_plugins(plugins)
    }

    /// Wraps an already admitted set.
    pub fn from_plugins(plugins: Vec<ActivePlugin>) -> Self {
        Self {
            plugins,
            state: PluginLoadState::Admitted,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PluginLoadState {
        self.state
    }

    /// Number of admitted plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether no plugin is admitted.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Declared names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.iter().map(ActivePlugin::name)
    }

    /// Finds a plugin by name, ignoring case.
    pub fn find(&self, name: &str) -> Option<&ActivePlugin> {
        self.plugins.iter().find(|p| p.name().eq_ignore_ascii_case(name))
    }

    /// Finds an injection plugin by its exact declared name.
    pub fn injection_mut(&mut self, name: &str) -> Option<&mut Box<dyn InjectionPlugin>> {
        self.plugins.iter_mut().find_map(|p| match p {
            ActivePlugin::Injection(plugin) if plugin.name() == name => Some(plugin),
            _ => None,
        })
    }

    /// All plugins, in registration order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ActivePlugin> {
        self.plugins.iter_mut()
    }

    /// Runs `setup` on every plugin in registration order. A plugin whose
    /// setup fails or panics is dropped without teardown.
    pub async fn setup_all(&mut self) {
        if self.state != PluginLoadState::Admitted {
            warn!(state = ?self.state, "setup_all called twice, ignoring");
            return;
        }

        let admitted = std::mem::take(&mut self.plugins);
        for mut plugin in admitted {
            let result = AssertUnwindSafe(plugin.setup())
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(PluginError::from_panic(payload)));
            match result {
                Ok(()) => {
                    debug!(plugin = %plugin.name(), "Plugin set up");
                    self.plugins.push(plugin);
                }
                Err(e) => {
                    error!(plugin = %plugin.name(), error = %e, "Plugin setup failed, dropping it");
                }
            }
        }
        self.state = PluginLoadState::Active;
        info!(active = self.plugins.len(), "Plugins active");
    }

    /// Runs `teardown` on every plugin. Only the first call has an effect.
    pub async fn teardown_all(&mut self) {
        if self.state == PluginLoadState::Stopped {
            return;
        }
        self.state = PluginLoadState::Stopped;

        for plugin in &mut self.plugins {
            if let Err(payload) = AssertUnwindSafe(plugin.teardown()).catch_unwind().await {
                error!(
                    plugin = %plugin.name(),
                    error = %PluginError::from_panic(payload),
                    "Plugin teardown panicked"
                );
            }
        }
        info!(plugins = self.plugins.len(), "Plugins torn down");
    }
}
