//! Process orchestration.
//!
//! [`GladosRuntime`] performs the bootstrap handshake, assembles a
//! [`Gateway`] around the [`EventRouter`] and starts the drivers feeding it.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use glados_runtime::GladosRuntime;
//!
//! // Auto-loads glados.toml from the current directory
//! let mut runtime = GladosRuntime::new();
//! glados_plugins::register_builtin(runtime.registry_mut());
//! runtime.run().await?;
//!
//! // Custom configuration
//! let config = ConfigLoader::new().file("config/glados.toml").load()?;
//! let runtime = GladosRuntime::from_config(config);
//! ```
//!
//! # Shutdown
//!
//! On `ConnectionClosed` or a termination signal the router stops
//! dequeuing, every plugin is torn down once, the session is committed and
//! the drivers are stopped and joined, in that order.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use tokio::signal;
use tracing::{debug, info, warn};

use glados_core::{
    Directories, EventReceiver, EventSender, Messenger, Outbox, PluginContext, Session,
    Transcript, event_queue,
};
use glados_transport::{ConnectionDriver, SlackApi};

use crate::config::{ConfigLoader, GladosConfig, read_token, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::manifest::Manifest;
use crate::registry::{PluginManager, PluginRegistry};
use crate::router::{EventRouter, RouterSettings, ShutdownReason};
use crate::timer::TimerDriver;

// =============================================================================
// Driver
// =============================================================================

/// A task feeding the event queue.
#[async_trait]
pub trait Driver: Send {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Stops the task and waits for it to exit. Safe to call twice.
    async fn stop(&mut self);
}

#[async_trait]
impl Driver for ConnectionDriver {
    fn name(&self) -> &'static str {
        "connection"
    }

    async fn stop(&mut self) {
        ConnectionDriver::stop(self).await;
    }
}

#[async_trait]
impl Driver for TimerDriver {
    fn name(&self) -> &'static str {
        "timer"
    }

    async fn stop(&mut self) {
        TimerDriver::stop(self).await;
    }
}

#[cfg(unix)]
#[async_trait]
impl Driver for glados_transport::ControlSocket {
    fn name(&self) -> &'static str {
        "control"
    }

    async fn stop(&mut self) {
        glados_transport::ControlSocket::stop(self).await;
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// An assembled gateway: the router, its queue and the drivers feeding it.
pub struct Gateway {
    router: EventRouter,
    events: EventReceiver,
    drivers: Vec<Box<dyn Driver>>,
    shutdown_timeout: Option<Duration>,
}

impl Gateway {
    /// Wraps a router and the consumer half of its queue.
    pub fn new(router: EventRouter, events: EventReceiver) -> Self {
        Self {
            router,
            events,
            drivers: Vec::new(),
            shutdown_timeout: None,
        }
    }

    /// Builds the router from configuration, without touching the network.
    ///
    /// Opens the channel transcripts and the session, reads the manifest and
    /// admits the plugins it names. Plugin setup runs when the gateway starts.
    pub fn assemble(
        config: &GladosConfig,
        registry: &PluginRegistry,
        messenger: Arc<dyn Messenger>,
        directories: Directories,
        events: EventReceiver,
    ) -> RuntimeResult<Self> {
        let gateway = &config.gateway;
        let directories = Arc::new(directories);

        let transcript = if config.channel_log.enabled {
            let root = config.channel_log.root(gateway.debug);
            Transcript::open(root, &directories, Local::now().date_naive())
        } else {
            Transcript::disabled()
        }
        .shared();

        let session = Session::open(&gateway.session_file)?.shared();

        let ctx = PluginContext {
            name: String::new(),
            outbox: Outbox::new(messenger, transcript.clone(), directories.clone()),
            directories,
            session,
            debug: gateway.debug,
        };

        let manifest = Manifest::load_or_empty(&gateway.manifest);
        let plugins = PluginManager::load(&manifest, registry, &ctx, Local::now());

        let router = EventRouter::new(
            plugins,
            &ctx,
            transcript,
            RouterSettings {
                debug: gateway.debug,
                bot_name: gateway.bot_name.clone(),
                commit_after_handle: gateway.commit_after_handle,
            },
        );

        Ok(Self::new(router, events).with_shutdown_timeout(gateway.shutdown_timeout()))
    }

    /// Adds a driver to stop during shutdown.
    pub fn with_driver(mut self, driver: impl Driver + 'static) -> Self {
        self.drivers.push(Box::new(driver));
        self
    }

    /// Adds the driver `start` produces. When starting fails, the drivers
    /// already added are stopped before the error is returned.
    pub async fn try_with_driver<D, F>(mut self, start: F) -> RuntimeResult<Self>
    where
        D: Driver + 'static,
        F: Future<Output = RuntimeResult<D>>,
    {
        match start.await {
            Ok(driver) => Ok(self.with_driver(driver)),
            Err(e) => {
                warn!(error = %e, "Driver failed to start, stopping the others");
                self.stop_drivers().await;
                Err(e)
            }
        }
    }

    /// Bounds how long shutdown waits for the drivers.
    pub fn with_shutdown_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// The router.
    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Sets up the plugins, processes events until the connection closes or
    /// `shutdown` resolves, then shuts everything down.
    pub async fn run_until<S>(mut self, shutdown: S) -> ShutdownReason
    where
        S: Future<Output = ()>,
    {
        self.router.start().await;
        let reason = self.router.run(&mut self.events, shutdown).await;

        self.router.close().await;
        self.stop_drivers().await;

        info!(reason = ?reason, "Gateway stopped");
        reason
    }

    async fn stop_drivers(&mut self) {
        let timeout = self.shutdown_timeout;
        let drivers = &mut self.drivers;
        let stop_all = async move {
            for driver in drivers.iter_mut() {
                driver.stop().await;
                debug!(driver = driver.name(), "Driver stopped");
            }
        };

        match timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, stop_all).await.is_err() {
                    warn!(timeout = ?limit, "Drivers did not stop in time");
                }
            }
            None => stop_all.await,
        }
    }
}

// =============================================================================
// GladosRuntime
// =============================================================================

/// The gateway process.
pub struct GladosRuntime {
    config: GladosConfig,
    registry: PluginRegistry,
}

impl GladosRuntime {
    /// Creates a runtime from `glados.toml` in the current directory,
    /// falling back to defaults.
    pub fn new() -> Self {
        let config = ConfigLoader::new().load().unwrap_or_else(|e| {
            eprintln!("glados: ignoring unusable configuration ({e})");
            GladosConfig::default()
        });
        Self::from_config(config)
    }

    /// Creates a runtime from configuration and initializes logging.
    pub fn from_config(config: GladosConfig) -> Self {
        logging::init_from_config(&config.logging);
        info!(
            log_level = %config.logging.level,
            debug = config.gateway.debug,
            "Gateway configured"
        );
        Self {
            config,
            registry: PluginRegistry::new(),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &GladosConfig {
        &self.config
    }

    /// Plugin classes available to the manifest.
    pub fn registry_mut(&mut self) -> &mut PluginRegistry {
        &mut self.registry
    }

    /// Runs until the connection closes or a termination signal arrives.
    pub async fn run(self) -> RuntimeResult<ShutdownReason> {
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs with a custom shutdown future.
    pub async fn run_until<S>(self, shutdown: S) -> RuntimeResult<ShutdownReason>
    where
        S: Future<Output = ()>,
    {
        validate_config(&self.config)?;
        let settings = &self.config.gateway;

        let token = read_token(&settings.token_file)?;
        let api = SlackApi::new(&settings.api_base, token, settings.http_timeout())?;
        let bootstrap = api.bootstrap().await?;
        info!(
            bot = %bootstrap.self_info.name,
            users = bootstrap.users.len(),
            channels = bootstrap.channels.len(),
            "Bootstrap handshake complete"
        );

        let directories = Directories::build(
            bootstrap.self_info.id.as_str(),
            &bootstrap.users,
            &bootstrap.channels,
            &settings.debug_channel,
            settings.debug,
        );
        if settings.debug && directories.debug_channel().is_none() {
            warn!(channel = %settings.debug_channel, "Debug channel not found, nothing will be processed");
        }

        let (tx, rx) = event_queue();
        let mut gateway =
            Gateway::assemble(&self.config, &self.registry, Arc::new(api), directories, rx)?;

        // Local resources first: nothing is running yet if binding fails.
        if let Some(path) = &settings.control_socket {
            gateway = start_control(gateway, path, tx.clone())?;
        }
        let url = bootstrap.url.as_str();
        gateway = gateway
            .with_driver(TimerDriver::start(settings.tick(), tx.clone()))
            .try_with_driver(async {
                ConnectionDriver::start(url, tx).await.map_err(RuntimeError::from)
            })
            .await?;

        info!("GLaDOS is now running. Press Ctrl+C to stop.");
        Ok(gateway.run_until(shutdown).await)
    }
}

impl Default for GladosRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn start_control(gateway: Gateway, path: &Path, events: EventSender) -> RuntimeResult<Gateway> {
    let socket = glados_transport::ControlSocket::bind(path, events)
        .map_err(|e| RuntimeError::Control(e.to_string()))?;
    Ok(gateway.with_driver(socket))
}

#[cfg(not(unix))]
fn start_control(gateway: Gateway, path: &Path, _events: EventSender) -> RuntimeResult<Gateway> {
    warn!(path = %path.display(), "Control socket is only available on Unix");
    Ok(gateway)
}

/// Waits for Ctrl+C or SIGTERM.
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = ctrl_c() => {}
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
