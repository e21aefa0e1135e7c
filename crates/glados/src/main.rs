//! `glados`: run the gateway, or poke one of its injection plugins.
//!
//! ```bash
//! glados run --debug
//! glados inject --plugin PDReminder --no-data
//! echo '{"score": 3}' | glados inject --plugin Scoreboard
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::info;

use glados_runtime::{ConfigLoader, GladosConfig, GladosRuntime, ShutdownReason};

#[derive(Parser)]
#[command(name = "glados", version, about = "GLaDOS chat gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (default: glados.toml in the current directory).
    #[arg(short, long, global = true, env = "GLADOS_CONFIG")]
    config: Option<PathBuf>,

    /// Configuration profile (development, production, test, ...).
    #[arg(long, global = true)]
    profile: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway (default when no subcommand is given).
    Run {
        /// Only listen and reply in the debug channel.
        #[arg(long)]
        debug: bool,
    },
    /// Send a payload to an injection plugin through the control socket.
    Inject {
        /// Declared name of the target plugin.
        #[arg(long)]
        plugin: String,
        /// Payload to send; read from stdin when absent.
        #[arg(long, conflicts_with = "no_data")]
        data: Option<String>,
        /// Send an empty payload.
        #[arg(long)]
        no_data: bool,
        /// Control socket path (overrides the configured one).
        #[arg(long)]
        socket: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command.unwrap_or(Commands::Run { debug: false }) {
        Commands::Run { debug } => run(config, debug).await,
        Commands::Inject {
            plugin,
            data,
            no_data,
            socket,
        } => {
            let payload = match (data, no_data) {
                (_, true) => String::new(),
                (Some(data), false) => data,
                (None, false) => {
                    let mut buf = String::new();
                    tokio::io::stdin()
                        .read_to_string(&mut buf)
                        .await
                        .context("failed to read payload from stdin")?;
                    buf
                }
            };
            let socket = socket
                .or(config.gateway.control_socket)
                .context("no control socket configured")?;
            inject(socket, &plugin, &payload).await
        }
    }
}

fn load_config(cli: &Cli) -> Result<GladosConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.file(path);
    }
    if let Some(profile) = &cli.profile {
        loader = loader.profile(profile);
    }
    Ok(loader.load()?)
}

async fn run(mut config: GladosConfig, debug: bool) -> Result<()> {
    config.gateway.debug |= debug;

    let mut runtime = GladosRuntime::from_config(config);
    glados_plugins::register_builtin(runtime.registry_mut());

    match runtime.run().await? {
        ShutdownReason::ConnectionClosed { code, reason } => bail!(
            "connection closed by the server (code {code}{})",
            reason.map(|r| format!(": {r}")).unwrap_or_default()
        ),
        reason => {
            info!(reason = ?reason, "Goodbye");
            Ok(())
        }
    }
}

#[cfg(unix)]
async fn inject(socket: PathBuf, plugin: &str, payload: &str) -> Result<()> {
    glados_transport::send_request(&socket, plugin, payload)
        .await
        .with_context(|| format!("failed to reach the gateway at {}", socket.display()))
}

#[cfg(not(unix))]
async fn inject(_socket: PathBuf, _plugin: &str, _payload: &str) -> Result<()> {
    bail!("the control socket is only available on Unix")
}
