//! CLI argument parsing using clap.

use clap::{
    Args, Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

use crate::config::{PublishMode, Settings};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Filesystem watch bridge for language servers
#[derive(Parser, Debug)]
#[command(
    name = "watchbridge",
    version = env!("CARGO_PKG_VERSION"),
    about = "Forward filesystem watch events to a language server over a local socket",
    next_line_help = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize project
    #[command(about = "Set up .watchbridge directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings")]
    Config,

    /// Start the bridge
    #[command(
        about = "Listen for the plugin and forward watch events",
        after_help = "Examples:\n  watchbridge serve\n  watchbridge serve --publish file --publish-path /tmp/bridge.json\n  watchbridge serve --port 4100 --max-sessions 1"
    )]
    Serve(ServeArgs),
}

/// Overrides for the `serve` command; unset flags keep configured values.
#[derive(Args, Debug, Default, Clone)]
pub struct ServeArgs {
    /// Interface to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (0 = OS chooses)
    #[arg(long)]
    pub port: Option<u16>,

    /// How to publish the bound address
    #[arg(long, value_enum)]
    pub publish: Option<PublishMode>,

    /// Address file for --publish file
    #[arg(long, value_name = "FILE")]
    pub publish_path: Option<PathBuf>,

    /// Plugin name sent with the published address
    #[arg(long)]
    pub plugin: Option<String>,

    /// Maximum concurrent sessions (0 = unlimited)
    #[arg(long)]
    pub max_sessions: Option<usize>,
}

impl ServeArgs {
    /// Apply CLI overrides on top of loaded settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(mode) = self.publish {
            settings.publish.mode = mode;
        }
        if let Some(path) = &self.publish_path {
            settings.publish.path = path.clone();
        }
        if let Some(plugin) = &self.plugin {
            settings.publish.plugin = plugin.clone();
        }
        if let Some(max) = self.max_sessions {
            settings.server.max_sessions = max;
        }
    }
}
