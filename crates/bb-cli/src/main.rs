//! BastionBuddy CLI
//!
//! Tunnels and interactive sessions through Azure Bastion:
//! - Start saved or new tunnels and keep track of them across runs
//! - Hand off to `az network bastion ssh|rdp` for interactive sessions
//! - Stop tunnels individually or all at once

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bastion_buddy::commands::{self, OpenArgs, SessionArgs};
use bastion_buddy::output::print_info;
use bb_core::auth::{AzCliAuth, OfflineAuth};
use bb_core::config::{self, AppConfig, CONFIG_DIR_ENV};
use bb_core::traits::AuthProvider;
use bb_core::{ConnectionKind, LazyContext};

#[derive(Parser)]
#[command(name = "bastion-buddy")]
#[command(author, version, about = "Tunnels and sessions through Azure Bastion")]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding saved configurations and tunnel state
    #[arg(long, global = true, env = CONFIG_DIR_ENV)]
    config_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a saved tunnel configuration
    Start {
        /// Name of the tunnel configuration
        name: String,
    },

    /// Open a new tunnel and save it for later
    Open {
        /// Full resource id of the target
        #[arg(long)]
        resource_id: String,

        /// Display name of the target (defaults to the last segment of the id)
        #[arg(long)]
        resource_name: Option<String>,

        /// Name of the bastion host
        #[arg(long)]
        bastion: String,

        /// Resource group of the bastion host
        #[arg(long)]
        bastion_group: String,

        /// Subscription of the bastion host (defaults to the target's)
        #[arg(long)]
        bastion_scope: Option<String>,

        /// Local port to listen on
        #[arg(long)]
        local_port: u16,

        /// Port on the target resource
        #[arg(long, default_value_t = 22)]
        remote_port: u16,

        /// Name to save the configuration under (default: tunnel-<resource name>)
        #[arg(long)]
        name: Option<String>,
    },

    /// Connect over SSH to a saved configuration or a new target
    Ssh {
        /// Name of the SSH configuration (default for new targets: ssh-<resource name>)
        #[arg(required_unless_present = "resource_id")]
        name: Option<String>,

        #[command(flatten)]
        target: SessionTarget,

        /// Login user on the target
        #[arg(long, default_value = "")]
        username: String,

        /// Authentication type passed to the Azure CLI (password, AAD, ssh-key)
        #[arg(long, default_value = "")]
        auth_type: String,
    },

    /// Connect over RDP to a saved configuration or a new target
    Rdp {
        /// Name of the RDP configuration (default for new targets: rdp-<resource name>)
        #[arg(required_unless_present = "resource_id")]
        name: Option<String>,

        #[command(flatten)]
        target: SessionTarget,
    },

    /// List saved configurations
    List {
        /// Only show one kind (tunnel, ssh, rdp)
        #[arg(short, long)]
        kind: Option<ConnectionKind>,
    },

    /// Show tracked tunnels
    Status,

    /// Stop a tunnel
    Stop {
        /// Tunnel id as shown by `status`
        id: String,
    },

    /// Stop every tracked tunnel
    StopAll,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags that describe a new SSH or RDP target to save before connecting
#[derive(Args)]
struct SessionTarget {
    /// Full resource id of the target
    #[arg(long, requires_all = ["bastion", "bastion_group"])]
    resource_id: Option<String>,

    /// Display name of the target (defaults to the last segment of the id)
    #[arg(long, requires = "resource_id")]
    resource_name: Option<String>,

    /// Name of the bastion host
    #[arg(long, requires = "resource_id")]
    bastion: Option<String>,

    /// Resource group of the bastion host
    #[arg(long, requires = "resource_id")]
    bastion_group: Option<String>,

    /// Subscription of the bastion host (defaults to the target's)
    #[arg(long, requires = "resource_id")]
    bastion_scope: Option<String>,
}

impl SessionTarget {
    fn into_args(self, name: Option<String>, username: String, auth_type: String) -> SessionArgs {
        SessionArgs {
            name,
            resource_id: self.resource_id,
            resource_name: self.resource_name,
            bastion: self.bastion,
            bastion_group: self.bastion_group,
            bastion_scope: self.bastion_scope,
            username,
            auth_type,
        }
    }
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Show config directory path
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

impl Commands {
    /// Commands that launch `az` need a real login; the rest only touch local state
    fn needs_login(&self) -> bool {
        matches!(
            self,
            Commands::Start { .. } | Commands::Open { .. } | Commands::Ssh { .. } | Commands::Rdp { .. }
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let config_dir = cli.config_dir.unwrap_or_else(config::default_config_dir);
    tracing::debug!("Using config directory {:?}", config_dir);

    let Some(command) = cli.command else {
        print_info(&format!("Configuration directory: {}", config_dir.display()));
        print_info("Run 'bastion-buddy --help' for the available commands");
        return Ok(());
    };

    if let Commands::Config { action } = &command {
        return match action {
            ConfigAction::Show => commands::config_show(&config_dir),
            ConfigAction::Path => {
                commands::config_path(&config_dir);
                Ok(())
            }
            ConfigAction::Init { force } => commands::config_init(&config_dir, *force),
        };
    }

    let config_file = config::config_path(&config_dir);
    let app_config: AppConfig = config::load_config(&config_file)
        .with_context(|| format!("Failed to load config from {:?}", config_file))?;

    let auth: Arc<dyn AuthProvider> = if command.needs_login() {
        Arc::new(AzCliAuth::new(
            config::default_program(),
            app_config.interactive_login,
        ))
    } else {
        Arc::new(OfflineAuth)
    };
    let ctx = LazyContext::with_supervisor_defaults(config_dir, app_config, auth);

    match command {
        Commands::Start { name } => commands::start_command(&ctx, &name).await,
        Commands::Open {
            resource_id,
            resource_name,
            bastion,
            bastion_group,
            bastion_scope,
            local_port,
            remote_port,
            name,
        } => {
            let args = OpenArgs {
                resource_id,
                resource_name,
                bastion,
                bastion_group,
                bastion_scope,
                local_port,
                remote_port,
                name,
            };
            commands::open_command(&ctx, &args).await
        }
        Commands::Ssh {
            name,
            target,
            username,
            auth_type,
        } => {
            let args = target.into_args(name, username, auth_type);
            commands::handoff_command(&ctx, ConnectionKind::Ssh, &args).await
        }
        Commands::Rdp { name, target } => {
            let args = target.into_args(name, String::new(), String::new());
            commands::handoff_command(&ctx, ConnectionKind::Rdp, &args).await
        }
        Commands::List { kind } => commands::list_command(&ctx, kind).await,
        Commands::Status => commands::status_command(&ctx).await,
        Commands::Stop { id } => commands::stop_command(&ctx, &id).await,
        Commands::StopAll => commands::stop_all_command(&ctx).await,
        Commands::Config { .. } => Ok(()),
    }
}
