mod config;
mod map_cmd;
mod plan_cmds;
mod sync_cmd;

use clap::{Parser, Subcommand};

use config::{ConfigOverrides, PilotConfig, DEFAULT_MAP_PATH};

#[derive(Parser)]
#[command(name = "planpilot", about = "Converge declarative work plans onto a remote issue tracker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a planpilot config file
    Init {
        /// Remote target, e.g. owner/repo
        #[arg(long)]
        target: String,
        /// Provider backend name
        #[arg(long, default_value = "memory")]
        provider: String,
        /// Board URL for the remote tracker
        #[arg(long, default_value = "")]
        board_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Plan inspection and validation
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Sync a plan onto the remote tracker
    Sync {
        /// Path to the plan TOML file
        file: String,
        /// Sync map path
        #[arg(long, default_value = DEFAULT_MAP_PATH)]
        map: String,
        /// Rebuild the sync map by scanning the tracker for this plan's
        /// items instead of reading the persisted map
        #[arg(long)]
        map_sync: bool,
        /// Plan mutations without executing them
        #[arg(long)]
        dry_run: bool,
        /// Maximum concurrent remote mutations
        #[arg(long, default_value_t = 4)]
        max_in_flight: usize,
        /// Provider backend name (overrides PLANPILOT_PROVIDER env var)
        #[arg(long)]
        provider: Option<String>,
        /// Remote target, e.g. owner/repo (overrides PLANPILOT_TARGET env var)
        #[arg(long)]
        target: Option<String>,
        /// Provider auth token (overrides PLANPILOT_TOKEN env var)
        #[arg(long)]
        token: Option<String>,
    },
    /// Sync map inspection
    Map {
        #[command(subcommand)]
        command: MapCommands,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Validate a plan file and print a summary
    Validate {
        /// Path to the plan TOML file
        file: String,
        /// Tolerate references to items outside this file
        #[arg(long)]
        partial: bool,
    },
    /// Print the plan's content fingerprint
    Id {
        /// Path to the plan TOML file
        file: String,
    },
    /// Preview the rendered body for one item
    Render {
        /// Path to the plan TOML file
        file: String,
        /// Plan item id to render
        item_id: String,
    },
    /// Show declared and derived blocked-by edges per hierarchy level
    Rollup {
        /// Path to the plan TOML file
        file: String,
    },
}

#[derive(Subcommand)]
pub enum MapCommands {
    /// Print a sync map's header and entries
    Show {
        /// Sync map path
        #[arg(long, default_value = DEFAULT_MAP_PATH)]
        map: String,
    },
}

/// Execute the `planpilot init` command: write the config file.
fn cmd_init(target: &str, provider: &str, board_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        remote: config::RemoteSection {
            provider: provider.to_owned(),
            target: target.to_owned(),
            board_url: board_url.to_owned(),
        },
        auth: config::AuthSection { token: None },
    };
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  remote.provider = {provider}");
    println!("  remote.target   = {target}");
    println!();
    println!("Set PLANPILOT_TOKEN (or auth.token in the config file) if your provider needs one.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            target,
            provider,
            board_url,
            force,
        } => {
            cmd_init(&target, &provider, &board_url, force)?;
        }
        Commands::Plan { command } => {
            plan_cmds::run_plan_command(command)?;
        }
        Commands::Sync {
            file,
            map,
            map_sync,
            dry_run,
            max_in_flight,
            provider,
            target,
            token,
        } => {
            let overrides = ConfigOverrides {
                provider,
                target,
                token,
            };
            let config = PilotConfig::resolve(&overrides)?;
            sync_cmd::run_sync(&config, &file, &map, map_sync, dry_run, max_in_flight).await?;
        }
        Commands::Map { command } => {
            map_cmd::run_map_command(command)?;
        }
    }

    Ok(())
}

#[cfg(test)]
pub mod test_util {
    use std::sync::{Mutex, MutexGuard, OnceLock};

    /// Serialize tests that mutate process environment variables.
    pub fn lock_env() -> MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
