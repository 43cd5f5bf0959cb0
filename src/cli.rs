// CLI module for handling command-line interface

use crate::install::ExistingFileStrategy;
use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "install-unity")]
#[command(version)]
#[command(about = "Discover, download and install Unity editor releases and modules")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Platform and architecture overrides, defaulting to the running system
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Target platform (mac, windows, linux)
    #[arg(long)]
    pub platform: Option<String>,

    /// Target architecture (x64, arm64)
    #[arg(long = "arch")]
    pub architecture: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List known releases, grouped by major.minor
    List {
        /// Least stable release type to show (final, patch, beta, alpha)
        #[arg(long = "type", short = 't', default_value = "final")]
        release_type: String,

        /// Only show versions matching this partial version, e.g. 2021.3
        filter: Option<String>,
    },
    /// Show the packages of a release
    Details {
        version: String,

        #[command(flatten)]
        target: TargetArgs,
    },
    /// Download and install a release
    Install {
        version: String,

        /// Package to install, may be repeated. Prefix with ~ for a substring match,
        /// with = to skip sub-modules.
        #[arg(short = 'p', long = "package")]
        packages: Vec<String>,

        /// Select every visible module
        #[arg(long)]
        all_packages: bool,

        /// Only download the package files
        #[arg(long, conflicts_with = "install_only")]
        download_only: bool,

        /// Only install previously downloaded package files
        #[arg(long)]
        install_only: bool,

        /// How to treat package files that already exist
        #[arg(long, default_value_t = ExistingFileStrategy::Resume)]
        existing: ExistingFileStrategy,

        /// Keep downloaded package files after installing
        #[arg(long)]
        keep: bool,

        #[command(flatten)]
        target: TargetArgs,

        /// Show what would be done without downloading anything
        #[arg(long)]
        dry_run: bool,
    },
    /// List editor installations
    Installs,
    /// Remove an editor installation
    Uninstall { version: String },
    /// Move an editor installation to a new path
    Move { version: String, path: String },
    /// Merge a release feed into the catalog
    Update {
        /// JSON file or http(s) URL with an array of releases
        #[arg(long)]
        source: String,

        /// Update even if the catalog is still fresh
        #[arg(long)]
        force: bool,
    },
    /// Read or change configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show every option with its current value
    List,
    Get { name: String },
    Set { name: String, value: String },
    /// Restore an option to its default
    Reset { name: String },
}
