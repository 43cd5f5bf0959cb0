mod catalog;
mod cli;
mod commands;
mod config;
mod constants;
mod download;
mod error;
mod install;
#[cfg(test)]
mod testing;
mod ui;
mod version;

use clap::Parser;
use cli::{Cli, Commands};
use commands::install::InstallOptions;
use error::ResolveError;
use log::LevelFilter;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Commands::List {
            release_type,
            filter,
        } => commands::list::list(&release_type, filter.as_deref()),
        Commands::Details { version, target } => commands::details::details(&version, &target),
        Commands::Install {
            version,
            packages,
            all_packages,
            download_only,
            install_only,
            existing,
            keep,
            target,
            dry_run,
        } => {
            commands::install::install(InstallOptions {
                version,
                packages,
                all_packages,
                download_only,
                install_only,
                existing,
                keep,
                target,
                dry_run,
            })
            .await
        }
        Commands::Installs => commands::installs::installs().await,
        Commands::Uninstall { version } => commands::uninstall::uninstall(&version).await,
        Commands::Move { version, path } => commands::relocate::relocate(&version, &path).await,
        Commands::Update { source, force } => commands::update::update(&source, force).await,
        Commands::Config { action } => commands::config::config(action),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            ui::error(&format!("{:#}", err));
            // Bad input is reported apart from failures while doing the work
            if err.downcast_ref::<ResolveError>().is_some() {
                2
            } else {
                1
            }
        }
    };
    std::process::exit(code);
}
