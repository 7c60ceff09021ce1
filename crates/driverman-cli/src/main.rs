use std::{process::ExitCode, sync::atomic::Ordering};

use clap::Parser;
use cli::{Args, Commands};
use driverman_config::{
    config::{Config, ProxyConfig},
    error::ConfigError,
};
use driverman_core::{pipeline::build_client, Result};
use driverman_registry::{HostEnvironment, RegistryError, StaticEnvironment, SystemEnvironment};
use driverman_utils::path::resolve_path;
use install::{install_drivers, requests_from_args, RequestOverrides};
use list::list_drivers;
use logging::setup_logging;
use tracing::{debug, info};
use utils::{COLOR, PROGRESS};

mod cli;
mod install;
mod list;
mod logging;
mod progress;
mod utils;

/// Loads the configuration file and applies the global command-line overrides.
fn load_config(args: &Args) -> Result<Config> {
    let path = args
        .config
        .as_deref()
        .map(resolve_path)
        .transpose()
        .map_err(ConfigError::from)?;
    let mut config = Config::load(path.as_deref())?;

    if let Some(url) = &args.repository {
        config.repository_url = Some(url.clone());
    }
    if let Some(dir) = &args.install_dir {
        config.install_dir = Some(dir.clone());
    }
    if let Some(dir) = &args.temp_dir {
        config.temp_dir = Some(dir.clone());
    }
    if let Some(url) = &args.proxy {
        config.proxy = Some(ProxyConfig {
            url: url.clone(),
            username: args.proxy_user.clone(),
            password: args.proxy_password.clone(),
        });
    }

    Ok(config)
}

fn host_environment(args: &Args) -> Result<Box<dyn HostEnvironment>> {
    let detected = SystemEnvironment::detect();
    if args.host_platform.is_none() && args.host_bit.is_none() {
        return Ok(Box::new(detected));
    }

    let mut env = StaticEnvironment::from_host(&detected);
    if let Some(platform) = &args.host_platform {
        env.platform = platform.parse().map_err(|err: RegistryError| {
            ConfigError::InvalidValue {
                field: "host-platform",
                reason: err.to_string(),
            }
        })?;
    }
    if let Some(bit) = &args.host_bit {
        env.bit = bit.parse().map_err(|err: RegistryError| {
            ConfigError::InvalidValue {
                field: "host-bit",
                reason: err.to_string(),
            }
        })?;
    }
    debug!("resolving for {} {}bit", env.platform, env.bit);
    Ok(Box::new(env))
}

fn handle_cli(args: Args) -> Result<()> {
    let mut config = load_config(&args)?;

    match args.command {
        Commands::Config => {
            info!("{}", config.to_toml()?);
        }
        Commands::List => {
            let env = host_environment(&args)?;
            let client = build_client(&config)?;
            list_drivers(&config, env.as_ref(), &client, args.json)?;
        }
        Commands::Install {
            ref names,
            ref platform,
            ref bit,
            ref arch,
            ref version,
            ref url,
            ref file_match_inside,
            keep_downloaded,
        } => {
            let overrides = RequestOverrides {
                platform: platform.clone(),
                bit: bit.clone(),
                arch: arch.clone(),
                version: version.clone(),
                url: url.clone(),
                file_match_inside: file_match_inside.clone(),
            };
            if !names.is_empty() {
                config.drivers = requests_from_args(names, &overrides);
            }
            if keep_downloaded {
                config.keep_downloaded = Some(true);
            }

            let env = host_environment(&args)?;
            let client = build_client(&config)?;
            install_drivers(&config, env.as_ref(), &client)?;
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    let args = Args::parse();
    setup_logging(&args);

    if args.no_color || args.json {
        COLOR.store(false, Ordering::Relaxed);
    }
    if args.no_progress || args.quiet || args.json {
        PROGRESS.store(false, Ordering::Relaxed);
    }

    match handle_cli(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", miette::Report::new(err));
            ExitCode::FAILURE
        }
    }
}
