// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MCC backend daemon
//!
//! Hosts the message bus, the system manager and the protocol encoders in
//! one process. The db, cmd and tm services are external; their endpoints
//! are registered and monitored here.
//!
//! # Usage
//!
//! ```bash
//! # All encoders, default settings
//! mccd
//!
//! # With configuration file and preset channels
//! mccd --config mccd.toml
//!
//! # Write a sample configuration
//! mccd gen-config --output mccd.toml
//!
//! # Check a channel settings string
//! mccd parse-settings Mavlink:udp:127.0.0.1:14550:
//! ```

mod config;
mod console;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mcc_bus::messages::CmdIdGen;
use mcc_bus::{
    names, spawn_service, LocalRouter, ManagerService, RouterService, ServiceBase, TaskRunner,
};
use mcc_encoder::{
    EncoderConfig, EncoderService, InternalProtocol, MavlinkProtocol, NetChannel, PhotonProtocol,
    Protocol,
};
use tracing_subscriber::EnvFilter;

use crate::config::{DaemonConfig, EncoderKind, EXTERNAL_ENDPOINTS};
use crate::console::{preset_requests, Console, Monitor};

/// MCC backend daemon
#[derive(Parser, Debug)]
#[command(name = "mccd")]
#[command(about = "MCC backend daemon - message bus, system manager and protocol encoders")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter (trace, debug, info, warn, error, or a tracing directive list)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "mccd.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Parse a channel settings string and show its parts
    ParseSettings {
        /// `protocol:transport:params`
        settings: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => DaemonConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => DaemonConfig::default(),
    };

    let level = args.log_level.as_deref().unwrap_or(&config.log_level);
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
            Commands::ParseSettings { settings } => cmd_parse_settings(&settings),
        };
    }

    run(config)
}

fn spawn_encoder<P: Protocol>(
    router: &LocalRouter,
    protocol: P,
    config: &DaemonConfig,
) -> Result<TaskRunner> {
    let name = protocol.service_name();
    let base = ServiceBase::new(router, name, &config.service)?;
    let task = spawn_service(EncoderService::new(base, protocol, &config.encoder))
        .with_context(|| format!("Failed to start {}", name))?;
    Ok(task)
}

fn start_encoder(
    router: &LocalRouter,
    kind: EncoderKind,
    config: &DaemonConfig,
    cmd_ids: &CmdIdGen,
) -> Result<TaskRunner> {
    let encoder: &EncoderConfig = &config.encoder;
    match kind {
        EncoderKind::Internal => spawn_encoder(
            router,
            InternalProtocol::new(encoder).with_cmd_ids(cmd_ids.clone()),
            config,
        ),
        EncoderKind::Mavlink => spawn_encoder(router, MavlinkProtocol::new(encoder), config),
        EncoderKind::Photon => spawn_encoder(router, PhotonProtocol::new(encoder), config),
    }
}

fn run(config: DaemonConfig) -> Result<()> {
    let kinds = config.encoder_kinds()?;
    let presets = preset_requests(&config.channels)?;

    let mut router = LocalRouter::new();
    for name in config.endpoint_names()? {
        router.add(&name)?;
    }
    let router = Arc::new(router);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        encoders = ?kinds,
        channels = presets.len(),
        "Starting MCC daemon"
    );

    let mut core = vec![TaskRunner::spawn(
        names::CORE_ROUTER,
        RouterService::new(router.clone(), config.router.clone()),
    )
    .context("Failed to start router")?];

    let mut monitored: Vec<String> = EXTERNAL_ENDPOINTS.iter().map(|s| s.to_string()).collect();
    for extra in &config.endpoints {
        if !monitored.contains(extra) {
            monitored.push(extra.clone());
        }
    }
    for name in &monitored {
        let monitor = Monitor::new(name, router.receiver(name)?);
        core.push(TaskRunner::spawn(&format!("monitor:{}", name), monitor)?);
    }
    core.push(TaskRunner::spawn(
        names::UI,
        Console::new(router.receiver(names::UI)?, router.sender(names::UI), presets),
    )?);

    let manager = ManagerService::new(
        ServiceBase::new(&router, names::CORE_MANAGER, &config.service)?,
        &config.manager_config()?,
    );
    core.push(spawn_service(manager).context("Failed to start manager")?);

    let cmd_ids = CmdIdGen::new();
    let mut encoders = Vec::new();
    for kind in kinds {
        encoders.push(start_encoder(&router, kind, &config, &cmd_ids)?);
    }

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, shutting down...");
        flag.store(false, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl+C handler")?;

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    // Encoders first: they release channels and announce their stop on a live bus.
    for mut task in encoders.into_iter().chain(core.into_iter().rev()) {
        if !task.finish(true) {
            tracing::warn!(task = task.name(), "task did not stop in time");
        }
    }
    router.close_all();

    tracing::info!("MCC daemon stopped");
    Ok(())
}

fn cmd_gen_config(output: PathBuf) -> Result<()> {
    let text = toml::to_string_pretty(&DaemonConfig::example())
        .context("Failed to serialize example configuration")?;
    std::fs::write(&output, text)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Configuration written to {}", output.display());
    Ok(())
}

fn cmd_validate(path: PathBuf) -> Result<()> {
    match DaemonConfig::from_file(&path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Encoders: {:?}", config.encoder_kinds()?);
            println!("Required: {}", config.manager_config()?.required.join(", "));
            println!("Channels: {}", config.channels.len());
            for (i, ch) in config.channels.iter().enumerate() {
                println!(
                    "  [{}] {} -> {} {}",
                    i,
                    ch.address,
                    ch.settings,
                    if ch.open { "(open)" } else { "" }
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_parse_settings(settings: &str) -> Result<()> {
    let channel: NetChannel = match settings.parse() {
        Ok(c) => c,
        Err(e) => bail!("invalid settings '{}': {}", settings, e),
    };
    println!("Protocol:  {}", channel.protocol);
    println!("Transport: {}", channel.transport.kind());
    println!("Channel:   {}", channel.name());
    println!("Canonical: {}", channel);
    Ok(())
}
