mod cache;
mod cleanup;
mod config;
mod coordinator;
mod device;
mod dump;
mod error;
mod event;
mod mirror;
mod touches;
mod transport;

use clap::Parser;

use cleanup::CleanupRegistry;
use config::{Cli, Command, Config};
use coordinator::Coordinator;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let config = Config::load(&cli);

    let default_filter = if config.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let transport = transport::connect(&config);
    let registry = CleanupRegistry::new();
    watch_signals(&registry);

    match cli.command {
        Some(Command::Dump { target }) => return dump::run_dump(transport.as_ref(), &target),
        Some(Command::Events { target, device }) => {
            return dump::run_events(transport, &target, device.as_deref(), &registry)
        }
        None => {}
    }

    if let Err(e) = config.validate() {
        eprintln!("{}", e);
        eprintln!("Usage: input-mirror [OPTIONS] HOST_SERIAL MIRROR_SERIAL...");
        std::process::exit(1);
    }
    let host = config.host.as_deref().unwrap_or_default();

    log::info!(
        "input-mirror starting (host={}, mirrors={}, transport={}, policy={})",
        host,
        config.mirrors.join(","),
        config.transport,
        config.policy
    );

    let touches = if config.show_touches {
        Some(touches::enable(transport.clone(), &config.mirrors, &registry)?)
    } else {
        None
    };

    let coordinator = Coordinator::new(transport, &registry, config.policy)
        .elevate(config.elevate_command.clone())
        .host_device(config.host_device.clone());

    let result = coordinator.run(host, &config.mirrors);
    if let Some(touches) = touches {
        touches.fire();
    }

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            if let Some(listing) = e.listing() {
                eprintln!("{}", listing);
            }
            return Err(e.into());
        }
    };

    log::info!("Mirrored {} events", summary.events);
    for target in &summary.targets {
        match &target.error {
            Some(error) => log::warn!("[{}] {} events, stopped: {}", target.name, target.forwarded, error),
            None => log::info!("[{}] {} events", target.name, target.forwarded),
        }
    }
    Ok(())
}

fn watch_signals(registry: &CleanupRegistry) {
    if let Err(e) = cleanup::watch_signals(registry.clone()) {
        log::warn!("Termination signals will not release remote sessions: {}", e);
    }
}
