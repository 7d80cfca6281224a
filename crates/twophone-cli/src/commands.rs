//! Command handlers for the twophone CLI

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use twophone_ble::BleTransport;
use twophone_core::{
    ConnectedDevice, ConnectionOrchestrator, DeviceNotification, DeviceStore, OrchestratorEvent,
    Transport,
};

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::Result;
use crate::store::JsonFileDeviceStore;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Run { names } => Self::handle_run_command(config, names).await,
            Commands::Pair { name } => Self::handle_pair_command(&config, &name),
            Commands::Forget { name } => Self::handle_forget_command(&config, &name),
            Commands::Devices => Self::handle_devices_command(&config),
            Commands::ExampleConfig => {
                print!("{}", AppConfig::example_config()?);
                Ok(())
            }
        }
    }

    fn open_store(config: &AppConfig) -> Result<JsonFileDeviceStore> {
        Ok(JsonFileDeviceStore::open(config.store_path()?)?)
    }

    /// Run the orchestrator until Ctrl-C
    async fn handle_run_command(config: AppConfig, names: Vec<String>) -> Result<()> {
        let store = Arc::new(Self::open_store(&config)?);
        let transport = Arc::new(BleTransport::new(config.ble.clone()).await?);

        let handle = ConnectionOrchestrator::spawn(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::clone(&store) as Arc<dyn DeviceStore>,
            config.orchestrator.clone(),
        );

        for name in names {
            handle.request_connect(name).await?;
        }

        let mut notifications = handle.notifications();
        let mut events = handle.events();
        let mut connected = handle.connected_devices();

        info!(store = %store.path().display(), "waiting for devices, press Ctrl-C to stop");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, shutting down");
                    break;
                }
                received = notifications.recv() => match received {
                    Ok(notification) => print_notification(&notification),
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "notification output fell behind"),
                    Err(RecvError::Closed) => break,
                },
                received = events.recv() => match received {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "event output fell behind"),
                    Err(RecvError::Closed) => break,
                },
                changed = connected.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = connected.borrow_and_update().clone();
                    print_connected(&snapshot);
                }
            }
        }

        if let Err(e) = handle.shutdown().await {
            warn!(error = %e, "orchestrator did not acknowledge shutdown");
        }
        transport.shutdown().await;
        store.flush()?;
        Ok(())
    }

    fn handle_pair_command(config: &AppConfig, name: &str) -> Result<()> {
        let store = Self::open_store(config)?;
        store.add_known_device_name(name)?;
        store.flush()?;
        println!("Paired '{name}'; it will be connected on the next run");
        Ok(())
    }

    fn handle_forget_command(config: &AppConfig, name: &str) -> Result<()> {
        let store = Self::open_store(config)?;
        if !store.list_known_device_names()?.iter().any(|known| known == name) {
            println!("'{name}' is not a known device");
            return Ok(());
        }
        store.remove_known_device_name(name)?;
        store.flush()?;
        println!("Forgot '{name}'");
        Ok(())
    }

    fn handle_devices_command(config: &AppConfig) -> Result<()> {
        let store = Self::open_store(config)?;
        let names = store.list_known_device_names()?;
        if names.is_empty() {
            println!("No known devices");
        } else {
            println!("Known devices:");
            for name in names {
                println!("  {name}");
            }
        }
        println!("Identity tokens issued: {}", store.identity_count()?);
        Ok(())
    }
}

fn print_notification(notification: &DeviceNotification) {
    println!(
        "[{}] {}: {}",
        notification.device_name, notification.title, notification.body
    );
}

fn print_connected(devices: &[ConnectedDevice]) {
    if devices.is_empty() {
        println!("Connected: none");
        return;
    }
    let listed: Vec<String> = devices
        .iter()
        .map(|device| match device.operating_system {
            Some(os) => format!("{} ({})", device.name, os),
            None => device.name.clone(),
        })
        .collect();
    println!("Connected: {}", listed.join(", "));
}

fn log_event(event: &OrchestratorEvent) {
    match event {
        OrchestratorEvent::SessionFailed {
            name,
            kind,
            reason,
            requeued: false,
        } => warn!(device = %name, ?kind, %reason, "giving up on device"),
        OrchestratorEvent::SessionFailed {
            name, kind, reason, ..
        } => info!(device = %name, ?kind, %reason, "session failed, will retry"),
        other => info!(event = ?other, "orchestrator event"),
    }
}
