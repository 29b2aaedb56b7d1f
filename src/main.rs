pub mod config;
pub mod connection;
pub mod device;
pub mod runtime;
pub mod session;
pub mod ui;

use crate::config::{AppConfig, TransportKind};
use crate::connection::{Bridge, ConnectionCoordinator, CoordinatorSettings};
use crate::device::bluetoothctl::{BluetoothctlRegistry, BluetoothctlRemover};
use crate::device::loopback::LoopbackFactory;
use crate::device::payload::FilePayloadLoader;
use crate::device::{
    AssumeElevated, Collaborators, ConnectionFactory, EffectiveUid, PrivilegeCheck,
};
use crate::ui::ProcontrolUI;
use color_eyre::{eyre::eyre, Result};
use eframe::egui;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    setup_panic_handling()?;

    // Config zuerst, Log-Level kommt daraus; Ergebnis wird danach geloggt
    let (config, origin) = AppConfig::load_or_default();
    setup_logging_env(config.log_level());
    origin.report();

    // Root-Check nur als Warnung, Connect prüft erneut
    let privilege: Arc<dyn PrivilegeCheck> = if config.require_root {
        Arc::new(EffectiveUid)
    } else {
        Arc::new(AssumeElevated)
    };
    if !privilege.is_elevated() {
        warn!("Not running as root, connecting to a console will be refused");
    }

    let factory: Arc<dyn ConnectionFactory> = match config.transport {
        TransportKind::Loopback => {
            let (factory, _control) = LoopbackFactory::new();
            info!("Using loopback controller backend");
            Arc::new(factory)
        }
    };

    let collaborators = Collaborators {
        factory,
        registry: Arc::new(BluetoothctlRegistry::default()),
        remover: Arc::new(BluetoothctlRemover::default()),
        loader: Arc::new(FilePayloadLoader),
        privilege,
    };

    // Ohne Hintergrund-Runtime läuft die UI trotzdem, nur ohne Verbindungen
    let bridge = Bridge::start(config.work_queue_capacity).unwrap_or_else(|e| {
        error!("{}, continuing without background runtime", e);
        Bridge::unavailable()
    });

    let coordinator =
        ConnectionCoordinator::new(bridge, collaborators, CoordinatorSettings::from(&config));
    let shutdown_timeout = config.shutdown_timeout();

    info!("Starting UI");
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Procontrol")
            .with_inner_size([760.0, 520.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Procontrol",
        native_options,
        Box::new(move |cc| {
            Ok(Box::new(ProcontrolUI::new(
                cc,
                coordinator,
                shutdown_timeout,
            )))
        }),
    )
    .map_err(|e| eyre!("Failed to run UI: {}", e))?;

    info!("Procontrol exited");
    Ok(())
}

fn setup_panic_handling() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
