//! # Procontrol User Interface
//!
//! egui front end over the [`ConnectionCoordinator`]. The UI owns the
//! coordinator and drives it from the frame loop: every frame it applies
//! finished background work ([`ConnectionCoordinator::poll`]), lets the health
//! monitor run ([`ConnectionCoordinator::tick`]) and turns the resulting
//! [`CoordinatorEvent`]s into status text and dialogs.
//!
//! ## Layout
//! - **Top Panel**: connection status, address field, Connect / Disconnect
//! - **Central Panel**: controller pad and amiibo panel
//! - **Bottom Panel**: controller type, last known console, connected time
//!
//! Windows on top: console selection and the "Connection Lost" prompt.
//!
//! The UI never blocks. Repaints are requested every 33ms and additionally by
//! the bridge whenever background work finishes.

pub mod common;
pub mod controller_pad;
pub mod device_dialog;

use chrono::Local;
use eframe::egui::{self, Align2, Button, Context, RichText, TextEdit, Vec2};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::connection::{
    ConnectRequest, ConnectionCoordinator, ConnectionError, CoordinatorEvent, DispatchResult,
};
use crate::session::ConnectionState;

use self::common::{create_frame, state_color, UiColors};
use self::controller_pad::ControllerPad;
use self::device_dialog::{DeviceAction, DeviceDialog};

const FRAME_INTERVAL: Duration = Duration::from_millis(33);

pub struct ProcontrolUI {
    coordinator: ConnectionCoordinator,
    shutdown_timeout: Duration,

    address_input: String,
    payload_path: String,
    status: String,
    error: Option<String>,

    pad: ControllerPad,
    device_dialog: DeviceDialog,
    lost_prompt: Option<Option<String>>,
    first_frame: bool,
}

impl ProcontrolUI {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        coordinator: ConnectionCoordinator,
        shutdown_timeout: Duration,
    ) -> Self {
        cc.egui_ctx.set_theme(egui::Theme::Dark);

        let ctx = cc.egui_ctx.clone();
        coordinator
            .bridge()
            .set_notifier(move || ctx.request_repaint());

        Self {
            coordinator,
            shutdown_timeout,
            address_input: String::new(),
            payload_path: String::new(),
            status: ConnectionState::Idle.to_string(),
            error: None,
            pad: ControllerPad::default(),
            device_dialog: DeviceDialog::default(),
            lost_prompt: None,
            first_frame: true,
        }
    }

    fn connect(&mut self, request: ConnectRequest) {
        match self.coordinator.connect(request) {
            Ok(()) => self.error = None,
            Err(ConnectionError::AddressRequired) => {
                info!("No console selected, opening device selection");
                self.open_device_dialog();
            }
            Err(e) => self.show_error(e.to_string()),
        }
    }

    fn reconnect(&mut self) {
        match self.coordinator.reconnect() {
            Ok(()) => self.error = None,
            Err(ConnectionError::AddressRequired) => self.open_device_dialog(),
            Err(e) => self.show_error(e.to_string()),
        }
    }

    fn open_device_dialog(&mut self) {
        if self.device_dialog.is_open() {
            return;
        }
        self.device_dialog.open();
        self.refresh_devices();
    }

    fn refresh_devices(&mut self) {
        match self.coordinator.refresh_paired_devices() {
            Ok(()) => self.device_dialog.scan_started(),
            Err(e) => self.device_dialog.set_error(e.to_string()),
        }
    }

    fn show_error(&mut self, message: String) {
        warn!("{}", message);
        self.error = Some(message);
    }

    fn handle_events(&mut self) {
        for event in self.coordinator.take_events() {
            debug!("UI event: {:?}", event);
            match event {
                CoordinatorEvent::Connecting { address } => {
                    if let Some(address) = address {
                        self.address_input = address;
                    }
                }
                CoordinatorEvent::Connected { address } => {
                    self.error = None;
                    self.lost_prompt = None;
                    if let Some(address) = address {
                        self.address_input = address;
                    }
                }
                CoordinatorEvent::ConnectFailed { message } => self.show_error(message),
                CoordinatorEvent::Disconnected => {
                    self.pad.release_all();
                    self.address_input.clear();
                }
                CoordinatorEvent::ConnectionLost {
                    last_known_address,
                    ..
                } => {
                    self.pad.release_all();
                    if !self.coordinator.settings().auto_reconnect {
                        self.lost_prompt = Some(last_known_address);
                    }
                }
                CoordinatorEvent::PayloadLoaded { name } => {
                    self.status = format!("Loaded amiibo: {}", name);
                }
                CoordinatorEvent::PayloadEjected => {
                    self.status = "Amiibo ejected".to_string();
                }
                CoordinatorEvent::PayloadFailed { message } => self.show_error(message),
                CoordinatorEvent::PairedDevices(devices) => self.device_dialog.set_devices(devices),
                CoordinatorEvent::DeviceScanFailed { message } => {
                    self.device_dialog.set_error(message)
                }
                CoordinatorEvent::UnpairFinished { address, outcome } => {
                    self.device_dialog.unpair_finished(&address, &outcome);
                    if self.device_dialog.is_open() {
                        self.refresh_devices();
                    }
                }
            }
        }
    }

    fn handle_device_action(&mut self, action: DeviceAction) {
        match action {
            DeviceAction::UseDevice(address) => {
                self.address_input = address.clone();
                self.connect(ConnectRequest::to(address));
            }
            DeviceAction::PairNew => self.connect(ConnectRequest::fresh()),
            DeviceAction::Unpair(address) => {
                if let Err(e) = self.coordinator.unpair(address) {
                    self.device_dialog.set_error(e.to_string());
                }
            }
            DeviceAction::Refresh => self.refresh_devices(),
            DeviceAction::Cancel => debug!("Device selection cancelled"),
        }
    }

    fn render_connection_panel(&mut self, ui: &mut egui::Ui) {
        let state = self.coordinator.session().connection_state();
        ui.horizontal(|ui| {
            ui.colored_label(state_color(state), RichText::new("●").size(18.0));
            ui.label(RichText::new(state.to_string()).strong());
            ui.separator();

            let editable = matches!(state, ConnectionState::Idle | ConnectionState::Lost);
            ui.add_enabled(
                editable,
                TextEdit::singleline(&mut self.address_input)
                    .hint_text("Console address (XX:XX:XX:XX:XX:XX)")
                    .desired_width(220.0),
            );

            match state {
                ConnectionState::Idle | ConnectionState::Lost => {
                    if ui.button("Connect").clicked() {
                        let address = self.address_input.trim().to_string();
                        let request = if address.is_empty() {
                            ConnectRequest::default()
                        } else {
                            ConnectRequest::to(address)
                        };
                        self.connect(request);
                    }
                    if ui.button("Devices").clicked() {
                        self.open_device_dialog();
                    }
                    let can_reconnect = self.coordinator.session().last_known_address().is_some();
                    if ui
                        .add_enabled(can_reconnect, Button::new("Reconnect"))
                        .clicked()
                    {
                        self.reconnect();
                    }
                }
                ConnectionState::Connecting => {
                    ui.spinner();
                    if ui.button("Cancel").clicked() {
                        self.coordinator.disconnect();
                    }
                }
                ConnectionState::Connected => {
                    if ui.button("Disconnect").clicked() {
                        self.coordinator.disconnect();
                    }
                }
            }
        });

        if let Some(error) = &self.error {
            ui.colored_label(UiColors::INACTIVE, error);
        }
    }

    fn render_payload_panel(&mut self, ui: &mut egui::Ui) {
        let connected = self.coordinator.session().is_connected();
        create_frame(UiColors::INNER_BG, UiColors::BORDER).show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.label("Amiibo:");
                match self.coordinator.session().auxiliary_payload_name() {
                    Some(name) => ui.colored_label(UiColors::ACTIVE, name),
                    None => ui.label("none"),
                };
            });
            ui.add_enabled_ui(connected, |ui| {
                ui.horizontal(|ui| {
                    ui.add(
                        TextEdit::singleline(&mut self.payload_path)
                            .hint_text("Path to amiibo dump (.bin)")
                            .desired_width(320.0),
                    );
                    if ui.button("Load").clicked() {
                        let path = self.payload_path.trim().to_string();
                        if path.is_empty() {
                            self.show_error("Select an amiibo file first".to_string());
                        } else if let Err(e) = self.coordinator.load_payload(path) {
                            self.show_error(e.to_string());
                        }
                    }
                    let loaded = self.coordinator.session().auxiliary_payload_name().is_some();
                    if ui.add_enabled(loaded, Button::new("Eject")).clicked() {
                        if let Err(e) = self.coordinator.eject_payload() {
                            self.show_error(e.to_string());
                        }
                    }
                });
            });
        });
    }

    fn render_lost_prompt(&mut self, ctx: &Context) {
        let Some(last_known) = self.lost_prompt.clone() else {
            return;
        };

        let mut answer = None;
        egui::Window::new("Connection Lost")
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                match &last_known {
                    Some(address) => {
                        ui.label(format!("Connection to {} was lost. Reconnect?", address))
                    }
                    None => ui.label("Connection to the console was lost."),
                };
                ui.horizontal(|ui| {
                    if ui.button("Yes").clicked() {
                        answer = Some(true);
                    }
                    if ui.button("No").clicked() {
                        answer = Some(false);
                    }
                });
            });

        match answer {
            Some(true) => {
                self.lost_prompt = None;
                self.reconnect();
            }
            Some(false) => {
                self.lost_prompt = None;
                info!("Reconnect declined");
            }
            None => {}
        }
    }

    fn render_status_bar(&self, ui: &mut egui::Ui) {
        let session = self.coordinator.session();
        ui.horizontal_centered(|ui| {
            ui.label(format!("Controller: {}", self.coordinator.settings().controller_type));
            ui.separator();
            ui.label(format!(
                "Last console: {}",
                session.last_known_address().unwrap_or("-")
            ));
            if let Some(since) = session.connected_since() {
                ui.separator();
                let elapsed = Local::now().signed_duration_since(since);
                ui.label(format!(
                    "Connected for {:02}:{:02}",
                    elapsed.num_minutes(),
                    elapsed.num_seconds() % 60
                ));
            }
            if !self.coordinator.bridge().is_running() {
                ui.separator();
                ui.colored_label(UiColors::INACTIVE, "Background runtime unavailable");
            }
            ui.separator();
            ui.label(&self.status);
        });
    }
}

impl eframe::App for ProcontrolUI {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint_after(FRAME_INTERVAL);

        self.coordinator.poll();
        self.coordinator.tick(Instant::now());
        self.handle_events();

        if self.first_frame {
            self.first_frame = false;
            self.open_device_dialog();
        }

        egui::TopBottomPanel::top("connection_panel")
            .show_separator_line(false)
            .show(ctx, |ui| {
                ui.add_space(4.0);
                self.render_connection_panel(ui);
                ui.add_space(4.0);
            });

        egui::TopBottomPanel::bottom("status_panel")
            .show_separator_line(false)
            .show(ctx, |ui| self.render_status_bar(ui));

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.spacing_mut().item_spacing = Vec2::new(6.0, 6.0);
            let connected = self.coordinator.session().is_connected();
            let events = self
                .pad
                .render(ui, self.coordinator.buttons(), connected);
            for event in events {
                let result = if event.pressed {
                    self.coordinator.press(event.button)
                } else {
                    self.coordinator.release(event.button)
                };
                if result == DispatchResult::SubmitFailed {
                    self.show_error(format!("Error handling button {}", event.button));
                }
            }
            ui.add_space(8.0);
            self.render_payload_panel(ui);
        });

        if let Some(action) = self.device_dialog.render(ctx) {
            self.handle_device_action(action);
        }
        self.render_lost_prompt(ctx);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("Window closed, shutting down");
        if !self.coordinator.shutdown(self.shutdown_timeout) {
            error!(
                "Background runtime did not stop within {:?}",
                self.shutdown_timeout
            );
        }
    }
}
