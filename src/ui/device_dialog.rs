//! Console selection window: paired list, unpair, fresh pairing

use eframe::egui::{self, Align2, Context, RichText, ScrollArea};
use tracing::debug;

use super::common::UiColors;
use crate::device::{PairedDevice, UnpairOutcome};

/// What the user picked in the dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAction {
    UseDevice(String),
    PairNew,
    Unpair(String),
    Refresh,
    Cancel,
}

#[derive(Debug, Default)]
pub struct DeviceDialog {
    open: bool,
    devices: Vec<PairedDevice>,
    selected: Option<usize>,
    scanning: bool,
    confirm_unpair: Option<PairedDevice>,
    message: Option<(String, bool)>,
}

impl DeviceDialog {
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn open(&mut self) {
        self.open = true;
        self.confirm_unpair = None;
    }

    pub fn close(&mut self) {
        self.open = false;
        self.confirm_unpair = None;
    }

    pub fn scan_started(&mut self) {
        self.scanning = true;
        self.message = None;
    }

    pub fn set_devices(&mut self, devices: Vec<PairedDevice>) {
        debug!("Device dialog received {} consoles", devices.len());
        self.scanning = false;
        self.selected = if devices.is_empty() { None } else { Some(0) };
        self.devices = devices;
    }

    pub fn set_error(&mut self, message: String) {
        self.scanning = false;
        self.message = Some((message, true));
    }

    pub fn unpair_finished(&mut self, address: &str, outcome: &UnpairOutcome) {
        let failed = *outcome != UnpairOutcome::Removed;
        let text = if failed {
            outcome.to_string()
        } else {
            format!("{} {}", outcome, address)
        };
        self.message = Some((text, failed));
    }

    pub fn render(&mut self, ctx: &Context) -> Option<DeviceAction> {
        if !self.open {
            return None;
        }

        let mut action = None;
        egui::Window::new("Select Nintendo Switch")
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                if self.scanning {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("Looking for paired consoles...");
                    });
                } else if self.devices.is_empty() {
                    ui.label("No paired Nintendo Switch found.");
                } else {
                    ui.label("Select a paired Nintendo Switch:");
                }

                ScrollArea::vertical().max_height(180.0).show(ui, |ui| {
                    for (index, device) in self.devices.iter().enumerate() {
                        let selected = self.selected == Some(index);
                        if ui.selectable_label(selected, device.to_string()).clicked() {
                            self.selected = Some(index);
                        }
                    }
                });

                if let Some((message, failed)) = &self.message {
                    let color = if *failed {
                        UiColors::INACTIVE
                    } else {
                        UiColors::ACTIVE
                    };
                    ui.colored_label(color, message);
                }
                ui.separator();

                if let Some(device) = self.confirm_unpair.clone() {
                    ui.label(format!(
                        "Remove the pairing with {}? It has to be paired again afterwards.",
                        device
                    ));
                    ui.horizontal(|ui| {
                        if ui.button("Yes").clicked() {
                            action = Some(DeviceAction::Unpair(device.address.clone()));
                            self.confirm_unpair = None;
                        }
                        if ui.button("No").clicked() {
                            self.confirm_unpair = None;
                        }
                    });
                    return;
                }

                let current = self.selected.and_then(|index| self.devices.get(index)).cloned();
                ui.horizontal(|ui| {
                    if ui
                        .add_enabled(current.is_some(), egui::Button::new("Use Selected"))
                        .clicked()
                    {
                        if let Some(device) = &current {
                            action = Some(DeviceAction::UseDevice(device.address.clone()));
                        }
                    }
                    if ui
                        .add_enabled(current.is_some(), egui::Button::new("Unpair"))
                        .clicked()
                    {
                        self.confirm_unpair = current.clone();
                    }
                    if ui.button(RichText::new("Pair New")).clicked() {
                        action = Some(DeviceAction::PairNew);
                    }
                    if ui
                        .add_enabled(!self.scanning, egui::Button::new("Refresh"))
                        .clicked()
                    {
                        action = Some(DeviceAction::Refresh);
                    }
                    if ui.button("Cancel").clicked() {
                        action = Some(DeviceAction::Cancel);
                    }
                });
            });

        if matches!(
            action,
            Some(DeviceAction::UseDevice(_)) | Some(DeviceAction::PairNew) | Some(DeviceAction::Cancel)
        ) {
            self.close();
        }
        action
    }
}
