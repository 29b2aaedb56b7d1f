//! On-screen controller pad
//!
//! Buttons report a press the frame the pointer goes down on them and a release
//! the frame it lets go, so holding a button holds it on the console too.

use eframe::egui::{self, vec2, Button, RichText, Sense, Ui, Vec2};
use std::collections::HashSet;

use super::common::{create_frame, UiColors};
use crate::session::{ButtonId, ButtonState};

const BUTTON_SIZE: Vec2 = Vec2 { x: 56.0, y: 36.0 };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadEvent {
    pub button: ButtonId,
    pub pressed: bool,
}

#[derive(Debug, Default)]
pub struct ControllerPad {
    held: HashSet<ButtonId>,
}

impl ControllerPad {
    /// Pointer holds the pad tracks; cleared whenever the session drops.
    pub fn release_all(&mut self) {
        self.held.clear();
    }

    pub fn render(&mut self, ui: &mut Ui, buttons: &ButtonState, enabled: bool) -> Vec<PadEvent> {
        let mut events = Vec::new();

        create_frame(UiColors::INNER_BG, UiColors::BORDER).show(ui, |ui| {
            ui.add_enabled_ui(enabled, |ui| {
                ui.horizontal(|ui| {
                    self.row(
                        ui,
                        buttons,
                        &[ButtonId::Zl, ButtonId::L, ButtonId::Minus, ButtonId::Capture],
                        &mut events,
                    );
                    ui.add_space(40.0);
                    self.row(
                        ui,
                        buttons,
                        &[ButtonId::Home, ButtonId::Plus, ButtonId::R, ButtonId::Zr],
                        &mut events,
                    );
                });
                ui.add_space(8.0);

                ui.horizontal(|ui| {
                    self.cluster(
                        ui,
                        buttons,
                        [ButtonId::Up, ButtonId::Left, ButtonId::Right, ButtonId::Down],
                        &mut events,
                    );
                    ui.add_space(40.0);
                    self.cluster(
                        ui,
                        buttons,
                        [ButtonId::X, ButtonId::Y, ButtonId::A, ButtonId::B],
                        &mut events,
                    );
                });
                ui.add_space(8.0);

                ui.horizontal(|ui| {
                    self.row(ui, buttons, &[ButtonId::LStick, ButtonId::RStick], &mut events);
                });
            });
        });

        if !enabled {
            self.held.clear();
        }
        events
    }

    fn row(
        &mut self,
        ui: &mut Ui,
        buttons: &ButtonState,
        row: &[ButtonId],
        events: &mut Vec<PadEvent>,
    ) {
        for button in row {
            self.button(ui, buttons, *button, events);
        }
    }

    /// Diamond: top, left/right, bottom
    fn cluster(
        &mut self,
        ui: &mut Ui,
        buttons: &ButtonState,
        [top, left, right, bottom]: [ButtonId; 4],
        events: &mut Vec<PadEvent>,
    ) {
        ui.vertical(|ui| {
            ui.horizontal(|ui| {
                ui.add_space(BUTTON_SIZE.x + ui.spacing().item_spacing.x);
                self.button(ui, buttons, top, events);
            });
            ui.horizontal(|ui| {
                self.button(ui, buttons, left, events);
                ui.add_space(BUTTON_SIZE.x + ui.spacing().item_spacing.x);
                self.button(ui, buttons, right, events);
            });
            ui.horizontal(|ui| {
                ui.add_space(BUTTON_SIZE.x + ui.spacing().item_spacing.x);
                self.button(ui, buttons, bottom, events);
            });
        });
    }

    fn button(
        &mut self,
        ui: &mut Ui,
        buttons: &ButtonState,
        button: ButtonId,
        events: &mut Vec<PadEvent>,
    ) {
        let fill = if buttons.is_pressed(button) {
            UiColors::PRESSED
        } else {
            UiColors::EXTREME_BG
        };
        let widget = Button::new(RichText::new(button.label()).strong())
            .min_size(vec2(BUTTON_SIZE.x, BUTTON_SIZE.y))
            .fill(fill)
            .sense(Sense::click_and_drag());
        let response = ui.add(widget);

        let down = response.is_pointer_button_down_on();
        let was_down = self.held.contains(&button);
        if down && !was_down {
            self.held.insert(button);
            events.push(PadEvent {
                button,
                pressed: true,
            });
        } else if !down && was_down {
            self.held.remove(&button);
            events.push(PadEvent {
                button,
                pressed: false,
            });
        }

        response.on_hover_cursor(egui::CursorIcon::PointingHand);
    }
}
