//! # UI Common Components
//!
//! Fixed dark palette and small helpers shared by the panels.

use eframe::egui::{Color32, Frame, Stroke};

use crate::session::ConnectionState;

/// Dark theme palette.
///
/// ## Color Hierarchy
/// - **Background Colors**: EXTREME_BG → INNER_BG → MAIN_BG (darkest to lightest)
/// - **Status Colors**: ACTIVE (green) connected, PENDING (amber) connecting,
///   INACTIVE (red) disconnected or lost
/// - **Structural Colors**: BORDER for component separation, PRESSED for held buttons
pub struct UiColors;

impl UiColors {
    pub const MAIN_BG: Color32 = Color32::from_rgb(30, 30, 30);

    pub const INNER_BG: Color32 = Color32::from_rgb(25, 25, 25);

    pub const EXTREME_BG: Color32 = Color32::from_rgb(20, 20, 20);

    pub const BORDER: Color32 = Color32::from_rgb(60, 60, 60);

    pub const ACTIVE: Color32 = Color32::from_rgb(50, 200, 20);

    pub const PENDING: Color32 = Color32::from_rgb(220, 170, 30);

    pub const INACTIVE: Color32 = Color32::from_rgb(200, 50, 20);

    /// Fill of a button while it is held down
    pub const PRESSED: Color32 = Color32::from_rgb(70, 110, 200);
}

/// Status color for a connection state
pub fn state_color(state: ConnectionState) -> Color32 {
    match state {
        ConnectionState::Connected => UiColors::ACTIVE,
        ConnectionState::Connecting => UiColors::PENDING,
        ConnectionState::Idle | ConnectionState::Lost => UiColors::INACTIVE,
    }
}

/// Bordered frame used around every panel.
pub fn create_frame(bg_color: Color32, border_color: Color32) -> Frame {
    Frame::new()
        .stroke(Stroke::new(1.0, border_color))
        .fill(bg_color)
        .inner_margin(6)
        .outer_margin(2)
}
