use std::collections::HashMap;
use std::fmt;

// Button identifiers of the emulated Pro Controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonId {
    A,
    B,
    X,
    Y,
    Up,
    Down,
    Left,
    Right,
    L,
    R,
    Zl,
    Zr,
    Minus,
    Plus,
    Home,
    Capture,
    LStick,
    RStick,
}

impl ButtonId {
    pub const ALL: [ButtonId; 18] = [
        ButtonId::A,
        ButtonId::B,
        ButtonId::X,
        ButtonId::Y,
        ButtonId::Up,
        ButtonId::Down,
        ButtonId::Left,
        ButtonId::Right,
        ButtonId::L,
        ButtonId::R,
        ButtonId::Zl,
        ButtonId::Zr,
        ButtonId::Minus,
        ButtonId::Plus,
        ButtonId::Home,
        ButtonId::Capture,
        ButtonId::LStick,
        ButtonId::RStick,
    ];

    /// Name of the button as the controller state expects it in press/release events.
    pub fn as_str(&self) -> &'static str {
        match self {
            ButtonId::A => "a",
            ButtonId::B => "b",
            ButtonId::X => "x",
            ButtonId::Y => "y",
            ButtonId::Up => "up",
            ButtonId::Down => "down",
            ButtonId::Left => "left",
            ButtonId::Right => "right",
            ButtonId::L => "l",
            ButtonId::R => "r",
            ButtonId::Zl => "zl",
            ButtonId::Zr => "zr",
            ButtonId::Minus => "minus",
            ButtonId::Plus => "plus",
            ButtonId::Home => "home",
            ButtonId::Capture => "capture",
            ButtonId::LStick => "l_stick",
            ButtonId::RStick => "r_stick",
        }
    }

    /// Short label used on the on-screen pad.
    pub fn label(&self) -> &'static str {
        match self {
            ButtonId::A => "A",
            ButtonId::B => "B",
            ButtonId::X => "X",
            ButtonId::Y => "Y",
            ButtonId::Up => "⬆",
            ButtonId::Down => "⬇",
            ButtonId::Left => "⬅",
            ButtonId::Right => "➡",
            ButtonId::L => "L",
            ButtonId::R => "R",
            ButtonId::Zl => "ZL",
            ButtonId::Zr => "ZR",
            ButtonId::Minus => "−",
            ButtonId::Plus => "+",
            ButtonId::Home => "HOME",
            ButtonId::Capture => "◻",
            ButtonId::LStick => "L3",
            ButtonId::RStick => "R3",
        }
    }
}

impl fmt::Display for ButtonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last known pressed/released value of every controller button.
///
/// The key set is fixed to [`ButtonId::ALL`]; nothing is ever inserted or
/// removed after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonState {
    pressed: HashMap<ButtonId, bool>,
}

impl Default for ButtonState {
    fn default() -> Self {
        Self {
            pressed: ButtonId::ALL.iter().map(|id| (*id, false)).collect(),
        }
    }
}

impl ButtonState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, button: ButtonId, pressed: bool) {
        self.pressed.insert(button, pressed);
    }

    pub fn is_pressed(&self, button: ButtonId) -> bool {
        self.pressed.get(&button).copied().unwrap_or(false)
    }

    /// Currently pressed buttons, in [`ButtonId::ALL`] order.
    pub fn pressed(&self) -> Vec<ButtonId> {
        ButtonId::ALL
            .iter()
            .copied()
            .filter(|id| self.is_pressed(*id))
            .collect()
    }

    pub fn all_released(&self) -> bool {
        self.pressed.values().all(|pressed| !pressed)
    }

    pub fn reset(&mut self) {
        for pressed in self.pressed.values_mut() {
            *pressed = false;
        }
    }

    pub fn len(&self) -> usize {
        self.pressed.len()
    }
}
