//! Presentation surfaces
//!
//! A [`ToggleSurface`] is the presentation sink of a replica: it is told
//! the value every time it changes. The input side is the node handle's
//! `request_toggle`.

use std::io::IsTerminal;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Placeholder technique reported when the configured one failed to load
pub const ERROR_TECHNIQUE: &str = "internal-error";

/// Presentation sink
pub trait ToggleSurface: Send {
    fn render(&mut self, armed: bool);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const RED: Color = Color::rgb(255, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }
}

/// Colors for the two values
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub off: Color,
    pub on: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Palette {
            off: Color::WHITE,
            on: Color::RED,
        }
    }
}

impl Palette {
    pub fn color_for(&self, armed: bool) -> Color {
        if armed {
            self.on
        } else {
            self.off
        }
    }
}

/// Swap in the first available rendering technique
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TechniqueFallback {
    /// Replace the current technique even when it works
    pub force: bool,
    /// Candidates in preference order
    pub candidates: Vec<String>,
}

impl Default for TechniqueFallback {
    fn default() -> Self {
        TechniqueFallback {
            force: true,
            candidates: vec!["ansi".to_string(), "plain".to_string()],
        }
    }
}

impl TechniqueFallback {
    pub fn needs_fix(&self, current: Option<&str>) -> bool {
        self.force || matches!(current, None | Some(ERROR_TECHNIQUE))
    }

    /// Pick the technique to use; keeps `current` if no candidate is available
    pub fn resolve(&self, current: Option<&str>, available: impl Fn(&str) -> bool) -> Option<String> {
        if !self.needs_fix(current) {
            return current.map(str::to_string);
        }

        self.candidates
            .iter()
            .find(|name| available(name))
            .cloned()
            .or_else(|| current.map(str::to_string))
    }
}

/// Console rendering technique
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Technique {
    Ansi,
    Plain,
}

impl Technique {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ansi" => Some(Technique::Ansi),
            "plain" => Some(Technique::Plain),
            _ => None,
        }
    }

    /// Whether the technique can be used on this process's stdout
    pub fn is_available(name: &str) -> bool {
        match Technique::from_name(name) {
            Some(Technique::Ansi) => {
                std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
            }
            Some(Technique::Plain) => true,
            None => false,
        }
    }
}

/// Prints the value of one peer to stdout
pub struct ConsoleSurface {
    label: String,
    palette: Palette,
    technique: Technique,
}

impl ConsoleSurface {
    pub fn new(label: impl Into<String>, palette: Palette, fallback: &TechniqueFallback) -> Self {
        let technique = fallback
            .resolve(None, Technique::is_available)
            .and_then(|name| Technique::from_name(&name))
            .unwrap_or(Technique::Plain);

        ConsoleSurface::with_technique(label, palette, technique)
    }

    pub fn with_technique(label: impl Into<String>, palette: Palette, technique: Technique) -> Self {
        ConsoleSurface {
            label: label.into(),
            palette,
            technique,
        }
    }

    pub fn technique(&self) -> Technique {
        self.technique
    }

    pub fn line(&self, armed: bool) -> String {
        let text = if armed { "ARMED" } else { "disarmed" };
        match self.technique {
            Technique::Plain => format!("[{}] {}", self.label, text),
            Technique::Ansi => {
                let c = self.palette.color_for(armed);
                format!(
                    "[{}] \x1b[38;2;{};{};{}m{}\x1b[0m",
                    self.label, c.r, c.g, c.b, text
                )
            }
        }
    }
}

impl ToggleSurface for ConsoleSurface {
    fn render(&mut self, armed: bool) {
        println!("{}", self.line(armed));
    }
}

/// Keeps every rendered value; shared so tests can inspect it
#[derive(Clone, Default)]
pub struct RecordingSurface {
    renders: Arc<Mutex<Vec<bool>>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        RecordingSurface::default()
    }

    pub fn renders(&self) -> Vec<bool> {
        self.renders.lock().clone()
    }

    pub fn last(&self) -> Option<bool> {
        self.renders.lock().last().copied()
    }
}

impl ToggleSurface for RecordingSurface {
    fn render(&mut self, armed: bool) {
        self.renders.lock().push(armed);
    }
}
