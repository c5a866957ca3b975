use crate::chord::{parse_chord, KeyChord, Keybinds};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Title used to find the host window when its id is not a native handle.
    #[serde(default = "default_window_title")]
    pub window_title: String,
    /// Chord toggling input passthrough, e.g. `"Ctrl+I"`.
    #[serde(default)]
    pub input_hotkey: Option<String>,
    /// Chord toggling visibility.
    #[serde(default)]
    pub visibility_hotkey: Option<String>,
    /// Install the system-wide keyboard hook. Without it the hotkeys only
    /// work while the host window has focus.
    #[serde(default = "default_true")]
    pub enable_global_hook: bool,
    /// Show the window again when the overlay is disabled.
    #[serde(default = "default_true")]
    pub reset_visibility_on_disable: bool,
    /// Ignore keys synthesised by other software (macro tools, remappers).
    #[serde(default)]
    pub ignore_injected_keys: bool,
    #[serde(default)]
    pub debug_logging: bool,
}

fn default_window_title() -> String {
    "Godot".into()
}

fn default_true() -> bool {
    true
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            window_title: default_window_title(),
            input_hotkey: None,
            visibility_hotkey: None,
            enable_global_hook: true,
            reset_visibility_on_disable: true,
            ignore_injected_keys: false,
            debug_logging: false,
        }
    }
}

impl OverlayConfig {
    /// Load settings from `path`. A missing or empty file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).unwrap_or_default();
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse overlay config {}", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write overlay config {}", path.display()))
    }

    pub fn keybinds(&self) -> Keybinds {
        Keybinds {
            input: chord_setting("input_hotkey", self.input_hotkey.as_deref()),
            visibility: chord_setting("visibility_hotkey", self.visibility_hotkey.as_deref()),
        }
    }
}

fn chord_setting(field: &str, value: Option<&str>) -> Option<KeyChord> {
    let value = value?;
    let chord = parse_chord(value);
    if chord.is_none() {
        tracing::warn!(field, value, "invalid hotkey string; leaving it unset");
    }
    chord
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let cfg: OverlayConfig = serde_json::from_str(r#"{"input_hotkey":"Ctrl+I"}"#).unwrap();
        assert_eq!(cfg.window_title, "Godot");
        assert!(cfg.enable_global_hook);
        assert!(cfg.reset_visibility_on_disable);
        assert!(!cfg.ignore_injected_keys);
        assert_eq!(
            cfg.keybinds().input,
            Some(KeyChord::new('I' as u32).with_ctrl())
        );
        assert_eq!(cfg.keybinds().visibility, None);
    }

    #[test]
    fn invalid_hotkey_is_left_unset() {
        let cfg = OverlayConfig {
            visibility_hotkey: Some("Ctrl+Nope".into()),
            ..Default::default()
        };
        assert_eq!(cfg.keybinds(), Keybinds::default());
    }
}
