//! Host key identifiers and their Win32 virtual-key equivalents.
//!
//! Host keycodes follow the engine numbering used by the host application:
//! printable keys are their upper-case ASCII value, special keys carry the
//! [`SPECIAL`] bit.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Bit set on every non-printable host keycode.
pub const SPECIAL: u32 = 1 << 22;

pub const ESCAPE: u32 = SPECIAL | 0x01;
pub const TAB: u32 = SPECIAL | 0x02;
pub const BACKSPACE: u32 = SPECIAL | 0x04;
pub const ENTER: u32 = SPECIAL | 0x05;
pub const F1: u32 = SPECIAL | 0x1C;
pub const F2: u32 = SPECIAL | 0x1D;
pub const F3: u32 = SPECIAL | 0x1E;
pub const F4: u32 = SPECIAL | 0x1F;
pub const F5: u32 = SPECIAL | 0x20;
pub const F6: u32 = SPECIAL | 0x21;
pub const F7: u32 = SPECIAL | 0x22;
pub const F8: u32 = SPECIAL | 0x23;
pub const F9: u32 = SPECIAL | 0x24;
pub const F10: u32 = SPECIAL | 0x25;
pub const F11: u32 = SPECIAL | 0x26;
pub const F12: u32 = SPECIAL | 0x27;
pub const SPACE: u32 = 0x20;

const F_KEYS: [u32; 12] = [F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12];

/// Win32 virtual-key codes used by the table.
pub mod vk {
    pub const BACK: u32 = 0x08;
    pub const TAB: u32 = 0x09;
    pub const RETURN: u32 = 0x0D;
    pub const ESCAPE: u32 = 0x1B;
    pub const SPACE: u32 = 0x20;
    pub const F1: u32 = 0x70;
}

static KEYCODE_MAP: Lazy<HashMap<u32, u32>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert(ESCAPE, vk::ESCAPE);
    map.insert(TAB, vk::TAB);
    map.insert(ENTER, vk::RETURN);
    map.insert(BACKSPACE, vk::BACK);
    map.insert(SPACE, vk::SPACE);
    for (i, key) in F_KEYS.iter().enumerate() {
        map.insert(*key, vk::F1 + i as u32);
    }
    for c in b'A'..=b'Z' {
        map.insert(c as u32, c as u32);
    }
    for c in b'0'..=b'9' {
        map.insert(c as u32, c as u32);
    }
    map
});

/// Translate a host keycode to a virtual-key code.
///
/// Codes missing from the table are returned unchanged so that keys added
/// by newer hosts still have a chance to match.
pub fn translate(host_keycode: u32) -> u32 {
    KEYCODE_MAP
        .get(&host_keycode)
        .copied()
        .unwrap_or(host_keycode)
}

/// Look up a host keycode by its name (`"I"`, `"F5"`, `"Escape"`, ...).
pub fn from_name(name: &str) -> Option<u32> {
    let upper = name.trim().to_ascii_uppercase();
    match upper.as_str() {
        "ESC" | "ESCAPE" => Some(ESCAPE),
        "TAB" => Some(TAB),
        "ENTER" | "RETURN" => Some(ENTER),
        "BACKSPACE" => Some(BACKSPACE),
        "SPACE" => Some(SPACE),
        _ if upper.len() > 1 && upper.starts_with('F') => match upper[1..].parse::<usize>() {
            Ok(n @ 1..=12) => Some(F_KEYS[n - 1]),
            _ => None,
        },
        _ if upper.len() == 1 => {
            let c = upper.chars().next()?;
            c.is_ascii_alphanumeric().then_some(c as u32)
        }
        _ => None,
    }
}

/// Display name for a host keycode, if it is one the table knows about.
pub fn name(host_keycode: u32) -> Option<String> {
    match host_keycode {
        ESCAPE => Some("Escape".into()),
        TAB => Some("Tab".into()),
        ENTER => Some("Enter".into()),
        BACKSPACE => Some("Backspace".into()),
        SPACE => Some("Space".into()),
        code if F_KEYS.contains(&code) => Some(format!("F{}", code - F1 + 1)),
        code => char::from_u32(code)
            .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
            .map(String::from),
    }
}
