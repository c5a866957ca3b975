use crate::keycode;
use crate::native::Modifiers;
use std::fmt;

/// A host keycode plus the modifier keys that must be held with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyChord {
    pub keycode: u32,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl KeyChord {
    pub fn new(keycode: u32) -> Self {
        Self {
            keycode,
            ctrl: false,
            shift: false,
            alt: false,
        }
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn with_alt(mut self) -> Self {
        self.alt = true;
        self
    }

    /// Virtual-key code the chord's key translates to.
    pub fn native_keycode(&self) -> u32 {
        keycode::translate(self.keycode)
    }

    /// Exact match: the key and all three modifier states must agree.
    pub fn matches(&self, vk_code: u32, modifiers: Modifiers) -> bool {
        self.native_keycode() == vk_code
            && self.ctrl == modifiers.ctrl
            && self.shift == modifiers.shift
            && self.alt == modifiers.alt
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            write!(f, "Ctrl+")?;
        }
        if self.shift {
            write!(f, "Shift+")?;
        }
        if self.alt {
            write!(f, "Alt+")?;
        }
        match keycode::name(self.keycode) {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "#{}", self.keycode),
        }
    }
}

/// Parse a chord string like "Ctrl+Shift+F5" into a [`KeyChord`].
pub fn parse_chord(s: &str) -> Option<KeyChord> {
    let mut ctrl = false;
    let mut shift = false;
    let mut alt = false;
    let mut key: Option<u32> = None;

    for part in s.split('+') {
        let upper = part.trim().to_ascii_uppercase();
        match upper.as_str() {
            "CTRL" | "CONTROL" => ctrl = true,
            "SHIFT" => shift = true,
            "ALT" => alt = true,
            "" => {}
            _ => {
                if key.is_some() {
                    return None;
                }
                key = Some(keycode::from_name(&upper)?);
            }
        }
    }

    key.map(|keycode| KeyChord {
        keycode,
        ctrl,
        shift,
        alt,
    })
}

/// The two chords the controller reacts to. `None` means unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Keybinds {
    pub input: Option<KeyChord>,
    pub visibility: Option<KeyChord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_combo() {
        let chord = parse_chord("Ctrl+Shift+F5").expect("should parse");
        assert_eq!(chord.keycode, keycode::F5);
        assert!(chord.ctrl && chord.shift && !chord.alt);
    }

    #[test]
    fn parse_rejects_unknown_and_missing_keys() {
        assert!(parse_chord("Ctrl+Foo").is_none());
        assert!(parse_chord("Ctrl+Shift").is_none());
        assert!(parse_chord("A+B").is_none());
    }

    #[test]
    fn display_matches_parse_input() {
        let chord = KeyChord::new('I' as u32).with_ctrl().with_alt();
        assert_eq!(chord.to_string(), "Ctrl+Alt+I");
        assert_eq!(parse_chord(&chord.to_string()), Some(chord));
    }

    #[test]
    fn match_requires_exact_modifiers() {
        let chord = KeyChord::new('I' as u32).with_ctrl();
        let ctrl = Modifiers {
            ctrl: true,
            ..Default::default()
        };
        assert!(chord.matches(0x49, ctrl));
        assert!(!chord.matches(0x49, Modifiers::default()));
        assert!(!chord.matches(
            0x49,
            Modifiers {
                ctrl: true,
                shift: true,
                alt: false
            }
        ));
        assert!(!chord.matches(0x4A, ctrl));
    }
}
