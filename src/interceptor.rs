//! Decision logic for keyboard events seen by the global hook.

use crate::chord::Keybinds;
use crate::native::Modifiers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTransition {
    Down,
    Up,
}

/// A key event as delivered by the global hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub vk_code: u32,
    pub transition: KeyTransition,
    /// Synthesised by software (`SendInput`, remapping tools) rather than
    /// typed on a keyboard.
    pub injected: bool,
}

impl KeyEvent {
    pub fn down(vk_code: u32) -> Self {
        Self {
            vk_code,
            transition: KeyTransition::Down,
            injected: false,
        }
    }

    pub fn up(vk_code: u32) -> Self {
        Self {
            vk_code,
            transition: KeyTransition::Up,
            injected: false,
        }
    }

    pub fn injected(mut self) -> Self {
        self.injected = true;
        self
    }
}

/// Which configured chords an event matched. Both may be set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChordHits {
    pub input: bool,
    pub visibility: bool,
}

impl ChordHits {
    pub fn any(&self) -> bool {
        self.input || self.visibility
    }
}

/// What the hook knows when an event arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookContext {
    pub host_focused: bool,
    pub overlay_enabled: bool,
    /// Drop events synthesised by other software.
    pub ignore_injected: bool,
}

impl HookContext {
    /// Global toggles only apply while the user is working in another window.
    pub fn accepts_global_toggles(&self) -> bool {
        self.overlay_enabled && !self.host_focused
    }
}

/// Match `vk_code` plus live modifiers against both chords.
pub fn match_chords(vk_code: u32, modifiers: Modifiers, keybinds: &Keybinds) -> ChordHits {
    ChordHits {
        input: keybinds
            .input
            .is_some_and(|chord| chord.matches(vk_code, modifiers)),
        visibility: keybinds
            .visibility
            .is_some_and(|chord| chord.matches(vk_code, modifiers)),
    }
}

/// Full per-event decision. Modifiers are read through `modifiers` only
/// once the event is known to be relevant.
pub fn evaluate(
    event: KeyEvent,
    context: HookContext,
    keybinds: &Keybinds,
    modifiers: impl FnOnce() -> Modifiers,
) -> ChordHits {
    if event.transition != KeyTransition::Down || !context.accepts_global_toggles() {
        return ChordHits::default();
    }
    if event.injected && context.ignore_injected {
        return ChordHits::default();
    }
    match_chords(event.vk_code, modifiers(), keybinds)
}
