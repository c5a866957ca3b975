//! Host-facing overlay controller.
//!
//! [`OverlayController`] is what a host application holds. It resolves the
//! host window, drives the [`OverlayMachine`], owns the global keyboard hook
//! and runs the per-frame hotkey poll. Every operation logs its failures and
//! returns normally.

use crate::chord::{KeyChord, Keybinds};
use crate::config::OverlayConfig;
use crate::error::OverlayError;
use crate::hook::{self, HookBackend, HookId, KeySink};
use crate::interceptor::{self, HookContext, KeyEvent};
use crate::native::{self, ModifierProbe, WindowPort};
use crate::resolver;
use crate::state::{OverlayMachine, OverlayState, StateCell};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Action the host reports when the input chord was pressed this frame.
pub const INPUT_TOGGLE_ACTION: &str = "overlay_toggle_input";
/// Action the host reports when the visibility chord was pressed this frame.
pub const VISIBILITY_TOGGLE_ACTION: &str = "overlay_toggle_visibility";

/// How long a host-thread call waits for a transition running on the hook
/// thread. The hook thread's native calls may need the host thread to pump
/// messages, so the host never waits indefinitely.
const HOST_LOCK_WAIT: Duration = Duration::from_millis(50);

/// What the controller needs from the host application.
pub trait HostWindow {
    /// The host's identifier for its main window; `0` when unknown.
    fn native_window_id(&self) -> i64;
    /// Whether `action` was pressed during the current frame.
    fn is_action_just_pressed(&self, action: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Host,
    FramePoll,
    GlobalHook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Toggle {
    Passthrough,
    Visibility,
}

impl Toggle {
    fn operation(self) -> &'static str {
        match self {
            Toggle::Passthrough => "toggle_input_passthrough",
            Toggle::Visibility => "toggle_visibility",
        }
    }

    fn apply(self, machine: &mut OverlayMachine, port: &dyn WindowPort) -> Result<(), OverlayError> {
        match self {
            Toggle::Passthrough => machine.toggle_passthrough(port),
            Toggle::Visibility => machine.toggle_visibility(port),
        }
    }
}

/// Toggles that found the state lock taken. Each flag holds the parity of
/// the missed presses, so two missed presses of one chord cancel out.
#[derive(Debug, Default)]
struct PendingToggles {
    passthrough: AtomicBool,
    visibility: AtomicBool,
}

impl PendingToggles {
    fn flag(&self, toggle: Toggle) -> &AtomicBool {
        match toggle {
            Toggle::Passthrough => &self.passthrough,
            Toggle::Visibility => &self.visibility,
        }
    }

    fn queue(&self, toggle: Toggle) {
        self.flag(toggle).fetch_xor(true, Ordering::AcqRel);
    }

    fn take(&self, toggle: Toggle) -> bool {
        self.flag(toggle).swap(false, Ordering::AcqRel)
    }

    fn any(&self) -> bool {
        self.passthrough.load(Ordering::Acquire) || self.visibility.load(Ordering::Acquire)
    }
}

struct Shared {
    machine: Mutex<OverlayMachine>,
    cell: StateCell,
    keybinds: Mutex<Keybinds>,
    port: Arc<dyn WindowPort>,
    probe: Arc<dyn ModifierProbe>,
    pending: PendingToggles,
    ignore_injected: bool,
    closing: AtomicBool,
}

impl Shared {
    fn lock_machine(
        &self,
        origin: Origin,
        operation: &'static str,
    ) -> Result<MutexGuard<'_, OverlayMachine>, OverlayError> {
        let guard = match origin {
            Origin::GlobalHook => self.machine.try_lock(),
            Origin::Host | Origin::FramePoll => self.machine.try_lock_for(HOST_LOCK_WAIT),
        };
        guard.ok_or(OverlayError::Busy { operation })
    }

    /// Run a guarded transition, replay any queued toggles and publish the
    /// resulting state.
    fn transition(
        &self,
        origin: Origin,
        operation: &'static str,
        f: impl FnOnce(&mut OverlayMachine, &dyn WindowPort) -> Result<(), OverlayError>,
    ) -> Result<(), OverlayError> {
        let result = self.lock_machine(origin, operation).and_then(|mut machine| {
            let result = f(&mut machine, self.port.as_ref());
            self.replay_pending(&mut machine);
            self.cell.publish(&machine);
            result
        });
        log_outcome(origin, operation, &result);
        result
    }

    fn replay_pending(&self, machine: &mut OverlayMachine) {
        for toggle in [Toggle::Passthrough, Toggle::Visibility] {
            if self.pending.take(toggle) {
                let result = toggle.apply(machine, self.port.as_ref());
                log_outcome(Origin::GlobalHook, toggle.operation(), &result);
            }
        }
    }

    /// A toggle that cannot get the lock is queued for the next transition
    /// or frame poll instead of being lost.
    fn toggle(&self, origin: Origin, toggle: Toggle) {
        let result = self.transition(origin, toggle.operation(), |machine, port| {
            toggle.apply(machine, port)
        });
        if let Err(OverlayError::Busy { .. }) = result {
            self.pending.queue(toggle);
            info!(?origin, ?toggle, "toggle queued for replay");
        }
    }

    fn keybinds(&self) -> Keybinds {
        *self.keybinds.lock()
    }

    fn host_focused(&self) -> bool {
        match self.cell.window() {
            Some(window) => self.port.foreground_window() == Some(window),
            None => false,
        }
    }
}

impl KeySink for Shared {
    fn on_key_event(&self, event: KeyEvent) {
        if self.closing.load(Ordering::Acquire) {
            return;
        }
        let context = HookContext {
            host_focused: self.host_focused(),
            overlay_enabled: self.cell.load().overlay_enabled,
            ignore_injected: self.ignore_injected,
        };
        let hits = interceptor::evaluate(event, context, &self.keybinds(), || {
            self.probe.modifiers()
        });
        if !hits.any() {
            return;
        }

        debug!(vk = event.vk_code, ?hits, "global hotkey matched");
        if hits.input {
            self.toggle(Origin::GlobalHook, Toggle::Passthrough);
        }
        if hits.visibility {
            self.toggle(Origin::GlobalHook, Toggle::Visibility);
        }
    }
}

fn log_outcome(origin: Origin, operation: &'static str, result: &Result<(), OverlayError>) {
    match result {
        Ok(()) => debug!(?origin, operation, "transition applied"),
        Err(err @ (OverlayError::GuardViolation { .. } | OverlayError::MissingHandle { .. })) => {
            warn!(?origin, %err, "transition rejected")
        }
        Err(err @ OverlayError::Busy { .. }) => warn!(?origin, %err, "transition skipped"),
        Err(err) => error!(?origin, %err, "transition failed"),
    }
}

struct InstalledHook {
    id: HookId,
    backend: Box<dyn HookBackend>,
}

pub struct OverlayController {
    shared: Arc<Shared>,
    host: Box<dyn HostWindow>,
    window_title: Mutex<String>,
    hook: Option<InstalledHook>,
}

impl OverlayController {
    /// Controller for the current platform with default settings.
    pub fn new(host: Box<dyn HostWindow>) -> Self {
        Self::from_config(host, &OverlayConfig::default())
    }

    pub fn from_config(host: Box<dyn HostWindow>, config: &OverlayConfig) -> Self {
        let backend = config.enable_global_hook.then(hook::default_backend);
        Self::new_with_backends(
            host,
            native::default_window_port(),
            native::default_modifier_probe(),
            backend,
            config,
        )
    }

    /// Build a controller on explicit native seams. `hook_backend` of `None`
    /// leaves only the focused per-frame poll active.
    pub fn new_with_backends(
        host: Box<dyn HostWindow>,
        port: Arc<dyn WindowPort>,
        probe: Arc<dyn ModifierProbe>,
        hook_backend: Option<Box<dyn HookBackend>>,
        config: &OverlayConfig,
    ) -> Self {
        let shared = Arc::new(Shared {
            machine: Mutex::new(OverlayMachine::new(config.reset_visibility_on_disable)),
            cell: StateCell::default(),
            keybinds: Mutex::new(config.keybinds()),
            port,
            probe,
            pending: PendingToggles::default(),
            ignore_injected: config.ignore_injected_keys,
            closing: AtomicBool::new(false),
        });

        let hook = hook_backend.and_then(|backend| install_hook(&shared, backend));
        info!(
            global_hook = hook.is_some(),
            title = %config.window_title,
            "overlay controller created"
        );

        Self {
            shared,
            host,
            window_title: Mutex::new(config.window_title.clone()),
            hook,
        }
    }

    pub fn enable_overlay(&self) {
        let title = self.window_title.lock().clone();
        let window_id = self.host.native_window_id();
        let port = Arc::clone(&self.shared.port);
        let _ = self
            .shared
            .transition(Origin::Host, "enable_overlay", |machine, _| {
                let resolved = resolver::resolve(port.as_ref(), window_id, &title)?;
                machine.enable(port.as_ref(), resolved.window);
                Ok(())
            });
    }

    pub fn enable_overlay_with_title(&self, title: &str) {
        *self.window_title.lock() = title.to_string();
        self.enable_overlay();
    }

    pub fn disable_overlay(&self) {
        let _ = self
            .shared
            .transition(Origin::Host, "disable_overlay", |machine, port| {
                machine.disable(port).map(|_| ())
            });
    }

    pub fn enable_input_passthrough(&self) {
        let _ = self
            .shared
            .transition(Origin::Host, "enable_input_passthrough", |machine, port| {
                machine.set_passthrough(port, true)
            });
    }

    pub fn disable_input_passthrough(&self) {
        let _ = self
            .shared
            .transition(Origin::Host, "disable_input_passthrough", |machine, port| {
                machine.set_passthrough(port, false)
            });
    }

    pub fn enable_visibility(&self) {
        let _ = self
            .shared
            .transition(Origin::Host, "enable_visibility", |machine, port| {
                machine.set_visibility(port, true)
            });
    }

    pub fn disable_visibility(&self) {
        let _ = self
            .shared
            .transition(Origin::Host, "disable_visibility", |machine, port| {
                machine.set_visibility(port, false)
            });
    }

    pub fn set_input_keybind(&self, chord: Option<KeyChord>) {
        self.shared.keybinds.lock().input = chord;
        info!(chord = ?chord.map(|c| c.to_string()), "input keybind set");
    }

    pub fn get_input_keybind(&self) -> Option<KeyChord> {
        self.shared.keybinds().input
    }

    pub fn set_visibility_keybind(&self, chord: Option<KeyChord>) {
        self.shared.keybinds.lock().visibility = chord;
        info!(chord = ?chord.map(|c| c.to_string()), "visibility keybind set");
    }

    pub fn get_visibility_keybind(&self) -> Option<KeyChord> {
        self.shared.keybinds().visibility
    }

    pub fn get_is_overlay_enabled(&self) -> bool {
        self.snapshot().overlay_enabled
    }

    pub fn get_is_input_passthrough_enabled(&self) -> bool {
        self.snapshot().passthrough_enabled
    }

    pub fn get_is_visibility_enabled(&self) -> bool {
        self.snapshot().visible
    }

    /// All three flags read together.
    pub fn snapshot(&self) -> OverlayState {
        self.shared.cell.load()
    }

    pub fn has_global_hook(&self) -> bool {
        self.hook.is_some()
    }

    /// Per-frame hotkey check for when the host window has focus. The host
    /// only reports actions for its own focused window, so this never fires
    /// for the same key press as the global hook.
    ///
    /// Global toggles that were queued while the state lock was held are
    /// replayed here at the latest.
    pub fn process(&self, delta: f64) {
        if self.shared.pending.any() {
            let _ = self
                .shared
                .transition(Origin::FramePoll, "replay_queued_toggles", |_, _| Ok(()));
        }

        let keybinds = self.shared.keybinds();
        if keybinds.input.is_some() && self.host.is_action_just_pressed(INPUT_TOGGLE_ACTION) {
            debug!(delta, "input keybind pressed");
            self.shared.toggle(Origin::FramePoll, Toggle::Passthrough);
        }
        if keybinds.visibility.is_some()
            && self.host.is_action_just_pressed(VISIBILITY_TOGGLE_ACTION)
        {
            debug!(delta, "visibility keybind pressed");
            self.shared.toggle(Origin::FramePoll, Toggle::Visibility);
        }
    }
}

fn install_hook(shared: &Arc<Shared>, mut backend: Box<dyn HookBackend>) -> Option<InstalledHook> {
    let id = HookId::next();
    match backend.install(id) {
        Ok(()) => {
            hook::register_sink(id, shared);
            info!(?id, "global keyboard hook installed");
            Some(InstalledHook { id, backend })
        }
        Err(err) => {
            let err = OverlayError::HookInstall(format!("{err:#}"));
            warn!(%err, "continuing with focused hotkeys only");
            None
        }
    }
}

impl Drop for OverlayController {
    fn drop(&mut self) {
        self.shared.closing.store(true, Ordering::Release);

        if let Some(mut hook) = self.hook.take() {
            if let Err(err) = hook.backend.uninstall() {
                error!(?err, "failed to uninstall global keyboard hook");
            }
            hook::registry().unregister(hook.id);
            debug!(id = ?hook.id, "global keyboard hook removed");
        }

        let mut machine = self.shared.machine.lock();
        machine.release(self.shared.port.as_ref());
        self.shared.cell.publish(&machine);
        info!("overlay controller dropped");
    }
}
