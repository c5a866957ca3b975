//! Overlay state machine.
//!
//! [`OverlayMachine`] owns the three overlay flags, the target window handle
//! and the background brush. Every transition takes the [`WindowPort`] it
//! should act through, so the guards can be exercised without touching a
//! real window.

use crate::error::OverlayError;
use crate::native::{BrushHandle, OsError, WindowHandle, WindowPort};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayState {
    pub overlay_enabled: bool,
    pub passthrough_enabled: bool,
    pub visible: bool,
}

impl Default for OverlayState {
    fn default() -> Self {
        Self {
            overlay_enabled: false,
            passthrough_enabled: false,
            visible: true,
        }
    }
}

/// One native attribute write. Steps are applied in order and a failing
/// step never stops the ones after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStep {
    StripDecorations,
    SetTopmost,
    AddLayered,
    InstallBackground,
    ApplyColorKey,
    ApplyFullTransparency,
    AddInputTransparent,
    ClearTopmost,
    RestoreDecorations,
    RemoveLayered,
    RemoveInputTransparent,
    FreeBackground,
    RefreshFrame,
    FocusWindow,
}

impl MutationStep {
    pub fn label(self) -> &'static str {
        match self {
            MutationStep::StripDecorations => "strip window decorations",
            MutationStep::SetTopmost => "set always-on-top",
            MutationStep::AddLayered => "add layered style",
            MutationStep::InstallBackground => "install background brush",
            MutationStep::ApplyColorKey => "apply color-key transparency",
            MutationStep::ApplyFullTransparency => "apply full transparency",
            MutationStep::AddInputTransparent => "enable input passthrough",
            MutationStep::ClearTopmost => "clear always-on-top",
            MutationStep::RestoreDecorations => "restore window decorations",
            MutationStep::RemoveLayered => "remove layered style",
            MutationStep::RemoveInputTransparent => "disable input passthrough",
            MutationStep::FreeBackground => "free background brush",
            MutationStep::RefreshFrame => "refresh window frame",
            MutationStep::FocusWindow => "focus window",
        }
    }
}

impl fmt::Display for MutationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub const ACTIVATION_STEPS: &[MutationStep] = &[
    MutationStep::StripDecorations,
    MutationStep::SetTopmost,
    MutationStep::AddLayered,
    MutationStep::InstallBackground,
    MutationStep::ApplyColorKey,
    MutationStep::AddInputTransparent,
];

pub const DEACTIVATION_STEPS: &[MutationStep] = &[
    MutationStep::ClearTopmost,
    MutationStep::RestoreDecorations,
    MutationStep::RemoveLayered,
    MutationStep::RemoveInputTransparent,
    MutationStep::FreeBackground,
    MutationStep::RefreshFrame,
];

/// Outcome of running a list of steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    pub applied: Vec<MutationStep>,
    pub failed: Vec<(MutationStep, OsError)>,
}

impl StepReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn succeeded(&self, step: MutationStep) -> bool {
        self.applied.contains(&step)
    }
}

#[derive(Debug)]
pub struct OverlayMachine {
    state: OverlayState,
    window: Option<WindowHandle>,
    background: Option<BrushHandle>,
    reset_visibility_on_disable: bool,
}

impl Default for OverlayMachine {
    fn default() -> Self {
        Self::new(true)
    }
}

impl OverlayMachine {
    pub fn new(reset_visibility_on_disable: bool) -> Self {
        Self {
            state: OverlayState::default(),
            window: None,
            background: None,
            reset_visibility_on_disable,
        }
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    pub fn window(&self) -> Option<WindowHandle> {
        self.window
    }

    pub fn background(&self) -> Option<BrushHandle> {
        self.background
    }

    /// Turn `window` into an overlay.
    ///
    /// The current `visible` flag is realised as part of activation, so a
    /// window hidden before the last disable comes back hidden. A different
    /// window that is still an overlay is restored first.
    pub fn enable(&mut self, port: &dyn WindowPort, window: WindowHandle) -> StepReport {
        if let Some(previous) = self.window.filter(|w| *w != window) {
            if self.state.overlay_enabled {
                info!(
                    previous = previous.raw(),
                    window = window.raw(),
                    "overlay moving to another window"
                );
                self.run_steps(port, previous, DEACTIVATION_STEPS);
            }
        }

        self.window = Some(window);
        let mut report = self.run_steps(port, window, ACTIVATION_STEPS);
        if !self.state.visible {
            self.run_step_into(port, window, MutationStep::ApplyFullTransparency, &mut report);
        }

        self.state.overlay_enabled = true;
        self.state.passthrough_enabled = report.succeeded(MutationStep::AddInputTransparent);
        info!(
            window = window.raw(),
            failed = report.failed.len(),
            "overlay enabled"
        );
        report
    }

    /// Undo [`enable`](Self::enable). The window handle is kept so the
    /// overlay can be re-enabled without resolving again.
    ///
    /// `passthrough_enabled` is left as it was; `visible` is reset only when
    /// the machine was built with `reset_visibility_on_disable`.
    pub fn disable(&mut self, port: &dyn WindowPort) -> Result<StepReport, OverlayError> {
        let window = self.window.ok_or(OverlayError::MissingHandle {
            operation: "disable_overlay",
        })?;
        let report = self.run_steps(port, window, DEACTIVATION_STEPS);

        self.state.overlay_enabled = false;
        if self.reset_visibility_on_disable {
            self.state.visible = true;
        }
        info!(
            window = window.raw(),
            failed = report.failed.len(),
            "overlay disabled"
        );
        Ok(report)
    }

    pub fn set_passthrough(
        &mut self,
        port: &dyn WindowPort,
        enabled: bool,
    ) -> Result<(), OverlayError> {
        let operation = if enabled {
            "enable_input_passthrough"
        } else {
            "disable_input_passthrough"
        };
        let window = self.guard(operation)?;
        let step = if enabled {
            MutationStep::AddInputTransparent
        } else {
            MutationStep::RemoveInputTransparent
        };
        self.apply(port, window, step)
            .map_err(|code| OverlayError::AttributeMutation { step, code })?;
        self.state.passthrough_enabled = enabled;
        info!(enabled, "input passthrough updated");

        if !enabled {
            // An interactive overlay also needs keyboard focus.
            if let Err(code) = self.apply(port, window, MutationStep::FocusWindow) {
                warn!(%code, "failed to focus overlay window");
            }
        }
        Ok(())
    }

    pub fn set_visibility(
        &mut self,
        port: &dyn WindowPort,
        visible: bool,
    ) -> Result<(), OverlayError> {
        let operation = if visible {
            "enable_visibility"
        } else {
            "disable_visibility"
        };
        let window = self.guard(operation)?;
        let step = if visible {
            MutationStep::ApplyColorKey
        } else {
            MutationStep::ApplyFullTransparency
        };
        self.apply(port, window, step)
            .map_err(|code| OverlayError::AttributeMutation { step, code })?;
        self.state.visible = visible;
        info!(visible, "overlay visibility updated");
        Ok(())
    }

    pub fn toggle_passthrough(&mut self, port: &dyn WindowPort) -> Result<(), OverlayError> {
        let next = !self.state.passthrough_enabled;
        self.set_passthrough(port, next)
    }

    pub fn toggle_visibility(&mut self, port: &dyn WindowPort) -> Result<(), OverlayError> {
        let next = !self.state.visible;
        self.set_visibility(port, next)
    }

    /// Tear everything down and forget the window handle.
    pub fn release(&mut self, port: &dyn WindowPort) {
        if self.state.overlay_enabled {
            if let Err(err) = self.disable(port) {
                warn!(%err, "failed to disable overlay during release");
            }
        }
        if let Some(brush) = self.background {
            match port.delete_background(brush) {
                Ok(()) => self.background = None,
                Err(code) => error!(%code, "failed to free background brush"),
            }
        }
        self.window = None;
    }

    fn guard(&self, operation: &'static str) -> Result<WindowHandle, OverlayError> {
        let window = self
            .window
            .ok_or(OverlayError::MissingHandle { operation })?;
        if !self.state.overlay_enabled {
            return Err(OverlayError::GuardViolation { operation });
        }
        Ok(window)
    }

    fn run_steps(
        &mut self,
        port: &dyn WindowPort,
        window: WindowHandle,
        steps: &[MutationStep],
    ) -> StepReport {
        let mut report = StepReport::default();
        for step in steps {
            self.run_step_into(port, window, *step, &mut report);
        }
        report
    }

    fn run_step_into(
        &mut self,
        port: &dyn WindowPort,
        window: WindowHandle,
        step: MutationStep,
        report: &mut StepReport,
    ) {
        match self.apply(port, window, step) {
            Ok(()) => {
                debug!(%step, "applied");
                report.applied.push(step);
            }
            Err(code) => {
                error!(%step, %code, "native window call failed");
                report.failed.push((step, code));
            }
        }
    }

    fn apply(
        &mut self,
        port: &dyn WindowPort,
        window: WindowHandle,
        step: MutationStep,
    ) -> Result<(), OsError> {
        match step {
            MutationStep::StripDecorations => port.strip_decorations(window),
            MutationStep::SetTopmost => port.set_topmost(window, true),
            MutationStep::AddLayered => port.set_layered(window, true),
            MutationStep::InstallBackground => {
                // A brush left from an earlier activation is reused.
                let brush = match self.background {
                    Some(brush) => brush,
                    None => {
                        let brush = port.create_background()?;
                        self.background = Some(brush);
                        brush
                    }
                };
                port.install_background(window, brush)
            }
            MutationStep::ApplyColorKey => port.apply_color_key(window),
            MutationStep::ApplyFullTransparency => port.apply_full_transparency(window),
            MutationStep::AddInputTransparent => port.set_input_transparent(window, true),
            MutationStep::ClearTopmost => port.set_topmost(window, false),
            MutationStep::RestoreDecorations => port.restore_decorations(window),
            MutationStep::RemoveLayered => port.set_layered(window, false),
            MutationStep::RemoveInputTransparent => port.set_input_transparent(window, false),
            MutationStep::FreeBackground => match self.background {
                Some(brush) => {
                    port.delete_background(brush)?;
                    self.background = None;
                    Ok(())
                }
                None => Ok(()),
            },
            MutationStep::RefreshFrame => port.refresh_frame(window),
            MutationStep::FocusWindow => port.bring_to_foreground(window),
        }
    }
}

/// Lock-free mirror of the machine, read by getters and by the hook thread
/// without waiting on the machine's lock.
#[derive(Debug)]
pub struct StateCell {
    overlay_enabled: AtomicBool,
    passthrough_enabled: AtomicBool,
    visible: AtomicBool,
    window: AtomicIsize,
}

impl Default for StateCell {
    fn default() -> Self {
        let initial = OverlayState::default();
        Self {
            overlay_enabled: AtomicBool::new(initial.overlay_enabled),
            passthrough_enabled: AtomicBool::new(initial.passthrough_enabled),
            visible: AtomicBool::new(initial.visible),
            window: AtomicIsize::new(0),
        }
    }
}

impl StateCell {
    pub fn publish(&self, machine: &OverlayMachine) {
        let state = machine.state();
        self.window.store(
            machine.window().map(WindowHandle::raw).unwrap_or(0),
            Ordering::Release,
        );
        self.passthrough_enabled
            .store(state.passthrough_enabled, Ordering::Release);
        self.visible.store(state.visible, Ordering::Release);
        self.overlay_enabled
            .store(state.overlay_enabled, Ordering::Release);
    }

    pub fn load(&self) -> OverlayState {
        OverlayState {
            overlay_enabled: self.overlay_enabled.load(Ordering::Acquire),
            passthrough_enabled: self.passthrough_enabled.load(Ordering::Acquire),
            visible: self.visible.load(Ordering::Acquire),
        }
    }

    pub fn window(&self) -> Option<WindowHandle> {
        WindowHandle::from_raw(self.window.load(Ordering::Acquire))
    }
}
