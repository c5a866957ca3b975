#![allow(dead_code)]

use hud_overlay::config::OverlayConfig;
use hud_overlay::controller::{HostWindow, OverlayController};
use hud_overlay::hook::{HookBackend, HookId};
use hud_overlay::native::{BrushHandle, Modifiers, ModifierProbe, OsError, WindowHandle, WindowPort};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const HOST_WINDOW: isize = 0x1234;
pub const OTHER_WINDOW: isize = 0x9999;

pub fn window(raw: isize) -> WindowHandle {
    WindowHandle::from_raw(raw).unwrap()
}

/// Records every native call and can be told to fail some of them.
#[derive(Default)]
pub struct MockWindowPort {
    pub accept_window_id: AtomicBool,
    pub title_window: Mutex<Option<(String, WindowHandle)>>,
    pub active: Mutex<Option<WindowHandle>>,
    pub foreground: Mutex<Option<WindowHandle>>,
    pub calls: Mutex<Vec<&'static str>>,
    pub failing: Mutex<HashSet<&'static str>>,
    pub brushes_created: AtomicUsize,
    pub brushes_freed: AtomicUsize,
    /// Runs inside `apply_color_key`, while the controller holds its state.
    pub on_color_key: Mutex<Option<Box<dyn Fn() + Send>>>,
    next_brush: AtomicIsize,
}

impl MockWindowPort {
    /// Port whose window-id lookup succeeds for any non-zero id.
    pub fn new() -> Arc<Self> {
        let port = Self::default();
        port.accept_window_id.store(true, Ordering::SeqCst);
        Arc::new(port)
    }

    pub fn fail(&self, call: &'static str) {
        self.failing.lock().unwrap().insert(call);
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn set_foreground(&self, raw: isize) {
        *self.foreground.lock().unwrap() = WindowHandle::from_raw(raw);
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    pub fn live_brushes(&self) -> usize {
        self.brushes_created.load(Ordering::SeqCst) - self.brushes_freed.load(Ordering::SeqCst)
    }

    fn record(&self, call: &'static str) -> Result<(), OsError> {
        self.calls.lock().unwrap().push(call);
        if self.failing.lock().unwrap().contains(call) {
            Err(OsError(5))
        } else {
            Ok(())
        }
    }
}

impl WindowPort for MockWindowPort {
    fn handle_from_window_id(&self, window_id: i64) -> Option<WindowHandle> {
        if self.accept_window_id.load(Ordering::SeqCst) {
            WindowHandle::from_raw(window_id as isize)
        } else {
            None
        }
    }

    fn find_window_by_title(&self, title: &str) -> Option<WindowHandle> {
        match &*self.title_window.lock().unwrap() {
            Some((t, w)) if t == title => Some(*w),
            _ => None,
        }
    }

    fn active_window(&self) -> Option<WindowHandle> {
        *self.active.lock().unwrap()
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        *self.foreground.lock().unwrap()
    }

    fn strip_decorations(&self, _window: WindowHandle) -> Result<(), OsError> {
        self.record("strip")
    }

    fn restore_decorations(&self, _window: WindowHandle) -> Result<(), OsError> {
        self.record("restore")
    }

    fn set_topmost(&self, _window: WindowHandle, topmost: bool) -> Result<(), OsError> {
        self.record(if topmost { "topmost" } else { "notopmost" })
    }

    fn set_layered(&self, _window: WindowHandle, layered: bool) -> Result<(), OsError> {
        self.record(if layered { "layered" } else { "unlayered" })
    }

    fn set_input_transparent(&self, _window: WindowHandle, transparent: bool) -> Result<(), OsError> {
        self.record(if transparent { "transparent" } else { "opaque" })
    }

    fn create_background(&self) -> Result<BrushHandle, OsError> {
        self.record("create_brush")?;
        self.brushes_created.fetch_add(1, Ordering::SeqCst);
        Ok(BrushHandle(self.next_brush.fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn install_background(&self, _window: WindowHandle, _brush: BrushHandle) -> Result<(), OsError> {
        self.record("install_brush")
    }

    fn delete_background(&self, _brush: BrushHandle) -> Result<(), OsError> {
        self.record("delete_brush")?;
        self.brushes_freed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn apply_color_key(&self, _window: WindowHandle) -> Result<(), OsError> {
        self.record("color_key")?;
        if let Some(hook) = &*self.on_color_key.lock().unwrap() {
            hook();
        }
        Ok(())
    }

    fn apply_full_transparency(&self, _window: WindowHandle) -> Result<(), OsError> {
        self.record("alpha_zero")
    }

    fn refresh_frame(&self, _window: WindowHandle) -> Result<(), OsError> {
        self.record("refresh")
    }

    fn bring_to_foreground(&self, _window: WindowHandle) -> Result<(), OsError> {
        self.record("focus")
    }
}

#[derive(Default)]
pub struct MockProbe {
    pub modifiers: Mutex<Modifiers>,
    pub queries: AtomicUsize,
}

impl MockProbe {
    pub fn hold_ctrl(&self) {
        self.modifiers.lock().unwrap().ctrl = true;
    }
}

impl ModifierProbe for MockProbe {
    fn modifiers(&self) -> Modifiers {
        self.queries.fetch_add(1, Ordering::SeqCst);
        *self.modifiers.lock().unwrap()
    }
}

/// Observable side of [`MockHookBackend`], kept by the test after the
/// backend itself moves into the controller.
#[derive(Default)]
pub struct HookState {
    pub id: Mutex<Option<HookId>>,
    pub installed: AtomicBool,
    pub uninstalls: AtomicUsize,
    pub fail_install: AtomicBool,
}

impl HookState {
    pub fn id(&self) -> HookId {
        self.id.lock().unwrap().expect("hook was never installed")
    }
}

pub struct MockHookBackend(pub Arc<HookState>);

impl HookBackend for MockHookBackend {
    fn install(&mut self, id: HookId) -> anyhow::Result<()> {
        if self.0.fail_install.load(Ordering::SeqCst) {
            anyhow::bail!("hook refused");
        }
        *self.0.id.lock().unwrap() = Some(id);
        self.0.installed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn uninstall(&mut self) -> anyhow::Result<()> {
        self.0.installed.store(false, Ordering::SeqCst);
        self.0.uninstalls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_installed(&self) -> bool {
        self.0.installed.load(Ordering::SeqCst)
    }
}

/// Host whose pressed actions are set by the test for one frame.
#[derive(Clone, Default)]
pub struct MockHost {
    pub window_id: i64,
    pub pressed: Arc<Mutex<HashSet<String>>>,
}

impl MockHost {
    pub fn press(&self, action: &str) {
        self.pressed.lock().unwrap().insert(action.to_string());
    }

    pub fn release_all(&self) {
        self.pressed.lock().unwrap().clear();
    }
}

impl HostWindow for MockHost {
    fn native_window_id(&self) -> i64 {
        self.window_id
    }

    fn is_action_just_pressed(&self, action: &str) -> bool {
        self.pressed.lock().unwrap().contains(action)
    }
}

pub struct Fixture {
    pub controller: OverlayController,
    pub port: Arc<MockWindowPort>,
    pub probe: Arc<MockProbe>,
    pub hook: Arc<HookState>,
    pub host: MockHost,
}

pub fn fixture() -> Fixture {
    fixture_with(&OverlayConfig::default())
}

pub fn fixture_with(config: &OverlayConfig) -> Fixture {
    let port = MockWindowPort::new();
    let probe = Arc::new(MockProbe::default());
    let hook = Arc::new(HookState::default());
    let host = MockHost {
        window_id: HOST_WINDOW as i64,
        ..Default::default()
    };
    let controller = OverlayController::new_with_backends(
        Box::new(host.clone()),
        port.clone(),
        probe.clone(),
        Some(Box::new(MockHookBackend(hook.clone()))),
        config,
    );
    Fixture {
        controller,
        port,
        probe,
        hook,
        host,
    }
}
