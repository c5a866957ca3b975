//! Global keyboard hook plumbing.
//!
//! The OS calls the hook procedure as a free function, so events are routed
//! back to their controller through a process-wide [`HookRegistry`] keyed by
//! [`HookId`]. An id is registered only after its backend installed
//! successfully and unregistered only after the backend has uninstalled.

use crate::interceptor::KeyEvent;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

impl HookId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        HookId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Receiver of hook events. Implementations must never block the caller for
/// long: the OS drops hooks that stall.
pub trait KeySink: Send + Sync {
    fn on_key_event(&self, event: KeyEvent);
}

pub trait HookBackend: Send {
    fn install(&mut self, id: HookId) -> anyhow::Result<()>;
    fn uninstall(&mut self) -> anyhow::Result<()>;
    fn is_installed(&self) -> bool;
}

#[derive(Default)]
pub struct HookRegistry {
    sinks: Mutex<HashMap<HookId, Weak<dyn KeySink>>>,
}

impl HookRegistry {
    pub fn register(&self, id: HookId, sink: Weak<dyn KeySink>) {
        match self.sinks.lock() {
            Ok(mut sinks) => {
                sinks.insert(id, sink);
            }
            Err(err) => tracing::error!(?err, "failed to lock hook registry"),
        }
    }

    pub fn unregister(&self, id: HookId) {
        match self.sinks.lock() {
            Ok(mut sinks) => {
                sinks.remove(&id);
            }
            Err(err) => tracing::error!(?err, "failed to lock hook registry"),
        }
    }

    pub fn is_registered(&self, id: HookId) -> bool {
        self.sinks
            .lock()
            .map(|sinks| sinks.contains_key(&id))
            .unwrap_or(false)
    }

    /// Deliver `event` to the sink registered under `id`. Returns whether a
    /// live sink received it.
    pub fn dispatch(&self, id: HookId, event: KeyEvent) -> bool {
        let sink = match self.sinks.lock() {
            Ok(sinks) => sinks.get(&id).and_then(Weak::upgrade),
            Err(_) => None,
        };
        match sink {
            Some(sink) => {
                sink.on_key_event(event);
                true
            }
            None => false,
        }
    }
}

static REGISTRY: OnceCell<HookRegistry> = OnceCell::new();

pub fn registry() -> &'static HookRegistry {
    REGISTRY.get_or_init(HookRegistry::default)
}

/// Keep `sink` reachable from the hook under `id`.
pub fn register_sink<S: KeySink + 'static>(id: HookId, sink: &Arc<S>) {
    let sink: Arc<dyn KeySink> = sink.clone();
    registry().register(id, Arc::downgrade(&sink));
}

#[cfg(target_os = "windows")]
pub fn default_backend() -> Box<dyn HookBackend> {
    Box::new(platform::LowLevelKeyboardHook::default())
}

#[cfg(not(target_os = "windows"))]
pub fn default_backend() -> Box<dyn HookBackend> {
    Box::new(UnsupportedHook)
}

#[cfg(not(target_os = "windows"))]
#[derive(Debug, Default)]
struct UnsupportedHook;

#[cfg(not(target_os = "windows"))]
impl HookBackend for UnsupportedHook {
    fn install(&mut self, _id: HookId) -> anyhow::Result<()> {
        anyhow::bail!("global keyboard hooks are only available on Windows")
    }

    fn uninstall(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn is_installed(&self) -> bool {
        false
    }
}

/// Outcome of waiting for a hook thread to report that its hook is live.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
#[derive(Debug)]
enum Startup<T> {
    Ready(T),
    Failed(anyhow::Error),
    /// The wait expired. `late` is set when the thread reported in while the
    /// wait was being abandoned; it must then be stopped by the caller.
    TimedOut { late: Option<T> },
}

/// Thread side of the start-up handshake. Returns whether the thread should
/// keep running: `false` once the installer has given up on it.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn announce_ready<T>(
    ready: &SyncSender<anyhow::Result<T>>,
    cancelled: &AtomicBool,
    value: T,
) -> bool {
    ready.send(Ok(value)).is_ok() && !cancelled.load(Ordering::SeqCst)
}

/// Installer side of the start-up handshake. `cancelled` is raised before
/// the final check so a thread that reports in afterwards stops itself.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn await_ready<T>(
    ready: &Receiver<anyhow::Result<T>>,
    cancelled: &AtomicBool,
    timeout: Duration,
) -> Startup<T> {
    match ready.recv_timeout(timeout) {
        Ok(Ok(value)) => Startup::Ready(value),
        Ok(Err(err)) => Startup::Failed(err),
        Err(_) => {
            cancelled.store(true, Ordering::SeqCst);
            let late = match ready.try_recv() {
                Ok(Ok(value)) => Some(value),
                _ => None,
            };
            Startup::TimedOut { late }
        }
    }
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
#[derive(Debug)]
struct HookThread {
    thread_id: u32,
    join: JoinHandle<()>,
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
const STOP_ATTEMPTS: usize = 3;

/// Ask the hook thread in `slot` to quit and join it. The thread stays in
/// `slot` until the quit request has been delivered, so a failed stop can be
/// retried later.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn stop_hook_thread(
    slot: &mut Option<HookThread>,
    mut post_quit: impl FnMut(u32) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let Some(thread_id) = slot.as_ref().map(|th| th.thread_id) else {
        return Ok(());
    };

    let mut last_err = None;
    for attempt in 1..=STOP_ATTEMPTS {
        match post_quit(thread_id) {
            Ok(()) => {
                last_err = None;
                break;
            }
            Err(err) => {
                tracing::warn!(attempt, ?err, "failed to signal keyboard hook thread");
                last_err = Some(err);
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }
    if let Some(err) = last_err {
        return Err(err.context("keyboard hook thread is still running"));
    }

    if let Some(th) = slot.take() {
        th.join
            .join()
            .map_err(|_| anyhow::anyhow!("keyboard hook thread panicked"))?;
    }
    Ok(())
}

#[cfg(target_os = "windows")]
mod platform {
    use super::{
        announce_ready, await_ready, registry, stop_hook_thread, HookBackend, HookId, HookThread,
        Startup,
    };
    use crate::interceptor::{KeyEvent, KeyTransition};
    use anyhow::{anyhow, Context, Result};
    use std::cell::Cell;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    thread_local! {
        static ACTIVE_HOOK: Cell<Option<HookId>> = const { Cell::new(None) };
    }

    fn post_quit(thread_id: u32) -> Result<()> {
        use windows::Win32::Foundation::{LPARAM, WPARAM};
        use windows::Win32::UI::WindowsAndMessaging::{PostThreadMessageW, WM_QUIT};
        unsafe { PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) }?;
        Ok(())
    }

    /// `WH_KEYBOARD_LL` hook running on its own message-loop thread. The
    /// hook procedure executes on that thread, which is how it knows which
    /// registry entry it belongs to.
    #[derive(Debug, Default)]
    pub struct LowLevelKeyboardHook {
        hook_thread: Option<HookThread>,
    }

    impl HookBackend for LowLevelKeyboardHook {
        fn install(&mut self, id: HookId) -> Result<()> {
            if self.hook_thread.is_some() {
                return Ok(());
            }

            use windows::Win32::System::LibraryLoader::GetModuleHandleW;
            use windows::Win32::System::Threading::GetCurrentThreadId;
            use windows::Win32::UI::WindowsAndMessaging::{
                DispatchMessageW, GetMessageW, PeekMessageW, SetWindowsHookExW, TranslateMessage,
                UnhookWindowsHookEx, MSG, PM_NOREMOVE, WH_KEYBOARD_LL,
            };

            let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<u32>>(1);
            let cancelled = Arc::new(AtomicBool::new(false));
            let thread_cancelled = Arc::clone(&cancelled);

            let join = std::thread::Builder::new()
                .name("overlay-keyboard-hook".into())
                .spawn(move || {
                    let mut msg = MSG::default();
                    unsafe {
                        let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);
                    }

                    let thread_id = unsafe { GetCurrentThreadId() };
                    let hmodule = match unsafe { GetModuleHandleW(None) } {
                        Ok(h) => h,
                        Err(err) => {
                            let _ = ready_tx.send(Err(anyhow!(err)));
                            return;
                        }
                    };

                    ACTIVE_HOOK.with(|active| active.set(Some(id)));
                    let keyboard_hook = match unsafe {
                        SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_hook_proc), hmodule, 0)
                    } {
                        Ok(h) if !h.0.is_null() => h,
                        Ok(_) => {
                            let _ =
                                ready_tx.send(Err(anyhow!(windows::core::Error::from_win32())));
                            return;
                        }
                        Err(err) => {
                            let _ = ready_tx.send(Err(anyhow!(err)));
                            return;
                        }
                    };

                    if announce_ready(&ready_tx, &thread_cancelled, thread_id) {
                        loop {
                            let r = unsafe { GetMessageW(&mut msg, None, 0, 0) };
                            if r.0 <= 0 {
                                break;
                            }
                            unsafe {
                                let _ = TranslateMessage(&msg);
                                DispatchMessageW(&msg);
                            }
                        }
                    }

                    unsafe {
                        let _ = UnhookWindowsHookEx(keyboard_hook);
                    }
                    ACTIVE_HOOK.with(|active| active.set(None));
                })
                .context("failed to spawn keyboard hook thread")?;

            match await_ready(&ready_rx, &cancelled, Duration::from_secs(2)) {
                Startup::Ready(thread_id) => {
                    tracing::debug!(?id, thread_id, "keyboard hook thread running");
                    self.hook_thread = Some(HookThread { thread_id, join });
                    Ok(())
                }
                Startup::Failed(err) => {
                    let _ = join.join();
                    Err(err)
                }
                Startup::TimedOut { late: Some(thread_id) } => {
                    let mut slot = Some(HookThread { thread_id, join });
                    if let Err(err) = stop_hook_thread(&mut slot, post_quit) {
                        tracing::error!(?err, "failed to stop late keyboard hook thread");
                        self.hook_thread = slot;
                    }
                    Err(anyhow!("keyboard hook thread did not signal readiness"))
                }
                Startup::TimedOut { late: None } => {
                    // Cancelled: the thread unhooks itself if it ever gets there.
                    Err(anyhow!("keyboard hook thread did not signal readiness"))
                }
            }
        }

        fn uninstall(&mut self) -> Result<()> {
            stop_hook_thread(&mut self.hook_thread, post_quit)
        }

        fn is_installed(&self) -> bool {
            self.hook_thread.is_some()
        }
    }

    impl Drop for LowLevelKeyboardHook {
        fn drop(&mut self) {
            if let Err(err) = self.uninstall() {
                tracing::warn!(?err, "failed to uninstall keyboard hook");
            }
        }
    }

    unsafe extern "system" fn keyboard_hook_proc(
        n_code: i32,
        w_param: windows::Win32::Foundation::WPARAM,
        l_param: windows::Win32::Foundation::LPARAM,
    ) -> windows::Win32::Foundation::LRESULT {
        use windows::Win32::UI::WindowsAndMessaging::{
            CallNextHookEx, HC_ACTION, KBDLLHOOKSTRUCT, LLKHF_INJECTED, WM_KEYDOWN, WM_KEYUP,
            WM_SYSKEYDOWN, WM_SYSKEYUP,
        };

        if n_code == HC_ACTION as i32 {
            let transition = match w_param.0 as u32 {
                WM_KEYDOWN | WM_SYSKEYDOWN => Some(KeyTransition::Down),
                WM_KEYUP | WM_SYSKEYUP => Some(KeyTransition::Up),
                _ => None,
            };
            if let (Some(transition), Some(id)) =
                (transition, ACTIVE_HOOK.with(|active| active.get()))
            {
                let info = unsafe { &*(l_param.0 as *const KBDLLHOOKSTRUCT) };
                let event = KeyEvent {
                    vk_code: info.vkCode,
                    transition,
                    injected: (info.flags.0 & LLKHF_INJECTED.0) != 0,
                };
                registry().dispatch(id, event);
            }
        }

        // Observe only: every event continues down the hook chain.
        CallNextHookEx(
            windows::Win32::UI::WindowsAndMessaging::HHOOK(std::ptr::null_mut()),
            n_code,
            w_param,
            l_param,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingSink {
        hits: AtomicUsize,
    }

    impl KeySink for CountingSink {
        fn on_key_event(&self, _event: KeyEvent) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(HookId::next(), HookId::next());
    }

    #[test]
    fn dispatch_reaches_registered_sink_only() {
        let registry = HookRegistry::default();
        let sink = Arc::new(CountingSink::default());
        let id = HookId::next();
        let other = HookId::next();
        let weak: Weak<dyn KeySink> = Arc::downgrade(&(sink.clone() as Arc<dyn KeySink>));
        registry.register(id, weak);

        assert!(registry.dispatch(id, KeyEvent::down(0x41)));
        assert!(!registry.dispatch(other, KeyEvent::down(0x41)));
        assert_eq!(sink.hits.load(Ordering::SeqCst), 1);

        registry.unregister(id);
        assert!(!registry.dispatch(id, KeyEvent::down(0x41)));
        assert_eq!(sink.hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ready_thread_is_reported() {
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        let cancelled = AtomicBool::new(false);
        assert!(announce_ready(&tx, &cancelled, 7u32));
        assert!(matches!(
            await_ready(&rx, &cancelled, Duration::from_millis(10)),
            Startup::Ready(7)
        ));
    }

    #[test]
    fn thread_reporting_after_timeout_stops_itself() {
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        let cancelled = Arc::new(AtomicBool::new(false));
        let outcome = await_ready::<u32>(&rx, &cancelled, Duration::from_millis(10));
        assert!(matches!(outcome, Startup::TimedOut { late: None }));

        let thread_cancelled = Arc::clone(&cancelled);
        let keep_running = std::thread::spawn(move || announce_ready(&tx, &thread_cancelled, 7))
            .join()
            .unwrap();
        assert!(!keep_running);
    }

    #[test]
    fn thread_id_caught_while_timing_out_is_returned() {
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        let cancelled = AtomicBool::new(false);
        // Queued but not seen by the timed wait: zero timeout.
        tx.send(Ok(9u32)).unwrap();
        let outcome = await_ready(&rx, &cancelled, Duration::ZERO);
        assert!(matches!(
            outcome,
            Startup::Ready(9) | Startup::TimedOut { late: Some(9) }
        ));
    }

    fn parked_thread() -> (HookThread, std::sync::mpsc::Sender<()>) {
        let (quit_tx, quit_rx) = std::sync::mpsc::channel::<()>();
        let join = std::thread::spawn(move || {
            let _ = quit_rx.recv();
        });
        (HookThread { thread_id: 42, join }, quit_tx)
    }

    #[test]
    fn failed_stop_keeps_thread_handle() {
        let (thread, quit) = parked_thread();
        let mut slot = Some(thread);
        let mut attempts = 0;
        let result = stop_hook_thread(&mut slot, |_| {
            attempts += 1;
            anyhow::bail!("queue full")
        });
        assert!(result.is_err());
        assert_eq!(attempts, STOP_ATTEMPTS);
        assert!(slot.is_some());

        let result = stop_hook_thread(&mut slot, |thread_id| {
            assert_eq!(thread_id, 42);
            quit.send(()).map_err(anyhow::Error::from)
        });
        assert!(result.is_ok());
        assert!(slot.is_none());
    }

    #[test]
    fn stop_retries_until_signal_is_delivered() {
        let (thread, quit) = parked_thread();
        let mut slot = Some(thread);
        let mut attempts = 0;
        stop_hook_thread(&mut slot, |_| {
            attempts += 1;
            if attempts < 2 {
                anyhow::bail!("queue full");
            }
            quit.send(()).map_err(anyhow::Error::from)
        })
        .unwrap();
        assert_eq!(attempts, 2);
        assert!(slot.is_none());
    }

    #[test]
    fn dropped_sink_is_not_called() {
        let registry = HookRegistry::default();
        let id = HookId::next();
        {
            let sink: Arc<dyn KeySink> = Arc::new(CountingSink::default());
            registry.register(id, Arc::downgrade(&sink));
        }
        assert!(registry.is_registered(id));
        assert!(!registry.dispatch(id, KeyEvent::down(0x41)));
    }
}
