use crate::error::OverlayError;
use crate::native::{WindowHandle, WindowPort};
use tracing::{debug, info, warn};

/// Which lookup produced the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveTier {
    WindowId,
    Title,
    ActiveWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub window: WindowHandle,
    pub tier: ResolveTier,
}

/// Find the host's main window, trying the host window id, then an exact
/// title match, then whatever window is currently active.
pub fn resolve(
    port: &dyn WindowPort,
    window_id: i64,
    title: &str,
) -> Result<Resolved, OverlayError> {
    debug!(window_id, title, "resolving host window");

    if let Some(window) = port.handle_from_window_id(window_id) {
        return Ok(found(window, ResolveTier::WindowId));
    }
    warn!(window_id, "host window id is not a native handle, trying title lookup");

    if let Some(window) = port.find_window_by_title(title) {
        return Ok(found(window, ResolveTier::Title));
    }
    warn!(title, "no window with this title, trying the active window");

    if let Some(window) = port.active_window() {
        return Ok(found(window, ResolveTier::ActiveWindow));
    }
    warn!("no active window; host window could not be resolved");

    Err(OverlayError::ResolutionFailure)
}

fn found(window: WindowHandle, tier: ResolveTier) -> Resolved {
    info!(window = window.raw(), ?tier, "host window resolved");
    Resolved { window, tier }
}
