//! Seam between the overlay logic and the operating system.
//!
//! [`WindowPort`] covers window lookup and every style/attribute write the
//! overlay performs; [`ModifierProbe`] reports live modifier-key state.
//! The Win32 implementations live in [`win32`]; other targets get ports that
//! resolve nothing and report every mutation as unsupported.

use std::fmt;
use std::sync::Arc;

/// Opaque native window reference. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(isize);

impl WindowHandle {
    pub fn from_raw(raw: isize) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    pub fn raw(self) -> isize {
        self.0
    }
}

/// Native background brush owned by the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BrushHandle(pub isize);

/// Error code reported by a failed native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsError(pub u32);

impl OsError {
    /// Returned by ports on targets without an overlay implementation.
    pub const UNSUPPORTED: OsError = OsError(50);
}

impl fmt::Display for OsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "os error {:#x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

pub trait WindowPort: Send + Sync {
    /// Interpret a host window identifier as a native handle.
    fn handle_from_window_id(&self, window_id: i64) -> Option<WindowHandle>;
    fn find_window_by_title(&self, title: &str) -> Option<WindowHandle>;
    fn active_window(&self) -> Option<WindowHandle>;
    fn foreground_window(&self) -> Option<WindowHandle>;

    fn strip_decorations(&self, window: WindowHandle) -> Result<(), OsError>;
    fn restore_decorations(&self, window: WindowHandle) -> Result<(), OsError>;
    fn set_topmost(&self, window: WindowHandle, topmost: bool) -> Result<(), OsError>;
    fn set_layered(&self, window: WindowHandle, layered: bool) -> Result<(), OsError>;
    fn set_input_transparent(&self, window: WindowHandle, transparent: bool)
        -> Result<(), OsError>;
    fn create_background(&self) -> Result<BrushHandle, OsError>;
    fn install_background(&self, window: WindowHandle, brush: BrushHandle)
        -> Result<(), OsError>;
    fn delete_background(&self, brush: BrushHandle) -> Result<(), OsError>;
    /// Pure black becomes transparent, everything else stays opaque.
    fn apply_color_key(&self, window: WindowHandle) -> Result<(), OsError>;
    /// Whole window alpha drops to zero.
    fn apply_full_transparency(&self, window: WindowHandle) -> Result<(), OsError>;
    fn refresh_frame(&self, window: WindowHandle) -> Result<(), OsError>;
    fn bring_to_foreground(&self, window: WindowHandle) -> Result<(), OsError>;
}

pub trait ModifierProbe: Send + Sync {
    fn modifiers(&self) -> Modifiers;
}

#[cfg(target_os = "windows")]
pub fn default_window_port() -> Arc<dyn WindowPort> {
    Arc::new(win32::Win32WindowPort)
}

#[cfg(not(target_os = "windows"))]
pub fn default_window_port() -> Arc<dyn WindowPort> {
    Arc::new(UnsupportedWindowPort)
}

#[cfg(target_os = "windows")]
pub fn default_modifier_probe() -> Arc<dyn ModifierProbe> {
    Arc::new(win32::AsyncKeyStateProbe)
}

#[cfg(not(target_os = "windows"))]
pub fn default_modifier_probe() -> Arc<dyn ModifierProbe> {
    Arc::new(UnsupportedWindowPort)
}

#[cfg(not(target_os = "windows"))]
#[derive(Debug)]
struct UnsupportedWindowPort;

#[cfg(not(target_os = "windows"))]
impl WindowPort for UnsupportedWindowPort {
    fn handle_from_window_id(&self, _window_id: i64) -> Option<WindowHandle> {
        None
    }

    fn find_window_by_title(&self, _title: &str) -> Option<WindowHandle> {
        None
    }

    fn active_window(&self) -> Option<WindowHandle> {
        None
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        None
    }

    fn strip_decorations(&self, _window: WindowHandle) -> Result<(), OsError> {
        Err(OsError::UNSUPPORTED)
    }

    fn restore_decorations(&self, _window: WindowHandle) -> Result<(), OsError> {
        Err(OsError::UNSUPPORTED)
    }

    fn set_topmost(&self, _window: WindowHandle, _topmost: bool) -> Result<(), OsError> {
        Err(OsError::UNSUPPORTED)
    }

    fn set_layered(&self, _window: WindowHandle, _layered: bool) -> Result<(), OsError> {
        Err(OsError::UNSUPPORTED)
    }

    fn set_input_transparent(
        &self,
        _window: WindowHandle,
        _transparent: bool,
    ) -> Result<(), OsError> {
        Err(OsError::UNSUPPORTED)
    }

    fn create_background(&self) -> Result<BrushHandle, OsError> {
        Err(OsError::UNSUPPORTED)
    }

    fn install_background(
        &self,
        _window: WindowHandle,
        _brush: BrushHandle,
    ) -> Result<(), OsError> {
        Err(OsError::UNSUPPORTED)
    }

    fn delete_background(&self, _brush: BrushHandle) -> Result<(), OsError> {
        Err(OsError::UNSUPPORTED)
    }

    fn apply_color_key(&self, _window: WindowHandle) -> Result<(), OsError> {
        Err(OsError::UNSUPPORTED)
    }

    fn apply_full_transparency(&self, _window: WindowHandle) -> Result<(), OsError> {
        Err(OsError::UNSUPPORTED)
    }

    fn refresh_frame(&self, _window: WindowHandle) -> Result<(), OsError> {
        Err(OsError::UNSUPPORTED)
    }

    fn bring_to_foreground(&self, _window: WindowHandle) -> Result<(), OsError> {
        Err(OsError::UNSUPPORTED)
    }
}

#[cfg(not(target_os = "windows"))]
impl ModifierProbe for UnsupportedWindowPort {
    fn modifiers(&self) -> Modifiers {
        Modifiers::default()
    }
}

#[cfg(target_os = "windows")]
pub mod win32 {
    use super::{BrushHandle, ModifierProbe, Modifiers, OsError, WindowHandle, WindowPort};
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{GetLastError, SetLastError, COLORREF, HWND, WIN32_ERROR};
    use windows::Win32::Graphics::Gdi::{CreateSolidBrush, DeleteObject, HBRUSH};
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        GetActiveWindow, GetAsyncKeyState, VK_CONTROL, VK_MENU, VK_SHIFT,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        FindWindowW, GetForegroundWindow, GetWindowLongPtrW, SetClassLongPtrW,
        SetForegroundWindow, SetLayeredWindowAttributes, SetWindowLongPtrW, SetWindowPos,
        GCLP_HBRBACKGROUND, GWL_EXSTYLE, GWL_STYLE, HWND_NOTOPMOST, HWND_TOPMOST, LWA_ALPHA,
        LWA_COLORKEY, SWP_FRAMECHANGED, SWP_NOMOVE, SWP_NOSIZE, SWP_NOZORDER,
        WINDOW_LONG_PTR_INDEX, WS_CAPTION, WS_EX_LAYERED, WS_EX_TRANSPARENT, WS_MAXIMIZEBOX,
        WS_MINIMIZEBOX, WS_OVERLAPPEDWINDOW, WS_SYSMENU, WS_THICKFRAME,
    };

    const BLACK: COLORREF = COLORREF(0);

    fn hwnd(window: WindowHandle) -> HWND {
        HWND(window.raw() as *mut core::ffi::c_void)
    }

    fn from_hwnd(hwnd: HWND) -> Option<WindowHandle> {
        WindowHandle::from_raw(hwnd.0 as isize)
    }

    fn last_error() -> OsError {
        OsError(unsafe { GetLastError() }.0)
    }

    fn win_error(err: windows::core::Error) -> OsError {
        OsError(err.code().0 as u32)
    }

    fn wide(value: &str) -> Vec<u16> {
        value.encode_utf16().chain(std::iter::once(0)).collect()
    }

    /// `SetWindowLongPtrW` returns the previous value, so zero is only a
    /// failure when the thread's last-error code says so.
    fn update_long(
        window: WindowHandle,
        index: WINDOW_LONG_PTR_INDEX,
        update: impl FnOnce(u32) -> u32,
    ) -> Result<(), OsError> {
        unsafe {
            let current = GetWindowLongPtrW(hwnd(window), index) as u32;
            SetLastError(WIN32_ERROR(0));
            let previous = SetWindowLongPtrW(hwnd(window), index, update(current) as isize);
            if previous == 0 {
                let err = last_error();
                if err.0 != 0 {
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn set_ex_flag(window: WindowHandle, flag: u32, on: bool) -> Result<(), OsError> {
        update_long(window, GWL_EXSTYLE, |style| {
            if on {
                style | flag
            } else {
                style & !flag
            }
        })
    }

    #[derive(Debug, Default)]
    pub struct Win32WindowPort;

    impl WindowPort for Win32WindowPort {
        fn handle_from_window_id(&self, window_id: i64) -> Option<WindowHandle> {
            WindowHandle::from_raw(window_id as isize)
        }

        fn find_window_by_title(&self, title: &str) -> Option<WindowHandle> {
            let title = wide(title);
            unsafe { FindWindowW(PCWSTR::null(), PCWSTR(title.as_ptr())) }
                .ok()
                .and_then(from_hwnd)
        }

        fn active_window(&self) -> Option<WindowHandle> {
            from_hwnd(unsafe { GetActiveWindow() })
        }

        fn foreground_window(&self) -> Option<WindowHandle> {
            from_hwnd(unsafe { GetForegroundWindow() })
        }

        fn strip_decorations(&self, window: WindowHandle) -> Result<(), OsError> {
            let chrome =
                (WS_CAPTION | WS_THICKFRAME | WS_MINIMIZEBOX | WS_MAXIMIZEBOX | WS_SYSMENU).0;
            update_long(window, GWL_STYLE, |style| style & !chrome)
        }

        fn restore_decorations(&self, window: WindowHandle) -> Result<(), OsError> {
            update_long(window, GWL_STYLE, |style| style | WS_OVERLAPPEDWINDOW.0)
        }

        fn set_topmost(&self, window: WindowHandle, topmost: bool) -> Result<(), OsError> {
            let insert_after = if topmost { HWND_TOPMOST } else { HWND_NOTOPMOST };
            unsafe { SetWindowPos(hwnd(window), insert_after, 0, 0, 0, 0, SWP_NOMOVE | SWP_NOSIZE) }
                .map_err(win_error)
        }

        fn set_layered(&self, window: WindowHandle, layered: bool) -> Result<(), OsError> {
            set_ex_flag(window, WS_EX_LAYERED.0, layered)
        }

        fn set_input_transparent(
            &self,
            window: WindowHandle,
            transparent: bool,
        ) -> Result<(), OsError> {
            set_ex_flag(window, WS_EX_TRANSPARENT.0, transparent)
        }

        fn create_background(&self) -> Result<BrushHandle, OsError> {
            let brush = unsafe { CreateSolidBrush(BLACK) };
            if brush.is_invalid() {
                Err(last_error())
            } else {
                Ok(BrushHandle(brush.0 as isize))
            }
        }

        fn install_background(
            &self,
            window: WindowHandle,
            brush: BrushHandle,
        ) -> Result<(), OsError> {
            unsafe {
                SetLastError(WIN32_ERROR(0));
                let previous = SetClassLongPtrW(hwnd(window), GCLP_HBRBACKGROUND, brush.0);
                if previous == 0 {
                    let err = last_error();
                    if err.0 != 0 {
                        return Err(err);
                    }
                }
            }
            Ok(())
        }

        fn delete_background(&self, brush: BrushHandle) -> Result<(), OsError> {
            let brush = HBRUSH(brush.0 as *mut core::ffi::c_void);
            if unsafe { DeleteObject(brush) }.as_bool() {
                Ok(())
            } else {
                Err(last_error())
            }
        }

        fn apply_color_key(&self, window: WindowHandle) -> Result<(), OsError> {
            unsafe { SetLayeredWindowAttributes(hwnd(window), BLACK, 0, LWA_COLORKEY) }
                .map_err(win_error)
        }

        fn apply_full_transparency(&self, window: WindowHandle) -> Result<(), OsError> {
            unsafe { SetLayeredWindowAttributes(hwnd(window), BLACK, 0, LWA_ALPHA) }
                .map_err(win_error)
        }

        fn refresh_frame(&self, window: WindowHandle) -> Result<(), OsError> {
            unsafe {
                SetWindowPos(
                    hwnd(window),
                    HWND::default(),
                    0,
                    0,
                    0,
                    0,
                    SWP_NOMOVE | SWP_NOSIZE | SWP_NOZORDER | SWP_FRAMECHANGED,
                )
            }
            .map_err(win_error)
        }

        fn bring_to_foreground(&self, window: WindowHandle) -> Result<(), OsError> {
            if unsafe { SetForegroundWindow(hwnd(window)) }.as_bool() {
                Ok(())
            } else {
                Err(last_error())
            }
        }
    }

    /// Reads modifier state with `GetAsyncKeyState`, fresh on every call.
    #[derive(Debug, Default)]
    pub struct AsyncKeyStateProbe;

    impl ModifierProbe for AsyncKeyStateProbe {
        fn modifiers(&self) -> Modifiers {
            let down = |vk: i32| unsafe { GetAsyncKeyState(vk) } < 0;
            Modifiers {
                ctrl: down(VK_CONTROL.0 as i32),
                shift: down(VK_SHIFT.0 as i32),
                alt: down(VK_MENU.0 as i32),
            }
        }
    }
}
