pub mod chord;
pub mod config;
pub mod controller;
pub mod error;
pub mod hook;
pub mod interceptor;
pub mod keycode;
pub mod logging;
pub mod native;
pub mod resolver;
pub mod state;

pub use chord::{KeyChord, Keybinds};
pub use config::OverlayConfig;
pub use controller::{HostWindow, OverlayController};
pub use error::OverlayError;
pub use state::OverlayState;
