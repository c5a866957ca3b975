mod common;

use common::*;
use hud_overlay::resolver::{resolve, ResolveTier};
use hud_overlay::OverlayError;
use std::sync::atomic::Ordering;

#[test]
fn window_id_wins_when_valid() {
    let port = MockWindowPort::new();
    *port.title_window.lock().unwrap() = Some(("Godot".into(), window(OTHER_WINDOW)));
    let resolved = resolve(port.as_ref(), HOST_WINDOW as i64, "Godot").unwrap();
    assert_eq!(resolved.window, window(HOST_WINDOW));
    assert_eq!(resolved.tier, ResolveTier::WindowId);
}

#[test]
fn title_is_tried_second() {
    let port = MockWindowPort::new();
    port.accept_window_id.store(false, Ordering::SeqCst);
    *port.title_window.lock().unwrap() = Some(("Godot".into(), window(OTHER_WINDOW)));
    *port.active.lock().unwrap() = Some(window(0x77));
    let resolved = resolve(port.as_ref(), HOST_WINDOW as i64, "Godot").unwrap();
    assert_eq!(resolved.window, window(OTHER_WINDOW));
    assert_eq!(resolved.tier, ResolveTier::Title);
}

#[test]
fn zero_window_id_skips_first_tier() {
    let port = MockWindowPort::new();
    *port.active.lock().unwrap() = Some(window(0x77));
    let resolved = resolve(port.as_ref(), 0, "Godot").unwrap();
    assert_eq!(resolved.tier, ResolveTier::ActiveWindow);
    assert_eq!(resolved.window, window(0x77));
}

#[test]
fn title_must_match_exactly() {
    let port = MockWindowPort::new();
    port.accept_window_id.store(false, Ordering::SeqCst);
    *port.title_window.lock().unwrap() = Some(("Godot Engine".into(), window(OTHER_WINDOW)));
    assert_eq!(
        resolve(port.as_ref(), 1, "Godot"),
        Err(OverlayError::ResolutionFailure)
    );
}

#[test]
fn all_tiers_failing_is_an_error() {
    let port = MockWindowPort::new();
    port.accept_window_id.store(false, Ordering::SeqCst);
    assert_eq!(
        resolve(port.as_ref(), HOST_WINDOW as i64, "Godot"),
        Err(OverlayError::ResolutionFailure)
    );
}
