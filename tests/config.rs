use hud_overlay::{KeyChord, Keybinds, OverlayConfig};
use tempfile::tempdir;

#[test]
fn missing_file_gives_defaults() {
    let dir = tempdir().unwrap();
    let cfg = OverlayConfig::load(dir.path().join("absent.json")).unwrap();
    assert_eq!(cfg, OverlayConfig::default());
}

#[test]
fn save_then_load_keeps_hotkeys() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("overlay.json");
    let cfg = OverlayConfig {
        window_title: "My Game".into(),
        input_hotkey: Some("Ctrl+Shift+I".into()),
        visibility_hotkey: Some("F9".into()),
        enable_global_hook: false,
        ..Default::default()
    };
    cfg.save(&path).unwrap();

    let loaded = OverlayConfig::load(&path).unwrap();
    assert_eq!(loaded, cfg);
    assert_eq!(
        loaded.keybinds(),
        Keybinds {
            input: Some(KeyChord::new('I' as u32).with_ctrl().with_shift()),
            visibility: Some(KeyChord::new(hud_overlay::keycode::F9)),
        }
    );
}

#[test]
fn malformed_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("overlay.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(OverlayConfig::load(&path).is_err());
}
