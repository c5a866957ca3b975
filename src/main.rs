#![cfg_attr(all(target_os = "windows", not(debug_assertions)), windows_subsystem = "windows")]

use eframe::egui;
use hud_overlay::controller::{HostWindow, OverlayController, INPUT_TOGGLE_ACTION, VISIBILITY_TOGGLE_ACTION};
use hud_overlay::{keycode, KeyChord, OverlayConfig};
use parking_lot::Mutex;
use raw_window_handle::{HasWindowHandle, RawWindowHandle};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

const CONFIG_PATH: &str = "hud_overlay.json";

/// Input collected by the egui frame and read back by the controller.
#[derive(Default)]
struct FrameInput {
    window_id: i64,
    pressed: HashSet<&'static str>,
}

struct DemoHost(Arc<Mutex<FrameInput>>);

impl HostWindow for DemoHost {
    fn native_window_id(&self) -> i64 {
        self.0.lock().window_id
    }

    fn is_action_just_pressed(&self, action: &str) -> bool {
        self.0.lock().pressed.contains(action)
    }
}

fn window_id(frame: &eframe::Frame) -> Option<i64> {
    frame
        .window_handle()
        .ok()
        .and_then(|wh| match wh.as_raw() {
            RawWindowHandle::Win32(handle) => Some(handle.hwnd.get() as i64),
            _ => None,
        })
}

fn chord_pressed(input: &egui::InputState, chord: Option<KeyChord>) -> bool {
    let Some(chord) = chord else {
        return false;
    };
    let Some(key) = keycode::name(chord.keycode).and_then(|name| egui::Key::from_name(&name)) else {
        return false;
    };
    input.key_pressed(key)
        && input.modifiers.ctrl == chord.ctrl
        && input.modifiers.shift == chord.shift
        && input.modifiers.alt == chord.alt
}

struct DemoApp {
    controller: OverlayController,
    input: Arc<Mutex<FrameInput>>,
    title: String,
}

impl DemoApp {
    fn new(config: &OverlayConfig) -> Self {
        let input = Arc::new(Mutex::new(FrameInput::default()));
        let controller = OverlayController::from_config(Box::new(DemoHost(input.clone())), config);
        Self {
            controller,
            input,
            title: config.window_title.clone(),
        }
    }

    fn collect_input(&self, ctx: &egui::Context, frame: &eframe::Frame) {
        let input_chord = self.controller.get_input_keybind();
        let visibility_chord = self.controller.get_visibility_keybind();
        let mut state = self.input.lock();
        if state.window_id == 0 {
            state.window_id = window_id(frame).unwrap_or(0);
        }
        state.pressed.clear();
        ctx.input(|i| {
            if chord_pressed(i, input_chord) {
                state.pressed.insert(INPUT_TOGGLE_ACTION);
            }
            if chord_pressed(i, visibility_chord) {
                state.pressed.insert(VISIBILITY_TOGGLE_ACTION);
            }
        });
    }
}

impl eframe::App for DemoApp {
    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        self.collect_input(ctx, frame);
        self.controller.process(ctx.input(|i| i.stable_dt) as f64);

        let state = self.controller.snapshot();
        // Pure black is keyed out while the overlay is active.
        let fill = if state.overlay_enabled {
            egui::Color32::BLACK
        } else {
            ctx.style().visuals.panel_fill
        };

        egui::CentralPanel::default()
            .frame(egui::Frame::default().fill(fill).inner_margin(12.0))
            .show(ctx, |ui| {
                ui.heading("HUD overlay");
                ui.horizontal(|ui| {
                    ui.label("Window title");
                    ui.text_edit_singleline(&mut self.title);
                });
                ui.horizontal(|ui| {
                    if ui.button("Enable overlay").clicked() {
                        self.controller.enable_overlay_with_title(&self.title);
                    }
                    if ui.button("Disable overlay").clicked() {
                        self.controller.disable_overlay();
                    }
                });
                ui.horizontal(|ui| {
                    if ui.button("Passthrough on").clicked() {
                        self.controller.enable_input_passthrough();
                    }
                    if ui.button("Passthrough off").clicked() {
                        self.controller.disable_input_passthrough();
                    }
                });
                ui.horizontal(|ui| {
                    if ui.button("Show").clicked() {
                        self.controller.enable_visibility();
                    }
                    if ui.button("Hide").clicked() {
                        self.controller.disable_visibility();
                    }
                });
                ui.separator();
                ui.label(format!("overlay: {}", state.overlay_enabled));
                ui.label(format!("passthrough: {}", state.passthrough_enabled));
                ui.label(format!("visible: {}", state.visible));
                let describe = |chord: Option<KeyChord>| {
                    chord.map(|c| c.to_string()).unwrap_or_else(|| "unset".into())
                };
                ui.label(format!(
                    "input hotkey: {}",
                    describe(self.controller.get_input_keybind())
                ));
                ui.label(format!(
                    "visibility hotkey: {}",
                    describe(self.controller.get_visibility_keybind())
                ));
            });

        ctx.request_repaint();
    }
}

fn main() -> anyhow::Result<()> {
    let config = OverlayConfig::load(CONFIG_PATH)?;
    let log_file = config
        .debug_logging
        .then(|| PathBuf::from("hud_overlay.log"));
    hud_overlay::logging::init(config.debug_logging, log_file);

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([420.0, 300.0])
            .with_min_inner_size([320.0, 220.0]),
        ..Default::default()
    };

    let title = config.window_title.clone();
    eframe::run_native(
        &title,
        native_options,
        Box::new(move |_cc| Box::new(DemoApp::new(&config))),
    )
    .map_err(|e| anyhow::anyhow!(e.to_string()))
}
