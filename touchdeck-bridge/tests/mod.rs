use std::time::Duration;

use clap::Parser;
use winit::event::{ElementState, MouseButton, TouchPhase};
use winit::keyboard::{Key, NamedKey};

use touchdeck_bridge::cli::Cli;
use touchdeck_bridge::demo;
use touchdeck_bridge::gfx::{Layer, LayerPlan, QuadInstance};
use touchdeck_bridge::shell::{PointerTracker, key_input};
use touchdeck_bridge::{StartupError, prepare};
use touchdeck_core::{Fill, InputEvent, LayoutError, Rect, Rgba};
use touchdeck_io::{Endpoint, MatrixKind};

// ============================================================================
// Helpers
// ============================================================================

fn cli(args: &[&str]) -> Cli {
    let mut argv = vec!["touchdeck"];
    argv.extend_from_slice(args);
    match Cli::try_parse_from(argv) {
        Ok(cli) => cli,
        Err(e) => panic!("arguments rejected: {}", e),
    }
}

fn fill(rect: Rect, radius: f32, blur: f32) -> Fill {
    Fill {
        rect,
        top: Rgba::WHITE,
        bottom: Rgba::BLACK,
        radius,
        blur,
    }
}

fn page_titles(args: &[&str]) -> Vec<String> {
    let cli = cli(args);
    let (panel, _env) = prepare(|panel, env| demo::build(&cli, panel, env)).expect("demo panel builds");
    panel.pages().map(|p| p.title().to_string()).collect()
}

// ============================================================================
// Command line
// ============================================================================

#[test]
fn test_cli_defaults() {
    let cli = cli(&[]);
    let config = cli.launch_config().unwrap();
    assert_eq!((config.width, config.height), (1024, 600));
    assert!(!config.fullscreen);
    assert!(config.show_cursor);
    assert_eq!(config.gamma, 1.0);
    assert_eq!(config.frame_interval(), None);
    assert_eq!(config.verbosity, 0);
    assert_eq!(cli.matrix_kind, MatrixKind::Extron);
    assert!(cli.mpd.is_none());
}

#[test]
fn test_cli_launch_flags() {
    let cli = cli(&["-vv", "-q", "-f", "-c", "-r", "25", "-g", "800x480", "-G", "2.2"]);
    let config = cli.launch_config().unwrap();
    assert_eq!(config.verbosity, 1);
    assert!(config.fullscreen);
    assert!(!config.show_cursor);
    assert_eq!((config.width, config.height), (800, 480));
    assert_eq!(config.frame_interval(), Some(Duration::from_millis(40)));
    assert_eq!(config.gamma, 2.2);
    assert_eq!(config.log_level(), tracing::Level::DEBUG);
}

#[test]
fn test_cli_quiet_lowers_level() {
    let config = cli(&["-qq"]).launch_config().unwrap();
    assert_eq!(config.log_level(), tracing::Level::ERROR);
}

#[test]
fn test_cli_rejects_bad_geometry() {
    assert!(cli(&["-g", "wide"]).launch_config().is_err());
    assert!(cli(&["-g", "0x600"]).launch_config().is_err());
}

#[test]
fn test_cli_rejects_bad_gamma() {
    assert!(cli(&["-G", "0"]).launch_config().is_err());
}

#[test]
fn test_cli_matrix_kind() {
    assert_eq!(cli(&["--matrix-kind", "lw"]).matrix_kind, MatrixKind::Lightware);
    assert_eq!(cli(&["--matrix-kind", "Kramer"]).matrix_kind, MatrixKind::Kramer);
    assert!(Cli::try_parse_from(["touchdeck", "--matrix-kind", "crestron"]).is_err());
}

#[test]
fn test_matrix_endpoint_tcp_uses_vendor_port() {
    let cli = cli(&["--matrix", "10.0.0.7", "--matrix-kind", "kramer"]);
    assert_eq!(demo::matrix_endpoint(&cli), Some(Endpoint::tcp("10.0.0.7", 5000)));

    let cli = self::cli(&["--matrix", "10.0.0.7:2023"]);
    assert_eq!(demo::matrix_endpoint(&cli), Some(Endpoint::tcp("10.0.0.7", 2023)));
}

#[test]
fn test_matrix_endpoint_serial_wins() {
    let cli = cli(&["--matrix", "10.0.0.7", "--matrix-serial", "/dev/ttyUSB0"]);
    assert_eq!(demo::matrix_endpoint(&cli), Some(Endpoint::serial("/dev/ttyUSB0", 9600)));
    assert_eq!(demo::matrix_endpoint(&self::cli(&[])), None);
}

// ============================================================================
// Startup
// ============================================================================

#[test]
fn test_demo_without_devices_has_clock_only() {
    assert_eq!(page_titles(&[]), vec!["Clock"]);
}

#[test]
fn test_demo_pages_follow_devices() {
    let titles = page_titles(&[
        "--mpd",
        "127.0.0.1:1",
        "--matrix",
        "127.0.0.1:1",
        "--webhook",
        "http://127.0.0.1:1",
    ]);
    assert_eq!(titles, vec!["Clock", "Music", "Video", "Scenes"]);
}

#[test]
fn test_demo_registers_devices() {
    let cli = cli(&["--webhook", "http://127.0.0.1:1", "--matrix", "127.0.0.1:1"]);
    let (_panel, env) = prepare(|panel, env| demo::build(&cli, panel, env)).unwrap();
    assert_eq!(env.devices().len(), 2);
}

#[test]
fn test_prepare_reports_layout_errors() {
    let result = prepare(|_, _| Err(LayoutError::UnknownPage(3).into()));
    match result {
        Err(StartupError::Setup(LayoutError::UnknownPage(3))) => {}
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("setup should fail"),
    }
}

#[test]
fn test_prepare_wraps_other_errors() {
    let result = prepare(|_, _| Err(anyhow::anyhow!("no config file")));
    match result {
        Err(StartupError::Init(e)) => assert_eq!(e.to_string(), "no config file"),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("setup should fail"),
    }
}

#[test]
fn test_startup_error_messages() {
    let e = StartupError::Setup(LayoutError::UnknownPage(3));
    assert_eq!(e.to_string(), "invalid panel layout: no page with index 3");
    let e = StartupError::RenderInit("no adapter".into());
    assert_eq!(e.to_string(), "could not initialize the renderer: no adapter");
}

// ============================================================================
// Box geometry
// ============================================================================

#[test]
fn test_quad_skips_empty_boxes() {
    assert!(QuadInstance::from_fill(&fill(Rect::new(0.0, 0.0, 0.0, 10.0), 0.0, 1.0)).is_none());
    let mut invisible = fill(Rect::new(0.0, 0.0, 10.0, 10.0), 0.0, 1.0);
    invisible.top = Rgba::TRANSPARENT;
    invisible.bottom = Rgba::TRANSPARENT;
    assert!(QuadInstance::from_fill(&invisible).is_none());
}

#[test]
fn test_quad_clamps_radius_and_blur() {
    let quad = QuadInstance::from_fill(&fill(Rect::new(10.0, 20.0, 100.0, 40.0), 50.0, 0.0)).unwrap();
    assert_eq!(quad.radius, 20.0);
    assert_eq!(quad.blur, 1.0);
    assert_eq!((quad.x0, quad.y0, quad.x1, quad.y1), (10.0, 20.0, 110.0, 60.0));
    assert_eq!(quad.top, [1.0, 1.0, 1.0, 1.0]);
    assert_eq!(quad.bottom, [0.0, 0.0, 0.0, 1.0]);
}

#[test]
fn test_quad_vertices_cover_soft_edge() {
    let quad = QuadInstance::from_fill(&fill(Rect::new(10.0, 20.0, 100.0, 40.0), 0.0, 9.0)).unwrap();
    let vertices = quad.vertices();
    let xs: Vec<f32> = vertices.iter().map(|v| v.pos[0]).collect();
    let ys: Vec<f32> = vertices.iter().map(|v| v.pos[1]).collect();
    assert_eq!(xs.iter().cloned().fold(f32::MAX, f32::min), 5.5);
    assert_eq!(xs.iter().cloned().fold(f32::MIN, f32::max), 114.5);
    assert_eq!(ys.iter().cloned().fold(f32::MAX, f32::min), 15.5);
    assert_eq!(ys.iter().cloned().fold(f32::MIN, f32::max), 64.5);
    assert!(vertices.iter().all(|v| v.rect == [10.0, 20.0, 110.0, 60.0]));
    assert!(vertices.iter().all(|v| v.shape == [0.0, 9.0]));
}

// ============================================================================
// Layering
// ============================================================================

#[test]
fn test_layers_merge_consecutive_fills() {
    let mut plan = LayerPlan::default();
    plan.fill(0, 6);
    plan.fill(6, 12);
    assert_eq!(plan.text(), 0);
    assert_eq!(plan.text(), 0);
    assert_eq!(plan.layers(), &[Layer { quads: 0..12, texts: 2 }]);
}

#[test]
fn test_fill_after_text_opens_layer() {
    let mut plan = LayerPlan::default();
    plan.fill(0, 6);
    assert_eq!(plan.text(), 0);
    plan.fill(6, 12);
    assert_eq!(plan.text(), 1);
    assert_eq!(
        plan.layers(),
        &[Layer { quads: 0..6, texts: 1 }, Layer { quads: 6..12, texts: 1 }]
    );
}

#[test]
fn test_text_first_gets_empty_layer() {
    let mut plan = LayerPlan::default();
    assert_eq!(plan.text(), 0);
    plan.fill(0, 6);
    assert_eq!(plan.layers().len(), 2);
    assert!(plan.layers()[0].quads.is_empty());
}

// ============================================================================
// Pointer translation
// ============================================================================

#[test]
fn test_mouse_click_sequence() {
    let mut pointer = PointerTracker::new();
    assert_eq!(pointer.mouse_button(MouseButton::Left, ElementState::Pressed), None);
    assert_eq!(pointer.cursor_moved(10.0, 20.0), None);
    assert_eq!(
        pointer.mouse_button(MouseButton::Left, ElementState::Pressed),
        Some(InputEvent::PointerDown { x: 10.0, y: 20.0 })
    );
    assert!(pointer.is_down());
    assert_eq!(pointer.cursor_moved(12.0, 22.0), Some(InputEvent::PointerMove { x: 12.0, y: 22.0 }));
    assert_eq!(
        pointer.mouse_button(MouseButton::Left, ElementState::Released),
        Some(InputEvent::PointerUp { x: 12.0, y: 22.0 })
    );
    assert!(!pointer.is_down());
    assert_eq!(pointer.mouse_button(MouseButton::Left, ElementState::Released), None);
}

#[test]
fn test_other_mouse_buttons_ignored() {
    let mut pointer = PointerTracker::new();
    pointer.cursor_moved(10.0, 20.0);
    assert_eq!(pointer.mouse_button(MouseButton::Right, ElementState::Pressed), None);
    assert!(!pointer.is_down());
}

#[test]
fn test_first_finger_drives_pointer() {
    let mut pointer = PointerTracker::new();
    assert_eq!(
        pointer.touch(1, TouchPhase::Started, 5.0, 6.0),
        Some(InputEvent::PointerDown { x: 5.0, y: 6.0 })
    );
    assert_eq!(pointer.touch(2, TouchPhase::Started, 50.0, 60.0), None);
    assert_eq!(pointer.touch(2, TouchPhase::Moved, 51.0, 61.0), None);
    assert_eq!(
        pointer.touch(1, TouchPhase::Moved, 7.0, 8.0),
        Some(InputEvent::PointerMove { x: 7.0, y: 8.0 })
    );
    assert_eq!(pointer.touch(2, TouchPhase::Ended, 51.0, 61.0), None);
    assert_eq!(
        pointer.touch(1, TouchPhase::Ended, 7.0, 8.0),
        Some(InputEvent::PointerUp { x: 7.0, y: 8.0 })
    );
    assert!(!pointer.is_down());
}

#[test]
fn test_cancelled_touch_releases_off_screen() {
    let mut pointer = PointerTracker::new();
    pointer.touch(4, TouchPhase::Started, 5.0, 6.0);
    assert_eq!(
        pointer.touch(4, TouchPhase::Cancelled, 5.0, 6.0),
        Some(InputEvent::PointerUp { x: -1.0, y: -1.0 })
    );
}

#[test]
fn test_mouse_ignored_while_finger_down() {
    let mut pointer = PointerTracker::new();
    pointer.cursor_moved(1.0, 1.0);
    pointer.touch(1, TouchPhase::Started, 5.0, 6.0);
    assert_eq!(pointer.mouse_button(MouseButton::Left, ElementState::Pressed), None);
}

#[test]
fn test_character_keys_only() {
    assert_eq!(key_input(&Key::Character("q".into()), ElementState::Pressed), Some(InputEvent::Key('q')));
    assert_eq!(key_input(&Key::Character("q".into()), ElementState::Released), None);
    assert_eq!(key_input(&Key::Named(NamedKey::Enter), ElementState::Pressed), None);
}
