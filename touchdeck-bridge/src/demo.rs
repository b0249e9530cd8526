//! The panel the `touchdeck` binary shows: a clock page plus one page for
//! each device named on the command line.

use std::time::Duration;

use anyhow::bail;
use serde_json::json;

use touchdeck_core::widget::{Button, Clock, Group, Label, PlayerStatus, StatusLamp, fade_indicator};
use touchdeck_core::{
    Context, DeviceId, Environment, Event, EventDetail, EventKind, Grid, Panel, PageStyle, Widget,
    WidgetHandle, hex,
};
use touchdeck_io::{
    Endpoint, HttpConfig, HttpRequest, MatrixConfig, MatrixKind, PlayerCommand, PlayerConfig, Tie,
    player,
};

use crate::cli::Cli;

const FADES: [u64; 2] = [10, 60];
const VOLUMES: [u8; 3] = [30, 60, 90];
const MATRIX_INPUTS: usize = 4;
const SCENES: [&str; 3] = ["Presentation", "Video", "Lights off"];

/// Populate `panel` from the command line. Pass to `run_application`.
pub fn build(cli: &Cli, panel: &mut Panel, env: &mut Environment) -> anyhow::Result<()> {
    clock_page(panel)?;
    if let Some(spec) = &cli.mpd {
        player_page(panel, env, spec)?;
    }
    if let Some(endpoint) = matrix_endpoint(cli) {
        matrix_page(panel, env, cli.matrix_kind, endpoint)?;
    }
    if let Some(url) = &cli.webhook {
        scene_page(panel, env, url)?;
    }
    Ok(())
}

/// Serial wins over TCP when both are given.
pub fn matrix_endpoint(cli: &Cli) -> Option<Endpoint> {
    match (&cli.matrix_serial, &cli.matrix) {
        (Some(path), _) => Some(Endpoint::serial(path.as_str(), cli.matrix_baud)),
        (None, Some(spec)) => Some(Endpoint::parse_tcp(spec, cli.matrix_kind.default_port())),
        (None, None) => None,
    }
}

// ════════════════════════════════════════════════════════════════════
// Pages
// ════════════════════════════════════════════════════════════════════

fn clock_page(panel: &mut Panel) -> anyhow::Result<()> {
    let style = PageStyle::default().with_gradient(hex("234"), hex("012"));
    let page = panel.add_page_styled("Clock", Grid::new(16, 8), style);
    panel.page_mut(page)?.pack(4, 0, 8, 8, Clock::new())?;
    Ok(())
}

fn player_page(panel: &mut Panel, env: &mut Environment, spec: &str) -> anyhow::Result<()> {
    let Endpoint::Tcp { host, port } = Endpoint::parse_tcp(spec, player::DEFAULT_PORT) else {
        bail!("--mpd expects HOST[:PORT], got '{}'", spec);
    };
    let player = env.add_player(PlayerConfig::new(host, port));

    let style = PageStyle::default()
        .with_gradient(hex("324"), hex("102"))
        .with_label("\u{266B}");
    let page = panel.add_page_styled("Music", Grid::new(16, 8), style);
    let p = panel.page_mut(page)?;

    p.pack(0, 0, 12, 6, PlayerStatus::new(player))?;
    p.pack(12, 0, 4, 1, StatusLamp::new(player, "MPD"))?;

    p.locate(12, 2);
    let mut fades = Vec::new();
    for secs in FADES {
        let duration = Duration::from_secs(secs);
        let button = Button::new(format!("Fade {} s", secs))
            .with_hue(300.0, 0.1)
            .lit_by(fade_indicator(player, duration));
        fades.push((p.pack_next(2, 2, button)?, duration));
    }
    p.add_group_label("Fades")?;
    let shuffle = p.pack(12, 5, 4, 2, Button::new("Shuffle all").with_hue(300.0, 0.1))?;

    p.locate(0, 7);
    let mut volumes = Vec::new();
    for volume in VOLUMES {
        volumes.push((p.pack_next(3, 1, Button::new(format!("{} %", volume)))?, volume));
    }
    p.add_group_label("Volume")?;

    for (button, duration) in fades {
        panel.bind(button, EventKind::Activated, move |ctx, _| {
            let _ = ctx.send(player, PlayerCommand::ToggleFade { duration });
        })?;
    }
    panel.bind(shuffle, EventKind::Activated, move |ctx, _| {
        let command = PlayerCommand::ShuffleFolders {
            folders: vec![String::new()],
            single: false,
        };
        let _ = ctx.send(player, command);
    })?;
    for (button, volume) in volumes {
        panel.bind(button, EventKind::Activated, move |ctx, _| {
            let _ = ctx.send(player, PlayerCommand::SetVolume(volume));
        })?;
    }
    Ok(())
}

fn matrix_page(
    panel: &mut Panel,
    env: &mut Environment,
    kind: MatrixKind,
    endpoint: Endpoint,
) -> anyhow::Result<()> {
    let name = match &endpoint {
        Endpoint::Tcp { host, .. } => format!("{}-{}", kind.label(), host),
        Endpoint::Serial { path, .. } => format!("{}-{}", kind.label(), path),
    };
    let matrix = env.add_matrix(kind, MatrixConfig::new(name, endpoint));

    let style = PageStyle::default().with_gradient(hex("243"), hex("021"));
    let page = panel.add_page_styled("Video", Grid::new(16, 8), style);
    let p = panel.page_mut(page)?;

    p.pack(0, 0, 4, 1, StatusLamp::new(matrix, kind.label()))?;

    p.locate(0, 2);
    let mut all = Vec::new();
    for input in 0..MATRIX_INPUTS {
        all.push(p.pack_next(3, 2, Button::new(format!("Input {}", input + 1)).with_hue(140.0, 0.1))?);
    }
    p.add_group_label("All displays")?;

    let status = p.pack(0, 5, 16, 1, Label::new("").with_size(35.0))?;

    let group = p.pack(0, 6, 16, 2, Group::new(8, 1).with_caption("Display 1").framed())?;
    let mut first = Vec::new();
    for input in 0..MATRIX_INPUTS {
        let button = Button::new(format!("In {}", input + 1)).with_size(35.0);
        first.push(p.pack_in(group, input as u16 * 2, 0, 2, 1, button)?);
    }

    bind_routes(panel, matrix, &all, status, |input| Tie::new(input, 0..MATRIX_INPUTS))?;
    bind_routes(panel, matrix, &first, status, |input| Tie::new(input, [0]))?;
    Ok(())
}

/// Button `i` routes the tie `tie(i)`. The buttons act as one radio group.
fn bind_routes(
    panel: &mut Panel,
    matrix: DeviceId,
    buttons: &[WidgetHandle],
    status: WidgetHandle,
    tie: impl Fn(usize) -> Tie,
) -> anyhow::Result<()> {
    for (input, &button) in buttons.iter().enumerate() {
        let group = buttons.to_vec();
        let tie = tie(input);
        panel.bind(button, EventKind::Activated, move |ctx, _| {
            select(ctx, &group, button);
            if ctx.send(matrix, tie.clone()).is_err() {
                show(ctx, status, "Not sent");
            }
        })?;
        panel.bind(button, EventKind::CommandFailed, move |ctx, event| report(ctx, status, event))?;
        panel.bind(button, EventKind::CommandCompleted, move |ctx, _| show(ctx, status, ""))?;
    }
    Ok(())
}

fn scene_page(panel: &mut Panel, env: &mut Environment, url: &str) -> anyhow::Result<()> {
    let hook = env.add_http(HttpConfig::new("webhook", url))?;

    let page = panel.add_page("Scenes", Grid::new(16, 8));
    let p = panel.page_mut(page)?;
    p.pack(12, 0, 4, 1, StatusLamp::new(hook, "Webhook"))?;

    p.locate(2, 2);
    let mut scenes = Vec::new();
    for scene in SCENES {
        scenes.push((p.pack_next(4, 3, Button::new(scene).with_hue(60.0, 0.12))?, scene));
    }
    p.add_group_label("Scenes")?;
    let status = p.pack(0, 6, 16, 1, Label::new("").with_size(35.0))?;

    for (button, scene) in scenes {
        panel.bind(button, EventKind::Activated, move |ctx, _| {
            let request = HttpRequest::post_json("/scene", json!({ "scene": scene }));
            if ctx.send(hook, request).is_err() {
                show(ctx, status, "Not sent");
            }
        })?;
        panel.bind(button, EventKind::CommandCompleted, move |ctx, _| {
            show(ctx, status, format!("{}: done", scene));
        })?;
        panel.bind(button, EventKind::CommandFailed, move |ctx, event| report(ctx, status, event))?;
    }
    Ok(())
}

// ════════════════════════════════════════════════════════════════════
// Handler helpers
// ════════════════════════════════════════════════════════════════════

fn show(ctx: &mut Context<'_>, label: WidgetHandle, text: impl Into<String>) {
    if let Some(label) = ctx.panel_mut().widget_mut(label).and_then(Widget::as_label_mut) {
        label.set_text(text);
    }
}

fn report(ctx: &mut Context<'_>, label: WidgetHandle, event: &Event) {
    if let EventDetail::Failed { error, .. } = &event.detail {
        show(ctx, label, error.to_string());
    }
}

fn select(ctx: &mut Context<'_>, group: &[WidgetHandle], chosen: WidgetHandle) {
    for &handle in group {
        if let Some(button) = ctx.panel_mut().widget_mut(handle).and_then(Widget::as_button_mut) {
            button.set_active(handle == chosen);
        }
    }
}
