use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::runtime::Runtime;
use touchdeck_io::player::{fade_volume, metadata_from_file, shuffle_folders};
use touchdeck_io::session::{Frame, Protocol, Step, split_line};
use touchdeck_io::{
    Backoff, CommandOutcome, DeviceClient, DeviceCommand, DeviceError, DeviceView, Endpoint,
    Extron, FadeDirection, Geometry, HttpClient, HttpConfig, HttpRequest, Kramer, LinkState,
    Lightware, MatrixClient, MatrixConfig, PlayerClient, PlayerCommand, PlayerConfig, Reply, Tie,
    Vendor,
};

const PUMP_LIMIT: Duration = Duration::from_secs(5);

type Log = Arc<Mutex<Vec<String>>>;

fn runtime() -> Runtime {
    Runtime::new().expect("runtime")
}

/// Poll `client` until `done` holds, collecting every outcome on the way.
fn pump<C: DeviceClient>(
    client: &mut C,
    mut done: impl FnMut(&C, &[CommandOutcome]) -> bool,
) -> Vec<CommandOutcome> {
    let deadline = Instant::now() + PUMP_LIMIT;
    let mut outcomes = Vec::new();
    loop {
        outcomes.extend(client.poll(Instant::now()));
        if done(client, &outcomes) {
            return outcomes;
        }
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

fn wait_for(log: &Log, mut done: impl FnMut(&[String]) -> bool) -> Vec<String> {
    let deadline = Instant::now() + PUMP_LIMIT;
    loop {
        let seen = log.lock().unwrap().clone();
        if done(&seen) {
            return seen;
        }
        assert!(Instant::now() < deadline, "server never saw {:?}", seen);
        thread::sleep(Duration::from_millis(5));
    }
}

fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

// ============================================================================
// Fake MPD server
// ============================================================================

struct FakeMpd {
    port: u16,
    log: Log,
    connections: Arc<Mutex<usize>>,
}

#[derive(Clone)]
struct MpdState {
    playing: bool,
    volume: u8,
}

fn fake_mpd(greeting: &'static str, playing: bool, drop_first: bool) -> FakeMpd {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let log: Log = Arc::default();
    let connections = Arc::new(Mutex::new(0usize));
    let state = Arc::new(Mutex::new(MpdState {
        playing,
        volume: 80,
    }));
    let (log2, conns2) = (log.clone(), connections.clone());
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { return };
            let n = {
                let mut c = conns2.lock().unwrap();
                *c += 1;
                *c
            };
            let (log, state) = (log2.clone(), state.clone());
            thread::spawn(move || {
                stream.write_all(greeting.as_bytes()).unwrap();
                let reader = BufReader::new(stream.try_clone().unwrap());
                for line in reader.lines() {
                    let Ok(line) = line else { return };
                    log.lock().unwrap().push(line.clone());
                    if drop_first && n == 1 {
                        return;
                    }
                    let reply = mpd_reply(&line, &mut state.lock().unwrap());
                    if stream.write_all(reply.as_bytes()).is_err() {
                        return;
                    }
                }
            });
        }
    });
    FakeMpd {
        port,
        log,
        connections,
    }
}

fn mpd_reply(line: &str, state: &mut MpdState) -> String {
    if let Some(v) = line.strip_prefix("setvol ") {
        state.volume = v.parse().unwrap_or(state.volume);
    }
    match line {
        "status" => format!(
            "volume: {}\nrepeat: 1\nstate: {}\nsong: 2\nsongid: 7\nplaylistlength: 12\nelapsed: 65.2\nduration: 220.0\nOK\n",
            state.volume,
            if state.playing { "play" } else { "pause" }
        ),
        "currentsong" => "file: music/Artist_Name - Some Album - the_title.mp3\nId: 7\nOK\n".into(),
        "play" => {
            state.playing = true;
            "OK\n".into()
        }
        "pause 1" => {
            state.playing = false;
            "OK\n".into()
        }
        "bogus" => "ACK [5@0] {bogus} unknown command \"bogus\"\n".into(),
        _ => "OK\n".into(),
    }
}

fn mpd_client(port: u16, rt: &Runtime) -> PlayerClient {
    let config = PlayerConfig {
        name: "test-mpd".into(),
        host: "127.0.0.1".into(),
        port,
        timeout: Duration::from_millis(500),
        status_interval: Duration::from_millis(50),
        ..PlayerConfig::default()
    };
    PlayerClient::new(config, rt.handle().clone())
}

fn snapshot(client: &PlayerClient) -> touchdeck_io::PlayerSnapshot {
    client.snapshot().clone()
}

// ============================================================================
// Backoff Tests
// ============================================================================

#[test]
fn test_backoff_doubles_until_cap() {
    let mut backoff = Backoff::new(Duration::from_millis(250), Duration::from_secs(1));
    let delays: Vec<_> = (0..5).map(|_| backoff.next_delay()).collect();
    assert_eq!(
        delays,
        vec![
            Duration::from_millis(250),
            Duration::from_millis(500),
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(1),
        ]
    );
    assert!(delays.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_backoff_reset_starts_over() {
    let mut backoff = Backoff::default();
    backoff.next_delay();
    backoff.next_delay();
    backoff.reset();
    assert_eq!(backoff.next_delay(), Backoff::DEFAULT_INITIAL);
}

// ============================================================================
// Endpoint Tests
// ============================================================================

#[test]
fn test_endpoint_parse_with_port() {
    assert_eq!(
        Endpoint::parse_tcp("10.0.1.88:2323", 23),
        Endpoint::tcp("10.0.1.88", 2323)
    );
}

#[test]
fn test_endpoint_parse_default_port() {
    assert_eq!(Endpoint::parse_tcp("mpd.local", 6600), Endpoint::tcp("mpd.local", 6600));
}

#[test]
fn test_endpoint_display() {
    assert_eq!(Endpoint::serial("/dev/ttyUSB0", 9600).to_string(), "/dev/ttyUSB0@9600");
    assert_eq!(Endpoint::tcp("localhost", 23).to_string(), "localhost:23");
}

#[test]
fn test_split_line_skips_blank_lines() {
    let mut buf = b"\r\nOK\r\nvolume: 5\npartial".to_vec();
    assert_eq!(split_line(&mut buf), Some(b"OK".to_vec()));
    assert_eq!(split_line(&mut buf), Some(b"volume: 5".to_vec()));
    assert_eq!(split_line(&mut buf), None);
    assert_eq!(buf, b"partial".to_vec());
}

// ============================================================================
// MPD Helper Tests
// ============================================================================

#[test]
fn test_metadata_from_three_part_filename() {
    let [title, artist, album] = metadata_from_file("music/Artist_Name - Some Album - the_title.mp3");
    assert_eq!(title, "The Title");
    assert_eq!(artist, "Artist Name");
    assert_eq!(album, "Some Album");
}

#[test]
fn test_metadata_from_two_part_filename() {
    let [title, artist, album] = metadata_from_file("band--song.ogg");
    assert_eq!(title, "Song");
    assert_eq!(artist, "Band");
    assert_eq!(album, "");
}

#[test]
fn test_metadata_keeps_plain_hyphens() {
    let [title, artist, _] = metadata_from_file("x-ray.flac");
    assert_eq!(title, "X-Ray");
    assert_eq!(artist, "");
}

#[test]
fn test_shuffle_folders_repeat_mode() {
    assert_eq!(
        shuffle_folders(&["calm", "trance"], false),
        vec![
            "stop",
            "clear",
            "random 0",
            "single 0",
            "repeat 1",
            "add \"calm\"",
            "add \"trance\"",
            "shuffle",
            "play"
        ]
    );
}

#[test]
fn test_shuffle_folders_single_mode() {
    let lines = shuffle_folders(&["jingles"], true);
    assert_eq!(&lines[3..5], &["single 1", "repeat 0"]);
}

#[test]
fn test_fade_volume_interpolates_and_clamps() {
    assert_eq!(fade_volume(80, 0, 0.0), 80);
    assert_eq!(fade_volume(80, 0, 0.5), 40);
    assert_eq!(fade_volume(80, 0, 1.0), 0);
    assert_eq!(fade_volume(0, 100, 2.0), 100);
    assert_eq!(fade_volume(0, 100, -1.0), 0);
}

#[test]
fn test_snapshot_text_without_status() {
    let snap = touchdeck_io::PlayerSnapshot::default();
    assert_eq!(snap.track_text(), "\u{2013} / \u{2013}");
    assert_eq!(snap.time_text(), "\u{2013} / \u{2013}");
}

// ============================================================================
// MPD Client Tests
// ============================================================================

#[test]
fn test_mpd_connects_and_reads_status() {
    let rt = runtime();
    let server = fake_mpd("OK MPD 0.23.5\n", true, false);
    let mut client = mpd_client(server.port, &rt);

    pump(&mut client, |c, _| !c.snapshot().title.is_empty());
    let snap = snapshot(&client);
    assert!(snap.connected);
    assert!(snap.is_playing());
    assert_eq!(snap.volume, Some(80));
    assert_eq!(snap.title, "The Title");
    assert_eq!(snap.artist, "Artist Name");
    assert_eq!(snap.album, "Some Album");
    assert_eq!(snap.track_text(), "3 / 12");
    assert_eq!(snap.time_text(), "1:05 / 3:40");
    assert_eq!(client.status().state, LinkState::Connected);
    client.shutdown();
}

#[test]
fn test_mpd_play_while_paused_is_muted() {
    let rt = runtime();
    let server = fake_mpd("OK MPD 0.23.5\n", false, false);
    let mut client = mpd_client(server.port, &rt);
    pump(&mut client, |c, _| c.snapshot().song_id.is_some());

    let ticket = client.send_command(PlayerCommand::Play.into()).unwrap();
    let outcomes = pump(&mut client, |_, o| o.iter().any(|o| o.ticket == ticket));
    assert!(outcomes.iter().any(|o| o.ticket == ticket && o.result.is_ok()));

    let seen = server.log.lock().unwrap().clone();
    let at = seen.iter().position(|l| l == "setvol 0").expect("muted first");
    assert_eq!(&seen[at..at + 3], &["setvol 0", "play", "setvol 100"]);
}

#[test]
fn test_mpd_pause_while_playing_is_direct() {
    let rt = runtime();
    let server = fake_mpd("OK MPD 0.23.5\n", true, false);
    let mut client = mpd_client(server.port, &rt);
    pump(&mut client, |c, _| c.snapshot().is_playing());

    let ticket = client.send_command(PlayerCommand::TogglePlay.into()).unwrap();
    pump(&mut client, |_, o| o.iter().any(|o| o.ticket == ticket));
    let seen = server.log.lock().unwrap().clone();
    assert!(seen.contains(&"pause 1".to_string()));
    assert!(!seen.contains(&"setvol 0".to_string()));
}

#[test]
fn test_mpd_seek_is_signed() {
    let rt = runtime();
    let server = fake_mpd("OK MPD 0.23.5\n", true, false);
    let mut client = mpd_client(server.port, &rt);
    pump(&mut client, |c, _| c.snapshot().connected);

    let back = client.send_command(PlayerCommand::Seek(-10).into()).unwrap();
    let fwd = client.send_command(PlayerCommand::Seek(10).into()).unwrap();
    pump(&mut client, |_, o| {
        o.iter().any(|o| o.ticket == back) && o.iter().any(|o| o.ticket == fwd)
    });
    let seen = server.log.lock().unwrap().clone();
    assert!(seen.contains(&"seekcur -10".to_string()));
    assert!(seen.contains(&"seekcur +10".to_string()));
}

#[test]
fn test_mpd_ack_is_protocol_error() {
    let rt = runtime();
    let server = fake_mpd("OK MPD 0.23.5\n", true, false);
    let mut client = mpd_client(server.port, &rt);
    pump(&mut client, |c, _| c.snapshot().connected);

    let ticket = client
        .send_command(PlayerCommand::Raw(vec!["bogus".into()]).into())
        .unwrap();
    let outcomes = pump(&mut client, |_, o| o.iter().any(|o| o.ticket == ticket));
    let outcome = outcomes.iter().find(|o| o.ticket == ticket).unwrap();
    match &outcome.result {
        Err(DeviceError::Protocol(msg)) => assert!(msg.contains("unknown command")),
        other => panic!("expected protocol error, got {:?}", other),
    }
    // An ACK does not take the link down.
    assert_eq!(client.status().state, LinkState::Connected);
}

#[test]
fn test_mpd_rejects_foreign_greeting() {
    let rt = runtime();
    let server = fake_mpd("OK FTP ready\n", true, false);
    let mut client = mpd_client(server.port, &rt);
    pump(&mut client, |c, _| c.status().state == LinkState::Error);
    assert!(matches!(
        client.status().last_error,
        Some(DeviceError::Protocol(_))
    ));
    assert!(!client.snapshot().connected);
}

#[test]
fn test_mpd_reconnects_and_retries_after_drop() {
    let rt = runtime();
    let server = fake_mpd("OK MPD 0.23.5\n", true, true);
    let mut client = mpd_client(server.port, &rt);
    pump(&mut client, |c, _| c.snapshot().song_id == Some(7));
    assert!(*server.connections.lock().unwrap() >= 2);
    assert_eq!(client.status().state, LinkState::Connected);
}

#[test]
fn test_mpd_commands_sent_across_a_drop_all_resolve() {
    let rt = runtime();
    let server = fake_mpd("OK MPD 0.23.5\n", true, true);
    let mut client = mpd_client(server.port, &rt);

    // Keep sending while the first connection is cut under us.
    let mut tickets = Vec::new();
    let mut outcomes = Vec::new();
    let deadline = Instant::now() + PUMP_LIMIT;
    while *server.connections.lock().unwrap() < 2 {
        outcomes.extend(client.poll(Instant::now()));
        let ping = PlayerCommand::Raw(vec!["ping".into()]);
        if let Ok(ticket) = client.send_command(ping.into()) {
            tickets.push(ticket);
        }
        assert!(Instant::now() < deadline, "server never saw a reconnect");
        thread::sleep(Duration::from_millis(1));
    }
    assert!(!tickets.is_empty());

    let rest = pump(&mut client, |_, o| {
        tickets
            .iter()
            .all(|t| outcomes.iter().chain(o).any(|x| x.ticket == *t))
    });
    assert!(rest.len() + outcomes.len() >= tickets.len());
    // The status refresh survives the drop too.
    pump(&mut client, |c, _| c.snapshot().song_id == Some(7));
    assert_eq!(client.status().state, LinkState::Connected);
}

#[test]
fn test_mpd_reconnect_backoff_grows_to_cap_without_blocking() {
    let rt = runtime();
    let cap = Duration::from_millis(80);
    let config = PlayerConfig {
        host: "127.0.0.1".into(),
        port: closed_port(),
        backoff_initial: Duration::from_millis(10),
        backoff_cap: cap,
        ..PlayerConfig::default()
    };
    let mut client = PlayerClient::new(config, rt.handle().clone());

    let mut delays = Vec::new();
    let mut recorded_attempt = 0;
    let deadline = Instant::now() + PUMP_LIMIT;
    while delays.len() < 6 {
        let started = Instant::now();
        client.poll(started);
        let spent = started.elapsed();
        assert!(spent < Duration::from_millis(50), "poll took {:?}", spent);

        let status = client.status();
        if status.state == LinkState::Disconnected && status.attempts > recorded_attempt {
            let delay = status.retry_delay.expect("retry scheduled");
            assert!(status.retry_in.is_some_and(|left| left <= delay));
            recorded_attempt = status.attempts;
            delays.push(delay);
        }
        assert!(Instant::now() < deadline, "only saw {:?}", delays);
        thread::sleep(Duration::from_millis(2));
    }
    assert!(delays.windows(2).all(|w| w[0] <= w[1]), "{:?}", delays);
    assert!(delays.iter().all(|d| *d <= cap), "{:?}", delays);
    assert_eq!(delays.last(), Some(&cap));
}

#[test]
fn test_send_while_disconnected_fails() {
    let rt = runtime();
    let mut client = mpd_client(closed_port(), &rt);
    pump(&mut client, |c, _| {
        let status = c.status();
        status.state == LinkState::Disconnected && status.last_error.is_some()
    });
    assert_eq!(
        client.send_command(PlayerCommand::Play.into()),
        Err(DeviceError::NotConnected)
    );
}

#[test]
fn test_mpd_rejects_routing() {
    let rt = runtime();
    let mut client = mpd_client(closed_port(), &rt);
    assert_eq!(
        client.send_command(DeviceCommand::Route(vec![Tie::new(0, [1])])),
        Err(DeviceError::Unsupported("routing"))
    );
}

#[test]
fn test_mpd_fade_out_ends_paused() {
    let rt = runtime();
    let server = fake_mpd("OK MPD 0.23.5\n", true, false);
    let mut client = mpd_client(server.port, &rt);
    pump(&mut client, |c, _| c.snapshot().volume == Some(80));

    client
        .send_command(
            PlayerCommand::Fade {
                direction: FadeDirection::Auto,
                duration: Duration::from_millis(200),
            }
            .into(),
        )
        .unwrap();
    assert!(client.snapshot().fade.is_some());
    pump(&mut client, |c, _| c.snapshot().fade.is_none());

    let seen = wait_for(&server.log, |s| s.iter().any(|l| l == "pause 1"));
    let volumes: Vec<u8> = seen
        .iter()
        .filter_map(|l| l.strip_prefix("setvol "))
        .map(|v| v.parse().unwrap())
        .collect();
    assert_eq!(volumes.first(), Some(&80));
    assert_eq!(volumes.last(), Some(&0));
    assert!(volumes.windows(2).all(|w| w[0] >= w[1]));
    let last_setvol = seen.iter().rposition(|l| l == "setvol 0").unwrap();
    assert_eq!(seen[last_setvol + 1], "pause 1");
}

#[test]
fn test_mpd_fade_to_current_volume_sends_nothing() {
    let rt = runtime();
    let server = fake_mpd("OK MPD 0.23.5\n", false, false);
    let config = PlayerConfig {
        name: "test-mpd".into(),
        host: "127.0.0.1".into(),
        port: server.port,
        timeout: Duration::from_millis(500),
        status_interval: Duration::from_secs(60),
        target_volume: 80,
        ..PlayerConfig::default()
    };
    let mut client = PlayerClient::new(config, rt.handle().clone());
    pump(&mut client, |c, _| c.snapshot().volume == Some(80));
    let before = server.log.lock().unwrap().len();

    let ticket = client
        .send_command(
            PlayerCommand::Fade {
                direction: FadeDirection::In,
                duration: Duration::from_secs(1),
            }
            .into(),
        )
        .unwrap();
    assert!(client.snapshot().fade.is_none());
    let outcomes = pump(&mut client, |_, o| o.iter().any(|o| o.ticket == ticket));
    assert!(outcomes
        .iter()
        .any(|o| o.ticket == ticket && o.result == Ok(Reply::Ack)));

    // The status refresh after the skipped fade is the only traffic.
    let seen = wait_for(&server.log, |s| s[before..].iter().any(|l| l == "status"));
    assert!(seen[before..]
        .iter()
        .all(|l| l != "play" && !l.starts_with("setvol")));
}

#[test]
fn test_mpd_toggle_fade_same_duration_stops() {
    let rt = runtime();
    let server = fake_mpd("OK MPD 0.23.5\n", true, false);
    let mut client = mpd_client(server.port, &rt);
    pump(&mut client, |c, _| c.snapshot().volume.is_some());

    let duration = Duration::from_secs(30);
    client
        .send_command(PlayerCommand::ToggleFade { duration }.into())
        .unwrap();
    assert_eq!(client.snapshot().fade.map(|f| f.direction), Some(FadeDirection::Out));

    let stop = client
        .send_command(PlayerCommand::ToggleFade { duration }.into())
        .unwrap();
    assert!(client.snapshot().fade.is_none());
    let outcomes = pump(&mut client, |_, o| o.iter().any(|o| o.ticket == stop));
    assert!(outcomes
        .iter()
        .any(|o| o.ticket == stop && o.result == Ok(Reply::Ack)));
}

#[test]
fn test_mpd_toggle_fade_other_duration_restarts() {
    let rt = runtime();
    let server = fake_mpd("OK MPD 0.23.5\n", true, false);
    let mut client = mpd_client(server.port, &rt);
    pump(&mut client, |c, _| c.snapshot().volume.is_some());

    client
        .send_command(PlayerCommand::ToggleFade { duration: Duration::from_secs(30) }.into())
        .unwrap();
    client
        .send_command(PlayerCommand::ToggleFade { duration: Duration::from_secs(60) }.into())
        .unwrap();
    let fade = client.snapshot().fade.expect("still fading");
    assert_eq!(fade.duration, Duration::from_secs(60));
    assert_eq!(fade.direction, FadeDirection::Out);
}

// ============================================================================
// Matrix Tests
// ============================================================================

fn fake_matrix(respond: fn(&[u8]) -> Vec<u8>, banner: &'static [u8]) -> (u16, Log) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let log: Log = Arc::default();
    let log2 = log.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { return };
            let log = log2.clone();
            thread::spawn(move || {
                let _ = stream.write_all(banner);
                let mut buf = [0u8; 256];
                loop {
                    let n = match stream.read(&mut buf) {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    log.lock()
                        .unwrap()
                        .push(String::from_utf8_lossy(&buf[..n]).into_owned());
                    if stream.write_all(&respond(&buf[..n])).is_err() {
                        return;
                    }
                }
            });
        }
    });
    (port, log)
}

fn extron_reply(req: &[u8]) -> Vec<u8> {
    if req == b"I" {
        b"V8X8 A8X8\r\n".to_vec()
    } else if req.starts_with(b"\x1b+Q") {
        b"Qik\r\n".to_vec()
    } else if req.starts_with(b"9") {
        b"E01\r\n".to_vec()
    } else {
        b"Out3 In2 All\r\n".to_vec()
    }
}

fn lightware_reply(req: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(req);
    if text == "{i}" {
        return b"(MX8x4HDMI-Pro)\r\n".to_vec();
    }
    text.split("\r\n")
        .filter(|t| !t.is_empty())
        .map(|_| "(O01 I01)\r\n")
        .collect::<String>()
        .into_bytes()
}

fn matrix_config(port: u16) -> MatrixConfig {
    MatrixConfig {
        timeout: Duration::from_millis(500),
        ..MatrixConfig::new("test-matrix", Endpoint::tcp("127.0.0.1", port))
    }
}

#[test]
fn test_extron_discovers_geometry_and_ties() {
    let rt = runtime();
    let (port, log) = fake_matrix(extron_reply, b"(c) Copyright 2024, Extron Electronics DXP\r\n");
    let mut client = MatrixClient::<Extron>::new(matrix_config(port), rt.handle().clone());
    pump(&mut client, |c, _| c.geometry().is_known());
    assert_eq!(client.geometry(), Geometry::new(8, 8));

    let ticket = client.tie(&[Tie::new(1, [2])]).unwrap();
    let outcomes = pump(&mut client, |_, o| o.iter().any(|o| o.ticket == ticket));
    assert!(outcomes.iter().all(|o| o.result.is_ok()));
    assert!(log.lock().unwrap().contains(&"2*3!".to_string()));
}

#[test]
fn test_extron_multi_tie_uses_qik_frame() {
    let rt = runtime();
    let (port, log) = fake_matrix(extron_reply, b"");
    let config = matrix_config(port).with_geometry(8, 8);
    let mut client = MatrixClient::<Extron>::new(config, rt.handle().clone());
    pump(&mut client, |c, _| c.status().state == LinkState::Connected);

    let ticket = client
        .send_command(DeviceCommand::Route(vec![Tie::new(0, [0, 1])]))
        .unwrap();
    let outcomes = pump(&mut client, |_, o| o.iter().any(|o| o.ticket == ticket));
    assert!(outcomes[0].result.is_ok());
    assert!(log
        .lock()
        .unwrap()
        .contains(&"\x1b+Q1*1!1*2!\r\n".to_string()));
}

#[test]
fn test_extron_error_code_is_protocol_error() {
    let rt = runtime();
    let (port, _log) = fake_matrix(extron_reply, b"");
    let config = matrix_config(port).with_geometry(16, 16);
    let mut client = MatrixClient::<Extron>::new(config, rt.handle().clone());
    pump(&mut client, |c, _| c.status().state == LinkState::Connected);

    let ticket = client.tie(&[Tie::new(8, [0])]).unwrap();
    let outcomes = pump(&mut client, |_, o| o.iter().any(|o| o.ticket == ticket));
    assert!(matches!(outcomes[0].result, Err(DeviceError::Protocol(_))));
}

#[test]
fn test_extron_replies_only_complete_their_own_command() {
    let mut extron = Extron::new(Geometry::default());
    extron.begin(&Step::new(b"I".to_vec(), 1));
    assert_eq!(extron.classify(b"Login Administrator"), Frame::Noise);
    assert_eq!(extron.classify(b"Qik"), Frame::Noise);
    assert_eq!(
        extron.classify(b"V8X8 A8X8"),
        Frame::Ack(vec![("geometry".into(), "8x8 a8x8".into())])
    );

    extron.begin(&Step::new(b"1*2!".to_vec(), 1));
    assert_eq!(extron.classify(b"Login User"), Frame::Noise);
    assert_eq!(extron.classify(b"V8X8 A8X8"), Frame::Noise);
    assert_eq!(extron.classify(b"Out2 In1 All"), Frame::Ack(Vec::new()));
    assert!(matches!(extron.classify(b"E13"), Frame::Reject(_)));
}

#[test]
fn test_extron_login_banner_does_not_ack_a_tie() {
    fn reply(req: &[u8]) -> Vec<u8> {
        if req.starts_with(b"5") {
            b"Login Administrator\r\nE10\r\n".to_vec()
        } else {
            extron_reply(req)
        }
    }
    let rt = runtime();
    let (port, _log) = fake_matrix(reply, b"");
    let config = matrix_config(port).with_geometry(8, 8);
    let mut client = MatrixClient::<Extron>::new(config, rt.handle().clone());
    pump(&mut client, |c, _| c.status().state == LinkState::Connected);

    let ticket = client.tie(&[Tie::new(4, [0])]).unwrap();
    let outcomes = pump(&mut client, |_, o| o.iter().any(|o| o.ticket == ticket));
    assert_eq!(
        outcomes[0].result,
        Err(DeviceError::Protocol("Extron error E10".into()))
    );
}

#[test]
fn test_tie_outside_geometry_is_rejected() {
    let rt = runtime();
    let (port, log) = fake_matrix(extron_reply, b"");
    let config = matrix_config(port).with_geometry(4, 4);
    let mut client = MatrixClient::<Extron>::new(config, rt.handle().clone());
    pump(&mut client, |c, _| c.status().state == LinkState::Connected);

    assert_eq!(client.tie(&[Tie::new(4, [0])]), Err(DeviceError::InvalidTie));
    assert_eq!(client.tie(&[Tie::new(0, [])]), Err(DeviceError::InvalidTie));
    thread::sleep(Duration::from_millis(50));
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_tie_drops_only_invalid_entries() {
    let rt = runtime();
    let (port, log) = fake_matrix(extron_reply, b"");
    let config = matrix_config(port).with_geometry(4, 4);
    let mut client = MatrixClient::<Extron>::new(config, rt.handle().clone());
    pump(&mut client, |c, _| c.status().state == LinkState::Connected);

    let ticket = client
        .tie(&[Tie::new(7, [0]), Tie::new(1, [2])])
        .unwrap();
    pump(&mut client, |_, o| o.iter().any(|o| o.ticket == ticket));
    assert_eq!(log.lock().unwrap().as_slice(), &["2*3!".to_string()]);
}

#[test]
fn test_lightware_acknowledges_each_tie() {
    let rt = runtime();
    let (port, log) = fake_matrix(lightware_reply, b"");
    let mut client = MatrixClient::<Lightware>::new(matrix_config(port), rt.handle().clone());
    pump(&mut client, |c, _| c.geometry().is_known());
    assert_eq!(client.geometry(), Geometry::new(8, 4));
    assert!(matches!(client.view(), DeviceView::Matrix(g) if g.outputs == 4));

    let ticket = client.tie(&[Tie::new(0, [1, 2])]).unwrap();
    let outcomes = pump(&mut client, |_, o| o.iter().any(|o| o.ticket == ticket));
    assert!(outcomes[0].result.is_ok());
    assert!(log
        .lock()
        .unwrap()
        .contains(&"{1@2}\r\n{1@3}\r\n".to_string()));
}

#[test]
fn test_geometry_parse() {
    assert_eq!(Geometry::parse("v8x16 a8x16"), Some(Geometry::new(8, 16)));
    assert_eq!(Geometry::parse("MX12X12DVI"), Some(Geometry::new(12, 12)));
    assert_eq!(Geometry::parse("no digits"), None);
}

#[test]
fn test_kramer_frame_layout() {
    assert_eq!(Kramer::frame(0, 2), Some([0x01, 0x81, 0x83, 0x81]));
    let steps = Kramer::new(Geometry::new(8, 8)).encode(&[Tie::new(1, [0, 1])]);
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[1].payload, vec![0x01, 0x82, 0x82, 0x81]);
}

#[test]
fn test_kramer_frame_refuses_unaddressable_ports() {
    assert_eq!(Kramer::frame(0, 126), Some([0x01, 0x81, 0xff, 0x81]));
    assert_eq!(Kramer::frame(0, 127), None);
    assert_eq!(Kramer::frame(0, 255), None);
    assert_eq!(Kramer::frame(127, 0), None);

    let steps = Kramer::new(Geometry::default()).encode(&[Tie::new(0, [1, 255])]);
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].payload, vec![0x01, 0x81, 0x82, 0x81]);
}

#[test]
fn test_kramer_client_drops_unaddressable_ties() {
    let rt = runtime();
    let mut client = MatrixClient::<Kramer>::new(matrix_config(closed_port()), rt.handle().clone());
    assert!(!client.geometry().is_known());
    assert_eq!(client.tie(&[Tie::new(0, [255])]), Err(DeviceError::InvalidTie));
    assert_eq!(client.tie(&[Tie::new(127, [0])]), Err(DeviceError::InvalidTie));
    assert_eq!(
        client.tie(&[Tie::new(0, [200]), Tie::new(300, [1])]),
        Err(DeviceError::InvalidTie)
    );
    // An addressable tie gets past validation and only fails on the link.
    assert_eq!(client.tie(&[Tie::new(0, [1])]), Err(DeviceError::NotConnected));
}

#[test]
fn test_kramer_reply_classification() {
    let mut kramer = Kramer::new(Geometry::new(8, 8));
    assert_eq!(kramer.classify(&[0x41, 0x81, 0x83, 0x81]), Frame::Ack(Vec::new()));
    assert!(matches!(
        kramer.classify(&[0x50, 0x83, 0x80, 0x81]),
        Frame::Reject(_)
    ));
    assert_eq!(kramer.classify(&[0x01, 0x81, 0x83, 0x81]), Frame::Noise);
}

#[test]
fn test_kramer_split_resynchronises() {
    let kramer = Kramer::new(Geometry::default());
    let mut buf = vec![0x83, 0x81, 0x41, 0x81, 0x83, 0x81, 0x41];
    assert_eq!(kramer.split(&mut buf), Some(vec![0x41, 0x81, 0x83, 0x81]));
    assert_eq!(kramer.split(&mut buf), None);
    assert_eq!(buf, vec![0x41]);
}

#[test]
fn test_kramer_over_tcp() {
    fn kramer_reply(req: &[u8]) -> Vec<u8> {
        req.chunks(4)
            .flat_map(|f| {
                let mut f = f.to_vec();
                f[0] |= 0x40;
                f
            })
            .collect()
    }
    let rt = runtime();
    let (port, _log) = fake_matrix(kramer_reply, b"");
    let config = matrix_config(port).with_geometry(8, 8);
    let mut client = MatrixClient::<Kramer>::new(config, rt.handle().clone());
    pump(&mut client, |c, _| c.status().state == LinkState::Connected);

    let ticket = client.tie(&[Tie::new(2, [0, 1, 2])]).unwrap();
    let outcomes = pump(&mut client, |_, o| o.iter().any(|o| o.ticket == ticket));
    assert!(outcomes[0].result.is_ok());
}

// ============================================================================
// HTTP Tests
// ============================================================================

fn fake_http(status: &'static str, body: &'static str) -> (u16, Log) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let log: Log = Arc::default();
    let log2 = log.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { return };
            handle_http(stream, &log2, status, body);
        }
    });
    (port, log)
}

fn handle_http(stream: TcpStream, log: &Log, status: &str, body: &str) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    let mut length = 0usize;
    let mut extra = String::new();
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).is_err() || header.trim().is_empty() {
            break;
        }
        if let Some((k, v)) = header.split_once(':') {
            if k.eq_ignore_ascii_case("content-length") {
                length = v.trim().parse().unwrap_or(0);
            } else if k.to_ascii_lowercase().starts_with("x-") {
                extra.push_str(&format!(" [{}={}]", k.to_ascii_lowercase(), v.trim()));
            }
        }
    }
    let mut payload = vec![0u8; length];
    let _ = reader.read_exact(&mut payload);
    log.lock().unwrap().push(format!(
        "{} {}{}",
        request_line.trim(),
        String::from_utf8_lossy(&payload),
        extra
    ));
    let mut stream = stream;
    let _ = write!(
        stream,
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
}

fn http_client(base: String, rt: &Runtime) -> HttpClient {
    let config = HttpConfig {
        retry_delay: Duration::from_millis(20),
        ..HttpConfig::new("test-http", base)
    };
    HttpClient::new(config, rt.handle().clone()).unwrap()
}

#[test]
fn test_http_post_json_returns_json() {
    let rt = runtime();
    let (port, log) = fake_http("200 OK", r#"{"ok":true}"#);
    let mut client = http_client(format!("http://127.0.0.1:{}", port), &rt);

    let request = HttpRequest::post_json("/scene", json!({"scene": "movie"}));
    let ticket = client.send_command(request.into()).unwrap();
    let outcomes = pump(&mut client, |_, o| !o.is_empty());
    assert_eq!(outcomes[0].ticket, ticket);
    assert_eq!(outcomes[0].result, Ok(Reply::Json(json!({"ok": true}))));

    let seen = log.lock().unwrap().clone();
    assert!(seen[0].starts_with("POST /scene HTTP/1.1"));
    assert!(seen[0].contains(r#""scene":"movie""#));
    assert_eq!(client.status().state, LinkState::Connected);
}

#[test]
fn test_http_get_with_query() {
    let rt = runtime();
    let (port, log) = fake_http("200 OK", "");
    let mut client = http_client(format!("http://127.0.0.1:{}/api/", port), &rt);

    let request = HttpRequest::get("lights").with_query("level", "40");
    client.send_command(request.into()).unwrap();
    let outcomes = pump(&mut client, |_, o| !o.is_empty());
    assert_eq!(outcomes[0].result, Ok(Reply::Ack));
    assert!(log.lock().unwrap()[0].starts_with("GET /api/lights?level=40 "));
}

#[test]
fn test_http_request_headers_are_sent() {
    let rt = runtime();
    let (port, log) = fake_http("200 OK", "");
    let mut client = http_client(format!("http://127.0.0.1:{}", port), &rt);

    let request = HttpRequest::get("/status").with_header("X-Panel", "lobby");
    client.send_command(request.into()).unwrap();
    pump(&mut client, |_, o| !o.is_empty());
    assert!(log.lock().unwrap()[0].contains("[x-panel=lobby]"));
}

#[test]
fn test_http_error_status_is_protocol_error() {
    let rt = runtime();
    let (port, _log) = fake_http("500 Internal Server Error", "boom");
    let mut client = http_client(format!("http://127.0.0.1:{}", port), &rt);

    client.send_command(HttpRequest::get("/").into()).unwrap();
    let outcomes = pump(&mut client, |_, o| !o.is_empty());
    match &outcomes[0].result {
        Err(DeviceError::Protocol(msg)) => {
            assert!(msg.contains("500"));
            assert!(msg.contains("boom"));
        }
        other => panic!("expected protocol error, got {:?}", other),
    }
}

#[test]
fn test_http_unreachable_marks_link_down() {
    let rt = runtime();
    let mut client = http_client(format!("http://127.0.0.1:{}", closed_port()), &rt);

    client.send_command(HttpRequest::get("/").into()).unwrap();
    let outcomes = pump(&mut client, |_, o| !o.is_empty());
    assert!(outcomes[0].result.as_ref().is_err_and(|e| e.is_transport()));
    assert_eq!(client.status().state, LinkState::Disconnected);
}

#[test]
fn test_http_rejects_player_command() {
    let rt = runtime();
    let mut client = http_client("http://127.0.0.1:1".into(), &rt);
    assert_eq!(
        client.send_command(PlayerCommand::Play.into()),
        Err(DeviceError::Unsupported("player command"))
    );
}

#[test]
fn test_http_url_joining() {
    let rt = runtime();
    let client = http_client("http://panel.local/api/".into(), &rt);
    assert_eq!(client.url_for("/scene"), "http://panel.local/api/scene");
    assert_eq!(client.url_for("https://other/x"), "https://other/x");
}
