//! cadenza CLI: terminal music player powered by the cadenza engine.
//!
//! Commands:
//!   cadenza play <file|dir>... [--shuffle] [--repeat] [--loop] [--simulate]
//!   cadenza scan <dir>         List playable files under a folder
//!   cadenza info <file>        Tags plus decoded duration
//!
//! While playing, type a command and press enter:
//!   p  play/pause     s  stop        n  next        b  previous
//!   f <secs>  seek    v <0-100>  volume
//!   z  shuffle        r  repeat      l  loop        q  quit

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use cadenza_core::config::ENV_CONFIG;
use cadenza_core::effects::catalog;
use cadenza_core::effects::metadata::{read_metadata, TrackMetadata};
use cadenza_core::effects::probe::probe_file;
use cadenza_core::effects::SimulatedBackend;
use cadenza_core::{
    EngineConfig, PlaybackEngine, PlaybackState, PlayerEvent, Playlist, PlaylistController,
    TrackRef,
};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        print_usage();
        return;
    }

    match args[0].as_str() {
        "play" => cmd_play(&args[1..]),
        "scan" => cmd_scan(&args[1..]),
        "info" => cmd_info(&args[1..]),
        other => {
            eprintln!("unknown command: {}", other);
            print_usage();
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_play(args: &[String]) {
    let mut inputs = Vec::new();
    let (mut shuffle, mut repeat, mut looping, mut simulate) = (false, false, false, false);
    for arg in args {
        match arg.as_str() {
            "--shuffle" => shuffle = true,
            "--repeat" => repeat = true,
            "--loop" => looping = true,
            "--simulate" => simulate = true,
            _ => inputs.push(arg.clone()),
        }
    }
    if inputs.is_empty() {
        eprintln!("usage: cadenza play <file|dir>... [--shuffle] [--repeat] [--loop] [--simulate]");
        return;
    }

    let tracks = match catalog::collect(&inputs) {
        Ok(t) if !t.is_empty() => t,
        Ok(_) => {
            eprintln!("no playable files found");
            return;
        }
        Err(e) => {
            eprintln!("cannot read input: {}", e);
            return;
        }
    };

    let engine = Arc::new(build_engine(&tracks, simulate, load_config()));
    let mut ctl = PlaylistController::new(engine, Playlist::new());
    if shuffle {
        ctl.toggle_shuffle();
    }
    if repeat {
        ctl.toggle_repeat();
    }
    if looping {
        ctl.toggle_loop();
    }

    let len = tracks.len();
    println!("playlist: {} tracks", len);
    let mut started = if shuffle {
        ctl.set_playlist_random(tracks)
    } else {
        ctl.set_playlist(tracks, 0)
    };
    let mut attempts = 1;
    while let Err(e) = started {
        eprintln!("{}", e);
        if attempts >= len {
            eprintln!("nothing playable");
            return;
        }
        attempts += 1;
        started = ctl.next();
    }

    run_interactive(&mut ctl);
    ctl.stop();
    println!();
}

fn cmd_scan(args: &[String]) {
    if args.is_empty() {
        eprintln!("usage: cadenza scan <dir>");
        return;
    }
    match catalog::scan_dir(Path::new(&args[0])) {
        Ok(tracks) if tracks.is_empty() => println!("no playable files"),
        Ok(tracks) => {
            for (i, track) in tracks.iter().enumerate() {
                println!("{:>4}  {}", i, track);
            }
            println!("{} files", tracks.len());
        }
        Err(e) => eprintln!("scan failed: {}", e),
    }
}

fn cmd_info(args: &[String]) {
    if args.is_empty() {
        eprintln!("usage: cadenza info <file>");
        return;
    }
    let path = Path::new(&args[0]);
    let meta = read_metadata(path);
    println!("{}", serde_json::to_string_pretty(&meta).unwrap_or_default());
    match probe_file(path) {
        Ok(info) => println!(
            "decoded: {} ({} Hz, {} ch)",
            fmt_time(info.duration_ms),
            info.sample_rate,
            info.channels
        ),
        Err(e) => println!("not playable: {}", e),
    }
}

// ---------------------------------------------------------------------------
// Interactive loop
// ---------------------------------------------------------------------------

fn run_interactive(ctl: &mut PlaylistController) {
    let (line_tx, line_rx) = crossbeam_channel::unbounded::<String>();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let mut stdin_open = true;
    let mut now: Option<TrackMetadata> = None;
    loop {
        if stdin_open {
            match line_rx.recv_timeout(Duration::from_millis(250)) {
                Ok(line) => {
                    if !handle_line(ctl, line.trim()) {
                        return;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                // Stdin closed: keep playing until the playlist ends.
                Err(RecvTimeoutError::Disconnected) => stdin_open = false,
            }
        } else {
            thread::sleep(Duration::from_millis(250));
        }

        for event in ctl.poll_events() {
            match event {
                PlayerEvent::TrackLoaded { track, .. } => {
                    let meta = read_metadata(track.path());
                    println!();
                    println!("now playing: {}", track);
                    now = Some(meta);
                }
                PlayerEvent::Error { message } => {
                    println!();
                    eprintln!("error: {}", message);
                }
                PlayerEvent::PlaylistEnded => {
                    println!();
                    println!("playlist ended");
                    return;
                }
                _ => {}
            }
        }

        let snap = ctl.snapshot();
        if snap.state != PlaybackState::Stopped || snap.position_ms > 0 {
            let (title, artist) = match &now {
                Some(m) => (m.title.as_str(), m.artist.as_deref().unwrap_or("Unknown")),
                None => ("Unknown", "Unknown"),
            };
            print_progress(
                title,
                artist,
                snap.position_ms,
                snap.duration_ms,
                (snap.volume * 100.0).round() as u32,
                snap.state,
            );
        }
    }
}

/// Apply one typed command. Returns false to quit.
fn handle_line(ctl: &mut PlaylistController, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    let cmd = parts.next().unwrap_or("");
    let arg = parts.next();

    let result = match cmd {
        "" => Ok(()),
        "q" => return false,
        "p" => {
            if ctl.engine().state() == PlaybackState::Playing {
                ctl.pause();
                Ok(())
            } else {
                ctl.play()
            }
        }
        "s" => {
            ctl.stop();
            Ok(())
        }
        "n" => ctl.next(),
        "b" => ctl.previous(),
        "f" => match arg.and_then(|s| s.parse::<i64>().ok()) {
            Some(secs) => ctl.seek(secs.saturating_mul(1000)),
            None => {
                eprintln!("usage: f <seconds>");
                Ok(())
            }
        },
        "v" => match arg.and_then(|s| s.parse::<u32>().ok()) {
            Some(v) => {
                ctl.set_volume(v.min(100) as f32 / 100.0);
                Ok(())
            }
            None => {
                eprintln!("usage: v <0-100>");
                Ok(())
            }
        },
        "z" => {
            println!("\nshuffle: {}", on_off(ctl.toggle_shuffle()));
            Ok(())
        }
        "r" => {
            println!("\nrepeat: {}", on_off(ctl.toggle_repeat()));
            Ok(())
        }
        "l" => {
            println!("\nloop: {}", on_off(ctl.toggle_loop()));
            Ok(())
        }
        other => {
            eprintln!("unknown command: {} (p s n b f v z r l q)", other);
            Ok(())
        }
    };
    if let Err(e) = result {
        eprintln!("\n{}", e);
    }
    true
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Native output unless `--simulate` (or built without audio), in which
/// case probed durations drive a wall-clock simulation.
fn build_engine(tracks: &[TrackRef], simulate: bool, config: EngineConfig) -> PlaybackEngine {
    #[cfg(feature = "native")]
    {
        if !simulate {
            return PlaybackEngine::native(config);
        }
    }
    #[cfg(not(feature = "native"))]
    let _ = simulate;

    let backend = SimulatedBackend::new();
    for track in tracks {
        match probe_file(track.path()) {
            Ok(info) => backend.add_track(track.path(), info.duration_ms),
            Err(e) => log::warn!("cadenza: {} will not play: {}", track, e),
        }
    }
    PlaybackEngine::with_backend(Arc::new(backend), config)
}

/// JSON file named by `CADENZA_CONFIG`, then `CADENZA_*` overrides.
fn load_config() -> EngineConfig {
    let base = match std::env::var(ENV_CONFIG) {
        Ok(path) => match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(v) => EngineConfig::from_value_or_default(&v),
                Err(e) => {
                    log::warn!("cadenza: invalid config {}: {}", path, e);
                    EngineConfig::default()
                }
            },
            Err(e) => {
                log::warn!("cadenza: cannot read config {}: {}", path, e);
                EngineConfig::default()
            }
        },
        Err(_) => EngineConfig::default(),
    };
    base.with_overrides(|key| std::env::var(key).ok())
}

fn print_progress(title: &str, artist: &str, pos_ms: u64, dur_ms: u64, vol: u32, state: PlaybackState) {
    let bar_width = 30;
    let filled = if dur_ms > 0 {
        (((pos_ms as f64 / dur_ms as f64) * bar_width as f64) as usize).min(bar_width)
    } else {
        0
    };
    let empty = bar_width - filled;
    let marker = match state {
        PlaybackState::Playing => ">",
        PlaybackState::Paused => "=",
        PlaybackState::Stopped => "#",
    };

    print!(
        "\r{} {} -- {}  [{}{}] {} / {}  vol: {}%    ",
        marker,
        title,
        artist,
        "=".repeat(filled),
        " ".repeat(empty),
        fmt_time(pos_ms),
        fmt_time(dur_ms),
        vol,
    );
    std::io::stdout().flush().ok();
}

fn fmt_time(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

fn print_usage() {
    println!("cadenza - terminal music player");
    println!();
    println!("usage: cadenza <command> [args]");
    println!();
    println!("commands:");
    println!("  play <file|dir>...     Play files and folders as one playlist");
    println!("      --shuffle          Start at a random track, in shuffle order");
    println!("      --repeat           Replay each track when it finishes");
    println!("      --loop             Wrap to the first track after the last");
    println!("      --simulate         No audio device; simulate playback");
    println!("  scan <dir>             List playable files");
    println!("  info <file>            Show tags and decoded duration");
    println!();
    println!("while playing: p play/pause, s stop, n next, b previous,");
    println!("  f <secs> seek, v <0-100> volume, z shuffle, r repeat, l loop, q quit");
}
