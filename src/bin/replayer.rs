use can_replay_sim::{
    Capture, InjectionListener, LabelLog, PlaybackControl, ReplayConfig, ReplayScheduler,
    RunSummary, SharedMirror, StreamSink,
};
use chrono::Utc;
use colored::*;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};

const PRIMARY_ADDR: &str = "127.0.0.1:45555";
const INJECT_ADDR: &str = "127.0.0.1:45556";
const MIRROR_ADDR: &str = "127.0.0.1:45557";

fn usage() -> ! {
    eprintln!(
        "Usage: replayer <capture.csv> [--speed N] [--persist PREFIX] [--no-pause] [--mirror]"
    );
    eprintln!();
    eprintln!("  --speed N         run-speed multiplier, > 0 (default 1.0)");
    eprintln!("  --persist PREFIX  write PREFIX_labeled.csv and PREFIX_summary.json");
    eprintln!("  --no-pause        disable the interactive space-key pause");
    eprintln!("  --mirror          open an attacker-observer mirror at {}", MIRROR_ADDR);
    std::process::exit(1);
}

fn parse_args() -> (PathBuf, ReplayConfig) {
    let args: Vec<String> = std::env::args().collect();
    let mut capture_path: Option<PathBuf> = None;
    let mut config = ReplayConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--speed" => {
                i += 1;
                match args.get(i).and_then(|v| v.parse::<f64>().ok()) {
                    Some(speed) if speed > 0.0 => config.run_speed = speed,
                    _ => usage(),
                }
            }
            "--persist" => {
                i += 1;
                match args.get(i) {
                    Some(prefix) => config.persist_path = Some(PathBuf::from(prefix)),
                    None => usage(),
                }
            }
            "--no-pause" => config.enable_pause = false,
            "--mirror" => config.enable_mirror = true,
            flag if flag.starts_with('-') => usage(),
            path => {
                if capture_path.is_some() {
                    usage();
                }
                capture_path = Some(PathBuf::from(path));
            }
        }
        i += 1;
    }

    match capture_path {
        Some(path) => (path, config),
        None => usage(),
    }
}

fn log_path(prefix: &Path) -> PathBuf {
    PathBuf::from(format!("{}_labeled.csv", prefix.display()))
}

fn summary_path(prefix: &Path) -> PathBuf {
    PathBuf::from(format!("{}_summary.json", prefix.display()))
}

/// Keyboard poller: space toggles pause, Ctrl+C interrupts. Raw mode
/// swallows the terminal's own interrupt handling, so the poller forwards
/// it to the shutdown channel itself.
fn spawn_pause_poller(
    control: PlaybackControl,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
) {
    std::thread::spawn(move || {
        if terminal::enable_raw_mode().is_err() {
            return;
        }
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            match event::poll(Duration::from_millis(100)) {
                Ok(true) => {
                    if let Ok(Event::Key(key)) = event::read() {
                        if key.kind != KeyEventKind::Press {
                            continue;
                        }
                        match key.code {
                            KeyCode::Char(' ') => {
                                if control.toggle() {
                                    print!("{} Paused (space resumes)\r\n", "⏸".yellow().bold());
                                } else {
                                    print!("{} Resumed\r\n", "▶".green().bold());
                                }
                                std::io::stdout().flush().ok();
                            }
                            KeyCode::Char('c')
                                if key.modifiers.contains(KeyModifiers::CONTROL) =>
                            {
                                print!("\r\n{} Interrupt received, stopping...\r\n", "→".yellow());
                                std::io::stdout().flush().ok();
                                shutdown_tx.send(true).ok();
                                break;
                            }
                            _ => {}
                        }
                    }
                }
                Ok(false) => {}
                Err(_) => break,
            }
        }
        terminal::disable_raw_mode().ok();
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (capture_path, config) = parse_args();

    println!(
        "{}",
        "═══════════════════════════════════════════════════════════════"
            .magenta()
            .bold()
    );
    println!(
        "{}",
        "          CAN TRAFFIC REPLAY & INJECTION MULTIPLEXER           "
            .magenta()
            .bold()
    );
    println!(
        "{}",
        "═══════════════════════════════════════════════════════════════"
            .magenta()
            .bold()
    );
    println!();

    let started_at = Utc::now();

    println!(
        "{} Loading capture {}...",
        "→".cyan(),
        capture_path.display().to_string().bright_white()
    );
    let capture = match Capture::open(&capture_path) {
        Ok(capture) => capture,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };
    let total_frames = capture.len();
    let skipped_rows = capture.skipped();
    println!(
        "{} Loaded {} frames spanning {:.1}s{}",
        "✓".green().bold(),
        total_frames.to_string().bright_cyan(),
        capture.duration(),
        if skipped_rows > 0 {
            format!(" ({} malformed rows skipped)", skipped_rows)
        } else {
            String::new()
        }
    );

    // persistence opens before any socket so a failure here needs no teardown
    let log = match &config.persist_path {
        Some(prefix) => {
            let path = log_path(prefix);
            match LabelLog::create(&path) {
                Ok(log) => {
                    println!(
                        "{} Persistence log at {}",
                        "✓".green(),
                        path.display().to_string().bright_white()
                    );
                    Some(log)
                }
                Err(e) => {
                    eprintln!(
                        "{} Cannot open persistence log {}: {}",
                        "✗".red().bold(),
                        path.display(),
                        e
                    );
                    std::process::exit(1);
                }
            }
        }
        None => None,
    };

    let (queue_tx, queue_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let mirror_slot: SharedMirror = Arc::new(Mutex::new(None));
    let mirror = config
        .enable_mirror
        .then(|| (MIRROR_ADDR.to_string(), mirror_slot.clone()));

    let listener =
        InjectionListener::bind(INJECT_ADDR, queue_tx, mirror, shutdown_rx.clone()).await?;

    println!(
        "{} Connecting to primary observer at {}...",
        "→".cyan(),
        PRIMARY_ADDR.bright_white()
    );
    let mut sink = match StreamSink::connect(PRIMARY_ADDR).await {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            eprintln!("  Is the observer running? Start it with: cargo run --bin monitor");
            std::process::exit(1);
        }
    };
    println!("{} Primary observer connected", "✓".green().bold());
    if config.enable_mirror {
        sink = sink.with_mirror(mirror_slot.clone());
    }
    if let Some(log) = log {
        sink = sink.with_log(log);
    }

    let control = PlaybackControl::new();

    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for Ctrl+C");
            println!("\n{} Interrupt received, stopping...", "→".yellow());
            shutdown_tx.send(true).ok();
        });
    }

    if config.enable_pause {
        spawn_pause_poller(control.clone(), shutdown_tx.clone(), shutdown_rx.clone());
        println!("{} Space pauses/resumes playback", "ℹ".bright_blue());
    }

    let listener_task = tokio::spawn(listener.run());

    println!();
    println!(
        "{} Replay starting at {}x speed",
        "→".green().bold(),
        config.run_speed
    );
    println!();

    let scheduler = ReplayScheduler::new(
        capture,
        queue_rx,
        control,
        sink,
        config.run_speed,
        shutdown_rx.clone(),
    );

    let stats = match scheduler.run().await {
        Ok(stats) => stats,
        Err(e) => {
            shutdown_tx.send(true).ok();
            if config.enable_pause {
                terminal::disable_raw_mode().ok();
            }
            eprintln!("{} Fatal: {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    shutdown_tx.send(true).ok();
    listener_task.await.ok();
    if config.enable_pause {
        terminal::disable_raw_mode().ok();
    }

    println!();
    if stats.interrupted {
        println!(
            "{} Replay interrupted: {} normal, {} attack frames in {:.1}s",
            "⚠".yellow().bold(),
            stats.normal,
            stats.attack,
            stats.wall.as_secs_f64()
        );
    } else {
        println!(
            "{} Replay complete: {} normal, {} attack frames in {:.1}s",
            "✓".green().bold(),
            stats.normal,
            stats.attack,
            stats.wall.as_secs_f64()
        );
    }
    if stats.dropped_pending > 0 {
        println!(
            "{} {} pending injected messages dropped at end of capture",
            "⚠".yellow(),
            stats.dropped_pending
        );
    }

    if let Some(prefix) = &config.persist_path {
        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            capture_path: capture_path.display().to_string(),
            run_speed: config.run_speed,
            normal_frames: stats.normal,
            attack_frames: stats.attack,
            dropped_pending: stats.dropped_pending,
            wall_seconds: stats.wall.as_secs_f64(),
            interrupted: stats.interrupted,
        };
        if let Err(e) = summary.save_to_file(summary_path(prefix)) {
            eprintln!("{} {}", "⚠".yellow(), e);
        }
    }

    Ok(())
}
