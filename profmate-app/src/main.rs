//! ProfMate live tutor entry point.
//!
//! Opens one voice session grounded in an optional lesson, renders status
//! transitions and a volume meter through `tracing`, and disconnects on
//! Ctrl-C or when the endpoint hangs up.

mod lesson;
mod meter;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use profmate_core::{
    audio::device::{list_input_devices, list_output_devices, DeviceInfo},
    BroadcastObserver, LiveTutorClient, SessionStatus,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use lesson::{build_system_instruction, LessonContent};
use meter::{meter_bar, Throttle};
use settings::{default_settings_path, load_settings, save_settings};

/// Frames are ≈256 ms, so this draws the meter about once a second.
const METER_EVERY_N_FRAMES: u64 = 4;

#[derive(Debug, Parser)]
#[command(name = "profmate", version, about = "Talk to ProfMate, your live AI tutor")]
struct Cli {
    /// Lesson JSON (`{title, summary, sections[]}`) to ground the tutor in.
    #[arg(long, value_name = "JSON")]
    lesson: Option<PathBuf>,

    /// Settings file. Defaults to the per-user data directory.
    #[arg(long, value_name = "PATH")]
    settings: Option<PathBuf>,

    /// Print audio devices and exit.
    #[arg(long)]
    list_devices: bool,

    /// Voice to answer in (overrides settings).
    #[arg(long, env = "PROFMATE_VOICE")]
    voice: Option<String>,

    /// Write the effective settings back to the settings file.
    #[arg(long)]
    save_settings: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("profmate=info,profmate_core=info")
            }),
        )
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        print_devices("Input", &list_input_devices());
        print_devices("Output", &list_output_devices());
        return Ok(());
    }

    // ── Settings ──────────────────────────────────────────────────────────
    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let mut app_settings = load_settings(&settings_path);
    if let Some(voice) = &cli.voice {
        app_settings.voice_name = voice.clone();
        app_settings.normalize();
    }
    if cli.save_settings {
        save_settings(&settings_path, &app_settings)
            .with_context(|| format!("saving settings to {}", settings_path.display()))?;
        info!(path = %settings_path.display(), "settings saved");
    }

    let Some(api_key) = app_settings.resolve_api_key() else {
        bail!("no API key: set GEMINI_API_KEY (or apiKey in {})", settings_path.display());
    };

    // ── Instruction ───────────────────────────────────────────────────────
    let lesson = cli.lesson.as_deref().map(LessonContent::load).transpose()?;
    if let Some(lesson) = &lesson {
        info!(title = %lesson.title, sections = lesson.sections.len(), "lesson loaded");
    }
    let instruction = build_system_instruction(lesson.as_ref());

    // ── Session ───────────────────────────────────────────────────────────
    let observer = Arc::new(BroadcastObserver::new());
    let mut status_rx = observer.subscribe_status();
    let mut volume_rx = observer.subscribe_volume();
    let client = LiveTutorClient::gemini(app_settings.session_config(), api_key, observer.clone());

    observer.set_status(SessionStatus::Connecting, None);
    info!(voice = %app_settings.voice_name, model = %app_settings.model, "connecting to ProfMate");
    if let Err(e) = client.connect(&instruction).await {
        observer.set_status(SessionStatus::Disconnected, Some(e.to_string()));
        if e.is_device_access() {
            bail!("could not access audio devices ({e}); check microphone permissions");
        }
        return Err(e).context("live session failed to connect");
    }
    info!("connected, start talking (Ctrl-C to end)");

    let width = app_settings.meter_width;
    let sensitivity = app_settings.meter_sensitivity;
    let meter_task = tokio::spawn(async move {
        let throttle = Throttle::new(METER_EVERY_N_FRAMES);
        loop {
            match volume_rx.recv().await {
                Ok(event) if throttle.admits(event.seq) => {
                    info!(target: "profmate::meter", "mic {}", meter_bar(event.rms, sensitivity, width));
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("ending session");
                break;
            }
            event = status_rx.recv() => match event {
                Ok(event) => match event.status {
                    SessionStatus::Disconnected => {
                        info!("ProfMate hung up");
                        break;
                    }
                    SessionStatus::Error => {
                        warn!(detail = event.detail.as_deref().unwrap_or(""), "session error");
                    }
                    status => info!(?status, "session status"),
                },
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    meter_task.abort();
    client.disconnect().await?;

    let d = client.diagnostics_snapshot();
    info!(
        frames_sent = d.frames_sent,
        send_failures = d.send_failures,
        chunks_played = d.chunks_scheduled,
        malformed = d.malformed_chunks,
        "session finished"
    );
    Ok(())
}

fn print_devices(kind: &str, devices: &[DeviceInfo]) {
    println!("{kind} devices:");
    if devices.is_empty() {
        println!("  (none)");
    }
    for d in devices {
        let mut tags = Vec::new();
        if d.is_default {
            tags.push("default");
        }
        if d.is_recommended {
            tags.push("recommended");
        }
        if d.is_loopback_like {
            tags.push("loopback");
        }
        if tags.is_empty() {
            println!("  {}", d.name);
        } else {
            println!("  {} [{}]", d.name, tags.join(", "));
        }
    }
}
