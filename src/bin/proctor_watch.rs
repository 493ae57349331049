//! proctor_watch - webcam exam monitor
//!
//! Watches the candidate through the laptop webcam: face presence, extra
//! people and gaze. Alerts are logged, serious ones are spoken, and events
//! can be forwarded to the exam backend's proctoring log.
//! Ctrl-C prints the session report and exits.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use exam_proctor::alert::{Announcer, CommandAnnouncer, LogAnnouncer};
use exam_proctor::{
    open_source, AudioDispatcher, BackendRegistry, LoopExit, MonitorLoop, MonitorSession,
    Profile, ProctorConfig, SessionSummary, SourceConfig,
};
#[cfg(feature = "report-http")]
use exam_proctor::{ProctorLogReporter, ReporterConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Webcam exam monitor")]
struct Args {
    /// Frame source: stub://name, an http(s) camera URL, or an image directory.
    #[arg(long, env = "PROCTOR_SOURCE", default_value = "stub://webcam")]
    source: String,

    /// Target frames per second.
    #[arg(long, default_value_t = 10)]
    fps: u32,

    /// Speech command used for spoken warnings (message is appended).
    #[arg(long, env = "PROCTOR_SPEECH_COMMAND")]
    speech_command: Option<String>,

    /// Disable spoken warnings.
    #[arg(long)]
    mute: bool,

    /// Exam session id for the proctoring log.
    #[arg(long, env = "PROCTOR_SESSION_ID")]
    session_id: Option<String>,

    /// Proctoring-log endpoint of the exam backend.
    #[arg(long, env = "PROCTOR_BACKEND_URL")]
    backend_url: Option<String>,

    /// Bearer token for the proctoring log.
    #[arg(long, env = "PROCTOR_BACKEND_TOKEN", default_value = "")]
    token: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = ProctorConfig::load(Profile::Webcam)?;
    if args.mute {
        cfg.audio.enabled = false;
    }
    if args.speech_command.is_some() {
        cfg.audio.command = args.speech_command.clone();
    }

    let registry = BackendRegistry::with_builtin();
    let mut session = MonitorSession::from_registry(&cfg, &registry)?;
    if cfg.audio.enabled {
        let announcer: Box<dyn Announcer> = match cfg.audio.command.as_deref() {
            Some(command) => Box::new(CommandAnnouncer::parse(command)?),
            None => Box::new(LogAnnouncer),
        };
        session = session.with_audio(AudioDispatcher::spawn(announcer, cfg.audio.queue_capacity)?);
    }

    #[cfg(feature = "report-http")]
    let mut reporter = match (&args.backend_url, &args.session_id) {
        (Some(url), Some(id)) => Some(ProctorLogReporter::new(ReporterConfig::new(
            url, &args.token, id,
        ))?),
        _ => None,
    };
    #[cfg(not(feature = "report-http"))]
    if args.backend_url.is_some() {
        log::warn!("proctoring log disabled: built without report-http");
    }

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = stop.clone();
    ctrlc::set_handler(move || stop_handler.store(true, Ordering::SeqCst))
        .context("install Ctrl-C handler")?;

    let mut source = open_source(SourceConfig {
        uri: args.source.clone(),
        target_fps: args.fps,
    })?;
    match source.connect() {
        Ok(()) => {
            log::info!("proctor_watch running on {} (Ctrl-C to stop)", args.source);
            let exit = MonitorLoop::new(source.as_mut(), &mut session, args.fps).run(
                &stop,
                |assessment| {
                    #[cfg(feature = "report-http")]
                    if let Some(reporter) = reporter.as_mut() {
                        reporter.report(&assessment.events);
                    }
                    #[cfg(not(feature = "report-http"))]
                    let _ = assessment;
                },
            );
            if exit == LoopExit::SourceFailed {
                log::error!("monitoring stopped: camera unavailable");
            }
        }
        Err(e) => log::error!("could not open camera {}: {:#}", args.source, e),
    }
    drop(source);
    session.shutdown();

    println!(
        "{}",
        SessionSummary::new(
            "EXAM MONITORING REPORT",
            session.activity(),
            session.frames_processed()
        )
    );
    Ok(())
}
