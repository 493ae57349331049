//! proctor_side - side camera desk monitor
//!
//! Watches the desk from the side for prohibited objects and writing
//! motion. One allowed item can be whitelisted from a reference image or
//! from the guide box of the first frame.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use exam_proctor::alert::{Announcer, CommandAnnouncer, LogAnnouncer};
use exam_proctor::{
    open_source, AudioDispatcher, BackendRegistry, LoopExit, MonitorLoop, MonitorSession,
    Profile, ProctorConfig, SessionSummary, SourceConfig, Whitelist,
};
#[cfg(feature = "report-http")]
use exam_proctor::{ProctorLogReporter, ReporterConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Side camera desk monitor")]
struct Args {
    /// Frame source: stub://name, an http(s) camera URL, or an image directory.
    #[arg(long, env = "PROCTOR_SIDE_SOURCE", default_value = "stub://side")]
    source: String,

    /// Target frames per second.
    #[arg(long, default_value_t = 5)]
    fps: u32,

    /// Image of an allowed item (e.g. a calculator) to whitelist.
    #[arg(long, conflicts_with = "whitelist_first_frame")]
    whitelist_image: Option<PathBuf>,

    /// Whitelist whatever sits in the guide box of the first frame.
    #[arg(long)]
    whitelist_first_frame: bool,

    /// Speech command used for spoken warnings (message is appended).
    #[arg(long, env = "PROCTOR_SPEECH_COMMAND")]
    speech_command: Option<String>,

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

    let mut cfg = ProctorConfig::load(Profile::Side)?;
    if args.speech_command.is_some() {
        cfg.audio.command = args.speech_command.clone();
        cfg.audio.enabled = true;
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
    if let Some(path) = &args.whitelist_image {
        let whitelist = Whitelist::from_path(path, cfg.whitelist.clone())?;
        log::info!("whitelisted item from {}", path.display());
        session.set_whitelist(Some(whitelist));
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
            log::info!("proctor_side running on {} (Ctrl-C to stop)", args.source);
            let mut monitor = MonitorLoop::new(source.as_mut(), &mut session, args.fps);
            let mut ready = true;
            if args.whitelist_first_frame {
                ready = whitelist_first_frame(&mut monitor, &cfg);
            }
            let exit = if ready {
                monitor.run(&stop, |assessment| {
                    #[cfg(feature = "report-http")]
                    if let Some(reporter) = reporter.as_mut() {
                        reporter.report(&assessment.events);
                    }
                    #[cfg(not(feature = "report-http"))]
                    let _ = assessment;
                })
            } else {
                LoopExit::SourceFailed
            };
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
            "SIDE CAMERA REPORT",
            session.activity(),
            session.frames_processed()
        )
    );
    Ok(())
}

/// Capture the first frame, whitelist its guide box, then assess it.
fn whitelist_first_frame(monitor: &mut MonitorLoop<'_>, cfg: &ProctorConfig) -> bool {
    let capture = match monitor.next_capture() {
        Ok(Some(capture)) => capture,
        Ok(None) => {
            log::error!("source ended before a whitelist frame arrived");
            return false;
        }
        Err(e) => {
            log::error!("camera unavailable: {:#}", e);
            return false;
        }
    };
    let frame = match capture.into_frame() {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("whitelist capture skipped: {:#}", e);
            return true;
        }
    };
    match Whitelist::from_guide_box(&frame, cfg.whitelist.clone()) {
        Ok(whitelist) => {
            let (w, h) = whitelist.dimensions();
            log::info!("whitelisted item in guide box ({}x{})", w, h);
            monitor.session_mut().set_whitelist(Some(whitelist));
        }
        Err(e) => log::warn!("whitelist capture failed: {:#}", e),
    }
    monitor.session_mut().process_frame(&frame, Instant::now());
    true
}
