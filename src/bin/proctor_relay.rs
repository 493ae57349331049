//! proctor_relay - phone relay server
//!
//! Serves the operator page and the phone page, analyses frames uploaded by
//! the phone and queues alerts for it. Scan the QR code on the operator page
//! with the phone to pair.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::{mpsc, Arc, Mutex};

use exam_proctor::{
    BackendRegistry, MonitorSession, Profile, ProctorConfig, RelayConfig, RelayServer, RelayState,
    SessionSummary,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Phone relay server for side-view monitoring")]
struct Args {
    /// Listen address (overrides PROCTOR_RELAY_ADDR and the config file).
    #[arg(long)]
    addr: Option<String>,

    /// URL encoded in the pairing QR code, e.g. http://192.168.1.20:5000/phone.
    #[arg(long)]
    phone_url: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = ProctorConfig::load(Profile::Relay)?;
    if let Some(addr) = args.addr {
        cfg.relay.addr = addr;
    }
    if let Some(url) = args.phone_url {
        cfg.relay.phone_url = url;
    }

    let registry = BackendRegistry::with_builtin();
    let session = MonitorSession::from_registry(&cfg, &registry)?;
    let state = Arc::new(Mutex::new(RelayState::new(session, cfg.relay.staleness)));

    let handle = RelayServer::new(RelayConfig::from(&cfg.relay), state.clone()).spawn()?;
    log::info!("operator page: http://{}/", handle.addr);
    log::info!("phone page: {}", cfg.relay.phone_url);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("install Ctrl-C handler")?;

    log::info!("proctor_relay waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping relay...");
    handle.stop()?;

    let state = state
        .lock()
        .map_err(|_| anyhow::anyhow!("relay state lock poisoned"))?;
    println!(
        "{}",
        SessionSummary::new(
            "PHONE RELAY REPORT",
            state.session().activity(),
            state.frames_received()
        )
    );
    Ok(())
}
