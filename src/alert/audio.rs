use anyhow::{anyhow, Context, Result};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Something that can speak a short message to the candidate.
pub trait Announcer: Send {
    fn announce(&mut self, message: &str) -> Result<()>;
}

/// Runs an external speech command with the message as its last argument
/// (e.g. `espeak`, `say`, `spd-say -w`).
pub struct CommandAnnouncer {
    program: String,
    args: Vec<String>,
}

impl CommandAnnouncer {
    /// Parse a whitespace separated command line.
    pub fn parse(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(|s| s.to_string());
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("speech command is empty"))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl Announcer for CommandAnnouncer {
    fn announce(&mut self, message: &str) -> Result<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(message)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("spawn {}", self.program))?;
        if !status.success() {
            return Err(anyhow!("{} exited with {}", self.program, status));
        }
        Ok(())
    }
}

/// Writes announcements to the log instead of speaking them.
pub struct LogAnnouncer;

impl Announcer for LogAnnouncer {
    fn announce(&mut self, message: &str) -> Result<()> {
        log::info!("🔊 {}", message);
        Ok(())
    }
}

/// Bounded queue in front of a single announcer thread.
///
/// `speak` never blocks the detection loop: when the queue is full the
/// message is dropped and counted.
pub struct AudioDispatcher {
    sender: Option<SyncSender<String>>,
    worker: Option<JoinHandle<()>>,
    dropped: Arc<AtomicU64>,
}

impl AudioDispatcher {
    pub fn spawn(mut announcer: Box<dyn Announcer>, capacity: usize) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<String>(capacity.max(1));
        let worker = std::thread::Builder::new()
            .name("proctor-audio".to_string())
            .spawn(move || {
                for message in receiver {
                    if let Err(e) = announcer.announce(&message) {
                        log::debug!("announcement failed: {}", e);
                    }
                }
            })
            .context("spawn audio worker")?;
        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            dropped: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Queue a message. Returns false when it was dropped.
    pub fn speak(&self, message: &str) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        match sender.try_send(message.to_string()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!("audio queue full; dropped announcement");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("audio worker is gone; dropped announcement");
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Close the queue and wait for pending announcements to finish.
    pub fn shutdown(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("audio worker panicked");
            }
        }
    }
}

impl Drop for AudioDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::Receiver;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Recording {
        spoken: Arc<Mutex<Vec<String>>>,
        gate: Option<Receiver<()>>,
    }

    impl Announcer for Recording {
        fn announce(&mut self, message: &str) -> Result<()> {
            if let Some(gate) = &self.gate {
                let _ = gate.recv_timeout(Duration::from_secs(5));
            }
            self.spoken.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    #[test]
    fn delivers_in_order_and_joins_on_shutdown() {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let announcer = Recording {
            spoken: spoken.clone(),
            gate: None,
        };
        let mut audio = AudioDispatcher::spawn(Box::new(announcer), 4).unwrap();
        assert!(audio.speak("one"));
        assert!(audio.speak("two"));
        audio.shutdown();
        assert_eq!(*spoken.lock().unwrap(), vec!["one", "two"]);
        assert!(!audio.speak("late"));
    }

    #[test]
    fn full_queue_drops_messages() {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let (release, gate) = mpsc::channel();
        let announcer = Recording {
            spoken: spoken.clone(),
            gate: Some(gate),
        };
        let mut audio = AudioDispatcher::spawn(Box::new(announcer), 1).unwrap();
        // Worker holds at most one message; the queue holds one more.
        let accepted = (0..10).filter(|i| audio.speak(&format!("m{}", i))).count();
        assert!(accepted <= 2);
        assert_eq!(audio.dropped(), 10 - accepted as u64);
        for _ in 0..10 {
            let _ = release.send(());
        }
        audio.shutdown();
        assert_eq!(spoken.lock().unwrap().len(), accepted);
    }

    #[test]
    fn command_line_is_split() {
        assert!(CommandAnnouncer::parse("   ").is_err());
        let announcer = CommandAnnouncer::parse("spd-say -w").unwrap();
        assert_eq!(announcer.program, "spd-say");
        assert_eq!(announcer.args, vec!["-w"]);
    }
}
