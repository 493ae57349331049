use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::time::Duration;
use url::Url;

use crate::event::ViolationEvent;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct ReporterConfig {
    /// Proctoring-log endpoint of the exam backend.
    pub endpoint: String,
    /// Bearer token of the candidate's exam session.
    pub token: String,
    pub session_id: String,
    pub timeout: Duration,
}

impl ReporterConfig {
    pub fn new(endpoint: &str, token: &str, session_id: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            token: token.to_string(),
            session_id: session_id.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct ProctorLogEntry<'a> {
    session_id: &'a str,
    event_type: &'a str,
    event_description: String,
    severity: &'a str,
    /// Milliseconds since the Unix epoch.
    timestamp: u64,
}

/// Posts violation events to the exam backend's proctoring log.
///
/// Each event is one POST. Failures are logged and the event is dropped;
/// there is no retry.
pub struct ProctorLogReporter {
    config: ReporterConfig,
    agent: ureq::Agent,
    sent: u64,
    failed: u64,
}

impl ProctorLogReporter {
    pub fn new(config: ReporterConfig) -> Result<Self> {
        let url = Url::parse(&config.endpoint).context("parse proctoring log endpoint")?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "proctoring log endpoint must be http(s), got '{}'",
                url.scheme()
            ));
        }
        if config.session_id.trim().is_empty() {
            return Err(anyhow!("session id must not be empty"));
        }
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Ok(Self {
            config,
            agent,
            sent: 0,
            failed: 0,
        })
    }

    /// Send every event; returns how many were accepted by the backend.
    pub fn report(&mut self, events: &[ViolationEvent]) -> usize {
        let mut accepted = 0;
        for event in events {
            match self.post(event) {
                Ok(()) => {
                    accepted += 1;
                    self.sent += 1;
                }
                Err(e) => {
                    self.failed += 1;
                    log::warn!("proctoring log rejected {}: {:#}", event.kind.event_type(), e);
                }
            }
        }
        accepted
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    fn post(&self, event: &ViolationEvent) -> Result<()> {
        let entry = ProctorLogEntry {
            session_id: &self.config.session_id,
            event_type: event.kind.event_type(),
            event_description: describe(event),
            severity: event.severity.as_str(),
            timestamp: event.timestamp_ms,
        };
        let body = serde_json::to_string(&entry).context("encode proctoring log entry")?;
        self.agent
            .post(&self.config.endpoint)
            .set("Authorization", &format!("Bearer {}", self.config.token))
            .set("Content-Type", "application/json")
            .send_string(&body)
            .context("post proctoring log entry")?;
        Ok(())
    }
}

fn describe(event: &ViolationEvent) -> String {
    if event.detail.is_empty() {
        event.kind.label()
    } else {
        format!("{} ({})", event.kind.label(), event.detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ViolationKind;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;

    fn read_request(stream: &mut std::net::TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data).to_string();
            if let Some(split) = text.find("\r\n\r\n") {
                let length = text[..split]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if data.len() >= split + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).to_string()
    }

    #[test]
    fn posts_event_with_bearer_token() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            stream
                .write_all(b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .unwrap();
            tx.send(request).unwrap();
        });

        let config = ReporterConfig::new(
            &format!("http://{}/api/proctoring-logs", addr),
            "secret-token",
            "exam-42",
        );
        let mut reporter = ProctorLogReporter::new(config).unwrap();
        let event = ViolationEvent::new(ViolationKind::MultipleFaces, "2 faces in frame");
        assert_eq!(reporter.report(&[event]), 1);
        server.join().unwrap();

        let request = rx.recv().unwrap();
        assert!(request.starts_with("POST /api/proctoring-logs"));
        assert!(request.contains("Bearer secret-token"));
        let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
        let json: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(json["session_id"], "exam-42");
        assert_eq!(json["event_type"], "MULTIPLE_FACES");
        assert_eq!(json["severity"], "HIGH");
        assert_eq!(
            json["event_description"],
            "Multiple faces detected (2 faces in frame)"
        );
    }

    #[test]
    fn unreachable_backend_drops_events() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut config = ReporterConfig::new(&format!("http://{}/log", addr), "t", "s");
        config.timeout = Duration::from_secs(1);
        let mut reporter = ProctorLogReporter::new(config).unwrap();
        let event = ViolationEvent::new(ViolationKind::NoFace, "");
        assert_eq!(reporter.report(&[event]), 0);
        assert_eq!(reporter.failed(), 1);
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(ProctorLogReporter::new(ReporterConfig::new("not a url", "t", "s")).is_err());
        assert!(ProctorLogReporter::new(ReporterConfig::new("ftp://host/log", "t", "s")).is_err());
        assert!(ProctorLogReporter::new(ReporterConfig::new("http://host/log", "t", " ")).is_err());
    }
}
