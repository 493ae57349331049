use std::collections::HashMap;
use std::time::{Duration, Instant};

/// How often a violation key may turn into an operator alert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatePolicy {
    /// Every occurrence alerts.
    Always,
    /// Alerts on occurrence N, 2N, 3N, ...
    EveryNth(u64),
    /// At most one alert per key within the window.
    Cooldown(Duration),
    /// Never alerts (the occurrence is still counted).
    Never,
}

/// Per-key alert rate limiter.
#[derive(Debug)]
pub struct AlertGate {
    default: GatePolicy,
    policies: HashMap<String, GatePolicy>,
    occurrences: HashMap<String, u64>,
    last_fired: HashMap<String, Instant>,
}

impl AlertGate {
    pub fn new(default: GatePolicy) -> Self {
        Self {
            default,
            policies: HashMap::new(),
            occurrences: HashMap::new(),
            last_fired: HashMap::new(),
        }
    }

    pub fn with_policy(mut self, key: &str, policy: GatePolicy) -> Self {
        self.policies.insert(key.to_string(), policy);
        self
    }

    pub fn policy(&self, key: &str) -> GatePolicy {
        self.policies.get(key).copied().unwrap_or(self.default)
    }

    /// Count one occurrence of `key` and decide whether it alerts.
    pub fn admit(&mut self, key: &str, now: Instant) -> bool {
        let seen = self.occurrences.entry(key.to_string()).or_insert(0);
        *seen += 1;
        let seen = *seen;
        let fire = match self.policy(key) {
            GatePolicy::Always => true,
            GatePolicy::Never => false,
            GatePolicy::EveryNth(n) => n > 0 && seen % n == 0,
            GatePolicy::Cooldown(window) => match self.last_fired.get(key) {
                Some(last) => now.saturating_duration_since(*last) >= window,
                None => true,
            },
        };
        if fire {
            self.last_fired.insert(key.to_string(), now);
        }
        fire
    }
}
