use std::time::{Duration, Instant};

/// Lifecycle of a single debounced violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebounceState {
    /// Condition not observed.
    Clear,
    /// Condition observed, hold duration not reached yet.
    Suspected { since: Instant },
    /// Fired on the most recent observation.
    Confirmed { at: Instant },
    /// Fired earlier; condition still holds, waiting to re-arm (if ever).
    Cooldown { last_fire: Instant },
}

/// Continuous-duration timer turning a per-frame condition into discrete events.
///
/// The condition must hold on every observation for `hold` before the first
/// event. While it keeps holding, `rearm` decides whether it fires again:
/// `None` fires once per crossing, `Some(d)` fires again every `d`
/// (`Duration::ZERO` fires on every observation). Any observation without
/// the condition returns to `Clear`.
#[derive(Clone, Debug)]
pub struct Debounce {
    hold: Duration,
    rearm: Option<Duration>,
    state: DebounceState,
}

impl Debounce {
    pub fn new(hold: Duration, rearm: Option<Duration>) -> Self {
        Self {
            hold,
            rearm,
            state: DebounceState::Clear,
        }
    }

    /// Fires on the first observation of the condition.
    pub fn immediate(rearm: Option<Duration>) -> Self {
        Self::new(Duration::ZERO, rearm)
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    /// True once the condition has been confirmed and still holds.
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self.state,
            DebounceState::Confirmed { .. } | DebounceState::Cooldown { .. }
        )
    }

    pub fn reset(&mut self) {
        self.state = DebounceState::Clear;
    }

    /// Feed one observation. Returns true when an event should be emitted.
    pub fn observe(&mut self, active: bool, now: Instant) -> bool {
        if !active {
            self.state = DebounceState::Clear;
            return false;
        }
        match self.state {
            DebounceState::Clear => {
                if self.hold.is_zero() {
                    self.state = DebounceState::Confirmed { at: now };
                    true
                } else {
                    self.state = DebounceState::Suspected { since: now };
                    false
                }
            }
            DebounceState::Suspected { since } => {
                if now.saturating_duration_since(since) >= self.hold {
                    self.state = DebounceState::Confirmed { at: now };
                    true
                } else {
                    false
                }
            }
            DebounceState::Confirmed { at } | DebounceState::Cooldown { last_fire: at } => {
                match self.rearm {
                    Some(rearm) if now.saturating_duration_since(at) >= rearm => {
                        self.state = DebounceState::Confirmed { at: now };
                        true
                    }
                    _ => {
                        self.state = DebounceState::Cooldown { last_fire: at };
                        false
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(base: Instant, offset: u64) -> Instant {
        base + Duration::from_millis(offset)
    }

    #[test]
    fn fires_once_per_crossing_without_rearm() {
        let t0 = Instant::now();
        let mut absent = Debounce::new(Duration::from_secs(3), None);
        let mut fired = 0;
        // 10 s of continuous absence at 10 fps.
        for i in 0..100 {
            if absent.observe(true, ms(t0, i * 100)) {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
        assert!(absent.is_confirmed());

        // Face returns, then disappears again for long enough: one more event.
        assert!(!absent.observe(false, ms(t0, 10_000)));
        assert_eq!(absent.state(), DebounceState::Clear);
        for i in 0..40 {
            if absent.observe(true, ms(t0, 10_100 + i * 100)) {
                fired += 1;
            }
        }
        assert_eq!(fired, 2);
    }

    #[test]
    fn short_absence_never_fires() {
        let t0 = Instant::now();
        let mut absent = Debounce::new(Duration::from_secs(3), None);
        for i in 0..29 {
            assert!(!absent.observe(true, ms(t0, i * 100)));
        }
        assert!(matches!(absent.state(), DebounceState::Suspected { .. }));
        assert!(!absent.observe(false, ms(t0, 2_900)));
        assert!(!absent.observe(true, ms(t0, 3_000)));
    }

    #[test]
    fn zero_rearm_fires_every_observation() {
        let t0 = Instant::now();
        let mut gate = Debounce::immediate(Some(Duration::ZERO));
        assert!(gate.observe(true, t0));
        assert!(gate.observe(true, ms(t0, 1)));
        assert!(gate.observe(true, ms(t0, 2)));
    }

    #[test]
    fn rearm_waits_in_cooldown() {
        let t0 = Instant::now();
        let mut gate = Debounce::immediate(Some(Duration::from_secs(10)));
        assert!(gate.observe(true, t0));
        assert!(!gate.observe(true, ms(t0, 5_000)));
        assert_eq!(gate.state(), DebounceState::Cooldown { last_fire: t0 });
        assert!(gate.observe(true, ms(t0, 10_000)));
        assert_eq!(gate.state(), DebounceState::Confirmed { at: ms(t0, 10_000) });
    }
}
