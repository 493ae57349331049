/// Counts consecutive flagged frames and fires once the streak reaches the threshold.
///
/// A clean frame decrements the streak (never below zero); firing resets it.
#[derive(Clone, Debug)]
pub struct EscalationCounter {
    threshold: u32,
    streak: u32,
}

impl EscalationCounter {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            streak: 0,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn observe(&mut self, flagged: bool) -> bool {
        if !flagged {
            self.streak = self.streak.saturating_sub(1);
            return false;
        }
        self.streak += 1;
        if self.streak >= self.threshold {
            self.streak = 0;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_streak_and_resets() {
        let mut counter = EscalationCounter::new(5);
        let fired: Vec<bool> = (0..6).map(|_| counter.observe(true)).collect();
        assert_eq!(fired, vec![false, false, false, false, true, false]);
        assert_eq!(counter.streak(), 1);
    }

    #[test]
    fn clean_frames_decay_without_underflow() {
        let mut counter = EscalationCounter::new(5);
        counter.observe(true);
        counter.observe(false);
        counter.observe(false);
        assert_eq!(counter.streak(), 0);
        for _ in 0..4 {
            assert!(!counter.observe(true));
        }
        counter.observe(false);
        assert!(!counter.observe(true));
        assert!(counter.observe(true));
    }
}
