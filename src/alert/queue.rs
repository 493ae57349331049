use std::collections::VecDeque;

/// Bounded FIFO of operator alert messages. Oldest entries are dropped on overflow.
#[derive(Debug)]
pub struct AlertQueue {
    pending: VecDeque<String>,
    capacity: usize,
    dropped: u64,
}

impl AlertQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        if self.pending.len() == self.capacity {
            self.pending.pop_front();
            self.dropped += 1;
            log::warn!("alert queue full ({}); dropped oldest alert", self.capacity);
        }
        self.pending.push_back(message.into());
    }

    pub fn pop(&mut self) -> Option<String> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
