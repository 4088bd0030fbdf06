//! Sliding-window flood detection
//!
//! One timestamp deque per user: append at the tail, trim expired entries
//! from the head, flood when the trimmed window still holds more than the
//! allowed message count.

use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloodVerdict {
    Ok,
    Flood,
}

#[derive(Debug, Clone)]
pub struct FloodDetector {
    windows: HashMap<i64, VecDeque<f64>>,
    window_secs: f64,
    max_messages: usize,
}

impl FloodDetector {
    pub fn new(window_secs: f64, max_messages: usize) -> Self {
        Self {
            windows: HashMap::new(),
            window_secs,
            max_messages,
        }
    }

    /// Records one message at `now` (seconds) and reports whether the user is
    /// flooding. Amortized O(1): each timestamp is pushed and popped at most
    /// once.
    pub fn record_and_check(&mut self, user_id: i64, now: f64) -> FloodVerdict {
        let window = self.windows.entry(user_id).or_default();
        window.push_back(now);

        while window
            .front()
            .is_some_and(|&first| now - first > self.window_secs)
        {
            window.pop_front();
        }

        if window.len() > self.max_messages {
            FloodVerdict::Flood
        } else {
            FloodVerdict::Ok
        }
    }

    /// Number of messages currently retained for a user.
    pub fn window_len(&self, user_id: i64) -> usize {
        self.windows.get(&user_id).map_or(0, VecDeque::len)
    }
}
