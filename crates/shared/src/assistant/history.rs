use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_HISTORY_LENGTH: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub query: String,
    pub response: String,
    pub timestamp: String,
}

/// Bounded FIFO of past exchanges; the oldest entry is evicted once the bound is exceeded.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    exchanges: VecDeque<Exchange>,
    max_len: usize,
}

impl ConversationHistory {
    pub fn new(max_len: usize) -> Self {
        let max_len = max_len.max(1);
        Self {
            exchanges: VecDeque::with_capacity(max_len + 1),
            max_len,
        }
    }

    pub fn push(&mut self, exchange: Exchange) {
        self.exchanges.push_back(exchange);
        while self.exchanges.len() > self.max_len {
            self.exchanges.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.exchanges.clear();
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn snapshot(&self) -> Vec<Exchange> {
        self.exchanges.iter().cloned().collect()
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY_LENGTH)
    }
}
