use std::{collections::VecDeque, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub sequence: usize,
    pub received_at: DateTime<Utc>,
    pub command: String,
    pub request_id: Option<Uuid>,
    pub payload: Value,
    pub raw: String,
}

impl Message {
    /// Parses one text frame. The frame must be JSON; a missing `command`
    /// becomes an empty string and a missing `payload` becomes `null`.
    pub fn from_frame(raw: String, received_at: DateTime<Utc>) -> serde_json::Result<Self> {
        let mut document: Value = serde_json::from_str(&raw)?;
        let command = document
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let request_id = document
            .get("requestId")
            .and_then(Value::as_str)
            .and_then(|id| Uuid::parse_str(id).ok());
        let payload = document
            .get_mut("payload")
            .map(Value::take)
            .unwrap_or(Value::Null);

        Ok(Self {
            sequence: 0,
            received_at,
            command,
            request_id,
            payload,
            raw,
        })
    }
}

#[derive(Clone)]
pub struct MessageLog {
    inner: Arc<LogInner>,
}

struct LogInner {
    retained: RwLock<Retained>,
    appended: watch::Sender<usize>,
}

struct Retained {
    messages: VecDeque<Message>,
    first_sequence: usize,
    capacity: Option<usize>,
}

impl Retained {
    fn next_sequence(&self) -> usize {
        self.first_sequence + self.messages.len()
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageLog {
    pub fn new() -> Self {
        Self::with_retention(None)
    }

    /// `Some(n)` keeps only the newest `n` messages.
    pub fn with_retention(capacity: Option<usize>) -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            inner: Arc::new(LogInner {
                retained: RwLock::new(Retained {
                    messages: VecDeque::new(),
                    first_sequence: 0,
                    capacity: capacity.filter(|cap| *cap > 0),
                }),
                appended,
            }),
        }
    }

    pub async fn append(&self, mut message: Message) -> usize {
        let total = {
            let mut guard = self.inner.retained.write().await;
            message.sequence = guard.next_sequence();
            guard.messages.push_back(message);
            if let Some(capacity) = guard.capacity {
                while guard.messages.len() > capacity {
                    guard.messages.pop_front();
                    guard.first_sequence += 1;
                }
            }
            guard.next_sequence()
        };
        self.inner.appended.send_replace(total);
        total - 1
    }

    /// Total number of messages ever appended, including evicted ones.
    pub async fn len(&self) -> usize {
        self.inner.retained.read().await.next_sequence()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn all(&self) -> Vec<Message> {
        self.inner
            .retained
            .read()
            .await
            .messages
            .iter()
            .cloned()
            .collect()
    }

    pub async fn since(&self, index: usize) -> Vec<Message> {
        let guard = self.inner.retained.read().await;
        let skip = index.saturating_sub(guard.first_sequence);
        guard.messages.iter().skip(skip).cloned().collect()
    }

    pub async fn recent(&self, n: usize) -> Vec<Message> {
        let guard = self.inner.retained.read().await;
        let skip = guard.messages.len().saturating_sub(n);
        guard.messages.iter().skip(skip).cloned().collect()
    }

    /// Returns once more than `observed` messages exist or `max_wait` passes.
    pub async fn wait_for_growth(&self, observed: usize, max_wait: Duration) {
        let mut updates = self.inner.appended.subscribe();
        let _ = tokio::time::timeout(max_wait, updates.wait_for(|total| *total > observed)).await;
    }

    pub async fn cursor(&self) -> LogCursor {
        let next = self.len().await;
        LogCursor {
            log: self.clone(),
            next,
        }
    }
}

/// Tracks the last observed position for "new since last look" reads.
pub struct LogCursor {
    log: MessageLog,
    next: usize,
}

impl LogCursor {
    pub fn position(&self) -> usize {
        self.next
    }

    pub async fn next_batch(&mut self) -> Vec<Message> {
        let batch = self.log.since(self.next).await;
        if let Some(last) = batch.last() {
            self.next = last.sequence + 1;
        }
        batch
    }
}

#[cfg(test)]
#[path = "tests/message_log_tests.rs"]
mod tests;
