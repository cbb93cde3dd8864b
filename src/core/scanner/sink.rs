use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

/// One-way notification to a named receiver in the host.
pub trait ResultSink: Send + Sync {
    fn deliver(&self, target: &str, message: &str);
}

impl<F> ResultSink for F
where
    F: Fn(&str, &str) + Send + Sync,
{
    fn deliver(&self, target: &str, message: &str) {
        self(target, message)
    }
}

/// 投递给宿主的一条消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanMessage {
    pub target: String,
    pub message: String,
}

/// 缓存结果，供宿主轮询
#[derive(Default)]
pub struct QueueSink {
    queue: Mutex<VecDeque<ScanMessage>>,
}

impl QueueSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<ScanMessage> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultSink for QueueSink {
    fn deliver(&self, target: &str, message: &str) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(ScanMessage {
                target: target.to_string(),
                message: message.to_string(),
            });
    }
}

/// 去重包装：同一内容只投递一次，直到 `forget_all`
pub struct DedupSink<S> {
    inner: S,
    seen: Mutex<HashSet<String>>,
}

impl<S: ResultSink> DedupSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            seen: Mutex::new(HashSet::new()),
        }
    }

    pub fn forget_all(&self) {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: ResultSink> ResultSink for DedupSink<S> {
    fn deliver(&self, target: &str, message: &str) {
        let first_time = self
            .seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(message.to_string());

        if first_time {
            self.inner.deliver(target, message);
        } else {
            debug!("🔁 Suppressed repeat result for {}", target);
        }
    }
}
