//! In-memory dead-letter sink.

use std::sync::{Arc, RwLock};
use txn_validation_core::dead_letter::{DeadLetterSink, FailedMessage};
use txn_validation_core::repository::{RepositoryError, RepositoryFuture};

/// Dead-letter sink that keeps failed messages in memory.
///
/// Ids are assigned sequentially from 1.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeadLetterSink {
    messages: Arc<RwLock<Vec<FailedMessage>>>,
    failure: Arc<RwLock<Option<RepositoryError>>>,
}

impl InMemoryDeadLetterSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `error`.
    pub fn fail_with(&self, error: RepositoryError) {
        *self.failure.write().unwrap() = Some(error);
    }

    /// Messages recorded so far, in order.
    #[must_use]
    pub fn messages(&self) -> Vec<FailedMessage> {
        self.messages.read().unwrap().clone()
    }
}

impl DeadLetterSink for InMemoryDeadLetterSink {
    fn record(&self, message: &FailedMessage) -> RepositoryFuture<'_, i64> {
        let message = message.clone();
        Box::pin(async move {
            if let Some(error) = self.failure.read().unwrap().clone() {
                return Err(error);
            }
            let mut messages = self.messages.write().unwrap();
            messages.push(message);
            Ok(i64::try_from(messages.len()).unwrap_or(i64::MAX))
        })
    }
}
